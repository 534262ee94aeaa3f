use thiserror::Error;

use crate::lua_value::LuaValue;

/// What went wrong. Every kind is recoverable by a protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error raised by native code or the executor
    Runtime,
    /// Registry, environment or `_G` replaced with a non-table
    TypeInvariant,
    /// Call-frame or value-stack capacity exceeded
    StackOverflow,
    /// A native callback panicked
    Panic,
    /// The attached context was cancelled
    Cancelled,
    /// The error handler of a protected call failed itself
    ErrorHandler,
}

/// Error surfaced by calls and stack operations.
///
/// The error object is what a protected call reports; an error handler may
/// replace it. Display renders the object, then the traceback if captured.
#[derive(Debug, Clone, Error)]
#[error("{}", render(.object, .traceback))]
pub struct LuaError {
    kind: ErrorKind,
    object: LuaValue,
    traceback: Option<String>,
}

fn render(object: &LuaValue, traceback: &Option<String>) -> String {
    match traceback {
        Some(tb) => format!("{}\n{}", object, tb),
        None => object.to_string(),
    }
}

impl LuaError {
    pub fn new(kind: ErrorKind, object: LuaValue) -> Self {
        LuaError {
            kind,
            object,
            traceback: None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, LuaValue::from(message.into()))
    }

    pub fn type_invariant(message: &str) -> Self {
        Self::new(ErrorKind::TypeInvariant, LuaValue::from(message))
    }

    pub fn stack_overflow(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StackOverflow, LuaValue::from(message.into()))
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Panic, LuaValue::from(message.into()))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, LuaValue::from("context canceled"))
    }

    pub fn error_handler(inner: &LuaError) -> Self {
        Self::new(
            ErrorKind::ErrorHandler,
            LuaValue::from(format!("error in error handling: {}", inner.object)),
        )
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error object (a string message unless a handler replaced it)
    #[inline]
    pub fn object(&self) -> &LuaValue {
        &self.object
    }

    /// The error object as text, without traceback
    pub fn message(&self) -> String {
        self.object.to_string()
    }

    pub fn traceback(&self) -> Option<&str> {
        self.traceback.as_deref()
    }

    pub fn with_object(mut self, object: LuaValue) -> Self {
        self.object = object;
        self
    }

    pub fn with_traceback(mut self, traceback: String) -> Self {
        self.traceback = Some(traceback);
        self
    }
}
