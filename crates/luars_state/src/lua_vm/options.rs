use std::fmt;
use std::rc::Rc;

use crate::lua_value::FunctionProto;
use crate::lua_vm::lua_limits::{
    DEFAULT_CALL_STACK_SIZE, DEFAULT_REGISTRY_GROW_STEP, DEFAULT_REGISTRY_SIZE,
};
use crate::lua_vm::{LuaResult, LuaState};

/// Runs script functions. The bytecode dispatch loop lives outside this crate
/// and plugs in here.
pub trait Executor {
    /// Execute `proto` in the frame the thread just pushed for it. Arguments
    /// are at stack indices 1..=n; return how many results were pushed.
    fn execute(&self, state: &mut LuaState, proto: &Rc<FunctionProto>) -> LuaResult<usize>;
}

/// Thread configuration
#[derive(Clone)]
pub struct Options {
    /// Call-frame capacity; exceeding it is a stack overflow
    pub call_stack_size: usize,
    /// Initial value-stack slots
    pub registry_size: usize,
    /// Upper bound for the value stack; below `registry_size` means fixed size
    pub registry_max_size: usize,
    pub registry_grow_step: usize,
    /// Use the growable call-frame stack instead of the fixed one
    pub minimize_stack_memory: bool,
    /// Attach a frame traceback to raised errors
    pub include_native_trace: bool,
    pub executor: Option<Rc<dyn Executor>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            call_stack_size: DEFAULT_CALL_STACK_SIZE,
            registry_size: DEFAULT_REGISTRY_SIZE,
            registry_max_size: 0,
            registry_grow_step: DEFAULT_REGISTRY_GROW_STEP,
            minimize_stack_memory: false,
            include_native_trace: false,
            executor: None,
        }
    }
}

impl Options {
    pub fn with_call_stack_size(mut self, size: usize) -> Self {
        self.call_stack_size = size;
        self
    }

    pub fn with_registry_size(mut self, size: usize) -> Self {
        self.registry_size = size;
        self
    }

    pub fn with_registry_max_size(mut self, size: usize) -> Self {
        self.registry_max_size = size;
        self
    }

    pub fn with_registry_grow_step(mut self, step: usize) -> Self {
        self.registry_grow_step = step;
        self
    }

    pub fn with_minimize_stack_memory(mut self, minimize: bool) -> Self {
        self.minimize_stack_memory = minimize;
        self
    }

    pub fn with_native_trace(mut self, include: bool) -> Self {
        self.include_native_trace = include;
        self
    }

    pub fn with_executor(mut self, executor: Rc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("call_stack_size", &self.call_stack_size)
            .field("registry_size", &self.registry_size)
            .field("registry_max_size", &self.registry_max_size)
            .field("registry_grow_step", &self.registry_grow_step)
            .field("minimize_stack_memory", &self.minimize_stack_memory)
            .field("include_native_trace", &self.include_native_trace)
            .field("executor", &self.executor.is_some())
            .finish()
    }
}
