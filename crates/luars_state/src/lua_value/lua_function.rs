// Functions, prototypes and upvalues
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::lua_value::{LuaValue, TableRef};
use crate::lua_vm::{LuaResult, LuaState};

/// Host callback: receives the running thread, returns the number of
/// results it left on top of the stack.
pub type NativeFn = Rc<dyn Fn(&mut LuaState) -> LuaResult<usize>>;

/// Compiled function prototype.
///
/// Produced by the compiler and consumed by the executor; this crate only
/// carries it around and reads the debug fields for error locations.
#[derive(Debug, Clone, Default)]
pub struct FunctionProto {
    pub source: String,
    pub line_defined: usize,
    pub last_line_defined: usize,
    pub num_params: usize,
    pub is_vararg: bool,
    pub num_upvalues: usize,
    pub max_stack_size: usize,
    pub code: Vec<u32>,
    pub constants: Vec<LuaValue>,
    /// Line number for each instruction
    pub line_info: Vec<u32>,
}

impl FunctionProto {
    pub fn new(source: impl Into<String>) -> Self {
        FunctionProto {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Source line of the instruction before `pc`
    pub fn line_at(&self, pc: usize) -> usize {
        if pc > 0 {
            if let Some(line) = self.line_info.get(pc - 1) {
                return *line as usize;
            }
        }
        self.line_info
            .first()
            .map(|l| *l as usize)
            .unwrap_or(self.line_defined)
    }
}

#[derive(Clone)]
pub enum FunctionKind {
    Native(NativeFn),
    Script(Rc<FunctionProto>),
}

/// A closure: native callback or script prototype, its captured upvalues
/// and the environment table it was defined in.
pub struct LuaFunction {
    pub env: TableRef,
    pub kind: FunctionKind,
    pub upvalues: Vec<UpvalueRef>,
}

impl LuaFunction {
    pub fn new_native(env: TableRef, func: NativeFn, upvalues: Vec<UpvalueRef>) -> Self {
        LuaFunction {
            env,
            kind: FunctionKind::Native(func),
            upvalues,
        }
    }

    pub fn new_script(env: TableRef, proto: Rc<FunctionProto>, upvalues: Vec<UpvalueRef>) -> Self {
        LuaFunction {
            env,
            kind: FunctionKind::Script(proto),
            upvalues,
        }
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native(_))
    }

    pub fn proto(&self) -> Option<&Rc<FunctionProto>> {
        match &self.kind {
            FunctionKind::Script(p) => Some(p),
            FunctionKind::Native(_) => None,
        }
    }

    /// Copy of the record with its own upvalue list.
    /// The upvalue boxes themselves are shared with the source, and so is
    /// the environment table.
    pub fn clone_function(&self) -> LuaFunction {
        LuaFunction {
            env: self.env.clone(),
            kind: self.kind.clone(),
            upvalues: self.upvalues.clone(),
        }
    }
}

impl fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FunctionKind::Native(_) => write!(f, "LuaFunction(native, {} upvalues)", self.upvalues.len()),
            FunctionKind::Script(p) => write!(
                f,
                "LuaFunction({}:{}, {} upvalues)",
                p.source,
                p.line_defined,
                self.upvalues.len()
            ),
        }
    }
}

pub type UpvalueRef = Rc<LuaUpvalue>;

/// Runtime upvalue - can be open (pointing to stack) or closed (owns value)
/// This matches Lua's UpVal implementation
pub struct LuaUpvalue {
    value: RefCell<UpvalueState>,
}

#[derive(Debug, Clone)]
enum UpvalueState {
    Open {
        stack_index: usize, // Absolute index in the value stack
    },
    Closed(LuaValue), // Value moved to heap after frame exits
}

impl LuaUpvalue {
    /// Create an open upvalue pointing to a stack location (absolute index)
    pub fn new_open(stack_index: usize) -> UpvalueRef {
        Rc::new(LuaUpvalue {
            value: RefCell::new(UpvalueState::Open { stack_index }),
        })
    }

    /// Create a closed upvalue with an owned value
    pub fn new_closed(value: LuaValue) -> UpvalueRef {
        Rc::new(LuaUpvalue {
            value: RefCell::new(UpvalueState::Closed(value)),
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.value.borrow(), UpvalueState::Open { .. })
    }

    /// Check if this upvalue points to a specific stack location (absolute index)
    pub fn points_to_index(&self, index: usize) -> bool {
        match *self.value.borrow() {
            UpvalueState::Open { stack_index } => stack_index == index,
            _ => false,
        }
    }

    pub fn stack_index(&self) -> Option<usize> {
        match *self.value.borrow() {
            UpvalueState::Open { stack_index } => Some(stack_index),
            _ => None,
        }
    }

    /// Close this upvalue (move value from stack to heap)
    pub fn close(&self, stack_value: LuaValue) {
        let mut state = self.value.borrow_mut();
        if matches!(*state, UpvalueState::Open { .. }) {
            *state = UpvalueState::Closed(stack_value);
        }
    }

    /// Get the value (reads the stack slot if open)
    pub fn get_value(&self, stack: &[LuaValue]) -> LuaValue {
        match &*self.value.borrow() {
            UpvalueState::Open { stack_index } => {
                stack.get(*stack_index).cloned().unwrap_or_default()
            }
            UpvalueState::Closed(val) => val.clone(),
        }
    }

    /// Set the value (writes the stack slot if open)
    pub fn set_value(&self, stack: &mut [LuaValue], value: LuaValue) {
        let mut state = self.value.borrow_mut();
        match &mut *state {
            UpvalueState::Open { stack_index } => {
                if let Some(slot) = stack.get_mut(*stack_index) {
                    *slot = value;
                }
            }
            UpvalueState::Closed(val) => *val = value,
        }
    }

    /// A new, independent box in the same state
    pub fn duplicate(&self) -> UpvalueRef {
        Rc::new(LuaUpvalue {
            value: RefCell::new(self.value.borrow().clone()),
        })
    }
}

impl fmt::Debug for LuaUpvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.value.borrow() {
            UpvalueState::Open { stack_index } => {
                write!(f, "Upvalue::Open(idx={})", stack_index)
            }
            UpvalueState::Closed(val) => {
                write!(f, "Upvalue::Closed({:?})", val)
            }
        }
    }
}
