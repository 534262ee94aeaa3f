// Lua thread state
// Value stack, call frames and the interpreter-wide Global they share
mod allocator;
mod call_info;
mod context;
mod global;
mod lua_error;
pub mod lua_limits;
mod lua_state;
mod options;
mod value_stack;

pub use allocator::Allocator;
pub use call_info::{CallFrameStack, CallInfo, CallStackKind};
pub use context::Context;
pub use global::{Global, TempFile};
pub use lua_error::{ErrorKind, LuaError};
pub use lua_limits::{ENVIRON_INDEX, GLOBALS_INDEX, MULTRET, REGISTRY_INDEX, upvalue_index};
pub use lua_state::{LuaState, PanicHook};
pub use options::{Executor, Options};
pub use value_stack::ValueStack;

pub type LuaResult<T> = Result<T, LuaError>;
