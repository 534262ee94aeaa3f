// Lua value model
// Scalars inline, compound objects behind Rc<RefCell<_>> handles
pub mod lua_convert;
mod lua_channel;
mod lua_function;
mod lua_table;
mod lua_userdata;
mod lua_value;

pub use lua_channel::LuaChannel;
pub use lua_function::{
    FunctionKind, FunctionProto, LuaFunction, LuaUpvalue, NativeFn, UpvalueRef,
};
pub use lua_table::LuaTable;
pub use lua_userdata::LuaUserdata;
pub use lua_value::{
    FunctionRef, LuaValue, LuaValueType, TableRef, ThreadRef, UserdataRef,
};
