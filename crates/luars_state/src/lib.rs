// Lua thread state
// Values, tables, call frames and in-place snapshots of a Lua-family VM

#[cfg(test)]
mod test;

pub mod lua_value;
pub mod lua_vm;
pub mod snapshot;

pub use lua_value::{LuaFunction, LuaTable, LuaUserdata, LuaValue, ThreadRef};
pub use lua_vm::{Context, LuaError, LuaResult, LuaState, Options};
pub use snapshot::Snapshot;
