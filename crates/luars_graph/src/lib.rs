// Lua object graph core
// Hybrid tables with weak modes, graph persistence and memory accounting

#[cfg(test)]
mod test;

pub mod gc;
pub mod lua_state;
pub mod lua_value;
pub mod memory;
pub mod persist;

#[cfg(feature = "serde")]
pub mod serde;

pub use gc::{Gc, GcRef, GcWeak};
pub use lua_state::{LuaError, LuaResult, LuaState, PersistOption, TraceOption};
pub use lua_value::{LuaString, LuaTable, LuaValue, WeakMode};
pub use memory::MemoryCounter;
pub use persist::{
    PersistError, PersistResult, Serializer, persist, persist_to_vec, unpersist,
    unpersist_from_slice,
};
