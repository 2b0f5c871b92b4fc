// Lua object graph: values, tables, functions, threads and userdata.
// Every collectable kind lives behind a `Gc` handle; identity is the handle's address.
mod lua_function;
mod lua_table;
mod lua_thread;
mod lua_userdata;
mod lua_value;

use std::fmt;
use std::hash::Hasher;

use crate::gc::Gc;

pub use lua_function::{LocalVariable, LuaClosure, Prototype, Upvalue};
pub use lua_table::{
    DeadSlot, Entry, LuaTable, LuaTableIter, Slot, SlotRef, WeakMode, WeakValue,
};
pub use lua_thread::{CallFrame, CoroutineStatus, DebugState, LuaThread, ThreadState};
pub use lua_userdata::{LuaUserdata, UserdataRef};
pub use lua_value::{LuaValue, LuaValueKind};

pub type TableRef = Gc<LuaTable>;
pub type ClosureRef = Gc<LuaClosure>;
pub type ProtoRef = Gc<Prototype>;
pub type UpvalueRef = Gc<Upvalue>;
/// Value stack shared between a thread and the upvalues that point into it.
pub type StackRef = Gc<Vec<LuaValue>>;
pub type ThreadRef = Gc<LuaThread>;

/// Lua string: immutable bytes with a cached hash
pub struct LuaString {
    hash: u64, // Keep hash first for alignment
    data: Box<[u8]>,
}

impl LuaString {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        let data = data.into();
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for &byte in data.iter() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        LuaString { hash, data }
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The contents, if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub fn cached_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for LuaString {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: compare hashes first
        self.hash == other.hash && self.data == other.data
    }
}

impl Eq for LuaString {}

impl std::hash::Hash for LuaString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.data))
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        LuaString::new(s.as_bytes())
    }
}

impl From<String> for LuaString {
    fn from(s: String) -> Self {
        LuaString::new(s.into_bytes())
    }
}

impl From<&[u8]> for LuaString {
    fn from(bytes: &[u8]) -> Self {
        LuaString::new(bytes)
    }
}

impl From<Vec<u8>> for LuaString {
    fn from(bytes: Vec<u8>) -> Self {
        LuaString::new(bytes)
    }
}
