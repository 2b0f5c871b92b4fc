mod graph_option;
mod lua_error;
pub mod lua_limits;

use std::cell::Cell;

use crate::gc::{Gc, UNMARKED};
use crate::lua_value::{LuaTable, LuaThread, TableRef, ThreadRef};
use crate::persist::SerializerRegistry;

pub use graph_option::{PersistOption, TraceOption};
pub use lua_error::{LuaError, LuaResult};

/// Root of an object graph: globals, registry and main thread, plus the
/// serializers and settings persistence and accounting run with.
pub struct LuaState {
    globals: TableRef,
    registry: TableRef,
    main_thread: ThreadRef,
    serializers: SerializerRegistry,
    persist_option: PersistOption,
    trace_option: TraceOption,
    /// Mark generation of the last memory count.
    last_mark: Cell<u32>,
}

impl LuaState {
    pub fn new() -> Self {
        Self::with_options(PersistOption::default(), TraceOption::default())
    }

    pub fn with_options(persist_option: PersistOption, trace_option: TraceOption) -> Self {
        let globals = Gc::new(LuaTable::new(0, 0));
        let main_thread = Gc::new(LuaThread::new(Some(globals.clone())));
        LuaState {
            globals,
            registry: Gc::new(LuaTable::new(0, 0)),
            main_thread,
            serializers: SerializerRegistry::default(),
            persist_option,
            trace_option,
            last_mark: Cell::new(UNMARKED),
        }
    }

    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    pub fn registry(&self) -> &TableRef {
        &self.registry
    }

    pub fn main_thread(&self) -> &ThreadRef {
        &self.main_thread
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    pub fn serializers_mut(&mut self) -> &mut SerializerRegistry {
        &mut self.serializers
    }

    pub fn persist_option(&self) -> PersistOption {
        self.persist_option
    }

    pub fn set_persist_option(&mut self, option: PersistOption) {
        self.persist_option = option;
    }

    pub fn trace_option(&self) -> TraceOption {
        self.trace_option
    }

    /// Advance to a fresh mark generation. Marks left by earlier counts,
    /// including objects an earlier count skipped, read as unvisited.
    pub(crate) fn next_mark(&self) -> u32 {
        let mut mark = self.last_mark.get().wrapping_add(1);
        if mark == UNMARKED {
            mark = mark.wrapping_add(1);
        }
        self.last_mark.set(mark);
        mark
    }
}

impl Default for LuaState {
    fn default() -> Self {
        Self::new()
    }
}
