use crate::gc::GcRef;
use crate::lua_state::LuaState;
use crate::lua_value::{
    LuaClosure, LuaString, LuaTable, LuaThread, LuaValue, Prototype, Slot, Upvalue,
};
use crate::memory::{MemoryCounter, OBJECT_SIZE, POINTER_SIZE};

/// A node kind that takes part in memory accounting.
pub trait AllocatedObject {
    /// Own footprint, excluding anything reached through references.
    fn shallow_size(&self) -> u64;

    /// Report every strongly held reference to `counter` at `depth` and
    /// return the own footprint.
    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64;
}

impl AllocatedObject for LuaState {
    fn shallow_size(&self) -> u64 {
        OBJECT_SIZE + 3 * POINTER_SIZE
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        counter.trace(GcRef::Table(self.globals().clone()), depth);
        counter.trace(GcRef::Table(self.registry().clone()), depth);
        counter.trace(GcRef::Thread(self.main_thread().clone()), depth);
        self.shallow_size()
    }
}

impl AllocatedObject for LuaString {
    fn shallow_size(&self) -> u64 {
        OBJECT_SIZE + self.len() as u64
    }

    fn trace_object(&self, _counter: &mut MemoryCounter, _depth: u32) -> u64 {
        self.shallow_size()
    }
}

impl AllocatedObject for LuaTable {
    fn shallow_size(&self) -> u64 {
        let cells = (self.array_capacity() + self.hash_capacity()) as u64;
        OBJECT_SIZE + POINTER_SIZE * cells + OBJECT_SIZE * self.hash_slot_count() as u64
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        for cell in self.array().iter() {
            if let Some(value) = cell.as_strong() {
                counter.trace_value(value, depth);
            }
        }
        for entry in self
            .buckets()
            .iter()
            .flatten()
            .flat_map(Slot::iter)
            .filter_map(Slot::first_entry)
        {
            if let Some(key) = entry.key_ref().as_strong() {
                counter.trace_value(key, depth);
            }
            if let Some(value) = entry.value_ref().as_strong() {
                counter.trace_value(value, depth);
            }
        }
        if let Some(metatable) = self.get_metatable() {
            counter.trace(GcRef::Table(metatable), depth);
        }
        self.shallow_size()
    }
}

impl AllocatedObject for LuaClosure {
    fn shallow_size(&self) -> u64 {
        OBJECT_SIZE + POINTER_SIZE * self.upvalues.len() as u64
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        counter.trace(GcRef::Prototype(self.proto.clone()), depth);
        for upvalue in &self.upvalues {
            counter.trace(GcRef::Upvalue(upvalue.clone()), depth);
        }
        if let Some(env) = &self.env {
            counter.trace(GcRef::Table(env.clone()), depth);
        }
        self.shallow_size()
    }
}

impl AllocatedObject for Prototype {
    fn shallow_size(&self) -> u64 {
        let words = (self.code.len() + self.line_info.len()) as u64;
        let refs = (self.constants.len()
            + self.protos.len()
            + self.local_vars.len()
            + self.upvalue_names.len()) as u64;
        OBJECT_SIZE + 4 * words + POINTER_SIZE * refs
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        counter.trace_value(&self.source, depth);
        for constant in &self.constants {
            counter.trace_value(constant, depth);
        }
        for proto in &self.protos {
            counter.trace(GcRef::Prototype(proto.clone()), depth);
        }
        for local in &self.local_vars {
            counter.trace_value(&local.name, depth);
        }
        for name in &self.upvalue_names {
            counter.trace_value(name, depth);
        }
        self.shallow_size()
    }
}

impl AllocatedObject for Upvalue {
    fn shallow_size(&self) -> u64 {
        OBJECT_SIZE + POINTER_SIZE
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        counter.trace(GcRef::Stack(self.stack.clone()), depth);
        self.shallow_size()
    }
}

// value stack
impl AllocatedObject for Vec<LuaValue> {
    fn shallow_size(&self) -> u64 {
        OBJECT_SIZE + POINTER_SIZE * self.len() as u64
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        for value in self {
            counter.trace_value(value, depth);
        }
        self.shallow_size()
    }
}

impl AllocatedObject for LuaThread {
    fn shallow_size(&self) -> u64 {
        OBJECT_SIZE + 3 * POINTER_SIZE * self.state.frames.len() as u64
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        counter.trace(GcRef::Stack(self.state.stack.clone()), depth);
        for frame in &self.state.frames {
            counter.trace(GcRef::Closure(frame.closure.clone()), depth);
        }
        if let Some(env) = &self.env {
            counter.trace(GcRef::Table(env.clone()), depth);
        }
        if let Some(error_func) = &self.error_func {
            counter.trace_value(error_func, depth);
        }
        counter.trace_value(&self.debug.hook, depth);
        self.shallow_size()
    }
}

impl AllocatedObject for GcRef {
    fn shallow_size(&self) -> u64 {
        match self {
            GcRef::String(s) => s.shallow_size(),
            GcRef::Table(t) => t.borrow().shallow_size(),
            GcRef::Closure(c) => c.borrow().shallow_size(),
            GcRef::Prototype(p) => p.borrow().shallow_size(),
            GcRef::Upvalue(u) => u.borrow().shallow_size(),
            GcRef::Stack(s) => s.borrow().shallow_size(),
            GcRef::Thread(t) => t.borrow().shallow_size(),
            GcRef::Userdata(_) | GcRef::Serializer(_) => OBJECT_SIZE,
        }
    }

    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        match self {
            GcRef::String(s) => s.trace_object(counter, depth),
            GcRef::Table(t) => t.borrow().trace_object(counter, depth),
            GcRef::Closure(c) => c.borrow().trace_object(counter, depth),
            GcRef::Prototype(p) => p.borrow().trace_object(counter, depth),
            GcRef::Upvalue(u) => u.borrow().trace_object(counter, depth),
            GcRef::Stack(s) => s.borrow().trace_object(counter, depth),
            GcRef::Thread(t) => t.borrow().trace_object(counter, depth),
            GcRef::Userdata(u) => u.trace_object(counter, depth),
            GcRef::Serializer(_) => OBJECT_SIZE,
        }
    }
}
