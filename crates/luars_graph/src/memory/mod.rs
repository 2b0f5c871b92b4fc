// Memory accounting: sums object footprints over everything reachable from
// a root, visiting each object once. Objects with a gc header are marked
// with the run's generation; strings and userdata go through an identity set.
mod allocated_object;

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::gc::{BoundedWalk, DrainOrder, GcRef};
use crate::lua_state::{LuaState, TraceOption};
use crate::lua_value::LuaValue;

pub use allocated_object::AllocatedObject;

/// Fixed footprint charged per object.
pub const OBJECT_SIZE: u64 = 32;
/// Footprint of one reference field.
pub const POINTER_SIZE: u64 = 4;

pub struct MemoryCounter {
    mark: u32,
    used: u64,
    visited: usize,
    walk: BoundedWalk<GcRef>,
    seen: HashSet<usize, ahash::RandomState>,
    option: TraceOption,
}

impl MemoryCounter {
    fn new(mark: u32, option: TraceOption) -> Self {
        MemoryCounter {
            mark,
            used: 0,
            visited: 0,
            walk: BoundedWalk::new(DrainOrder::Lifo),
            seen: HashSet::default(),
            option,
        }
    }

    /// Bytes retained by everything reachable from the state's roots.
    pub fn count(state: &LuaState) -> u64 {
        let mut counter = MemoryCounter::new(state.next_mark(), state.trace_option());
        let depth = counter.option.initial_depth;
        let size = state.trace_object(&mut counter, depth);
        counter.used += size;
        counter.drain()
    }

    /// Bytes retained by everything reachable from `value`.
    pub fn count_value(state: &LuaState, value: &LuaValue) -> u64 {
        let mut counter = MemoryCounter::new(state.next_mark(), state.trace_option());
        let depth = counter.option.initial_depth;
        counter.trace_value(value, depth);
        counter.drain()
    }

    fn drain(mut self) -> u64 {
        let depth = self.option.resume_depth;
        while let Some(object) = self.walk.next_deferred() {
            let size = object.trace_object(&mut self, depth);
            self.used += size;
        }
        debug!(
            bytes = self.used,
            objects = self.visited,
            deferred = self.walk.deferred_total(),
            "memory count finished"
        );
        self.used
    }

    /// Count `object` unless this run has already seen it. With no depth
    /// left the object is parked and counted from the pending list later.
    pub fn trace(&mut self, object: GcRef, depth: u32) {
        let fresh = match object.header() {
            Some(header) => header.mark_object(self.mark),
            None => self.seen.insert(object.addr()),
        };
        if !fresh {
            return;
        }
        self.visited += 1;
        match BoundedWalk::<GcRef>::admit(depth) {
            Some(child_depth) => {
                let size = object.trace_object(self, child_depth);
                self.used += size;
            }
            None => {
                trace!(kind = object.kind_name(), "memory count deferred");
                self.walk.defer(object);
            }
        }
    }

    pub fn trace_value(&mut self, value: &LuaValue, depth: u32) {
        if let Some(object) = GcRef::from_value(value) {
            self.trace(object, depth);
        }
    }

    /// Bytes counted so far.
    pub fn used(&self) -> u64 {
        self.used
    }
}
