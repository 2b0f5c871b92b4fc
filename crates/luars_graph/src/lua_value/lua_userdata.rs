use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::memory::{MemoryCounter, OBJECT_SIZE};
use crate::persist::Serializer;

/// Host object stored in a Lua value.
///
/// Persisting a userdata requires a serializer; counting its memory uses
/// `trace_object`, which defaults to a bare object header.
pub trait LuaUserdata: Any {
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Serializer responsible for this value, if it can be persisted.
    fn serializer(&self) -> Option<Rc<dyn Serializer>> {
        None
    }

    /// Footprint of this object plus whatever it reaches within `depth`.
    fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        let _ = (counter, depth);
        OBJECT_SIZE
    }
}

#[derive(Clone)]
pub struct UserdataRef(Rc<dyn LuaUserdata>);

impl UserdataRef {
    pub fn new<T: LuaUserdata>(userdata: T) -> Self {
        UserdataRef(Rc::new(userdata))
    }

    pub fn from_rc(userdata: Rc<dyn LuaUserdata>) -> Self {
        UserdataRef(userdata)
    }

    pub fn as_rc(&self) -> &Rc<dyn LuaUserdata> {
        &self.0
    }

    pub fn downcast_ref<T: LuaUserdata>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    pub fn serializer(&self) -> Option<Rc<dyn Serializer>> {
        self.0.serializer()
    }

    pub fn trace_object(&self, counter: &mut MemoryCounter, depth: u32) -> u64 {
        self.0.trace_object(counter, depth)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &UserdataRef) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for UserdataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:x})", self.type_name(), self.addr())
    }
}
