use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::rc::Rc;

use crate::gc::GcHeader;
use crate::lua_value::{
    ClosureRef, LuaString, LuaValue, ProtoRef, StackRef, TableRef, ThreadRef, UpvalueRef,
    UserdataRef,
};
use crate::persist::Serializer;

/// Owning reference to any object the graph walkers track by identity.
///
/// Strings compare by content, every other kind by address. This is the
/// key of the writer's id map and the item type of deferred work queues.
#[derive(Clone)]
pub enum GcRef {
    String(Rc<LuaString>),
    Table(TableRef),
    Closure(ClosureRef),
    Prototype(ProtoRef),
    Upvalue(UpvalueRef),
    Stack(StackRef),
    Thread(ThreadRef),
    Userdata(UserdataRef),
    Serializer(Rc<dyn Serializer>),
}

impl GcRef {
    /// The object behind a value, or `None` for inline kinds.
    pub fn from_value(value: &LuaValue) -> Option<GcRef> {
        match value {
            LuaValue::String(s) => Some(GcRef::String(s.clone())),
            LuaValue::Table(t) => Some(GcRef::Table(t.clone())),
            LuaValue::Function(c) => Some(GcRef::Closure(c.clone())),
            LuaValue::Thread(t) => Some(GcRef::Thread(t.clone())),
            LuaValue::Userdata(u) => Some(GcRef::Userdata(u.clone())),
            LuaValue::Nil | LuaValue::Boolean(_) | LuaValue::Integer(_) | LuaValue::Float(_) => {
                None
            }
        }
    }

    /// The value view of this object, for kinds that are first-class values.
    pub fn to_value(&self) -> Option<LuaValue> {
        match self {
            GcRef::String(s) => Some(LuaValue::String(s.clone())),
            GcRef::Table(t) => Some(LuaValue::Table(t.clone())),
            GcRef::Closure(c) => Some(LuaValue::Function(c.clone())),
            GcRef::Thread(t) => Some(LuaValue::Thread(t.clone())),
            GcRef::Userdata(u) => Some(LuaValue::Userdata(u.clone())),
            GcRef::Prototype(_) | GcRef::Upvalue(_) | GcRef::Stack(_) | GcRef::Serializer(_) => {
                None
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            GcRef::String(_) => "string",
            GcRef::Table(_) => "table",
            GcRef::Closure(_) => "function",
            GcRef::Prototype(_) => "prototype",
            GcRef::Upvalue(_) => "upvalue",
            GcRef::Stack(_) => "stack",
            GcRef::Thread(_) => "thread",
            GcRef::Userdata(_) => "userdata",
            GcRef::Serializer(_) => "serializer",
        }
    }

    /// Mark header, when the kind carries one.
    pub fn header(&self) -> Option<&GcHeader> {
        match self {
            GcRef::Table(t) => Some(t.header()),
            GcRef::Closure(c) => Some(c.header()),
            GcRef::Prototype(p) => Some(p.header()),
            GcRef::Upvalue(u) => Some(u.header()),
            GcRef::Stack(s) => Some(s.header()),
            GcRef::Thread(t) => Some(t.header()),
            GcRef::String(_) | GcRef::Userdata(_) | GcRef::Serializer(_) => None,
        }
    }

    pub fn addr(&self) -> usize {
        match self {
            GcRef::String(s) => Rc::as_ptr(s) as usize,
            GcRef::Table(t) => t.addr(),
            GcRef::Closure(c) => c.addr(),
            GcRef::Prototype(p) => p.addr(),
            GcRef::Upvalue(u) => u.addr(),
            GcRef::Stack(s) => s.addr(),
            GcRef::Thread(t) => t.addr(),
            GcRef::Userdata(u) => u.addr(),
            GcRef::Serializer(s) => Rc::as_ptr(s) as *const () as usize,
        }
    }
}

impl PartialEq for GcRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GcRef::String(a), GcRef::String(b)) => a == b,
            _ => mem::discriminant(self) == mem::discriminant(other) && self.addr() == other.addr(),
        }
    }
}

impl Eq for GcRef {}

impl Hash for GcRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            GcRef::String(s) => s.cached_hash().hash(state),
            _ => self.addr().hash(state),
        }
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcRef::String(s) => write!(f, "string({:?})", s),
            _ => write!(f, "{}({:#x})", self.kind_name(), self.addr()),
        }
    }
}

impl From<TableRef> for GcRef {
    fn from(table: TableRef) -> Self {
        GcRef::Table(table)
    }
}

impl From<ClosureRef> for GcRef {
    fn from(closure: ClosureRef) -> Self {
        GcRef::Closure(closure)
    }
}

impl From<ProtoRef> for GcRef {
    fn from(proto: ProtoRef) -> Self {
        GcRef::Prototype(proto)
    }
}

impl From<UpvalueRef> for GcRef {
    fn from(upvalue: UpvalueRef) -> Self {
        GcRef::Upvalue(upvalue)
    }
}

impl From<StackRef> for GcRef {
    fn from(stack: StackRef) -> Self {
        GcRef::Stack(stack)
    }
}

impl From<ThreadRef> for GcRef {
    fn from(thread: ThreadRef) -> Self {
        GcRef::Thread(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_value::LuaTable;
    use crate::gc::Gc;

    #[test]
    fn strings_compare_by_content() {
        let a = GcRef::String(Rc::new(LuaString::from("shared key that is long")));
        let b = GcRef::String(Rc::new(LuaString::from("shared key that is long")));
        assert_eq!(a, b);
    }

    #[test]
    fn tables_compare_by_identity() {
        let t1 = Gc::new(LuaTable::new(0, 0));
        let t2 = Gc::new(LuaTable::new(0, 0));
        assert_eq!(GcRef::Table(t1.clone()), GcRef::Table(t1.clone()));
        assert_ne!(GcRef::Table(t1), GcRef::Table(t2));
    }
}
