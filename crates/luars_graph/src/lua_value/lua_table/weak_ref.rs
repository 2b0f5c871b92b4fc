use std::rc::{Rc, Weak};

use crate::gc::GcWeak;
use crate::lua_value::{LuaClosure, LuaTable, LuaThread, LuaUserdata, LuaValue, UserdataRef};

/// Weak handle to a reference-kind value.
#[derive(Clone)]
pub enum WeakValue {
    Table(GcWeak<LuaTable>),
    Function(GcWeak<LuaClosure>),
    Thread(GcWeak<LuaThread>),
    Userdata(Weak<dyn LuaUserdata>),
}

impl WeakValue {
    /// `None` for kinds that cannot be held weakly.
    pub fn new(value: &LuaValue) -> Option<WeakValue> {
        match value {
            LuaValue::Table(t) => Some(WeakValue::Table(t.downgrade())),
            LuaValue::Function(c) => Some(WeakValue::Function(c.downgrade())),
            LuaValue::Thread(t) => Some(WeakValue::Thread(t.downgrade())),
            LuaValue::Userdata(u) => Some(WeakValue::Userdata(Rc::downgrade(u.as_rc()))),
            _ => None,
        }
    }

    pub fn upgrade(&self) -> Option<LuaValue> {
        match self {
            WeakValue::Table(t) => t.upgrade().map(LuaValue::Table),
            WeakValue::Function(c) => c.upgrade().map(LuaValue::Function),
            WeakValue::Thread(t) => t.upgrade().map(LuaValue::Thread),
            WeakValue::Userdata(u) => u.upgrade().map(|u| LuaValue::Userdata(UserdataRef::from_rc(u))),
        }
    }

    pub fn is_cleared(&self) -> bool {
        match self {
            WeakValue::Table(t) => t.is_cleared(),
            WeakValue::Function(c) => c.is_cleared(),
            WeakValue::Thread(t) => t.is_cleared(),
            WeakValue::Userdata(u) => u.strong_count() == 0,
        }
    }

    fn addr(&self) -> usize {
        match self {
            WeakValue::Table(t) => t.addr(),
            WeakValue::Function(c) => c.addr(),
            WeakValue::Thread(t) => t.addr(),
            WeakValue::Userdata(u) => u.as_ptr() as *const () as usize,
        }
    }

    /// Identity comparison against a live value; a cleared handle matches nothing.
    fn refers_to(&self, value: &LuaValue) -> bool {
        if self.is_cleared() {
            return false;
        }
        match (self, value) {
            (WeakValue::Table(_), LuaValue::Table(t)) => self.addr() == t.addr(),
            (WeakValue::Function(_), LuaValue::Function(c)) => self.addr() == c.addr(),
            (WeakValue::Thread(_), LuaValue::Thread(t)) => self.addr() == t.addr(),
            (WeakValue::Userdata(_), LuaValue::Userdata(u)) => self.addr() == u.addr(),
            _ => false,
        }
    }
}

/// A key or value as held by a table slot.
#[derive(Clone)]
pub enum SlotRef {
    Strong(LuaValue),
    Weak(WeakValue),
}

impl SlotRef {
    pub fn strong(value: LuaValue) -> SlotRef {
        SlotRef::Strong(value)
    }

    /// Weak when the kind allows it, strong otherwise.
    pub fn weak(value: LuaValue) -> SlotRef {
        match WeakValue::new(&value) {
            Some(weak) => SlotRef::Weak(weak),
            None => SlotRef::Strong(value),
        }
    }

    /// Current value; nil once a weak referent is gone.
    pub fn get(&self) -> LuaValue {
        match self {
            SlotRef::Strong(value) => value.clone(),
            SlotRef::Weak(weak) => weak.upgrade().unwrap_or_default(),
        }
    }

    pub fn is_cleared(&self) -> bool {
        match self {
            SlotRef::Strong(_) => false,
            SlotRef::Weak(weak) => weak.is_cleared(),
        }
    }

    pub fn is_nil(&self) -> bool {
        match self {
            SlotRef::Strong(value) => value.is_nil(),
            SlotRef::Weak(weak) => weak.is_cleared(),
        }
    }

    pub fn raw_eq(&self, other: &LuaValue) -> bool {
        match self {
            SlotRef::Strong(value) => value.raw_eq(other),
            SlotRef::Weak(weak) => weak.refers_to(other),
        }
    }

    /// Same referent, held weakly if it is a reference kind.
    pub fn downgrade(self) -> SlotRef {
        match self {
            SlotRef::Strong(value) => SlotRef::weak(value),
            weak => weak,
        }
    }

    /// The strongly held value, if any.
    pub fn as_strong(&self) -> Option<&LuaValue> {
        match self {
            SlotRef::Strong(value) => Some(value),
            SlotRef::Weak(_) => None,
        }
    }

    pub(crate) fn into_strong(self) -> Option<LuaValue> {
        match self {
            SlotRef::Strong(value) => Some(value),
            SlotRef::Weak(_) => None,
        }
    }
}

impl Default for SlotRef {
    fn default() -> Self {
        SlotRef::Strong(LuaValue::Nil)
    }
}

impl std::fmt::Debug for SlotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotRef::Strong(value) => write!(f, "{:?}", value),
            SlotRef::Weak(weak) if weak.is_cleared() => write!(f, "weak(<cleared>)"),
            SlotRef::Weak(weak) => write!(f, "weak({:#x})", weak.addr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Gc;

    #[test]
    fn weak_ref_clears() {
        let table = Gc::new(LuaTable::new(0, 0));
        let slot = SlotRef::weak(LuaValue::Table(table.clone()));
        assert!(slot.raw_eq(&LuaValue::Table(table.clone())));
        drop(table);
        assert!(slot.is_cleared());
        assert!(slot.get().is_nil());
    }

    #[test]
    fn strings_stay_strong() {
        let slot = SlotRef::weak(LuaValue::string("k"));
        assert!(slot.as_strong().is_some());
    }
}
