use crate::lua_value::lua_table::{Entry, SlotRef};
use crate::lua_value::{LuaTable, LuaValue};

/// Storage policy a table derives from its metatable's `__mode` field.
///
/// The policy decides how keys and values are wrapped when they are stored.
/// Only reference kinds are ever held weakly; strings, numbers and booleans
/// stay strong under every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeakMode {
    #[default]
    Strong,
    WeakKeys,
    WeakValues,
    WeakBoth,
}

impl WeakMode {
    pub fn new(weak_keys: bool, weak_values: bool) -> Self {
        match (weak_keys, weak_values) {
            (false, false) => WeakMode::Strong,
            (true, false) => WeakMode::WeakKeys,
            (false, true) => WeakMode::WeakValues,
            (true, true) => WeakMode::WeakBoth,
        }
    }

    /// Parse a `__mode` string: `k` makes keys weak, `v` makes values weak.
    pub fn from_mode_bytes(mode: &[u8]) -> Self {
        WeakMode::new(mode.contains(&b'k'), mode.contains(&b'v'))
    }

    /// The policy a table gets when `metatable` is attached to it.
    pub fn from_metatable(metatable: &LuaTable) -> Self {
        match metatable.raw_get(&LuaValue::string("__mode")) {
            LuaValue::String(mode) => WeakMode::from_mode_bytes(mode.as_bytes()),
            _ => WeakMode::Strong,
        }
    }

    #[inline]
    pub fn use_weak_keys(self) -> bool {
        matches!(self, WeakMode::WeakKeys | WeakMode::WeakBoth)
    }

    #[inline]
    pub fn use_weak_values(self) -> bool {
        matches!(self, WeakMode::WeakValues | WeakMode::WeakBoth)
    }

    /// Wrap a value for array storage or a value cell.
    pub fn wrap(self, value: LuaValue) -> SlotRef {
        if self.use_weak_values() {
            SlotRef::weak(value)
        } else {
            SlotRef::strong(value)
        }
    }

    fn wrap_key(self, key: LuaValue) -> SlotRef {
        if self.use_weak_keys() {
            SlotRef::weak(key)
        } else {
            SlotRef::strong(key)
        }
    }

    /// Build a fresh binding for the hash region.
    pub fn entry(self, key: LuaValue, value: LuaValue) -> Entry {
        let hash = key.key_hash();
        Entry::new(self.wrap_key(key), self.wrap(value), hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode() {
        assert_eq!(WeakMode::from_mode_bytes(b"k"), WeakMode::WeakKeys);
        assert_eq!(WeakMode::from_mode_bytes(b"v"), WeakMode::WeakValues);
        assert_eq!(WeakMode::from_mode_bytes(b"kv"), WeakMode::WeakBoth);
        assert_eq!(WeakMode::from_mode_bytes(b""), WeakMode::Strong);
    }

    #[test]
    fn scalars_stay_strong() {
        let entry = WeakMode::WeakBoth.entry(LuaValue::integer(1), LuaValue::string("v"));
        assert!(entry.key_ref().as_strong().is_some());
        assert!(entry.value_ref().as_strong().is_some());
    }

    #[test]
    fn mode_from_metatable() {
        let mut metatable = LuaTable::new(0, 1);
        metatable
            .raw_set(LuaValue::string("__mode"), LuaValue::string("v"))
            .unwrap();
        assert_eq!(WeakMode::from_metatable(&metatable), WeakMode::WeakValues);
    }
}
