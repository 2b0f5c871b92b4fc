use crate::lua_value::LuaValue;
use crate::lua_value::lua_table::{SlotRef, WeakMode};

/// Dense array region. Index `i` holds the value for integer key `i + 1`;
/// an absent key is a nil cell.
#[derive(Debug, Default, Clone)]
pub struct ValueArray {
    cells: Vec<SlotRef>,
}

impl ValueArray {
    pub fn new(capacity: usize) -> Self {
        let mut cells = Vec::with_capacity(capacity);
        cells.resize_with(capacity, SlotRef::default);
        ValueArray { cells }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> LuaValue {
        self.cells.get(index).map(SlotRef::get).unwrap_or_default()
    }

    #[inline]
    pub fn is_nil(&self, index: usize) -> bool {
        self.cells.get(index).is_none_or(SlotRef::is_nil)
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: SlotRef) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = value;
        }
    }

    pub fn grow_to(&mut self, capacity: usize) {
        if capacity > self.cells.len() {
            self.cells.resize_with(capacity, SlotRef::default);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SlotRef> {
        self.cells.iter()
    }

    /// Re-wrap every cell under a new storage policy.
    pub fn rewrap(&mut self, mode: WeakMode) {
        for cell in self.cells.iter_mut() {
            let value = cell.get();
            *cell = mode.wrap(value);
        }
    }

    pub(crate) fn drain_into(&mut self, out: &mut Vec<LuaValue>) {
        out.extend(self.cells.drain(..).filter_map(SlotRef::into_strong));
    }
}
