// Hybrid table: a dense array region for integer keys 1..=N plus a hash
// region of chained slots for everything else. The storage policy (strong,
// weak keys, weak values, both) follows the metatable's `__mode`.
mod metatable;
mod slot;
mod value_array;
mod weak_ref;

use std::fmt;

use tracing::trace;

use crate::lua_state::{LuaError, LuaResult};
use crate::lua_value::{LuaValue, TableRef};

pub use metatable::WeakMode;
pub use slot::{DeadSlot, Entry, Slot, SlotIter};
pub use value_array::ValueArray;
pub use weak_ref::{SlotRef, WeakValue};

const MIN_HASH_CAPACITY: usize = 4;

fn hash_capacity_for(entries: usize) -> usize {
    if entries == 0 {
        0
    } else {
        entries.next_power_of_two().max(MIN_HASH_CAPACITY)
    }
}

fn empty_buckets(capacity: usize) -> Vec<Option<Slot>> {
    let mut buckets = Vec::with_capacity(capacity);
    buckets.resize_with(capacity, || None);
    buckets
}

pub struct LuaTable {
    array: ValueArray,
    /// Power-of-two bucket array, or empty.
    hash: Vec<Option<Slot>>,
    /// Live bindings added to the hash region since the last rehash,
    /// minus removals. Collected weak bindings are only subtracted on rehash.
    hash_entries: usize,
    metatable: Option<TableRef>,
    mode: WeakMode,
}

impl LuaTable {
    pub fn new(narray: usize, nhash: usize) -> Self {
        LuaTable {
            array: ValueArray::new(narray),
            hash: empty_buckets(hash_capacity_for(nhash)),
            hash_entries: 0,
            metatable: None,
            mode: WeakMode::Strong,
        }
    }

    pub fn array_capacity(&self) -> usize {
        self.array.len()
    }

    pub fn hash_capacity(&self) -> usize {
        self.hash.len()
    }

    pub fn weak_mode(&self) -> WeakMode {
        self.mode
    }

    /// Nodes in the hash region, tombstones included.
    pub fn hash_slot_count(&self) -> usize {
        self.hash.iter().flatten().map(|head| head.iter().count()).sum()
    }

    pub fn array(&self) -> &ValueArray {
        &self.array
    }

    /// Bucket heads of the hash region.
    pub fn buckets(&self) -> &[Option<Slot>] {
        &self.hash
    }

    #[inline]
    fn bucket_of(&self, key: &LuaValue) -> usize {
        key.key_hash() as usize & (self.hash.len() - 1)
    }

    // ============ Raw access ============

    /// Primitive get. Absent keys, collected weak bindings and invalid keys
    /// all read as nil.
    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        if let Some(index) = key.array_index(self.array.len()) {
            return self.array.get(index);
        }
        self.hash_get(key)
    }

    pub fn raw_get_int(&self, key: i64) -> LuaValue {
        self.raw_get(&LuaValue::integer(key))
    }

    pub fn raw_get_str(&self, key: &str) -> LuaValue {
        self.raw_get(&LuaValue::string(key))
    }

    fn hash_get(&self, key: &LuaValue) -> LuaValue {
        if self.hash.is_empty() || key.is_nil() {
            return LuaValue::Nil;
        }
        self.hash[self.bucket_of(key)]
            .as_ref()
            .and_then(|head| head.find(key))
            .map(Entry::value)
            .unwrap_or_default()
    }

    /// Primitive set. A nil value removes the binding. Nil and NaN keys are
    /// rejected unless the value is nil too.
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        if key.is_nil() || key.is_nan() {
            if value.is_nil() {
                return Ok(());
            }
            return Err(LuaError::InvalidKey(if key.is_nil() { "nil" } else { "NaN" }));
        }
        let key = key.normalize_key();
        if let LuaValue::Integer(i) = key {
            if self.array_set(i, &value) {
                return Ok(());
            }
        }
        if value.is_nil() {
            self.hash_remove(&key);
        } else {
            self.hash_set(key, value);
        }
        Ok(())
    }

    pub fn raw_set_int(&mut self, key: i64, value: LuaValue) {
        // integer keys are never invalid
        let _ = self.raw_set(LuaValue::integer(key), value);
    }

    pub fn raw_set_str(&mut self, key: &str, value: LuaValue) {
        let _ = self.raw_set(LuaValue::string(key), value);
    }

    fn array_set(&mut self, key: i64, value: &LuaValue) -> bool {
        let capacity = self.array.len();
        if key < 1 {
            return false;
        }
        let key = key as u64;
        if key <= capacity as u64 {
            self.array.set(key as usize - 1, self.mode.wrap(value.clone()));
            true
        } else if key == capacity as u64 + 1 && !value.is_nil() {
            self.expand_array();
            self.array.set(capacity, self.mode.wrap(value.clone()));
            true
        } else {
            false
        }
    }

    /// Double the array region, pulling the integer keys it now covers out
    /// of the hash region.
    fn expand_array(&mut self) {
        let old_capacity = self.array.len();
        let new_capacity = (old_capacity * 2).max(2);
        self.array.grow_to(new_capacity);
        if self.hash_entries > 0 {
            for index in old_capacity..new_capacity {
                let key = LuaValue::integer(index as i64 + 1);
                if let Some(value) = self.hash_remove(&key) {
                    self.array.set(index, value);
                }
            }
        }
        trace!(old_capacity, new_capacity, "table array region grown");
    }

    fn hash_set(&mut self, key: LuaValue, value: LuaValue) {
        if !self.hash.is_empty() {
            let index = self.bucket_of(&key);
            let bound = self.hash[index]
                .as_ref()
                .is_some_and(|head| head.find(&key).is_some());
            if bound {
                if let Some(head) = self.hash[index].take() {
                    self.hash[index] = Some(head.set(&key, self.mode.wrap(value)));
                }
                return;
            }
        }
        if self.hash_entries >= self.hash.len() {
            self.rehash();
        }
        let slot = Slot::Entry(self.mode.entry(key, value));
        let index = slot.keyindex(self.hash.len() - 1);
        self.hash[index] = Some(match self.hash[index].take() {
            Some(head) => head.add(slot),
            None => slot,
        });
        self.hash_entries += 1;
    }

    /// Tombstone the binding for `key`, returning what it held.
    fn hash_remove(&mut self, key: &LuaValue) -> Option<SlotRef> {
        if self.hash.is_empty() {
            return None;
        }
        let index = self.bucket_of(key);
        let removed = self.hash[index].as_ref()?.find(key)?.value_ref().clone();
        if let Some(head) = self.hash[index].take() {
            self.hash[index] = Some(head.remove(key));
        }
        self.hash_entries = self.hash_entries.saturating_sub(1);
        Some(removed)
    }

    /// Resize the hash region for its live bindings plus one, dropping
    /// tombstones and collected weak bindings.
    fn rehash(&mut self) {
        let old = std::mem::take(&mut self.hash);
        let live = old
            .iter()
            .flatten()
            .flat_map(Slot::iter)
            .filter(|slot| slot.first_entry().is_some_and(Entry::is_live))
            .count();
        let capacity = hash_capacity_for(live + 1);
        let mask = capacity - 1;
        let mut buckets = empty_buckets(capacity);
        for slot in old.iter().flatten().flat_map(Slot::iter) {
            if let Some(entry) = slot.first_entry() {
                let index = entry.keyindex(mask);
                buckets[index] = slot.relink(buckets[index].take());
            }
        }
        trace!(old_capacity = old.len(), capacity, live, "table hash region rehashed");
        self.hash = buckets;
        self.hash_entries = live;
    }

    // ============ Traversal ============

    /// The binding after `key` in traversal order, or `None` past the last.
    /// A nil key starts the traversal. Keys removed since they were returned
    /// are still valid positions.
    pub fn next(&self, key: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        let array_len = self.array.len();
        let array_start = if key.is_nil() {
            0
        } else if let Some(index) = key.array_index(array_len) {
            index + 1
        } else {
            return self.next_in_hash(key);
        };
        for index in array_start..array_len {
            let value = self.array.get(index);
            if !value.is_nil() {
                return Ok(Some((LuaValue::integer(index as i64 + 1), value)));
            }
        }
        Ok(self.scan_buckets(0))
    }

    fn next_in_hash(&self, key: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        if self.hash.is_empty() {
            return Err(LuaError::InvalidNextKey);
        }
        let bucket = self.bucket_of(key);
        let head = self.hash[bucket].as_ref().ok_or(LuaError::InvalidNextKey)?;
        // Prefer a live binding over a tombstone of the same key.
        let position = head
            .iter()
            .find(|slot| !slot.is_dead() && slot.keyeq(key))
            .or_else(|| head.iter().find(|slot| slot.keyeq(key)))
            .ok_or(LuaError::InvalidNextKey)?;
        let in_chain = position
            .rest()
            .into_iter()
            .flat_map(Slot::iter)
            .find_map(|slot| slot.first_entry().and_then(Entry::pair));
        match in_chain {
            Some(pair) => Ok(Some(pair)),
            None => Ok(self.scan_buckets(bucket + 1)),
        }
    }

    fn scan_buckets(&self, from: usize) -> Option<(LuaValue, LuaValue)> {
        self.hash
            .iter()
            .skip(from)
            .flatten()
            .flat_map(Slot::iter)
            .find_map(|slot| slot.first_entry().and_then(Entry::pair))
    }

    pub fn iter(&self) -> LuaTableIter<'_> {
        LuaTableIter {
            table: self,
            array_pos: 0,
            bucket: 0,
            node: None,
        }
    }

    /// A border: `t[n]` non-nil and `t[n + 1]` nil (or zero when `t[1]` is nil).
    pub fn length(&self) -> usize {
        let capacity = self.array.len();
        if capacity > 0 && self.array.is_nil(capacity - 1) {
            // a[lo] non-nil (or lo == 0), a[hi] nil; 1-based
            let (mut lo, mut hi) = (0usize, capacity);
            while hi - lo > 1 {
                let mid = (lo + hi) / 2;
                if self.array.is_nil(mid - 1) {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            return lo;
        }
        if self.hash_entries == 0 {
            return capacity;
        }
        let is_nil = |n: usize| self.raw_get_int(n as i64).is_nil();
        let (mut i, mut j) = (capacity, capacity + 1);
        while !is_nil(j) {
            i = j;
            if j > (i64::MAX as usize) / 2 {
                // pathological; fall back to a linear scan
                let mut n = 1;
                while !is_nil(n) {
                    n += 1;
                }
                return n - 1;
            }
            j *= 2;
        }
        while j - i > 1 {
            let mid = (i + j) / 2;
            if is_nil(mid) {
                j = mid;
            } else {
                i = mid;
            }
        }
        i
    }

    /// Number of live bindings.
    pub fn key_count(&self) -> usize {
        self.iter().count()
    }

    // ============ Metatable ============

    pub fn get_metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    /// Attach or detach a metatable. The storage policy is re-derived from
    /// the metatable's `__mode` and existing bindings are re-wrapped.
    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        let mode = match &metatable {
            None => WeakMode::Strong,
            Some(mt) if std::ptr::eq(mt.as_ptr(), &*self) => WeakMode::from_metatable(self),
            Some(mt) => WeakMode::from_metatable(&mt.borrow()),
        };
        self.metatable = metatable;
        if mode != self.mode {
            self.change_mode(mode);
        }
    }

    fn change_mode(&mut self, mode: WeakMode) {
        trace!(from = ?self.mode, to = ?mode, "table storage policy changed");
        self.mode = mode;
        self.array.rewrap(mode);
        let pairs: Vec<(LuaValue, LuaValue)> = self
            .hash
            .iter()
            .flatten()
            .flat_map(Slot::iter)
            .filter_map(|slot| slot.first_entry().and_then(Entry::pair))
            .collect();
        self.hash = empty_buckets(hash_capacity_for(pairs.len()));
        self.hash_entries = 0;
        for (key, value) in pairs {
            self.hash_set(key, value);
        }
    }

    fn take_children(&mut self, out: &mut Vec<LuaValue>) {
        self.array.drain_into(out);
        for head in std::mem::take(&mut self.hash).into_iter().flatten() {
            head.drain_into(out);
        }
        if let Some(metatable) = self.metatable.take() {
            out.push(LuaValue::Table(metatable));
        }
    }
}

impl Default for LuaTable {
    fn default() -> Self {
        LuaTable::new(0, 0)
    }
}

// Nested tables are released with an explicit work list so a long chain
// of single-owner tables cannot overflow the stack.
impl Drop for LuaTable {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(value) = pending.pop() {
            if let LuaValue::Table(table) = value {
                if let Ok(mut inner) = table.try_unwrap() {
                    inner.take_children(&mut pending);
                }
            }
        }
    }
}

impl fmt::Debug for LuaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaTable")
            .field("array_capacity", &self.array.len())
            .field("hash_capacity", &self.hash.len())
            .field("mode", &self.mode)
            .finish()
    }
}

pub struct LuaTableIter<'a> {
    table: &'a LuaTable,
    array_pos: usize,
    bucket: usize,
    node: Option<&'a Slot>,
}

impl<'a> Iterator for LuaTableIter<'a> {
    type Item = (LuaValue, LuaValue);

    fn next(&mut self) -> Option<Self::Item> {
        while self.array_pos < self.table.array.len() {
            let index = self.array_pos;
            self.array_pos += 1;
            let value = self.table.array.get(index);
            if !value.is_nil() {
                return Some((LuaValue::integer(index as i64 + 1), value));
            }
        }
        loop {
            if let Some(slot) = self.node {
                self.node = slot.rest();
                if let Some(pair) = slot.first_entry().and_then(Entry::pair) {
                    return Some(pair);
                }
                continue;
            }
            let head = self.table.hash.get(self.bucket)?;
            self.bucket += 1;
            self.node = head.as_ref();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_array() {
        let mut table = LuaTable::new(0, 0);
        for i in 1..=5 {
            table.raw_set_int(i, LuaValue::integer(i * 10));
        }
        assert_eq!(table.array_capacity(), 8);
        assert_eq!(table.hash_capacity(), 0);
        assert_eq!(table.length(), 5);
    }

    #[test]
    fn growth_migrates_hash_keys() {
        let mut table = LuaTable::new(0, 0);
        table.raw_set_int(3, LuaValue::integer(3));
        table.raw_set_int(4, LuaValue::integer(4));
        assert_eq!(table.array_capacity(), 0);
        table.raw_set_int(1, LuaValue::integer(1));
        table.raw_set_int(2, LuaValue::integer(2));
        table.raw_set_int(3, LuaValue::integer(30));
        assert_eq!(table.array_capacity(), 4);
        assert_eq!(table.raw_get_int(3), LuaValue::integer(30));
        assert_eq!(table.raw_get_int(4), LuaValue::integer(4));
        assert_eq!(table.key_count(), 4);
    }

    #[test]
    fn invalid_keys() {
        let mut table = LuaTable::new(0, 0);
        assert_eq!(
            table.raw_set(LuaValue::nil(), LuaValue::integer(1)),
            Err(LuaError::InvalidKey("nil"))
        );
        assert_eq!(
            table.raw_set(LuaValue::float(f64::NAN), LuaValue::integer(1)),
            Err(LuaError::InvalidKey("NaN"))
        );
        assert_eq!(table.raw_set(LuaValue::nil(), LuaValue::nil()), Ok(()));
    }

    #[test]
    fn length_border_in_hash() {
        let mut table = LuaTable::new(0, 0);
        table.raw_set(LuaValue::string("x"), LuaValue::boolean(true)).unwrap();
        table.raw_set_int(1, LuaValue::integer(1));
        table.raw_set_int(2, LuaValue::integer(2));
        table.raw_set_int(3, LuaValue::integer(3));
        assert_eq!(table.length(), 3);
    }

    #[test]
    fn self_metatable() {
        let table = crate::gc::Gc::new(LuaTable::new(0, 0));
        table.borrow_mut().raw_set_str("__mode", LuaValue::string("k"));
        let metatable = table.clone();
        table.borrow_mut().set_metatable(Some(metatable));
        assert_eq!(table.borrow().weak_mode(), WeakMode::WeakKeys);
        // break the cycle
        table.borrow_mut().set_metatable(None);
    }
}
