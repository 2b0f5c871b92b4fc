// Hash-region bucket chains.
//
// A bucket holds a singly linked chain of slots. A slot is a live binding
// (`Entry`), a live binding with a successor (`Link`), or a tombstone
// (`Dead`) left behind by a removal. Tombstones keep their key so `next`
// can still resume from a key removed mid-iteration. Chains are rebuilt by
// value: every mutating operation consumes the head and returns the new one.
use crate::lua_value::LuaValue;
use crate::lua_value::lua_table::SlotRef;

#[derive(Clone, Debug)]
pub struct Entry {
    key: SlotRef,
    value: SlotRef,
    hash: u64,
}

impl Entry {
    pub fn new(key: SlotRef, value: SlotRef, hash: u64) -> Self {
        Entry { key, value, hash }
    }

    pub fn key(&self) -> LuaValue {
        self.key.get()
    }

    pub fn value(&self) -> LuaValue {
        self.value.get()
    }

    pub fn key_ref(&self) -> &SlotRef {
        &self.key
    }

    pub fn value_ref(&self) -> &SlotRef {
        &self.value
    }

    pub fn set_value(&mut self, value: SlotRef) {
        self.value = value;
    }

    #[inline]
    pub fn keyeq(&self, key: &LuaValue) -> bool {
        self.key.raw_eq(key)
    }

    #[inline]
    pub fn keyindex(&self, mask: usize) -> usize {
        self.hash as usize & mask
    }

    /// Both halves still present.
    pub fn is_live(&self) -> bool {
        !self.key.is_cleared() && !self.value.is_nil()
    }

    /// The binding as a key/value pair, if it is live.
    pub fn pair(&self) -> Option<(LuaValue, LuaValue)> {
        let key = self.key.get();
        let value = self.value.get();
        if key.is_nil() || value.is_nil() {
            None
        } else {
            Some((key, value))
        }
    }
}

/// Tombstone of a removed binding. The key is held weakly when it is a
/// reference kind; a tombstone whose key has been collected can be spliced
/// out by any operation that walks past it.
#[derive(Clone, Debug)]
pub struct DeadSlot {
    key: SlotRef,
    hash: u64,
    rest: Option<Box<Slot>>,
}

impl DeadSlot {
    fn new(key: SlotRef, hash: u64, rest: Option<Box<Slot>>) -> Self {
        DeadSlot {
            key: key.downgrade(),
            hash,
            rest,
        }
    }

    pub fn key(&self) -> LuaValue {
        self.key.get()
    }

    pub fn is_cleared(&self) -> bool {
        self.key.is_cleared()
    }
}

#[derive(Clone, Debug)]
pub enum Slot {
    Entry(Entry),
    Link(Entry, Box<Slot>),
    Dead(DeadSlot),
}

impl Slot {
    pub fn keyindex(&self, mask: usize) -> usize {
        match self {
            Slot::Entry(entry) | Slot::Link(entry, _) => entry.keyindex(mask),
            Slot::Dead(dead) => dead.hash as usize & mask,
        }
    }

    /// Key identity test. Tombstones match the key they were removed under.
    pub fn keyeq(&self, key: &LuaValue) -> bool {
        match self {
            Slot::Entry(entry) | Slot::Link(entry, _) => entry.keyeq(key),
            Slot::Dead(dead) => dead.key.raw_eq(key),
        }
    }

    /// The live binding at this node, if it is not a tombstone.
    pub fn first_entry(&self) -> Option<&Entry> {
        match self {
            Slot::Entry(entry) | Slot::Link(entry, _) => Some(entry),
            Slot::Dead(_) => None,
        }
    }

    pub fn rest(&self) -> Option<&Slot> {
        match self {
            Slot::Entry(_) => None,
            Slot::Link(_, rest) => Some(&**rest),
            Slot::Dead(dead) => dead.rest.as_deref(),
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Slot::Dead(_))
    }

    /// Walk the chain node by node, tombstones included.
    pub fn iter(&self) -> SlotIter<'_> {
        SlotIter { next: Some(self) }
    }

    /// The live binding for `key`. Tombstones never satisfy a lookup.
    pub fn find(&self, key: &LuaValue) -> Option<&Entry> {
        self.iter()
            .filter_map(Slot::first_entry)
            .find(|entry| entry.keyeq(key))
    }

    /// Replace the value bound to `key`, which must be live in this chain.
    /// Tombstones with collected keys encountered on the way are dropped.
    pub fn set(self, key: &LuaValue, value: SlotRef) -> Slot {
        match self {
            Slot::Entry(mut entry) => {
                if entry.keyeq(key) {
                    entry.value = value;
                }
                Slot::Entry(entry)
            }
            Slot::Link(mut entry, rest) => {
                if entry.keyeq(key) {
                    entry.value = value;
                    Slot::Link(entry, rest)
                } else {
                    Slot::Link(entry, Box::new(rest.set(key, value)))
                }
            }
            Slot::Dead(DeadSlot {
                key: dead_key,
                hash,
                rest,
            }) => {
                let rest = rest.map(|rest| Box::new(rest.set(key, value)));
                match rest {
                    Some(rest) if dead_key.is_cleared() => *rest,
                    rest => Slot::Dead(DeadSlot {
                        key: dead_key,
                        hash,
                        rest,
                    }),
                }
            }
        }
    }

    /// Append `new_slot` at the tail. Tombstones and bindings whose key has
    /// been collected are dropped along the way.
    pub fn add(self, new_slot: Slot) -> Slot {
        match self {
            Slot::Entry(entry) => {
                if entry.key.is_cleared() {
                    new_slot
                } else {
                    Slot::Link(entry, Box::new(new_slot))
                }
            }
            Slot::Link(entry, rest) => {
                let rest = rest.add(new_slot);
                if entry.key.is_cleared() {
                    rest
                } else {
                    Slot::Link(entry, Box::new(rest))
                }
            }
            Slot::Dead(dead) => match dead.rest {
                Some(rest) => rest.add(new_slot),
                None => new_slot,
            },
        }
    }

    /// Turn the binding for `key` into a tombstone that keeps its successor.
    /// Tombstones of collected keys met on the way are spliced out.
    pub fn remove(self, key: &LuaValue) -> Slot {
        match self {
            Slot::Entry(entry) => {
                if entry.keyeq(key) {
                    Slot::Dead(DeadSlot::new(entry.key, entry.hash, None))
                } else {
                    Slot::Entry(entry)
                }
            }
            Slot::Link(entry, rest) => {
                if entry.keyeq(key) {
                    Slot::Dead(DeadSlot::new(entry.key, entry.hash, Some(rest)))
                } else {
                    Slot::Link(entry, Box::new(rest.remove(key)))
                }
            }
            Slot::Dead(DeadSlot {
                key: dead_key,
                hash,
                rest,
            }) => {
                let rest = rest.map(|rest| Box::new(rest.remove(key)));
                match rest {
                    Some(rest) if dead_key.is_cleared() => *rest,
                    rest => Slot::Dead(DeadSlot {
                        key: dead_key,
                        hash,
                        rest,
                    }),
                }
            }
        }
    }

    /// Copy this node's binding in front of `rest`. Tombstones and
    /// half-collected bindings are not carried over. `self` is untouched.
    pub fn relink(&self, rest: Option<Slot>) -> Option<Slot> {
        match self.first_entry() {
            Some(entry) if entry.is_live() => Some(match rest {
                Some(rest) => Slot::Link(entry.clone(), Box::new(rest)),
                None => Slot::Entry(entry.clone()),
            }),
            _ => rest,
        }
    }

    /// Consume the chain, collecting its strongly held keys and values.
    pub(crate) fn drain_into(self, out: &mut Vec<LuaValue>) {
        let mut current = Some(self);
        while let Some(slot) = current {
            current = match slot {
                Slot::Entry(entry) => {
                    out.extend(entry.key.into_strong());
                    out.extend(entry.value.into_strong());
                    None
                }
                Slot::Link(entry, rest) => {
                    out.extend(entry.key.into_strong());
                    out.extend(entry.value.into_strong());
                    Some(*rest)
                }
                Slot::Dead(dead) => dead.rest.map(|rest| *rest),
            };
        }
    }
}

pub struct SlotIter<'a> {
    next: Option<&'a Slot>,
}

impl<'a> Iterator for SlotIter<'a> {
    type Item = &'a Slot;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        self.next = slot.rest();
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: i64, value: i64) -> Slot {
        let key = LuaValue::integer(key);
        let hash = key.key_hash();
        Slot::Entry(Entry::new(
            SlotRef::strong(key),
            SlotRef::strong(LuaValue::integer(value)),
            hash,
        ))
    }

    fn chain(keys: &[i64]) -> Slot {
        let mut iter = keys.iter();
        let mut head = entry(*iter.next().unwrap(), 0);
        for &k in iter {
            head = head.add(entry(k, k * 10));
        }
        head
    }

    #[test]
    fn find_walks_chain() {
        let head = chain(&[1, 2, 3]);
        assert_eq!(head.iter().count(), 3);
        assert_eq!(head.find(&LuaValue::integer(3)).unwrap().value(), LuaValue::integer(30));
        assert!(head.find(&LuaValue::integer(4)).is_none());
    }

    #[test]
    fn remove_leaves_tombstone_with_successor() {
        let head = chain(&[1, 2, 3]).remove(&LuaValue::integer(2));
        assert_eq!(head.iter().count(), 3);
        assert!(head.find(&LuaValue::integer(2)).is_none());
        let dead = head.iter().find(|slot| slot.keyeq(&LuaValue::integer(2))).unwrap();
        assert!(dead.is_dead());
        assert!(dead.rest().unwrap().keyeq(&LuaValue::integer(3)));
    }

    #[test]
    fn add_drops_tombstones() {
        let head = chain(&[1, 2]).remove(&LuaValue::integer(1)).add(entry(5, 50));
        assert_eq!(head.iter().count(), 2);
        assert!(head.iter().all(|slot| !slot.is_dead()));
    }

    #[test]
    fn set_keeps_live_tombstones() {
        let head = chain(&[1, 2])
            .remove(&LuaValue::integer(1))
            .set(&LuaValue::integer(2), SlotRef::strong(LuaValue::integer(7)));
        assert!(head.is_dead());
        assert_eq!(head.find(&LuaValue::integer(2)).unwrap().value(), LuaValue::integer(7));
    }

    #[test]
    fn relink_skips_dead() {
        let head = chain(&[1, 2]).remove(&LuaValue::integer(1));
        let mut rebuilt = None;
        for slot in head.iter() {
            rebuilt = slot.relink(rebuilt);
        }
        let rebuilt = rebuilt.unwrap();
        assert_eq!(rebuilt.iter().count(), 1);
        assert!(rebuilt.find(&LuaValue::integer(2)).is_some());
    }
}
