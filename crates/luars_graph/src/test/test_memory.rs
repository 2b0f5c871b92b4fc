// Tests for memory accounting
use crate::memory::{AllocatedObject, OBJECT_SIZE};
use crate::*;

fn shallow(table: &Gc<LuaTable>) -> u64 {
    table.borrow().shallow_size()
}

#[test]
fn test_shared_subtable_counted_once() {
    let state = LuaState::new();
    let shared = Gc::new(LuaTable::new(0, 0));
    let root = Gc::new(LuaTable::new(0, 0));
    for i in 1..=3 {
        root.borrow_mut()
            .raw_set_int(i, LuaValue::Table(shared.clone()));
    }

    let used = MemoryCounter::count_value(&state, &LuaValue::Table(root.clone()));
    assert_eq!(used, shallow(&root) + shallow(&shared));
    assert_eq!(shallow(&shared), OBJECT_SIZE);
}

#[test]
fn test_each_subtable_counted_once() {
    let state = LuaState::new();
    let subtables: Vec<_> = (0..3).map(|_| Gc::new(LuaTable::new(0, 0))).collect();
    for (i, sub) in subtables.iter().enumerate() {
        sub.borrow_mut().raw_set_int(1, LuaValue::integer(i as i64));
    }
    let root = Gc::new(LuaTable::new(0, 0));
    for (i, sub) in subtables.iter().chain(subtables.iter()).enumerate() {
        root.borrow_mut()
            .raw_set_int(i as i64 + 1, LuaValue::Table(sub.clone()));
    }

    let used = MemoryCounter::count_value(&state, &LuaValue::Table(root.clone()));
    let expected: u64 = shallow(&root) + subtables.iter().map(shallow).sum::<u64>();
    assert_eq!(used, expected);
}

#[test]
fn test_cycle_terminates() {
    let state = LuaState::new();
    let a = Gc::new(LuaTable::new(0, 0));
    let b = Gc::new(LuaTable::new(0, 0));
    a.borrow_mut().raw_set_int(1, LuaValue::Table(b.clone()));
    b.borrow_mut().raw_set_int(1, LuaValue::Table(a.clone()));

    let used = MemoryCounter::count_value(&state, &LuaValue::Table(a.clone()));
    assert_eq!(used, shallow(&a) + shallow(&b));

    b.borrow_mut().raw_set_int(1, LuaValue::nil());
}

#[test]
fn test_repeated_counts_agree() {
    let state = LuaState::new();
    let root = Gc::new(LuaTable::new(0, 0));
    root.borrow_mut()
        .raw_set_str("a", LuaValue::Table(Gc::new(LuaTable::new(0, 0))));
    let value = LuaValue::Table(root);

    let first = MemoryCounter::count_value(&state, &value);
    let second = MemoryCounter::count_value(&state, &value);
    assert_eq!(first, second);
}

#[test]
fn test_deep_chain_is_bounded() {
    let state = LuaState::new();
    let mut expected = 0;
    let mut head = Gc::new(LuaTable::new(0, 0));
    expected += shallow(&head);
    for _ in 0..100_000 {
        let table = Gc::new(LuaTable::new(0, 0));
        table.borrow_mut().raw_set_int(1, LuaValue::Table(head));
        expected += shallow(&table);
        head = table;
    }

    let used = MemoryCounter::count_value(&state, &LuaValue::Table(head));
    assert_eq!(used, expected);
}

#[test]
fn test_weak_values_not_counted() {
    let state = LuaState::new();
    let metatable = Gc::new(LuaTable::new(0, 0));
    metatable
        .borrow_mut()
        .raw_set_str("__mode", LuaValue::string("v"));
    let table = Gc::new(LuaTable::new(0, 0));
    table.borrow_mut().set_metatable(Some(metatable.clone()));
    let held = Gc::new(LuaTable::new(0, 0));
    held.borrow_mut().raw_set_int(1, LuaValue::integer(1));
    table
        .borrow_mut()
        .raw_set_int(1, LuaValue::Table(held.clone()));

    let used = MemoryCounter::count_value(&state, &LuaValue::Table(table.clone()));
    let mode_string = OBJECT_SIZE + 6 + OBJECT_SIZE + 1;
    assert_eq!(used, shallow(&table) + shallow(&metatable) + mode_string);
}

#[test]
fn test_state_count_includes_globals() {
    let state = LuaState::new();
    let empty = MemoryCounter::count(&state);
    state.globals().borrow_mut().raw_set_str(
        "big",
        LuaValue::string(&"x".repeat(100)),
    );
    let grown = MemoryCounter::count(&state);
    assert!(grown >= empty + 100);
}
