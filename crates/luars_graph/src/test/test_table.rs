// Tests for table traversal and storage
use crate::*;

fn keys_in_order(table: &LuaTable) -> Vec<LuaValue> {
    let mut keys = Vec::new();
    let mut key = LuaValue::nil();
    while let Some((k, _)) = table.next(&key).unwrap() {
        keys.push(k.clone());
        key = k;
    }
    keys
}

#[test]
fn test_next_visits_every_key_once() {
    let mut table = LuaTable::new(0, 0);
    for i in 1..=4 {
        table.raw_set_int(i, LuaValue::integer(i));
    }
    for i in 0..20 {
        table.raw_set_str(&format!("k{i}"), LuaValue::integer(i));
    }
    table.raw_set(LuaValue::float(0.5), LuaValue::boolean(true)).unwrap();

    let keys = keys_in_order(&table);
    assert_eq!(keys.len(), 25);
    assert_eq!(table.key_count(), 25);
    // array part comes first
    assert_eq!(keys[..4], [1, 2, 3, 4].map(LuaValue::integer));
}

#[test]
fn test_next_survives_removal_of_current_key() {
    let mut table = LuaTable::new(0, 0);
    for i in 0..32 {
        table.raw_set_str(&format!("key{i}"), LuaValue::integer(i));
    }

    let mut visited = 0;
    let mut key = LuaValue::nil();
    while let Some((k, _)) = table.next(&key).unwrap() {
        visited += 1;
        table.raw_set(k.clone(), LuaValue::nil()).unwrap();
        key = k;
    }
    assert_eq!(visited, 32);
    assert_eq!(table.key_count(), 0);
    assert!(table.next(&LuaValue::nil()).unwrap().is_none());
}

#[test]
fn test_next_rejects_unknown_key() {
    let mut table = LuaTable::new(0, 0);
    table.raw_set_str("a", LuaValue::integer(1));
    assert_eq!(
        table.next(&LuaValue::string("missing")),
        Err(LuaError::InvalidNextKey)
    );
}

#[test]
fn test_overwrite_and_readd() {
    let mut table = LuaTable::new(0, 0);
    table.raw_set_str("x", LuaValue::integer(1));
    table.raw_set_str("x", LuaValue::integer(2));
    assert_eq!(table.key_count(), 1);
    assert_eq!(table.raw_get_str("x"), LuaValue::integer(2));

    table.raw_set_str("x", LuaValue::nil());
    assert!(table.raw_get_str("x").is_nil());
    table.raw_set_str("x", LuaValue::integer(3));
    assert_eq!(table.raw_get_str("x"), LuaValue::integer(3));
    assert_eq!(table.key_count(), 1);
}

#[test]
fn test_float_keys_normalize() {
    let mut table = LuaTable::new(0, 0);
    table.raw_set(LuaValue::float(2.0), LuaValue::string("two")).unwrap();
    assert_eq!(table.raw_get_int(2), LuaValue::string("two"));
    assert_eq!(table.raw_get(&LuaValue::float(2.0)), LuaValue::string("two"));
}

#[test]
fn test_rehash_keeps_bindings() {
    let mut table = LuaTable::new(0, 0);
    for i in 0..1000 {
        table.raw_set_str(&format!("k{i}"), LuaValue::integer(i));
    }
    for i in (0..1000).step_by(2) {
        table.raw_set_str(&format!("k{i}"), LuaValue::nil());
    }
    for i in 0..1000 {
        let expected = if i % 2 == 0 { LuaValue::nil() } else { LuaValue::integer(i) };
        assert_eq!(table.raw_get_str(&format!("k{i}")), expected);
    }
    assert_eq!(table.key_count(), 500);
}

#[test]
fn test_deep_chain_drops() {
    let mut head = Gc::new(LuaTable::new(0, 0));
    for _ in 0..200_000 {
        let table = Gc::new(LuaTable::new(0, 0));
        table.borrow_mut().raw_set_int(1, LuaValue::Table(head));
        head = table;
    }
    drop(head);
}
