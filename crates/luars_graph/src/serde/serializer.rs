use std::collections::HashSet;

use serde_json::{Map, Number, Value as JsonValue};

use crate::lua_value::{LuaTable, LuaValue};
use crate::serde::JsonError;

pub fn to_value(value: &LuaValue) -> Result<JsonValue, JsonError> {
    let mut visited = HashSet::new();
    to_value_internal(value, &mut visited)
}

pub fn to_string(value: &LuaValue, pretty: bool) -> Result<String, JsonError> {
    let json = to_value(value)?;
    let text = if pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    Ok(text)
}

fn to_value_internal(value: &LuaValue, visited: &mut HashSet<usize>) -> Result<JsonValue, JsonError> {
    match value {
        LuaValue::Nil => Ok(JsonValue::Null),
        LuaValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        LuaValue::Integer(i) => Ok(JsonValue::Number(Number::from(*i))),
        LuaValue::Float(n) => Number::from_f64(*n)
            .map(JsonValue::Number)
            .ok_or(JsonError::InvalidNumber(*n)),
        LuaValue::String(s) => Ok(JsonValue::String(String::from_utf8_lossy(s.as_bytes()).into_owned())),
        LuaValue::Table(table) => {
            // Tables on the current path; shared (non-cyclic) subtables are fine.
            if !visited.insert(table.addr()) {
                return Err(JsonError::Cycle);
            }
            let result = {
                let table = table.borrow();
                if is_array_like(&table) {
                    table_to_json_array(&table, visited)
                } else {
                    table_to_json_object(&table, visited)
                }
            };
            visited.remove(&table.addr());
            result
        }
        other => Err(JsonError::Unsupported(other.type_name())),
    }
}

fn is_array_like(table: &LuaTable) -> bool {
    let len = table.length();
    let mut count = 0usize;
    for (key, _) in table.iter() {
        match key.as_integer() {
            Some(i) if i >= 1 && (i as usize) <= len => count += 1,
            _ => return false,
        }
    }
    count == len
}

fn table_to_json_array(table: &LuaTable, visited: &mut HashSet<usize>) -> Result<JsonValue, JsonError> {
    let len = table.length();
    let mut array = Vec::with_capacity(len);
    for i in 1..=len {
        array.push(to_value_internal(&table.raw_get_int(i as i64), visited)?);
    }
    Ok(JsonValue::Array(array))
}

fn table_to_json_object(table: &LuaTable, visited: &mut HashSet<usize>) -> Result<JsonValue, JsonError> {
    let mut object = Map::new();
    for (key, value) in table.iter() {
        let key = match &key {
            LuaValue::String(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
            LuaValue::Integer(_) | LuaValue::Float(_) | LuaValue::Boolean(_) => key.to_string(),
            // no JSON key form
            _ => continue,
        };
        object.insert(key, to_value_internal(&value, visited)?);
    }
    Ok(JsonValue::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Gc;

    #[test]
    fn array_and_object() {
        let mut list = LuaTable::new(0, 0);
        list.raw_set_int(1, LuaValue::integer(1));
        list.raw_set_int(2, LuaValue::string("two"));
        assert_eq!(to_value(&LuaValue::Table(Gc::new(list))).unwrap(), serde_json::json!([1, "two"]));

        let mut map = LuaTable::new(0, 0);
        map.raw_set_str("name", LuaValue::string("lua"));
        assert_eq!(to_value(&LuaValue::Table(Gc::new(map))).unwrap(), serde_json::json!({"name": "lua"}));
    }

    #[test]
    fn cycle_is_rejected() {
        let table = Gc::new(LuaTable::new(0, 0));
        table.borrow_mut().raw_set_str("self", LuaValue::Table(table.clone()));
        assert!(matches!(to_value(&LuaValue::Table(table.clone())), Err(JsonError::Cycle)));
        table.borrow_mut().raw_set_str("self", LuaValue::nil());
    }
}
