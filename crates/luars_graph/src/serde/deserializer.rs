use serde_json::Value as JsonValue;

use crate::gc::Gc;
use crate::lua_value::{LuaTable, LuaValue};
use crate::serde::JsonError;

pub fn from_value(json: &JsonValue) -> LuaValue {
    match json {
        JsonValue::Null => LuaValue::Nil,
        JsonValue::Bool(b) => LuaValue::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => LuaValue::string(s),
        JsonValue::Array(items) => {
            let mut table = LuaTable::new(items.len(), 0);
            for (i, item) in items.iter().enumerate() {
                table.raw_set_int(i as i64 + 1, from_value(item));
            }
            LuaValue::Table(Gc::new(table))
        }
        JsonValue::Object(fields) => {
            let mut table = LuaTable::new(0, fields.len());
            for (key, value) in fields {
                table.raw_set_str(key, from_value(value));
            }
            LuaValue::Table(Gc::new(table))
        }
    }
}

pub fn from_str(text: &str) -> Result<LuaValue, JsonError> {
    let json: JsonValue = serde_json::from_str(text)?;
    Ok(from_value(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested() {
        let value = from_str(r#"{"list": [1, 2.5, "x"], "ok": true}"#).unwrap();
        let table = value.as_table().unwrap().borrow();
        let list = table.raw_get_str("list");
        let list = list.as_table().unwrap().borrow();
        assert_eq!(list.length(), 3);
        assert_eq!(list.raw_get_int(2), LuaValue::float(2.5));
        assert_eq!(table.raw_get_str("ok"), LuaValue::boolean(true));
    }
}
