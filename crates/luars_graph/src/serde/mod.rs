//! JSON bridge for plain data tables.
//!
//! Array-like tables (keys exactly `1..=n`) map to JSON arrays, other tables
//! to objects. Functions, threads, userdata and cyclic tables have no JSON
//! form and are rejected.
mod deserializer;
mod serializer;

pub use deserializer::{from_str as json_string_to_lua, from_value as json_to_lua};
pub use serializer::{to_string as lua_to_json_string, to_value as lua_to_json};

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("circular reference detected in table")]
    Cycle,
    #[error("cannot convert a {0} to JSON")]
    Unsupported(&'static str),
    #[error("number {0} has no JSON form")]
    InvalidNumber(f64),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
