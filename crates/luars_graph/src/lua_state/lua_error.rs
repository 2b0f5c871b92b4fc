use thiserror::Error;

/// Invalid operation on a table. The host surfaces these as Lua errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LuaError {
    /// Non-nil value stored under a nil or NaN key
    #[error("table index is {0}")]
    InvalidKey(&'static str),
    /// `next` called with a key the table has never held
    #[error("invalid key to 'next'")]
    InvalidNextKey,
}

pub type LuaResult<T> = Result<T, LuaError>;
