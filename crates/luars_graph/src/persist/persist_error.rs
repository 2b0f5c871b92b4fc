use std::io;

use smol_str::SmolStr;
use thiserror::Error;

use crate::lua_state::LuaError;

/// Malformed or truncated input. Always fatal to the current call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unexpected end of stream")]
    Truncated,
    #[error("unknown tag {0:#04x}")]
    UnknownTag(u8),
    #[error("unexpected flags on tag {0:#04x}")]
    UnexpectedFlag(u8),
    #[error("expected a populate record, found tag {0:#04x}")]
    ExpectedPopulate(u8),
    #[error("no serializer named {0:?}")]
    UnknownSerializer(SmolStr),
    #[error("var int longer than 5 bytes")]
    VarIntTooLong,
    #[error("object {0} registered twice")]
    DuplicateId(u32),
    #[error("reference to unallocated object {0}")]
    UnknownReference(u32),
    #[error("expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("nesting deeper than {0}")]
    TooDeep(u32),
    #[error("length {0} exceeds limit")]
    TooLong(usize),
    #[error("invalid coroutine status {0}")]
    InvalidStatus(u8),
    #[error("bad table key: {0}")]
    InvalidTableKey(LuaError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),
    #[error("malformed stream: {0}")]
    Format(#[from] FormatError),
    /// A value the engine cannot encode: no native tag and no serializer.
    #[error("cannot persist: {0}")]
    Internal(String),
}

impl From<io::Error> for PersistError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            PersistError::Format(FormatError::Truncated)
        } else {
            PersistError::Io(error)
        }
    }
}

impl PersistError {
    pub fn is_format(&self) -> bool {
        matches!(self, PersistError::Format(_))
    }
}

pub type PersistResult<T> = Result<T, PersistError>;
