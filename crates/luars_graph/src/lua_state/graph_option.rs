use crate::lua_state::lua_limits::{
    PERSIST_MAX_DEPTH, PERSIST_MAX_READ_DEPTH, TRACE_INITIAL_DEPTH, TRACE_RESUME_DEPTH,
};

/// Persistence settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PersistOption {
    /// Writer: bodies nested deeper than this are deferred.
    pub max_depth: u32,
    /// Reader: streams nesting deeper than this are rejected.
    pub max_read_depth: u32,
}

impl Default for PersistOption {
    fn default() -> Self {
        PersistOption {
            max_depth: PERSIST_MAX_DEPTH,
            max_read_depth: PERSIST_MAX_READ_DEPTH,
        }
    }
}

/// Memory counter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TraceOption {
    pub initial_depth: u32,
    pub resume_depth: u32,
}

impl Default for TraceOption {
    fn default() -> Self {
        TraceOption {
            initial_depth: TRACE_INITIAL_DEPTH,
            resume_depth: TRACE_RESUME_DEPTH,
        }
    }
}
