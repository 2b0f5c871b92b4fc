//! Limits and tuning constants for the object graph.
//!
//! All magic numbers that bound traversal depth or stream sizes are
//! collected here.

// ===== Persistence =====

/// Body nesting depth the writer recurses to before it writes bodies as
/// partial records and defers them.
pub const PERSIST_MAX_DEPTH: u32 = 16;

/// Nesting depth past which the reader rejects a stream.
/// Every partial-aware writer stays far below this.
pub const PERSIST_MAX_READ_DEPTH: u32 = 256;

/// Longest string written inline (without an id).
pub const SHORT_STRING_MAX: usize = 24;

/// Upper bound on a value stack length accepted from a stream.
/// Matches Lua 5.5's LUAI_MAXSTACK.
pub const LUAI_MAXSTACK: usize = 1_000_000;

/// Longest varint the reader accepts, in bytes.
pub const VAR_INT_MAX_BYTES: u32 = 5;

// ===== Memory accounting =====

/// Direct recursion budget of the memory counter for the root.
pub const TRACE_INITIAL_DEPTH: u32 = 10;

/// Direct recursion budget for each object resumed from the pending list.
pub const TRACE_RESUME_DEPTH: u32 = 8;
