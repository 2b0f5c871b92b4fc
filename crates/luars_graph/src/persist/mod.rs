// Graph persistence: a self-describing binary encoding of an arbitrary
// value graph. Objects get sequential ids the first time they are written
// and every later occurrence becomes a back-reference, so cycles and
// sharing survive a round trip. Bodies nested deeper than the writer's
// depth limit are written as partial records and appended afterwards as
// populate records, keeping native recursion bounded.
mod persist_error;
mod serializer;
mod value_reader;
mod value_writer;

use std::io::{Read, Write};

use crate::gc::GcRef;
use crate::lua_state::{LuaState, PersistOption};
use crate::lua_value::LuaValue;

pub use persist_error::{FormatError, PersistError, PersistResult};
pub use serializer::{Serializer, SerializerRegistry};
pub use value_reader::ValueReader;
pub use value_writer::{ValueWriter, WriterStats};

/// Body omitted here; it follows later as a populate record.
pub const FLAG_PARTIAL: u8 = 1 << 7;
/// Deferred body for an id written earlier with `FLAG_PARTIAL`.
pub const FLAG_POPULATE: u8 = 1 << 6;
pub const MASK_TAG: u8 = FLAG_POPULATE - 1;

pub const TAG_NIL: u8 = 0;
pub const TAG_TRUE: u8 = 1;
pub const TAG_FALSE: u8 = 2;
pub const TAG_SHORT_INT: u8 = 3;
pub const TAG_INT: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_SHORT_STRING: u8 = 6;
pub const TAG_STRING: u8 = 7;
pub const TAG_TABLE: u8 = 8;
pub const TAG_CLOSURE: u8 = 9;
pub const TAG_PROTOTYPE: u8 = 10;
pub const TAG_UPVALUE: u8 = 11;
pub const TAG_STACK: u8 = 12;
pub const TAG_THREAD: u8 = 13;
pub const TAG_SERIALIZER: u8 = 14;
pub const TAG_SERIALIZED: u8 = 15;
/// Integers outside the `i32` range, 8-byte body.
pub const TAG_LONG_INT: u8 = 16;
pub const TAG_REFERENCE: u8 = 20;

// thread flag byte
pub const IN_HOOK: u8 = 1;
pub const HAS_ERRORFUNC: u8 = 2;

pub(crate) fn tag_of(object: &GcRef) -> u8 {
    match object {
        GcRef::String(_) => TAG_STRING,
        GcRef::Table(_) => TAG_TABLE,
        GcRef::Closure(_) => TAG_CLOSURE,
        GcRef::Prototype(_) => TAG_PROTOTYPE,
        GcRef::Upvalue(_) => TAG_UPVALUE,
        GcRef::Stack(_) => TAG_STACK,
        GcRef::Thread(_) => TAG_THREAD,
        GcRef::Userdata(_) => TAG_SERIALIZED,
        GcRef::Serializer(_) => TAG_SERIALIZER,
    }
}

/// Kinds whose bodies may be deferred.
pub(crate) fn can_be_partial(kind: u8) -> bool {
    matches!(kind, TAG_TABLE | TAG_THREAD | TAG_PROTOTYPE | TAG_STACK)
}

/// Write the graph reachable from `value` using the state's settings.
pub fn persist(
    state: &LuaState,
    output: &mut dyn Write,
    value: &LuaValue,
) -> PersistResult<WriterStats> {
    persist_with(state, output, value, state.persist_option())
}

pub fn persist_with(
    state: &LuaState,
    output: &mut dyn Write,
    value: &LuaValue,
    option: PersistOption,
) -> PersistResult<WriterStats> {
    let mut writer = ValueWriter::with_option(state, output, option);
    writer.write_value(value)?;
    writer.finish()
}

/// Read back one value written by [`persist`].
pub fn unpersist(state: &LuaState, input: &mut dyn Read) -> PersistResult<LuaValue> {
    unpersist_with(state, input, state.persist_option())
}

pub fn unpersist_with(
    state: &LuaState,
    input: &mut dyn Read,
    option: PersistOption,
) -> PersistResult<LuaValue> {
    let mut reader = ValueReader::with_option(state, input, option);
    let value = reader.read_value()?;
    reader.finish()?;
    Ok(value)
}

pub fn persist_to_vec(state: &LuaState, value: &LuaValue) -> PersistResult<Vec<u8>> {
    let mut output = Vec::new();
    persist(state, &mut output, value)?;
    Ok(output)
}

pub fn unpersist_from_slice(state: &LuaState, mut bytes: &[u8]) -> PersistResult<LuaValue> {
    unpersist(state, &mut bytes)
}
