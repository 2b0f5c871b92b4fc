use std::collections::HashMap;
use std::io::Write;

use tracing::{debug, trace, warn};

use crate::gc::{BoundedWalk, DrainOrder, GcRef};
use crate::lua_state::lua_limits::{LUAI_MAXSTACK, SHORT_STRING_MAX};
use crate::lua_state::{LuaState, PersistOption};
use crate::lua_value::{
    ClosureRef, LuaValue, ProtoRef, StackRef, TableRef, ThreadRef, UpvalueRef, UserdataRef,
};
use crate::persist::{
    FLAG_PARTIAL, FLAG_POPULATE, HAS_ERRORFUNC, IN_HOOK, PersistError, PersistResult, TAG_CLOSURE,
    TAG_FALSE, TAG_FLOAT, TAG_INT, TAG_LONG_INT, TAG_NIL, TAG_PROTOTYPE, TAG_REFERENCE,
    TAG_SERIALIZED, TAG_SERIALIZER, TAG_SHORT_INT, TAG_SHORT_STRING, TAG_STACK, TAG_STRING,
    TAG_TABLE, TAG_THREAD, TAG_TRUE, TAG_UPVALUE, tag_of,
};

/// Counters reported when a writer finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Objects given an id, i.e. bodies written.
    pub objects: u32,
    /// Back-references written for objects already seen.
    pub references: u32,
    /// Bodies written as partial and populated afterwards.
    pub deferred: u32,
    pub bytes: u64,
}

/// A body deferred past the depth limit.
struct Update {
    id: u32,
    object: GcRef,
}

/// Encoder for one persisted graph. Call [`ValueWriter::finish`] once the
/// root is written; it appends the deferred bodies.
pub struct ValueWriter<'a> {
    state: &'a LuaState,
    output: &'a mut dyn Write,
    option: PersistOption,
    ids: HashMap<GcRef, u32, ahash::RandomState>,
    depth: u32,
    queue: BoundedWalk<Update>,
    stats: WriterStats,
}

impl<'a> ValueWriter<'a> {
    pub fn new(state: &'a LuaState, output: &'a mut dyn Write) -> Self {
        Self::with_option(state, output, state.persist_option())
    }

    pub fn with_option(state: &'a LuaState, output: &'a mut dyn Write, option: PersistOption) -> Self {
        ValueWriter {
            state,
            output,
            option,
            ids: HashMap::default(),
            depth: 0,
            queue: BoundedWalk::new(DrainOrder::Fifo),
            stats: WriterStats::default(),
        }
    }

    pub fn state(&self) -> &LuaState {
        self.state
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    // ============ Primitives ============

    pub fn write_bytes(&mut self, bytes: &[u8]) -> PersistResult<()> {
        self.output.write_all(bytes)?;
        self.stats.bytes += bytes.len() as u64;
        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> PersistResult<()> {
        self.write_bytes(&[byte])
    }

    /// Little-endian base-128: 7 data bits per byte, high bit set on all
    /// but the last.
    pub fn write_var_int(&mut self, value: u32) -> PersistResult<()> {
        let mut value = value;
        while value & !0x7F != 0 {
            self.write_byte((value & 0x7F) as u8 | 0x80)?;
            value >>= 7;
        }
        self.write_byte(value as u8)
    }

    pub fn write_len(&mut self, len: usize) -> PersistResult<()> {
        let len = u32::try_from(len)
            .map_err(|_| PersistError::Internal(format!("length {} does not fit a var int", len)))?;
        self.write_var_int(len)
    }

    pub fn write_i16(&mut self, value: i16) -> PersistResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> PersistResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> PersistResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> PersistResult<()> {
        self.write_bytes(&value.to_bits().to_be_bytes())
    }

    /// Length-prefixed bytes.
    pub fn write_str(&mut self, s: &str) -> PersistResult<()> {
        self.write_len(s.len())?;
        self.write_bytes(s.as_bytes())
    }

    // ============ Identity ============

    /// Write a back-reference if `object` already has an id; otherwise give
    /// it the next id, write `tag`, and return the id so the caller writes
    /// the body.
    fn check_written(&mut self, object: GcRef, tag: u8) -> PersistResult<Option<u32>> {
        if let Some(&id) = self.ids.get(&object) {
            self.write_byte(TAG_REFERENCE)?;
            self.write_var_int(id)?;
            self.stats.references += 1;
            return Ok(None);
        }
        let id = self.stats.objects;
        self.stats.objects += 1;
        self.ids.insert(object, id);
        self.write_byte(tag)?;
        Ok(Some(id))
    }

    /// As `check_written`, but past the depth limit the header is flagged
    /// partial and the body is queued instead of returned to the caller.
    fn check_written_partial(&mut self, object: GcRef, tag: u8) -> PersistResult<Option<u32>> {
        if self.depth <= self.option.max_depth {
            return self.check_written(object, tag);
        }
        match self.check_written(object.clone(), tag | FLAG_PARTIAL)? {
            Some(id) => {
                self.defer(id, object);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn defer(&mut self, id: u32, object: GcRef) {
        trace!(id, kind = object.kind_name(), depth = self.depth, "body deferred");
        self.stats.deferred += 1;
        self.queue.defer(Update { id, object });
    }

    // ============ Values ============

    pub fn write_value(&mut self, value: &LuaValue) -> PersistResult<()> {
        match value {
            LuaValue::Nil => self.write_byte(TAG_NIL),
            LuaValue::Boolean(true) => self.write_byte(TAG_TRUE),
            LuaValue::Boolean(false) => self.write_byte(TAG_FALSE),
            LuaValue::Integer(i) => {
                if let Ok(short) = i16::try_from(*i) {
                    self.write_byte(TAG_SHORT_INT)?;
                    self.write_i16(short)
                } else if let Ok(int) = i32::try_from(*i) {
                    self.write_byte(TAG_INT)?;
                    self.write_i32(int)
                } else {
                    self.write_byte(TAG_LONG_INT)?;
                    self.write_i64(*i)
                }
            }
            LuaValue::Float(n) => {
                self.write_byte(TAG_FLOAT)?;
                self.write_f64(*n)
            }
            LuaValue::String(s) => {
                if s.len() <= SHORT_STRING_MAX {
                    self.write_byte(TAG_SHORT_STRING)?;
                    self.write_byte(s.len() as u8)?;
                    self.write_bytes(s.as_bytes())
                } else {
                    if self.check_written(GcRef::String(s.clone()), TAG_STRING)?.is_none() {
                        return Ok(());
                    }
                    self.write_len(s.len())?;
                    self.write_bytes(s.as_bytes())
                }
            }
            LuaValue::Table(table) => self.write_table(table),
            LuaValue::Function(closure) => self.write_closure(closure),
            LuaValue::Thread(thread) => self.write_thread(thread),
            LuaValue::Userdata(userdata) => self.write_userdata(userdata),
        }
    }

    /// Count-prefixed list of values.
    pub fn write_values(&mut self, values: &[LuaValue]) -> PersistResult<()> {
        self.write_len(values.len())?;
        for value in values {
            self.write_value(value)?;
        }
        Ok(())
    }

    pub fn write_table(&mut self, table: &TableRef) -> PersistResult<()> {
        if self
            .check_written_partial(GcRef::Table(table.clone()), TAG_TABLE)?
            .is_some()
        {
            self.write_table_body(table)?;
        }
        Ok(())
    }

    fn write_table_body(&mut self, table: &TableRef) -> PersistResult<()> {
        self.depth += 1;
        {
            let table = table.borrow();
            for (key, value) in table.iter() {
                self.write_value(&key)?;
                self.write_value(&value)?;
            }
        }
        self.write_byte(TAG_NIL)?;
        let metatable = table.borrow().get_metatable();
        match metatable {
            Some(metatable) => self.write_table(&metatable)?,
            None => self.write_byte(TAG_NIL)?,
        }
        self.depth -= 1;
        Ok(())
    }

    fn write_env(&mut self, env: &Option<TableRef>) -> PersistResult<()> {
        match env {
            Some(env) => self.write_table(env),
            None => self.write_byte(TAG_NIL),
        }
    }

    pub fn write_closure(&mut self, closure: &ClosureRef) -> PersistResult<()> {
        if self
            .check_written(GcRef::Closure(closure.clone()), TAG_CLOSURE)?
            .is_none()
        {
            return Ok(());
        }
        let closure = closure.borrow();
        self.write_prototype(&closure.proto)?;
        self.write_len(closure.upvalues.len())?;
        self.write_env(&closure.env)?;
        for upvalue in &closure.upvalues {
            self.write_upvalue(upvalue)?;
        }
        Ok(())
    }

    pub fn write_thread(&mut self, thread: &ThreadRef) -> PersistResult<()> {
        if self
            .check_written_partial(GcRef::Thread(thread.clone()), TAG_THREAD)?
            .is_some()
        {
            self.write_thread_body(thread)?;
        }
        Ok(())
    }

    fn write_thread_body(&mut self, thread: &ThreadRef) -> PersistResult<()> {
        self.depth += 1;
        let thread = thread.borrow();
        thread.state.write(self)?;
        self.write_env(&thread.env)?;
        let mut flags = 0;
        if thread.debug.in_hook {
            flags |= IN_HOOK;
        }
        if thread.error_func.is_some() {
            flags |= HAS_ERRORFUNC;
        }
        self.write_byte(flags)?;
        if let Some(error_func) = &thread.error_func {
            self.write_value(error_func)?;
        }
        thread.debug.write(self)?;
        self.depth -= 1;
        Ok(())
    }

    pub fn write_prototype(&mut self, proto: &ProtoRef) -> PersistResult<()> {
        if self
            .check_written_partial(GcRef::Prototype(proto.clone()), TAG_PROTOTYPE)?
            .is_some()
        {
            self.write_prototype_body(proto)?;
        }
        Ok(())
    }

    fn write_prototype_body(&mut self, proto: &ProtoRef) -> PersistResult<()> {
        self.depth += 1;
        let proto = proto.borrow();
        self.write_value(&proto.source)?;
        self.write_var_int(proto.line_defined)?;
        self.write_var_int(proto.last_line_defined)?;
        self.write_var_int(proto.num_upvalues)?;
        self.write_var_int((proto.num_params << 2) | proto.is_vararg as u32)?;
        self.write_var_int(proto.max_stack_size)?;
        self.write_values(&proto.constants)?;
        self.write_len(proto.code.len())?;
        for &instruction in &proto.code {
            self.write_var_int(instruction)?;
        }
        self.write_len(proto.protos.len())?;
        for child in &proto.protos {
            self.write_prototype(child)?;
        }
        self.write_len(proto.line_info.len())?;
        for &line in &proto.line_info {
            self.write_var_int(line)?;
        }
        self.write_len(proto.local_vars.len())?;
        for local in &proto.local_vars {
            self.write_value(&local.name)?;
            self.write_var_int(local.start_pc)?;
            self.write_var_int(local.end_pc)?;
        }
        self.write_values(&proto.upvalue_names)?;
        self.depth -= 1;
        Ok(())
    }

    pub fn write_upvalue(&mut self, upvalue: &UpvalueRef) -> PersistResult<()> {
        if self
            .check_written(GcRef::Upvalue(upvalue.clone()), TAG_UPVALUE)?
            .is_none()
        {
            return Ok(());
        }
        let upvalue = upvalue.borrow();
        self.write_stack(&upvalue.stack)?;
        self.write_len(upvalue.index)
    }

    /// A value stack. Even when partial its length is written, so the
    /// reader can allocate it before the body arrives.
    pub fn write_stack(&mut self, stack: &StackRef) -> PersistResult<()> {
        let len = stack.borrow().len();
        if len > LUAI_MAXSTACK {
            return Err(PersistError::Internal(format!(
                "stack of {} values exceeds the readable limit",
                len
            )));
        }
        let partial = self.depth > self.option.max_depth;
        let tag = if partial { TAG_STACK | FLAG_PARTIAL } else { TAG_STACK };
        let Some(id) = self.check_written(GcRef::Stack(stack.clone()), tag)? else {
            return Ok(());
        };
        self.write_len(len)?;
        if partial {
            self.defer(id, GcRef::Stack(stack.clone()));
            return Ok(());
        }
        self.write_stack_values(stack)
    }

    fn write_stack_values(&mut self, stack: &StackRef) -> PersistResult<()> {
        self.depth += 1;
        for value in stack.borrow().iter() {
            self.write_value(value)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// A host object, through the serializer it names.
    pub fn write_userdata(&mut self, userdata: &UserdataRef) -> PersistResult<()> {
        let serializer = userdata.serializer().ok_or_else(|| {
            PersistError::Internal(format!("{} has no serializer", userdata.type_name()))
        })?;
        let object = GcRef::Userdata(userdata.clone());
        if self.check_written(object, TAG_SERIALIZED)?.is_none() {
            return Ok(());
        }
        if self
            .check_written(GcRef::Serializer(serializer.clone()), TAG_SERIALIZER)?
            .is_some()
        {
            self.write_str(serializer.name())?;
        }
        self.depth += 1;
        serializer.save(self, userdata)?;
        self.depth -= 1;
        Ok(())
    }

    /// Write every deferred body as a populate record, then flush. Bodies
    /// written here may defer further bodies; draining runs until none are left.
    pub fn finish(mut self) -> PersistResult<WriterStats> {
        while let Some(Update { id, object }) = self.queue.next_deferred() {
            self.write_byte(FLAG_POPULATE | tag_of(&object))?;
            self.write_var_int(id)?;
            match &object {
                GcRef::Table(table) => self.write_table_body(table)?,
                GcRef::Prototype(proto) => self.write_prototype_body(proto)?,
                GcRef::Stack(stack) => self.write_stack_values(stack)?,
                GcRef::Thread(thread) => self.write_thread_body(thread)?,
                other => {
                    return Err(PersistError::Internal(format!(
                        "{} bodies cannot be deferred",
                        other.kind_name()
                    )));
                }
            }
        }
        self.output.flush()?;
        let stats = self.stats;
        debug!(
            objects = stats.objects,
            references = stats.references,
            deferred = stats.deferred,
            bytes = stats.bytes,
            "persist finished"
        );
        Ok(stats)
    }
}

impl Drop for ValueWriter<'_> {
    fn drop(&mut self) {
        let abandoned = self.queue.abandon();
        if abandoned > 0 {
            warn!(abandoned, "value writer dropped with deferred bodies still queued");
        }
    }
}
