use std::io::Read;

use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::gc::{Gc, GcRef};
use crate::lua_state::lua_limits::{LUAI_MAXSTACK, VAR_INT_MAX_BYTES};
use crate::lua_state::{LuaState, PersistOption};
use crate::lua_value::{
    ClosureRef, DebugState, LocalVariable, LuaClosure, LuaString, LuaTable, LuaThread, LuaValue,
    ProtoRef, Prototype, StackRef, TableRef, ThreadRef, ThreadState, Upvalue, UpvalueRef,
};
use crate::persist::{
    FLAG_PARTIAL, FLAG_POPULATE, FormatError, HAS_ERRORFUNC, IN_HOOK, MASK_TAG, PersistResult,
    TAG_CLOSURE, TAG_FALSE, TAG_FLOAT, TAG_INT, TAG_LONG_INT, TAG_NIL, TAG_PROTOTYPE,
    TAG_REFERENCE, TAG_SERIALIZED, TAG_SERIALIZER, TAG_SHORT_INT, TAG_SHORT_STRING, TAG_STACK,
    TAG_STRING, TAG_TABLE, TAG_THREAD, TAG_TRUE, TAG_UPVALUE, can_be_partial,
};

/// Cap on capacity reserved up front from a length read off the stream.
const PREALLOCATE_LIMIT: usize = 1024;

/// One decoded record: an inline value or an object with an id.
enum Decoded {
    Inline(LuaValue),
    Object(GcRef),
}

impl Decoded {
    fn kind_name(&self) -> &'static str {
        match self {
            Decoded::Inline(value) => value.type_name(),
            Decoded::Object(object) => object.kind_name(),
        }
    }
}

fn mismatch(expected: &'static str, found: &Decoded) -> FormatError {
    FormatError::KindMismatch {
        expected,
        found: found.kind_name(),
    }
}

/// Decoder for one persisted graph. Ids are assigned when an object is
/// allocated, before its body is read, so bodies can refer back to the
/// object that contains them.
pub struct ValueReader<'a> {
    state: &'a LuaState,
    input: &'a mut dyn Read,
    option: PersistOption,
    /// id -> object; `None` while an id is reserved but not yet allocated.
    objects: Vec<Option<GcRef>>,
    /// Partial headers seen whose populate record has not been read.
    partial: u32,
    depth: u32,
    /// Metatables are attached once every body is complete.
    pending_metatables: Vec<(TableRef, TableRef)>,
    bytes: u64,
}

impl<'a> ValueReader<'a> {
    pub fn new(state: &'a LuaState, input: &'a mut dyn Read) -> Self {
        Self::with_option(state, input, state.persist_option())
    }

    pub fn with_option(state: &'a LuaState, input: &'a mut dyn Read, option: PersistOption) -> Self {
        ValueReader {
            state,
            input,
            option,
            objects: Vec::new(),
            partial: 0,
            depth: 0,
            pending_metatables: Vec::new(),
            bytes: 0,
        }
    }

    pub fn state(&self) -> &LuaState {
        self.state
    }

    // ============ Primitives ============

    fn read_exact<const N: usize>(&mut self) -> PersistResult<[u8; N]> {
        let mut buffer = [0u8; N];
        self.input.read_exact(&mut buffer)?;
        self.bytes += N as u64;
        Ok(buffer)
    }

    pub fn read_byte(&mut self) -> PersistResult<u8> {
        let [byte] = self.read_exact::<1>()?;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> PersistResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(len.min(PREALLOCATE_LIMIT));
        (&mut *self.input).take(len as u64).read_to_end(&mut buffer)?;
        if buffer.len() != len {
            return Err(FormatError::Truncated.into());
        }
        self.bytes += len as u64;
        Ok(buffer)
    }

    pub fn read_var_int(&mut self) -> PersistResult<u32> {
        let mut result = 0u32;
        for i in 0..VAR_INT_MAX_BYTES {
            let byte = self.read_byte()?;
            result |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(FormatError::VarIntTooLong.into())
    }

    pub fn read_len(&mut self) -> PersistResult<usize> {
        Ok(self.read_var_int()? as usize)
    }

    pub fn read_i16(&mut self) -> PersistResult<i16> {
        Ok(i16::from_be_bytes(self.read_exact()?))
    }

    pub fn read_i32(&mut self) -> PersistResult<i32> {
        Ok(i32::from_be_bytes(self.read_exact()?))
    }

    pub fn read_i64(&mut self) -> PersistResult<i64> {
        Ok(i64::from_be_bytes(self.read_exact()?))
    }

    pub fn read_f64(&mut self) -> PersistResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_exact()?)))
    }

    /// Length-prefixed string; invalid UTF-8 is replaced.
    pub fn read_str(&mut self) -> PersistResult<SmolStr> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        Ok(SmolStr::new(String::from_utf8_lossy(&bytes)))
    }

    // ============ Identity ============

    fn reserve(&mut self) -> u32 {
        let id = self.objects.len() as u32;
        self.objects.push(None);
        id
    }

    fn set(&mut self, id: u32, object: GcRef) -> PersistResult<()> {
        match self.objects.get_mut(id as usize) {
            Some(slot) => {
                if slot.is_some() {
                    return Err(FormatError::DuplicateId(id).into());
                }
                *slot = Some(object);
                Ok(())
            }
            None => Err(FormatError::UnknownReference(id).into()),
        }
    }

    fn lookup(&self, id: u32) -> PersistResult<GcRef> {
        self.objects
            .get(id as usize)
            .and_then(Option::clone)
            .ok_or_else(|| FormatError::UnknownReference(id).into())
    }

    // ============ Records ============

    fn read_object(&mut self) -> PersistResult<Decoded> {
        if self.depth >= self.option.max_read_depth {
            return Err(FormatError::TooDeep(self.option.max_read_depth).into());
        }
        self.depth += 1;
        let result = self.read_record();
        self.depth -= 1;
        result
    }

    fn read_record(&mut self) -> PersistResult<Decoded> {
        let tag = self.read_byte()?;
        if tag & FLAG_POPULATE != 0 {
            return Err(FormatError::UnexpectedFlag(tag).into());
        }
        let kind = tag & MASK_TAG;
        let partial = tag & FLAG_PARTIAL != 0;
        if partial {
            if !can_be_partial(kind) {
                return Err(FormatError::UnexpectedFlag(tag).into());
            }
            self.partial += 1;
        }

        let object = match kind {
            TAG_NIL => return Ok(Decoded::Inline(LuaValue::Nil)),
            TAG_TRUE => return Ok(Decoded::Inline(LuaValue::Boolean(true))),
            TAG_FALSE => return Ok(Decoded::Inline(LuaValue::Boolean(false))),
            TAG_SHORT_INT => return Ok(Decoded::Inline(LuaValue::Integer(self.read_i16()? as i64))),
            TAG_INT => return Ok(Decoded::Inline(LuaValue::Integer(self.read_i32()? as i64))),
            TAG_LONG_INT => return Ok(Decoded::Inline(LuaValue::Integer(self.read_i64()?))),
            TAG_FLOAT => return Ok(Decoded::Inline(LuaValue::Float(self.read_f64()?))),
            TAG_SHORT_STRING => {
                let len = self.read_byte()? as usize;
                let bytes = self.read_bytes(len)?;
                return Ok(Decoded::Inline(LuaValue::bytes(&bytes)));
            }
            TAG_REFERENCE => {
                let id = self.read_var_int()?;
                return Ok(Decoded::Object(self.lookup(id)?));
            }
            TAG_STRING => {
                let id = self.reserve();
                let len = self.read_len()?;
                let string = std::rc::Rc::new(LuaString::new(self.read_bytes(len)?));
                let object = GcRef::String(string);
                self.set(id, object.clone())?;
                object
            }
            TAG_TABLE => {
                let id = self.reserve();
                let table = Gc::new(LuaTable::new(0, 0));
                self.set(id, GcRef::Table(table.clone()))?;
                if !partial {
                    self.read_table_body(&table)?;
                }
                GcRef::Table(table)
            }
            TAG_CLOSURE => {
                let id = self.reserve();
                let proto = self.read_prototype()?;
                let upvalue_count = self.read_len()?;
                let closure = Gc::new(LuaClosure::new(proto, None));
                self.set(id, GcRef::Closure(closure.clone()))?;
                let env = self.read_env()?;
                closure.borrow_mut().env = env;
                for _ in 0..upvalue_count {
                    let upvalue = self.read_upvalue()?;
                    closure.borrow_mut().upvalues.push(upvalue);
                }
                GcRef::Closure(closure)
            }
            TAG_PROTOTYPE => {
                let id = self.reserve();
                let proto = Gc::new(Prototype::default());
                self.set(id, GcRef::Prototype(proto.clone()))?;
                if !partial {
                    self.read_prototype_body(&proto)?;
                }
                GcRef::Prototype(proto)
            }
            TAG_UPVALUE => {
                let id = self.reserve();
                // registered before the stack is read: the stack may hold
                // closures that share this upvalue
                let upvalue = Gc::new(Upvalue::new(Gc::new(Vec::new()), 0));
                self.set(id, GcRef::Upvalue(upvalue.clone()))?;
                let stack = self.read_stack()?;
                let index = self.read_len()?;
                *upvalue.borrow_mut() = Upvalue::new(stack, index);
                GcRef::Upvalue(upvalue)
            }
            TAG_STACK => {
                let id = self.reserve();
                let len = self.read_len()?;
                if len > LUAI_MAXSTACK {
                    return Err(FormatError::TooLong(len).into());
                }
                let stack: StackRef = Gc::new(vec![LuaValue::Nil; len]);
                self.set(id, GcRef::Stack(stack.clone()))?;
                if !partial {
                    self.read_stack_values(&stack)?;
                }
                GcRef::Stack(stack)
            }
            TAG_THREAD => {
                let id = self.reserve();
                let thread = Gc::new(LuaThread::new(None));
                self.set(id, GcRef::Thread(thread.clone()))?;
                if !partial {
                    self.read_thread_body(&thread)?;
                }
                GcRef::Thread(thread)
            }
            TAG_SERIALIZER => {
                let id = self.reserve();
                let name = self.read_str()?;
                let serializer = self
                    .state
                    .serializers()
                    .get(&name)
                    .ok_or(FormatError::UnknownSerializer(name))?;
                self.set(id, GcRef::Serializer(serializer.clone()))?;
                GcRef::Serializer(serializer)
            }
            TAG_SERIALIZED => {
                let id = self.reserve();
                let serializer = match self.read_object()? {
                    Decoded::Object(GcRef::Serializer(serializer)) => serializer,
                    other => return Err(mismatch("serializer", &other).into()),
                };
                let userdata = serializer.load(self)?;
                self.set(id, GcRef::Userdata(userdata.clone()))?;
                GcRef::Userdata(userdata)
            }
            _ => return Err(FormatError::UnknownTag(tag).into()),
        };
        Ok(Decoded::Object(object))
    }

    // ============ Typed reads ============

    pub fn read_value(&mut self) -> PersistResult<LuaValue> {
        match self.read_object()? {
            Decoded::Inline(value) => Ok(value),
            Decoded::Object(object) => match object.to_value() {
                Some(value) => Ok(value),
                None => Err(mismatch("value", &Decoded::Object(object)).into()),
            },
        }
    }

    pub fn read_values(&mut self) -> PersistResult<Vec<LuaValue>> {
        let count = self.read_len()?;
        let mut values = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        for _ in 0..count {
            values.push(self.read_value()?);
        }
        Ok(values)
    }

    /// A table or nil.
    fn read_env(&mut self) -> PersistResult<Option<TableRef>> {
        match self.read_object()? {
            Decoded::Inline(LuaValue::Nil) => Ok(None),
            Decoded::Object(GcRef::Table(table)) => Ok(Some(table)),
            other => Err(mismatch("table", &other).into()),
        }
    }

    pub fn read_table(&mut self) -> PersistResult<TableRef> {
        match self.read_object()? {
            Decoded::Object(GcRef::Table(table)) => Ok(table),
            other => Err(mismatch("table", &other).into()),
        }
    }

    pub fn read_closure(&mut self) -> PersistResult<ClosureRef> {
        match self.read_object()? {
            Decoded::Object(GcRef::Closure(closure)) => Ok(closure),
            other => Err(mismatch("function", &other).into()),
        }
    }

    pub fn read_thread(&mut self) -> PersistResult<ThreadRef> {
        match self.read_object()? {
            Decoded::Object(GcRef::Thread(thread)) => Ok(thread),
            other => Err(mismatch("thread", &other).into()),
        }
    }

    pub fn read_prototype(&mut self) -> PersistResult<ProtoRef> {
        match self.read_object()? {
            Decoded::Object(GcRef::Prototype(proto)) => Ok(proto),
            other => Err(mismatch("prototype", &other).into()),
        }
    }

    pub fn read_upvalue(&mut self) -> PersistResult<UpvalueRef> {
        match self.read_object()? {
            Decoded::Object(GcRef::Upvalue(upvalue)) => Ok(upvalue),
            other => Err(mismatch("upvalue", &other).into()),
        }
    }

    pub fn read_stack(&mut self) -> PersistResult<StackRef> {
        match self.read_object()? {
            Decoded::Object(GcRef::Stack(stack)) => Ok(stack),
            other => Err(mismatch("stack", &other).into()),
        }
    }

    // ============ Bodies ============

    fn read_table_body(&mut self, table: &TableRef) -> PersistResult<()> {
        loop {
            let key = self.read_value()?;
            if key.is_nil() {
                break;
            }
            let value = self.read_value()?;
            table
                .borrow_mut()
                .raw_set(key, value)
                .map_err(FormatError::InvalidTableKey)?;
        }
        if let Some(metatable) = self.read_env()? {
            self.pending_metatables.push((table.clone(), metatable));
        }
        Ok(())
    }

    fn read_prototype_body(&mut self, proto: &ProtoRef) -> PersistResult<()> {
        let source = self.read_value()?;
        let line_defined = self.read_var_int()?;
        let last_line_defined = self.read_var_int()?;
        let num_upvalues = self.read_var_int()?;
        let params = self.read_var_int()?;
        let max_stack_size = self.read_var_int()?;
        let constants = self.read_values()?;

        let count = self.read_len()?;
        let mut code = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        for _ in 0..count {
            code.push(self.read_var_int()?);
        }

        let count = self.read_len()?;
        let mut protos = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        for _ in 0..count {
            protos.push(self.read_prototype()?);
        }

        let count = self.read_len()?;
        let mut line_info = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        for _ in 0..count {
            line_info.push(self.read_var_int()?);
        }

        let count = self.read_len()?;
        let mut local_vars = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        for _ in 0..count {
            let name = self.read_value()?;
            let start_pc = self.read_var_int()?;
            let end_pc = self.read_var_int()?;
            local_vars.push(LocalVariable {
                name,
                start_pc,
                end_pc,
            });
        }

        let upvalue_names = self.read_values()?;

        *proto.borrow_mut() = Prototype {
            source,
            line_defined,
            last_line_defined,
            num_upvalues,
            num_params: params >> 2,
            is_vararg: params & 1 != 0,
            max_stack_size,
            constants,
            code,
            protos,
            line_info,
            local_vars,
            upvalue_names,
        };
        Ok(())
    }

    fn read_stack_values(&mut self, stack: &StackRef) -> PersistResult<()> {
        let len = stack.borrow().len();
        for index in 0..len {
            let value = self.read_value()?;
            if let Some(cell) = stack.borrow_mut().get_mut(index) {
                *cell = value;
            }
        }
        Ok(())
    }

    fn read_thread_body(&mut self, thread: &ThreadRef) -> PersistResult<()> {
        let state = ThreadState::read(self)?;
        let env = self.read_env()?;
        let flags = self.read_byte()?;
        let error_func = if flags & HAS_ERRORFUNC != 0 {
            Some(self.read_value()?)
        } else {
            None
        };
        let mut debug = DebugState::read(self)?;
        debug.in_hook = flags & IN_HOOK != 0;

        let mut thread = thread.borrow_mut();
        thread.state = state;
        thread.env = env;
        thread.error_func = error_func;
        thread.debug = debug;
        Ok(())
    }

    /// Read one populate record and fill in the body of the object it names.
    fn read_populate(&mut self) -> PersistResult<()> {
        let tag = self.read_byte()?;
        if tag & FLAG_PARTIAL != 0 {
            return Err(FormatError::UnexpectedFlag(tag).into());
        }
        if tag & FLAG_POPULATE == 0 {
            return Err(FormatError::ExpectedPopulate(tag).into());
        }
        let id = self.read_var_int()?;
        let object = self.lookup(id)?;
        trace!(id, kind = object.kind_name(), "populating deferred body");
        match (tag & MASK_TAG, object) {
            (TAG_TABLE, GcRef::Table(table)) => self.read_table_body(&table),
            (TAG_PROTOTYPE, GcRef::Prototype(proto)) => self.read_prototype_body(&proto),
            (TAG_STACK, GcRef::Stack(stack)) => self.read_stack_values(&stack),
            (TAG_THREAD, GcRef::Thread(thread)) => self.read_thread_body(&thread),
            (kind, object) if can_be_partial(kind) => Err(FormatError::KindMismatch {
                expected: object.kind_name(),
                found: kind_name(kind),
            }
            .into()),
            _ => Err(FormatError::UnknownTag(tag).into()),
        }
    }

    /// Read the populate records for every partial header seen, then attach
    /// metatables.
    pub fn finish(mut self) -> PersistResult<()> {
        let mut populated = 0u32;
        while self.partial > 0 {
            self.partial -= 1;
            self.read_populate()?;
            populated += 1;
        }
        for (table, metatable) in self.pending_metatables.drain(..) {
            table.borrow_mut().set_metatable(Some(metatable));
        }
        debug!(
            objects = self.objects.len(),
            populated,
            bytes = self.bytes,
            "unpersist finished"
        );
        Ok(())
    }
}

fn kind_name(kind: u8) -> &'static str {
    match kind {
        TAG_TABLE => "table",
        TAG_PROTOTYPE => "prototype",
        TAG_STACK => "stack",
        TAG_THREAD => "thread",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_register_once() {
        let state = LuaState::new();
        let mut input: &[u8] = &[];
        let mut reader = ValueReader::new(&state, &mut input);
        let id = reader.reserve();
        let table = GcRef::Table(Gc::new(LuaTable::new(0, 0)));
        assert!(reader.lookup(id).is_err());
        reader.set(id, table.clone()).unwrap();
        assert_eq!(reader.lookup(id).unwrap(), table);
        assert!(matches!(
            reader.set(id, table.clone()),
            Err(crate::persist::PersistError::Format(FormatError::DuplicateId(0)))
        ));
        assert!(matches!(
            reader.set(7, table),
            Err(crate::persist::PersistError::Format(FormatError::UnknownReference(7)))
        ));
    }
}
