// Tests for persisting closures, prototypes, upvalues, threads and userdata
use std::any::Any;
use std::rc::Rc;

use crate::lua_value::{
    CallFrame, CoroutineStatus, LocalVariable, LuaClosure, LuaThread, LuaUserdata, Prototype,
    Upvalue, UserdataRef,
};
use crate::persist::{PersistResult, ValueReader, ValueWriter};
use crate::*;

fn sample_proto() -> Gc<Prototype> {
    let child = Gc::new(Prototype {
        source: LuaValue::string("@child.lua"),
        line_defined: 3,
        last_line_defined: 5,
        code: vec![0x0100_0001, 0xFFFF_FFFF],
        ..Prototype::default()
    });
    Gc::new(Prototype {
        source: LuaValue::string("@main.lua"),
        line_defined: 1,
        last_line_defined: 10,
        num_upvalues: 1,
        num_params: 2,
        is_vararg: true,
        max_stack_size: 8,
        constants: vec![LuaValue::integer(1), LuaValue::string("print"), LuaValue::float(0.25)],
        code: vec![1, 2, 3, 200_000],
        protos: vec![child],
        line_info: vec![1, 1, 2, 4],
        local_vars: vec![LocalVariable {
            name: LuaValue::string("x"),
            start_pc: 0,
            end_pc: 4,
        }],
        upvalue_names: vec![LuaValue::string("_ENV")],
    })
}

#[test]
fn test_closure_round_trip() {
    let state = LuaState::new();
    let stack = Gc::new(vec![LuaValue::integer(1), LuaValue::string("captured")]);
    let upvalue = Gc::new(Upvalue::new(stack, 1));
    let mut closure = LuaClosure::new(sample_proto(), Some(state.globals().clone()));
    closure.upvalues.push(upvalue.clone());
    closure.upvalues.push(upvalue);
    let closure = Gc::new(closure);

    let bytes = persist_to_vec(&state, &LuaValue::Function(closure)).unwrap();
    let copy = unpersist_from_slice(&state, &bytes).unwrap();
    let copy = copy.as_function().unwrap().borrow();

    assert_eq!(copy.upvalues.len(), 2);
    assert!(copy.upvalues[0].ptr_eq(&copy.upvalues[1]));
    assert_eq!(copy.upvalues[0].borrow().get(), LuaValue::string("captured"));
    assert!(copy.env.is_some());

    let proto = copy.proto.borrow();
    assert_eq!(proto.source, LuaValue::string("@main.lua"));
    assert_eq!((proto.line_defined, proto.last_line_defined), (1, 10));
    assert_eq!(proto.num_upvalues, 1);
    assert_eq!(proto.num_params, 2);
    assert!(proto.is_vararg);
    assert_eq!(proto.max_stack_size, 8);
    assert_eq!(proto.constants.len(), 3);
    assert_eq!(proto.constants[2], LuaValue::float(0.25));
    assert_eq!(proto.code, vec![1, 2, 3, 200_000]);
    assert_eq!(proto.line_info, vec![1, 1, 2, 4]);
    assert_eq!(proto.local_vars[0].name, LuaValue::string("x"));
    assert_eq!(proto.local_vars[0].end_pc, 4);
    assert_eq!(proto.upvalue_names, vec![LuaValue::string("_ENV")]);

    let child = proto.protos[0].borrow();
    assert_eq!(child.code, vec![0x0100_0001, 0xFFFF_FFFF]);
    assert!(!child.is_vararg);
}

#[test]
fn test_upvalue_shared_from_its_own_stack() {
    // local f, g; f = function() return g end; g = function() return f, g end
    let state = LuaState::new();
    let stack = Gc::new(vec![LuaValue::nil(), LuaValue::nil()]);
    let up_f = Gc::new(Upvalue::new(stack.clone(), 0));
    let up_g = Gc::new(Upvalue::new(stack.clone(), 1));
    let proto = sample_proto();
    let mut f = LuaClosure::new(proto.clone(), None);
    f.upvalues.push(up_g.clone());
    let mut g = LuaClosure::new(proto, None);
    g.upvalues.push(up_f);
    g.upvalues.push(up_g);
    let (f, g) = (Gc::new(f), Gc::new(g));
    fill_stack(&stack, &f, &g);

    let bytes = persist_to_vec(&state, &LuaValue::Function(f)).unwrap();
    let copy = unpersist_from_slice(&state, &bytes).unwrap();
    let f = copy.as_function().unwrap().clone();
    let g = f.borrow().upvalues[0].borrow().get();
    let g = g.as_function().unwrap().clone();
    {
        let f_ref = f.borrow();
        let g_ref = g.borrow();
        assert!(g_ref.upvalues[1].ptr_eq(&f_ref.upvalues[0]));
        let first = g_ref.upvalues[0].borrow().get();
        assert!(first.as_function().unwrap().ptr_eq(&f));
        assert!(g_ref.upvalues[0].borrow().stack.ptr_eq(&f_ref.upvalues[0].borrow().stack));
    }

    let copy_stack = f.borrow().upvalues[0].borrow().stack.clone();
    copy_stack.borrow_mut().clear();
    stack.borrow_mut().clear();
}

fn fill_stack(stack: &Gc<Vec<LuaValue>>, f: &Gc<LuaClosure>, g: &Gc<LuaClosure>) {
    let mut cells = stack.borrow_mut();
    cells[0] = LuaValue::Function(f.clone());
    cells[1] = LuaValue::Function(g.clone());
}

#[test]
fn test_oversized_stack_rejected_on_write() {
    let state = LuaState::new();
    let len = crate::lua_state::lua_limits::LUAI_MAXSTACK + 1;
    let thread = Gc::new(LuaThread::new(None));
    thread.borrow_mut().state.stack = Gc::new(vec![LuaValue::nil(); len]);
    let result = persist_to_vec(&state, &LuaValue::Thread(thread));
    assert!(matches!(result, Err(PersistError::Internal(_))));
}

#[test]
fn test_thread_round_trip() {
    let state = LuaState::new();
    let stack = Gc::new(vec![LuaValue::integer(5), LuaValue::string("local")]);
    let mut closure = LuaClosure::new(sample_proto(), Some(state.globals().clone()));
    closure.upvalues.push(Gc::new(Upvalue::new(stack.clone(), 1)));
    let closure = Gc::new(closure);

    let mut thread = LuaThread::new(Some(state.globals().clone()));
    thread.state.status = CoroutineStatus::Normal;
    thread.state.stack = stack;
    thread.state.frames.push(CallFrame {
        closure: closure.clone(),
        pc: 7,
        base: 1,
    });
    thread.error_func = Some(LuaValue::Function(closure));
    thread.debug.hook_mask = 5;
    thread.debug.hook_count = 1000;
    thread.debug.in_hook = true;
    let thread = Gc::new(thread);

    let bytes = persist_to_vec(&state, &LuaValue::Thread(thread)).unwrap();
    let copy = unpersist_from_slice(&state, &bytes).unwrap();
    let copy = copy.as_thread().unwrap().borrow();

    assert_eq!(copy.state.status, CoroutineStatus::Normal);
    assert_eq!(copy.state.stack.borrow().len(), 2);
    let frame = &copy.state.frames[0];
    assert_eq!((frame.pc, frame.base), (7, 1));
    let upvalue_stack = frame.closure.borrow().upvalues[0].borrow().stack.clone();
    assert!(upvalue_stack.ptr_eq(&copy.state.stack));
    let error_func = copy.error_func.as_ref().unwrap();
    assert!(error_func.as_function().unwrap().ptr_eq(&frame.closure));
    assert!(copy.env.as_ref().unwrap().ptr_eq(frame.closure.borrow().env.as_ref().unwrap()));
    assert_eq!(copy.debug.hook_mask, 5);
    assert_eq!(copy.debug.hook_count, 1000);
    assert!(copy.debug.in_hook);
}

#[test]
fn test_deferred_thread_and_stack() {
    let state = LuaState::new();
    let option = PersistOption {
        max_depth: 0,
        ..PersistOption::default()
    };
    let thread = Gc::new(LuaThread::new(None));
    thread.borrow_mut().state.stack = Gc::new(vec![LuaValue::integer(9); 3]);
    let holder = Gc::new(LuaTable::new(0, 0));
    holder
        .borrow_mut()
        .raw_set_str("co", LuaValue::Thread(thread));

    let mut bytes = Vec::new();
    let stats =
        persist::persist_with(&state, &mut bytes, &LuaValue::Table(holder), option).unwrap();
    assert!(stats.deferred >= 2);

    let copy = persist::unpersist_with(&state, &mut bytes.as_slice(), option).unwrap();
    let co = copy.as_table().unwrap().borrow().raw_get_str("co");
    let co = co.as_thread().unwrap().borrow();
    assert_eq!(*co.state.stack.borrow(), vec![LuaValue::integer(9); 3]);
}

struct Point {
    x: i64,
    y: i64,
    serializer: Rc<dyn persist::Serializer>,
}

impl LuaUserdata for Point {
    fn type_name(&self) -> &str {
        "Point"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn serializer(&self) -> Option<Rc<dyn persist::Serializer>> {
        Some(self.serializer.clone())
    }
}

struct PointSerializer;

impl persist::Serializer for PointSerializer {
    fn name(&self) -> &str {
        "point"
    }

    fn save(&self, writer: &mut ValueWriter<'_>, value: &UserdataRef) -> PersistResult<()> {
        let point = value
            .downcast_ref::<Point>()
            .ok_or_else(|| PersistError::Internal("not a point".to_owned()))?;
        writer.write_i64(point.x)?;
        writer.write_i64(point.y)
    }

    fn load(&self, reader: &mut ValueReader<'_>) -> PersistResult<UserdataRef> {
        let x = reader.read_i64()?;
        let y = reader.read_i64()?;
        let serializer = reader
            .state()
            .serializers()
            .get(self.name())
            .ok_or_else(|| PersistError::Internal("point serializer missing".to_owned()))?;
        Ok(UserdataRef::new(Point { x, y, serializer }))
    }
}

fn point_state() -> (LuaState, Rc<dyn persist::Serializer>) {
    let mut state = LuaState::new();
    let serializer: Rc<dyn persist::Serializer> = Rc::new(PointSerializer);
    state.serializers_mut().register(serializer.clone());
    (state, serializer)
}

#[test]
fn test_userdata_round_trip() {
    let (state, serializer) = point_state();
    let p1 = UserdataRef::new(Point {
        x: 1,
        y: -2,
        serializer: serializer.clone(),
    });
    let p2 = UserdataRef::new(Point {
        x: 30,
        y: 40,
        serializer,
    });
    let table = Gc::new(LuaTable::new(0, 0));
    {
        let mut t = table.borrow_mut();
        t.raw_set_int(1, LuaValue::userdata(p1.clone()));
        t.raw_set_int(2, LuaValue::userdata(p1));
        t.raw_set_int(3, LuaValue::userdata(p2));
    }

    let mut bytes = Vec::new();
    let stats = persist(&state, &mut bytes, &LuaValue::Table(table)).unwrap();
    // table, first point, serializer, second point
    assert_eq!(stats.objects, 4);
    assert_eq!(stats.references, 2);

    let copy = unpersist_from_slice(&state, &bytes).unwrap();
    let copy = copy.as_table().unwrap().borrow();
    let first = copy.raw_get_int(1);
    let first = first.as_userdata().unwrap();
    assert!(first.ptr_eq(copy.raw_get_int(2).as_userdata().unwrap()));
    let point = first.downcast_ref::<Point>().unwrap();
    assert_eq!((point.x, point.y), (1, -2));
    let second = copy.raw_get_int(3);
    let point = second.as_userdata().unwrap().downcast_ref::<Point>().unwrap();
    assert_eq!((point.x, point.y), (30, 40));
}

#[test]
fn test_userdata_needs_registered_serializer() {
    let (state, serializer) = point_state();
    let point = LuaValue::userdata(UserdataRef::new(Point {
        x: 0,
        y: 0,
        serializer,
    }));
    let bytes = persist_to_vec(&state, &point).unwrap();

    let bare = LuaState::new();
    match unpersist_from_slice(&bare, &bytes) {
        Err(PersistError::Format(persist::FormatError::UnknownSerializer(name))) => {
            assert_eq!(name, "point");
        }
        other => panic!("expected unknown serializer, got {other:?}"),
    }
}

struct Opaque;

impl LuaUserdata for Opaque {
    fn type_name(&self) -> &str {
        "Opaque"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_userdata_without_serializer_rejected() {
    let state = LuaState::new();
    let value = LuaValue::userdata(UserdataRef::new(Opaque));
    let result = persist_to_vec(&state, &value);
    assert!(matches!(result, Err(PersistError::Internal(_))));
}

struct Wrapper {
    inner: LuaValue,
    serializer: Rc<dyn persist::Serializer>,
}

impl LuaUserdata for Wrapper {
    fn type_name(&self) -> &str {
        "Wrapper"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn serializer(&self) -> Option<Rc<dyn persist::Serializer>> {
        Some(self.serializer.clone())
    }
}

struct WrapperSerializer;

impl persist::Serializer for WrapperSerializer {
    fn name(&self) -> &str {
        "wrapper"
    }

    fn save(&self, writer: &mut ValueWriter<'_>, value: &UserdataRef) -> PersistResult<()> {
        let wrapper = value
            .downcast_ref::<Wrapper>()
            .ok_or_else(|| PersistError::Internal("not a wrapper".to_owned()))?;
        writer.write_value(&wrapper.inner)
    }

    fn load(&self, reader: &mut ValueReader<'_>) -> PersistResult<UserdataRef> {
        let inner = reader.read_value()?;
        let serializer = reader
            .state()
            .serializers()
            .get(self.name())
            .ok_or_else(|| PersistError::Internal("wrapper serializer missing".to_owned()))?;
        Ok(UserdataRef::new(Wrapper { inner, serializer }))
    }
}

#[test]
fn test_nested_userdata_bounded_by_read_depth() {
    let mut state = LuaState::new();
    let serializer: Rc<dyn persist::Serializer> = Rc::new(WrapperSerializer);
    state.serializers_mut().register(serializer.clone());
    let mut value = LuaValue::integer(1);
    for _ in 0..20 {
        value = LuaValue::userdata(UserdataRef::new(Wrapper {
            inner: value,
            serializer: serializer.clone(),
        }));
    }
    let bytes = persist_to_vec(&state, &value).unwrap();

    let shallow = PersistOption {
        max_read_depth: 8,
        ..PersistOption::default()
    };
    let result = persist::unpersist_with(&state, &mut bytes.as_slice(), shallow);
    assert!(matches!(
        result,
        Err(PersistError::Format(persist::FormatError::TooDeep(8)))
    ));

    let copy = unpersist_from_slice(&state, &bytes).unwrap();
    let mut depth = 0;
    let mut cursor = copy;
    while let Some(userdata) = cursor.as_userdata().cloned() {
        let wrapper = userdata.downcast_ref::<Wrapper>().unwrap();
        cursor = wrapper.inner.clone();
        depth += 1;
    }
    assert_eq!(depth, 20);
    assert_eq!(cursor, LuaValue::integer(1));
}
