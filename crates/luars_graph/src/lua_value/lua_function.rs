use crate::lua_value::{LuaValue, ProtoRef, StackRef, TableRef, UpvalueRef};

/// Debug record of a local variable's live range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalVariable {
    pub name: LuaValue,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// Compiled function template shared by every closure built from it.
#[derive(Debug, Clone, Default)]
pub struct Prototype {
    pub source: LuaValue,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_upvalues: u32,
    pub num_params: u32,
    pub is_vararg: bool,
    pub max_stack_size: u32,
    pub constants: Vec<LuaValue>,
    pub code: Vec<u32>,
    pub protos: Vec<ProtoRef>,
    pub line_info: Vec<u32>,
    pub local_vars: Vec<LocalVariable>,
    pub upvalue_names: Vec<LuaValue>,
}

/// A captured variable: a cell of some value stack.
#[derive(Debug, Clone)]
pub struct Upvalue {
    pub stack: StackRef,
    pub index: usize,
}

impl Upvalue {
    pub fn new(stack: StackRef, index: usize) -> Self {
        Upvalue { stack, index }
    }

    pub fn get(&self) -> LuaValue {
        self.stack.borrow().get(self.index).cloned().unwrap_or_default()
    }

    pub fn set(&self, value: LuaValue) {
        if let Some(cell) = self.stack.borrow_mut().get_mut(self.index) {
            *cell = value;
        }
    }
}

#[derive(Debug, Clone)]
pub struct LuaClosure {
    pub proto: ProtoRef,
    pub upvalues: Vec<UpvalueRef>,
    pub env: Option<TableRef>,
}

impl LuaClosure {
    pub fn new(proto: ProtoRef, env: Option<TableRef>) -> Self {
        LuaClosure {
            proto,
            upvalues: Vec::new(),
            env,
        }
    }
}
