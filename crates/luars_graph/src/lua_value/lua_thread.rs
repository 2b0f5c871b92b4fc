// Coroutine state as far as the object graph is concerned: the value stack,
// the call frames that reference closures, the environment and debug hooks.
use crate::gc::Gc;
use crate::lua_value::{ClosureRef, LuaValue, StackRef, TableRef};
use crate::persist::{FormatError, PersistResult, ValueReader, ValueWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CoroutineStatus {
    #[default]
    Suspended = 0,
    Running = 1,
    Normal = 2,
    Dead = 3,
}

impl CoroutineStatus {
    pub fn from_u8(status: u8) -> Option<Self> {
        match status {
            0 => Some(CoroutineStatus::Suspended),
            1 => Some(CoroutineStatus::Running),
            2 => Some(CoroutineStatus::Normal),
            3 => Some(CoroutineStatus::Dead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub closure: ClosureRef,
    pub pc: u32,
    /// Stack index of the frame's first register.
    pub base: u32,
}

#[derive(Debug, Clone)]
pub struct ThreadState {
    pub status: CoroutineStatus,
    pub stack: StackRef,
    pub frames: Vec<CallFrame>,
}

impl Default for ThreadState {
    fn default() -> Self {
        ThreadState {
            status: CoroutineStatus::Suspended,
            stack: Gc::new(Vec::new()),
            frames: Vec::new(),
        }
    }
}

/// Per-thread hook configuration.
#[derive(Debug, Clone, Default)]
pub struct DebugState {
    pub hook: LuaValue,
    pub hook_mask: u8,
    pub hook_count: u32,
    pub in_hook: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LuaThread {
    pub state: ThreadState,
    pub env: Option<TableRef>,
    pub error_func: Option<LuaValue>,
    pub debug: DebugState,
}

impl LuaThread {
    pub fn new(env: Option<TableRef>) -> Self {
        LuaThread {
            env,
            ..Default::default()
        }
    }
}

impl ThreadState {
    /// Status byte, value stack, then each call frame as closure, pc, base.
    pub fn write(&self, writer: &mut ValueWriter<'_>) -> PersistResult<()> {
        writer.write_byte(self.status as u8)?;
        writer.write_stack(&self.stack)?;
        writer.write_len(self.frames.len())?;
        for frame in &self.frames {
            writer.write_closure(&frame.closure)?;
            writer.write_var_int(frame.pc)?;
            writer.write_var_int(frame.base)?;
        }
        Ok(())
    }

    pub fn read(reader: &mut ValueReader<'_>) -> PersistResult<Self> {
        let status = reader.read_byte()?;
        let status = CoroutineStatus::from_u8(status).ok_or(FormatError::InvalidStatus(status))?;
        let stack = reader.read_stack()?;
        let count = reader.read_len()?;
        let mut frames = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let closure = reader.read_closure()?;
            let pc = reader.read_var_int()?;
            let base = reader.read_var_int()?;
            frames.push(CallFrame { closure, pc, base });
        }
        Ok(ThreadState {
            status,
            stack,
            frames,
        })
    }
}

impl DebugState {
    /// Hook value, mask byte, hook count. `in_hook` travels in the thread's flag byte.
    pub fn write(&self, writer: &mut ValueWriter<'_>) -> PersistResult<()> {
        writer.write_value(&self.hook)?;
        writer.write_byte(self.hook_mask)?;
        writer.write_var_int(self.hook_count)
    }

    pub fn read(reader: &mut ValueReader<'_>) -> PersistResult<Self> {
        let hook = reader.read_value()?;
        let hook_mask = reader.read_byte()?;
        let hook_count = reader.read_var_int()?;
        Ok(DebugState {
            hook,
            hook_mask,
            hook_count,
            in_hook: false,
        })
    }
}
