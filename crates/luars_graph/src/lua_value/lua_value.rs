// LuaValue: the tagged value every slot, stack cell and upvalue holds.
//
// Inline kinds (nil, boolean, integer, float) are copied by value. Strings are
// shared immutable buffers. Tables, functions, threads and userdata are
// reference kinds: cloning a value clones the handle, never the object.
use std::fmt;
use std::rc::Rc;

use crate::lua_value::{ClosureRef, LuaString, TableRef, ThreadRef, UserdataRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaValueKind {
    Nil,
    Boolean,
    Integer,
    Float,
    String,
    Table,
    Function,
    Thread,
    Userdata,
}

#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Rc<LuaString>),
    Table(TableRef),
    Function(ClosureRef),
    Thread(ThreadRef),
    Userdata(UserdataRef),
}

/// Float with an exact `i64` representation, as that integer.
#[inline]
pub(crate) fn float_to_integer(n: f64) -> Option<i64> {
    // 2^63 is exactly representable; the range is half-open on purpose.
    const LIMIT: f64 = 9223372036854775808.0;
    if n.floor() == n && (-LIMIT..LIMIT).contains(&n) {
        Some(n as i64)
    } else {
        None
    }
}

#[inline]
fn mix(x: u64) -> u64 {
    let h = x.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^ (h >> 32)
}

impl LuaValue {
    // ============ Constructors ============

    #[inline(always)]
    pub const fn nil() -> Self {
        LuaValue::Nil
    }

    #[inline(always)]
    pub const fn boolean(b: bool) -> Self {
        LuaValue::Boolean(b)
    }

    #[inline(always)]
    pub const fn integer(i: i64) -> Self {
        LuaValue::Integer(i)
    }

    #[inline(always)]
    pub const fn float(n: f64) -> Self {
        LuaValue::Float(n)
    }

    pub fn string(s: &str) -> Self {
        LuaValue::String(Rc::new(LuaString::from(s)))
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        LuaValue::String(Rc::new(LuaString::from(bytes)))
    }

    #[inline(always)]
    pub fn table(table: TableRef) -> Self {
        LuaValue::Table(table)
    }

    #[inline(always)]
    pub fn function(closure: ClosureRef) -> Self {
        LuaValue::Function(closure)
    }

    #[inline(always)]
    pub fn thread(thread: ThreadRef) -> Self {
        LuaValue::Thread(thread)
    }

    #[inline(always)]
    pub fn userdata(userdata: UserdataRef) -> Self {
        LuaValue::Userdata(userdata)
    }

    // ============ Type queries ============

    pub fn kind(&self) -> LuaValueKind {
        match self {
            LuaValue::Nil => LuaValueKind::Nil,
            LuaValue::Boolean(_) => LuaValueKind::Boolean,
            LuaValue::Integer(_) => LuaValueKind::Integer,
            LuaValue::Float(_) => LuaValueKind::Float,
            LuaValue::String(_) => LuaValueKind::String,
            LuaValue::Table(_) => LuaValueKind::Table,
            LuaValue::Function(_) => LuaValueKind::Function,
            LuaValue::Thread(_) => LuaValueKind::Thread,
            LuaValue::Userdata(_) => LuaValueKind::Userdata,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            LuaValueKind::Nil => "nil",
            LuaValueKind::Boolean => "boolean",
            LuaValueKind::Integer | LuaValueKind::Float => "number",
            LuaValueKind::String => "string",
            LuaValueKind::Table => "table",
            LuaValueKind::Function => "function",
            LuaValueKind::Thread => "thread",
            LuaValueKind::Userdata => "userdata",
        }
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    #[inline(always)]
    pub fn is_boolean(&self) -> bool {
        matches!(self, LuaValue::Boolean(_))
    }

    #[inline(always)]
    pub fn is_integer(&self) -> bool {
        matches!(self, LuaValue::Integer(_))
    }

    #[inline(always)]
    pub fn is_float(&self) -> bool {
        matches!(self, LuaValue::Float(_))
    }

    #[inline(always)]
    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Integer(_) | LuaValue::Float(_))
    }

    #[inline(always)]
    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::String(_))
    }

    #[inline(always)]
    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    #[inline(always)]
    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_))
    }

    #[inline(always)]
    pub fn is_thread(&self) -> bool {
        matches!(self, LuaValue::Thread(_))
    }

    #[inline(always)]
    pub fn is_userdata(&self) -> bool {
        matches!(self, LuaValue::Userdata(_))
    }

    #[inline(always)]
    pub fn is_nan(&self) -> bool {
        matches!(self, LuaValue::Float(n) if n.is_nan())
    }

    /// Kinds that a weak table may hold weakly. Strings are values, not objects.
    #[inline(always)]
    pub fn is_weakable(&self) -> bool {
        matches!(
            self,
            LuaValue::Table(_) | LuaValue::Function(_) | LuaValue::Thread(_) | LuaValue::Userdata(_)
        )
    }

    // ============ Accessors ============

    #[inline(always)]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LuaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            LuaValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value of either number kind.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Integer(i) => Some(*i as f64),
            LuaValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_lua_string(&self) -> Option<&Rc<LuaString>> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_lua_string().and_then(|s| s.as_str())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.as_lua_string().map(|s| s.as_bytes())
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ClosureRef> {
        match self {
            LuaValue::Function(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadRef> {
        match self {
            LuaValue::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&UserdataRef> {
        match self {
            LuaValue::Userdata(u) => Some(u),
            _ => None,
        }
    }

    // ============ Raw semantics ============

    /// Primitive equality: no metamethods. Numbers compare by mathematical
    /// value across kinds, strings by content, reference kinds by identity.
    pub fn raw_eq(&self, other: &LuaValue) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Integer(a), LuaValue::Integer(b)) => a == b,
            (LuaValue::Float(a), LuaValue::Float(b)) => a == b,
            (LuaValue::Integer(i), LuaValue::Float(n)) | (LuaValue::Float(n), LuaValue::Integer(i)) => {
                float_to_integer(*n) == Some(*i)
            }
            (LuaValue::String(a), LuaValue::String(b)) => Rc::ptr_eq(a, b) || a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => a.ptr_eq(b),
            (LuaValue::Function(a), LuaValue::Function(b)) => a.ptr_eq(b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => a.ptr_eq(b),
            (LuaValue::Userdata(a), LuaValue::Userdata(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Hash consistent with `raw_eq`: floats with an integral value hash as
    /// the integer they equal.
    pub fn key_hash(&self) -> u64 {
        match self {
            LuaValue::Nil => 0,
            LuaValue::Boolean(b) => mix(*b as u64 + 1),
            LuaValue::Integer(i) => mix(*i as u64),
            LuaValue::Float(n) => match float_to_integer(*n) {
                Some(i) => mix(i as u64),
                None => mix(n.to_bits()),
            },
            LuaValue::String(s) => s.cached_hash(),
            LuaValue::Table(t) => mix(t.addr() as u64),
            LuaValue::Function(c) => mix(c.addr() as u64),
            LuaValue::Thread(t) => mix(t.addr() as u64),
            LuaValue::Userdata(u) => mix(u.addr() as u64),
        }
    }

    /// Canonical form of a table key: floats with an exact integer value
    /// become that integer.
    pub fn normalize_key(self) -> LuaValue {
        match self {
            LuaValue::Float(n) => match float_to_integer(n) {
                Some(i) => LuaValue::Integer(i),
                None => LuaValue::Float(n),
            },
            other => other,
        }
    }

    /// Index into an array region of `capacity` slots, for keys `1..=capacity`.
    #[inline]
    pub fn array_index(&self, capacity: usize) -> Option<usize> {
        let i = match self {
            LuaValue::Integer(i) => *i,
            LuaValue::Float(n) => float_to_integer(*n)?,
            _ => return None,
        };
        if i >= 1 && (i as u64) <= capacity as u64 {
            Some(i as usize - 1)
        } else {
            None
        }
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw_eq(other)
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{}", b),
            LuaValue::Integer(i) => write!(f, "{}", i),
            LuaValue::Float(n) => write!(f, "{:?}", n),
            LuaValue::String(s) => write!(f, "{:?}", s),
            LuaValue::Table(t) => write!(f, "table(0x{:x})", t.addr()),
            LuaValue::Function(c) => write!(f, "function(0x{:x})", c.addr()),
            LuaValue::Thread(t) => write!(f, "thread(0x{:x})", t.addr()),
            LuaValue::Userdata(u) => write!(f, "userdata(0x{:x})", u.addr()),
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{}", b),
            LuaValue::Integer(i) => {
                let mut buffer = itoa::Buffer::new();
                f.write_str(buffer.format(*i))
            }
            LuaValue::Float(n) => {
                if n.floor() == *n && n.abs() < 1e14 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            LuaValue::String(s) => write!(f, "{}", s),
            LuaValue::Table(t) => write!(f, "table: 0x{:x}", t.addr()),
            LuaValue::Function(c) => write!(f, "function: 0x{:x}", c.addr()),
            LuaValue::Thread(t) => write!(f, "thread: 0x{:x}", t.addr()),
            LuaValue::Userdata(u) => write!(f, "{}: 0x{:x}", u.type_name(), u.addr()),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<i64> for LuaValue {
    fn from(i: i64) -> Self {
        LuaValue::Integer(i)
    }
}

impl From<i32> for LuaValue {
    fn from(i: i32) -> Self {
        LuaValue::Integer(i as i64)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Float(n)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::string(s)
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::String(Rc::new(LuaString::from(s)))
    }
}

impl From<TableRef> for LuaValue {
    fn from(table: TableRef) -> Self {
        LuaValue::Table(table)
    }
}

impl From<ClosureRef> for LuaValue {
    fn from(closure: ClosureRef) -> Self {
        LuaValue::Function(closure)
    }
}

impl From<ThreadRef> for LuaValue {
    fn from(thread: ThreadRef) -> Self {
        LuaValue::Thread(thread)
    }
}

impl From<UserdataRef> for LuaValue {
    fn from(userdata: UserdataRef) -> Self {
        LuaValue::Userdata(userdata)
    }
}
