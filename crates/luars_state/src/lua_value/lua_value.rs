// LuaValue - tagged runtime value
//
// Scalar variants (nil, boolean, number, string, channel) are immutable and
// carried inline. Compound variants (function, userdata, thread, table) are
// shared handles: copying a LuaValue copies the handle, never the object.
// `clone_value` is the one-level structural copy used by snapshots.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::lua_convert::{number_to_string, parse_number};
use crate::lua_value::{LuaChannel, LuaFunction, LuaTable, LuaUserdata};
use crate::lua_vm::LuaState;

/// Shared handle to a table
pub type TableRef = Rc<RefCell<LuaTable>>;
/// Shared handle to a function (native callback or script closure)
pub type FunctionRef = Rc<RefCell<LuaFunction>>;
/// Shared handle to a userdata record
pub type UserdataRef = Rc<RefCell<LuaUserdata>>;
/// Shared handle to a thread, the identity that snapshots restore in place
pub type ThreadRef = Rc<RefCell<LuaState>>;

/// Type tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LuaValueType {
    Nil,
    Boolean,
    Number,
    String,
    Function,
    Userdata,
    Thread,
    Table,
    Channel,
}

impl LuaValueType {
    pub const fn name(self) -> &'static str {
        match self {
            LuaValueType::Nil => "nil",
            LuaValueType::Boolean => "boolean",
            LuaValueType::Number => "number",
            LuaValueType::String => "string",
            LuaValueType::Function => "function",
            LuaValueType::Userdata => "userdata",
            LuaValueType::Thread => "thread",
            LuaValueType::Table => "table",
            LuaValueType::Channel => "channel",
        }
    }
}

impl fmt::Display for LuaValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime value
#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(SmolStr),
    Function(FunctionRef),
    Userdata(UserdataRef),
    Thread(ThreadRef),
    Table(TableRef),
    Channel(LuaChannel),
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
    pub const fn number(n: f64) -> Self {
        LuaValue::Number(n)
    }

    /// Integers share the number representation; they are simply integral floats
    #[inline(always)]
    pub const fn integer(i: i64) -> Self {
        LuaValue::Number(i as f64)
    }

    #[inline]
    pub fn string(s: impl Into<SmolStr>) -> Self {
        LuaValue::String(s.into())
    }

    /// Wrap a freshly built table into a shared handle
    pub fn table(table: LuaTable) -> Self {
        LuaValue::Table(Rc::new(RefCell::new(table)))
    }

    pub fn function(function: LuaFunction) -> Self {
        LuaValue::Function(Rc::new(RefCell::new(function)))
    }

    pub fn userdata(userdata: LuaUserdata) -> Self {
        LuaValue::Userdata(Rc::new(RefCell::new(userdata)))
    }

    pub fn thread(state: LuaState) -> Self {
        LuaValue::Thread(Rc::new(RefCell::new(state)))
    }

    // ============ Type inspection ============

    pub fn type_of(&self) -> LuaValueType {
        match self {
            LuaValue::Nil => LuaValueType::Nil,
            LuaValue::Boolean(_) => LuaValueType::Boolean,
            LuaValue::Number(_) => LuaValueType::Number,
            LuaValue::String(_) => LuaValueType::String,
            LuaValue::Function(_) => LuaValueType::Function,
            LuaValue::Userdata(_) => LuaValueType::Userdata,
            LuaValue::Thread(_) => LuaValueType::Thread,
            LuaValue::Table(_) => LuaValueType::Table,
            LuaValue::Channel(_) => LuaValueType::Channel,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// `nil` and `false` are the only false values
    #[inline(always)]
    pub fn is_false(&self) -> bool {
        matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    /// Truthiness: the negation of `is_false`
    #[inline(always)]
    pub fn as_bool(&self) -> bool {
        !self.is_false()
    }

    #[inline(always)]
    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Number(_))
    }

    /// A number is integral when it round-trips through i64
    pub fn is_integer(&self) -> bool {
        self.as_integer().is_some()
    }

    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_))
    }

    // ============ Narrowing accessors ============

    #[inline(always)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Number(n) => float_to_integer(*n),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            LuaValue::Function(f) => Some(f),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&UserdataRef> {
        match self {
            LuaValue::Userdata(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadRef> {
        match self {
            LuaValue::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&LuaChannel> {
        match self {
            LuaValue::Channel(c) => Some(c),
            _ => None,
        }
    }

    // ============ Lossy conversions ============

    /// Text of a string or number, otherwise an empty string
    pub fn as_string_lossy(&self) -> String {
        match self {
            LuaValue::String(s) => s.to_string(),
            LuaValue::Number(n) => number_to_string(*n),
            _ => String::new(),
        }
    }

    pub fn can_convert_to_string(&self) -> bool {
        matches!(self, LuaValue::String(_) | LuaValue::Number(_))
    }

    /// A number, a string that parses as one, otherwise 0
    pub fn as_number_lossy(&self) -> f64 {
        match self {
            LuaValue::Number(n) => *n,
            LuaValue::String(s) => parse_number(s).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    // ============ Clone protocol ============

    /// One-level structural copy.
    ///
    /// Scalars come back unchanged. Tables, functions, userdata and threads
    /// get a new top-level record whose owned containers are duplicated, while
    /// the values inside those containers stay shared with the source.
    pub fn clone_value(&self) -> LuaValue {
        match self {
            LuaValue::Table(t) => LuaValue::Table(LuaTable::clone_ref(t)),
            LuaValue::Function(f) => LuaValue::function(f.borrow().clone_function()),
            LuaValue::Userdata(u) => LuaValue::userdata(u.borrow().clone_userdata()),
            LuaValue::Thread(t) => match t.try_borrow() {
                Ok(state) => LuaValue::thread(state.clone_state()),
                // the thread is running right now and cannot be observed
                Err(_) => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Identity comparison for compound values, equality for scalars
    pub fn raw_equal(&self, other: &LuaValue) -> bool {
        self == other
    }

    fn ptr_addr(&self) -> usize {
        match self {
            LuaValue::Function(f) => Rc::as_ptr(f) as *const u8 as usize,
            LuaValue::Userdata(u) => Rc::as_ptr(u) as *const u8 as usize,
            LuaValue::Thread(t) => Rc::as_ptr(t) as *const u8 as usize,
            LuaValue::Table(t) => Rc::as_ptr(t) as *const u8 as usize,
            LuaValue::Channel(c) => c.addr(),
            _ => 0,
        }
    }
}

/// Convert a float to i64 when it is integral and inside the i64 range
#[inline]
pub(crate) fn float_to_integer(n: f64) -> Option<i64> {
    // `as` saturates, so 2^63 would come back as i64::MAX
    if !(-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&n) {
        return None;
    }
    let i = n as i64;
    if i as f64 == n { Some(i) } else { None }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Function(a), LuaValue::Function(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Userdata(a), LuaValue::Userdata(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Table(a), LuaValue::Table(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Channel(a), LuaValue::Channel(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// NaN never reaches a hash part, so equality is reflexive for every stored key
impl Eq for LuaValue {}

impl Hash for LuaValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LuaValue::Nil => {}
            LuaValue::Boolean(b) => b.hash(state),
            LuaValue::Number(n) => {
                // 0.0 and -0.0 compare equal and must hash equal
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state);
            }
            LuaValue::String(s) => s.hash(state),
            _ => self.ptr_addr().hash(state),
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => f.write_str("nil"),
            LuaValue::Boolean(true) => f.write_str("true"),
            LuaValue::Boolean(false) => f.write_str("false"),
            LuaValue::Number(n) => f.write_str(&number_to_string(*n)),
            LuaValue::String(s) => f.write_str(s),
            other => write!(f, "{}: {:#x}", other.type_name(), other.ptr_addr()),
        }
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::String(s) => write!(f, "{:?}", s.as_str()),
            other => fmt::Display::fmt(other, f),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<i64> for LuaValue {
    fn from(i: i64) -> Self {
        LuaValue::integer(i)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::String(SmolStr::new(s))
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::String(SmolStr::from(s))
    }
}

impl From<TableRef> for LuaValue {
    fn from(t: TableRef) -> Self {
        LuaValue::Table(t)
    }
}

impl From<FunctionRef> for LuaValue {
    fn from(f: FunctionRef) -> Self {
        LuaValue::Function(f)
    }
}

impl From<LuaChannel> for LuaValue {
    fn from(c: LuaChannel) -> Self {
        LuaValue::Channel(c)
    }
}
