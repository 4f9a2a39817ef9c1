use crate::symbol::Symbol;

/// Handle of a heap object inside its memory pool.
///
/// Handles are arena indices; they stay valid for as long as the object is
/// reachable from a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjRef(u32);

impl ObjRef {
    #[inline(always)]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A reference resolved late through a global table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicPointer {
    /// Index into the numbered magic-pointer table.
    Numbered(u32),
    /// Keyed by a symbol in the named magic-pointer table.
    Named(Symbol),
}

/// A runtime value.
///
/// This is the decoded form of a 32-bit reference word. The bit packing is
/// only materialised at the serialisation boundary, see [`crate::tagged`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// 30-bit signed integer.
    Int(i32),
    /// Heap object.
    Ref(ObjRef),
    /// Unicode character.
    Char(char),
    /// Other immediates (NIL, TRUE, UNBOUND, ...), stored as the raw word.
    Special(u32),
    /// Interned symbol.
    Symbol(Symbol),
    /// Late-bound reference.
    Magic(MagicPointer),
}

impl Value {
    pub const NIL: Value = Value::Special(0x2);
    pub const TRUE: Value = Value::Special(0x1A);
    pub const UNBOUND: Value = Value::Special(0xFFF2);

    pub const INT_MIN: i32 = -(1 << 29);
    pub const INT_MAX: i32 = (1 << 29) - 1;

    /// Integer value, or `None` when `n` does not fit in 30 bits.
    #[inline]
    pub fn int(n: i64) -> Option<Value> {
        if (Self::INT_MIN as i64..=Self::INT_MAX as i64).contains(&n) {
            Some(Value::Int(n as i32))
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn from_bool(b: bool) -> Value {
        if b { Value::TRUE } else { Value::NIL }
    }

    #[inline(always)]
    pub const fn is_nil(self) -> bool {
        matches!(self, Value::Special(0x2))
    }

    /// Everything except NIL counts as true.
    #[inline(always)]
    pub const fn is_truthy(self) -> bool {
        !self.is_nil()
    }

    #[inline(always)]
    pub const fn is_ref(self) -> bool {
        matches!(self, Value::Ref(_))
    }

    #[inline(always)]
    pub const fn as_int(self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_ref(self) -> Option<ObjRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_symbol(self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_char(self) -> Option<char> {
        match self {
            Value::Char(c) => Some(c),
            _ => None,
        }
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Ref(r) => write!(f, "Ref(#{})", r.raw()),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::Special(0x2) => write!(f, "NIL"),
            Value::Special(0x1A) => write!(f, "TRUE"),
            Value::Special(0xFFF2) => write!(f, "UNBOUND"),
            Value::Special(raw) => write!(f, "Special(0x{raw:x})"),
            Value::Symbol(s) => write!(f, "Symbol(#{})", s.raw()),
            Value::Magic(MagicPointer::Numbered(n)) => write!(f, "Magic({n})"),
            Value::Magic(MagicPointer::Named(s)) => {
                write!(f, "Magic(#{})", s.raw())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_bool(b)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Ref(r)
    }
}
