//! 32-bit reference words.
//!
//! ```text
//! ...XXXX00  integer, arithmetic shift by 2
//! ...XXXX01  pointer: object index << 2 (bit 31 set: symbol space)
//! ...XXXX10  immediate: NIL 0x2, TRUE 0x1A, UNBOUND 0xFFF2,
//!            character (code << 4) | 0b0110
//! ...XXXX11  magic pointer: numbered (n << 2), named (bit 31 | sym << 2)
//! ```

use crate::symbol::Symbol;
use crate::value::{MagicPointer, ObjRef, Value};

pub const TAG_MASK: u32 = 0b11;
pub const INT_TAG: u32 = 0b00;
pub const POINTER_TAG: u32 = 0b01;
pub const IMMEDIATE_TAG: u32 = 0b10;
pub const MAGIC_TAG: u32 = 0b11;

const CHAR_MASK: u32 = 0b1111;
const CHAR_TAG: u32 = 0b0110;

/// Index bit separating symbols from ordinary objects in pointer words.
pub const SYMBOL_SPACE: u32 = 1 << 29;
/// Largest object, symbol or numbered magic index a word can carry.
pub const MAX_INDEX: u32 = SYMBOL_SPACE - 1;

const NAMED_MAGIC_BIT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("integer {0} does not fit in 30 bits")]
    IntOutOfRange(i32),
    #[error("index {0} exceeds the reference range")]
    IndexOutOfRange(u32),
    #[error("immediate word 0x{0:x} collides with another tag")]
    BadImmediate(u32),
}

fn check_index(index: u32) -> Result<u32, EncodeError> {
    if index > MAX_INDEX {
        Err(EncodeError::IndexOutOfRange(index))
    } else {
        Ok(index)
    }
}

/// Pack a value into its 32-bit word.
pub fn encode(value: Value) -> Result<u32, EncodeError> {
    match value {
        Value::Int(n) => {
            if !(Value::INT_MIN..=Value::INT_MAX).contains(&n) {
                return Err(EncodeError::IntOutOfRange(n));
            }
            Ok((n as u32) << 2)
        }
        Value::Ref(r) => Ok((check_index(r.raw())? << 2) | POINTER_TAG),
        Value::Symbol(s) => {
            Ok(((check_index(s.raw())? | SYMBOL_SPACE) << 2) | POINTER_TAG)
        }
        Value::Char(c) => Ok(((c as u32) << 4) | CHAR_TAG),
        Value::Special(raw) => {
            if raw & TAG_MASK != IMMEDIATE_TAG || raw & CHAR_MASK == CHAR_TAG {
                return Err(EncodeError::BadImmediate(raw));
            }
            Ok(raw)
        }
        Value::Magic(MagicPointer::Numbered(n)) => {
            Ok((check_index(n)? << 2) | MAGIC_TAG)
        }
        Value::Magic(MagicPointer::Named(s)) => {
            Ok(NAMED_MAGIC_BIT | (check_index(s.raw())? << 2) | MAGIC_TAG)
        }
    }
}

/// Unpack a 32-bit word. Every word decodes to exactly one kind.
pub fn decode(raw: u32) -> Value {
    match raw & TAG_MASK {
        INT_TAG => Value::Int((raw as i32) >> 2),
        POINTER_TAG => {
            let index = raw >> 2;
            if index & SYMBOL_SPACE != 0 {
                Value::Symbol(Symbol::from_index(index & MAX_INDEX))
            } else {
                Value::Ref(ObjRef::from_index(index))
            }
        }
        IMMEDIATE_TAG => {
            if raw & CHAR_MASK == CHAR_TAG {
                if let Some(c) = char::from_u32(raw >> 4) {
                    return Value::Char(c);
                }
            }
            Value::Special(raw)
        }
        _ => {
            if raw & NAMED_MAGIC_BIT != 0 {
                let index = (raw & !NAMED_MAGIC_BIT) >> 2;
                Value::Magic(MagicPointer::Named(Symbol::from_index(index)))
            } else {
                Value::Magic(MagicPointer::Numbered(raw >> 2))
            }
        }
    }
}
