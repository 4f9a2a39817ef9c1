//! The frequent primitives reached through the freq-func instruction.

use std::cmp::Ordering;

use bytecode::FreqFunc;
use object::{HeapObject, Value};

use super::{expect_char, expect_int};
use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

impl Interpreter {
    /// Run `func` on arguments given in push order.
    pub fn freq_func(&mut self, func: FreqFunc, args: &[Value]) -> Result<Value> {
        if args.len() != func.arity() {
            return Err(RuntimeError::new(ErrorCode::WrongNumberOfArgs)
                .detail(format!("{} takes {}", func.name(), func.arity())));
        }
        let arg = |i: usize| args.get(i).copied().unwrap_or(Value::NIL);
        let (a, b) = (arg(0), arg(1));
        match func {
            FreqFunc::Add => self.add(a, b),
            FreqFunc::Subtract => self.subtract(a, b),
            FreqFunc::Multiply => self.multiply(a, b),
            FreqFunc::Divide => self.divide(a, b),
            FreqFunc::Div => self.div(a, b),
            FreqFunc::Aref => self.aref(a, b),
            FreqFunc::SetAref => {
                let value = arg(2);
                self.set_aref(a, b, value)?;
                Ok(value)
            }
            FreqFunc::Equals => Ok(Value::from_bool(self.equals(a, b))),
            FreqFunc::NotEquals => Ok(Value::from_bool(!self.equals(a, b))),
            FreqFunc::Not => Ok(Value::from_bool(a.is_nil())),
            FreqFunc::LessThan => self.ordered(a, b, |o| o == Ordering::Less),
            FreqFunc::GreaterThan => self.ordered(a, b, |o| o == Ordering::Greater),
            FreqFunc::GreaterOrEqual => self.ordered(a, b, |o| o != Ordering::Less),
            FreqFunc::LessOrEqual => self.ordered(a, b, |o| o != Ordering::Greater),
            FreqFunc::BitAnd => self.bitwise(a, b, |x, y| x & y),
            FreqFunc::BitOr => self.bitwise(a, b, |x, y| x | y),
            FreqFunc::BitNot => self.bitwise(a, Value::Int(0), |x, _| !x),
            FreqFunc::NewIterator => self.new_iterator(a, b.is_truthy()),
            FreqFunc::Length => self.length(a),
            FreqFunc::Clone => Ok(self.clone_value(a)),
            FreqFunc::SetClass => {
                self.set_class(a, b)?;
                Ok(a)
            }
            FreqFunc::AddArraySlot => {
                self.array_append(a, b)?;
                Ok(b)
            }
            FreqFunc::Stringer => self.stringer(a),
            FreqFunc::HasPath => Ok(Value::from_bool(self.has_path(a, b))),
            FreqFunc::ClassOf => Ok(self.class_of(a)),
        }
    }

    fn ordered(&self, a: Value, b: Value, test: fn(Ordering) -> bool) -> Result<Value> {
        Ok(Value::from_bool(test(self.compare(a, b)?)))
    }

    fn bitwise(&mut self, a: Value, b: Value, op: fn(i64, i64) -> i64) -> Result<Value> {
        let x = expect_int(a)?;
        let y = expect_int(b)?;
        Ok(self.number_value(super::Number::Int(op(x, y))))
    }

    /// Element of an array, character of a string, or byte of a binary.
    pub fn aref(&self, obj: Value, index: Value) -> Result<Value> {
        let i = expect_int(index)?;
        if self.is_array(obj) {
            return self.array_get(obj, i);
        }
        let binary = self
            .binary(obj)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedArray, obj))?;
        if self.is_string(obj) {
            let units = string_units(&binary.data);
            let unit = check_index(obj, i, units)?;
            let code = u16::from_be_bytes([binary.data[unit * 2], binary.data[unit * 2 + 1]]);
            let c = char::from_u32(code.into()).unwrap_or(char::REPLACEMENT_CHARACTER);
            return Ok(Value::Char(c));
        }
        let byte = check_index(obj, i, binary.data.len())?;
        Ok(Value::Int(binary.data[byte].into()))
    }

    pub fn set_aref(&mut self, obj: Value, index: Value, value: Value) -> Result<()> {
        let i = expect_int(index)?;
        if self.is_array(obj) {
            return self.array_set(obj, i, value);
        }
        if self.is_string(obj) {
            let c = expect_char(value)?;
            let code = u16::try_from(u32::from(c))
                .map_err(|_| RuntimeError::with_value(ErrorCode::ExpectedCharacter, value))?;
            let data = &mut self.binary_mut(obj)?.data;
            let unit = check_index(obj, i, string_units(data))?;
            data[unit * 2..unit * 2 + 2].copy_from_slice(&code.to_be_bytes());
            return Ok(());
        }
        let byte = match value {
            Value::Int(n) => u8::try_from(n)
                .map_err(|_| RuntimeError::with_value(ErrorCode::OutOfBounds, value))?,
            Value::Char(c) => u8::try_from(u32::from(c))
                .map_err(|_| RuntimeError::with_value(ErrorCode::OutOfBounds, value))?,
            other => return Err(RuntimeError::with_value(ErrorCode::ExpectedInteger, other)),
        };
        let data = &mut self.binary_mut(obj)?.data;
        let at = check_index(obj, i, data.len())?;
        data[at] = byte;
        Ok(())
    }

    /// Element count of an array, slot count of a frame, byte count of a
    /// binary.
    pub fn length(&self, v: Value) -> Result<Value> {
        let len = match v.as_ref().and_then(|r| self.heap.get(r)) {
            Some(HeapObject::Array(a)) => a.elements.len(),
            Some(HeapObject::Frame(f)) => f.values.len(),
            Some(HeapObject::Binary(b)) => b.data.len(),
            None => return Err(RuntimeError::with_value(ErrorCode::ExpectedFrameOrArray, v)),
        };
        Value::int(len as i64).ok_or_else(|| RuntimeError::with_value(ErrorCode::OutOfBounds, v))
    }

    /// Class symbol of any value. NIL has no class.
    pub fn class_of(&self, v: Value) -> Value {
        let names = &self.names;
        match self.resolve_magic(v) {
            Value::Int(_) => Value::Symbol(names.int),
            Value::Char(_) => Value::Symbol(names.char_),
            Value::Symbol(_) => Value::Symbol(names.symbol),
            v if v.is_nil() => Value::NIL,
            v if v == Value::TRUE => Value::Symbol(names.boolean),
            Value::Special(_) | Value::Magic(_) => Value::Symbol(names.weird_immediate),
            v @ Value::Ref(r) => match self.heap.get(r) {
                Some(HeapObject::Binary(b)) => b.class,
                Some(HeapObject::Array(a)) => a.class,
                Some(HeapObject::Frame(_)) => self
                    .proto_lookup(v, names.class)
                    .map_or(Value::Symbol(names.frame), |(_, class)| class),
                None => Value::NIL,
            },
        }
    }

    /// Concatenated text of an array's elements.
    pub fn stringer(&mut self, v: Value) -> Result<Value> {
        let mut text = String::new();
        for &element in &self.array(v)?.elements {
            let piece = self
                .display_text(element)
                .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedString, element))?;
            text.push_str(&piece);
        }
        Ok(self.new_string(&text))
    }
}

/// UTF-16 units of a string payload, terminator excluded.
fn string_units(data: &[u8]) -> usize {
    data.chunks_exact(2)
        .take_while(|pair| *pair != [0, 0])
        .count()
}

fn check_index(obj: Value, index: i64, len: usize) -> Result<usize> {
    if index < 0 || index as u64 >= len as u64 {
        return Err(RuntimeError::with_value(ErrorCode::OutOfBounds, obj).index(index));
    }
    Ok(index as usize)
}

#[cfg(test)]
mod tests {
    use object::Symbol;

    use super::*;

    // ── Arithmetic and comparison ──────────────────────────────────

    #[test]
    fn comparisons_and_logic() {
        let mut interp = Interpreter::default();
        let t = |interp: &mut Interpreter, f: FreqFunc, a: i32, b: i32| {
            interp.freq_func(f, &[Value::Int(a), Value::Int(b)]).unwrap()
        };
        assert_eq!(t(&mut interp, FreqFunc::LessThan, 1, 2), Value::TRUE);
        assert_eq!(t(&mut interp, FreqFunc::GreaterThan, 1, 2), Value::NIL);
        assert_eq!(t(&mut interp, FreqFunc::LessOrEqual, 2, 2), Value::TRUE);
        assert_eq!(t(&mut interp, FreqFunc::GreaterOrEqual, 1, 2), Value::NIL);
        assert_eq!(t(&mut interp, FreqFunc::NotEquals, 1, 2), Value::TRUE);
        assert_eq!(t(&mut interp, FreqFunc::BitAnd, 6, 3), Value::Int(2));
        assert_eq!(t(&mut interp, FreqFunc::BitOr, 6, 3), Value::Int(7));
        assert_eq!(
            interp.freq_func(FreqFunc::BitNot, &[Value::Int(0)]).unwrap(),
            Value::Int(-1)
        );
        assert_eq!(interp.freq_func(FreqFunc::Not, &[Value::NIL]).unwrap(), Value::TRUE);
    }

    #[test]
    fn arity_is_checked() {
        let mut interp = Interpreter::default();
        let err = interp.freq_func(FreqFunc::Add, &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::WrongNumberOfArgs));
    }

    // ── Indexing ───────────────────────────────────────────────────

    #[test]
    fn aref_on_arrays_strings_and_binaries() {
        let mut interp = Interpreter::default();
        let array = interp.new_array(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(interp.aref(array, Value::Int(1)).unwrap(), Value::Int(20));

        let s = interp.new_string("héllo");
        assert_eq!(interp.aref(s, Value::Int(1)).unwrap(), Value::Char('é'));
        let err = interp.aref(s, Value::Int(5)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OutOfBounds));

        let class = interp.sym("bytes");
        let bin = interp.alloc_binary(class, vec![1, 2, 255]);
        assert_eq!(interp.aref(bin, Value::Int(2)).unwrap(), Value::Int(255));
    }

    #[test]
    fn set_aref_writes_in_place() {
        let mut interp = Interpreter::default();
        let s = interp.new_string("cat");
        let result = interp
            .freq_func(FreqFunc::SetAref, &[s, Value::Int(0), Value::Char('b')])
            .unwrap();
        assert_eq!(result, Value::Char('b'));
        assert_eq!(interp.string_text(s).as_deref(), Some("bat"));

        let class = interp.sym("bytes");
        let bin = interp.alloc_binary(class, vec![0; 2]);
        interp.set_aref(bin, Value::Int(1), Value::Int(7)).unwrap();
        assert_eq!(interp.binary(bin).unwrap().data, vec![0, 7]);
        let err = interp.set_aref(bin, Value::Int(0), Value::Int(256)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OutOfBounds));

        interp.freeze(s);
        let err = interp.set_aref(s, Value::Int(0), Value::Char('x')).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ReadOnly));
    }

    // ── Objects ────────────────────────────────────────────────────

    #[test]
    fn length_of_each_kind() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        let frame = interp.new_frame_with(&[(a, Value::Int(1))]);
        let array = interp.new_array(vec![Value::NIL; 3]);
        let s = interp.new_string("ab");
        assert_eq!(interp.length(frame).unwrap(), Value::Int(1));
        assert_eq!(interp.length(array).unwrap(), Value::Int(3));
        assert_eq!(interp.length(s).unwrap(), Value::Int(6));
        assert!(interp.length(Value::Int(1)).is_err());
    }

    #[test]
    fn class_of_values() {
        let mut interp = Interpreter::default();
        let names = interp.names.clone();
        let sym = |s: Symbol| Value::Symbol(s);
        assert_eq!(interp.class_of(Value::Int(1)), sym(names.int));
        assert_eq!(interp.class_of(Value::Char('x')), sym(names.char_));
        assert_eq!(interp.class_of(Value::TRUE), sym(names.boolean));
        assert_eq!(interp.class_of(Value::NIL), Value::NIL);
        let s = interp.new_string("s");
        assert_eq!(interp.class_of(s), sym(names.string));
        let r = interp.new_real(1.0);
        assert_eq!(interp.class_of(r), sym(names.real));
        let plain = interp.new_frame();
        assert_eq!(interp.class_of(plain), sym(names.frame));

        // Frames inherit their class through _proto.
        let point = interp.sym("point");
        let proto = interp.new_frame_with(&[(names.class, point)]);
        let obj = interp.new_frame_with(&[(names.proto, proto)]);
        assert_eq!(interp.class_of(obj), point);
    }

    #[test]
    fn set_class_and_add_array_slot() {
        let mut interp = Interpreter::default();
        let array = interp.new_array(vec![]);
        let class = interp.sym("list");
        let result = interp.freq_func(FreqFunc::SetClass, &[array, class]).unwrap();
        assert_eq!(result, array);
        assert_eq!(interp.class_of(array), class);

        let added = interp
            .freq_func(FreqFunc::AddArraySlot, &[array, Value::Int(4)])
            .unwrap();
        assert_eq!(added, Value::Int(4));
        assert_eq!(interp.array_len(array).unwrap(), 1);
    }

    #[test]
    fn stringer_concatenates() {
        let mut interp = Interpreter::default();
        let hello = interp.new_string("n = ");
        let name = interp.sym("x");
        let parts = interp.new_array(vec![hello, Value::Int(4), Value::Char('!'), name]);
        let s = interp.stringer(parts).unwrap();
        assert_eq!(interp.string_text(s).as_deref(), Some("n = 4!x"));

        let frame = interp.new_frame();
        let bad = interp.new_array(vec![frame]);
        let err = interp.stringer(bad).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpectedString));
    }
}
