//! `foreach` iterators.
//!
//! An iterator is an array of class `forEachState`. Compiled loops read the
//! current key and value at [`ITER_KEY`] and [`ITER_VALUE`]; the remaining
//! elements are private state. Frame keys are captured when the iterator is
//! created, so slots added during the loop are not visited.

use object::Value;

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

pub const ITER_KEY: usize = 0;
pub const ITER_VALUE: usize = 1;
const ITER_OBJECT: usize = 2;
const ITER_DEEPLY: usize = 3;
const ITER_POSITION: usize = 4;
const ITER_KEYS: usize = 5;
const ITER_DONE: usize = 6;
const ITER_LEN: usize = 7;

impl Interpreter {
    /// Iterator over an array's elements or a frame's slots, positioned on
    /// the first entry. With `deeply`, frame slots inherited through
    /// `_proto` are included (nearest first) and `_proto` itself is skipped.
    pub fn new_iterator(&mut self, obj: Value, deeply: bool) -> Result<Value> {
        let obj = self.resolve_magic(obj);
        let keys = if self.is_frame(obj) {
            let names = if deeply {
                let mut names = Vec::new();
                for frame in self.proto_chain(obj) {
                    for name in self.slot_names(frame)? {
                        if name != self.names.proto && !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
                names
            } else {
                self.slot_names(obj)?
            };
            self.new_array(names.into_iter().map(Value::Symbol).collect())
        } else if self.is_array(obj) {
            Value::NIL
        } else {
            return Err(RuntimeError::with_value(ErrorCode::ExpectedFrameOrArray, obj));
        };

        let mut state = vec![Value::NIL; ITER_LEN];
        state[ITER_OBJECT] = obj;
        state[ITER_DEEPLY] = Value::from_bool(deeply);
        state[ITER_POSITION] = Value::Int(0);
        state[ITER_KEYS] = keys;
        let class = Value::Symbol(self.names.for_each_state);
        let it = self.alloc_array(class, state);
        self.load_entry(it)?;
        Ok(it)
    }

    fn iterator_state(&self, it: Value) -> Result<Vec<Value>> {
        let array = self.array(it)?;
        if array.class != Value::Symbol(self.names.for_each_state)
            || array.elements.len() != ITER_LEN
        {
            return Err(RuntimeError::with_value(ErrorCode::ExpectedArray, it)
                .detail("not an iterator"));
        }
        Ok(array.elements.clone())
    }

    /// Fill key and value for the current position, or mark the end.
    fn load_entry(&mut self, it: Value) -> Result<()> {
        let state = self.iterator_state(it)?;
        let pos = state[ITER_POSITION].as_int().unwrap_or(0).max(0) as usize;
        let obj = state[ITER_OBJECT];
        let keys = state[ITER_KEYS];

        let entry = if keys.is_nil() {
            let elements = &self.array(obj)?.elements;
            elements
                .get(pos)
                .map(|&value| (Value::Int(pos as i32), value))
        } else {
            let name = self.array(keys)?.elements.get(pos).and_then(|k| k.as_symbol());
            name.map(|name| {
                let value = if state[ITER_DEEPLY].is_truthy() {
                    self.inherited_slot(obj, name)
                } else {
                    self.get_slot(obj, name).unwrap_or(Value::NIL)
                };
                (Value::Symbol(name), value)
            })
        };

        match entry {
            Some((key, value)) => {
                self.array_set(it, ITER_KEY as i64, key)?;
                self.array_set(it, ITER_VALUE as i64, value)?;
            }
            None => {
                self.array_set(it, ITER_KEY as i64, Value::NIL)?;
                self.array_set(it, ITER_VALUE as i64, Value::NIL)?;
                self.array_set(it, ITER_DONE as i64, Value::TRUE)?;
            }
        }
        Ok(())
    }

    /// Advance to the next entry.
    pub fn iter_next(&mut self, it: Value) -> Result<()> {
        let state = self.iterator_state(it)?;
        if state[ITER_DONE].is_truthy() {
            return Ok(());
        }
        let pos = state[ITER_POSITION].as_int().unwrap_or(0);
        self.array_set(it, ITER_POSITION as i64, Value::Int(pos + 1))?;
        self.load_entry(it)
    }

    pub fn iter_done(&self, it: Value) -> Result<bool> {
        Ok(self.iterator_state(it)?[ITER_DONE].is_truthy())
    }
}

#[cfg(test)]
mod tests {
    use bytecode::{FreqFunc, Instruction};
    use object::Symbol;

    use super::*;
    use crate::ARG_FRAME_FIXED_SLOTS;
    use crate::testing::function;

    fn drain(interp: &mut Interpreter, it: Value) -> Vec<(Value, Value)> {
        let mut seen = Vec::new();
        while !interp.iter_done(it).unwrap() {
            let key = interp.array_get(it, ITER_KEY as i64).unwrap();
            let value = interp.array_get(it, ITER_VALUE as i64).unwrap();
            seen.push((key, value));
            interp.iter_next(it).unwrap();
        }
        seen
    }

    #[test]
    fn arrays_yield_index_and_element() {
        let mut interp = Interpreter::default();
        let array = interp.new_array(vec![Value::Int(5), Value::Int(6)]);
        let it = interp.new_iterator(array, false).unwrap();
        assert_eq!(
            drain(&mut interp, it),
            vec![(Value::Int(0), Value::Int(5)), (Value::Int(1), Value::Int(6))]
        );

        let empty = interp.new_array(vec![]);
        let it = interp.new_iterator(empty, false).unwrap();
        assert!(interp.iter_done(it).unwrap());
    }

    #[test]
    fn frames_yield_slots_in_order() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        let b = interp.intern("b");
        let frame = interp.new_frame_with(&[(a, Value::Int(1)), (b, Value::Int(2))]);
        let it = interp.new_iterator(frame, false).unwrap();
        assert_eq!(
            drain(&mut interp, it),
            vec![
                (Value::Symbol(a), Value::Int(1)),
                (Value::Symbol(b), Value::Int(2)),
            ]
        );
    }

    #[test]
    fn deep_iteration_follows_protos() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        let b = interp.intern("b");
        let proto = interp.names.proto;
        let base = interp.new_frame_with(&[(a, Value::Int(10)), (b, Value::Int(20))]);
        let obj = interp.new_frame_with(&[(a, Value::Int(1)), (proto, base)]);
        // Cycle back to the start; each frame is still visited once.
        interp.set_slot(base, proto, obj).unwrap();

        let it = interp.new_iterator(obj, true).unwrap();
        let keys: Vec<(Value, Value)> = drain(&mut interp, it);
        assert_eq!(
            keys,
            vec![
                (Value::Symbol(a), Value::Int(1)),
                (Value::Symbol(b), Value::Int(20)),
            ]
        );

        let it = interp.new_iterator(obj, false).unwrap();
        let shallow: Vec<Symbol> = drain(&mut interp, it)
            .into_iter()
            .filter_map(|(k, _)| k.as_symbol())
            .collect();
        assert_eq!(shallow, vec![a, proto]);
    }

    #[test]
    fn non_collections_are_rejected() {
        let mut interp = Interpreter::default();
        let err = interp.new_iterator(Value::Int(3), false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpectedFrameOrArray));
        let plain = interp.new_array(vec![Value::NIL; ITER_LEN]);
        assert!(interp.iter_next(plain).is_err());
    }

    #[test]
    fn foreach_loop_in_bytecode() {
        // total := 0; foreach v in [1, 2, 3, 4] do total := total + v
        let mut interp = Interpreter::default();
        let list = interp.new_array(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let f = function(&mut interp, &[], &["total", "it"], vec![list], |b| {
            let total = ARG_FRAME_FIXED_SLOTS as u16;
            let it = total + 1;
            b.push_int(0).set_var(total);
            b.push(0).push_nil().freq(FreqFunc::NewIterator).set_var(it);
            let test = b.branch_label();
            let body = b.current_offset();
            b.get_var(total);
            b.get_var(it).push_int(ITER_VALUE as i32).freq(FreqFunc::Aref);
            b.freq(FreqFunc::Add).set_var(total);
            b.get_var(it).emit(Instruction::IterNext);
            b.bind(test);
            b.get_var(it).emit(Instruction::IterDone);
            b.emit(Instruction::BranchIfFalse { target: body as u16 });
            b.get_var(total).ret();
        });
        assert_eq!(interp.interpret(f).unwrap(), Value::Int(10));
    }
}
