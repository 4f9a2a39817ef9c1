//! Function objects.
//!
//! A bytecode function is a frame `{class, instructions, literals, argFrame,
//! numArgs}`; a native function is `{class, funcPtr, numArgs, indefinite}`.
//! The two are told apart by slot presence, not by class.

use object::{Symbol, Value};

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

/// Slots every argFrame starts with: `_nextArgFrame`, `_parent`,
/// `_implementor`. Arguments are bound from here on.
pub const ARG_FRAME_FIXED_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Bytecode,
    /// Index into the native table.
    Native(usize),
}

/// Unpacked view of a bytecode function.
#[derive(Debug, Clone, Copy)]
pub struct CodeBlock {
    pub instructions: Value,
    pub literals: Value,
    pub arg_frame: Value,
    pub num_args: usize,
}

impl Interpreter {
    pub fn function_kind(&self, f: Value) -> Result<FunctionKind> {
        if self.has_slot(f, self.names.instructions) {
            return Ok(FunctionKind::Bytecode);
        }
        match self.get_slot(f, self.names.func_ptr) {
            Some(Value::Int(index)) if index >= 0 => Ok(FunctionKind::Native(index as usize)),
            Some(other) => Err(RuntimeError::with_value(ErrorCode::NativeNotFound, other)),
            None => Err(RuntimeError::with_value(ErrorCode::ExpectedFunction, f)),
        }
    }

    pub fn is_function(&self, v: Value) -> bool {
        self.function_kind(v).is_ok()
    }

    pub(crate) fn code_block(&self, f: Value) -> Result<CodeBlock> {
        let bad = || RuntimeError::with_value(ErrorCode::ExpectedFunction, f);
        let instructions = self.get_slot(f, self.names.instructions).ok_or_else(bad)?;
        if self.binary(instructions).is_none() {
            return Err(RuntimeError::with_value(ErrorCode::BadBytecode, instructions));
        }
        let arg_frame = self.get_slot(f, self.names.arg_frame).unwrap_or(Value::NIL);
        if !arg_frame.is_nil() && !self.is_frame(arg_frame) {
            return Err(RuntimeError::with_value(ErrorCode::ExpectedFrame, arg_frame));
        }
        Ok(CodeBlock {
            instructions,
            literals: self.get_slot(f, self.names.literals).unwrap_or(Value::NIL),
            arg_frame,
            num_args: self.num_args(f)?,
        })
    }

    pub fn num_args(&self, f: Value) -> Result<usize> {
        match self.get_slot(f, self.names.num_args) {
            Some(Value::Int(n)) if n >= 0 => Ok(n as usize),
            None => Ok(0),
            Some(other) => Err(RuntimeError::with_value(ErrorCode::ExpectedInteger, other)),
        }
    }

    /// Build a bytecode function.
    ///
    /// The argFrame gets the fixed slots, then `params`, then `locals`.
    pub fn new_function(
        &mut self,
        instructions: Vec<u8>,
        literals: Vec<Value>,
        params: &[Symbol],
        locals: &[Symbol],
    ) -> Value {
        let mut slots = vec![
            (self.names.next_arg_frame, Value::NIL),
            (self.names.parent, Value::NIL),
            (self.names.implementor, Value::NIL),
        ];
        slots.extend(params.iter().chain(locals).map(|&name| (name, Value::NIL)));
        let arg_frame = self.new_frame_with(&slots);

        let class = Value::Symbol(self.names.instructions);
        let code = self.alloc_binary(class, instructions);
        let literals = if literals.is_empty() {
            Value::NIL
        } else {
            self.new_array(literals)
        };
        let names = &self.names;
        let slots = [
            (names.class, Value::Symbol(names.code_block)),
            (names.instructions, code),
            (names.literals, literals),
            (names.arg_frame, arg_frame),
            (names.num_args, Value::Int(params.len() as i32)),
        ];
        self.new_frame_with(&slots)
    }

    /// Function object for the native at `index` of the native table.
    pub fn new_native_function(&mut self, index: usize) -> Value {
        let (arity, indefinite) = self
            .natives
            .get(index)
            .map_or((0, false), |desc| (desc.arity, desc.indefinite));
        let names = &self.names;
        let slots = [
            (names.class, Value::Symbol(names.c_function)),
            (names.func_ptr, Value::Int(index as i32)),
            (names.num_args, Value::Int(arity as i32)),
            (names.indefinite, Value::from_bool(indefinite)),
        ];
        self.new_frame_with(&slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytecode_functions_have_the_artifact_shape() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        let tmp = interp.intern("tmp");
        let f = interp.new_function(vec![0x02], vec![], &[a], &[tmp]);

        assert_eq!(interp.function_kind(f).unwrap(), FunctionKind::Bytecode);
        let block = interp.code_block(f).unwrap();
        assert_eq!(block.num_args, 1);
        assert!(block.literals.is_nil());

        let names = interp.slot_names(block.arg_frame).unwrap();
        assert_eq!(names.len(), ARG_FRAME_FIXED_SLOTS + 2);
        assert_eq!(names[ARG_FRAME_FIXED_SLOTS], a);
        assert_eq!(names[0], interp.names.next_arg_frame);
    }

    #[test]
    fn native_functions_carry_their_table_index() {
        let mut interp = Interpreter::default();
        let f = interp.new_native_function(2);
        assert_eq!(interp.function_kind(f).unwrap(), FunctionKind::Native(2));
        assert_eq!(interp.num_args(f).unwrap(), interp.natives[2].arity);
    }

    #[test]
    fn other_values_are_not_functions() {
        let mut interp = Interpreter::default();
        let plain = interp.new_frame();
        assert!(!interp.is_function(plain));
        assert!(!interp.is_function(Value::Int(1)));

        let func_ptr = interp.names.func_ptr;
        let bogus = interp.new_frame_with(&[(func_ptr, Value::NIL)]);
        let err = interp.function_kind(bogus).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NativeNotFound));
    }
}
