//! Exception handlers and unwinding.
//!
//! `new-handlers` arms a group of `(symbol, target pc)` clauses tagged with
//! the call depth, the stack height and the pc of the arming instruction.
//! A thrown exception is matched against the armed clauses top-down; a match
//! truncates the call stack to the recorded depth and resumes at the
//! clause's target. The matched group stays on the stack, disarmed, until
//! `pop-handlers` removes it.

use object::{Symbol, Value};

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Handler {
    /// Exception class this clause catches, subclasses included.
    pub name: Symbol,
    pub target: usize,
    /// Call-stack depth at arming time.
    pub depth: usize,
    pub stack_height: usize,
    /// pc of the `new-handlers` instruction that armed the group.
    pub armed_at: usize,
    pub disarmed: bool,
}

impl Handler {
    fn same_group(&self, other: &Handler) -> bool {
        self.depth == other.depth && self.armed_at == other.armed_at
    }
}

impl Interpreter {
    /// Arm `count` clauses popped as `sym1 pc1 … symN pcN`.
    pub(crate) fn new_handlers(&mut self, count: usize, armed_at: usize) -> Result<()> {
        let len = self.env.stack.len();
        if len < 2 * count || len - 2 * count < self.env.reg.sp {
            return Err(RuntimeError::new(ErrorCode::StackUnderflow));
        }
        let clauses = self.env.stack.split_off(len - 2 * count);
        let depth = self.env.calls.len();
        let stack_height = self.env.stack.len();

        let mut group = Vec::with_capacity(count);
        for pair in clauses.chunks_exact(2) {
            let name = pair[0]
                .as_symbol()
                .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedSymbol, pair[0]))?;
            let target = match pair[1] {
                Value::Int(pc) if pc >= 0 => pc as usize,
                other => {
                    return Err(RuntimeError::with_value(ErrorCode::ExpectedInteger, other));
                }
            };
            group.push(Handler {
                name,
                target,
                depth,
                stack_height,
                armed_at,
                disarmed: false,
            });
        }
        // The first clause ends up on top and is tried first.
        self.env.handlers.extend(group.into_iter().rev());
        Ok(())
    }

    /// Remove the top handler group and clear the current exception.
    pub(crate) fn pop_handlers(&mut self) {
        if let Some(top) = self.env.handlers.last().copied() {
            while self
                .env
                .handlers
                .last()
                .is_some_and(|h| h.same_group(&top))
            {
                self.env.handlers.pop();
            }
        }
        self.env.exception = Value::NIL;
    }

    /// Exception class and exception frame `{name, data}` for `err`.
    pub fn exception_frame(&mut self, err: &RuntimeError) -> (Symbol, Value) {
        let (name, data) = match err {
            RuntimeError::Exception { symbol, data, .. } => (*symbol, *data),
            RuntimeError::Error(info) => {
                let name = self.intern(info.code.exception_name());
                let message = self.new_string(&info.message());
                let mut slots = vec![
                    (self.names.error_code, Value::Int(info.code.code())),
                    (self.names.message, message),
                ];
                if let Some(value) = info.value {
                    slots.push((self.names.value, value));
                }
                if let Some(index) = info.index {
                    let index = Value::int(index).unwrap_or(Value::NIL);
                    slots.push((self.names.index, index));
                }
                (name, self.new_frame_with(&slots))
            }
            RuntimeError::StackOverflow { .. } | RuntimeError::NestingTooDeep { .. } => {
                let name = self.intern(ErrorCode::BadBytecode.exception_name());
                let message = self.new_string(&err.to_string());
                let slots = [(self.names.message, message)];
                (name, self.new_frame_with(&slots))
            }
        };
        let slots = [(self.names.name, Value::Symbol(name)), (self.names.data, data)];
        (name, self.new_frame_with(&slots))
    }

    /// Transfer control to the handler for `err`, or give `err` back when
    /// nothing in this invocation catches it.
    pub(crate) fn unwind(&mut self, err: RuntimeError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        let (name, frame) = self.exception_frame(&err);
        let depth = self.env.calls.len();
        let symbols = &self.symbols;
        let Some(index) = self.env.handlers.iter().rposition(|h| {
            !h.disarmed && h.depth <= depth && symbols.is_subclass(name, h.name)
        }) else {
            return Err(err);
        };

        let handler = self.env.handlers[index];
        log::debug!(
            "caught |{}| at depth {} (thrown at depth {depth})",
            self.symbol_name(name),
            handler.depth
        );

        // Keep the caught group, drop everything armed after it.
        let group_end = self.env.handlers[index..]
            .iter()
            .position(|h| !h.same_group(&handler))
            .map_or(self.env.handlers.len(), |offset| index + offset);
        self.env.handlers.truncate(group_end);
        for h in self.env.handlers.iter_mut().rev() {
            if !h.same_group(&handler) {
                break;
            }
            h.disarmed = true;
        }

        if handler.depth < self.env.calls.len() {
            let reg = self.env.calls[handler.depth];
            self.env.calls.truncate(handler.depth);
            self.env.reg = reg;
        }
        self.env.stack.truncate(handler.stack_height);
        self.env.reg.pc = handler.target;
        self.env.exception = frame;
        Ok(())
    }

    /// Raise a user exception.
    pub fn throw(&self, name: Symbol, data: Value) -> RuntimeError {
        RuntimeError::Exception {
            name: self.symbol_name(name).to_owned(),
            symbol: name,
            data,
        }
    }

    /// Re-raise the current exception under its original name.
    pub fn rethrow(&self) -> RuntimeError {
        let current = self.env.exception;
        let name = self.get_slot(current, self.names.name).and_then(Value::as_symbol);
        match name {
            Some(name) => {
                let data = self.get_slot(current, self.names.data).unwrap_or(Value::NIL);
                self.throw(name, data)
            }
            None => RuntimeError::new(ErrorCode::NoCurrentException),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytecode::{BytecodeBuilder, FreqFunc, Instruction};

    use super::*;
    use crate::testing::{function, run};

    /// try <body> onexception <class> do <handler>
    ///
    /// Literal 0 is the class symbol; the handler code follows the block.
    fn try_block(b: &mut BytecodeBuilder, body: impl FnOnce(&mut BytecodeBuilder)) {
        b.push(0);
        let handler = b.push_pc_label();
        b.emit(Instruction::NewHandlers { count: 1 });
        body(b);
        b.emit(Instruction::PopHandlers).ret();
        b.bind(handler);
    }

    fn throw_call(b: &mut BytecodeBuilder, name_literal: u16, throw_literal: u16) {
        b.push(name_literal).push_nil().push(throw_literal).call(2);
    }

    // ── Catching ───────────────────────────────────────────────────

    #[test]
    fn handler_catches_subclass() {
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex.msg");
        let thrown = interp.sym("evt.ex.msg.mine");
        let throw = interp.sym("Throw");
        let name = interp.names.name;
        let current = interp.sym("CurrentException");

        let result = run(&mut interp, vec![class, thrown, throw, current], |b| {
            try_block(b, |b| throw_call(b, 1, 2));
            b.push(3).call(0);
            b.emit(Instruction::PopHandlers).ret();
        })
        .unwrap();
        assert_eq!(interp.get_slot(result, name), Some(thrown));
        // Leaving the handler cleared the exception.
        assert!(interp.current_exception().is_nil());
    }

    #[test]
    fn unmatched_exception_reaches_the_caller() {
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex.msg");
        let thrown = interp.sym("evt.ex.other");
        let throw = interp.sym("Throw");
        let err = run(&mut interp, vec![class, thrown, throw], |b| {
            try_block(b, |b| throw_call(b, 1, 2));
            b.push_int(-1).ret();
        })
        .unwrap_err();
        match err {
            RuntimeError::Exception { name, .. } => assert_eq!(name, "evt.ex.other"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn runtime_errors_are_catchable_with_structured_data() {
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex.fr");
        let current = interp.sym("CurrentException");
        let data = interp.names.data;
        let error_code = interp.names.error_code;
        let result = run(&mut interp, vec![class, current], |b| {
            try_block(b, |b| {
                b.push_int(1).push_int(0).freq(FreqFunc::Div);
            });
            b.push(1).call(0);
            b.emit(Instruction::PopHandlers).ret();
        })
        .unwrap();
        let payload = interp.get_slot(result, data).unwrap();
        assert_eq!(
            interp.get_slot(payload, error_code),
            Some(Value::Int(ErrorCode::DivisionByZero.code()))
        );
    }

    #[test]
    fn catching_truncates_the_call_stack() {
        // The handler is armed in the top activation; the throw happens two
        // calls deeper.
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex");
        let thrown = interp.sym("evt.ex.deep");
        let throw = interp.sym("Throw");
        let thrower = function(&mut interp, &[], &[], vec![Value::NIL, thrown, throw], |b| {
            throw_call(b, 1, 2);
            b.ret();
        });
        let middle = function(&mut interp, &[], &[], vec![thrower], |b| {
            b.push(0).invoke(0).ret();
        });
        let call_depth: crate::NativeFn = |interp, _, _| Ok(Value::Int(interp.call_depth() as i32));
        interp.register_native(crate::NativeDesc::new("CallDepth", 0, call_depth));
        let depth = interp.sym("CallDepth");

        let result = run(&mut interp, vec![class, middle, depth], |b| {
            b.push(2).call(0); // depth before, kept below the protected region
            try_block(b, |b| {
                b.push(1).invoke(0);
            });
            b.push(2).call(0);
            b.emit(Instruction::PopHandlers);
            b.freq(FreqFunc::Subtract).ret();
        })
        .unwrap();
        assert_eq!(result, Value::Int(0));
    }

    #[test]
    fn handler_resumes_with_values_pushed_before_the_block() {
        // 5 + (try thrower() onexception |evt.ex| do 7)
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex");
        let thrown = interp.sym("evt.ex.late");
        let throw = interp.sym("Throw");
        let thrower = function(&mut interp, &[], &[], vec![Value::NIL, thrown, throw], |b| {
            throw_call(b, 1, 2);
            b.ret();
        });
        let result = run(&mut interp, vec![class, thrower], |b| {
            b.push_int(5);
            try_block(b, |b| {
                b.push(1).invoke(0);
            });
            b.emit(Instruction::PopHandlers);
            b.push_int(7).freq(FreqFunc::Add).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(12));
        assert_eq!(interp.call_depth(), 0);
    }

    #[test]
    fn caught_group_does_not_catch_its_own_handler_code() {
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex");
        let thrown = interp.sym("evt.ex.again");
        let throw = interp.sym("Throw");
        let err = run(&mut interp, vec![class, thrown, throw], |b| {
            try_block(b, |b| throw_call(b, 1, 2));
            // Handler throws again: nothing is armed, so it escapes.
            throw_call(b, 1, 2);
            b.ret();
        })
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Exception { .. }));
    }

    #[test]
    fn rethrow_reaches_the_outer_handler() {
        let mut interp = Interpreter::default();
        let class = interp.sym("evt.ex");
        let thrown = interp.sym("evt.ex.first");
        let throw = interp.sym("Throw");
        let rethrow = interp.sym("Rethrow");
        let inner = function(
            &mut interp,
            &[],
            &[],
            vec![class, thrown, throw, rethrow],
            |b| {
                try_block(b, |b| throw_call(b, 1, 2));
                b.push(3).call(0).ret();
            },
        );
        let current = interp.sym("CurrentException");
        let name = interp.names.name;
        let result = run(&mut interp, vec![class, inner, current], |b| {
            try_block(b, |b| {
                b.push(1).invoke(0);
            });
            b.push(2).call(0);
            b.emit(Instruction::PopHandlers).ret();
        })
        .unwrap();
        assert_eq!(interp.get_slot(result, name), Some(thrown));
    }

    #[test]
    fn first_matching_clause_wins() {
        let mut interp = Interpreter::default();
        let specific = interp.sym("evt.ex.a");
        let general = interp.sym("evt.ex");
        let thrown = interp.sym("evt.ex.a.b");
        let throw = interp.sym("Throw");
        let result = run(&mut interp, vec![specific, general, thrown, throw], |b| {
            b.push(0);
            let first = b.push_pc_label();
            b.push(1);
            let second = b.push_pc_label();
            b.emit(Instruction::NewHandlers { count: 2 });
            throw_call(b, 2, 3);
            b.emit(Instruction::PopHandlers).ret();
            b.bind(first);
            b.emit(Instruction::PopHandlers);
            b.push_int(1).ret();
            b.bind(second);
            b.emit(Instruction::PopHandlers);
            b.push_int(2).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(1));
    }

    #[test]
    fn stack_overflow_is_not_catchable() {
        let mut interp = Interpreter::new(crate::Settings {
            max_call_depth: 20,
            ..Default::default()
        });
        let class = interp.sym("evt.ex");
        let name = interp.intern("dive");
        let dive = function(&mut interp, &[], &[], vec![Value::Symbol(name)], |b| {
            b.push(0).call(0).ret();
        });
        interp.define_global_function(name, dive);
        let err = run(&mut interp, vec![class, dive], |b| {
            try_block(b, |b| {
                b.push(1).invoke(0);
            });
            b.push_int(0).ret();
        })
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn pop_handlers_removes_only_the_top_group() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        interp.env.stack.extend([Value::Symbol(a), Value::Int(10)]);
        interp.new_handlers(1, 0).unwrap();
        interp.env.stack.extend([Value::Symbol(a), Value::Int(20), Value::Symbol(a), Value::Int(30)]);
        interp.new_handlers(2, 5).unwrap();
        assert_eq!(interp.env.handlers.len(), 3);
        assert_eq!(interp.env.handlers[2].target, 20);

        interp.pop_handlers();
        assert_eq!(interp.env.handlers.len(), 1);
        assert_eq!(interp.env.handlers[0].target, 10);
    }
}
