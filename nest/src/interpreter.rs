//! The bytecode interpreter: registers, value stack, call protocol and the
//! fetch-decode-execute loop.

use std::mem;

use bytecode::{Instruction, decode_at};
use object::{HeapObject, Symbol, Value, tagged};

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};
use crate::exception::Handler;
use crate::function::{ARG_FRAME_FIXED_SLOTS, FunctionKind};

/// Register set of one activation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Registers {
    pub func: Value,
    pub pc: usize,
    /// Stack height at entry; the activation never pops below it.
    pub sp: usize,
    pub locals: Value,
    pub receiver: Value,
    pub implementor: Value,
    /// Cached `instructions` of `func`.
    pub instructions: Value,
    /// Cached `literals` of `func`.
    pub literals: Value,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            func: Value::NIL,
            pc: 0,
            sp: 0,
            locals: Value::NIL,
            receiver: Value::NIL,
            implementor: Value::NIL,
            instructions: Value::NIL,
            literals: Value::NIL,
        }
    }
}

/// Complete state of one invocation.
#[derive(Debug)]
pub(crate) struct Env {
    pub reg: Registers,
    pub stack: Vec<Value>,
    /// Registers of the callers, innermost last.
    pub calls: Vec<Registers>,
    pub handlers: Vec<Handler>,
    pub exception: Value,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            reg: Registers::default(),
            stack: Vec::new(),
            calls: Vec::new(),
            handlers: Vec::new(),
            exception: Value::NIL,
        }
    }
}

/// How a function is being entered.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Dispatch {
    /// `call`/`invoke`: self and implementor come from the function's
    /// argFrame.
    Plain,
    /// `send`/`resend`: bind `_parent` and `_implementor`.
    Message { receiver: Value, implementor: Value },
}

pub(crate) enum Flow {
    Next,
    Done(Value),
}

impl Interpreter {
    // ── Entry points ───────────────────────────────────────────────

    /// Run a zero-argument function with a NIL receiver.
    pub fn interpret(&mut self, f: Value) -> Result<Value> {
        self.call(f, &[])
    }

    /// Call a function value with `args`.
    pub fn call(&mut self, f: Value, args: &[Value]) -> Result<Value> {
        self.invoke_nested(f, Dispatch::Plain, args)
    }

    /// Send `name` to `receiver`.
    pub fn send(&mut self, receiver: Value, name: Symbol, args: &[Value]) -> Result<Value> {
        let receiver = self.resolve_magic(receiver);
        self.frame(receiver)?;
        let found = self.full_lookup(receiver, name).ok_or_else(|| {
            RuntimeError::with_value(ErrorCode::UndefinedMethod, Value::Symbol(name))
        })?;
        let dispatch = Dispatch::Message {
            receiver,
            implementor: found.holder,
        };
        self.invoke_nested(found.value, dispatch, args)
    }

    /// Run `f` in a fresh environment, suspending the current one.
    fn invoke_nested(&mut self, f: Value, dispatch: Dispatch, args: &[Value]) -> Result<Value> {
        if self.saved.len() >= self.settings().max_nesting {
            return Err(RuntimeError::NestingTooDeep {
                depth: self.saved.len(),
            });
        }
        let outer = mem::take(&mut self.env);
        self.saved.push(outer);
        log::debug!("entering invocation level {}", self.saved.len());

        let result = self.enter_and_run(f, dispatch, args);

        if let Some(outer) = self.saved.pop() {
            self.env = outer;
        }
        log::debug!("leaving invocation level {}", self.saved.len() + 1);
        result
    }

    fn enter_and_run(&mut self, f: Value, dispatch: Dispatch, args: &[Value]) -> Result<Value> {
        self.env.stack.extend_from_slice(args);
        self.apply(f, dispatch, args.len())?;
        if self.env.calls.is_empty() {
            // A native ran to completion.
            return self.pop();
        }
        self.run()
    }

    // ── Main loop ──────────────────────────────────────────────────

    fn run(&mut self) -> Result<Value> {
        loop {
            if self.heap.needs_collection() {
                self.collect_garbage();
            }
            let pc = self.env.reg.pc;
            let outcome = self.fetch(pc).and_then(|(instr, next)| {
                log::trace!(
                    target: "nest::interpreter",
                    "[{}] {pc:>5}: {instr}",
                    self.env.calls.len()
                );
                self.env.reg.pc = next;
                self.step(instr, pc)
            });
            match outcome {
                Ok(Flow::Next) => {}
                Ok(Flow::Done(value)) => return Ok(value),
                Err(err) => self.unwind(err)?,
            }
        }
    }

    fn fetch(&self, pc: usize) -> Result<(Instruction, usize)> {
        let code = self
            .binary(self.env.reg.instructions)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::BadBytecode, self.env.reg.func))?;
        Ok(decode_at(&code.data, pc)?)
    }

    fn step(&mut self, instr: Instruction, pc: usize) -> Result<Flow> {
        match instr {
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Dup => {
                let top = self.peek()?;
                self.push(top);
            }
            Instruction::Return => return self.return_from_call(),
            Instruction::PushSelf => self.push(self.env.reg.receiver),
            Instruction::SetLexScope => {
                let f = self.pop()?;
                let closure = self.close_over(f)?;
                self.push(closure);
            }
            Instruction::IterNext => {
                let it = self.pop()?;
                self.iter_next(it)?;
            }
            Instruction::IterDone => {
                let it = self.pop()?;
                let done = self.iter_done(it)?;
                self.push(Value::from_bool(done));
            }
            Instruction::PopHandlers => self.pop_handlers(),

            Instruction::Push { literal } => {
                let value = self.literal(literal)?;
                self.push(value);
            }
            Instruction::PushConstant { word } => {
                self.push(tagged::decode(word as i16 as i32 as u32));
            }

            Instruction::Call { argc } => {
                let name = self.pop_symbol()?;
                let f = self.global_function(name).ok_or_else(|| {
                    RuntimeError::with_value(
                        ErrorCode::UndefinedGlobalFunction,
                        Value::Symbol(name),
                    )
                })?;
                self.apply(f, Dispatch::Plain, argc as usize)?;
            }
            Instruction::Invoke { argc } => {
                let f = self.pop()?;
                self.apply(f, Dispatch::Plain, argc as usize)?;
            }
            Instruction::Send { argc } => self.send_message(argc as usize, false)?,
            Instruction::SendIfDefined { argc } => self.send_message(argc as usize, true)?,
            Instruction::Resend { argc } => self.resend_message(argc as usize, false)?,
            Instruction::ResendIfDefined { argc } => {
                self.resend_message(argc as usize, true)?
            }

            Instruction::Branch { target } => self.env.reg.pc = target as usize,
            Instruction::BranchIfTrue { target } => {
                if self.pop()?.is_truthy() {
                    self.env.reg.pc = target as usize;
                }
            }
            Instruction::BranchIfFalse { target } => {
                if self.pop()?.is_nil() {
                    self.env.reg.pc = target as usize;
                }
            }

            Instruction::FindVar { literal } => {
                let name = self.literal_symbol(literal)?;
                let value = self.find_var(name)?;
                self.push(value);
            }
            Instruction::FindAndSetVar { literal } => {
                let name = self.literal_symbol(literal)?;
                let value = self.pop()?;
                self.find_and_set_var(name, value)?;
            }
            Instruction::GetVar { index } => {
                let value = self.local(index as usize)?;
                self.push(value);
            }
            Instruction::SetVar { index } => {
                let value = self.pop()?;
                self.set_local(index as usize, value)?;
            }
            Instruction::IncrVar { index } => {
                let incr = self.pop()?;
                let current = self.local(index as usize)?;
                let next = self.add(current, incr)?;
                self.set_local(index as usize, next)?;
                self.push(incr);
                self.push(next);
            }
            Instruction::BranchIfLoopNotDone { target } => {
                let limit = self.pop()?;
                let index = self.pop()?;
                let incr = self.pop()?;
                if self.loop_not_done(incr, index, limit)? {
                    self.env.reg.pc = target as usize;
                }
            }

            Instruction::MakeFrame { count } => {
                let map = self.pop()?;
                let values = self.pop_n(count as usize)?;
                let frame = self.make_frame(map, values)?;
                self.push(frame);
            }
            Instruction::MakeArray { count: Instruction::SIZED_ARRAY } => {
                let class = self.pop()?;
                let size = self.pop()?;
                let len = match size {
                    Value::Int(n) if n >= 0 => n as usize,
                    other => {
                        return Err(RuntimeError::with_value(ErrorCode::ExpectedInteger, other));
                    }
                };
                let array = self.alloc_array(class, vec![Value::NIL; len]);
                self.push(array);
            }
            Instruction::MakeArray { count } => {
                let class = self.pop()?;
                let elements = self.pop_n(count as usize)?;
                let array = self.alloc_array(class, elements);
                self.push(array);
            }
            Instruction::GetPath { strict } => {
                let path = self.pop()?;
                let object = self.pop()?;
                let value = self.get_path(object, path, strict)?;
                self.push(value);
            }
            Instruction::SetPath { push_value } => {
                let value = self.pop()?;
                let path = self.pop()?;
                let object = self.pop()?;
                self.set_path(object, path, value)?;
                if push_value {
                    self.push(value);
                }
            }

            Instruction::FreqFunc(func) => {
                let args = self.pop_n(func.arity())?;
                let result = self.freq_func(func, &args)?;
                self.push(result);
            }
            Instruction::NewHandlers { count } => self.new_handlers(count as usize, pc)?,
        }
        Ok(Flow::Next)
    }

    // ── Stack ──────────────────────────────────────────────────────

    pub(crate) fn push(&mut self, v: Value) {
        self.env.stack.push(v);
    }

    pub(crate) fn pop(&mut self) -> Result<Value> {
        if self.env.stack.len() <= self.env.reg.sp {
            return Err(RuntimeError::new(ErrorCode::StackUnderflow));
        }
        self.env
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::new(ErrorCode::StackUnderflow))
    }

    fn peek(&self) -> Result<Value> {
        if self.env.stack.len() <= self.env.reg.sp {
            return Err(RuntimeError::new(ErrorCode::StackUnderflow));
        }
        self.env
            .stack
            .last()
            .copied()
            .ok_or_else(|| RuntimeError::new(ErrorCode::StackUnderflow))
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let len = self.env.stack.len();
        if len < n || len - n < self.env.reg.sp {
            return Err(RuntimeError::new(ErrorCode::StackUnderflow));
        }
        Ok(self.env.stack.split_off(len - n))
    }

    fn pop_symbol(&mut self) -> Result<Symbol> {
        let v = self.pop()?;
        v.as_symbol()
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedSymbol, v))
    }

    // ── Literals and locals ────────────────────────────────────────

    fn literal(&self, index: u16) -> Result<Value> {
        let literals = self.env.reg.literals;
        self.array(literals)
            .ok()
            .and_then(|a| a.elements.get(index as usize).copied())
            .ok_or_else(|| RuntimeError::new(ErrorCode::BadLiteral).index(index as i64))
    }

    fn literal_symbol(&self, index: u16) -> Result<Symbol> {
        let v = self.literal(index)?;
        v.as_symbol()
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedSymbol, v))
    }

    fn local(&self, index: usize) -> Result<Value> {
        self.frame(self.env.reg.locals)?
            .values
            .get(index)
            .copied()
            .ok_or_else(|| RuntimeError::new(ErrorCode::BadLocal).index(index as i64))
    }

    fn set_local(&mut self, index: usize, value: Value) -> Result<()> {
        let locals = self.env.reg.locals;
        let slot = locals
            .as_ref()
            .and_then(|r| self.heap.get_mut(r))
            .and_then(HeapObject::as_frame_mut)
            .and_then(|f| f.values.get_mut(index))
            .ok_or_else(|| RuntimeError::new(ErrorCode::BadLocal).index(index as i64))?;
        *slot = value;
        Ok(())
    }

    // ── Variables ──────────────────────────────────────────────────

    /// Lexical scope, then the receiver's inheritance, then globals.
    pub(crate) fn find_var(&self, name: Symbol) -> Result<Value> {
        if let Some((_, value)) = self.lexical_lookup(self.env.reg.locals, name) {
            return Ok(value);
        }
        if let Some(found) = self.full_lookup(self.env.reg.receiver, name) {
            return Ok(found.value);
        }
        self.global(name).ok_or_else(|| {
            RuntimeError::with_value(ErrorCode::UndefinedVariable, Value::Symbol(name))
        })
    }

    fn find_and_set_var(&mut self, name: Symbol, value: Value) -> Result<()> {
        if let Some((owner, _)) = self.lexical_lookup(self.env.reg.locals, name) {
            return self.set_slot(owner, name, value);
        }
        if let Some(found) = self.full_lookup(self.env.reg.receiver, name) {
            return self.set_slot(found.owner, name, value);
        }
        if self.global(name).is_none() {
            log::warn!(
                "assignment creates global variable |{}|",
                self.symbol_name(name)
            );
        }
        self.define_global(name, value);
        Ok(())
    }

    // ── Loops and frames ───────────────────────────────────────────

    fn loop_not_done(&self, incr: Value, index: Value, limit: Value) -> Result<bool> {
        use std::cmp::Ordering;

        let step = self.compare(incr, Value::Int(0))?;
        let position = self.compare(index, limit)?;
        match step {
            Ordering::Equal => Err(RuntimeError::with_value(
                ErrorCode::ZeroForLoopIncrement,
                incr,
            )),
            Ordering::Greater => Ok(position != Ordering::Greater),
            Ordering::Less => Ok(position != Ordering::Less),
        }
    }

    fn make_frame(&mut self, map: Value, values: Vec<Value>) -> Result<Value> {
        self.array(map)?;
        let expected = self.map_len(map);
        if expected != values.len() {
            return Err(RuntimeError::with_value(ErrorCode::BadLiteral, map)
                .detail(format!("map has {expected} slots, got {} values", values.len())));
        }
        self.share_map(map);
        Ok(self.alloc_frame(map, values))
    }

    /// Copy `f` with an argFrame bound to the current lexical scope.
    fn close_over(&mut self, f: Value) -> Result<Value> {
        let arg_frame = self.code_block(f)?.arg_frame;
        let closure = self.clone_value(f);
        let env = if arg_frame.is_nil() {
            self.fixed_arg_frame()
        } else {
            self.clone_value(arg_frame)
        };
        let reg = self.env.reg;
        let names = self.names.clone();
        self.set_slot(env, names.next_arg_frame, reg.locals)?;
        self.set_slot(env, names.parent, reg.receiver)?;
        self.set_slot(env, names.implementor, reg.implementor)?;
        self.set_slot(closure, names.arg_frame, env)?;
        Ok(closure)
    }

    fn fixed_arg_frame(&mut self) -> Value {
        let slots = [
            (self.names.next_arg_frame, Value::NIL),
            (self.names.parent, Value::NIL),
            (self.names.implementor, Value::NIL),
        ];
        self.new_frame_with(&slots)
    }

    // ── Calls ──────────────────────────────────────────────────────

    /// Enter `f` with the top `argc` stack values as arguments.
    ///
    /// Natives run to completion and leave their result on the stack.
    /// Bytecode functions get a new activation and run from the main loop.
    pub(crate) fn apply(&mut self, f: Value, dispatch: Dispatch, argc: usize) -> Result<()> {
        let f = self.resolve_magic(f);
        if self.env.calls.len() >= self.settings().max_call_depth {
            return Err(RuntimeError::StackOverflow {
                depth: self.env.calls.len(),
            });
        }
        let len = self.env.stack.len();
        if len < argc || len - argc < self.env.reg.sp {
            return Err(RuntimeError::new(ErrorCode::StackUnderflow));
        }
        let base = len - argc;

        match self.function_kind(f)? {
            FunctionKind::Native(index) => self.apply_native(f, index, dispatch, base),
            FunctionKind::Bytecode => self.apply_bytecode(f, dispatch, base),
        }
    }

    fn check_arity(f: Value, expected: usize, got: usize, minimum: bool) -> Result<()> {
        let ok = if minimum { got >= expected } else { got == expected };
        if ok {
            return Ok(());
        }
        let want = if minimum { "at least " } else { "" };
        Err(RuntimeError::with_value(ErrorCode::WrongNumberOfArgs, f)
            .detail(format!("expected {want}{expected}, got {got}")))
    }

    fn apply_native(
        &mut self,
        f: Value,
        index: usize,
        dispatch: Dispatch,
        base: usize,
    ) -> Result<()> {
        let desc = *self
            .natives
            .get(index)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::NativeNotFound, f))?;
        let argc = self.env.stack.len() - base;
        Self::check_arity(f, desc.arity, argc, desc.indefinite)?;

        let receiver = match dispatch {
            Dispatch::Plain => self.env.reg.receiver,
            Dispatch::Message { receiver, .. } => receiver,
        };
        // Arguments stay on the stack, rooted, while the native runs.
        let args = self.env.stack[base..].to_vec();
        self.env.calls.push(self.env.reg);

        let result = (desc.func)(self, receiver, &args);

        self.env.calls.pop();
        self.env.stack.truncate(base);
        self.push(result?);
        Ok(())
    }

    fn apply_bytecode(&mut self, f: Value, dispatch: Dispatch, base: usize) -> Result<()> {
        let block = self.code_block(f)?;
        let argc = self.env.stack.len() - base;
        Self::check_arity(f, block.num_args, argc, false)?;

        let locals = if block.arg_frame.is_nil() {
            self.fixed_arg_frame()
        } else {
            self.clone_value(block.arg_frame)
        };
        let args = self.env.stack.split_off(base);
        {
            let frame = locals
                .as_ref()
                .and_then(|r| self.heap.get_mut(r))
                .and_then(HeapObject::as_frame_mut)
                .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedFrame, locals))?;
            let end = ARG_FRAME_FIXED_SLOTS + args.len();
            if frame.values.len() < end {
                return Err(RuntimeError::new(ErrorCode::BadLocal).index(end as i64 - 1));
            }
            frame.values[ARG_FRAME_FIXED_SLOTS..end].copy_from_slice(&args);
        }

        let (receiver, implementor) = match dispatch {
            Dispatch::Plain => (
                self.get_slot(locals, self.names.parent).unwrap_or(Value::NIL),
                self.get_slot(locals, self.names.implementor).unwrap_or(Value::NIL),
            ),
            Dispatch::Message {
                receiver,
                implementor,
            } => {
                let names = self.names.clone();
                self.set_slot(locals, names.parent, receiver)?;
                self.set_slot(locals, names.implementor, implementor)?;
                (receiver, implementor)
            }
        };

        self.env.calls.push(self.env.reg);
        self.env.reg = Registers {
            func: f,
            pc: 0,
            sp: base,
            locals,
            receiver,
            implementor,
            instructions: block.instructions,
            literals: block.literals,
        };
        Ok(())
    }

    fn return_from_call(&mut self) -> Result<Flow> {
        let value = self.pop()?;
        let Some(caller) = self.env.calls.pop() else {
            return Ok(Flow::Done(value));
        };
        self.env.stack.truncate(self.env.reg.sp);
        self.env.reg = caller;
        let depth = self.env.calls.len();
        self.env.handlers.retain(|h| h.depth <= depth);
        if self.env.calls.is_empty() {
            return Ok(Flow::Done(value));
        }
        self.push(value);
        Ok(Flow::Next)
    }

    // ── Messages ───────────────────────────────────────────────────

    /// Drop the arguments of a message that resolved to nothing.
    fn skip_message(&mut self, argc: usize) -> Result<()> {
        self.pop_n(argc)?;
        self.push(Value::NIL);
        Ok(())
    }

    fn send_message(&mut self, argc: usize, if_defined: bool) -> Result<()> {
        let name = self.pop_symbol()?;
        let receiver = self.pop()?;
        let receiver = self.resolve_magic(receiver);
        if if_defined && receiver.is_nil() {
            return self.skip_message(argc);
        }
        self.frame(receiver)?;
        match self.full_lookup(receiver, name) {
            Some(found) => self.apply(found.value, Dispatch::Message {
                receiver,
                implementor: found.holder,
            }, argc),
            None if if_defined => self.skip_message(argc),
            None => Err(RuntimeError::with_value(
                ErrorCode::UndefinedMethod,
                Value::Symbol(name),
            )),
        }
    }

    fn resend_message(&mut self, argc: usize, if_defined: bool) -> Result<()> {
        let name = self.pop_symbol()?;
        let implementor = self.env.reg.implementor;
        let start = self
            .get_slot(implementor, self.names.proto)
            .map(|p| self.resolve_magic(p))
            .filter(|p| self.is_frame(*p));
        let Some(start) = start else {
            if if_defined {
                return self.skip_message(argc);
            }
            return Err(RuntimeError::with_value(ErrorCode::NoProtoForResend, implementor));
        };
        match self.full_lookup(start, name) {
            Some(found) => self.apply(found.value, Dispatch::Message {
                receiver: self.env.reg.receiver,
                implementor: found.holder,
            }, argc),
            None if if_defined => self.skip_message(argc),
            None => Err(RuntimeError::with_value(
                ErrorCode::UndefinedMethod,
                Value::Symbol(name),
            )),
        }
    }

    /// Depth of the running invocation's call stack.
    pub fn call_depth(&self) -> usize {
        self.env.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use bytecode::FreqFunc;

    use super::*;
    use crate::testing::{function, run};

    // ── Basics ─────────────────────────────────────────────────────

    #[test]
    fn arithmetic_on_the_stack() {
        let mut interp = Interpreter::default();
        let result = run(&mut interp, vec![], |b| {
            b.push_int(2).push_int(3).freq(FreqFunc::Add);
            b.push_int(4).freq(FreqFunc::Multiply).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(20));
    }

    #[test]
    fn literals_and_constants() {
        let mut interp = Interpreter::default();
        let s = interp.new_string("lit");
        let result = run(&mut interp, vec![Value::Int(7), s], |b| {
            b.push(1).ret();
        });
        assert_eq!(result.unwrap(), s);

        let result = run(&mut interp, vec![], |b| {
            b.push_int(-5).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(-5));

        let err = run(&mut interp, vec![], |b| {
            b.push(3).ret();
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::BadLiteral));
    }

    #[test]
    fn branches_select_arms() {
        let mut interp = Interpreter::default();
        for (cond, expected) in [(true, 1), (false, 2)] {
            let result = run(&mut interp, vec![], |b| {
                if cond {
                    b.push_true();
                } else {
                    b.push_nil();
                }
                let else_arm = b.branch_if_false_label();
                b.push_int(1).ret();
                b.bind(else_arm);
                b.push_int(2).ret();
            });
            assert_eq!(result.unwrap(), Value::Int(expected));
        }
    }

    #[test]
    fn for_loop_sums_with_incr_var() {
        // total := 0; for i := 1 to 10 do total := total + i
        let mut interp = Interpreter::default();
        let f = function(&mut interp, &[], &["total", "i"], vec![], |b| {
            let total = ARG_FRAME_FIXED_SLOTS as u16;
            let i = total + 1;
            b.push_int(0).set_var(total);
            b.push_int(1).set_var(i);
            b.push_int(1).get_var(i); // incr index
            let test = b.branch_label();
            let body = b.current_offset();
            b.get_var(total).get_var(i).freq(FreqFunc::Add).set_var(total);
            b.push_int(1).emit(Instruction::IncrVar { index: i });
            // incr-var leaves `incr new-index` for the test.
            b.bind(test);
            b.push_int(10);
            b.emit(Instruction::BranchIfLoopNotDone { target: body as u16 });
            b.get_var(total).ret();
        });
        assert_eq!(interp.interpret(f).unwrap(), Value::Int(55));
    }

    #[test]
    fn zero_loop_increment_is_an_error() {
        let mut interp = Interpreter::default();
        let err = run(&mut interp, vec![], |b| {
            b.push_int(0).push_int(1).push_int(5);
            b.emit(Instruction::BranchIfLoopNotDone { target: 0 });
            b.push_nil().ret();
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ZeroForLoopIncrement));
    }

    #[test]
    fn make_frame_and_make_array() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        let b_sym = interp.intern("b");
        let map = interp.new_map(&[a, b_sym], object::MapFlags::empty());
        let class = interp.sym("point");
        let frame = run(&mut interp, vec![map], |b| {
            b.push_int(1).push_int(2).push(0);
            b.emit(Instruction::MakeFrame { count: 2 }).ret();
        })
        .unwrap();
        assert_eq!(interp.get_slot(frame, b_sym), Some(Value::Int(2)));

        let array = run(&mut interp, vec![class], |b| {
            b.push_int(1).push_int(2).push_int(3).push(0);
            b.emit(Instruction::MakeArray { count: 3 }).ret();
        })
        .unwrap();
        assert_eq!(interp.array(array).unwrap().class, class);
        assert_eq!(interp.array_len(array).unwrap(), 3);

        let sized = run(&mut interp, vec![class], |b| {
            b.push_int(4).push(0);
            b.emit(Instruction::MakeArray { count: Instruction::SIZED_ARRAY }).ret();
        })
        .unwrap();
        assert_eq!(interp.array(sized).unwrap().elements, vec![Value::NIL; 4]);
    }

    #[test]
    fn frames_from_one_literal_map_stay_independent() {
        let mut interp = Interpreter::default();
        let a = interp.intern("a");
        let extra = interp.intern("extra");
        let map = interp.new_map(&[a], object::MapFlags::empty());
        interp.freeze(map);
        let make = function(&mut interp, &[], &[], vec![map], |b| {
            b.push_int(1).push(0);
            b.emit(Instruction::MakeFrame { count: 1 }).ret();
        });
        let f1 = interp.interpret(make).unwrap();
        let f2 = interp.interpret(make).unwrap();
        interp.set_slot(f1, extra, Value::TRUE).unwrap();
        assert!(!interp.has_slot(f2, extra));
        assert_eq!(interp.frame(f2).unwrap().map, map);
    }

    // ── Calls ──────────────────────────────────────────────────────

    #[test]
    fn global_function_call_binds_arguments() {
        let mut interp = Interpreter::default();
        let sub = function(&mut interp, &["x", "y"], &[], vec![], |b| {
            let x = ARG_FRAME_FIXED_SLOTS as u16;
            b.get_var(x).get_var(x + 1).freq(FreqFunc::Subtract).ret();
        });
        let name = interp.intern("sub");
        interp.define_global_function(name, sub);

        let result = run(&mut interp, vec![Value::Symbol(name)], |b| {
            b.push_int(10).push_int(4).push(0).call(2).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(6));

        // Arguments were bound into a copy; the template is untouched.
        let template = interp.code_block(sub).unwrap().arg_frame;
        let x = interp.intern("x");
        assert_eq!(interp.get_slot(template, x), Some(Value::NIL));
    }

    #[test]
    fn wrong_argument_count_is_an_arity_error() {
        let mut interp = Interpreter::default();
        let two = function(&mut interp, &["a", "b"], &[], vec![], |b| {
            b.push_nil().ret();
        });
        let err = interp.call(two, &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::WrongNumberOfArgs));
        assert_eq!(err.code().map(|c| c.kind()), Some(crate::ErrorKind::Arity));
    }

    #[test]
    fn undefined_global_function() {
        let mut interp = Interpreter::default();
        let name = interp.sym("nowhere");
        let err = run(&mut interp, vec![name], |b| {
            b.push(0).call(0).ret();
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UndefinedGlobalFunction));
    }

    #[test]
    fn unbounded_recursion_is_fatal() {
        let mut interp = Interpreter::new(crate::Settings {
            max_call_depth: 50,
            ..Default::default()
        });
        let name = interp.intern("loop");
        let f = function(&mut interp, &[], &[], vec![Value::Symbol(name)], |b| {
            b.push(0).call(0).ret();
        });
        interp.define_global_function(name, f);
        let err = interp.interpret(f).unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow { depth: 50 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn invoke_runs_a_function_value() {
        let mut interp = Interpreter::default();
        let double = function(&mut interp, &["n"], &[], vec![], |b| {
            let n = ARG_FRAME_FIXED_SLOTS as u16;
            b.get_var(n).get_var(n).freq(FreqFunc::Add).ret();
        });
        let result = run(&mut interp, vec![double], |b| {
            b.push_int(21).push(0).invoke(1).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(42));
    }

    #[test]
    fn values_below_a_call_survive_its_return() {
        // 1 + f() where f returns 2
        let mut interp = Interpreter::default();
        let two = function(&mut interp, &[], &[], vec![], |b| {
            b.push_int(2).ret();
        });
        let result = run(&mut interp, vec![two], |b| {
            b.push_int(1).push(0).invoke(0).freq(FreqFunc::Add).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(3));
    }

    #[test]
    fn global_call_as_right_operand() {
        // a + half(a) with a = 40
        let mut interp = Interpreter::default();
        let half = function(&mut interp, &["n"], &[], vec![], |b| {
            let n = ARG_FRAME_FIXED_SLOTS as u16;
            b.get_var(n).push_int(2).freq(FreqFunc::Div).ret();
        });
        let name = interp.intern("half");
        interp.define_global_function(name, half);
        let f = function(&mut interp, &[], &["a"], vec![Value::Symbol(name)], |b| {
            let a = ARG_FRAME_FIXED_SLOTS as u16;
            b.push_int(40).set_var(a);
            b.get_var(a).get_var(a).push(0).call(1).freq(FreqFunc::Add).ret();
        });
        assert_eq!(interp.interpret(f).unwrap(), Value::Int(60));
    }

    #[test]
    fn calls_inside_a_for_loop_body() {
        // total := 0; for i := 1 to 4 do total := total + square(i)
        let mut interp = Interpreter::default();
        let square = function(&mut interp, &["n"], &[], vec![], |b| {
            let n = ARG_FRAME_FIXED_SLOTS as u16;
            b.get_var(n).get_var(n).freq(FreqFunc::Multiply).ret();
        });
        let name = interp.intern("square");
        interp.define_global_function(name, square);
        let f = function(&mut interp, &[], &["total", "i"], vec![Value::Symbol(name)], |b| {
            let total = ARG_FRAME_FIXED_SLOTS as u16;
            let i = total + 1;
            b.push_int(0).set_var(total);
            b.push_int(1).set_var(i);
            b.push_int(1).get_var(i);
            let test = b.branch_label();
            let body = b.current_offset();
            b.get_var(total).get_var(i).push(0).call(1).freq(FreqFunc::Add).set_var(total);
            b.push_int(1).emit(Instruction::IncrVar { index: i });
            b.bind(test);
            b.push_int(4);
            b.emit(Instruction::BranchIfLoopNotDone { target: body as u16 });
            b.get_var(total).ret();
        });
        assert_eq!(interp.interpret(f).unwrap(), Value::Int(30));
    }

    // ── Messages ───────────────────────────────────────────────────

    #[test]
    fn send_reaches_inherited_method() {
        // send({x: 1, _proto: {getX: func() self.x}}, 'getX, [])
        let mut interp = Interpreter::default();
        let x = interp.intern("x");
        let get_x = interp.intern("getX");
        let proto = interp.names.proto;
        let method = function(&mut interp, &[], &[], vec![Value::Symbol(x)], |b| {
            b.push_self().push(0).emit(Instruction::GetPath { strict: true }).ret();
        });
        let parent = interp.new_frame_with(&[(get_x, method)]);
        let obj = interp.new_frame_with(&[(x, Value::Int(1)), (proto, parent)]);

        assert_eq!(interp.send(obj, get_x, &[]).unwrap(), Value::Int(1));

        let result = run(&mut interp, vec![obj, Value::Symbol(get_x)], |b| {
            b.push(0).push(1).send(0).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(1));
    }

    #[test]
    fn resend_reaches_the_next_ancestor() {
        // base.describe -> 1; mid.describe -> 10 + inherited:describe()
        let mut interp = Interpreter::default();
        let describe = interp.intern("describe");
        let proto = interp.names.proto;
        let base_m = function(&mut interp, &[], &[], vec![], |b| {
            b.push_int(1).ret();
        });
        let mid_m = function(&mut interp, &[], &[], vec![Value::Symbol(describe)], |b| {
            b.push_int(10).push(0).resend(0).freq(FreqFunc::Add).ret();
        });
        let base = interp.new_frame_with(&[(describe, base_m)]);
        let mid = interp.new_frame_with(&[(describe, mid_m), (proto, base)]);
        let obj = interp.new_frame_with(&[(proto, mid)]);

        assert_eq!(interp.send(obj, describe, &[]).unwrap(), Value::Int(11));
    }

    #[test]
    fn if_defined_variants_swallow_missing_methods() {
        let mut interp = Interpreter::default();
        let missing = interp.sym("missing");
        let obj = interp.new_frame();
        let result = run(&mut interp, vec![obj, missing], |b| {
            b.push_int(5).push(0).push(1);
            b.emit(Instruction::SendIfDefined { argc: 1 }).ret();
        });
        assert_eq!(result.unwrap(), Value::NIL);

        let result = run(&mut interp, vec![missing], |b| {
            b.push_nil().push(0);
            b.emit(Instruction::SendIfDefined { argc: 0 }).ret();
        });
        assert_eq!(result.unwrap(), Value::NIL);

        let err = run(&mut interp, vec![obj, missing], |b| {
            b.push(0).push(1).send(0).ret();
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UndefinedMethod));
    }

    #[test]
    fn send_to_non_frame_is_a_type_error() {
        let mut interp = Interpreter::default();
        let name = interp.sym("m");
        let err = run(&mut interp, vec![name], |b| {
            b.push_int(3).push(0).send(0).ret();
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpectedFrame));
    }

    // ── Variables ──────────────────────────────────────────────────

    #[test]
    fn find_var_falls_back_to_globals() {
        let mut interp = Interpreter::default();
        let g = interp.intern("g");
        interp.define_global(g, Value::Int(9));
        let result = run(&mut interp, vec![Value::Symbol(g)], |b| {
            b.find_var(0).ret();
        });
        assert_eq!(result.unwrap(), Value::Int(9));

        let nothing = interp.sym("nothing");
        let err = run(&mut interp, vec![nothing], |b| {
            b.find_var(0).ret();
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UndefinedVariable));
    }

    #[test]
    fn find_and_set_var_targets_the_owner() {
        let mut interp = Interpreter::default();
        let count = interp.intern("count");
        let bump = interp.intern("bump");
        let proto = interp.names.proto;
        let method = function(&mut interp, &[], &[], vec![Value::Symbol(count)], |b| {
            b.find_var(0).push_int(1).freq(FreqFunc::Add);
            b.find_and_set_var(0);
            b.find_var(0).ret();
        });
        let class = interp.new_frame_with(&[(bump, method), (count, Value::Int(0))]);
        let obj = interp.new_frame_with(&[(proto, class)]);

        assert_eq!(interp.send(obj, bump, &[]).unwrap(), Value::Int(1));
        // The inherited value was shadowed on the receiver, not changed.
        assert_eq!(interp.get_slot(obj, count), Some(Value::Int(1)));
        assert_eq!(interp.get_slot(class, count), Some(Value::Int(0)));
    }

    #[test]
    fn assignment_to_unknown_name_creates_a_global() {
        let mut interp = Interpreter::default();
        let fresh = interp.intern("fresh");
        run(&mut interp, vec![Value::Symbol(fresh)], |b| {
            b.push_int(3).find_and_set_var(0).push_nil().ret();
        })
        .unwrap();
        assert_eq!(interp.global(fresh), Some(Value::Int(3)));
    }

    #[test]
    fn closures_see_enclosing_locals() {
        // func(n) begin local add := func(x) x + n; call add with (1) end
        let mut interp = Interpreter::default();
        let n = interp.intern("n");
        let inner = function(&mut interp, &["x"], &[], vec![Value::Symbol(n)], |b| {
            b.get_var(ARG_FRAME_FIXED_SLOTS as u16).find_var(0);
            b.freq(FreqFunc::Add).ret();
        });
        let outer = function(&mut interp, &["n"], &["add"], vec![inner], |b| {
            let add = ARG_FRAME_FIXED_SLOTS as u16 + 1;
            b.push(0).emit(Instruction::SetLexScope).set_var(add);
            b.push_int(1).get_var(add).invoke(1).ret();
        });
        assert_eq!(interp.call(outer, &[Value::Int(41)]).unwrap(), Value::Int(42));
    }

    #[test]
    fn closures_keep_their_self() {
        let mut interp = Interpreter::default();
        let tag = interp.intern("tag");
        let make = interp.intern("make");
        let inner = function(&mut interp, &[], &[], vec![Value::Symbol(tag)], |b| {
            b.find_var(0).ret();
        });
        let method = function(&mut interp, &[], &[], vec![inner], |b| {
            b.push(0).emit(Instruction::SetLexScope).ret();
        });
        let obj = interp.new_frame_with(&[(make, method), (tag, Value::Int(5))]);
        let closure = interp.send(obj, make, &[]).unwrap();
        assert_eq!(interp.call(closure, &[]).unwrap(), Value::Int(5));
    }
}
