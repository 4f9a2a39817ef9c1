//! Root gathering for the heap's collector.

use heap::{GcStats, RootProvider};
use object::Value;

use crate::Interpreter;
use crate::interpreter::{Env, Registers};

/// Borrowed view of everything the interpreter keeps alive.
struct InterpreterRoots<'a> {
    tables: [Value; 4],
    env: &'a Env,
    saved: &'a [Env],
    pins: &'a [Value],
}

fn visit_registers(reg: &Registers, visitor: &mut dyn FnMut(Value)) {
    visitor(reg.func);
    visitor(reg.locals);
    visitor(reg.receiver);
    visitor(reg.implementor);
    visitor(reg.instructions);
    visitor(reg.literals);
}

fn visit_env(env: &Env, visitor: &mut dyn FnMut(Value)) {
    visit_registers(&env.reg, visitor);
    for reg in &env.calls {
        visit_registers(reg, visitor);
    }
    for &v in &env.stack {
        visitor(v);
    }
    visitor(env.exception);
}

impl RootProvider for InterpreterRoots<'_> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        for &table in &self.tables {
            visitor(table);
        }
        visit_env(self.env, visitor);
        for env in self.saved {
            visit_env(env, visitor);
        }
        for &pin in self.pins {
            visitor(pin);
        }
    }
}

impl Interpreter {
    /// Run a full collection now.
    pub fn collect_garbage(&mut self) -> GcStats {
        let roots = InterpreterRoots {
            tables: [self.globals, self.functions, self.magic, self.named_magic],
            env: &self.env,
            saved: &self.saved,
            pins: &self.pins,
        };
        self.heap.collect(&roots)
    }

    /// Keep `v` alive until [`Interpreter::unpin_to`] drops it.
    ///
    /// Returns the mark to unpin back to.
    pub fn pin(&mut self, v: Value) -> usize {
        self.pins.push(v);
        self.pins.len() - 1
    }

    pub fn unpin_to(&mut self, mark: usize) {
        self.pins.truncate(mark);
    }
}
