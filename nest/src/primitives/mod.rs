//! Native functions and the frequent primitives.
//!
//! Natives are plain Rust functions registered in the interpreter's native
//! table. Each one is bound as a global function whose function object
//! carries its table index in `funcPtr`.

use object::{Symbol, Value};

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

mod arith;
mod freq;
mod natives;

pub use arith::Number;

pub type NativeFn = fn(&mut Interpreter, Value, &[Value]) -> Result<Value>;

#[derive(Clone, Copy)]
pub struct NativeDesc {
    pub name: &'static str,
    /// Exact argument count, or the minimum when `indefinite`.
    pub arity: usize,
    pub indefinite: bool,
    pub func: NativeFn,
}

impl NativeDesc {
    pub const fn new(name: &'static str, arity: usize, func: NativeFn) -> Self {
        Self {
            name,
            arity,
            indefinite: false,
            func,
        }
    }

    /// Native taking `min_arity` or more arguments.
    pub const fn indefinite(name: &'static str, min_arity: usize, func: NativeFn) -> Self {
        Self {
            name,
            arity: min_arity,
            indefinite: true,
            func,
        }
    }
}

impl core::fmt::Debug for NativeDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeDesc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("indefinite", &self.indefinite)
            .finish()
    }
}

pub fn default_natives() -> Vec<NativeDesc> {
    vec![
        // exceptions
        NativeDesc::new("Throw", 2, natives::throw),
        NativeDesc::new("Rethrow", 0, natives::rethrow),
        NativeDesc::new("CurrentException", 0, natives::current_exception),
        // calls
        NativeDesc::new("Apply", 2, natives::apply),
        NativeDesc::new("Perform", 3, natives::perform),
        // slots
        NativeDesc::new("GetSlot", 2, natives::get_slot),
        NativeDesc::new("SetSlot", 3, natives::set_slot),
        NativeDesc::new("HasSlot", 2, natives::has_slot),
        NativeDesc::new("RemoveSlot", 2, natives::remove_slot),
        NativeDesc::new("GetVariable", 2, natives::get_variable),
        // objects
        NativeDesc::new("Clone", 1, natives::clone),
        NativeDesc::new("DeepClone", 1, natives::deep_clone),
        NativeDesc::new("ClassOf", 1, natives::class_of),
        NativeDesc::new("IsSubclass", 2, natives::is_subclass),
        NativeDesc::new("Intern", 1, natives::intern),
        NativeDesc::new("IsFrame", 1, natives::is_frame),
        NativeDesc::new("IsArray", 1, natives::is_array),
        NativeDesc::new("IsString", 1, natives::is_string),
        NativeDesc::new("IsSymbol", 1, natives::is_symbol),
        NativeDesc::new("SetLength", 2, natives::set_length),
        // globals
        NativeDesc::new("DefGlobalVar", 2, natives::def_global_var),
        NativeDesc::new("GetGlobalVar", 1, natives::get_global_var),
        NativeDesc::new("GlobalVarExists", 1, natives::global_var_exists),
        NativeDesc::new("DefGlobalFn", 2, natives::def_global_fn),
        NativeDesc::new("GetGlobalFn", 1, natives::get_global_fn),
        // runtime
        NativeDesc::indefinite("Print", 0, natives::print),
        NativeDesc::new("GC", 0, natives::gc),
    ]
}

pub(crate) fn expect_int(v: Value) -> Result<i64> {
    v.as_int()
        .map(i64::from)
        .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedInteger, v))
}

pub(crate) fn expect_symbol(v: Value) -> Result<Symbol> {
    v.as_symbol()
        .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedSymbol, v))
}

pub(crate) fn expect_char(v: Value) -> Result<char> {
    v.as_char()
        .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedCharacter, v))
}
