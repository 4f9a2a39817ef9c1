//! Built-in global functions.

use object::Value;

use super::{expect_int, expect_symbol};
use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

/// Argument list from NIL or an array.
fn arg_list(interp: &Interpreter, v: Value) -> Result<Vec<Value>> {
    if v.is_nil() {
        return Ok(Vec::new());
    }
    Ok(interp.array(v)?.elements.clone())
}

fn expect_frame(interp: &Interpreter, v: Value) -> Result<Value> {
    interp.frame(v)?;
    Ok(v)
}

// ── Exceptions ─────────────────────────────────────────────────────

pub fn throw(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[0])?;
    Err(interp.throw(name, args[1]))
}

pub fn rethrow(interp: &mut Interpreter, _: Value, _: &[Value]) -> Result<Value> {
    Err(interp.rethrow())
}

pub fn current_exception(interp: &mut Interpreter, _: Value, _: &[Value]) -> Result<Value> {
    Ok(interp.current_exception())
}

// ── Calls ──────────────────────────────────────────────────────────

pub fn apply(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let list = arg_list(interp, args[1])?;
    interp.call(args[0], &list)
}

pub fn perform(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[1])?;
    let list = arg_list(interp, args[2])?;
    interp.send(args[0], name, &list)
}

// ── Slots ──────────────────────────────────────────────────────────

pub fn get_slot(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let frame = expect_frame(interp, args[0])?;
    let name = expect_symbol(args[1])?;
    Ok(interp.get_slot(frame, name).unwrap_or(Value::NIL))
}

pub fn set_slot(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[1])?;
    interp.set_slot(args[0], name, args[2])?;
    Ok(args[2])
}

pub fn has_slot(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let frame = expect_frame(interp, args[0])?;
    let name = expect_symbol(args[1])?;
    Ok(Value::from_bool(interp.has_slot(frame, name)))
}

pub fn remove_slot(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[1])?;
    interp.remove_slot(args[0], name)?;
    Ok(args[0])
}

/// Slot value found by full lookup (`_proto`, then `_parent`).
pub fn get_variable(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let frame = expect_frame(interp, args[0])?;
    let name = expect_symbol(args[1])?;
    Ok(interp.full_lookup(frame, name).map_or(Value::NIL, |found| found.value))
}

// ── Objects ────────────────────────────────────────────────────────

pub fn clone(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(interp.clone_value(args[0]))
}

pub fn deep_clone(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(interp.deep_clone(args[0]))
}

pub fn class_of(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(interp.class_of(args[0]))
}

pub fn is_subclass(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let sub = expect_symbol(args[0])?;
    let sup = expect_symbol(args[1])?;
    Ok(Value::from_bool(interp.symbols.is_subclass(sub, sup)))
}

pub fn intern(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let text = interp
        .string_text(args[0])
        .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedString, args[0]))?;
    Ok(interp.sym(&text))
}

pub fn is_frame(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(interp.is_frame(args[0])))
}

pub fn is_array(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(interp.is_array(args[0])))
}

pub fn is_string(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(interp.is_string(args[0])))
}

pub fn is_symbol(_: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    Ok(Value::from_bool(args[0].as_symbol().is_some()))
}

pub fn set_length(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let len = expect_int(args[1])?;
    interp.set_length(args[0], len)?;
    Ok(args[0])
}

// ── Globals ────────────────────────────────────────────────────────

pub fn def_global_var(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[0])?;
    interp.define_global(name, args[1]);
    Ok(args[1])
}

pub fn get_global_var(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[0])?;
    Ok(interp.global(name).unwrap_or(Value::NIL))
}

pub fn global_var_exists(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[0])?;
    Ok(Value::from_bool(interp.global(name).is_some()))
}

pub fn def_global_fn(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[0])?;
    interp.function_kind(args[1])?;
    interp.define_global_function(name, args[1]);
    Ok(args[1])
}

pub fn get_global_fn(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let name = expect_symbol(args[0])?;
    Ok(interp.global_function(name).unwrap_or(Value::NIL))
}

// ── Runtime ────────────────────────────────────────────────────────

/// Print the arguments on one line; strings print without quotes.
pub fn print(interp: &mut Interpreter, _: Value, args: &[Value]) -> Result<Value> {
    let line: Vec<String> = args
        .iter()
        .map(|&v| {
            interp
                .string_text(v)
                .unwrap_or_else(|| interp.format_value(v))
        })
        .collect();
    println!("{}", line.join(" "));
    Ok(Value::NIL)
}

/// Collect now; answers the number of objects freed.
pub fn gc(interp: &mut Interpreter, _: Value, _: &[Value]) -> Result<Value> {
    let stats = interp.collect_garbage();
    Ok(Value::int(stats.freed_objects as i64).unwrap_or(Value::NIL))
}
