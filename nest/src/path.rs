//! Path expressions: `obj.slot`, `obj[index]` and chains of them.
//!
//! A path is a symbol, an integer, or an array of class `pathExpr` whose
//! elements are symbols and integers. Symbol segments read through
//! `_proto`; integer segments index arrays, strings and binaries.

use object::Value;

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

impl Interpreter {
    fn path_segments(&self, path: Value) -> Result<Vec<Value>> {
        let segments = match path {
            Value::Symbol(_) | Value::Int(_) => vec![path],
            _ => {
                let array = self
                    .array(path)
                    .map_err(|_| RuntimeError::with_value(ErrorCode::ExpectedPath, path))?;
                if array.class != Value::Symbol(self.names.path_expr) {
                    return Err(RuntimeError::with_value(ErrorCode::ExpectedPath, path));
                }
                array.elements.clone()
            }
        };
        if segments.is_empty() {
            return Err(RuntimeError::with_value(ErrorCode::EmptyPath, path));
        }
        if let Some(bad) = segments
            .iter()
            .find(|s| !matches!(s, Value::Symbol(_) | Value::Int(_)))
        {
            return Err(RuntimeError::with_value(ErrorCode::ExpectedPath, *bad));
        }
        Ok(segments)
    }

    fn step_path(&self, current: Value, segment: Value) -> Result<Value> {
        let current = self.resolve_magic(current);
        match segment {
            Value::Symbol(name) => {
                self.frame(current)?;
                Ok(self.inherited_slot(current, name))
            }
            _ => self.aref(current, segment),
        }
    }

    /// Follow `path` from `obj`.
    ///
    /// Reaching NIL before the last segment yields NIL, or raises
    /// path-failed when `strict`.
    pub fn get_path(&self, obj: Value, path: Value, strict: bool) -> Result<Value> {
        let segments = self.path_segments(path)?;
        let mut current = obj;
        for (i, &segment) in segments.iter().enumerate() {
            if current.is_nil() {
                if strict {
                    return Err(RuntimeError::with_value(ErrorCode::PathFailed, path)
                        .index(i as i64));
                }
                return Ok(Value::NIL);
            }
            current = self.step_path(current, segment)?;
        }
        Ok(current)
    }

    /// Assign the last segment of `path`, reached from `obj`.
    pub fn set_path(&mut self, obj: Value, path: Value, value: Value) -> Result<()> {
        let segments = self.path_segments(path)?;
        let (&last, init) = segments
            .split_last()
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::EmptyPath, path))?;
        let mut target = obj;
        for (i, &segment) in init.iter().enumerate() {
            if target.is_nil() {
                return Err(RuntimeError::with_value(ErrorCode::PathFailed, path)
                    .index(i as i64));
            }
            target = self.step_path(target, segment)?;
        }
        let target = self.resolve_magic(target);
        if target.is_nil() {
            return Err(RuntimeError::with_value(ErrorCode::PathFailed, path)
                .index(init.len() as i64));
        }
        match last {
            Value::Symbol(name) => self.set_slot(target, name, value),
            _ => self.set_aref(target, last, value),
        }
    }

    /// Whether every segment of `path` exists, inherited slots included.
    pub fn has_path(&self, obj: Value, path: Value) -> bool {
        let Ok(segments) = self.path_segments(path) else {
            return false;
        };
        let mut current = obj;
        for segment in segments {
            current = self.resolve_magic(current);
            let next = match segment {
                Value::Symbol(name) => self.proto_lookup(current, name).map(|(_, v)| v),
                _ => self.aref(current, segment).ok(),
            };
            match next {
                Some(v) => current = v,
                None => return false,
            }
        }
        true
    }
}
