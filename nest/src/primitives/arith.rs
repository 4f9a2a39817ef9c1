//! Numbers, arithmetic and ordering.
//!
//! Integers are 30-bit immediates; results that leave that range become
//! reals rather than wrapping.

use std::cmp::Ordering;

use object::{Value, compare_names};

use crate::Interpreter;
use crate::error::{ErrorCode, Result, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Real(x) => x,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Real(x) => x == 0.0,
        }
    }
}

impl Interpreter {
    /// Integer or real view of `v`.
    pub fn number(&self, v: Value) -> Option<Number> {
        match v {
            Value::Int(n) => Some(Number::Int(n.into())),
            _ => self.real_value(v).map(Number::Real),
        }
    }

    fn expect_number(&self, v: Value) -> Result<Number> {
        self.number(v)
            .ok_or_else(|| RuntimeError::with_value(ErrorCode::ExpectedNumber, v))
    }

    pub fn number_value(&mut self, n: Number) -> Value {
        match n {
            Number::Int(i) => match Value::int(i) {
                Some(v) => v,
                None => self.new_real(i as f64),
            },
            Number::Real(x) => self.new_real(x),
        }
    }

    fn arith(
        &mut self,
        a: Value,
        b: Value,
        int_op: fn(i64, i64) -> Option<i64>,
        real_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        let x = self.expect_number(a)?;
        let y = self.expect_number(b)?;
        let result = match (x, y) {
            (Number::Int(i), Number::Int(j)) => match int_op(i, j) {
                Some(n) => Number::Int(n),
                None => Number::Real(real_op(i as f64, j as f64)),
            },
            _ => Number::Real(real_op(x.as_f64(), y.as_f64())),
        };
        Ok(self.number_value(result))
    }

    pub fn add(&mut self, a: Value, b: Value) -> Result<Value> {
        self.arith(a, b, i64::checked_add, |x, y| x + y)
    }

    pub fn subtract(&mut self, a: Value, b: Value) -> Result<Value> {
        self.arith(a, b, i64::checked_sub, |x, y| x - y)
    }

    pub fn multiply(&mut self, a: Value, b: Value) -> Result<Value> {
        self.arith(a, b, i64::checked_mul, |x, y| x * y)
    }

    /// `/` always produces a real.
    pub fn divide(&mut self, a: Value, b: Value) -> Result<Value> {
        let x = self.expect_number(a)?;
        let y = self.expect_number(b)?;
        if y.is_zero() {
            return Err(RuntimeError::with_value(ErrorCode::DivisionByZero, b));
        }
        Ok(self.new_real(x.as_f64() / y.as_f64()))
    }

    /// Integer quotient, truncated toward zero.
    pub fn div(&mut self, a: Value, b: Value) -> Result<Value> {
        let x = super::expect_int(a)?;
        let y = super::expect_int(b)?;
        if y == 0 {
            return Err(RuntimeError::with_value(ErrorCode::DivisionByZero, b));
        }
        Ok(self.number_value(Number::Int(x / y)))
    }

    /// Order of two numbers, two characters or two strings.
    pub fn compare(&self, a: Value, b: Value) -> Result<Ordering> {
        if let (Some(x), Some(y)) = (self.number(a), self.number(b)) {
            return Ok(match (x, y) {
                (Number::Int(i), Number::Int(j)) => i.cmp(&j),
                _ => x.as_f64().total_cmp(&y.as_f64()),
            });
        }
        if let (Value::Char(x), Value::Char(y)) = (a, b) {
            return Ok(x.cmp(&y));
        }
        if let (Some(x), Some(y)) = (self.string_text(a), self.string_text(b)) {
            return Ok(compare_names(&x, &y));
        }
        let offender = if self.number(a).is_some() { b } else { a };
        Err(RuntimeError::with_value(ErrorCode::ExpectedNumber, offender))
    }

    /// `=`: identity, or numeric equality between numbers.
    pub fn equals(&self, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        match (self.number(a), self.number(b)) {
            (Some(Number::Int(i)), Some(Number::Int(j))) => i == j,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        }
    }
}
