//! Binary arithmetic over reverse-Polish token sequences.

use std::fmt;

use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::record::{Entry, Record};
use crate::query::value::FieldData;

/// Binary arithmetic operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MathOp {
    /// `+`: numeric addition, list concatenation, or string concatenation.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
}

impl MathOp {
    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Mod => "%",
            MathOp::Pow => "^",
        }
    }
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One element of a flattened reverse-Polish arithmetic sequence.
#[derive(Clone, Debug)]
pub enum MathToken {
    /// Pushes the value of a sub-expression.
    Operand(ArithExpr),
    /// Pops two values and pushes the result.
    Operator(MathOp),
}

pub(super) fn evaluate_rpn(
    tokens: &[MathToken],
    ctx: &ExecContext<'_>,
    record: &Record,
) -> Result<Entry> {
    let mut stack: Vec<Entry> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            MathToken::Operand(expr) => stack.push(expr.evaluate(ctx, record)?),
            MathToken::Operator(op) => {
                let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                    return Err(ExecError::internal(format!(
                        "arithmetic sequence underflows at '{op}'"
                    )));
                };
                stack.push(apply(*op, &lhs, &rhs)?);
            }
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(result), true) => Ok(result),
        _ => Err(ExecError::internal("arithmetic sequence leaves a malformed stack")),
    }
}

/// Applies `op` to two evaluated entries.
pub fn apply(op: MathOp, lhs: &Entry, rhs: &Entry) -> Result<Entry> {
    if lhs.equal_null() || rhs.equal_null() {
        return Ok(Entry::null());
    }
    match (lhs, rhs) {
        (Entry::Constant(a), Entry::Constant(b)) => binary(op, a, b).map(Entry::Constant),
        _ => Err(ExecError::type_mismatch(format!(
            "cannot apply '{op}' to {} and {}",
            lhs.kind_name(),
            rhs.kind_name()
        ))),
    }
}

/// Applies `op` to two constant values.
pub fn binary(op: MathOp, a: &FieldData, b: &FieldData) -> Result<FieldData> {
    if a.is_null() || b.is_null() {
        return Ok(FieldData::Null);
    }
    if op == MathOp::Add {
        match (a, b) {
            (FieldData::Array(x), FieldData::Array(y)) => {
                let mut out = x.clone();
                out.extend(y.iter().cloned());
                return Ok(FieldData::Array(out));
            }
            (FieldData::Array(x), other) => {
                let mut out = x.clone();
                out.push(other.clone());
                return Ok(FieldData::Array(out));
            }
            (other, FieldData::Array(y)) => {
                let mut out = Vec::with_capacity(y.len() + 1);
                out.push(other.clone());
                out.extend(y.iter().cloned());
                return Ok(FieldData::Array(out));
            }
            (FieldData::String(_), _) | (_, FieldData::String(_)) => {
                return Ok(FieldData::String(format!("{a}{b}")));
            }
            _ => {}
        }
    }
    match (a, b) {
        (FieldData::Int(x), FieldData::Int(y)) => integer(op, *x, *y),
        _ if a.is_numeric() && b.is_numeric() => {
            let (x, y) = (a.as_float().unwrap_or_default(), b.as_float().unwrap_or_default());
            float(op, x, y)
        }
        _ => Err(ExecError::type_mismatch(format!(
            "cannot apply '{op}' to {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn integer(op: MathOp, x: i64, y: i64) -> Result<FieldData> {
    let overflow = || ExecError::evaluation(format!("integer overflow in {x} {op} {y}"));
    let value = match op {
        MathOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        MathOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        MathOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        MathOp::Div | MathOp::Mod if y == 0 => {
            return Err(ExecError::evaluation("divided by zero"));
        }
        MathOp::Div => x.checked_div(y).ok_or_else(overflow)?,
        MathOp::Mod => x.checked_rem(y).ok_or_else(overflow)?,
        MathOp::Pow => return Ok(FieldData::Float((x as f64).powf(y as f64))),
    };
    Ok(FieldData::Int(value))
}

fn float(op: MathOp, x: f64, y: f64) -> Result<FieldData> {
    let value = match op {
        MathOp::Add => x + y,
        MathOp::Sub => x - y,
        MathOp::Mul => x * y,
        MathOp::Div | MathOp::Mod if y == 0.0 => {
            return Err(ExecError::not_implemented(format!("float {op} by zero")));
        }
        MathOp::Div => x / y,
        MathOp::Mod => x % y,
        MathOp::Pow => x.powf(y),
    };
    Ok(FieldData::Float(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> FieldData {
        FieldData::Array(values.iter().copied().map(FieldData::Int).collect())
    }

    #[test]
    fn add_concatenates_lists_and_strings() -> Result<()> {
        assert_eq!(binary(MathOp::Add, &ints(&[1, 2]), &ints(&[3]))?, ints(&[1, 2, 3]));
        assert_eq!(
            binary(MathOp::Add, &FieldData::Int(1), &FieldData::from("x"))?,
            FieldData::from("1x")
        );
        assert_eq!(
            binary(MathOp::Add, &FieldData::from("v"), &FieldData::Float(2.0))?,
            FieldData::from("v2.0")
        );
        Ok(())
    }

    #[test]
    fn integers_stay_integers_until_a_float_appears() -> Result<()> {
        assert_eq!(binary(MathOp::Div, &FieldData::Int(7), &FieldData::Int(2))?, FieldData::Int(3));
        assert_eq!(
            binary(MathOp::Mul, &FieldData::Int(3), &FieldData::Float(0.5))?,
            FieldData::Float(1.5)
        );
        assert_eq!(binary(MathOp::Mod, &FieldData::Int(7), &FieldData::Int(4))?, FieldData::Int(3));
        assert_eq!(binary(MathOp::Pow, &FieldData::Int(2), &FieldData::Int(3))?, FieldData::Float(8.0));
        Ok(())
    }

    #[test]
    fn zero_divisors() {
        let err = binary(MathOp::Div, &FieldData::Int(5), &FieldData::Int(0)).unwrap_err();
        assert_eq!(err.code(), "EVALUATION_ERROR");
        let err = binary(MathOp::Mod, &FieldData::Int(5), &FieldData::Int(0)).unwrap_err();
        assert_eq!(err.code(), "EVALUATION_ERROR");
        let err = binary(MathOp::Div, &FieldData::Float(1.0), &FieldData::Int(0)).unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn null_operand_nulls_the_result() -> Result<()> {
        assert_eq!(binary(MathOp::Sub, &FieldData::Null, &FieldData::Int(1))?, FieldData::Null);
        assert!(apply(MathOp::Add, &Entry::Unknown, &Entry::constant(1i64))?.is_null());
        Ok(())
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let err = binary(MathOp::Sub, &FieldData::from("a"), &FieldData::Int(1)).unwrap_err();
        assert_eq!(err.code(), "TYPE_MISMATCH");
        let err = binary(MathOp::Add, &FieldData::Int(i64::MAX), &FieldData::Int(1)).unwrap_err();
        assert_eq!(err.code(), "EVALUATION_ERROR");
    }
}
