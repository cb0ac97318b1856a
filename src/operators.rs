//! Binary, unary, and comparison operator dispatch, including the numeric
//! promotion rules: `Int`/`Float` arithmetic promotes to `Float`, `Int`
//! overflow of 32 bits promotes to `Long`, and integer true-division
//! returns `Int`/`Long` only when the quotient is exact.

use std::rc::Rc;

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::{Error, Result};
use crate::value::{ItemContainer, Value};

pub fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinOp::Add => apply_add(left, right),
        BinOp::Sub => numeric_binop(left, right, "-", |a, b| a - b, |a, b| a.checked_sub(b)),
        BinOp::Mult => apply_mult(left, right),
        BinOp::Div => apply_div(left, right),
        BinOp::Pow => apply_pow(left, right),
        BinOp::Mod => apply_mod(left, right),
    }
}

pub fn apply_unaryop(op: UnaryOp, operand: &Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::USub => match operand {
            Value::Int(i) => Ok(match i.checked_neg() {
                Some(n) => Value::Int(n),
                None => Value::Long(-(*i as i64)),
            }),
            Value::Long(i) => Ok(Value::Long(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::type_error(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        },
    }
}

pub fn apply_cmpop(op: CmpOp, left: &Value, right: &Value) -> Result<Value> {
    let result = match op {
        CmpOp::Is => left.is_identical(right),
        CmpOp::IsNot => !left.is_identical(right),
        CmpOp::Eq => left.value_eq(right),
        CmpOp::NotEq => !left.value_eq(right),
        CmpOp::In => right
            .contains_value(left)
            .ok_or_else(|| type_error_for_contains(right))?,
        CmpOp::NotIn => !right
            .contains_value(left)
            .ok_or_else(|| type_error_for_contains(right))?,
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            let ordering = ordered_compare(left, right)?;
            match op {
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::LtE => ordering != std::cmp::Ordering::Greater,
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::GtE => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            }
        }
    };
    Ok(Value::Bool(result))
}

fn type_error_for_contains(container: &Value) -> Error {
    Error::type_error(format!(
        "argument of type '{}' is not iterable",
        container.type_name()
    ))
}

/// Ordered comparisons require either two numbers or two equally-typed
/// comparables; this crate additionally orders equally-typed lists and
/// tuples lexicographically, which the spec's wording permits ("equally-
/// typed comparables") without naming explicitly.
fn ordered_compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    if left.is_numeric() && right.is_numeric() {
        return left
            .as_f64()
            .unwrap()
            .partial_cmp(&right.as_f64().unwrap())
            .ok_or_else(|| Error::type_error("cannot order NaN"));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) => Ok(a.borrow().clone().cmp_values(&b.borrow())),
        (Value::Tuple(a), Value::Tuple(b)) => Ok((**a).clone().cmp_values(b)),
        _ => Err(Error::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

trait CmpValues {
    fn cmp_values(self, other: &[Value]) -> std::cmp::Ordering;
}

impl CmpValues for Vec<Value> {
    fn cmp_values(self, other: &[Value]) -> std::cmp::Ordering {
        for (a, b) in self.iter().zip(other.iter()) {
            if let Ok(ord) = ordered_compare(a, b) {
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            } else if !a.value_eq(b) {
                return std::cmp::Ordering::Equal;
            }
        }
        self.len().cmp(&other.len())
    }
}

fn apply_add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = (**a).clone();
            items.extend(b.iter().cloned());
            Ok(Value::Tuple(Rc::new(items)))
        }
        _ => numeric_binop(left, right, "+", |a, b| a + b, |a, b| a.checked_add(b)),
    }
}

fn apply_mult(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Str(s), other) | (other, Value::Str(s)) if other.is_numeric() => {
            let n = other.as_i64().unwrap_or(0).max(0) as usize;
            Ok(Value::str(s.repeat(n)))
        }
        _ => numeric_binop(left, right, "*", |a, b| a * b, |a, b| a.checked_mul(b)),
    }
}

fn apply_div(left: &Value, right: &Value) -> Result<Value> {
    let (a, b) = (
        left.as_f64()
            .ok_or_else(|| bad_operand("/", left, right))?,
        right
            .as_f64()
            .ok_or_else(|| bad_operand("/", left, right))?,
    );
    if b == 0.0 {
        return Err(Error::value_error("division by zero"));
    }
    // True division of two integers returns Int iff the quotient is exact.
    if let (Some(ai), Some(bi)) = (left.as_i64(), right.as_i64()) {
        if bi != 0 && ai % bi == 0 {
            return Ok(Value::int_from_i64(ai / bi));
        }
    }
    Ok(Value::Float(a / b))
}

fn apply_pow(left: &Value, right: &Value) -> Result<Value> {
    let base = left
        .as_f64()
        .ok_or_else(|| bad_operand("**", left, right))?;
    let exp = right
        .as_f64()
        .ok_or_else(|| bad_operand("**", left, right))?;
    let result = base.powf(exp);
    // "returning Int iff exact": both operands integral, non-negative
    // exponent, and the mathematical result has no fractional part.
    if let (Some(bi), Some(ei)) = (left.as_i64(), right.as_i64()) {
        if ei >= 0 && result.is_finite() && result.fract() == 0.0 {
            if let Some(exact) = bi.checked_pow(ei as u32) {
                return Ok(Value::int_from_i64(exact));
            }
        }
    }
    Ok(Value::Float(result))
}

fn apply_mod(left: &Value, right: &Value) -> Result<Value> {
    if let Value::Str(fmt) = left {
        return Ok(Value::str(printf_format(fmt, right)));
    }
    numeric_binop(
        left,
        right,
        "%",
        |a: f64, b: f64| {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        },
        |a: i64, b: i64| {
            if b == 0 {
                return None;
            }
            let r = a % b;
            Some(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        },
    )
}

/// Numeric promotion: if either operand is `Float`, promote both and use
/// the float operator. Otherwise operate on integers and promote the
/// result from `Int` to `Long` on overflow (`int_op` returns `None` on
/// overflow or on division/mod by zero).
fn numeric_binop(
    left: &Value,
    right: &Value,
    symbol: &str,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Value> {
    if !left.is_numeric() || !right.is_numeric() {
        return Err(bad_operand(symbol, left, right));
    }
    if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
        return Ok(Value::Float(float_op(
            left.as_f64().unwrap(),
            right.as_f64().unwrap(),
        )));
    }
    let a = left.as_i64().unwrap();
    let b = right.as_i64().unwrap();
    match int_op(a, b) {
        Some(result) => Ok(Value::int_from_i64(result)),
        None => {
            if symbol == "%" {
                Err(Error::value_error("integer modulo by zero"))
            } else {
                // Arithmetic overflow beyond i64 is not expected for a
                // scripting workload this interpreter targets; fall back
                // to float rather than panicking.
                Ok(Value::Float(float_op(a as f64, b as f64)))
            }
        }
    }
}

fn bad_operand(symbol: &str, left: &Value, right: &Value) -> Error {
    Error::type_error(format!(
        "unsupported operand type(s) for {symbol}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

/// A minimal printf-style formatter for `%`-on-strings: `%s`, `%d`, `%f`,
/// and `%%`. The RHS is either a single value or a tuple of values.
fn printf_format(fmt: &str, rhs: &Value) -> String {
    let args: Vec<Value> = match rhs {
        Value::Tuple(items) => (**items).clone(),
        other => vec![other.clone()],
    };
    let mut out = String::new();
    let mut arg_idx = 0;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                out.push_str(&args.get(arg_idx).map(Value::to_display_string).unwrap_or_default());
                arg_idx += 1;
            }
            Some('d') => {
                let n = args.get(arg_idx).and_then(Value::as_i64).unwrap_or(0);
                out.push_str(&n.to_string());
                arg_idx += 1;
            }
            Some('f') => {
                let f = args.get(arg_idx).and_then(Value::as_f64).unwrap_or(0.0);
                out.push_str(&format!("{f:.6}"));
                arg_idx += 1;
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_overflow_promotes_to_long() {
        let max = Value::Int(i32::MAX);
        let result = apply_binop(BinOp::Add, &max, &Value::Int(1)).unwrap();
        assert_eq!(result, Value::Long(i32::MAX as i64 + 1));
    }

    #[test]
    fn int_float_addition_commutes() {
        let a = apply_binop(BinOp::Add, &Value::Int(2), &Value::Float(1.5)).unwrap();
        let b = apply_binop(BinOp::Add, &Value::Float(1.5), &Value::Int(2)).unwrap();
        assert_eq!(a.as_f64(), b.as_f64());
    }

    #[test]
    fn integer_true_division_exact_stays_int() {
        let result = apply_binop(BinOp::Div, &Value::Int(6), &Value::Int(3)).unwrap();
        assert_eq!(result, Value::Int(2));
    }

    #[test]
    fn integer_true_division_inexact_is_float() {
        let result = apply_binop(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert!(matches!(result, Value::Float(f) if (f - 3.5).abs() < 1e-9));
    }

    #[test]
    fn string_times_int_repeats() {
        let result = apply_binop(BinOp::Mult, &Value::str("ab"), &Value::Int(3)).unwrap();
        assert_eq!(result.to_display_string(), "ababab");
    }
}
