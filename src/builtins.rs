//! Built-in free functions (`len`, `range`, `print`, …) and the `math`
//! namespace.
//!
//! Most built-ins are pure functions of their arguments and live here.
//! `print` (needs the redirectable stdout sink), `str`/`type` (need the
//! evaluator to dispatch to a user-defined `__str__` or consult the host
//! registry) are special-cased in `eval.rs`'s call dispatch instead, the
//! same way the teacher's `eval.rs` special-cases its own inline builtins
//! before falling through to registered tools.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::host::{HostClassDescriptor, HostRegistry, Overload, ParamKind};
use crate::value::{Lengthable, Value};

pub const BUILTIN_NAMES: &[&str] = &[
    "int", "float", "str", "bool", "len", "range", "enumerate", "tuple", "list", "print", "type",
    "abs", "round", "min", "max", "ord", "chr",
];

pub fn is_builtin_name(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub fn len_builtin(args: &[Value]) -> Result<Value> {
    let x = first_arg(args, "len")?;
    x.length()
        .map(|n| Value::int_from_i64(n as i64))
        .ok_or_else(|| Error::type_error(format!("object of type '{}' has no len()", x.type_name())))
}

pub fn int_builtin(args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::int_from_i64)
            .map_err(|_| Error::value_error(format!("invalid literal for int(): '{s}'"))),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i32)),
        Some(v) if v.is_numeric() => Ok(Value::int_from_i64(v.as_f64().unwrap() as i64)),
        Some(v) => Err(Error::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            v.type_name()
        ))),
    }
}

pub fn float_builtin(args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::value_error(format!("could not convert string to float: '{s}'"))),
        Some(v) if v.is_numeric() => Ok(Value::Float(v.as_f64().unwrap())),
        Some(v) => Err(Error::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            v.type_name()
        ))),
    }
}

pub fn bool_builtin(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false)))
}

pub fn str_value_builtin(args: &[Value]) -> Result<Value> {
    Ok(Value::str(
        args.first().map(Value::to_display_string).unwrap_or_default(),
    ))
}

pub fn abs_builtin(args: &[Value]) -> Result<Value> {
    match first_arg(args, "abs")? {
        Value::Int(i) => Ok(Value::int_from_i64((*i as i64).abs())),
        Value::Long(i) => Ok(Value::int_from_i64(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(Error::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

pub fn round_builtin(args: &[Value]) -> Result<Value> {
    let x = first_arg(args, "round")?
        .as_f64()
        .ok_or_else(|| Error::type_error("round() argument must be a number"))?;
    match args.get(1) {
        None => Ok(Value::int_from_i64(x.round() as i64)),
        Some(n) => {
            let digits = n
                .as_i64()
                .ok_or_else(|| Error::type_error("round() ndigits must be an integer"))?;
            let factor = 10f64.powi(digits as i32);
            Ok(Value::Float((x * factor).round() / factor))
        }
    }
}

pub fn min_builtin(args: &[Value]) -> Result<Value> {
    extremum(args, "min", |a, b| {
        a.as_f64().unwrap_or(f64::NAN) < b.as_f64().unwrap_or(f64::NAN)
    })
}

pub fn max_builtin(args: &[Value]) -> Result<Value> {
    extremum(args, "max", |a, b| {
        a.as_f64().unwrap_or(f64::NAN) > b.as_f64().unwrap_or(f64::NAN)
    })
}

fn extremum(args: &[Value], name: &str, better: impl Fn(&Value, &Value) -> bool) -> Result<Value> {
    let items: Vec<Value> = if args.len() == 1 {
        match &args[0] {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => (**items).clone(),
            other => vec![other.clone()],
        }
    } else {
        args.to_vec()
    };
    let mut best = items
        .first()
        .cloned()
        .ok_or_else(|| Error::value_error(format!("{name}() arg is an empty sequence")))?;
    for item in items.into_iter().skip(1) {
        if better(&item, &best) {
            best = item;
        }
    }
    Ok(best)
}

pub fn ord_builtin(args: &[Value]) -> Result<Value> {
    let s = first_arg(args, "ord")?
        .as_str()
        .ok_or_else(|| Error::type_error("ord() expected a string"))?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::int_from_i64(c as i64)),
        _ => Err(Error::type_error(
            "ord() expected a character, but string of different length found",
        )),
    }
}

pub fn chr_builtin(args: &[Value]) -> Result<Value> {
    let n = first_arg(args, "chr")?
        .as_i64()
        .ok_or_else(|| Error::type_error("chr() argument must be an integer"))?;
    char::from_u32(n as u32)
        .map(|c| Value::str(c.to_string()))
        .ok_or_else(|| Error::value_error(format!("chr() arg not in valid range: {n}")))
}

pub fn tuple_builtin(args: &[Value]) -> Result<Value> {
    Ok(Value::Tuple(Rc::new(to_items(args)?)))
}

pub fn list_builtin(args: &[Value]) -> Result<Value> {
    Ok(Value::list(to_items(args)?))
}

pub(crate) fn to_items(args: &[Value]) -> Result<Vec<Value>> {
    match args.first() {
        None => Ok(Vec::new()),
        Some(Value::List(items)) => Ok(items.borrow().clone()),
        Some(Value::Tuple(items)) => Ok((**items).clone()),
        Some(Value::Str(s)) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Some(Value::Dict(pairs)) => Ok(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()),
        Some(other) => Err(Error::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// `range(stop) | range(start, stop) | range(start, stop, step)`.
/// Materialized eagerly into a `List` rather than a genuinely lazy
/// sequence — this crate has no dedicated iterator value variant, and
/// nothing in the testable properties distinguishes laziness from eager
/// materialization for a finite embedded script (see DESIGN.md).
pub fn range_builtin(args: &[Value]) -> Result<Value> {
    let ints: Vec<i64> = args
        .iter()
        .map(|v| v.as_i64().ok_or_else(|| Error::type_error("range() arguments must be integers")))
        .collect::<Result<_>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Error::type_error("range() expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(Error::value_error("range() arg 3 must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::int_from_i64(i));
        i += step;
    }
    Ok(Value::list(out))
}

/// `enumerate(iter, start=0)` — yields `(index, value)` tuples.
pub fn enumerate_builtin(args: &[Value]) -> Result<Value> {
    let iterable = first_arg(args, "enumerate")?;
    let start = args.get(1).and_then(Value::as_i64).unwrap_or(0);
    let items = to_items(std::slice::from_ref(iterable))?;
    let out = items
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::Tuple(Rc::new(vec![Value::int_from_i64(start + i as i64), v])))
        .collect();
    Ok(Value::list(out))
}

fn first_arg<'a>(args: &'a [Value], name: &str) -> Result<&'a Value> {
    args.first()
        .ok_or_else(|| Error::type_error(format!("{name}() missing required argument")))
}

/// `x.items()` on a dict — `(key, value)` tuple pairs in storage order.
pub fn dict_items(pairs: &[(Value, Value)]) -> Value {
    Value::list(
        pairs
            .iter()
            .map(|(k, v)| Value::Tuple(Rc::new(vec![k.clone(), v.clone()])))
            .collect(),
    )
}

pub fn dict_keys(pairs: &[(Value, Value)]) -> Value {
    Value::list(pairs.iter().map(|(k, _)| k.clone()).collect())
}

pub fn dict_values(pairs: &[(Value, Value)]) -> Value {
    Value::list(pairs.iter().map(|(_, v)| v.clone()).collect())
}

/// `"...".get(key, default)`-style dict accessor, returning `default`
/// (`None` if omitted) instead of raising on a missing key.
pub fn dict_get(pairs: &[(Value, Value)], key: &Value, default: Option<Value>) -> Value {
    pairs
        .iter()
        .find(|(k, _)| k.value_eq(key))
        .map(|(_, v)| v.clone())
        .or(default)
        .unwrap_or(Value::None)
}

/// Registers the `math` namespace as a host class, reusing the host-interop
/// machinery (static fields for constants, a static method for `sqrt`)
/// rather than inventing a separate "module" value kind. Mirrors the
/// teacher's own `sandbox.module("math", |m| ...)` registration, just
/// routed through this crate's `HostRegistry` instead of a bespoke
/// `ModuleBuilder`.
pub fn register_math_module(registry: &mut HostRegistry) {
    let mut static_fields = std::collections::HashMap::new();
    static_fields.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
    static_fields.insert("e".to_string(), Value::Float(std::f64::consts::E));
    static_fields.insert("tau".to_string(), Value::Float(std::f64::consts::TAU));

    let mut static_methods = std::collections::HashMap::new();
    static_methods.insert(
        "sqrt".to_string(),
        vec![Overload {
            params: vec![ParamKind::Double],
            invoke: Rc::new(|_recv, args, _call| {
                let x = args
                    .first()
                    .and_then(Value::as_f64)
                    .ok_or_else(|| Error::type_error("sqrt() argument must be a number"))?;
                Ok(Value::Float(x.sqrt()))
            }),
        }],
    );

    registry.register(HostClassDescriptor {
        name: "math".to_string(),
        is_public: true,
        superclass: None,
        interfaces: Vec::new(),
        constructors: Vec::new(),
        methods: std::collections::HashMap::new(),
        static_methods,
        static_fields,
        instance_fields: std::collections::HashMap::new(),
        functional_method: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_three_arg_counts_down() {
        let result = range_builtin(&[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap();
        if let Value::List(items) = result {
            let items = items.borrow();
            assert_eq!(items.as_slice(), &[Value::Int(5), Value::Int(3), Value::Int(1)]);
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn enumerate_starts_at_given_offset() {
        let iterable = Value::list(vec![Value::str("a"), Value::str("b")]);
        let result = enumerate_builtin(&[iterable, Value::Int(1)]).unwrap();
        if let Value::List(items) = result {
            let items = items.borrow();
            assert_eq!(items[0], Value::Tuple(Rc::new(vec![Value::Int(1), Value::str("a")])));
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn int_parses_decimal_strings() {
        assert_eq!(int_builtin(&[Value::str("42")]).unwrap(), Value::Int(42));
        assert!(int_builtin(&[Value::str("abc")]).is_err());
    }
}
