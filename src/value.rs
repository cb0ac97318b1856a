//! The runtime value model.
//!
//! A tagged union of every value the evaluator can produce or consume,
//! plus the capability traits ("length", "get/set/delete item", "contains")
//! that replace duck typing: each container variant implements the
//! capabilities it actually supports, and the evaluator queries them
//! instead of pattern-matching ad hoc at every call site.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Expr, Stmt};
use crate::class::{UserClass, UserObject};
use crate::context::ContextHandle;
use crate::error::{Error, Result};
use crate::host::{HostClassRef, HostObjectRef};

/// The body of a script-defined callable: a block of statements (a `def`)
/// or a single expression (a `lambda`).
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Expr(Rc<Expr>),
}

/// A script-defined function or lambda, closing over the context active at
/// the point it was created. The closure is held by reference (an `Rc`), so
/// reads against it at call time observe whatever the enclosing scope holds
/// *then*, not a snapshot taken at definition time.
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub closure: ContextHandle,
}

/// A user-method bound to its receiver, produced by attribute access on a
/// `UserObject` or `UserClass` outside of immediate call position. In call
/// position the evaluator dispatches directly without materializing this.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method_name: String,
}

/// The four-way result of slicing syntax, with all three components
/// optional. Non-`None`, non-1 `step` is rejected at evaluation time, not
/// here — the AST carries it so a clear `ValueError` can be raised at the
/// subscript site.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<Vec<(Value, Value)>>>;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    /// Machine-width integer. Promotes to `Long` on overflow of 32 bits.
    Int(i32),
    /// The wider integer variant `Int` promotes into.
    Long(i64),
    Float(f64),
    Str(Rc<String>),
    List(ListRef),
    Tuple(Rc<Vec<Value>>),
    /// Insertion-agnostic mapping, kept as pairs rather than a hash map
    /// since keys are runtime `Value`s rather than a type with a native
    /// `Hash` impl (see DESIGN.md).
    Dict(DictRef),
    Function(Rc<FunctionValue>),
    BoundMethod(Rc<BoundMethod>),
    HostClass(HostClassRef),
    HostObject(HostObjectRef),
    UserClass(Rc<UserClass>),
    UserObject(Rc<RefCell<UserObject>>),
    Slice(Box<Slice>),
}

/// Serializes the plain-data variants (`None`, `Bool`, `Int`, `Long`,
/// `Float`, `Str`, `List`, `Tuple`, `Dict`) for embedders shipping a result
/// across a process boundary. A `#[derive(Serialize)]` can't cover the
/// whole enum here — `Function`/`HostObject`/`UserObject` and friends hold
/// closures, trait objects, and interior-mutable object graphs that have
/// no sensible wire form — so those variants report a serialization error
/// instead of being silently dropped or panicking.
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{Error as _, SerializeMap, SerializeSeq};
        match self {
            Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i32(*i),
            Value::Long(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(pairs) => {
                let pairs = pairs.borrow();
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs.iter() {
                    map.serialize_entry(&k.to_display_string(), v)?;
                }
                map.end()
            }
            other => Err(S::Error::custom(format!(
                "cannot serialize a '{}' value across a process boundary",
                other.type_name()
            ))),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(pairs: Vec<(Value, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(pairs)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Long(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) | Value::BoundMethod(_) => "function",
            Value::HostClass(_) => "HostClass",
            Value::HostObject(_) => "HostObject",
            Value::UserClass(_) => "type",
            Value::UserObject(obj) => {
                // Leak-free: the class name outlives the object for the
                // object's whole life, but we can't hand back `&'static
                // str` for a runtime name, so callers that need the real
                // name should use `class_name()` instead of `type_name()`.
                let _ = obj;
                "object"
            }
            Value::Slice(_) => "slice",
        }
    }

    /// The display name used in error messages and `type()`, which for user
    /// objects is the class name rather than the generic "object" tag.
    pub fn display_type_name(&self) -> String {
        match self {
            Value::UserObject(obj) => obj.borrow().class.name.clone(),
            Value::UserClass(class) => class.name.clone(),
            other => other.type_name().to_string(),
        }
    }

    /// Truthiness per the Language's rules: `None` is false, `Bool` is
    /// itself, empty containers and zero numbers are false, user objects
    /// default to true, and — a deliberate, documented quirk — the literal
    /// string `"False"` is false too, to round-trip a host boolean's
    /// string form.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Long(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s.as_str() != "False",
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.borrow().is_empty(),
            Value::Function(_) | Value::BoundMethod(_) => true,
            Value::HostClass(_) | Value::HostObject(_) => true,
            Value::UserClass(_) => true,
            Value::UserObject(_) => true,
            Value::Slice(_) => true,
        }
    }

    /// Value equality (the `==` operator), as distinct from `is` identity.
    pub fn value_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(_) | Long(_) | Float(_), Int(_) | Long(_) | Float(_)) => {
                self.as_f64().unwrap() == other.as_f64().unwrap()
            }
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Tuple(a), Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Dict(a), Dict(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.value_eq(k2) && v.value_eq(v2))
                    })
            }
            (UserObject(a), UserObject(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                if a.class.frozen && Rc::ptr_eq(&a.class, &b.class) {
                    a.dataclass_hash_key() == b.dataclass_hash_key()
                } else {
                    Rc::ptr_eq(&a.class, &b.class) && std::ptr::eq(&*a, &*b)
                }
            }
            _ => self.is_identical(other),
        }
    }

    /// `is`/`is not` identity. Only `None is None` is documented as
    /// meaningful by the spec; for everything else we fall back to
    /// reference identity where the variant carries a reference type.
    pub fn is_identical(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (List(a), List(b)) => Rc::ptr_eq(a, b),
            (Dict(a), Dict(b)) => Rc::ptr_eq(a, b),
            (UserObject(a), UserObject(b)) => Rc::ptr_eq(a, b),
            (HostObject(a), HostObject(b)) => Rc::ptr_eq(a, b),
            (UserClass(a), UserClass(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Long(_) | Value::Float(_))
    }

    /// Wrap an `i64` into `Int` when it fits 32 bits, else `Long` — the
    /// single promotion rule every integer-producing operation funnels
    /// through.
    pub fn int_from_i64(n: i64) -> Value {
        match i32::try_from(n) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Long(n),
        }
    }

    /// The `str()` / f-string form: human-readable, unquoted for strings.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(i) => i.to_string(),
            Value::Float(fl) => format_float(*fl),
            Value::Str(s) => s.as_str().to_string(),
            Value::List(items) => format!(
                "[{}]",
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_repr_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Tuple(items) => {
                let inner = items
                    .iter()
                    .map(|v| v.to_repr_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if items.len() == 1 {
                    format!("({inner},)")
                } else {
                    format!("({inner})")
                }
            }
            Value::Dict(pairs) => format!(
                "{{{}}}",
                pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_repr_string(), v.to_repr_string()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Function(f) => format!("<function {}>", f.name),
            Value::BoundMethod(m) => format!("<bound method {}>", m.method_name),
            Value::HostClass(c) => format!("<host class '{}'>", c.name),
            Value::HostObject(o) => o.to_display_string(),
            Value::UserClass(c) => format!("<class '{}'>", c.name),
            Value::UserObject(o) => o.borrow().to_display_string(),
            Value::Slice(s) => format!("slice({:?}, {:?}, {:?})", s.lower, s.upper, s.step),
        }
    }

    /// The `repr()` form used inside list/tuple/dict printing: strings are
    /// quoted.
    pub fn to_repr_string(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_display_string(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_eq(other)
    }
}

// ---------------------------------------------------------------------
// Capability traits (Lengthable, ItemGetter, ItemSetter, ItemContainer,
// ItemDeleter). Implemented here for the built-in container kinds; the
// evaluator additionally honors these for `UserObject`s by dispatching to
// `__len__`/`__getitem__`/`__setitem__`/`__contains__`/`__delitem__`
// methods when present, since that dispatch needs the call machinery in
// `eval.rs`.
// ---------------------------------------------------------------------

pub trait Lengthable {
    fn length(&self) -> Option<usize>;
}

pub trait ItemGetter {
    fn get_item(&self, index: &Value) -> Option<Result<Value>>;
}

pub trait ItemSetter {
    fn set_item(&self, index: &Value, value: Value) -> Option<Result<()>>;
}

pub trait ItemContainer {
    fn contains_value(&self, needle: &Value) -> Option<bool>;
}

pub trait ItemDeleter {
    fn delete_item(&self, index: &Value) -> Option<Result<()>>;
}

fn normalize_index(len: usize, i: i64) -> Option<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as usize >= len {
        None
    } else {
        Some(idx as usize)
    }
}

impl Lengthable for Value {
    fn length(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.borrow().len()),
            Value::Tuple(items) => Some(items.len()),
            Value::Dict(pairs) => Some(pairs.borrow().len()),
            _ => None,
        }
    }
}

impl ItemGetter for Value {
    fn get_item(&self, index: &Value) -> Option<Result<Value>> {
        match self {
            Value::Str(s) => Some(string_get_item(s, index)),
            Value::List(items) => Some(sequence_get_item(
                &items.borrow(),
                index,
                |v| Value::list(v.to_vec()),
            )),
            Value::Tuple(items) => Some(sequence_get_item(items, index, |v| {
                Value::Tuple(Rc::new(v.to_vec()))
            })),
            Value::Dict(pairs) => Some(dict_get_item(&pairs.borrow(), index)),
            _ => None,
        }
    }
}

impl ItemSetter for Value {
    fn set_item(&self, index: &Value, value: Value) -> Option<Result<()>> {
        match self {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                Some(match index.as_i64() {
                    Some(i) => match normalize_index(len, i) {
                        Some(idx) => {
                            items[idx] = value;
                            Ok(())
                        }
                        None => Err(Error::index_error("list assignment index out of range")),
                    },
                    None => Err(Error::type_error("list indices must be integers")),
                })
            }
            Value::Dict(pairs) => {
                let mut pairs = pairs.borrow_mut();
                if let Some(slot) = pairs.iter_mut().find(|(k, _)| k.value_eq(index)) {
                    slot.1 = value;
                } else {
                    pairs.push((index.clone(), value));
                }
                Some(Ok(()))
            }
            _ => None,
        }
    }
}

impl ItemContainer for Value {
    fn contains_value(&self, needle: &Value) -> Option<bool> {
        match self {
            Value::Str(s) => needle
                .as_str()
                .map(|sub| s.contains(sub)),
            Value::List(items) => Some(items.borrow().iter().any(|v| v.value_eq(needle))),
            Value::Tuple(items) => Some(items.iter().any(|v| v.value_eq(needle))),
            Value::Dict(pairs) => Some(pairs.borrow().iter().any(|(k, _)| k.value_eq(needle))),
            _ => None,
        }
    }
}

impl ItemDeleter for Value {
    fn delete_item(&self, index: &Value) -> Option<Result<()>> {
        match self {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                Some(match index.as_i64().and_then(|i| normalize_index(len, i)) {
                    Some(idx) => {
                        items.remove(idx);
                        Ok(())
                    }
                    None => Err(Error::index_error("list assignment index out of range")),
                })
            }
            Value::Dict(pairs) => {
                let mut pairs = pairs.borrow_mut();
                let before = pairs.len();
                pairs.retain(|(k, _)| !k.value_eq(index));
                Some(if pairs.len() == before {
                    Err(Error::index_error(format!(
                        "key {} not found",
                        index.to_repr_string()
                    )))
                } else {
                    Ok(())
                })
            }
            _ => None,
        }
    }
}

fn string_get_item(s: &str, index: &Value) -> Result<Value> {
    let chars: Vec<char> = s.chars().collect();
    match index {
        Value::Slice(slice) => {
            let sub = slice_chars(&chars, slice)?;
            Ok(Value::str(sub.into_iter().collect::<String>()))
        }
        _ => {
            let i = index
                .as_i64()
                .ok_or_else(|| Error::type_error("string indices must be integers"))?;
            let idx = normalize_index(chars.len(), i)
                .ok_or_else(|| Error::index_error("string index out of range"))?;
            Ok(Value::str(chars[idx].to_string()))
        }
    }
}

fn sequence_get_item(
    items: &[Value],
    index: &Value,
    rewrap: impl Fn(&[Value]) -> Value,
) -> Result<Value> {
    match index {
        Value::Slice(slice) => {
            let lo_hi = slice_bounds(items.len(), slice)?;
            Ok(rewrap(&items[lo_hi.0..lo_hi.1]))
        }
        _ => {
            let i = index
                .as_i64()
                .ok_or_else(|| Error::type_error("indices must be integers"))?;
            let idx = normalize_index(items.len(), i)
                .ok_or_else(|| Error::index_error("index out of range"))?;
            Ok(items[idx].clone())
        }
    }
}

fn dict_get_item(pairs: &[(Value, Value)], index: &Value) -> Result<Value> {
    pairs
        .iter()
        .find(|(k, _)| k.value_eq(index))
        .map(|(_, v)| v.clone())
        .ok_or_else(|| Error::index_error(format!("key {} not found", index.to_repr_string())))
}

/// Shared bounds computation for slicing a sequence of length `len`. Steps
/// other than `None`/`1` raise `ValueError`, matching the spec's explicit
/// divergence from full slice support.
pub fn slice_bounds(len: usize, slice: &Slice) -> Result<(usize, usize)> {
    if let Some(step) = slice.step {
        if step != 1 {
            return Err(Error::value_error(
                "slice step other than 1 is not supported",
            ));
        }
    }
    let len_i = len as i64;
    let clamp = |v: i64| -> usize {
        let v = if v < 0 { v + len_i } else { v };
        v.clamp(0, len_i) as usize
    };
    let lo = slice.lower.map(clamp).unwrap_or(0);
    let hi = slice.upper.map(clamp).unwrap_or(len);
    Ok((lo, hi.max(lo)))
}

fn slice_chars(chars: &[char], slice: &Slice) -> Result<Vec<char>> {
    let (lo, hi) = slice_bounds(chars.len(), slice)?;
    Ok(chars[lo..hi].to_vec())
}
