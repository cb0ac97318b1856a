//! User-defined classes: class objects, instance objects, instance/class/
//! static methods, and the `dataclass` decorator.
//!
//! Building a `UserClass` from a `ClassDef` node requires evaluating
//! default-value expressions and method bodies, so the construction logic
//! itself lives in `eval.rs`, which has access to the active `Context`.
//! This module holds the data shapes those builders populate and the
//! queries the evaluator and built-ins run against them.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::{FunctionValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Instance,
    Class,
    Static,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub kind: MethodKind,
    pub function: Rc<FunctionValue>,
}

/// A dataclass field in declaration order, with its default already
/// evaluated in the enclosing context at class-creation time (the spec
/// requires the default to be evaluated then, not at each instantiation).
#[derive(Debug, Clone)]
pub struct DataclassField {
    pub name: String,
    pub default: Option<Value>,
}

#[derive(Debug)]
pub struct UserClass {
    pub name: String,
    pub frozen: bool,
    pub is_dataclass: bool,
    /// Present only for dataclasses; used to generate the constructor,
    /// `hash`, and `str` the spec calls for.
    pub dataclass_fields: Vec<DataclassField>,
    /// `__init__`, when the class is not a dataclass and defines one.
    pub constructor: Option<Rc<FunctionValue>>,
    pub methods: HashMap<String, Method>,
    pub class_attrs: HashMap<String, Value>,
}

impl UserClass {
    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }
}

#[derive(Debug)]
pub struct UserObject {
    pub class: Rc<UserClass>,
    pub attrs: HashMap<String, Value>,
}

impl UserObject {
    /// `Name(field=repr, …)` for dataclasses; a generic `<Name object>`
    /// otherwise. A user-defined `__str__` method takes priority over both,
    /// but calling it requires the evaluator, so that lookup happens in
    /// the `str()` built-in rather than here.
    pub fn to_display_string(&self) -> String {
        if self.class.is_dataclass {
            let fields = self
                .class
                .dataclass_fields
                .iter()
                .map(|f| {
                    let value = self
                        .attrs
                        .get(&f.name)
                        .cloned()
                        .unwrap_or(Value::None);
                    format!("{}={}", f.name, value.to_repr_string())
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}({})", self.class.name, fields)
        } else {
            format!("<{} object>", self.class.name)
        }
    }

    /// A stand-in for "tuple-hash of all fields": the repr of each field in
    /// declaration order, compared as a sequence. Only meaningful for
    /// frozen dataclass instances, which is the only case the spec asks
    /// `==` to use it for.
    pub fn dataclass_hash_key(&self) -> Vec<String> {
        self.class
            .dataclass_fields
            .iter()
            .map(|f| {
                self.attrs
                    .get(&f.name)
                    .map(|v| v.to_repr_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}
