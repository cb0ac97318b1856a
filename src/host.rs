//! Host interop: host-class references, overload-scored constructor and
//! method dispatch, functional-interface forwarding, and the method-name
//! mapping table.
//!
//! There is no real platform reflection backing this crate (the host
//! platform is whatever the embedder compiles in), so a [`HostRegistry`]
//! stands in for it: the embedder registers classes, their constructors and
//! methods as Rust closures tagged with a [`ParamKind`] signature, and this
//! module runs the scoring algorithm from the host-interop component
//! design against those signatures exactly as it would against real
//! reflected parameter types.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::Value;

/// A callback the evaluator hands to every host invocation, letting a host
/// method forward to a script `Function` value it received as an argument
/// (the functional-interface proxying case) without needing its own
/// reference to the evaluator.
pub type CallFn<'a> = dyn Fn(&Value, &[Value]) -> Result<Value> + 'a;

/// The parameter-kind vocabulary the scoring algorithm reasons about.
/// `Float` and `Double` are scored as distinct widening targets even though
/// this crate's `Value::Float` does not itself distinguish precision (see
/// DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    String,
    Object(String),
    Array(Box<ParamKind>),
    Interface(String),
}

type OverloadInvoke = Rc<dyn Fn(Option<&Value>, &[Value], &CallFn) -> Result<Value>>;

/// One overload of a constructor or method.
#[derive(Clone)]
pub struct Overload {
    pub params: Vec<ParamKind>,
    pub invoke: OverloadInvoke,
}

impl std::fmt::Debug for Overload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overload").field("params", &self.params).finish()
    }
}

/// An opaque instance of a host class. The embedder's constructor closures
/// populate `payload`; instance-field and method closures downcast it back.
pub struct HostObjectInstance {
    pub class_name: String,
    pub payload: Box<dyn Any>,
}

impl std::fmt::Debug for HostObjectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostObjectInstance")
            .field("class_name", &self.class_name)
            .finish()
    }
}

pub type HostObjectRef = Rc<HostObjectInstance>;

impl HostObjectInstance {
    pub fn to_display_string(&self) -> String {
        format!("<{} instance>", self.class_name)
    }
}

/// A registered host class: its constructors, methods, static fields, and
/// place in the (simulated) class/interface hierarchy.
pub struct HostClassDescriptor {
    pub name: String,
    pub is_public: bool,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub constructors: Vec<Overload>,
    pub methods: HashMap<String, Vec<Overload>>,
    pub static_methods: HashMap<String, Vec<Overload>>,
    pub static_fields: HashMap<String, Value>,
    pub instance_fields: HashMap<String, Rc<dyn Fn(&HostObjectRef) -> Result<Value>>>,
    /// Set when this class is a single-abstract-method interface; names the
    /// one abstract method, so a script `Function` argument can be accepted
    /// in its place.
    pub functional_method: Option<String>,
}

impl std::fmt::Debug for HostClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClassDescriptor")
            .field("name", &self.name)
            .field("is_public", &self.is_public)
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("constructors", &self.constructors)
            .field("methods", &self.methods)
            .field("static_methods", &self.static_methods)
            .field("static_fields", &self.static_fields)
            .field("functional_method", &self.functional_method)
            .finish()
    }
}

pub type HostClassRef = Rc<HostClassDescriptor>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    class: String,
    is_static: bool,
    method: String,
    arg_types: Vec<String>,
}

/// The constructor/method overload-resolution cache and class registry.
/// The spec calls the cache "the sole process-wide mutable state" and asks
/// for concurrent-read, insert-if-absent semantics; this crate's value
/// model is `Rc`/`RefCell`-based and therefore already confined to one
/// thread per the concurrency model's own constraint that a `Script` is
/// never invoked from two threads at once, so the cache here is a plain
/// `RefCell` scoped to the registry rather than a literal global `static`
/// guarded by a `Mutex` (see DESIGN.md Open Question).
pub struct HostRegistry {
    classes: HashMap<String, HostClassRef>,
    cache: RefCell<HashMap<CacheKey, Option<usize>>>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegistry {
    pub fn new() -> Self {
        HostRegistry {
            classes: HashMap::new(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, class: HostClassDescriptor) {
        self.classes.insert(class.name.clone(), Rc::new(class));
    }

    pub fn lookup(&self, name: &str) -> Option<HostClassRef> {
        self.classes.get(name).cloned()
    }

    /// Used by the `type()` built-in so it always has a `HostClass` to hand
    /// back, even for the Language's own primitive type names that were
    /// never explicitly registered by the embedder.
    pub fn lookup_or_create_builtin(&mut self, name: &str) -> HostClassRef {
        if let Some(existing) = self.classes.get(name) {
            return existing.clone();
        }
        let class = HostClassDescriptor {
            name: name.to_string(),
            is_public: true,
            superclass: None,
            interfaces: Vec::new(),
            constructors: Vec::new(),
            methods: HashMap::new(),
            static_methods: HashMap::new(),
            static_fields: HashMap::new(),
            instance_fields: HashMap::new(),
            functional_method: None,
        };
        self.register(class);
        self.classes.get(name).cloned().unwrap()
    }

    pub fn is_functional_interface(&self, class_name: &str) -> bool {
        self.classes
            .get(class_name)
            .is_some_and(|c| c.functional_method.is_some())
    }

    /// Whether `from_class` can be used where `to_class` is expected: equal,
    /// or reachable by walking superclasses and interfaces.
    pub fn is_assignable(&self, from_class: &str, to_class: &str) -> bool {
        if from_class == to_class {
            return true;
        }
        let Some(class) = self.classes.get(from_class) else {
            return false;
        };
        if class.interfaces.iter().any(|i| i == to_class) {
            return true;
        }
        if let Some(sup) = &class.superclass {
            if self.is_assignable(sup, to_class) {
                return true;
            }
        }
        class
            .interfaces
            .iter()
            .any(|i| self.is_assignable(i, to_class))
    }

    pub fn resolve_constructor(&self, class_name: &str, args: &[Value]) -> Result<Overload> {
        let class = self
            .lookup(class_name)
            .ok_or_else(|| Error::NameError(class_name.to_string()))?;
        self.resolve(class_name, true, "<init>", &class.constructors, args)
    }

    pub fn resolve_method(
        &self,
        class_name: &str,
        method_name: &str,
        args: &[Value],
    ) -> Result<Overload> {
        let class = self
            .lookup(class_name)
            .ok_or_else(|| Error::NameError(class_name.to_string()))?;
        if let Some(overloads) = class.methods.get(method_name) {
            if let Ok(ov) = self.resolve(class_name, false, method_name, overloads, args) {
                return Ok(ov);
            }
        }
        // "If the containing class is non-public and no candidate scored,
        // recurse into implemented interfaces, then the superclass."
        if !class.is_public {
            for iface in &class.interfaces {
                if let Ok(ov) = self.resolve_method(iface, method_name, args) {
                    return Ok(ov);
                }
            }
            if let Some(sup) = &class.superclass {
                if let Ok(ov) = self.resolve_method(sup, method_name, args) {
                    return Ok(ov);
                }
            }
        }
        Err(Error::type_error(format!(
            "no overload of '{method_name}' on '{class_name}' matches the given arguments"
        )))
    }

    pub fn resolve_static_method(
        &self,
        class_name: &str,
        method_name: &str,
        args: &[Value],
    ) -> Result<Overload> {
        let class = self
            .lookup(class_name)
            .ok_or_else(|| Error::NameError(class_name.to_string()))?;
        let overloads = class.static_methods.get(method_name).ok_or_else(|| {
            Error::type_error(format!("'{class_name}' has no static method '{method_name}'"))
        })?;
        self.resolve(class_name, true, method_name, overloads, args)
    }

    fn resolve(
        &self,
        class_name: &str,
        is_static: bool,
        method_name: &str,
        overloads: &[Overload],
        args: &[Value],
    ) -> Result<Overload> {
        let arg_types: Vec<String> = args.iter().map(runtime_type_tag).collect();
        let key = CacheKey {
            class: class_name.to_string(),
            is_static,
            method: method_name.to_string(),
            arg_types,
        };
        if let Some(cached) = self.cache.borrow().get(&key) {
            return match cached {
                Some(idx) => Ok(overloads[*idx].clone()),
                None => Err(Error::type_error(format!(
                    "no overload of '{method_name}' on '{class_name}' matches the given arguments"
                ))),
            };
        }

        let mut best: Option<(usize, i32)> = None;
        for (idx, overload) in overloads.iter().enumerate() {
            if let Some(score) = score_candidate(self, overload, args) {
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((idx, score));
                }
            }
        }

        let result = best.map(|(idx, _)| idx);
        self.cache.borrow_mut().insert(key, result);
        match result {
            Some(idx) => Ok(overloads[idx].clone()),
            None => Err(Error::type_error(format!(
                "no overload of '{method_name}' on '{class_name}' matches the given arguments"
            ))),
        }
    }
}

fn runtime_type_tag(v: &Value) -> String {
    match v {
        Value::HostObject(o) => o.class_name.clone(),
        other => other.type_name().to_string(),
    }
}

fn score_candidate(registry: &HostRegistry, overload: &Overload, args: &[Value]) -> Option<i32> {
    if overload.params.len() != args.len() {
        return None;
    }
    let mut score = 1;
    for (param, arg) in overload.params.iter().zip(args) {
        score += score_param(registry, param, arg)?;
    }
    Some(score)
}

fn score_param(registry: &HostRegistry, param: &ParamKind, value: &Value) -> Option<i32> {
    if exact_match(param, value) {
        return Some(2);
    }
    if matches!(value, Value::None) && !is_primitive(param) {
        return Some(if matches!(param, ParamKind::Array(_)) { 1 } else { 2 });
    }
    if widening_ok(param, value) {
        return Some(1);
    }
    if let (Value::Function(_), ParamKind::Interface(iface)) = (value, param) {
        if registry.is_functional_interface(iface) {
            return Some(0);
        }
    }
    if let Value::HostObject(obj) = value {
        let target = match param {
            ParamKind::Object(cn) => Some(cn.as_str()),
            ParamKind::Interface(cn) => Some(cn.as_str()),
            _ => None,
        };
        if let Some(target) = target {
            if registry.is_assignable(&obj.class_name, target) {
                return Some(1);
            }
        }
    }
    None
}

fn is_primitive(param: &ParamKind) -> bool {
    matches!(
        param,
        ParamKind::Int | ParamKind::Long | ParamKind::Float | ParamKind::Double | ParamKind::Boolean
    )
}

fn exact_match(param: &ParamKind, value: &Value) -> bool {
    match (param, value) {
        (ParamKind::Int, Value::Int(_)) => true,
        (ParamKind::Long, Value::Long(_)) => true,
        (ParamKind::Float, Value::Float(_)) | (ParamKind::Double, Value::Float(_)) => true,
        (ParamKind::Boolean, Value::Bool(_)) => true,
        (ParamKind::String, Value::Str(_)) => true,
        (ParamKind::Object(cn), Value::HostObject(o)) => cn == &o.class_name,
        _ => false,
    }
}

/// Numeric widening ladder: `Int→Int/Long/Float/Double`, `Long→Long/Double`,
/// `Float→Float/Double`, `Double→Double`.
fn widening_ok(param: &ParamKind, value: &Value) -> bool {
    match value {
        Value::Int(_) => matches!(
            param,
            ParamKind::Int | ParamKind::Long | ParamKind::Float | ParamKind::Double
        ),
        Value::Long(_) => matches!(param, ParamKind::Long | ParamKind::Double),
        Value::Float(_) => matches!(param, ParamKind::Float | ParamKind::Double),
        _ => false,
    }
}

/// Translate a Language-idiomatic method name to its host-platform name.
/// `str.split()` with no arguments is additionally rewritten at the call
/// site to `split("\\s+")` by the evaluator, not by this table, since that
/// rewrite changes the argument list rather than the name.
pub fn map_method_name(name: &str) -> &str {
    match name {
        "startswith" => "startsWith",
        "endswith" => "endsWith",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_invoke() -> OverloadInvoke {
        Rc::new(|_recv, _args, _call| Ok(Value::None))
    }

    #[test]
    fn exact_match_beats_widening() {
        let registry = HostRegistry::new();
        let narrow = Overload {
            params: vec![ParamKind::Int],
            invoke: dummy_invoke(),
        };
        let wide = Overload {
            params: vec![ParamKind::Long],
            invoke: dummy_invoke(),
        };
        let args = [Value::Int(5)];
        let s1 = score_candidate(&registry, &narrow, &args).unwrap();
        let s2 = score_candidate(&registry, &wide, &args).unwrap();
        assert!(s1 > s2);
    }

    #[test]
    fn arity_mismatch_rejects() {
        let registry = HostRegistry::new();
        let ov = Overload {
            params: vec![ParamKind::Int],
            invoke: dummy_invoke(),
        };
        assert!(score_candidate(&registry, &ov, &[]).is_none());
    }

    #[test]
    fn map_method_name_translates_known_names() {
        assert_eq!(map_method_name("startswith"), "startsWith");
        assert_eq!(map_method_name("endswith"), "endsWith");
        assert_eq!(map_method_name("upper"), "upper");
    }
}
