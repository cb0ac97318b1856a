//! Lexical scope records ("Context" in the spec's vocabulary).
//!
//! A `Context` is created fresh for each function call, lambda call, and
//! list comprehension. Contexts chain through `enclosing` to model
//! closures, and every chain eventually bottoms out at a single globals
//! context per `Script`, which additionally owns the module-level
//! statement queue and the script call stack used for diagnostic traces.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Stmt;
use crate::error::Frame;
use crate::value::Value;

pub type ContextHandle = Rc<RefCell<Context>>;

#[derive(Debug)]
pub struct Context {
    /// `None` when this context IS the globals context.
    globals: Option<ContextHandle>,
    /// The lexically enclosing context, for closures. Never points inward —
    /// an enclosing context never refers to a context nested inside it, so
    /// there are no reference cycles to worry about.
    enclosing: Option<ContextHandle>,
    locals: HashMap<String, Value>,
    global_names: HashSet<String>,
    pub return_flag: bool,
    pub return_value: Value,
    pub break_flag: bool,

    // Globals-context-only fields. Left at their defaults on non-globals
    // contexts and never consulted there.
    pub pending_statements: VecDeque<Stmt>,
    pub filename: String,
    pub call_stack: Vec<Frame>,
}

impl Context {
    pub fn new_globals(filename: impl Into<String>) -> ContextHandle {
        Rc::new(RefCell::new(Context {
            globals: None,
            enclosing: None,
            locals: HashMap::new(),
            global_names: HashSet::new(),
            return_flag: false,
            return_value: Value::None,
            break_flag: false,
            pending_statements: VecDeque::new(),
            filename: filename.into(),
            call_stack: Vec::new(),
        }))
    }

    pub fn new_local(globals: ContextHandle, enclosing: Option<ContextHandle>) -> ContextHandle {
        Rc::new(RefCell::new(Context {
            globals: Some(globals),
            enclosing,
            locals: HashMap::new(),
            global_names: HashSet::new(),
            return_flag: false,
            return_value: Value::None,
            break_flag: false,
            pending_statements: VecDeque::new(),
            filename: String::new(),
            call_stack: Vec::new(),
        }))
    }

    pub fn is_globals(&self) -> bool {
        self.globals.is_none()
    }

    /// Whether control flow in this context should be skipped (a `return`
    /// or `break` is pending).
    pub fn should_skip(&self) -> bool {
        self.return_flag || self.break_flag
    }

    pub fn declare_global(&mut self, name: String) {
        self.global_names.insert(name);
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned()
    }
}

/// The globals context reachable from any context in its chain.
pub fn globals_of(ctx: &ContextHandle) -> ContextHandle {
    let c = ctx.borrow();
    match &c.globals {
        Some(g) => g.clone(),
        None => ctx.clone(),
    }
}

/// Read a name per the scoping rule: global-declared names go straight to
/// the globals map; otherwise check this context's locals, then walk the
/// enclosing chain, then finally the globals map.
pub fn get(ctx: &ContextHandle, name: &str) -> Option<Value> {
    let is_global = ctx.borrow().global_names.contains(name);
    if is_global {
        return globals_of(ctx).borrow().local(name);
    }
    if let Some(v) = ctx.borrow().local(name) {
        return Some(v);
    }
    let enclosing = ctx.borrow().enclosing.clone();
    if let Some(enc) = enclosing {
        if let Some(v) = get(&enc, name) {
            return Some(v);
        }
    }
    globals_of(ctx).borrow().local(name)
}

/// Write a name per the scoping rule: goes to globals if declared `global`
/// in this context, otherwise to this context's local map. Never touches
/// the enclosing chain — the Language this interpreter targets has no
/// `nonlocal`.
pub fn set(ctx: &ContextHandle, name: impl Into<String>, value: Value) {
    let name = name.into();
    let is_global = ctx.borrow().global_names.contains(&name);
    if is_global {
        globals_of(ctx).borrow_mut().set_local(name, value);
    } else {
        ctx.borrow_mut().set_local(name, value);
    }
}

/// Delete a name, following the same routing as `set`. Returns `false` if
/// the name was not bound.
pub fn delete(ctx: &ContextHandle, name: &str) -> bool {
    let is_global = ctx.borrow().global_names.contains(name);
    let target = if is_global {
        globals_of(ctx)
    } else {
        ctx.clone()
    };
    target.borrow_mut().locals.remove(name).is_some()
}

/// Push a call-stack frame onto the script's globals context.
pub fn push_frame(ctx: &ContextHandle, frame: Frame) {
    globals_of(ctx).borrow_mut().call_stack.push(frame);
}

pub fn pop_frame(ctx: &ContextHandle) {
    globals_of(ctx).borrow_mut().call_stack.pop();
}

pub fn current_frames(ctx: &ContextHandle) -> Vec<Frame> {
    globals_of(ctx).borrow().call_stack.clone()
}
