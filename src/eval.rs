//! The evaluator: statement execution, expression evaluation, function and
//! method invocation, and the exception-propagation machinery that ties
//! `try`/`except`/`finally` to Rust's own `Result` plumbing.
//!
//! One `Evaluator` is owned by each `Script`. It holds the host registry and
//! the ambient resource limits, but no context of its own — every entry
//! point takes the active `ContextHandle` explicitly, the same shape the
//! teacher's own tree-walker passes its environment through.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::ast::{BoolOpKind, Constant, ExceptHandler, Expr, Stmt, Target};
use crate::builtins;
use crate::class::{DataclassField, Method, MethodKind, UserClass, UserObject};
use crate::context::{self, Context, ContextHandle};
use crate::error::{Error, Frame, Result};
use crate::host::{self, HostObjectRef, HostRegistry};
use crate::operators;
use crate::value::{
    BoundMethod, DictRef, FunctionBody, FunctionValue, ItemDeleter, ItemGetter, ItemSetter,
    Slice, Value,
};

/// Resource guard against unbounded recursion. Not part of the Language's
/// visible exception taxonomy — see `Error::RecursionLimit`.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_recursion_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_recursion_depth: 1000 }
    }
}

struct DepthGuard<'a> {
    depth: &'a RefCell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        *self.depth.borrow_mut() -= 1;
    }
}

pub struct Evaluator {
    registry: RefCell<HostRegistry>,
    limits: Limits,
    depth: RefCell<usize>,
    stdout: RefCell<Box<dyn FnMut(&str)>>,
}

impl Evaluator {
    pub fn new(registry: HostRegistry, limits: Limits) -> Self {
        Evaluator {
            registry: RefCell::new(registry),
            limits,
            depth: RefCell::new(0),
            stdout: RefCell::new(Box::new(|line: &str| println!("{line}"))),
        }
    }

    pub fn registry(&self) -> Ref<'_, HostRegistry> {
        self.registry.borrow()
    }

    pub fn registry_mut(&self) -> RefMut<'_, HostRegistry> {
        self.registry.borrow_mut()
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    /// Replaces the `print` sink. Modeled on the spec's `__stdout__` globals
    /// variable, implemented here as a plain redirectable callback rather
    /// than a real globals-map entry, since `print` is special-cased in the
    /// evaluator rather than dispatched as an ordinary host call.
    pub fn redirect_stdout(&self, sink: impl FnMut(&str) + 'static) {
        *self.stdout.borrow_mut() = Box::new(sink);
    }

    fn print_line(&self, line: &str) {
        (self.stdout.borrow_mut())(line);
    }

    fn enter_call(&self) -> Result<DepthGuard<'_>> {
        *self.depth.borrow_mut() += 1;
        let guard = DepthGuard { depth: &self.depth };
        let depth = *self.depth.borrow();
        if depth > self.limits.max_recursion_depth {
            drop(guard);
            return Err(Error::RecursionLimit(depth));
        }
        Ok(guard)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn exec_block(&self, stmts: &[Stmt], ctx: &ContextHandle) -> Result<()> {
        for stmt in stmts {
            if ctx.borrow().should_skip() {
                break;
            }
            self.exec_stmt(stmt, ctx)?;
        }
        Ok(())
    }

    fn exec_stmt(&self, stmt: &Stmt, ctx: &ContextHandle) -> Result<()> {
        match stmt {
            Stmt::FunctionDef { name, params, body, .. } => {
                let function = Value::Function(Rc::new(FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: FunctionBody::Block(Rc::new(body.clone())),
                    closure: ctx.clone(),
                }));
                context::set(ctx, name.clone(), function);
                Ok(())
            }
            Stmt::ClassDef { name, decorators, body, .. } => {
                let class = self.build_user_class(name, decorators, body, ctx)?;
                context::set(ctx, name.clone(), Value::UserClass(class));
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let v = match value {
                    Some(e) => self.eval_expr(e, ctx)?,
                    None => Value::None,
                };
                let mut c = ctx.borrow_mut();
                c.return_value = v;
                c.return_flag = true;
                Ok(())
            }
            Stmt::Assign { target, value, .. } => {
                let v = self.eval_expr(value, ctx)?;
                self.bind_target(target, v, ctx)
            }
            Stmt::AnnAssign { target, value, .. } => match value {
                Some(e) => {
                    let v = self.eval_expr(e, ctx)?;
                    self.bind_target(target, v, ctx)
                }
                None => Ok(()),
            },
            Stmt::AugAssign { target, op, value, .. } => self.exec_augassign(target, *op, value, ctx),
            Stmt::Delete { targets, .. } => {
                for t in targets {
                    self.exec_delete(t, ctx)?;
                }
                Ok(())
            }
            Stmt::Global { names, .. } => {
                let mut c = ctx.borrow_mut();
                for n in names {
                    c.declare_global(n.clone());
                }
                Ok(())
            }
            Stmt::Expr { value, .. } => {
                self.eval_expr(value, ctx)?;
                Ok(())
            }
            Stmt::If { test, body, orelse, .. } => {
                if self.eval_expr(test, ctx)?.is_truthy() {
                    self.exec_block(body, ctx)
                } else {
                    self.exec_block(orelse, ctx)
                }
            }
            Stmt::For { target, iter, body, orelse, .. } => {
                let iter_val = self.eval_expr(iter, ctx)?;
                let items = self.iterable_items(&iter_val)?;
                self.exec_for(target, items, body, orelse, ctx)
            }
            Stmt::While { test, body, orelse, .. } => self.exec_while(test, body, orelse, ctx),
            Stmt::Break { .. } => {
                ctx.borrow_mut().break_flag = true;
                Ok(())
            }
            Stmt::Try { body, handlers, orelse, finalbody, .. } => {
                self.exec_try(body, handlers, orelse, finalbody, ctx)
            }
            Stmt::Raise { exc, .. } => self.exec_raise(exc, ctx),
        }
    }

    fn exec_for(
        &self,
        target: &Target,
        items: Vec<Value>,
        body: &[Stmt],
        orelse: &[Stmt],
        ctx: &ContextHandle,
    ) -> Result<()> {
        let mut broke = false;
        for item in items {
            self.bind_target(target, item, ctx)?;
            self.exec_block(body, ctx)?;
            if ctx.borrow().return_flag {
                return Ok(());
            }
            if ctx.borrow().break_flag {
                ctx.borrow_mut().break_flag = false;
                broke = true;
                break;
            }
        }
        if !broke {
            self.exec_block(orelse, ctx)?;
        }
        Ok(())
    }

    fn exec_while(&self, test: &Expr, body: &[Stmt], orelse: &[Stmt], ctx: &ContextHandle) -> Result<()> {
        let mut broke = false;
        while self.eval_expr(test, ctx)?.is_truthy() {
            self.exec_block(body, ctx)?;
            if ctx.borrow().return_flag {
                return Ok(());
            }
            if ctx.borrow().break_flag {
                ctx.borrow_mut().break_flag = false;
                broke = true;
                break;
            }
        }
        if !broke {
            self.exec_block(orelse, ctx)?;
        }
        Ok(())
    }

    /// `try`/`except`/`finally`. `finally` always runs: return/break flags
    /// pending when the body finishes are parked while `finalbody` executes,
    /// then restored unless `finalbody` itself set new ones (which win).
    fn exec_try(
        &self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        ctx: &ContextHandle,
    ) -> Result<()> {
        let outcome = match self.exec_block(body, ctx) {
            Ok(()) => {
                if ctx.borrow().should_skip() {
                    Ok(())
                } else {
                    self.exec_block(orelse, ctx)
                }
            }
            Err(err) => self.handle_exception(err, handlers, ctx),
        };

        let (saved_return, saved_return_value, saved_break) = {
            let c = ctx.borrow();
            (c.return_flag, c.return_value.clone(), c.break_flag)
        };
        {
            let mut c = ctx.borrow_mut();
            c.return_flag = false;
            c.break_flag = false;
        }
        let finally_result = self.exec_block(finalbody, ctx);
        {
            let mut c = ctx.borrow_mut();
            if !c.return_flag && !c.break_flag {
                c.return_flag = saved_return;
                c.return_value = saved_return_value;
                c.break_flag = saved_break;
            }
        }
        finally_result?;
        outcome
    }

    fn handle_exception(&self, err: Error, handlers: &[ExceptHandler], ctx: &ContextHandle) -> Result<()> {
        if !err.is_catchable() {
            return Err(err);
        }
        for h in handlers {
            if self.handler_matches(h, &err, ctx)? {
                if let Some(name) = &h.name {
                    context::set(ctx, name.clone(), self.error_to_value(&err));
                }
                return self.exec_block(&h.body, ctx);
            }
        }
        Err(err)
    }

    fn handler_matches(&self, h: &ExceptHandler, err: &Error, ctx: &ContextHandle) -> Result<bool> {
        match &h.exc_type {
            None => Ok(true),
            Some(expr) => {
                let target = self.eval_expr(expr, ctx)?;
                Ok(match (&target, err) {
                    (Value::UserClass(class), Error::ScriptRaised(Value::UserObject(obj))) => {
                        Rc::ptr_eq(&obj.borrow().class, class)
                    }
                    (Value::HostClass(class), Error::HostException { class_name, .. }) => {
                        self.registry.borrow().is_assignable(class_name, &class.name)
                    }
                    _ => false,
                })
            }
        }
    }

    fn error_to_value(&self, err: &Error) -> Value {
        match err {
            Error::ScriptRaised(v) => v.clone(),
            Error::HostException { class_name, message } => Value::str(format!("{class_name}: {message}")),
            other => Value::str(other.to_string()),
        }
    }

    fn exec_raise(&self, exc: &Option<Expr>, ctx: &ContextHandle) -> Result<()> {
        match exc {
            None => Err(Error::value_error("no active exception to re-raise")),
            Some(e) => {
                let v = self.eval_expr(e, ctx)?;
                match v {
                    Value::HostObject(obj) => Err(self.host_exception_from_object(&obj)),
                    other => Err(Error::ScriptRaised(other)),
                }
            }
        }
    }

    /// Host exceptions are plain `HostObject`s; the message is read through
    /// the same `instance_fields` reflection map used for ordinary field
    /// access, under the conventional field name `message`.
    fn host_exception_from_object(&self, obj: &HostObjectRef) -> Error {
        let message = self
            .registry
            .borrow()
            .lookup(&obj.class_name)
            .and_then(|class| class.instance_fields.get("message").cloned())
            .and_then(|getter| getter(obj).ok())
            .map(|v| v.to_display_string())
            .unwrap_or_else(|| obj.to_display_string());
        Error::HostException { class_name: obj.class_name.clone(), message }
    }

    fn exec_augassign(&self, target: &Target, op: crate::ast::BinOp, value: &Expr, ctx: &ContextHandle) -> Result<()> {
        let rhs = self.eval_expr(value, ctx)?;
        match target {
            Target::Name(n) => {
                let old = context::get(ctx, n).ok_or_else(|| Error::NameError(n.clone()))?;
                let new = self.aug_apply(op, &old, &rhs)?;
                context::set(ctx, n.clone(), new);
                Ok(())
            }
            Target::Attribute { value: obj_expr, attr } => {
                let receiver = self.eval_expr(obj_expr, ctx)?;
                let old = self.eval_attribute_value(&receiver, attr)?;
                let new = self.aug_apply(op, &old, &rhs)?;
                self.set_attribute(&receiver, attr, new)
            }
            Target::Subscript { value: obj_expr, index: idx_expr } => {
                let receiver = self.eval_expr(obj_expr, ctx)?;
                let index = self.eval_expr(idx_expr, ctx)?;
                let old = self.get_subscript(&receiver, index.clone(), ctx)?;
                let new = self.aug_apply(op, &old, &rhs)?;
                self.set_subscript(&receiver, index, new, ctx)
            }
            Target::Tuple(_) => Err(Error::type_error("cannot use augmented assignment with a tuple target")),
        }
    }

    /// `list += iterable` mutates the list in place (identity preserved);
    /// every other augmented op produces a fresh value via the ordinary
    /// binary-operator rules.
    fn aug_apply(&self, op: crate::ast::BinOp, old: &Value, rhs: &Value) -> Result<Value> {
        if op == crate::ast::BinOp::Add {
            if let Value::List(items) = old {
                let extra = self.iterable_items(rhs)?;
                items.borrow_mut().extend(extra);
                return Ok(old.clone());
            }
        }
        operators::apply_binop(op, old, rhs)
    }

    fn exec_delete(&self, target: &Target, ctx: &ContextHandle) -> Result<()> {
        match target {
            Target::Name(n) => {
                if context::delete(ctx, n) {
                    Ok(())
                } else {
                    Err(Error::NameError(n.clone()))
                }
            }
            Target::Attribute { value, attr } => {
                let receiver = self.eval_expr(value, ctx)?;
                match &receiver {
                    Value::UserObject(obj) => {
                        let mut b = obj.borrow_mut();
                        if b.class.frozen {
                            return Err(Error::FrozenInstanceError {
                                class: b.class.name.clone(),
                                field: attr.clone(),
                            });
                        }
                        b.attrs.remove(attr);
                        Ok(())
                    }
                    other => Err(Error::type_error(format!(
                        "'{}' object attribute deletion not supported",
                        other.display_type_name()
                    ))),
                }
            }
            Target::Subscript { value, index } => {
                let receiver = self.eval_expr(value, ctx)?;
                let idx = self.eval_expr(index, ctx)?;
                self.delete_subscript(&receiver, idx, ctx)
            }
            Target::Tuple(targets) => {
                for t in targets {
                    self.exec_delete(t, ctx)?;
                }
                Ok(())
            }
        }
    }

    fn bind_target(&self, target: &Target, value: Value, ctx: &ContextHandle) -> Result<()> {
        match target {
            Target::Name(n) => {
                context::set(ctx, n.clone(), value);
                Ok(())
            }
            Target::Attribute { value: obj_expr, attr } => {
                let receiver = self.eval_expr(obj_expr, ctx)?;
                self.set_attribute(&receiver, attr, value)
            }
            Target::Subscript { value: obj_expr, index: idx_expr } => {
                let receiver = self.eval_expr(obj_expr, ctx)?;
                let index = self.eval_expr(idx_expr, ctx)?;
                self.set_subscript(&receiver, index, value, ctx)
            }
            Target::Tuple(targets) => {
                let items = self.iterable_items(&value)?;
                if items.len() != targets.len() {
                    return Err(Error::value_error(format!(
                        "cannot unpack: expected {} values, got {}",
                        targets.len(),
                        items.len()
                    )));
                }
                for (t, v) in targets.iter().zip(items) {
                    self.bind_target(t, v, ctx)?;
                }
                Ok(())
            }
        }
    }

    fn set_attribute(&self, receiver: &Value, attr: &str, value: Value) -> Result<()> {
        match receiver {
            Value::UserObject(obj) => {
                let mut b = obj.borrow_mut();
                if b.class.frozen {
                    return Err(Error::FrozenInstanceError { class: b.class.name.clone(), field: attr.to_string() });
                }
                b.attrs.insert(attr.to_string(), value);
                Ok(())
            }
            other => Err(Error::type_error(format!(
                "'{}' object attribute assignment not supported",
                other.display_type_name()
            ))),
        }
    }

    fn set_subscript(&self, receiver: &Value, index: Value, value: Value, ctx: &ContextHandle) -> Result<()> {
        if let Some(result) = receiver.set_item(&index, value.clone()) {
            return result;
        }
        if let Value::UserObject(obj) = receiver {
            let has_setitem = obj.borrow().class.find_method("__setitem__").is_some();
            if has_setitem {
                self.invoke_method(receiver.clone(), "__setitem__", vec![index, value], ctx)?;
                return Ok(());
            }
        }
        Err(Error::type_error(format!(
            "'{}' object does not support item assignment",
            receiver.display_type_name()
        )))
    }

    fn get_subscript(&self, receiver: &Value, index: Value, ctx: &ContextHandle) -> Result<Value> {
        if let Some(result) = receiver.get_item(&index) {
            return result;
        }
        if let Value::UserObject(obj) = receiver {
            let has_getitem = obj.borrow().class.find_method("__getitem__").is_some();
            if has_getitem {
                return self.invoke_method(receiver.clone(), "__getitem__", vec![index], ctx);
            }
        }
        Err(Error::type_error(format!("'{}' object is not subscriptable", receiver.display_type_name())))
    }

    fn delete_subscript(&self, receiver: &Value, index: Value, ctx: &ContextHandle) -> Result<()> {
        if let Some(result) = receiver.delete_item(&index) {
            return result;
        }
        if let Value::UserObject(obj) = receiver {
            let has_delitem = obj.borrow().class.find_method("__delitem__").is_some();
            if has_delitem {
                self.invoke_method(receiver.clone(), "__delitem__", vec![index], ctx)?;
                return Ok(());
            }
        }
        Err(Error::type_error(format!(
            "'{}' object doesn't support item deletion",
            receiver.display_type_name()
        )))
    }

    fn length_of(&self, v: &Value, ctx: &ContextHandle) -> Result<usize> {
        if let Ok(n) = builtins::len_builtin(std::slice::from_ref(v)) {
            return Ok(n.as_i64().unwrap() as usize);
        }
        if let Value::UserObject(obj) = v {
            let has_len = obj.borrow().class.find_method("__len__").is_some();
            if has_len {
                let result = self.invoke_method(v.clone(), "__len__", vec![], ctx)?;
                return result.as_i64().map(|n| n as usize).ok_or_else(|| Error::type_error("__len__ must return an int"));
            }
        }
        Err(Error::type_error(format!("object of type '{}' has no len()", v.display_type_name())))
    }

    fn iterable_items(&self, v: &Value) -> Result<Vec<Value>> {
        match v {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok((**items).clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Dict(pairs) => Ok(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()),
            other => Err(Error::type_error(format!("'{}' object is not iterable", other.display_type_name()))),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn eval_expr(&self, expr: &Expr, ctx: &ContextHandle) -> Result<Value> {
        match expr {
            Expr::Name { id, .. } => context::get(ctx, id).ok_or_else(|| Error::NameError(id.clone())),
            Expr::Constant { value, .. } => Ok(constant_value(value)),
            Expr::BinOp { left, op, right, .. } => {
                let l = self.eval_expr(left, ctx)?;
                let r = self.eval_expr(right, ctx)?;
                operators::apply_binop(*op, &l, &r)
            }
            Expr::UnaryOp { op, operand, .. } => {
                let v = self.eval_expr(operand, ctx)?;
                operators::apply_unaryop(*op, &v)
            }
            Expr::BoolOp { op, values, .. } => self.eval_boolop(*op, values, ctx),
            Expr::Compare { left, op, comparator, .. } => {
                let l = self.eval_expr(left, ctx)?;
                let r = self.eval_expr(comparator, ctx)?;
                operators::apply_cmpop(*op, &l, &r)
            }
            Expr::Call { lineno, func, args, keywords } => self.eval_call(*lineno, func, args, keywords, ctx),
            Expr::Attribute { value, attr, .. } => {
                let receiver = self.eval_expr(value, ctx)?;
                self.eval_attribute_value(&receiver, attr)
            }
            Expr::Subscript { value, index, .. } => {
                let receiver = self.eval_expr(value, ctx)?;
                let idx = self.eval_expr(index, ctx)?;
                self.get_subscript(&receiver, idx, ctx)
            }
            Expr::Slice { lower, upper, step, .. } => {
                let conv = |o: &Option<Box<Expr>>| -> Result<Option<i64>> {
                    match o {
                        None => Ok(None),
                        Some(e) => {
                            let v = self.eval_expr(e, ctx)?;
                            v.as_i64().map(Some).ok_or_else(|| Error::type_error("slice indices must be integers"))
                        }
                    }
                };
                Ok(Value::Slice(Box::new(Slice { lower: conv(lower)?, upper: conv(upper)?, step: conv(step)? })))
            }
            Expr::IfExp { test, body, orelse, .. } => {
                if self.eval_expr(test, ctx)?.is_truthy() {
                    self.eval_expr(body, ctx)
                } else {
                    self.eval_expr(orelse, ctx)
                }
            }
            Expr::ListComp { elt, target, iter, ifs, .. } => self.eval_listcomp(elt, target, iter, ifs, ctx),
            Expr::Tuple { elts, .. } => Ok(Value::Tuple(Rc::new(self.eval_args(elts, ctx)?))),
            Expr::List { elts, .. } => Ok(Value::list(self.eval_args(elts, ctx)?)),
            Expr::Dict { keys, values, .. } => {
                let mut pairs = Vec::with_capacity(keys.len());
                for (k, v) in keys.iter().zip(values) {
                    pairs.push((self.eval_expr(k, ctx)?, self.eval_expr(v, ctx)?));
                }
                Ok(Value::dict(pairs))
            }
            Expr::Lambda { params, body, .. } => Ok(Value::Function(Rc::new(FunctionValue {
                name: "<lambda>".to_string(),
                params: params.clone(),
                body: FunctionBody::Expr(Rc::new((**body).clone())),
                closure: ctx.clone(),
            }))),
            Expr::JoinedStr { values, .. } => {
                let mut s = String::new();
                for part in values {
                    let v = self.eval_expr(part, ctx)?;
                    s.push_str(&v.to_display_string());
                }
                Ok(Value::str(s))
            }
            Expr::FormattedValue { value, .. } => {
                let v = self.eval_expr(value, ctx)?;
                Ok(Value::str(self.stringify(&v, ctx)?))
            }
        }
    }

    fn eval_args(&self, exprs: &[Expr], ctx: &ContextHandle) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval_expr(e, ctx)).collect()
    }

    fn eval_boolop(&self, op: BoolOpKind, values: &[Expr], ctx: &ContextHandle) -> Result<Value> {
        let mut last = Value::None;
        for v in values {
            last = self.eval_expr(v, ctx)?;
            match op {
                BoolOpKind::And if !last.is_truthy() => return Ok(last),
                BoolOpKind::Or if last.is_truthy() => return Ok(last),
                _ => {}
            }
        }
        Ok(last)
    }

    /// The comprehension body runs in a fresh context chained to (not
    /// replacing) the enclosing one, so it sees outer locals but its own
    /// loop variable doesn't leak out.
    fn eval_listcomp(&self, elt: &Expr, target: &Target, iter: &Expr, ifs: &[Expr], ctx: &ContextHandle) -> Result<Value> {
        let iter_val = self.eval_expr(iter, ctx)?;
        let items = self.iterable_items(&iter_val)?;
        let comp_ctx = Context::new_local(context::globals_of(ctx), Some(ctx.clone()));
        let mut out = Vec::new();
        for item in items {
            self.bind_target(target, item, &comp_ctx)?;
            let mut keep = true;
            for cond in ifs {
                if !self.eval_expr(cond, &comp_ctx)?.is_truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                out.push(self.eval_expr(elt, &comp_ctx)?);
            }
        }
        Ok(Value::list(out))
    }

    /// `str()`'s conversion rule: a user `__str__` override wins, else the
    /// value's generic display form.
    fn stringify(&self, v: &Value, ctx: &ContextHandle) -> Result<String> {
        if let Value::UserObject(obj) = v {
            let has_str = obj.borrow().class.find_method("__str__").is_some();
            if has_str {
                let result = self.invoke_method(v.clone(), "__str__", vec![], ctx)?;
                return Ok(result.to_display_string());
            }
        }
        Ok(builtins::str_value_builtin(std::slice::from_ref(v))?.to_display_string())
    }

    /// Field/bound-method access in non-call position: user-object `attrs`,
    /// then class `__dict__`, then host reflection, then host-class static
    /// fields. A name that resolves to a method (rather than a plain value)
    /// produces a `BoundMethod` without invoking it.
    fn eval_attribute_value(&self, receiver: &Value, attr: &str) -> Result<Value> {
        match receiver {
            Value::UserObject(obj) => {
                let b = obj.borrow();
                if let Some(v) = b.attrs.get(attr) {
                    return Ok(v.clone());
                }
                if b.class.find_method(attr).is_some() {
                    return Ok(Value::BoundMethod(Rc::new(BoundMethod { receiver: receiver.clone(), method_name: attr.to_string() })));
                }
                if let Some(v) = b.class.class_attrs.get(attr) {
                    return Ok(v.clone());
                }
                Err(Error::type_error(format!("'{}' object has no attribute '{attr}'", b.class.name)))
            }
            Value::UserClass(class) => {
                if let Some(v) = class.class_attrs.get(attr) {
                    return Ok(v.clone());
                }
                if class.find_method(attr).is_some() {
                    return Ok(Value::BoundMethod(Rc::new(BoundMethod { receiver: receiver.clone(), method_name: attr.to_string() })));
                }
                Err(Error::type_error(format!("type object '{}' has no attribute '{attr}'", class.name)))
            }
            Value::HostObject(obj) => {
                let registry = self.registry.borrow();
                let class = registry.lookup(&obj.class_name).ok_or_else(|| Error::NameError(obj.class_name.clone()))?;
                if let Some(getter) = class.instance_fields.get(attr) {
                    return getter(obj);
                }
                if class.methods.contains_key(attr) {
                    return Ok(Value::BoundMethod(Rc::new(BoundMethod { receiver: receiver.clone(), method_name: attr.to_string() })));
                }
                Err(Error::type_error(format!("'{}' object has no attribute '{attr}'", obj.class_name)))
            }
            Value::HostClass(class) => {
                if let Some(v) = class.static_fields.get(attr) {
                    return Ok(v.clone());
                }
                if class.static_methods.contains_key(attr) {
                    return Ok(Value::BoundMethod(Rc::new(BoundMethod { receiver: receiver.clone(), method_name: attr.to_string() })));
                }
                Err(Error::type_error(format!("host class '{}' has no attribute '{attr}'", class.name)))
            }
            Value::Str(_) | Value::Dict(_) => {
                Ok(Value::BoundMethod(Rc::new(BoundMethod { receiver: receiver.clone(), method_name: attr.to_string() })))
            }
            other => Err(Error::type_error(format!("'{}' object has no attribute '{attr}'", other.display_type_name()))),
        }
    }

    /// `Call` dispatch. The `HostClass` sentinel and a bound-method
    /// expression (`Attribute` in caller position) are recognized
    /// structurally here, before the callee is evaluated as an ordinary
    /// value, so neither needs to materialize an intermediate `Value`.
    fn eval_call(&self, lineno: u32, func: &Expr, args_exprs: &[Expr], _keywords: &[(String, Expr)], ctx: &ContextHandle) -> Result<Value> {
        if let Expr::Name { id, .. } = func {
            if id == "HostClass" && context::get(ctx, id).is_none() {
                if args_exprs.len() != 1 {
                    return Err(Error::type_error("HostClass() takes exactly one argument"));
                }
                let name_val = self.eval_expr(&args_exprs[0], ctx)?;
                let name = name_val.as_str().ok_or_else(|| Error::type_error("HostClass() argument must be a string"))?;
                let class = self.registry.borrow().lookup(name).ok_or_else(|| Error::NameError(name.to_string()))?;
                return Ok(Value::HostClass(class));
            }
            if context::get(ctx, id).is_none() && builtins::is_builtin_name(id) {
                let args = self.eval_args(args_exprs, ctx)?;
                return self.call_builtin(id, args, ctx);
            }
        }
        if let Expr::Attribute { value, attr, .. } = func {
            let receiver = self.eval_expr(value, ctx)?;
            let args = self.eval_args(args_exprs, ctx)?;
            return self.invoke_method(receiver, attr, args, ctx);
        }
        let callee = self.eval_expr(func, ctx)?;
        let args = self.eval_args(args_exprs, ctx)?;
        self.call_value(callee, args, ctx, lineno)
    }

    fn call_builtin(&self, name: &str, args: Vec<Value>, ctx: &ContextHandle) -> Result<Value> {
        match name {
            "print" => {
                let line = args.iter().map(Value::to_display_string).collect::<Vec<_>>().join(" ");
                self.print_line(&line);
                Ok(Value::None)
            }
            "str" => {
                let v = args.first().cloned().unwrap_or(Value::None);
                Ok(Value::str(self.stringify(&v, ctx)?))
            }
            "type" => self.type_builtin(&args),
            "len" => {
                let v = args.first().ok_or_else(|| Error::type_error("len() missing required argument"))?;
                self.length_of(v, ctx).map(|n| Value::int_from_i64(n as i64))
            }
            "int" => builtins::int_builtin(&args),
            "float" => builtins::float_builtin(&args),
            "bool" => builtins::bool_builtin(&args),
            "range" => builtins::range_builtin(&args),
            "enumerate" => builtins::enumerate_builtin(&args),
            "tuple" => builtins::tuple_builtin(&args),
            "list" => builtins::list_builtin(&args),
            "abs" => builtins::abs_builtin(&args),
            "round" => builtins::round_builtin(&args),
            "min" => builtins::min_builtin(&args),
            "max" => builtins::max_builtin(&args),
            "ord" => builtins::ord_builtin(&args),
            "chr" => builtins::chr_builtin(&args),
            other => unreachable!("builtin '{other}' is listed in BUILTIN_NAMES but not dispatched"),
        }
    }

    /// `type(x)`: every value gets a uniform `HostClass` to return, even the
    /// Language's own primitive kinds, via `lookup_or_create_builtin`.
    fn type_builtin(&self, args: &[Value]) -> Result<Value> {
        let v = args.first().ok_or_else(|| Error::type_error("type() missing required argument"))?;
        if let Value::HostClass(c) = v {
            return Ok(Value::HostClass(c.clone()));
        }
        let name = match v {
            Value::HostObject(o) => o.class_name.clone(),
            other => other.type_name().to_string(),
        };
        let class = self.registry.borrow_mut().lookup_or_create_builtin(&name);
        Ok(Value::HostClass(class))
    }

    fn call_value(&self, callee: Value, args: Vec<Value>, ctx: &ContextHandle, lineno: u32) -> Result<Value> {
        match callee {
            Value::Function(f) => self.call_function(&f, None, args, ctx, lineno, None),
            Value::BoundMethod(bm) => self.invoke_method(bm.receiver.clone(), &bm.method_name, args, ctx),
            Value::UserClass(class) => self.instantiate_user_class(class, args, ctx),
            Value::HostClass(class) => {
                let overload = self.registry.borrow().resolve_constructor(&class.name, &args)?;
                context::push_frame(ctx, Frame { class_name: Some(class.name.clone()), method_name: "<init>".to_string(), lineno });
                let call_fn = |f: &Value, fargs: &[Value]| self.call_value(f.clone(), fargs.to_vec(), ctx, lineno);
                let result = (overload.invoke)(None, &args, &call_fn);
                context::pop_frame(ctx);
                result
            }
            other => Err(Error::type_error(format!("'{}' object is not callable", other.display_type_name()))),
        }
    }

    /// Method dispatch, used both by a resolved `BoundMethod` value and by
    /// the bound-method-expression fast path in `eval_call`.
    fn invoke_method(&self, receiver: Value, method_name: &str, args: Vec<Value>, ctx: &ContextHandle) -> Result<Value> {
        match &receiver {
            Value::UserObject(obj) => {
                let class = obj.borrow().class.clone();
                if let Some(method) = class.find_method(method_name) {
                    return self.dispatch_user_method(method, &class.name, Some(receiver.clone()), Value::UserClass(class.clone()), args, ctx);
                }
                let attr_val = obj.borrow().attrs.get(method_name).cloned();
                if let Some(attr_val) = attr_val {
                    return self.call_value(attr_val, args, ctx, 0);
                }
                Err(Error::type_error(format!("'{}' object has no attribute '{method_name}'", class.name)))
            }
            Value::UserClass(class) => {
                if let Some(method) = class.find_method(method_name) {
                    return self.dispatch_user_method(method, &class.name, None, Value::UserClass(class.clone()), args, ctx);
                }
                Err(Error::type_error(format!("type object '{}' has no attribute '{method_name}'", class.name)))
            }
            Value::HostObject(obj) => {
                let mapped = host::map_method_name(method_name);
                let mut args = args;
                let mapped = if mapped == "split" && args.is_empty() {
                    args.push(Value::str("\\s+"));
                    "split"
                } else {
                    mapped
                };
                let overload = self.registry.borrow().resolve_method(&obj.class_name, mapped, &args)?;
                context::push_frame(ctx, Frame { class_name: Some(obj.class_name.clone()), method_name: mapped.to_string(), lineno: 0 });
                let call_fn = |f: &Value, fargs: &[Value]| self.call_value(f.clone(), fargs.to_vec(), ctx, 0);
                let result = (overload.invoke)(Some(&receiver), &args, &call_fn);
                context::pop_frame(ctx);
                result
            }
            Value::HostClass(class) => {
                let overload = self.registry.borrow().resolve_static_method(&class.name, method_name, &args)?;
                context::push_frame(ctx, Frame { class_name: Some(class.name.clone()), method_name: method_name.to_string(), lineno: 0 });
                let call_fn = |f: &Value, fargs: &[Value]| self.call_value(f.clone(), fargs.to_vec(), ctx, 0);
                let result = (overload.invoke)(None, &args, &call_fn);
                context::pop_frame(ctx);
                result
            }
            Value::Str(s) => invoke_str_method(s, method_name, &args),
            Value::Dict(pairs) => invoke_dict_method(pairs, method_name, &args),
            other => Err(Error::type_error(format!("'{}' object has no method '{method_name}'", other.display_type_name()))),
        }
    }

    fn dispatch_user_method(
        &self,
        method: &Method,
        class_name: &str,
        receiver: Option<Value>,
        class_value: Value,
        args: Vec<Value>,
        ctx: &ContextHandle,
    ) -> Result<Value> {
        let recv_arg = match method.kind {
            MethodKind::Instance => receiver,
            MethodKind::Class => Some(class_value),
            MethodKind::Static => None,
        };
        self.call_function(&method.function, recv_arg, args, ctx, 0, Some(class_name.to_string()))
    }

    /// Entry point for [`crate::script::Script::invoke`]: calls a
    /// script-defined function with no receiver and no enclosing call-stack
    /// frame of its own kind, as if invoked fresh from the embedder.
    pub fn call_function_pub(&self, f: &Rc<FunctionValue>, args: Vec<Value>, ctx: &ContextHandle) -> Result<Value> {
        self.call_function(f, None, args, ctx, 0, None)
    }

    fn call_function(
        &self,
        f: &Rc<FunctionValue>,
        receiver: Option<Value>,
        mut args: Vec<Value>,
        ctx: &ContextHandle,
        lineno: u32,
        class_name: Option<String>,
    ) -> Result<Value> {
        let _guard = self.enter_call()?;
        if let Some(r) = receiver {
            args.insert(0, r);
        }
        if args.len() != f.params.len() {
            return Err(Error::type_error(format!(
                "{}() takes {} argument(s) but {} were given",
                f.name,
                f.params.len(),
                args.len()
            )));
        }
        let local = Context::new_local(context::globals_of(ctx), Some(f.closure.clone()));
        for (p, v) in f.params.iter().zip(args) {
            local.borrow_mut().set_local(p.clone(), v);
        }
        context::push_frame(ctx, Frame { class_name, method_name: f.name.clone(), lineno });
        let result = match &f.body {
            FunctionBody::Block(stmts) => self.exec_block(stmts, &local).map(|()| local.borrow().return_value.clone()),
            FunctionBody::Expr(e) => self.eval_expr(e, &local),
        };
        context::pop_frame(ctx);
        result
    }

    // ------------------------------------------------------------------
    // User classes
    // ------------------------------------------------------------------

    fn build_user_class(&self, name: &str, decorators: &[crate::ast::Decorator], body: &[Stmt], ctx: &ContextHandle) -> Result<Rc<UserClass>> {
        let mut is_dataclass = false;
        let mut frozen = false;
        for d in decorators {
            if d.name() == "dataclass" {
                is_dataclass = true;
                if let crate::ast::Decorator::Call { keywords, .. } = d {
                    for (k, v) in keywords {
                        if k == "frozen" {
                            frozen = self.eval_expr(v, ctx)?.is_truthy();
                        }
                    }
                }
            }
        }

        let mut dataclass_fields = Vec::new();
        let mut methods = std::collections::HashMap::new();
        let mut class_attrs = std::collections::HashMap::new();
        let mut constructor = None;

        for stmt in body {
            match stmt {
                Stmt::AnnAssign { target: Target::Name(n), value, .. } if is_dataclass => {
                    let default = match value {
                        Some(e) => Some(self.eval_expr(e, ctx)?),
                        None => None,
                    };
                    dataclass_fields.push(DataclassField { name: n.clone(), default });
                }
                Stmt::Assign { target: Target::Name(n), value, .. } => {
                    let v = self.eval_expr(value, ctx)?;
                    class_attrs.insert(n.clone(), v);
                }
                Stmt::FunctionDef { name: mname, params, decorators: mdecos, body: mbody, .. } => {
                    let kind = if mdecos.iter().any(|d| d.name() == "classmethod") {
                        MethodKind::Class
                    } else if mdecos.iter().any(|d| d.name() == "staticmethod") {
                        MethodKind::Static
                    } else {
                        MethodKind::Instance
                    };
                    let func = Rc::new(FunctionValue {
                        name: mname.clone(),
                        params: params.clone(),
                        body: FunctionBody::Block(Rc::new(mbody.clone())),
                        closure: ctx.clone(),
                    });
                    if mname == "__init__" && !is_dataclass {
                        constructor = Some(func.clone());
                    }
                    methods.insert(mname.clone(), Method { kind, function: func });
                }
                _ => {}
            }
        }

        Ok(Rc::new(UserClass { name: name.to_string(), frozen, is_dataclass, dataclass_fields, constructor, methods, class_attrs }))
    }

    fn instantiate_user_class(&self, class: Rc<UserClass>, args: Vec<Value>, ctx: &ContextHandle) -> Result<Value> {
        if class.is_dataclass {
            let required = class.dataclass_fields.iter().filter(|f| f.default.is_none()).count();
            if args.len() != required {
                return Err(Error::type_error(format!("{}() takes {} positional argument(s) but {} were given", class.name, required, args.len())));
            }
            let mut attrs = std::collections::HashMap::new();
            let mut arg_iter = args.into_iter();
            for f in &class.dataclass_fields {
                let v = match &f.default {
                    Some(d) => d.clone(),
                    None => arg_iter.next().expect("arity already checked"),
                };
                attrs.insert(f.name.clone(), v);
            }
            Ok(Value::UserObject(Rc::new(RefCell::new(UserObject { class, attrs }))))
        } else if let Some(ctor) = class.constructor.clone() {
            let obj = Rc::new(RefCell::new(UserObject { class: class.clone(), attrs: std::collections::HashMap::new() }));
            let receiver = Value::UserObject(obj);
            self.call_function(&ctor, Some(receiver.clone()), args, ctx, 0, Some(class.name.clone()))?;
            Ok(receiver)
        } else {
            if !args.is_empty() {
                return Err(Error::type_error(format!("{}() takes no arguments", class.name)));
            }
            Ok(Value::UserObject(Rc::new(RefCell::new(UserObject { class, attrs: std::collections::HashMap::new() }))))
        }
    }
}

fn constant_value(c: &Constant) -> Value {
    match c {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::int_from_i64(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s.clone()),
    }
}

/// Native string methods. Matched on the Language's own names directly —
/// the host method-name mapping table in `host.rs` governs only genuine
/// platform-reflection dispatch against a registered `HostObject`, which a
/// built-in `Str` never is.
fn invoke_str_method(s: &Rc<String>, method_name: &str, args: &[Value]) -> Result<Value> {
    match method_name {
        "startswith" => {
            let prefix = args.first().and_then(Value::as_str).ok_or_else(|| Error::type_error("startswith() expected a string"))?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "endswith" => {
            let suffix = args.first().and_then(Value::as_str).ok_or_else(|| Error::type_error("endswith() expected a string"))?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }
        "split" => {
            let parts: Vec<Value> = if args.is_empty() {
                s.split_whitespace().map(Value::str).collect()
            } else {
                let sep = args[0].as_str().ok_or_else(|| Error::type_error("split() expected a string"))?;
                if sep.is_empty() {
                    return Err(Error::value_error("empty separator"));
                }
                s.split(sep).map(Value::str).collect()
            };
            Ok(Value::list(parts))
        }
        other => Err(Error::type_error(format!("'str' object has no method '{other}'"))),
    }
}

fn invoke_dict_method(pairs: &DictRef, method_name: &str, args: &[Value]) -> Result<Value> {
    match method_name {
        "items" => Ok(builtins::dict_items(&pairs.borrow())),
        "keys" => Ok(builtins::dict_keys(&pairs.borrow())),
        "values" => Ok(builtins::dict_values(&pairs.borrow())),
        "get" => {
            let key = args.first().ok_or_else(|| Error::type_error("get() missing required argument"))?;
            let default = args.get(1).cloned();
            Ok(builtins::dict_get(&pairs.borrow(), key, default))
        }
        other => Err(Error::type_error(format!("'dict' object has no method '{other}'"))),
    }
}
