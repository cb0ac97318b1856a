//! The `Script` façade: the crate's public entry point, pairing a lowered
//! AST with the `Context`/`Evaluator` machinery needed to run it.

use serde_json::Value as Json;

use crate::builtins::register_math_module;
use crate::context::{Context, ContextHandle};
use crate::error::{Error, Result, Traced};
use crate::eval::{Evaluator, Limits};
use crate::host::HostRegistry;
use crate::lower::lower_module;
use crate::value::Value;

/// A parsed, runnable script: a module's statement list plus the globals
/// context and evaluator it executes against. One `Script` is meant for one
/// thread — the value model's `Rc`/`RefCell` internals are not `Send`.
pub struct Script {
    module: Vec<crate::ast::Stmt>,
    globals: ContextHandle,
    evaluator: Evaluator,
}

impl Script {
    /// Parses a JSON AST (as produced by `serde_json::from_str`, or built
    /// directly with `serde_json::json!`) into a runnable script. The
    /// `math` namespace is registered by default, the way the teacher's own
    /// sandbox ships a standard tool set before the embedder adds its own.
    pub fn parse(ast: &Json, filename: impl Into<String>) -> Result<Script> {
        let module = lower_module(ast)?;
        let filename = filename.into();
        let globals = Context::new_globals(filename);
        let mut registry = HostRegistry::new();
        register_math_module(&mut registry);
        let evaluator = Evaluator::new(registry, Limits::default());
        Ok(Script { module, globals, evaluator })
    }

    /// Runs every top-level statement in the module, in order. Errors that
    /// escape are wrapped with the call-stack frames active at the moment
    /// they reached this boundary.
    pub fn exec(&self) -> std::result::Result<(), Traced> {
        self.evaluator
            .exec_block(&self.module, &self.globals)
            .map_err(|error| self.trace(error))
    }

    /// Looks up a top-level `def`'d function by name, for later use with
    /// [`Script::invoke`]. Returns `None` if the name is unbound or is bound
    /// to something other than a function.
    pub fn get_function(&self, name: &str) -> Option<Value> {
        match crate::context::get(&self.globals, name) {
            Some(v @ Value::Function(_)) => Some(v),
            _ => None,
        }
    }

    /// Calls a script-defined function (as returned by [`Script::get_function`])
    /// with the given positional arguments, outside of the module body.
    pub fn invoke(&self, function: Value, args: Vec<Value>) -> std::result::Result<Value, Traced> {
        let Value::Function(f) = function else {
            return Err(self.trace(Error::type_error("invoke() requires a script function")));
        };
        self.evaluator
            .call_function_pub(&f, args, &self.globals)
            .map_err(|error| self.trace(error))
    }

    /// Replaces the destination for `print()` output.
    pub fn redirect_stdout(&self, sink: impl FnMut(&str) + 'static) {
        self.evaluator.redirect_stdout(sink);
    }

    /// The globals context, for embedders that want to seed or inspect
    /// module-level bindings directly (e.g. pre-registering a value before
    /// `exec()`, or reading a result out after).
    pub fn globals(&self) -> &ContextHandle {
        &self.globals
    }

    /// The host class registry, for embedders registering additional host
    /// classes beyond the built-in `math` namespace.
    pub fn registry_mut(&self) -> std::cell::RefMut<'_, HostRegistry> {
        self.evaluator.registry_mut()
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.evaluator.set_limits(limits);
    }

    /// Builder-style equivalent of [`Script::set_limits`], for configuring
    /// resource limits inline at construction time.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.set_limits(limits);
        self
    }

    fn trace(&self, error: Error) -> Traced {
        let frames = crate::context::current_frames(&self.globals);
        Traced { error, frames }
    }
}
