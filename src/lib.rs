//! `treehost`: a tree-walking interpreter for a subset of a dynamically
//! typed, indentation-structured scripting language.
//!
//! The interpreter does not parse source text — it consumes an
//! already-parsed AST serialized as JSON (the shape a `Module` node from
//! Python's own `ast` module would serialize to), lowers it into the typed
//! tree in [`ast`], and evaluates it against a mutable [`context::Context`].
//! Embedders register host classes through [`host::HostRegistry`] so script
//! code can instantiate, call overloaded constructors/methods on, and read
//! fields from real platform objects via the [`host`] module's reflection
//! layer.
//!
//! The [`Script`] type is the crate's main entry point:
//!
//! ```ignore
//! let ast = serde_json::json!({ "type": "Module", "body": [ /* ... */ ] });
//! let script = treehost::Script::parse(&ast, "example.py")?;
//! script.exec()?;
//! ```

pub mod ast;
pub mod builtins;
pub mod class;
pub mod context;
pub mod error;
pub mod eval;
pub mod host;
pub mod lower;
pub mod operators;
pub mod script;
pub mod value;

pub use error::{Error, Frame, Result, Traced};
pub use eval::{Evaluator, Limits};
pub use host::{HostClassDescriptor, HostObjectInstance, HostObjectRef, HostRegistry, Overload, ParamKind};
pub use script::Script;
pub use value::Value;
