//! The error taxonomy for lowering and evaluation.
//!
//! Mirrors the small `thiserror`-derived enum the teacher crate uses for its
//! own `Error` type, widened to the taxonomy this interpreter needs: parse
//! errors from JSON→AST lowering, and the runtime error families raised
//! during evaluation.

use std::fmt;

use crate::value::Value;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A single frame of the script call stack, attached to runtime errors once
/// they reach the `invoke` boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub class_name: Option<String>,
    pub method_name: String,
    pub lineno: u32,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class_name {
            Some(class) => write!(f, "{}.{}", class, self.method_name),
            None => write!(f, "{}", self.method_name),
        }
    }
}

/// Errors produced while lowering a JSON AST or evaluating one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An unrecognized `type` discriminator, or a node missing fields its
    /// kind requires, encountered during JSON→AST lowering.
    #[error("parse error at {path}: {cause}")]
    ParseError { path: String, cause: String },

    /// An unbound identifier was read.
    #[error("name '{0}' is not defined")]
    NameError(String),

    /// Incompatible operand types, wrong arity, a non-callable called, or a
    /// subscript on a non-container.
    #[error("{0}")]
    TypeError(String),

    /// A conversion or argument was semantically invalid (e.g. `int("abc")`,
    /// or a slice step other than 1).
    #[error("{0}")]
    ValueError(String),

    /// A sequence index, or dict/mapping key, was not present.
    #[error("{0}")]
    IndexError(String),

    /// Assignment to a frozen dataclass instance's field.
    #[error("cannot assign to field '{field}' of frozen instance of '{class}'")]
    FrozenInstanceError { class: String, field: String },

    /// A value raised by a script `raise` statement that was not caught by
    /// any handler before reaching the `invoke` boundary.
    #[error("unhandled exception: {0}")]
    ScriptRaised(Value),

    /// A host exception that propagated out of a host method call and was
    /// not caught by any handler before reaching the `invoke` boundary.
    #[error("unhandled host exception: {class_name}: {message}")]
    HostException { class_name: String, message: String },

    /// The evaluator's recursion depth exceeded the script's configured
    /// limit. Not part of the Language-visible exception taxonomy: scripts
    /// cannot catch this, it unwinds straight to the `invoke` boundary.
    #[error("recursion limit exceeded ({0} frames)")]
    RecursionLimit(usize),
}

impl Error {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Error::TypeError(msg.into())
    }

    pub fn value_error(msg: impl Into<String>) -> Self {
        Error::ValueError(msg.into())
    }

    pub fn index_error(msg: impl Into<String>) -> Self {
        Error::IndexError(msg.into())
    }

    /// True when this error is one a script `except` clause may observe and
    /// match against (as opposed to the ambient resource guard).
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Error::RecursionLimit(_))
    }
}

/// An error together with the script call-stack frames active when it
/// escaped. Attached once, at the outermost `invoke` frame, per the
/// propagation rule in the error handling design.
#[derive(Debug, Clone)]
pub struct Traced {
    pub error: Error,
    pub frames: Vec<Frame>,
}

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;
        for frame in &self.frames {
            writeln!(f, "  at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Traced {}
