//! Typed AST node variants.
//!
//! Immutable once produced by [`crate::lower`]. One variant per node kind,
//! following the "tagged sum instead of one class per node" approach: the
//! JSON lowering becomes a match on the wire `type` string, and each arm
//! constructs the matching variant here.
//!
//! Every node that carries a source line number keeps it, so runtime errors
//! can report `filename:lineno` the same way the source system does.

/// A literal value as it appears in a `Constant` node, before it becomes a
/// runtime [`crate::value::Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    Pow,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    USub,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Is,
    IsNot,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

/// An assignment target: a simple name, an attribute, a subscript, or a
/// tuple of simple names (destructuring unpack — the lowering step rejects
/// any tuple target whose elements are not all simple names).
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Tuple(Vec<Target>),
}

/// A decorator recorded verbatim from the source AST. Only `dataclass` (on
/// classes), `classmethod`, and `staticmethod` (on methods) are given
/// meaning by the evaluator; anything else lowers successfully but is
/// inert.
#[derive(Debug, Clone, PartialEq)]
pub enum Decorator {
    Name(String),
    Call {
        name: String,
        keywords: Vec<(String, Expr)>,
    },
}

impl Decorator {
    pub fn name(&self) -> &str {
        match self {
            Decorator::Name(n) => n,
            Decorator::Call { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub lineno: u32,
    /// Absent means a bare `except:` that matches anything.
    pub exc_type: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    FunctionDef {
        lineno: u32,
        name: String,
        params: Vec<String>,
        decorators: Vec<Decorator>,
        body: Vec<Stmt>,
    },
    ClassDef {
        lineno: u32,
        name: String,
        decorators: Vec<Decorator>,
        body: Vec<Stmt>,
    },
    Return {
        lineno: u32,
        value: Option<Expr>,
    },
    Assign {
        lineno: u32,
        target: Target,
        value: Expr,
    },
    AnnAssign {
        lineno: u32,
        target: Target,
        value: Option<Expr>,
    },
    AugAssign {
        lineno: u32,
        target: Target,
        op: BinOp,
        value: Expr,
    },
    Delete {
        lineno: u32,
        targets: Vec<Target>,
    },
    Global {
        lineno: u32,
        names: Vec<String>,
    },
    Expr {
        lineno: u32,
        value: Expr,
    },
    If {
        lineno: u32,
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        lineno: u32,
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        lineno: u32,
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Break {
        lineno: u32,
    },
    Try {
        lineno: u32,
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Raise {
        lineno: u32,
        exc: Option<Expr>,
    },
}

impl Stmt {
    pub fn lineno(&self) -> u32 {
        match self {
            Stmt::FunctionDef { lineno, .. }
            | Stmt::ClassDef { lineno, .. }
            | Stmt::Return { lineno, .. }
            | Stmt::Assign { lineno, .. }
            | Stmt::AnnAssign { lineno, .. }
            | Stmt::AugAssign { lineno, .. }
            | Stmt::Delete { lineno, .. }
            | Stmt::Global { lineno, .. }
            | Stmt::Expr { lineno, .. }
            | Stmt::If { lineno, .. }
            | Stmt::For { lineno, .. }
            | Stmt::While { lineno, .. }
            | Stmt::Break { lineno }
            | Stmt::Try { lineno, .. }
            | Stmt::Raise { lineno, .. } => *lineno,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name {
        lineno: u32,
        id: String,
    },
    Constant {
        lineno: u32,
        value: Constant,
    },
    BinOp {
        lineno: u32,
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        lineno: u32,
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        lineno: u32,
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    /// Already truncated to the first operator/comparator pair during
    /// lowering, matching the documented chained-comparison quirk.
    Compare {
        lineno: u32,
        left: Box<Expr>,
        op: CmpOp,
        comparator: Box<Expr>,
    },
    Call {
        lineno: u32,
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Attribute {
        lineno: u32,
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        lineno: u32,
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lineno: u32,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    IfExp {
        lineno: u32,
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    ListComp {
        lineno: u32,
        elt: Box<Expr>,
        target: Target,
        iter: Box<Expr>,
        ifs: Vec<Expr>,
    },
    Tuple {
        lineno: u32,
        elts: Vec<Expr>,
    },
    List {
        lineno: u32,
        elts: Vec<Expr>,
    },
    Dict {
        lineno: u32,
        keys: Vec<Expr>,
        values: Vec<Expr>,
    },
    Lambda {
        lineno: u32,
        params: Vec<String>,
        body: Box<Expr>,
    },
    JoinedStr {
        lineno: u32,
        values: Vec<Expr>,
    },
    FormattedValue {
        lineno: u32,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn lineno(&self) -> u32 {
        match self {
            Expr::Name { lineno, .. }
            | Expr::Constant { lineno, .. }
            | Expr::BinOp { lineno, .. }
            | Expr::UnaryOp { lineno, .. }
            | Expr::BoolOp { lineno, .. }
            | Expr::Compare { lineno, .. }
            | Expr::Call { lineno, .. }
            | Expr::Attribute { lineno, .. }
            | Expr::Subscript { lineno, .. }
            | Expr::Slice { lineno, .. }
            | Expr::IfExp { lineno, .. }
            | Expr::ListComp { lineno, .. }
            | Expr::Tuple { lineno, .. }
            | Expr::List { lineno, .. }
            | Expr::Dict { lineno, .. }
            | Expr::Lambda { lineno, .. }
            | Expr::JoinedStr { lineno, .. }
            | Expr::FormattedValue { lineno, .. } => *lineno,
        }
    }
}
