//! JSON→AST lowering.
//!
//! Reads a JSON tree whose objects carry a `type` discriminator and
//! recursively builds the typed nodes in [`crate::ast`]. Every node that
//! carries `lineno` round-trips it verbatim so runtime errors can report
//! `filename:lineno`. Unknown `type` values, and nodes missing the fields
//! their kind requires, produce `Error::ParseError` naming the offending
//! node's path.

use serde_json::Value as Json;

use crate::ast::{
    BinOp, BoolOpKind, CmpOp, Constant, Decorator, ExceptHandler, Expr, Stmt, Target, UnaryOp,
};
use crate::error::{Error, Result};

fn parse_error(path: &str, cause: impl Into<String>) -> Error {
    Error::ParseError {
        path: path.to_string(),
        cause: cause.into(),
    }
}

fn node_type<'a>(node: &'a Json, path: &str) -> Result<&'a str> {
    node.get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| parse_error(path, "missing 'type' discriminator"))
}

fn lineno(node: &Json) -> u32 {
    node.get("lineno").and_then(Json::as_u64).unwrap_or(0) as u32
}

fn field<'a>(node: &'a Json, name: &str, path: &str) -> Result<&'a Json> {
    node.get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| parse_error(path, format!("missing field '{name}'")))
}

fn opt_field<'a>(node: &'a Json, name: &str) -> Option<&'a Json> {
    node.get(name).filter(|v| !v.is_null())
}

fn array<'a>(node: &'a Json, name: &str, path: &str) -> Result<&'a Vec<Json>> {
    field(node, name, path)?
        .as_array()
        .ok_or_else(|| parse_error(path, format!("field '{name}' is not an array")))
}

fn string_field(node: &Json, name: &str, path: &str) -> Result<String> {
    field(node, name, path)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| parse_error(path, format!("field '{name}' is not a string")))
}

/// Lower a top-level `Module` node (or a bare list of statements) into the
/// module's statement list.
pub fn lower_module(node: &Json) -> Result<Vec<Stmt>> {
    if let Some(items) = node.as_array() {
        return items
            .iter()
            .enumerate()
            .map(|(i, n)| lower_stmt(n, &format!("body[{i}]")))
            .collect();
    }
    let body = array(node, "body", "<module>")?;
    body.iter()
        .enumerate()
        .map(|(i, n)| lower_stmt(n, &format!("body[{i}]")))
        .collect()
}

fn lower_block(node: &Json, field_name: &str, path: &str) -> Result<Vec<Stmt>> {
    match opt_field(node, field_name) {
        None => Ok(Vec::new()),
        Some(list) => list
            .as_array()
            .ok_or_else(|| parse_error(path, format!("field '{field_name}' is not an array")))?
            .iter()
            .enumerate()
            .map(|(i, n)| lower_stmt(n, &format!("{path}.{field_name}[{i}]")))
            .collect(),
    }
}

fn lower_stmt(node: &Json, path: &str) -> Result<Stmt> {
    let kind = node_type(node, path)?;
    let line = lineno(node);
    match kind {
        "FunctionDef" | "AsyncFunctionDef" => {
            let name = string_field(node, "name", path)?;
            let params = lower_params(field(node, "args", path)?, path)?;
            let decorators = lower_decorators(node, path)?;
            let body = lower_block(node, "body", path)?;
            Ok(Stmt::FunctionDef {
                lineno: line,
                name,
                params,
                decorators,
                body,
            })
        }
        "ClassDef" => {
            let name = string_field(node, "name", path)?;
            let decorators = lower_decorators(node, path)?;
            let body = lower_block(node, "body", path)?;
            Ok(Stmt::ClassDef {
                lineno: line,
                name,
                decorators,
                body,
            })
        }
        "Return" => {
            let value = match opt_field(node, "value") {
                Some(v) => Some(lower_expr(v, &format!("{path}.value"))?),
                None => None,
            };
            Ok(Stmt::Return { lineno: line, value })
        }
        "Assign" => {
            let target_node = if let Some(targets) = opt_field(node, "targets") {
                targets
                    .as_array()
                    .and_then(|a| a.first())
                    .ok_or_else(|| parse_error(path, "'targets' is empty"))?
            } else {
                field(node, "target", path)?
            };
            let target = lower_target(target_node, &format!("{path}.target"))?;
            let value = lower_expr(field(node, "value", path)?, &format!("{path}.value"))?;
            Ok(Stmt::Assign {
                lineno: line,
                target,
                value,
            })
        }
        "AnnAssign" => {
            let target = lower_target(field(node, "target", path)?, &format!("{path}.target"))?;
            let value = match opt_field(node, "value") {
                Some(v) => Some(lower_expr(v, &format!("{path}.value"))?),
                None => None,
            };
            Ok(Stmt::AnnAssign {
                lineno: line,
                target,
                value,
            })
        }
        "AugAssign" => {
            let target = lower_target(field(node, "target", path)?, &format!("{path}.target"))?;
            let op = lower_binop(field(node, "op", path)?, path)?;
            let value = lower_expr(field(node, "value", path)?, &format!("{path}.value"))?;
            Ok(Stmt::AugAssign {
                lineno: line,
                target,
                op,
                value,
            })
        }
        "Delete" => {
            let targets = array(node, "targets", path)?
                .iter()
                .enumerate()
                .map(|(i, n)| lower_target(n, &format!("{path}.targets[{i}]")))
                .collect::<Result<Vec<_>>>()?;
            Ok(Stmt::Delete { lineno: line, targets })
        }
        "Global" => {
            let names = array(node, "names", path)?
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| parse_error(path, "'names' must be an array of strings"))?;
            Ok(Stmt::Global { lineno: line, names })
        }
        "Expr" => {
            let value = lower_expr(field(node, "value", path)?, &format!("{path}.value"))?;
            Ok(Stmt::Expr { lineno: line, value })
        }
        "If" => {
            let test = lower_expr(field(node, "test", path)?, &format!("{path}.test"))?;
            let body = lower_block(node, "body", path)?;
            let orelse = lower_block(node, "orelse", path)?;
            Ok(Stmt::If {
                lineno: line,
                test,
                body,
                orelse,
            })
        }
        "For" => {
            let target = lower_target(field(node, "target", path)?, &format!("{path}.target"))?;
            let iter = lower_expr(field(node, "iter", path)?, &format!("{path}.iter"))?;
            let body = lower_block(node, "body", path)?;
            let orelse = lower_block(node, "orelse", path)?;
            Ok(Stmt::For {
                lineno: line,
                target,
                iter,
                body,
                orelse,
            })
        }
        "While" => {
            let test = lower_expr(field(node, "test", path)?, &format!("{path}.test"))?;
            let body = lower_block(node, "body", path)?;
            let orelse = lower_block(node, "orelse", path)?;
            Ok(Stmt::While {
                lineno: line,
                test,
                body,
                orelse,
            })
        }
        "Break" => Ok(Stmt::Break { lineno: line }),
        "Try" => {
            let body = lower_block(node, "body", path)?;
            let handlers = array(node, "handlers", path)?
                .iter()
                .enumerate()
                .map(|(i, n)| lower_handler(n, &format!("{path}.handlers[{i}]")))
                .collect::<Result<Vec<_>>>()?;
            let orelse = lower_block(node, "orelse", path)?;
            let finalbody = lower_block(node, "finalbody", path)?;
            Ok(Stmt::Try {
                lineno: line,
                body,
                handlers,
                orelse,
                finalbody,
            })
        }
        "Raise" => {
            let exc = match opt_field(node, "exc") {
                Some(v) => Some(lower_expr(v, &format!("{path}.exc"))?),
                None => None,
            };
            Ok(Stmt::Raise { lineno: line, exc })
        }
        "Pass" => Ok(Stmt::Expr {
            lineno: line,
            value: Expr::Constant {
                lineno: line,
                value: Constant::None,
            },
        }),
        other => Err(parse_error(path, format!("unknown statement kind '{other}'"))),
    }
}

fn lower_handler(node: &Json, path: &str) -> Result<ExceptHandler> {
    let line = lineno(node);
    let exc_type = match opt_field(node, "exc_type") {
        Some(v) => Some(lower_expr(v, &format!("{path}.exc_type"))?),
        None => None,
    };
    let name = opt_field(node, "name")
        .and_then(Json::as_str)
        .map(str::to_string);
    let body = lower_block(node, "body", path)?;
    Ok(ExceptHandler {
        lineno: line,
        exc_type,
        name,
        body,
    })
}

fn lower_params(args_node: &Json, path: &str) -> Result<Vec<String>> {
    let args = array(args_node, "args", path)?;
    args.iter()
        .map(|a| {
            a.get("arg")
                .and_then(Json::as_str)
                .map(str::to_string)
                .ok_or_else(|| parse_error(path, "parameter missing 'arg' name"))
        })
        .collect()
}

fn lower_decorators(node: &Json, path: &str) -> Result<Vec<Decorator>> {
    let Some(list) = opt_field(node, "decorator_list") else {
        return Ok(Vec::new());
    };
    let list = list
        .as_array()
        .ok_or_else(|| parse_error(path, "'decorator_list' is not an array"))?;
    list.iter()
        .enumerate()
        .map(|(i, n)| lower_decorator(n, &format!("{path}.decorator_list[{i}]")))
        .collect()
}

fn lower_decorator(node: &Json, path: &str) -> Result<Decorator> {
    let kind = node_type(node, path)?;
    match kind {
        "Name" => Ok(Decorator::Name(string_field(node, "id", path)?)),
        "Call" => {
            let func = field(node, "func", path)?;
            let name = string_field(func, "id", path)?;
            let keywords = lower_keywords(node, path)?;
            Ok(Decorator::Call { name, keywords })
        }
        other => Err(parse_error(
            path,
            format!("decorator must be a simple name or a call, found '{other}'"),
        )),
    }
}

fn lower_keywords(node: &Json, path: &str) -> Result<Vec<(String, Expr)>> {
    let Some(list) = opt_field(node, "keywords") else {
        return Ok(Vec::new());
    };
    list.as_array()
        .ok_or_else(|| parse_error(path, "'keywords' is not an array"))?
        .iter()
        .map(|kw| {
            let name = string_field(kw, "arg", path)?;
            let value = lower_expr(field(kw, "value", path)?, path)?;
            Ok((name, value))
        })
        .collect()
}

fn lower_target(node: &Json, path: &str) -> Result<Target> {
    let kind = node_type(node, path)?;
    match kind {
        "Name" => Ok(Target::Name(string_field(node, "id", path)?)),
        "Attribute" => {
            let value = Box::new(lower_expr(field(node, "value", path)?, path)?);
            let attr = string_field(node, "attr", path)?;
            Ok(Target::Attribute { value, attr })
        }
        "Subscript" => {
            let value = Box::new(lower_expr(field(node, "value", path)?, path)?);
            let index = Box::new(lower_expr(field(node, "slice", path)?, path)?);
            Ok(Target::Subscript { value, index })
        }
        "Tuple" | "List" => {
            let elts = array(node, "elts", path)?;
            let targets = elts
                .iter()
                .map(|e| lower_target(e, path))
                .collect::<Result<Vec<_>>>()?;
            if !targets.iter().all(|t| matches!(t, Target::Name(_))) {
                return Err(parse_error(
                    path,
                    "tuple assignment targets must all be simple names",
                ));
            }
            Ok(Target::Tuple(targets))
        }
        other => Err(parse_error(path, format!("invalid assignment target '{other}'"))),
    }
}

fn lower_binop(node: &Json, path: &str) -> Result<BinOp> {
    match op_tag(node, path)? {
        "Add" => Ok(BinOp::Add),
        "Sub" => Ok(BinOp::Sub),
        "Mult" => Ok(BinOp::Mult),
        "Div" => Ok(BinOp::Div),
        "Pow" => Ok(BinOp::Pow),
        "Mod" => Ok(BinOp::Mod),
        other => Err(parse_error(path, format!("unknown binary operator '{other}'"))),
    }
}

fn lower_unaryop(node: &Json, path: &str) -> Result<UnaryOp> {
    match op_tag(node, path)? {
        "USub" => Ok(UnaryOp::USub),
        "Not" => Ok(UnaryOp::Not),
        other => Err(parse_error(path, format!("unknown unary operator '{other}'"))),
    }
}

fn lower_boolop(node: &Json, path: &str) -> Result<BoolOpKind> {
    match op_tag(node, path)? {
        "And" => Ok(BoolOpKind::And),
        "Or" => Ok(BoolOpKind::Or),
        other => Err(parse_error(path, format!("unknown boolean operator '{other}'"))),
    }
}

fn lower_cmpop(node: &Json, path: &str) -> Result<CmpOp> {
    match op_tag(node, path)? {
        "Is" => Ok(CmpOp::Is),
        "IsNot" => Ok(CmpOp::IsNot),
        "Eq" => Ok(CmpOp::Eq),
        "NotEq" => Ok(CmpOp::NotEq),
        "Lt" => Ok(CmpOp::Lt),
        "LtE" => Ok(CmpOp::LtE),
        "Gt" => Ok(CmpOp::Gt),
        "GtE" => Ok(CmpOp::GtE),
        "In" => Ok(CmpOp::In),
        "NotIn" => Ok(CmpOp::NotIn),
        other => Err(parse_error(path, format!("unknown comparison operator '{other}'"))),
    }
}

/// Operator nodes may be serialized either as a bare string (`"Add"`) or as
/// an object carrying a `type` tag (`{"type": "Add"}`).
fn op_tag<'a>(node: &'a Json, path: &str) -> Result<&'a str> {
    if let Some(s) = node.as_str() {
        return Ok(s);
    }
    node_type(node, path)
}

fn lower_expr(node: &Json, path: &str) -> Result<Expr> {
    let kind = node_type(node, path)?;
    let line = lineno(node);
    match kind {
        "Name" => Ok(Expr::Name {
            lineno: line,
            id: string_field(node, "id", path)?,
        }),
        "Constant" => {
            let typename = opt_field(node, "typename")
                .and_then(Json::as_str)
                .unwrap_or("NoneType");
            let raw = node.get("value");
            let value = match typename {
                "NoneType" => Constant::None,
                "bool" => Constant::Bool(raw.and_then(Json::as_bool).unwrap_or(false)),
                "int" => Constant::Int(
                    raw.and_then(Json::as_i64)
                        .ok_or_else(|| parse_error(path, "constant 'int' value is not an integer"))?,
                ),
                "float" => Constant::Float(
                    raw.and_then(Json::as_f64)
                        .ok_or_else(|| parse_error(path, "constant 'float' value is not a number"))?,
                ),
                "str" => Constant::Str(
                    raw.and_then(Json::as_str)
                        .ok_or_else(|| parse_error(path, "constant 'str' value is not a string"))?
                        .to_string(),
                ),
                other => {
                    return Err(parse_error(path, format!("unknown constant typename '{other}'")));
                }
            };
            Ok(Expr::Constant { lineno: line, value })
        }
        "BinOp" => {
            let left = Box::new(lower_expr(field(node, "left", path)?, path)?);
            let op = lower_binop(field(node, "op", path)?, path)?;
            let right = Box::new(lower_expr(field(node, "right", path)?, path)?);
            Ok(Expr::BinOp {
                lineno: line,
                left,
                op,
                right,
            })
        }
        "UnaryOp" => {
            let op = lower_unaryop(field(node, "op", path)?, path)?;
            let operand = Box::new(lower_expr(field(node, "operand", path)?, path)?);
            Ok(Expr::UnaryOp {
                lineno: line,
                op,
                operand,
            })
        }
        "BoolOp" => {
            let op = lower_boolop(field(node, "op", path)?, path)?;
            let values = array(node, "values", path)?
                .iter()
                .map(|v| lower_expr(v, path))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::BoolOp {
                lineno: line,
                op,
                values,
            })
        }
        "Compare" => {
            let left = Box::new(lower_expr(field(node, "left", path)?, path)?);
            let ops = array(node, "ops", path)?;
            let comparators = array(node, "comparators", path)?;
            let op = lower_cmpop(
                ops.first()
                    .ok_or_else(|| parse_error(path, "'Compare' has no operators"))?,
                path,
            )?;
            let comparator = Box::new(lower_expr(
                comparators
                    .first()
                    .ok_or_else(|| parse_error(path, "'Compare' has no comparators"))?,
                path,
            )?);
            Ok(Expr::Compare {
                lineno: line,
                left,
                op,
                comparator,
            })
        }
        "Call" => {
            let func = Box::new(lower_expr(field(node, "func", path)?, path)?);
            let args = array(node, "args", path)?
                .iter()
                .map(|a| lower_expr(a, path))
                .collect::<Result<Vec<_>>>()?;
            let keywords = lower_keywords(node, path)?;
            Ok(Expr::Call {
                lineno: line,
                func,
                args,
                keywords,
            })
        }
        "Attribute" => {
            let value = Box::new(lower_expr(field(node, "value", path)?, path)?);
            let attr = string_field(node, "attr", path)?;
            Ok(Expr::Attribute {
                lineno: line,
                value,
                attr,
            })
        }
        "Subscript" => {
            let value = Box::new(lower_expr(field(node, "value", path)?, path)?);
            let index = Box::new(lower_expr(field(node, "slice", path)?, path)?);
            Ok(Expr::Subscript {
                lineno: line,
                value,
                index,
            })
        }
        "Slice" => {
            let lower = match opt_field(node, "lower") {
                Some(v) => Some(Box::new(lower_expr(v, path)?)),
                None => None,
            };
            let upper = match opt_field(node, "upper") {
                Some(v) => Some(Box::new(lower_expr(v, path)?)),
                None => None,
            };
            let step = match opt_field(node, "step") {
                Some(v) => Some(Box::new(lower_expr(v, path)?)),
                None => None,
            };
            Ok(Expr::Slice {
                lineno: line,
                lower,
                upper,
                step,
            })
        }
        "IfExp" => {
            let test = Box::new(lower_expr(field(node, "test", path)?, path)?);
            let body = Box::new(lower_expr(field(node, "body", path)?, path)?);
            let orelse = Box::new(lower_expr(field(node, "orelse", path)?, path)?);
            Ok(Expr::IfExp {
                lineno: line,
                test,
                body,
                orelse,
            })
        }
        "ListComp" => {
            let elt = Box::new(lower_expr(field(node, "elt", path)?, path)?);
            let generators = array(node, "generators", path)?;
            let gen_ = generators
                .first()
                .ok_or_else(|| parse_error(path, "'ListComp' has no generators"))?;
            let target = lower_target(field(gen_, "target", path)?, path)?;
            let iter = Box::new(lower_expr(field(gen_, "iter", path)?, path)?);
            let ifs = match opt_field(gen_, "ifs") {
                Some(list) => list
                    .as_array()
                    .ok_or_else(|| parse_error(path, "'ifs' is not an array"))?
                    .iter()
                    .map(|i| lower_expr(i, path))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            Ok(Expr::ListComp {
                lineno: line,
                elt,
                target,
                iter,
                ifs,
            })
        }
        "Tuple" => Ok(Expr::Tuple {
            lineno: line,
            elts: array(node, "elts", path)?
                .iter()
                .map(|e| lower_expr(e, path))
                .collect::<Result<Vec<_>>>()?,
        }),
        "List" => Ok(Expr::List {
            lineno: line,
            elts: array(node, "elts", path)?
                .iter()
                .map(|e| lower_expr(e, path))
                .collect::<Result<Vec<_>>>()?,
        }),
        "Dict" => {
            let keys = array(node, "keys", path)?
                .iter()
                .map(|k| lower_expr(k, path))
                .collect::<Result<Vec<_>>>()?;
            let values = array(node, "values", path)?
                .iter()
                .map(|v| lower_expr(v, path))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::Dict {
                lineno: line,
                keys,
                values,
            })
        }
        "Lambda" => {
            let params = lower_params(field(node, "args", path)?, path)?;
            let body = Box::new(lower_expr(field(node, "body", path)?, path)?);
            Ok(Expr::Lambda {
                lineno: line,
                params,
                body,
            })
        }
        "JoinedStr" => Ok(Expr::JoinedStr {
            lineno: line,
            values: array(node, "values", path)?
                .iter()
                .map(|v| lower_expr(v, path))
                .collect::<Result<Vec<_>>>()?,
        }),
        "FormattedValue" => {
            let value = Box::new(lower_expr(field(node, "value", path)?, path)?);
            Ok(Expr::FormattedValue { lineno: line, value })
        }
        other => Err(parse_error(path, format!("unknown expression kind '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn lowers_simple_assignment() {
        let module = json!({
            "type": "Module",
            "body": [
                {
                    "type": "Assign",
                    "lineno": 1,
                    "target": {"type": "Name", "id": "x", "lineno": 1},
                    "value": {"type": "Constant", "typename": "int", "value": 5, "lineno": 1}
                }
            ]
        });
        let stmts = lower_module(&module).unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Assign { target, value, lineno } => {
                assert_eq!(*lineno, 1);
                assert_eq!(*target, Target::Name("x".to_string()));
                assert_eq!(*value, Expr::Constant { lineno: 1, value: Constant::Int(5) });
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_node_kind_is_a_parse_error() {
        let module = json!({"type": "Module", "body": [{"type": "Frobnicate", "lineno": 1}]});
        let err = lower_module(&module).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn chained_comparison_truncates_to_first_pair() {
        let node = json!({
            "type": "Compare",
            "lineno": 1,
            "left": {"type": "Constant", "typename": "int", "value": 1, "lineno": 1},
            "ops": ["Lt", "Lt"],
            "comparators": [
                {"type": "Constant", "typename": "int", "value": 2, "lineno": 1},
                {"type": "Constant", "typename": "int", "value": 3, "lineno": 1}
            ]
        });
        let expr = lower_expr(&node, "<test>").unwrap();
        match expr {
            Expr::Compare { op, comparator, .. } => {
                assert_eq!(op, CmpOp::Lt);
                assert_eq!(*comparator, Expr::Constant { lineno: 1, value: Constant::Int(2) });
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tuple_target_rejects_non_name_elements() {
        let node = json!({
            "type": "Tuple",
            "lineno": 1,
            "elts": [
                {"type": "Name", "id": "a", "lineno": 1},
                {"type": "Subscript", "lineno": 1,
                 "value": {"type": "Name", "id": "b", "lineno": 1},
                 "slice": {"type": "Constant", "typename": "int", "value": 0, "lineno": 1}}
            ]
        });
        assert!(lower_target(&node, "<test>").is_err());
    }
}
