//! End-to-end scenarios run through the public `Script` API: a JSON AST in,
//! a `Value` or globals read out. Exercises the evaluator's statement and
//! expression semantics the way an embedder actually drives this crate —
//! through `Script::parse`, `exec`, `get_function`, and `invoke` — rather
//! than unit-testing internal evaluator methods directly.

use std::rc::Rc;

use serde_json::{json, Value as Json};

use treehost::host::{HostClassDescriptor, Overload, ParamKind};
use treehost::{Error, Script, Value};

#[track_caller]
fn assert_value_eq(actual: &Value, expected: &Value) {
    assert!(
        actual.value_eq(expected),
        "expected {}, got {}",
        expected.to_repr_string(),
        actual.to_repr_string(),
    );
}

fn module(body: Vec<Json>) -> Json {
    json!({"type": "Module", "body": body})
}

fn func_def(name: &str, params: &[&str], body: Vec<Json>) -> Json {
    json!({
        "type": "FunctionDef",
        "lineno": 1,
        "name": name,
        "args": {"args": params.iter().map(|p| json!({"arg": p})).collect::<Vec<_>>()},
        "decorator_list": [],
        "body": body,
    })
}

fn name_expr(id: &str) -> Json {
    json!({"type": "Name", "lineno": 1, "id": id})
}

fn int_const(n: i64) -> Json {
    json!({"type": "Constant", "lineno": 1, "typename": "int", "value": n})
}

fn str_const(s: &str) -> Json {
    json!({"type": "Constant", "lineno": 1, "typename": "str", "value": s})
}

fn binop(left: Json, op: &str, right: Json) -> Json {
    json!({"type": "BinOp", "lineno": 1, "left": left, "op": op, "right": right})
}

fn assign(target: Json, value: Json) -> Json {
    json!({"type": "Assign", "lineno": 1, "target": target, "value": value})
}

fn aug_assign(target: Json, op: &str, value: Json) -> Json {
    json!({"type": "AugAssign", "lineno": 1, "target": target, "op": op, "value": value})
}

fn return_stmt(value: Option<Json>) -> Json {
    match value {
        Some(v) => json!({"type": "Return", "lineno": 1, "value": v}),
        None => json!({"type": "Return", "lineno": 1}),
    }
}

fn expr_stmt(value: Json) -> Json {
    json!({"type": "Expr", "lineno": 1, "value": value})
}

fn if_stmt(test: Json, body: Vec<Json>, orelse: Vec<Json>) -> Json {
    json!({"type": "If", "lineno": 1, "test": test, "body": body, "orelse": orelse})
}

fn for_stmt(target: Json, iter: Json, body: Vec<Json>) -> Json {
    json!({"type": "For", "lineno": 1, "target": target, "iter": iter, "body": body, "orelse": []})
}

fn try_stmt(body: Vec<Json>, handlers: Vec<Json>, finalbody: Vec<Json>) -> Json {
    json!({"type": "Try", "lineno": 1, "body": body, "handlers": handlers, "orelse": [], "finalbody": finalbody})
}

fn except_handler(exc_type: Option<Json>, name: Option<&str>, body: Vec<Json>) -> Json {
    let mut node = json!({"type": "ExceptHandler", "lineno": 1, "body": body});
    if let Some(t) = exc_type {
        node["exc_type"] = t;
    }
    if let Some(n) = name {
        node["name"] = json!(n);
    }
    node
}

fn global_stmt(names: &[&str]) -> Json {
    json!({"type": "Global", "lineno": 1, "names": names})
}

fn call(func: Json, args: Vec<Json>) -> Json {
    json!({"type": "Call", "lineno": 1, "func": func, "args": args, "keywords": []})
}

fn attr(value: Json, attr: &str) -> Json {
    json!({"type": "Attribute", "lineno": 1, "value": value, "attr": attr})
}

fn subscript(value: Json, index: Json) -> Json {
    json!({"type": "Subscript", "lineno": 1, "value": value, "slice": index})
}

fn list_expr(elts: Vec<Json>) -> Json {
    json!({"type": "List", "lineno": 1, "elts": elts})
}

fn dict_expr(keys: Vec<Json>, values: Vec<Json>) -> Json {
    json!({"type": "Dict", "lineno": 1, "keys": keys, "values": values})
}

fn tuple_target(names: &[&str]) -> Json {
    json!({"type": "Tuple", "lineno": 1, "elts": names.iter().map(|n| name_expr(n)).collect::<Vec<_>>()})
}

fn fstring(literal: &str, name: &str) -> Json {
    json!({
        "type": "JoinedStr",
        "lineno": 1,
        "values": [
            {"type": "Constant", "lineno": 1, "typename": "str", "value": literal},
            {"type": "FormattedValue", "lineno": 1, "value": name_expr(name)},
        ],
    })
}

fn host_class(name: &str) -> Json {
    call(name_expr("HostClass"), vec![str_const(name)])
}

fn raise_stmt(exc: Json) -> Json {
    json!({"type": "Raise", "lineno": 1, "exc": exc})
}

fn class_def(name: &str, decorators: Vec<Json>, body: Vec<Json>) -> Json {
    json!({"type": "ClassDef", "lineno": 1, "name": name, "decorator_list": decorators, "body": body})
}

fn decorator_call(name: &str, keywords: Vec<(&str, Json)>) -> Json {
    json!({
        "type": "Call",
        "lineno": 1,
        "func": {"type": "Name", "lineno": 1, "id": name},
        "args": [],
        "keywords": keywords.into_iter().map(|(arg, value)| json!({"arg": arg, "value": value})).collect::<Vec<_>>(),
    })
}

fn bool_const(b: bool) -> Json {
    json!({"type": "Constant", "lineno": 1, "typename": "bool", "value": b})
}

fn ann_assign(target: Json, value: Option<Json>) -> Json {
    match value {
        Some(v) => json!({"type": "AnnAssign", "lineno": 1, "target": target, "value": v}),
        None => json!({"type": "AnnAssign", "lineno": 1, "target": target}),
    }
}

#[test]
fn times_two_returns_double_within_tolerance() {
    let ast = module(vec![func_def(
        "times_two",
        &["x"],
        vec![
            assign(name_expr("y"), binop(name_expr("x"), "Mult", int_const(2))),
            return_stmt(Some(name_expr("y"))),
        ],
    )]);
    let script = Script::parse(&ast, "scenario1.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("times_two").unwrap();
    let result = script.invoke(f, vec![Value::Float(3.14159265358979)]).unwrap();
    let got = result.as_f64().unwrap();
    assert!((got - 6.28318530717958).abs() < 1e-9, "got {got}");
}

#[test]
fn factorial_recurses_to_the_expected_value() {
    let ast = module(vec![func_def(
        "factorial",
        &["n"],
        vec![
            if_stmt(
                name_expr("n"),
                vec![return_stmt(Some(binop(
                    name_expr("n"),
                    "Mult",
                    call(name_expr("factorial"), vec![binop(name_expr("n"), "Sub", int_const(1))]),
                )))],
                vec![],
            ),
            return_stmt(Some(int_const(1))),
        ],
    )]);
    let script = Script::parse(&ast, "scenario2.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("factorial").unwrap();
    let result = script.invoke(f, vec![Value::Int(5)]).unwrap();
    assert_value_eq(&result, &Value::Int(120));
}

#[test]
fn global_declaration_routes_writes_to_module_scope() {
    let ast = module(vec![
        assign(name_expr("x"), int_const(0)),
        func_def(
            "add_one",
            &[],
            vec![global_stmt(&["x"]), assign(name_expr("x"), binop(name_expr("x"), "Add", int_const(1)))],
        ),
    ]);
    let script = Script::parse(&ast, "scenario3.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("add_one").unwrap();
    script.invoke(f.clone(), vec![]).unwrap();
    script.invoke(f, vec![]).unwrap();
    let x = treehost::context::get(script.globals(), "x").unwrap();
    assert_value_eq(&x, &Value::Int(2));
}

#[test]
fn list_item_augassign_and_list_concat_augassign() {
    let ast = module(vec![func_def(
        "list_ops",
        &[],
        vec![
            assign(name_expr("x"), list_expr(vec![int_const(1), int_const(2), int_const(3)])),
            aug_assign(subscript(name_expr("x"), int_const(0)), "Add", int_const(100)),
            aug_assign(name_expr("x"), "Add", list_expr(vec![str_const("bar")])),
            return_stmt(Some(name_expr("x"))),
        ],
    )]);
    let script = Script::parse(&ast, "scenario4.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("list_ops").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(
        &result,
        &Value::list(vec![Value::Int(101), Value::Int(2), Value::Int(3), Value::str("bar")]),
    );
}

#[test]
fn dict_items_iteration_rebuilds_an_equal_dict() {
    let ast = module(vec![func_def(
        "iterate_dict",
        &[],
        vec![
            assign(
                name_expr("d1"),
                dict_expr(vec![int_const(1), int_const(2)], vec![str_const("one"), str_const("two")]),
            ),
            assign(name_expr("d2"), dict_expr(vec![], vec![])),
            for_stmt(
                tuple_target(&["k", "v"]),
                call(attr(name_expr("d1"), "items"), vec![]),
                vec![assign(subscript(name_expr("d2"), name_expr("k")), name_expr("v"))],
            ),
            return_stmt(Some(name_expr("d2"))),
        ],
    )]);
    let script = Script::parse(&ast, "scenario5.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("iterate_dict").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(
        &result,
        &Value::dict(vec![(Value::Int(1), Value::str("one")), (Value::Int(2), Value::str("two"))]),
    );
}

fn register_exception_hierarchy(script: &Script) {
    let mut registry = script.registry_mut();
    registry.register(HostClassDescriptor {
        name: "Exception".to_string(),
        is_public: true,
        superclass: None,
        interfaces: Vec::new(),
        constructors: Vec::new(),
        methods: std::collections::HashMap::new(),
        static_methods: std::collections::HashMap::new(),
        static_fields: std::collections::HashMap::new(),
        instance_fields: std::collections::HashMap::new(),
        functional_method: None,
    });
    registry.register(HostClassDescriptor {
        name: "IllegalArgumentException".to_string(),
        is_public: true,
        superclass: Some("Exception".to_string()),
        interfaces: Vec::new(),
        constructors: vec![Overload {
            params: vec![ParamKind::String],
            invoke: Rc::new(|_recv, args, _call| {
                let message = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
                Err(Error::HostException { class_name: "IllegalArgumentException".to_string(), message })
            }),
        }],
        methods: std::collections::HashMap::new(),
        static_methods: std::collections::HashMap::new(),
        static_fields: std::collections::HashMap::new(),
        instance_fields: std::collections::HashMap::new(),
        functional_method: None,
    });
}

#[test]
fn host_exception_is_caught_by_superclass_and_finally_always_runs() {
    let ast = module(vec![func_def(
        "exceptions",
        &[],
        vec![
            assign(name_expr("result"), list_expr(vec![])),
            try_stmt(
                vec![expr_stmt(call(host_class("IllegalArgumentException"), vec![str_const("Thrown")]))],
                vec![except_handler(
                    Some(host_class("Exception")),
                    Some("e"),
                    vec![aug_assign(
                        name_expr("result"),
                        "Add",
                        list_expr(vec![fstring("Handled exception: ", "e")]),
                    )],
                )],
                vec![aug_assign(name_expr("result"), "Add", list_expr(vec![str_const("Finally!")]))],
            ),
            return_stmt(Some(name_expr("result"))),
        ],
    )]);
    let script = Script::parse(&ast, "scenario6.py").unwrap();
    register_exception_hierarchy(&script);
    script.exec().unwrap();
    let f = script.get_function("exceptions").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(
        &result,
        &Value::list(vec![
            Value::str("Handled exception: IllegalArgumentException: Thrown"),
            Value::str("Finally!"),
        ]),
    );
}

#[test]
fn user_defined_exception_is_caught_by_class_identity_and_finally_always_runs() {
    let ast = module(vec![
        class_def(
            "MyError",
            vec![],
            vec![func_def(
                "__init__",
                &["self", "msg"],
                vec![assign(attr(name_expr("self"), "msg"), name_expr("msg"))],
            )],
        ),
        func_def(
            "raise_and_catch",
            &[],
            vec![
                assign(name_expr("result"), list_expr(vec![])),
                try_stmt(
                    vec![expr_stmt(raise_stmt(call(name_expr("MyError"), vec![str_const("boom")])))],
                    vec![except_handler(
                        Some(name_expr("MyError")),
                        Some("e"),
                        vec![aug_assign(name_expr("result"), "Add", list_expr(vec![attr(name_expr("e"), "msg")]))],
                    )],
                    vec![aug_assign(name_expr("result"), "Add", list_expr(vec![str_const("done")]))],
                ),
                return_stmt(Some(name_expr("result"))),
            ],
        ),
    ]);
    let script = Script::parse(&ast, "scenario_user_exception.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("raise_and_catch").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(&result, &Value::list(vec![Value::str("boom"), Value::str("done")]));
}

#[test]
fn dataclass_splits_required_and_defaulted_fields() {
    let ast = module(vec![
        class_def(
            "Point",
            vec![decorator_call("dataclass", vec![("frozen", bool_const(true))])],
            vec![
                ann_assign(name_expr("x"), None),
                ann_assign(name_expr("y"), Some(int_const(0))),
            ],
        ),
        func_def(
            "make_point",
            &[],
            vec![
                assign(name_expr("p"), call(name_expr("Point"), vec![int_const(5)])),
                return_stmt(Some(list_expr(vec![attr(name_expr("p"), "x"), attr(name_expr("p"), "y")]))),
            ],
        ),
    ]);
    let script = Script::parse(&ast, "scenario_dataclass.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("make_point").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(&result, &Value::list(vec![Value::Int(5), Value::Int(0)]));
}

#[test]
fn frozen_dataclass_rejects_attribute_assignment() {
    let ast = module(vec![
        class_def(
            "Point",
            vec![decorator_call("dataclass", vec![("frozen", bool_const(true))])],
            vec![
                ann_assign(name_expr("x"), None),
                ann_assign(name_expr("y"), Some(int_const(0))),
            ],
        ),
        func_def(
            "mutate_point",
            &[],
            vec![
                assign(name_expr("p"), call(name_expr("Point"), vec![int_const(5)])),
                assign(attr(name_expr("p"), "x"), int_const(10)),
                return_stmt(Some(name_expr("p"))),
            ],
        ),
    ]);
    let script = Script::parse(&ast, "scenario_frozen.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("mutate_point").unwrap();
    let err = script.invoke(f, vec![]).unwrap_err();
    assert!(matches!(err.error, Error::FrozenInstanceError { .. }));
}

fn register_callback_runner(script: &Script) {
    let mut registry = script.registry_mut();
    registry.register(HostClassDescriptor {
        name: "Callback".to_string(),
        is_public: true,
        superclass: None,
        interfaces: Vec::new(),
        constructors: Vec::new(),
        methods: std::collections::HashMap::new(),
        static_methods: std::collections::HashMap::new(),
        static_fields: std::collections::HashMap::new(),
        instance_fields: std::collections::HashMap::new(),
        functional_method: Some("call".to_string()),
    });
    let mut static_methods = std::collections::HashMap::new();
    static_methods.insert(
        "apply".to_string(),
        vec![Overload {
            params: vec![ParamKind::Interface("Callback".to_string()), ParamKind::Int],
            invoke: Rc::new(|_recv, args, call| {
                let callback = &args[0];
                let n = args[1].as_i64().unwrap_or(0) as i32;
                call(callback, &[Value::Int(n)])
            }),
        }],
    );
    registry.register(HostClassDescriptor {
        name: "Runner".to_string(),
        is_public: true,
        superclass: None,
        interfaces: Vec::new(),
        constructors: Vec::new(),
        methods: std::collections::HashMap::new(),
        static_methods,
        static_fields: std::collections::HashMap::new(),
        instance_fields: std::collections::HashMap::new(),
        functional_method: None,
    });
}

#[test]
fn host_static_method_proxies_a_script_function_through_call_fn() {
    let ast = module(vec![
        assign(name_expr("Runner"), host_class("Runner")),
        func_def(
            "double",
            &["x"],
            vec![return_stmt(Some(binop(name_expr("x"), "Mult", int_const(2))))],
        ),
        func_def(
            "run_it",
            &[],
            vec![return_stmt(Some(call(attr(name_expr("Runner"), "apply"), vec![name_expr("double"), int_const(21)])))],
        ),
    ]);
    let script = Script::parse(&ast, "scenario_functional_interface.py").unwrap();
    register_callback_runner(&script);
    script.exec().unwrap();
    let f = script.get_function("run_it").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(&result, &Value::Int(42));
}

#[test]
fn break_exits_only_the_innermost_loop() {
    let ast = module(vec![func_def(
        "find_first_even",
        &[],
        vec![
            assign(name_expr("seen"), list_expr(vec![])),
            for_stmt(
                name_expr("n"),
                list_expr(vec![int_const(1), int_const(3), int_const(4), int_const(5)]),
                vec![
                    aug_assign(name_expr("seen"), "Add", list_expr(vec![name_expr("n")])),
                    if_stmt(
                        binop(name_expr("n"), "Mod", int_const(2)),
                        vec![],
                        vec![json!({"type": "Break", "lineno": 1})],
                    ),
                ],
            ),
            return_stmt(Some(name_expr("seen"))),
        ],
    )]);
    let script = Script::parse(&ast, "scenario_break.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("find_first_even").unwrap();
    let result = script.invoke(f, vec![]).unwrap();
    assert_value_eq(&result, &Value::list(vec![Value::Int(1), Value::Int(3), Value::Int(4)]));
}

#[test]
fn out_of_range_index_raises_index_error() {
    let ast = module(vec![func_def(
        "first",
        &["xs"],
        vec![return_stmt(Some(subscript(name_expr("xs"), int_const(5))))],
    )]);
    let script = Script::parse(&ast, "scenario_index.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("first").unwrap();
    let err = script.invoke(f, vec![Value::list(vec![Value::Int(1)])]).unwrap_err();
    assert!(matches!(err.error, Error::IndexError(_)));
}

#[test]
fn undeclared_name_raises_name_error() {
    let ast = module(vec![func_def("broken", &[], vec![return_stmt(Some(name_expr("nope")))])]);
    let script = Script::parse(&ast, "scenario_name.py").unwrap();
    script.exec().unwrap();
    let f = script.get_function("broken").unwrap();
    let err = script.invoke(f, vec![]).unwrap_err();
    assert!(matches!(err.error, Error::NameError(_)));
}
