use rivet_backend_rs::{EmitOptions, emit_program};
use rivet_ir::build::*;
use rivet_ir::{BinOp, Decl, Program, Receiver, Type, UnaryOp};

fn emit(mut program: Program) -> String {
    rivet_sema::resolve(&mut program);
    rivet_sema::compute_copy_closure(&mut program, rivet_sema::DEFAULT_MAX_ITERATIONS);
    let registry = rivet_sema::TypeRegistry::from_program(&program);
    emit_program(&program, &registry, &EmitOptions::default()).expect("emit")
}

fn log(msg: &str) -> rivet_ir::Stmt {
    expr_stmt(ns_call("console", "log", vec![text(msg)]))
}

#[test]
fn return_in_tail_position_is_bare() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "label",
        vec![param("x", Type::owned_text())],
        Type::owned_text(),
        vec![ret(Some(binary(BinOp::Add, ident("x"), num(1.0))))],
    ))]));
    assert!(src.contains("pub fn label(x: String) -> String {"), "{src}");
    assert!(src.contains("    format!(\"{}{}\", x, 1)\n}"), "{src}");
    assert!(!src.contains("return"), "{src}");
    assert!(!src.contains("clone"), "{src}");
}

#[test]
fn switch_cases_stay_independent() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "classify",
        vec![param("n", Type::f64())],
        Type::void(),
        vec![switch(
            ident("n"),
            vec![
                case(Some(num(1.0)), vec![log("one"), brk()]),
                case(Some(num(2.0)), vec![log("two")]),
                case(Some(num(3.0)), vec![log("three"), brk()]),
            ],
        )],
    ))]));
    assert!(src.contains("match n {"), "{src}");
    assert!(src.contains("1.0 => {\n            println!(\"{}\", \"one\");\n        }"), "{src}");
    assert!(src.contains("2.0 => {\n            println!(\"{}\", \"two\");\n        }"), "{src}");
    assert!(src.contains("3.0 => {\n            println!(\"{}\", \"three\");\n        }"), "{src}");
    assert!(src.contains("_ => {}"), "{src}");
    assert!(!src.contains("break"), "{src}");
}

#[test]
fn default_arm_is_moved_last() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "pick",
        vec![param("s", Type::owned_text())],
        Type::void(),
        vec![switch(
            ident("s"),
            vec![
                case(None, vec![log("other"), brk()]),
                case(Some(text("a")), vec![log("a"), brk()]),
            ],
        )],
    ))]));
    assert!(src.contains("match s.as_str() {"), "{src}");
    let a = src.find("\"a\" => {").expect("a arm");
    let d = src.find("_ => {").expect("default arm");
    assert!(a < d, "{src}");
    assert!(!src.contains("_ => {}"), "{src}");
}

#[test]
fn declarations_come_out_in_fixed_order() {
    let src = emit(Program::new(vec![
        Decl::Function(func("main", vec![], Type::void(), vec![])),
        Decl::Impl(impl_block(
            "Counter",
            vec![method_decl(
                "get",
                Receiver::Ref,
                vec![],
                Type::f64(),
                vec![ret(Some(field(ident("this"), "count")))],
            )],
        )),
        Decl::Alias(alias("Score", Type::f64())),
        Decl::Enum(enum_decl("Mode", vec![unit_variant("On"), unit_variant("Off")])),
        Decl::Struct(struct_decl("Counter", vec![("count", Type::f64())])),
    ]));
    let order = [
        "pub struct Counter",
        "pub enum Mode",
        "pub type Score = f64;",
        "impl Counter {",
        "fn main() {",
    ]
    .map(|needle| src.find(needle).unwrap_or_else(|| panic!("missing {needle}:\n{src}")));
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{src}");
    assert!(src.contains("    pub fn get(&self) -> f64 {\n        self.count\n    }"), "{src}");
}

#[test]
fn copy_tags_follow_the_closure() {
    let src = emit(Program::new(vec![
        Decl::Struct(struct_decl("Point", vec![("x", Type::f64()), ("y", Type::f64())])),
        Decl::Struct(struct_decl("Name", vec![("value", Type::owned_text())])),
        Decl::Enum(enum_decl(
            "Shape",
            vec![unit_variant("Empty"), tuple_variant("Circle", vec![Type::f64()])],
        )),
    ]));
    assert!(src.contains("#[derive(Debug, Clone, PartialEq, Copy)]\npub struct Point {"), "{src}");
    assert!(src.contains("#[derive(Debug, Clone, PartialEq)]\npub struct Name {"), "{src}");
    assert!(src.contains("    pub value: String,"), "{src}");
    assert!(src.contains("#[derive(Debug, Clone, PartialEq)]\npub enum Shape {"), "{src}");
    assert!(src.contains("    Circle(f64),"), "{src}");
}

#[test]
fn repeated_owned_reads_clone_all_but_the_last() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "twice",
        vec![param("name", Type::owned_text())],
        Type::void(),
        vec![
            let_("a", None, Some(ident("name"))),
            let_("b", None, Some(ident("name"))),
        ],
    ))]));
    assert!(src.contains("let a = name.clone();"), "{src}");
    assert!(src.contains("let b = name;"), "{src}");
}

#[test]
fn borrowed_reads_are_never_cloned() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "same",
        vec![param("a", Type::owned_text()), param("b", Type::owned_text())],
        Type::bool(),
        vec![
            expr_stmt(ns_call("console", "log", vec![ident("a")])),
            ret(Some(binary(BinOp::Eq, ident("a"), ident("b")))),
        ],
    ))]));
    assert!(src.contains("println!(\"{}\", a);"), "{src}");
    assert!(src.contains("    a == b\n"), "{src}");
    assert!(!src.contains("clone"), "{src}");
}

#[test]
fn mutation_makes_bindings_mut() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "total",
        vec![param("xs", Type::sequence(Type::f64()))],
        Type::f64(),
        vec![
            expr_stmt(method(ident("xs"), "push", vec![num(1.5)])),
            let_("sum", Some(Type::f64()), Some(num(0.0))),
            for_each(
                "x",
                ident("xs"),
                vec![assign(ident("sum"), binary(BinOp::Add, ident("sum"), ident("x")))],
            ),
            ret(Some(ident("sum"))),
        ],
    ))]));
    assert!(src.contains("pub fn total(mut xs: Vec<f64>) -> f64 {"), "{src}");
    assert!(src.contains("    xs.push(1.5);\n"), "{src}");
    assert!(src.contains("let mut sum: f64 = 0;"), "{src}");
    assert!(src.contains("for x in xs.iter().copied() {"), "{src}");
    assert!(src.contains("sum = sum + x;"), "{src}");
}

#[test]
fn else_if_chains_flatten() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "sign",
        vec![param("n", Type::f64())],
        Type::f64(),
        vec![if_(
            binary(BinOp::Lt, ident("n"), num(0.0)),
            vec![ret(Some(unary(UnaryOp::Neg, num(1.0))))],
            Some(vec![if_(
                binary(BinOp::Eq, ident("n"), num(0.0)),
                vec![ret(Some(num(0.0)))],
                Some(vec![ret(Some(num(1.0)))]),
            )]),
        )],
    ))]));
    assert!(src.contains("if n < 0 {\n        return -1;\n    } else if n == 0 {"), "{src}");
    assert!(src.contains("    } else {\n        return 1;\n    }\n}"), "{src}");
}

#[test]
fn enum_access_becomes_a_path() {
    let src = emit(Program::new(vec![
        Decl::Enum(enum_decl(
            "Shape",
            vec![unit_variant("Empty"), tuple_variant("Circle", vec![Type::f64()])],
        )),
        Decl::Function(func(
            "empty",
            vec![],
            Type::enumeration("Shape"),
            vec![ret(Some(field(ident("Shape"), "Empty")))],
        )),
        Decl::Function(func(
            "circle",
            vec![],
            Type::enumeration("Shape"),
            vec![ret(Some(method(ident("Shape"), "Circle", vec![num(2.5)])))],
        )),
    ]));
    assert!(src.contains("-> Shape {\n    Shape::Empty\n}"), "{src}");
    assert!(src.contains("-> Shape {\n    Shape::Circle(2.5)\n}"), "{src}");
}

#[test]
fn null_checks_and_optional_wrapping() {
    let src = emit(Program::new(vec![
        Decl::Function(func(
            "missing",
            vec![param("x", Type::optional(Type::f64()))],
            Type::bool(),
            vec![ret(Some(binary(BinOp::Eq, ident("x"), null())))],
        )),
        Decl::Function(func(
            "wrap",
            vec![param("x", Type::f64())],
            Type::optional(Type::f64()),
            vec![ret(Some(ident("x")))],
        )),
    ]));
    assert!(src.contains("    x.is_none()\n"), "{src}");
    assert!(src.contains("-> Option<f64> {\n    Some(x)\n}"), "{src}");
}

#[test]
fn keywords_and_camel_case_are_renamed() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "getType",
        vec![param("type", Type::f64()), param("itemCount", Type::f64())],
        Type::f64(),
        vec![ret(Some(binary(BinOp::Mul, ident("type"), ident("itemCount"))))],
    ))]));
    assert!(src.contains("pub fn get_type(r#type: f64, item_count: f64) -> f64 {"), "{src}");
    assert!(src.contains("    r#type * item_count\n"), "{src}");
}

#[test]
fn sibling_blocks_do_not_share_bindings() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "siblings",
        vec![],
        Type::void(),
        vec![
            block(vec![
                let_("s", Some(Type::f64()), Some(num(1.0))),
                expr_stmt(call("show", vec![ident("s")])),
            ]),
            block(vec![
                let_("s", Some(Type::owned_text()), Some(text("a"))),
                expr_stmt(call("take", vec![ident("s")])),
                expr_stmt(call("take", vec![ident("s")])),
            ]),
        ],
    ))]));
    assert!(src.contains("let s: f64 = 1;"), "{src}");
    assert!(src.contains("let s: String = \"a\".to_string();"), "{src}");
    assert!(src.contains("take(s.clone());\n        take(s);"), "{src}");
    assert!(src.contains("show(s);"), "{src}");
    assert!(!src.contains("mut"), "{src}");
}

#[test]
fn view_text_scrutinee_is_matched_directly() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "pick",
        vec![param("s", Type::view_text())],
        Type::void(),
        vec![switch(
            ident("s"),
            vec![case(Some(text("a")), vec![log("a"), brk()])],
        )],
    ))]));
    assert!(src.contains("match s {"), "{src}");
    assert!(!src.contains("as_str"), "{src}");
    assert!(src.contains("\"a\" => {"), "{src}");
}

#[test]
fn length_of_an_untyped_receiver_is_len() {
    let src = emit(Program::new(vec![Decl::Function(func(
        "count",
        vec![],
        Type::f64(),
        vec![ret(Some(cast(field(call("load", vec![]), "length"), Type::f64())))],
    ))]));
    assert!(src.contains("load().len() as f64"), "{src}");
    assert!(!src.contains(".length"), "{src}");
}
