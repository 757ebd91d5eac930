use rivet::{TranslateError, TranslateOptions, translate};
use rivet_ir::build::*;
use rivet_ir::{BinOp, Decl, Program, Type};

fn point_and_name() -> Program {
    Program::new(vec![
        Decl::Struct(struct_decl("Point", vec![("x", Type::f64()), ("y", Type::f64())])),
        Decl::Struct(struct_decl("Name", vec![("value", Type::owned_text())])),
        Decl::Function(func(
            "origin",
            vec![],
            Type::aggregate("Point"),
            vec![ret(Some(aggregate_lit(vec![("x", num(0.0)), ("y", num(0.5))])))],
        )),
    ])
}

#[test]
fn plain_data_becomes_copy_and_text_does_not() {
    let t = translate(point_and_name(), &TranslateOptions::default()).expect("translate");
    assert!(t.outcome.is_copyable("Point"));
    assert!(!t.outcome.is_copyable("Name"));
    assert!(t.outcome.converged);
    assert!(t.warnings.is_empty(), "{:?}", t.warnings);
    assert!(t.source.contains("Point { x: 0, y: 0.5 }"), "{}", t.source);
}

#[test]
fn tail_return_of_owned_parameter() {
    let program = Program::new(vec![Decl::Function(func(
        "bump",
        vec![param("x", Type::owned_text())],
        Type::owned_text(),
        vec![ret(Some(binary(BinOp::Add, ident("x"), num(1.0))))],
    ))]);
    let t = translate(program, &TranslateOptions::default()).expect("translate");
    assert!(t.source.contains("-> String {\n    format!(\"{}{}\", x, 1)\n}"), "{}", t.source);
}

#[test]
fn fallthrough_cases_lower_to_separate_arms() {
    let say = |s: &str| expr_stmt(ns_call("console", "log", vec![text(s)]));
    let program = Program::new(vec![Decl::Function(func(
        "main",
        vec![],
        Type::void(),
        vec![
            let_("n", Some(Type::f64()), Some(num(2.0))),
            switch(
                ident("n"),
                vec![
                    case(Some(num(1.0)), vec![say("a"), brk()]),
                    case(Some(num(2.0)), vec![say("b")]),
                    case(Some(num(3.0)), vec![say("c"), brk()]),
                ],
            ),
        ],
    ))]);
    let t = translate(program, &TranslateOptions::default()).expect("translate");
    assert_eq!(t.source.matches(" => {\n").count(), 3, "{}", t.source);
    assert!(!t.source.contains("println!(\"{}\", \"b\");\n            println!"), "{}", t.source);
}

#[test]
fn header_is_written_as_comments() {
    let opts = TranslateOptions {
        header: Some("generated".to_string()),
        ..TranslateOptions::default()
    };
    let t = translate(point_and_name(), &opts).expect("translate");
    assert!(t.source.starts_with("// generated\n\n#[derive("), "{}", t.source);
}

#[test]
fn value_cycles_are_flagged_not_fixed() {
    let program = Program::new(vec![
        Decl::Struct(struct_decl("A", vec![("b", Type::aggregate("B"))])),
        Decl::Struct(struct_decl("B", vec![("a", Type::aggregate("A"))])),
    ]);
    let t = translate(program, &TranslateOptions::default()).expect("translate");
    assert!(!t.outcome.is_copyable("A"));
    assert!(!t.outcome.is_copyable("B"));
    assert!(
        t.warnings.iter().any(|w| w.code == "rivet::derive::value_cycle"),
        "{:?}",
        t.warnings
    );
    assert!(t.source.contains("pub b: B,"));
}

#[test]
fn exhausted_fixpoint_cap_is_a_warning() {
    let program = Program::new(vec![
        Decl::Struct(struct_decl("Outer", vec![("inner", Type::aggregate("Inner"))])),
        Decl::Struct(struct_decl("Inner", vec![("v", Type::f64())])),
    ]);
    let opts = TranslateOptions {
        max_fixpoint_iterations: 1,
        ..TranslateOptions::default()
    };
    let t = translate(program, &opts).expect("translate");
    assert!(!t.outcome.converged);
    assert!(t.warnings.iter().any(|w| w.code == "rivet::derive::no_fixpoint"));
}

#[test]
fn untyped_aggregate_literal_fails_emission() {
    let program = Program::new(vec![Decl::Function(func(
        "main",
        vec![],
        Type::void(),
        vec![let_("p", None, Some(aggregate_lit(vec![("x", num(1.0))])))],
    ))]);
    let err = translate(program, &TranslateOptions::default()).expect_err("pending literal");
    assert!(matches!(err, TranslateError::Backend(_)));
}

#[test]
fn programs_arrive_as_json() {
    let json = serde_json::to_string(&point_and_name()).expect("serialize");
    let program: Program = serde_json::from_str(&json).expect("deserialize");
    let t = translate(program, &TranslateOptions::default()).expect("translate");
    assert!(t.source.contains("pub fn origin() -> Point {"));
}

#[test]
fn settling_on_the_last_pass_is_not_a_warning() {
    let program = Program::new(vec![Decl::Struct(struct_decl(
        "Point",
        vec![("x", Type::f64()), ("y", Type::f64())],
    ))]);
    let opts = TranslateOptions {
        max_fixpoint_iterations: 1,
        ..TranslateOptions::default()
    };
    let t = translate(program, &opts).expect("translate");
    assert!(t.outcome.converged);
    assert!(t.outcome.is_copyable("Point"));
    assert!(t.warnings.is_empty(), "{:?}", t.warnings);
}

#[test]
fn copyable_parameters_get_no_reference_hint() {
    let program = Program::new(vec![
        Decl::Struct(struct_decl("Point", vec![("x", Type::f64())])),
        Decl::Struct(struct_decl("Name", vec![("value", Type::owned_text())])),
        Decl::Function(func(
            "plot",
            vec![param("p", Type::aggregate("Point")), param("n", Type::aggregate("Name"))],
            Type::void(),
            vec![expr_stmt(call("draw", vec![ident("p"), ident("n")]))],
        )),
    ]);
    let t = translate(program, &TranslateOptions::default()).expect("translate");
    let hinted: Vec<_> = t.suggestions.iter().map(|s| s.variable.as_str()).collect();
    assert_eq!(hinted, vec!["n"]);
}
