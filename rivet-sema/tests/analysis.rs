use rivet_ir::build::*;
use rivet_ir::{BinOp, Decl, Program, Stmt, Type};
use rivet_sema::{
    CopySet, DEFAULT_MAX_ITERATIONS, analyze_function, builtins, compute_copy_closure, resolve,
};

fn inventory() -> Program {
    Program::new(vec![
        Decl::Struct(struct_decl("Point", vec![("x", Type::f64()), ("y", Type::f64())])),
        Decl::Struct(struct_decl(
            "Item",
            vec![("name", Type::owned_text()), ("at", Type::aggregate("Point"))],
        )),
        Decl::Function(func(
            "describe",
            vec![param("item", Type::aggregate("Item"))],
            Type::owned_text(),
            vec![
                let_("label", None, Some(field(ident("item"), "name"))),
                expr_stmt(ns_call("console", "log", vec![ident("label")])),
                ret(Some(binary(BinOp::Add, ident("label"), text("!")))),
            ],
        )),
    ])
}

#[test]
fn resolve_then_close_then_analyze() {
    let mut program = inventory();
    let registry = resolve(&mut program);
    let outcome = compute_copy_closure(&mut program, DEFAULT_MAX_ITERATIONS);

    assert!(outcome.is_copyable("Point"));
    assert!(!outcome.is_copyable("Item"));

    let copy = CopySet::from_program(&program, &registry);
    let Some(Decl::Function(describe)) = program.decls.last() else {
        panic!("describe missing");
    };
    let report = analyze_function(describe, &copy);

    let label = report.usage("label").expect("label");
    assert_eq!(label.ty, Type::owned_text());
    assert_eq!(label.reads, 2);
    assert!(report.needs_duplication("label"));
    assert!(report.can_borrow("item"));
}

#[test]
fn typed_sequence_receiver_never_picks_text_rule() {
    let seq = Type::sequence(Type::owned_text());
    for name in ["includes", "indexOf", "slice", "concat"] {
        let d = builtins::dispatch(None, Some(&seq), name).expect("known method");
        assert_eq!(d.table, builtins::Table::Sequence);
    }
}

#[test]
fn resolver_annotates_every_expression() {
    let mut program = inventory();
    resolve(&mut program);
    let Some(Decl::Function(describe)) = program.decls.last() else {
        panic!("describe missing");
    };
    let Stmt::Return(r) = &describe.body.stmts[2] else {
        panic!("expected return");
    };
    assert_eq!(r.value.as_ref().and_then(|e| e.ty.clone()), Some(Type::owned_text()));
}
