#![forbid(unsafe_code)]

//! Terse constructors for IR trees. The front-end and the test suites both
//! build programs through these instead of spelling out every struct.

use crate::{
    AggregateTarget, AliasDecl, AssignStmt, BinOp, Block, Decl, EnumDecl, Expr, ExprKind,
    FieldDecl, FieldInit, ForEachStmt, FunctionDecl, IfStmt, ImplBlock, LetStmt, Literal, Param,
    Receiver, ReturnStmt, Span, Stmt, StructDecl, SwitchCase, SwitchStmt, Type, UnaryOp,
    VariantDecl, VariantShape, WhileStmt,
};

pub fn num(n: f64) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Number(n)))
}

pub fn boolean(b: bool) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Bool(b)))
}

pub fn text(s: &str) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Text(s.to_string())))
}

pub fn null() -> Expr {
    Expr::new(ExprKind::Literal(Literal::Null))
}

pub fn ident(name: &str) -> Expr {
    Expr::new(ExprKind::Ident(name.to_string()))
}

pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::new(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
    Expr::new(ExprKind::Unary {
        op,
        expr: Box::new(expr),
    })
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        callee: callee.to_string(),
        args,
    })
}

pub fn method(object: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::MethodCall {
        object: Box::new(object),
        method: name.to_string(),
        namespace: None,
        args,
        object_ty: None,
    })
}

/// `ns.name(args)` with the namespace tag already attached.
pub fn ns_call(ns: &str, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::MethodCall {
        object: Box::new(ident(ns)),
        method: name.to_string(),
        namespace: Some(ns.to_string()),
        args,
        object_ty: None,
    })
}

pub fn field(object: Expr, name: &str) -> Expr {
    Expr::new(ExprKind::Field {
        object: Box::new(object),
        field: name.to_string(),
        object_ty: None,
    })
}

pub fn index(object: Expr, idx: Expr) -> Expr {
    Expr::new(ExprKind::Index {
        object: Box::new(object),
        index: Box::new(idx),
    })
}

pub fn array(items: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Array(items))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Tuple(items))
}

/// Aggregate literal whose target is left for the resolver to fill in.
pub fn aggregate_lit(fields: Vec<(&str, Expr)>) -> Expr {
    Expr::new(ExprKind::Aggregate {
        target: AggregateTarget::Pending,
        fields: field_inits(fields),
    })
}

pub fn named_lit(name: &str, fields: Vec<(&str, Expr)>) -> Expr {
    Expr::new(ExprKind::Aggregate {
        target: AggregateTarget::Named(name.to_string()),
        fields: field_inits(fields),
    })
}

fn field_inits(fields: Vec<(&str, Expr)>) -> Vec<FieldInit> {
    fields
        .into_iter()
        .map(|(name, value)| FieldInit {
            name: name.to_string(),
            value,
        })
        .collect()
}

pub fn variant(enum_name: &str, variant: &str, data: Option<Vec<Expr>>) -> Expr {
    Expr::new(ExprKind::Variant {
        enum_name: enum_name.to_string(),
        variant: variant.to_string(),
        data,
    })
}

pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    Expr::new(ExprKind::Ternary {
        cond: Box::new(cond),
        then_expr: Box::new(then_expr),
        else_expr: Box::new(else_expr),
    })
}

pub fn cast(expr: Expr, ty: Type) -> Expr {
    Expr::new(ExprKind::Cast {
        expr: Box::new(expr),
        ty,
    })
}

pub fn let_(name: &str, ty: Option<Type>, init: Option<Expr>) -> Stmt {
    Stmt::Let(LetStmt {
        span: Span::default(),
        name: name.to_string(),
        ty,
        mutable: false,
        init,
    })
}

pub fn let_mut(name: &str, ty: Option<Type>, init: Option<Expr>) -> Stmt {
    Stmt::Let(LetStmt {
        span: Span::default(),
        name: name.to_string(),
        ty,
        mutable: true,
        init,
    })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign(AssignStmt {
        span: Span::default(),
        target,
        value,
    })
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(ReturnStmt {
        span: Span::default(),
        value,
    })
}

pub fn expr_stmt(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn brk() -> Stmt {
    Stmt::Break(Span::default())
}

pub fn cont() -> Stmt {
    Stmt::Continue(Span::default())
}

pub fn if_(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If(IfStmt {
        span: Span::default(),
        cond,
        then_block: Block::new(then_stmts),
        else_block: else_stmts.map(Block::new),
    })
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While(WhileStmt {
        span: Span::default(),
        cond,
        body: Block::new(body),
    })
}

pub fn for_each(var: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::ForEach(ForEachStmt {
        span: Span::default(),
        var: var.to_string(),
        iterable,
        body: Block::new(body),
    })
}

pub fn switch(scrutinee: Expr, cases: Vec<SwitchCase>) -> Stmt {
    Stmt::Switch(SwitchStmt {
        span: Span::default(),
        scrutinee,
        cases,
    })
}

/// A switch case; the fallthrough flag is derived from the body's last statement.
pub fn case(value: Option<Expr>, body: Vec<Stmt>) -> SwitchCase {
    let mut c = SwitchCase {
        span: Span::default(),
        value,
        body,
        fallthrough: false,
    };
    c.fallthrough = !c.ends_with_jump();
    c
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(Block::new(stmts))
}

pub fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
        mutable: false,
    }
}

pub fn func(name: &str, params: Vec<Param>, ret: Type, body: Vec<Stmt>) -> FunctionDecl {
    FunctionDecl {
        span: Span::default(),
        name: name.to_string(),
        params,
        ret,
        body: Block::new(body),
        public: true,
        receiver: None,
    }
}

pub fn method_decl(
    name: &str,
    receiver: Receiver,
    params: Vec<Param>,
    ret: Type,
    body: Vec<Stmt>,
) -> FunctionDecl {
    FunctionDecl {
        receiver: Some(receiver),
        ..func(name, params, ret, body)
    }
}

pub fn impl_block(target: &str, methods: Vec<FunctionDecl>) -> ImplBlock {
    ImplBlock {
        span: Span::default(),
        target: target.to_string(),
        methods,
    }
}

pub fn struct_decl(name: &str, fields: Vec<(&str, Type)>) -> StructDecl {
    StructDecl {
        span: Span::default(),
        name: name.to_string(),
        fields: field_decls(fields),
        derives: Vec::new(),
    }
}

fn field_decls(fields: Vec<(&str, Type)>) -> Vec<FieldDecl> {
    fields
        .into_iter()
        .map(|(name, ty)| FieldDecl {
            name: name.to_string(),
            ty,
        })
        .collect()
}

pub fn enum_decl(name: &str, variants: Vec<VariantDecl>) -> EnumDecl {
    EnumDecl {
        span: Span::default(),
        name: name.to_string(),
        variants,
        derives: Vec::new(),
    }
}

pub fn unit_variant(name: &str) -> VariantDecl {
    VariantDecl {
        name: name.to_string(),
        shape: VariantShape::Unit,
    }
}

pub fn tuple_variant(name: &str, tys: Vec<Type>) -> VariantDecl {
    VariantDecl {
        name: name.to_string(),
        shape: VariantShape::Tuple(tys),
    }
}

pub fn struct_variant(name: &str, fields: Vec<(&str, Type)>) -> VariantDecl {
    VariantDecl {
        name: name.to_string(),
        shape: VariantShape::Struct(field_decls(fields)),
    }
}

pub fn alias(name: &str, target: Type) -> AliasDecl {
    AliasDecl {
        span: Span::default(),
        name: name.to_string(),
        target,
    }
}

/// Wrap declarations into their `Decl` variant.
pub fn decls(
    structs: Vec<StructDecl>,
    enums: Vec<EnumDecl>,
    functions: Vec<FunctionDecl>,
) -> Vec<Decl> {
    structs
        .into_iter()
        .map(Decl::Struct)
        .chain(enums.into_iter().map(Decl::Enum))
        .chain(functions.into_iter().map(Decl::Function))
        .collect()
}
