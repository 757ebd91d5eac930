#![forbid(unsafe_code)]

use std::collections::HashMap;

use log::debug;
use rivet_ir::{
    AggregateTarget, Block, Decl, Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, Type,
    UnaryOp,
};

use crate::builtins::{self, Namespace};
use crate::error::SemanticError;
use crate::registry::TypeRegistry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Turn unbound identifiers, missing fields and ambiguous builtin
    /// dispatch into errors instead of best-effort guesses.
    pub strict: bool,
}

/// Lexical scopes of one function body. Lookup walks outward.
#[derive(Clone, Debug)]
pub struct Env {
    scopes: Vec<HashMap<String, Type>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            let _ = self.scopes.pop();
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

/// Annotate every expression of `program` and build its registry.
/// Lenient: anything unresolvable is typed void.
pub fn resolve(program: &mut Program) -> TypeRegistry {
    let registry = TypeRegistry::from_program(program);
    let mut resolver = Resolver::new(&registry, ResolveOptions::default());
    resolver.program(program);
    registry
}

pub fn resolve_with(
    program: &mut Program,
    options: &ResolveOptions,
) -> Result<TypeRegistry, SemanticError> {
    let registry = TypeRegistry::from_program(program);
    let mut resolver = Resolver::new(&registry, *options);
    resolver.program(program);
    match resolver.error {
        Some(err) => Err(err),
        None => Ok(registry),
    }
}

/// Best-effort type of `expr`, computed from its children's annotations
/// (or by inferring them when absent). Never mutates anything.
pub fn infer_type(expr: &Expr, env: &Env, registry: &TypeRegistry) -> Type {
    let child = |e: &Expr| -> Type {
        match &e.ty {
            Some(t) => t.clone(),
            None => infer_type(e, env, registry),
        }
    };

    match &expr.kind {
        ExprKind::Literal(lit) => match lit {
            Literal::Number(_) => Type::f64(),
            Literal::Bool(_) => Type::bool(),
            Literal::Text(_) => Type::view_text(),
            Literal::Null => Type::optional(Type::void()),
        },
        ExprKind::Ident(name) => {
            if let Some(t) = env.lookup(name) {
                return t.clone();
            }
            if let Some(sig) = registry.function(name) {
                return Type::Function {
                    params: sig.params.clone(),
                    ret: Box::new(sig.ret.clone()),
                };
            }
            Type::void()
        }
        ExprKind::Unary { op, expr } => match op {
            UnaryOp::Not => Type::bool(),
            UnaryOp::Neg => child(expr),
        },
        ExprKind::Binary { op, left, right } => {
            if op.is_comparison() || op.is_logical() {
                return Type::bool();
            }
            let lt = child(left);
            if matches!(op, rivet_ir::BinOp::Add)
                && (lt.strip_refs().is_text() || child(right).strip_refs().is_text())
            {
                return Type::owned_text();
            }
            lt
        }
        ExprKind::Call { callee, .. } => registry
            .function(callee)
            .map(|sig| registry.normalize(&sig.ret))
            .unwrap_or_else(Type::void),
        ExprKind::MethodCall {
            object,
            method,
            namespace,
            args,
            ..
        } => {
            let arg_tys = args.iter().map(|a| child(a)).collect::<Vec<_>>();
            let ns = builtins::namespace_of(namespace.as_deref(), object, |n| env.is_local(n));
            if let Some(ns) = ns {
                return builtins::dispatch(Some(ns), None, method)
                    .map(|d| d.rule.result.resolve(None, &arg_tys))
                    .unwrap_or_else(Type::void);
            }
            if let Some(name) = object.as_ident()
                && registry.is_enum(name)
                && !env.is_local(name)
            {
                return Type::enumeration(name);
            }
            let recv = registry.normalize(&child(object));
            if let Some(d) = builtins::dispatch(None, Some(&recv), method) {
                return d.rule.result.resolve(Some(&recv), &arg_tys);
            }
            recv.nominal_name()
                .and_then(|n| registry.method(n, method))
                .map(|sig| registry.normalize(&sig.ret))
                .unwrap_or_else(Type::void)
        }
        ExprKind::Index { object, index } => {
            let obj = registry.normalize(&child(object));
            match obj.strip_refs() {
                t if t.is_text() => Type::owned_text(),
                Type::Sequence(elem) => (**elem).clone(),
                Type::Tuple(elems) => match &index.kind {
                    ExprKind::Literal(Literal::Number(n)) if index.is_integer_literal() => elems
                        .get(*n as usize)
                        .cloned()
                        .unwrap_or_else(Type::void),
                    _ => Type::void(),
                },
                _ => Type::void(),
            }
        }
        ExprKind::Field { object, field, .. } => {
            if let Some(ns) = builtins::namespace_of(None, object, |n| env.is_local(n)) {
                return builtins::constant(ns, field)
                    .map(|c| c.result.resolve(None, &[]))
                    .unwrap_or_else(Type::void);
            }
            if let Some(name) = object.as_ident()
                && registry.is_enum(name)
                && !env.is_local(name)
            {
                return Type::enumeration(name);
            }
            let obj = registry.normalize(&child(object));
            let obj = obj.strip_refs();
            if field == "length" && (obj.is_sequence() || obj.is_text() || obj.is_void()) {
                return Type::usize();
            }
            match obj {
                Type::Aggregate(n) => registry
                    .field_type(n, field)
                    .map(|t| registry.normalize(t))
                    .unwrap_or_else(Type::void),
                _ => Type::void(),
            }
        }
        ExprKind::Array(items) => {
            Type::sequence(items.first().map(|e| child(e)).unwrap_or_else(Type::void))
        }
        ExprKind::Aggregate { target, .. } => match target {
            AggregateTarget::Named(n) => Type::aggregate(n.clone()),
            AggregateTarget::Pending => Type::void(),
        },
        ExprKind::Tuple(items) => Type::Tuple(items.iter().map(|e| child(e)).collect()),
        ExprKind::Variant { enum_name, .. } => Type::enumeration(enum_name.clone()),
        ExprKind::Ternary { then_expr, .. } => child(then_expr),
        ExprKind::Cast { ty, .. } => registry.normalize(ty),
    }
}

struct Resolver<'r> {
    registry: &'r TypeRegistry,
    options: ResolveOptions,
    env: Env,
    ret_ty: Type,
    error: Option<SemanticError>,
}

impl<'r> Resolver<'r> {
    fn new(registry: &'r TypeRegistry, options: ResolveOptions) -> Self {
        Self {
            registry,
            options,
            env: Env::new(),
            ret_ty: Type::void(),
            error: None,
        }
    }

    fn program(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            match decl {
                Decl::Function(f) => self.function(f, None),
                Decl::Impl(block) => {
                    let target = block.target.clone();
                    for m in &mut block.methods {
                        self.function(m, Some(&target));
                    }
                }
                Decl::Struct(_) | Decl::Enum(_) | Decl::Alias(_) => {}
            }
        }
    }

    fn report(&mut self, err: SemanticError) {
        if self.options.strict && self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn function(&mut self, f: &mut FunctionDecl, owner: Option<&str>) {
        self.env = Env::new();
        if let Some(owner) = owner {
            self.env.declare("this", Type::aggregate(owner));
        }
        for p in &f.params {
            let ty = self.registry.normalize(&p.ty);
            self.env.declare(p.name.clone(), ty);
        }
        self.ret_ty = self.registry.normalize(&f.ret);

        let tail_allowed = !self.ret_ty.is_void();
        let n = f.body.stmts.len();
        for (i, stmt) in f.body.stmts.iter_mut().enumerate() {
            self.stmt(stmt, tail_allowed && i + 1 == n);
        }
    }

    fn block(&mut self, block: &mut Block) {
        self.stmts(&mut block.stmts);
    }

    fn stmts(&mut self, stmts: &mut [Stmt]) {
        self.env.push_scope();
        for s in stmts {
            self.stmt(s, false);
        }
        self.env.pop_scope();
    }

    fn stmt(&mut self, stmt: &mut Stmt, is_tail: bool) {
        match stmt {
            Stmt::Let(l) => {
                let declared = l.ty.as_ref().map(|t| self.registry.normalize(t));
                if let Some(init) = &mut l.init {
                    self.expr(init, declared.as_ref());
                }
                let ty = declared
                    .or_else(|| l.init.as_ref().and_then(|e| e.ty.clone()))
                    .unwrap_or_else(Type::void);
                self.env.declare(l.name.clone(), ty);
            }
            Stmt::Assign(a) => {
                self.expr(&mut a.target, None);
                let target_ty = a.target.ty.clone();
                self.expr(&mut a.value, target_ty.as_ref());
            }
            Stmt::Return(r) => {
                if let Some(v) = &mut r.value {
                    let ret = self.ret_ty.clone();
                    self.expr(v, Some(&ret));
                }
            }
            Stmt::If(i) => {
                self.expr(&mut i.cond, None);
                self.block(&mut i.then_block);
                if let Some(e) = &mut i.else_block {
                    self.block(e);
                }
            }
            Stmt::While(w) => {
                self.expr(&mut w.cond, None);
                self.block(&mut w.body);
            }
            Stmt::ForEach(f) => {
                self.expr(&mut f.iterable, None);
                let iter_ty = f.iterable.ty.clone().unwrap_or_else(Type::void);
                let var_ty = match iter_ty.strip_refs() {
                    Type::Sequence(elem) => (**elem).clone(),
                    t if t.is_text() => Type::owned_text(),
                    _ => Type::void(),
                };
                self.env.push_scope();
                self.env.declare(f.var.clone(), var_ty);
                self.block(&mut f.body);
                self.env.pop_scope();
            }
            Stmt::Switch(s) => {
                self.expr(&mut s.scrutinee, None);
                let scrutinee_ty = s.scrutinee.ty.clone();
                for case in &mut s.cases {
                    if let Some(v) = &mut case.value {
                        self.expr(v, scrutinee_ty.as_ref());
                    }
                    self.stmts(&mut case.body);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Expr(e) => {
                let ret = self.ret_ty.clone();
                self.expr(e, is_tail.then_some(&ret));
            }
            Stmt::Block(b) => self.block(b),
        }
    }

    fn expr(&mut self, expr: &mut Expr, expected: Option<&Type>) {
        self.rewrite_variant(expr);
        self.retarget_literal(expr, expected);

        let registry = self.registry;
        match &mut expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ident(name) => {
                if !self.env.is_local(name) && registry.function(name).is_none() {
                    let msg = format!("unbound identifier `{name}`");
                    self.report(SemanticError::new(msg, expr.span));
                }
            }
            ExprKind::Unary { expr: inner, .. } => self.expr(inner, None),
            ExprKind::Binary { left, right, .. } => {
                self.expr(left, None);
                self.expr(right, None);
            }
            ExprKind::Call { callee, args } => {
                let params = registry
                    .function(callee)
                    .map(|sig| sig.params.clone())
                    .unwrap_or_default();
                self.args(args, &params);
            }
            ExprKind::MethodCall {
                object,
                method,
                namespace,
                args,
                object_ty,
            } => {
                let env = &self.env;
                if let Some(ns) =
                    builtins::namespace_of(namespace.as_deref(), object, |n| env.is_local(n))
                {
                    *namespace = Some(ns.ident().to_string());
                    if builtins::dispatch(Some(ns), None, method).is_none() {
                        debug!("no `{}` member named `{method}`", ns.ident());
                    }
                    self.args(args, &[]);
                } else {
                    self.expr(object, None);
                    let recv = registry.normalize(object.ty.as_ref().unwrap_or(&Type::void()));
                    *object_ty = Some(recv.clone());
                    let params = match builtins::dispatch(None, Some(&recv), method) {
                        Some(d) => {
                            debug!(
                                "`.{method}()` on {} dispatched to {:?}{}",
                                recv.display(),
                                d.table,
                                if d.ambiguous { " (ambiguous)" } else { "" }
                            );
                            if d.ambiguous {
                                let msg = format!(
                                    "cannot tell whether `.{method}()` is a sequence or a text method"
                                );
                                self.report(SemanticError::new(msg, expr.span));
                            }
                            match (d.rule.element_args, recv.element()) {
                                (true, Some(elem)) => vec![elem.clone(); args.len()],
                                _ => Vec::new(),
                            }
                        }
                        None => recv
                            .nominal_name()
                            .and_then(|n| registry.method(n, method))
                            .map(|sig| sig.params.clone())
                            .unwrap_or_default(),
                    };
                    self.args(args, &params);
                }
            }
            ExprKind::Index { object, index } => {
                self.expr(object, None);
                self.expr(index, None);
            }
            ExprKind::Field {
                object,
                field,
                object_ty,
            } => {
                let env = &self.env;
                let is_constant = builtins::namespace_of(None, object, |n| env.is_local(n))
                    .is_some_and(|ns: Namespace| builtins::constant(ns, field).is_some());
                if !is_constant {
                    self.expr(object, None);
                    let obj = registry.normalize(object.ty.as_ref().unwrap_or(&Type::void()));
                    if let Type::Aggregate(n) = obj.strip_refs()
                        && registry.field_type(n, field).is_none()
                    {
                        let msg = format!("`{n}` has no field `{field}`");
                        self.report(SemanticError::new(msg, expr.span));
                    }
                    *object_ty = Some(obj);
                }
            }
            ExprKind::Array(items) => {
                let elem = expected.and_then(|t| t.element()).cloned();
                for item in items {
                    self.expr(item, elem.as_ref());
                }
            }
            ExprKind::Aggregate { target, fields } => {
                let name = match target {
                    AggregateTarget::Named(n) => Some(n.clone()),
                    AggregateTarget::Pending => None,
                };
                for f in fields {
                    let fty = name
                        .as_deref()
                        .and_then(|n| registry.field_type(n, &f.name))
                        .map(|t| registry.normalize(t));
                    self.expr(&mut f.value, fty.as_ref());
                }
            }
            ExprKind::Tuple(items) => {
                let elems = match expected {
                    Some(Type::Tuple(tys)) => tys.clone(),
                    _ => Vec::new(),
                };
                for (i, item) in items.iter_mut().enumerate() {
                    self.expr(item, elems.get(i));
                }
            }
            ExprKind::Variant {
                enum_name,
                variant,
                data,
            } => {
                let payload: Vec<Type> = registry
                    .variant_payload(enum_name, variant)
                    .map(|tys| tys.into_iter().map(|t| registry.normalize(t)).collect())
                    .unwrap_or_default();
                if let Some(items) = data {
                    self.args(items, &payload);
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.expr(cond, None);
                self.expr(then_expr, expected);
                self.expr(else_expr, expected);
            }
            ExprKind::Cast { expr: inner, .. } => self.expr(inner, None),
        }

        let inferred = infer_type(expr, &self.env, registry);
        expr.ty = Some(match (inferred, expected) {
            (Type::Sequence(e), Some(exp @ Type::Sequence(_))) if e.is_void() => exp.clone(),
            (Type::Optional(e), Some(exp @ Type::Optional(_))) if e.is_void() => exp.clone(),
            (t, _) => t,
        });
    }

    fn args(&mut self, args: &mut [Expr], params: &[Type]) {
        for (i, a) in args.iter_mut().enumerate() {
            let p = params.get(i).map(|t| self.registry.normalize(t));
            self.expr(a, p.as_ref());
        }
    }

    /// `Enum.Variant` and `Enum.Variant(args)` become variant nodes, unless a
    /// local shadows the enum name.
    fn rewrite_variant(&self, expr: &mut Expr) {
        let names_enum = match &expr.kind {
            ExprKind::Field { object, .. }
            | ExprKind::MethodCall {
                object,
                namespace: None,
                ..
            } => object
                .as_ident()
                .is_some_and(|n| self.registry.is_enum(n) && !self.env.is_local(n)),
            _ => false,
        };
        if !names_enum {
            return;
        }

        let old = std::mem::replace(&mut expr.kind, ExprKind::Tuple(Vec::new()));
        expr.kind = match old {
            ExprKind::Field { object, field, .. } => ExprKind::Variant {
                enum_name: ident_name(*object),
                variant: field,
                data: None,
            },
            ExprKind::MethodCall {
                object,
                method,
                args,
                ..
            } => ExprKind::Variant {
                enum_name: ident_name(*object),
                variant: method,
                data: Some(args),
            },
            other => other,
        };
    }

    fn retarget_literal(&self, expr: &mut Expr, expected: Option<&Type>) {
        let ExprKind::Aggregate { target, .. } = &mut expr.kind else {
            return;
        };
        if *target != AggregateTarget::Pending {
            return;
        }
        let governing = expected.map(|t| match t.strip_refs() {
            Type::Optional(inner) => inner.strip_refs(),
            other => other,
        });
        if let Some(Type::Aggregate(name)) = governing
            && self.registry.is_struct(name)
        {
            debug!("aggregate literal retargeted to `{name}`");
            *target = AggregateTarget::Named(name.clone());
        }
    }
}

fn ident_name(e: Expr) -> String {
    match e.kind {
        ExprKind::Ident(n) => n,
        _ => String::new(),
    }
}
