#![forbid(unsafe_code)]

use log::{debug, warn};
use miette::Diagnostic;
use rivet_ir::{
    AggregateTarget, BinOp, Block, EnumDecl, Expr, ExprKind, FieldInit, FunctionDecl, IfStmt,
    ImplBlock, Literal, Primitive, Program, Receiver, Span, Stmt, StructDecl, SwitchStmt, Type,
    UnaryOp, VariantShape,
};
use rivet_sema::builtins::{self, Dispatch};
use rivet_sema::{
    CopySet, ReadPosition, Scopes, TypeRegistry, UsageReport, analyze_function, signature_scopes,
};
use thiserror::Error;

use crate::naming::{type_name, value_name};

#[derive(Debug, Error, Diagnostic)]
#[error("Rust backend error: {message}")]
#[diagnostic(code(rivet::backend_rs))]
#[allow(unused_assignments)]
pub struct RustBackendError {
    pub message: String,
    #[label]
    pub span: Option<miette::SourceSpan>,
}

impl RustBackendError {
    fn at(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span.into()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Written as `//` comment lines at the top of the output.
    pub header: Option<String>,
}

const BASE_DERIVES: [&str; 3] = ["Debug", "Clone", "PartialEq"];

/// Where a type is written. View text needs a lifetime outside locals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TypeSite {
    Field,
    Return,
    Local,
}

/// Render a resolved, derive-closed program as one Rust source file.
///
/// Declarations come out as aggregates, enums, aliases, method blocks and
/// functions, in that order.
pub fn emit_program(
    program: &Program,
    registry: &TypeRegistry,
    options: &EmitOptions,
) -> Result<String, RustBackendError> {
    let copy = CopySet::from_program(program, registry);

    let mut items = Vec::new();
    for s in program.structs() {
        items.push(emit_struct(s));
    }
    for e in program.enums() {
        items.push(emit_enum(e));
    }
    for a in program.aliases() {
        items.push(format!(
            "pub type {} = {};\n",
            type_name(&a.name),
            rust_type(&a.target, TypeSite::Field)
        ));
    }
    for block in program.impls() {
        items.push(emit_impl(block, registry, &copy)?);
    }
    let mut fallthrough = 0;
    for f in program.functions() {
        let (code, n) = emit_function(f, registry, &copy, 0)?;
        fallthrough += n;
        items.push(code);
    }
    debug!(
        "emitted {} items ({} switch cases fall through)",
        items.len(),
        fallthrough
    );

    let mut out = String::new();
    if let Some(header) = &options.header {
        for line in header.lines() {
            out.push_str("// ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(&items.join("\n"));
    Ok(out)
}

/// Integer values print without a decimal point; everything else keeps one.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "f64::NAN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "f64::INFINITY" } else { "f64::NEG_INFINITY" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{n}")
}

fn rust_type(ty: &Type, site: TypeSite) -> String {
    match ty {
        Type::Primitive(p) => match p {
            Primitive::I8 => "i8".to_string(),
            Primitive::I16 => "i16".to_string(),
            Primitive::I32 => "i32".to_string(),
            Primitive::I64 => "i64".to_string(),
            Primitive::U8 => "u8".to_string(),
            Primitive::U16 => "u16".to_string(),
            Primitive::U32 => "u32".to_string(),
            Primitive::U64 => "u64".to_string(),
            Primitive::Usize => "usize".to_string(),
            Primitive::F32 => "f32".to_string(),
            Primitive::F64 => "f64".to_string(),
            Primitive::Bool => "bool".to_string(),
            Primitive::Void => "()".to_string(),
            Primitive::OwnedText => "String".to_string(),
            Primitive::ViewText => match site {
                TypeSite::Field | TypeSite::Return => "&'static str".to_string(),
                TypeSite::Local => "&str".to_string(),
            },
        },
        Type::Sequence(elem) => format!("Vec<{}>", rust_type(elem, site)),
        Type::Aggregate(n) | Type::Enum(n) => type_name(n),
        Type::Tuple(elems) => match elems.as_slice() {
            [one] => format!("({},)", rust_type(one, site)),
            _ => {
                let parts = elems.iter().map(|t| rust_type(t, site)).collect::<Vec<_>>();
                format!("({})", parts.join(", "))
            }
        },
        Type::Optional(inner) => format!("Option<{}>", rust_type(inner, site)),
        Type::Reference { inner, mutable } => {
            let m = if *mutable { "mut " } else { "" };
            format!("&{m}{}", rust_type(inner, site))
        }
        Type::Function { params, ret } => {
            let parts = params
                .iter()
                .map(|t| rust_type(t, TypeSite::Local))
                .collect::<Vec<_>>();
            if ret.is_void() {
                format!("fn({})", parts.join(", "))
            } else {
                format!(
                    "fn({}) -> {}",
                    parts.join(", "),
                    rust_type(ret, TypeSite::Return)
                )
            }
        }
    }
}

fn derive_attr(tags: &[String]) -> String {
    let mut all: Vec<&str> = BASE_DERIVES.to_vec();
    for t in tags {
        if !all.contains(&t.as_str()) {
            all.push(t);
        }
    }
    // `Clone` is in the baseline, so a `Copy` tag always lands after it.
    format!("#[derive({})]\n", all.join(", "))
}

fn emit_struct(s: &StructDecl) -> String {
    let mut out = derive_attr(&s.derives);
    if s.fields.is_empty() {
        out.push_str(&format!("pub struct {} {{}}\n", type_name(&s.name)));
        return out;
    }
    out.push_str(&format!("pub struct {} {{\n", type_name(&s.name)));
    for f in &s.fields {
        out.push_str(&format!(
            "    pub {}: {},\n",
            value_name(&f.name),
            rust_type(&f.ty, TypeSite::Field)
        ));
    }
    out.push_str("}\n");
    out
}

fn emit_enum(e: &EnumDecl) -> String {
    let mut out = derive_attr(&e.derives);
    out.push_str(&format!("pub enum {} {{\n", type_name(&e.name)));
    for v in &e.variants {
        let name = type_name(&v.name);
        match &v.shape {
            VariantShape::Unit => out.push_str(&format!("    {name},\n")),
            VariantShape::Tuple(tys) if tys.is_empty() => out.push_str(&format!("    {name},\n")),
            VariantShape::Tuple(tys) => {
                let parts = tys
                    .iter()
                    .map(|t| rust_type(t, TypeSite::Field))
                    .collect::<Vec<_>>();
                out.push_str(&format!("    {name}({}),\n", parts.join(", ")));
            }
            VariantShape::Struct(fields) if fields.is_empty() => {
                out.push_str(&format!("    {name},\n"))
            }
            VariantShape::Struct(fields) => {
                let parts = fields
                    .iter()
                    .map(|f| {
                        format!(
                            "{}: {}",
                            value_name(&f.name),
                            rust_type(&f.ty, TypeSite::Field)
                        )
                    })
                    .collect::<Vec<_>>();
                out.push_str(&format!("    {name} {{ {} }},\n", parts.join(", ")));
            }
        }
    }
    out.push_str("}\n");
    out
}

fn emit_impl(
    block: &ImplBlock,
    registry: &TypeRegistry,
    copy: &CopySet<'_>,
) -> Result<String, RustBackendError> {
    let mut out = format!("impl {} {{\n", type_name(&block.target));
    for (i, m) in block.methods.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let (code, _) = emit_function(m, registry, copy, 1)?;
        out.push_str(&code);
    }
    out.push_str("}\n");
    Ok(out)
}

/// Returns the rendered function and the number of switch cases in it that
/// fall through.
fn emit_function(
    f: &FunctionDecl,
    registry: &TypeRegistry,
    copy: &CopySet<'_>,
    indent: usize,
) -> Result<(String, usize), RustBackendError> {
    let usage = analyze_function(f, copy);
    let remaining = usage.bindings.iter().map(|u| u.reads).collect();
    let first_param = usize::from(f.receiver.is_some());
    let ret_ty = registry.normalize(&f.ret);

    let mut params = Vec::new();
    if let Some(recv) = f.receiver {
        params.push(
            match recv {
                Receiver::Ref => "&self",
                Receiver::Mut => "&mut self",
                Receiver::Value if usage.binding_needs_mut(0) => "mut self",
                Receiver::Value => "self",
            }
            .to_string(),
        );
    }
    for (i, p) in f.params.iter().enumerate() {
        let m = if p.mutable || usage.binding_needs_mut(first_param + i) {
            "mut "
        } else {
            ""
        };
        params.push(format!(
            "{m}{}: {}",
            value_name(&p.name),
            rust_type(&p.ty, TypeSite::Local)
        ));
    }

    let vis = if f.public && f.name != "main" { "pub " } else { "" };
    let ret = if ret_ty.is_void() {
        String::new()
    } else {
        format!(" -> {}", rust_type(&f.ret, TypeSite::Return))
    };

    let mut em = FnEmitter {
        registry,
        copy,
        usage,
        scopes: signature_scopes(f),
        remaining,
        ret_ty,
        out: String::new(),
        indent,
        fallthrough: 0,
    };
    em.line(&format!(
        "{vis}fn {}({}){ret} {{",
        value_name(&f.name),
        params.join(", ")
    ));
    em.indent += 1;
    em.function_body(&f.body.stmts)?;
    em.indent -= 1;
    em.line("}");
    Ok((em.out, em.fallthrough))
}

struct FnEmitter<'a> {
    registry: &'a TypeRegistry,
    copy: &'a CopySet<'a>,
    usage: UsageReport,
    /// Numbers bindings the same way the usage walk did.
    scopes: Scopes,
    /// Reads of each binding not yet emitted.
    remaining: Vec<usize>,
    ret_ty: Type,
    out: String,
    indent: usize,
    fallthrough: usize,
}

impl FnEmitter<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn function_body(&mut self, stmts: &[Stmt]) -> Result<(), RustBackendError> {
        let has_value = !self.ret_ty.is_void();
        for (i, s) in stmts.iter().enumerate() {
            if has_value
                && i + 1 == stmts.len()
                && let Some(code) = self.tail(s)?
            {
                self.line(&code);
                continue;
            }
            self.stmt(s)?;
        }
        Ok(())
    }

    /// The final `return e;` or expression statement, rendered as a bare
    /// expression. Statement-position builtins are left alone.
    fn tail(&mut self, s: &Stmt) -> Result<Option<String>, RustBackendError> {
        let ret = self.ret_ty.clone();
        match s {
            Stmt::Return(r) => match &r.value {
                Some(v) => Ok(Some(self.value(v, Some(&ret))?)),
                None => Ok(None),
            },
            Stmt::Expr(e) if !self.is_statement_builtin(e) => Ok(Some(self.value(e, Some(&ret))?)),
            _ => Ok(None),
        }
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<(), RustBackendError> {
        self.indent += 1;
        self.scopes.push();
        for s in stmts {
            self.stmt(s)?;
        }
        self.scopes.pop();
        self.indent -= 1;
        Ok(())
    }

    fn stmt(&mut self, s: &Stmt) -> Result<(), RustBackendError> {
        match s {
            Stmt::Let(l) => {
                let init = match &l.init {
                    Some(e) => Some(self.value(e, l.ty.as_ref())?),
                    None => None,
                };
                let id = self.scopes.declare(&l.name);
                let m = if l.mutable || self.usage.binding_needs_mut(id) {
                    "mut "
                } else {
                    ""
                };
                let ann = l
                    .ty
                    .as_ref()
                    .map(|t| format!(": {}", rust_type(t, TypeSite::Local)))
                    .unwrap_or_default();
                let name = value_name(&l.name);
                match init {
                    Some(code) => self.line(&format!("let {m}{name}{ann} = {code};")),
                    None => self.line(&format!("let {m}{name}{ann};")),
                }
            }
            Stmt::Assign(a) => {
                let target = match &a.target.kind {
                    ExprKind::Ident(n) => value_name(n),
                    _ => self.expr(&a.target, ReadPosition::Borrow)?,
                };
                let value = self.value(&a.value, a.target.ty.as_ref())?;
                self.line(&format!("{target} = {value};"));
            }
            Stmt::Return(r) => match &r.value {
                Some(v) => {
                    let ret = self.ret_ty.clone();
                    let code = self.value(v, Some(&ret))?;
                    self.line(&format!("return {code};"));
                }
                None => self.line("return;"),
            },
            Stmt::If(i) => self.if_chain(i)?,
            Stmt::While(w) => {
                let cond = self.expr(&w.cond, ReadPosition::Borrow)?;
                self.line(&format!("while {cond} {{"));
                self.block(&w.body.stmts)?;
                self.line("}");
            }
            Stmt::ForEach(f) => {
                let iter = self.expr(&f.iterable, ReadPosition::Borrow)?;
                let iter = receiver(iter, &f.iterable);
                let ty = f
                    .iterable
                    .ty
                    .as_ref()
                    .map(|t| self.registry.normalize(t))
                    .unwrap_or_else(Type::void);
                let source = match ty.strip_refs() {
                    Type::Sequence(elem) if self.copy.is_duplicable(elem) => {
                        format!("{iter}.iter().copied()")
                    }
                    Type::Sequence(_) => format!("{iter}.iter().cloned()"),
                    t if t.is_text() => format!("{iter}.chars().map(|c| c.to_string())"),
                    _ => iter,
                };
                self.scopes.push();
                let id = self.scopes.declare(&f.var);
                let m = if self.usage.binding_needs_mut(id) { "mut " } else { "" };
                self.line(&format!("for {m}{} in {source} {{", value_name(&f.var)));
                self.block(&f.body.stmts)?;
                self.scopes.pop();
                self.line("}");
            }
            Stmt::Switch(sw) => self.switch(sw)?,
            Stmt::Break(_) => self.line("break;"),
            Stmt::Continue(_) => self.line("continue;"),
            Stmt::Expr(e) => {
                let code = self.expr(e, ReadPosition::Value)?;
                self.line(&format!("{code};"));
            }
            Stmt::Block(b) => self.nested_block(b)?,
        }
        Ok(())
    }

    fn nested_block(&mut self, b: &Block) -> Result<(), RustBackendError> {
        self.line("{");
        self.block(&b.stmts)?;
        self.line("}");
        Ok(())
    }

    fn if_chain(&mut self, first: &IfStmt) -> Result<(), RustBackendError> {
        let cond = self.expr(&first.cond, ReadPosition::Borrow)?;
        self.line(&format!("if {cond} {{"));
        self.block(&first.then_block.stmts)?;

        let mut current = first;
        loop {
            match &current.else_block {
                None => break,
                Some(b) => match b.stmts.as_slice() {
                    [Stmt::If(next)] => {
                        let cond = self.expr(&next.cond, ReadPosition::Borrow)?;
                        self.line(&format!("}} else if {cond} {{"));
                        self.block(&next.then_block.stmts)?;
                        current = next;
                    }
                    stmts => {
                        self.line("} else {");
                        self.block(stmts)?;
                        break;
                    }
                },
            }
        }
        self.line("}");
        Ok(())
    }

    fn switch(&mut self, sw: &SwitchStmt) -> Result<(), RustBackendError> {
        let scrutinee_ty = sw
            .scrutinee
            .ty
            .as_ref()
            .map(|t| self.registry.normalize(t).strip_refs().clone())
            .unwrap_or_else(Type::void);
        let scrutinee = self.expr(&sw.scrutinee, ReadPosition::Borrow)?;
        let head = if scrutinee_ty.is_owned_text() {
            format!("{}.as_str()", receiver(scrutinee, &sw.scrutinee))
        } else {
            scrutinee
        };
        self.line(&format!("match {head} {{"));
        self.indent += 1;

        let mut arms = Vec::new();
        let mut defaults = Vec::new();
        for case in &sw.cases {
            let saved = std::mem::take(&mut self.out);
            let pat = match &case.value {
                Some(v) => self.pattern(v, &scrutinee_ty)?,
                None => "_".to_string(),
            };
            let body = if case.ends_with_break() {
                &case.body[..case.body.len() - 1]
            } else {
                &case.body[..]
            };
            if !case.ends_with_jump() {
                self.fallthrough += 1;
                debug!("switch case `{pat}` falls through; emitted as its own arm");
            }
            if body.is_empty() {
                self.line(&format!("{pat} => {{}}"));
            } else {
                self.line(&format!("{pat} => {{"));
                self.block(body)?;
                self.line("}");
            }
            let arm = std::mem::replace(&mut self.out, saved);
            if case.value.is_some() {
                arms.push(arm);
            } else {
                defaults.push(arm);
            }
        }
        for arm in arms.iter().chain(&defaults) {
            self.out.push_str(arm);
        }
        if defaults.is_empty() {
            self.line("_ => {}");
        }

        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn pattern(&mut self, value: &Expr, scrutinee_ty: &Type) -> Result<String, RustBackendError> {
        match &value.kind {
            ExprKind::Literal(Literal::Number(n)) => {
                let lit = format_number(*n);
                if scrutinee_ty.is_float() && !lit.contains('.') && !lit.starts_with("f64::") {
                    Ok(format!("{lit}.0"))
                } else {
                    Ok(lit)
                }
            }
            ExprKind::Literal(Literal::Text(s)) => Ok(format!("{s:?}")),
            ExprKind::Literal(Literal::Bool(b)) => Ok(b.to_string()),
            ExprKind::Variant {
                enum_name,
                variant,
                data: None,
            } => {
                let path = format!("{}::{}", type_name(enum_name), type_name(variant));
                let shape = self
                    .registry
                    .enum_decl(enum_name)
                    .and_then(|e| e.variant(variant))
                    .map(|v| &v.shape);
                Ok(match shape {
                    Some(VariantShape::Tuple(t)) if !t.is_empty() => format!("{path}(..)"),
                    Some(VariantShape::Struct(f)) if !f.is_empty() => format!("{path} {{ .. }}"),
                    _ => path,
                })
            }
            _ => {
                let code = self.expr(value, ReadPosition::Borrow)?;
                Ok(format!("x if x == {code}"))
            }
        }
    }

    fn is_statement_builtin(&self, e: &Expr) -> bool {
        match &e.kind {
            ExprKind::MethodCall {
                object,
                method,
                namespace,
                object_ty,
                ..
            } => self
                .builtin(object, method, namespace.as_deref(), object_ty.as_ref())
                .is_some_and(|(_, d)| d.rule.is_statement()),
            _ => false,
        }
    }

    fn builtin(
        &self,
        object: &Expr,
        method: &str,
        namespace: Option<&str>,
        object_ty: Option<&Type>,
    ) -> Option<(Option<builtins::Namespace>, Dispatch)> {
        let scopes = &self.scopes;
        match builtins::namespace_of(namespace, object, |n| scopes.lookup(n).is_some()) {
            Some(ns) => builtins::dispatch(Some(ns), None, method).map(|d| (Some(ns), d)),
            None => {
                let recv = object_ty
                    .or(object.ty.as_ref())
                    .map(|t| self.registry.normalize(t));
                builtins::dispatch(None, recv.as_ref(), method).map(|d| (None, d))
            }
        }
    }

    /// Render `e` as a value flowing into a slot of type `expected`.
    fn value(&mut self, e: &Expr, expected: Option<&Type>) -> Result<String, RustBackendError> {
        let code = self.expr(e, ReadPosition::Value)?;
        Ok(self.coerce(code, e, expected))
    }

    fn coerce(&self, code: String, e: &Expr, expected: Option<&Type>) -> String {
        let Some(target) = expected.map(|t| self.registry.normalize(t)) else {
            return code;
        };
        let actual = e.ty.as_ref().map(|t| self.registry.normalize(t));
        match &target {
            Type::Primitive(Primitive::OwnedText) => {
                let is_view = e.is_text_literal()
                    || actual.as_ref().is_some_and(|t| t.strip_refs().is_view_text());
                if is_view {
                    format!("{}.to_string()", receiver(code, e))
                } else {
                    code
                }
            }
            Type::Optional(inner) => match &actual {
                _ if matches!(e.kind, ExprKind::Literal(Literal::Null)) => code,
                Some(t) if !matches!(t, Type::Optional(_)) && !t.is_void() => {
                    format!("Some({})", self.coerce(code, e, Some(&**inner)))
                }
                _ => code,
            },
            Type::Reference { mutable, .. } => {
                let is_place = matches!(
                    e.kind,
                    ExprKind::Ident(_) | ExprKind::Field { .. } | ExprKind::Index { .. }
                );
                let already_ref = matches!(actual, Some(Type::Reference { .. }));
                if is_place && !already_ref {
                    let m = if *mutable { "mut " } else { "" };
                    format!("&{m}{code}")
                } else {
                    code
                }
            }
            _ => code,
        }
    }

    fn read(&mut self, name: &str, pos: ReadPosition) -> String {
        let rendered = value_name(name);
        if let Some(id) = self.scopes.lookup(name)
            && let Some(rem) = self.remaining.get_mut(id)
        {
            *rem = rem.saturating_sub(1);
            if pos == ReadPosition::Value && self.usage.needs_duplication.contains(&id) && *rem > 0 {
                return format!("{rendered}.clone()");
            }
        }
        rendered
    }

    fn args(
        &mut self,
        args: &[Expr],
        params: &[Type],
        pos: ReadPosition,
    ) -> Result<Vec<String>, RustBackendError> {
        let mut out = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            let code = self.expr(a, pos)?;
            out.push(self.coerce(code, a, params.get(i)));
        }
        Ok(out)
    }

    fn is_duplicable(&self, ty: Option<&Type>) -> bool {
        ty.is_none_or(|t| self.copy.is_duplicable(t))
    }

    fn expr(&mut self, e: &Expr, pos: ReadPosition) -> Result<String, RustBackendError> {
        let registry = self.registry;
        match &e.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Number(n) => format_number(*n),
                Literal::Bool(b) => b.to_string(),
                Literal::Text(s) => format!("{s:?}"),
                Literal::Null => "None".to_string(),
            }),
            ExprKind::Ident(name) => Ok(self.read(name, pos)),
            ExprKind::Unary { op, expr } => {
                let inner = self.expr(expr, ReadPosition::Value)?;
                let inner = operand(inner, expr);
                Ok(match op {
                    UnaryOp::Neg => format!("-{inner}"),
                    UnaryOp::Not => format!("!{inner}"),
                })
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Call { callee, args } => {
                let params = registry
                    .function(callee)
                    .map(|sig| sig.params.clone())
                    .unwrap_or_default();
                let args = self.args(args, &params, ReadPosition::Value)?;
                Ok(format!("{}({})", value_name(callee), args.join(", ")))
            }
            ExprKind::MethodCall {
                object,
                method,
                namespace,
                args,
                object_ty,
            } => self.method_call(object, method, namespace.as_deref(), args, object_ty.as_ref()),
            ExprKind::Index { object, index } => {
                let obj_ty = object
                    .ty
                    .as_ref()
                    .map(|t| registry.normalize(t).strip_refs().clone())
                    .unwrap_or_else(Type::void);
                let obj = self.expr(object, ReadPosition::Borrow)?;
                let obj = receiver(obj, object);
                if obj_ty.is_text() {
                    let i = self.expr(index, ReadPosition::Value)?;
                    return Ok(format!(
                        "{obj}.chars().nth(({i}) as usize).map(|c| c.to_string()).unwrap_or_default()"
                    ));
                }
                let i = self.expr(index, ReadPosition::Value)?;
                let code = match obj_ty {
                    Type::Tuple(_) if index.is_integer_literal() => format!("{obj}.{i}"),
                    _ if index.is_integer_literal() => format!("{obj}[{i}]"),
                    _ => format!("{obj}[({i}) as usize]"),
                };
                if pos == ReadPosition::Value && !self.is_duplicable(e.ty.as_ref()) {
                    Ok(format!("{code}.clone()"))
                } else {
                    Ok(code)
                }
            }
            ExprKind::Field {
                object,
                field,
                object_ty,
            } => {
                let scopes = &self.scopes;
                if let Some(ns) =
                    builtins::namespace_of(None, object, |n| scopes.lookup(n).is_some())
                    && let Some(c) = builtins::constant(ns, field)
                {
                    return Ok(c.template.to_string());
                }
                let obj_ty = object_ty
                    .as_ref()
                    .or(object.ty.as_ref())
                    .map(|t| registry.normalize(t).strip_refs().clone())
                    .unwrap_or_else(Type::void);
                let obj = self.expr(object, ReadPosition::Borrow)?;
                let obj = receiver(obj, object);
                let has_len = obj_ty.is_sequence() || obj_ty.is_text() || obj_ty.is_void();
                if field == "length" && has_len {
                    return Ok(format!("{obj}.len()"));
                }
                let code = format!("{obj}.{}", value_name(field));
                if pos == ReadPosition::Value && !self.is_duplicable(e.ty.as_ref()) {
                    Ok(format!("{code}.clone()"))
                } else {
                    Ok(code)
                }
            }
            ExprKind::Array(items) => {
                let elem = e.ty.as_ref().and_then(|t| t.element()).cloned();
                let params = elem.map(|t| vec![t; items.len()]).unwrap_or_default();
                let items = self.args(items, &params, ReadPosition::Value)?;
                Ok(format!("vec![{}]", items.join(", ")))
            }
            ExprKind::Aggregate { target, fields } => match target {
                AggregateTarget::Named(name) => self.aggregate(name, fields),
                AggregateTarget::Pending => {
                    warn!("aggregate literal reached generation without a target type");
                    Err(RustBackendError::at(
                        "aggregate literal has no target type; give the value it initializes a declared type",
                        e.span,
                    ))
                }
            },
            ExprKind::Tuple(items) => {
                let params = match e.ty.as_ref() {
                    Some(Type::Tuple(tys)) => tys.clone(),
                    _ => Vec::new(),
                };
                let items = self.args(items, &params, ReadPosition::Value)?;
                Ok(match items.as_slice() {
                    [one] => format!("({one},)"),
                    _ => format!("({})", items.join(", ")),
                })
            }
            ExprKind::Variant {
                enum_name,
                variant,
                data,
            } => self.variant(enum_name, variant, data.as_deref()),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.expr(cond, ReadPosition::Borrow)?;
                let a = self.expr(then_expr, pos)?;
                let b = self.expr(else_expr, pos)?;
                Ok(format!("if {c} {{ {a} }} else {{ {b} }}"))
            }
            ExprKind::Cast { expr, ty } => {
                let inner = self.expr(expr, ReadPosition::Value)?;
                let target = registry.normalize(ty);
                Ok(match &target {
                    Type::Primitive(Primitive::OwnedText) => {
                        format!("{}.to_string()", receiver(inner, expr))
                    }
                    Type::Primitive(p) if p.is_numeric() => {
                        format!("{} as {}", operand(inner, expr), rust_type(&target, TypeSite::Local))
                    }
                    _ => inner,
                })
            }
        }
    }

    fn binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<String, RustBackendError> {
        let pos = ReadPosition::of_operands(op, left, right);
        if rivet_sema::is_text_concat(op, left, right) {
            let l = self.expr(left, pos)?;
            let r = self.expr(right, pos)?;
            return Ok(format!("format!(\"{{}}{{}}\", {l}, {r})"));
        }

        let is_null = |e: &Expr| matches!(e.kind, ExprKind::Literal(Literal::Null));
        if matches!(op, BinOp::Eq | BinOp::Ne) && (is_null(left) || is_null(right)) {
            let subject = if is_null(right) { left } else { right };
            let code = self.expr(subject, pos)?;
            let check = if op == BinOp::Eq { "is_none" } else { "is_some" };
            return Ok(format!("{}.{check}()", receiver(code, subject)));
        }

        let l = self.expr(left, pos)?;
        let r = self.expr(right, pos)?;
        let l = binary_operand(l, left, op, false);
        let r = binary_operand(r, right, op, true);
        Ok(format!("{l} {} {r}", op.symbol()))
    }

    fn method_call(
        &mut self,
        object: &Expr,
        method: &str,
        namespace: Option<&str>,
        args: &[Expr],
        object_ty: Option<&Type>,
    ) -> Result<String, RustBackendError> {
        let scopes = &self.scopes;
        let ns = builtins::namespace_of(namespace, object, |n| scopes.lookup(n).is_some());
        if let Some(ns) = ns {
            let pos = ReadPosition::of_method_args(Some(ns));
            let codes = self.args(args, &[], pos)?;
            let tys = arg_types(args);
            return Ok(match builtins::dispatch(Some(ns), None, method) {
                Some(d) => d.rule.render(None, &codes, &tys),
                None => format!("{}::{}({})", ns.ident(), value_name(method), codes.join(", ")),
            });
        }

        let recv_ty = object_ty
            .or(object.ty.as_ref())
            .map(|t| self.registry.normalize(t));
        let recv = self.expr(object, ReadPosition::Borrow)?;
        let recv = receiver(recv, object);

        if let Some(d) = builtins::dispatch(None, recv_ty.as_ref(), method) {
            let params = match (d.rule.element_args, recv_ty.as_ref().and_then(|t| t.element())) {
                (true, Some(elem)) => vec![elem.clone(); args.len()],
                _ => Vec::new(),
            };
            let codes = self.args(args, &params, ReadPosition::Value)?;
            return Ok(d.rule.render(Some(recv.as_str()), &codes, &arg_types(args)));
        }

        let params = recv_ty
            .as_ref()
            .and_then(|t| t.nominal_name())
            .and_then(|n| self.registry.method(n, method))
            .map(|sig| sig.params.clone())
            .unwrap_or_default();
        let codes = self.args(args, &params, ReadPosition::Value)?;
        Ok(format!("{recv}.{}({})", value_name(method), codes.join(", ")))
    }

    fn aggregate(&mut self, name: &str, fields: &[FieldInit]) -> Result<String, RustBackendError> {
        let mut parts = Vec::with_capacity(fields.len());
        for f in fields {
            let ty = self.registry.field_type(name, &f.name).cloned();
            let code = self.value(&f.value, ty.as_ref())?;
            parts.push(format!("{}: {code}", value_name(&f.name)));
        }
        if parts.is_empty() {
            Ok(format!("{} {{}}", type_name(name)))
        } else {
            Ok(format!("{} {{ {} }}", type_name(name), parts.join(", ")))
        }
    }

    fn variant(
        &mut self,
        enum_name: &str,
        variant: &str,
        data: Option<&[Expr]>,
    ) -> Result<String, RustBackendError> {
        let path = format!("{}::{}", type_name(enum_name), type_name(variant));
        let Some(items) = data else {
            return Ok(path);
        };
        let shape = self
            .registry
            .enum_decl(enum_name)
            .and_then(|e| e.variant(variant))
            .map(|v| v.shape.clone())
            .unwrap_or_default();
        match shape {
            VariantShape::Struct(decls) => {
                let mut parts = Vec::with_capacity(items.len());
                for (item, decl) in items.iter().zip(&decls) {
                    let code = self.value(item, Some(&decl.ty))?;
                    parts.push(format!("{}: {code}", value_name(&decl.name)));
                }
                Ok(format!("{path} {{ {} }}", parts.join(", ")))
            }
            VariantShape::Tuple(tys) => {
                let codes = self.args(items, &tys, ReadPosition::Value)?;
                Ok(format!("{path}({})", codes.join(", ")))
            }
            VariantShape::Unit => {
                let codes = self.args(items, &[], ReadPosition::Value)?;
                if codes.is_empty() {
                    Ok(path)
                } else {
                    Ok(format!("{path}({})", codes.join(", ")))
                }
            }
        }
    }
}

fn arg_types(args: &[Expr]) -> Vec<Type> {
    args.iter()
        .map(|a| a.ty.clone().unwrap_or_else(Type::void))
        .collect()
}

fn is_compound(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::Binary { .. }
            | ExprKind::Unary { .. }
            | ExprKind::Cast { .. }
            | ExprKind::Ternary { .. }
    )
}

/// Parenthesize a compound expression used as a method or field receiver.
fn receiver(code: String, e: &Expr) -> String {
    if is_compound(e) || code.starts_with('-') {
        format!("({code})")
    } else {
        code
    }
}

/// Operand of a unary operator or cast.
fn operand(code: String, e: &Expr) -> String {
    if matches!(
        e.kind,
        ExprKind::Binary { .. } | ExprKind::Cast { .. } | ExprKind::Ternary { .. }
    ) {
        format!("({code})")
    } else {
        code
    }
}

fn binary_operand(code: String, e: &Expr, parent: BinOp, is_right: bool) -> String {
    let wrap = match &e.kind {
        ExprKind::Binary { op, left, right } => {
            if rivet_sema::is_text_concat(*op, left, right) {
                false
            } else {
                op.precedence() < parent.precedence()
                    || (is_right && op.precedence() == parent.precedence())
                    || (op.is_comparison() && parent.is_comparison())
            }
        }
        ExprKind::Cast { .. } | ExprKind::Ternary { .. } => true,
        _ => false,
    };
    if wrap { format!("({code})") } else { code }
}
