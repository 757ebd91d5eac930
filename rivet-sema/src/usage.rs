#![forbid(unsafe_code)]

//! Per-function read/write counting and the duplication classification the
//! code generator relies on.
//!
//! Every identifier occurrence in expression position is a read of the
//! innermost live binding with that name, tagged with the [`ReadPosition`] it
//! appears in. The generator walks expressions in the same order with the
//! same position rules and the same [`Scopes`], so its per-binding read
//! countdown lines up with the counts collected here.

use std::collections::{HashMap, HashSet};

use log::debug;
use rivet_ir::{BinOp, Expr, ExprKind, FunctionDecl, Receiver, Stmt, Type};

use crate::builtins::{self, Namespace};
use crate::copy::CopySet;
use crate::registry::TypeRegistry;

/// Where a read happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadPosition {
    /// The value is moved (argument, initializer, return, element, ...).
    Value,
    /// The value is only looked at (receiver, comparison operand, condition,
    /// format argument, ...).
    Borrow,
}

impl ReadPosition {
    /// Position of both operands of a binary operator.
    pub fn of_operands(op: BinOp, left: &Expr, right: &Expr) -> ReadPosition {
        if op.is_comparison() || op.is_logical() || is_text_concat(op, left, right) {
            ReadPosition::Borrow
        } else {
            ReadPosition::Value
        }
    }

    /// Position of the arguments of a method call (namespace calls included).
    pub fn of_method_args(namespace: Option<Namespace>) -> ReadPosition {
        match namespace {
            Some(Namespace::Console) => ReadPosition::Borrow,
            _ => ReadPosition::Value,
        }
    }
}

/// `+` with a text operand on either side; rendered through `format!`.
pub fn is_text_concat(op: BinOp, left: &Expr, right: &Expr) -> bool {
    let text = |e: &Expr| {
        e.is_text_literal() || e.ty.as_ref().is_some_and(|t| t.strip_refs().is_text())
    };
    op == BinOp::Add && (text(left) || text(right))
}

/// Index of a binding in declaration order: receiver, parameters, then each
/// `let` and loop variable as the body declares it.
pub type BindingId = usize;

/// Lexical scopes from names to bindings.
#[derive(Clone, Debug)]
pub struct Scopes {
    frames: Vec<HashMap<String, BindingId>>,
    next: BindingId,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
            next: 0,
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// A fresh binding that shadows any earlier one with the same name.
    pub fn declare(&mut self, name: &str) -> BindingId {
        let id = self.next;
        self.next += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), id);
        }
        id
    }

    pub fn lookup(&self, name: &str) -> Option<BindingId> {
        self.frames.iter().rev().find_map(|f| f.get(name).copied())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarUsage {
    pub name: String,
    pub ty: Type,
    pub reads: usize,
    /// Reads that happened in a borrow position.
    pub borrow_reads: usize,
    pub writes: usize,
    /// Receiver of a mutating method or root of a field/index assignment.
    pub mutated: bool,
    pub is_param: bool,
}

impl VarUsage {
    fn new(name: &str, ty: Type, is_param: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            reads: 0,
            borrow_reads: 0,
            writes: 1,
            mutated: false,
            is_param,
        }
    }

    fn needs_mut(&self) -> bool {
        self.mutated || self.writes > 1
    }
}

#[derive(Clone, Debug, Default)]
pub struct UsageReport {
    /// Indexed by [`BindingId`].
    pub bindings: Vec<VarUsage>,
    /// Non-duplicable and read more than once.
    pub needs_duplication: HashSet<BindingId>,
    /// Written once, read once.
    pub can_borrow: HashSet<BindingId>,
}

impl UsageReport {
    pub fn binding(&self, id: BindingId) -> Option<&VarUsage> {
        self.bindings.get(id)
    }

    /// Whether the binding has to be declared `mut`.
    pub fn binding_needs_mut(&self, id: BindingId) -> bool {
        self.bindings.get(id).is_some_and(VarUsage::needs_mut)
    }

    /// First binding declared with `name`.
    pub fn first(&self, name: &str) -> Option<BindingId> {
        self.bindings.iter().position(|u| u.name == name)
    }

    pub fn usage(&self, name: &str) -> Option<&VarUsage> {
        self.first(name).and_then(|id| self.binding(id))
    }

    pub fn needs_duplication(&self, name: &str) -> bool {
        self.first(name)
            .is_some_and(|id| self.needs_duplication.contains(&id))
    }

    pub fn can_borrow(&self, name: &str) -> bool {
        self.first(name).is_some_and(|id| self.can_borrow.contains(&id))
    }

    pub fn needs_mut(&self, name: &str) -> bool {
        self.first(name).is_some_and(|id| self.binding_needs_mut(id))
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.first(name).is_some()
    }
}

/// Name given to the receiver of a method while counting.
pub const RECEIVER: &str = "this";

/// Declare the receiver and parameters of `function` in a fresh scope chain,
/// in the order the analyzer numbers them.
pub fn signature_scopes(function: &FunctionDecl) -> Scopes {
    let mut scopes = Scopes::new();
    if function.receiver.is_some() {
        scopes.declare(RECEIVER);
    }
    for p in &function.params {
        scopes.declare(&p.name);
    }
    scopes
}

pub fn analyze_function(function: &FunctionDecl, copy_set: &CopySet<'_>) -> UsageReport {
    let mut walker = Walker {
        scopes: Scopes::new(),
        bindings: Vec::new(),
        registry: copy_set.registry(),
    };

    if let Some(recv) = function.receiver {
        let ty = match recv {
            Receiver::Ref | Receiver::Mut => Type::reference(Type::aggregate("Self"), false),
            Receiver::Value => Type::aggregate("Self"),
        };
        walker.declare(RECEIVER, ty, true);
    }
    for p in &function.params {
        walker.declare(&p.name, p.ty.clone(), true);
    }
    walker.stmts(&function.body.stmts);

    let mut report = UsageReport {
        bindings: walker.bindings,
        ..UsageReport::default()
    };
    for (id, u) in report.bindings.iter().enumerate() {
        if !copy_set.is_duplicable(&u.ty) && u.reads > 1 {
            report.needs_duplication.insert(id);
        } else if u.writes == 1 && u.reads == 1 {
            report.can_borrow.insert(id);
        }
    }
    debug!(
        "`{}`: {} bindings, {} need duplication",
        function.name,
        report.bindings.len(),
        report.needs_duplication.len()
    );
    report
}

struct Walker<'r> {
    scopes: Scopes,
    bindings: Vec<VarUsage>,
    registry: Option<&'r TypeRegistry>,
}

impl Walker<'_> {
    fn declare(&mut self, name: &str, ty: Type, is_param: bool) {
        self.scopes.declare(name);
        self.bindings.push(VarUsage::new(name, ty, is_param));
    }

    fn binding_mut(&mut self, name: &str) -> Option<&mut VarUsage> {
        self.scopes
            .lookup(name)
            .and_then(|id| self.bindings.get_mut(id))
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.stmt(s);
        }
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.scopes.push();
        self.stmts(stmts);
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(l) => {
                if let Some(init) = &l.init {
                    self.expr(init, ReadPosition::Value);
                }
                let ty = l
                    .ty
                    .clone()
                    .or_else(|| l.init.as_ref().and_then(|e| e.ty.clone()))
                    .unwrap_or_else(Type::void);
                self.declare(&l.name, ty, false);
            }
            Stmt::Assign(a) => {
                self.place(&a.target);
                self.expr(&a.value, ReadPosition::Value);
            }
            Stmt::Return(r) => {
                if let Some(v) = &r.value {
                    self.expr(v, ReadPosition::Value);
                }
            }
            Stmt::If(i) => {
                self.expr(&i.cond, ReadPosition::Borrow);
                self.block(&i.then_block.stmts);
                if let Some(e) = &i.else_block {
                    self.block(&e.stmts);
                }
            }
            Stmt::While(w) => {
                self.expr(&w.cond, ReadPosition::Borrow);
                self.block(&w.body.stmts);
            }
            Stmt::ForEach(f) => {
                self.expr(&f.iterable, ReadPosition::Borrow);
                let elem = match f.iterable.ty.as_ref().map(|t| t.strip_refs()) {
                    Some(Type::Sequence(e)) => (**e).clone(),
                    Some(t) if t.is_text() => Type::owned_text(),
                    _ => Type::void(),
                };
                self.scopes.push();
                self.declare(&f.var, elem, false);
                self.block(&f.body.stmts);
                self.scopes.pop();
            }
            Stmt::Switch(s) => {
                self.expr(&s.scrutinee, ReadPosition::Borrow);
                for case in &s.cases {
                    if let Some(v) = &case.value {
                        self.expr(v, ReadPosition::Borrow);
                    }
                    self.block(&case.body);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Expr(e) => self.expr(e, ReadPosition::Value),
            Stmt::Block(b) => self.block(&b.stmts),
        }
    }

    /// Assignment target: a bare name is a write; a field or index place
    /// reads its root variable.
    fn place(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(u) = self.binding_mut(name) {
                    u.writes += 1;
                }
            }
            _ => {
                self.mark_mutated(target);
                self.expr(target, ReadPosition::Borrow);
            }
        }
    }

    fn mark_mutated(&mut self, place: &Expr) {
        if let Some(u) = place.root_ident().and_then(|n| self.binding_mut(n)) {
            u.mutated = true;
        }
    }

    /// Whether calling `method` on a receiver of type `recv` changes it.
    fn mutates(&self, recv: Option<&Type>, method: &str) -> bool {
        if let Some(d) = builtins::dispatch(None, recv, method) {
            return d.rule.mutates_receiver;
        }
        let Some(reg) = self.registry else {
            return false;
        };
        recv.and_then(|t| t.nominal_name())
            .and_then(|n| reg.method(n, method))
            .is_some_and(|sig| sig.receiver == Some(Receiver::Mut))
    }

    fn read(&mut self, name: &str, pos: ReadPosition) {
        if let Some(u) = self.binding_mut(name) {
            u.reads += 1;
            if pos == ReadPosition::Borrow {
                u.borrow_reads += 1;
            }
        }
    }

    fn expr(&mut self, expr: &Expr, pos: ReadPosition) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ident(name) => self.read(name, pos),
            ExprKind::Unary { expr, .. } => self.expr(expr, ReadPosition::Value),
            ExprKind::Binary { op, left, right } => {
                let p = ReadPosition::of_operands(*op, left, right);
                self.expr(left, p);
                self.expr(right, p);
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    self.expr(a, ReadPosition::Value);
                }
            }
            ExprKind::MethodCall {
                object,
                method,
                namespace,
                args,
                object_ty,
            } => {
                let scopes = &self.scopes;
                let ns = builtins::namespace_of(namespace.as_deref(), object, |n| {
                    scopes.lookup(n).is_some()
                });
                if ns.is_none() {
                    let recv = object_ty.as_ref().or(object.ty.as_ref());
                    if self.mutates(recv, method) {
                        self.mark_mutated(object);
                    }
                    self.expr(object, ReadPosition::Borrow);
                }
                let p = ReadPosition::of_method_args(ns);
                for a in args {
                    self.expr(a, p);
                }
            }
            ExprKind::Index { object, index } => {
                self.expr(object, ReadPosition::Borrow);
                self.expr(index, ReadPosition::Value);
            }
            ExprKind::Field { object, .. } => self.expr(object, ReadPosition::Borrow),
            ExprKind::Array(items) | ExprKind::Tuple(items) => {
                for e in items {
                    self.expr(e, ReadPosition::Value);
                }
            }
            ExprKind::Aggregate { fields, .. } => {
                for f in fields {
                    self.expr(&f.value, ReadPosition::Value);
                }
            }
            ExprKind::Variant { data, .. } => {
                for e in data.iter().flatten() {
                    self.expr(e, ReadPosition::Value);
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.expr(cond, ReadPosition::Borrow);
                self.expr(then_expr, pos);
                self.expr(else_expr, pos);
            }
            ExprKind::Cast { expr, .. } => self.expr(expr, ReadPosition::Value),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SuggestionKind {
    /// Every read is a borrow; the duplicate is unnecessary.
    RemoveClone,
    /// A non-duplicable parameter read exactly once.
    PassByReference,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    pub function: String,
    pub variable: String,
    pub kind: SuggestionKind,
}

impl std::fmt::Display for Suggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SuggestionKind::RemoveClone => write!(
                f,
                "{}: `{}` is only borrowed; it does not need to be cloned",
                self.function, self.variable
            ),
            SuggestionKind::PassByReference => write!(
                f,
                "{}: parameter `{}` is read once and could be taken by reference",
                self.function, self.variable
            ),
        }
    }
}

/// Optimization hints for one analyzed function, sorted by variable name.
/// `copy_set` must be the one the report was computed with.
pub fn suggest(
    function: &FunctionDecl,
    report: &UsageReport,
    copy_set: &CopySet<'_>,
) -> Vec<Suggestion> {
    let mut out = Vec::new();
    for (id, u) in report.bindings.iter().enumerate() {
        if u.name == RECEIVER {
            continue;
        }
        let needs_dup = report.needs_duplication.contains(&id);
        let kind = if needs_dup && u.borrow_reads == u.reads {
            SuggestionKind::RemoveClone
        } else if u.is_param && u.reads == 1 && !needs_dup && !copy_set.is_duplicable(&u.ty) {
            SuggestionKind::PassByReference
        } else {
            continue;
        };
        out.push(Suggestion {
            function: function.name.clone(),
            variable: u.name.clone(),
            kind,
        });
    }
    out.sort_by(|a, b| a.variable.cmp(&b.variable).then(a.kind.cmp(&b.kind)));
    out
}
