#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{Span, Type};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

impl Program {
    pub fn new(decls: Vec<Decl>) -> Self {
        Self { decls }
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn aliases(&self) -> impl Iterator<Item = &AliasDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Alias(a) => Some(a),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn impls(&self) -> impl Iterator<Item = &ImplBlock> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Impl(i) => Some(i),
            _ => None,
        })
    }

    pub fn find_struct(&self, name: &str) -> Option<&StructDecl> {
        self.structs().find(|s| s.name == name)
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumDecl> {
        self.enums().find(|e| e.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decl {
    Struct(StructDecl),
    Enum(EnumDecl),
    Alias(AliasDecl),
    Function(FunctionDecl),
    Impl(ImplBlock),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    #[serde(default)]
    pub span: Span,
    pub name: String,
    pub fields: Vec<FieldDecl>,
    /// Derive tags (`Clone`, `Copy`, ...). Appended to by the derive-closure pass.
    #[serde(default)]
    pub derives: Vec<String>,
}

impl StructDecl {
    pub fn has_derive(&self, tag: &str) -> bool {
        self.derives.iter().any(|d| d == tag)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    #[serde(default)]
    pub span: Span,
    pub name: String,
    pub variants: Vec<VariantDecl>,
    #[serde(default)]
    pub derives: Vec<String>,
}

impl EnumDecl {
    pub fn has_derive(&self, tag: &str) -> bool {
        self.derives.iter().any(|d| d == tag)
    }

    /// True when no variant carries associated data.
    pub fn is_fieldless(&self) -> bool {
        self.variants.iter().all(|v| v.shape.is_unit())
    }

    pub fn variant(&self, name: &str) -> Option<&VariantDecl> {
        self.variants.iter().find(|v| v.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    #[serde(default)]
    pub shape: VariantShape,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantShape {
    #[default]
    Unit,
    Tuple(Vec<Type>),
    Struct(Vec<FieldDecl>),
}

impl VariantShape {
    pub fn is_unit(&self) -> bool {
        match self {
            VariantShape::Unit => true,
            VariantShape::Tuple(tys) => tys.is_empty(),
            VariantShape::Struct(fields) => fields.is_empty(),
        }
    }

    /// Payload types in declaration order.
    pub fn payload_types(&self) -> Vec<&Type> {
        match self {
            VariantShape::Unit => Vec::new(),
            VariantShape::Tuple(tys) => tys.iter().collect(),
            VariantShape::Struct(fields) => fields.iter().map(|f| &f.ty).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AliasDecl {
    #[serde(default)]
    pub span: Span,
    pub name: String,
    pub target: Type,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    /// `&self`
    Ref,
    /// `&mut self`
    Mut,
    /// `self`
    Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    #[serde(default)]
    pub span: Span,
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Block,
    #[serde(default)]
    pub public: bool,
    /// Present for methods inside an `ImplBlock`.
    #[serde(default)]
    pub receiver: Option<Receiver>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub mutable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImplBlock {
    #[serde(default)]
    pub span: Span,
    /// Name of the aggregate the methods belong to.
    pub target: String,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            span: Span::default(),
            stmts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Let(LetStmt),
    Assign(AssignStmt),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    ForEach(ForEachStmt),
    Switch(SwitchStmt),
    Break(Span),
    Continue(Span),
    Expr(Expr),
    Block(Block),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LetStmt {
    #[serde(default)]
    pub span: Span,
    pub name: String,
    #[serde(default)]
    pub ty: Option<Type>,
    #[serde(default)]
    pub mutable: bool,
    #[serde(default)]
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignStmt {
    #[serde(default)]
    pub span: Span,
    /// Place expression: identifier, field access or index.
    pub target: Expr,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    #[serde(default)]
    pub span: Span,
    #[serde(default)]
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    #[serde(default)]
    pub span: Span,
    pub cond: Expr,
    pub then_block: Block,
    #[serde(default)]
    pub else_block: Option<Block>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    #[serde(default)]
    pub span: Span,
    pub cond: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForEachStmt {
    #[serde(default)]
    pub span: Span,
    pub var: String,
    pub iterable: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchStmt {
    #[serde(default)]
    pub span: Span,
    pub scrutinee: Expr,
    pub cases: Vec<SwitchCase>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    #[serde(default)]
    pub span: Span,
    /// `None` is the `default:` case.
    #[serde(default)]
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
    /// Set by the front-end when the case body has no terminating jump.
    #[serde(default)]
    pub fallthrough: bool,
}

impl SwitchCase {
    pub fn ends_with_break(&self) -> bool {
        matches!(self.body.last(), Some(Stmt::Break(_)))
    }

    /// Whether control can leave the case body at its end.
    pub fn ends_with_jump(&self) -> bool {
        matches!(
            self.body.last(),
            Some(Stmt::Break(_) | Stmt::Continue(_) | Stmt::Return(_))
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default)]
    pub span: Span,
    pub kind: ExprKind,
    /// Filled in by type resolution.
    #[serde(default)]
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            span: Span::default(),
            kind,
            ty: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(n) => Some(n.as_str()),
            _ => None,
        }
    }

    /// The variable at the root of a place expression (`a` in `a.b[0].c`).
    pub fn root_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(n) => Some(n.as_str()),
            ExprKind::Field { object, .. } | ExprKind::Index { object, .. } => object.root_ident(),
            _ => None,
        }
    }

    pub fn is_text_literal(&self) -> bool {
        matches!(&self.kind, ExprKind::Literal(Literal::Text(_)))
    }

    pub fn is_integer_literal(&self) -> bool {
        matches!(&self.kind, ExprKind::Literal(Literal::Number(n)) if n.is_finite() && n.fract() == 0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

/// Target of an aggregate literal (`{ x: 1, y: 2 }`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateTarget {
    /// Not yet known; resolved from the surrounding declared type.
    Pending,
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        /// Set by the front-end when the receiver is a known namespace (`console.log`).
        #[serde(default)]
        namespace: Option<String>,
        args: Vec<Expr>,
        #[serde(default)]
        object_ty: Option<Type>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        object: Box<Expr>,
        field: String,
        #[serde(default)]
        object_ty: Option<Type>,
    },
    Array(Vec<Expr>),
    Aggregate {
        target: AggregateTarget,
        fields: Vec<FieldInit>,
    },
    Tuple(Vec<Expr>),
    Variant {
        enum_name: String,
        variant: String,
        #[serde(default)]
        data: Option<Vec<Expr>>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: Type,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;

    #[test]
    fn root_ident_walks_place_expressions() {
        let place = index(field(ident("grid"), "rows"), num(0.0));
        assert_eq!(place.root_ident(), Some("grid"));
        assert_eq!(num(1.0).root_ident(), None);
    }

    #[test]
    fn switch_case_jump_detection() {
        let terminated = case(Some(num(1.0)), vec![expr_stmt(call("f", vec![])), brk()]);
        let open = case(Some(num(2.0)), vec![expr_stmt(call("g", vec![]))]);
        assert!(terminated.ends_with_break());
        assert!(!terminated.fallthrough);
        assert!(!open.ends_with_jump());
        assert!(open.fallthrough);
    }

    #[test]
    fn fieldless_enum_detection() {
        let plain = enum_decl("Color", vec![unit_variant("Red"), unit_variant("Green")]);
        assert!(plain.is_fieldless());
        let data = enum_decl(
            "Shape",
            vec![unit_variant("Empty"), tuple_variant("Circle", vec![Type::f64()])],
        );
        assert!(!data.is_fieldless());
    }

    #[test]
    fn program_round_trips_through_json() {
        let program = Program::new(vec![
            Decl::Struct(struct_decl("Point", vec![("x", Type::f64()), ("y", Type::f64())])),
            Decl::Function(func(
                "origin",
                vec![],
                Type::aggregate("Point"),
                vec![ret(Some(aggregate_lit(vec![("x", num(0.0)), ("y", num(0.0))])))],
            )),
        ]);
        let json = serde_json::to_string(&program).expect("serialize");
        let back: Program = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, program);
    }
}
