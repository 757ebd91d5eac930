#![forbid(unsafe_code)]

//! Known receiver/method combinations and how to emit them.
//!
//! Templates are plain Rust text with placeholders:
//! `{recv}` receiver, `{N}` N-th argument, `{N:usize}` N-th argument cast to
//! `usize`, `{args}` all arguments comma-separated, `{fmt}` a format string
//! plus arguments, `{range}` a slice range built from the first two
//! arguments. Any other brace group is copied through untouched.

use rivet_ir::{Expr, ExprKind, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Console,
    Array,
    String,
    Math,
    Process,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::Console,
        Namespace::Array,
        Namespace::String,
        Namespace::Math,
        Namespace::Process,
    ];

    pub fn from_ident(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.ident() == name)
    }

    pub fn ident(self) -> &'static str {
        match self {
            Namespace::Console => "console",
            Namespace::Array => "Array",
            Namespace::String => "String",
            Namespace::Math => "Math",
            Namespace::Process => "process",
        }
    }

    fn constants(self) -> &'static [ConstantRule] {
        match self {
            Namespace::Math => MATH_CONSTANTS,
            Namespace::Process => PROCESS_CONSTANTS,
            Namespace::Console | Namespace::Array | Namespace::String => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Sequence,
    Text,
    Namespace(Namespace),
}

impl Table {
    pub fn rules(self) -> &'static [BuiltinRule] {
        match self {
            Table::Sequence => SEQUENCE_RULES,
            Table::Text => TEXT_RULES,
            Table::Namespace(Namespace::Console) => CONSOLE_RULES,
            Table::Namespace(Namespace::Array) => ARRAY_RULES,
            Table::Namespace(Namespace::String) => STRING_RULES,
            Table::Namespace(Namespace::Math) => MATH_RULES,
            Table::Namespace(Namespace::Process) => PROCESS_RULES,
        }
    }

    pub fn lookup(self, method: &str) -> Option<&'static BuiltinRule> {
        self.rules().iter().find(|r| r.name == method)
    }
}

/// Whether the call is emitted as a statement or may sit inside an expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Statement,
    Expression,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultKind {
    Void,
    Bool,
    Number,
    Size,
    OwnedText,
    /// Same type as the receiver (text results are owned).
    Receiver,
    /// Element type of the receiver sequence.
    Element,
    OptionalElement,
    TextSequence,
    FirstArg,
    SequenceOfFirstArg,
}

impl ResultKind {
    pub fn resolve(self, receiver: Option<&Type>, args: &[Type]) -> Type {
        let recv = receiver.map(|t| t.strip_refs());
        match self {
            ResultKind::Void => Type::void(),
            ResultKind::Bool => Type::bool(),
            ResultKind::Number => Type::f64(),
            ResultKind::Size => Type::usize(),
            ResultKind::OwnedText => Type::owned_text(),
            ResultKind::Receiver => match recv {
                Some(t) if t.is_text() => Type::owned_text(),
                Some(t) => t.clone(),
                None => Type::void(),
            },
            ResultKind::Element => recv
                .and_then(|t| t.element())
                .cloned()
                .unwrap_or_else(Type::void),
            ResultKind::OptionalElement => Type::optional(
                recv.and_then(|t| t.element())
                    .cloned()
                    .unwrap_or_else(Type::void),
            ),
            ResultKind::TextSequence => Type::sequence(Type::owned_text()),
            ResultKind::FirstArg => args.first().cloned().unwrap_or_else(Type::void),
            ResultKind::SequenceOfFirstArg => {
                Type::sequence(args.first().cloned().unwrap_or_else(Type::void))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltinRule {
    pub name: &'static str,
    pub template: &'static str,
    pub mutates_receiver: bool,
    pub position: Position,
    pub result: ResultKind,
    /// Arguments are values of the receiver's element type.
    pub element_args: bool,
}

impl BuiltinRule {
    const fn expr(name: &'static str, template: &'static str, result: ResultKind) -> Self {
        Self {
            name,
            template,
            mutates_receiver: false,
            position: Position::Expression,
            result,
            element_args: false,
        }
    }

    const fn stmt(name: &'static str, template: &'static str) -> Self {
        Self {
            name,
            template,
            mutates_receiver: false,
            position: Position::Statement,
            result: ResultKind::Void,
            element_args: false,
        }
    }

    const fn mutating(mut self) -> Self {
        self.mutates_receiver = true;
        self
    }

    const fn with_element_args(mut self) -> Self {
        self.element_args = true;
        self
    }

    pub fn is_statement(&self) -> bool {
        self.position == Position::Statement
    }

    /// Expand the template. `args` and `arg_tys` are index-aligned.
    pub fn render(&self, receiver: Option<&str>, args: &[String], arg_tys: &[Type]) -> String {
        render_template(self.template, receiver, args, arg_tys)
    }
}

/// A namespace member read as a value (`Math.PI`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantRule {
    pub name: &'static str,
    pub template: &'static str,
    pub result: ResultKind,
}

const SEQUENCE_RULES: &[BuiltinRule] = &[
    BuiltinRule::stmt("push", "{recv}.push({0})")
        .mutating()
        .with_element_args(),
    BuiltinRule::expr("pop", "{recv}.pop()", ResultKind::OptionalElement).mutating(),
    BuiltinRule::expr("shift", "{recv}.remove(0)", ResultKind::Element).mutating(),
    BuiltinRule::stmt("unshift", "{recv}.insert(0, {0})")
        .mutating()
        .with_element_args(),
    BuiltinRule::stmt("reverse", "{recv}.reverse()").mutating(),
    BuiltinRule::stmt(
        "sort",
        "{recv}.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))",
    )
    .mutating(),
    BuiltinRule::expr("includes", "{recv}.contains(&{0})", ResultKind::Bool).with_element_args(),
    BuiltinRule::expr(
        "indexOf",
        "{recv}.iter().position(|e| *e == {0}).map(|i| i as f64).unwrap_or(-1.0)",
        ResultKind::Number,
    )
    .with_element_args(),
    BuiltinRule::expr(
        "join",
        "{recv}.iter().map(|e| e.to_string()).collect::<Vec<String>>().join(&*{0})",
        ResultKind::OwnedText,
    ),
    BuiltinRule::expr("slice", "{recv}[{range}].to_vec()", ResultKind::Receiver),
    BuiltinRule::expr(
        "concat",
        "[{recv}.as_slice(), {0}.as_slice()].concat()",
        ResultKind::Receiver,
    ),
];

const TEXT_RULES: &[BuiltinRule] = &[
    BuiltinRule::expr("includes", "{recv}.contains(&*{0})", ResultKind::Bool),
    BuiltinRule::expr(
        "indexOf",
        "{recv}.find(&*{0}).map(|i| i as f64).unwrap_or(-1.0)",
        ResultKind::Number,
    ),
    BuiltinRule::expr("slice", "{recv}[{range}].to_string()", ResultKind::OwnedText),
    BuiltinRule::expr("concat", "format!(\"{}{}\", {recv}, {0})", ResultKind::OwnedText),
    BuiltinRule::expr("toUpperCase", "{recv}.to_uppercase()", ResultKind::OwnedText),
    BuiltinRule::expr("toLowerCase", "{recv}.to_lowercase()", ResultKind::OwnedText),
    BuiltinRule::expr("trim", "{recv}.trim().to_string()", ResultKind::OwnedText),
    BuiltinRule::expr(
        "split",
        "{recv}.split(&*{0}).map(|s| s.to_string()).collect::<Vec<String>>()",
        ResultKind::TextSequence,
    ),
    BuiltinRule::expr("startsWith", "{recv}.starts_with(&*{0})", ResultKind::Bool),
    BuiltinRule::expr("endsWith", "{recv}.ends_with(&*{0})", ResultKind::Bool),
    BuiltinRule::expr(
        "charAt",
        "{recv}.chars().nth({0:usize}).map(|c| c.to_string()).unwrap_or_default()",
        ResultKind::OwnedText,
    ),
    BuiltinRule::expr("replace", "{recv}.replacen(&*{0}, &*{1}, 1)", ResultKind::OwnedText),
    BuiltinRule::expr("repeat", "{recv}.repeat({0:usize})", ResultKind::OwnedText),
    BuiltinRule::expr(
        "padStart",
        "format!(\"{:>width$}\", {recv}, width = {0:usize})",
        ResultKind::OwnedText,
    ),
    BuiltinRule::expr("toString", "{recv}.to_string()", ResultKind::OwnedText),
];

const CONSOLE_RULES: &[BuiltinRule] = &[
    BuiltinRule::stmt("log", "println!({fmt})"),
    BuiltinRule::stmt("info", "println!({fmt})"),
    BuiltinRule::stmt("debug", "println!({fmt})"),
    BuiltinRule::stmt("warn", "eprintln!({fmt})"),
    BuiltinRule::stmt("error", "eprintln!({fmt})"),
];

const ARRAY_RULES: &[BuiltinRule] = &[
    BuiltinRule::expr(
        "from",
        "{0}.iter().cloned().collect::<Vec<_>>()",
        ResultKind::FirstArg,
    ),
    BuiltinRule::expr("of", "vec![{args}]", ResultKind::SequenceOfFirstArg),
];

const STRING_RULES: &[BuiltinRule] = &[BuiltinRule::expr(
    "fromCharCode",
    "char::from_u32({0} as u32).map(|c| c.to_string()).unwrap_or_default()",
    ResultKind::OwnedText,
)];

const MATH_RULES: &[BuiltinRule] = &[
    BuiltinRule::expr("floor", "({0} as f64).floor()", ResultKind::Number),
    BuiltinRule::expr("ceil", "({0} as f64).ceil()", ResultKind::Number),
    BuiltinRule::expr("round", "({0} as f64).round()", ResultKind::Number),
    BuiltinRule::expr("trunc", "({0} as f64).trunc()", ResultKind::Number),
    BuiltinRule::expr("abs", "({0} as f64).abs()", ResultKind::Number),
    BuiltinRule::expr("sqrt", "({0} as f64).sqrt()", ResultKind::Number),
    BuiltinRule::expr("sign", "({0} as f64).signum()", ResultKind::Number),
    BuiltinRule::expr("pow", "({0} as f64).powf({1} as f64)", ResultKind::Number),
    BuiltinRule::expr("min", "({0} as f64).min({1} as f64)", ResultKind::Number),
    BuiltinRule::expr("max", "({0} as f64).max({1} as f64)", ResultKind::Number),
];

const PROCESS_RULES: &[BuiltinRule] = &[
    BuiltinRule::stmt("exit", "std::process::exit({0} as i32)"),
    BuiltinRule::expr(
        "cwd",
        "std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_default()",
        ResultKind::OwnedText,
    ),
];

const MATH_CONSTANTS: &[ConstantRule] = &[
    ConstantRule {
        name: "PI",
        template: "std::f64::consts::PI",
        result: ResultKind::Number,
    },
    ConstantRule {
        name: "E",
        template: "std::f64::consts::E",
        result: ResultKind::Number,
    },
];

const PROCESS_CONSTANTS: &[ConstantRule] = &[ConstantRule {
    name: "argv",
    template: "std::env::args().collect::<Vec<String>>()",
    result: ResultKind::TextSequence,
}];

pub fn constant(ns: Namespace, name: &str) -> Option<&'static ConstantRule> {
    ns.constants().iter().find(|c| c.name == name)
}

/// Result of builtin dispatch for one call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub table: Table,
    pub rule: &'static BuiltinRule,
    /// Chosen by the name heuristic between two tables that both know the method.
    pub ambiguous: bool,
}

/// Pick the builtin rule for `method`.
///
/// A namespace receiver is looked up directly. Otherwise a receiver whose
/// type is known to be a sequence or text selects that table, and any other
/// known type means a user method. With no usable type, a name exclusive to
/// one table goes there and a shared name falls back to the sequence table.
pub fn dispatch(
    namespace: Option<Namespace>,
    receiver_ty: Option<&Type>,
    method: &str,
) -> Option<Dispatch> {
    if let Some(ns) = namespace {
        let table = Table::Namespace(ns);
        return table.lookup(method).map(|rule| Dispatch {
            table,
            rule,
            ambiguous: false,
        });
    }

    match receiver_ty.map(|t| t.strip_refs()) {
        Some(Type::Sequence(_)) => return typed(Table::Sequence, method),
        Some(t) if t.is_text() => return typed(Table::Text, method),
        Some(t) if !t.is_void() => return None,
        _ => {}
    }

    match (Table::Sequence.lookup(method), Table::Text.lookup(method)) {
        (Some(rule), None) => Some(Dispatch {
            table: Table::Sequence,
            rule,
            ambiguous: false,
        }),
        (None, Some(rule)) => Some(Dispatch {
            table: Table::Text,
            rule,
            ambiguous: false,
        }),
        (Some(rule), Some(_)) => Some(Dispatch {
            table: Table::Sequence,
            rule,
            ambiguous: true,
        }),
        (None, None) => None,
    }
}

fn typed(table: Table, method: &str) -> Option<Dispatch> {
    table.lookup(method).map(|rule| Dispatch {
        table,
        rule,
        ambiguous: false,
    })
}

/// Namespace addressed by a call or field access, if any.
///
/// An explicit namespace tag wins; otherwise an identifier receiver naming a
/// namespace counts unless a local variable shadows it.
pub fn namespace_of(
    tag: Option<&str>,
    object: &Expr,
    is_local: impl Fn(&str) -> bool,
) -> Option<Namespace> {
    if let Some(tag) = tag {
        return Namespace::from_ident(tag);
    }
    match &object.kind {
        ExprKind::Ident(name) if !is_local(name) => Namespace::from_ident(name),
        _ => None,
    }
}

/// `code as usize`, parenthesized unless `code` is a simple path or literal.
pub fn as_usize(code: &str) -> String {
    let simple = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if simple {
        format!("{code} as usize")
    } else {
        format!("({code}) as usize")
    }
}

fn render_template(
    template: &str,
    receiver: Option<&str>,
    args: &[String],
    arg_tys: &[Type],
) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match expand_placeholder(key, receiver, args, arg_tys) {
            Some(s) => out.push_str(&s),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn expand_placeholder(
    key: &str,
    receiver: Option<&str>,
    args: &[String],
    arg_tys: &[Type],
) -> Option<String> {
    match key {
        "recv" => return Some(receiver.unwrap_or_default().to_string()),
        "args" => return Some(args.join(", ")),
        "fmt" => return Some(format_args_list(args, arg_tys)),
        "range" => {
            let lo = args.first().map(|a| as_usize(a)).unwrap_or_default();
            let hi = args.get(1).map(|a| as_usize(a)).unwrap_or_default();
            return Some(format!("{lo}..{hi}"));
        }
        _ => {}
    }
    let (idx, cast) = match key.split_once(':') {
        Some((idx, "usize")) => (idx, true),
        Some(_) => return None,
        None => (key, false),
    };
    let n: usize = idx.parse().ok()?;
    let arg = args.get(n).map(String::as_str).unwrap_or_default();
    Some(if cast { as_usize(arg) } else { arg.to_string() })
}

fn format_args_list(args: &[String], arg_tys: &[Type]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let pieces = args
        .iter()
        .enumerate()
        .map(|(i, _)| match arg_tys.get(i).map(|t| t.strip_refs()) {
            Some(Type::Primitive(p)) if !matches!(p, rivet_ir::Primitive::Void) => "{}",
            _ => "{:?}",
        })
        .collect::<Vec<_>>();
    format!("\"{}\", {}", pieces.join(" "), args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_ir::build::*;

    #[test]
    fn typed_sequence_receiver_wins_for_shared_names() {
        let seq = Type::sequence(Type::f64());
        for name in ["includes", "indexOf", "slice", "concat"] {
            let d = dispatch(None, Some(&seq), name).expect("dispatch");
            assert_eq!(d.table, Table::Sequence, "{name}");
            assert!(!d.ambiguous);
        }
    }

    #[test]
    fn typed_text_receiver_uses_text_table() {
        let d = dispatch(None, Some(&Type::view_text()), "includes").expect("dispatch");
        assert_eq!(d.table, Table::Text);
        let through_ref = Type::reference(Type::owned_text(), false);
        let d = dispatch(None, Some(&through_ref), "slice").expect("dispatch");
        assert_eq!(d.table, Table::Text);
    }

    #[test]
    fn untyped_receiver_uses_name_heuristic() {
        let d = dispatch(None, None, "push").expect("push");
        assert_eq!((d.table, d.ambiguous), (Table::Sequence, false));

        let d = dispatch(None, Some(&Type::void()), "toUpperCase").expect("upper");
        assert_eq!((d.table, d.ambiguous), (Table::Text, false));

        let d = dispatch(None, None, "includes").expect("includes");
        assert_eq!((d.table, d.ambiguous), (Table::Sequence, true));
    }

    #[test]
    fn other_known_receivers_are_user_methods() {
        assert!(dispatch(None, Some(&Type::aggregate("Stack")), "push").is_none());
        assert!(dispatch(None, None, "frobnicate").is_none());
    }

    #[test]
    fn namespace_lookup_is_direct() {
        let d = dispatch(Some(Namespace::Console), None, "log").expect("log");
        assert!(d.rule.is_statement());
        assert!(dispatch(Some(Namespace::Math), None, "push").is_none());
    }

    #[test]
    fn shadowed_namespace_is_not_a_namespace() {
        let obj = ident("console");
        assert_eq!(namespace_of(None, &obj, |_| false), Some(Namespace::Console));
        assert_eq!(namespace_of(None, &obj, |n| n == "console"), None);
        assert_eq!(namespace_of(Some("Math"), &obj, |_| true), Some(Namespace::Math));
    }

    #[test]
    fn render_fills_placeholders() {
        let push = Table::Sequence.lookup("push").expect("push");
        assert_eq!(
            push.render(Some("items"), &["x".to_string()], &[Type::f64()]),
            "items.push(x)"
        );

        let concat = Table::Text.lookup("concat").expect("concat");
        assert_eq!(
            concat.render(Some("a"), &["b".to_string()], &[Type::owned_text()]),
            "format!(\"{}{}\", a, b)"
        );

        let repeat = Table::Text.lookup("repeat").expect("repeat");
        assert_eq!(
            repeat.render(Some("s"), &["n + 1".to_string()], &[Type::f64()]),
            "s.repeat((n + 1) as usize)"
        );
    }

    #[test]
    fn render_builds_ranges_and_format_lists() {
        let slice = Table::Sequence.lookup("slice").expect("slice");
        assert_eq!(
            slice.render(Some("v"), &["1".to_string()], &[Type::f64()]),
            "v[1 as usize..].to_vec()"
        );

        let log = Table::Namespace(Namespace::Console).lookup("log").expect("log");
        assert_eq!(
            log.render(
                None,
                &["\"total\"".to_string(), "items".to_string()],
                &[Type::view_text(), Type::sequence(Type::f64())]
            ),
            "println!(\"{} {:?}\", \"total\", items)"
        );
        assert_eq!(log.render(None, &[], &[]), "println!()");
    }

    #[test]
    fn result_kinds_follow_receiver() {
        let seq = Type::sequence(Type::owned_text());
        assert_eq!(
            ResultKind::OptionalElement.resolve(Some(&seq), &[]),
            Type::optional(Type::owned_text())
        );
        assert_eq!(
            ResultKind::Receiver.resolve(Some(&Type::view_text()), &[]),
            Type::owned_text()
        );
        assert_eq!(ResultKind::Element.resolve(None, &[]), Type::void());
    }

    #[test]
    fn namespace_constants() {
        let pi = constant(Namespace::Math, "PI").expect("PI");
        assert_eq!(pi.template, "std::f64::consts::PI");
        assert!(constant(Namespace::Console, "PI").is_none());
    }
}
