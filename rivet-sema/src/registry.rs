#![forbid(unsafe_code)]

use std::collections::HashMap;

use rivet_ir::{Decl, EnumDecl, FunctionDecl, Program, Receiver, StructDecl, Type};

/// Alias chains longer than this are treated as cyclic and left unexpanded.
const MAX_ALIAS_DEPTH: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub struct FnSig {
    pub params: Vec<Type>,
    pub ret: Type,
    pub receiver: Option<Receiver>,
}

impl FnSig {
    fn of(f: &FunctionDecl) -> Self {
        Self {
            params: f.params.iter().map(|p| p.ty.clone()).collect(),
            ret: f.ret.clone(),
            receiver: f.receiver,
        }
    }
}

/// Named declarations of one translation unit.
///
/// Built once from the program before any body is examined, so forward
/// references between declarations resolve. The registry is an explicit
/// value threaded through resolution and generation; nothing global.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, StructDecl>,
    enums: HashMap<String, EnumDecl>,
    aliases: HashMap<String, Type>,
    functions: HashMap<String, FnSig>,
    methods: HashMap<String, HashMap<String, FnSig>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_program(program: &Program) -> Self {
        let mut reg = Self::new();
        for decl in &program.decls {
            match decl {
                Decl::Struct(s) => {
                    reg.structs.insert(s.name.clone(), s.clone());
                }
                Decl::Enum(e) => {
                    reg.enums.insert(e.name.clone(), e.clone());
                }
                Decl::Alias(a) => {
                    reg.aliases.insert(a.name.clone(), a.target.clone());
                }
                Decl::Function(f) => {
                    reg.functions.insert(f.name.clone(), FnSig::of(f));
                }
                Decl::Impl(block) => {
                    let table = reg.methods.entry(block.target.clone()).or_default();
                    for m in &block.methods {
                        table.insert(m.name.clone(), FnSig::of(m));
                    }
                }
            }
        }
        reg
    }

    pub fn is_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn is_enum(&self, name: &str) -> bool {
        self.enums.contains_key(name)
    }

    pub fn struct_decl(&self, name: &str) -> Option<&StructDecl> {
        self.structs.get(name)
    }

    pub fn enum_decl(&self, name: &str) -> Option<&EnumDecl> {
        self.enums.get(name)
    }

    pub fn alias(&self, name: &str) -> Option<&Type> {
        self.aliases.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FnSig> {
        self.functions.get(name)
    }

    pub fn method(&self, target: &str, name: &str) -> Option<&FnSig> {
        self.methods.get(target).and_then(|t| t.get(name))
    }

    /// Declared type of `field` on aggregate `name`.
    pub fn field_type(&self, name: &str, field: &str) -> Option<&Type> {
        self.structs
            .get(name)?
            .fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| &f.ty)
    }

    /// Payload types of `Enum::variant`, in declaration order.
    pub fn variant_payload(&self, enum_name: &str, variant: &str) -> Option<Vec<&Type>> {
        let v = self.enums.get(enum_name)?.variant(variant)?;
        Some(v.shape.payload_types())
    }

    /// Expand aliases and fix up named references whose kind the front-end
    /// could not know (an `Aggregate` name that is really an enum).
    pub fn normalize(&self, ty: &Type) -> Type {
        self.normalize_depth(ty, 0)
    }

    fn normalize_depth(&self, ty: &Type, depth: usize) -> Type {
        if depth > MAX_ALIAS_DEPTH {
            return ty.clone();
        }
        match ty {
            Type::Aggregate(n) | Type::Enum(n) => {
                if let Some(target) = self.aliases.get(n) {
                    return self.normalize_depth(target, depth + 1);
                }
                if self.enums.contains_key(n) {
                    Type::Enum(n.clone())
                } else {
                    Type::Aggregate(n.clone())
                }
            }
            Type::Sequence(elem) => Type::sequence(self.normalize_depth(elem, depth + 1)),
            Type::Optional(inner) => Type::optional(self.normalize_depth(inner, depth + 1)),
            Type::Tuple(elems) => Type::Tuple(
                elems
                    .iter()
                    .map(|t| self.normalize_depth(t, depth + 1))
                    .collect(),
            ),
            Type::Reference { inner, mutable } => {
                Type::reference(self.normalize_depth(inner, depth + 1), *mutable)
            }
            Type::Function { params, ret } => Type::Function {
                params: params
                    .iter()
                    .map(|t| self.normalize_depth(t, depth + 1))
                    .collect(),
                ret: Box::new(self.normalize_depth(ret, depth + 1)),
            },
            Type::Primitive(_) => ty.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_ir::build::*;

    fn sample() -> Program {
        Program::new(vec![
            // `Line` refers to `Point` before `Point` is declared.
            Decl::Struct(struct_decl(
                "Line",
                vec![("from", Type::aggregate("Point")), ("to", Type::aggregate("Point"))],
            )),
            Decl::Struct(struct_decl("Point", vec![("x", Type::f64())])),
            Decl::Enum(enum_decl("Color", vec![unit_variant("Red")])),
            Decl::Alias(alias("Meters", Type::f64())),
            Decl::Alias(alias("Tint", Type::aggregate("Color"))),
        ])
    }

    #[test]
    fn forward_references_resolve() {
        let reg = TypeRegistry::from_program(&sample());
        assert_eq!(reg.field_type("Line", "from"), Some(&Type::aggregate("Point")));
        assert!(reg.is_struct("Point"));
        assert_eq!(reg.field_type("Point", "missing"), None);
    }

    #[test]
    fn normalize_expands_aliases_and_enum_names() {
        let reg = TypeRegistry::from_program(&sample());
        assert_eq!(reg.normalize(&Type::aggregate("Meters")), Type::f64());
        assert_eq!(reg.normalize(&Type::aggregate("Tint")), Type::enumeration("Color"));
        assert_eq!(
            reg.normalize(&Type::sequence(Type::aggregate("Meters"))),
            Type::sequence(Type::f64())
        );
    }

    #[test]
    fn cyclic_aliases_do_not_hang() {
        let program = Program::new(vec![
            Decl::Alias(alias("A", Type::aggregate("B"))),
            Decl::Alias(alias("B", Type::aggregate("A"))),
        ]);
        let reg = TypeRegistry::from_program(&program);
        let _ = reg.normalize(&Type::aggregate("A"));
    }
}
