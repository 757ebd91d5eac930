#![forbid(unsafe_code)]

use std::collections::HashSet;

use rivet_ir::{Primitive, Program, Type};

use crate::registry::TypeRegistry;

/// Names of aggregates and enums known to be trivially duplicable, plus the
/// alias table needed to see through named references.
#[derive(Clone, Debug, Default)]
pub struct CopySet<'r> {
    names: HashSet<String>,
    registry: Option<&'r TypeRegistry>,
}

impl<'r> CopySet<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: &'r TypeRegistry) -> Self {
        Self {
            names: HashSet::new(),
            registry: Some(registry),
        }
    }

    /// Every declaration currently carrying the `Copy` tag.
    pub fn from_program(program: &Program, registry: &'r TypeRegistry) -> Self {
        let mut set = Self::with_registry(registry);
        for s in program.structs().filter(|s| s.has_derive("Copy")) {
            set.insert(&s.name);
        }
        for e in program.enums().filter(|e| e.has_derive("Copy")) {
            set.insert(&e.name);
        }
        set
    }

    pub fn registry(&self) -> Option<&'r TypeRegistry> {
        self.registry
    }

    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Whether a field of type `ty` keeps its owner derivable as `Copy`.
    pub fn admits(&self, ty: &Type) -> bool {
        match self.normalized(ty) {
            Type::Primitive(p) => p != Primitive::OwnedText,
            Type::Sequence(_) | Type::Function { .. } => false,
            Type::Aggregate(n) | Type::Enum(n) => self.contains(&n),
            Type::Tuple(elems) => elems.iter().all(|t| self.admits(t)),
            Type::Optional(inner) => self.admits(&inner),
            Type::Reference { mutable, .. } => !mutable,
        }
    }

    /// Whether a variable of type `ty` can be read repeatedly without an
    /// explicit duplicate. Stricter than [`CopySet::admits`]: optional and
    /// function values always count as owning.
    pub fn is_duplicable(&self, ty: &Type) -> bool {
        match self.normalized(ty) {
            Type::Optional(_) | Type::Function { .. } => false,
            Type::Tuple(elems) => elems.iter().all(|t| self.is_duplicable(t)),
            other => self.admits(&other),
        }
    }

    fn normalized(&self, ty: &Type) -> Type {
        match self.registry {
            Some(reg) => reg.normalize(ty),
            None => ty.clone(),
        }
    }
}
