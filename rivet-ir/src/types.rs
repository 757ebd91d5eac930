#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Bool,
    Void,
    /// Text that owns its buffer.
    OwnedText,
    /// Text borrowed from some other buffer.
    ViewText,
}

impl Primitive {
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            Primitive::Bool | Primitive::Void | Primitive::OwnedText | Primitive::ViewText
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_text(self) -> bool {
        matches!(self, Primitive::OwnedText | Primitive::ViewText)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Primitive(Primitive),
    Sequence(Box<Type>),
    /// Named reference to a struct-like declaration.
    Aggregate(String),
    /// Named reference to a tagged-enum declaration.
    Enum(String),
    Tuple(Vec<Type>),
    Optional(Box<Type>),
    Reference { inner: Box<Type>, mutable: bool },
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    pub fn void() -> Self {
        Type::Primitive(Primitive::Void)
    }

    pub fn bool() -> Self {
        Type::Primitive(Primitive::Bool)
    }

    pub fn f64() -> Self {
        Type::Primitive(Primitive::F64)
    }

    pub fn usize() -> Self {
        Type::Primitive(Primitive::Usize)
    }

    pub fn owned_text() -> Self {
        Type::Primitive(Primitive::OwnedText)
    }

    pub fn view_text() -> Self {
        Type::Primitive(Primitive::ViewText)
    }

    pub fn sequence(elem: Type) -> Self {
        Type::Sequence(Box::new(elem))
    }

    pub fn optional(inner: Type) -> Self {
        Type::Optional(Box::new(inner))
    }

    pub fn reference(inner: Type, mutable: bool) -> Self {
        Type::Reference {
            inner: Box::new(inner),
            mutable,
        }
    }

    pub fn aggregate(name: impl Into<String>) -> Self {
        Type::Aggregate(name.into())
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Type::Enum(name.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Void))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Type::Primitive(p) if p.is_text())
    }

    pub fn is_owned_text(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::OwnedText))
    }

    pub fn is_view_text(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::ViewText))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Type::Sequence(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Primitive(p) if p.is_float())
    }

    /// Peel off any number of reference layers.
    pub fn strip_refs(&self) -> &Type {
        match self {
            Type::Reference { inner, .. } => inner.strip_refs(),
            other => other,
        }
    }

    /// Element type of a sequence (through references).
    pub fn element(&self) -> Option<&Type> {
        match self.strip_refs() {
            Type::Sequence(elem) => Some(elem),
            _ => None,
        }
    }

    /// Name of the aggregate or enum this type refers to, if any.
    pub fn nominal_name(&self) -> Option<&str> {
        match self.strip_refs() {
            Type::Aggregate(n) | Type::Enum(n) => Some(n.as_str()),
            _ => None,
        }
    }

    /// Source-level rendering, used in diagnostics.
    pub fn display(&self) -> String {
        match self {
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
                Primitive::F64 => "number".to_string(),
                Primitive::Bool => "boolean".to_string(),
                Primitive::Void => "void".to_string(),
                Primitive::OwnedText => "string".to_string(),
                Primitive::ViewText => "string (view)".to_string(),
            },
            Type::Sequence(elem) => format!("{}[]", elem.display()),
            Type::Aggregate(n) | Type::Enum(n) => n.clone(),
            Type::Tuple(elems) => {
                let parts = elems.iter().map(|t| t.display()).collect::<Vec<_>>();
                format!("[{}]", parts.join(", "))
            }
            Type::Optional(inner) => format!("{} | null", inner.display()),
            Type::Reference { inner, mutable } => {
                if *mutable {
                    format!("&mut {}", inner.display())
                } else {
                    format!("&{}", inner.display())
                }
            }
            Type::Function { params, ret } => {
                let parts = params.iter().map(|t| t.display()).collect::<Vec<_>>();
                format!("({}) => {}", parts.join(", "), ret.display())
            }
        }
    }
}
