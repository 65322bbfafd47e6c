use serde::{Deserialize, Serialize};

use super::primitive::PrimitiveKind;
use crate::intern::Name;

/// Static type of an IR expression or local.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Primitive(PrimitiveKind),
    String,
    Unit,
    /// Type of expressions that never complete normally (return, break,
    /// continue)
    Nothing,
    Any,
    Array(Box<Type>),
    /// A closed arithmetic progression over `Int`, `Long` or `Char`
    Progression(PrimitiveKind),
    Iterator(Box<Type>),
    Iterable(Box<Type>),
    Class(Name),
}

impl Type {
    pub const BOOLEAN: Type = Type::Primitive(PrimitiveKind::Boolean);
    pub const CHAR: Type = Type::Primitive(PrimitiveKind::Char);
    pub const INT: Type = Type::Primitive(PrimitiveKind::Int);
    pub const LONG: Type = Type::Primitive(PrimitiveKind::Long);
    pub const DOUBLE: Type = Type::Primitive(PrimitiveKind::Double);

    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Element type when iterating over a value of this type
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Type::Array(element) | Type::Iterator(element) | Type::Iterable(element) => {
                Some((**element).clone())
            }
            Type::String => Some(Type::CHAR),
            Type::Progression(kind) => Some(Type::Primitive(*kind)),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is
    /// expected. `Nothing` is a subtype of everything and everything is a
    /// subtype of `Any`.
    pub fn accepts(&self, other: &Type) -> bool {
        self == other || matches!(other, Type::Nothing) || matches!(self, Type::Any)
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(kind) => write!(f, "{kind}"),
            Type::String => write!(f, "String"),
            Type::Unit => write!(f, "Unit"),
            Type::Nothing => write!(f, "Nothing"),
            Type::Any => write!(f, "Any"),
            Type::Array(element) => write!(f, "Array<{element}>"),
            Type::Progression(kind) => write!(f, "{kind}Progression"),
            Type::Iterator(element) => write!(f, "Iterator<{element}>"),
            Type::Iterable(element) => write!(f, "Iterable<{element}>"),
            Type::Class(name) => write!(f, "{name}"),
        }
    }
}
