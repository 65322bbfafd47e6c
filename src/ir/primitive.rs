use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::intern::Name;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// Names of the builtin operator functions declared on primitive types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum OperatorName {
    Plus,
    Minus,
    Times,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Inv,
    Not,
    UnaryMinus,
    UnaryPlus,
    Inc,
    Dec,
    CompareTo,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equals,
    ToByte,
    ToShort,
    ToInt,
    ToLong,
    ToFloat,
    ToDouble,
    ToChar,
}

impl OperatorName {
    pub fn name(self) -> Name {
        Name::new(self.into())
    }

    /// Number of arguments besides the receiver
    pub fn arity(self) -> usize {
        match self {
            OperatorName::Inv
            | OperatorName::Not
            | OperatorName::UnaryMinus
            | OperatorName::UnaryPlus
            | OperatorName::Inc
            | OperatorName::Dec
            | OperatorName::ToByte
            | OperatorName::ToShort
            | OperatorName::ToInt
            | OperatorName::ToLong
            | OperatorName::ToFloat
            | OperatorName::ToDouble
            | OperatorName::ToChar => 0,
            _ => 1,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            OperatorName::Less
                | OperatorName::LessOrEqual
                | OperatorName::Greater
                | OperatorName::GreaterOrEqual
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            OperatorName::And
                | OperatorName::Or
                | OperatorName::Xor
                | OperatorName::Shl
                | OperatorName::Shr
                | OperatorName::Ushr
                | OperatorName::Inv
        )
    }

    pub fn conversion_target(self) -> Option<PrimitiveKind> {
        match self {
            OperatorName::ToByte => Some(PrimitiveKind::Byte),
            OperatorName::ToShort => Some(PrimitiveKind::Short),
            OperatorName::ToInt => Some(PrimitiveKind::Int),
            OperatorName::ToLong => Some(PrimitiveKind::Long),
            OperatorName::ToFloat => Some(PrimitiveKind::Float),
            OperatorName::ToDouble => Some(PrimitiveKind::Double),
            OperatorName::ToChar => Some(PrimitiveKind::Char),
            _ => None,
        }
    }
}

impl PrimitiveKind {
    pub fn is_integral(&self) -> bool {
        matches!(self, PrimitiveKind::Int | PrimitiveKind::Long)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    pub fn supports_operator(&self, operator: OperatorName) -> bool {
        if operator.conversion_target().is_some() {
            // Converting a boolean is never allowed, floats to char is deprecated
            return match self {
                PrimitiveKind::Boolean => false,
                PrimitiveKind::Float | PrimitiveKind::Double => operator != OperatorName::ToChar,
                _ => true,
            };
        }

        match self {
            // Everything besides logical not
            PrimitiveKind::Int | PrimitiveKind::Long => operator != OperatorName::Not,
            // No bitwise or logical ops
            PrimitiveKind::Float | PrimitiveKind::Double => match operator {
                OperatorName::Plus
                | OperatorName::Minus
                | OperatorName::Times
                | OperatorName::Div
                | OperatorName::Rem
                | OperatorName::UnaryMinus
                | OperatorName::UnaryPlus
                | OperatorName::Inc
                | OperatorName::Dec
                | OperatorName::CompareTo
                | OperatorName::Equals => true,
                other => other.is_comparison(),
            },
            // Only comparisons
            PrimitiveKind::Byte | PrimitiveKind::Short => {
                matches!(operator, OperatorName::CompareTo | OperatorName::Equals)
                    || operator.is_comparison()
            }
            // Comparisons and stepping
            PrimitiveKind::Char => {
                matches!(
                    operator,
                    OperatorName::CompareTo
                        | OperatorName::Equals
                        | OperatorName::Inc
                        | OperatorName::Dec
                ) || operator.is_comparison()
            }
            // Only logical ops
            PrimitiveKind::Boolean => matches!(
                operator,
                OperatorName::And
                    | OperatorName::Or
                    | OperatorName::Xor
                    | OperatorName::Not
                    | OperatorName::Equals
                    | OperatorName::CompareTo
            ),
        }
    }

    /// Result kind of applying `operator` to a receiver of this kind, `None`
    /// when the operator is not supported.
    pub fn result_of(&self, operator: OperatorName) -> Option<PrimitiveKind> {
        if !self.supports_operator(operator) {
            return None;
        }

        if let Some(target) = operator.conversion_target() {
            return Some(target);
        }

        Some(match operator {
            OperatorName::Equals
            | OperatorName::Less
            | OperatorName::LessOrEqual
            | OperatorName::Greater
            | OperatorName::GreaterOrEqual => PrimitiveKind::Boolean,
            OperatorName::CompareTo => PrimitiveKind::Int,
            _ => *self,
        })
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn operator_names_use_member_spelling() {
        assert_eq!(OperatorName::UnaryMinus.to_string(), "unaryMinus");
        assert_eq!(OperatorName::LessOrEqual.name().value(), "lessOrEqual");
        assert_eq!("toInt".parse::<OperatorName>(), Ok(OperatorName::ToInt));
    }

    #[test]
    fn boolean_only_supports_logic() {
        let supported = OperatorName::iter()
            .filter(|op| PrimitiveKind::Boolean.supports_operator(*op))
            .collect::<Vec<_>>();

        assert_eq!(
            supported,
            vec![
                OperatorName::And,
                OperatorName::Or,
                OperatorName::Xor,
                OperatorName::Not,
                OperatorName::CompareTo,
                OperatorName::Equals,
            ]
        );
    }

    #[test]
    fn comparison_results_are_boolean() {
        assert_eq!(
            PrimitiveKind::Long.result_of(OperatorName::Less),
            Some(PrimitiveKind::Boolean)
        );
        assert_eq!(
            PrimitiveKind::Char.result_of(OperatorName::ToInt),
            Some(PrimitiveKind::Int)
        );
        assert_eq!(PrimitiveKind::Double.result_of(OperatorName::Shl), None);
    }
}
