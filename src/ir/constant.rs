use serde::{Deserialize, Serialize};

use super::{primitive::PrimitiveKind, ty::Type};

/// A literal value. Every value has exactly one static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Boolean(bool),
    /// A UTF-16 code unit, possibly half of a surrogate pair
    Char(u16),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl ConstValue {
    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Boolean(_) => Type::Primitive(PrimitiveKind::Boolean),
            ConstValue::Char(_) => Type::Primitive(PrimitiveKind::Char),
            ConstValue::Byte(_) => Type::Primitive(PrimitiveKind::Byte),
            ConstValue::Short(_) => Type::Primitive(PrimitiveKind::Short),
            ConstValue::Int(_) => Type::Primitive(PrimitiveKind::Int),
            ConstValue::Long(_) => Type::Primitive(PrimitiveKind::Long),
            ConstValue::Float(_) => Type::Primitive(PrimitiveKind::Float),
            ConstValue::Double(_) => Type::Primitive(PrimitiveKind::Double),
            ConstValue::String(_) => Type::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// The value as it appears when converted to a string at runtime, used
    /// for string templates.
    pub fn stringify(&self) -> String {
        match self {
            ConstValue::Boolean(value) => value.to_string(),
            ConstValue::Char(value) => String::from_utf16_lossy(&[*value]),
            ConstValue::Byte(value) => value.to_string(),
            ConstValue::Short(value) => value.to_string(),
            ConstValue::Int(value) => value.to_string(),
            ConstValue::Long(value) => value.to_string(),
            ConstValue::Float(value) => format_floating(*value, f64::from(*value)),
            ConstValue::Double(value) => format_floating(*value, *value),
            ConstValue::String(value) => value.clone(),
        }
    }

    /// Appends the runtime string form as UTF-16 code units, so chars holding
    /// the halves of a surrogate pair join up when concatenated.
    pub fn encode_utf16_into(&self, units: &mut Vec<u16>) {
        match self {
            ConstValue::Char(unit) => units.push(*unit),
            other => units.extend(other.stringify().encode_utf16()),
        }
    }
}

/// Concatenates the runtime string forms of `values`
pub fn concatenate<'a>(values: impl IntoIterator<Item = &'a ConstValue>) -> String {
    let mut units = Vec::new();
    for value in values {
        value.encode_utf16_into(&mut units);
    }
    String::from_utf16_lossy(&units)
}

/// Shortest digits that read back as the same value, in plain notation for
/// magnitudes in `[1e-3, 1e7)` and as `d.dddE±n` otherwise. Formatting the
/// value at its own width keeps `0.1f` from printing its widened digits.
fn format_floating<F>(value: F, wide: f64) -> String
where
    F: core::fmt::Display + core::fmt::LowerExp,
{
    if wide.is_nan() {
        return "NaN".to_owned();
    }
    if wide.is_infinite() {
        return if wide > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }

    let magnitude = wide.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let plain = value.to_string();
        return if plain.contains('.') { plain } else { format!("{plain}.0") };
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    if mantissa.contains('.') {
        format!("{mantissa}E{exponent}")
    } else {
        format!("{mantissa}.0E{exponent}")
    }
}

impl core::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::Char(value) => match char::from_u32(u32::from(*value)) {
                Some(c) => write!(f, "{c:?}"),
                None => write!(f, "'\\u{value:04X}'"),
            },
            ConstValue::Byte(value) => write!(f, "{value}.toByte()"),
            ConstValue::Short(value) => write!(f, "{value}.toShort()"),
            ConstValue::Long(value) => write!(f, "{value}L"),
            ConstValue::Float(_) => write!(f, "{}f", self.stringify()),
            ConstValue::String(value) => write!(f, "{value:?}"),
            other => write!(f, "{}", other.stringify()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_follows_runtime_formatting() {
        assert_eq!(ConstValue::Double(1.0).stringify(), "1.0");
        assert_eq!(ConstValue::Double(2.5).stringify(), "2.5");
        assert_eq!(ConstValue::Float(-0.5).stringify(), "-0.5");
        assert_eq!(ConstValue::Long(-3).stringify(), "-3");
        assert_eq!(ConstValue::Char(u16::from(b'x')).stringify(), "x");
    }

    #[test]
    fn floats_print_at_their_own_precision() {
        assert_eq!(ConstValue::Float(0.1).stringify(), "0.1");
        assert_eq!(ConstValue::Float(1.0e10).stringify(), "1.0E10");
        assert_eq!(ConstValue::Double(0.1).stringify(), "0.1");
    }

    #[test]
    fn large_and_small_magnitudes_use_exponent_notation() {
        assert_eq!(ConstValue::Double(1e7).stringify(), "1.0E7");
        assert_eq!(ConstValue::Double(1e-4).stringify(), "1.0E-4");
        assert_eq!(ConstValue::Double(-1.5e-5).stringify(), "-1.5E-5");
        assert_eq!(ConstValue::Double(1234567.0).stringify(), "1234567.0");
        assert_eq!(ConstValue::Double(0.001).stringify(), "0.001");
        assert_eq!(ConstValue::Double(-0.0).stringify(), "-0.0");
        assert_eq!(ConstValue::Double(f64::NAN).stringify(), "NaN");
    }

    #[test]
    fn surrogate_halves_join_when_concatenated() {
        let smiley = "😀".encode_utf16().collect::<Vec<_>>();
        let values = [
            ConstValue::String("a".into()),
            ConstValue::Char(smiley[0]),
            ConstValue::Char(smiley[1]),
            ConstValue::Int(1),
        ];

        assert_eq!(concatenate(&values), "a😀1");
        assert_eq!(ConstValue::Char(smiley[0]).stringify(), "\u{FFFD}");
    }

    #[test]
    fn display_marks_literal_kind() {
        assert_eq!(ConstValue::Long(7).to_string(), "7L");
        assert_eq!(ConstValue::String("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(ConstValue::Char(u16::from(b'c')).to_string(), "'c'");
        assert_eq!(ConstValue::Char(0xD800).to_string(), "'\\uD800'");
    }
}
