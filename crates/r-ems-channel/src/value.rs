//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed values, channel descriptors and channel records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumIter, EnumString};

/// Type tag carried by every [`TypedValue`] and declared by every channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum DataType {
    /// `true` / `false`.
    Boolean,
    /// Signed 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Short,
    /// Signed 32-bit integer.
    Integer,
    /// Signed 64-bit integer.
    Long,
    /// 64-bit IEEE 754 floating point.
    Double,
    /// UTF-8 string.
    String,
    /// Raw byte payload.
    ByteArray,
}

/// A single value tagged with its [`DataType`].
///
/// Equality and hashing are structural: two values are equal only when both
/// the tag and the payload match. Doubles compare by bit pattern so `NaN`
/// equals itself and the type stays usable as a map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypedValue {
    /// Boolean payload.
    Boolean(bool),
    /// Byte payload.
    Byte(i8),
    /// Short payload.
    Short(i16),
    /// Integer payload.
    Integer(i32),
    /// Long payload.
    Long(i64),
    /// Double payload.
    Double(f64),
    /// String payload.
    String(String),
    /// Byte array payload.
    ByteArray(Vec<u8>),
}

impl TypedValue {
    /// Return the type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            TypedValue::Boolean(_) => DataType::Boolean,
            TypedValue::Byte(_) => DataType::Byte,
            TypedValue::Short(_) => DataType::Short,
            TypedValue::Integer(_) => DataType::Integer,
            TypedValue::Long(_) => DataType::Long,
            TypedValue::Double(_) => DataType::Double,
            TypedValue::String(_) => DataType::String,
            TypedValue::ByteArray(_) => DataType::ByteArray,
        }
    }

    /// Borrow the payload of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Return the payload of a long value.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            TypedValue::Long(value) => Some(*value),
            _ => None,
        }
    }

    /// Parse a configuration string into a value of the requested type.
    ///
    /// Byte arrays are expected as hex strings, booleans accept any casing.
    pub fn parse(data_type: DataType, raw: &str) -> Result<Self, ValueParseError> {
        let trimmed = raw.trim();
        let invalid = |reason: String| ValueParseError::Invalid {
            data_type,
            raw: raw.to_owned(),
            reason,
        };
        let value = match data_type {
            DataType::Boolean => {
                if trimmed.eq_ignore_ascii_case("true") {
                    TypedValue::Boolean(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    TypedValue::Boolean(false)
                } else {
                    return Err(invalid("expected true or false".to_owned()));
                }
            }
            DataType::Byte => {
                TypedValue::Byte(trimmed.parse().map_err(|err| invalid(format!("{err}")))?)
            }
            DataType::Short => {
                TypedValue::Short(trimmed.parse().map_err(|err| invalid(format!("{err}")))?)
            }
            DataType::Integer => {
                TypedValue::Integer(trimmed.parse().map_err(|err| invalid(format!("{err}")))?)
            }
            DataType::Long => {
                TypedValue::Long(trimmed.parse().map_err(|err| invalid(format!("{err}")))?)
            }
            DataType::Double => {
                TypedValue::Double(trimmed.parse().map_err(|err| invalid(format!("{err}")))?)
            }
            DataType::String => TypedValue::String(raw.to_owned()),
            DataType::ByteArray => {
                TypedValue::ByteArray(hex::decode(trimmed).map_err(|err| invalid(format!("{err}")))?)
            }
        };
        Ok(value)
    }

    /// Convert a JSON property value into a value of the requested type.
    ///
    /// Strings go through [`TypedValue::parse`]; numbers and booleans are
    /// range checked against the target type.
    pub fn from_json(data_type: DataType, raw: &JsonValue) -> Result<Self, ValueParseError> {
        if let JsonValue::String(text) = raw {
            return Self::parse(data_type, text);
        }
        let invalid = |reason: &str| ValueParseError::Invalid {
            data_type,
            raw: raw.to_string(),
            reason: reason.to_owned(),
        };
        let integer = || raw.as_i64().ok_or_else(|| invalid("expected an integer"));
        let value = match data_type {
            DataType::Boolean => {
                TypedValue::Boolean(raw.as_bool().ok_or_else(|| invalid("expected a boolean"))?)
            }
            DataType::Byte => TypedValue::Byte(
                i8::try_from(integer()?).map_err(|_| invalid("out of range for BYTE"))?,
            ),
            DataType::Short => TypedValue::Short(
                i16::try_from(integer()?).map_err(|_| invalid("out of range for SHORT"))?,
            ),
            DataType::Integer => TypedValue::Integer(
                i32::try_from(integer()?).map_err(|_| invalid("out of range for INTEGER"))?,
            ),
            DataType::Long => TypedValue::Long(integer()?),
            DataType::Double => {
                TypedValue::Double(raw.as_f64().ok_or_else(|| invalid("expected a number"))?)
            }
            DataType::String => TypedValue::String(raw.to_string()),
            DataType::ByteArray => return Err(invalid("byte arrays must be hex strings")),
        };
        Ok(value)
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypedValue::Boolean(a), TypedValue::Boolean(b)) => a == b,
            (TypedValue::Byte(a), TypedValue::Byte(b)) => a == b,
            (TypedValue::Short(a), TypedValue::Short(b)) => a == b,
            (TypedValue::Integer(a), TypedValue::Integer(b)) => a == b,
            (TypedValue::Long(a), TypedValue::Long(b)) => a == b,
            (TypedValue::Double(a), TypedValue::Double(b)) => a.to_bits() == b.to_bits(),
            (TypedValue::String(a), TypedValue::String(b)) => a == b,
            (TypedValue::ByteArray(a), TypedValue::ByteArray(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_type().hash(state);
        match self {
            TypedValue::Boolean(value) => value.hash(state),
            TypedValue::Byte(value) => value.hash(state),
            TypedValue::Short(value) => value.hash(state),
            TypedValue::Integer(value) => value.hash(state),
            TypedValue::Long(value) => value.hash(state),
            TypedValue::Double(value) => value.to_bits().hash(state),
            TypedValue::String(value) => value.hash(state),
            TypedValue::ByteArray(value) => value.hash(state),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Boolean(value) => write!(f, "{value}"),
            TypedValue::Byte(value) => write!(f, "{value}"),
            TypedValue::Short(value) => write!(f, "{value}"),
            TypedValue::Integer(value) => write!(f, "{value}"),
            TypedValue::Long(value) => write!(f, "{value}"),
            TypedValue::Double(value) => write!(f, "{value}"),
            TypedValue::String(value) => f.write_str(value),
            TypedValue::ByteArray(value) => f.write_str(&hex::encode(value)),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Boolean(value)
    }
}

impl From<i8> for TypedValue {
    fn from(value: i8) -> Self {
        TypedValue::Byte(value)
    }
}

impl From<i16> for TypedValue {
    fn from(value: i16) -> Self {
        TypedValue::Short(value)
    }
}

impl From<i32> for TypedValue {
    fn from(value: i32) -> Self {
        TypedValue::Integer(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Long(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Double(value)
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::String(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_owned())
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(value: Vec<u8>) -> Self {
        TypedValue::ByteArray(value)
    }
}

/// Raised when a configuration value cannot be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueParseError {
    /// The raw input is not a valid representation of the target type.
    #[error("cannot convert {raw:?} to {data_type}: {reason}")]
    Invalid {
        /// Requested type.
        data_type: DataType,
        /// Offending input.
        raw: String,
        /// Parser diagnostic.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn equality_requires_matching_tag() {
        assert_eq!(TypedValue::Integer(5), TypedValue::Integer(5));
        assert_ne!(TypedValue::Integer(5), TypedValue::Long(5));
        assert_ne!(TypedValue::Integer(5), TypedValue::from("5"));
    }

    #[test]
    fn doubles_compare_by_bit_pattern() {
        assert_eq!(TypedValue::Double(f64::NAN), TypedValue::Double(f64::NAN));
        assert_ne!(TypedValue::Double(0.0), TypedValue::Double(-0.0));

        let mut set = HashSet::new();
        set.insert(TypedValue::Double(1.5));
        assert!(set.contains(&TypedValue::Double(1.5)));
        assert!(!set.contains(&TypedValue::Long(1)));
    }

    #[test]
    fn data_type_names_round_trip_through_strum() {
        for data_type in DataType::iter() {
            let name = data_type.to_string();
            assert_eq!(name.parse::<DataType>().unwrap(), data_type);
        }
        assert_eq!(DataType::ByteArray.to_string(), "BYTE_ARRAY");
        assert_eq!("integer".parse::<DataType>().unwrap(), DataType::Integer);
    }

    #[test]
    fn parse_covers_every_type() {
        assert_eq!(
            TypedValue::parse(DataType::Boolean, "TRUE").unwrap(),
            TypedValue::Boolean(true)
        );
        assert_eq!(
            TypedValue::parse(DataType::Byte, "-7").unwrap(),
            TypedValue::Byte(-7)
        );
        assert_eq!(
            TypedValue::parse(DataType::Short, "1200").unwrap(),
            TypedValue::Short(1200)
        );
        assert_eq!(
            TypedValue::parse(DataType::Integer, " 42 ").unwrap(),
            TypedValue::Integer(42)
        );
        assert_eq!(
            TypedValue::parse(DataType::Long, "9000000000").unwrap(),
            TypedValue::Long(9_000_000_000)
        );
        assert_eq!(
            TypedValue::parse(DataType::Double, "21.5").unwrap(),
            TypedValue::Double(21.5)
        );
        assert_eq!(
            TypedValue::parse(DataType::String, " raw ").unwrap(),
            TypedValue::from(" raw ")
        );
        assert_eq!(
            TypedValue::parse(DataType::ByteArray, "0aff").unwrap(),
            TypedValue::ByteArray(vec![0x0a, 0xff])
        );
    }

    #[test]
    fn parse_rejects_out_of_range_input() {
        let err = TypedValue::parse(DataType::Byte, "300").unwrap_err();
        assert!(matches!(
            err,
            ValueParseError::Invalid {
                data_type: DataType::Byte,
                ..
            }
        ));
        assert!(TypedValue::parse(DataType::Boolean, "yes").is_err());
        assert!(TypedValue::parse(DataType::ByteArray, "xyz").is_err());
    }

    #[test]
    fn from_json_checks_ranges() {
        assert_eq!(
            TypedValue::from_json(DataType::Integer, &json!(15)).unwrap(),
            TypedValue::Integer(15)
        );
        assert_eq!(
            TypedValue::from_json(DataType::Double, &json!(3)).unwrap(),
            TypedValue::Double(3.0)
        );
        assert_eq!(
            TypedValue::from_json(DataType::Long, &json!("12")).unwrap(),
            TypedValue::Long(12)
        );
        assert!(TypedValue::from_json(DataType::Short, &json!(70000)).is_err());
        assert!(TypedValue::from_json(DataType::Boolean, &json!(1)).is_err());
    }

    #[test]
    fn serde_uses_tagged_representation() {
        let encoded = serde_json::to_value(TypedValue::Integer(5)).unwrap();
        assert_eq!(encoded, json!({"type": "INTEGER", "value": 5}));
        let decoded: TypedValue =
            serde_json::from_value(json!({"type": "BYTE_ARRAY", "value": [1, 2]})).unwrap();
        assert_eq!(decoded, TypedValue::ByteArray(vec![1, 2]));
    }

    #[test]
    fn display_renders_payload() {
        assert_eq!(TypedValue::from(true).to_string(), "true");
        assert_eq!(TypedValue::ByteArray(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(TypedValue::from("bar").to_string(), "bar");
    }
}
