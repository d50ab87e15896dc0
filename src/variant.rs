// src/variant.rs - Value system for condition fields and address-space variables
//
// Modeled after a closed value union with checked conversion helpers; every
// condition field and every address-space variable holds one of these.

use crate::node_id::NodeId;
use crate::status::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable text with an optional locale, as used by two-state
/// variables and condition messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocalizedText {
    /// Locale code ("en" unless stated otherwise)
    pub locale: String,
    /// Text content
    pub text: String,
}

impl LocalizedText {
    /// English text
    pub fn english(text: impl Into<String>) -> Self {
        Self {
            locale: "en".to_string(),
            text: text.into(),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl From<&str> for LocalizedText {
    fn from(text: &str) -> Self {
        LocalizedText::english(text)
    }
}

/// Core value type enumeration.
///
/// # Examples
///
/// ```rust
/// use sentra::Variant;
///
/// let v = Variant::Float(3.14);
/// assert_eq!(v.as_f64(), Some(3.14));
/// assert_eq!(Variant::Int(1).as_bool(), Some(true));
/// assert!(Variant::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// Absent value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (64-bit)
    Int(i64),
    /// Floating-point value (64-bit)
    Float(f64),
    /// String value
    String(String),
    /// Opaque byte string (event ids)
    ByteString(Vec<u8>),
    /// Localized text (messages, two-state display values)
    LocalizedText(LocalizedText),
    /// Node identifier
    NodeId(NodeId),
    /// Timestamp value
    DateTime(DateTime<Utc>),
    /// Status code value (quality fields)
    StatusCode(StatusCode),
}

/// Variant kind, used for basic data-type validation of input variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantKind {
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Float
    Float,
    /// String
    String,
    /// Byte string
    ByteString,
    /// Localized text
    LocalizedText,
    /// Node id
    NodeId,
    /// Timestamp
    DateTime,
    /// Status code
    StatusCode,
    /// Unconstrained
    Any,
}

impl VariantKind {
    /// True for kinds a limit alarm can evaluate
    pub fn is_numeric(self) -> bool {
        matches!(self, VariantKind::Int | VariantKind::Float)
    }
}

impl Variant {
    /// True for the absent value
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Convert to boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            Variant::Int(i) => Some(*i != 0),
            Variant::Float(f) => Some(*f != 0.0 && !f.is_nan()),
            _ => None,
        }
    }

    /// Convert to integer if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            Variant::Bool(b) => Some(if *b { 1 } else { 0 }),
            Variant::Float(f) => {
                if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Convert to float if possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Float(f) => Some(*f),
            Variant::Int(i) => Some(*i as f64),
            Variant::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Borrow as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            Variant::LocalizedText(t) => Some(&t.text),
            _ => None,
        }
    }

    /// Borrow as bytes if this is a byte string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Variant::ByteString(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow as node id
    pub fn as_node_id(&self) -> Option<&NodeId> {
        match self {
            Variant::NodeId(id) => Some(id),
            _ => None,
        }
    }

    /// Convert to timestamp
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Variant::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    /// Get the kind of this value
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Null => VariantKind::Any,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Int(_) => VariantKind::Int,
            Variant::Float(_) => VariantKind::Float,
            Variant::String(_) => VariantKind::String,
            Variant::ByteString(_) => VariantKind::ByteString,
            Variant::LocalizedText(_) => VariantKind::LocalizedText,
            Variant::NodeId(_) => VariantKind::NodeId,
            Variant::DateTime(_) => VariantKind::DateTime,
            Variant::StatusCode(_) => VariantKind::StatusCode,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "null",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::String(_) => "string",
            Variant::ByteString(_) => "byte_string",
            Variant::LocalizedText(_) => "localized_text",
            Variant::NodeId(_) => "node_id",
            Variant::DateTime(_) => "datetime",
            Variant::StatusCode(_) => "status_code",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::String(s) => write!(f, "{}", s),
            Variant::ByteString(b) => write!(f, "<bytes:{}>", b.len()),
            Variant::LocalizedText(t) => write!(f, "{}", t),
            Variant::NodeId(id) => write!(f, "{}", id),
            Variant::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            Variant::StatusCode(sc) => write!(f, "{}", sc),
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Null
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<LocalizedText> for Variant {
    fn from(v: LocalizedText) -> Self {
        Variant::LocalizedText(v)
    }
}

impl From<NodeId> for Variant {
    fn from(v: NodeId) -> Self {
        Variant::NodeId(v)
    }
}

/// A value together with its quality status and source timestamp.
///
/// This is the unit read from and written to address-space variables and
/// the cell type of event payloads (where disabled-condition masking is
/// expressed as a `BadConditionDisabled` status with a null value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// The value itself
    pub value: Variant,
    /// Quality of the value
    pub status: StatusCode,
    /// Source timestamp
    pub source_timestamp: DateTime<Utc>,
}

impl DataValue {
    /// A good-quality value stamped now
    pub fn good(value: Variant) -> Self {
        Self {
            value,
            status: StatusCode::Good,
            source_timestamp: Utc::now(),
        }
    }

    /// A null value carrying only a status code
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            value: Variant::Null,
            status,
            source_timestamp: Utc::now(),
        }
    }

    /// True if the status is good and the value is present
    pub fn is_usable(&self) -> bool {
        self.status.is_good() && !self.value.is_null()
    }
}

impl Default for DataValue {
    fn default() -> Self {
        DataValue::good(Variant::Null)
    }
}
