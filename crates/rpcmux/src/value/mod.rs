//! Tagged union of the values both wire protocols can carry.
//!
//! Codecs translate between their wire representation and [`Value`];
//! the dispatcher and registered procedures only ever see [`Value`]. The
//! vocabulary is the XML-RPC one (plus the common `nil` extension), which is
//! a superset of what JSON can express natively.

pub(crate) mod date_time;

use std::collections::BTreeMap;

use strum::{Display, EnumString};
use time::PrimitiveDateTime;

/// Ordered mapping used for `struct` values.
pub type Struct = BTreeMap<String, Value>;

/// A decoded argument or procedure result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer. XML-RPC carries `i32` natively and `i64` via `<i8>`.
    Int(i64),
    /// Boolean.
    Boolean(bool),
    /// Double-precision float. Only finite values can be encoded.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp without zone, second precision.
    DateTime(PrimitiveDateTime),
    /// Opaque binary payload.
    Base64(Vec<u8>),
    /// Ordered list.
    Array(Vec<Value>),
    /// String-keyed record.
    Struct(Struct),
    /// Absent value.
    Nil,
}

/// Type vocabulary used by declared signatures.
///
/// Parsing accepts the XML-RPC spellings (`i4`, `i8`, `dateTime.iso8601`,
/// `nil`) as aliases; display always yields the canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum ValueKind {
    /// `int`
    #[strum(to_string = "int", serialize = "i4", serialize = "i8")]
    Int,
    /// `boolean`
    #[strum(to_string = "boolean")]
    Boolean,
    /// `double`
    #[strum(to_string = "double")]
    Double,
    /// `string`
    #[strum(to_string = "string")]
    String,
    /// `dateTime`
    #[strum(to_string = "dateTime", serialize = "dateTime.iso8601")]
    DateTime,
    /// `base64`
    #[strum(to_string = "base64")]
    Base64,
    /// `array`
    #[strum(to_string = "array")]
    Array,
    /// `struct`
    #[strum(to_string = "struct")]
    Struct,
    /// `null`
    #[strum(to_string = "null", serialize = "nil")]
    Null,
}

impl Value {
    /// Returns the vocabulary kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Double(_) => ValueKind::Double,
            Self::String(_) => ValueKind::String,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Base64(_) => ValueKind::Base64,
            Self::Array(_) => ValueKind::Array,
            Self::Struct(_) => ValueKind::Struct,
            Self::Nil => ValueKind::Null,
        }
    }

    /// Integer payload, if this is an `int`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `boolean`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Float payload, if this is a `double`.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    /// String payload, if this is a `string`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Elements, if this is an `array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Members, if this is a `struct`.
    #[must_use]
    pub const fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Nil`].
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl From<Struct> for Value {
    fn from(members: Struct) -> Self {
        Self::Struct(members)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

impl FromIterator<Self> for Value {
    fn from_iter<I: IntoIterator<Item = Self>>(iter: I) -> Self {
        Self::Array(iter.into_iter().collect())
    }
}
