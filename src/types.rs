use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqlMultisetError;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// A single value read from a provider row.
///
/// Every backend lowers its native values into this enum, so materialization never has to
/// branch on driver types:
/// ```rust
/// use sql_multiset::prelude::*;
///
/// let values = vec![RowValues::Int(1), RowValues::Text("alice".into()), RowValues::Null];
/// assert!(values[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// The provider's NULL marker
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            RowValues::Text(s) => parse_bool(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Name of the variant, used in conversion errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "integer",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "boolean",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }

    /// Render the value as JSON; timestamps become `YYYY-MM-DD HH:MM:SS[.f]` strings and blobs
    /// become arrays of bytes.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(ts) => JsonValue::from(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(b) => JsonValue::from(b.clone()),
        }
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Some(true),
        "f" | "false" | "0" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

/// Map the provider's NULL marker to `None`; every other value passes through.
#[must_use]
pub fn null_to_none(value: RowValues) -> Option<RowValues> {
    if value.is_null() { None } else { Some(value) }
}

/// Value-level conversion from a raw [`RowValues`] into a Rust type.
///
/// Implementations never treat [`RowValues::Null`] as a zero value: a NULL reaching a
/// non-`Option` target is a conversion error. Wrap the target in `Option` to accept NULLs.
pub trait FromRowValue: Sized {
    /// Convert a borrowed value.
    ///
    /// # Errors
    ///
    /// Returns `SqlMultisetError::Conversion` when the value cannot represent `Self`.
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError>;
}

fn mismatch<T>(value: &RowValues, target: &str) -> Result<T, SqlMultisetError> {
    Err(SqlMultisetError::Conversion(format!(
        "cannot convert {} value {value:?} to {target}",
        value.kind()
    )))
}

impl FromRowValue for RowValues {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        Ok(value.clone())
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

impl FromRowValue for i64 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        match value {
            RowValues::Int(i) => Ok(*i),
            RowValues::Bool(b) => Ok(i64::from(*b)),
            RowValues::Text(s) => s.trim().parse().or_else(|_| mismatch(value, "i64")),
            _ => mismatch(value, "i64"),
        }
    }
}

impl FromRowValue for i32 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        let wide = i64::from_row_value(value)?;
        i32::try_from(wide).or_else(|_| mismatch(value, "i32"))
    }
}

impl FromRowValue for u64 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        let wide = i64::from_row_value(value)?;
        u64::try_from(wide).or_else(|_| mismatch(value, "u64"))
    }
}

impl FromRowValue for f64 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        match value {
            RowValues::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(i) => Ok(*i as f64),
            RowValues::Text(s) => s.trim().parse().or_else(|_| mismatch(value, "f64")),
            _ => mismatch(value, "f64"),
        }
    }
}

impl FromRowValue for bool {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        value.as_bool().map_or_else(|| mismatch(value, "bool"), Ok)
    }
}

impl FromRowValue for String {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        match value {
            RowValues::Text(s) => Ok(s.clone()),
            RowValues::Int(i) => Ok(i.to_string()),
            RowValues::Float(f) => Ok(f.to_string()),
            RowValues::Bool(b) => Ok(b.to_string()),
            RowValues::Timestamp(ts) => Ok(ts.to_string()),
            RowValues::JSON(v) => Ok(v.to_string()),
            _ => mismatch(value, "String"),
        }
    }
}

impl FromRowValue for NaiveDateTime {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        value
            .as_timestamp()
            .map_or_else(|| mismatch(value, "NaiveDateTime"), Ok)
    }
}

impl FromRowValue for Vec<u8> {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        match value {
            RowValues::Blob(b) => Ok(b.clone()),
            RowValues::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => mismatch(value, "Vec<u8>"),
        }
    }
}

impl FromRowValue for JsonValue {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlMultisetError> {
        match value {
            RowValues::Text(s) => {
                serde_json::from_str(s).or_else(|_| Ok(JsonValue::from(s.as_str())))
            }
            RowValues::Null => mismatch(value, "serde_json::Value"),
            other => Ok(other.to_json()),
        }
    }
}

/// The caller's transaction isolation, mirrored onto side connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Describes the transaction a batched command ran under.
///
/// The extractor never drives this transaction. Schema discovery runs on a separate
/// connection, so the context is used to open an equivalent transaction there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionContext {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TransactionContext {
    #[must_use]
    pub fn new(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            read_only: false,
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_not_a_zero_value() {
        assert!(i64::from_row_value(&RowValues::Null).is_err());
        assert_eq!(Option::<i64>::from_row_value(&RowValues::Null).unwrap(), None);
        assert_eq!(null_to_none(RowValues::Null), None);
        assert_eq!(null_to_none(RowValues::Int(0)), Some(RowValues::Int(0)));
    }

    #[test]
    fn text_values_parse_into_numbers_and_flags() {
        assert_eq!(i64::from_row_value(&RowValues::Text(" 42 ".into())).unwrap(), 42);
        assert_eq!(i32::from_row_value(&RowValues::Text("7".into())).unwrap(), 7);
        assert!(bool::from_row_value(&RowValues::Text("t".into())).unwrap());
        assert!(!bool::from_row_value(&RowValues::Int(0)).unwrap());
        assert!(i64::from_row_value(&RowValues::Text("forty-two".into())).is_err());
    }

    #[test]
    fn narrowing_overflow_is_reported() {
        let err = i32::from_row_value(&RowValues::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, SqlMultisetError::Conversion(_)));
    }

    #[test]
    fn timestamps_accept_sqlite_text() {
        let ts = NaiveDateTime::from_row_value(&RowValues::Text("2024-05-01 10:11:12.500".into()))
            .unwrap();
        assert_eq!(ts.to_string(), "2024-05-01 10:11:12.500");
    }
}
