use serde::{Deserialize, Serialize};

use crate::types::{RowValues, parse_bool, parse_timestamp};

/// Broad storage class derived from a column's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnAffinity {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Json,
    Blob,
    Other,
}

impl ColumnAffinity {
    /// Classify a declared type name such as `INTEGER`, `varchar(20)` or
    /// `timestamp without time zone`.
    #[must_use]
    pub fn from_declared(declared: &str) -> Self {
        let ty = declared.trim().to_ascii_lowercase();
        if ty.is_empty() {
            return Self::Other;
        }
        if ty.starts_with("bool") {
            Self::Boolean
        } else if ty.contains("timestamp") || ty.starts_with("datetime") {
            Self::Timestamp
        } else if ty.starts_with("json") {
            Self::Json
        } else if ty
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(is_integer_word)
        {
            Self::Integer
        } else if ty.contains("char") || ty.contains("clob") || ty.contains("text") {
            Self::Text
        } else if ty.contains("blob") || ty == "bytea" {
            Self::Blob
        } else if ty.contains("real")
            || ty.contains("floa")
            || ty.contains("doub")
            || ty.starts_with("numeric")
            || ty.starts_with("decimal")
        {
            Self::Real
        } else {
            Self::Other
        }
    }
}

fn is_integer_word(word: &str) -> bool {
    matches!(
        word,
        "int"
            | "integer"
            | "int2"
            | "int4"
            | "int8"
            | "tinyint"
            | "smallint"
            | "mediumint"
            | "bigint"
            | "serial"
            | "serial2"
            | "serial4"
            | "serial8"
            | "smallserial"
            | "bigserial"
    )
}

/// Static metadata about one column of a table, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub identity: bool,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            primary_key: false,
            identity: false,
        }
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    #[must_use]
    pub fn identity(mut self, identity: bool) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn affinity(&self) -> ColumnAffinity {
        ColumnAffinity::from_declared(&self.declared_type)
    }

    /// Case-insensitive name match, the way SQL identifiers compare when unquoted.
    #[must_use]
    pub fn matches(&self, column: &str) -> bool {
        self.name.eq_ignore_ascii_case(column)
    }

    /// Convert a raw provider value to this column's affinity.
    ///
    /// Values that cannot be reinterpreted are returned unchanged so the entity's own
    /// conversion reports the mismatch with full context. NULL is never rewritten.
    #[must_use]
    pub fn coerce(&self, value: RowValues) -> RowValues {
        match (self.affinity(), value) {
            (_, RowValues::Null) => RowValues::Null,
            (ColumnAffinity::Boolean, RowValues::Int(i)) if i == 0 || i == 1 => {
                RowValues::Bool(i == 1)
            }
            (ColumnAffinity::Boolean, RowValues::Text(s)) => match parse_bool(&s) {
                Some(b) => RowValues::Bool(b),
                None => RowValues::Text(s),
            },
            (ColumnAffinity::Timestamp, RowValues::Text(s)) => match parse_timestamp(&s) {
                Some(ts) => RowValues::Timestamp(ts),
                None => RowValues::Text(s),
            },
            (ColumnAffinity::Json, RowValues::Text(s)) => match serde_json::from_str(&s) {
                Ok(json) => RowValues::JSON(json),
                Err(_) => RowValues::Text(s),
            },
            (ColumnAffinity::Integer, RowValues::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => RowValues::Int(i),
                Err(_) => RowValues::Text(s),
            },
            (ColumnAffinity::Real, RowValues::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => RowValues::Float(f),
                Err(_) => RowValues::Text(s),
            },
            #[allow(clippy::cast_precision_loss)]
            (ColumnAffinity::Real, RowValues::Int(i)) => RowValues::Float(i as f64),
            (_, other) => other,
        }
    }
}
