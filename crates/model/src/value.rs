use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single typed cell inside a `RowBatch`.
///
/// Stands in for a library-specific dataframe cell: every adapter and
/// transform speaks this type, never a driver-native row value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Decimal(v) => v.to_f64(),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::String(v) => v.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Renders the value the way a destination writer or template
    /// substitution needs: a plain display string, with `Null` as `""`.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Approximate serialised size in bytes, used for the soft
    /// `batch_size_mb` policy and for destination byte accounting when a
    /// connector cannot report exact wire size.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Int(_) => 8,
            Value::Float(_) => 8,
            Value::Decimal(v) => v.to_string().len(),
            Value::String(v) => v.len(),
            Value::Boolean(_) => 1,
            Value::Bytes(v) => v.len(),
            Value::Date(_) => 4,
            Value::Timestamp(_) => 8,
            Value::Uuid(_) => 16,
            Value::Json(v) => serde_json::to_string(v).map(|s| s.len()).unwrap_or(0),
            Value::Null => 0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "0x{}", hex_encode(v)),
            Value::Date(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_displays_as_empty_string() {
        assert_eq!(Value::Null.display_string(), "");
    }

    #[test]
    fn boolean_display_roundtrip() {
        assert_eq!(Value::Boolean(true).to_string(), "true");
    }
}
