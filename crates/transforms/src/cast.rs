use crate::error::TransformError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate};
use model::batch::DataType;
use model::value::Value;
use std::str::FromStr;
use uuid::Uuid;

/// Parses a `CastType` spec's `target` string into a `DataType`. The
/// vocabulary matches `model::batch::DataType`'s variant names in
/// lowercase, e.g. `"int"`, `"bigint"`, `"timestamp"`, `"text"`.
pub fn parse_target(target: &str) -> Result<DataType, TransformError> {
    match target.to_ascii_lowercase().as_str() {
        "smallint" => Ok(DataType::SmallInt),
        "int" | "integer" => Ok(DataType::Int),
        "bigint" => Ok(DataType::BigInt),
        "float" => Ok(DataType::Float),
        "double" => Ok(DataType::Double),
        "decimal" | "numeric" => Ok(DataType::Decimal {
            precision: 38,
            scale: 10,
        }),
        "boolean" | "bool" => Ok(DataType::Boolean),
        "date" => Ok(DataType::Date),
        "timestamp" => Ok(DataType::Timestamp),
        "text" | "string" | "varchar" => Ok(DataType::Text),
        "binary" | "bytes" => Ok(DataType::Binary),
        "json" => Ok(DataType::Json),
        "uuid" => Ok(DataType::Uuid),
        other => Err(TransformError::UnknownCastTarget(other.to_string())),
    }
}

/// Converts `value` into the representation implied by `target`. Returns
/// `Value::Null` unchanged, since casting a null is always a null.
pub fn cast_value(value: &Value, target: &DataType, column: &str) -> Result<Value, TransformError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let fail = || TransformError::CastFailed {
        column: column.to_string(),
        target: format!("{target:?}"),
    };
    match target {
        DataType::SmallInt | DataType::Int | DataType::BigInt => {
            let n = value
                .as_f64()
                .ok_or_else(fail)?;
            Ok(Value::Int(n as i64))
        }
        DataType::Float | DataType::Double => {
            Ok(Value::Float(value.as_f64().ok_or_else(fail)?))
        }
        DataType::Decimal { .. } => {
            let text = value.display_string();
            BigDecimal::from_str(&text).map(Value::Decimal).map_err(|_| fail())
        }
        DataType::Boolean => match value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            other => {
                let text = other.display_string().to_ascii_lowercase();
                match text.as_str() {
                    "1" | "true" | "t" | "yes" => Ok(Value::Boolean(true)),
                    "0" | "false" | "f" | "no" => Ok(Value::Boolean(false)),
                    _ => Err(fail()),
                }
            }
        },
        DataType::Date => {
            NaiveDate::parse_from_str(&value.display_string(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| fail())
        }
        DataType::Timestamp => DateTime::parse_from_rfc3339(&value.display_string())
            .map(|dt| Value::Timestamp(dt.with_timezone(&chrono::Utc)))
            .map_err(|_| fail()),
        DataType::Uuid => Uuid::parse_str(&value.display_string())
            .map(Value::Uuid)
            .map_err(|_| fail()),
        DataType::Text | DataType::Varchar(_) | DataType::Custom(_) => {
            Ok(Value::String(value.display_string()))
        }
        DataType::Binary => Ok(Value::Bytes(value.display_string().into_bytes())),
        DataType::Json => serde_json::from_str(&value.display_string())
            .map(Value::Json)
            .or_else(|_| Ok(Value::Json(serde_json::Value::String(value.display_string())))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_target_names() {
        assert_eq!(parse_target("int").unwrap(), DataType::Int);
        assert_eq!(parse_target("TIMESTAMP").unwrap(), DataType::Timestamp);
    }

    #[test]
    fn rejects_unknown_target() {
        assert!(parse_target("geometry").is_err());
    }

    #[test]
    fn casts_string_digit_to_boolean() {
        let out = cast_value(&Value::String("1".to_string()), &DataType::Boolean, "flag").unwrap();
        assert_eq!(out, Value::Boolean(true));
    }

    #[test]
    fn null_cast_stays_null() {
        let out = cast_value(&Value::Null, &DataType::Int, "n").unwrap();
        assert_eq!(out, Value::Null);
    }
}
