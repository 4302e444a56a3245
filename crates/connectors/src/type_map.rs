use model::batch::DataType;

/// Source column type name → destination-agnostic `DataType`, as reported
/// by `SourceAdapter::columns()`. Unknown names fall back to the widest
/// string type.
pub fn from_sql_server_type(native: &str) -> DataType {
    match normalize(native) {
        "bit" => DataType::Boolean,
        "tinyint" => DataType::SmallInt,
        "smallint" => DataType::SmallInt,
        "int" => DataType::Int,
        "bigint" => DataType::BigInt,
        "real" => DataType::Float,
        "float" => DataType::Double,
        "decimal" | "numeric" | "money" | "smallmoney" => DataType::Decimal {
            precision: 38,
            scale: 10,
        },
        "date" => DataType::Date,
        "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => DataType::Timestamp,
        "uniqueidentifier" => DataType::Uuid,
        "varbinary" | "binary" | "image" => DataType::Binary,
        "nvarchar" | "varchar" | "nchar" | "char" | "text" | "ntext" => DataType::Text,
        other => DataType::Custom(other.to_string()),
    }
}

pub fn from_postgres_type(native: &str) -> DataType {
    match normalize(native) {
        "bool" | "boolean" => DataType::Boolean,
        "int2" | "smallint" => DataType::SmallInt,
        "int4" | "integer" | "int" => DataType::Int,
        "int8" | "bigint" => DataType::BigInt,
        "float4" | "real" => DataType::Float,
        "float8" | "double precision" => DataType::Double,
        "numeric" | "decimal" => DataType::Decimal {
            precision: 38,
            scale: 10,
        },
        "date" => DataType::Date,
        "timestamp" | "timestamptz" | "timestamp without time zone" | "timestamp with time zone" => {
            DataType::Timestamp
        }
        "uuid" => DataType::Uuid,
        "bytea" => DataType::Binary,
        "json" | "jsonb" => DataType::Json,
        "varchar" | "text" | "char" | "bpchar" => DataType::Text,
        other => DataType::Custom(other.to_string()),
    }
}

pub fn from_mysql_type(native: &str) -> DataType {
    match normalize(native) {
        "tinyint(1)" | "bool" | "boolean" => DataType::Boolean,
        "tinyint" | "smallint" => DataType::SmallInt,
        "int" | "mediumint" => DataType::Int,
        "bigint" => DataType::BigInt,
        "float" => DataType::Float,
        "double" => DataType::Double,
        "decimal" | "numeric" => DataType::Decimal {
            precision: 38,
            scale: 10,
        },
        "date" => DataType::Date,
        "datetime" | "timestamp" => DataType::Timestamp,
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            DataType::Binary
        }
        "json" => DataType::Json,
        "varchar" | "char" | "text" | "tinytext" | "mediumtext" | "longtext" => DataType::Text,
        other => DataType::Custom(other.to_string()),
    }
}

pub fn from_oracle_type(native: &str) -> DataType {
    match normalize(native) {
        "number" => DataType::Decimal {
            precision: 38,
            scale: 10,
        },
        "binary_float" => DataType::Float,
        "binary_double" => DataType::Double,
        "date" => DataType::Date,
        "timestamp" => DataType::Timestamp,
        "raw" | "long raw" | "blob" => DataType::Binary,
        "varchar2" | "nvarchar2" | "char" | "nchar" | "clob" | "nclob" | "long" => DataType::Text,
        other => DataType::Custom(other.to_string()),
    }
}

/// `DataType` → Snowflake DDL type name. Unknown/custom types fall
/// back to the widest string type, `VARCHAR(16777216)`.
pub fn to_snowflake_ddl(dt: &DataType) -> String {
    match dt {
        DataType::SmallInt => "SMALLINT".to_string(),
        DataType::Int => "INTEGER".to_string(),
        DataType::BigInt => "BIGINT".to_string(),
        DataType::Float => "FLOAT".to_string(),
        DataType::Double => "DOUBLE".to_string(),
        DataType::Decimal { precision, scale } => format!("NUMBER({precision},{scale})"),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Date => "DATE".to_string(),
        DataType::Timestamp => "TIMESTAMP_NTZ".to_string(),
        DataType::Varchar(Some(len)) => format!("VARCHAR({len})"),
        DataType::Varchar(None) | DataType::Text | DataType::Custom(_) => {
            "VARCHAR(16777216)".to_string()
        }
        DataType::Binary => "BINARY".to_string(),
        DataType::Json => "VARIANT".to_string(),
        DataType::Uuid => "VARCHAR(36)".to_string(),
    }
}

fn normalize(native: &str) -> &str {
    native.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_sql_server_nvarchar_max_to_text() {
        assert_eq!(from_sql_server_type("nvarchar"), DataType::Text);
        assert_eq!(to_snowflake_ddl(&DataType::Text), "VARCHAR(16777216)");
    }

    #[test]
    fn maps_sql_server_datetime2_to_timestamp_ntz() {
        assert_eq!(from_sql_server_type("datetime2"), DataType::Timestamp);
        assert_eq!(to_snowflake_ddl(&DataType::Timestamp), "TIMESTAMP_NTZ");
    }

    #[test]
    fn maps_bit_to_boolean() {
        assert_eq!(from_sql_server_type("bit"), DataType::Boolean);
        assert_eq!(to_snowflake_ddl(&DataType::Boolean), "BOOLEAN");
    }

    #[test]
    fn unknown_type_falls_back_to_custom_then_widest_string() {
        let dt = from_postgres_type("tsvector");
        assert_eq!(dt, DataType::Custom("tsvector".to_string()));
        assert_eq!(to_snowflake_ddl(&dt), "VARCHAR(16777216)");
    }
}
