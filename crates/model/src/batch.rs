use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Destination-agnostic column type. Source adapters map their native
/// column types onto this set; destination adapters map it back onto
/// their own DDL vocabulary (see `connectors::type_map`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Date,
    Timestamp,
    Varchar(Option<u32>),
    Text,
    Binary,
    Json,
    Uuid,
    Custom(String),
}

impl DataType {
    /// The widest string type, used as the fallback when a source type
    /// cannot be mapped.
    pub fn widest_string() -> Self {
        DataType::Text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub max_length: Option<u32>,
    pub default: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        ColumnSpec {
            name: name.into(),
            data_type,
            nullable: true,
            is_primary_key: false,
            max_length: None,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }
}

/// The generalised batch type transformations and writers operate over,
/// in place of a library dataframe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        RowBatch {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_duplicate_columns(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        !self.columns.iter().all(|c| seen.insert(c.name.as_str()))
    }

    /// Approximate serialised size in bytes of the whole batch, used for
    /// the soft `batch_size_mb` policy.
    pub fn approx_size_bytes(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().map(Value::approx_size).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_duplicate_columns() {
        let batch = RowBatch::new(vec![
            ColumnSpec::new("id", DataType::Int),
            ColumnSpec::new("id", DataType::Text),
        ]);
        assert!(batch.has_duplicate_columns());
    }

    #[test]
    fn empty_batch_has_zero_size() {
        let batch = RowBatch::new(vec![ColumnSpec::new("id", DataType::Int)]);
        assert_eq!(batch.approx_size_bytes(), 0);
    }
}
