use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AddColumnValue {
    Constant,
    ColumnRef,
    CurrentTimestamp,
    RowNumber,
    Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PureFunction {
    Upper,
    Lower,
    Trim,
    Length,
}

/// A single declarative, typed transform. `TransformSpec` is the
/// on-the-wire/config representation; `transforms::Transform` compiles it
/// once per pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransformSpec {
    AddColumn {
        column: String,
        value_kind: AddColumnValue,
        value: String,
    },
    RenameColumn {
        from: String,
        to: String,
    },
    DropColumn {
        column: String,
    },
    CastType {
        column: String,
        target: String,
    },
    FilterRows {
        column: String,
        operator: FilterOperator,
        value: String,
    },
    ReplaceValue {
        column: String,
        old_value: String,
        new_value: String,
    },
    ConcatenateColumns {
        target: String,
        sources: Vec<String>,
        separator: String,
    },
    SplitColumn {
        column: String,
        separator: String,
        targets: Vec<String>,
    },
    ApplyFunction {
        column: String,
        function: PureFunction,
    },
}
