use crate::cast::{cast_value, parse_target};
use crate::error::TransformError;
use chrono::Utc;
use model::batch::{ColumnSpec, DataType, RowBatch};
use model::transform::{AddColumnValue, FilterOperator, PureFunction, TransformSpec};
use model::value::Value;
use std::collections::HashMap;
use uuid::Uuid;
use variables::VariableResolver;

/// Resolves `$variable` tokens in every string literal a `TransformSpec`
/// carries (an `AddColumn` constant, a `ReplaceValue` target, a
/// `FilterRows` comparison value) before the transform list is applied. Non-literal
/// fields (column names, separators) are left untouched.
pub async fn resolve_spec_literals(
    resolver: &VariableResolver<'_>,
    context: &HashMap<String, String>,
    specs: &[TransformSpec],
) -> Vec<TransformSpec> {
    let mut resolved = Vec::with_capacity(specs.len());
    for spec in specs {
        resolved.push(match spec {
            TransformSpec::AddColumn {
                column,
                value_kind,
                value,
            } if *value_kind == AddColumnValue::Constant => TransformSpec::AddColumn {
                column: column.clone(),
                value_kind: *value_kind,
                value: resolver.resolve_template(value, context).await,
            },
            TransformSpec::ReplaceValue {
                column,
                old_value,
                new_value,
            } => TransformSpec::ReplaceValue {
                column: column.clone(),
                old_value: old_value.clone(),
                new_value: resolver.resolve_template(new_value, context).await,
            },
            TransformSpec::FilterRows {
                column,
                operator,
                value,
            } => TransformSpec::FilterRows {
                column: column.clone(),
                operator: *operator,
                value: resolver.resolve_template(value, context).await,
            },
            other => other.clone(),
        });
    }
    resolved
}

/// Applies a compiled list of `TransformSpec`s to a batch in declaration
/// order. Transforms run in-place on `batch`'s columns/rows;
/// `FilterRows` is the only kind that changes row count.
///
/// Duplicate column names after the full pipeline has run is an error
///, checked once at the end rather than after
/// every step so that a `RenameColumn` followed by a `DropColumn` of the
/// old name is allowed to transiently collide.
pub fn apply_transforms(batch: &mut RowBatch, specs: &[TransformSpec]) -> Result<(), TransformError> {
    for spec in specs {
        apply_one(batch, spec)?;
    }
    if batch.has_duplicate_columns() {
        let name = first_duplicate(batch);
        return Err(TransformError::DuplicateColumn(name));
    }
    Ok(())
}

fn first_duplicate(batch: &RowBatch) -> String {
    let mut seen = std::collections::HashSet::new();
    for c in &batch.columns {
        if !seen.insert(c.name.as_str()) {
            return c.name.clone();
        }
    }
    String::new()
}

fn apply_one(batch: &mut RowBatch, spec: &TransformSpec) -> Result<(), TransformError> {
    match spec {
        TransformSpec::AddColumn {
            column,
            value_kind,
            value,
        } => add_column(batch, column, *value_kind, value),
        TransformSpec::RenameColumn { from, to } => rename_column(batch, from, to),
        TransformSpec::DropColumn { column } => {
            drop_column(batch, column);
            Ok(())
        }
        TransformSpec::CastType { column, target } => cast_column(batch, column, target),
        TransformSpec::FilterRows {
            column,
            operator,
            value,
        } => filter_rows(batch, column, *operator, value),
        TransformSpec::ReplaceValue {
            column,
            old_value,
            new_value,
        } => replace_value(batch, column, old_value, new_value),
        TransformSpec::ConcatenateColumns {
            target,
            sources,
            separator,
        } => concatenate_columns(batch, target, sources, separator),
        TransformSpec::SplitColumn {
            column,
            separator,
            targets,
        } => split_column(batch, column, separator, targets),
        TransformSpec::ApplyFunction { column, function } => apply_function(batch, column, *function),
    }
}

fn column_index(batch: &RowBatch, name: &str) -> Result<usize, TransformError> {
    batch
        .column_index(name)
        .ok_or_else(|| TransformError::UnknownColumn(name.to_string()))
}

fn add_column(
    batch: &mut RowBatch,
    column: &str,
    kind: AddColumnValue,
    value: &str,
) -> Result<(), TransformError> {
    let source_index = match kind {
        AddColumnValue::ColumnRef => Some(column_index(batch, value)?),
        _ => None,
    };
    batch.columns.push(ColumnSpec::new(column, DataType::Text));
    for (row_number, row) in batch.rows.iter_mut().enumerate() {
        let cell = match kind {
            AddColumnValue::Constant => Value::String(value.to_string()),
            AddColumnValue::ColumnRef => row[source_index.unwrap()].clone(),
            AddColumnValue::CurrentTimestamp => Value::Timestamp(Utc::now()),
            AddColumnValue::RowNumber => Value::Int(row_number as i64),
            AddColumnValue::Uuid => Value::Uuid(Uuid::new_v4()),
        };
        row.push(cell);
    }
    Ok(())
}

fn rename_column(batch: &mut RowBatch, from: &str, to: &str) -> Result<(), TransformError> {
    let index = column_index(batch, from)?;
    batch.columns[index].name = to.to_string();
    Ok(())
}

fn drop_column(batch: &mut RowBatch, column: &str) {
    let Some(index) = batch.column_index(column) else {
        return;
    };
    batch.columns.remove(index);
    for row in &mut batch.rows {
        row.remove(index);
    }
}

fn cast_column(batch: &mut RowBatch, column: &str, target: &str) -> Result<(), TransformError> {
    let index = column_index(batch, column)?;
    let data_type = parse_target(target)?;
    for row in &mut batch.rows {
        row[index] = cast_value(&row[index], &data_type, column)?;
    }
    batch.columns[index].data_type = data_type;
    Ok(())
}

fn filter_rows(
    batch: &mut RowBatch,
    column: &str,
    operator: FilterOperator,
    value: &str,
) -> Result<(), TransformError> {
    let index = column_index(batch, column)?;
    let set: Vec<&str> = value.split(',').map(str::trim).collect();
    batch.rows.retain(|row| matches_filter(&row[index], operator, value, &set));
    Ok(())
}

fn matches_filter(cell: &Value, operator: FilterOperator, raw: &str, set: &[&str]) -> bool {
    let cell_text = cell.display_string();
    match operator {
        FilterOperator::Eq => cell_text == raw,
        FilterOperator::Ne => cell_text != raw,
        FilterOperator::In => set.contains(&cell_text.as_str()),
        FilterOperator::NotIn => !set.contains(&cell_text.as_str()),
        FilterOperator::Gt | FilterOperator::Lt | FilterOperator::Ge | FilterOperator::Le => {
            match (cell.as_f64(), raw.parse::<f64>().ok()) {
                (Some(a), Some(b)) => match operator {
                    FilterOperator::Gt => a > b,
                    FilterOperator::Lt => a < b,
                    FilterOperator::Ge => a >= b,
                    FilterOperator::Le => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
    }
}

fn replace_value(
    batch: &mut RowBatch,
    column: &str,
    old_value: &str,
    new_value: &str,
) -> Result<(), TransformError> {
    let index = column_index(batch, column)?;
    for row in &mut batch.rows {
        if row[index].display_string() == old_value {
            row[index] = Value::String(new_value.to_string());
        }
    }
    Ok(())
}

fn concatenate_columns(
    batch: &mut RowBatch,
    target: &str,
    sources: &[String],
    separator: &str,
) -> Result<(), TransformError> {
    let indices: Vec<usize> = sources
        .iter()
        .map(|name| column_index(batch, name))
        .collect::<Result<_, _>>()?;
    batch.columns.push(ColumnSpec::new(target, DataType::Text));
    for row in &mut batch.rows {
        let joined = indices
            .iter()
            .map(|&i| row[i].display_string())
            .collect::<Vec<_>>()
            .join(separator);
        row.push(Value::String(joined));
    }
    Ok(())
}

fn split_column(
    batch: &mut RowBatch,
    column: &str,
    separator: &str,
    targets: &[String],
) -> Result<(), TransformError> {
    let index = column_index(batch, column)?;
    for name in targets {
        batch.columns.push(ColumnSpec::new(name, DataType::Text));
    }
    for row in &mut batch.rows {
        let text = row[index].display_string();
        let parts: Vec<&str> = text.split(separator).collect();
        if parts.len() != targets.len() {
            return Err(TransformError::SplitArityMismatch {
                produced: parts.len(),
                expected: targets.len(),
            });
        }
        for part in parts {
            row.push(Value::String(part.to_string()));
        }
    }
    Ok(())
}

fn apply_function(batch: &mut RowBatch, column: &str, function: PureFunction) -> Result<(), TransformError> {
    let index = column_index(batch, column)?;
    for row in &mut batch.rows {
        if row[index].is_null() {
            continue;
        }
        let text = row[index].display_string();
        row[index] = match function {
            PureFunction::Upper => Value::String(text.to_uppercase()),
            PureFunction::Lower => Value::String(text.to_lowercase()),
            PureFunction::Trim => Value::String(text.trim().to_string()),
            PureFunction::Length => Value::Int(text.chars().count() as i64),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::batch::ColumnSpec;
    use model::variable::{GlobalVariable, GlobalVariableKind};
    use variables::{GlobalVariableStore, ResolveError};

    struct StaticStore;

    #[async_trait]
    impl GlobalVariableStore for StaticStore {
        async fn lookup(&self, name: &str) -> Option<GlobalVariable> {
            if name == "region" {
                Some(GlobalVariable {
                    name: "region".to_string(),
                    kind: GlobalVariableKind::Static {
                        value: "us-east".to_string(),
                    },
                    is_active: true,
                })
            } else {
                None
            }
        }

        async fn execute(&self, kind: &GlobalVariableKind) -> Result<String, ResolveError> {
            match kind {
                GlobalVariableKind::Static { value } => Ok(value.clone()),
                _ => Err(ResolveError::Unresolvable("unsupported in test".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn resolve_spec_literals_substitutes_add_column_constant() {
        let store = StaticStore;
        let resolver = VariableResolver::new(&store);
        let specs = vec![TransformSpec::AddColumn {
            column: "region".to_string(),
            value_kind: AddColumnValue::Constant,
            value: "$region".to_string(),
        }];
        let resolved = resolve_spec_literals(&resolver, &HashMap::new(), &specs).await;
        match &resolved[0] {
            TransformSpec::AddColumn { value, .. } => assert_eq!(value, "us-east"),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    fn sample_batch() -> RowBatch {
        let mut batch = RowBatch::new(vec![
            ColumnSpec::new("id", DataType::Int),
            ColumnSpec::new("name", DataType::Text),
        ]);
        batch.rows.push(vec![Value::Int(1), Value::String("Ada".to_string())]);
        batch.rows.push(vec![Value::Int(2), Value::String("Bo".to_string())]);
        batch
    }

    #[test]
    fn add_column_constant_fills_every_row() {
        let mut batch = sample_batch();
        apply_transforms(
            &mut batch,
            &[TransformSpec::AddColumn {
                column: "region".to_string(),
                value_kind: AddColumnValue::Constant,
                value: "us-east".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(batch.rows[0][2], Value::String("us-east".to_string()));
        assert_eq!(batch.rows[1][2], Value::String("us-east".to_string()));
    }

    #[test]
    fn rename_to_a_dropped_names_slot_does_not_collide() {
        let mut batch = sample_batch();
        apply_transforms(
            &mut batch,
            &[
                TransformSpec::DropColumn {
                    column: "name".to_string(),
                },
                TransformSpec::RenameColumn {
                    from: "id".to_string(),
                    to: "name".to_string(),
                },
            ],
        )
        .unwrap();
        assert_eq!(batch.columns[0].name, "name");
    }

    #[test]
    fn filter_rows_keeps_matching_rows_only() {
        let mut batch = sample_batch();
        apply_transforms(
            &mut batch,
            &[TransformSpec::FilterRows {
                column: "id".to_string(),
                operator: FilterOperator::Gt,
                value: "1".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rows[0][0], Value::Int(2));
    }

    #[test]
    fn split_column_arity_mismatch_errors() {
        let mut batch = RowBatch::new(vec![ColumnSpec::new("full", DataType::Text)]);
        batch.rows.push(vec![Value::String("a-b-c".to_string())]);
        let err = apply_transforms(
            &mut batch,
            &[TransformSpec::SplitColumn {
                column: "full".to_string(),
                separator: "-".to_string(),
                targets: vec!["x".to_string(), "y".to_string()],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::SplitArityMismatch { .. }));
    }

    #[test]
    fn apply_function_upper_transforms_text_column() {
        let mut batch = sample_batch();
        apply_transforms(
            &mut batch,
            &[TransformSpec::ApplyFunction {
                column: "name".to_string(),
                function: PureFunction::Upper,
            }],
        )
        .unwrap();
        assert_eq!(batch.rows[0][1], Value::String("ADA".to_string()));
    }

    #[test]
    fn duplicate_column_after_pipeline_is_rejected() {
        let mut batch = sample_batch();
        let err = apply_transforms(
            &mut batch,
            &[TransformSpec::AddColumn {
                column: "name".to_string(),
                value_kind: AddColumnValue::Constant,
                value: "dup".to_string(),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::DuplicateColumn(_)));
    }
}
