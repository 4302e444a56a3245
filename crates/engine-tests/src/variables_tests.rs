#[cfg(test)]
mod tests {
    use crate::mocks::FixedVariableStore;
    use model::batch::{ColumnSpec, DataType, RowBatch};
    use model::transform::{AddColumnValue, FilterOperator, TransformSpec};
    use model::value::Value;
    use std::collections::HashMap;
    use transforms::{apply_transforms, resolve_spec_literals};
    use tracing_test::traced_test;
    use variables::VariableResolver;

    // Test Settings: a variable store with one static global.
    // Scenario: resolve_template is called twice with identical inputs.
    // Expected Outcome: both calls return the same value, confirmed without
    // depending on cache internals.
    #[traced_test]
    #[tokio::test]
    async fn tc11_repeated_resolution_of_the_same_template_is_deterministic() {
        let store = FixedVariableStore::new().with_static("region", "us-east-1");
        let resolver = VariableResolver::new(&store);
        let context = HashMap::new();
        let first = resolver
            .resolve_template("load into $region", &context)
            .await;
        let second = resolver
            .resolve_template("load into $region", &context)
            .await;
        assert_eq!(first, second);
        assert_eq!(first, "load into us-east-1");
    }

    // Test Settings: a variable store whose value contains a quote and a
    // SQL comment marker, as an attacker-controlled global might.
    // Scenario: that value flows through resolve_spec_literals into an
    // AddColumn constant, then through apply_transforms onto a batch.
    // Expected Outcome: the value lands verbatim as a single string cell;
    // nothing about it is parsed, split, or treated as control syntax,
    // because transforms operate on typed Value cells, never raw SQL text.
    #[traced_test]
    #[tokio::test]
    async fn tc12_variable_value_with_sql_metacharacters_stays_an_inert_string() {
        let hostile = "'; DROP TABLE orders; --";
        let store = FixedVariableStore::new().with_static("tenant", hostile);
        let resolver = VariableResolver::new(&store);
        let specs = vec![TransformSpec::AddColumn {
            column: "tenant_id".to_string(),
            value_kind: AddColumnValue::Constant,
            value: "$tenant".to_string(),
        }];
        let resolved = resolve_spec_literals(&resolver, &HashMap::new(), &specs).await;

        let mut batch = RowBatch::new(vec![ColumnSpec::new("id", DataType::Int)]);
        batch.rows.push(vec![Value::Int(1)]);
        batch.rows.push(vec![Value::Int(2)]);
        apply_transforms(&mut batch, &resolved).unwrap();

        let tenant_index = batch.column_index("tenant_id").unwrap();
        for row in &batch.rows {
            assert_eq!(row[tenant_index], Value::String(hostile.to_string()));
        }
    }

    // Test Settings: the same hostile value used as a FilterRows comparand.
    // Scenario: resolve_spec_literals substitutes it into the filter's
    // value field, then apply_transforms compares it against plain cell
    // text with FilterOperator::Eq.
    // Expected Outcome: the comparison is a literal string match, so rows
    // whose cell doesn't contain that exact text are dropped rather than
    // the hostile value ever being interpreted as an expression.
    #[traced_test]
    #[tokio::test]
    async fn tc13_variable_value_in_filter_rows_compares_as_a_literal() {
        let hostile = "' OR '1'='1";
        let store = FixedVariableStore::new().with_static("needle", hostile);
        let resolver = VariableResolver::new(&store);
        let specs = vec![TransformSpec::FilterRows {
            column: "note".to_string(),
            operator: FilterOperator::Eq,
            value: "$needle".to_string(),
        }];
        let resolved = resolve_spec_literals(&resolver, &HashMap::new(), &specs).await;

        let mut batch = RowBatch::new(vec![ColumnSpec::new("note", DataType::Text)]);
        batch.rows.push(vec![Value::String(hostile.to_string())]);
        batch.rows.push(vec![Value::String("harmless".to_string())]);
        apply_transforms(&mut batch, &resolved).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rows[0][0], Value::String(hostile.to_string()));
    }

    // Test Settings: a template referencing a variable no store knows about.
    // Scenario: resolve_template is called directly.
    // Expected Outcome: falls back to the literal "unknown" rather than
    // erroring, matching the documented fallback tier.
    #[traced_test]
    #[tokio::test]
    async fn tc14_unresolvable_variable_falls_back_without_failing_the_template() {
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let out = resolver
            .resolve_template("tenant=$missing", &HashMap::new())
            .await;
        assert_eq!(out, "tenant=unknown");
    }
}
