use async_trait::async_trait;
use connectors::dialect::{dialect_for, safe_quoted_ident, Dialect};
use connectors::source::SourceAdapter;
use model::connector::SourceVariant;
use model::variable::{DbQuerySpec, GlobalVariable, GlobalVariableKind, WhereOperator};
use std::collections::HashMap;
use std::sync::Arc;
use variables::{GlobalVariableStore, ResolveError};

/// A `GlobalVariableStore` backed by the literal list of variables in the
/// task config file. `Static`/`Expression` kinds resolve directly;
/// `DbQuery`/`RawQuery` run against `source`, the same connection the
/// task's table pipelines read from.
pub struct StaticGlobalVariableStore {
    variables: HashMap<String, GlobalVariable>,
    source: Arc<dyn SourceAdapter>,
    dialect: Box<dyn Dialect>,
}

impl StaticGlobalVariableStore {
    pub fn new(variables: Vec<GlobalVariable>, source: Arc<dyn SourceAdapter>, source_variant: SourceVariant) -> Self {
        let variables = variables.into_iter().map(|v| (v.name.clone(), v)).collect();
        StaticGlobalVariableStore {
            variables,
            source,
            dialect: dialect_for(source_variant),
        }
    }

    /// Builds `SELECT <column> FROM <schema>.<table> WHERE ...` with every
    /// identifier whitelisted through `safe_quoted_ident` and every
    /// condition value bound through a dialect placeholder rather than
    /// interpolated into the query text. Returns the query text and the
    /// params in placeholder order.
    fn build_query(&self, spec: &DbQuerySpec) -> (String, Vec<String>) {
        let schema = safe_quoted_ident(self.dialect.as_ref(), &spec.schema);
        let table = safe_quoted_ident(self.dialect.as_ref(), &spec.table);
        let column = safe_quoted_ident(self.dialect.as_ref(), &spec.column);

        let mut params = Vec::new();
        let mut clauses = Vec::new();
        for condition in &spec.where_conditions {
            let field = safe_quoted_ident(self.dialect.as_ref(), &condition.field);
            if condition.operator == WhereOperator::In {
                let placeholders: Vec<String> = condition
                    .value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| {
                        params.push(v.to_string());
                        self.dialect.placeholder(params.len())
                    })
                    .collect();
                clauses.push(format!("{field} IN ({})", placeholders.join(", ")));
            } else {
                params.push(condition.value.clone());
                let placeholder = self.dialect.placeholder(params.len());
                clauses.push(format!("{field} {} {placeholder}", condition.operator.as_sql()));
            }
        }

        let mut query = format!("SELECT {column} FROM {schema}.{table}");
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        (query, params)
    }
}

#[async_trait]
impl GlobalVariableStore for StaticGlobalVariableStore {
    async fn lookup(&self, name: &str) -> Option<GlobalVariable> {
        self.variables.get(name).cloned()
    }

    async fn execute(&self, kind: &GlobalVariableKind) -> Result<String, ResolveError> {
        match kind {
            GlobalVariableKind::Static { value } => Ok(value.clone()),
            GlobalVariableKind::Expression { expression } => Ok(expression.clone()),
            GlobalVariableKind::DbQuery(spec) => {
                if spec.connection.is_set() {
                    return Err(ResolveError::QueryFailed(
                        "db_query variables scoped to a server/database other than the task's own source are not supported".to_string(),
                    ));
                }
                let (query, params) = self.build_query(spec);
                self.source
                    .execute_scalar_query(&query, &params)
                    .await
                    .map_err(|e| ResolveError::QueryFailed(e.to_string()))?
                    .ok_or_else(|| {
                        ResolveError::QueryFailed(format!(
                            "no row matched {}.{}.{}",
                            spec.schema, spec.table, spec.column
                        ))
                    })
            }
            GlobalVariableKind::RawQuery { raw_query } => self
                .source
                .execute_scalar_query(raw_query, &[])
                .await
                .map_err(|e| ResolveError::RawQueryInvalid(e.to_string()))?
                .ok_or_else(|| ResolveError::RawQueryInvalid(format!("raw query returned no rows: {raw_query}"))),
        }
    }
}
