use model::variable::{DbQuerySpec, GlobalVariableKind, ScopedConnection, WhereCondition, WhereOperator};
use regex::Regex;
use std::sync::LazyLock;

static SELECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*select\s+(?P<column>[\w.]+)\s+from\s+(?P<schema>[\w]+)\.(?P<table>[\w]+)(?:\s+where\s+(?P<where>.+))?\s*$",
    )
    .expect("valid select recognizer")
});

static CONDITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<field>\w+)\s*(?P<op>=|!=|<>|>=|<=|>|<|like)\s*'?(?P<value>[^']*)'?\s*$")
        .expect("valid condition recognizer")
});

static WHERE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?P<body>.*?)\s+where\s+(?P<bindings>\$[A-Za-z_][A-Za-z0-9_]*\s*=.*)$")
        .expect("valid where-clause recognizer")
});

/// Strips a trailing ` where $Name = expr, $Name2 = expr` clause from a
/// template, returning the template with the clause removed and the
/// bindings it declared, each classified the same way a standalone
/// inline definition would be.
pub fn extract_inline_bindings(template: &str) -> (String, Vec<(String, GlobalVariableKind)>) {
    let Some(caps) = WHERE_CLAUSE.captures(template) else {
        return (template.to_string(), Vec::new());
    };
    let body = caps["body"].to_string();
    let bindings = caps["bindings"]
        .split(',')
        .filter_map(|piece| {
            let piece = piece.trim();
            let rest = piece.strip_prefix('$')?;
            let (name, expr) = rest.split_once('=')?;
            Some((name.trim().to_string(), parse_inline_definition(expr.trim())))
        })
        .collect();
    (body, bindings)
}

/// Recognizes a small, deliberately narrow subset of `SELECT column FROM
/// schema.table [WHERE field op value [AND ...]]` inline definitions
///. Anything that doesn't match this shape falls back to
/// `GlobalVariableKind::RawQuery`, which the resolver hands to the source
/// connection verbatim instead of trying to interpret it.
pub fn parse_inline_definition(raw: &str) -> GlobalVariableKind {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return GlobalVariableKind::Static {
            value: String::new(),
        };
    }
    if !trimmed.to_ascii_lowercase().starts_with("select") {
        if trimmed.contains('$') {
            return GlobalVariableKind::Expression {
                expression: trimmed.to_string(),
            };
        }
        return GlobalVariableKind::Static {
            value: trimmed.to_string(),
        };
    }

    match SELECT_PATTERN.captures(trimmed) {
        Some(caps) => {
            let column = caps["column"].to_string();
            let schema = caps["schema"].to_string();
            let table = caps["table"].to_string();
            let where_conditions = caps
                .name("where")
                .map(|m| parse_conditions(m.as_str()))
                .unwrap_or_default();
            GlobalVariableKind::DbQuery(DbQuerySpec {
                schema,
                table,
                column,
                where_conditions,
                connection: ScopedConnection::default(),
            })
        }
        None => GlobalVariableKind::RawQuery {
            raw_query: trimmed.to_string(),
        },
    }
}

fn parse_conditions(where_clause: &str) -> Vec<WhereCondition> {
    where_clause
        .split(" AND ")
        .chain(where_clause.split(" and "))
        .filter_map(|clause| CONDITION_PATTERN.captures(clause))
        .map(|caps| WhereCondition {
            field: caps["field"].to_string(),
            operator: parse_operator(&caps["op"]),
            value: caps["value"].trim().to_string(),
        })
        .collect()
}

fn parse_operator(raw: &str) -> WhereOperator {
    match raw.to_ascii_lowercase().as_str() {
        "=" => WhereOperator::Eq,
        "!=" | "<>" => WhereOperator::Ne,
        ">" => WhereOperator::Gt,
        "<" => WhereOperator::Lt,
        ">=" => WhereOperator::Ge,
        "<=" => WhereOperator::Le,
        "like" => WhereOperator::Like,
        _ => WhereOperator::Eq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_with_where_clause() {
        let kind = parse_inline_definition(
            "SELECT region_code FROM dbo.regions WHERE active = '1'",
        );
        match kind {
            GlobalVariableKind::DbQuery(spec) => {
                assert_eq!(spec.schema, "dbo");
                assert_eq!(spec.table, "regions");
                assert_eq!(spec.column, "region_code");
                assert_eq!(spec.where_conditions.len(), 1);
                assert_eq!(spec.where_conditions[0].field, "active");
            }
            other => panic!("expected DbQuery, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_raw_query_on_unparseable_select() {
        let kind = parse_inline_definition("SELECT * FROM regions JOIN other ON 1=1");
        assert!(matches!(kind, GlobalVariableKind::RawQuery { .. }));
    }

    #[test]
    fn non_select_text_is_static() {
        let kind = parse_inline_definition("north-america");
        assert!(matches!(kind, GlobalVariableKind::Static { .. }));
    }

    #[test]
    fn text_referencing_a_variable_is_an_expression() {
        let kind = parse_inline_definition("$country");
        assert!(matches!(kind, GlobalVariableKind::Expression { .. }));
    }

    #[test]
    fn extracts_single_binding_and_strips_clause() {
        let (body, bindings) =
            extract_inline_bindings("tenants/$region where $region = $country");
        assert_eq!(body, "tenants/$region");
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "region");
        assert!(matches!(bindings[0].1, GlobalVariableKind::Expression { .. }));
    }

    #[test]
    fn extracts_multiple_bindings() {
        let (body, bindings) =
            extract_inline_bindings("$a/$b where $a = north, $b = SELECT x FROM s.t");
        assert_eq!(body, "$a/$b");
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].0, "a");
        assert_eq!(bindings[1].0, "b");
        assert!(matches!(bindings[1].1, GlobalVariableKind::DbQuery(_)));
    }

    #[test]
    fn template_without_where_clause_is_unchanged() {
        let (body, bindings) = extract_inline_bindings("$tableName/data");
        assert_eq!(body, "$tableName/data");
        assert!(bindings.is_empty());
    }
}
