use model::connector::SourceVariant;

/// Per-variant identifier quoting and type-name vocabulary, split between
/// each source's SQL dialect and extended to the full source variant set.
pub trait Dialect: Send + Sync {
    fn quote_ident(&self, ident: &str) -> String;
    fn placeholder(&self, index: usize) -> String;
}

pub struct SqlServerDialect;
pub struct PostgresDialect;
pub struct MySqlDialect;
pub struct OracleDialect;

impl Dialect for SqlServerDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }
}

impl Dialect for PostgresDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }
}

impl Dialect for MySqlDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

impl Dialect for OracleDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{index}")
    }
}

pub fn dialect_for(variant: SourceVariant) -> Box<dyn Dialect> {
    match variant {
        SourceVariant::SqlServer => Box::new(SqlServerDialect),
        SourceVariant::PostgreSql => Box::new(PostgresDialect),
        SourceVariant::MySql => Box::new(MySqlDialect),
        SourceVariant::Oracle => Box::new(OracleDialect),
    }
}

/// Whitelists an identifier to `\w` characters, closing off SQL-injection
/// through an identifier, then quotes it in the variant's style.
pub fn safe_quoted_ident(dialect: &dyn Dialect, raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    dialect.quote_ident(&sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_word_characters_before_quoting() {
        let dialect = PostgresDialect;
        let quoted = safe_quoted_ident(&dialect, "orders; DROP TABLE x--");
        assert_eq!(quoted, "\"ordersDROPTABLEx\"");
    }
}
