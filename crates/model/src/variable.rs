use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WhereOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    In,
}

impl WhereOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            WhereOperator::Eq => "=",
            WhereOperator::Ne => "!=",
            WhereOperator::Gt => ">",
            WhereOperator::Lt => "<",
            WhereOperator::Ge => ">=",
            WhereOperator::Le => "<=",
            WhereOperator::Like => "LIKE",
            WhereOperator::In => "IN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhereCondition {
    pub field: String,
    pub operator: WhereOperator,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopedConnection {
    pub server: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ScopedConnection {
    pub fn is_set(&self) -> bool {
        self.server.is_some() || self.database.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbQuerySpec {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub where_conditions: Vec<WhereCondition>,
    pub connection: ScopedConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GlobalVariableKind {
    Static { value: String },
    DbQuery(DbQuerySpec),
    Expression { expression: String },
    /// Fallback for an inline SELECT the hand-written recogniser could not
    /// parse into a `DbQuerySpec`: executed verbatim, parameterless.
    RawQuery { raw_query: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: String,
    pub kind: GlobalVariableKind,
    pub is_active: bool,
}

impl GlobalVariable {
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_names_starting_with_digit() {
        assert!(!GlobalVariable::is_valid_name("1abc"));
    }

    #[test]
    fn accepts_underscored_identifier() {
        assert!(GlobalVariable::is_valid_name("_customer_id"));
    }
}
