use regex::Regex;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid token regex"));

/// Finds every `$identifier` occurrence in `template`, in left-to-right
/// order, duplicates included. Tokens are matched by the same
/// identifier grammar `model::variable::GlobalVariable::is_valid_name`
/// enforces for declared names.
pub fn find_tokens(template: &str) -> Vec<String> {
    TOKEN_PATTERN
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Replaces every `$identifier` occurrence with the value `resolve`
/// returns for it. `resolve` is called once per occurrence, in order.
pub fn substitute(template: &str, mut resolve: impl FnMut(&str) -> String) -> String {
    TOKEN_PATTERN
        .replace_all(template, |caps: &regex::Captures| resolve(&caps[1]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_tokens_in_order() {
        let tokens = find_tokens("select * from $schema.$table where id = $id");
        assert_eq!(tokens, vec!["schema", "table", "id"]);
    }

    #[test]
    fn ignores_dollar_without_identifier() {
        assert!(find_tokens("price: $5.00").is_empty());
    }

    #[test]
    fn substitutes_each_occurrence() {
        let out = substitute("$a and $a", |name| format!("[{name}]"));
        assert_eq!(out, "[a] and [a]");
    }
}
