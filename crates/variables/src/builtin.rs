use chrono::Utc;
use uuid::Uuid;

/// Built-in dynamic variables, recomputed on every resolution and never
/// cached. Returns `None` for any other name so the
/// resolver can fall through to the next tier.
pub fn resolve_builtin(name: &str) -> Option<String> {
    match name {
        "timestamp" => Some(Utc::now().format("%Y%m%d_%H%M%S").to_string()),
        "date" => Some(Utc::now().format("%Y%m%d").to_string()),
        "uuid" => Some(Uuid::new_v4().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_falls_through() {
        assert_eq!(resolve_builtin("schema_name"), None);
    }

    #[test]
    fn uuid_is_fresh_each_call() {
        let a = resolve_builtin("uuid").unwrap();
        let b = resolve_builtin("uuid").unwrap();
        assert_ne!(a, b);
    }
}
