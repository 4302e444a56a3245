use crate::builtin::resolve_builtin;
use crate::error::ResolveError;
use crate::token::substitute;
use async_trait::async_trait;
use model::variable::{GlobalVariable, GlobalVariableKind};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Runs a `GlobalVariableKind::DbQuery`/`Expression`/`RawQuery` to produce
/// the variable's current value. Implemented against the active source
/// connection by the engine; kept as a trait here so this crate never
/// depends on `connectors`.
#[async_trait]
pub trait GlobalVariableStore: Send + Sync {
    async fn lookup(&self, name: &str) -> Option<GlobalVariable>;
    async fn execute(&self, kind: &GlobalVariableKind) -> Result<String, ResolveError>;
}

/// Resolves `$identifier` tokens in a template string. Resolution order
/// is: built-in dynamic, then per-call context, then per-resolver inline
/// variables, then global variables looked up through `store`. Any tier
/// that can't produce a value falls through to the
/// next; if none can, the token becomes the literal string `unknown` and
/// a warning is emitted rather than failing the whole template.
pub struct VariableResolver<'a> {
    store: &'a dyn GlobalVariableStore,
    inline: Mutex<HashMap<String, GlobalVariableKind>>,
    cache: Mutex<HashMap<String, String>>,
}

impl<'a> VariableResolver<'a> {
    pub fn new(store: &'a dyn GlobalVariableStore) -> Self {
        VariableResolver {
            store,
            inline: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_inline(self, name: impl Into<String>, kind: GlobalVariableKind) -> Self {
        self.inline.lock().unwrap().insert(name.into(), kind);
        self
    }

    pub async fn resolve_template(
        &self,
        template: &str,
        context: &HashMap<String, String>,
    ) -> String {
        let (body, bindings) = crate::inline::extract_inline_bindings(template);
        if !bindings.is_empty() {
            let mut inline = self.inline.lock().unwrap();
            for (name, kind) in bindings {
                inline.insert(name, kind);
            }
        }

        // `substitute` is synchronous, so gather tokens first and resolve
        // each concurrently-unsafe call eagerly before doing the textual
        // replacement pass.
        let tokens = crate::token::find_tokens(&body);
        let mut resolved = HashMap::new();
        for name in tokens {
            if resolved.contains_key(&name) {
                continue;
            }
            let value = self.resolve_one(&name, context).await;
            resolved.insert(name, value);
        }
        substitute(&body, |name| {
            resolved.get(name).cloned().unwrap_or_else(|| {
                warn!(variable = name, "unresolved variable token, using fallback");
                "unknown".to_string()
            })
        })
    }

    async fn resolve_one(&self, name: &str, context: &HashMap<String, String>) -> String {
        if let Some(value) = resolve_builtin(name) {
            return value;
        }
        if let Some(value) = context
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
        {
            return value;
        }
        if let Some(cached) = self.cache.lock().unwrap().get(name).cloned() {
            return cached;
        }
        let inline_kind = self.inline.lock().unwrap().get(name).cloned();
        if let Some(kind) = inline_kind {
            return self.execute_and_cache(name, &kind).await;
        }
        if let Some(global) = self.store.lookup(name).await {
            if global.is_active {
                return self.execute_and_cache(name, &global.kind).await;
            }
        }
        warn!(variable = name, "variable could not be resolved in any tier");
        "unknown".to_string()
    }

    async fn execute_and_cache(&self, name: &str, kind: &GlobalVariableKind) -> String {
        match self.store.execute(kind).await {
            Ok(value) => {
                self.cache
                    .lock()
                    .unwrap()
                    .insert(name.to_string(), value.clone());
                value
            }
            Err(err) => {
                warn!(variable = name, error = %err, "variable query failed, using fallback");
                "unknown".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStore {
        globals: HashMap<String, GlobalVariable>,
    }

    #[async_trait]
    impl GlobalVariableStore for FixedStore {
        async fn lookup(&self, name: &str) -> Option<GlobalVariable> {
            self.globals.get(name).cloned()
        }

        async fn execute(&self, kind: &GlobalVariableKind) -> Result<String, ResolveError> {
            match kind {
                GlobalVariableKind::Static { value } => Ok(value.clone()),
                GlobalVariableKind::Expression { expression } => Ok(expression.clone()),
                GlobalVariableKind::DbQuery(_) => Ok("db-value".to_string()),
                GlobalVariableKind::RawQuery { .. } => Ok("raw-value".to_string()),
            }
        }
    }

    fn store_with(name: &str, value: &str) -> FixedStore {
        let mut globals = HashMap::new();
        globals.insert(
            name.to_string(),
            GlobalVariable {
                name: name.to_string(),
                kind: GlobalVariableKind::Static {
                    value: value.to_string(),
                },
                is_active: true,
            },
        );
        FixedStore { globals }
    }

    #[tokio::test]
    async fn context_takes_priority_over_global() {
        let store = store_with("region", "global-region");
        let resolver = VariableResolver::new(&store);
        let mut context = HashMap::new();
        context.insert("region".to_string(), "ctx-region".to_string());
        let out = resolver.resolve_template("$region", &context).await;
        assert_eq!(out, "ctx-region");
    }

    #[tokio::test]
    async fn inline_takes_priority_over_global() {
        let store = store_with("region", "global-region");
        let resolver = VariableResolver::new(&store).with_inline(
            "region",
            GlobalVariableKind::Static {
                value: "inline-region".to_string(),
            },
        );
        let out = resolver.resolve_template("$region", &HashMap::new()).await;
        assert_eq!(out, "inline-region");
    }

    #[tokio::test]
    async fn context_lookup_is_case_insensitive() {
        let store = FixedStore {
            globals: HashMap::new(),
        };
        let resolver = VariableResolver::new(&store);
        let mut context = HashMap::new();
        context.insert("tableName".to_string(), "Orders".to_string());
        let out = resolver.resolve_template("$TABLENAME", &context).await;
        assert_eq!(out, "Orders");
    }

    #[tokio::test]
    async fn builtin_dynamic_variable_is_never_overridden() {
        let store = store_with("uuid", "should-not-be-used");
        let resolver = VariableResolver::new(&store);
        let out = resolver.resolve_template("$uuid", &HashMap::new()).await;
        assert_ne!(out, "should-not-be-used");
    }

    #[tokio::test]
    async fn unknown_variable_falls_back_to_literal() {
        let store = FixedStore {
            globals: HashMap::new(),
        };
        let resolver = VariableResolver::new(&store);
        let out = resolver.resolve_template("$missing", &HashMap::new()).await;
        assert_eq!(out, "unknown");
    }

    #[tokio::test]
    async fn global_lookup_is_cached_across_calls() {
        let store = store_with("region", "global-region");
        let resolver = VariableResolver::new(&store);
        let first = resolver.resolve_template("$region", &HashMap::new()).await;
        let second = resolver.resolve_template("$region", &HashMap::new()).await;
        assert_eq!(first, second);
        assert_eq!(first, "global-region");
    }
}
