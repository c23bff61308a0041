use crate::error::{AppError, Result};
use crate::pipeline::filters::{drop, split, Filter, RawConfig};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builds a configured filter from its raw configuration block
pub type FilterConstructor = fn(&RawConfig, &CancellationToken) -> Result<Box<dyn Filter>>;

/// Mapping from filter type name to constructor.
///
/// Populate it before building chains; it is read-only afterwards.
#[derive(Default, Clone)]
pub struct FilterRegistry {
    handlers: HashMap<String, FilterConstructor>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every filter shipped in this crate
    pub fn with_builtin_filters() -> Self {
        let mut registry = Self::new();
        registry.register(split::MODULE_NAME, split::SplitFilter::from_config);
        registry.register(drop::MODULE_NAME, drop::DropFilter::from_config);
        registry
    }

    /// Register a constructor, replacing any previous one with the same name
    pub fn register(&mut self, name: &str, constructor: FilterConstructor) {
        self.handlers.insert(name.to_string(), constructor);
    }

    pub fn lookup(&self, name: &str) -> Option<FilterConstructor> {
        self.handlers.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the ordered filter chain. Fails on the first bad block.
    pub fn build_chain(
        &self,
        ctx: &CancellationToken,
        raws: &[RawConfig],
    ) -> Result<Vec<Box<dyn Filter>>> {
        let mut filters = Vec::with_capacity(raws.len());

        for raw in raws {
            let type_name = match raw.get("type") {
                Some(Value::String(name)) if !name.is_empty() => name,
                _ => return Err(AppError::InvalidFilterType(Value::Object(raw.clone()).to_string())),
            };

            let constructor = self
                .lookup(type_name)
                .ok_or_else(|| AppError::UnknownFilterType(type_name.clone()))?;

            let filter = constructor(raw, ctx).map_err(|e| AppError::FilterInitFailed {
                type_name: type_name.clone(),
                raw: Value::Object(raw.clone()).to_string(),
                source: Box::new(e),
            })?;

            debug!("Built filter {} at position {}", type_name, filters.len());
            filters.push(filter);
        }

        Ok(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::LogEvent;
    use crate::pipeline::filters::{FilterConfig, FilterOutput};
    use serde_json::json;

    struct NoopFilter {
        common: FilterConfig,
    }

    #[async_trait::async_trait]
    impl Filter for NoopFilter {
        fn type_name(&self) -> &str {
            "noop"
        }

        fn common(&self) -> &FilterConfig {
            &self.common
        }

        async fn event(&mut self, _ctx: &CancellationToken, event: LogEvent) -> FilterOutput {
            FilterOutput::ok(vec![event])
        }
    }

    fn noop(_raw: &RawConfig, _ctx: &CancellationToken) -> Result<Box<dyn Filter>> {
        Ok(Box::new(NoopFilter { common: FilterConfig::default() }))
    }

    fn failing(_raw: &RawConfig, _ctx: &CancellationToken) -> Result<Box<dyn Filter>> {
        Err(AppError::Config("rejected".to_string()))
    }

    fn raw(value: Value) -> RawConfig {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FilterRegistry::new();
        registry.register("foo", noop);

        let found = registry.lookup("foo").unwrap();
        assert_eq!(found as usize, noop as FilterConstructor as usize);
        assert!(registry.lookup("bar").is_none());
    }

    #[test]
    fn test_register_last_writer_wins() {
        let mut registry = FilterRegistry::new();
        registry.register("foo", noop);
        registry.register("foo", failing);

        let found = registry.lookup("foo").unwrap();
        assert_eq!(found as usize, failing as FilterConstructor as usize);
        assert_eq!(registry.names(), vec!["foo"]);
    }

    #[test]
    fn test_builtin_filters() {
        let registry = FilterRegistry::with_builtin_filters();
        assert_eq!(registry.names(), vec!["drop", "split"]);
    }

    #[test]
    fn test_build_chain_in_order() {
        let ctx = CancellationToken::new();
        let mut registry = FilterRegistry::with_builtin_filters();
        registry.register("noop", noop);

        let chain = registry
            .build_chain(
                &ctx,
                &[
                    raw(json!({"type": "noop"})),
                    raw(json!({"type": "split", "split_source": "items"})),
                    raw(json!({"type": "drop", "condition": "false"})),
                ],
            )
            .unwrap();

        let names: Vec<&str> = chain.iter().map(|f| f.type_name()).collect();
        assert_eq!(names, vec!["noop", "split", "drop"]);
    }

    #[test]
    fn test_unknown_filter_type() {
        let ctx = CancellationToken::new();
        let mut registry = FilterRegistry::new();
        registry.register("noop", noop);

        let result = registry.build_chain(
            &ctx,
            &[raw(json!({"type": "noop"})), raw(json!({"type": "doesnotexist"}))],
        );

        match result {
            Err(AppError::UnknownFilterType(name)) => assert_eq!(name, "doesnotexist"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(chain) => panic!("built {} filters", chain.len()),
        }
    }

    #[test]
    fn test_filter_init_failed() {
        let ctx = CancellationToken::new();
        let mut registry = FilterRegistry::new();
        registry.register("bad", failing);

        let result = registry.build_chain(&ctx, &[raw(json!({"type": "bad", "x": 1}))]);

        match result {
            Err(AppError::FilterInitFailed { type_name, raw, source }) => {
                assert_eq!(type_name, "bad");
                assert!(raw.contains("\"x\":1"));
                assert!(matches!(*source, AppError::Config(_)));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(chain) => panic!("built {} filters", chain.len()),
        }
    }

    #[test]
    fn test_missing_or_invalid_type() {
        let ctx = CancellationToken::new();
        let registry = FilterRegistry::with_builtin_filters();

        for block in [json!({}), json!({"type": 3}), json!({"type": ""})] {
            let result = registry.build_chain(&ctx, &[raw(block)]);
            assert!(matches!(result, Err(AppError::InvalidFilterType(_))));
        }
    }
}
