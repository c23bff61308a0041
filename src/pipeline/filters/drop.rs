use super::{decode_config, Filter, FilterConfig, FilterOutput, RawConfig};
use crate::error::{AppError, Result};
use crate::pipeline::event::LogEvent;
use cel_interpreter::{Context, Program};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

pub const MODULE_NAME: &str = "drop";

pub const ERROR_TAG: &str = "gogstash_filter_drop_error";

#[derive(Debug, Clone, Deserialize)]
struct DropConfig {
    #[serde(flatten)]
    common: FilterConfig,

    condition: String,
}

/// Drop filter that discards events matching a CEL condition
pub struct DropFilter {
    common: FilterConfig,
    program: Program,
}

impl DropFilter {
    pub fn new(condition: &str, common: FilterConfig) -> Result<Self> {
        let program = Program::compile(condition)
            .map_err(|e| AppError::Config(format!("invalid drop condition {:?}: {}", condition, e)))?;

        Ok(Self { common, program })
    }

    pub fn from_config(raw: &RawConfig, _ctx: &CancellationToken) -> Result<Box<dyn Filter>> {
        let config: DropConfig = decode_config(raw)?;
        Ok(Box::new(Self::new(&config.condition, config.common)?))
    }

    fn matches(&self, event: &LogEvent) -> Result<bool> {
        let mut context = Context::default();
        for (name, value) in activation(event) {
            context
                .add_variable(name.as_str(), value)
                .map_err(|e| AppError::Processing(format!("condition variable {}: {}", name, e)))?;
        }

        match self.program.execute(&context) {
            Ok(cel_interpreter::Value::Bool(matched)) => Ok(matched),
            Ok(other) => Err(AppError::Processing(format!(
                "condition returned {:?}, expected a bool",
                other
            ))),
            Err(e) => Err(AppError::Processing(format!("condition failed: {}", e))),
        }
    }
}

/// Variables visible to a condition: every `extra` key, then the event's own
/// fields, which take precedence.
fn activation(event: &LogEvent) -> Map<String, Value> {
    let mut vars = event.extra.clone();
    vars.insert("message".to_string(), Value::String(event.message.clone()));
    vars.insert("timestamp".to_string(), Value::String(event.timestamp.to_rfc3339()));
    vars.insert("tags".to_string(), Value::from(event.tags.clone()));
    vars.insert("extra".to_string(), Value::Object(event.extra.clone()));
    vars
}

#[async_trait::async_trait]
impl Filter for DropFilter {
    fn type_name(&self) -> &str {
        MODULE_NAME
    }

    fn common(&self) -> &FilterConfig {
        &self.common
    }

    async fn event(&mut self, _ctx: &CancellationToken, mut event: LogEvent) -> FilterOutput {
        match self.matches(&event) {
            Ok(true) => {
                tracing::trace!("Event dropped by condition");
                FilterOutput::ok(Vec::new())
            }
            Ok(false) => FilterOutput::ok(vec![event]),
            Err(e) => {
                tracing::debug!("Drop filter failed on event: {}", e);
                event.add_tag([ERROR_TAG]);
                FilterOutput::soft_failure(vec![event])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_drop_matching() {
        let ctx = CancellationToken::new();
        let mut filter = DropFilter::new("level == 'debug'", FilterConfig::default()).unwrap();

        let mut event = LogEvent::new("noise");
        event.set_value("level", json!("debug"));

        let output = filter.event(&ctx, event).await;
        assert!(output.is_ok());
        assert!(output.events.is_empty());
    }

    #[tokio::test]
    async fn test_keep_non_matching() {
        let ctx = CancellationToken::new();
        let mut filter = DropFilter::new("level == 'debug'", FilterConfig::default()).unwrap();

        let mut event = LogEvent::new("signal");
        event.set_value("level", json!("error"));

        let output = filter.event(&ctx, event.clone()).await;
        assert!(output.is_ok());
        assert_eq!(output.events, vec![event]);
    }

    #[tokio::test]
    async fn test_condition_on_message() {
        let ctx = CancellationToken::new();
        let mut filter =
            DropFilter::new("message.startsWith('healthcheck')", FilterConfig::default()).unwrap();

        let output = filter.event(&ctx, LogEvent::new("healthcheck ok")).await;
        assert!(output.events.is_empty());

        let output = filter.event(&ctx, LogEvent::new("login ok")).await;
        assert_eq!(output.events.len(), 1);
    }

    #[tokio::test]
    async fn test_non_boolean_is_soft_failure() {
        let ctx = CancellationToken::new();
        let mut filter = DropFilter::new("message", FilterConfig::default()).unwrap();

        let output = filter.event(&ctx, LogEvent::new("text")).await;
        assert!(!output.is_ok());
        assert_eq!(output.events.len(), 1);
        assert!(output.events[0].has_tag(ERROR_TAG));
    }

    #[tokio::test]
    async fn test_condition_on_tags_and_extra() {
        let ctx = CancellationToken::new();
        let mut filter =
            DropFilter::new("'debug' in tags || extra.level == 'trace'", FilterConfig::default()).unwrap();

        let mut tagged = LogEvent::new("a");
        tagged.add_tag(["debug"]);
        tagged.set_value("level", json!("info"));
        assert!(filter.event(&ctx, tagged).await.events.is_empty());

        let mut traced = LogEvent::new("b");
        traced.set_value("level", json!("trace"));
        assert!(filter.event(&ctx, traced).await.events.is_empty());

        let mut kept = LogEvent::new("c");
        kept.set_value("level", json!("info"));
        assert_eq!(filter.event(&ctx, kept).await.events.len(), 1);
    }

    #[test]
    fn test_invalid_condition() {
        assert!(DropFilter::new("level ==", FilterConfig::default()).is_err());
    }
}
