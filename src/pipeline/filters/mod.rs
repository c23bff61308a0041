pub mod drop;
pub mod split;

use crate::error::{AppError, Result};
use crate::pipeline::event::LogEvent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Raw configuration block of one filter, as loaded from the config file
pub type RawConfig = serde_json::Map<String, Value>;

/// Decode a raw configuration block into a plugin's typed config
pub fn decode_config<T: DeserializeOwned>(raw: &RawConfig) -> Result<T> {
    serde_json::from_value(Value::Object(raw.clone()))
        .map_err(|e| AppError::Config(format!("Invalid filter config: {}", e)))
}

/// Name/value pair for `add_field`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    pub key: String,
    pub value: String,
}

/// Configuration shared by every filter
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub add_tag: Vec<String>,

    #[serde(default)]
    pub remove_tag: Vec<String>,

    #[serde(default)]
    pub add_field: Vec<FieldConfig>,

    #[serde(default)]
    pub remove_field: Vec<String>,
}

impl FilterConfig {
    pub fn is_configured(&self) -> bool {
        !self.add_tag.is_empty()
            || !self.remove_tag.is_empty()
            || !self.add_field.is_empty()
            || !self.remove_field.is_empty()
    }

    /// Apply the add/remove rules: tags are added then removed, fields are
    /// removed then added.
    pub fn apply(&self, mut event: LogEvent) -> LogEvent {
        event.add_tag(&self.add_tag);
        event.remove_tag(&self.remove_tag);

        for key in &self.remove_field {
            event.remove(key);
        }

        for field in &self.add_field {
            let value = event.format(&field.value);
            event.set_value(&field.key, Value::String(value));
        }

        event
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// The filter handled the event; the common transform applies
    Ok,
    /// Recoverable per-event failure; events flow on without the common transform
    SoftFailure,
}

/// Events produced by one filter for one input event
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub events: Vec<LogEvent>,
    pub status: FilterStatus,
}

impl FilterOutput {
    pub fn ok(events: Vec<LogEvent>) -> Self {
        Self { events, status: FilterStatus::Ok }
    }

    pub fn soft_failure(events: Vec<LogEvent>) -> Self {
        Self { events, status: FilterStatus::SoftFailure }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FilterStatus::Ok
    }
}

/// Trait for filter plugins
#[async_trait::async_trait]
pub trait Filter: Send {
    /// Name the filter was registered under
    fn type_name(&self) -> &str;

    fn common(&self) -> &FilterConfig;

    /// Process one event into zero or more events
    async fn event(&mut self, ctx: &CancellationToken, event: LogEvent) -> FilterOutput;

    fn common_filter(&self, _ctx: &CancellationToken, event: LogEvent) -> LogEvent {
        self.common().apply(event)
    }
}
