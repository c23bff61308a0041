use super::{decode_config, Filter, FilterConfig, FilterOutput, RawConfig};
use crate::error::Result;
use crate::pipeline::event::LogEvent;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub const MODULE_NAME: &str = "split";

pub const ERROR_TAG: &str = "gogstash_filter_split_error";

#[derive(Debug, Clone, Deserialize)]
struct SplitConfig {
    #[serde(flatten)]
    common: FilterConfig,

    #[serde(rename = "split_source")]
    source: String,
}

/// Split filter: fans one event out into one event per element of an array field
pub struct SplitFilter {
    common: FilterConfig,
    source: String,
}

impl SplitFilter {
    pub fn new(source: impl Into<String>, common: FilterConfig) -> Self {
        Self {
            common,
            source: source.into(),
        }
    }

    pub fn from_config(raw: &RawConfig, _ctx: &CancellationToken) -> Result<Box<dyn Filter>> {
        let config: SplitConfig = decode_config(raw)?;
        Ok(Box::new(Self::new(config.source, config.common)))
    }
}

#[async_trait::async_trait]
impl Filter for SplitFilter {
    fn type_name(&self) -> &str {
        MODULE_NAME
    }

    fn common(&self) -> &FilterConfig {
        &self.common
    }

    async fn event(&mut self, _ctx: &CancellationToken, mut event: LogEvent) -> FilterOutput {
        let items = match event.get_sequence(&self.source) {
            Ok(items) => items,
            Err(e) => {
                tracing::debug!("Split filter cannot split event: {}", e);
                event.add_tag([ERROR_TAG]);
                return FilterOutput::soft_failure(vec![event]);
            }
        };

        event.remove_extra(&self.source);

        let events = items
            .into_iter()
            .map(|item| {
                let mut split = event.clone();
                split.set_extra(&self.source, item);
                split
            })
            .collect();

        FilterOutput::ok(events)
    }
}
