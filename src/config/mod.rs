use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::pipeline::filters::RawConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_chan_size")]
    pub chan_size: usize,

    #[serde(default)]
    pub filter: Vec<RawConfig>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content)?;
        if config.chan_size == 0 {
            return Err(crate::error::AppError::Config(
                "chan_size must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let config_path = std::env::var("CONFIGURATION_PATH")
            .unwrap_or_else(|_| "config/config.json".to_string());
        Self::from_file(&config_path)
    }
}

fn default_chan_size() -> usize {
    100
}
