//! WebView configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use weft_navigation::{EngineProfile, ABOUT_BLANK};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Native engine behind the adapter; selects the failure code table
    pub engine: EngineProfile,
    /// Log every native navigation signal at info level
    pub diagnostics: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Source reported for string content loaded without a base URL
    pub blank_uri: String,
}

impl Config {
    pub fn new(engine: EngineProfile) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.blank_url()?;
        if self.log_filter.trim().is_empty() {
            return Err(CoreError::Config("log_filter must not be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn blank_url(&self) -> Result<Url> {
        Url::parse(&self.blank_uri)
            .map_err(|e| CoreError::Config(format!("blank_uri {:?}: {}", self.blank_uri, e)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineProfile::Generic,
            diagnostics: false,
            log_filter: "info".to_string(),
            blank_uri: ABOUT_BLANK.to_string(),
        }
    }
}
