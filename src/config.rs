//! Runtime configuration.
//!
//! Only the completion client reads the endpoint settings. The template and
//! masking engines take no configuration at all.

use crate::error::{PilotError, PilotResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "sqlpilot.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Resource URL, e.g. `https://my-resource.openai.azure.com/`
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    /// Model deployment name
    pub deployment: String,
    pub api_version: String,
    pub timeout_secs: u64,
    /// Prompt root holding `index.toml`. Unset means the bundled prompts.
    pub prompts_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            deployment: "gpt-4o".to_string(),
            api_version: "2025-01-01-preview".to_string(),
            timeout_secs: 60,
            prompts_dir: None,
        }
    }
}

impl Config {
    /// Resolve configuration for this process.
    ///
    /// An explicit path must exist. Otherwise `./sqlpilot.toml`, then
    /// `<config dir>/sqlpilot/config.toml` are tried before falling back to
    /// defaults. Environment variables win over file values.
    pub fn load(explicit: Option<&Path>) -> PilotResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_locations().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PilotResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PilotError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PilotResult<Self> {
        toml::from_str(content).map_err(|e| PilotError::Config(e.to_string()))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sqlpilot").join("config.toml"));
        }
        paths
    }

    /// Override file values with `SQLPILOT_*` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SQLPILOT_API_BASE") {
            self.api_base = Some(v);
        }
        if let Some(v) = lookup("SQLPILOT_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("SQLPILOT_DEPLOYMENT") {
            self.deployment = v;
        }
        if let Some(v) = lookup("SQLPILOT_API_VERSION") {
            self.api_version = v;
        }
        if let Some(v) = lookup("SQLPILOT_PROMPTS_DIR") {
            self.prompts_dir = Some(PathBuf::from(v));
        }
    }
}
