use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CrosstalkError, Result};

/// Per-worker settings, fixed for the lifetime of one context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextOptions {
    /// Worker-specific configuration, passed through untouched.
    pub config: Value,
    pub environment_id: i64,
    /// Suppress routine logging (authorization failures are always logged).
    pub silent: bool,
    pub worker_id: i64,
    pub worker_path: String,
    /// Token presented to the remote fabric for proxied messages.
    pub proxy_token: Option<String>,
}

/// TOML overlay; only keys present in the file replace the defaults.
/// Unknown keys are rejected so a misspelled option never goes unnoticed.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ContextOptionsToml {
    config: Option<toml::Value>,
    environment_id: Option<i64>,
    silent: Option<bool>,
    worker_id: Option<i64>,
    worker_path: Option<String>,
    proxy_token: Option<String>,
}

impl ContextOptions {
    /// Defaults taken from `CROSSTALK_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            config: Value::Null,
            environment_id: env_parse("CROSSTALK_ENVIRONMENT_ID").unwrap_or(0),
            silent: std::env::var("CROSSTALK_SILENT")
                .ok()
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
            worker_id: env_parse("CROSSTALK_WORKER_ID").unwrap_or(0),
            worker_path: std::env::var("CROSSTALK_WORKER_PATH").unwrap_or_default(),
            proxy_token: std::env::var("CROSSTALK_PROXY_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Load a TOML file and overlay it onto the environment defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let options = Self::from_toml_str(&text)?;
        tracing::info!(target: "crosstalk", path = %path.display(), "Loaded context options");
        Ok(options)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let overlay: ContextOptionsToml = toml::from_str(text)
            .map_err(|e| CrosstalkError::ConfigError(format!("invalid context options: {e}")))?;
        overlay.overlay(Self::from_env())
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn proxy_token_or_empty(&self) -> &str {
        self.proxy_token.as_deref().unwrap_or("")
    }
}

impl ContextOptionsToml {
    fn overlay(self, mut base: ContextOptions) -> Result<ContextOptions> {
        if let Some(config) = self.config {
            base.config = serde_json::to_value(config)?;
        }
        if let Some(v) = self.environment_id {
            base.environment_id = v;
        }
        if let Some(v) = self.silent {
            base.silent = v;
        }
        if let Some(v) = self.worker_id {
            base.worker_id = v;
        }
        if let Some(v) = self.worker_path {
            base.worker_path = v;
        }
        if let Some(v) = self.proxy_token {
            base.proxy_token = Some(v);
        }
        Ok(base)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
