//! # Runtime Configuration Module
//!
//! Configuration for the dispatch engine, its worker pool and the local connector.
//!
//! Values come from environment variables, or from a YAML document when the
//! engine is embedded in a larger service.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `CONTINUUM_WORKERS` | `4` | worker coroutines in the pool |
//! | `CONTINUUM_STACK_SIZE` | `0x10000` | coroutine stack size, decimal or `0x` hex |
//! | `CONTINUUM_ASYNC_TIMEOUT_MS` | `30000` | how long an exchange may stay suspended |
//! | `CONTINUUM_RESPONSE_TIMEOUT_MS` | `30000` | how long the connector waits for completion |
//! | `CONTINUUM_SERVER_NAME` | `continuum` | value of the `Server:` response header |
//!
//! ## YAML
//!
//! ```yaml
//! workers: 8
//! stack_size: 0x8000
//! async_timeout_ms: 5000
//! ```
//!
//! Missing keys fall back to the defaults above.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker coroutines executing scheduled tasks
    pub workers: usize,
    /// Stack size for worker coroutines in bytes
    #[serde(deserialize_with = "deserialize_stack_size")]
    pub stack_size: usize,
    /// Deadline for a suspended exchange before it expires
    pub async_timeout_ms: u64,
    /// How long the connector waits for an exchange to complete
    pub response_timeout_ms: u64,
    /// Rendered into the `Server:` header
    pub server_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stack_size: DEFAULT_STACK_SIZE,
            async_timeout_ms: 30_000,
            response_timeout_ms: 30_000,
            server_name: "continuum".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env::var("CONTINUUM_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.workers),
            stack_size: env::var("CONTINUUM_STACK_SIZE")
                .ok()
                .and_then(|s| parse_stack_size(&s))
                .unwrap_or(defaults.stack_size),
            async_timeout_ms: env::var("CONTINUUM_ASYNC_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.async_timeout_ms),
            response_timeout_ms: env::var("CONTINUUM_RESPONSE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.response_timeout_ms),
            server_name: env::var("CONTINUUM_SERVER_NAME").unwrap_or(defaults.server_name),
        }
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid engine configuration")
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&text)
    }

    #[must_use]
    pub fn async_timeout(&self) -> Duration {
        Duration::from_millis(self.async_timeout_ms)
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Accepts `16384` or `0x4000`.
#[must_use]
pub fn parse_stack_size(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn deserialize_stack_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(usize),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_stack_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stack size '{s}'"))),
    }
}
