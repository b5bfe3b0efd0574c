//! Engine configuration, loadable from TOML.
//!
//! Every section and field has a default, so a file only needs the values
//! it changes:
//!
//! ```toml
//! [parser]
//! delimiter = "|"
//!
//! [source]
//! max_out_of_orderness_ms = 2000
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub parser: ParserConfig,
    pub source: SourceConfig,
    pub channel: ChannelConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid engine configuration")
    }

    /// Read and parse the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Delimited record parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Field separator.
    pub delimiter: char,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

/// Flow sources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// How far behind the newest event time watermarks trail.
    pub max_out_of_orderness_ms: u64,
}

/// Queues between a source and its consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: crate::exec::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
