//! Channel configuration types.
//!
//! One [`ChannelConfig`] per adapter id: whether it runs, how long inbound
//! bursts are coalesced, who may talk to it, and how replies are split.

use serde::{Deserialize, Serialize};

use crate::access::AccessMode;
use crate::error::{ParleyError, Result};

/// Settings for a single channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Whether the channel is started.
    #[serde(default = "super::default_true")]
    pub enabled: bool,

    /// Debounce quiet period in milliseconds.
    #[serde(default = "default_debounce_ms", alias = "debounceMs")]
    pub debounce_ms: u64,

    /// Sender access policy.
    #[serde(default)]
    pub access: AccessConfig,

    /// Outbound chunking.
    #[serde(default)]
    pub outbound: OutboundConfig,
}

fn default_debounce_ms() -> u64 {
    1500
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            access: AccessConfig::default(),
            outbound: OutboundConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub(crate) fn validate(&self, id: &str) -> Result<()> {
        if self.outbound.max_length == 0 {
            return Err(ParleyError::config(format!(
                "{id}: outbound.max_length must be positive"
            )));
        }
        if let Some(bad) = self.access.allow_from.iter().find(|s| s.trim().is_empty()) {
            return Err(ParleyError::config(format!(
                "{id}: access.allow_from contains an empty sender id ({bad:?})"
            )));
        }
        Ok(())
    }
}

/// Sender access policy for a channel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    /// `open`, `pairing` or `disabled`.
    #[serde(default)]
    pub policy: AccessMode,

    /// Sender ids approved up front. Matching is exact and case-sensitive.
    #[serde(default, alias = "allowFrom")]
    pub allow_from: Vec<String>,
}

/// How replies are split for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Largest fragment the channel accepts, in characters.
    #[serde(default = "default_max_length", alias = "maxLength")]
    pub max_length: usize,

    /// Splitting strategy.
    #[serde(default)]
    pub mode: ChunkMode,
}

fn default_max_length() -> usize {
    4096
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            mode: ChunkMode::default(),
        }
    }
}

/// Outbound splitting strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// Split on markdown block boundaries; fenced code stays intact.
    #[default]
    Structured,
    /// Split on paragraph, line and word boundaries only.
    Plain,
}
