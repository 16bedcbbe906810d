//! Configuration schema types.
//!
//! All structs accept both `snake_case` and `camelCase` field names in JSON
//! via `#[serde(alias)]`, and every field has a default so an empty object
//! (`{}`) is a complete configuration. Unknown fields are silently ignored
//! for forward compatibility.
//!
//! # Module Structure
//!
//! - [`channels`] -- Per-channel settings (debounce window, access policy,
//!   outbound chunking)

pub mod channels;

pub use channels::*;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// Shared default function: returns `true`.
pub(crate) fn default_true() -> bool {
    true
}

// ── Root config ──────────────────────────────────────────────────────────

/// Root configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Per-channel overrides, keyed by channel id.
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,

    /// Settings for channels without an entry in `channels`.
    #[serde(default)]
    pub defaults: ChannelConfig,

    /// Attachment limits.
    #[serde(default)]
    pub media: MediaConfig,

    /// Coordinator timeouts and retry settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Parse a JSON document into a config.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config)
    }

    /// Settings for `channel_id`, falling back to [`defaults`](Config::defaults).
    pub fn channel(&self, channel_id: &str) -> &ChannelConfig {
        self.channels.get(channel_id).unwrap_or(&self.defaults)
    }

    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate("defaults")?;
        for (id, channel) in &self.channels {
            if id.trim().is_empty() {
                return Err(ParleyError::config("channel ids must not be empty"));
            }
            channel.validate(id)?;
        }
        self.media.validate()?;
        self.pipeline.validate()
    }
}

// ── Media ────────────────────────────────────────────────────────────────

/// Attachment size / type limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Largest accepted payload in bytes.
    #[serde(default = "default_max_file_size", alias = "maxFileSizeBytes")]
    pub max_file_size_bytes: u64,

    /// MIME allow-list. Entries are exact types or `type/*` wildcards.
    #[serde(default = "default_allowed_types", alias = "allowedTypes")]
    pub allowed_types: Vec<String>,

    /// Maximum concurrent fetches for the attachments of one message.
    #[serde(default = "default_max_concurrent_fetches", alias = "maxConcurrentFetches")]
    pub max_concurrent_fetches: usize,

    /// Per-fetch deadline in seconds.
    #[serde(default = "default_fetch_timeout", alias = "fetchTimeoutSecs")]
    pub fetch_timeout_secs: u64,
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024
}
fn default_allowed_types() -> Vec<String> {
    vec![
        "image/*".into(),
        "audio/*".into(),
        "video/*".into(),
        "application/pdf".into(),
    ]
}
fn default_max_concurrent_fetches() -> usize {
    4
}
fn default_fetch_timeout() -> u64 {
    30
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            allowed_types: default_allowed_types(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl MediaConfig {
    /// Per-fetch deadline.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_file_size_bytes == 0 {
            return Err(ParleyError::config("media.max_file_size_bytes must be positive"));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ParleyError::config(
                "media.max_concurrent_fetches must be positive",
            ));
        }
        for pattern in &self.allowed_types {
            if !is_valid_mime_pattern(pattern) {
                return Err(ParleyError::config(format!(
                    "media.allowed_types: '{pattern}' is not a MIME type or 'type/*' pattern"
                )));
            }
        }
        Ok(())
    }
}

/// `*`, `*/*`, `type/*` or `type/subtype`, with no other wildcards.
fn is_valid_mime_pattern(pattern: &str) -> bool {
    if pattern == "*" || pattern == "*/*" {
        return true;
    }
    let Some((kind, sub)) = pattern.split_once('/') else {
        return false;
    };
    !kind.is_empty()
        && !sub.is_empty()
        && !kind.contains('*')
        && (sub == "*" || !sub.contains('*'))
        && !pattern.chars().any(char::is_whitespace)
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Coordinator timeouts, retry and shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for one reasoning-engine call, in seconds.
    #[serde(default = "default_engine_timeout", alias = "engineTimeoutSecs")]
    pub engine_timeout_secs: u64,

    /// Text sent to the chat when processing fails.
    #[serde(default = "default_apology", alias = "apologyText")]
    pub apology_text: String,

    /// Delay before the single retry of a failed send, in milliseconds.
    #[serde(default = "default_send_backoff", alias = "sendRetryBackoffMs")]
    pub send_retry_backoff_ms: u64,

    /// How long shutdown waits for in-flight dispatches, in seconds.
    #[serde(default = "default_shutdown_grace", alias = "shutdownGraceSecs")]
    pub shutdown_grace_secs: u64,

    /// How long `stop_all` waits for each adapter, in seconds.
    #[serde(default = "default_stop_timeout", alias = "adapterStopTimeoutSecs")]
    pub adapter_stop_timeout_secs: u64,

    /// How long `health_check_all` waits for each adapter, in seconds.
    #[serde(default = "default_health_timeout", alias = "healthCheckTimeoutSecs")]
    pub health_check_timeout_secs: u64,

    /// How long `start_all` watches a freshly started adapter for an
    /// immediate failure, in milliseconds.
    #[serde(default = "default_start_probe", alias = "adapterStartProbeMs")]
    pub adapter_start_probe_ms: u64,
}

fn default_engine_timeout() -> u64 {
    120
}
fn default_apology() -> String {
    "Sorry, something went wrong. Please try again later.".into()
}
fn default_send_backoff() -> u64 {
    500
}
fn default_shutdown_grace() -> u64 {
    10
}
fn default_stop_timeout() -> u64 {
    5
}
fn default_health_timeout() -> u64 {
    5
}
fn default_start_probe() -> u64 {
    250
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine_timeout_secs: default_engine_timeout(),
            apology_text: default_apology(),
            send_retry_backoff_ms: default_send_backoff(),
            shutdown_grace_secs: default_shutdown_grace(),
            adapter_stop_timeout_secs: default_stop_timeout(),
            health_check_timeout_secs: default_health_timeout(),
            adapter_start_probe_ms: default_start_probe(),
        }
    }
}

impl PipelineConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn send_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.send_retry_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn adapter_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_stop_timeout_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn adapter_start_probe(&self) -> Duration {
        Duration::from_millis(self.adapter_start_probe_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.engine_timeout_secs == 0 {
            return Err(ParleyError::config("pipeline.engine_timeout_secs must be positive"));
        }
        if self.apology_text.trim().is_empty() {
            return Err(ParleyError::config("pipeline.apology_text must not be empty"));
        }
        Ok(())
    }
}
