//! Access control types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Access policy for a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Anyone can message the bot.
    Open,
    /// Only allow-listed senders; unknown senders are dropped silently.
    #[default]
    Pairing,
    /// Nobody can message the bot on this channel.
    Disabled,
}

/// Why an access check came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    Ok,
    NotPaired,
    Blocked,
    Disabled,
}

impl AccessReason {
    /// Wire name, e.g. `"not_paired"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotPaired => "not_paired",
            Self::Blocked => "blocked",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    /// The sender may proceed.
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: AccessReason::Ok,
        }
    }

    /// The sender is denied for `reason`.
    pub const fn deny(reason: AccessReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}
