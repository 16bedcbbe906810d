//! Error types for the parley pipeline.
//!
//! [`ParleyError`] is the pipeline-level taxonomy. [`ChannelError`],
//! [`AttachmentError`] and [`EngineError`] cover the three external
//! boundaries (channel adapters, attachment payloads, the reasoning engine).
//! All are non-exhaustive to allow future extension without breaking
//! downstream.

use thiserror::Error;

use crate::access::AccessReason;

/// Pipeline-level error type.
///
/// Variants map onto how the coordinator recovers:
/// - `AccessDenied` is a silent drop (counter only, never a reply).
/// - `Attachment` is per-attachment and never fatal to the message.
/// - `EngineTimeout`, `EngineFailure` and `AdapterSendFailed` end in a
///   single user-visible apology.
/// - `Channel` and `ConfigInvalid` are surfaced to the operator.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ParleyError {
    /// The sender is not allowed to interact on this channel.
    #[error("access denied: {reason}")]
    AccessDenied {
        /// Wire name of the denial reason (`not_paired`, `blocked`, `disabled`).
        reason: String,
    },

    /// An attachment could not be resolved.
    #[error("attachment rejected: {0}")]
    Attachment(#[from] AttachmentError),

    /// The reasoning engine did not answer within its deadline.
    #[error("engine timed out after {after_ms}ms")]
    EngineTimeout {
        /// The deadline that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// The reasoning engine returned an error.
    #[error("engine failure: {0}")]
    EngineFailure(#[from] EngineError),

    /// An outbound send failed after its retry.
    #[error("adapter send failed on {channel}: {reason}")]
    AdapterSendFailed {
        /// Channel the send was routed to.
        channel: String,
        /// Last error reported by the adapter.
        reason: String,
    },

    /// A channel-layer error bubbled up.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParleyError {
    /// Shorthand for [`ParleyError::ConfigInvalid`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ParleyError::AccessDenied`].
    pub fn access_denied(reason: AccessReason) -> Self {
        Self::AccessDenied {
            reason: reason.as_str().to_owned(),
        }
    }
}

/// Channel-specific error type.
///
/// Used by channel adapters to report failures in connecting,
/// authenticating, exchanging messages or fetching payloads, and by the
/// registry for configuration mistakes.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    /// Failed to establish a connection to the channel backend.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication / authorization was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Sending a message failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a message failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The channel is not currently connected.
    #[error("not connected")]
    NotConnected,

    /// An adapter with the same id is already registered.
    #[error("channel already registered: {0}")]
    DuplicateChannel(String),

    /// No adapter is registered under the requested id.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Downloading an attachment payload failed.
    #[error("attachment fetch failed: {0}")]
    FetchFailed(String),

    /// The adapter did not shut down within its deadline.
    #[error("channel {channel} did not stop within {after_ms}ms")]
    StopTimeout {
        /// Channel that was abandoned.
        channel: String,
        /// The deadline that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// Catch-all for errors that do not fit other variants.
    #[error("{0}")]
    Other(String),
}

/// Per-attachment resolution failure.
///
/// Never fatal to the message carrying the attachment: the coordinator
/// drops the attachment and tells the engine about it in the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttachmentError {
    /// The payload (declared or fetched) exceeds the configured maximum.
    #[error("attachment of {size} bytes exceeds the {max} byte limit")]
    TooLarge {
        /// Payload size in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },

    /// The MIME type matches no pattern in the allow-list.
    #[error("attachment type '{mime_type}' is not allowed")]
    TypeNotAllowed {
        /// The rejected MIME type.
        mime_type: String,
    },

    /// The adapter could not produce the payload.
    #[error("attachment fetch failed: {0}")]
    FetchFailed(String),
}

/// Error returned by the external reasoning engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// A transient failure (overload, upstream hiccup).
    #[error("recoverable engine error: {0}")]
    Recoverable(String),

    /// A failure that will not go away on retry.
    #[error("fatal engine error: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Whether retrying the same request could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ParleyError>;
