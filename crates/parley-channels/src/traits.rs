//! Channel contract definitions.
//!
//! Defines the two traits at the adapter boundary:
//!
//! - [`Channel`] -- implemented by each adapter (console, a bot API, ...)
//! - [`ChannelHost`] -- implemented by the pipeline, consumed by adapters
//!   for delivering inbound messages

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use parley_types::error::ChannelError;
use parley_types::event::{AttachmentRef, InboundMessage, MediaRef, SendOptions};

/// Kind of conversation an adapter can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one conversation.
    Direct,
    /// Multi-user group.
    Group,
    /// Broadcast channel.
    Channel,
}

/// What an adapter supports. The coordinator consults this to skip
/// unsupported steps (no attachment fetch without `media`, no thread ids
/// without `threads`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCapabilities {
    /// Conversation kinds the adapter handles.
    pub chat_types: Vec<ChatType>,
    /// Whether messages can be reacted to.
    pub reactions: bool,
    /// Whether threaded replies are supported.
    pub threads: bool,
    /// Whether media attachments can be received and sent.
    pub media: bool,
    /// Whether slash-style commands are supported.
    pub commands: bool,
}

impl Default for ChannelCapabilities {
    fn default() -> Self {
        Self {
            chat_types: vec![ChatType::Direct],
            reactions: false,
            threads: false,
            media: false,
            commands: false,
        }
    }
}

/// Lifecycle status of an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Not yet started.
    Stopped,
    /// Currently connecting / initializing.
    Starting,
    /// Running and processing messages.
    Running,
    /// Encountered an error.
    Error(String),
    /// Shutting down.
    Stopping,
}

/// Unique identifier for a sent message, returned by the send primitives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

/// The contract every channel adapter implements.
///
/// The registry manages the lifecycle:
///
/// 1. The adapter is registered under its [`channel_id`](Channel::channel_id).
/// 2. The registry calls [`start`](Channel::start) with an
///    `Arc<dyn ChannelHost>` and a [`CancellationToken`].
/// 3. `start` is long-lived -- it runs until the token is cancelled.
/// 4. The coordinator calls [`send_text`](Channel::send_text) to push replies.
/// 5. On shutdown the registry cancels the token and calls
///    [`stop`](Channel::stop).
///
/// Send failures are reported as `Err`; there is no separate success flag.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel identifier (e.g., `"console"`, `"telegram"`).
    fn channel_id(&self) -> &str;

    /// Feature set of this adapter.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Current lifecycle status.
    fn status(&self) -> ChannelStatus;

    /// Start receiving messages.
    ///
    /// This method is long-lived: it should run until `cancel` is triggered.
    /// Inbound messages are delivered to the pipeline via
    /// [`ChannelHost::deliver_inbound`].
    async fn start(
        &self,
        host: Arc<dyn ChannelHost>,
        cancel: CancellationToken,
    ) -> Result<(), ChannelError>;

    /// Release transport resources after the start loop was cancelled.
    async fn stop(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Send a text message to `target`.
    async fn send_text(
        &self,
        target: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageId, ChannelError>;

    /// Send a media message to `target` with `text` as its caption.
    async fn send_media(
        &self,
        target: &str,
        text: &str,
        media: &MediaRef,
        options: &SendOptions,
    ) -> Result<MessageId, ChannelError>;

    /// Adapter-supplied health payload.
    async fn health_check(&self) -> Result<serde_json::Value, ChannelError>;

    /// Download the payload behind an attachment reference.
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, ChannelError>;

    /// Turn a user-supplied target (chat id, handle, ...) into the form
    /// `send_*` expects, or `None` if it cannot address anything.
    fn normalize_target(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}

/// Services the pipeline exposes to adapters.
///
/// Passed into [`Channel::start`] so that adapters can deliver inbound
/// messages without holding references to the full application state.
#[async_trait]
pub trait ChannelHost: Send + Sync {
    /// Deliver a normalized inbound message to the pipeline.
    ///
    /// Denied and malformed messages are dropped silently and still return
    /// `Ok`; an `Err` means the pipeline is no longer accepting input.
    async fn deliver_inbound(&self, msg: InboundMessage) -> Result<(), ChannelError>;
}
