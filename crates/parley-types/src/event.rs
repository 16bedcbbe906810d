//! Message event types for the channel pipeline.
//!
//! [`InboundMessage`] is one normalized unit of user input arriving from a
//! channel adapter, [`AttachmentRef`] / [`ResolvedAttachment`] describe the
//! binary payloads it may carry, and [`OutboundFragment`] is one piece of a
//! reply heading back out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::ConversationalKey;

/// An inbound message received from a chat channel, already normalized
/// into the channel-agnostic model.
///
/// A valid message has a non-empty `channel_id` and at least one of `text`
/// or `attachments`; see [`is_valid`](InboundMessage::is_valid).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Adapter that produced the message (e.g. `"telegram"`).
    pub channel_id: String,

    /// Addressable conversation on that channel.
    pub chat_id: String,

    /// Sender identifier within the channel.
    pub sender_id: String,

    /// Human-readable sender name.
    #[serde(default)]
    pub sender_display_name: String,

    /// Message text; empty for media-only messages.
    #[serde(default)]
    pub text: String,

    /// Attached media, in the order the sender attached them.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,

    /// Channel message id this message replies to.
    #[serde(default)]
    pub reply_to_id: Option<String>,

    /// Thread / topic id for threaded conversations.
    #[serde(default)]
    pub thread_id: Option<String>,

    /// When the message was received.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a plain text message received now.
    pub fn text(
        channel_id: impl Into<String>,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            sender_display_name: String::new(),
            text: text.into(),
            attachments: Vec::new(),
            reply_to_id: None,
            thread_id: None,
            received_at: Utc::now(),
        }
    }

    /// Append an attachment.
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Set the sender display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.sender_display_name = name.into();
        self
    }

    /// Whether the message satisfies the model invariant: a channel id and
    /// some content.
    pub fn is_valid(&self) -> bool {
        !self.channel_id.is_empty() && (!self.text.is_empty() || !self.attachments.is_empty())
    }

    /// Debounce key: `"{channel}:{chat}:{sender}"`.
    pub fn conversational_key(&self) -> ConversationalKey {
        ConversationalKey::new(&self.channel_id, &self.chat_id, &self.sender_id)
    }
}

/// Kind of media carried by an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    Document,
    Voice,
    Sticker,
}

/// Reference to a binary payload held by the channel.
///
/// The payload itself is fetched lazily through the adapter using
/// `source_token`, which is opaque outside the adapter (a remote file
/// handle, a URL, a local path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Media kind.
    pub kind: AttachmentKind,

    /// MIME type as reported by the channel (e.g. `"image/jpeg"`).
    pub mime_type: String,

    /// Channel-specific locator used by `fetch_attachment`.
    pub source_token: String,

    /// Size in bytes, if the channel reported it.
    #[serde(default)]
    pub size_bytes: Option<u64>,

    /// Duration for audio / video, in seconds.
    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// Width in pixels for images / video.
    #[serde(default)]
    pub width: Option<u32>,

    /// Height in pixels for images / video.
    #[serde(default)]
    pub height: Option<u32>,

    /// Caption attached by the sender.
    #[serde(default)]
    pub caption: Option<String>,
}

impl AttachmentRef {
    /// Build a reference with only the required fields set.
    pub fn new(
        kind: AttachmentKind,
        mime_type: impl Into<String>,
        source_token: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            mime_type: mime_type.into(),
            source_token: source_token.into(),
            size_bytes: None,
            duration_seconds: None,
            width: None,
            height: None,
            caption: None,
        }
    }

    /// Set the declared size.
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// An attachment whose payload has been fetched and validated.
///
/// Only produced by the attachment resolver after the size and MIME gates
/// pass. Owned transiently: handed by value to a single engine dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttachment {
    /// The reference the payload was fetched from.
    pub attachment: AttachmentRef,
    /// Fetched payload.
    pub bytes: Vec<u8>,
    /// Whether all validation gates passed.
    pub validated: bool,
}

impl ResolvedAttachment {
    /// MIME type of the payload.
    pub fn mime_type(&self) -> &str {
        &self.attachment.mime_type
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One piece of a reply, sized to fit the channel's message limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFragment {
    /// Fragment text; never longer than the limit it was split for.
    pub text: String,
    /// Zero-based position within the reply.
    pub sequence_index: usize,
    /// Whether this is the final fragment of the reply.
    pub is_last: bool,
}

/// Per-send options forwarded to the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Channel message id to reply to.
    #[serde(default)]
    pub reply_to_id: Option<String>,
    /// Thread / topic to post into.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Outbound media reference for `send_media`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// URL or channel handle of the media.
    pub location: String,
    /// MIME type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
}
