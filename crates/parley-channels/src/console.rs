//! [`ConsoleChannel`] -- `Channel` implementation over stdin / stdout.
//!
//! Every non-empty input line becomes one inbound message from a fixed
//! local sender. A line of the form `!file <path> [mime]` attaches a local
//! file instead; the MIME type is guessed from the extension when omitted.
//! Replies are written to the output one fragment per line.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_types::error::ChannelError;
use parley_types::event::{
    AttachmentKind, AttachmentRef, InboundMessage, MediaRef, SendOptions,
};

use crate::traits::{
    Channel, ChannelCapabilities, ChannelHost, ChannelStatus, ChatType, MessageId,
};

/// Channel id of the console adapter.
pub const CONSOLE_CHANNEL_ID: &str = "console";

/// Prefix of the attach-a-file command.
const FILE_COMMAND: &str = "!file";

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Local interactive channel.
///
/// The input can only be consumed once: a second [`start`](Channel::start)
/// fails with [`ChannelError::ConnectionFailed`].
pub struct ConsoleChannel {
    chat_id: String,
    sender_id: String,
    display_name: String,
    input: Mutex<Option<BoxedReader>>,
    output: Mutex<BoxedWriter>,
    status: Arc<RwLock<ChannelStatus>>,
    next_message_id: AtomicU64,
    /// Cancelled when the input reaches end-of-file.
    input_closed: CancellationToken,
}

impl ConsoleChannel {
    /// Console bound to the process's stdin and stdout.
    pub fn stdio(sender_id: impl Into<String>) -> Self {
        Self::with_io(
            sender_id,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    /// Console over arbitrary streams.
    pub fn with_io<R, W>(sender_id: impl Into<String>, input: R, output: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let sender_id = sender_id.into();
        Self {
            chat_id: format!("{CONSOLE_CHANNEL_ID}:{sender_id}"),
            display_name: sender_id.clone(),
            sender_id,
            input: Mutex::new(Some(Box::new(input))),
            output: Mutex::new(Box::new(output)),
            status: Arc::new(RwLock::new(ChannelStatus::Stopped)),
            next_message_id: AtomicU64::new(1),
            input_closed: CancellationToken::new(),
        }
    }

    /// Override the display name attached to inbound messages
    /// (defaults to the sender id).
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// The chat id used for every inbound message.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// A token cancelled once the input hits end-of-file.
    pub fn input_closed(&self) -> CancellationToken {
        self.input_closed.clone()
    }

    async fn set_status(&self, status: ChannelStatus) {
        *self.status.write().await = status;
    }

    /// Turn one input line into a message, or `None` for blank lines.
    pub(crate) async fn parse_line(&self, line: &str) -> Option<InboundMessage> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let mut msg = InboundMessage::text(CONSOLE_CHANNEL_ID, &self.chat_id, &self.sender_id, "")
            .with_display_name(&self.display_name);

        match line.strip_prefix(FILE_COMMAND) {
            Some(rest) if rest.starts_with(char::is_whitespace) => {
                let mut parts = rest.split_whitespace();
                let Some(path) = parts.next() else {
                    warn!("!file without a path, ignoring");
                    return None;
                };
                let mime_type = parts
                    .next()
                    .map(str::to_owned)
                    .unwrap_or_else(|| guess_mime(Path::new(path)).to_owned());
                let mut attachment = AttachmentRef::new(kind_for(&mime_type), mime_type, path);
                if let Ok(meta) = tokio::fs::metadata(path).await {
                    attachment.size_bytes = Some(meta.len());
                }
                msg.attachments.push(attachment);
            }
            _ => msg.text = line.to_owned(),
        }
        Some(msg)
    }

    async fn write_line(&self, line: &str) -> Result<(), ChannelError> {
        let mut out = self.output.lock().await;
        let written = async {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await
        }
        .await;
        written.map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    fn next_id(&self) -> MessageId {
        let n = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        MessageId(format!("{CONSOLE_CHANNEL_ID}-{n}"))
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn channel_id(&self) -> &str {
        CONSOLE_CHANNEL_ID
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            chat_types: vec![ChatType::Direct],
            media: true,
            ..Default::default()
        }
    }

    fn status(&self) -> ChannelStatus {
        self.status
            .try_read()
            .map(|s| s.clone())
            .unwrap_or(ChannelStatus::Stopped)
    }

    async fn start(
        &self,
        host: Arc<dyn ChannelHost>,
        cancel: CancellationToken,
    ) -> Result<(), ChannelError> {
        let Some(input) = self.input.lock().await.take() else {
            return Err(ChannelError::ConnectionFailed(
                "console input already consumed".into(),
            ));
        };
        self.set_status(ChannelStatus::Running).await;
        info!(sender = %self.sender_id, "console channel ready");

        let mut lines = input.lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("console channel received cancellation");
                    break;
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let Some(msg) = self.parse_line(&line).await else {
                                continue;
                            };
                            if let Err(e) = host.deliver_inbound(msg).await {
                                warn!(error = %e, "pipeline rejected console input");
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("console input closed");
                            self.input_closed.cancel();
                            // Keep the adapter alive so replies can still be
                            // written until shutdown.
                            cancel.cancelled().await;
                            break;
                        }
                        Err(e) => {
                            self.set_status(ChannelStatus::Error(e.to_string())).await;
                            self.input_closed.cancel();
                            return Err(ChannelError::ReceiveFailed(e.to_string()));
                        }
                    }
                }
            }
        }

        self.set_status(ChannelStatus::Stopped).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let mut out = self.output.lock().await;
        out.flush()
            .await
            .map_err(|e| ChannelError::Other(e.to_string()))
    }

    async fn send_text(
        &self,
        _target: &str,
        text: &str,
        _options: &SendOptions,
    ) -> Result<MessageId, ChannelError> {
        self.write_line(text).await?;
        Ok(self.next_id())
    }

    async fn send_media(
        &self,
        _target: &str,
        text: &str,
        media: &MediaRef,
        _options: &SendOptions,
    ) -> Result<MessageId, ChannelError> {
        let line = if text.is_empty() {
            format!("[media: {}]", media.location)
        } else {
            format!("[media: {}] {text}", media.location)
        };
        self.write_line(&line).await?;
        Ok(self.next_id())
    }

    async fn health_check(&self) -> Result<serde_json::Value, ChannelError> {
        let status = self.status();
        Ok(serde_json::json!({
            "ok": status == ChannelStatus::Running,
            "status": format!("{status:?}"),
            "input_closed": self.input_closed.is_cancelled(),
        }))
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, ChannelError> {
        tokio::fs::read(&attachment.source_token)
            .await
            .map_err(|e| ChannelError::FetchFailed(format!("{}: {e}", attachment.source_token)))
    }
}

/// Attachment kind implied by a MIME type.
fn kind_for(mime_type: &str) -> AttachmentKind {
    match mime_type.split('/').next().unwrap_or_default() {
        "image" => AttachmentKind::Image,
        "audio" => AttachmentKind::Audio,
        "video" => AttachmentKind::Video,
        _ => AttachmentKind::Document,
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    struct CollectingHost {
        messages: Mutex<Vec<InboundMessage>>,
    }

    #[async_trait]
    impl ChannelHost for CollectingHost {
        async fn deliver_inbound(&self, msg: InboundMessage) -> Result<(), ChannelError> {
            self.messages.lock().await.push(msg);
            Ok(())
        }
    }

    fn console(input: &str) -> (ConsoleChannel, tokio::io::DuplexStream) {
        let (writer, reader) = tokio::io::duplex(4096);
        let channel = ConsoleChannel::with_io("me", Cursor::new(input.as_bytes().to_vec()), writer);
        (channel, reader)
    }

    #[tokio::test]
    async fn delivers_lines_until_eof() {
        let (channel, _out) = console("hello\n\n  \nworld\n");
        let channel = Arc::new(channel);
        let host = Arc::new(CollectingHost {
            messages: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();

        let task = {
            let channel = channel.clone();
            let host = host.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { channel.start(host, cancel).await })
        };

        channel.input_closed().cancelled().await;
        assert_eq!(channel.status(), ChannelStatus::Running);
        cancel.cancel();
        task.await.unwrap().unwrap();

        let messages = host.messages.lock().await;
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world"]);
        assert_eq!(messages[0].channel_id, "console");
        assert_eq!(messages[0].chat_id, "console:me");
        assert_eq!(messages[0].sender_id, "me");
        assert_eq!(channel.status(), ChannelStatus::Stopped);
    }

    #[tokio::test]
    async fn second_start_fails() {
        let (channel, _out) = console("");
        let host = Arc::new(CollectingHost {
            messages: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        channel.start(host.clone(), cancel.clone()).await.unwrap();

        let err = channel.start(host, cancel).await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn file_command_builds_attachment() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let (channel, _out) = console("");
        let msg = channel.parse_line(&format!("!file {path}")).await.unwrap();
        assert!(msg.text.is_empty());
        assert_eq!(msg.attachments.len(), 1);

        let attachment = &msg.attachments[0];
        assert_eq!(attachment.kind, AttachmentKind::Image);
        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.size_bytes, Some(4));

        let bytes = channel.fetch_attachment(attachment).await.unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn file_command_with_explicit_mime() {
        let (channel, _out) = console("");
        let msg = channel
            .parse_line("!file /tmp/does-not-exist.bin application/pdf")
            .await
            .unwrap();
        let attachment = &msg.attachments[0];
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.kind, AttachmentKind::Document);
        assert_eq!(attachment.size_bytes, None);

        let err = channel.fetch_attachment(attachment).await.unwrap_err();
        assert!(matches!(err, ChannelError::FetchFailed(_)));
    }

    #[tokio::test]
    async fn display_name_defaults_to_sender() {
        let (channel, _out) = console("");
        let msg = channel.parse_line("hi").await.unwrap();
        assert_eq!(msg.sender_display_name, "me");

        let channel = channel.with_display_name("Me Myself");
        let msg = channel.parse_line("hi").await.unwrap();
        assert_eq!(msg.sender_display_name, "Me Myself");
    }

    #[tokio::test]
    async fn bang_prefix_without_space_is_text() {
        let (channel, _out) = console("");
        let msg = channel.parse_line("!filed it").await.unwrap();
        assert_eq!(msg.text, "!filed it");
        assert!(msg.attachments.is_empty());
        assert!(channel.parse_line("!file   ").await.is_none());
    }

    #[tokio::test]
    async fn send_text_writes_lines() {
        let (channel, mut out) = console("");
        let first = channel
            .send_text("ignored", "one", &SendOptions::default())
            .await
            .unwrap();
        let media = MediaRef {
            location: "cat.png".into(),
            mime_type: None,
        };
        let second = channel
            .send_media("ignored", "two", &media, &SendOptions::default())
            .await
            .unwrap();
        assert_ne!(first, second);

        let mut buf = vec![0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(1), out.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            "one\n[media: cat.png] two\n"
        );
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("doc.pdf")), "application/pdf");
        assert_eq!(guess_mime(Path::new("run")), "application/octet-stream");
        assert_eq!(kind_for("audio/ogg"), AttachmentKind::Audio);
        assert_eq!(kind_for("application/zip"), AttachmentKind::Document);
    }
}
