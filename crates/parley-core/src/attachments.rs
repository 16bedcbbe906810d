//! Attachment resolution.
//!
//! Turns [`AttachmentRef`]s into [`ResolvedAttachment`]s by fetching their
//! payload through the adapter that produced them. Every attachment passes
//! the same gates, in order:
//!
//! 1. MIME type against the allow-list (`TypeNotAllowed`)
//! 2. declared size, if the channel reported one (`TooLarge`)
//! 3. fetch under a deadline (`FetchFailed`)
//! 4. actual payload size (`TooLarge`)
//!
//! Gates 1 and 2 run before any I/O so doomed attachments are never
//! downloaded. A failing attachment never affects its siblings.

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use parley_channels::Channel;
use parley_types::config::MediaConfig;
use parley_types::error::AttachmentError;
use parley_types::event::{AttachmentRef, ResolvedAttachment};

/// Outcome of resolving all attachments of one message.
#[derive(Debug, Default)]
pub struct AttachmentBatch {
    /// Successfully resolved attachments, in their original order.
    pub resolved: Vec<ResolvedAttachment>,
    /// Dropped attachments with the reason, in their original order.
    pub failures: Vec<(AttachmentRef, AttachmentError)>,
}

impl AttachmentBatch {
    /// One aggregated, engine-facing note about dropped attachments, or
    /// `None` if everything resolved.
    pub fn notice(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let reasons: Vec<String> = self
            .failures
            .iter()
            .map(|(att, err)| format!("{} ({err})", att.mime_type))
            .collect();
        Some(format!(
            "[{} attachment(s) could not be processed: {}]",
            self.failures.len(),
            reasons.join("; ")
        ))
    }
}

/// Validates and fetches attachment payloads.
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    max_size: u64,
    allowed_types: Vec<String>,
    concurrency: usize,
    fetch_timeout: Duration,
}

impl Default for AttachmentResolver {
    fn default() -> Self {
        Self::new(&MediaConfig::default())
    }
}

impl AttachmentResolver {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            max_size: config.max_file_size_bytes,
            allowed_types: config
                .allowed_types
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .collect(),
            concurrency: config.max_concurrent_fetches.max(1),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Whether `mime_type` matches any allow-list pattern.
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        let mime = normalize_mime(mime_type);
        !mime.is_empty() && self.allowed_types.iter().any(|p| mime_matches(p, &mime))
    }

    /// Check the gates that need no payload.
    pub fn prevalidate(&self, attachment: &AttachmentRef) -> Result<(), AttachmentError> {
        if !self.is_type_allowed(&attachment.mime_type) {
            return Err(AttachmentError::TypeNotAllowed {
                mime_type: attachment.mime_type.clone(),
            });
        }
        match attachment.size_bytes {
            Some(size) if size > self.max_size => Err(AttachmentError::TooLarge {
                size,
                max: self.max_size,
            }),
            _ => Ok(()),
        }
    }

    /// Resolve one attachment through `adapter`.
    pub async fn resolve(
        &self,
        adapter: &dyn Channel,
        attachment: &AttachmentRef,
    ) -> Result<ResolvedAttachment, AttachmentError> {
        self.prevalidate(attachment)?;

        let fetch = adapter.fetch_attachment(attachment);
        let bytes = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(AttachmentError::FetchFailed(e.to_string())),
            Err(_elapsed) => {
                return Err(AttachmentError::FetchFailed(format!(
                    "timed out after {}s",
                    self.fetch_timeout.as_secs()
                )));
            }
        };

        let size = bytes.len() as u64;
        if size > self.max_size {
            return Err(AttachmentError::TooLarge {
                size,
                max: self.max_size,
            });
        }

        debug!(
            channel = %adapter.channel_id(),
            mime = %attachment.mime_type,
            size,
            "attachment resolved"
        );
        Ok(ResolvedAttachment {
            attachment: attachment.clone(),
            bytes,
            validated: true,
        })
    }

    /// Resolve every attachment of a message, at most `max_concurrent_fetches`
    /// at a time. Order is preserved in both halves of the result.
    pub async fn resolve_all(
        &self,
        adapter: &dyn Channel,
        attachments: Vec<AttachmentRef>,
    ) -> AttachmentBatch {
        let outcomes: Vec<_> = stream::iter(attachments)
            .map(|att| async move {
                let outcome = self.resolve(adapter, &att).await;
                (att, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut batch = AttachmentBatch::default();
        for (att, outcome) in outcomes {
            match outcome {
                Ok(resolved) => batch.resolved.push(resolved),
                Err(e) => {
                    warn!(
                        channel = %adapter.channel_id(),
                        mime = %att.mime_type,
                        error = %e,
                        "dropping attachment"
                    );
                    batch.failures.push((att, e));
                }
            }
        }
        batch
    }
}

/// Lowercase and strip parameters (`text/plain; charset=utf-8`).
fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Exact match, or prefix match for a pattern with a trailing `*`.
fn mime_matches(pattern: &str, mime: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some("") | Some("*/") => true,
        Some(prefix) => mime.starts_with(prefix),
        None => pattern == mime,
    }
}
