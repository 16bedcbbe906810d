//! Reasoning engine boundary.
//!
//! The engine is external: it receives normalized, channel-agnostic input
//! and returns reply text. It never sees adapter types.

use async_trait::async_trait;

use parley_types::error::EngineError;
use parley_types::event::ResolvedAttachment;
use parley_types::session::{ConversationKey, Identity};

/// One dispatch to the engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub identity: Identity,
    pub conversation_key: ConversationKey,
    /// Merged message text, including any attachment notice.
    pub text: String,
    /// Validated attachment payloads, in message order.
    pub attachments: Vec<ResolvedAttachment>,
}

/// The conversational engine consumed by the pipeline.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Produce a reply for `request`.
    async fn respond(&self, request: EngineRequest) -> Result<String, EngineError>;
}

/// Engine that replies with the input text, for local runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoEngine;

#[async_trait]
impl ReasoningEngine for EchoEngine {
    async fn respond(&self, request: EngineRequest) -> Result<String, EngineError> {
        let mut reply = request.text;
        for att in &request.attachments {
            if !reply.is_empty() {
                reply.push('\n');
            }
            reply.push_str(&format!("[received {} ({} bytes)]", att.mime_type(), att.len()));
        }
        if reply.is_empty() {
            return Err(EngineError::Fatal("nothing to echo".into()));
        }
        Ok(reply)
    }
}
