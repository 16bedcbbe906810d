//! Pipeline coordinator.
//!
//! The [`Coordinator`] is the [`ChannelHost`] every adapter delivers into.
//! It walks each inbound event through the pipeline stages:
//!
//! ```text
//! RECEIVED ──> ACCESS_CHECKED ──denied──> DROPPED (silent)
//!                   │
//!                   v
//!              DEBOUNCING ──quiet period──> lane(key)
//!                                              │
//!   SESSION_RESOLVED <─────────────────────────┘
//!         │
//!         v
//!   ATTACHMENTS_RESOLVED ──> DISPATCHED ──> chunk + send ──> RESPONDED
//!                                 │                 │
//!                                 └──── error ──────┴──> FAILED (apology)
//! ```
//!
//! Aggregates for one conversational key run on a single lane, strictly in
//! flush order. Lanes for different keys run concurrently; replies and
//! apologies bound for the same chat are serialized by a per-chat send lock.
//! Once [`Coordinator::shutdown`] starts, new input is refused.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use parley_channels::{Channel, ChannelHost, ChannelRegistry, MessageId};
use parley_types::access::AccessReason;
use parley_types::config::Config;
use parley_types::error::{AttachmentError, ChannelError, EngineError, ParleyError};
use parley_types::event::{InboundMessage, SendOptions};
use parley_types::session::ConversationalKey;

use crate::access::AccessEnforcer;
use crate::attachments::{AttachmentBatch, AttachmentResolver};
use crate::chunker;
use crate::debounce::{Debouncer, FlushSink, PendingBucket};
use crate::engine::{EngineRequest, ReasoningEngine};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::session::SessionResolver;

/// Longest text prefix that ever reaches the logs.
const LOG_PREVIEW_CHARS: usize = 40;

/// Where an inbound event currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Received,
    AccessChecked,
    Debouncing,
    SessionResolved,
    AttachmentsResolved,
    Dispatched,
    Responded,
    Failed,
    /// Terminal no-op after an access denial.
    Dropped,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::AccessChecked => "access_checked",
            Self::Debouncing => "debouncing",
            Self::SessionResolved => "session_resolved",
            Self::AttachmentsResolved => "attachments_resolved",
            Self::Dispatched => "dispatched",
            Self::Responded => "responded",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        }
    }

    /// Whether no further transition follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Responded | Self::Failed | Self::Dropped)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Coordinator ─────────────────────────────────────────────────────────

/// Sequences access control, debouncing, session resolution, attachment
/// resolution, engine dispatch and outbound delivery.
///
/// Stores are injected so that callers (and tests) own their lifetime.
pub struct Coordinator {
    inner: Arc<Inner>,
    debouncer: Debouncer,
}

impl Coordinator {
    /// Coordinator with fresh access and session stores.
    pub fn new(
        config: Config,
        registry: Arc<ChannelRegistry>,
        engine: Arc<dyn ReasoningEngine>,
    ) -> Self {
        let enforcer = Arc::new(AccessEnforcer::from_config(&config));
        Self::with_stores(config, registry, engine, enforcer, Arc::new(SessionResolver::new()))
    }

    /// Coordinator over externally owned stores.
    pub fn with_stores(
        config: Config,
        registry: Arc<ChannelRegistry>,
        engine: Arc<dyn ReasoningEngine>,
        enforcer: Arc<AccessEnforcer>,
        sessions: Arc<SessionResolver>,
    ) -> Self {
        let inner = Arc::new(Inner {
            attachments: AttachmentResolver::new(&config.media),
            engine_timeout: config.pipeline.engine_timeout(),
            send_backoff: config.pipeline.send_retry_backoff(),
            config,
            registry,
            engine,
            enforcer,
            sessions,
            metrics: PipelineMetrics::new(),
            lanes: DashMap::new(),
            chat_locks: DashMap::new(),
            tracker: TaskTracker::new(),
            closing: CancellationToken::new(),
            cancel: CancellationToken::new(),
            next_lane: AtomicU64::new(0),
        });
        let sink = Arc::new(Dispatcher {
            inner: Arc::clone(&inner),
        });
        let debouncer = Debouncer::from_config(&inner.config, sink);
        Self { inner, debouncer }
    }

    /// Admit one inbound message and report the stage it stopped at:
    /// [`Stage::Debouncing`] when queued, [`Stage::Dropped`] when denied or
    /// once shutdown has begun.
    pub fn accept(&self, message: InboundMessage) -> Stage {
        let inner = &self.inner;
        if !self.is_accepting() {
            debug!(
                channel = %message.channel_id,
                stage = %Stage::Dropped,
                "pipeline shutting down, message refused"
            );
            return Stage::Dropped;
        }

        PipelineMetrics::bump(&inner.metrics.received);
        debug!(
            channel = %message.channel_id,
            chat_id = %message.chat_id,
            stage = %Stage::Received,
            preview = %preview(&message.text),
            "inbound message"
        );

        if let Err(e) = self.admit(&message) {
            PipelineMetrics::bump(&inner.metrics.access_denied);
            debug!(
                channel = %message.channel_id,
                error = %e,
                stage = %Stage::Dropped,
                "message dropped"
            );
            return Stage::Dropped;
        }
        debug!(
            channel = %message.channel_id,
            chat_id = %message.chat_id,
            stage = %Stage::AccessChecked,
            "access granted"
        );

        self.debouncer.enqueue(message);
        Stage::Debouncing
    }

    /// Access gate. Malformed messages are denied as `blocked`; unpaired
    /// senders are remembered for approval.
    fn admit(&self, message: &InboundMessage) -> Result<(), ParleyError> {
        if !message.is_valid() {
            return Err(ParleyError::access_denied(AccessReason::Blocked));
        }
        let enforcer = &self.inner.enforcer;
        let decision = enforcer.check_access(&message.channel_id, &message.sender_id);
        if decision.allowed {
            return Ok(());
        }
        if decision.reason == AccessReason::NotPaired {
            enforcer.record_pending(&message.channel_id, &message.sender_id);
        }
        Err(ParleyError::access_denied(decision.reason))
    }

    /// Whether new input is still taken. Turns false when
    /// [`shutdown`](Self::shutdown) starts and never turns back.
    pub fn is_accepting(&self) -> bool {
        !self.inner.closing.is_cancelled()
    }

    /// Flush pending buckets, drain in-flight dispatches for up to the
    /// configured grace period, then cancel outstanding engine calls.
    ///
    /// Input arriving once this has started is refused, and
    /// [`ChannelHost::deliver_inbound`] reports [`ChannelError::NotConnected`].
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let grace = inner.config.pipeline.shutdown_grace();
        info!(pending = self.debouncer.pending_keys().len(), "pipeline shutting down");

        inner.closing.cancel();
        self.debouncer.flush_all().await;
        inner.tracker.close();

        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                in_flight = inner.tracker.len(),
                "dispatches still running after grace period, cancelling"
            );
            inner.cancel.cancel();
            if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
                warn!(in_flight = inner.tracker.len(), "abandoning unfinished dispatches");
            }
        }
        inner.cancel.cancel();
        info!("pipeline stopped");
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Access store, for the out-of-band approval flow.
    pub fn enforcer(&self) -> &Arc<AccessEnforcer> {
        &self.inner.enforcer
    }

    pub fn sessions(&self) -> &Arc<SessionResolver> {
        &self.inner.sessions
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.inner.registry
    }

    /// Buckets still waiting for their quiet period.
    pub fn pending(&self) -> Vec<PendingBucket> {
        self.debouncer.pending()
    }
}

#[async_trait]
impl ChannelHost for Coordinator {
    async fn deliver_inbound(&self, msg: InboundMessage) -> Result<(), ChannelError> {
        if !self.is_accepting() {
            return Err(ChannelError::NotConnected);
        }
        self.accept(msg);
        Ok(())
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────

struct Lane {
    id: u64,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

struct Inner {
    config: Config,
    registry: Arc<ChannelRegistry>,
    engine: Arc<dyn ReasoningEngine>,
    enforcer: Arc<AccessEnforcer>,
    sessions: Arc<SessionResolver>,
    attachments: AttachmentResolver,
    metrics: PipelineMetrics,
    engine_timeout: Duration,
    send_backoff: Duration,
    lanes: DashMap<ConversationalKey, Lane>,
    chat_locks: DashMap<String, Arc<Mutex<()>>>,
    tracker: TaskTracker,
    /// Set when shutdown starts; no new input is taken afterwards.
    closing: CancellationToken,
    /// Cancels outstanding engine calls once the shutdown grace is over.
    cancel: CancellationToken,
    next_lane: AtomicU64,
}

/// Debouncer sink that hands aggregates to per-key lanes.
struct Dispatcher {
    inner: Arc<Inner>,
}

impl FlushSink for Dispatcher {
    fn flushed(&self, key: ConversationalKey, message: InboundMessage) {
        PipelineMetrics::bump(&self.inner.metrics.debounce_flushes);

        match self.inner.lanes.entry(key.clone()) {
            Entry::Occupied(lane) => {
                // The worker retires under this same entry lock, so an
                // occupied lane always has a live receiver.
                if lane.get().tx.send(message).is_err() {
                    error!(key = %key, "lane closed with entry still present");
                }
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = self.inner.next_lane.fetch_add(1, Ordering::Relaxed);
                if tx.send(message).is_err() {
                    return;
                }
                slot.insert(Lane { id, tx });
                let inner = Arc::clone(&self.inner);
                self.inner.tracker.spawn(run_lane(inner, key, id, rx));
            }
        }
    }
}

/// Process every aggregate queued for `key`, then retire.
async fn run_lane(
    inner: Arc<Inner>,
    key: ConversationalKey,
    id: u64,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
) {
    loop {
        if let Ok(message) = rx.try_recv() {
            inner.process(&key, message).await;
            continue;
        }

        let next = match inner.lanes.entry(key.clone()) {
            Entry::Occupied(lane) if lane.get().id == id => match rx.try_recv() {
                Ok(message) => message,
                Err(_) => {
                    lane.remove();
                    debug!(key = %key, "lane retired");
                    return;
                }
            },
            _ => return,
        };
        inner.process(&key, next).await;
    }
}

impl Inner {
    async fn process(&self, key: &ConversationalKey, message: InboundMessage) {
        match self.handle(key, &message).await {
            Ok(stage) => debug!(key = %key, stage = %stage, "dispatch finished"),
            Err(e) => {
                PipelineMetrics::bump(&self.metrics.failed);
                error!(
                    key = %key,
                    channel = %message.channel_id,
                    stage = %Stage::Failed,
                    error = %e,
                    "pipeline failed"
                );
                self.apologize(&message).await;
            }
        }
    }

    async fn handle(
        &self,
        key: &ConversationalKey,
        message: &InboundMessage,
    ) -> Result<Stage, ParleyError> {
        let session =
            self.sessions
                .resolve(&message.channel_id, &message.chat_id, &message.sender_id);
        if !message.sender_display_name.is_empty() {
            self.sessions
                .set_display_name(&session.identity, &message.sender_display_name);
        }
        debug!(
            key = %key,
            identity = %session.identity,
            stage = %Stage::SessionResolved,
            "session resolved"
        );

        let adapter = self.registry.get(&message.channel_id).await?;

        let mut text = message.text.clone();
        let mut attachments = Vec::new();
        if !message.attachments.is_empty() {
            let batch = if adapter.capabilities().media {
                self.attachments
                    .resolve_all(adapter.as_ref(), message.attachments.clone())
                    .await
            } else {
                AttachmentBatch {
                    resolved: Vec::new(),
                    failures: message
                        .attachments
                        .iter()
                        .map(|att| {
                            let err = AttachmentError::FetchFailed("channel does not support media".into());
                            (att.clone(), err)
                        })
                        .collect(),
                }
            };

            if let Some(notice) = batch.notice() {
                PipelineMetrics::bump_by(
                    &self.metrics.attachment_failures,
                    batch.failures.len() as u64,
                );
                for (att, err) in batch.failures {
                    let err = ParleyError::from(err);
                    warn!(key = %key, mime = %att.mime_type, error = %err, "attachment dropped");
                }
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&notice);
            }
            attachments = batch.resolved;
        }
        debug!(
            key = %key,
            attachments = attachments.len(),
            stage = %Stage::AttachmentsResolved,
            "attachments resolved"
        );

        let request = EngineRequest {
            identity: session.identity,
            conversation_key: session.conversation_key,
            text,
            attachments,
        };
        PipelineMetrics::bump(&self.metrics.dispatched);
        debug!(key = %key, stage = %Stage::Dispatched, "dispatching to engine");
        let reply = self.call_engine(request).await?;

        if reply.trim().is_empty() {
            debug!(key = %key, "engine returned an empty reply, nothing to send");
            return Ok(Stage::Responded);
        }

        self.deliver(adapter.as_ref(), message, &reply).await?;
        PipelineMetrics::bump(&self.metrics.responded);
        Ok(Stage::Responded)
    }

    async fn call_engine(&self, request: EngineRequest) -> Result<String, ParleyError> {
        let call = tokio::time::timeout(self.engine_timeout, self.engine.respond(request));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(EngineError::Fatal("dispatch cancelled at shutdown".into()).into())
            }
            outcome = call => match outcome {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(e.into()),
                Err(_elapsed) => {
                    PipelineMetrics::bump(&self.metrics.engine_timeouts);
                    Err(ParleyError::EngineTimeout {
                        after_ms: self.engine_timeout.as_millis() as u64,
                    })
                }
            },
        }
    }

    /// Chunk `reply` and send the fragments in order under the chat lock.
    async fn deliver(
        &self,
        adapter: &dyn Channel,
        message: &InboundMessage,
        reply: &str,
    ) -> Result<(), ParleyError> {
        let channel_id = adapter.channel_id();
        let outbound = &self.config.channel(channel_id).outbound;
        let fragments = chunker::split(reply, outbound.mode, outbound.max_length);

        let target = adapter.normalize_target(&message.chat_id).ok_or_else(|| {
            ParleyError::AdapterSendFailed {
                channel: channel_id.to_owned(),
                reason: format!("invalid target '{}'", message.chat_id),
            }
        })?;
        let threaded = adapter.capabilities().threads;

        let chat = chat_lock_key(channel_id, &target);
        let lock = self.chat_lock(&chat);
        let outcome = {
            let _guard = lock.lock().await;
            let mut outcome = Ok(());
            for fragment in &fragments {
                let options = SendOptions {
                    reply_to_id: if fragment.sequence_index == 0 {
                        message.reply_to_id.clone()
                    } else {
                        None
                    },
                    thread_id: if threaded { message.thread_id.clone() } else { None },
                };
                match self.send_with_retry(adapter, &target, &fragment.text, &options).await {
                    Ok(id) => {
                        PipelineMetrics::bump(&self.metrics.fragments_sent);
                        debug!(
                            channel = %channel_id,
                            chat_id = %target,
                            message_id = %id.0,
                            index = fragment.sequence_index,
                            last = fragment.is_last,
                            "fragment sent"
                        );
                    }
                    Err(e) => {
                        PipelineMetrics::bump(&self.metrics.send_failures);
                        warn!(
                            channel = %channel_id,
                            chat_id = %target,
                            index = fragment.sequence_index,
                            remaining = fragments.len() - fragment.sequence_index - 1,
                            error = %e,
                            "fragment dropped after retry"
                        );
                        outcome = Err(ParleyError::AdapterSendFailed {
                            channel: channel_id.to_owned(),
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
            outcome
        };
        self.release_chat_lock(&chat, lock);
        outcome
    }

    /// Send lock shared by everything bound for one chat.
    fn chat_lock(&self, chat: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.chat_locks.entry(chat.to_owned()).or_default().value())
    }

    /// Drop a handle from [`chat_lock`](Self::chat_lock), forgetting the
    /// lock once nobody else holds or waits on it.
    fn release_chat_lock(&self, chat: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.chat_locks
            .remove_if(chat, |_, held| Arc::strong_count(held) == 1);
    }

    async fn send_with_retry(
        &self,
        adapter: &dyn Channel,
        target: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageId, ChannelError> {
        match adapter.send_text(target, text, options).await {
            Ok(id) => Ok(id),
            Err(e) => {
                PipelineMetrics::bump(&self.metrics.send_retries);
                warn!(
                    channel = %adapter.channel_id(),
                    chat_id = %target,
                    error = %e,
                    backoff_ms = self.send_backoff.as_millis() as u64,
                    "send failed, retrying once"
                );
                tokio::time::sleep(self.send_backoff).await;
                adapter.send_text(target, text, options).await
            }
        }
    }

    /// Best-effort apology to the originating chat. Never carries error detail.
    async fn apologize(&self, message: &InboundMessage) {
        let adapter = match self.registry.get(&message.channel_id).await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(channel = %message.channel_id, error = %e, "cannot apologize");
                return;
            }
        };
        let Some(target) = adapter.normalize_target(&message.chat_id) else {
            return;
        };
        let options = SendOptions {
            reply_to_id: None,
            thread_id: if adapter.capabilities().threads {
                message.thread_id.clone()
            } else {
                None
            },
        };
        let text = &self.config.pipeline.apology_text;

        let chat = chat_lock_key(adapter.channel_id(), &target);
        let lock = self.chat_lock(&chat);
        let sent = {
            let _guard = lock.lock().await;
            adapter.send_text(&target, text, &options).await
        };
        self.release_chat_lock(&chat, lock);

        if let Err(e) = sent {
            warn!(channel = %message.channel_id, chat_id = %target, error = %e, "apology not delivered");
        }
    }
}

fn chat_lock_key(channel_id: &str, target: &str) -> String {
    format!("{channel_id}:{target}")
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    if text.chars().count() > LOG_PREVIEW_CHARS {
        out.push('…');
    }
    out
}
