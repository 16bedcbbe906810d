//! Inbound debouncer.
//!
//! Coalesces a burst of messages sharing a [`ConversationalKey`] into one
//! aggregated [`InboundMessage`] once the key has been quiet for its
//! channel's debounce period.
//!
//! Each pending key owns a bucket: an unbounded queue plus a timer task.
//! Enqueue and flush for the same key serialize on that key's map entry;
//! different keys only meet briefly inside the map's sharded lock and
//! otherwise run in parallel.
//!
//! ```text
//! enqueue ──> bucket(key) ──quiet period──> merge ──> FlushSink::flushed
//!               ▲    │
//!               └────┘ every enqueue resets the timer
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use parley_types::config::Config;
use parley_types::event::InboundMessage;
use parley_types::session::ConversationalKey;

/// Receives aggregated messages.
///
/// Called synchronously while the key's entry is locked, so that flushes
/// of one key are handed over in order. Implementations must not block.
pub trait FlushSink: Send + Sync + 'static {
    fn flushed(&self, key: ConversationalKey, message: InboundMessage);
}

struct Bucket {
    id: u64,
    tx: mpsc::UnboundedSender<InboundMessage>,
    queued: usize,
    last_activity: Instant,
}

/// Snapshot of one pending bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBucket {
    pub key: ConversationalKey,
    pub queued: usize,
    pub idle_for: Duration,
}

/// Per-key burst coalescer.
pub struct Debouncer {
    buckets: Arc<DashMap<ConversationalKey, Bucket>>,
    quiet_periods: HashMap<String, Duration>,
    default_quiet: Duration,
    sink: Arc<dyn FlushSink>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl Debouncer {
    /// Debouncer using one quiet period for every channel.
    pub fn new(quiet_period: Duration, sink: Arc<dyn FlushSink>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            quiet_periods: HashMap::new(),
            default_quiet: quiet_period,
            sink,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Debouncer using each channel's configured `debounce_ms`.
    pub fn from_config(config: &Config, sink: Arc<dyn FlushSink>) -> Self {
        let mut debouncer = Self::new(Duration::from_millis(config.defaults.debounce_ms), sink);
        debouncer.quiet_periods = config
            .channels
            .iter()
            .map(|(id, ch)| (id.clone(), Duration::from_millis(ch.debounce_ms)))
            .collect();
        debouncer
    }

    /// Quiet period applied to `channel_id`.
    pub fn quiet_period(&self, channel_id: &str) -> Duration {
        self.quiet_periods
            .get(channel_id)
            .copied()
            .unwrap_or(self.default_quiet)
    }

    /// Add a message to its key's bucket, creating the bucket if needed,
    /// and restart the key's quiet-period timer.
    ///
    /// After [`flush_all`](Debouncer::flush_all) messages bypass buffering
    /// and go straight to the sink.
    pub fn enqueue(&self, message: InboundMessage) {
        let key = message.conversational_key();
        if self.shutdown.is_cancelled() {
            debug!(key = %key, "debouncer shut down, passing message through");
            self.sink.flushed(key, message);
            return;
        }

        match self.buckets.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let bucket = entry.get_mut();
                match bucket.tx.send(message) {
                    Ok(()) => {
                        bucket.queued += 1;
                        bucket.last_activity = Instant::now();
                    }
                    // The bucket's task is gone without cleaning up after
                    // itself; start over with a fresh one.
                    Err(mpsc::error::SendError(message)) => {
                        *bucket = self.spawn_bucket(key, message);
                    }
                }
            }
            Entry::Vacant(entry) => {
                debug!(key = %key, "opening debounce bucket");
                entry.insert(self.spawn_bucket(key, message));
            }
        }
    }

    /// Flush every pending bucket immediately and wait for the handover.
    ///
    /// Used at shutdown so the last messages of each sender are not lost.
    pub async fn flush_all(&self) {
        let pending = self.buckets.len();
        if pending > 0 {
            info!(pending, "flushing all debounce buckets");
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Keys that currently have a pending bucket, sorted.
    pub fn pending_keys(&self) -> Vec<ConversationalKey> {
        let mut keys: Vec<_> = self.buckets.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Pending buckets with their queue depth and idle time.
    pub fn pending(&self) -> Vec<PendingBucket> {
        let now = Instant::now();
        let mut buckets: Vec<_> = self
            .buckets
            .iter()
            .map(|e| PendingBucket {
                key: e.key().clone(),
                queued: e.value().queued,
                idle_for: now.saturating_duration_since(e.value().last_activity),
            })
            .collect();
        buckets.sort_by(|a, b| a.key.cmp(&b.key));
        buckets
    }

    fn spawn_bucket(&self, key: ConversationalKey, first: InboundMessage) -> Bucket {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let quiet = self.quiet_period(&first.channel_id);
        // The receiver is still alive here, so this cannot fail.
        let _ = tx.send(first);

        self.tracker.spawn(run_bucket(
            key,
            id,
            rx,
            quiet,
            self.buckets.clone(),
            self.sink.clone(),
            self.shutdown.clone(),
        ));

        Bucket {
            id,
            tx,
            queued: 1,
            last_activity: Instant::now(),
        }
    }
}

/// Timer task of one bucket: collect until quiet or shutdown, then flush.
async fn run_bucket(
    key: ConversationalKey,
    id: u64,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
    quiet: Duration,
    buckets: Arc<DashMap<ConversationalKey, Bucket>>,
    sink: Arc<dyn FlushSink>,
    shutdown: CancellationToken,
) {
    let mut batch = Vec::new();
    let timer = tokio::time::sleep(quiet);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Some(msg) => {
                    batch.push(msg);
                    timer.as_mut().reset(Instant::now() + quiet);
                }
                None => break,
            },
            () = &mut timer => break,
        }
    }

    // Holding the entry blocks enqueues for this key until the merged
    // message has been handed to the sink.
    match buckets.entry(key.clone()) {
        Entry::Occupied(entry) if entry.get().id == id => {
            rx.close();
            while let Ok(msg) = rx.try_recv() {
                batch.push(msg);
            }
            let count = batch.len();
            if let Some(merged) = merge(batch) {
                info!(key = %key, messages = count, "debounce flush");
                sink.flushed(key, merged);
            }
            entry.remove();
        }
        _ => {
            if let Some(merged) = merge(batch) {
                sink.flushed(key, merged);
            }
        }
    }
}

/// Merge a batch into one message.
///
/// Texts are newline-joined in arrival order, skipping empty ones;
/// attachments are concatenated in order. Sender display name, reply and
/// thread ids and the timestamp come from the most recent message.
/// Returns `None` for an empty batch.
pub fn merge(batch: Vec<InboundMessage>) -> Option<InboundMessage> {
    let mut texts: Vec<String> = Vec::with_capacity(batch.len());
    let mut attachments = Vec::new();
    let mut last = None;

    for mut msg in batch {
        if !msg.text.is_empty() {
            texts.push(std::mem::take(&mut msg.text));
        }
        attachments.append(&mut msg.attachments);
        last = Some(msg);
    }

    let mut merged = last?;
    merged.text = texts.join("\n");
    merged.attachments = attachments;
    Some(merged)
}
