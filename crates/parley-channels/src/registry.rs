//! [`ChannelRegistry`] -- owns channel adapters and their lifecycle.
//!
//! The registry is responsible for:
//!
//! - Registering adapters under their unique channel id
//! - Starting adapters concurrently (each in its own tokio task)
//! - Stopping adapters with a bounded timeout, abandoning stragglers
//! - Collecting health payloads without one slow adapter blocking the rest
//! - Routing outbound sends to the adapter that owns a channel id

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::traits::*;
use parley_types::config::{Config, PipelineConfig};
use parley_types::error::ChannelError;
use parley_types::event::{MediaRef, SendOptions};

/// Deadlines applied by the registry's lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryTimeouts {
    /// How long a fresh adapter is watched for an immediate start failure.
    pub start_probe: Duration,
    /// Per-adapter deadline in [`ChannelRegistry::stop_all`].
    pub stop: Duration,
    /// Per-adapter deadline in [`ChannelRegistry::health_check_all`].
    pub health_check: Duration,
}

impl Default for RegistryTimeouts {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RegistryTimeouts {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            start_probe: config.adapter_start_probe(),
            stop: config.adapter_stop_timeout(),
            health_check: config.health_check_timeout(),
        }
    }
}

/// A started adapter task.
struct RunningChannel {
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), ChannelError>>,
}

/// Owns channel adapters: registration, lifecycle, and outbound routing.
///
/// Adapters are held as `Arc<dyn Channel>` keyed by
/// [`Channel::channel_id`]; the registry never knows a concrete adapter
/// type. Each started adapter runs in its own tokio task under a child of
/// the cancellation token passed to [`start_all`](ChannelRegistry::start_all).
pub struct ChannelRegistry {
    /// Registered adapters, keyed by channel id.
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
    /// Tasks of started adapters, keyed by channel id.
    running: RwLock<HashMap<String, RunningChannel>>,
    timeouts: RegistryTimeouts,
    /// Per-id `enabled` flags; ids not listed use `enabled_by_default`.
    enabled: HashMap<String, bool>,
    enabled_by_default: bool,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Create an empty registry with default timeouts.
    pub fn new() -> Self {
        Self::with_timeouts(RegistryTimeouts::default())
    }

    /// Create an empty registry with explicit timeouts.
    pub fn with_timeouts(timeouts: RegistryTimeouts) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            running: RwLock::new(HashMap::new()),
            timeouts,
            enabled: HashMap::new(),
            enabled_by_default: true,
        }
    }

    /// Create an empty registry that takes its timeouts from the pipeline
    /// section and its `enabled` flags from the channel sections of
    /// `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config
                .channels
                .iter()
                .map(|(id, channel)| (id.clone(), channel.enabled))
                .collect(),
            enabled_by_default: config.defaults.enabled,
            ..Self::with_timeouts(RegistryTimeouts::from(&config.pipeline))
        }
    }

    /// Whether [`start_all`](ChannelRegistry::start_all) starts `channel_id`.
    pub fn is_enabled(&self, channel_id: &str) -> bool {
        self.enabled
            .get(channel_id)
            .copied()
            .unwrap_or(self.enabled_by_default)
    }

    /// Register an adapter.
    ///
    /// Fails with [`ChannelError::DuplicateChannel`] if an adapter with the
    /// same channel id is already registered.
    pub async fn register(&self, adapter: Arc<dyn Channel>) -> Result<(), ChannelError> {
        let id = adapter.channel_id().to_owned();
        let mut channels = self.channels.write().await;
        if channels.contains_key(&id) {
            return Err(ChannelError::DuplicateChannel(id));
        }
        info!(channel = %id, "registering channel");
        channels.insert(id, adapter);
        Ok(())
    }

    /// Remove an adapter, cancelling its task if it is running.
    ///
    /// The task is not awaited; use [`stop_all`](ChannelRegistry::stop_all)
    /// for a graceful shutdown.
    pub async fn unregister(&self, channel_id: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        let adapter = self
            .channels
            .write()
            .await
            .remove(channel_id)
            .ok_or_else(|| ChannelError::UnknownChannel(channel_id.to_owned()))?;

        if let Some(running) = self.running.write().await.remove(channel_id) {
            running.cancel.cancel();
        }
        info!(channel = %channel_id, "unregistered channel");
        Ok(adapter)
    }

    /// Look up an adapter by channel id.
    pub async fn get(&self, channel_id: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownChannel(channel_id.to_owned()))
    }

    /// Ids of all registered adapters, sorted.
    pub async fn list_channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start every enabled adapter that is not already running.
    ///
    /// Disabled adapters stay registered (replies can still be routed to
    /// them) but are skipped here and absent from the result.
    /// Adapters start concurrently. Each one is watched for the start probe
    /// window; one that fails within it is reported here, one still running
    /// afterwards counts as started. A failure never affects the others.
    /// Cancelling `cancel` stops every adapter started by this call.
    pub async fn start_all(
        &self,
        host: Arc<dyn ChannelHost>,
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        let pending: Vec<(String, Arc<dyn Channel>)> = {
            let channels = self.channels.read().await;
            let running = self.running.read().await;
            channels
                .iter()
                .filter(|(id, _)| !running.contains_key(*id))
                .filter(|(id, _)| {
                    let enabled = self.is_enabled(id);
                    if !enabled {
                        info!(channel = %id, "channel disabled, not starting");
                    }
                    enabled
                })
                .map(|(id, ch)| (id.clone(), ch.clone()))
                .collect()
        };

        let probe = self.timeouts.start_probe;
        let starts = pending.into_iter().map(|(id, channel)| {
            let token = cancel.child_token();
            let host = host.clone();
            async move {
                let task_token = token.clone();
                let task_id = id.clone();
                let mut handle = tokio::spawn(async move {
                    info!(channel = %task_id, "starting channel");
                    let result = channel.start(host, task_token).await;
                    match &result {
                        Ok(()) => info!(channel = %task_id, "channel stopped"),
                        Err(e) => error!(channel = %task_id, error = %e, "channel exited with error"),
                    }
                    result
                });

                match tokio::time::timeout(probe, &mut handle).await {
                    Err(_elapsed) => (id, Ok(()), Some(RunningChannel { cancel: token, handle })),
                    Ok(Ok(result)) => (id, result, None),
                    Ok(Err(join_err)) => (
                        id,
                        Err(ChannelError::Other(format!("channel task panicked: {join_err}"))),
                        None,
                    ),
                }
            }
        });

        let outcomes = join_all(starts).await;

        let mut running = self.running.write().await;
        let mut results = Vec::with_capacity(outcomes.len());
        for (id, result, task) in outcomes {
            if let Some(task) = task {
                running.insert(id.clone(), task);
            }
            results.push((id, result));
        }
        results
    }

    /// Stop every running adapter.
    ///
    /// Cancels each adapter's token, calls [`Channel::stop`] and awaits the
    /// task, all within the per-adapter stop timeout. Adapters that miss
    /// the deadline are abandoned and reported as
    /// [`ChannelError::StopTimeout`]; they are not retried.
    pub async fn stop_all(&self) -> Vec<(String, Result<(), ChannelError>)> {
        let running: Vec<(String, RunningChannel)> = self.running.write().await.drain().collect();
        let channels = self.channels.read().await.clone();
        let deadline = self.timeouts.stop;

        let stops = running.into_iter().map(|(id, task)| {
            let channel = channels.get(&id).cloned();
            async move {
                info!(channel = %id, "stopping channel");
                task.cancel.cancel();

                let graceful = async {
                    let stopped = match &channel {
                        Some(channel) => channel.stop().await,
                        None => Ok(()),
                    };
                    let exited = match task.handle.await {
                        Ok(result) => result,
                        Err(join_err) => {
                            warn!(channel = %id, error = %join_err, "channel task panicked");
                            Err(ChannelError::Other(format!("channel task panicked: {join_err}")))
                        }
                    };
                    stopped.and(exited)
                };

                let result = match tokio::time::timeout(deadline, graceful).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        let after_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                        warn!(channel = %id, after_ms, "channel did not stop in time, abandoning");
                        Err(ChannelError::StopTimeout {
                            channel: id.clone(),
                            after_ms,
                        })
                    }
                };
                (id, result)
            }
        });

        join_all(stops).await
    }

    /// Collect each adapter's health payload.
    ///
    /// Checks run concurrently under the health-check timeout. A failing or
    /// timed-out adapter is reported as `{"ok": false, "error": ...}`.
    pub async fn health_check_all(&self) -> HashMap<String, serde_json::Value> {
        let channels: Vec<(String, Arc<dyn Channel>)> = self
            .channels
            .read()
            .await
            .iter()
            .map(|(id, ch)| (id.clone(), ch.clone()))
            .collect();
        let deadline = self.timeouts.health_check;

        let checks = channels.into_iter().map(|(id, channel)| async move {
            let payload = match tokio::time::timeout(deadline, channel.health_check()).await {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => {
                    debug!(channel = %id, error = %e, "health check failed");
                    serde_json::json!({ "ok": false, "error": e.to_string() })
                }
                Err(_elapsed) => {
                    debug!(channel = %id, "health check timed out");
                    serde_json::json!({ "ok": false, "error": "health check timed out" })
                }
            };
            (id, payload)
        });

        join_all(checks).await.into_iter().collect()
    }

    /// Lifecycle status of every registered adapter.
    pub async fn statuses(&self) -> HashMap<String, ChannelStatus> {
        self.channels
            .read()
            .await
            .iter()
            .map(|(id, ch)| (id.clone(), ch.status()))
            .collect()
    }

    /// Route a text send to the adapter registered as `channel_id`.
    pub async fn send_text(
        &self,
        channel_id: &str,
        target: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageId, ChannelError> {
        let channel = self.get(channel_id).await?;
        channel.send_text(target, text, options).await
    }

    /// Route a media send to the adapter registered as `channel_id`.
    pub async fn send_media(
        &self,
        channel_id: &str,
        target: &str,
        text: &str,
        media: &MediaRef,
        options: &SendOptions,
    ) -> Result<MessageId, ChannelError> {
        let channel = self.get(channel_id).await?;
        channel.send_media(target, text, media, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_types::event::{AttachmentRef, InboundMessage};
    use std::sync::atomic::{AtomicU8, Ordering};

    // ── Mock implementations ─────────────────────────────────────────

    const STATUS_STOPPED: u8 = 0;
    const STATUS_RUNNING: u8 = 1;

    /// How a [`MockChannel`] misbehaves.
    #[derive(Clone, Copy, PartialEq)]
    enum Behavior {
        Normal,
        FailStart,
        IgnoreCancel,
        SlowHealth,
    }

    /// A channel that tracks its lifecycle via an atomic status byte.
    struct MockChannel {
        id: String,
        behavior: Behavior,
        status_byte: AtomicU8,
        sent: tokio::sync::Mutex<Vec<(String, String)>>,
    }

    impl MockChannel {
        fn new(id: &str) -> Self {
            Self::with_behavior(id, Behavior::Normal)
        }

        fn with_behavior(id: &str, behavior: Behavior) -> Self {
            Self {
                id: id.to_owned(),
                behavior,
                status_byte: AtomicU8::new(STATUS_STOPPED),
                sent: tokio::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn channel_id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> ChannelCapabilities {
            ChannelCapabilities::default()
        }

        fn status(&self) -> ChannelStatus {
            match self.status_byte.load(Ordering::SeqCst) {
                STATUS_RUNNING => ChannelStatus::Running,
                _ => ChannelStatus::Stopped,
            }
        }

        async fn start(
            &self,
            _host: Arc<dyn ChannelHost>,
            cancel: CancellationToken,
        ) -> Result<(), ChannelError> {
            match self.behavior {
                Behavior::FailStart => {
                    return Err(ChannelError::AuthFailed("bad token".into()));
                }
                Behavior::IgnoreCancel => {
                    self.status_byte.store(STATUS_RUNNING, Ordering::SeqCst);
                    std::future::pending::<()>().await;
                }
                _ => {}
            }
            self.status_byte.store(STATUS_RUNNING, Ordering::SeqCst);
            cancel.cancelled().await;
            self.status_byte.store(STATUS_STOPPED, Ordering::SeqCst);
            Ok(())
        }

        async fn send_text(
            &self,
            target: &str,
            text: &str,
            _options: &SendOptions,
        ) -> Result<MessageId, ChannelError> {
            if self.status_byte.load(Ordering::SeqCst) != STATUS_RUNNING {
                return Err(ChannelError::NotConnected);
            }
            self.sent.lock().await.push((target.to_owned(), text.to_owned()));
            Ok(MessageId("mock-msg-001".into()))
        }

        async fn send_media(
            &self,
            target: &str,
            text: &str,
            media: &MediaRef,
            options: &SendOptions,
        ) -> Result<MessageId, ChannelError> {
            let caption = format!("{text} [{}]", media.location);
            self.send_text(target, &caption, options).await
        }

        async fn health_check(&self) -> Result<serde_json::Value, ChannelError> {
            if self.behavior == Behavior::SlowHealth {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(serde_json::json!({ "ok": true, "channel": self.id }))
        }

        async fn fetch_attachment(
            &self,
            _attachment: &AttachmentRef,
        ) -> Result<Vec<u8>, ChannelError> {
            Ok(Vec::new())
        }
    }

    /// A host that collects delivered inbound messages.
    struct MockChannelHost {
        messages: tokio::sync::Mutex<Vec<InboundMessage>>,
    }

    impl MockChannelHost {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: tokio::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChannelHost for MockChannelHost {
        async fn deliver_inbound(&self, msg: InboundMessage) -> Result<(), ChannelError> {
            self.messages.lock().await.push(msg);
            Ok(())
        }
    }

    // ── Tests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn register_and_get() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(MockChannel::new("telegram"))).await.unwrap();

        let channel = registry.get("telegram").await.unwrap();
        assert_eq!(channel.channel_id(), "telegram");
        assert_eq!(registry.list_channels().await, vec!["telegram"]);
    }

    #[tokio::test]
    async fn register_duplicate_errors() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(MockChannel::new("telegram"))).await.unwrap();

        let err = registry
            .register(Arc::new(MockChannel::new("telegram")))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ChannelError::DuplicateChannel(ref id) if id == "telegram"),
            "expected DuplicateChannel, got: {err:?}",
        );
    }

    #[tokio::test]
    async fn get_unknown_errors() {
        let registry = ChannelRegistry::new();
        let err = registry.get("ghost").await.err().unwrap();
        assert!(matches!(err, ChannelError::UnknownChannel(_)));
    }

    #[tokio::test]
    async fn list_channels_is_sorted() {
        let registry = ChannelRegistry::new();
        for id in ["slack", "alpha", "matrix"] {
            registry.register(Arc::new(MockChannel::new(id))).await.unwrap();
        }
        assert_eq!(registry.list_channels().await, vec!["alpha", "matrix", "slack"]);
    }

    #[tokio::test]
    async fn start_all_stop_all() {
        let registry = ChannelRegistry::new();
        for id in ["alpha", "beta"] {
            registry.register(Arc::new(MockChannel::new(id))).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let results = registry.start_all(MockChannelHost::new(), &cancel).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let statuses = registry.statuses().await;
        assert_eq!(statuses.get("alpha"), Some(&ChannelStatus::Running));
        assert_eq!(statuses.get("beta"), Some(&ChannelStatus::Running));

        let stop_results = registry.stop_all().await;
        assert_eq!(stop_results.len(), 2);
        assert!(stop_results.iter().all(|(_, r)| r.is_ok()));

        let statuses = registry.statuses().await;
        assert_eq!(statuses.get("alpha"), Some(&ChannelStatus::Stopped));
        assert_eq!(statuses.get("beta"), Some(&ChannelStatus::Stopped));
    }

    #[tokio::test]
    async fn start_failure_is_isolated() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(MockChannel::new("good"))).await.unwrap();
        registry
            .register(Arc::new(MockChannel::with_behavior("bad", Behavior::FailStart)))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let results: HashMap<_, _> = registry
            .start_all(MockChannelHost::new(), &cancel)
            .await
            .into_iter()
            .collect();

        assert!(results["good"].is_ok());
        assert!(matches!(results["bad"], Err(ChannelError::AuthFailed(_))));
        assert_eq!(
            registry.statuses().await.get("good"),
            Some(&ChannelStatus::Running)
        );

        // Only the adapter that actually started is stopped.
        let stopped = registry.stop_all().await;
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].0, "good");
    }

    #[tokio::test]
    async fn start_all_skips_disabled_channels() {
        let config = Config::from_json_str(
            r#"{ "channels": { "beta": { "enabled": false }, "gamma": { "enabled": true } } }"#,
        )
        .unwrap();
        let registry = ChannelRegistry::from_config(&config);
        for id in ["alpha", "beta", "gamma"] {
            registry.register(Arc::new(MockChannel::new(id))).await.unwrap();
        }
        assert!(registry.is_enabled("alpha"));
        assert!(!registry.is_enabled("beta"));

        let cancel = CancellationToken::new();
        let mut started: Vec<String> = registry
            .start_all(MockChannelHost::new(), &cancel)
            .await
            .into_iter()
            .map(|(id, result)| {
                assert!(result.is_ok());
                id
            })
            .collect();
        started.sort();
        assert_eq!(started, vec!["alpha", "gamma"]);

        let statuses = registry.statuses().await;
        assert_eq!(statuses.get("beta"), Some(&ChannelStatus::Stopped));
        assert_eq!(registry.list_channels().await.len(), 3);
        registry.stop_all().await;
    }

    #[test]
    fn disabled_defaults_apply_to_unlisted_channels() {
        let config = Config::from_json_str(
            r#"{ "defaults": { "enabled": false }, "channels": { "console": { "enabled": true } } }"#,
        )
        .unwrap();
        let registry = ChannelRegistry::from_config(&config);
        assert!(registry.is_enabled("console"));
        assert!(!registry.is_enabled("telegram"));
    }

    #[tokio::test]
    async fn start_all_skips_running_channels() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(MockChannel::new("alpha"))).await.unwrap();

        let cancel = CancellationToken::new();
        let host = MockChannelHost::new();
        assert_eq!(registry.start_all(host.clone(), &cancel).await.len(), 1);
        assert!(registry.start_all(host, &cancel).await.is_empty());

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn parent_cancel_stops_channels() {
        let registry = ChannelRegistry::new();
        let channel = Arc::new(MockChannel::new("alpha"));
        registry.register(channel.clone()).await.unwrap();

        let cancel = CancellationToken::new();
        registry.start_all(MockChannelHost::new(), &cancel).await;
        cancel.cancel();

        let results = registry.stop_all().await;
        assert!(results[0].1.is_ok());
        assert_eq!(channel.status(), ChannelStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_abandons_stuck_channel() {
        let timeouts = RegistryTimeouts {
            stop: Duration::from_secs(2),
            ..RegistryTimeouts::default()
        };
        let registry = ChannelRegistry::with_timeouts(timeouts);
        registry.register(Arc::new(MockChannel::new("fine"))).await.unwrap();
        registry
            .register(Arc::new(MockChannel::with_behavior("stuck", Behavior::IgnoreCancel)))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        registry.start_all(MockChannelHost::new(), &cancel).await;

        let results: HashMap<_, _> = registry.stop_all().await.into_iter().collect();
        assert!(results["fine"].is_ok());
        assert!(matches!(
            results["stuck"],
            Err(ChannelError::StopTimeout { after_ms: 2000, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_timeout_does_not_block_others() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(MockChannel::new("fast"))).await.unwrap();
        registry
            .register(Arc::new(MockChannel::with_behavior("slow", Behavior::SlowHealth)))
            .await
            .unwrap();

        let health = registry.health_check_all().await;
        assert_eq!(health.len(), 2);
        assert_eq!(health["fast"]["ok"], true);
        assert_eq!(health["slow"]["ok"], false);
        assert_eq!(health["slow"]["error"], "health check timed out");
    }

    #[tokio::test]
    async fn send_text_routes_to_adapter() {
        let registry = ChannelRegistry::new();
        let channel = Arc::new(MockChannel::new("mock"));
        registry.register(channel.clone()).await.unwrap();

        let cancel = CancellationToken::new();
        registry.start_all(MockChannelHost::new(), &cancel).await;

        let id = registry
            .send_text("mock", "c1", "hello", &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(id, MessageId("mock-msg-001".into()));

        let media = MediaRef {
            location: "https://example.com/cat.png".into(),
            mime_type: Some("image/png".into()),
        };
        registry
            .send_media("mock", "c1", "look", &media, &SendOptions::default())
            .await
            .unwrap();

        let sent = channel.sent.lock().await.clone();
        assert_eq!(sent[0], ("c1".to_owned(), "hello".to_owned()));
        assert_eq!(sent[1].1, "look [https://example.com/cat.png]");

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn send_to_unknown_channel_errors() {
        let registry = ChannelRegistry::new();
        let result = registry
            .send_text("nonexistent", "c1", "hello", &SendOptions::default())
            .await;
        assert!(matches!(result.unwrap_err(), ChannelError::UnknownChannel(_)));
    }

    #[tokio::test]
    async fn unregister_cancels_running_channel() {
        let registry = ChannelRegistry::new();
        let channel = Arc::new(MockChannel::new("alpha"));
        registry.register(channel.clone()).await.unwrap();

        let cancel = CancellationToken::new();
        registry.start_all(MockChannelHost::new(), &cancel).await;

        let removed = registry.unregister("alpha").await.unwrap();
        assert_eq!(removed.channel_id(), "alpha");
        assert!(registry.list_channels().await.is_empty());
        assert!(registry.stop_all().await.is_empty());
        assert!(matches!(
            registry.unregister("alpha").await.err().unwrap(),
            ChannelError::UnknownChannel(_)
        ));
    }
}
