//! Per-channel sender access control.
//!
//! Each channel runs in one of three [`AccessMode`]s:
//!
//! - `open` -- every well-formed sender may proceed.
//! - `pairing` -- only allow-listed senders may proceed; unknown senders
//!   are recorded as pending so an operator can approve or deny them.
//! - `disabled` -- nobody may proceed.
//!
//! [`AccessEnforcer::check_access`] is a pure lookup. Every mutation
//! (`approve`, `deny`, `revoke`, `record_pending`) takes the write lock for
//! the duration of a set insert or removal and nothing else.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use parley_types::access::{AccessDecision, AccessMode, AccessReason};
use parley_types::config::Config;

/// Upper bound on remembered pending senders per channel. The oldest entry
/// is forgotten when a new one arrives at the limit.
const MAX_PENDING_PER_CHANNEL: usize = 1024;

#[derive(Debug, Default)]
struct ChannelPolicy {
    mode: AccessMode,
    allowed: HashSet<String>,
    blocked: HashSet<String>,
    pending: VecDeque<String>,
}

impl ChannelPolicy {
    fn new(mode: AccessMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    fn decide(&self, sender_id: &str) -> AccessDecision {
        if self.mode == AccessMode::Disabled {
            return AccessDecision::deny(AccessReason::Disabled);
        }
        if !is_well_formed(sender_id) || self.blocked.contains(sender_id) {
            return AccessDecision::deny(AccessReason::Blocked);
        }
        match self.mode {
            AccessMode::Open => AccessDecision::allow(),
            _ if self.allowed.contains(sender_id) => AccessDecision::allow(),
            _ => AccessDecision::deny(AccessReason::NotPaired),
        }
    }

    fn remove_pending(&mut self, sender_id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|s| s != sender_id);
        self.pending.len() != before
    }
}

/// A sender id is usable if it has visible content and no control
/// characters.
fn is_well_formed(sender_id: &str) -> bool {
    !sender_id.trim().is_empty() && !sender_id.chars().any(char::is_control)
}

/// In-memory access policy store shared by every conversational key.
///
/// Channels without an explicit policy use the enforcer's default mode
/// with an empty allow-list.
#[derive(Debug)]
pub struct AccessEnforcer {
    default_mode: AccessMode,
    policies: RwLock<HashMap<String, ChannelPolicy>>,
}

impl Default for AccessEnforcer {
    fn default() -> Self {
        Self::new(AccessMode::default())
    }
}

impl AccessEnforcer {
    /// Create an enforcer with no per-channel policies.
    pub fn new(default_mode: AccessMode) -> Self {
        Self {
            default_mode,
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Build an enforcer from the `access` sections of a config.
    pub fn from_config(config: &Config) -> Self {
        let enforcer = Self::new(config.defaults.access.policy);
        for (channel_id, channel) in &config.channels {
            enforcer.set_policy(channel_id, channel.access.policy, &channel.access.allow_from);
        }
        enforcer
    }

    /// Replace a channel's mode and seed its allow-list.
    ///
    /// Existing approvals for the channel are kept; blocked and pending
    /// senders are left untouched.
    pub fn set_policy(&self, channel_id: &str, mode: AccessMode, allow_from: &[String]) {
        let mut policies = self.policies.write();
        let policy = policies
            .entry(channel_id.to_owned())
            .or_insert_with(|| ChannelPolicy::new(mode));
        policy.mode = mode;
        policy
            .allowed
            .extend(allow_from.iter().filter(|s| is_well_formed(s)).cloned());
    }

    /// Whether `sender_id` may interact on `channel_id`.
    ///
    /// Matching is exact and case-sensitive. Empty or malformed sender ids
    /// are denied as `blocked`.
    pub fn check_access(&self, channel_id: &str, sender_id: &str) -> AccessDecision {
        let policies = self.policies.read();
        match policies.get(channel_id) {
            Some(policy) => policy.decide(sender_id),
            None => ChannelPolicy::new(self.default_mode).decide(sender_id),
        }
    }

    /// The mode currently applied to `channel_id`.
    pub fn mode(&self, channel_id: &str) -> AccessMode {
        self.policies
            .read()
            .get(channel_id)
            .map_or(self.default_mode, |p| p.mode)
    }

    /// Add a sender to the allow-list. Idempotent.
    ///
    /// Clears any pending or blocked state for the sender. Returns `true`
    /// if the sender was not already allowed.
    pub fn approve(&self, channel_id: &str, sender_id: &str) -> bool {
        if !is_well_formed(sender_id) {
            warn!(channel = %channel_id, "refusing to approve malformed sender id");
            return false;
        }
        let added = {
            let mut policies = self.policies.write();
            let policy = self.policy_mut(&mut policies, channel_id);
            policy.remove_pending(sender_id);
            policy.blocked.remove(sender_id);
            policy.allowed.insert(sender_id.to_owned())
        };
        if added {
            info!(channel = %channel_id, sender = %sender_id, "sender approved");
        }
        added
    }

    /// Reject a sender. Later messages from them report `blocked`.
    ///
    /// Returns `true` if the sender was not already blocked.
    pub fn deny(&self, channel_id: &str, sender_id: &str) -> bool {
        let added = {
            let mut policies = self.policies.write();
            let policy = self.policy_mut(&mut policies, channel_id);
            policy.remove_pending(sender_id);
            policy.allowed.remove(sender_id);
            policy.blocked.insert(sender_id.to_owned())
        };
        if added {
            info!(channel = %channel_id, sender = %sender_id, "sender denied");
        }
        added
    }

    /// Remove a sender from the allow-list.
    ///
    /// Returns `true` if the sender was allowed.
    pub fn revoke(&self, channel_id: &str, sender_id: &str) -> bool {
        let removed = self
            .policies
            .write()
            .get_mut(channel_id)
            .is_some_and(|p| p.allowed.remove(sender_id));
        if removed {
            info!(channel = %channel_id, sender = %sender_id, "sender revoked");
        }
        removed
    }

    /// Remember an unpaired sender for out-of-band approval.
    ///
    /// No-op for malformed, blocked, allowed or already pending senders.
    /// Returns `true` if the sender was newly recorded.
    pub fn record_pending(&self, channel_id: &str, sender_id: &str) -> bool {
        if !is_well_formed(sender_id) {
            return false;
        }
        let mut policies = self.policies.write();
        let policy = self.policy_mut(&mut policies, channel_id);
        if policy.allowed.contains(sender_id)
            || policy.blocked.contains(sender_id)
            || policy.pending.iter().any(|s| s == sender_id)
        {
            return false;
        }
        if policy.pending.len() >= MAX_PENDING_PER_CHANNEL {
            policy.pending.pop_front();
        }
        policy.pending.push_back(sender_id.to_owned());
        debug!(channel = %channel_id, "recorded pending sender");
        true
    }

    /// Senders awaiting approval, oldest first.
    pub fn pending(&self, channel_id: &str) -> Vec<String> {
        self.policies
            .read()
            .get(channel_id)
            .map(|p| p.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Allow-listed senders, sorted.
    pub fn allowed(&self, channel_id: &str) -> Vec<String> {
        let mut allowed: Vec<String> = self
            .policies
            .read()
            .get(channel_id)
            .map(|p| p.allowed.iter().cloned().collect())
            .unwrap_or_default();
        allowed.sort();
        allowed
    }

    fn policy_mut<'a>(
        &self,
        policies: &'a mut HashMap<String, ChannelPolicy>,
        channel_id: &str,
    ) -> &'a mut ChannelPolicy {
        policies
            .entry(channel_id.to_owned())
            .or_insert_with(|| ChannelPolicy::new(self.default_mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pairing() -> AccessEnforcer {
        AccessEnforcer::new(AccessMode::Pairing)
    }

    #[test]
    fn open_allows_everyone() {
        let enforcer = AccessEnforcer::new(AccessMode::Open);
        assert_eq!(enforcer.check_access("telegram", "anyone"), AccessDecision::allow());
    }

    #[test]
    fn disabled_denies_everyone() {
        let enforcer = pairing();
        enforcer.set_policy("telegram", AccessMode::Disabled, &["alice".into()]);
        let decision = enforcer.check_access("telegram", "alice");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::Disabled);
    }

    #[test]
    fn pairing_denies_unknown_sender() {
        let enforcer = pairing();
        let decision = enforcer.check_access("telegram", "u2");
        assert_eq!(decision, AccessDecision::deny(AccessReason::NotPaired));
    }

    #[test]
    fn approve_is_idempotent() {
        let enforcer = pairing();
        assert!(enforcer.approve("telegram", "alice"));
        assert!(!enforcer.approve("telegram", "alice"));
        assert_eq!(enforcer.allowed("telegram"), vec!["alice"]);
        assert!(enforcer.check_access("telegram", "alice").allowed);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let enforcer = pairing();
        enforcer.approve("telegram", "Alice");
        assert!(enforcer.check_access("telegram", "Alice").allowed);
        assert!(!enforcer.check_access("telegram", "alice").allowed);
    }

    #[test]
    fn approval_is_per_channel() {
        let enforcer = pairing();
        enforcer.approve("telegram", "alice");
        assert!(!enforcer.check_access("slack", "alice").allowed);
    }

    #[test]
    fn malformed_sender_is_blocked_not_error() {
        let enforcer = AccessEnforcer::new(AccessMode::Open);
        for bad in ["", "   ", "bob\n", "a\u{0}b"] {
            let decision = enforcer.check_access("telegram", bad);
            assert_eq!(decision.reason, AccessReason::Blocked, "sender {bad:?}");
        }
        assert!(!enforcer.approve("telegram", ""));
        assert!(!enforcer.record_pending("telegram", " "));
    }

    #[test]
    fn deny_blocks_and_clears_pending() {
        let enforcer = pairing();
        assert!(enforcer.record_pending("telegram", "mallory"));
        assert_eq!(enforcer.pending("telegram"), vec!["mallory"]);

        assert!(enforcer.deny("telegram", "mallory"));
        assert!(enforcer.pending("telegram").is_empty());
        assert_eq!(
            enforcer.check_access("telegram", "mallory").reason,
            AccessReason::Blocked
        );
        // A blocked sender is not re-recorded as pending.
        assert!(!enforcer.record_pending("telegram", "mallory"));
    }

    #[test]
    fn deny_applies_in_open_mode() {
        let enforcer = AccessEnforcer::new(AccessMode::Open);
        enforcer.deny("telegram", "spammer");
        assert!(!enforcer.check_access("telegram", "spammer").allowed);
        assert!(enforcer.check_access("telegram", "someone").allowed);
    }

    #[test]
    fn approve_clears_pending_and_block() {
        let enforcer = pairing();
        enforcer.record_pending("telegram", "bob");
        enforcer.deny("telegram", "carol");

        enforcer.approve("telegram", "bob");
        enforcer.approve("telegram", "carol");
        assert!(enforcer.pending("telegram").is_empty());
        assert!(enforcer.check_access("telegram", "bob").allowed);
        assert!(enforcer.check_access("telegram", "carol").allowed);
    }

    #[test]
    fn revoke_removes_approval() {
        let enforcer = pairing();
        enforcer.approve("telegram", "alice");
        assert!(enforcer.revoke("telegram", "alice"));
        assert!(!enforcer.revoke("telegram", "alice"));
        assert_eq!(
            enforcer.check_access("telegram", "alice").reason,
            AccessReason::NotPaired
        );
    }

    #[test]
    fn pending_is_ordered_and_deduplicated() {
        let enforcer = pairing();
        enforcer.record_pending("telegram", "b");
        enforcer.record_pending("telegram", "a");
        assert!(!enforcer.record_pending("telegram", "b"));
        assert_eq!(enforcer.pending("telegram"), vec!["b", "a"]);
    }

    #[test]
    fn pending_is_bounded() {
        let enforcer = pairing();
        for i in 0..=MAX_PENDING_PER_CHANNEL {
            enforcer.record_pending("telegram", &format!("u{i}"));
        }
        let pending = enforcer.pending("telegram");
        assert_eq!(pending.len(), MAX_PENDING_PER_CHANNEL);
        assert_eq!(pending[0], "u1");
    }

    #[test]
    fn from_config_applies_channel_policies() {
        let json = r#"{
            "channels": {
                "telegram": { "access": { "policy": "pairing", "allowFrom": ["alice"] } },
                "console": { "access": { "policy": "open" } }
            },
            "defaults": { "access": { "policy": "disabled" } }
        }"#;
        let config = Config::from_json_str(json).unwrap();
        let enforcer = AccessEnforcer::from_config(&config);

        assert!(enforcer.check_access("telegram", "alice").allowed);
        assert!(!enforcer.check_access("telegram", "bob").allowed);
        assert!(enforcer.check_access("console", "bob").allowed);
        assert_eq!(enforcer.mode("unknown"), AccessMode::Disabled);
        assert_eq!(
            enforcer.check_access("unknown", "alice").reason,
            AccessReason::Disabled
        );
    }

    #[test]
    fn concurrent_approvals_and_checks() {
        let enforcer = Arc::new(pairing());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let enforcer = enforcer.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let sender = format!("t{t}-u{i}");
                        enforcer.approve("telegram", &sender);
                        assert!(enforcer.check_access("telegram", &sender).allowed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(enforcer.allowed("telegram").len(), 800);
    }
}
