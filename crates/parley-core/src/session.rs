//! Identity mapping for external senders.
//!
//! [`SessionResolver`] assigns each `(channel, sender)` pair a stable
//! [`Identity`] on first sight and derives a per-chat [`ConversationKey`]
//! from it. The mapping is append-only: once assigned, an identity is never
//! reassigned for the lifetime of the resolver.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use parley_types::session::{ConversationKey, Identity};

/// Result of [`SessionResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub identity: Identity,
    pub conversation_key: ConversationKey,
}

type SenderKey = (String, String);

/// Process-lifetime identity store, injected into the coordinator.
#[derive(Debug, Default)]
pub struct SessionResolver {
    identities: RwLock<HashMap<SenderKey, Identity>>,
    display_names: RwLock<HashMap<Identity, String>>,
}

impl SessionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with mappings persisted elsewhere.
    ///
    /// Entries are `((channel_id, sender_id), identity)`.
    pub fn with_identities(entries: impl IntoIterator<Item = ((String, String), Identity)>) -> Self {
        Self {
            identities: RwLock::new(entries.into_iter().collect()),
            display_names: RwLock::new(HashMap::new()),
        }
    }

    /// Map an external sender to its identity and conversation key,
    /// assigning a fresh identity the first time the pair is seen.
    pub fn resolve(&self, channel_id: &str, chat_id: &str, sender_id: &str) -> ResolvedSession {
        let identity = self.identity_for(channel_id, sender_id);
        let conversation_key = ConversationKey::derive(&identity, channel_id, chat_id);
        ResolvedSession {
            identity,
            conversation_key,
        }
    }

    /// Existing identity for a sender, without creating one.
    pub fn lookup(&self, channel_id: &str, sender_id: &str) -> Option<Identity> {
        self.identities
            .read()
            .get(&(channel_id.to_owned(), sender_id.to_owned()))
            .cloned()
    }

    /// Remember a human-readable name for an identity. Empty names are
    /// ignored.
    pub fn set_display_name(&self, identity: &Identity, name: &str) {
        if name.trim().is_empty() {
            return;
        }
        self.display_names
            .write()
            .insert(identity.clone(), name.to_owned());
    }

    /// Last remembered display name of an identity.
    pub fn display_name(&self, identity: &Identity) -> Option<String> {
        self.display_names.read().get(identity).cloned()
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn identity_for(&self, channel_id: &str, sender_id: &str) -> Identity {
        let key = (channel_id.to_owned(), sender_id.to_owned());
        if let Some(identity) = self.identities.read().get(&key) {
            return identity.clone();
        }

        // Another task may have inserted between the read and write locks;
        // `entry` keeps whichever identity landed first.
        let mut identities = self.identities.write();
        let identity = identities.entry(key).or_insert_with(|| {
            let identity = Identity::generate();
            debug!(channel = %channel_id, identity = %identity, "assigned new identity");
            identity
        });
        identity.clone()
    }
}
