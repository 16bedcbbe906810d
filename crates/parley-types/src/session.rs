//! Identity and conversation key types.
//!
//! Three keys with different scopes flow through the pipeline:
//!
//! - [`ConversationalKey`] -- `channel:chat:sender`, the unit of debounce
//!   and dispatch ordering.
//! - [`Identity`] -- stable internal user id for a `(channel, sender)` pair;
//!   shared by every chat that sender uses on the channel.
//! - [`ConversationKey`] -- `identity:channel:chat`, isolates conversational
//!   state per chat while keeping the identity shared.
//!
//! Key parts are joined with `:`. A `:` or `%` inside a part is
//! percent-escaped, so ids such as `@alice:example.org` cannot make two
//! different part lists render to the same key.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Debounce / ordering key derived from channel, chat and sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationalKey(String);

impl ConversationalKey {
    /// Build the key for a sender in a chat on a channel.
    pub fn new(channel_id: &str, chat_id: &str, sender_id: &str) -> Self {
        Self(join_parts(&[channel_id, chat_id, sender_id]))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable internal identity of a sender on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an existing identity (e.g. one loaded from an external store).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh, globally unique identity.
    pub fn generate() -> Self {
        Self(format!("usr_{}", Uuid::new_v4().simple()))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key for one conversation of one identity: `"{identity}:{channel}:{chat}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Derive the key deterministically from its parts.
    pub fn derive(identity: &Identity, channel_id: &str, chat_id: &str) -> Self {
        Self(join_parts(&[identity.as_str(), channel_id, chat_id]))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn join_parts(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(':');
        }
        for ch in part.chars() {
            match ch {
                '%' => key.push_str("%25"),
                ':' => key.push_str("%3A"),
                _ => key.push(ch),
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversational_key_format() {
        let key = ConversationalKey::new("telegram", "42", "u1");
        assert_eq!(key.to_string(), "telegram:42:u1");
    }

    #[test]
    fn colons_inside_ids_do_not_collide() {
        let a = ConversationalKey::new("matrix", "a:b", "c");
        let b = ConversationalKey::new("matrix", "a", "b:c");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "matrix:a%3Ab:c");

        let escaped = ConversationalKey::new("matrix", "a%3Ab", "c");
        assert_ne!(a, escaped);

        let id = Identity::new("usr_1");
        assert_ne!(
            ConversationKey::derive(&id, "matrix", "!room:example.org"),
            ConversationKey::derive(&id, "matrix:!room", "example.org"),
        );
    }

    #[test]
    fn generated_identities_are_unique() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("usr_"));
    }

    #[test]
    fn conversation_key_is_deterministic() {
        let id = Identity::new("usr_1");
        let a = ConversationKey::derive(&id, "telegram", "chat-a");
        let b = ConversationKey::derive(&id, "telegram", "chat-a");
        let c = ConversationKey::derive(&id, "telegram", "chat-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "usr_1:telegram:chat-a");
    }

    #[test]
    fn identity_serializes_transparently() {
        let json = serde_json::to_string(&Identity::new("usr_9")).unwrap();
        assert_eq!(json, "\"usr_9\"");
    }
}
