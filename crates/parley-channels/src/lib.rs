//! Channel layer for parley.
//!
//! Provides the trait-based adapter contract for chat channels. Each
//! channel (console, a bot API, ...) implements the [`Channel`] trait and
//! is owned by a [`ChannelRegistry`], which manages adapter lifecycle
//! (registration, start, stop, health) and routes outbound sends to the
//! adapter that owns a channel id.
//!
//! # Architecture
//!
//! ```text
//!               Arc<dyn Channel>
//!                     │
//!          ChannelRegistry.register()
//!                     │
//!          ChannelRegistry.start_all(host, cancel)
//!                │                    │
//!      child CancellationToken   Arc<dyn ChannelHost>
//!                │                    │
//!          Channel::start(host, cancel) ──deliver_inbound──> pipeline
//! ```
//!
//! # Error handling
//!
//! Channel operations return [`ChannelError`](parley_types::error::ChannelError)
//! from the `parley-types` crate. This crate re-exports it for convenience.

pub mod console;
pub mod registry;
pub mod traits;

pub use console::ConsoleChannel;
pub use registry::{ChannelRegistry, RegistryTimeouts};
pub use traits::*;

// Re-export the canonical error type so callers do not need to depend
// on parley-types directly for channel errors.
pub use parley_types::error::ChannelError;
