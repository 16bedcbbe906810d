//! # parley-core
//!
//! Inbound/outbound message pipeline for the parley multi-channel bot
//! gateway.
//!
//! Contains the access enforcer, inbound debouncer, session resolver,
//! attachment resolver, outbound chunker and the [`Coordinator`] that
//! sequences them between channel adapters and a [`ReasoningEngine`].

pub mod access;
pub mod attachments;
pub mod chunker;
pub mod debounce;
pub mod engine;
pub mod metrics;
pub mod pipeline;
pub mod session;

pub use access::AccessEnforcer;
pub use attachments::{AttachmentBatch, AttachmentResolver};
pub use debounce::{Debouncer, FlushSink};
pub use engine::{EchoEngine, EngineRequest, ReasoningEngine};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{Coordinator, Stage};
pub use session::{ResolvedSession, SessionResolver};
