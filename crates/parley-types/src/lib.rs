//! # parley-types
//!
//! Core type definitions for the parley message pipeline.
//!
//! This crate is the foundation of the dependency graph -- all other
//! parley crates depend on it. It contains:
//!
//! - **[`error`]** -- [`ParleyError`], [`ChannelError`], [`AttachmentError`]
//!   and [`EngineError`]
//! - **[`config`]** -- Configuration schema (per-channel policy, media limits,
//!   pipeline timeouts)
//! - **[`event`]** -- Channel-agnostic inbound messages, attachments and
//!   outbound fragments
//! - **[`session`]** -- Identity and conversation key types
//! - **[`access`]** -- Access decisions produced by the enforcer

pub mod access;
pub mod config;
pub mod error;
pub mod event;
pub mod session;

pub use error::{AttachmentError, ChannelError, EngineError, ParleyError, Result};
