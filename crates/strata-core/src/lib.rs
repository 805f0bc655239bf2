//! # strata-core
//!
//! Foundation types, errors, branded IDs, and utilities for the Strata engine.
//!
//! This crate provides the shared vocabulary the other Strata crates depend on:
//!
//! - **Entries**: the `Entry`/`EntryKind` tagged conversation model delivered by the host
//! - **Branded IDs**: `SessionId` and `EntryId` as newtypes for type safety
//! - **Hashing**: deterministic short content hashes for content addressing
//! - **Tokens**: chars/4 token estimation
//! - **Text**: UTF-8-safe truncation and split-point search
//! - **Errors**: the `EngineError` hierarchy via `thiserror`
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod entries;
pub mod errors;
pub mod hash;
pub mod ids;
pub mod logging;
pub mod text;
pub mod tokens;

pub use entries::{ContentPart, Entry, EntryContent, EntryKind};
pub use errors::{EngineError, EngineResult};
pub use hash::content_hash;
pub use ids::{EntryId, SessionId};
pub use tokens::{CHARS_PER_TOKEN, estimate_tokens};
