//! # strata-settings
//!
//! Configuration management with layered sources for the Strata engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`MemorySettings::default()`]
//! 2. **User file**: `~/.strata/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `STRATA_*` overrides (highest priority)
//!
//! There is no process-wide settings singleton: each engine instance is
//! constructed with its own [`MemorySettings`] value, which keeps sessions
//! independent and tests deterministic.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::MemorySettings;
