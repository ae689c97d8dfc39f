//! # pulse-settings
//!
//! Configuration with layered sources for the Pulse hub and its clients.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`PulseSettings::default()`]
//! 2. **User file** — `~/.pulse/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables** — `PULSE_*` overrides (highest priority)
//!
//! The merged result is validated before it is returned, so a bad interval
//! or an inverted backoff range stops the process at startup.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
