//! # longpoll-settings
//!
//! Configuration for the longpoll server, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LongpollSettings::default()`]
//! 2. **Settings file**: `~/.longpoll/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `LONGPOLL_*` overrides (highest priority)
//!
//! The client list is only ever read from the file; it is the static token table that
//! defines which sessions exist for the lifetime of the process.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
