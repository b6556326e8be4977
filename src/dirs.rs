//! Default filesystem locations for nudge.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//! Only the binary consults these; the library takes explicit paths.
//!
//! # Environment Overrides
//!
//! - `NUDGE_DATA_DIR` overrides [`data_dir`]
//! - `NUDGE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// State directory for the reminder collection and fire-guard ledger.
///
/// Resolves to `dirs::data_dir()/nudge/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NUDGE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    ::dirs::data_dir()
        .map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nudge-data"))
}

/// Directory holding `config.toml`.
///
/// Resolves to `dirs::config_dir()/nudge/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NUDGE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    ::dirs::config_dir()
        .map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nudge-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
