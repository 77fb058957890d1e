//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Session timing and the granted tool
    #[serde(default)]
    pub session: RawSessionConfig,

    /// Item restriction lists
    #[serde(default)]
    pub restrictions: RawRestrictions,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the session database
    pub data_dir: Option<PathBuf>,

    /// Seconds between reconciliation sweeps
    pub check_interval_seconds: Option<u64>,
}

/// Session settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionConfig {
    /// Length of a non-privileged session
    pub duration_minutes: Option<u64>,

    /// Wait between the end of one session and the next start
    pub cooldown_minutes: Option<u64>,

    /// Item granted at session start
    pub tool_item: Option<String>,
}

/// Restriction lists. Entries stay as strings here; they are checked
/// one by one during conversion so a bad entry only drops itself.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRestrictions {
    /// "blacklist" or "whitelist"
    pub mode: Option<String>,

    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default)]
    pub whitelist: Vec<String>,
}
