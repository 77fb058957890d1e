//! Validated configuration structures

use crate::schema::{RawConfig, RawRestrictions, RawServiceConfig, RawSessionConfig};
use crate::validation::{parse_item_list, parse_restriction_mode, ValidationError};
use buildmode_api::{ItemType, RestrictionMode};
use buildmode_util::{data_dir_without_env, minutes, socket_path_without_env};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default seconds between reconciliation sweeps
pub const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 30;

/// Default session length
pub const DEFAULT_DURATION_MINUTES: u64 = 60;

/// Default wait between sessions
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 1;

/// Default item granted at session start
pub const DEFAULT_TOOL_ITEM: &str = "WOODEN_AXE";

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub service: ServiceConfig,
    pub session: SessionSettings,
    pub restrictions: PolicyConfiguration,

    /// Non-fatal problems found while loading (skipped list entries)
    pub warnings: Vec<ValidationError>,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let (restrictions, warnings) = PolicyConfiguration::from_raw(raw.restrictions);

        Self {
            service: ServiceConfig::from_raw(raw.service),
            session: SessionSettings::from_raw(raw.session),
            restrictions,
            warnings,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub check_interval: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(socket_path_without_env),
            data_dir: raw.data_dir.unwrap_or_else(data_dir_without_env),
            check_interval: Duration::from_secs(
                raw.check_interval_seconds
                    .unwrap_or(DEFAULT_CHECK_INTERVAL_SECONDS),
            ),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Session timing and the granted tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Length of a non-privileged session
    pub duration: Duration,
    /// Zero disables the cooldown
    pub cooldown: Duration,
    pub tool_item: ItemType,
}

impl SessionSettings {
    fn from_raw(raw: RawSessionConfig) -> Self {
        // validate_config has already rejected an unparsable tool item
        let tool_item = raw
            .tool_item
            .and_then(|t| ItemType::parse(&t).ok())
            .unwrap_or_else(default_tool_item);

        Self {
            duration: minutes(raw.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)),
            cooldown: minutes(raw.cooldown_minutes.unwrap_or(DEFAULT_COOLDOWN_MINUTES)),
            tool_item,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_raw(RawSessionConfig::default())
    }
}

fn default_tool_item() -> ItemType {
    ItemType::parse(DEFAULT_TOOL_ITEM).expect("default tool item is a valid identifier")
}

/// Item restriction policy. Immutable once built; reload replaces it whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfiguration {
    pub mode: RestrictionMode,
    pub blacklist: HashSet<ItemType>,
    pub whitelist: HashSet<ItemType>,
}

impl PolicyConfiguration {
    pub fn new(
        mode: RestrictionMode,
        blacklist: impl IntoIterator<Item = ItemType>,
        whitelist: impl IntoIterator<Item = ItemType>,
    ) -> Self {
        Self {
            mode,
            blacklist: blacklist.into_iter().collect(),
            whitelist: whitelist.into_iter().collect(),
        }
    }

    /// Build from raw lists, returning the entries that were skipped
    fn from_raw(raw: RawRestrictions) -> (Self, Vec<ValidationError>) {
        let mode = raw
            .mode
            .as_deref()
            .and_then(|m| parse_restriction_mode(m).ok())
            .unwrap_or(RestrictionMode::Blacklist);

        let (blacklist, mut skipped) = parse_item_list("blacklist", &raw.blacklist);
        let (whitelist, skipped_white) = parse_item_list("whitelist", &raw.whitelist);
        skipped.extend(skipped_white);

        (
            Self {
                mode,
                blacklist,
                whitelist,
            },
            skipped,
        )
    }

    /// Number of entries in the list the current mode consults
    pub fn active_list_len(&self) -> usize {
        match self.mode {
            RestrictionMode::Blacklist => self.blacklist.len(),
            RestrictionMode::Whitelist => self.whitelist.len(),
        }
    }
}

impl Default for PolicyConfiguration {
    fn default() -> Self {
        Self {
            mode: RestrictionMode::Blacklist,
            blacklist: HashSet::new(),
            whitelist: HashSet::new(),
        }
    }
}
