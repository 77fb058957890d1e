//! Configuration validation

use crate::schema::RawConfig;
use buildmode_api::{ItemType, RestrictionMode};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A restriction list entry is not a usable item identifier. Skipped,
    /// never fatal.
    #[error("Invalid item type '{entry}' in {list}: {reason}")]
    InvalidItemType {
        list: String,
        entry: String,
        reason: String,
    },

    #[error("Invalid restriction mode '{0}' (expected \"blacklist\" or \"whitelist\")")]
    InvalidMode(String),

    #[error("Invalid tool item '{value}': {reason}")]
    InvalidToolItem { value: String, reason: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

impl ValidationError {
    /// Whether this error rejects the whole configuration
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ValidationError::InvalidItemType { .. })
    }
}

/// Validate a raw configuration, returning only fatal errors.
///
/// Restriction list entries are checked separately by [`parse_item_list`].
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.check_interval_seconds == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "service.check_interval_seconds",
        });
    }

    if config.session.duration_minutes == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "session.duration_minutes",
        });
    }

    if let Some(tool) = &config.session.tool_item
        && let Err(e) = ItemType::parse(tool)
    {
        errors.push(ValidationError::InvalidToolItem {
            value: tool.clone(),
            reason: e.to_string(),
        });
    }

    if let Some(mode) = &config.restrictions.mode
        && let Err(e) = parse_restriction_mode(mode)
    {
        errors.push(e);
    }

    errors
}

/// Parse a restriction mode name (case-insensitive)
pub fn parse_restriction_mode(s: &str) -> Result<RestrictionMode, ValidationError> {
    match s.trim().to_lowercase().as_str() {
        "blacklist" => Ok(RestrictionMode::Blacklist),
        "whitelist" => Ok(RestrictionMode::Whitelist),
        _ => Err(ValidationError::InvalidMode(s.to_string())),
    }
}

/// Parse every entry of a restriction list, collecting the valid ones and
/// one `InvalidItemType` per rejected entry.
pub fn parse_item_list(
    list: &str,
    entries: &[String],
) -> (HashSet<ItemType>, Vec<ValidationError>) {
    let mut items = HashSet::new();
    let mut skipped = Vec::new();

    for entry in entries {
        match ItemType::parse(entry) {
            Ok(item) => {
                items.insert(item);
            }
            Err(e) => skipped.push(ValidationError::InvalidItemType {
                list: list.to_string(),
                entry: entry.clone(),
                reason: e.to_string(),
            }),
        }
    }

    (items, skipped)
}
