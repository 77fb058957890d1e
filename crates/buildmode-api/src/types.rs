//! Shared types for the buildmoded API

use buildmode_util::UserId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{InventorySnapshot, ItemType};

/// Operating mode of a user on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    /// Mode granted for the duration of a build session
    pub const ELEVATED: GameMode = GameMode::Creative;

    /// Mode restored when the prior mode was itself the elevated one
    pub const BASELINE: GameMode = GameMode::Survival;

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Survival => "survival",
            GameMode::Creative => "creative",
            GameMode::Adventure => "adventure",
            GameMode::Spectator => "spectator",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "survival" => Ok(GameMode::Survival),
            "creative" => Ok(GameMode::Creative),
            "adventure" => Ok(GameMode::Adventure),
            "spectator" => Ok(GameMode::Spectator),
            other => Err(format!("Unknown game mode: {}", other)),
        }
    }
}

/// Item classification strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionMode {
    /// Deny listed items, allow the rest
    Blacklist,
    /// Allow listed items, deny the rest
    Whitelist,
}

/// A state change the host must apply to a user, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Empty every inventory slot
    ClearInventory,
    SetGameMode { mode: GameMode },
    /// Write the snapshot back into storage, armour, and off-hand slots
    RestoreInventory { snapshot: InventorySnapshot },
    GrantItem { item_type: ItemType, amount: u32 },
}

/// Inventory categories the host reports for container interactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Player,
    Creative,
    Chest,
    Barrel,
    Hopper,
    ShulkerBox,
    Other,
}

impl ContainerKind {
    /// Containers that can hold items beyond the session
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            ContainerKind::Chest
                | ContainerKind::Barrel
                | ContainerKind::Hopper
                | ContainerKind::ShulkerBox
        )
    }

    /// The user's own inventory views
    pub fn is_own(&self) -> bool {
        matches!(self, ContainerKind::Player | ContainerKind::Creative)
    }
}

/// Kind of action a host event adapter is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Using an item on a block or in the air
    Interact,
    PlaceBlock,
    /// Taking an item from the creative palette
    CreativePick,
    /// Clicking a slot in an open inventory view
    InventoryClick {
        clicked: ContainerKind,
        /// Upper inventory of the open view
        top: ContainerKind,
        shift_click: bool,
    },
    /// Dragging the cursor stack across slots
    Drag { into_container: bool },
    /// Hopper-style automated move touching the user's inventory
    AutomatedTransfer,
    Drop,
    Pickup,
    OpenContainer { container: ContainerKind },
}

/// Why an action was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    IllegalItem,
    ContainerForbidden,
    DropForbidden,
    TransferForbidden,
}

/// Outcome of evaluating an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ActionVerdict {
    Allow,
    Deny { reason: DenyReason },
}

impl ActionVerdict {
    pub fn deny(reason: DenyReason) -> Self {
        ActionVerdict::Deny { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, ActionVerdict::Allow)
    }
}

/// Session end reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// User or host requested the end
    UserStop,
    /// Time window elapsed
    Expired,
}

/// Active session information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub started_at: DateTime<Local>,
    /// Deadline for session. None means unlimited.
    pub deadline: Option<DateTime<Local>>,
    /// Seconds left. None means unlimited.
    pub remaining_seconds: Option<u64>,
}

/// A restore the host has not yet confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRestoreInfo {
    pub user_id: UserId,
    pub expired_at: DateTime<Local>,
    pub effects: Vec<Effect>,
}

/// Per-user status answer for display collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub active: bool,
    /// 0 when inactive, `u64::MAX` when unlimited
    pub remaining_seconds: u64,
    pub on_cooldown: bool,
    pub cooldown_remaining_seconds: u64,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Host integration - starts/ends sessions, reports presence
    Host,
    /// Local admin - can also extend sessions and reload config
    Admin,
    /// Read-only display layer
    Observer,
}

impl ClientRole {
    pub fn can_mutate_sessions(&self) -> bool {
        matches!(self, ClientRole::Host | ClientRole::Admin)
    }

    pub fn can_extend(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_reload_config(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub active_sessions: usize,
    pub pending_restores: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_mode_parsing() {
        assert_eq!("CREATIVE".parse::<GameMode>().unwrap(), GameMode::Creative);
        assert_eq!("survival".parse::<GameMode>().unwrap(), GameMode::Survival);
        assert!("hardcore".parse::<GameMode>().is_err());
        assert_eq!(GameMode::ELEVATED.to_string(), "creative");
    }

    #[test]
    fn effect_serialization_is_tagged() {
        let effect = Effect::SetGameMode {
            mode: GameMode::Creative,
        };
        let json = serde_json::to_string(&effect).unwrap();
        assert_eq!(json, r#"{"type":"set_game_mode","mode":"creative"}"#);

        let parsed: Effect = serde_json::from_str(r#"{"type":"clear_inventory"}"#).unwrap();
        assert_eq!(parsed, Effect::ClearInventory);
    }

    #[test]
    fn action_kind_deserialization() {
        let action: ActionKind = serde_json::from_str(
            r#"{"type":"inventory_click","clicked":"chest","top":"chest","shift_click":false}"#,
        )
        .unwrap();
        assert!(matches!(
            action,
            ActionKind::InventoryClick {
                clicked: ContainerKind::Chest,
                ..
            }
        ));
    }

    #[test]
    fn container_classification() {
        assert!(ContainerKind::ShulkerBox.is_storage());
        assert!(!ContainerKind::Player.is_storage());
        assert!(ContainerKind::Creative.is_own());
        assert!(!ContainerKind::Other.is_own());
    }

    #[test]
    fn verdict_serialization() {
        let verdict = ActionVerdict::deny(DenyReason::IllegalItem);
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("illegal_item"));
        assert!(!verdict.is_allowed());
    }
}
