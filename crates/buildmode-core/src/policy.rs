//! Item and action restrictions applied during a session

use buildmode_api::{
    ActionKind, ActionVerdict, ContainerKind, DenyReason, ItemStack, RestrictionMode,
};
use buildmode_config::PolicyConfiguration;
use std::sync::Arc;

/// Decides which items and actions are allowed while a user is in build
/// mode. The configuration is shared and replaced whole on reload.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    config: Arc<PolicyConfiguration>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfiguration) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PolicyConfiguration {
        &self.config
    }

    /// Replace the configuration
    pub fn swap(&mut self, config: PolicyConfiguration) {
        self.config = Arc::new(config);
    }

    /// Whether an item may be held or used during a session.
    ///
    /// An item the lists allow is still illegal when it carries
    /// enchantments, a custom name, or lore.
    pub fn is_legal(&self, item: &ItemStack) -> bool {
        let allowed = match self.config.mode {
            RestrictionMode::Blacklist => !self.config.blacklist.contains(&item.item_type),
            RestrictionMode::Whitelist => self.config.whitelist.contains(&item.item_type),
        };

        allowed && !item.has_special_attributes()
    }

    fn is_illegal(&self, item: Option<&ItemStack>) -> bool {
        item.is_some_and(|i| !self.is_legal(i))
    }

    /// Evaluate an action for a user known to be in a session
    pub fn evaluate(&self, action: &ActionKind, item: Option<&ItemStack>) -> ActionVerdict {
        match *action {
            ActionKind::Drop => ActionVerdict::deny(DenyReason::DropForbidden),

            ActionKind::AutomatedTransfer => ActionVerdict::deny(DenyReason::TransferForbidden),

            ActionKind::OpenContainer { container } => {
                if container.is_storage() {
                    ActionVerdict::deny(DenyReason::ContainerForbidden)
                } else {
                    ActionVerdict::Allow
                }
            }

            ActionKind::InventoryClick {
                clicked,
                top,
                shift_click,
            } => {
                if self.is_illegal(item) {
                    // Clicking inside anything but the user's own inventory
                    if !clicked.is_own() {
                        return ActionVerdict::deny(DenyReason::IllegalItem);
                    }
                    // Shift-click out of the player inventory into another view
                    if shift_click && clicked == ContainerKind::Player && top != ContainerKind::Creative
                    {
                        return ActionVerdict::deny(DenyReason::IllegalItem);
                    }
                }

                if clicked.is_storage() {
                    ActionVerdict::deny(DenyReason::ContainerForbidden)
                } else {
                    ActionVerdict::Allow
                }
            }

            ActionKind::Drag { into_container } => {
                if into_container && self.is_illegal(item) {
                    ActionVerdict::deny(DenyReason::IllegalItem)
                } else {
                    ActionVerdict::Allow
                }
            }

            ActionKind::Interact
            | ActionKind::PlaceBlock
            | ActionKind::CreativePick
            | ActionKind::Pickup => {
                if self.is_illegal(item) {
                    ActionVerdict::deny(DenyReason::IllegalItem)
                } else {
                    ActionVerdict::Allow
                }
            }
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConfiguration::default())
    }
}
