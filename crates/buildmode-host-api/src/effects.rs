//! Applying core effects to a host

use buildmode_api::{Effect, ItemStack};
use buildmode_util::UserId;
use tracing::{debug, warn};

use crate::{HostAdapter, HostResult};

/// Apply `effects` to `user` in order.
///
/// Stops at the first failure; effects after it are not applied.
pub async fn apply_effects(
    host: &dyn HostAdapter,
    user: UserId,
    effects: &[Effect],
) -> HostResult<()> {
    for (index, effect) in effects.iter().enumerate() {
        let result = match effect {
            Effect::ClearInventory => host.clear_inventory(user).await,
            Effect::SetGameMode { mode } => host.set_game_mode(user, *mode).await,
            Effect::RestoreInventory { snapshot } => host.set_inventory(user, snapshot).await,
            Effect::GrantItem { item_type, amount } => {
                host.grant_item(user, &ItemStack::new(item_type.clone(), *amount))
                    .await
            }
        };

        if let Err(e) = result {
            warn!(
                user_id = %user,
                effect_index = index,
                remaining = effects.len() - index - 1,
                error = %e,
                "Failed to apply effect"
            );
            return Err(e);
        }
    }

    debug!(user_id = %user, count = effects.len(), "Effects applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockHost;
    use buildmode_api::{GameMode, InventorySnapshot, ItemType};

    fn stack(name: &str, amount: u32) -> ItemStack {
        ItemStack::new(ItemType::parse(name).unwrap(), amount)
    }

    #[tokio::test]
    async fn applies_effects_in_order() {
        let host = MockHost::new();
        let user = UserId::new();
        let mut inv = InventorySnapshot::empty();
        inv.storage[0] = Some(stack("DIAMOND", 5));
        host.connect(user, GameMode::Survival, inv.clone());

        let effects = vec![
            Effect::ClearInventory,
            Effect::SetGameMode {
                mode: GameMode::Creative,
            },
            Effect::GrantItem {
                item_type: ItemType::parse("WOODEN_AXE").unwrap(),
                amount: 1,
            },
        ];
        apply_effects(&host, user, &effects).await.unwrap();

        let player = host.player(user).unwrap();
        assert_eq!(player.mode, GameMode::Creative);
        assert_eq!(player.inventory.item_count(), 1);
        assert_eq!(
            player.inventory.storage[0].as_ref().unwrap().item_type.as_str(),
            "WOODEN_AXE"
        );

        let restore = vec![
            Effect::ClearInventory,
            Effect::RestoreInventory { snapshot: inv.clone() },
            Effect::SetGameMode {
                mode: GameMode::Survival,
            },
        ];
        apply_effects(&host, user, &restore).await.unwrap();

        let player = host.player(user).unwrap();
        assert_eq!(player.mode, GameMode::Survival);
        assert_eq!(player.inventory, inv);
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let host = MockHost::new();
        let user = UserId::new();
        host.connect(user, GameMode::Survival, InventorySnapshot::empty());
        host.set_fail_writes(true);

        let effects = vec![
            Effect::ClearInventory,
            Effect::SetGameMode {
                mode: GameMode::Creative,
            },
        ];
        assert!(apply_effects(&host, user, &effects).await.is_err());
        assert_eq!(host.player(user).unwrap().mode, GameMode::Survival);
    }

    #[tokio::test]
    async fn offline_user_fails() {
        let host = MockHost::new();
        let result = apply_effects(&host, UserId::new(), &[Effect::ClearInventory]).await;
        assert!(matches!(result, Err(crate::HostError::NotConnected(_))));
    }
}
