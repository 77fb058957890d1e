//! Host adapter traits

use async_trait::async_trait;
use buildmode_api::{GameMode, InventorySnapshot, ItemStack};
use buildmode_util::UserId;
use thiserror::Error;

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("User {0} is not connected")]
    NotConnected(UserId),

    #[error("Host rejected the change: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Host adapter trait - implemented by the game server integration.
///
/// Every mutating call targets a single user and must be applied before
/// it returns, so a list of effects can be replayed in order.
#[async_trait]
pub trait HostAdapter: Send + Sync {
    /// Current mode of a connected user
    async fn game_mode(&self, user: UserId) -> HostResult<GameMode>;

    async fn set_game_mode(&self, user: UserId, mode: GameMode) -> HostResult<()>;

    /// Full holdings of a connected user
    async fn inventory(&self, user: UserId) -> HostResult<InventorySnapshot>;

    /// Overwrite storage, armour, and off-hand slots
    async fn set_inventory(&self, user: UserId, inventory: &InventorySnapshot) -> HostResult<()>;

    async fn clear_inventory(&self, user: UserId) -> HostResult<()>;

    /// Whether the user is currently reachable
    async fn is_connected(&self, user: UserId) -> bool;

    /// Add an item to the user's inventory
    async fn grant_item(&self, user: UserId, item: &ItemStack) -> HostResult<()>;

    /// Optional: check if the host adapter is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Read the state a session start needs: mode, then inventory
pub async fn capture_state(
    host: &dyn HostAdapter,
    user: UserId,
) -> HostResult<(GameMode, InventorySnapshot)> {
    let mode = host.game_mode(user).await?;
    let inventory = host.inventory(user).await?;
    Ok((mode, inventory))
}
