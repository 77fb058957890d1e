//! Mock host adapter for testing

use async_trait::async_trait;
use buildmode_api::{GameMode, InventorySnapshot, ItemStack, STORAGE_SLOTS};
use buildmode_util::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{HostAdapter, HostError, HostResult};

/// Mock player state for testing
#[derive(Debug, Clone)]
pub struct MockPlayer {
    pub mode: GameMode,
    pub inventory: InventorySnapshot,
    pub connected: bool,
}

/// Mock host adapter for unit/integration testing
pub struct MockHost {
    players: Arc<Mutex<HashMap<UserId, MockPlayer>>>,

    /// Configure every mutating call to fail
    pub fail_writes: Arc<Mutex<bool>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            players: Arc::new(Mutex::new(HashMap::new())),
            fail_writes: Arc::new(Mutex::new(false)),
        }
    }

    /// Add (or re-add) a connected player with the given state
    pub fn connect(&self, user: UserId, mode: GameMode, inventory: InventorySnapshot) {
        self.players.lock().unwrap().insert(
            user,
            MockPlayer {
                mode,
                inventory,
                connected: true,
            },
        );
    }

    /// Mark a player offline, keeping their state
    pub fn disconnect(&self, user: UserId) {
        if let Some(player) = self.players.lock().unwrap().get_mut(&user) {
            player.connected = false;
        }
    }

    /// Bring an offline player back with the state they left with
    pub fn reconnect(&self, user: UserId) {
        if let Some(player) = self.players.lock().unwrap().get_mut(&user) {
            player.connected = true;
        }
    }

    pub fn player(&self, user: UserId) -> Option<MockPlayer> {
        self.players.lock().unwrap().get(&user).cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    fn read<T>(&self, user: UserId, f: impl FnOnce(&MockPlayer) -> T) -> HostResult<T> {
        let players = self.players.lock().unwrap();
        match players.get(&user) {
            Some(player) if player.connected => Ok(f(player)),
            _ => Err(HostError::NotConnected(user)),
        }
    }

    fn write(
        &self,
        user: UserId,
        f: impl FnOnce(&mut MockPlayer) -> HostResult<()>,
    ) -> HostResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(HostError::Rejected("Mock write failure".into()));
        }

        let mut players = self.players.lock().unwrap();
        match players.get_mut(&user) {
            Some(player) if player.connected => f(player),
            _ => Err(HostError::NotConnected(user)),
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostAdapter for MockHost {
    async fn game_mode(&self, user: UserId) -> HostResult<GameMode> {
        self.read(user, |p| p.mode)
    }

    async fn set_game_mode(&self, user: UserId, mode: GameMode) -> HostResult<()> {
        self.write(user, |p| {
            p.mode = mode;
            Ok(())
        })
    }

    async fn inventory(&self, user: UserId) -> HostResult<InventorySnapshot> {
        self.read(user, |p| p.inventory.clone())
    }

    async fn set_inventory(&self, user: UserId, inventory: &InventorySnapshot) -> HostResult<()> {
        self.write(user, |p| {
            p.inventory = inventory.clone();
            Ok(())
        })
    }

    async fn clear_inventory(&self, user: UserId) -> HostResult<()> {
        self.write(user, |p| {
            p.inventory = InventorySnapshot::empty();
            Ok(())
        })
    }

    async fn is_connected(&self, user: UserId) -> bool {
        self.read(user, |_| ()).is_ok()
    }

    async fn grant_item(&self, user: UserId, item: &ItemStack) -> HostResult<()> {
        self.write(user, |p| {
            if p.inventory.storage.len() < STORAGE_SLOTS {
                p.inventory.storage.resize(STORAGE_SLOTS, None);
            }
            match p.inventory.storage.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => {
                    *slot = Some(item.clone());
                    Ok(())
                }
                None => Err(HostError::Rejected("Inventory full".into())),
            }
        })
    }
}
