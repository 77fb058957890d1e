//! Store trait definitions

use buildmode_api::{GameMode, InventorySnapshot};
use buildmode_util::UserId;
use chrono::{DateTime, Local};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Session state

    /// Replace every persisted session, cooldown and pending restore with
    /// `state`, in one transaction
    fn save_state(&self, state: &PersistedState) -> StoreResult<()>;

    /// Load everything written by the last [`Store::save_state`].
    ///
    /// Rows that cannot be decoded are skipped with a warning.
    fn load_state(&self) -> StoreResult<PersistedState>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Everything that must survive a restart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub sessions: Vec<SessionRecord>,
    pub cooldowns: Vec<CooldownRecord>,
    pub pending_restores: Vec<PendingRestoreRecord>,
}

impl PersistedState {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.cooldowns.is_empty() && self.pending_restores.is_empty()
    }
}

/// An active session as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub started_at: DateTime<Local>,
    /// None means unlimited
    pub deadline: Option<DateTime<Local>>,
    pub prior_mode: GameMode,
    pub saved_inventory: InventorySnapshot,
}

/// Last session end for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownRecord {
    pub user_id: UserId,
    pub last_end: DateTime<Local>,
}

/// A restore waiting for the user to reconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRestoreRecord {
    pub user_id: UserId,
    pub expired_at: DateTime<Local>,
    pub prior_mode: GameMode,
    pub saved_inventory: InventorySnapshot,
}
