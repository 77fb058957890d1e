//! Session values

use buildmode_api::{Effect, GameMode, InventorySnapshot, SessionInfo};
use buildmode_store::{PendingRestoreRecord, SessionRecord};
use buildmode_util::{checked_add, saturating_elapsed, UserId};
use chrono::{DateTime, Local};
use std::time::Duration;

/// How long a session may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLength {
    Timed(Duration),
    /// Privileged sessions never expire
    Unlimited,
}

/// An active build session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub started_at: DateTime<Local>,
    /// None means unlimited
    pub deadline: Option<DateTime<Local>>,
    /// Mode immediately before the session started
    pub prior_mode: GameMode,
    /// Holdings captured at start
    pub saved_inventory: InventorySnapshot,
}

impl Session {
    /// Create a session starting at `now`.
    ///
    /// Returns `None` if a timed deadline is not representable.
    pub fn new(
        user_id: UserId,
        length: SessionLength,
        prior_mode: GameMode,
        saved_inventory: InventorySnapshot,
        now: DateTime<Local>,
    ) -> Option<Self> {
        let deadline = match length {
            SessionLength::Timed(d) => Some(checked_add(now, d)?),
            SessionLength::Unlimited => None,
        };

        Some(Self {
            user_id,
            started_at: now,
            deadline,
            prior_mode,
            saved_inventory,
        })
    }

    pub fn length(&self) -> SessionLength {
        match self.deadline {
            Some(deadline) => SessionLength::Timed(saturating_elapsed(deadline, self.started_at)),
            None => SessionLength::Unlimited,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.deadline.is_none()
    }

    /// Time left before the deadline, zero once passed. None means unlimited.
    pub fn time_remaining(&self, now: DateTime<Local>) -> Option<Duration> {
        self.deadline.map(|d| saturating_elapsed(d, now))
    }

    /// Never true for unlimited sessions
    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn duration_so_far(&self, now: DateTime<Local>) -> Duration {
        saturating_elapsed(now, self.started_at)
    }

    /// Effects that put the user back the way they were
    pub fn restore_effects(&self) -> Vec<Effect> {
        restore_effects(self.prior_mode, &self.saved_inventory)
    }

    pub fn to_session_info(&self, now: DateTime<Local>) -> SessionInfo {
        SessionInfo {
            user_id: self.user_id,
            started_at: self.started_at,
            deadline: self.deadline,
            remaining_seconds: self.time_remaining(now).map(|d| d.as_secs()),
        }
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            user_id: self.user_id,
            started_at: self.started_at,
            deadline: self.deadline,
            prior_mode: self.prior_mode,
            saved_inventory: self.saved_inventory.clone(),
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            user_id: record.user_id,
            started_at: record.started_at,
            deadline: record.deadline,
            prior_mode: record.prior_mode,
            saved_inventory: record.saved_inventory,
        }
    }
}

/// A restore held back because the user was away when their session expired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRestore {
    pub user_id: UserId,
    pub expired_at: DateTime<Local>,
    pub prior_mode: GameMode,
    pub saved_inventory: InventorySnapshot,
}

impl PendingRestore {
    pub fn from_session(session: Session, expired_at: DateTime<Local>) -> Self {
        Self {
            user_id: session.user_id,
            expired_at,
            prior_mode: session.prior_mode,
            saved_inventory: session.saved_inventory,
        }
    }

    pub fn restore_effects(&self) -> Vec<Effect> {
        restore_effects(self.prior_mode, &self.saved_inventory)
    }

    pub fn to_record(&self) -> PendingRestoreRecord {
        PendingRestoreRecord {
            user_id: self.user_id,
            expired_at: self.expired_at,
            prior_mode: self.prior_mode,
            saved_inventory: self.saved_inventory.clone(),
        }
    }
}

impl From<PendingRestoreRecord> for PendingRestore {
    fn from(record: PendingRestoreRecord) -> Self {
        Self {
            user_id: record.user_id,
            expired_at: record.expired_at,
            prior_mode: record.prior_mode,
            saved_inventory: record.saved_inventory,
        }
    }
}

/// Mode to return to after a session. Never hands the elevated mode back.
pub fn restore_mode(prior: GameMode) -> GameMode {
    if prior == GameMode::ELEVATED {
        GameMode::BASELINE
    } else {
        prior
    }
}

/// Clear, put the saved holdings back, then restore the mode
pub fn restore_effects(prior_mode: GameMode, saved: &InventorySnapshot) -> Vec<Effect> {
    vec![
        Effect::ClearInventory,
        Effect::RestoreInventory {
            snapshot: saved.clone(),
        },
        Effect::SetGameMode {
            mode: restore_mode(prior_mode),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(minutes: u64, now: DateTime<Local>) -> Session {
        Session::new(
            UserId::new(),
            SessionLength::Timed(Duration::from_secs(minutes * 60)),
            GameMode::Survival,
            InventorySnapshot::empty(),
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_remaining_time() {
        let now = buildmode_util::now();
        let session = timed(60, now);

        assert_eq!(
            session.time_remaining(now),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            session.time_remaining(now + chrono::Duration::minutes(45)),
            Some(Duration::from_secs(900))
        );
        // Clamped at zero, never negative
        assert_eq!(
            session.time_remaining(now + chrono::Duration::minutes(61)),
            Some(Duration::ZERO)
        );
        assert_eq!(session.length(), SessionLength::Timed(Duration::from_secs(3600)));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = buildmode_util::now();
        let session = timed(1, now);

        assert!(!session.is_expired(now + chrono::Duration::seconds(59)));
        assert!(session.is_expired(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_unlimited_session() {
        let now = buildmode_util::now();
        let session = Session::new(
            UserId::new(),
            SessionLength::Unlimited,
            GameMode::Survival,
            InventorySnapshot::empty(),
            now,
        )
        .unwrap();

        assert!(session.is_unlimited());
        assert!(session.deadline.is_none());
        assert!(session.time_remaining(now).is_none());
        assert!(!session.is_expired(now + chrono::Duration::days(3650)));
        assert_eq!(session.to_session_info(now).remaining_seconds, None);
    }

    #[test]
    fn test_restore_mode_never_elevated() {
        assert_eq!(restore_mode(GameMode::Creative), GameMode::Survival);
        assert_eq!(restore_mode(GameMode::Adventure), GameMode::Adventure);
        assert_eq!(restore_mode(GameMode::Spectator), GameMode::Spectator);
    }

    #[test]
    fn test_restore_effects_order() {
        let now = buildmode_util::now();
        let mut session = timed(10, now);
        session.prior_mode = GameMode::Creative;

        let effects = session.restore_effects();
        assert_eq!(effects.len(), 3);
        assert_eq!(effects[0], Effect::ClearInventory);
        assert!(matches!(effects[1], Effect::RestoreInventory { .. }));
        assert_eq!(
            effects[2],
            Effect::SetGameMode {
                mode: GameMode::Survival
            }
        );
    }

    #[test]
    fn test_record_conversion() {
        let now = buildmode_util::now();
        let session = timed(30, now);
        let back = Session::from(session.to_record());
        assert_eq!(back, session);

        let pending = PendingRestore::from_session(session, now);
        assert_eq!(PendingRestore::from(pending.to_record()), pending);
    }
}
