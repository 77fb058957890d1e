//! Core events emitted by the session manager

use buildmode_api::{Effect, RestrictionMode, SessionEndReason};
use buildmode_util::UserId;
use chrono::{DateTime, Local};
use std::time::Duration;

/// Events emitted by the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// Session started successfully
    SessionStarted {
        user_id: UserId,
        /// None means unlimited
        deadline: Option<DateTime<Local>>,
    },

    /// Session ended through `end` or on reconnect after expiry
    SessionEnded {
        user_id: UserId,
        reason: SessionEndReason,
        duration: Duration,
        effects: Vec<Effect>,
    },

    /// Session expired while the user was connected
    SessionExpired {
        user_id: UserId,
        duration: Duration,
        effects: Vec<Effect>,
    },

    /// Session expired while the user was away
    RestoreDeferred {
        user_id: UserId,
        expired_at: DateTime<Local>,
    },

    /// A deferred restore was released on reconnect
    RestoreApplied {
        user_id: UserId,
        effects: Vec<Effect>,
    },

    /// Policy was reloaded
    PolicyReloaded {
        mode: RestrictionMode,
        listed_items: usize,
    },
}
