//! Event types for buildmoded -> client streaming

use buildmode_util::UserId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Effect, RestrictionMode, SessionEndReason, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: buildmode_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Session has started
    SessionStarted {
        user_id: UserId,
        /// Deadline for session. None means unlimited.
        deadline: Option<DateTime<Local>>,
    },

    /// Session was ended on request
    SessionEnded {
        user_id: UserId,
        reason: SessionEndReason,
        duration: Duration,
        effects: Vec<Effect>,
    },

    /// Session expired while the user was connected. The host applies the
    /// effects, then confirms with `AcknowledgeRestore`.
    SessionExpired {
        user_id: UserId,
        duration: Duration,
        effects: Vec<Effect>,
    },

    /// Session expired while the user was away; restore waits for reconnect
    RestoreDeferred {
        user_id: UserId,
        expired_at: DateTime<Local>,
    },

    /// A deferred restore was handed to the host on reconnect
    RestoreApplied {
        user_id: UserId,
        effects: Vec<Effect>,
    },

    /// Policy was reloaded
    PolicyReloaded {
        mode: RestrictionMode,
        listed_items: usize,
    },

    /// This subscriber fell behind and `skipped` events were dropped.
    /// Restores it missed are still listed by `ListPendingRestores`.
    EventsDropped { skipped: u64 },

    /// Service is shutting down. A host that reconnects should send
    /// `SyncPresence` before anything else.
    Shutdown,
}
