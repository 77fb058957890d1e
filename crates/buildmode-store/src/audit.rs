//! Audit event types

use buildmode_api::{RestrictionMode, SessionEndReason};
use buildmode_util::UserId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Policy loaded/reloaded
    PolicyLoaded {
        mode: RestrictionMode,
        listed_items: usize,
    },

    /// Session started
    SessionStarted {
        user_id: UserId,
        /// None means unlimited
        deadline: Option<DateTime<Local>>,
        privileged: bool,
    },

    /// Start refused (already active, cooling down)
    StartDenied { user_id: UserId, reason: String },

    /// Session ended
    SessionEnded {
        user_id: UserId,
        reason: SessionEndReason,
        duration: Duration,
    },

    /// Session extended (admin action)
    SessionExtended {
        user_id: UserId,
        extended_by: Duration,
        new_deadline: DateTime<Local>,
    },

    /// Session expired while the user was offline
    RestoreDeferred { user_id: UserId },

    /// Deferred restore handed to the host on reconnect
    RestoreApplied { user_id: UserId },

    /// Config reload requested
    ConfigReloaded { success: bool },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: buildmode_util::now(),
            event,
        }
    }
}
