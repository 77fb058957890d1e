//! Command types for the buildmoded protocol

use buildmode_util::{ClientId, UserId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    ActionKind, ActionVerdict, ClientRole, Effect, GameMode, HealthStatus, InventorySnapshot,
    ItemStack, PendingRestoreInfo, SessionInfo, UserStatus, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// Seconds until the user may start again, for `OnCooldown`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_seconds: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    AlreadyActive,
    NotActive,
    OnCooldown,
    UnlimitedSession,
    RestorePending,
    NoPendingRestore,
    PermissionDenied,
    ConfigError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Begin a build session. The caller reports the user's current state.
    Start {
        user_id: UserId,
        mode: GameMode,
        inventory: InventorySnapshot,
        /// Privileged users get an unlimited session
        #[serde(default)]
        privileged: bool,
    },

    /// End the user's session
    End { user_id: UserId },

    /// Active / remaining / cooldown answer for one user
    GetStatus { user_id: UserId },

    /// All active sessions, ordered by user
    ListActive,

    /// Ask whether a restricted action may proceed
    EvaluateAction {
        user_id: UserId,
        action: ActionKind,
        #[serde(default)]
        item: Option<ItemStack>,
    },

    /// The user joined the host
    UserConnected { user_id: UserId },

    /// The user left the host
    UserDisconnected { user_id: UserId },

    /// Every user currently on the host. Replaces what the service knows
    /// about presence; sent when a host (re)connects to the service.
    SyncPresence { users: Vec<UserId> },

    /// The host applied the restore effects for `user_id`
    AcknowledgeRestore { user_id: UserId },

    /// Restores the host has not yet acknowledged, ordered by user
    ListPendingRestores,

    /// Reload configuration
    ReloadConfig,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    // Admin commands

    /// Extend a timed session (admin only)
    Extend { user_id: UserId, by: Duration },

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Started {
        session: SessionInfo,
        effects: Vec<Effect>,
    },
    Ended {
        effects: Vec<Effect>,
    },
    Status(UserStatus),
    ActiveSessions(Vec<SessionInfo>),
    Verdict(ActionVerdict),
    /// Effects to apply on join, possibly empty
    Reconnected {
        effects: Vec<Effect>,
    },
    Disconnected,
    PresenceSynced {
        online: usize,
    },
    RestoreAcknowledged,
    PendingRestores(Vec<PendingRestoreInfo>),
    ConfigReloaded,
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Extended {
        new_deadline: DateTime<Local>,
    },
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
