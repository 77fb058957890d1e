//! Session state and policy evaluation for buildmoded
//!
//! This crate holds the rules of the service:
//! - Session lifecycle (start, end, expiry, restores held until confirmed)
//! - Per-user cooldowns
//! - Item and action restrictions while a session is active
//!
//! Nothing here reads the clock or talks to the host. Callers pass `now`
//! and apply the returned [`Effect`](buildmode_api::Effect) lists.

mod events;
mod manager;
mod policy;
mod session;
mod store;

pub use events::*;
pub use manager::*;
pub use policy::*;
pub use session::*;
pub use store::*;

use std::time::Duration;
use thiserror::Error;

/// Why a session operation was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("user already has an active session")]
    AlreadyActive,

    #[error("user has no active session")]
    NotActive,

    #[error("user is on cooldown for another {}s", remaining.as_secs())]
    OnCooldown { remaining: Duration },

    #[error("session is unlimited")]
    UnlimitedSession,

    #[error("user's previous session has not been restored yet")]
    RestorePending,

    #[error("no restore is pending for user")]
    NoPendingRestore,

    #[error("session deadline out of range")]
    DeadlineOverflow,
}
