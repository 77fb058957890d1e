//! Shared utilities for buildmoded
//!
//! This crate provides:
//! - ID types (UserId, ClientId)
//! - Time utilities (mockable wall clock, epoch-millisecond conversion)
//! - Error types
//! - Default paths for socket, config, and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
