//! Protocol types for buildmoded
//!
//! This crate defines the stable API between buildmoded and its clients
//! (the host integration and display layers):
//! - Domain values: game modes, item stacks, inventory snapshots, effects
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod items;
mod types;

pub use commands::*;
pub use events::*;
pub use items::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
