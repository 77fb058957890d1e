//! Host adapter trait interfaces for buildmoded
//!
//! This crate defines the interface between the session core and the game
//! server integration that actually changes modes and inventories. It
//! contains no server code itself; the core only produces effect lists
//! and [`apply_effects`] replays them through a [`HostAdapter`].

mod effects;
mod mock;
mod traits;

pub use effects::*;
pub use mock::*;
pub use traits::*;
