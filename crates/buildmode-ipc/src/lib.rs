//! IPC layer for buildmoded
//!
//! One JSON object per line over a Unix domain socket. Each connection is
//! assigned a role from its peer UID; requests are forwarded to the service
//! loop and events fan out to subscribed clients.

mod client;
mod server;

pub use client::*;
pub use server::*;

use buildmode_api::ErrorInfo;
use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request rejected ({:?}): {}", .0.code, .0.message)]
    Rejected(ErrorInfo),
}

pub type IpcResult<T> = Result<T, IpcError>;
