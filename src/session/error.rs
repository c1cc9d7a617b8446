//! Hub error types

use thiserror::Error;

/// Errors returned by hub handlers.
///
/// None of these are fatal; the connection handler reports them to the
/// offending connection and keeps serving.
#[derive(Error, Debug)]
pub enum HubError {
    /// Update handler called for a connection that has not joined the room
    #[error("Connection {connection} has not joined room {room}")]
    NotJoined { connection: String, room: String },

    /// Second join for the same connection
    #[error("Connection {connection} already joined room {room}")]
    AlreadyJoined { connection: String, room: String },

    /// Member limit reached
    #[error("Room {room} is full (limit: {limit})")]
    RoomFull { room: String, limit: usize },

    /// A room or table lock was poisoned by a panicking handler
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;
