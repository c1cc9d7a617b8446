//! Message Delivery
//!
//! The hub never talks to sockets. It hands each outbound event to a
//! [`MessageBus`], which knows how to reach a connection by its id.

use thiserror::Error;

use super::events::CollabEvent;

/// Delivers an event to one connection.
///
/// Delivery is best-effort. Implementations must not block on network I/O;
/// queue the event and return.
pub trait MessageBus: Send + Sync {
    fn send(&self, target: &str, event: CollabEvent) -> Result<(), BusError>;
}

/// Errors that can occur while delivering to a connection
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Failed to send message to {0}")]
    SendFailed(String),

    #[error("Lock error: {0}")]
    Lock(String),
}
