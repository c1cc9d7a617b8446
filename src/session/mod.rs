//! Collaboration Sessions
//!
//! Shared per-room state and the hub that mutates it.
//!
//! ## Architecture
//!
//! - **CollabHub**: owns the room table, runs the six handlers, fans out events
//! - **Session**: members, collaborators and pages of one room
//! - **MessageBus**: delivery capability injected into the hub
//! - **CollabEvent**: outbound event records
//!
//! Connection handlers call the hub with plain identifiers and scene values;
//! the hub answers through the bus, never by return value.

mod bus;
mod error;
mod events;
mod hub;
mod room;

pub use bus::{BusError, MessageBus};
pub use error::{HubError, HubResult};
pub use events::CollabEvent;
pub use hub::{CollabHub, HubConfig};
pub use room::{Collaborator, Page, Pointer, RoomSummary, Session};

/// Opaque identifier of a room
pub type RoomId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Identifier a client chose for its user
pub type UserId = String;

/// Identifier of a page (the wire calls it `sketchID`)
pub type PageId = String;
