//! WebSocket Message Types
//!
//! Defines the frames exchanged between sketch clients and the hub.
//! Every frame is a JSON object with an `action` discriminator.

use serde::{Deserialize, Serialize};

use crate::scene::SceneValue;
use crate::session::{CollabEvent, PageId, Pointer, UserId};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Partial scene content for a page
    SceneUpdate {
        #[serde(rename = "sketchID")]
        sketch_id: PageId,
        #[serde(rename = "sketchData")]
        sketch_data: SceneValue,
    },
    /// Create, rename or (with a null name) delete a page
    PageUpdate {
        #[serde(rename = "sketchID")]
        sketch_id: PageId,
        #[serde(rename = "pageName", default)]
        page_name: Option<String>,
    },
    /// Announce the user behind this connection
    CollaboratorJoin {
        #[serde(rename = "userID")]
        user_id: UserId,
        username: String,
    },
    /// Cursor movement
    CollaboratorPointer {
        #[serde(rename = "userID")]
        user_id: UserId,
        #[serde(default)]
        pointer: Option<Pointer>,
        #[serde(rename = "pageID", default)]
        page_id: Option<PageId>,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Collaboration event produced by the hub
    Event(CollabEvent),
    /// The connection's own frame was rejected
    Error(ErrorFrame),
}

/// Error report for the connection that caused it
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename = "error")]
pub struct ErrorFrame {
    /// Error description
    pub message: String,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorFrame {
            message: message.into(),
        })
    }
}

impl From<CollabEvent> for ServerMessage {
    fn from(event: CollabEvent) -> Self {
        ServerMessage::Event(event)
    }
}
