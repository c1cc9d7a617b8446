//! Outbound Collaboration Events
//!
//! Events the hub emits towards connections. Each serializes to a JSON record
//! with an `action` discriminator and the camel-cased field names clients use.

use serde::Serialize;

use super::room::Pointer;
use super::{PageId, UserId};
use crate::scene::SceneValue;

/// Event delivered to a single connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CollabEvent {
    /// Partial scene content for a page
    SceneUpdate {
        #[serde(rename = "sketchID")]
        sketch_id: PageId,
        /// The diff as sent by the originator, not the merged result
        #[serde(rename = "sketchData")]
        sketch_data: SceneValue,
    },
    /// Page created or renamed; a null name means the page was removed
    PageUpdate {
        #[serde(rename = "sketchID")]
        sketch_id: PageId,
        #[serde(rename = "pageName")]
        page_name: Option<String>,
    },
    /// A collaborator announced itself
    CollaboratorJoin {
        #[serde(rename = "userID")]
        user_id: UserId,
        username: String,
        pointer: Option<Pointer>,
    },
    /// A collaborator's connection went away
    CollaboratorLeave {
        #[serde(rename = "userID")]
        user_id: UserId,
    },
    /// Cursor movement
    CollaboratorPointer {
        #[serde(rename = "userID")]
        user_id: UserId,
        pointer: Option<Pointer>,
        #[serde(rename = "pageID")]
        page_id: Option<PageId>,
    },
}

impl CollabEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            CollabEvent::SceneUpdate { .. } => "scene_update",
            CollabEvent::PageUpdate { .. } => "page_update",
            CollabEvent::CollaboratorJoin { .. } => "collaborator_join",
            CollabEvent::CollaboratorLeave { .. } => "collaborator_leave",
            CollabEvent::CollaboratorPointer { .. } => "collaborator_pointer",
        }
    }
}
