//! Per-Room Session State
//!
//! Plain data for one room: connected members, collaborator presence and
//! the ordered pages with their content. Locking and broadcast live in the
//! hub; everything here is single-threaded bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::events::CollabEvent;
use super::{ConnectionId, PageId, RoomId, UserId};
use crate::scene::SceneValue;

/// 2D pointer position in scene coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

/// Live presence record of one user
#[derive(Debug, Clone, PartialEq)]
pub struct Collaborator {
    pub user_id: UserId,
    pub username: String,
    /// Connection that announced this user
    pub connection_id: ConnectionId,
    pub pointer: Option<Pointer>,
    pub page_id: Option<PageId>,
}

impl Collaborator {
    pub fn new(
        user_id: impl Into<UserId>,
        username: impl Into<String>,
        connection_id: impl Into<ConnectionId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            connection_id: connection_id.into(),
            pointer: None,
            page_id: None,
        }
    }

    fn join_event(&self) -> CollabEvent {
        CollabEvent::CollaboratorJoin {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            pointer: self.pointer,
        }
    }
}

/// Named unit of scene content
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: PageId,
    pub name: String,
    pub content: SceneValue,
}

impl Page {
    pub fn new(id: impl Into<PageId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: SceneValue::empty(),
        }
    }
}

/// Point-in-time description of a room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub members: usize,
    pub collaborators: usize,
    pub pages: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Mutable state of one room
#[derive(Debug)]
pub struct Session {
    room_id: RoomId,
    members: Vec<ConnectionId>,
    collaborators: BTreeMap<UserId, Collaborator>,
    pages: Vec<Page>,
    created_at: DateTime<Utc>,
    /// Set once the room has been torn down and removed from the hub table
    closed: bool,
}

impl Session {
    pub fn new(room_id: impl Into<RoomId>) -> Self {
        Self {
            room_id: room_id.into(),
            members: Vec::new(),
            collaborators: BTreeMap::new(),
            pages: Vec::new(),
            created_at: Utc::now(),
            closed: false,
        }
    }

    // ---------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------

    pub fn is_member(&self, connection_id: &str) -> bool {
        self.members.iter().any(|m| m == connection_id)
    }

    /// Append a member; returns false if it was already present
    pub fn add_member(&mut self, connection_id: &str) -> bool {
        if self.is_member(connection_id) {
            return false;
        }
        self.members.push(connection_id.to_string());
        true
    }

    pub fn remove_member(&mut self, connection_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != connection_id);
        self.members.len() != before
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Every member except `connection_id`, in join order
    pub fn others(&self, connection_id: &str) -> impl Iterator<Item = &ConnectionId> + '_ {
        let excluded = connection_id.to_string();
        self.members.iter().filter(move |m| **m != excluded)
    }

    // ---------------------------------------------------------------
    // Presence
    // ---------------------------------------------------------------

    /// Insert or overwrite the collaborator keyed by its user id
    pub fn upsert_collaborator(&mut self, collaborator: Collaborator) {
        self.collaborators
            .insert(collaborator.user_id.clone(), collaborator);
    }

    pub fn collaborator(&self, user_id: &str) -> Option<&Collaborator> {
        self.collaborators.get(user_id)
    }

    pub fn collaborator_count(&self) -> usize {
        self.collaborators.len()
    }

    /// Record pointer and current page; returns false for unknown users
    pub fn update_pointer(
        &mut self,
        user_id: &str,
        pointer: Option<Pointer>,
        page_id: Option<PageId>,
    ) -> bool {
        match self.collaborators.get_mut(user_id) {
            Some(collaborator) => {
                collaborator.pointer = pointer;
                collaborator.page_id = page_id;
                true
            }
            None => false,
        }
    }

    /// Drop the collaborators announced by a connection, returning their user ids
    pub fn remove_collaborators_of(&mut self, connection_id: &str) -> Vec<UserId> {
        let owned: Vec<UserId> = self
            .collaborators
            .values()
            .filter(|c| c.connection_id == connection_id)
            .map(|c| c.user_id.clone())
            .collect();

        for user_id in &owned {
            self.collaborators.remove(user_id);
        }
        owned
    }

    // ---------------------------------------------------------------
    // Pages
    // ---------------------------------------------------------------

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    pub fn page_mut(&mut self, page_id: &str) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.id == page_id)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Append a page with empty content. Callers check the id is unused.
    pub fn create_page(&mut self, page_id: &str, name: &str) {
        self.pages.push(Page::new(page_id, name));
    }

    /// Rename a page; returns false for unknown ids
    pub fn rename_page(&mut self, page_id: &str, name: &str) -> bool {
        match self.page_mut(page_id) {
            Some(page) => {
                page.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_page(&mut self, page_id: &str) -> Option<Page> {
        let index = self.pages.iter().position(|p| p.id == page_id)?;
        Some(self.pages.remove(index))
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Events that bring a newly joined connection up to date.
    ///
    /// Every page as page-update then scene-update, followed by every
    /// collaborator as collaborator-join.
    pub fn replay(&self) -> Vec<CollabEvent> {
        let mut events = Vec::with_capacity(self.pages.len() * 2 + self.collaborators.len());

        for page in &self.pages {
            events.push(CollabEvent::PageUpdate {
                sketch_id: page.id.clone(),
                page_name: Some(page.name.clone()),
            });
            events.push(CollabEvent::SceneUpdate {
                sketch_id: page.id.clone(),
                sketch_data: page.content.clone(),
            });
        }

        events.extend(self.collaborators.values().map(Collaborator::join_event));
        events
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            members: self.members.len(),
            collaborators: self.collaborator_count(),
            pages: self.pages.iter().map(|p| p.id.clone()).collect(),
            created_at: self.created_at,
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
