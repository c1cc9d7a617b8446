//! Collaboration Hub
//!
//! Owns every room's [`Session`] and applies the lifecycle and update
//! handlers called by connection handlers.
//!
//! ## Locking
//!
//! The room table is an `RwLock<HashMap<RoomId, Arc<Mutex<Session>>>>`. The
//! table lock is held only to look up, insert or remove an entry; all session
//! work happens under that room's own mutex, so handlers for different rooms
//! never wait on each other. Events are handed to the [`MessageBus`] before the
//! session lock is released, so every member receives them in the order the
//! session changed. Bus implementations only queue and never wait on sockets.
//!
//! A session removed from the table is marked closed under its own lock. A
//! handler that wins the lock of a closed session resolves the room again,
//! which recreates it for joins and rejects updates.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use super::bus::MessageBus;
use super::error::{HubError, HubResult};
use super::events::CollabEvent;
use super::room::{Collaborator, Pointer, RoomSummary, Session};
use super::{ConnectionId, PageId, RoomId};
use crate::scene::{merge, SceneValue};

type SessionHandle = Arc<Mutex<Session>>;

/// Events addressed to individual connections, produced under a session lock
type Outbox = Vec<(ConnectionId, CollabEvent)>;

/// Configuration for the collaboration hub
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Maximum number of concurrent connections across all rooms
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum number of members in a single room
    #[serde(default = "default_max_members_per_room")]
    pub max_members_per_room: usize,
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_members_per_room() -> usize {
    100
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_members_per_room: default_max_members_per_room(),
        }
    }
}

/// How a handler resolves its room
#[derive(Debug, Clone, Copy)]
enum Resolve {
    /// Create the session if the room does not exist
    OpenOrCreate,
    /// The caller must already be a member of an existing session
    Existing,
}

/// Process-wide authority over all rooms
pub struct CollabHub {
    /// Live rooms: RoomId → Session
    rooms: RwLock<HashMap<RoomId, SessionHandle>>,
    /// Delivery of events to connections
    bus: Arc<dyn MessageBus>,
    config: HubConfig,
}

impl CollabHub {
    /// Create a hub delivering through `bus`
    pub fn new(bus: Arc<dyn MessageBus>, config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            bus,
            config,
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle handlers
    // ---------------------------------------------------------------

    /// Join `connection_id` to `room_id`, creating the room if needed.
    ///
    /// The joiner receives the current pages (page-update then scene-update
    /// for each) followed by the known collaborators. Nobody else is notified.
    pub fn on_new_connection(&self, connection_id: &str, room_id: &str) -> HubResult<()> {
        self.with_session(connection_id, room_id, Resolve::OpenOrCreate, |session| {
            if session.is_member(connection_id) {
                return Err(HubError::AlreadyJoined {
                    connection: connection_id.to_string(),
                    room: room_id.to_string(),
                });
            }
            if session.member_count() >= self.config.max_members_per_room {
                return Err(HubError::RoomFull {
                    room: room_id.to_string(),
                    limit: self.config.max_members_per_room,
                });
            }

            session.add_member(connection_id);

            tracing::info!(
                connection_id = %connection_id,
                room_id = %room_id,
                members = session.member_count(),
                pages = session.pages().len(),
                "Connection joined room"
            );

            Ok(session
                .replay()
                .into_iter()
                .map(|event| (connection_id.to_string(), event))
                .collect::<Outbox>())
        })
    }

    /// Remove `connection_id` from `room_id`.
    ///
    /// Collaborators announced by the connection are dropped and their
    /// departure is broadcast. The room is destroyed with its last member.
    pub fn on_connection_end(&self, connection_id: &str, room_id: &str) -> HubResult<()> {
        self.with_session(connection_id, room_id, Resolve::Existing, |session| {
            session.remove_member(connection_id);
            let departed = session.remove_collaborators_of(connection_id);

            tracing::info!(
                connection_id = %connection_id,
                room_id = %room_id,
                members = session.member_count(),
                "Connection left room"
            );

            let mut outbox = Outbox::new();
            for user_id in departed {
                let event = CollabEvent::CollaboratorLeave { user_id };
                outbox.extend(fan_out(session, connection_id, &event));
            }
            Ok(outbox)
        })
    }

    // ---------------------------------------------------------------
    // Presence handlers
    // ---------------------------------------------------------------

    /// Register (or overwrite) a collaborator owned by `connection_id`
    pub fn on_collaborator_join(
        &self,
        connection_id: &str,
        room_id: &str,
        user_id: &str,
        username: &str,
    ) -> HubResult<()> {
        self.with_session(connection_id, room_id, Resolve::Existing, |session| {
            session.upsert_collaborator(Collaborator::new(user_id, username, connection_id));

            tracing::debug!(
                connection_id = %connection_id,
                room_id = %room_id,
                user_id = %user_id,
                "Collaborator joined"
            );

            let event = CollabEvent::CollaboratorJoin {
                user_id: user_id.to_string(),
                username: username.to_string(),
                pointer: None,
            };
            Ok(fan_out(session, connection_id, &event))
        })
    }

    /// Record a pointer move and relay it.
    ///
    /// Unknown user ids are not stored, but the move is still broadcast.
    pub fn on_collaborator_pointer(
        &self,
        connection_id: &str,
        room_id: &str,
        user_id: &str,
        pointer: Option<Pointer>,
        page_id: Option<PageId>,
    ) -> HubResult<()> {
        self.with_session(connection_id, room_id, Resolve::Existing, |session| {
            if !session.update_pointer(user_id, pointer, page_id.clone()) {
                tracing::debug!(
                    room_id = %room_id,
                    user_id = %user_id,
                    "Pointer from unknown collaborator"
                );
            }

            let event = CollabEvent::CollaboratorPointer {
                user_id: user_id.to_string(),
                pointer,
                page_id,
            };
            Ok(fan_out(session, connection_id, &event))
        })
    }

    // ---------------------------------------------------------------
    // Document handlers
    // ---------------------------------------------------------------

    /// Merge a partial scene into a page and relay the diff.
    ///
    /// Updates for unknown pages are dropped; the page may have been deleted
    /// while the update was in flight.
    pub fn on_scene_update(
        &self,
        connection_id: &str,
        room_id: &str,
        page_id: &str,
        diff: SceneValue,
    ) -> HubResult<()> {
        self.with_session(connection_id, room_id, Resolve::Existing, |session| {
            let Some(page) = session.page_mut(page_id) else {
                tracing::debug!(
                    connection_id = %connection_id,
                    room_id = %room_id,
                    page_id = %page_id,
                    "Scene update for unknown page discarded"
                );
                return Ok(Outbox::new());
            };

            page.content = merge(&page.content, &diff);

            let event = CollabEvent::SceneUpdate {
                sketch_id: page_id.to_string(),
                sketch_data: diff,
            };
            Ok(fan_out(session, connection_id, &event))
        })
    }

    /// Create, rename or delete a page.
    ///
    /// A name for an unknown page creates it with empty content, a name for a
    /// known page renames it, and a null name deletes it. The update is
    /// relayed in every case.
    pub fn on_page_update(
        &self,
        connection_id: &str,
        room_id: &str,
        page_id: &str,
        page_name: Option<String>,
    ) -> HubResult<()> {
        self.with_session(connection_id, room_id, Resolve::Existing, |session| {
            match (&page_name, session.page(page_id).is_some()) {
                (Some(name), true) => {
                    session.rename_page(page_id, name);
                    tracing::debug!(room_id = %room_id, page_id = %page_id, "Page renamed");
                }
                (Some(name), false) => {
                    session.create_page(page_id, name);
                    tracing::debug!(room_id = %room_id, page_id = %page_id, "Page created");
                }
                (None, true) => {
                    session.remove_page(page_id);
                    tracing::debug!(room_id = %room_id, page_id = %page_id, "Page deleted");
                }
                (None, false) => {
                    tracing::debug!(room_id = %room_id, page_id = %page_id, "Delete for unknown page");
                }
            }

            let event = CollabEvent::PageUpdate {
                sketch_id: page_id.to_string(),
                page_name: page_name.clone(),
            };
            Ok(fan_out(session, connection_id, &event))
        })
    }

    // ---------------------------------------------------------------
    // Introspection and shutdown
    // ---------------------------------------------------------------

    /// Number of live rooms
    pub fn room_count(&self) -> HubResult<usize> {
        Ok(self.read_rooms()?.len())
    }

    /// Summary of one room, if it is live
    pub fn room_summary(&self, room_id: &str) -> HubResult<Option<RoomSummary>> {
        let Some(handle) = self.find_session(room_id)? else {
            return Ok(None);
        };
        let session = lock_session(&handle)?;
        Ok((!session.is_closed()).then(|| session.summary()))
    }

    /// Summaries of all live rooms, ordered by room id
    pub fn room_summaries(&self) -> HubResult<Vec<RoomSummary>> {
        let handles: Vec<SessionHandle> = self.read_rooms()?.values().cloned().collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let session = lock_session(&handle)?;
            if !session.is_closed() {
                summaries.push(session.summary());
            }
        }
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(summaries)
    }

    /// Discard every room. Returns the number of rooms torn down.
    pub fn shutdown(&self) -> HubResult<usize> {
        let drained: Vec<SessionHandle> = {
            let mut rooms = self
                .rooms
                .write()
                .map_err(|e| HubError::Lock(e.to_string()))?;
            rooms.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &drained {
            lock_session(handle)?.close();
        }

        tracing::info!(rooms = drained.len(), "Collaboration hub shut down");
        Ok(drained.len())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Run `f` against the room's session under its lock and dispatch the
    /// events it produces before the lock is released.
    ///
    /// Handles the closed-session race and tears the room down when `f`
    /// leaves it without members.
    fn with_session(
        &self,
        connection_id: &str,
        room_id: &str,
        mode: Resolve,
        f: impl FnOnce(&mut Session) -> HubResult<Outbox>,
    ) -> HubResult<()> {
        let mut handle = self.resolve(connection_id, room_id, mode)?;

        loop {
            {
                let mut session = lock_session(&handle)?;
                if !session.is_closed() {
                    if matches!(mode, Resolve::Existing) && !session.is_member(connection_id) {
                        return Err(not_joined(connection_id, room_id));
                    }

                    let result = f(&mut *session).map(|outbox| {
                        self.dispatch(room_id, outbox);
                    });

                    if session.is_empty() {
                        session.close();
                        self.remove_room(room_id, &handle)?;
                        tracing::info!(room_id = %room_id, "Room closed");
                    }
                    return result;
                }
            }
            handle = self.resolve(connection_id, room_id, mode)?;
        }
    }

    fn resolve(&self, connection_id: &str, room_id: &str, mode: Resolve) -> HubResult<SessionHandle> {
        match mode {
            Resolve::OpenOrCreate => self.open_session(room_id),
            Resolve::Existing => self
                .find_session(room_id)?
                .ok_or_else(|| not_joined(connection_id, room_id)),
        }
    }

    fn find_session(&self, room_id: &str) -> HubResult<Option<SessionHandle>> {
        Ok(self.read_rooms()?.get(room_id).cloned())
    }

    fn open_session(&self, room_id: &str) -> HubResult<SessionHandle> {
        if let Some(handle) = self.find_session(room_id)? {
            return Ok(handle);
        }

        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| HubError::Lock(e.to_string()))?;
        let handle = rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room_id = %room_id, "Room created");
            Arc::new(Mutex::new(Session::new(room_id)))
        });
        Ok(Arc::clone(handle))
    }

    /// Remove the table entry if it still points at `handle`
    fn remove_room(&self, room_id: &str, handle: &SessionHandle) -> HubResult<()> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| HubError::Lock(e.to_string()))?;
        if let Some(current) = rooms.get(room_id) {
            if Arc::ptr_eq(current, handle) {
                rooms.remove(room_id);
            }
        }
        Ok(())
    }

    fn read_rooms(&self) -> HubResult<RwLockReadGuard<'_, HashMap<RoomId, SessionHandle>>> {
        self.rooms.read().map_err(|e| HubError::Lock(e.to_string()))
    }

    /// Hand events to the bus; a failed target never stops the others
    fn dispatch(&self, room_id: &str, outbox: Outbox) -> usize {
        let total = outbox.len();
        let mut delivered = 0;

        for (target, event) in outbox {
            let name = event.name();
            match self.bus.send(&target, event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        room_id = %room_id,
                        connection_id = %target,
                        event = name,
                        error = %e,
                        "Event delivery failed"
                    );
                }
            }
        }

        if total > 0 {
            tracing::trace!(room_id = %room_id, delivered, total, "Dispatched events");
        }
        delivered
    }

    #[cfg(test)]
    fn session_handle(&self, room_id: &str) -> Option<SessionHandle> {
        self.find_session(room_id).ok().flatten()
    }
}

/// Address `event` to every member except the originator
fn fan_out(session: &Session, originator: &str, event: &CollabEvent) -> Outbox {
    session
        .others(originator)
        .map(|target| (target.clone(), event.clone()))
        .collect()
}

fn lock_session(handle: &Mutex<Session>) -> HubResult<MutexGuard<'_, Session>> {
    handle.lock().map_err(|e| HubError::Lock(e.to_string()))
}

fn not_joined(connection_id: &str, room_id: &str) -> HubError {
    HubError::NotJoined {
        connection: connection_id.to_string(),
        room: room_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::bus::BusError;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Bus that records every delivery and fails for chosen targets
    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<(String, CollabEvent)>>,
        unreachable: Mutex<HashSet<String>>,
    }

    impl RecordingBus {
        fn take(&self) -> Vec<(String, CollabEvent)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        fn fail_for(&self, id: &str) {
            self.unreachable.lock().unwrap().insert(id.to_string());
        }
    }

    impl MessageBus for RecordingBus {
        fn send(&self, target: &str, event: CollabEvent) -> Result<(), BusError> {
            if self.unreachable.lock().unwrap().contains(target) {
                return Err(BusError::ConnectionNotFound(target.to_string()));
            }
            self.sent.lock().unwrap().push((target.to_string(), event));
            Ok(())
        }
    }

    fn create_test_hub() -> (Arc<CollabHub>, Arc<RecordingBus>) {
        let bus = Arc::new(RecordingBus::default());
        let hub = Arc::new(CollabHub::new(bus.clone(), HubConfig::default()));
        (hub, bus)
    }

    fn targets(sent: &[(String, CollabEvent)]) -> Vec<&str> {
        sent.iter().map(|(target, _)| target.as_str()).collect()
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.max_members_per_room, 100);
    }

    #[test]
    fn test_first_connection_creates_room() {
        let (hub, bus) = create_test_hub();

        hub.on_new_connection("c1", "room").unwrap();

        assert_eq!(hub.room_count().unwrap(), 1);
        assert!(bus.take().is_empty());
        let summary = hub.room_summary("room").unwrap().unwrap();
        assert_eq!(summary.members, 1);
        assert!(summary.pages.is_empty());
    }

    #[test]
    fn test_join_replays_state_to_joiner_only() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        hub.on_page_update("c1", "room", "p1", Some("Page 1".into())).unwrap();
        hub.on_page_update("c1", "room", "p2", Some("Page 2".into())).unwrap();
        hub.on_scene_update("c1", "room", "p2", SceneValue::from(json!({"elements": [1]})))
            .unwrap();
        hub.on_collaborator_join("c1", "room", "u1", "Ada").unwrap();
        hub.on_collaborator_join("c2", "room", "u2", "Bob").unwrap();
        bus.take();

        hub.on_new_connection("c3", "room").unwrap();

        let sent = bus.take();
        assert!(sent.iter().all(|(target, _)| target == "c3"));
        let names: Vec<_> = sent.iter().map(|(_, e)| e.name()).collect();
        assert_eq!(names.iter().filter(|n| **n == "page_update").count(), 2);
        assert_eq!(names.iter().filter(|n| **n == "scene_update").count(), 2);
        assert_eq!(names.iter().filter(|n| **n == "collaborator_join").count(), 2);
        assert_eq!(sent.len(), 6);

        // Pages come fully before collaborators
        assert_eq!(&names[..4], &["page_update", "scene_update", "page_update", "scene_update"]);

        match &sent[3].1 {
            CollabEvent::SceneUpdate { sketch_id, sketch_data } => {
                assert_eq!(sketch_id, "p2");
                assert_eq!(sketch_data, &SceneValue::from(json!({"elements": [1]})));
            }
            other => panic!("Expected SceneUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_collaborator_join_broadcasts_to_others() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        hub.on_new_connection("c3", "room").unwrap();
        bus.take();

        hub.on_collaborator_join("c2", "room", "u2", "Bob").unwrap();

        let sent = bus.take();
        assert_eq!(targets(&sent), vec!["c1", "c3"]);
        assert_eq!(
            sent[0].1,
            CollabEvent::CollaboratorJoin {
                user_id: "u2".into(),
                username: "Bob".into(),
                pointer: None,
            }
        );
    }

    #[test]
    fn test_pointer_updates_known_and_relays_unknown() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        hub.on_collaborator_join("c1", "room", "u1", "Ada").unwrap();
        bus.take();

        let pointer = Pointer { x: 10.0, y: -2.0 };
        hub.on_collaborator_pointer("c1", "room", "u1", Some(pointer), Some("p1".into()))
            .unwrap();
        hub.on_collaborator_pointer("c1", "room", "ghost", Some(pointer), None)
            .unwrap();

        let sent = bus.take();
        assert_eq!(targets(&sent), vec!["c2", "c2"]);
        assert!(matches!(
            &sent[1].1,
            CollabEvent::CollaboratorPointer { user_id, .. } if user_id == "ghost"
        ));

        // A later joiner sees the stored pointer, and no ghost collaborator
        hub.on_new_connection("c3", "room").unwrap();
        let replay = bus.take();
        assert_eq!(replay.len(), 1);
        assert_eq!(
            replay[0].1,
            CollabEvent::CollaboratorJoin {
                user_id: "u1".into(),
                username: "Ada".into(),
                pointer: Some(pointer),
            }
        );
    }

    #[test]
    fn test_scene_update_merges_and_relays_diff() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        hub.on_page_update("c1", "room", "p1", Some("Page 1".into())).unwrap();
        hub.on_scene_update(
            "c1",
            "room",
            "p1",
            SceneValue::from(json!({"appState": {"zoom": 1, "grid": true}})),
        )
        .unwrap();
        bus.take();

        let diff = SceneValue::from(json!({"appState": {"zoom": 2}}));
        hub.on_scene_update("c2", "room", "p1", diff.clone()).unwrap();

        let sent = bus.take();
        assert_eq!(targets(&sent), vec!["c1"]);
        assert_eq!(
            sent[0].1,
            CollabEvent::SceneUpdate {
                sketch_id: "p1".into(),
                sketch_data: diff,
            }
        );

        let handle = hub.session_handle("room").unwrap();
        let session = handle.lock().unwrap();
        assert_eq!(
            session.page("p1").unwrap().content,
            SceneValue::from(json!({"appState": {"zoom": 2, "grid": true}}))
        );
    }

    #[test]
    fn test_scene_update_for_unknown_page_is_discarded() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        bus.take();

        hub.on_scene_update("c1", "room", "missing", SceneValue::from(json!({"a": 1})))
            .unwrap();

        assert!(bus.take().is_empty());
        assert!(hub.room_summary("room").unwrap().unwrap().pages.is_empty());
    }

    #[test]
    fn test_page_lifecycle_broadcasts() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        bus.take();

        hub.on_page_update("c1", "room", "p1", Some("Draft".into())).unwrap();
        hub.on_page_update("c1", "room", "p1", Some("Final".into())).unwrap();
        {
            let handle = hub.session_handle("room").unwrap();
            let session = handle.lock().unwrap();
            assert_eq!(session.page("p1").unwrap().name, "Final");
            assert_eq!(session.pages().len(), 1);
        }

        hub.on_page_update("c1", "room", "p1", None).unwrap();
        assert!(hub.room_summary("room").unwrap().unwrap().pages.is_empty());

        let sent = bus.take();
        assert_eq!(targets(&sent), vec!["c2", "c2", "c2"]);
        assert_eq!(
            sent[2].1,
            CollabEvent::PageUpdate {
                sketch_id: "p1".into(),
                page_name: None,
            }
        );
    }

    #[test]
    fn test_no_handler_echoes_to_sender() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();

        hub.on_collaborator_join("c1", "room", "u1", "Ada").unwrap();
        hub.on_collaborator_pointer("c1", "room", "u1", None, None).unwrap();
        hub.on_page_update("c1", "room", "p1", Some("Page".into())).unwrap();
        hub.on_scene_update("c1", "room", "p1", SceneValue::from(json!({"x": 1})))
            .unwrap();
        hub.on_page_update("c1", "room", "p1", None).unwrap();

        let sent = bus.take();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|(target, _)| target == "c2"));
    }

    #[test]
    fn test_connection_end_broadcasts_leave() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        hub.on_collaborator_join("c1", "room", "u1", "Ada").unwrap();
        bus.take();

        hub.on_connection_end("c1", "room").unwrap();

        let sent = bus.take();
        assert_eq!(targets(&sent), vec!["c2"]);
        assert_eq!(sent[0].1, CollabEvent::CollaboratorLeave { user_id: "u1".into() });

        let summary = hub.room_summary("room").unwrap().unwrap();
        assert_eq!(summary.members, 1);
        assert_eq!(summary.collaborators, 0);
    }

    #[test]
    fn test_connection_end_without_collaborator_is_silent() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        bus.take();

        hub.on_connection_end("c1", "room").unwrap();
        assert!(bus.take().is_empty());
    }

    #[test]
    fn test_last_member_tears_room_down() {
        let (hub, bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();
        hub.on_page_update("c1", "room", "p1", Some("Page".into())).unwrap();
        hub.on_collaborator_join("c1", "room", "u1", "Ada").unwrap();

        hub.on_connection_end("c1", "room").unwrap();
        assert_eq!(hub.room_count().unwrap(), 0);
        assert!(hub.room_summary("room").unwrap().is_none());

        // A new connection starts from scratch
        bus.take();
        hub.on_new_connection("c2", "room").unwrap();
        assert!(bus.take().is_empty());
        let summary = hub.room_summary("room").unwrap().unwrap();
        assert!(summary.pages.is_empty());
        assert_eq!(summary.collaborators, 0);
    }

    #[test]
    fn test_updates_require_membership() {
        let (hub, _bus) = create_test_hub();

        let result = hub.on_page_update("c1", "nowhere", "p1", Some("Page".into()));
        assert!(matches!(result, Err(HubError::NotJoined { .. })));

        hub.on_new_connection("c1", "room").unwrap();
        let result = hub.on_collaborator_join("stranger", "room", "u1", "Eve");
        assert!(matches!(result, Err(HubError::NotJoined { .. })));
        assert_eq!(hub.room_summary("room").unwrap().unwrap().collaborators, 0);

        let result = hub.on_connection_end("stranger", "room");
        assert!(matches!(result, Err(HubError::NotJoined { .. })));
    }

    #[test]
    fn test_double_join_rejected() {
        let (hub, _bus) = create_test_hub();
        hub.on_new_connection("c1", "room").unwrap();

        let result = hub.on_new_connection("c1", "room");
        assert!(matches!(result, Err(HubError::AlreadyJoined { .. })));
        assert_eq!(hub.room_summary("room").unwrap().unwrap().members, 1);
    }

    #[test]
    fn test_room_member_limit() {
        let bus = Arc::new(RecordingBus::default());
        let config = HubConfig {
            max_connections: 10,
            max_members_per_room: 2,
        };
        let hub = CollabHub::new(bus, config);

        hub.on_new_connection("c1", "room").unwrap();
        hub.on_new_connection("c2", "room").unwrap();
        let result = hub.on_new_connection("c3", "room");

        assert!(matches!(result, Err(HubError::RoomFull { limit: 2, .. })));
        assert_eq!(hub.room_summary("room").unwrap().unwrap().members, 2);
    }

    #[test]
    fn test_rejected_first_join_leaves_no_room() {
        let bus = Arc::new(RecordingBus::default());
        let config = HubConfig {
            max_connections: 10,
            max_members_per_room: 0,
        };
        let hub = CollabHub::new(bus, config);

        assert!(hub.on_new_connection("c1", "room").is_err());
        assert_eq!(hub.room_count().unwrap(), 0);
    }

    #[test]
    fn test_delivery_failure_does_not_stop_fan_out() {
        let (hub, bus) = create_test_hub();
        for id in ["c1", "c2", "c3", "c4"] {
            hub.on_new_connection(id, "room").unwrap();
        }
        bus.fail_for("c2");

        hub.on_page_update("c1", "room", "p1", Some("Page".into())).unwrap();

        assert_eq!(targets(&bus.take()), vec!["c3", "c4"]);
    }

    /// Bus that stalls the first delivery to one target until released
    struct StallingBus {
        sent: Mutex<Vec<(String, CollabEvent)>>,
        stall_target: Mutex<Option<String>>,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl MessageBus for StallingBus {
        fn send(&self, target: &str, event: CollabEvent) -> Result<(), BusError> {
            let stall = {
                let mut stall_target = self.stall_target.lock().unwrap();
                if stall_target.as_deref() == Some(target) {
                    stall_target.take()
                } else {
                    None
                }
            };
            if stall.is_some() {
                self.entered.lock().unwrap().send(()).unwrap();
                self.release
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .unwrap();
            }
            self.sent.lock().unwrap().push((target.to_string(), event));
            Ok(())
        }
    }

    #[test]
    fn test_delivery_order_matches_mutation_order() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let bus = Arc::new(StallingBus {
            sent: Mutex::new(Vec::new()),
            stall_target: Mutex::new(None),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let hub = Arc::new(CollabHub::new(bus.clone(), HubConfig::default()));

        hub.on_new_connection("a", "room").unwrap();
        hub.on_page_update("a", "room", "p1", Some("Page".into())).unwrap();
        *bus.stall_target.lock().unwrap() = Some("x".to_string());

        // Joiner's replay stalls mid-delivery
        let hub_x = Arc::clone(&hub);
        let joiner = thread::spawn(move || hub_x.on_new_connection("x", "room").unwrap());
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let hub_a = Arc::clone(&hub);
        let deleter = thread::spawn(move || {
            hub_a.on_page_update("a", "room", "p1", None).unwrap();
            done_tx.send(()).unwrap();
        });
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        joiner.join().unwrap();
        deleter.join().unwrap();

        let to_x: Vec<CollabEvent> = bus
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == "x")
            .map(|(_, event)| event.clone())
            .collect();

        assert_eq!(
            to_x,
            vec![
                CollabEvent::PageUpdate {
                    sketch_id: "p1".to_string(),
                    page_name: Some("Page".to_string()),
                },
                CollabEvent::SceneUpdate {
                    sketch_id: "p1".to_string(),
                    sketch_data: SceneValue::empty(),
                },
                CollabEvent::PageUpdate {
                    sketch_id: "p1".to_string(),
                    page_name: None,
                },
            ]
        );
        assert!(hub.room_summary("room").unwrap().unwrap().pages.is_empty());
    }

    #[test]
    fn test_rooms_do_not_block_each_other() {
        let (hub, _bus) = create_test_hub();
        hub.on_new_connection("a1", "room-a").unwrap();
        hub.on_new_connection("b1", "room-b").unwrap();

        // Hold room A busy for the duration of the test
        let handle_a = hub.session_handle("room-a").unwrap();
        let guard = handle_a.lock().unwrap();

        let (done_b, wait_b) = mpsc::channel();
        let hub_b = Arc::clone(&hub);
        thread::spawn(move || {
            hub_b
                .on_page_update("b1", "room-b", "p1", Some("Page".into()))
                .unwrap();
            done_b.send(()).unwrap();
        });
        assert!(wait_b.recv_timeout(Duration::from_secs(5)).is_ok());

        let (done_a, wait_a) = mpsc::channel();
        let hub_a = Arc::clone(&hub);
        thread::spawn(move || {
            hub_a
                .on_page_update("a1", "room-a", "p1", Some("Page".into()))
                .unwrap();
            done_a.send(()).unwrap();
        });
        assert!(wait_a.recv_timeout(Duration::from_millis(100)).is_err());

        drop(guard);
        assert!(wait_a.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_concurrent_join_and_leave_converges() {
        let (hub, _bus) = create_test_hub();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || {
                    let conn = format!("c{}", i);
                    let user = format!("u{}", i);
                    let page = format!("p{}", i);
                    for _ in 0..50 {
                        hub.on_new_connection(&conn, "shared").unwrap();
                        hub.on_collaborator_join(&conn, "shared", &user, "worker").unwrap();
                        hub.on_page_update(&conn, "shared", &page, Some("Page".into()))
                            .unwrap();
                        hub.on_scene_update(&conn, "shared", &page, SceneValue::from(json!({"n": 1})))
                            .unwrap();
                        hub.on_connection_end(&conn, "shared").unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(hub.room_count().unwrap(), 0);
    }

    #[test]
    fn test_shutdown_discards_rooms() {
        let (hub, _bus) = create_test_hub();
        hub.on_new_connection("c1", "room-a").unwrap();
        hub.on_new_connection("c2", "room-b").unwrap();

        assert_eq!(hub.shutdown().unwrap(), 2);
        assert_eq!(hub.room_count().unwrap(), 0);
        assert!(hub.room_summaries().unwrap().is_empty());
    }

    #[test]
    fn test_room_summaries_sorted() {
        let (hub, _bus) = create_test_hub();
        hub.on_new_connection("c1", "zeta").unwrap();
        hub.on_new_connection("c2", "alpha").unwrap();

        let ids: Vec<_> = hub
            .room_summaries()
            .unwrap()
            .into_iter()
            .map(|s| s.room_id)
            .collect();
        assert_eq!(ids, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
