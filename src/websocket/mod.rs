//! WebSocket Collaboration Transport
//!
//! Connects sketch clients to the collaboration hub.
//!
//! ## Architecture
//!
//! - **ConnectionRegistry**: live sockets by connection id; the hub's [`MessageBus`](crate::session::MessageBus)
//! - **Handler**: WebSocket upgrade, frame decoding and the connection lifecycle
//! - **Messages**: client and server frame formats
//!
//! ## Usage
//!
//! Clients connect to `/ws/collab/{roomID}/` and exchange JSON frames keyed
//! by `action`:
//! - `scene_update` - partial scene content for a page
//! - `page_update` - create, rename or delete a page
//! - `collaborator_join` - announce the user behind the connection
//! - `collaborator_pointer` - cursor movement
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8000/ws/collab/room-42/');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({action: 'collaborator_join', userID: 'u1', username: 'Ada'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   console.log('Received:', msg.action);
//! };
//! ```

mod handler;
mod messages;
mod registry;

pub use handler::{apply_client_message, validate_room_id, websocket_handler};
pub use messages::{ClientMessage, ErrorFrame, ServerMessage};
pub use registry::{ConnectionHandle, ConnectionRegistry};
