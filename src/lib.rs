//! # Collab Hub
//!
//! Real-time collaboration server for shared sketches. Clients join a room
//! over WebSocket and exchange partial scene updates, page changes and
//! presence; the hub merges updates into the room's pages and relays them
//! to every other member.
//!
//! ## Modules
//!
//! - [`scene`]: Structured scene values and the structural merge
//! - [`session`]: Per-room sessions and the collaboration hub
//! - [`websocket`]: WebSocket transport and connection registry
//! - [`api`]: HTTP server with Axum
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use collab_hub::api::{serve, AppState};
//! use collab_hub::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let state = AppState::from_config(&config);
//!     let hub = std::sync::Arc::clone(&state.hub);
//!
//!     serve(state).await?;
//!
//!     // Graceful shutdown
//!     hub.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod scene;
pub mod session;
pub mod websocket;

// Re-export top-level types for convenience
pub use scene::{merge, Scalar, SceneValue};

pub use session::{
    BusError, CollabEvent, CollabHub, HubConfig, HubError, HubResult, MessageBus, Pointer,
    RoomSummary,
};

pub use websocket::{ClientMessage, ConnectionRegistry, ServerMessage};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig};
