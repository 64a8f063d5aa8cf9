//! # Roomrelay
//!
//! A session and room relay for multiplayer games.
//!
//! Clients connect over WebSocket or a datagram peer transport, present a
//! shared key, then create or join named rooms inside their game. A room
//! relays opaque payloads between its members, elects a master client,
//! keeps a small replicated cache and, when configured, routes payloads by
//! proximity. The relay never interprets game data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomrelay::prelude::*;
//!
//! # async fn start() -> Result<(), RelayError> {
//! let server = RelayServer::builder()
//!     .bind("0.0.0.0:10002")
//!     .server_key("demokey")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod config;
mod error;
mod handler;
mod reaper;
mod registry;
mod server;
mod stats;

pub use config::RelayConfig;
pub use error::RelayError;
pub use reaper::Reaper;
pub use registry::{SessionRegistry, MAX_ROOM_LIST};
pub use server::{RelayServer, RelayServerBuilder, ShutdownHandle};
pub use stats::{GameStats, RelayStats};

/// Everything needed to run a relay or drive one in tests.
pub mod prelude {
    pub use crate::{
        GameStats, RelayConfig, RelayError, RelayServer, RelayServerBuilder,
        RelayStats, SessionRegistry, ShutdownHandle,
    };
    pub use roomrelay_protocol::{
        request, Handshake, Platform, ProximityConfig, Rect, RoomFilter,
        RoomParameters, ServerEvent,
    };
    pub use roomrelay_room::{Room, RoomError};
    pub use roomrelay_session::{
        AdmissionError, Authenticator, ClientSession, SharedKeyAuth,
    };
    pub use roomrelay_transport::{
        ConnectionKey, Delivery, LoopbackPeer, LoopbackTransport,
        PeerMessage,
    };
}
