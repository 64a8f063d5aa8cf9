//! Transport layer for Roomrelay.
//!
//! The relay engine consumes two kinds of transport and never talks to
//! sockets directly:
//!
//! - [`PeerTransport`]: a datagram-style peer transport with per-message
//!   reliability tiers ([`Delivery`]). It is polled: the server drains
//!   [`TransportEvent`]s on a fixed tick.
//! - [`StreamTransport`]: a byte-stream transport addressed by connection
//!   id (browser clients). Events are pushed into a channel by the
//!   transport's own accept loop.
//!
//! Both produce the same [`TransportEvent`] shape, so everything above this
//! crate is transport-agnostic apart from the [`ConnectionKey`] that tags
//! which transport a connection belongs to.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket byte-stream transport via
//!   `tokio-tungstenite`

mod error;
mod loopback;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use loopback::{LoopbackPeer, LoopbackTransport, PeerMessage};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketHandle, WebSocketServer};

use std::fmt;

use bytes::Bytes;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which transport a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    /// Native datagram peer with selectable reliability.
    DatagramPeer,
    /// Reliable byte stream (WebSocket).
    ByteStream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatagramPeer => write!(f, "peer"),
            Self::ByteStream => write!(f, "stream"),
        }
    }
}

/// A connection identity that is unique across both transports.
///
/// Connection ids are only unique per transport, so sessions are keyed by
/// the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    /// Transport the connection belongs to.
    pub kind: TransportKind,
    /// Transport-local connection id.
    pub id: ConnectionId,
}

impl ConnectionKey {
    /// Key for a datagram peer connection.
    pub fn peer(id: ConnectionId) -> Self {
        Self {
            kind: TransportKind::DatagramPeer,
            id,
        }
    }

    /// Key for a byte-stream connection.
    pub fn stream(id: ConnectionId) -> Self {
        Self {
            kind: TransportKind::ByteStream,
            id,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Reliability tier for a single outbound message.
///
/// Byte-stream connections ignore this: everything they carry is
/// reliable and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delivery {
    /// Guaranteed delivery, in order. Used for all membership and cache
    /// events.
    #[default]
    ReliableOrdered,
    /// Guaranteed delivery, any order.
    ReliableUnordered,
    /// Best effort. May be dropped or reordered.
    Unreliable,
}

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A new connection. Peer transports carry the connection-request
    /// payload (the handshake); stream transports carry `None` and send
    /// the handshake as their first data message.
    Connected {
        conn: ConnectionId,
        request: Option<Bytes>,
    },
    /// A message arrived.
    Data {
        conn: ConnectionId,
        data: Bytes,
        delivery: Delivery,
    },
    /// The connection is gone.
    Disconnected { conn: ConnectionId },
}

impl TransportEvent {
    /// The connection this event concerns.
    pub fn conn(&self) -> ConnectionId {
        match self {
            Self::Connected { conn, .. }
            | Self::Data { conn, .. }
            | Self::Disconnected { conn } => *conn,
        }
    }
}

/// A polled datagram peer transport.
///
/// All methods are non-blocking; sends are queued by the transport.
pub trait PeerTransport: Send + Sync + 'static {
    /// Drains every event that arrived since the last poll.
    fn poll_events(&self) -> Vec<TransportEvent>;

    /// Queues `data` for `conn` on the requested reliability tier.
    fn send(
        &self,
        conn: ConnectionId,
        data: Bytes,
        delivery: Delivery,
    ) -> Result<(), TransportError>;

    /// Refuses a pending connection request, passing `reason` back to the
    /// remote side.
    fn reject(&self, conn: ConnectionId, reason: Bytes);

    /// Closes an established connection.
    fn disconnect(&self, conn: ConnectionId);
}

/// A byte-stream transport addressed by connection id.
pub trait StreamTransport: Send + Sync + 'static {
    /// Queues `data` as one framed message for `conn`.
    fn send_one(
        &self,
        conn: ConnectionId,
        data: Bytes,
    ) -> Result<(), TransportError>;

    /// Closes the connection from the server side.
    fn kick(&self, conn: ConnectionId);
}
