//! The outbound half of a connection.
//!
//! A [`Sender`] is chosen once, when the session is built, from the
//! transport the client connected on. Nothing above this module ever
//! branches on transport kind.

use std::sync::Arc;

use bytes::Bytes;
use roomrelay_transport::{
    ConnectionId, Delivery, PeerTransport, StreamTransport, TransportError,
};

/// Delivers encoded messages to one connection.
pub trait Sender: Send + Sync + 'static {
    /// Queues `data`. Transports without reliability tiers ignore
    /// `delivery`.
    fn send(&self, data: Bytes, delivery: Delivery) -> Result<(), TransportError>;

    /// Closes the underlying connection.
    fn close(&self);
}

/// Sends over a datagram peer transport, honoring the delivery tier.
pub struct PeerSender<T: PeerTransport> {
    transport: Arc<T>,
    conn: ConnectionId,
}

impl<T: PeerTransport> PeerSender<T> {
    pub fn new(transport: Arc<T>, conn: ConnectionId) -> Self {
        Self { transport, conn }
    }
}

impl<T: PeerTransport> Sender for PeerSender<T> {
    fn send(&self, data: Bytes, delivery: Delivery) -> Result<(), TransportError> {
        self.transport.send(self.conn, data, delivery)
    }

    fn close(&self) {
        self.transport.disconnect(self.conn);
    }
}

/// Sends one framed message per call over a byte-stream transport.
pub struct StreamSender<T: StreamTransport> {
    transport: Arc<T>,
    conn: ConnectionId,
}

impl<T: StreamTransport> StreamSender<T> {
    pub fn new(transport: Arc<T>, conn: ConnectionId) -> Self {
        Self { transport, conn }
    }
}

impl<T: StreamTransport> Sender for StreamSender<T> {
    fn send(&self, data: Bytes, _delivery: Delivery) -> Result<(), TransportError> {
        self.transport.send_one(self.conn, data)
    }

    fn close(&self) {
        self.transport.kick(self.conn);
    }
}
