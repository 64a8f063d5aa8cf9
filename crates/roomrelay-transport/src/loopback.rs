//! In-process [`PeerTransport`].
//!
//! Behaves like a datagram peer library from the server's point of view
//! (connection requests carry a payload, events are polled, sends take a
//! reliability tier) but never touches the network. Every delivery tier is
//! delivered reliably and in order. Used by integration tests and for
//! embedding a relay in-process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{ConnectionId, Delivery, PeerTransport, TransportError, TransportEvent};

/// What a [`LoopbackPeer`] receives from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// A message sent with [`PeerTransport::send`].
    Data { data: Bytes, delivery: Delivery },
    /// The connection request was refused with this payload.
    Rejected(Bytes),
    /// The server closed the connection.
    Disconnected,
}

#[derive(Default)]
struct LoopbackState {
    next_id: u64,
    events: VecDeque<TransportEvent>,
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<PeerMessage>>,
}

/// Server side of the loopback transport. Cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a client connection, sending `request` as the connection
    /// request payload.
    pub fn connect(&self, request: Bytes) -> LoopbackPeer {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.next_id += 1;
        let conn = ConnectionId::new(state.next_id);
        state.peers.insert(conn, tx);
        state.events.push_back(TransportEvent::Connected {
            conn,
            request: Some(request),
        });
        LoopbackPeer {
            conn,
            transport: self.clone(),
            inbox: rx,
        }
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn drop_peer(&self, conn: ConnectionId, last: PeerMessage) {
        let mut state = self.lock();
        if let Some(tx) = state.peers.remove(&conn) {
            let _ = tx.send(last);
            state.events.push_back(TransportEvent::Disconnected { conn });
        }
    }
}

impl PeerTransport for LoopbackTransport {
    fn poll_events(&self) -> Vec<TransportEvent> {
        self.lock().events.drain(..).collect()
    }

    fn send(
        &self,
        conn: ConnectionId,
        data: Bytes,
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        let state = self.lock();
        let tx = state
            .peers
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        tx.send(PeerMessage::Data { data, delivery })
            .map_err(|_| TransportError::ConnectionClosed(conn))
    }

    fn reject(&self, conn: ConnectionId, reason: Bytes) {
        // A rejected request never became a connection, so no event.
        let mut state = self.lock();
        if let Some(tx) = state.peers.remove(&conn) {
            let _ = tx.send(PeerMessage::Rejected(reason));
        }
    }

    fn disconnect(&self, conn: ConnectionId) {
        self.drop_peer(conn, PeerMessage::Disconnected);
    }
}

/// Client side of one loopback connection.
pub struct LoopbackPeer {
    conn: ConnectionId,
    transport: LoopbackTransport,
    inbox: mpsc::UnboundedReceiver<PeerMessage>,
}

impl LoopbackPeer {
    /// The server-side id of this connection.
    pub fn id(&self) -> ConnectionId {
        self.conn
    }

    /// Sends a message to the server.
    pub fn send(&self, data: impl Into<Bytes>, delivery: Delivery) {
        let mut state = self.transport.lock();
        if state.peers.contains_key(&self.conn) {
            state.events.push_back(TransportEvent::Data {
                conn: self.conn,
                data: data.into(),
                delivery,
            });
        }
    }

    /// Waits for the next message from the server.
    ///
    /// Returns `None` once the server side is gone and the inbox is empty.
    pub async fn recv(&mut self) -> Option<PeerMessage> {
        self.inbox.recv().await
    }

    /// Returns the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<PeerMessage> {
        self.inbox.try_recv().ok()
    }

    /// Closes the connection from the client side.
    pub fn disconnect(&self) {
        let mut state = self.transport.lock();
        if state.peers.remove(&self.conn).is_some() {
            state
                .events
                .push_back(TransportEvent::Disconnected { conn: self.conn });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_queues_connected_event_with_request() {
        let transport = LoopbackTransport::new();
        let peer = transport.connect(Bytes::from_static(b"hello"));

        let events = transport.poll_events();
        assert_eq!(
            events,
            vec![TransportEvent::Connected {
                conn: peer.id(),
                request: Some(Bytes::from_static(b"hello")),
            }]
        );
        assert!(transport.poll_events().is_empty());
    }

    #[test]
    fn test_send_reaches_peer_with_delivery_tier() {
        let transport = LoopbackTransport::new();
        let mut peer = transport.connect(Bytes::new());

        transport
            .send(peer.id(), Bytes::from_static(b"x"), Delivery::Unreliable)
            .expect("peer is connected");

        assert_eq!(
            peer.try_recv(),
            Some(PeerMessage::Data {
                data: Bytes::from_static(b"x"),
                delivery: Delivery::Unreliable,
            })
        );
    }

    #[test]
    fn test_reject_removes_peer_without_event() {
        let transport = LoopbackTransport::new();
        let mut peer = transport.connect(Bytes::new());
        transport.poll_events();

        transport.reject(peer.id(), Bytes::from_static(&[92]));

        assert_eq!(
            peer.try_recv(),
            Some(PeerMessage::Rejected(Bytes::from_static(&[92])))
        );
        assert!(transport.poll_events().is_empty());
        assert_eq!(transport.peer_count(), 0);
    }

    #[test]
    fn test_send_to_unknown_connection_fails() {
        let transport = LoopbackTransport::new();
        let result =
            transport.send(ConnectionId::new(99), Bytes::new(), Delivery::default());
        assert!(matches!(
            result,
            Err(TransportError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_peer_disconnect_queues_event_once() {
        let transport = LoopbackTransport::new();
        let peer = transport.connect(Bytes::new());
        transport.poll_events();

        peer.disconnect();
        peer.disconnect();

        assert_eq!(
            transport.poll_events(),
            vec![TransportEvent::Disconnected { conn: peer.id() }]
        );
    }

    #[test]
    fn test_data_after_disconnect_is_dropped() {
        let transport = LoopbackTransport::new();
        let peer = transport.connect(Bytes::new());
        transport.disconnect(peer.id());
        transport.poll_events();

        peer.send(Bytes::from_static(b"late"), Delivery::default());

        assert!(transport.poll_events().is_empty());
    }
}
