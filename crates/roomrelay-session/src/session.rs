//! The per-connection session.
//!
//! A [`ClientSession`] is the server's record of one admitted client:
//! WHO it is (id, display name, game and version), WHERE it is (its last
//! reported position and the room it occupies) and HOW to reach it (its
//! [`Sender`]).
//!
//! Sessions are shared as `Arc<ClientSession>` between the session table
//! and the room the client is in, so the mutable parts sit behind small
//! synchronous mutexes that are never held across an `.await`.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use roomrelay_protocol::{Handshake, Platform, Point, ServerEvent};
use roomrelay_transport::{ConnectionKey, Delivery, TransportKind};

use crate::Sender;

/// A type-erased weak link to the room a session occupies.
///
/// The session layer sits below the room layer, so it can't name the room
/// type. [`ClientSession::room`] recovers the concrete type.
type RoomLink = Weak<dyn Any + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One admitted client.
pub struct ClientSession {
    id: String,
    display_name: String,
    game_key: String,
    game_version: String,
    platform: Platform,
    key: ConnectionKey,
    sender: Arc<dyn Sender>,
    /// Last position reported through a proximity query.
    position: Mutex<Point>,
    room: Mutex<Option<RoomLink>>,
}

impl ClientSession {
    /// Builds a session from an accepted handshake.
    pub fn new(
        key: ConnectionKey,
        handshake: &Handshake,
        sender: Arc<dyn Sender>,
    ) -> Self {
        Self {
            id: handshake.user_id.clone(),
            display_name: handshake.display_name.clone(),
            game_key: handshake.game_key.clone(),
            game_version: handshake.game_version.clone(),
            platform: handshake.platform,
            key,
            sender,
            position: Mutex::new(Point::default()),
            room: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn game_key(&self) -> &str {
        &self.game_key
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn connection_key(&self) -> ConnectionKey {
        self.key
    }

    /// The transport-local numeric connection id.
    pub fn connection_id(&self) -> u64 {
        self.key.id.into_inner()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.key.kind
    }

    pub fn position(&self) -> Point {
        *lock(&self.position)
    }

    pub fn set_position(&self, position: Point) {
        *lock(&self.position) = position;
    }

    // -----------------------------------------------------------------------
    // Room link
    // -----------------------------------------------------------------------

    /// The room this session currently occupies, if it still exists and
    /// is of type `R`.
    pub fn room<R: Any + Send + Sync>(&self) -> Option<Arc<R>> {
        let link = lock(&self.room).as_ref()?.upgrade()?;
        link.downcast::<R>().ok()
    }

    /// True when the session is linked to a live room.
    pub fn in_room(&self) -> bool {
        lock(&self.room)
            .as_ref()
            .is_some_and(|link| link.strong_count() > 0)
    }

    /// Links the session to `room`.
    pub fn enter_room<R: Any + Send + Sync>(&self, room: &Arc<R>) {
        let room: Arc<dyn Any + Send + Sync> = room.clone();
        *lock(&self.room) = Some(Arc::downgrade(&room));
    }

    /// Clears the room link, returning whether there was one.
    pub fn leave_room(&self) -> bool {
        lock(&self.room).take().is_some()
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Sends an event reliably and in order.
    pub fn send(&self, event: &ServerEvent) {
        self.send_with(event, Delivery::ReliableOrdered);
    }

    /// Sends an event on the given delivery tier.
    pub fn send_with(&self, event: &ServerEvent, delivery: Delivery) {
        self.send_encoded(event.encode(), delivery);
    }

    /// Sends an already-encoded event. Used for fan-out so one encoding
    /// is shared by every recipient.
    ///
    /// A failed send means the connection is unusable: it is closed, and
    /// the transport's disconnect event tears the session down.
    pub fn send_encoded(&self, data: Bytes, delivery: Delivery) {
        if let Err(e) = self.sender.send(data, delivery) {
            tracing::warn!(
                conn = %self.key,
                user_id = %self.id,
                error = %e,
                "send failed, closing connection"
            );
            self.sender.close();
        }
    }

    /// Closes the connection from the server side.
    pub fn close(&self) {
        self.sender.close();
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("game_key", &self.game_key)
            .field("game_version", &self.game_version)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
