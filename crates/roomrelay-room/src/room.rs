//! A room: membership, master election, lock state, replicated cache and
//! message relay.
//!
//! A [`Room`] is shared as `Arc<Room>` between its [`Game`](crate::Game)
//! and the sessions inside it. Everything mutable lives in [`RoomCore`]
//! behind one async mutex, held for the whole of any membership change or
//! fan-out, so a broadcast is never interleaved with a join or leave: every
//! member sees it exactly once, and a joiner sees it either entirely
//! before or entirely after its own join burst.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use roomrelay_protocol::{
    Platform, RoomFilter, RoomInstruction, RoomListing, RoomParameters,
    ServerEvent,
};
use roomrelay_session::ClientSession;
use roomrelay_transport::Delivery;
use tokio::sync::{Mutex, MutexGuard};

use crate::{LockState, Liveness, PointIndex, RoomError, SpatialIndex};

/// Cache values larger than this are dropped without notice.
pub const MAX_CACHE_VALUE_LEN: usize = 1000;

/// What [`RoomCore::remove_player`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The session wasn't a member; nothing changed.
    NotMember,
    /// The session left and others remain.
    Remaining,
    /// The session was the last member. The room is now waiting out its
    /// grace window and the caller should arm the reaper.
    Emptied,
}

/// A room within one game.
pub struct Room {
    id: Arc<str>,
    /// Lowercased id, the key in the game's room table.
    key: String,
    game_key: String,
    game_version: String,
    /// Platform of the client that created the room.
    primary_platform: Platform,
    core: Mutex<RoomCore>,
}

impl Room {
    /// Creates an empty room. The creator is added separately through
    /// [`RoomCore::add_player`].
    pub fn new(
        id: &str,
        game_key: &str,
        game_version: &str,
        primary_platform: Platform,
        params: RoomParameters,
    ) -> Arc<Self> {
        let id: Arc<str> = Arc::from(id);
        let spatial = params
            .proximity
            .as_ref()
            .map(|cfg| Box::new(PointIndex::new(cfg)) as Box<dyn SpatialIndex>);

        Arc::new(Self {
            key: Self::normalize_key(&id),
            game_key: game_key.to_owned(),
            game_version: game_version.to_owned(),
            primary_platform,
            core: Mutex::new(RoomCore {
                room_id: id.clone(),
                game_version: game_version.to_owned(),
                params,
                lock_state: LockState::Open,
                liveness: Liveness::Active,
                members: Vec::new(),
                departed: HashSet::new(),
                master_id: None,
                cache: BTreeMap::new(),
                spatial,
            }),
            id,
        })
    }

    /// Room ids are unique case-insensitively.
    pub fn normalize_key(id: &str) -> String {
        id.to_lowercase()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn game_key(&self) -> &str {
        &self.game_key
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn primary_platform(&self) -> Platform {
        self.primary_platform
    }

    /// Acquires the room's state.
    pub async fn lock(&self) -> MutexGuard<'_, RoomCore> {
        self.core.lock().await
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("game_key", &self.game_key)
            .field("game_version", &self.game_version)
            .finish_non_exhaustive()
    }
}

/// The mutable state of a [`Room`].
pub struct RoomCore {
    room_id: Arc<str>,
    game_version: String,
    params: RoomParameters,
    lock_state: LockState,
    liveness: Liveness,
    /// Join order; `members[0]` is promoted when the master leaves.
    members: Vec<Arc<ClientSession>>,
    /// Ids that left and may rejoin. Disjoint from `members`.
    departed: HashSet<String>,
    /// `Some` iff `members` is non-empty, and always a member's id.
    master_id: Option<String>,
    cache: BTreeMap<String, Bytes>,
    spatial: Option<Box<dyn SpatialIndex>>,
}

impl RoomCore {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn params(&self) -> &RoomParameters {
        &self.params
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.params.max_players as usize
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn master_id(&self) -> Option<&str> {
        self.master_id.as_deref()
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.member(id).is_some()
    }

    /// Member ids in join order.
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id().to_owned()).collect()
    }

    pub fn has_departed(&self, id: &str) -> bool {
        self.departed.contains(id)
    }

    pub fn cached(&self, key: &str) -> Option<&Bytes> {
        self.cache.get(key)
    }

    pub fn has_proximity(&self) -> bool {
        self.spatial.is_some()
    }

    /// True iff every pair in `query` is among the room's tags.
    pub fn matches_filter(&self, query: &RoomFilter) -> bool {
        self.params.filter.is_match(query)
    }

    fn member(&self, id: &str) -> Option<&Arc<ClientSession>> {
        self.members.iter().find(|m| m.id() == id)
    }

    fn check_version(&self, session: &ClientSession) -> Result<(), RoomError> {
        if session.game_version() != self.game_version {
            return Err(RoomError::VersionMismatch {
                room: self.room_id.to_string(),
                expected: self.game_version.clone(),
                actual: session.game_version().to_owned(),
            });
        }
        Ok(())
    }

    fn check_open_with_space(&self) -> Result<(), RoomError> {
        if !self.lock_state.is_open() {
            return Err(RoomError::RoomLocked(self.room_id.to_string()));
        }
        if self.is_full() {
            return Err(RoomError::RoomFull(self.room_id.to_string()));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Admission checks
    // -----------------------------------------------------------------------

    /// `JoinRoom`: version, then password, then lock, then capacity.
    pub fn check_join(
        &self,
        session: &ClientSession,
        password: Option<&str>,
    ) -> Result<(), RoomError> {
        self.check_version(session)?;
        if let Some(expected) = self.params.password() {
            if password != Some(expected) {
                return Err(RoomError::PasswordMismatch(self.room_id.to_string()));
            }
        }
        self.check_open_with_space()
    }

    /// The join branch of `CreateOrJoinRoom`: like [`check_join`] without
    /// the password.
    ///
    /// [`check_join`]: Self::check_join
    pub fn check_create_or_join(&self, session: &ClientSession) -> Result<(), RoomError> {
        self.check_version(session)?;
        self.check_open_with_space()
    }

    /// `RejoinRoom`: capacity, then the departed set. Ignores version,
    /// password and lock.
    pub fn check_rejoin(&self, session: &ClientSession) -> Result<(), RoomError> {
        if self.is_full() {
            return Err(RoomError::RoomFull(self.room_id.to_string()));
        }
        if !self.departed.contains(session.id()) {
            return Err(RoomError::RejoinNotAuthorized {
                room: self.room_id.to_string(),
                user: session.id().to_owned(),
            });
        }
        Ok(())
    }

    /// Eligible for `JoinRandomRoom`.
    pub fn is_random_candidate(&self, session: &ClientSession, filter: &RoomFilter) -> bool {
        !self.liveness.is_destroyed()
            && self.params.is_public
            && self.game_version == session.game_version()
            && !self.params.has_password()
            && self.lock_state.is_open()
            && !self.is_full()
            && self.matches_filter(filter)
    }

    /// Shown in `FetchRoomList` results.
    pub fn is_listed_for(&self, session: &ClientSession, filter: &RoomFilter) -> bool {
        !self.liveness.is_destroyed()
            && self.params.is_public
            && self.game_version == session.game_version()
            && self.lock_state.is_open()
            && !self.is_full()
            && self.matches_filter(filter)
    }

    pub fn listing(&self) -> RoomListing {
        RoomListing {
            id: self.room_id.to_string(),
            has_password: self.params.has_password(),
            player_count: self.members.len() as u32,
            max_players: self.params.max_players,
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds `session` and brings everyone up to date.
    ///
    /// Existing members get `PlayerConnected` for the newcomer. The first
    /// member becomes master. A later joiner gets, in order and before
    /// any other room traffic: one `PlayerConnected` per existing member,
    /// the current `MasterChanged`, then every cached value.
    pub fn add_player(&mut self, session: &Arc<ClientSession>) {
        if self.is_member(session.id()) {
            tracing::warn!(
                room_id = %self.room_id,
                user_id = %session.id(),
                "player already in room, ignoring add"
            );
            return;
        }

        if let Some(index) = self.spatial.as_mut() {
            index.insert(session.connection_key(), session.position());
        }
        self.members.push(session.clone());
        self.departed.remove(session.id());
        self.liveness = Liveness::Active;

        let connected = player_connected(session);
        self.broadcast(&connected, Some(session.id()), Delivery::ReliableOrdered);

        if self.members.len() == 1 {
            self.master_id = Some(session.id().to_owned());
            self.broadcast_master();
        } else {
            for other in self.members.iter().filter(|m| m.id() != session.id()) {
                session.send(&player_connected(other));
            }
            if let Some(master) = &self.master_id {
                session.send(&ServerEvent::MasterChanged { id: master.clone() });
            }
            for (key, data) in &self.cache {
                session.send(&ServerEvent::CacheData {
                    key: key.clone(),
                    data: data.clone(),
                });
            }
        }

        tracing::info!(
            room_id = %self.room_id,
            user_id = %session.id(),
            players = self.members.len(),
            "player joined"
        );
    }

    /// Removes `session`, recording it as eligible to rejoin.
    ///
    /// If others remain they get `PlayerDisconnected`, and a new master is
    /// promoted if needed. If the room is now empty nobody is notified and
    /// the room enters its grace window starting at `now`.
    pub fn remove_player(&mut self, session: &ClientSession, now: Instant) -> Departure {
        let Some(pos) = self.members.iter().position(|m| m.id() == session.id()) else {
            return Departure::NotMember;
        };
        let departed = self.members.remove(pos);
        if let Some(index) = self.spatial.as_mut() {
            index.remove(&departed.connection_key());
        }
        self.departed.insert(departed.id().to_owned());

        tracing::info!(
            room_id = %self.room_id,
            user_id = %departed.id(),
            players = self.members.len(),
            "player left"
        );

        if self.members.is_empty() {
            self.master_id = None;
            self.liveness = Liveness::PendingDestroy { since: now };
            tracing::debug!(room_id = %self.room_id, "room empty, awaiting rejoin");
            return Departure::Emptied;
        }

        self.broadcast(
            &ServerEvent::PlayerDisconnected {
                id: departed.id().to_owned(),
            },
            None,
            Delivery::ReliableOrdered,
        );

        if self.master_id.as_deref() == Some(departed.id()) {
            self.master_id = self.members.first().map(|m| m.id().to_owned());
            self.broadcast_master();
        }

        Departure::Remaining
    }

    // -----------------------------------------------------------------------
    // In-room instructions
    // -----------------------------------------------------------------------

    /// Handles one instruction from a member.
    ///
    /// Ordinary relay traffic uses the sender's `delivery`; cache writes
    /// always go out reliable and ordered.
    pub fn process(
        &mut self,
        from: &ClientSession,
        instruction: RoomInstruction,
        delivery: Delivery,
    ) {
        if !self.is_member(from.id()) {
            tracing::warn!(
                room_id = %self.room_id,
                user_id = %from.id(),
                "message from non-member, ignoring"
            );
            return;
        }

        match instruction {
            RoomInstruction::MakeMasterClient => {
                // Any member may claim master.
                self.master_id = Some(from.id().to_owned());
                self.broadcast_master();
            }
            RoomInstruction::Lock => self.set_lock(from, LockState::Locked),
            RoomInstruction::Unlock => self.set_lock(from, LockState::Open),
            RoomInstruction::Ping => {}
            RoomInstruction::RawDataToClient { target_id, data } => {
                if let Some(target) = self.member(&target_id) {
                    target.send_with(
                        &ServerEvent::RoomRaw {
                            sender_id: from.id().to_owned(),
                            data,
                        },
                        delivery,
                    );
                }
            }
            RoomInstruction::RawDataToNearby { rect, data } => {
                let Some(index) = self.spatial.as_mut() else {
                    return;
                };
                let center = rect.center();
                from.set_position(center);
                index.insert(from.connection_key(), center);

                let nearby: HashSet<_> = index.query_rect(&rect).into_iter().collect();
                let encoded = ServerEvent::RoomRaw {
                    sender_id: from.id().to_owned(),
                    data,
                }
                .encode();
                for member in &self.members {
                    if member.id() != from.id() && nearby.contains(&member.connection_key()) {
                        member.send_encoded(encoded.clone(), delivery);
                    }
                }
            }
            RoomInstruction::RawDataCache { key, data } => {
                if data.len() > MAX_CACHE_VALUE_LEN {
                    tracing::debug!(
                        room_id = %self.room_id,
                        user_id = %from.id(),
                        %key,
                        len = data.len(),
                        "cache value too large, dropping"
                    );
                    return;
                }
                self.cache.insert(key.clone(), data.clone());
                self.broadcast(
                    &ServerEvent::CacheData { key, data },
                    None,
                    Delivery::ReliableOrdered,
                );
            }
            RoomInstruction::Broadcast { data } => {
                self.broadcast(
                    &ServerEvent::RoomRaw {
                        sender_id: from.id().to_owned(),
                        data,
                    },
                    Some(from.id()),
                    delivery,
                );
            }
        }
    }

    fn set_lock(&mut self, from: &ClientSession, state: LockState) {
        if self.master_id.as_deref() != Some(from.id()) {
            tracing::debug!(
                room_id = %self.room_id,
                user_id = %from.id(),
                "lock change from non-master, ignoring"
            );
            return;
        }
        self.lock_state = state;
        tracing::debug!(room_id = %self.room_id, lock = %state, "room lock changed");
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// True once the room has been empty for at least `idle_life`.
    pub fn is_reapable(&self, now: Instant, idle_life: Duration) -> bool {
        self.members.is_empty()
            && self
                .liveness
                .empty_since()
                .is_some_and(|since| now.saturating_duration_since(since) >= idle_life)
    }

    /// Marks the room gone. Called with the room already unlinked from
    /// its game.
    pub fn mark_destroyed(&mut self) {
        self.liveness = Liveness::Destroyed;
        self.departed.clear();
        self.cache.clear();
        tracing::info!(room_id = %self.room_id, "room destroyed");
    }

    /// Removes every member without notifying them. Used at shutdown.
    pub fn clear_members(&mut self) -> Vec<Arc<ClientSession>> {
        self.master_id = None;
        if let Some(index) = self.spatial.as_mut() {
            for member in &self.members {
                index.remove(&member.connection_key());
            }
        }
        std::mem::take(&mut self.members)
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Encodes once and sends to every member except `except`.
    fn broadcast(&self, event: &ServerEvent, except: Option<&str>, delivery: Delivery) {
        let encoded = event.encode();
        for member in &self.members {
            if Some(member.id()) != except {
                member.send_encoded(encoded.clone(), delivery);
            }
        }
    }

    fn broadcast_master(&self) {
        if let Some(master) = &self.master_id {
            self.broadcast(
                &ServerEvent::MasterChanged { id: master.clone() },
                None,
                Delivery::ReliableOrdered,
            );
        }
    }
}

fn player_connected(session: &ClientSession) -> ServerEvent {
    ServerEvent::PlayerConnected {
        id: session.id().to_owned(),
        display_name: session.display_name().to_owned(),
        platform: session.platform(),
        connection_id: session.connection_id(),
    }
}

#[cfg(test)]
mod tests {
    use roomrelay_protocol::{Handshake, ProximityConfig, Rect};
    use roomrelay_session::PeerSender;
    use roomrelay_transport::{ConnectionKey, LoopbackPeer, LoopbackTransport, PeerMessage};

    use super::*;

    struct Client {
        session: Arc<ClientSession>,
        peer: LoopbackPeer,
    }

    impl Client {
        fn new(transport: &Arc<LoopbackTransport>, id: &str, version: &str) -> Self {
            let peer = transport.connect(Bytes::new());
            let handshake = Handshake {
                user_id: id.into(),
                display_name: format!("{id}-name"),
                game_key: "kart".into(),
                game_version: version.into(),
                ..Handshake::default()
            };
            let sender = Arc::new(PeerSender::new(transport.clone(), peer.id()));
            let session = Arc::new(ClientSession::new(
                ConnectionKey::peer(peer.id()),
                &handshake,
                sender,
            ));
            Self { session, peer }
        }

        fn events(&mut self) -> Vec<ServerEvent> {
            let mut out = Vec::new();
            while let Some(PeerMessage::Data { data, .. }) = self.peer.try_recv() {
                out.push(ServerEvent::decode(data).unwrap());
            }
            out
        }
    }

    fn room(params: RoomParameters) -> Arc<Room> {
        Room::new("Lobby", "kart", "1.0", Platform::Linux, params)
    }

    fn master(id: &str) -> ServerEvent {
        ServerEvent::MasterChanged { id: id.into() }
    }

    #[tokio::test]
    async fn test_first_player_becomes_master() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut a = Client::new(&transport, "A", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);

        assert_eq!(core.master_id(), Some("A"));
        assert_eq!(a.events(), vec![master("A")]);
    }

    #[tokio::test]
    async fn test_joiner_gets_roster_master_then_cache() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut a = Client::new(&transport, "A", "1.0");
        let mut b = Client::new(&transport, "B", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.process(
            &a.session,
            RoomInstruction::RawDataCache {
                key: "map".into(),
                data: Bytes::from_static(b"desert"),
            },
            Delivery::Unreliable,
        );
        a.events();

        core.add_player(&b.session);

        let events = b.events();
        assert!(matches!(&events[0], ServerEvent::PlayerConnected { id, .. } if id == "A"));
        assert_eq!(events[1], master("A"));
        assert_eq!(
            events[2],
            ServerEvent::CacheData {
                key: "map".into(),
                data: Bytes::from_static(b"desert"),
            }
        );
        assert_eq!(events.len(), 3);

        let events = a.events();
        assert!(matches!(&events[..], [ServerEvent::PlayerConnected { id, .. }] if id == "B"));
    }

    #[tokio::test]
    async fn test_master_leaving_promotes_next_member() {
        let transport = Arc::new(LoopbackTransport::new());
        let a = Client::new(&transport, "A", "1.0");
        let mut b = Client::new(&transport, "B", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.add_player(&b.session);
        b.events();

        let outcome = core.remove_player(&a.session, Instant::now());

        assert_eq!(outcome, Departure::Remaining);
        assert_eq!(core.master_id(), Some("B"));
        assert!(core.has_departed("A"));
        assert_eq!(
            b.events(),
            vec![ServerEvent::PlayerDisconnected { id: "A".into() }, master("B")]
        );
    }

    #[tokio::test]
    async fn test_last_member_leaving_empties_room_silently() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut a = Client::new(&transport, "A", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        a.events();

        let now = Instant::now();
        assert_eq!(core.remove_player(&a.session, now), Departure::Emptied);
        assert_eq!(core.master_id(), None);
        assert_eq!(core.liveness().empty_since(), Some(now));
        assert!(a.events().is_empty());
        assert_eq!(core.remove_player(&a.session, now), Departure::NotMember);
    }

    #[tokio::test]
    async fn test_lock_from_non_master_is_ignored() {
        let transport = Arc::new(LoopbackTransport::new());
        let a = Client::new(&transport, "A", "1.0");
        let b = Client::new(&transport, "B", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.add_player(&b.session);

        core.process(&b.session, RoomInstruction::Lock, Delivery::default());
        assert!(core.lock_state().is_open());

        core.process(&a.session, RoomInstruction::Lock, Delivery::default());
        assert_eq!(core.lock_state(), LockState::Locked);
        assert!(matches!(
            core.check_join(&Client::new(&transport, "C", "1.0").session, None),
            Err(RoomError::RoomLocked(_))
        ));
    }

    #[tokio::test]
    async fn test_any_member_may_claim_master() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut a = Client::new(&transport, "A", "1.0");
        let b = Client::new(&transport, "B", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.add_player(&b.session);
        a.events();

        core.process(&b.session, RoomInstruction::MakeMasterClient, Delivery::default());

        assert_eq!(core.master_id(), Some("B"));
        assert_eq!(a.events(), vec![master("B")]);
    }

    #[tokio::test]
    async fn test_oversized_cache_value_is_dropped() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut a = Client::new(&transport, "A", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        a.events();

        core.process(
            &a.session,
            RoomInstruction::RawDataCache {
                key: "big".into(),
                data: Bytes::from(vec![0u8; MAX_CACHE_VALUE_LEN + 1]),
            },
            Delivery::default(),
        );

        assert!(core.cached("big").is_none());
        assert!(a.events().is_empty());
    }

    #[tokio::test]
    async fn test_nearby_relay_without_proximity_is_noop() {
        let transport = Arc::new(LoopbackTransport::new());
        let a = Client::new(&transport, "A", "1.0");
        let mut b = Client::new(&transport, "B", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.add_player(&b.session);
        b.events();

        core.process(
            &a.session,
            RoomInstruction::RawDataToNearby {
                rect: Rect::new(-10.0, -10.0, 20.0, 20.0),
                data: Bytes::from_static(b"hi"),
            },
            Delivery::default(),
        );

        assert!(b.events().is_empty());
    }

    #[tokio::test]
    async fn test_nearby_relay_reaches_only_members_in_rect() {
        let transport = Arc::new(LoopbackTransport::new());
        let a = Client::new(&transport, "A", "1.0");
        let mut b = Client::new(&transport, "B", "1.0");
        let mut c = Client::new(&transport, "C", "1.0");
        let room = room(RoomParameters {
            proximity: Some(ProximityConfig {
                bounds: Rect::new(-1000.0, -1000.0, 2000.0, 2000.0),
                capacity: 8,
            }),
            ..RoomParameters::default()
        });

        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.add_player(&b.session);
        core.add_player(&c.session);
        b.events();
        c.events();

        // B moves far away; C stays at the origin.
        core.process(
            &b.session,
            RoomInstruction::RawDataToNearby {
                rect: Rect::new(490.0, 490.0, 20.0, 20.0),
                data: Bytes::from_static(b"move"),
            },
            Delivery::default(),
        );
        c.events();

        core.process(
            &a.session,
            RoomInstruction::RawDataToNearby {
                rect: Rect::new(-10.0, -10.0, 20.0, 20.0),
                data: Bytes::from_static(b"near"),
            },
            Delivery::Unreliable,
        );

        assert!(b.events().is_empty());
        assert_eq!(
            c.events(),
            vec![ServerEvent::RoomRaw {
                sender_id: "A".into(),
                data: Bytes::from_static(b"near"),
            }]
        );
    }

    #[tokio::test]
    async fn test_message_from_non_member_is_ignored() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut a = Client::new(&transport, "A", "1.0");
        let outsider = Client::new(&transport, "X", "1.0");
        let room = room(RoomParameters::default());

        let mut core = room.lock().await;
        core.add_player(&a.session);
        a.events();

        core.process(
            &outsider.session,
            RoomInstruction::Broadcast {
                data: Bytes::from_static(b"spam"),
            },
            Delivery::default(),
        );

        assert!(a.events().is_empty());
    }

    #[tokio::test]
    async fn test_is_reapable_after_idle_life() {
        let transport = Arc::new(LoopbackTransport::new());
        let a = Client::new(&transport, "A", "1.0");
        let room = room(RoomParameters::default());
        let idle = Duration::from_secs(30);

        let mut core = room.lock().await;
        assert!(!core.is_reapable(Instant::now() + idle, idle), "never emptied");

        core.add_player(&a.session);
        let emptied = Instant::now();
        core.remove_player(&a.session, emptied);

        assert!(!core.is_reapable(emptied + Duration::from_secs(29), idle));
        assert!(core.is_reapable(emptied + idle, idle));
    }
}
