//! The session registry: admission gateway and message dispatcher.
//!
//! Every admitted connection has a [`ClientSession`] here, and every room
//! lives in the [`GameTable`]. Both sit behind one registry lock. Each
//! room has its own lock besides, and the order is always registry, then
//! room:
//!
//! - Room-management requests on one room (create, join, rejoin) take the
//!   registry lock and, while holding it, the target room's lock.
//! - Scans over a game (list, random join) snapshot its rooms and drop the
//!   registry lock before visiting each room, so one busy room never
//!   stalls the lobby.
//! - In-room traffic takes only the room lock, reached through the
//!   session's own room link, so busy rooms never contend on the registry.
//! - The reaper takes the registry lock, then each expired room's.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use roomrelay_protocol::{
    Codec, Handshake, Instruction, JsonCodec, LobbyRequest, RoomFilter,
    RoomInstruction, RoomList, RoomParameters, ServerEvent, MAX_STRING_LEN,
};
use roomrelay_room::{Departure, GameTable, Room, RoomCore, RoomError};
use roomrelay_session::{
    AdmissionError, Authenticator, ClientSession, Sender, SessionTable,
};
use roomrelay_transport::{ConnectionKey, Delivery};
use tokio::sync::Mutex;

use crate::reaper::Reaper;
use crate::stats::{GameStats, RelayStats};

/// Most rooms returned by one room-list request.
pub const MAX_ROOM_LIST: usize = 100;

#[derive(Debug, Default)]
struct RegistryState {
    sessions: SessionTable,
    games: GameTable,
}

impl RegistryState {
    /// True if `session` is still the admitted session for its connection.
    /// False once it has disconnected or been replaced by a re-handshake.
    fn owns(&self, session: &Arc<ClientSession>) -> bool {
        self.sessions
            .get(&session.connection_key())
            .is_some_and(|current| Arc::ptr_eq(&current, session))
    }
}

/// Admits clients and routes their messages.
pub struct SessionRegistry<A: Authenticator> {
    state: Mutex<RegistryState>,
    auth: A,
    reaper: Reaper,
    idle_life: Duration,
    codec: JsonCodec,
}

impl<A: Authenticator> SessionRegistry<A> {
    /// Creates an empty registry. Empty rooms are kept `idle_life` before
    /// they are destroyed.
    pub fn new(auth: A, idle_life: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            auth,
            reaper: Reaper::new(),
            idle_life,
            codec: JsonCodec,
        }
    }

    pub fn idle_life(&self) -> Duration {
        self.idle_life
    }

    // -----------------------------------------------------------------------
    // Admission and teardown
    // -----------------------------------------------------------------------

    /// Authenticates a handshake and records the session.
    ///
    /// A second handshake on an already-admitted connection first releases
    /// the identity it replaces.
    ///
    /// # Errors
    /// Whatever the authenticator refuses, or
    /// [`AdmissionError::AlreadyConnected`] if the id is signed in on
    /// another connection. No session exists afterwards.
    pub async fn admit(
        &self,
        key: ConnectionKey,
        handshake: &Handshake,
        sender: Arc<dyn Sender>,
    ) -> Result<Arc<ClientSession>, AdmissionError> {
        if let Err(e) = self.auth.authenticate(handshake).await {
            tracing::info!(
                conn = %key,
                user_id = %handshake.user_id,
                game_key = %handshake.game_key,
                error = %e,
                "handshake refused"
            );
            return Err(e);
        }

        let previous = self.state.lock().await.sessions.remove(&key);
        if let Some(previous) = previous {
            tracing::info!(conn = %key, user_id = %previous.id(), "re-handshake, releasing previous identity");
            self.release_room(&previous, true).await;
        }

        let admitted = self
            .state
            .lock()
            .await
            .sessions
            .admit(ClientSession::new(key, handshake, sender));
        match admitted {
            Ok(session) => {
                tracing::info!(
                    conn = %key,
                    user_id = %session.id(),
                    game_key = %session.game_key(),
                    game_version = %session.game_version(),
                    "client admitted"
                );
                Ok(session)
            }
            Err(e) => {
                tracing::info!(conn = %key, error = %e, "handshake refused");
                Err(e)
            }
        }
    }

    /// Forgets a connection the transport has lost.
    ///
    /// The session leaves its room without a notice, since there is no
    /// one left to read it. Returns whether the connection was admitted.
    pub async fn disconnect(&self, key: ConnectionKey) -> bool {
        let session = self.state.lock().await.sessions.remove(&key);
        let Some(session) = session else {
            return false;
        };
        self.release_room(&session, false).await;
        tracing::info!(conn = %key, user_id = %session.id(), "client disconnected");
        true
    }

    /// Removes a connection from the server side: leaves its room with a
    /// notice, then closes it.
    pub async fn kick(&self, key: ConnectionKey) -> bool {
        let session = self.state.lock().await.sessions.remove(&key);
        let Some(session) = session else {
            return false;
        };
        self.release_room(&session, true).await;
        session.close();
        tracing::info!(conn = %key, user_id = %session.id(), "client kicked");
        true
    }

    /// Drops every room and closes every connection.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.state.lock().await;
        for room in state.games.drain() {
            let mut core = room.lock().await;
            core.clear_members();
            core.mark_destroyed();
        }
        let sessions = state.sessions.drain();
        drop(state);

        self.reaper.clear();
        for session in &sessions {
            session.leave_room();
            session.close();
        }
        tracing::info!(clients = sessions.len(), "registry shut down");
        sessions.len()
    }

    /// Destroys every armed room whose grace window has elapsed by `now`
    /// and that nobody rejoined. Returns how many were destroyed.
    pub async fn reap_due(&self, now: Instant) -> usize {
        let due = self.reaper.take_due(now);
        if due.is_empty() {
            return 0;
        }

        let mut state = self.state.lock().await;
        let mut reaped = 0;
        for room in due {
            let linked = state
                .games
                .room(room.game_key(), room.id())
                .is_some_and(|current| Arc::ptr_eq(&current, &room));
            if !linked {
                continue;
            }

            let mut core = room.lock().await;
            if core.is_reapable(now, self.idle_life) {
                state.games.remove_room(room.game_key(), room.id());
                core.mark_destroyed();
                reaped += 1;
            } else if let Some(since) = core.liveness().empty_since() {
                // Emptied again after a rejoin; wait out the new window.
                self.reaper.arm(&room, since + self.idle_life);
            }
        }
        reaped
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub async fn session(&self, key: ConnectionKey) -> Option<Arc<ClientSession>> {
        self.state.lock().await.sessions.get(&key)
    }

    pub async fn room(&self, game_key: &str, room_id: &str) -> Option<Arc<Room>> {
        self.state.lock().await.games.room(game_key, room_id)
    }

    pub async fn stats(&self) -> RelayStats {
        let state = self.state.lock().await;
        let clients = state.sessions.count_by_game();
        let per_game = state
            .games
            .games()
            .map(|game| {
                let stats = GameStats {
                    room_count: game.room_count(),
                    client_count: clients.get(game.key()).copied().unwrap_or(0),
                };
                (game.key().to_owned(), stats)
            })
            .collect();
        RelayStats {
            total_clients: state.sessions.len(),
            total_games: state.games.game_count(),
            total_rooms: state.games.room_count(),
            per_game,
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Handles one message from an admitted connection.
    ///
    /// Outside a room it is a room-management request; inside a room it
    /// goes to the room, except `LeaveRoom`.
    pub async fn handle_message(&self, key: ConnectionKey, data: Bytes, delivery: Delivery) {
        let Some(session) = self.session(key).await else {
            tracing::debug!(conn = %key, "message from unadmitted connection, ignoring");
            return;
        };

        match session.room::<Room>() {
            Some(room) => self.handle_in_room(&session, &room, data, delivery).await,
            None => self.handle_lobby(&session, data).await,
        }
    }

    async fn handle_in_room(
        &self,
        session: &Arc<ClientSession>,
        room: &Arc<Room>,
        data: Bytes,
        delivery: Delivery,
    ) {
        if data.first() == Some(&Instruction::LeaveRoom.code()) {
            self.release_room(session, true).await;
            return;
        }
        match RoomInstruction::parse(data) {
            Ok(instruction) => room.lock().await.process(session, instruction, delivery),
            Err(e) => tracing::debug!(
                user_id = %session.id(),
                room_id = room.id(),
                error = %e,
                "malformed room message, ignoring"
            ),
        }
    }

    async fn handle_lobby(&self, session: &Arc<ClientSession>, data: Bytes) {
        let request = match LobbyRequest::parse(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(user_id = %session.id(), error = %e, "malformed request, ignoring");
                return;
            }
        };

        match request {
            LobbyRequest::FetchRoomList { filter } => self.fetch_room_list(session, &filter).await,
            LobbyRequest::CreateRoom { room_id, params } => {
                self.create_room(session, &room_id, params).await
            }
            LobbyRequest::CreateOrJoinRoom {
                room_id,
                max_players,
            } => self.create_or_join_room(session, &room_id, max_players).await,
            LobbyRequest::JoinRoom { room_id, password } => {
                self.join_room(session, &room_id, password.as_deref()).await
            }
            LobbyRequest::RejoinRoom { room_id } => self.rejoin_room(session, &room_id).await,
            LobbyRequest::JoinRandomRoom { filter } => self.join_random_room(session, &filter).await,
            LobbyRequest::QueryRoomExists { room_id } => {
                self.query_room_exists(session, &room_id).await
            }
            LobbyRequest::VerifyClient(_) => {
                tracing::debug!(user_id = %session.id(), "handshake reached dispatcher, ignoring")
            }
            LobbyRequest::LeaveRoom | LobbyRequest::Ping | LobbyRequest::Ignored(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Room management
    // -----------------------------------------------------------------------

    /// `CreateRoom`: fails if the id is taken in any casing.
    pub async fn create_room(
        &self,
        session: &Arc<ClientSession>,
        room_id: &str,
        params: RoomParameters,
    ) {
        let mut state = self.state.lock().await;
        if !state.owns(session) {
            return;
        }
        if let Err(e) = create_locked(&mut state, session, room_id, params).await {
            tracing::debug!(user_id = %session.id(), error = %e, "create failed");
            session.send(&ServerEvent::CreateFailed(e.failure_code()));
        }
    }

    /// `CreateOrJoinRoom`: creates with default parameters, or joins
    /// without a password check.
    pub async fn create_or_join_room(
        &self,
        session: &Arc<ClientSession>,
        room_id: &str,
        max_players: u32,
    ) {
        let mut state = self.state.lock().await;
        if !state.owns(session) {
            return;
        }

        let Some(room) = state.games.room(session.game_key(), room_id) else {
            let params = RoomParameters {
                max_players,
                ..RoomParameters::default()
            };
            if let Err(e) = create_locked(&mut state, session, room_id, params).await {
                session.send(&ServerEvent::CreateFailed(e.failure_code()));
            }
            return;
        };

        let mut core = room.lock().await;
        match core.check_create_or_join(session) {
            Ok(()) => enter(session, &room, &mut core, ServerEvent::RoomJoined {
                room_id: room.id().to_owned(),
            }),
            Err(e) => join_failed(session, ServerEvent::JoinFailed(e.failure_code()), &e),
        }
    }

    /// `JoinRoom`: exists, version, password, lock, capacity, in that
    /// order.
    pub async fn join_room(
        &self,
        session: &Arc<ClientSession>,
        room_id: &str,
        password: Option<&str>,
    ) {
        let state = self.state.lock().await;
        if !state.owns(session) {
            return;
        }

        let Some(room) = state.games.room(session.game_key(), room_id) else {
            let e = RoomError::DoesNotExist(room_id.to_owned());
            join_failed(session, ServerEvent::JoinFailed(e.failure_code()), &e);
            return;
        };

        let mut core = room.lock().await;
        match core.check_join(session, password) {
            Ok(()) => enter(session, &room, &mut core, ServerEvent::RoomJoined {
                room_id: room.id().to_owned(),
            }),
            Err(e) => join_failed(session, ServerEvent::JoinFailed(e.failure_code()), &e),
        }
    }

    /// `RejoinRoom`: capacity, then the departed set.
    pub async fn rejoin_room(&self, session: &Arc<ClientSession>, room_id: &str) {
        let state = self.state.lock().await;
        if !state.owns(session) {
            return;
        }

        let Some(room) = state.games.room(session.game_key(), room_id) else {
            let e = RoomError::DoesNotExist(room_id.to_owned());
            join_failed(session, ServerEvent::RejoinFailed(e.failure_code()), &e);
            return;
        };

        let mut core = room.lock().await;
        match core.check_rejoin(session) {
            Ok(()) => enter(session, &room, &mut core, ServerEvent::RoomRejoined {
                room_id: room.id().to_owned(),
            }),
            Err(e) => join_failed(session, ServerEvent::RejoinFailed(e.failure_code()), &e),
        }
    }

    /// `JoinRandomRoom`: the oldest eligible room.
    ///
    /// Candidates are screened without the registry lock; the winner is
    /// checked again under it before the session is seated.
    pub async fn join_random_room(&self, session: &Arc<ClientSession>, filter: &RoomFilter) {
        let Some(rooms) = self.game_rooms(session).await else {
            return;
        };
        for room in rooms {
            if !room.lock().await.is_random_candidate(session, filter) {
                continue;
            }

            let state = self.state.lock().await;
            if !state.owns(session) {
                return;
            }
            let linked = state
                .games
                .room(room.game_key(), room.id())
                .is_some_and(|current| Arc::ptr_eq(&current, &room));
            if !linked {
                continue;
            }
            let mut core = room.lock().await;
            if core.is_random_candidate(session, filter) {
                enter(session, &room, &mut core, ServerEvent::RoomJoined {
                    room_id: room.id().to_owned(),
                });
                return;
            }
        }

        let e = if filter.is_empty() {
            RoomError::NoneAvailable
        } else {
            RoomError::FilterNoMatch
        };
        join_failed(session, ServerEvent::RandomJoinFailed(e.failure_code()), &e);
    }

    /// `FetchRoomList`: up to [`MAX_ROOM_LIST`] rooms the caller could
    /// join, as JSON.
    ///
    /// The document travels as a length-prefixed string, so trailing
    /// listings are dropped until it fits rather than sending it cut.
    pub async fn fetch_room_list(&self, session: &Arc<ClientSession>, filter: &RoomFilter) {
        let Some(rooms) = self.game_rooms(session).await else {
            return;
        };
        let mut list = Vec::new();
        for room in rooms {
            if list.len() >= MAX_ROOM_LIST {
                break;
            }
            let core = room.lock().await;
            if core.is_listed_for(session, filter) {
                list.push(core.listing());
            }
        }

        let mut document = RoomList { list };
        let json = loop {
            match self.codec.encode(&document) {
                Ok(json) if json.len() > MAX_STRING_LEN && !document.list.is_empty() => {
                    document.list.pop();
                }
                Ok(json) => break json,
                Err(e) => {
                    tracing::warn!(user_id = %session.id(), error = %e, "room list encode failed");
                    return;
                }
            }
        };
        session.send(&ServerEvent::RoomList {
            json: String::from_utf8_lossy(&json).into_owned(),
        });
    }

    /// `QueryRoomExists`, case-insensitive.
    pub async fn query_room_exists(&self, session: &Arc<ClientSession>, room_id: &str) {
        let exists = self
            .state
            .lock()
            .await
            .games
            .room(session.game_key(), room_id)
            .is_some();
        session.send(&ServerEvent::RoomExists {
            room_id: room_id.to_owned(),
            exists,
        });
    }

    /// A snapshot of the rooms in `session`'s game, taken and released
    /// under the registry lock. `None` if the session is no longer admitted.
    async fn game_rooms(&self, session: &Arc<ClientSession>) -> Option<Vec<Arc<Room>>> {
        let state = self.state.lock().await;
        if !state.owns(session) {
            return None;
        }
        Some(
            state
                .games
                .get(session.game_key())
                .map(|game| game.rooms().cloned().collect())
                .unwrap_or_default(),
        )
    }

    /// Takes `session` out of its room, arming the reaper if that emptied
    /// it. With `notify`, the session is told with `RoomDisconnected`.
    async fn release_room(&self, session: &ClientSession, notify: bool) {
        let Some(room) = session.room::<Room>() else {
            session.leave_room();
            return;
        };

        let now = Instant::now();
        let departure = {
            let mut core = room.lock().await;
            session.leave_room();
            core.remove_player(session, now)
        };
        if departure == Departure::Emptied {
            self.reaper.arm(&room, now + self.idle_life);
        }
        if notify {
            session.send(&ServerEvent::RoomDisconnected);
        }
    }
}

impl<A: Authenticator> std::fmt::Debug for SessionRegistry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("idle_life", &self.idle_life)
            .field("reaper", &self.reaper)
            .finish_non_exhaustive()
    }
}

/// Builds a room for `session`, links it into its game and seats the
/// creator. Runs under the registry lock.
async fn create_locked(
    state: &mut RegistryState,
    session: &Arc<ClientSession>,
    room_id: &str,
    params: RoomParameters,
) -> Result<(), RoomError> {
    let room = Room::new(
        room_id,
        session.game_key(),
        session.game_version(),
        session.platform(),
        params,
    );
    state.games.insert_room(Arc::clone(&room))?;

    let mut core = room.lock().await;
    tracing::info!(
        room_id = room.id(),
        game_key = room.game_key(),
        user_id = %session.id(),
        max_players = core.params().max_players,
        proximity = core.has_proximity(),
        "room created"
    );
    enter(session, &room, &mut core, ServerEvent::RoomCreated {
        room_id: room.id().to_owned(),
    });
    Ok(())
}

/// Confirms admission, then seats the session. The confirmation goes out
/// first so it precedes the roster, master and cache replay.
fn enter(session: &Arc<ClientSession>, room: &Arc<Room>, core: &mut RoomCore, reply: ServerEvent) {
    session.send(&reply);
    core.add_player(session);
    session.enter_room(room);
}

fn join_failed(session: &ClientSession, reply: ServerEvent, error: &RoomError) {
    tracing::debug!(user_id = %session.id(), error = %error, "join refused");
    session.send(&reply);
}
