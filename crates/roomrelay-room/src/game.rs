//! Games: the namespace rooms live in.
//!
//! Rooms are partitioned by game key, and a room id is unique within its
//! game case-insensitively. A game exists while it has at least one room;
//! it is created on the first room create and dropped with its last room.
//!
//! Like [`SessionTable`](roomrelay_session::SessionTable), the game table is
//! plain data owned by the registry and touched only under its lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{Room, RoomError};

/// One game's rooms, in creation order.
///
/// Ids are looked up through a lowercase-key index; iteration walks the
/// rooms oldest first, so "the first eligible room" is the oldest one.
#[derive(Debug)]
pub struct Game {
    key: String,
    rooms: BTreeMap<u64, Arc<Room>>,
    by_key: HashMap<String, u64>,
    next_seq: u64,
}

impl Game {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            rooms: BTreeMap::new(),
            by_key: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Looks a room up by id, ignoring case.
    pub fn room(&self, id: &str) -> Option<&Arc<Room>> {
        let seq = self.by_key.get(&Room::normalize_key(id))?;
        self.rooms.get(seq)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.room(id).is_some()
    }

    /// Rooms, oldest first.
    pub fn rooms(&self) -> impl Iterator<Item = &Arc<Room>> {
        self.rooms.values()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// # Errors
    /// [`RoomError::AlreadyExists`] if the id is taken in any casing.
    pub fn insert(&mut self, room: Arc<Room>) -> Result<(), RoomError> {
        if self.by_key.contains_key(room.key()) {
            return Err(RoomError::AlreadyExists(room.id().to_owned()));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_key.insert(room.key().to_owned(), seq);
        self.rooms.insert(seq, room);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Room>> {
        let seq = self.by_key.remove(&Room::normalize_key(id))?;
        self.rooms.remove(&seq)
    }
}

/// Every game with at least one room.
#[derive(Debug, Default)]
pub struct GameTable {
    games: HashMap<String, Game>,
}

impl GameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, game_key: &str) -> Option<&Game> {
        self.games.get(game_key)
    }

    /// Looks up a room without creating its game.
    pub fn room(&self, game_key: &str, room_id: &str) -> Option<Arc<Room>> {
        self.games.get(game_key)?.room(room_id).cloned()
    }

    /// Adds `room` to its game, creating the game if needed.
    ///
    /// # Errors
    /// [`RoomError::AlreadyExists`] if the game already has a room with
    /// that id.
    pub fn insert_room(&mut self, room: Arc<Room>) -> Result<(), RoomError> {
        let game = self
            .games
            .entry(room.game_key().to_owned())
            .or_insert_with(|| {
                tracing::debug!(game_key = room.game_key(), "game created");
                Game::new(room.game_key())
            });
        game.insert(room)
    }

    /// Unlinks a room. Returns the room, and drops the game if it was the
    /// last one.
    pub fn remove_room(&mut self, game_key: &str, room_id: &str) -> Option<Arc<Room>> {
        let game = self.games.get_mut(game_key)?;
        let room = game.remove(room_id)?;
        if game.is_empty() {
            self.games.remove(game_key);
            tracing::debug!(game_key, "game removed");
        }
        Some(room)
    }

    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    pub fn room_count(&self) -> usize {
        self.games.values().map(Game::room_count).sum()
    }

    /// Every room in every game.
    pub fn all_rooms(&self) -> Vec<Arc<Room>> {
        self.games
            .values()
            .flat_map(|g| g.rooms().cloned())
            .collect()
    }

    /// Drops every game and room, returning the rooms.
    pub fn drain(&mut self) -> Vec<Arc<Room>> {
        let rooms = self.all_rooms();
        self.games.clear();
        rooms
    }
}
