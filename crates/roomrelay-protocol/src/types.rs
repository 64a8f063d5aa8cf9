//! Core protocol types for the relay wire format.
//!
//! Everything here is either a one-byte code that leads a message, or a
//! structured field that travels inside one. The binary layout of each
//! structured field lives next to its type (`write_to` / `read_from`), so
//! a type and its wire shape can't drift apart.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PacketReader, PacketWriter, ProtocolError};

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

/// Client → server instruction codes.
///
/// The first byte of every client message is one of these. Codes a room
/// doesn't recognise are relayed as plain broadcasts, so clients are free
/// to use other values for their own traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    FetchRoomList = 49,
    CreateRoom = 50,
    CreateOrJoinRoom = 51,
    JoinRoom = 52,
    LeaveRoom = 53,
    RejoinRoom = 54,
    JoinRandomRoom = 55,
    MakeMasterClient = 56,
    QueryRoomExists = 57,
    /// Byte-stream handshake. Datagram peers handshake in their
    /// connection request instead.
    VerifyClient = 58,
    Ping = 59,
    LockRoom = 60,
    UnlockRoom = 61,
    RawData = 62,
    RawDataCache = 63,
    RawDataToClient = 64,
    RawDataToNearbyClients = 67,
}

impl Instruction {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            49 => Self::FetchRoomList,
            50 => Self::CreateRoom,
            51 => Self::CreateOrJoinRoom,
            52 => Self::JoinRoom,
            53 => Self::LeaveRoom,
            54 => Self::RejoinRoom,
            55 => Self::JoinRandomRoom,
            56 => Self::MakeMasterClient,
            57 => Self::QueryRoomExists,
            58 => Self::VerifyClient,
            59 => Self::Ping,
            60 => Self::LockRoom,
            61 => Self::UnlockRoom,
            62 => Self::RawData,
            63 => Self::RawDataCache,
            64 => Self::RawDataToClient,
            67 => Self::RawDataToNearbyClients,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Server → client event codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventCode {
    RoomRaw = 0,
    PlayerConnected = 1,
    PlayerDisconnected = 2,
    MasterChanged = 3,
    RoomDisconnected = 4,
    CacheData = 5,
    Verified = 8,
    RoomList = 9,
    RoomCreated = 10,
    RoomJoined = 11,
    CreateFailed = 12,
    JoinFailed = 13,
    RoomRejoined = 14,
    RejoinFailed = 15,
    RandomJoinFailed = 16,
    RoomExists = 17,
}

impl EventCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::RoomRaw,
            1 => Self::PlayerConnected,
            2 => Self::PlayerDisconnected,
            3 => Self::MasterChanged,
            4 => Self::RoomDisconnected,
            5 => Self::CacheData,
            8 => Self::Verified,
            9 => Self::RoomList,
            10 => Self::RoomCreated,
            11 => Self::RoomJoined,
            12 => Self::CreateFailed,
            13 => Self::JoinFailed,
            14 => Self::RoomRejoined,
            15 => Self::RejoinFailed,
            16 => Self::RandomJoinFailed,
            17 => Self::RoomExists,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Why a room-management request failed. Sent as a single byte after
/// the failure event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FailureCode {
    RoomFull = 0,
    RoomLocked = 1,
    RoomDoesNotExist = 2,
    PasswordMismatch = 3,
    RejoinNotAuthorized = 4,
    VersionMismatch = 5,
    RoomAlreadyExists = 6,
    UnauthorizedApp = 7,
    FilterNoMatch = 8,
}

impl FailureCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::RoomFull,
            1 => Self::RoomLocked,
            2 => Self::RoomDoesNotExist,
            3 => Self::PasswordMismatch,
            4 => Self::RejoinNotAuthorized,
            5 => Self::VersionMismatch,
            6 => Self::RoomAlreadyExists,
            7 => Self::UnauthorizedApp,
            8 => Self::FilterNoMatch,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Why a connection was refused at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectCode {
    ServerException = 91,
    UnauthorizedConnection = 92,
    UnauthorizedGame = 93,
    UserAlreadyConnected = 94,
}

impl RejectCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            91 => Self::ServerException,
            92 => Self::UnauthorizedConnection,
            93 => Self::UnauthorizedGame,
            94 => Self::UserAlreadyConnected,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The client's platform, as reported in its handshake.
///
/// Unknown values are kept as [`Platform::Other`] so they round-trip to
/// other members unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Platform {
    #[default]
    Editor,
    Windows,
    MacOs,
    Linux,
    Ios,
    Android,
    Other(u8),
}

impl From<u8> for Platform {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Editor,
            1 => Self::Windows,
            2 => Self::MacOs,
            3 => Self::Linux,
            4 => Self::Ios,
            5 => Self::Android,
            other => Self::Other(other),
        }
    }
}

impl From<Platform> for u8 {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Editor => 0,
            Platform::Windows => 1,
            Platform::MacOs => 2,
            Platform::Linux => 3,
            Platform::Ios => 4,
            Platform::Android => 5,
            Platform::Other(code) => code,
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A 2-D position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle anchored at its minimum corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Min edges inclusive, max edges exclusive.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.y >= self.y
            && p.x < self.x + self.width
            && p.y < self.y + self.height
    }

    /// A rectangle is usable for spatial queries when every component is
    /// finite and it has positive area.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    pub fn write_to(&self, writer: &mut PacketWriter) {
        writer
            .write_f32(self.x)
            .write_f32(self.y)
            .write_f32(self.width)
            .write_f32(self.height);
    }

    pub fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            width: reader.read_f32()?,
            height: reader.read_f32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Room parameters
// ---------------------------------------------------------------------------

/// A small byte → byte tag set.
///
/// Rooms carry one as their tags; join-random and list requests carry one
/// as a query. See [`RoomFilter::is_match`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomFilter(BTreeMap<u8, u8>);

impl RoomFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: u8, value: u8) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: u8, value: u8) -> Option<u8> {
        self.0.insert(key, value)
    }

    pub fn get(&self, key: u8) -> Option<u8> {
        self.0.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// True iff every pair in `query` appears in `self` with the same
    /// value. Extra tags on `self` are ignored, so an empty query matches
    /// everything and a non-empty query never matches an untagged room.
    pub fn is_match(&self, query: &RoomFilter) -> bool {
        query.iter().all(|(k, v)| self.get(k) == Some(v))
    }

    /// Writes `count: u16` followed by `count` key/value byte pairs.
    pub fn write_to(&self, writer: &mut PacketWriter) {
        // At most 256 distinct u8 keys, which always fits.
        writer.write_u16(self.0.len() as u16);
        for (k, v) in self.iter() {
            writer.write_u8(k).write_u8(v);
        }
    }

    pub fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
        let count = reader.read_u16()?;
        let mut filter = Self::new();
        for _ in 0..count {
            let key = reader.read_u8()?;
            let value = reader.read_u8()?;
            filter.insert(key, value);
        }
        Ok(filter)
    }

    /// Reads a filter if any bytes remain, otherwise returns an empty one.
    pub fn read_optional(
        reader: &mut PacketReader,
    ) -> Result<Self, ProtocolError> {
        if reader.is_empty() {
            return Ok(Self::new());
        }
        Self::read_from(reader)
    }
}

impl FromIterator<(u8, u8)> for RoomFilter {
    fn from_iter<I: IntoIterator<Item = (u8, u8)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Spatial indexing settings for a room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityConfig {
    /// World bounds covered by the index.
    pub bounds: Rect,
    /// Capacity hint for the index.
    pub capacity: u32,
}

/// Default room size when the creator doesn't specify one.
pub const DEFAULT_MAX_PLAYERS: u32 = 10;

/// Settings a room is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomParameters {
    /// Listed and eligible for random join.
    pub is_public: bool,
    /// Required by `JoinRoom` when set and non-empty.
    pub password: Option<String>,
    /// Tags matched by random join and room listing.
    pub filter: RoomFilter,
    pub max_players: u32,
    /// Enables proximity relay when present.
    pub proximity: Option<ProximityConfig>,
}

impl Default for RoomParameters {
    fn default() -> Self {
        Self {
            is_public: true,
            password: None,
            filter: RoomFilter::new(),
            max_players: DEFAULT_MAX_PLAYERS,
            proximity: None,
        }
    }
}

impl RoomParameters {
    /// The password a joiner must give. An empty password is no password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn has_password(&self) -> bool {
        self.password().is_some()
    }

    /// Appends the parameter block to a message.
    pub fn write_to(&self, writer: &mut PacketWriter) {
        writer.write_bool(self.is_public);
        writer.write_bool(self.has_password());
        if let Some(password) = self.password() {
            writer.write_string(password);
        }
        self.filter.write_to(writer);
        writer.write_i32(i32::try_from(self.max_players).unwrap_or(i32::MAX));
        writer.write_bool(self.proximity.is_some());
        if let Some(proximity) = &self.proximity {
            proximity.bounds.write_to(writer);
            writer.write_i32(i32::try_from(proximity.capacity).unwrap_or(i32::MAX));
        }
    }

    /// Reads a parameter block, best effort.
    ///
    /// An empty block yields the defaults. Fields are read in order and
    /// anything missing past the first gap keeps its default. A missing,
    /// truncated or degenerate proximity section disables proximity
    /// without affecting the other fields.
    pub fn read_from(reader: &mut PacketReader) -> Self {
        let mut params = Self::default();
        if reader.is_empty() {
            return params;
        }
        if params.read_core(reader).is_err() {
            return params;
        }
        params.proximity = Self::read_proximity(reader);
        params
    }

    fn read_core(
        &mut self,
        reader: &mut PacketReader,
    ) -> Result<(), ProtocolError> {
        self.is_public = reader.read_bool()?;
        if reader.read_bool()? {
            let password = reader.read_string()?;
            self.password = (!password.is_empty()).then_some(password);
        }
        self.filter = RoomFilter::read_from(reader)?;
        self.max_players = u32::try_from(reader.read_i32()?).unwrap_or(0);
        Ok(())
    }

    fn read_proximity(reader: &mut PacketReader) -> Option<ProximityConfig> {
        if !reader.read_bool().ok()? {
            return None;
        }
        let bounds = Rect::read_from(reader).ok()?;
        let capacity = u32::try_from(reader.read_i32().ok()?).ok()?;
        if !bounds.is_valid() || capacity == 0 {
            return None;
        }
        Some(ProximityConfig { bounds, capacity })
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Credentials and identity a client presents when connecting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Handshake {
    /// Shared server key.
    pub key: String,
    /// Caller-chosen id, unique among connected clients.
    pub user_id: String,
    pub display_name: String,
    pub game_key: String,
    pub game_version: String,
    pub platform: Platform,
}

impl Handshake {
    pub fn write_to(&self, writer: &mut PacketWriter) {
        writer
            .write_string(&self.key)
            .write_string(&self.user_id)
            .write_string(&self.display_name)
            .write_string(&self.game_key)
            .write_string(&self.game_version)
            .write_u8(self.platform.into());
    }

    pub fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            key: reader.read_string()?,
            user_id: reader.read_string()?,
            display_name: reader.read_string()?,
            game_key: reader.read_string()?,
            game_version: reader.read_string()?,
            platform: reader.read_u8()?.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Room listing (JSON payload)
// ---------------------------------------------------------------------------

/// One entry of a room list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    pub id: String,
    pub has_password: bool,
    pub player_count: u32,
    pub max_players: u32,
}

/// The JSON document carried by a `RoomList` event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomList {
    pub list: Vec<RoomListing>,
}
