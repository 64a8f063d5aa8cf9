//! Parsed client requests and encodable server events.
//!
//! A client message means different things depending on whether the
//! sender is in a room: outside a room it is a [`LobbyRequest`], inside a
//! room it is a [`RoomInstruction`]. The dispatcher decides which parser
//! to use; both start from the raw bytes.

use bytes::Bytes;

use crate::{
    EventCode, FailureCode, Handshake, Instruction, PacketReader,
    PacketWriter, Platform, ProtocolError, Rect, RejectCode, RoomFilter,
    RoomParameters, DEFAULT_MAX_PLAYERS,
};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A room-management request from a client that is not in a room.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyRequest {
    FetchRoomList {
        filter: RoomFilter,
    },
    CreateRoom {
        room_id: String,
        params: RoomParameters,
    },
    CreateOrJoinRoom {
        room_id: String,
        max_players: u32,
    },
    JoinRoom {
        room_id: String,
        password: Option<String>,
    },
    LeaveRoom,
    RejoinRoom {
        room_id: String,
    },
    JoinRandomRoom {
        filter: RoomFilter,
    },
    QueryRoomExists {
        room_id: String,
    },
    VerifyClient(Handshake),
    Ping,
    /// An in-room code sent while not in a room.
    Ignored(u8),
}

impl LobbyRequest {
    pub fn parse(message: Bytes) -> Result<Self, ProtocolError> {
        let mut reader = PacketReader::new(message);
        let code = reader.read_u8()?;
        let instruction =
            Instruction::from_code(code).ok_or(ProtocolError::UnknownCode(code))?;

        Ok(match instruction {
            Instruction::FetchRoomList => Self::FetchRoomList {
                filter: RoomFilter::read_optional(&mut reader)?,
            },
            Instruction::CreateRoom => Self::CreateRoom {
                room_id: reader.read_string()?,
                params: RoomParameters::read_from(&mut reader),
            },
            Instruction::CreateOrJoinRoom => {
                let room_id = reader.read_string()?;
                let max_players = if reader.is_empty() {
                    DEFAULT_MAX_PLAYERS
                } else {
                    u32::try_from(reader.read_i32()?).unwrap_or(0)
                };
                Self::CreateOrJoinRoom {
                    room_id,
                    max_players,
                }
            }
            Instruction::JoinRoom => {
                let room_id = reader.read_string()?;
                let password = if !reader.is_empty() && reader.read_bool()? {
                    Some(reader.read_string()?)
                } else {
                    None
                };
                Self::JoinRoom { room_id, password }
            }
            Instruction::LeaveRoom => Self::LeaveRoom,
            Instruction::RejoinRoom => Self::RejoinRoom {
                room_id: reader.read_string()?,
            },
            Instruction::JoinRandomRoom => Self::JoinRandomRoom {
                filter: RoomFilter::read_optional(&mut reader)?,
            },
            Instruction::QueryRoomExists => Self::QueryRoomExists {
                room_id: reader.read_string()?,
            },
            Instruction::VerifyClient => {
                Self::VerifyClient(Handshake::read_from(&mut reader)?)
            }
            Instruction::Ping => Self::Ping,
            Instruction::MakeMasterClient
            | Instruction::LockRoom
            | Instruction::UnlockRoom
            | Instruction::RawData
            | Instruction::RawDataCache
            | Instruction::RawDataToClient
            | Instruction::RawDataToNearbyClients => Self::Ignored(code),
        })
    }
}

/// An instruction from a client that is in a room.
///
/// Any code without a specific meaning inside a room, including the lobby
/// codes, is relayed as a [`RoomInstruction::Broadcast`].
#[derive(Debug, Clone, PartialEq)]
pub enum RoomInstruction {
    MakeMasterClient,
    Lock,
    Unlock,
    Ping,
    RawDataToClient { target_id: String, data: Bytes },
    RawDataToNearby { rect: Rect, data: Bytes },
    RawDataCache { key: String, data: Bytes },
    Broadcast { data: Bytes },
}

impl RoomInstruction {
    pub fn parse(message: Bytes) -> Result<Self, ProtocolError> {
        let mut reader = PacketReader::new(message);
        let code = reader.read_u8()?;

        Ok(match Instruction::from_code(code) {
            Some(Instruction::MakeMasterClient) => Self::MakeMasterClient,
            Some(Instruction::LockRoom) => Self::Lock,
            Some(Instruction::UnlockRoom) => Self::Unlock,
            Some(Instruction::Ping) => Self::Ping,
            Some(Instruction::RawDataToClient) => Self::RawDataToClient {
                target_id: reader.read_string()?,
                data: reader.read_remaining(),
            },
            Some(Instruction::RawDataToNearbyClients) => Self::RawDataToNearby {
                rect: Rect::read_from(&mut reader)?,
                data: reader.read_remaining(),
            },
            Some(Instruction::RawDataCache) => Self::RawDataCache {
                key: reader.read_string()?,
                data: reader.read_remaining(),
            },
            _ => Self::Broadcast {
                data: reader.read_remaining(),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Every message the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    RoomRaw {
        sender_id: String,
        data: Bytes,
    },
    PlayerConnected {
        id: String,
        display_name: String,
        platform: Platform,
        connection_id: u64,
    },
    PlayerDisconnected {
        id: String,
    },
    MasterChanged {
        id: String,
    },
    RoomDisconnected,
    CacheData {
        key: String,
        data: Bytes,
    },
    Verified,
    /// JSON document, see [`crate::RoomList`].
    RoomList {
        json: String,
    },
    RoomCreated {
        room_id: String,
    },
    RoomJoined {
        room_id: String,
    },
    CreateFailed(FailureCode),
    JoinFailed(FailureCode),
    RoomRejoined {
        room_id: String,
    },
    RejoinFailed(FailureCode),
    RandomJoinFailed(FailureCode),
    RoomExists {
        room_id: String,
        exists: bool,
    },
    Rejected(RejectCode),
}

impl ServerEvent {
    /// The leading byte of the encoded event.
    pub fn code(&self) -> u8 {
        let event = match self {
            Self::RoomRaw { .. } => EventCode::RoomRaw,
            Self::PlayerConnected { .. } => EventCode::PlayerConnected,
            Self::PlayerDisconnected { .. } => EventCode::PlayerDisconnected,
            Self::MasterChanged { .. } => EventCode::MasterChanged,
            Self::RoomDisconnected => EventCode::RoomDisconnected,
            Self::CacheData { .. } => EventCode::CacheData,
            Self::Verified => EventCode::Verified,
            Self::RoomList { .. } => EventCode::RoomList,
            Self::RoomCreated { .. } => EventCode::RoomCreated,
            Self::RoomJoined { .. } => EventCode::RoomJoined,
            Self::CreateFailed(_) => EventCode::CreateFailed,
            Self::JoinFailed(_) => EventCode::JoinFailed,
            Self::RoomRejoined { .. } => EventCode::RoomRejoined,
            Self::RejoinFailed(_) => EventCode::RejoinFailed,
            Self::RandomJoinFailed(_) => EventCode::RandomJoinFailed,
            Self::RoomExists { .. } => EventCode::RoomExists,
            Self::Rejected(reject) => return reject.code(),
        };
        event.code()
    }

    pub fn encode(&self) -> Bytes {
        let mut w = PacketWriter::with_code(self.code());
        match self {
            Self::RoomRaw { sender_id, data } => {
                w.write_string(sender_id).write_bytes(data);
            }
            Self::PlayerConnected {
                id,
                display_name,
                platform,
                connection_id,
            } => {
                w.write_string(id)
                    .write_string(display_name)
                    .write_u8((*platform).into())
                    .write_u64(*connection_id);
            }
            Self::PlayerDisconnected { id } | Self::MasterChanged { id } => {
                w.write_string(id);
            }
            Self::CacheData { key, data } => {
                w.write_string(key).write_bytes(data);
            }
            Self::RoomList { json } => {
                w.write_string(json);
            }
            Self::RoomCreated { room_id }
            | Self::RoomJoined { room_id }
            | Self::RoomRejoined { room_id } => {
                w.write_string(room_id);
            }
            Self::CreateFailed(code)
            | Self::JoinFailed(code)
            | Self::RejoinFailed(code)
            | Self::RandomJoinFailed(code) => {
                w.write_u8(code.code());
            }
            Self::RoomExists { room_id, exists } => {
                w.write_string(room_id).write_bool(*exists);
            }
            Self::RoomDisconnected | Self::Verified | Self::Rejected(_) => {}
        }
        w.finish()
    }

    /// Client-side decoding, used by SDKs and tests.
    pub fn decode(message: Bytes) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(message);
        let code = r.read_u8()?;
        if let Some(reject) = RejectCode::from_code(code) {
            return Ok(Self::Rejected(reject));
        }
        let event = EventCode::from_code(code).ok_or(ProtocolError::UnknownCode(code))?;

        let failure = |r: &mut PacketReader| -> Result<FailureCode, ProtocolError> {
            let raw = r.read_u8()?;
            FailureCode::from_code(raw).ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("unknown failure code {raw}"))
            })
        };

        Ok(match event {
            EventCode::RoomRaw => Self::RoomRaw {
                sender_id: r.read_string()?,
                data: r.read_remaining(),
            },
            EventCode::PlayerConnected => Self::PlayerConnected {
                id: r.read_string()?,
                display_name: r.read_string()?,
                platform: r.read_u8()?.into(),
                connection_id: r.read_u64()?,
            },
            EventCode::PlayerDisconnected => Self::PlayerDisconnected {
                id: r.read_string()?,
            },
            EventCode::MasterChanged => Self::MasterChanged {
                id: r.read_string()?,
            },
            EventCode::RoomDisconnected => Self::RoomDisconnected,
            EventCode::CacheData => Self::CacheData {
                key: r.read_string()?,
                data: r.read_remaining(),
            },
            EventCode::Verified => Self::Verified,
            EventCode::RoomList => Self::RoomList {
                json: r.read_string()?,
            },
            EventCode::RoomCreated => Self::RoomCreated {
                room_id: r.read_string()?,
            },
            EventCode::RoomJoined => Self::RoomJoined {
                room_id: r.read_string()?,
            },
            EventCode::CreateFailed => Self::CreateFailed(failure(&mut r)?),
            EventCode::JoinFailed => Self::JoinFailed(failure(&mut r)?),
            EventCode::RoomRejoined => Self::RoomRejoined {
                room_id: r.read_string()?,
            },
            EventCode::RejoinFailed => Self::RejoinFailed(failure(&mut r)?),
            EventCode::RandomJoinFailed => Self::RandomJoinFailed(failure(&mut r)?),
            EventCode::RoomExists => Self::RoomExists {
                room_id: r.read_string()?,
                exists: r.read_bool()?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Client-side request builders
// ---------------------------------------------------------------------------

/// Encoders for client requests. The server never sends these; they exist
/// for client SDKs and tests.
pub mod request {
    use super::*;

    pub fn verify_client(handshake: &Handshake) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::VerifyClient.code());
        handshake.write_to(&mut w);
        w.finish()
    }

    /// The connection-request payload for datagram peers (no code byte).
    pub fn peer_handshake(handshake: &Handshake) -> Bytes {
        let mut w = PacketWriter::new();
        handshake.write_to(&mut w);
        w.finish()
    }

    pub fn create_room(room_id: &str, params: &RoomParameters) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::CreateRoom.code());
        w.write_string(room_id);
        params.write_to(&mut w);
        w.finish()
    }

    pub fn create_or_join_room(room_id: &str, max_players: u32) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::CreateOrJoinRoom.code());
        w.write_string(room_id)
            .write_i32(i32::try_from(max_players).unwrap_or(i32::MAX));
        w.finish()
    }

    pub fn join_room(room_id: &str, password: Option<&str>) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::JoinRoom.code());
        w.write_string(room_id).write_bool(password.is_some());
        if let Some(password) = password {
            w.write_string(password);
        }
        w.finish()
    }

    pub fn rejoin_room(room_id: &str) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::RejoinRoom.code());
        w.write_string(room_id);
        w.finish()
    }

    pub fn join_random_room(filter: &RoomFilter) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::JoinRandomRoom.code());
        filter.write_to(&mut w);
        w.finish()
    }

    pub fn fetch_room_list(filter: &RoomFilter) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::FetchRoomList.code());
        filter.write_to(&mut w);
        w.finish()
    }

    pub fn query_room_exists(room_id: &str) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::QueryRoomExists.code());
        w.write_string(room_id);
        w.finish()
    }

    /// A bare instruction with no fields (leave, lock, unlock, ping,
    /// make-master).
    pub fn bare(instruction: Instruction) -> Bytes {
        PacketWriter::with_code(instruction.code()).finish()
    }

    pub fn raw_data(data: &[u8]) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::RawData.code());
        w.write_bytes(data);
        w.finish()
    }

    pub fn raw_data_cache(key: &str, data: &[u8]) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::RawDataCache.code());
        w.write_string(key).write_bytes(data);
        w.finish()
    }

    pub fn raw_data_to_client(target_id: &str, data: &[u8]) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::RawDataToClient.code());
        w.write_string(target_id).write_bytes(data);
        w.finish()
    }

    pub fn raw_data_to_nearby(rect: Rect, data: &[u8]) -> Bytes {
        let mut w = PacketWriter::with_code(Instruction::RawDataToNearbyClients.code());
        rect.write_to(&mut w);
        w.write_bytes(data);
        w.finish()
    }
}
