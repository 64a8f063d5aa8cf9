//! Wire protocol for Roomrelay.
//!
//! This crate defines the "language" that clients and the relay speak:
//!
//! - **Wire primitives** ([`PacketReader`], [`PacketWriter`]): fixed-width
//!   little-endian fields, length-prefixed strings, trailing blobs.
//! - **Codes and fields** ([`Instruction`], [`EventCode`], [`FailureCode`],
//!   [`RejectCode`], [`Handshake`], [`RoomParameters`], [`RoomFilter`]).
//! - **Messages** ([`LobbyRequest`], [`RoomInstruction`], [`ServerEvent`]):
//!   parsed client requests and encodable server events.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): JSON documents such as
//!   the room list.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about connections or rooms. It turns
//! bytes into typed requests and typed events back into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (LobbyRequest / RoomInstruction) → Registry / Room
//! Room / Registry (ServerEvent) → Protocol (bytes) → Transport
//! ```

mod codec;
mod error;
mod message;
mod types;
mod wire;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{request, LobbyRequest, RoomInstruction, ServerEvent};
pub use types::{
    EventCode, FailureCode, Handshake, Instruction, Platform, Point,
    ProximityConfig, Rect, RejectCode, RoomFilter, RoomList, RoomListing,
    RoomParameters, DEFAULT_MAX_PLAYERS,
};
pub use wire::{PacketReader, PacketWriter, MAX_STRING_LEN};
