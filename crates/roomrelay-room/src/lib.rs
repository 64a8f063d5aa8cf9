//! Rooms and games for Roomrelay.
//!
//! A [`Room`] is a named group of sessions inside one game. It elects a
//! master, can be locked by that master, keeps a small replicated
//! key/value cache, and relays raw payloads between members: to everyone,
//! to one member, or to members near a point when proximity is enabled.
//!
//! # Key types
//!
//! - [`Room`] / [`RoomCore`]: the room and its lock-protected state
//! - [`GameTable`] / [`Game`]: rooms partitioned by game key
//! - [`SpatialIndex`]: the range-query seam behind proximity relay
//! - [`LockState`] / [`Liveness`]: room state machines
//! - [`RoomError`]: admission failures, mapped to wire failure codes
//!
//! Sessions and rooms never lock each other: the registry takes its own
//! lock before any room lock, and in-room traffic takes only the room's.

mod config;
mod error;
mod game;
mod room;
mod spatial;

pub use config::{Liveness, LockState};
pub use error::RoomError;
pub use game::{Game, GameTable};
pub use room::{Departure, Room, RoomCore, MAX_CACHE_VALUE_LEN};
pub use spatial::{PointIndex, SpatialIndex};
