//! Error types for the room layer.

use roomrelay_protocol::FailureCode;

/// Why a room-management request was refused.
///
/// These are protocol outcomes, not faults: the caller gets the matching
/// [`FailureCode`] and its session carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// No room with this id exists in the caller's game.
    #[error("room {0:?} does not exist")]
    DoesNotExist(String),

    /// A room with this id (case-insensitively) already exists.
    #[error("room {0:?} already exists")]
    AlreadyExists(String),

    /// The room is at its player limit.
    #[error("room {0:?} is full")]
    RoomFull(String),

    /// The master client has locked the room.
    #[error("room {0:?} is locked")]
    RoomLocked(String),

    /// Password missing or wrong.
    #[error("wrong password for room {0:?}")]
    PasswordMismatch(String),

    /// The room was created for another game version.
    #[error("room {room:?} runs version {expected:?}, client has {actual:?}")]
    VersionMismatch {
        room: String,
        expected: String,
        actual: String,
    },

    /// The caller never left this room, so it can't rejoin it.
    #[error("user {user:?} may not rejoin room {room:?}")]
    RejoinNotAuthorized { room: String, user: String },

    /// No room matched a random-join request with a filter.
    #[error("no room matches the filter")]
    FilterNoMatch,

    /// No room is available for a random-join request.
    #[error("no room available")]
    NoneAvailable,
}

impl RoomError {
    /// The wire code reported to the caller.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            Self::DoesNotExist(_) | Self::NoneAvailable => FailureCode::RoomDoesNotExist,
            Self::AlreadyExists(_) => FailureCode::RoomAlreadyExists,
            Self::RoomFull(_) => FailureCode::RoomFull,
            Self::RoomLocked(_) => FailureCode::RoomLocked,
            Self::PasswordMismatch(_) => FailureCode::PasswordMismatch,
            Self::VersionMismatch { .. } => FailureCode::VersionMismatch,
            Self::RejoinNotAuthorized { .. } => FailureCode::RejoinNotAuthorized,
            Self::FilterNoMatch => FailureCode::FilterNoMatch,
        }
    }
}
