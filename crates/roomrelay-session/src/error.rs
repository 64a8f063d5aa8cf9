//! Error types for the session layer.

use roomrelay_protocol::RejectCode;

/// Why a connection was refused at handshake.
///
/// Every variant maps to the one-byte [`RejectCode`] sent back to the
/// client; no session is created for a refused connection.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The shared server key didn't match.
    #[error("unauthorized connection")]
    UnauthorizedConnection,

    /// The game key is missing or outside the expected namespace, or the
    /// client didn't supply an id.
    #[error("unauthorized game: {0:?}")]
    UnauthorizedGame(String),

    /// Another connection is already signed in with this id.
    #[error("user {0:?} is already connected")]
    AlreadyConnected(String),

    /// The handshake couldn't be processed at all (e.g. malformed bytes).
    #[error("handshake failed: {0}")]
    ServerException(String),
}

impl AdmissionError {
    /// The wire code reported to the refused client.
    pub fn reject_code(&self) -> RejectCode {
        match self {
            Self::UnauthorizedConnection => RejectCode::UnauthorizedConnection,
            Self::UnauthorizedGame(_) => RejectCode::UnauthorizedGame,
            Self::AlreadyConnected(_) => RejectCode::UserAlreadyConnected,
            Self::ServerException(_) => RejectCode::ServerException,
        }
    }
}

impl From<roomrelay_protocol::ProtocolError> for AdmissionError {
    fn from(e: roomrelay_protocol::ProtocolError) -> Self {
        Self::ServerException(e.to_string())
    }
}
