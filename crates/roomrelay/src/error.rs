//! Unified error type for the relay.

use roomrelay_protocol::ProtocolError;
use roomrelay_room::RoomError;
use roomrelay_session::AdmissionError;
use roomrelay_transport::TransportError;

/// Top-level error wrapping every layer's error.
///
/// Most of these never reach `main`: room failures and admission
/// rejections are answered on the wire and the connection carries on or
/// is dropped. What escapes is startup failure (binding a socket) and
/// fatal I/O.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// Binding or serving the stats endpoint.
    #[error("stats endpoint: {0}")]
    Stats(#[source] std::io::Error),
}
