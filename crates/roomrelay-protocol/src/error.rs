//! Error types for the protocol layer.
//!
//! Each crate in Roomrelay defines its own error enum. A `ProtocolError`
//! always means the bytes were wrong, never that the network or a room
//! misbehaved.

/// Errors that can occur while reading or writing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message ended before a field could be read.
    #[error("message truncated: needed {needed} bytes, {available} left")]
    Truncated { needed: usize, available: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// The leading code byte is not one this side understands.
    #[error("unknown message code {0}")]
    UnknownCode(u8),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
