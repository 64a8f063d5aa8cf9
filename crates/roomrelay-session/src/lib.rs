//! Client sessions for Roomrelay.
//!
//! This crate handles who is connected and how to reach them:
//!
//! 1. **Admission**: validating a handshake ([`Authenticator`],
//!    [`SharedKeyAuth`]) and refusing with a typed [`AdmissionError`]
//! 2. **Session tracking**: one [`ClientSession`] per admitted connection,
//!    plus the set of signed-in ids ([`SessionTable`])
//! 3. **Sending**: a transport-agnostic [`Sender`] picked once per
//!    session ([`PeerSender`] or [`StreamSender`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← holds Arc<ClientSession> members, sends events
//!     ↕
//! Session Layer (this crate)  ← identity, position, room link, sender
//!     ↕
//! Protocol + Transport (below)  ← ServerEvent encoding, connection ids
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod sender;
mod session;

pub use auth::{Authenticator, SharedKeyAuth};
pub use error::AdmissionError;
pub use manager::SessionTable;
pub use sender::{PeerSender, Sender, StreamSender};
pub use session::ClientSession;
