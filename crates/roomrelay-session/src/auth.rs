//! Admission hook for validating a client's handshake.
//!
//! The relay only ships a shared-key check ([`SharedKeyAuth`]), but the
//! registry is written against the [`Authenticator`] trait so a deployment
//! can swap in its own (token service, allow-list) without touching the
//! dispatcher. Duplicate-login rejection is not the authenticator's job;
//! the session table enforces it after authentication succeeds.

use roomrelay_protocol::Handshake;

use crate::AdmissionError;

/// Decides whether a handshake may proceed.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the life of the server.
///
/// # Example
///
/// ```rust
/// use roomrelay_protocol::Handshake;
/// use roomrelay_session::{AdmissionError, Authenticator};
///
/// /// Admits everyone. Only for local testing.
/// struct OpenDoor;
///
/// impl Authenticator for OpenDoor {
///     async fn authenticate(
///         &self,
///         _handshake: &Handshake,
///     ) -> Result<(), AdmissionError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns `Ok(())` to admit the handshake, or the reason to refuse.
    fn authenticate(
        &self,
        handshake: &Handshake,
    ) -> impl std::future::Future<Output = Result<(), AdmissionError>> + Send;
}

/// Admits clients that present the shared server key.
///
/// When a namespace is configured, the game key must also contain it;
/// this keeps one relay from being used by unrelated products.
#[derive(Debug, Clone)]
pub struct SharedKeyAuth {
    key: String,
    namespace: Option<String>,
}

impl SharedKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            namespace: None,
        }
    }

    /// Requires every game key to contain `namespace`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl Authenticator for SharedKeyAuth {
    async fn authenticate(
        &self,
        handshake: &Handshake,
    ) -> Result<(), AdmissionError> {
        if handshake.key != self.key {
            return Err(AdmissionError::UnauthorizedConnection);
        }
        let in_namespace = match &self.namespace {
            Some(ns) => handshake.game_key.contains(ns.as_str()),
            None => true,
        };
        if handshake.game_key.is_empty()
            || !in_namespace
            || handshake.user_id.is_empty()
        {
            return Err(AdmissionError::UnauthorizedGame(
                handshake.game_key.clone(),
            ));
        }
        Ok(())
    }
}
