//! The session table: every admitted connection and the ids signed in.
//!
//! # Concurrency note
//!
//! `SessionTable` is NOT thread-safe by itself. It is a field of the
//! registry state and only touched under the registry lock, which is what
//! makes "check the id is free, then claim it" atomic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use roomrelay_transport::ConnectionKey;

use crate::{AdmissionError, ClientSession};

/// Maps connection identity to session, and tracks which user ids are
/// currently signed in.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ConnectionKey, Arc<ClientSession>>,
    /// Kept in sync with `sessions`: one entry per admitted session.
    connected_ids: HashSet<String>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly authenticated session.
    ///
    /// # Errors
    /// Returns [`AdmissionError::AlreadyConnected`] if another connection
    /// is signed in with the same id. The connection's previous session,
    /// if any, must be removed by the caller first.
    pub fn admit(
        &mut self,
        session: ClientSession,
    ) -> Result<Arc<ClientSession>, AdmissionError> {
        if self.connected_ids.contains(session.id()) {
            return Err(AdmissionError::AlreadyConnected(
                session.id().to_owned(),
            ));
        }
        let session = Arc::new(session);
        self.connected_ids.insert(session.id().to_owned());
        if let Some(old) = self
            .sessions
            .insert(session.connection_key(), session.clone())
        {
            self.connected_ids.remove(old.id());
        }
        Ok(session)
    }

    /// Drops the session for `key` and frees its id.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<Arc<ClientSession>> {
        let session = self.sessions.remove(key)?;
        self.connected_ids.remove(session.id());
        Some(session)
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<Arc<ClientSession>> {
        self.sessions.get(key).cloned()
    }

    /// True if some connection is signed in as `id`.
    pub fn is_connected(&self, id: &str) -> bool {
        self.connected_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Counts sessions per game key.
    pub fn count_by_game(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for session in self.sessions.values() {
            *counts.entry(session.game_key().to_owned()).or_insert(0) += 1;
        }
        counts
    }

    /// Removes and returns every session.
    pub fn drain(&mut self) -> Vec<Arc<ClientSession>> {
        self.connected_ids.clear();
        self.sessions.drain().map(|(_, s)| s).collect()
    }
}
