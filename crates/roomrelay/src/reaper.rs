//! Teardown of rooms that stay empty past their grace window.
//!
//! When a room's last member leaves, the registry arms a deadline here.
//! A worker task sweeps once per second: it takes the due entries from
//! this leaf-level map (never holding any other lock), then asks the
//! registry to re-check each room under the registry and room locks. A
//! member rejoining in the meantime makes the re-check fail, which is the
//! only cancellation there is.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use roomrelay_room::Room;
use roomrelay_session::Authenticator;
use roomrelay_tick::TickScheduler;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::SessionRegistry;

struct Armed {
    room: Weak<Room>,
    deadline: Instant,
}

/// Pending room deadlines, keyed by (game key, room key).
#[derive(Default)]
pub struct Reaper {
    armed: Mutex<HashMap<(String, String), Armed>>,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    fn armed(&self) -> MutexGuard<'_, HashMap<(String, String), Armed>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `room` to be checked at `deadline`, replacing any earlier
    /// deadline for it.
    pub fn arm(&self, room: &Arc<Room>, deadline: Instant) {
        tracing::debug!(room_id = room.id(), game_key = room.game_key(), "reaper armed");
        self.armed().insert(
            (room.game_key().to_owned(), room.key().to_owned()),
            Armed {
                room: Arc::downgrade(room),
                deadline,
            },
        );
    }

    /// Removes and returns every room whose deadline is at or before
    /// `now`. Rooms already dropped elsewhere are discarded.
    pub fn take_due(&self, now: Instant) -> Vec<Arc<Room>> {
        let mut armed = self.armed();
        let due: Vec<_> = armed
            .iter()
            .filter(|(_, a)| a.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter()
            .filter_map(|k| armed.remove(&k))
            .filter_map(|a| a.room.upgrade())
            .collect()
    }

    /// Number of armed deadlines.
    pub fn len(&self) -> usize {
        self.armed().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.armed().clear();
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper").field("armed", &self.len()).finish()
    }
}

/// Spawns the sweep worker.
///
/// Holds only a weak reference, so the worker ends on its own once the
/// registry is dropped, or when `shutdown` flips.
pub fn spawn_reaper<A: Authenticator>(
    registry: Weak<SessionRegistry<A>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = TickScheduler::with_period(interval);
        loop {
            tokio::select! {
                _ = ticks.wait_for_tick() => {
                    let Some(registry) = registry.upgrade() else {
                        break;
                    };
                    registry.reap_due(Instant::now()).await;
                    ticks.record_tick_end();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("reaper stopped");
    })
}
