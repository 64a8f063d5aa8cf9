//! Room lock and liveness state machines.

use std::fmt;
use std::time::Instant;

// ---------------------------------------------------------------------------
// LockState
// ---------------------------------------------------------------------------

/// Whether a room accepts new joins.
///
/// ```text
/// Open ⇄ Locked     (toggled by the master client only)
/// ```
///
/// Rejoins ignore the lock: a departed member may always come back while
/// there is space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Open,
    Locked,
}

impl LockState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Locked => write!(f, "Locked"),
        }
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Whether a room is in use, waiting out its grace window, or gone.
///
/// ```text
///            last member leaves            grace window elapses
/// Active ─────────────────────→ PendingDestroy ──────────────────→ Destroyed
///   ↑                                │
///   └──────── member (re)joins ──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
    #[default]
    Active,
    PendingDestroy {
        /// When the room became empty.
        since: Instant,
    },
    Destroyed,
}

impl Liveness {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// When the room became empty, if it is waiting to be destroyed.
    pub fn empty_since(self) -> Option<Instant> {
        match self {
            Self::PendingDestroy { since } => Some(since),
            _ => None,
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::PendingDestroy { .. } => write!(f, "PendingDestroy"),
            Self::Destroyed => write!(f, "Destroyed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_state_default_is_open() {
        assert!(LockState::default().is_open());
        assert!(!LockState::Locked.is_open());
    }

    #[test]
    fn test_liveness_empty_since_only_when_pending() {
        let now = Instant::now();
        assert_eq!(Liveness::Active.empty_since(), None);
        assert_eq!(
            Liveness::PendingDestroy { since: now }.empty_since(),
            Some(now)
        );
        assert_eq!(Liveness::Destroyed.empty_since(), None);
    }

    #[test]
    fn test_liveness_predicates() {
        assert!(Liveness::Active.is_active());
        assert!(!Liveness::PendingDestroy { since: Instant::now() }.is_active());
        assert!(Liveness::Destroyed.is_destroyed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LockState::Locked.to_string(), "Locked");
        assert_eq!(
            Liveness::PendingDestroy { since: Instant::now() }.to_string(),
            "PendingDestroy"
        );
    }
}
