//! Workspace allocator for multi-position cells.
//!
//! A workspace is a fixed row of positions, each empty or holding one
//! session. Arriving workpieces take the first empty position; once every
//! position is taken the batch becomes ready, signalled once per fill cycle.
//!
//! All access goes through one lock. Readers get snapshots, never references
//! into the positions.

use parking_lot::Mutex;

use super::{Session, SessionId};
use crate::error::{ConfigError, WorkspaceError};
use crate::models::ActivityId;

/// Smallest workspace.
pub const MIN_POSITIONS: usize = 1;
/// Largest workspace.
pub const MAX_POSITIONS: usize = 10;

/// Result of mounting a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOutcome {
    /// Position the session was mounted to.
    pub position: usize,
    /// True exactly once per fill cycle, when the last empty position is taken.
    pub batch_ready: bool,
}

#[derive(Debug)]
struct Positions {
    slots: Vec<Option<Session>>,
    batch_signalled: bool,
}

/// Fixed-size set of workpiece positions.
#[derive(Debug)]
pub struct Workspace {
    inner: Mutex<Positions>,
}

impl Workspace {
    /// Creates an empty workspace with `positions` slots.
    pub fn new(positions: usize) -> Result<Self, ConfigError> {
        if !(MIN_POSITIONS..=MAX_POSITIONS).contains(&positions) {
            return Err(ConfigError::InvalidPositionCount {
                got: positions,
                min: MIN_POSITIONS,
                max: MAX_POSITIONS,
            });
        }
        Ok(Self {
            inner: Mutex::new(Positions {
                slots: vec![None; positions],
                batch_signalled: false,
            }),
        })
    }

    /// Number of positions.
    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Index of the first empty position.
    pub fn try_get_empty_position(&self) -> Option<usize> {
        self.inner.lock().slots.iter().position(Option::is_none)
    }

    /// Whether every position is occupied.
    pub fn is_full(&self) -> bool {
        self.inner.lock().slots.iter().all(Option::is_some)
    }

    /// Whether no position is occupied.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.iter().all(Option::is_none)
    }

    /// Number of occupied positions.
    pub fn occupied(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    /// Binds `session` to the first empty position.
    pub fn mount(&self, session: Session) -> Result<MountOutcome, WorkspaceError> {
        let mut inner = self.inner.lock();
        let capacity = inner.slots.len();
        let position = inner
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(WorkspaceError::Full { capacity })?;
        inner.slots[position] = Some(session);

        let full = inner.slots.iter().all(Option::is_some);
        let batch_ready = full && !inner.batch_signalled;
        if batch_ready {
            inner.batch_signalled = true;
        }
        Ok(MountOutcome {
            position,
            batch_ready,
        })
    }

    /// Frees the position holding `session_id`, returning its session.
    pub fn unmount(&self, session_id: SessionId) -> Result<Session, WorkspaceError> {
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|s| s.id() == session_id))
            .ok_or(WorkspaceError::UnknownSession(session_id))?;
        let session = slot.take().ok_or(WorkspaceError::UnknownSession(session_id))?;
        inner.batch_signalled = false;
        Ok(session)
    }

    /// Position holding `session_id`.
    pub fn position_by_session(&self, session_id: SessionId) -> Option<usize> {
        self.inner
            .lock()
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.id() == session_id))
    }

    /// Position whose session runs or ran `activity_id`.
    pub fn position_by_activity(&self, activity_id: ActivityId) -> Option<usize> {
        self.inner
            .lock()
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.has_activity(activity_id)))
    }

    /// Snapshot of the session at `position`.
    pub fn session_at(&self, position: usize) -> Option<Session> {
        self.inner.lock().slots.get(position).cloned().flatten()
    }

    /// Applies `f` to the session with `session_id`.
    pub fn update_session<R>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        inner
            .slots
            .iter_mut()
            .flatten()
            .find(|s| s.id() == session_id)
            .map(f)
    }

    /// Applies `f` to the session bound to `activity_id`.
    pub fn update_activity<R>(
        &self,
        activity_id: ActivityId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        inner
            .slots
            .iter_mut()
            .flatten()
            .find(|s| s.has_activity(activity_id))
            .map(f)
    }

    /// Applies `f` to every occupied position, in position order.
    pub fn update_all(&self, mut f: impl FnMut(usize, &mut Session)) {
        let mut inner = self.inner.lock();
        for (position, slot) in inner.slots.iter_mut().enumerate() {
            if let Some(session) = slot {
                f(position, session);
            }
        }
    }

    /// Snapshot of all occupied positions.
    pub fn sessions(&self) -> Vec<(usize, Session)> {
        self.inner
            .lock()
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.clone().map(|s| (i, s)))
            .collect()
    }

    /// Empties every position.
    pub fn clear(&self) -> Vec<Session> {
        let mut inner = self.inner.lock();
        inner.batch_signalled = false;
        inner.slots.iter_mut().filter_map(Option::take).collect()
    }
}
