//! Cell sessions.
//!
//! A session is the lifecycle record of one workpiece (or setup step) at one
//! cell:
//!
//! ```text
//!            workpiece arrived
//!   Idle ─────────────────────────▶ ReadyToWork ◀──── resume ──── Paused
//!    ▲                                  │  └──────── pause ─────────▲
//!    │                           start  │
//!    │                                  ▼
//!    │ release               ActivityStart ──── abort ────┐
//!    │                                  │ completion      │
//!    │                                  ▼                 ▼
//!    └──── SequenceCompleted ◀── ActivityCompleted ◀──────┘
//!                │
//!                └── continuation (same cell next) ──▶ ReadyToWork
//! ```
//!
//! Abort is also accepted from `ReadyToWork` and `Paused` and always yields a
//! failed `ActivityCompleted`.
//!
//! Single-session cells drive a [`SessionController`]; multi-position cells
//! keep one session per position in a [`Workspace`].

mod controller;
mod workspace;

pub use controller::{SequenceOutcome, SessionController};
pub use workspace::{MountOutcome, Workspace, MAX_POSITIONS, MIN_POSITIONS};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{SessionError, SessionResult};
use crate::models::{
    Activity, ActivityClassification, ActivityId, ActivityResult, ActivityTrace, CellId,
    ProcessId,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocates a process-wide unique id.
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Who initiates work on a ready-to-work offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyToWorkType {
    /// The cell asks for work for a workpiece it holds.
    Pull,
    /// The cell offers itself for any matching work.
    Push,
}

/// Phase tag, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhaseKind {
    /// Offer published, waiting for a start.
    ReadyToWork,
    /// Offer withdrawn temporarily.
    Paused,
    /// Activity running.
    ActivityStart,
    /// Result published, waiting for the sequence acknowledgement.
    ActivityCompleted,
}

/// Phase with its data.
#[derive(Debug, Clone)]
pub enum SessionPhase {
    /// Offer published.
    ReadyToWork,
    /// Offer withdrawn (not ready to work).
    Paused,
    /// Activity running since `started_at`.
    ActivityStart {
        /// Running activity.
        activity: Arc<Activity>,
        /// Start instant, for energy tracing.
        started_at: Instant,
    },
    /// Activity finished.
    ActivityCompleted {
        /// Finished activity.
        activity: Arc<Activity>,
        /// Its result.
        result: ActivityResult,
    },
}

impl SessionPhase {
    /// Returns the phase tag.
    pub fn kind(&self) -> SessionPhaseKind {
        match self {
            SessionPhase::ReadyToWork => SessionPhaseKind::ReadyToWork,
            SessionPhase::Paused => SessionPhaseKind::Paused,
            SessionPhase::ActivityStart { .. } => SessionPhaseKind::ActivityStart,
            SessionPhase::ActivityCompleted { .. } => SessionPhaseKind::ActivityCompleted,
        }
    }
}

/// One workpiece's (or setup step's) lifecycle at a cell.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    process_id: Option<ProcessId>,
    classification: ActivityClassification,
    ready_type: ReadyToWorkType,
    phase: SessionPhase,
}

impl Session {
    /// Opens a session in `ReadyToWork`.
    pub fn start(
        classification: ActivityClassification,
        ready_type: ReadyToWorkType,
        process_id: Option<ProcessId>,
    ) -> Self {
        Self {
            id: SessionId::next(),
            process_id,
            classification,
            ready_type,
            phase: SessionPhase::ReadyToWork,
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Correlation id of the workpiece.
    pub fn process_id(&self) -> Option<ProcessId> {
        self.process_id
    }

    /// Production or setup.
    pub fn classification(&self) -> ActivityClassification {
        self.classification
    }

    /// Pull or push.
    pub fn ready_type(&self) -> ReadyToWorkType {
        self.ready_type
    }

    /// Current phase.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// The activity bound to this session, if any.
    pub fn activity(&self) -> Option<&Arc<Activity>> {
        match &self.phase {
            SessionPhase::ActivityStart { activity, .. }
            | SessionPhase::ActivityCompleted { activity, .. } => Some(activity),
            _ => None,
        }
    }

    /// Whether the bound activity has the given id.
    pub fn has_activity(&self, activity_id: ActivityId) -> bool {
        self.activity().is_some_and(|a| a.id == activity_id)
    }

    /// The offer for the current `ReadyToWork` phase.
    pub fn offer(&self) -> ReadyToWork {
        ReadyToWork {
            session_id: self.id,
            process_id: self.process_id,
            classification: self.classification,
            ready_type: self.ready_type,
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.phase.kind(),
            operation,
        }
    }

    /// `ReadyToWork → Paused`.
    pub fn pause(&mut self) -> SessionResult<()> {
        match self.phase {
            SessionPhase::ReadyToWork => {
                self.phase = SessionPhase::Paused;
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    /// `Paused → ReadyToWork`, returning the re-emitted offer.
    pub fn resume(&mut self) -> SessionResult<ReadyToWork> {
        match self.phase {
            SessionPhase::Paused => {
                self.phase = SessionPhase::ReadyToWork;
                Ok(self.offer())
            }
            _ => Err(self.invalid("resume")),
        }
    }

    /// `ReadyToWork → ActivityStart`.
    pub fn begin(&mut self, activity: Arc<Activity>, now: Instant) -> SessionResult<()> {
        self.check_process(&activity)?;
        match self.phase {
            SessionPhase::ReadyToWork => {
                self.phase = SessionPhase::ActivityStart {
                    activity,
                    started_at: now,
                };
                Ok(())
            }
            _ => Err(self.invalid("start activity")),
        }
    }

    /// `ActivityStart → ActivityCompleted` with a reported number.
    ///
    /// When `activity_id` is given it must match the running activity.
    pub fn complete(
        &mut self,
        value: i64,
        activity_id: Option<ActivityId>,
        now: Instant,
    ) -> SessionResult<ActivityCompleted> {
        let (activity, started_at) = match &self.phase {
            SessionPhase::ActivityStart {
                activity,
                started_at,
            } => (Arc::clone(activity), *started_at),
            _ => return Err(self.invalid("complete")),
        };
        if let Some(received) = activity_id {
            if received != activity.id {
                return Err(SessionError::ActivityMismatch {
                    active: activity.id,
                    received,
                });
            }
        }
        let result = activity.complete(value);
        Ok(self.finish(activity, result, now.saturating_duration_since(started_at)))
    }

    /// Aborts from `ReadyToWork`, `Paused` or `ActivityStart` into a failed
    /// `ActivityCompleted`.
    pub fn abort(
        &mut self,
        activity: &Arc<Activity>,
        now: Instant,
    ) -> SessionResult<ActivityCompleted> {
        let elapsed = match &self.phase {
            SessionPhase::ReadyToWork | SessionPhase::Paused => {
                self.check_process(activity)?;
                Duration::ZERO
            }
            SessionPhase::ActivityStart {
                activity: running,
                started_at,
            } => {
                if running.id != activity.id {
                    return Err(SessionError::ActivityMismatch {
                        active: running.id,
                        received: activity.id,
                    });
                }
                now.saturating_duration_since(*started_at)
            }
            SessionPhase::ActivityCompleted { .. } => return Err(self.invalid("abort")),
        };
        let result = activity.fail();
        Ok(self.finish(Arc::clone(activity), result, elapsed))
    }

    fn check_process(&self, activity: &Activity) -> SessionResult<()> {
        match (self.process_id, activity.process_id) {
            (Some(active), Some(received)) if active != received => {
                Err(SessionError::ProcessMismatch { active, received })
            }
            _ => Ok(()),
        }
    }

    fn finish(
        &mut self,
        activity: Arc<Activity>,
        result: ActivityResult,
        elapsed: Duration,
    ) -> ActivityCompleted {
        self.phase = SessionPhase::ActivityCompleted {
            activity: Arc::clone(&activity),
            result,
        };
        ActivityCompleted {
            session_id: self.id,
            process_id: self.process_id,
            activity,
            result,
            elapsed,
            trace: ActivityTrace::default(),
        }
    }

    /// `ActivityCompleted → ReadyToWork` for a continuation at the same cell.
    pub fn continue_session(&mut self) -> SessionResult<ReadyToWork> {
        match self.phase {
            SessionPhase::ActivityCompleted { .. } => {
                self.phase = SessionPhase::ReadyToWork;
                Ok(self.offer())
            }
            _ => Err(self.invalid("continue")),
        }
    }
}

/// A ready-to-work offer published to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyToWork {
    /// Session making the offer.
    pub session_id: SessionId,
    /// Correlation id of the workpiece.
    pub process_id: Option<ProcessId>,
    /// Production or setup.
    pub classification: ActivityClassification,
    /// Pull or push.
    pub ready_type: ReadyToWorkType,
}

/// A scheduler's command to start an activity on an offered session.
#[derive(Debug, Clone)]
pub struct StartActivity {
    /// Session the offer came from.
    pub session_id: SessionId,
    /// Activity to run.
    pub activity: Arc<Activity>,
}

impl StartActivity {
    /// Creates a start command.
    pub fn new(session_id: SessionId, activity: Arc<Activity>) -> Self {
        Self {
            session_id,
            activity,
        }
    }
}

/// A completion published to the scheduler.
#[derive(Debug, Clone)]
pub struct ActivityCompleted {
    /// Session the activity ran in. Fresh for activities the cell did not know.
    pub session_id: SessionId,
    /// Correlation id of the workpiece.
    pub process_id: Option<ProcessId>,
    /// Completed activity.
    pub activity: Arc<Activity>,
    /// Its result.
    pub result: ActivityResult,
    /// Time since the activity started.
    pub elapsed: Duration,
    /// Tracing attached by the cell.
    pub trace: ActivityTrace,
}

impl ActivityCompleted {
    /// Failure for an activity the cell holds no session for.
    pub fn unknown(activity: &Arc<Activity>) -> Self {
        Self {
            session_id: SessionId::next(),
            process_id: activity.process_id,
            activity: Arc::clone(activity),
            result: activity.fail(),
            elapsed: Duration::ZERO,
            trace: ActivityTrace::default(),
        }
    }

    /// Attaches tracing.
    pub fn with_trace(mut self, trace: ActivityTrace) -> Self {
        self.trace = trace;
        self
    }
}

/// The scheduler's acknowledgement of a completed activity.
#[derive(Debug, Clone)]
pub struct SequenceCompleted {
    /// Session being acknowledged.
    pub session_id: SessionId,
    /// Classification the scheduler accepted.
    pub accepted_classification: ActivityClassification,
    /// Cells designated for the next step of the process.
    pub next_cells: Vec<CellId>,
}

impl SequenceCompleted {
    /// Acknowledgement without a follow-up at any cell.
    pub fn new(session_id: SessionId, accepted_classification: ActivityClassification) -> Self {
        Self {
            session_id,
            accepted_classification,
            next_cells: Vec::new(),
        }
    }

    /// Designates the next cells.
    pub fn with_next_cells(mut self, next_cells: Vec<CellId>) -> Self {
        self.next_cells = next_cells;
        self
    }
}
