//! Error types.
//!
//! Nothing in this crate is fatal to the host: session and workspace errors
//! are reported by the cells as warnings and the offending notification is
//! dropped, while configuration errors are returned from constructors.

use thiserror::Error;

use crate::models::{ActivityId, ProcessId};
use crate::session::{SessionId, SessionPhaseKind};

/// Errors raised by session transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The cell has no session at all.
    #[error("no active session")]
    NoActiveSession,

    /// The requested transition is not allowed from the current phase.
    #[error("cannot {operation} from {from:?}")]
    InvalidTransition {
        /// Phase the session was in.
        from: SessionPhaseKind,
        /// Attempted operation.
        operation: &'static str,
    },

    /// A notification referenced a different session than the active one.
    #[error("session {received} does not match active session {active}")]
    SessionMismatch {
        /// Id of the active session.
        active: SessionId,
        /// Id carried by the notification.
        received: SessionId,
    },

    /// A completion referenced a different activity than the running one.
    #[error("activity {received} does not match running activity {active}")]
    ActivityMismatch {
        /// Id of the running activity.
        active: ActivityId,
        /// Id carried by the notification.
        received: ActivityId,
    },

    /// A start command referenced a different process than the offer.
    #[error("process {received} does not match session process {active}")]
    ProcessMismatch {
        /// Process of the active session.
        active: ProcessId,
        /// Process carried by the command.
        received: ProcessId,
    },
}

/// Errors raised by the workspace allocator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    /// All positions are occupied.
    #[error("workspace is full ({capacity} positions)")]
    Full {
        /// Number of positions.
        capacity: usize,
    },

    /// No position holds the given session.
    #[error("no position holds session {0}")]
    UnknownSession(SessionId),
}

/// Errors raised while building components from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Workspace position count outside the supported range.
    #[error("workspace must have between {min} and {max} positions, got {got}")]
    InvalidPositionCount {
        /// Requested count.
        got: usize,
        /// Smallest accepted count.
        min: usize,
        /// Largest accepted count.
        max: usize,
    },

    /// A selector threshold of zero would route every activity to every cell.
    #[error("threshold must be greater than zero")]
    ZeroThreshold,

    /// Success rate expressed in percent above 100.
    #[error("success rate must be within 0..=100, got {0}")]
    InvalidSuccessRate(u8),

    /// Aggregated validation failures.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result alias for session transitions.
pub type SessionResult<T> = Result<T, SessionError>;
