//! Single-session controller.
//!
//! Holds the at-most-one session of a cell and checks that every
//! notification refers to it. Callers turn errors into a logged no-op.

use std::sync::Arc;
use std::time::Instant;

use super::{ActivityCompleted, ReadyToWork, ReadyToWorkType, SequenceCompleted, Session, StartActivity};
use crate::error::{SessionError, SessionResult};
use crate::models::{Activity, ActivityClassification, ActivityId, CellId, ProcessId};

/// Outcome of a sequence acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The same cell runs the next step; a new offer is published.
    Continued(ReadyToWork),
    /// The workpiece leaves; the cell is idle.
    Released,
}

/// Controller for cells that run one session at a time.
#[derive(Debug, Default)]
pub struct SessionController {
    current: Option<Session>,
}

impl SessionController {
    /// Creates an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, if any.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Whether no session is open.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    fn session_mut(&mut self) -> SessionResult<&mut Session> {
        self.current.as_mut().ok_or(SessionError::NoActiveSession)
    }

    fn checked(&mut self, session_id: super::SessionId) -> SessionResult<&mut Session> {
        let session = self.session_mut()?;
        if session.id() != session_id {
            return Err(SessionError::SessionMismatch {
                active: session.id(),
                received: session_id,
            });
        }
        Ok(session)
    }

    /// `Idle → ReadyToWork`, returning the offer.
    pub fn offer(
        &mut self,
        classification: ActivityClassification,
        ready_type: ReadyToWorkType,
        process_id: Option<ProcessId>,
    ) -> SessionResult<ReadyToWork> {
        if let Some(session) = &self.current {
            return Err(SessionError::InvalidTransition {
                from: session.phase().kind(),
                operation: "offer",
            });
        }
        let session = Session::start(classification, ready_type, process_id);
        let offer = session.offer();
        self.current = Some(session);
        Ok(offer)
    }

    /// `ReadyToWork → ActivityStart` for the offered session.
    pub fn start(&mut self, command: &StartActivity, now: Instant) -> SessionResult<()> {
        let session = self.checked(command.session_id)?;
        session.begin(Arc::clone(&command.activity), now)
    }

    /// `ReadyToWork → Paused`.
    pub fn pause(&mut self) -> SessionResult<()> {
        self.session_mut()?.pause()
    }

    /// `Paused → ReadyToWork`.
    pub fn resume(&mut self) -> SessionResult<ReadyToWork> {
        self.session_mut()?.resume()
    }

    /// `ActivityStart → ActivityCompleted`.
    pub fn complete(
        &mut self,
        value: i64,
        activity_id: Option<ActivityId>,
        now: Instant,
    ) -> SessionResult<ActivityCompleted> {
        self.session_mut()?.complete(value, activity_id, now)
    }

    /// Aborts the session running or offering for `activity`.
    ///
    /// Returns the completion to publish, or `None` when the activity already
    /// has a result (it was published before). Activities the cell holds no
    /// session for are wrapped into a failure.
    pub fn abort(&mut self, activity: &Arc<Activity>, now: Instant) -> Option<ActivityCompleted> {
        if activity.is_completed() {
            return None;
        }
        match self.current.as_mut().map(|s| s.abort(activity, now)) {
            Some(Ok(completed)) => Some(completed),
            Some(Err(_)) | None => Some(ActivityCompleted::unknown(activity)),
        }
    }

    /// `ActivityCompleted → SequenceCompleted`, then continuation or release.
    pub fn sequence_completed(
        &mut self,
        signal: &SequenceCompleted,
        this_cell: CellId,
    ) -> SessionResult<SequenceOutcome> {
        let session = self.checked(signal.session_id)?;
        if signal.next_cells.contains(&this_cell) {
            return session.continue_session().map(SequenceOutcome::Continued);
        }
        if !matches!(session.phase(), super::SessionPhase::ActivityCompleted { .. }) {
            return Err(SessionError::InvalidTransition {
                from: session.phase().kind(),
                operation: "complete sequence",
            });
        }
        self.current = None;
        Ok(SequenceOutcome::Released)
    }

    /// Drops the session without any transition.
    pub fn clear(&mut self) -> Option<Session> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityParameters;
    use crate::session::SessionPhaseKind;

    fn activity(id: u64) -> Arc<Activity> {
        Arc::new(Activity::new(ActivityId(id), ActivityParameters::Packing).with_process(ProcessId(1)))
    }

    fn ready(controller: &mut SessionController) -> ReadyToWork {
        controller
            .offer(
                ActivityClassification::Production,
                ReadyToWorkType::Pull,
                Some(ProcessId(1)),
            )
            .unwrap()
    }

    #[test]
    fn test_one_session_at_a_time() {
        let mut c = SessionController::new();
        ready(&mut c);
        let err = c
            .offer(ActivityClassification::Production, ReadyToWorkType::Pull, Some(ProcessId(2)))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn test_start_with_wrong_session_is_rejected() {
        let mut c = SessionController::new();
        let offer = ready(&mut c);
        let foreign = StartActivity::new(super::super::SessionId(u64::MAX), activity(1));
        assert!(matches!(
            c.start(&foreign, Instant::now()),
            Err(SessionError::SessionMismatch { .. })
        ));
        c.start(&StartActivity::new(offer.session_id, activity(1)), Instant::now())
            .unwrap();
    }

    #[test]
    fn test_release_after_completion() {
        let mut c = SessionController::new();
        let offer = ready(&mut c);
        c.start(&StartActivity::new(offer.session_id, activity(1)), Instant::now())
            .unwrap();
        c.complete(0, None, Instant::now()).unwrap();
        let signal = SequenceCompleted::new(offer.session_id, ActivityClassification::Production);
        assert_eq!(c.sequence_completed(&signal, CellId(1)).unwrap(), SequenceOutcome::Released);
        assert!(c.is_idle());
    }

    #[test]
    fn test_continuation_reoffers() {
        let mut c = SessionController::new();
        let offer = ready(&mut c);
        c.start(&StartActivity::new(offer.session_id, activity(1)), Instant::now())
            .unwrap();
        c.complete(0, None, Instant::now()).unwrap();
        let signal = SequenceCompleted::new(offer.session_id, ActivityClassification::Production)
            .with_next_cells(vec![CellId(1)]);
        match c.sequence_completed(&signal, CellId(1)).unwrap() {
            SequenceOutcome::Continued(next) => assert_eq!(next.process_id, Some(ProcessId(1))),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!c.is_idle());
    }

    #[test]
    fn test_sequence_completed_before_completion_is_rejected() {
        let mut c = SessionController::new();
        let offer = ready(&mut c);
        let signal = SequenceCompleted::new(offer.session_id, ActivityClassification::Production);
        assert!(c.sequence_completed(&signal, CellId(1)).is_err());
        assert!(!c.is_idle());
    }

    #[test]
    fn test_abort_publishes_once() {
        let mut c = SessionController::new();
        let offer = ready(&mut c);
        let act = activity(1);
        c.start(&StartActivity::new(offer.session_id, Arc::clone(&act)), Instant::now())
            .unwrap();
        assert!(c.abort(&act, Instant::now()).is_some());
        assert!(c.abort(&act, Instant::now()).is_none());
    }

    #[test]
    fn test_abort_for_other_process_keeps_offer() {
        let mut c = SessionController::new();
        let offer = ready(&mut c);
        let stranger = Arc::new(
            Activity::new(ActivityId(99), ActivityParameters::Packing).with_process(ProcessId(8)),
        );
        let completed = c.abort(&stranger, Instant::now()).unwrap();
        assert!(completed.result.failed);
        assert_ne!(completed.session_id, offer.session_id);
        assert_eq!(
            c.current().map(|s| s.phase().kind()),
            Some(SessionPhaseKind::ReadyToWork)
        );
        c.start(&StartActivity::new(offer.session_id, activity(1)), Instant::now())
            .unwrap();
    }

    #[test]
    fn test_abort_unknown_activity_wraps_failure() {
        let mut c = SessionController::new();
        let act = activity(5);
        let completed = c.abort(&act, Instant::now()).unwrap();
        assert!(completed.result.failed);
        assert!(c.is_idle());
    }
}
