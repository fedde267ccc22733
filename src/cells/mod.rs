//! Work cells.
//!
//! A cell owns its session state behind its own lock and is driven from
//! two sides: the scheduler (start, abort, sequence completed) and its
//! driver or instructor (workpiece arrived, activity completed, instruction
//! responses). Both arrive as [`CellInput`]s through the cell's mailbox so a
//! single consumer handles them in order.
//!
//! Outbound effects (published events and driver commands) are collected in
//! an [`Outbox`] while the cell's lock is held and flushed after it is
//! released.
//!
//! # Cell Types
//!
//! | Cell | Capability | Power (W) |
//! |------|------------|-----------|
//! | [`AssemblyCell`] | Assembly + Material | 225 |
//! | [`SolderingCell`] | Soldering (automatic) | 240, rising with wear |
//! | [`ManualSolderingCell`] | Soldering (manual), workspace | 240 |
//! | [`TestCell`] | Test (voltage) | 220 |
//! | [`PackagingCell`] | Packing | 230 |
//! | [`FixUpCell`] | ProcessFixup | 0 |

mod assembly;
mod driver;
mod events;
mod fixup;
mod instructor;
mod mailbox;
mod manual_soldering;
mod packaging;
mod simulated;
mod soldering;
mod test_cell;

pub use assembly::AssemblyCell;
pub use driver::{DriverCommand, DriverMessage, MessageDriver};
pub use events::{CellEvent, CellEventSink};
pub use fixup::FixUpCell;
pub use instructor::{
    InstructionId, InstructionRequest, InstructionResponse, VisualInstructor, DONE, POSTPONE,
};
pub use mailbox::{CellHandle, CellMailbox};
pub use manual_soldering::ManualSolderingCell;
pub use packaging::PackagingCell;
pub use simulated::{SimulatedDriver, SimulatedInstructor, SimulationState};
pub use soldering::SolderingCell;
pub use test_cell::TestCell;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::capabilities::{CapabilitySet, CapabilitySlot};
use crate::models::{Activity, ActivityClassification, ActivityId, ActivityTrace, CellId, ProcessId};
use crate::session::{
    ActivityCompleted, ReadyToWork, ReadyToWorkType, SequenceCompleted, SequenceOutcome, Session,
    SessionController, SessionId, SessionPhase, StartActivity,
};

/// Operating state of a cell, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    /// No session, or only a completed one.
    Idle,
    /// Offering or working.
    Running,
    /// Disabled; provides no capabilities.
    Disabled,
    /// Waiting for a maintenance instruction.
    Maintenance,
}

impl CellState {
    /// State of a single-session cell.
    pub fn of(session: Option<&Session>, disabled: bool) -> Self {
        if disabled {
            return CellState::Disabled;
        }
        match session.map(Session::phase) {
            Some(SessionPhase::ReadyToWork)
            | Some(SessionPhase::Paused)
            | Some(SessionPhase::ActivityStart { .. }) => CellState::Running,
            _ => CellState::Idle,
        }
    }
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CellState::Idle => "Idle",
            CellState::Running => "Running",
            CellState::Disabled => "Disabled",
            CellState::Maintenance => "Maintenance",
        };
        f.write_str(label)
    }
}

/// Everything a cell's mailbox delivers.
#[derive(Debug, Clone)]
pub enum CellInput {
    /// Scheduler: start an activity on an offered session.
    StartActivity(StartActivity),
    /// Scheduler: abort an activity.
    ProcessAborting(Arc<Activity>),
    /// Scheduler: acknowledge a completed activity.
    SequenceCompleted(SequenceCompleted),
    /// Driver notification.
    Driver(DriverMessage),
    /// Instructor response.
    Instruction(InstructionResponse),
}

/// A work cell.
pub trait Cell: Send + Sync {
    /// Shared cell plumbing.
    fn core(&self) -> &CellCore;

    /// Cell identifier.
    fn id(&self) -> CellId {
        self.core().id()
    }

    /// Display name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Capabilities currently provided.
    fn capabilities(&self) -> Arc<CapabilitySet> {
        self.core().capabilities()
    }

    /// Operating state.
    fn state(&self) -> CellState;

    /// Starts an activity on an offered session.
    fn start_activity(&self, command: StartActivity);

    /// Aborts an activity. Always publishes exactly one failed completion,
    /// unless the activity already has a result.
    fn process_aborting(&self, activity: &Arc<Activity>);

    /// The scheduler acknowledged a completion.
    fn sequence_completed(&self, signal: &SequenceCompleted);

    /// A message from the cell's driver.
    fn driver_message(&self, message: DriverMessage);

    /// A response from the visual instructor.
    fn instruction_completed(&self, response: InstructionResponse) {
        warn!(cell = %self.id(), instruction = %response.id, "unexpected instruction response");
    }

    /// The control system connected; returns the sessions it must know about.
    fn control_system_attached(&self) -> Vec<Session>;

    /// The control system disconnected; returns the sessions it knew about.
    fn control_system_detached(&self) -> Vec<Session> {
        Vec::new()
    }

    /// Dispatches one mailbox input.
    fn handle(&self, input: CellInput) {
        match input {
            CellInput::StartActivity(command) => self.start_activity(command),
            CellInput::ProcessAborting(activity) => self.process_aborting(&activity),
            CellInput::SequenceCompleted(signal) => self.sequence_completed(&signal),
            CellInput::Driver(message) => self.driver_message(message),
            CellInput::Instruction(response) => self.instruction_completed(response),
        }
    }
}

#[derive(Debug)]
enum Effect {
    Publish(CellEvent),
    Send(DriverCommand),
}

/// Effects collected under a cell's lock, flushed after it is released.
#[derive(Debug)]
pub struct Outbox {
    cell: CellId,
    effects: Vec<Effect>,
}

impl Outbox {
    fn new(cell: CellId) -> Self {
        Self {
            cell,
            effects: Vec::new(),
        }
    }

    /// Queues a ready-to-work offer.
    pub fn ready_to_work(&mut self, offer: ReadyToWork) {
        self.effects.push(Effect::Publish(CellEvent::ReadyToWork {
            cell: self.cell,
            offer,
        }));
    }

    /// Queues a withdrawn offer.
    pub fn not_ready_to_work(&mut self, session_id: SessionId) {
        self.effects.push(Effect::Publish(CellEvent::NotReadyToWork {
            cell: self.cell,
            session_id,
        }));
    }

    /// Queues a completion.
    pub fn activity_completed(&mut self, completed: ActivityCompleted) {
        self.effects.push(Effect::Publish(CellEvent::ActivityCompleted {
            cell: self.cell,
            completed,
        }));
    }

    fn capabilities_changed(&mut self, capabilities: Arc<CapabilitySet>) {
        self.effects.push(Effect::Publish(CellEvent::CapabilitiesChanged {
            cell: self.cell,
            capabilities,
        }));
    }

    /// Queues a driver command.
    pub fn send(&mut self, command: DriverCommand) {
        self.effects.push(Effect::Send(command));
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Identity, collaborators and capability slot shared by all cells.
pub struct CellCore {
    id: CellId,
    name: String,
    driver: Arc<dyn MessageDriver>,
    events: Arc<dyn CellEventSink>,
    instructor: Option<Arc<dyn VisualInstructor>>,
    capabilities: CapabilitySlot,
}

impl CellCore {
    /// Creates the core of a cell without an instructor.
    pub fn new(
        id: CellId,
        name: impl Into<String>,
        driver: Arc<dyn MessageDriver>,
        events: Arc<dyn CellEventSink>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            driver,
            events,
            instructor: None,
            capabilities: CapabilitySlot::default(),
        }
    }

    /// Attaches a visual instructor.
    pub fn with_instructor(mut self, instructor: Arc<dyn VisualInstructor>) -> Self {
        self.instructor = Some(instructor);
        self
    }

    /// Cell identifier.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capabilities currently provided.
    pub fn capabilities(&self) -> Arc<CapabilitySet> {
        self.capabilities.load()
    }

    /// Whether an instructor is attached.
    pub fn has_instructor(&self) -> bool {
        self.instructor.is_some()
    }

    /// New outbox for this cell.
    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.id)
    }

    /// Sets the initial capability set without publishing.
    fn init_capabilities(&self, set: CapabilitySet) {
        self.capabilities.store(set);
    }

    /// Replaces the provided capability set, queueing a change notification
    /// when it differs.
    pub fn recompute_capabilities(&self, set: CapabilitySet, out: &mut Outbox) {
        if self.capabilities.store(set) {
            let current = self.capabilities.load();
            info!(cell = %self.id, capabilities = ?current, "capabilities changed");
            out.capabilities_changed(current);
        }
    }

    /// Shows an instruction; `None` without an instructor.
    pub fn instruct(&self, request: InstructionRequest) -> Option<InstructionId> {
        match &self.instructor {
            Some(instructor) => Some(instructor.execute(request)),
            None => {
                warn!(cell = %self.id, title = %request.title, "no instructor attached");
                None
            }
        }
    }

    /// Withdraws an instruction.
    pub fn clear_instruction(&self, id: InstructionId) {
        if let Some(instructor) = &self.instructor {
            instructor.clear(id);
        }
    }

    /// Sends queued commands and publishes queued events, in order.
    pub fn flush(&self, out: Outbox) {
        for effect in out.effects {
            match effect {
                Effect::Publish(event) => self.events.publish(event),
                Effect::Send(command) => self.driver.send(command),
            }
        }
    }

    // ---------------- single-session helpers ----------------

    /// Opens a production pull session for an arrived workpiece.
    pub fn workpiece_arrived(
        &self,
        sessions: &mut SessionController,
        process_id: ProcessId,
        out: &mut Outbox,
    ) {
        match sessions.offer(
            ActivityClassification::Production,
            ReadyToWorkType::Pull,
            Some(process_id),
        ) {
            Ok(offer) => {
                debug!(cell = %self.id, process = %process_id, session = %offer.session_id, "ready to work");
                out.ready_to_work(offer);
            }
            Err(e) => {
                warn!(cell = %self.id, process = %process_id, error = %e, "workpiece arrival ignored");
            }
        }
    }

    /// Moves the offered session into `ActivityStart`. Returns false, after
    /// logging, when the command does not match.
    pub fn begin(&self, sessions: &mut SessionController, command: &StartActivity) -> bool {
        match sessions.start(command, Instant::now()) {
            Ok(()) => {
                debug!(cell = %self.id, session = %command.session_id, activity = %command.activity.id, "activity started");
                true
            }
            Err(e) => {
                warn!(cell = %self.id, session = %command.session_id, activity = %command.activity.id, error = %e, "start ignored");
                false
            }
        }
    }

    /// Completes the running activity with energy tracing.
    ///
    /// `trace` receives the elapsed time and returns the tracing to attach.
    pub fn complete(
        &self,
        sessions: &mut SessionController,
        value: i64,
        activity_id: Option<ActivityId>,
        trace: impl FnOnce(std::time::Duration) -> ActivityTrace,
        out: &mut Outbox,
    ) -> bool {
        match sessions.complete(value, activity_id, Instant::now()) {
            Ok(completed) => {
                let trace = trace(completed.elapsed);
                debug!(cell = %self.id, activity = %completed.activity.id, result = ?completed.result, "activity completed");
                out.activity_completed(completed.with_trace(trace));
                true
            }
            Err(e) => {
                warn!(cell = %self.id, error = %e, "completion ignored");
                false
            }
        }
    }

    /// Aborts `activity`, queueing exactly one failed completion unless it
    /// already has a result.
    pub fn abort(
        &self,
        sessions: &mut SessionController,
        activity: &Arc<Activity>,
        nominal_power: u32,
        out: &mut Outbox,
    ) {
        match sessions.abort(activity, Instant::now()) {
            Some(completed) => {
                info!(cell = %self.id, activity = %activity.id, "activity aborted");
                let trace = ActivityTrace::energy(nominal_power, completed.elapsed);
                out.activity_completed(completed.with_trace(trace));
            }
            None => {
                debug!(cell = %self.id, activity = %activity.id, "abort of finished activity ignored");
            }
        }
    }

    /// Continues or releases after a sequence acknowledgement.
    ///
    /// Returns the outcome, or `None` after logging a mismatch. With
    /// `release` set, a released workpiece gets a release command.
    pub fn finish_sequence(
        &self,
        sessions: &mut SessionController,
        signal: &SequenceCompleted,
        release: bool,
        out: &mut Outbox,
    ) -> Option<SequenceOutcome> {
        let process_id = sessions.current().and_then(Session::process_id);
        match sessions.sequence_completed(signal, self.id) {
            Ok(SequenceOutcome::Continued(offer)) => {
                debug!(cell = %self.id, session = %offer.session_id, "session continued");
                out.ready_to_work(offer.clone());
                Some(SequenceOutcome::Continued(offer))
            }
            Ok(SequenceOutcome::Released) => {
                if release {
                    out.send(DriverCommand::ReleaseWorkpiece { process_id });
                }
                Some(SequenceOutcome::Released)
            }
            Err(e) => {
                warn!(cell = %self.id, session = %signal.session_id, error = %e, "sequence completion ignored");
                None
            }
        }
    }
}

impl fmt::Debug for CellCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.capabilities.load())
            .finish()
    }
}
