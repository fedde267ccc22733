//! Fix-up cell.
//!
//! Cleans up processes that were only mounted virtually. In manual mode a
//! worker confirms the release through an instruction; otherwise the fix-up
//! completes as soon as it starts.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    Cell, CellCore, CellState, DriverMessage, InstructionId, InstructionRequest,
    InstructionResponse, Outbox,
};
use crate::capabilities::{Capability, CapabilitySet};
use crate::config::FixUpCellConfig;
use crate::models::{Activity, ActivityTrace};
use crate::session::{SequenceCompleted, Session, SessionController, StartActivity};

/// Result key of the release confirmation.
const RELEASE: &str = "Release";

#[derive(Debug)]
struct FixUpState {
    sessions: SessionController,
    disabled: bool,
    manual_mode: bool,
    instruction: Option<InstructionId>,
}

impl FixUpState {
    fn capabilities(&self) -> CapabilitySet {
        if self.disabled {
            CapabilitySet::null()
        } else {
            CapabilitySet::single(Capability::ProcessFixup)
        }
    }
}

/// Process fix-up station.
#[derive(Debug)]
pub struct FixUpCell {
    core: CellCore,
    state: Mutex<FixUpState>,
}

impl FixUpCell {
    /// Creates the cell in the configured manual mode.
    pub fn new(core: CellCore, config: FixUpCellConfig) -> Self {
        let state = FixUpState {
            sessions: SessionController::new(),
            disabled: false,
            manual_mode: config.manual_mode,
            instruction: None,
        };
        core.init_capabilities(state.capabilities());
        Self {
            core,
            state: Mutex::new(state),
        }
    }

    /// Whether fix-ups wait for a worker.
    pub fn manual_mode(&self) -> bool {
        self.state.lock().manual_mode
    }

    /// Switches manual mode. A pending confirmation is withdrawn and its
    /// fix-up completed.
    pub fn set_manual_mode(&self, manual_mode: bool) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if state.manual_mode == manual_mode {
                return;
            }
            state.manual_mode = manual_mode;
            debug!(cell = %self.core.id(), manual_mode, "manual mode changed");
            if let Some(id) = state.instruction.take() {
                self.core.clear_instruction(id);
                self.finish(&mut state, &mut out);
            }
        }
        self.core.flush(out);
    }

    /// Disables or enables the cell.
    pub fn set_disabled(&self, disabled: bool) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            state.disabled = disabled;
            self.core.recompute_capabilities(state.capabilities(), &mut out);
        }
        self.core.flush(out);
    }

    fn finish(&self, state: &mut FixUpState, out: &mut Outbox) {
        self.core.complete(
            &mut state.sessions,
            0,
            None,
            |elapsed| ActivityTrace::energy(0, elapsed),
            out,
        );
    }
}

impl Cell for FixUpCell {
    fn core(&self) -> &CellCore {
        &self.core
    }

    fn state(&self) -> CellState {
        let state = self.state.lock();
        CellState::of(state.sessions.current(), state.disabled)
    }

    fn start_activity(&self, command: StartActivity) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if !self.core.begin(&mut state.sessions, &command) {
                return;
            }
            if state.manual_mode && self.core.has_instructor() {
                let process = command
                    .activity
                    .process_id
                    .or_else(|| state.sessions.current().and_then(Session::process_id));
                let text = match process {
                    Some(p) => format!("Release process {p} to complete fix up activity"),
                    None => "Release the process to complete fix up activity".to_string(),
                };
                let request = InstructionRequest::new(self.core.name())
                    .with_instruction(text)
                    .with_result(RELEASE)
                    .for_session(command.session_id);
                state.instruction = self.core.instruct(request);
            } else {
                self.finish(&mut state, &mut out);
            }
        }
        self.core.flush(out);
    }

    fn process_aborting(&self, activity: &Arc<Activity>) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            self.core.abort(&mut state.sessions, activity, 0, &mut out);
            if let Some(id) = state.instruction.take() {
                self.core.clear_instruction(id);
            }
        }
        self.core.flush(out);
    }

    fn sequence_completed(&self, signal: &SequenceCompleted) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            self.core
                .finish_sequence(&mut state.sessions, signal, true, &mut out);
        }
        self.core.flush(out);
    }

    fn driver_message(&self, message: DriverMessage) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            match message {
                DriverMessage::WorkpieceArrived { process_id } => {
                    self.core
                        .workpiece_arrived(&mut state.sessions, process_id, &mut out);
                }
                other => {
                    warn!(cell = %self.core.id(), message = ?other, "unexpected driver message");
                }
            }
        }
        self.core.flush(out);
    }

    fn instruction_completed(&self, response: InstructionResponse) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if state.instruction != Some(response.id) {
                warn!(cell = %self.core.id(), instruction = %response.id, "unknown instruction response ignored");
                return;
            }
            state.instruction = None;
            self.finish(&mut state, &mut out);
        }
        self.core.flush(out);
    }

    fn control_system_attached(&self) -> Vec<Session> {
        self.state.lock().sessions.current().cloned().into_iter().collect()
    }

    fn control_system_detached(&self) -> Vec<Session> {
        self.state.lock().sessions.current().cloned().into_iter().collect()
    }
}
