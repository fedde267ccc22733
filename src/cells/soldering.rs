//! Automatic soldering cell.
//!
//! Solders through its driver and traces the effective iron temperature.
//! The cell wears: each wear tick raises its nominal power by one watt and
//! reaching the threshold forces a maintenance, which disables the cell
//! until a worker answers the maintenance instruction.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    Cell, CellCore, CellState, DriverCommand, DriverMessage, InstructionId, InstructionRequest,
    InstructionResponse, Outbox, DONE, POSTPONE,
};
use crate::capabilities::{CapabilitySet, SolderingCapabilities};
use crate::config::SolderingCellConfig;
use crate::models::{Activity, ActivityTrace, TraceDetail};
use crate::session::{
    SequenceCompleted, Session, SessionController, SessionPhaseKind, StartActivity,
};

#[derive(Debug)]
struct SolderingState {
    sessions: SessionController,
    disabled: bool,
    nominal_power: u32,
    maintenance: Option<InstructionId>,
}

impl SolderingState {
    fn capabilities(&self) -> CapabilitySet {
        if self.disabled {
            CapabilitySet::null()
        } else {
            CapabilitySet::single(SolderingCapabilities::automatic())
        }
    }
}

/// Automatic soldering station.
#[derive(Debug)]
pub struct SolderingCell {
    core: CellCore,
    config: SolderingCellConfig,
    state: Mutex<SolderingState>,
}

impl SolderingCell {
    /// Creates the cell at its configured nominal power.
    pub fn new(core: CellCore, config: SolderingCellConfig) -> Self {
        let state = SolderingState {
            sessions: SessionController::new(),
            disabled: false,
            nominal_power: config.nominal_power,
            maintenance: None,
        };
        core.init_capabilities(state.capabilities());
        Self {
            core,
            config,
            state: Mutex::new(state),
        }
    }

    /// Current nominal power in watts.
    pub fn nominal_power(&self) -> u32 {
        self.state.lock().nominal_power
    }

    /// Iron temperature reached during soldering.
    pub fn tracing_temperature(&self) -> i32 {
        self.config.temperature - self.config.hysteresis
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

    /// Raises the nominal power by one watt. Returns true when this tick
    /// started a maintenance.
    pub fn wear_tick(&self) -> bool {
        let mut out = self.core.outbox();
        let started = {
            let mut state = self.state.lock();
            state.nominal_power += 1;
            debug!(cell = %self.core.id(), power = state.nominal_power, "wear tick");
            let due = state.nominal_power >= self.config.power_threshold;
            if due && state.maintenance.is_none() {
                self.maintain(&mut state, &mut out);
                true
            } else {
                false
            }
        };
        self.core.flush(out);
        started
    }

    /// Ticks every `period` until a maintenance starts.
    pub async fn run_wear_cycle(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.wear_tick() {
                break;
            }
        }
        info!(cell = %self.core.id(), "wear cycle stopped");
    }

    /// Pauses or aborts the current session, disables the cell and asks a
    /// worker for maintenance.
    pub fn do_maintenance(&self) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            self.maintain(&mut state, &mut out);
        }
        self.core.flush(out);
    }

    fn maintain(&self, state: &mut SolderingState, out: &mut Outbox) {
        let current = state
            .sessions
            .current()
            .map(|s| (s.id(), s.phase().kind(), s.activity().cloned()));
        match current {
            Some((session_id, SessionPhaseKind::ReadyToWork, _)) => {
                if state.sessions.pause().is_ok() {
                    out.not_ready_to_work(session_id);
                }
            }
            Some((_, SessionPhaseKind::ActivityStart, Some(activity))) => {
                self.core
                    .abort(&mut state.sessions, &activity, state.nominal_power, out);
            }
            _ => {}
        }

        state.disabled = true;
        self.core.recompute_capabilities(state.capabilities(), out);
        if let Some(previous) = state.maintenance.take() {
            self.core.clear_instruction(previous);
        }
        let request = InstructionRequest::new(self.core.name())
            .with_instruction("Clean the soldering tip and replace worn parts.")
            .with_result(POSTPONE)
            .with_result(DONE);
        state.maintenance = self.core.instruct(request);
        info!(cell = %self.core.id(), power = state.nominal_power, "maintenance started");
    }

    /// Resets the wear, enables the cell and resumes a paused session.
    pub fn finish_maintenance(&self) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            self.end_maintenance(&mut state, &mut out);
        }
        self.core.flush(out);
    }

    fn end_maintenance(&self, state: &mut SolderingState, out: &mut Outbox) {
        state.nominal_power = self.config.nominal_power;
        state.disabled = false;
        self.core.recompute_capabilities(state.capabilities(), out);
        if let Some(id) = state.maintenance.take() {
            self.core.clear_instruction(id);
        }
        let paused = state.sessions.current().map(|s| s.phase().kind()) == Some(SessionPhaseKind::Paused);
        if paused {
            match state.sessions.resume() {
                Ok(offer) => out.ready_to_work(offer),
                Err(e) => warn!(cell = %self.core.id(), error = %e, "session not resumed"),
            }
        }
        info!(cell = %self.core.id(), "maintenance finished");
    }
}

impl Cell for SolderingCell {
    fn core(&self) -> &CellCore {
        &self.core
    }

    fn state(&self) -> CellState {
        let state = self.state.lock();
        if state.maintenance.is_some() {
            return CellState::Maintenance;
        }
        CellState::of(state.sessions.current(), state.disabled)
    }

    fn start_activity(&self, command: StartActivity) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if self.core.begin(&mut state.sessions, &command) {
                out.send(DriverCommand::Solder {
                    activity_id: Some(command.activity.id),
                });
            }
        }
        self.core.flush(out);
    }

    fn process_aborting(&self, activity: &Arc<Activity>) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            let power = state.nominal_power;
            self.core.abort(&mut state.sessions, activity, power, &mut out);
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
                DriverMessage::ActivityCompleted {
                    activity_id,
                    result,
                } => {
                    let power = state.nominal_power;
                    let temperature = self.tracing_temperature();
                    self.core.complete(
                        &mut state.sessions,
                        result,
                        activity_id,
                        |elapsed| {
                            ActivityTrace::energy(power, elapsed)
                                .with_detail(TraceDetail::Soldering { temperature })
                        },
                        &mut out,
                    );
                }
            }
        }
        self.core.flush(out);
    }

    fn instruction_completed(&self, response: InstructionResponse) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if state.maintenance != Some(response.id) {
                warn!(cell = %self.core.id(), instruction = %response.id, "unknown instruction response ignored");
                return;
            }
            self.end_maintenance(&mut state, &mut out);
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
