//! Manual soldering workplace.
//!
//! Holds several workpieces at once on a [`Workspace`]. Every arrival opens
//! its own session; once all positions are taken the batch is started on the
//! driver. Each started activity gets its own worker instruction, and the
//! instruction's answer completes exactly that session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    Cell, CellCore, CellState, DriverCommand, DriverMessage, InstructionId, InstructionRequest,
    InstructionResponse, Outbox,
};
use crate::capabilities::{CapabilitySet, SolderingCapabilities};
use crate::config::ManualSolderingCellConfig;
use crate::error::ConfigError;
use crate::models::{
    Activity, ActivityClassification, ActivityParameters, ActivityTrace, ProcessId, TraceDetail,
};
use crate::session::{
    ActivityCompleted, ReadyToWorkType, SequenceCompleted, Session, SessionId, SessionPhaseKind,
    StartActivity, Workspace,
};

#[derive(Debug, Default)]
struct ManualState {
    disabled: bool,
    instructions: HashMap<InstructionId, SessionId>,
}

impl ManualState {
    fn capabilities(&self) -> CapabilitySet {
        if self.disabled {
            CapabilitySet::null()
        } else {
            CapabilitySet::single(SolderingCapabilities::manual())
        }
    }

    fn instruction_of(&self, session_id: SessionId) -> Option<InstructionId> {
        self.instructions
            .iter()
            .find(|(_, s)| **s == session_id)
            .map(|(id, _)| *id)
    }
}

/// Manual soldering workplace with a multi-position workspace.
#[derive(Debug)]
pub struct ManualSolderingCell {
    core: CellCore,
    config: ManualSolderingCellConfig,
    workspace: Workspace,
    state: Mutex<ManualState>,
}

impl ManualSolderingCell {
    /// Creates the cell. Fails for position counts outside 1..=10.
    pub fn new(core: CellCore, config: ManualSolderingCellConfig) -> Result<Self, ConfigError> {
        let workspace = Workspace::new(config.positions)?;
        let state = ManualState::default();
        core.init_capabilities(state.capabilities());
        Ok(Self {
            core,
            config,
            workspace,
            state: Mutex::new(state),
        })
    }

    /// The workspace, for inspection.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Processes currently held on the workspace, in position order.
    pub fn occupied_processes(&self) -> Vec<ProcessId> {
        self.workspace
            .sessions()
            .into_iter()
            .filter_map(|(_, s)| s.process_id())
            .collect()
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

    fn workpiece_arrived(&self, process_id: ProcessId, out: &mut Outbox) {
        let session = Session::start(
            ActivityClassification::Production,
            ReadyToWorkType::Pull,
            Some(process_id),
        );
        let offer = session.offer();
        match self.workspace.mount(session) {
            Ok(mounted) => {
                debug!(cell = %self.core.id(), process = %process_id, position = mounted.position, "workpiece mounted");
                out.ready_to_work(offer);
                if mounted.batch_ready {
                    info!(cell = %self.core.id(), positions = self.workspace.capacity(), "workspace full, starting batch");
                    out.send(DriverCommand::Solder { activity_id: None });
                }
            }
            Err(e) => {
                warn!(cell = %self.core.id(), process = %process_id, error = %e, "workpiece arrival ignored");
            }
        }
    }

    fn trace(&self) -> impl FnOnce(std::time::Duration) -> ActivityTrace {
        let power = self.config.nominal_power;
        let temperature = self.config.iron_temperature;
        move |elapsed| {
            ActivityTrace::energy(power, elapsed).with_detail(TraceDetail::Soldering { temperature })
        }
    }
}

impl Cell for ManualSolderingCell {
    fn core(&self) -> &CellCore {
        &self.core
    }

    fn state(&self) -> CellState {
        if self.state.lock().disabled {
            CellState::Disabled
        } else if self.workspace.is_empty() {
            CellState::Idle
        } else {
            CellState::Running
        }
    }

    fn start_activity(&self, command: StartActivity) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            let started = self.workspace.update_session(command.session_id, |s| {
                s.begin(Arc::clone(&command.activity), Instant::now())
            });
            match started {
                None => {
                    warn!(cell = %self.core.id(), session = %command.session_id, "start for unknown session ignored");
                    return;
                }
                Some(Err(e)) => {
                    warn!(cell = %self.core.id(), session = %command.session_id, error = %e, "start ignored");
                    return;
                }
                Some(Ok(())) => {}
            }

            let mut request = InstructionRequest::new(self.core.name())
                .for_session(command.session_id);
            if let ActivityParameters::Soldering(params) = &command.activity.parameters {
                request = request.with_instructions(params.instructions.iter().cloned());
            }
            match self.core.instruct(request) {
                Some(id) => {
                    state.instructions.insert(id, command.session_id);
                }
                None => {
                    let aborted = self.workspace.update_session(command.session_id, |s| {
                        s.abort(&command.activity, Instant::now())
                    });
                    if let Some(Ok(completed)) = aborted {
                        out.activity_completed(completed);
                    }
                }
            }
        }
        self.core.flush(out);
    }

    fn process_aborting(&self, activity: &Arc<Activity>) {
        if activity.is_completed() {
            debug!(cell = %self.core.id(), activity = %activity.id, "abort of finished activity ignored");
            return;
        }
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            let aborted = self.workspace.update_activity(activity.id, |s| {
                s.abort(activity, Instant::now()).map(|c| (s.id(), c))
            });
            match aborted {
                None => {
                    info!(cell = %self.core.id(), activity = %activity.id, "abort of unknown activity");
                    out.activity_completed(ActivityCompleted::unknown(activity));
                }
                Some(Ok((session_id, completed))) => {
                    let trace = ActivityTrace::energy(self.config.nominal_power, completed.elapsed);
                    out.activity_completed(completed.with_trace(trace));
                    if let Some(id) = state.instruction_of(session_id) {
                        state.instructions.remove(&id);
                        self.core.clear_instruction(id);
                    }
                }
                Some(Err(e)) => {
                    warn!(cell = %self.core.id(), activity = %activity.id, error = %e, "abort ignored");
                }
            }
        }
        self.core.flush(out);
    }

    fn sequence_completed(&self, signal: &SequenceCompleted) {
        let mut out = self.core.outbox();
        {
            let _state = self.state.lock();
            let phase = self
                .workspace
                .update_session(signal.session_id, |s| (s.phase().kind(), s.process_id()));
            let (phase, process_id) = match phase {
                Some(found) => found,
                None => {
                    warn!(cell = %self.core.id(), session = %signal.session_id, "sequence completion for unknown session ignored");
                    return;
                }
            };

            if signal.next_cells.contains(&self.core.id()) {
                match self
                    .workspace
                    .update_session(signal.session_id, Session::continue_session)
                {
                    Some(Ok(offer)) => out.ready_to_work(offer),
                    Some(Err(e)) => {
                        warn!(cell = %self.core.id(), session = %signal.session_id, error = %e, "continuation ignored")
                    }
                    None => {}
                }
            } else if phase != SessionPhaseKind::ActivityCompleted {
                warn!(cell = %self.core.id(), session = %signal.session_id, phase = ?phase, "sequence completion before result ignored");
            } else {
                match self.workspace.unmount(signal.session_id) {
                    Ok(_) => {
                        debug!(cell = %self.core.id(), session = %signal.session_id, "workpiece unmounted");
                        out.send(DriverCommand::ReleaseWorkpiece { process_id });
                    }
                    Err(e) => warn!(cell = %self.core.id(), error = %e, "unmount failed"),
                }
            }
        }
        self.core.flush(out);
    }

    fn driver_message(&self, message: DriverMessage) {
        let mut out = self.core.outbox();
        {
            let _state = self.state.lock();
            match message {
                DriverMessage::WorkpieceArrived { process_id } => {
                    self.workpiece_arrived(process_id, &mut out);
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
            let Some(session_id) = state.instructions.remove(&response.id) else {
                warn!(cell = %self.core.id(), instruction = %response.id, "unknown instruction response ignored");
                return;
            };
            let completed = self.workspace.update_session(session_id, |s| {
                s.complete(response.result, None, Instant::now())
            });
            match completed {
                Some(Ok(completed)) => {
                    let trace = (self.trace())(completed.elapsed);
                    out.activity_completed(completed.with_trace(trace));
                }
                Some(Err(e)) => {
                    warn!(cell = %self.core.id(), session = %session_id, error = %e, "completion ignored")
                }
                None => {
                    warn!(cell = %self.core.id(), session = %session_id, "instruction result for unknown session ignored")
                }
            }
        }
        self.core.flush(out);
    }

    fn control_system_attached(&self) -> Vec<Session> {
        let _state = self.state.lock();
        self.workspace.sessions().into_iter().map(|(_, s)| s).collect()
    }

    fn control_system_detached(&self) -> Vec<Session> {
        let _state = self.state.lock();
        self.workspace.sessions().into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::testing::{completions, drain, offers, rig, Probe};
    use crate::models::{ActivityId, CellId, SolderingParameters};
    use crate::session::ReadyToWork;

    fn cell(positions: usize) -> (ManualSolderingCell, Probe) {
        let (core, probe) = rig(4).into_parts();
        let config = ManualSolderingCellConfig {
            positions,
            ..Default::default()
        };
        (ManualSolderingCell::new(core, config).unwrap(), probe)
    }

    fn arrive(cell: &ManualSolderingCell, rig: &mut Probe, process: u64) -> Option<ReadyToWork> {
        cell.driver_message(DriverMessage::WorkpieceArrived {
            process_id: ProcessId(process),
        });
        offers(&drain(&mut rig.events)).pop()
    }

    fn repair(id: u64, process: u64) -> Arc<Activity> {
        Arc::new(
            Activity::new(
                ActivityId(id),
                ActivityParameters::Soldering(SolderingParameters {
                    repair_soldering: true,
                    execution_time_sec: 30,
                    instructions: vec!["Resolder J3".into()],
                }),
            )
            .with_process(ProcessId(process)),
        )
    }

    fn batches(rig: &Probe) -> usize {
        rig.driver
            .commands()
            .iter()
            .filter(|c| **c == DriverCommand::Solder { activity_id: None })
            .count()
    }

    #[test]
    fn test_rejects_invalid_position_count() {
        let (core, _probe) = rig(4).into_parts();
        let config = ManualSolderingCellConfig {
            positions: 11,
            ..Default::default()
        };
        assert!(matches!(
            ManualSolderingCell::new(core, config),
            Err(ConfigError::InvalidPositionCount { got: 11, .. })
        ));
    }

    #[test]
    fn test_batch_ready_once_when_full() {
        let (cell, mut rig) = cell(2);
        assert!(arrive(&cell, &mut rig, 1).is_some());
        assert_eq!(batches(&rig), 0);
        assert!(arrive(&cell, &mut rig, 2).is_some());
        assert_eq!(batches(&rig), 1);

        // no free position: ignored
        assert!(arrive(&cell, &mut rig, 3).is_none());
        assert_eq!(batches(&rig), 1);
        assert_eq!(cell.occupied_processes(), vec![ProcessId(1), ProcessId(2)]);
        assert_eq!(cell.state(), CellState::Running);
    }

    #[test]
    fn test_per_session_instruction_flow() {
        let (cell, mut rig) = cell(2);
        let first = arrive(&cell, &mut rig, 1).unwrap();
        let second = arrive(&cell, &mut rig, 2).unwrap();

        cell.start_activity(StartActivity::new(first.session_id, repair(1, 1)));
        cell.start_activity(StartActivity::new(second.session_id, repair(2, 2)));
        let active = rig.instructor.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].1.session_id, Some(first.session_id));
        assert_eq!(active[0].1.instructions, vec!["Resolder J3".to_string()]);

        // answering the second instruction completes only the second session
        let response = rig.instructor.respond(active[1].0, 0).unwrap();
        cell.instruction_completed(response);
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].session_id, second.session_id);
        assert_eq!(done[0].activity.id, ActivityId(2));
        assert_eq!(done[0].trace.detail, TraceDetail::Soldering { temperature: 180 });

        cell.sequence_completed(&SequenceCompleted::new(
            second.session_id,
            ActivityClassification::Production,
        ));
        assert_eq!(
            rig.driver.commands().last(),
            Some(&DriverCommand::ReleaseWorkpiece {
                process_id: Some(ProcessId(2))
            })
        );
        assert_eq!(cell.occupied_processes(), vec![ProcessId(1)]);
        assert_eq!(cell.workspace().try_get_empty_position(), Some(1));
    }

    #[test]
    fn test_unknown_session_start_ignored() {
        let (cell, mut rig) = cell(2);
        arrive(&cell, &mut rig, 1).unwrap();
        cell.start_activity(StartActivity::new(SessionId(u64::MAX), repair(1, 1)));
        assert!(rig.instructor.active().is_empty());
        assert!(drain(&mut rig.events).is_empty());
    }

    #[test]
    fn test_continue_at_same_cell() {
        let (cell, mut rig) = cell(1);
        let offer = arrive(&cell, &mut rig, 1).unwrap();
        cell.start_activity(StartActivity::new(offer.session_id, repair(1, 1)));
        let (id, _) = rig.instructor.last_active().unwrap();
        cell.instruction_completed(rig.instructor.respond(id, 0).unwrap());
        drain(&mut rig.events);

        let signal = SequenceCompleted::new(offer.session_id, ActivityClassification::Production)
            .with_next_cells(vec![CellId(4)]);
        cell.sequence_completed(&signal);
        let again = offers(&drain(&mut rig.events));
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].session_id, offer.session_id);
        assert_eq!(cell.occupied_processes(), vec![ProcessId(1)]);
    }

    #[test]
    fn test_abort_running_and_unknown() {
        let (cell, mut rig) = cell(2);
        let offer = arrive(&cell, &mut rig, 1).unwrap();
        let activity = repair(1, 1);
        cell.start_activity(StartActivity::new(offer.session_id, Arc::clone(&activity)));
        assert_eq!(rig.instructor.active().len(), 1);

        cell.process_aborting(&activity);
        cell.process_aborting(&activity);
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert!(done[0].result.failed);
        assert_eq!(done[0].session_id, offer.session_id);
        assert!(rig.instructor.active().is_empty());

        let stranger = repair(9, 9);
        cell.process_aborting(&stranger);
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].activity.id, ActivityId(9));
        assert_ne!(done[0].session_id, offer.session_id);
    }

    #[test]
    fn test_attach_reports_mounted_sessions() {
        let (cell, mut rig) = cell(3);
        arrive(&cell, &mut rig, 1);
        arrive(&cell, &mut rig, 2);
        assert_eq!(cell.control_system_attached().len(), 2);
        assert_eq!(cell.control_system_detached().len(), 2);
    }
}
