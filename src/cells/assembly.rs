//! Assembly cell.
//!
//! Provides `Assembly` (equipped material + order reservations) combined
//! with `Material`. Besides assembling, it runs the setup activities that
//! change its capabilities: material changes (through a setup instruction)
//! and material reservations (applied immediately).

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Cell, CellCore, CellState, DriverCommand, DriverMessage, InstructionId, InstructionRequest, InstructionResponse, Outbox};
use crate::capabilities::{AssemblyCapabilities, Capability, CapabilitySet};
use crate::config::AssemblyCellConfig;
use crate::models::{Activity, ActivityClassification, ActivityParameters, ActivityTrace};
use crate::session::{
    ReadyToWorkType, SequenceCompleted, SequenceOutcome, Session, SessionController, StartActivity,
};

#[derive(Debug)]
enum PendingInstruction {
    Assembly(InstructionId),
    MaterialChange {
        id: InstructionId,
        material: Option<String>,
    },
}

impl PendingInstruction {
    fn id(&self) -> InstructionId {
        match self {
            PendingInstruction::Assembly(id) | PendingInstruction::MaterialChange { id, .. } => *id,
        }
    }
}

#[derive(Debug)]
struct AssemblyState {
    sessions: SessionController,
    disabled: bool,
    manual_mode: bool,
    material: Option<String>,
    reservations: Vec<String>,
    pending: Option<PendingInstruction>,
}

impl AssemblyState {
    fn capabilities(&self) -> CapabilitySet {
        if self.disabled {
            return CapabilitySet::null();
        }
        CapabilitySet::combined([
            Capability::Assembly(AssemblyCapabilities {
                equipped_material: self.material.clone(),
                reservations: Some(self.reservations.clone()),
            }),
            Capability::Material,
        ])
    }
}

/// Assembly station with material handling.
#[derive(Debug)]
pub struct AssemblyCell {
    core: CellCore,
    nominal_power: u32,
    state: Mutex<AssemblyState>,
}

impl AssemblyCell {
    /// Creates the cell and publishes its initial capabilities.
    pub fn new(core: CellCore, config: AssemblyCellConfig) -> Self {
        let state = AssemblyState {
            sessions: SessionController::new(),
            disabled: false,
            manual_mode: config.manual_mode,
            material: config.material,
            reservations: Vec::new(),
            pending: None,
        };
        core.init_capabilities(state.capabilities());
        Self {
            core,
            nominal_power: config.nominal_power,
            state: Mutex::new(state),
        }
    }

    /// Equipped material.
    pub fn material(&self) -> Option<String> {
        self.state.lock().material.clone()
    }

    /// Current order reservations.
    pub fn reservations(&self) -> Vec<String> {
        self.state.lock().reservations.clone()
    }

    fn recompute(&self, state: &AssemblyState, out: &mut Outbox) {
        self.core.recompute_capabilities(state.capabilities(), out);
    }

    /// Equips a material directly.
    pub fn set_material(&self, material: Option<String>) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            state.material = material;
            self.recompute(&state, &mut out);
        }
        self.core.flush(out);
    }

    /// Removes the material and every reservation.
    pub fn reset_material(&self) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            state.reservations.clear();
            state.material = None;
            self.recompute(&state, &mut out);
        }
        info!(cell = %self.core.id(), "material reset");
        self.core.flush(out);
    }

    /// Disables or enables the cell.
    pub fn set_disabled(&self, disabled: bool) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            state.disabled = disabled;
            self.recompute(&state, &mut out);
        }
        self.core.flush(out);
    }

    /// Switches between instructed and driver assembly.
    pub fn set_manual_mode(&self, manual_mode: bool) {
        self.state.lock().manual_mode = manual_mode;
    }

    /// Recomputes the capability set from the current state.
    pub fn recompute_capabilities(&self) {
        let mut out = self.core.outbox();
        {
            let state = self.state.lock();
            self.recompute(&state, &mut out);
        }
        self.core.flush(out);
    }

    fn energy(&self) -> impl FnOnce(Duration) -> ActivityTrace {
        let power = self.nominal_power;
        move |elapsed| ActivityTrace::energy(power, elapsed)
    }

    fn reserve(&self, state: &mut AssemblyState, reserve: bool, order: &str) {
        let present = state.reservations.iter().any(|r| r == order);
        if reserve && !present {
            state.reservations.push(order.to_string());
        } else if !reserve {
            state.reservations.retain(|r| r != order);
        }
        debug!(cell = %self.core.id(), order, reserve, "reservation updated");
    }
}

impl Cell for AssemblyCell {
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
            let activity = &command.activity;
            match &activity.parameters {
                ActivityParameters::Assembly(_) if state.manual_mode => {
                    let request = InstructionRequest::new(self.core.name())
                        .with_instruction(format!("Assemble product for activity {}", activity.id))
                        .for_session(command.session_id);
                    match self.core.instruct(request) {
                        Some(id) => state.pending = Some(PendingInstruction::Assembly(id)),
                        None => self.core.abort(&mut state.sessions, activity, self.nominal_power, &mut out),
                    }
                }
                ActivityParameters::Assembly(_) => {
                    out.send(DriverCommand::Assemble {
                        activity_id: activity.id,
                    });
                }
                ActivityParameters::MaterialChange(params) => {
                    let request = InstructionRequest::new(self.core.name())
                        .with_instructions(params.instructions.iter().cloned())
                        .for_session(command.session_id);
                    match self.core.instruct(request) {
                        Some(id) => {
                            state.pending = Some(PendingInstruction::MaterialChange {
                                id,
                                material: params.material.clone(),
                            })
                        }
                        None => self.core.abort(&mut state.sessions, activity, self.nominal_power, &mut out),
                    }
                }
                ActivityParameters::MaterialReservation(params) => {
                    self.reserve(&mut state, params.reserve, &params.order);
                    self.recompute(&state, &mut out);
                    self.core
                        .complete(&mut state.sessions, 0, Some(activity.id), self.energy(), &mut out);
                }
                _ => {
                    warn!(cell = %self.core.id(), activity = %activity.id, kind = ?activity.kind(), "unsupported activity");
                    self.core.abort(&mut state.sessions, activity, self.nominal_power, &mut out);
                }
            }
        }
        self.core.flush(out);
    }

    fn process_aborting(&self, activity: &Arc<Activity>) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            let running = state
                .sessions
                .current()
                .is_some_and(|s| s.has_activity(activity.id));
            if running {
                if let Some(pending) = state.pending.take() {
                    self.core.clear_instruction(pending.id());
                }
            }
            self.core.abort(&mut state.sessions, activity, self.nominal_power, &mut out);
        }
        self.core.flush(out);
    }

    fn sequence_completed(&self, signal: &SequenceCompleted) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            let release = signal.accepted_classification == ActivityClassification::Production;
            if let Some(SequenceOutcome::Released) =
                self.core.finish_sequence(&mut state.sessions, signal, release, &mut out)
            {
                debug!(cell = %self.core.id(), session = %signal.session_id, release, "session closed");
            }
        }
        self.core.flush(out);
    }

    fn driver_message(&self, message: DriverMessage) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            match message {
                DriverMessage::WorkpieceArrived { process_id } => {
                    self.core.workpiece_arrived(&mut state.sessions, process_id, &mut out);
                }
                DriverMessage::ActivityCompleted {
                    activity_id,
                    result,
                } => {
                    self.core
                        .complete(&mut state.sessions, result, activity_id, self.energy(), &mut out);
                }
            }
        }
        self.core.flush(out);
    }

    fn instruction_completed(&self, response: InstructionResponse) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            let pending = match state.pending.take() {
                Some(p) if p.id() == response.id => p,
                other => {
                    state.pending = other;
                    warn!(cell = %self.core.id(), instruction = %response.id, "unknown instruction response ignored");
                    return;
                }
            };
            if let PendingInstruction::MaterialChange { material, .. } = pending {
                let running = state.sessions.current().and_then(Session::activity).cloned();
                let succeeded = running
                    .map(|a| a.kind().result_from_numeric(response.result).is_success())
                    .unwrap_or(false);
                if succeeded {
                    info!(cell = %self.core.id(), material = ?material, "material changed");
                    state.material = material;
                    self.recompute(&state, &mut out);
                }
            }
            self.core
                .complete(&mut state.sessions, response.result, None, self.energy(), &mut out);
        }
        self.core.flush(out);
    }

    fn control_system_attached(&self) -> Vec<Session> {
        let mut state = self.state.lock();
        if state.sessions.is_idle() {
            if let Err(e) = state
                .sessions
                .offer(ActivityClassification::Setup, ReadyToWorkType::Push, None)
            {
                warn!(cell = %self.core.id(), error = %e, "setup session not opened");
            }
        }
        state.sessions.current().cloned().into_iter().collect()
    }

    fn control_system_detached(&self) -> Vec<Session> {
        self.state.lock().sessions.current().cloned().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MatchPolicy;
    use crate::cells::testing::{completions, drain, offers, rig, Probe};
    use crate::cells::CellEvent;
    use crate::models::{
        ActivityId, AssemblyParameters, MaterialChangeParameters, MaterialReservationParameters,
        ProcessId,
    };

    fn cell(manual: bool) -> (AssemblyCell, Probe) {
        let (core, probe) = rig(1).into_parts();
        let config = AssemblyCellConfig {
            manual_mode: manual,
            material: Some("M-1".into()),
            ..Default::default()
        };
        (AssemblyCell::new(core, config), probe)
    }

    fn setup_session(cell: &AssemblyCell) -> crate::session::SessionId {
        let sessions = cell.control_system_attached();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].classification(), ActivityClassification::Setup);
        sessions[0].id()
    }

    fn reservation(id: u64, reserve: bool, order: &str) -> Arc<Activity> {
        Arc::new(Activity::new(
            ActivityId(id),
            ActivityParameters::MaterialReservation(MaterialReservationParameters {
                reserve,
                order: order.into(),
                material: Some("M-1".into()),
            }),
        ))
    }

    fn run_setup(cell: &AssemblyCell, activity: Arc<Activity>) {
        let session = setup_session(cell);
        cell.start_activity(StartActivity::new(session, activity));
        cell.sequence_completed(&SequenceCompleted::new(session, ActivityClassification::Setup));
    }

    #[test]
    fn test_initial_capabilities() {
        let (cell, _rig) = cell(false);
        let caps = cell.capabilities();
        let assembly = Capability::Assembly(AssemblyCapabilities::new().with_material("M-1"));
        assert!(caps.provides(&assembly));
        assert!(caps.provides(&Capability::Material));
        assert!(!caps.provides(&Capability::Assembly(AssemblyCapabilities::new().with_material("M-2"))));
    }

    #[test]
    fn test_driver_assembly_flow() {
        let (cell, mut rig) = cell(false);
        cell.driver_message(DriverMessage::WorkpieceArrived {
            process_id: ProcessId(5),
        });
        let offer = offers(&drain(&mut rig.events)).remove(0);
        assert_eq!(cell.state(), CellState::Running);

        let activity = Arc::new(
            Activity::new(
                ActivityId(1),
                ActivityParameters::Assembly(AssemblyParameters {
                    material: Some("M-1".into()),
                    execution_time_sec: 3,
                }),
            )
            .with_process(ProcessId(5)),
        );
        cell.start_activity(StartActivity::new(offer.session_id, Arc::clone(&activity)));
        assert_eq!(
            rig.driver.commands(),
            vec![DriverCommand::Assemble {
                activity_id: ActivityId(1)
            }]
        );

        cell.driver_message(DriverMessage::ActivityCompleted {
            activity_id: None,
            result: 0,
        });
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert!(done[0].result.is_success());

        cell.sequence_completed(&SequenceCompleted::new(
            offer.session_id,
            ActivityClassification::Production,
        ));
        assert_eq!(cell.state(), CellState::Idle);
        assert!(matches!(
            rig.driver.commands().last(),
            Some(DriverCommand::ReleaseWorkpiece { .. })
        ));
    }

    #[test]
    fn test_manual_assembly_uses_instructor() {
        let (cell, mut rig) = cell(true);
        cell.driver_message(DriverMessage::WorkpieceArrived {
            process_id: ProcessId(5),
        });
        let offer = offers(&drain(&mut rig.events)).remove(0);
        let activity = Arc::new(Activity::new(
            ActivityId(1),
            ActivityParameters::Assembly(AssemblyParameters::default()),
        ));
        cell.start_activity(StartActivity::new(offer.session_id, activity));
        assert!(rig.driver.commands().is_empty());

        let (id, _) = rig.instructor.last_active().unwrap();
        cell.instruction_completed(rig.instructor.respond(id, 1).unwrap());
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert!(!done[0].result.is_success());
    }

    #[test]
    fn test_reservation_round_trip() {
        let (cell, mut rig) = cell(false);
        let before = cell.reservations();
        let caps_before = cell.capabilities();

        run_setup(&cell, reservation(1, true, "O-7"));
        assert_eq!(cell.reservations(), vec!["O-7".to_string()]);
        // reserving twice keeps a single token
        run_setup(&cell, reservation(2, true, "O-7"));
        assert_eq!(cell.reservations().len(), 1);

        run_setup(&cell, reservation(3, false, "O-7"));
        assert_eq!(cell.reservations(), before);
        assert_eq!(*cell.capabilities(), *caps_before);

        let events = drain(&mut rig.events);
        assert_eq!(completions(&events).len(), 3);
        assert!(events
            .iter()
            .any(|e| matches!(e, CellEvent::CapabilitiesChanged { .. })));
        // setup sessions never release a workpiece
        assert!(rig.driver.commands().is_empty());
    }

    #[test]
    fn test_reserved_cell_rejects_unreserved_material_change() {
        let (cell, _rig) = cell(false);
        run_setup(&cell, reservation(1, true, "O-1"));
        let change = Activity::new(
            ActivityId(2),
            ActivityParameters::MaterialChange(MaterialChangeParameters::default()),
        );
        assert!(!cell
            .capabilities()
            .provides_with(&change.required_capabilities(), &MatchPolicy::default()));

        let release = reservation(3, false, "O-1");
        assert!(cell.capabilities().provides(&release.required_capabilities()));
    }

    #[test]
    fn test_material_change_applies_on_success() {
        let (cell, mut rig) = cell(false);
        let session = setup_session(&cell);
        let change = Arc::new(Activity::new(
            ActivityId(1),
            ActivityParameters::MaterialChange(MaterialChangeParameters {
                material: Some("M-2".into()),
                instructions: vec!["Swap the feeder".into()],
            }),
        ));
        cell.start_activity(StartActivity::new(session, change));
        let (id, request) = rig.instructor.last_active().unwrap();
        assert_eq!(request.instructions, vec!["Swap the feeder".to_string()]);
        assert_eq!(cell.material(), Some("M-1".into()));

        cell.instruction_completed(rig.instructor.respond(id, 0).unwrap());
        assert_eq!(cell.material(), Some("M-2".into()));
        assert_eq!(completions(&drain(&mut rig.events)).len(), 1);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let (cell, mut rig) = cell(false);
        let first = cell.capabilities();
        cell.recompute_capabilities();
        cell.recompute_capabilities();
        assert_eq!(*cell.capabilities(), *first);
        assert!(drain(&mut rig.events).is_empty());
    }

    #[test]
    fn test_disable_and_reset() {
        let (cell, _rig) = cell(false);
        cell.set_disabled(true);
        assert!(cell.capabilities().is_null());
        assert_eq!(cell.state(), CellState::Disabled);
        cell.set_disabled(false);
        run_setup(&cell, reservation(1, true, "O-1"));
        cell.reset_material();
        assert!(cell.reservations().is_empty());
        assert_eq!(cell.material(), None);
    }

    #[test]
    fn test_abort_clears_instruction_and_fails_once() {
        let (cell, mut rig) = cell(true);
        cell.driver_message(DriverMessage::WorkpieceArrived {
            process_id: ProcessId(5),
        });
        let offer = offers(&drain(&mut rig.events)).remove(0);
        let activity = Arc::new(Activity::new(
            ActivityId(1),
            ActivityParameters::Assembly(AssemblyParameters::default()),
        ));
        cell.start_activity(StartActivity::new(offer.session_id, Arc::clone(&activity)));
        assert_eq!(rig.instructor.active().len(), 1);

        cell.process_aborting(&activity);
        cell.process_aborting(&activity);
        assert!(rig.instructor.active().is_empty());
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert!(done[0].result.failed);
    }

    #[test]
    fn test_unrelated_abort_keeps_running_instruction() {
        let (cell, mut rig) = cell(true);
        cell.driver_message(DriverMessage::WorkpieceArrived {
            process_id: ProcessId(5),
        });
        let offer = offers(&drain(&mut rig.events)).remove(0);
        let activity = Arc::new(Activity::new(
            ActivityId(1),
            ActivityParameters::Assembly(AssemblyParameters::default()),
        ));
        cell.start_activity(StartActivity::new(offer.session_id, Arc::clone(&activity)));

        let stranger = Arc::new(Activity::new(
            ActivityId(9),
            ActivityParameters::Assembly(AssemblyParameters::default()),
        ));
        cell.process_aborting(&stranger);
        assert_eq!(rig.instructor.active().len(), 1);
        let wrapped = completions(&drain(&mut rig.events));
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].activity.id, ActivityId(9));

        let (id, _) = rig.instructor.last_active().unwrap();
        cell.instruction_completed(rig.instructor.respond(id, 0).unwrap());
        let done = completions(&drain(&mut rig.events));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].activity.id, ActivityId(1));
        assert!(done[0].result.is_success());
        assert!(activity.is_completed());
    }
}
