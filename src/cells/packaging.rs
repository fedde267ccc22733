//! Packaging cell.
//!
//! Packs through its driver. Every `packaging_amount` products the worker is
//! asked to switch the box, and every `maintenance_threshold` sequences a
//! maintenance instruction is shown that can be postponed or confirmed.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    Cell, CellCore, CellState, DriverCommand, DriverMessage, InstructionId, InstructionRequest,
    InstructionResponse, DONE, POSTPONE,
};
use crate::capabilities::{Capability, CapabilitySet};
use crate::config::PackagingCellConfig;
use crate::models::{Activity, ActivityTrace};
use crate::session::{SequenceCompleted, Session, SessionController, StartActivity};

#[derive(Debug, Default)]
struct PackagingState {
    sessions: SessionController,
    box_count: u32,
    box_instruction: Option<InstructionId>,
    total_cycles: u64,
    cycles_since_maintenance: u32,
    maintenance: Option<InstructionId>,
}

/// Packing station.
#[derive(Debug)]
pub struct PackagingCell {
    core: CellCore,
    config: PackagingCellConfig,
    state: Mutex<PackagingState>,
}

impl PackagingCell {
    /// Creates the cell with empty box and maintenance counters.
    pub fn new(core: CellCore, config: PackagingCellConfig) -> Self {
        core.init_capabilities(CapabilitySet::single(Capability::Packing));
        Self {
            core,
            config,
            state: Mutex::new(PackagingState::default()),
        }
    }

    /// Products in the current box.
    pub fn box_count(&self) -> u32 {
        self.state.lock().box_count
    }

    /// Sequences completed since the last maintenance.
    pub fn cycles_since_maintenance(&self) -> u32 {
        self.state.lock().cycles_since_maintenance
    }

    /// Sequences completed overall.
    pub fn total_cycles(&self) -> u64 {
        self.state.lock().total_cycles
    }

    /// Shows the maintenance instruction now.
    pub fn do_maintenance(&self) {
        let mut state = self.state.lock();
        self.maintain(&mut state);
    }

    fn maintain(&self, state: &mut PackagingState) {
        if !self.core.has_instructor() {
            warn!(cell = %self.core.id(), "maintenance due but no instructor attached");
            return;
        }
        if let Some(previous) = state.maintenance.take() {
            self.core.clear_instruction(previous);
        }
        let mut request = InstructionRequest::new(self.core.name())
            .with_instruction("Clean the packaging unit and refill the consumables.")
            .with_result(POSTPONE)
            .with_result(DONE);
        if let Some(media) = &self.config.maintenance_instruction {
            request = request.with_instruction(media.clone());
        }
        state.maintenance = self.core.instruct(request);
        info!(cell = %self.core.id(), cycles = state.cycles_since_maintenance, "maintenance requested");
    }

    fn count_box(&self, state: &mut PackagingState) {
        state.box_count += 1;
        let amount = self.config.packaging_amount;
        if amount == 0 || state.box_count % amount != 0 {
            return;
        }
        if let Some(previous) = state.box_instruction.take() {
            self.core.clear_instruction(previous);
        }
        let request = InstructionRequest::new(self.core.name()).with_instruction(format!(
            "The box holds {} parts, the packaging unit is {}. Please switch the box!",
            state.box_count, amount
        ));
        state.box_instruction = self.core.instruct(request);
        debug!(cell = %self.core.id(), parts = state.box_count, "box switch requested");
    }

    fn count_cycle(&self, state: &mut PackagingState) {
        state.cycles_since_maintenance += 1;
        state.total_cycles += 1;
        let threshold = self.config.maintenance_threshold;
        if threshold > 0 && state.cycles_since_maintenance >= threshold {
            self.maintain(state);
        }
    }
}

impl Cell for PackagingCell {
    fn core(&self) -> &CellCore {
        &self.core
    }

    fn state(&self) -> CellState {
        let state = self.state.lock();
        if state.maintenance.is_some() {
            return CellState::Maintenance;
        }
        CellState::of(state.sessions.current(), false)
    }

    fn start_activity(&self, command: StartActivity) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if self.core.begin(&mut state.sessions, &command) {
                out.send(DriverCommand::Pack {
                    activity_id: command.activity.id,
                });
            }
        }
        self.core.flush(out);
    }

    fn process_aborting(&self, activity: &Arc<Activity>) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            self.core
                .abort(&mut state.sessions, activity, self.config.nominal_power, &mut out);
        }
        self.core.flush(out);
    }

    fn sequence_completed(&self, signal: &SequenceCompleted) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            if self
                .core
                .finish_sequence(&mut state.sessions, signal, true, &mut out)
                .is_some()
            {
                self.count_cycle(&mut state);
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
                    self.core
                        .workpiece_arrived(&mut state.sessions, process_id, &mut out);
                }
                DriverMessage::ActivityCompleted {
                    activity_id,
                    result,
                } => {
                    let power = self.config.nominal_power;
                    if self.core.complete(
                        &mut state.sessions,
                        result,
                        activity_id,
                        |elapsed| ActivityTrace::energy(power, elapsed),
                        &mut out,
                    ) {
                        self.count_box(&mut state);
                    }
                }
            }
        }
        self.core.flush(out);
    }

    fn instruction_completed(&self, response: InstructionResponse) {
        let mut state = self.state.lock();
        if state.box_instruction == Some(response.id) {
            state.box_instruction = None;
            state.box_count = 0;
            debug!(cell = %self.core.id(), "box switched");
        } else if state.maintenance == Some(response.id) {
            state.maintenance = None;
            if response.key.as_deref() == Some(POSTPONE) {
                info!(cell = %self.core.id(), cycles = state.cycles_since_maintenance, "maintenance postponed");
            } else {
                state.cycles_since_maintenance = 0;
                self.core.clear_instruction(response.id);
                info!(cell = %self.core.id(), "maintenance done");
            }
        } else {
            warn!(cell = %self.core.id(), instruction = %response.id, "unknown instruction response ignored");
        }
    }

    fn control_system_attached(&self) -> Vec<Session> {
        self.state.lock().sessions.current().cloned().into_iter().collect()
    }

    fn control_system_detached(&self) -> Vec<Session> {
        self.state.lock().sessions.current().cloned().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::testing::{completions, drain, offers, rig, Probe};
    use crate::models::{ActivityClassification, ActivityId, ActivityParameters, ProcessId};

    fn cell(packaging_amount: u32, maintenance_threshold: u32) -> (PackagingCell, Probe) {
        let (core, probe) = rig(6).into_parts();
        let config = PackagingCellConfig {
            packaging_amount,
            maintenance_threshold,
            maintenance_instruction: Some("https://media/packaging.mp4".into()),
            ..Default::default()
        };
        (PackagingCell::new(core, config), probe)
    }

    fn pack(cell: &PackagingCell, rig: &mut Probe, id: u64) {
        cell.driver_message(DriverMessage::WorkpieceArrived {
            process_id: ProcessId(id),
        });
        let offer = offers(&drain(&mut rig.events)).remove(0);
        let activity = Arc::new(
            Activity::new(ActivityId(id), ActivityParameters::Packing).with_process(ProcessId(id)),
        );
        cell.start_activity(StartActivity::new(offer.session_id, activity));
        cell.driver_message(DriverMessage::ActivityCompleted {
            activity_id: Some(ActivityId(id)),
            result: 0,
        });
        assert_eq!(completions(&drain(&mut rig.events)).len(), 1);
        cell.sequence_completed(&SequenceCompleted::new(
            offer.session_id,
            ActivityClassification::Production,
        ));
    }

    #[test]
    fn test_box_switch_every_packaging_amount() {
        let (cell, mut rig) = cell(2, 0);
        pack(&cell, &mut rig, 1);
        assert!(rig.instructor.active().is_empty());
        pack(&cell, &mut rig, 2);
        let (id, request) = rig.instructor.last_active().unwrap();
        assert!(request.instructions[0].contains("2 parts"));
        assert_eq!(cell.box_count(), 2);

        cell.instruction_completed(rig.instructor.respond(id, 0).unwrap());
        assert_eq!(cell.box_count(), 0);
        assert_eq!(
            rig.driver.commands().last(),
            Some(&DriverCommand::ReleaseWorkpiece {
                process_id: Some(ProcessId(2))
            })
        );
    }

    #[test]
    fn test_unanswered_box_instruction_is_replaced() {
        let (cell, mut rig) = cell(1, 0);
        pack(&cell, &mut rig, 1);
        pack(&cell, &mut rig, 2);
        assert_eq!(rig.instructor.active().len(), 1);
        assert_eq!(rig.instructor.history().len(), 2);
    }

    #[test]
    fn test_maintenance_postpone_and_done() {
        let (cell, mut rig) = cell(100, 2);
        pack(&cell, &mut rig, 1);
        assert_ne!(cell.state(), CellState::Maintenance);
        pack(&cell, &mut rig, 2);
        assert_eq!(cell.state(), CellState::Maintenance);

        let (id, request) = rig.instructor.last_active().unwrap();
        assert_eq!(request.results, vec![POSTPONE.to_string(), DONE.to_string()]);
        assert_eq!(request.instructions[1], "https://media/packaging.mp4");
        cell.instruction_completed(rig.instructor.choose(id, POSTPONE).unwrap());
        assert_eq!(cell.state(), CellState::Idle);
        assert_eq!(cell.cycles_since_maintenance(), 2);

        // still due: asked again after the next sequence
        pack(&cell, &mut rig, 3);
        assert_eq!(cell.state(), CellState::Maintenance);
        let (id, _) = rig.instructor.last_active().unwrap();
        cell.instruction_completed(rig.instructor.choose(id, DONE).unwrap());
        assert_eq!(cell.cycles_since_maintenance(), 0);
        assert_eq!(cell.total_cycles(), 3);
        assert_eq!(cell.state(), CellState::Idle);
    }

    #[test]
    fn test_zero_threshold_never_maintains() {
        let (cell, mut rig) = cell(100, 0);
        for id in 1..=5 {
            pack(&cell, &mut rig, id);
        }
        assert!(rig.instructor.history().is_empty());
        assert_eq!(cell.cycles_since_maintenance(), 5);
    }
}
