//! Simulated driver and instructor.
//!
//! Stand-ins for hardware and the worker UI. The driver records every
//! command, tracks a coarse simulation state and injects notifications into
//! the cell's mailbox; the instructor records requests and keeps the set of
//! active instructions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{
    CellHandle, CellInput, DriverCommand, DriverMessage, InstructionId, InstructionRequest,
    InstructionResponse, MessageDriver, VisualInstructor,
};
use crate::models::{ActivityId, ProcessId};

/// Coarse state of a simulated machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationState {
    /// Nothing to do.
    #[default]
    Idle,
    /// A workpiece was announced.
    Requested,
    /// Working.
    Executing,
}

#[derive(Debug, Default)]
struct DriverState {
    state: SimulationState,
    commands: Vec<DriverCommand>,
    cell: Option<CellHandle>,
}

/// Simulated machine driver.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    inner: Mutex<DriverState>,
}

impl SimulatedDriver {
    /// Creates a disconnected driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes notifications to a cell's mailbox.
    pub fn connect(&self, cell: CellHandle) {
        self.inner.lock().cell = Some(cell);
    }

    /// Stops routing notifications.
    pub fn disconnect(&self) {
        self.inner.lock().cell = None;
    }

    /// Current simulation state.
    pub fn state(&self) -> SimulationState {
        self.inner.lock().state
    }

    /// Commands received so far.
    pub fn commands(&self) -> Vec<DriverCommand> {
        self.inner.lock().commands.clone()
    }

    fn notify(&self, message: DriverMessage, next: Option<SimulationState>) {
        let cell = {
            let mut inner = self.inner.lock();
            if let Some(state) = next {
                inner.state = state;
            }
            inner.cell.clone()
        };
        match cell {
            Some(cell) => {
                cell.post(CellInput::Driver(message));
            }
            None => warn!(?message, "simulated driver not connected"),
        }
    }

    /// Announces a workpiece.
    pub fn ready(&self, process_id: ProcessId) {
        self.notify(
            DriverMessage::WorkpieceArrived { process_id },
            Some(SimulationState::Requested),
        );
    }

    /// Reports a result for the running activity.
    pub fn result(&self, activity_id: Option<ActivityId>, result: i64) {
        self.notify(DriverMessage::ActivityCompleted { activity_id, result }, None);
    }
}

impl MessageDriver for SimulatedDriver {
    fn send(&self, command: DriverCommand) {
        let mut inner = self.inner.lock();
        inner.state = if command.is_work() {
            SimulationState::Executing
        } else {
            SimulationState::Idle
        };
        debug!(?command, state = ?inner.state, "simulated driver command");
        inner.commands.push(command);
    }
}

#[derive(Debug, Default)]
struct InstructorState {
    active: BTreeMap<InstructionId, InstructionRequest>,
    history: Vec<InstructionRequest>,
}

/// Simulated visual instructor.
#[derive(Debug)]
pub struct SimulatedInstructor {
    next_id: AtomicU64,
    inner: Mutex<InstructorState>,
}

impl Default for SimulatedInstructor {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(InstructorState::default()),
        }
    }
}

impl SimulatedInstructor {
    /// Creates an instructor without instructions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions currently shown, oldest first.
    pub fn active(&self) -> Vec<(InstructionId, InstructionRequest)> {
        self.inner
            .lock()
            .active
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }

    /// Most recent shown instruction.
    pub fn last_active(&self) -> Option<(InstructionId, InstructionRequest)> {
        self.inner
            .lock()
            .active
            .iter()
            .next_back()
            .map(|(id, r)| (*id, r.clone()))
    }

    /// Every request ever shown.
    pub fn history(&self) -> Vec<InstructionRequest> {
        self.inner.lock().history.clone()
    }

    /// Answers an instruction with a number, removing it.
    pub fn respond(&self, id: InstructionId, result: i64) -> Option<InstructionResponse> {
        self.inner.lock().active.remove(&id)?;
        Some(InstructionResponse::numeric(id, result))
    }

    /// Answers an instruction with a result key, removing it.
    pub fn choose(&self, id: InstructionId, key: &str) -> Option<InstructionResponse> {
        self.inner.lock().active.remove(&id)?;
        Some(InstructionResponse::keyed(id, key))
    }
}

impl VisualInstructor for SimulatedInstructor {
    fn execute(&self, request: InstructionRequest) -> InstructionId {
        let id = InstructionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock();
        inner.history.push(request.clone());
        inner.active.insert(id, request);
        id
    }

    fn clear(&self, id: InstructionId) {
        self.inner.lock().active.remove(&id);
    }
}
