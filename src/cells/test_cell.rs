//! Simulated electrical test cell.
//!
//! The driver only reports that a test finished; the verdict is drawn from
//! the configured success rate. Failed tests report up to two faulty
//! contacts and a high resistance, passed tests a resistance below 0.1 Ω.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

use super::{Cell, CellCore, CellState, DriverCommand, DriverMessage};
use crate::capabilities::{CapabilitySet, TestCapabilities};
use crate::config::TestCellConfig;
use crate::error::ConfigError;
use crate::models::{Activity, ActivityTrace, TestResult, TraceDetail};
use crate::session::{SequenceCompleted, Session, SessionController, StartActivity};

const CONTACT_MASK: u8 = 0b000_111;
const MAX_CONTACT: u8 = 6;

/// A drawn test verdict with its measurements.
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    result: TestResult,
    faulty_contacts: Vec<u8>,
    resistance: f64,
}

impl Verdict {
    fn draw(rng: &mut StdRng, success_rate: u8) -> Self {
        if rng.random_range(0..100u8) < success_rate {
            return Self {
                result: TestResult::Success,
                faulty_contacts: Vec::new(),
                resistance: rng.random::<f64>() * 0.1,
            };
        }

        let faulty: u8 = rng.random_range(0..0b111_111);
        let faulty_contacts = [faulty & CONTACT_MASK, (faulty >> 3) & CONTACT_MASK]
            .into_iter()
            .filter(|c| (1..=MAX_CONTACT).contains(c))
            .collect();
        Self {
            result: TestResult::Failed,
            faulty_contacts,
            resistance: rng.random::<f64>() * 200.0 + 25.0,
        }
    }

    fn detail(&self) -> TraceDetail {
        TraceDetail::Test {
            faulty_contacts: self.faulty_contacts.clone(),
            contact: self.faulty_contacts.first().copied(),
            resistance: self.resistance,
        }
    }
}

#[derive(Debug)]
struct TestState {
    sessions: SessionController,
    disabled: bool,
    rng: StdRng,
}

/// Simulated electrical test station.
#[derive(Debug)]
pub struct TestCell {
    core: CellCore,
    config: TestCellConfig,
    state: Mutex<TestState>,
}

impl TestCell {
    /// Creates the cell. Success rates above 100 are rejected.
    pub fn new(core: CellCore, config: TestCellConfig) -> Result<Self, ConfigError> {
        if config.success_rate > 100 {
            return Err(ConfigError::InvalidSuccessRate(config.success_rate));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        core.init_capabilities(Self::capabilities_for(&config, false));
        Ok(Self {
            core,
            config,
            state: Mutex::new(TestState {
                sessions: SessionController::new(),
                disabled: false,
                rng,
            }),
        })
    }

    fn capabilities_for(config: &TestCellConfig, disabled: bool) -> CapabilitySet {
        if disabled {
            CapabilitySet::null()
        } else {
            CapabilitySet::single(TestCapabilities::with_voltage(config.voltage))
        }
    }

    /// Disables or enables the cell.
    pub fn set_disabled(&self, disabled: bool) {
        let mut out = self.core.outbox();
        {
            let mut state = self.state.lock();
            state.disabled = disabled;
            self.core
                .recompute_capabilities(Self::capabilities_for(&self.config, disabled), &mut out);
        }
        self.core.flush(out);
    }
}

impl Cell for TestCell {
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
            if self.core.begin(&mut state.sessions, &command) {
                out.send(DriverCommand::Test {
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
                DriverMessage::ActivityCompleted { activity_id, .. } => {
                    let verdict = Verdict::draw(&mut state.rng, self.config.success_rate);
                    debug!(cell = %self.core.id(), result = ?verdict.result, contacts = ?verdict.faulty_contacts, "test verdict");
                    let power = self.config.nominal_power;
                    let detail = verdict.detail();
                    self.core.complete(
                        &mut state.sessions,
                        verdict.result.numeric(),
                        activity_id,
                        |elapsed| ActivityTrace::energy(power, elapsed).with_detail(detail),
                        &mut out,
                    );
                }
            }
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
