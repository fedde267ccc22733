//! Activity model.
//!
//! An activity is one schedulable unit of production work. It is created by
//! the workplan layer, matched against cell capabilities, started on exactly
//! one cell, and completed exactly once.
//!
//! # Requirement Derivation
//!
//! Each kind derives its required capability from its parameters:
//! - **Assembly**: the material it consumes
//! - **Material change**: any unreserved assembly cell
//! - **Material reservation**: reserve = cell with the material; release = cell
//!   holding the order token
//! - **Soldering**: manual cell when repairing
//! - **Test**: the product's voltage

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::result::{
    ActivityResult, AssemblyResult, DefaultActivityResult, MaterialChangeResult, PackingResult,
    ResultCode, SolderingResult, TestResult,
};
use super::{ActivityId, ProcessId};
use crate::capabilities::{
    AssemblyCapabilities, Capability, SolderingCapabilities, TestCapabilities,
};

/// Whether an activity produces or sets up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityClassification {
    /// Work on a workpiece.
    Production,
    /// Preparation of the cell itself.
    Setup,
}

/// Whether an activity needs a workpiece (process) at the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessRequirement {
    /// A workpiece must be present.
    Required,
    /// Runs without a workpiece.
    NotRequired,
}

/// Discriminant of [`ActivityParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    /// Assemble a part.
    Assembly,
    /// Change the equipped material.
    MaterialChange,
    /// Reserve or release material for an order.
    MaterialReservation,
    /// Pack the product.
    Packing,
    /// Solder joints.
    Soldering,
    /// Electrical test.
    Test,
    /// Clean up a virtually mounted process.
    ProcessFixup,
}

/// Assembly parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyParameters {
    /// Material consumed by the assembly.
    pub material: Option<String>,
    /// Expected duration in seconds.
    pub execution_time_sec: u32,
}

/// Material change parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialChangeParameters {
    /// Material to equip.
    pub material: Option<String>,
    /// Setup instructions shown to the worker.
    pub instructions: Vec<String>,
}

/// Material reservation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialReservationParameters {
    /// `true` reserves, `false` releases.
    pub reserve: bool,
    /// Order token.
    pub order: String,
    /// Material the order needs.
    pub material: Option<String>,
}

/// Soldering parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolderingParameters {
    /// Repair after a failed test; needs a manual cell.
    pub repair_soldering: bool,
    /// Expected duration in seconds.
    pub execution_time_sec: u32,
    /// Instructions for manual soldering.
    pub instructions: Vec<String>,
}

/// Test parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestParameters {
    /// Product voltage; `0` = any.
    pub voltage: u32,
    /// Expected duration in seconds.
    pub execution_time_sec: u32,
}

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityParameters {
    /// Assembly.
    Assembly(AssemblyParameters),
    /// Material change.
    MaterialChange(MaterialChangeParameters),
    /// Material reservation.
    MaterialReservation(MaterialReservationParameters),
    /// Packing.
    Packing,
    /// Soldering.
    Soldering(SolderingParameters),
    /// Test.
    Test(TestParameters),
    /// Process fix-up.
    ProcessFixup,
}

impl ActivityParameters {
    /// Returns the kind tag.
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityParameters::Assembly(_) => ActivityKind::Assembly,
            ActivityParameters::MaterialChange(_) => ActivityKind::MaterialChange,
            ActivityParameters::MaterialReservation(_) => ActivityKind::MaterialReservation,
            ActivityParameters::Packing => ActivityKind::Packing,
            ActivityParameters::Soldering(_) => ActivityKind::Soldering,
            ActivityParameters::Test(_) => ActivityKind::Test,
            ActivityParameters::ProcessFixup => ActivityKind::ProcessFixup,
        }
    }
}

impl ActivityKind {
    /// Maps a reported number to this kind's result enumeration.
    ///
    /// Unknown numbers become a synthesized failure.
    pub fn result_from_numeric(self, value: i64) -> ActivityResult {
        let code = match self {
            ActivityKind::Assembly => AssemblyResult::from_numeric(value).map(ResultCode::Assembly),
            ActivityKind::MaterialChange => {
                MaterialChangeResult::from_numeric(value).map(ResultCode::MaterialChange)
            }
            ActivityKind::MaterialReservation | ActivityKind::ProcessFixup => {
                DefaultActivityResult::from_numeric(value).map(ResultCode::Default)
            }
            ActivityKind::Packing => PackingResult::from_numeric(value).map(ResultCode::Packing),
            ActivityKind::Soldering => {
                SolderingResult::from_numeric(value).map(ResultCode::Soldering)
            }
            ActivityKind::Test => TestResult::from_numeric(value).map(ResultCode::Test),
        };
        match code {
            Some(code) => ActivityResult::new(code),
            None => self.failure_result(),
        }
    }

    /// The synthesized failure for this kind.
    pub fn failure_result(self) -> ActivityResult {
        let code = match self {
            ActivityKind::Assembly => ResultCode::Assembly(AssemblyResult::failure()),
            ActivityKind::MaterialChange => {
                ResultCode::MaterialChange(MaterialChangeResult::failure())
            }
            ActivityKind::MaterialReservation | ActivityKind::ProcessFixup => {
                ResultCode::Default(DefaultActivityResult::failure())
            }
            ActivityKind::Packing => ResultCode::Packing(PackingResult::failure()),
            ActivityKind::Soldering => ResultCode::Soldering(SolderingResult::failure()),
            ActivityKind::Test => ResultCode::Test(TestResult::failure()),
        };
        ActivityResult::failure(code)
    }
}

/// An activity instance.
///
/// Shared as `Arc<Activity>` between the activity pool, selectors and the
/// cell running it. The result is written once.
#[derive(Debug)]
pub struct Activity {
    /// Unique activity identifier.
    pub id: ActivityId,
    /// Process the activity belongs to, if it needs one.
    pub process_id: Option<ProcessId>,
    /// Kind-specific parameters.
    pub parameters: ActivityParameters,
    result: OnceLock<ActivityResult>,
}

impl Activity {
    /// Creates a new activity.
    pub fn new(id: ActivityId, parameters: ActivityParameters) -> Self {
        Self {
            id,
            process_id: None,
            parameters,
            result: OnceLock::new(),
        }
    }

    /// Sets the owning process.
    pub fn with_process(mut self, process_id: ProcessId) -> Self {
        self.process_id = Some(process_id);
        self
    }

    /// Returns the kind tag.
    pub fn kind(&self) -> ActivityKind {
        self.parameters.kind()
    }

    /// Production or setup.
    pub fn classification(&self) -> ActivityClassification {
        match self.kind() {
            ActivityKind::MaterialChange | ActivityKind::MaterialReservation => {
                ActivityClassification::Setup
            }
            _ => ActivityClassification::Production,
        }
    }

    /// Whether a workpiece must be present.
    pub fn process_requirement(&self) -> ProcessRequirement {
        match self.kind() {
            ActivityKind::MaterialChange | ActivityKind::MaterialReservation => {
                ProcessRequirement::NotRequired
            }
            _ => ProcessRequirement::Required,
        }
    }

    /// The capability a cell must provide to run this activity.
    pub fn required_capabilities(&self) -> Capability {
        match &self.parameters {
            ActivityParameters::Assembly(p) => Capability::Assembly(AssemblyCapabilities {
                equipped_material: p.material.clone(),
                reservations: None,
            }),
            ActivityParameters::MaterialChange(_) => {
                Capability::Assembly(AssemblyCapabilities::unreserved())
            }
            ActivityParameters::MaterialReservation(p) => {
                Capability::Assembly(AssemblyCapabilities {
                    equipped_material: p.material.clone(),
                    reservations: if p.reserve {
                        None
                    } else {
                        Some(vec![p.order.clone()])
                    },
                })
            }
            ActivityParameters::Packing => Capability::Packing,
            ActivityParameters::Soldering(p) => Capability::Soldering(SolderingCapabilities {
                manual_soldering: p.repair_soldering,
            }),
            ActivityParameters::Test(p) => Capability::Test(TestCapabilities {
                voltage: p.voltage,
            }),
            ActivityParameters::ProcessFixup => Capability::ProcessFixup,
        }
    }

    /// The result, once completed.
    pub fn result(&self) -> Option<&ActivityResult> {
        self.result.get()
    }

    /// Whether a result is present.
    pub fn is_completed(&self) -> bool {
        self.result.get().is_some()
    }

    /// Completes with a reported number. The first result wins.
    pub fn complete(&self, value: i64) -> ActivityResult {
        *self
            .result
            .get_or_init(|| self.kind().result_from_numeric(value))
    }

    /// Completes with the kind's failure. The first result wins.
    pub fn fail(&self) -> ActivityResult {
        *self.result.get_or_init(|| self.kind().failure_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(reserve: bool) -> Activity {
        Activity::new(
            ActivityId(1),
            ActivityParameters::MaterialReservation(MaterialReservationParameters {
                reserve,
                order: "ORD-7".into(),
                material: Some("PCB".into()),
            }),
        )
    }

    #[test]
    fn test_activity_builder() {
        let act = Activity::new(ActivityId(3), ActivityParameters::Packing).with_process(ProcessId(9));
        assert_eq!(act.id, ActivityId(3));
        assert_eq!(act.process_id, Some(ProcessId(9)));
        assert_eq!(act.kind(), ActivityKind::Packing);
        assert_eq!(act.classification(), ActivityClassification::Production);
        assert_eq!(act.process_requirement(), ProcessRequirement::Required);
        assert!(!act.is_completed());
    }

    #[test]
    fn test_setup_classification() {
        let act = Activity::new(
            ActivityId(1),
            ActivityParameters::MaterialChange(MaterialChangeParameters::default()),
        );
        assert_eq!(act.classification(), ActivityClassification::Setup);
        assert_eq!(act.process_requirement(), ProcessRequirement::NotRequired);
        assert_eq!(
            act.required_capabilities(),
            Capability::Assembly(AssemblyCapabilities::unreserved())
        );
    }

    #[test]
    fn test_reservation_requirements() {
        match reservation(true).required_capabilities() {
            Capability::Assembly(caps) => {
                assert_eq!(caps.equipped_material.as_deref(), Some("PCB"));
                assert_eq!(caps.reservations, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        match reservation(false).required_capabilities() {
            Capability::Assembly(caps) => {
                assert_eq!(caps.reservations, Some(vec!["ORD-7".to_string()]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_soldering_repair_needs_manual() {
        let act = Activity::new(
            ActivityId(1),
            ActivityParameters::Soldering(SolderingParameters {
                repair_soldering: true,
                ..Default::default()
            }),
        );
        assert_eq!(
            act.required_capabilities(),
            Capability::Soldering(SolderingCapabilities::manual())
        );
    }

    #[test]
    fn test_result_written_once() {
        let act = Activity::new(ActivityId(1), ActivityParameters::Packing);
        let first = act.complete(0);
        assert!(first.is_success());
        let second = act.fail();
        assert_eq!(second, first);
        assert_eq!(act.result(), Some(&first));
    }

    #[test]
    fn test_unknown_number_fails() {
        let act = Activity::new(ActivityId(1), ActivityParameters::Packing);
        let result = act.complete(99);
        assert!(!result.is_success());
        assert_eq!(result.code, ResultCode::Packing(PackingResult::Scrap));
    }

    #[test]
    fn test_failure_per_kind() {
        assert_eq!(
            ActivityKind::MaterialChange.failure_result().code,
            ResultCode::MaterialChange(MaterialChangeResult::Failed)
        );
        assert_eq!(
            ActivityKind::ProcessFixup.failure_result().code,
            ResultCode::Default(DefaultActivityResult::Failed)
        );
    }
}
