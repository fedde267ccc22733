//! Driver channel contract.
//!
//! Commands go out fire-and-forget through [`MessageDriver::send`]; the
//! driver's notifications come back as [`DriverMessage`]s in the cell's
//! mailbox.

use serde::{Deserialize, Serialize};

use crate::models::{ActivityId, ProcessId};

/// Command sent to the hardware (or its simulation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverCommand {
    /// Assemble for an activity.
    Assemble {
        /// Activity being run.
        activity_id: ActivityId,
    },
    /// Solder one activity, or the whole workspace batch when `None`.
    Solder {
        /// Activity being run.
        activity_id: Option<ActivityId>,
    },
    /// Run an electrical test.
    Test {
        /// Activity being run.
        activity_id: ActivityId,
    },
    /// Pack the product.
    Pack {
        /// Activity being run.
        activity_id: ActivityId,
    },
    /// Let the workpiece leave the cell.
    ReleaseWorkpiece {
        /// Workpiece released, if known.
        process_id: Option<ProcessId>,
    },
}

impl DriverCommand {
    /// Whether the command starts work on the machine.
    pub fn is_work(&self) -> bool {
        !matches!(self, DriverCommand::ReleaseWorkpiece { .. })
    }
}

/// Notification from the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverMessage {
    /// A workpiece reached the cell.
    WorkpieceArrived {
        /// Correlation id of the workpiece.
        process_id: ProcessId,
    },
    /// The machine finished the running activity.
    ActivityCompleted {
        /// Activity reported, when the driver knows it.
        activity_id: Option<ActivityId>,
        /// Raw numeric result.
        result: i64,
    },
}

/// Outbound driver channel.
pub trait MessageDriver: Send + Sync {
    /// Sends a command. Never blocks on the machine.
    fn send(&self, command: DriverCommand);
}
