//! Domain models shared by matching, selection and the cells.
//!
//! # Domain Mappings
//!
//! | cell-dispatch | Shop floor |
//! |---------------|------------|
//! | Activity | Operation on a workpiece or setup step |
//! | Process | Workpiece travelling through the line |
//! | Cell | Station, manual workplace or simulated machine |
//! | ActivityResult | Driver/worker feedback mapped to a typed outcome |

mod activity;
mod ids;
mod result;
mod trace;

pub use activity::{
    Activity, ActivityClassification, ActivityKind, ActivityParameters, AssemblyParameters,
    MaterialChangeParameters, MaterialReservationParameters, ProcessRequirement,
    SolderingParameters, TestParameters,
};
pub use ids::{ActivityId, CellId, ProcessId};
pub use result::{
    ActivityResult, AssemblyResult, DefaultActivityResult, MaterialChangeResult, PackingResult,
    ResultCode, SolderingResult, TestResult,
};
pub use trace::{
    decode_faulty_contacts, encode_faulty_contacts, energy_consumption, ActivityTrace,
    TraceDetail,
};
