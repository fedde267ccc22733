//! Activity result enumerations.
//!
//! Drivers and instructions report small integers. Each activity kind maps
//! them to its own enumeration; numbers the enumeration does not know map to
//! the kind's failure value, which every enumeration has.

use serde::{Deserialize, Serialize};

macro_rules! result_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:expr),+ $(,)? }
        success: $success:ident,
        failure: $failure:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant = $value,
            )+
        }

        impl $name {
            /// Maps a reported number to a result, if known.
            pub fn from_numeric(value: i64) -> Option<Self> {
                match value {
                    $(v if v == $value => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// The reported number of this result.
            pub fn numeric(self) -> i64 {
                self as i64
            }

            /// The canonical failure value.
            pub fn failure() -> Self {
                $name::$failure
            }

            /// Whether this result counts as success.
            pub fn is_success(self) -> bool {
                self == $name::$success
            }
        }
    };
}

result_enum! {
    /// Assembly outcome.
    AssemblyResult { Success = 0, Failed = 1 }
    success: Success,
    failure: Failed
}

result_enum! {
    /// Material change outcome.
    MaterialChangeResult { Success = 0, TechnicalError = 1, Failed = 2 }
    success: Success,
    failure: Failed
}

result_enum! {
    /// Outcome of activities without a dedicated enumeration.
    DefaultActivityResult { Success = 0, Failed = 1 }
    success: Success,
    failure: Failed
}

result_enum! {
    /// Packing outcome. Failed packing scraps the workpiece.
    PackingResult { Success = 0, Scrap = 1 }
    success: Success,
    failure: Scrap
}

result_enum! {
    /// Soldering outcome.
    SolderingResult { Completed = 0, Failed = 1 }
    success: Completed,
    failure: Failed
}

result_enum! {
    /// Electrical test outcome.
    TestResult { Success = 0, Failed = 1 }
    success: Success,
    failure: Failed
}

/// A typed result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// Assembly.
    Assembly(AssemblyResult),
    /// Material change.
    MaterialChange(MaterialChangeResult),
    /// Default enumeration.
    Default(DefaultActivityResult),
    /// Packing.
    Packing(PackingResult),
    /// Soldering.
    Soldering(SolderingResult),
    /// Test.
    Test(TestResult),
}

impl ResultCode {
    /// The reported number.
    pub fn numeric(self) -> i64 {
        match self {
            ResultCode::Assembly(r) => r.numeric(),
            ResultCode::MaterialChange(r) => r.numeric(),
            ResultCode::Default(r) => r.numeric(),
            ResultCode::Packing(r) => r.numeric(),
            ResultCode::Soldering(r) => r.numeric(),
            ResultCode::Test(r) => r.numeric(),
        }
    }

    /// Whether this is the success value of its enumeration.
    pub fn is_success(self) -> bool {
        match self {
            ResultCode::Assembly(r) => r.is_success(),
            ResultCode::MaterialChange(r) => r.is_success(),
            ResultCode::Default(r) => r.is_success(),
            ResultCode::Packing(r) => r.is_success(),
            ResultCode::Soldering(r) => r.is_success(),
            ResultCode::Test(r) => r.is_success(),
        }
    }
}

/// The final result of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityResult {
    /// Typed result.
    pub code: ResultCode,
    /// Set when the result was synthesized by an abort or an unknown number.
    pub failed: bool,
}

impl ActivityResult {
    /// Wraps a reported code.
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            failed: false,
        }
    }

    /// Wraps a synthesized failure.
    pub fn failure(code: ResultCode) -> Self {
        Self { code, failed: true }
    }

    /// The reported number.
    pub fn numeric(&self) -> i64 {
        self.code.numeric()
    }

    /// Whether the activity succeeded.
    pub fn is_success(&self) -> bool {
        !self.failed && self.code.is_success()
    }
}
