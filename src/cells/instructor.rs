//! Visual instruction service contract.
//!
//! Instructions are shown to a worker and answered asynchronously; answers
//! come back to the cell as [`InstructionResponse`]s through its mailbox.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::SessionId;

/// Result key to postpone a maintenance.
pub const POSTPONE: &str = "postpone";
/// Result key to confirm a maintenance.
pub const DONE: &str = "done";

/// Handle of a shown instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionId(pub u64);

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// An instruction to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRequest {
    /// Title, usually the cell name.
    pub title: String,
    /// Instruction texts.
    pub instructions: Vec<String>,
    /// Result keys the worker can choose from. Empty = numeric result.
    pub results: Vec<String>,
    /// Session the instruction belongs to.
    pub session_id: Option<SessionId>,
}

impl InstructionRequest {
    /// Creates a request with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            instructions: Vec::new(),
            results: Vec::new(),
            session_id: None,
        }
    }

    /// Adds an instruction text.
    pub fn with_instruction(mut self, text: impl Into<String>) -> Self {
        self.instructions.push(text.into());
        self
    }

    /// Adds several instruction texts.
    pub fn with_instructions<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions.extend(texts.into_iter().map(Into::into));
        self
    }

    /// Adds a selectable result key.
    pub fn with_result(mut self, key: impl Into<String>) -> Self {
        self.results.push(key.into());
        self
    }

    /// Binds the request to a session.
    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// A worker's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionResponse {
    /// Instruction answered.
    pub id: InstructionId,
    /// Numeric result.
    pub result: i64,
    /// Selected result key, for keyed instructions.
    pub key: Option<String>,
}

impl InstructionResponse {
    /// Numeric answer.
    pub fn numeric(id: InstructionId, result: i64) -> Self {
        Self {
            id,
            result,
            key: None,
        }
    }

    /// Keyed answer.
    pub fn keyed(id: InstructionId, key: impl Into<String>) -> Self {
        Self {
            id,
            result: 0,
            key: Some(key.into()),
        }
    }
}

/// Visual instruction service.
pub trait VisualInstructor: Send + Sync {
    /// Shows an instruction. Must not call back into the cell synchronously.
    fn execute(&self, request: InstructionRequest) -> InstructionId;

    /// Withdraws an instruction.
    fn clear(&self, id: InstructionId);
}
