//! Tool-call wire surface consumed by the external LLM collaborator.

use crate::command::EditCommand;
use crate::error::{EngineError, ErrorCode};
use crate::ids::TurnId;
use serde::{Deserialize, Serialize};

/// One tool invocation: a command addressed by a human-readable,
/// slash-delimited document path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub path: String,
    #[serde(flatten)]
    pub command: EditCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnId>,
}

/// Tool invocation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success {
        output: serde_json::Value,
    },
    Failure {
        error: String,
        error_code: ErrorCode,
    },
}

impl ToolResponse {
    pub fn success(output: serde_json::Value) -> Self {
        Self::Success { output }
    }

    pub fn failure(err: &EngineError) -> Self {
        Self::Failure {
            error: err.to_string(),
            error_code: err.code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
