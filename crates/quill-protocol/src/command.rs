//! The closed edit-command union and its outcomes.
//!
//! Commands arrive from an external LLM collaborator as tagged JSON. The
//! union is closed: adding a command kind is an exhaustive, compiler-checked
//! change everywhere commands are handled.

use serde::{Deserialize, Serialize};

/// 1-indexed inclusive line range for `view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

/// One pattern-based edit command against a draft buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditCommand {
    /// Read-only view of the buffer, optionally a line sub-range.
    View {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<LineRange>,
    },
    /// Replace exactly one occurrence of `old` with `new`.
    StrReplace { old: String, new: String },
    /// Insert `text` as a new line immediately after 0-indexed `insert_line`
    /// (0 = prepend).
    Insert { insert_line: usize, text: String },
    /// Concatenate `text` at the end of the buffer.
    Append { text: String },
    /// Initialize a buffer where no prior draft exists.
    Create { text: String },
}

impl EditCommand {
    /// Ledger kind for commands that are recorded; `view` and `create` are
    /// not part of the edit ledger.
    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            Self::StrReplace { .. } => Some(CommandKind::StrReplace),
            Self::Insert { .. } => Some(CommandKind::Insert),
            Self::Append { .. } => Some(CommandKind::Append),
            Self::View { .. } | Self::Create { .. } => None,
        }
    }

    /// True for commands that change the buffer on success.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::View { .. })
    }
}

/// Ledger-recorded command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    StrReplace,
    Insert,
    Append,
}

/// Result of interpreting one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Read-only result: the requested text and the buffer's total line count.
    View { text: String, line_count: usize },
    /// The buffer after a successful mutation.
    Mutated { buffer: String },
}
