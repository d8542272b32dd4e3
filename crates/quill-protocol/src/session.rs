//! AI edit-session and edit-ledger record types.

use crate::command::{CommandKind, EditCommand};
use crate::ids::{DocumentId, EditId, SessionId, TurnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an AI edit session. Terminal states are retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Accepted,
    Rejected,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// One AI edit session over a document.
///
/// `base_snapshot` is the canonical content at session start and never
/// changes; `ai_version` starts equal to it and is advanced by each
/// successfully interpreted command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSession {
    pub id: SessionId,
    pub document_id: DocumentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnId>,
    pub base_snapshot: String,
    pub ai_version: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EditSession {
    /// Open a new session with the draft initialized to the base snapshot.
    pub fn open(document_id: DocumentId, base_snapshot: String, turn: Option<TurnId>) -> Self {
        Self {
            id: SessionId::new_uuid(),
            document_id,
            turn,
            ai_version: base_snapshot.clone(),
            base_snapshot,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Audit-only status of a ledger record. `Superseded` is stamped on every
/// record of a session resolved as rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Applied,
    Superseded,
}

/// One ledger entry: a successfully interpreted, recorded command.
///
/// `order` is unique, gapless, and strictly increasing per session. Records
/// are never deleted and never mutated except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRecord {
    pub id: EditId,
    pub session_id: SessionId,
    pub order: u64,
    pub command: CommandKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_line: Option<usize>,
    pub status: EditStatus,
    pub created_at: DateTime<Utc>,
}

impl EditRecord {
    /// Build the ledger record for a command, or `None` for command kinds
    /// that are not recorded (`view`, `create`).
    pub fn from_command(
        session_id: SessionId,
        order: u64,
        path: impl Into<String>,
        command: &EditCommand,
    ) -> Option<Self> {
        let kind = command.kind()?;
        let (old_str, new_str, insert_line) = match command {
            EditCommand::StrReplace { old, new } => {
                (Some(old.clone()), Some(new.clone()), None)
            }
            EditCommand::Insert { insert_line, text } => {
                (None, Some(text.clone()), Some(*insert_line))
            }
            EditCommand::Append { text } => (None, Some(text.clone()), None),
            EditCommand::View { .. } | EditCommand::Create { .. } => return None,
        };

        Some(Self {
            id: EditId::new_uuid(),
            session_id,
            order,
            command: kind,
            path: path.into(),
            old_str,
            new_str,
            insert_line,
            status: EditStatus::Applied,
            created_at: Utc::now(),
        })
    }

    /// Reconstruct the command this record captured, for ledger replay.
    pub fn to_command(&self) -> EditCommand {
        match self.command {
            CommandKind::StrReplace => EditCommand::StrReplace {
                old: self.old_str.clone().unwrap_or_default(),
                new: self.new_str.clone().unwrap_or_default(),
            },
            CommandKind::Insert => EditCommand::Insert {
                insert_line: self.insert_line.unwrap_or_default(),
                text: self.new_str.clone().unwrap_or_default(),
            },
            CommandKind::Append => EditCommand::Append {
                text: self.new_str.clone().unwrap_or_default(),
            },
        }
    }
}
