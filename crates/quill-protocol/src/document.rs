//! Document record and the update wire contract.

use crate::ids::{DocumentId, Revision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document: human-owned canonical content plus, while an AI session is
/// open, the evolving AI draft.
///
/// Invariant: `ai_version` is absent exactly when no session is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_version: Option<String>,
    pub revision: Revision,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn has_open_session(&self) -> bool {
        self.ai_version.is_some()
    }
}

/// Tri-state wire field: absent (keep), explicit null (clear), or a value.
///
/// `Keep` is never serialized — the field is omitted entirely via
/// `skip_serializing_if`. An explicit null deserializes to `Clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Keep is filtered out by skip_serializing_if; serializing it
            // anyway degrades to null rather than inventing a marker value.
            Self::Keep | Self::Clear => serializer.serialize_none(),
            Self::Set(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Self::Clear,
            Some(value) => Self::Set(value),
        })
    }
}

/// Body of the document update endpoint.
///
/// `ai_version` omitted = nothing to change; explicit null = close the open
/// session. Any write touching the draft carries the base revision captured
/// at the last hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub content: String,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub ai_version: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_version_base_rev: Option<Revision>,
}

impl DocumentUpdate {
    /// True when this update touches the AI draft (set or clear).
    pub fn touches_draft(&self) -> bool {
        !self.ai_version.is_keep()
    }
}
