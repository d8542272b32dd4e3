//! Client-side draft save path.
//!
//! The editing surface holds a merged buffer; saving parses it back into
//! its two sentinel-free halves and hands the update to the sync
//! coordinator with the CAS token captured at the last hydration. Once the
//! buffer is fully resolved the update clears the AI draft explicitly —
//! reopening the document never shows a stale open session.

use std::sync::Arc;

use quill_merge::parse_merged;
use quill_protocol::{DocumentId, DocumentUpdate, Patch, Revision};
use quill_sync::{AbortSignal, SaveError, SaveOutcome, SyncCoordinator};
use tracing::{debug, instrument};

pub struct DraftSync {
    coordinator: Arc<SyncCoordinator<DocumentUpdate>>,
}

impl DraftSync {
    pub fn new(coordinator: Arc<SyncCoordinator<DocumentUpdate>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator<DocumentUpdate>> {
        &self.coordinator
    }

    /// Persist a merged buffer: both halves are recovered via the codec,
    /// and a settled buffer (no change regions left) closes the open
    /// session by sending an explicit null draft.
    #[instrument(skip(self, merged, abort), fields(document_id = %document_id))]
    pub async fn save_merged(
        &self,
        document_id: &DocumentId,
        merged: &str,
        base_revision: Revision,
        abort: &AbortSignal,
    ) -> Result<SaveOutcome, SaveError> {
        let parsed = parse_merged(merged);
        let ai_version = if parsed.has_changes {
            Patch::Set(parsed.ai_version)
        } else {
            Patch::Clear
        };
        debug!(
            has_changes = parsed.has_changes,
            "saving parsed merged buffer"
        );

        let update = DocumentUpdate {
            content: parsed.content,
            ai_version,
            ai_version_base_rev: Some(base_revision.clone()),
        };
        self.coordinator
            .save(document_id.as_str(), update, Some(base_revision), abort)
            .await
    }
}
