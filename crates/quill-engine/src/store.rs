//! File-backed document store with revision CAS enforcement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use quill_protocol::{
    Document, DocumentId, DocumentStore, DocumentUpdate, EngineError, EngineResult, Patch,
    Revision,
};
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Flat `documents/<id>.json` records. Both halves are always stored
/// sentinel-free; writes touching the AI draft are CAS-checked against the
/// stored revision.
#[derive(Debug)]
pub struct FileDocumentStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    fn document_path(&self, id: &DocumentId) -> PathBuf {
        self.root.join("documents").join(format!("{id}.json"))
    }

    fn lock_for(&self, id: &DocumentId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.write_locks.lock();
        guard
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create documents dir {parent:?}"))?;
        }
        Ok(())
    }

    async fn read(&self, id: &DocumentId) -> EngineResult<Document> {
        let path = self.document_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EngineError::DocumentNotFound(id.clone()));
        }
        let raw = fs::read_to_string(&path)
            .await
            .map_err(EngineError::storage)?;
        serde_json::from_str(&raw).map_err(EngineError::storage)
    }

    async fn write(&self, document: &Document) -> EngineResult<()> {
        let path = self.document_path(&document.id);
        Self::ensure_parent(&path)
            .await
            .map_err(EngineError::storage)?;
        let payload = serde_json::to_string_pretty(document).map_err(EngineError::storage)?;
        fs::write(&path, payload).await.map_err(EngineError::storage)
    }

    /// Create a document record. Bootstrap and test helper; tree CRUD
    /// proper lives with an external collaborator.
    pub async fn seed(&self, id: DocumentId, content: impl Into<String>) -> EngineResult<Document> {
        let document = Document {
            id,
            content: content.into(),
            ai_version: None,
            revision: Revision::fresh(),
            updated_at: Utc::now(),
        };
        self.write(&document).await?;
        Ok(document)
    }

    /// Server-side draft mirror for tool edits: sets (or clears) the draft
    /// and bumps the revision so stale client hydrations conflict on save.
    pub(crate) async fn put_ai_version(
        &self,
        id: &DocumentId,
        ai_version: Option<&str>,
    ) -> EngineResult<Document> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut document = self.read(id).await?;
        document.ai_version = ai_version.map(str::to_string);
        document.revision = Revision::fresh();
        document.updated_at = Utc::now();
        self.write(&document).await?;
        debug!(document_id = %id, has_draft = ai_version.is_some(), "draft mirror updated");
        Ok(document)
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, id: &DocumentId) -> EngineResult<Document> {
        self.read(id).await
    }

    #[instrument(skip(self, update), fields(document_id = %id, touches_draft = update.touches_draft()))]
    async fn apply_update(
        &self,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> EngineResult<Document> {
        if quill_merge::contains_sentinels(&update.content) {
            return Err(EngineError::InvalidCommand(
                "content must not carry merge sentinels".into(),
            ));
        }
        if let Patch::Set(draft) = &update.ai_version {
            if quill_merge::contains_sentinels(draft) {
                return Err(EngineError::InvalidCommand(
                    "ai_version must not carry merge sentinels".into(),
                ));
            }
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut document = self.read(id).await?;

        if update.touches_draft() {
            match &update.ai_version_base_rev {
                None => {
                    return Err(EngineError::InvalidCommand(
                        "writes touching the AI draft must carry ai_version_base_rev".into(),
                    ));
                }
                Some(base) if *base != document.revision => {
                    warn!(
                        document_id = %id,
                        expected = %document.revision,
                        got = %base,
                        "stale revision rejected"
                    );
                    return Err(EngineError::StaleRevision {
                        expected: document.revision.clone(),
                        got: base.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        document.content = update.content;
        match update.ai_version {
            Patch::Keep => {}
            Patch::Clear => document.ai_version = None,
            Patch::Set(draft) => document.ai_version = Some(draft),
        }
        document.revision = Revision::fresh();
        document.updated_at = Utc::now();
        self.write(&document).await?;
        debug!(revision = %document.revision, "document updated");
        Ok(document)
    }
}
