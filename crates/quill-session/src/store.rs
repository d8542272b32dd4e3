//! File-backed session and edit-ledger store.
//!
//! Layout under the store root:
//!
//! ```text
//! sessions/<session_id>/session.json   session manifest (draft included)
//! sessions/<session_id>/edits.jsonl    append-only edit ledger
//! active/<document_id>                 pointer to the document's active session
//! ```
//!
//! Ledger appends are serialized per session and reject any order other than
//! last + 1. The ledger line lands before the manifest rewrite; a crash
//! between the two heals on next load by replaying the ledger suffix through
//! the interpreter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quill_protocol::{
    CommandOutcome, DocumentId, EditRecord, EditSession, EditStatus, EngineError, EngineResult,
    SessionId, SessionStatus, SessionStore,
};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, instrument, warn};

/// Manifest on disk: the session plus the highest ledger order its draft
/// reflects.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionManifest {
    #[serde(flatten)]
    session: EditSession,
    last_order: u64,
}

#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
    order_cache: Mutex<HashMap<SessionId, u64>>,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
            order_cache: Mutex::new(HashMap::new()),
        }
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join("sessions").join(session_id.as_str())
    }

    fn manifest_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("session.json")
    }

    fn ledger_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("edits.jsonl")
    }

    fn active_path(&self, document_id: &DocumentId) -> PathBuf {
        self.root.join("active").join(document_id.as_str())
    }

    fn lock_for(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.write_locks.lock();
        guard
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create dir {parent:?}"))?;
        }
        Ok(())
    }

    async fn write_manifest(&self, manifest: &SessionManifest) -> Result<()> {
        let path = self.manifest_path(&manifest.session.id);
        Self::ensure_parent(&path).await?;
        let payload =
            serde_json::to_string_pretty(manifest).context("failed serializing manifest")?;
        fs::write(&path, payload)
            .await
            .with_context(|| format!("failed writing manifest {path:?}"))?;
        Ok(())
    }

    async fn read_manifest(&self, session_id: &SessionId) -> EngineResult<SessionManifest> {
        let path = self.manifest_path(session_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EngineError::SessionNotFound(session_id.clone()));
        }
        let raw = fs::read_to_string(&path)
            .await
            .map_err(EngineError::storage)?;
        serde_json::from_str(&raw).map_err(EngineError::storage)
    }

    async fn read_ledger(&self, session_id: &SessionId) -> EngineResult<Vec<EditRecord>> {
        let path = self.ledger_path(session_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .await
            .map_err(EngineError::storage)?;
        let mut reader = BufReader::new(file).lines();
        let mut records = Vec::new();
        while let Some(line) = reader.next_line().await.map_err(EngineError::storage)? {
            if line.trim().is_empty() {
                continue;
            }
            let record: EditRecord = serde_json::from_str(&line).map_err(EngineError::storage)?;
            records.push(record);
        }
        records.sort_by_key(|record| record.order);
        Ok(records)
    }

    /// Load the manifest, replaying any ledger records past its
    /// `last_order` through the interpreter.
    async fn load_healed(&self, session_id: &SessionId) -> EngineResult<SessionManifest> {
        let mut manifest = self.read_manifest(session_id).await?;
        let records = self.read_ledger(session_id).await?;

        let mut healed = false;
        for record in records.iter().filter(|r| r.order > manifest.last_order) {
            match quill_interpreter::apply(&manifest.session.ai_version, &record.to_command()) {
                Ok(CommandOutcome::Mutated { buffer }) => {
                    manifest.session.ai_version = buffer;
                    manifest.last_order = record.order;
                    healed = true;
                }
                Ok(CommandOutcome::View { .. }) | Err(_) => {
                    warn!(
                        session_id = %session_id,
                        order = record.order,
                        "ledger replay stopped at an unappliable record"
                    );
                    break;
                }
            }
        }

        if healed {
            debug!(session_id = %session_id, last_order = manifest.last_order, "manifest healed from ledger");
            self.write_manifest(&manifest)
                .await
                .map_err(EngineError::storage)?;
        }
        Ok(manifest)
    }

    async fn last_order(&self, session_id: &SessionId) -> EngineResult<u64> {
        if let Some(last) = self.order_cache.lock().get(session_id).copied() {
            return Ok(last);
        }
        let last = self
            .read_ledger(session_id)
            .await?
            .last()
            .map(|record| record.order)
            .unwrap_or(0);
        self.order_cache.lock().insert(session_id.clone(), last);
        Ok(last)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    #[instrument(skip(self, session), fields(session_id = %session.id, document_id = %session.document_id))]
    async fn insert(&self, session: &EditSession) -> EngineResult<()> {
        let active_path = self.active_path(&session.document_id);
        if fs::try_exists(&active_path).await.unwrap_or(false) {
            let pointer = fs::read_to_string(&active_path)
                .await
                .map_err(EngineError::storage)?;
            let current = SessionId::from_string(pointer.trim());
            match self.read_manifest(&current).await {
                Ok(manifest) if manifest.session.is_active() => {
                    return Err(EngineError::Storage(format!(
                        "document {} already has an active session",
                        session.document_id
                    )));
                }
                // Stale pointer from an interrupted resolution; fall
                // through and overwrite it.
                _ => {}
            }
        }

        let manifest = SessionManifest {
            session: session.clone(),
            last_order: 0,
        };
        self.write_manifest(&manifest)
            .await
            .map_err(EngineError::storage)?;

        Self::ensure_parent(&active_path)
            .await
            .map_err(EngineError::storage)?;
        fs::write(&active_path, session.id.as_str())
            .await
            .map_err(EngineError::storage)?;
        self.order_cache.lock().insert(session.id.clone(), 0);
        debug!("session persisted and marked active");
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> EngineResult<EditSession> {
        Ok(self.load_healed(id).await?.session)
    }

    async fn active_for(&self, document_id: &DocumentId) -> EngineResult<Option<EditSession>> {
        let active_path = self.active_path(document_id);
        if !fs::try_exists(&active_path).await.unwrap_or(false) {
            return Ok(None);
        }
        let session_id = fs::read_to_string(&active_path)
            .await
            .map_err(EngineError::storage)?;
        let session_id = SessionId::from_string(session_id.trim());

        let session = self.load_healed(&session_id).await?.session;
        if !session.is_active() {
            // Stale pointer; the resolution write was interrupted.
            warn!(document_id = %document_id, session_id = %session_id, "clearing stale active pointer");
            let _ = fs::remove_file(&active_path).await;
            return Ok(None);
        }
        Ok(Some(session))
    }

    #[instrument(
        skip(self, record, ai_version),
        fields(session_id = %session_id, order = record.order)
    )]
    async fn append_edit(
        &self,
        session_id: &SessionId,
        record: &EditRecord,
        ai_version: &str,
    ) -> EngineResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut manifest = self.load_healed(session_id).await?;
        let last = self.last_order(session_id).await?;
        let expected = last.saturating_add(1);
        if record.order != expected {
            warn!(expected, got = record.order, "edit order conflict");
            return Err(EngineError::OrderConflict {
                expected,
                got: record.order,
            });
        }

        let ledger_path = self.ledger_path(session_id);
        Self::ensure_parent(&ledger_path)
            .await
            .map_err(EngineError::storage)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ledger_path)
            .await
            .map_err(EngineError::storage)?;
        let line = serde_json::to_string(record).map_err(EngineError::storage)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(EngineError::storage)?;
        file.write_all(b"\n").await.map_err(EngineError::storage)?;
        file.flush().await.map_err(EngineError::storage)?;

        manifest.session.ai_version = ai_version.to_string();
        manifest.last_order = record.order;
        self.write_manifest(&manifest)
            .await
            .map_err(EngineError::storage)?;
        self.order_cache
            .lock()
            .insert(session_id.clone(), record.order);
        debug!("edit appended");
        Ok(())
    }

    async fn put_draft(&self, session_id: &SessionId, ai_version: &str) -> EngineResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut manifest = self.load_healed(session_id).await?;
        manifest.session.ai_version = ai_version.to_string();
        self.write_manifest(&manifest)
            .await
            .map_err(EngineError::storage)
    }

    #[instrument(skip(self), fields(session_id = %session_id, status = ?status))]
    async fn resolve(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        resolved_at: DateTime<Utc>,
    ) -> EngineResult<EditSession> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut manifest = self.load_healed(session_id).await?;
        if !manifest.session.is_active() {
            return Err(EngineError::SessionNotFound(session_id.clone()));
        }

        manifest.session.status = status;
        manifest.session.resolved_at = Some(resolved_at);
        self.write_manifest(&manifest)
            .await
            .map_err(EngineError::storage)?;

        let active_path = self.active_path(&manifest.session.document_id);
        if let Ok(pointer) = fs::read_to_string(&active_path).await {
            if pointer.trim() == session_id.as_str() {
                let _ = fs::remove_file(&active_path).await;
            }
        }

        // Audit-only status stamp; the records themselves are retained
        // verbatim.
        if status == SessionStatus::Rejected {
            let records = self.read_ledger(session_id).await?;
            if !records.is_empty() {
                let mut lines = String::new();
                for mut record in records {
                    record.status = EditStatus::Superseded;
                    lines.push_str(&serde_json::to_string(&record).map_err(EngineError::storage)?);
                    lines.push('\n');
                }
                fs::write(self.ledger_path(session_id), lines)
                    .await
                    .map_err(EngineError::storage)?;
            }
        }

        debug!("session resolved");
        Ok(manifest.session)
    }

    async fn edits(&self, session_id: &SessionId) -> EngineResult<Vec<EditRecord>> {
        // Distinguish "no session" from "no edits yet".
        self.read_manifest(session_id).await?;
        self.read_ledger(session_id).await
    }
}
