//! # quill-session
//!
//! Per-document AI edit-session state machine: *no-session → active →
//! {accepted, rejected}*, with terminal sessions retained for audit.
//!
//! The manager enforces the two single-writer disciplines the data model
//! requires: session creation is single-flight per document (two concurrent
//! first edits never race into two active sessions), and edits against one
//! session serialize (ledger orders stay gapless, the draft stays
//! consistent).

mod store;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use quill_protocol::{
    CommandOutcome, DocumentId, EditCommand, EditRecord, EditSession, EngineError, EngineResult,
    SessionId, SessionStatus, SessionStore, TurnId,
};
use tracing::{debug, instrument};

pub use store::FileSessionStore;

/// What an edit produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Read-only view; nothing persisted.
    View { text: String, line_count: usize },
    /// The draft advanced. `order` is the ledger order, or `None` for
    /// `create`, which initializes the draft without a ledger record.
    Applied {
        order: Option<u64>,
        ai_version: String,
    },
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    document_locks: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
    session_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            document_locks: Mutex::new(HashMap::new()),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn document_lock(&self, document_id: &DocumentId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.document_locks.lock();
        guard
            .entry(document_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.session_locks.lock();
        guard
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Return the document's active session, or open one with the draft
    /// initialized to `base_snapshot`. Idempotent: concurrent callers get
    /// the same session.
    #[instrument(skip(self, base_snapshot, turn), fields(document_id = %document_id))]
    pub async fn get_or_create(
        &self,
        document_id: DocumentId,
        base_snapshot: &str,
        turn: Option<TurnId>,
    ) -> EngineResult<EditSession> {
        let lock = self.document_lock(&document_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.active_for(&document_id).await? {
            debug!(session_id = %existing.id, "returning existing active session");
            return Ok(existing);
        }

        let session = EditSession::open(document_id, base_snapshot.to_string(), turn);
        self.store.insert(&session).await?;
        debug!(session_id = %session.id, "session opened");
        Ok(session)
    }

    /// Run one command against the session's draft. Success persists the
    /// advanced draft atomically with its ledger record; failure persists
    /// nothing. Concurrent calls against the same session serialize.
    #[instrument(skip(self, command), fields(session_id = %session_id, path))]
    pub async fn add_edit(
        &self,
        session_id: &SessionId,
        path: &str,
        command: &EditCommand,
    ) -> EngineResult<EditOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.store.get(session_id).await?;
        if !session.is_active() {
            return Err(EngineError::SessionNotFound(session_id.clone()));
        }

        if let EditCommand::Create { .. } = command {
            let has_edits = !self.store.edits(session_id).await?.is_empty();
            if has_edits || session.ai_version != session.base_snapshot {
                return Err(EngineError::InvalidCommand(
                    "a draft already exists for this target".into(),
                ));
            }
        }

        let outcome = quill_interpreter::apply(&session.ai_version, command)?;
        match outcome {
            CommandOutcome::View { text, line_count } => {
                Ok(EditOutcome::View { text, line_count })
            }
            CommandOutcome::Mutated { buffer } => {
                let next_order = self
                    .store
                    .edits(session_id)
                    .await?
                    .last()
                    .map(|record| record.order + 1)
                    .unwrap_or(1);

                match EditRecord::from_command(session_id.clone(), next_order, path, command) {
                    Some(record) => {
                        self.store
                            .append_edit(session_id, &record, &buffer)
                            .await?;
                        debug!(order = record.order, "edit applied and recorded");
                        Ok(EditOutcome::Applied {
                            order: Some(record.order),
                            ai_version: buffer,
                        })
                    }
                    None => {
                        self.store.put_draft(session_id, &buffer).await?;
                        debug!("draft initialized");
                        Ok(EditOutcome::Applied {
                            order: None,
                            ai_version: buffer,
                        })
                    }
                }
            }
        }
    }

    /// Transition an active session to a terminal status. Never mutates the
    /// draft or the ledger contents; the session is retained for audit.
    #[instrument(skip(self), fields(session_id = %session_id, status = ?status))]
    pub async fn resolve(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> EngineResult<EditSession> {
        if !status.is_terminal() {
            return Err(EngineError::InvalidCommand(
                "resolve requires accepted or rejected".into(),
            ));
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        self.store.resolve(session_id, status, Utc::now()).await
    }
}
