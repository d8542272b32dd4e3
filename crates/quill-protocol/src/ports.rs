//! Boundary ports between the engine and its external collaborators.
//!
//! These traits are the only allowed runtime boundary: document persistence,
//! session persistence, path resolution, authorization, and conversation
//! linkage all arrive through them. Traits use `async-trait` for async
//! dyn-dispatch.

use crate::document::{Document, DocumentUpdate};
use crate::error::EngineResult;
use crate::ids::{DocumentId, SessionId, TurnId};
use crate::session::{EditRecord, EditSession, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Server-side document persistence with revision CAS enforcement.
///
/// Tree CRUD lives with an external collaborator; the engine only reads
/// documents and applies CAS-checked updates.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &DocumentId) -> EngineResult<Document>;

    /// Apply an update. Writes touching the AI draft must carry a base
    /// revision matching the stored one; mismatch is a stale-revision
    /// conflict, never a silent overwrite.
    async fn apply_update(&self, id: &DocumentId, update: DocumentUpdate)
    -> EngineResult<Document>;
}

/// Session and edit-ledger persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a newly opened session and mark it active for its document.
    /// Fails if the document already has an active session.
    async fn insert(&self, session: &EditSession) -> EngineResult<()>;

    async fn get(&self, id: &SessionId) -> EngineResult<EditSession>;

    async fn active_for(&self, document_id: &DocumentId) -> EngineResult<Option<EditSession>>;

    /// Atomically append a ledger record at its gapless order and persist
    /// the advanced draft. The store rejects any order other than
    /// last + 1.
    async fn append_edit(
        &self,
        session_id: &SessionId,
        record: &EditRecord,
        ai_version: &str,
    ) -> EngineResult<()>;

    /// Persist an advanced draft without a ledger record (`create`).
    async fn put_draft(&self, session_id: &SessionId, ai_version: &str) -> EngineResult<()>;

    /// Transition an active session to a terminal status and clear the
    /// document's active pointer. The draft and ledger contents are kept.
    async fn resolve(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        resolved_at: DateTime<Utc>,
    ) -> EngineResult<EditSession>;

    /// Audit read of the ledger, ordered by `order`.
    async fn edits(&self, session_id: &SessionId) -> EngineResult<Vec<EditRecord>>;
}

/// Path resolution (external collaborator, interface only).
#[async_trait]
pub trait DocumentResolver: Send + Sync {
    /// Resolve a human-readable slash-delimited path to a document id.
    async fn resolve(&self, path: &str) -> EngineResult<DocumentId>;
}

/// Authorization gate (external collaborator, interface only).
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    async fn allow_edit(&self, document_id: &DocumentId) -> EngineResult<()>;
}

/// Conversation transport supplying session linkage (interface only).
#[async_trait]
pub trait TurnContext: Send + Sync {
    async fn current_turn(&self) -> Option<TurnId>;
}
