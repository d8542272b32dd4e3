//! # quill-engine
//!
//! Facade wiring the reconciliation engine together: the tool-call dispatch
//! consumed by the external LLM collaborator, the server-side CAS document
//! update, session resolution, audit reads, and the client-side draft save
//! path ([`DraftSync`]).
//!
//! Path resolution and authorization stay behind their ports; the builder
//! installs permissive defaults so a single-tenant deployment works out of
//! the box.

mod draft;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quill_protocol::{
    AuthorizationGate, CommandOutcome, Document, DocumentId, DocumentResolver, DocumentStore,
    DocumentUpdate, EditCommand, EditRecord, EditSession, EngineError, EngineResult, Patch,
    SessionId, SessionStatus, SessionStore, ToolRequest, ToolResponse, TurnContext, TurnId,
};
use quill_session::{EditOutcome, FileSessionStore, SessionManager};
use serde_json::json;
use tracing::{debug, instrument, warn};

pub use draft::DraftSync;
pub use store::FileDocumentStore;

/// Default resolver: the slash-delimited path is used as the document id
/// verbatim. Deployments with a real document tree install their own
/// [`DocumentResolver`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PathIsIdResolver;

#[async_trait]
impl DocumentResolver for PathIsIdResolver {
    async fn resolve(&self, path: &str) -> EngineResult<DocumentId> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(EngineError::DocumentNotFound(DocumentId::from_string(path)));
        }
        Ok(DocumentId::from_string(trimmed))
    }
}

/// Default authorization gate: every edit is allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGate;

#[async_trait]
impl AuthorizationGate for AllowAllGate {
    async fn allow_edit(&self, _document_id: &DocumentId) -> EngineResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct EngineBuilder {
    root: PathBuf,
    resolver: Arc<dyn DocumentResolver>,
    authorization: Arc<dyn AuthorizationGate>,
    turns: Option<Arc<dyn TurnContext>>,
}

impl EngineBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolver: Arc::new(PathIsIdResolver),
            authorization: Arc::new(AllowAllGate),
            turns: None,
        }
    }

    pub fn resolver(mut self, resolver: Arc<dyn DocumentResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn authorization(mut self, gate: Arc<dyn AuthorizationGate>) -> Self {
        self.authorization = gate;
        self
    }

    pub fn turn_context(mut self, turns: Arc<dyn TurnContext>) -> Self {
        self.turns = Some(turns);
        self
    }

    pub fn build(self) -> Engine {
        let documents = Arc::new(FileDocumentStore::new(&self.root));
        let sessions = Arc::new(SessionManager::new(Arc::new(FileSessionStore::new(
            &self.root,
        ))));

        Engine {
            documents,
            sessions,
            resolver: self.resolver,
            authorization: self.authorization,
            turns: self.turns,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    documents: Arc<FileDocumentStore>,
    sessions: Arc<SessionManager>,
    resolver: Arc<dyn DocumentResolver>,
    authorization: Arc<dyn AuthorizationGate>,
    turns: Option<Arc<dyn TurnContext>>,
}

impl Engine {
    /// Tool-call entry point: resolve the path, then execute. Never fails
    /// out of band — every error becomes a tagged failure response with its
    /// wire code.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn dispatch(&self, request: ToolRequest) -> ToolResponse {
        let outcome = match self.resolver.resolve(&request.path).await {
            Ok(document_id) => {
                self.execute(document_id, &request.path, &request.command, request.turn)
                    .await
            }
            Err(error) => Err(error),
        };
        match outcome {
            Ok(output) => ToolResponse::success(output),
            Err(error) => {
                warn!(code = %error.code(), %error, "tool call failed");
                ToolResponse::failure(&error)
            }
        }
    }

    /// Tool-call variant addressed by document id, bypassing the resolver.
    pub async fn dispatch_for(
        &self,
        document_id: DocumentId,
        command: EditCommand,
        turn: Option<TurnId>,
    ) -> ToolResponse {
        let path = document_id.to_string();
        match self.execute(document_id, &path, &command, turn).await {
            Ok(output) => ToolResponse::success(output),
            Err(error) => {
                warn!(code = %error.code(), %error, "tool call failed");
                ToolResponse::failure(&error)
            }
        }
    }

    async fn execute(
        &self,
        document_id: DocumentId,
        path: &str,
        command: &EditCommand,
        turn: Option<TurnId>,
    ) -> EngineResult<serde_json::Value> {
        self.authorization.allow_edit(&document_id).await?;
        let document = self.documents.get(&document_id).await?;

        // A view never opens a session: with one active it reads the draft,
        // otherwise it reads canonical content.
        if let EditCommand::View { range } = command {
            let buffer = match self.sessions.store().active_for(&document_id).await? {
                Some(session) => session.ai_version,
                None => document.content,
            };
            return match quill_interpreter::apply(&buffer, &EditCommand::View { range: *range })? {
                CommandOutcome::View { text, line_count } => {
                    Ok(json!({ "text": text, "line_count": line_count }))
                }
                CommandOutcome::Mutated { .. } => {
                    Err(EngineError::InvalidCommand("view is read-only".into()))
                }
            };
        }

        let turn = match turn {
            Some(turn) => Some(turn),
            None => match &self.turns {
                Some(port) => port.current_turn().await,
                None => None,
            },
        };

        let session = self
            .sessions
            .get_or_create(document_id.clone(), &document.content, turn)
            .await?;
        match self.sessions.add_edit(&session.id, path, command).await? {
            EditOutcome::View { text, line_count } => {
                Ok(json!({ "text": text, "line_count": line_count }))
            }
            EditOutcome::Applied { order, ai_version } => {
                // Mirror the advanced draft onto the document record so
                // client hydrations see it and stale saves conflict.
                self.documents
                    .put_ai_version(&document_id, Some(&ai_version))
                    .await?;
                debug!(session_id = %session.id, order, "draft advanced");
                Ok(json!({
                    "session_id": session.id,
                    "document_id": document_id,
                    "order": order,
                }))
            }
        }
    }

    pub async fn document(&self, id: &DocumentId) -> EngineResult<Document> {
        self.documents.get(id).await
    }

    /// Create a document record. Bootstrap surface; tree CRUD proper lives
    /// with an external collaborator.
    pub async fn seed_document(
        &self,
        id: DocumentId,
        content: impl Into<String>,
    ) -> EngineResult<Document> {
        self.documents.seed(id, content).await
    }

    /// Server-side CAS update. A write clearing the draft also resolves the
    /// open session: rejected when the final content still equals the
    /// session's base snapshot, accepted otherwise.
    #[instrument(skip(self, update), fields(document_id = %id))]
    pub async fn apply_update(
        &self,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> EngineResult<Document> {
        let closing = matches!(update.ai_version, Patch::Clear);
        let document = self.documents.apply_update(id, update).await?;

        if closing && let Some(session) = self.sessions.store().active_for(id).await? {
            let status = if document.content == session.base_snapshot {
                SessionStatus::Rejected
            } else {
                SessionStatus::Accepted
            };
            self.sessions.resolve(&session.id, status).await?;
            debug!(session_id = %session.id, status = ?status, "session closed by draft clear");
        }
        Ok(document)
    }

    pub async fn session(&self, id: &SessionId) -> EngineResult<EditSession> {
        self.sessions.store().get(id).await
    }

    pub async fn session_for(
        &self,
        document_id: &DocumentId,
    ) -> EngineResult<Option<EditSession>> {
        self.sessions.store().active_for(document_id).await
    }

    /// Explicit resolution. Clears the document's draft mirror so reopening
    /// never shows a stale open session.
    pub async fn resolve_session(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> EngineResult<EditSession> {
        let session = self.sessions.resolve(session_id, status).await?;
        self.documents
            .put_ai_version(&session.document_id, None)
            .await?;
        Ok(session)
    }

    /// Audit read of a session's edit ledger, ordered by `order`.
    pub async fn edit_history(&self, session_id: &SessionId) -> EngineResult<Vec<EditRecord>> {
        self.sessions.store().edits(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_protocol::Revision;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn replace(old: &str, new: &str) -> EditCommand {
        EditCommand::StrReplace {
            old: old.into(),
            new: new.into(),
        }
    }

    fn request(path: &str, command: EditCommand) -> ToolRequest {
        ToolRequest {
            path: path.into(),
            command,
            turn: None,
        }
    }

    fn success_output(response: ToolResponse) -> serde_json::Value {
        match response {
            ToolResponse::Success { output } => output,
            ToolResponse::Failure { error, .. } => panic!("tool call failed: {error}"),
        }
    }

    #[tokio::test]
    async fn dispatch_opens_a_session_and_mirrors_the_draft() {
        let root = unique_test_root("quill-engine-dispatch");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("notes/story");
        engine
            .seed_document(doc.clone(), "the quick brown fox")
            .await
            .unwrap();

        let first = success_output(
            engine
                .dispatch(request("notes/story", replace("quick", "sly")))
                .await,
        );
        assert_eq!(first["order"], 1);

        let second = success_output(
            engine
                .dispatch(request(
                    "notes/story",
                    EditCommand::Append { text: "done".into() },
                ))
                .await,
        );
        assert_eq!(second["order"], 2);
        assert_eq!(first["session_id"], second["session_id"]);

        let document = engine.document(&doc).await.unwrap();
        assert_eq!(
            document.ai_version.as_deref(),
            Some("the sly brown fox\ndone")
        );
        assert_eq!(document.content, "the quick brown fox");

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn failed_commands_report_their_wire_code_and_persist_nothing() {
        let root = unique_test_root("quill-engine-failure");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("notes/story");
        engine
            .seed_document(doc.clone(), "tick tock tick")
            .await
            .unwrap();

        let response = engine
            .dispatch(request("notes/story", replace("tick", "tap")))
            .await;
        let ToolResponse::Failure { error_code, .. } = response else {
            panic!("expected an ambiguous-match failure");
        };
        assert_eq!(error_code.to_string(), "AMBIGUOUS_MATCH");

        // get_or_create ran, but the failed edit left the draft at its base.
        let session = engine.session_for(&doc).await.unwrap().unwrap();
        assert_eq!(session.ai_version, "tick tock tick");
        assert!(engine.edit_history(&session.id).await.unwrap().is_empty());

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn missing_documents_report_doc_not_found() {
        let root = unique_test_root("quill-engine-missing");
        let engine = EngineBuilder::new(&root).build();

        let response = engine
            .dispatch(request("no/such/doc", replace("a", "b")))
            .await;
        let ToolResponse::Failure { error_code, .. } = response else {
            panic!("expected a failure");
        };
        assert_eq!(error_code.to_string(), "DOC_NOT_FOUND");

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn view_reads_without_opening_a_session() {
        let root = unique_test_root("quill-engine-view");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("notes/story");
        engine
            .seed_document(doc.clone(), "line one\nline two")
            .await
            .unwrap();

        let output = success_output(
            engine
                .dispatch(request("notes/story", EditCommand::View { range: None }))
                .await,
        );
        assert_eq!(output["text"], "line one\nline two");
        assert_eq!(output["line_count"], 2);
        assert!(engine.session_for(&doc).await.unwrap().is_none());

        // With a session open, view reads the draft instead.
        engine
            .dispatch(request("notes/story", replace("one", "1")))
            .await;
        let output = success_output(
            engine
                .dispatch(request("notes/story", EditCommand::View { range: None }))
                .await,
        );
        assert_eq!(output["text"], "line 1\nline two");

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn stale_revision_updates_are_rejected() {
        let root = unique_test_root("quill-engine-stale");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("d1");
        engine.seed_document(doc.clone(), "content").await.unwrap();
        engine.dispatch(request("d1", replace("content", "draft"))).await;

        let err = engine
            .apply_update(
                &doc,
                DocumentUpdate {
                    content: "content".into(),
                    ai_version: Patch::Set("edited draft".into()),
                    ai_version_base_rev: Some(Revision::from_string("stale")),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StaleRevision { .. }));

        // Re-hydrating yields the token the retry needs.
        let fresh = engine.document(&doc).await.unwrap();
        engine
            .apply_update(
                &doc,
                DocumentUpdate {
                    content: "content".into(),
                    ai_version: Patch::Set("edited draft".into()),
                    ai_version_base_rev: Some(fresh.revision),
                },
            )
            .await
            .unwrap();

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn clearing_the_draft_resolves_the_open_session() {
        let root = unique_test_root("quill-engine-clear");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("d1");
        engine.seed_document(doc.clone(), "base words").await.unwrap();
        engine.dispatch(request("d1", replace("base", "better"))).await;

        let session = engine.session_for(&doc).await.unwrap().unwrap();
        let hydrated = engine.document(&doc).await.unwrap();

        // The reviewer kept the AI text; clearing closes as accepted.
        let document = engine
            .apply_update(
                &doc,
                DocumentUpdate {
                    content: "better words".into(),
                    ai_version: Patch::Clear,
                    ai_version_base_rev: Some(hydrated.revision),
                },
            )
            .await
            .unwrap();
        assert!(document.ai_version.is_none());

        let resolved = engine.session(&session.id).await.unwrap();
        assert_eq!(resolved.status, SessionStatus::Accepted);
        assert!(resolved.resolved_at.is_some());
        assert!(engine.session_for(&doc).await.unwrap().is_none());

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn clearing_back_to_the_base_snapshot_counts_as_rejected() {
        let root = unique_test_root("quill-engine-clear-reject");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("d1");
        engine.seed_document(doc.clone(), "base words").await.unwrap();
        engine.dispatch(request("d1", replace("base", "better"))).await;

        let session = engine.session_for(&doc).await.unwrap().unwrap();
        let hydrated = engine.document(&doc).await.unwrap();
        engine
            .apply_update(
                &doc,
                DocumentUpdate {
                    content: "base words".into(),
                    ai_version: Patch::Clear,
                    ai_version_base_rev: Some(hydrated.revision),
                },
            )
            .await
            .unwrap();

        let resolved = engine.session(&session.id).await.unwrap();
        assert_eq!(resolved.status, SessionStatus::Rejected);

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn explicit_resolution_clears_the_draft_mirror() {
        let root = unique_test_root("quill-engine-resolve");
        let engine = EngineBuilder::new(&root).build();
        let doc = DocumentId::from_string("d1");
        engine.seed_document(doc.clone(), "words").await.unwrap();
        engine.dispatch(request("d1", replace("words", "better words"))).await;

        let session = engine.session_for(&doc).await.unwrap().unwrap();
        let resolved = engine
            .resolve_session(&session.id, SessionStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(resolved.status, SessionStatus::Rejected);

        let document = engine.document(&doc).await.unwrap();
        assert!(document.ai_version.is_none());
        assert_eq!(document.content, "words");

        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
