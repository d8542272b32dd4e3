//! # quill-protocol — Quill engine contract
//!
//! Shared types and trait interfaces for the Quill reconciliation engine:
//! the document/session/ledger data model, the closed edit-command union,
//! the wire error taxonomy, and the boundary ports.
//!
//! Intentionally dependency-light (no runtime deps like tokio or axum) so it
//! can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (DocumentId, SessionId, EditId, TurnId) and
//!   the CAS [`Revision`] token
//! - [`document`] — Document record, [`Patch`] tri-state field, update body
//! - [`session`] — EditSession state machine data, EditRecord ledger entry
//! - [`command`] — Closed [`EditCommand`] union and outcomes
//! - [`tool`] — ToolRequest/ToolResponse wire surface
//! - [`ports`] — Boundary ports (stores, resolver, authorization, turns)
//! - [`error`] — EngineError, ErrorCode, EngineResult

pub mod command;
pub mod document;
pub mod error;
pub mod ids;
pub mod ports;
pub mod session;
pub mod tool;

pub use command::{CommandKind, CommandOutcome, EditCommand, LineRange};
pub use document::{Document, DocumentUpdate, Patch};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use ids::{DocumentId, EditId, Revision, SessionId, TurnId};
pub use ports::{AuthorizationGate, DocumentResolver, DocumentStore, SessionStore, TurnContext};
pub use session::{EditRecord, EditSession, EditStatus, SessionStatus};
pub use tool::{ToolRequest, ToolResponse};
