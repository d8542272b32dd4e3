//! # quill-resolve
//!
//! Accept/reject operations over a live merged buffer. Every operation
//! re-extracts hunks from the current buffer — offsets computed before a
//! prior mutation are invalid once any accept/reject shifted positions, so
//! nothing is ever cached across edits.
//!
//! Each single-hunk resolution rewrites the hunk's full span (all four
//! sentinels plus both payloads) in one buffer splice, so a host editing
//! surface's native undo records it as one step.

use quill_merge::{Hunk, accept_all, build_merged, extract_hunks, reject_all};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The id did not match any hunk in the current buffer. The caller's
    /// hunk list is stale; re-read and retry.
    #[error("unknown hunk: {0}")]
    UnknownHunk(String),
}

/// Owns the merged buffer for one review pass.
#[derive(Debug, Clone)]
pub struct ResolutionEngine {
    buffer: String,
}

impl ResolutionEngine {
    /// Build the merged view from both halves.
    pub fn from_parts(content: &str, ai_version: &str) -> Self {
        Self {
            buffer: build_merged(content, ai_version),
        }
    }

    /// Adopt an existing merged buffer (e.g. one the user has edited).
    pub fn from_merged(buffer: impl Into<String>) -> Self {
        Self {
            buffer: buffer.into(),
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn into_buffer(self) -> String {
        self.buffer
    }

    /// Fresh scan of the current buffer, in position order.
    pub fn hunks(&self) -> Vec<Hunk> {
        extract_hunks(&self.buffer)
    }

    /// True once no hunks remain. The caller must then clear the AI-draft
    /// tracking through the sync layer so reopening the document does not
    /// show a stale open session.
    pub fn is_settled(&self) -> bool {
        self.hunks().is_empty()
    }

    /// Keep the inserted text of one hunk.
    pub fn accept(&mut self, id: &str) -> Result<usize, ResolveError> {
        self.resolve_one(id, true)
    }

    /// Keep the deleted text of one hunk.
    pub fn reject(&mut self, id: &str) -> Result<usize, ResolveError> {
        self.resolve_one(id, false)
    }

    /// Resolve every hunk toward the AI draft in one buffer replacement.
    pub fn accept_all(&mut self) -> &str {
        self.buffer = accept_all(&self.buffer);
        &self.buffer
    }

    /// Resolve every hunk toward canonical content in one buffer
    /// replacement.
    pub fn reject_all(&mut self) -> &str {
        self.buffer = reject_all(&self.buffer);
        &self.buffer
    }

    /// First unresolved hunk by position.
    pub fn first(&self) -> Option<Hunk> {
        self.hunks().into_iter().next()
    }

    /// The next hunk after the one with `id`, wrapping to the first.
    pub fn next_after(&self, id: &str) -> Option<Hunk> {
        let hunks = self.hunks();
        let index = hunks.iter().position(|hunk| hunk.id == id)?;
        let next = (index + 1) % hunks.len();
        hunks.into_iter().nth(next)
    }

    /// The hunk before the one with `id`, wrapping to the last.
    pub fn prev_before(&self, id: &str) -> Option<Hunk> {
        let hunks = self.hunks();
        let index = hunks.iter().position(|hunk| hunk.id == id)?;
        let prev = (index + hunks.len() - 1) % hunks.len();
        hunks.into_iter().nth(prev)
    }

    fn resolve_one(&mut self, id: &str, keep_inserted: bool) -> Result<usize, ResolveError> {
        let hunks = self.hunks();
        let hunk = hunks
            .iter()
            .find(|hunk| hunk.id == id)
            .ok_or_else(|| ResolveError::UnknownHunk(id.to_string()))?;

        let kept = if keep_inserted {
            hunk.inserted.as_str()
        } else {
            hunk.deleted.as_str()
        };
        self.buffer.replace_range(hunk.span(), kept);
        let remaining = hunks.len() - 1;
        debug!(id, keep_inserted, remaining, "hunk resolved");
        Ok(remaining)
    }
}
