//! # quill-merge
//!
//! Pure, synchronous merge codec for divergent document drafts.
//!
//! [`build_merged`] encodes canonical content and an AI draft into one
//! sentinel-marked buffer; [`parse_merged`] recovers both halves;
//! [`extract_hunks`] lists the change regions for accept/reject resolution.
//! Sentinels are an in-memory editing representation only and are never
//! persisted.

mod codec;
mod hunk;
mod segment;

pub use codec::{
    DEL_END, DEL_START, INS_END, INS_START, ParsedMerge, accept_all, build_merged,
    contains_sentinels, parse_merged, reject_all,
};
pub use hunk::{Hunk, extract_hunks};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_example_end_to_end() {
        let content = "She felt sad. The rain fell.";
        let ai_version = "A heavy melancholia. The rain continued.";

        let merged = build_merged(content, ai_version);
        assert_eq!(extract_hunks(&merged).len(), 2);
        assert_eq!(accept_all(&merged), ai_version);
        assert_eq!(reject_all(&merged), content);

        let parsed = parse_merged(&merged);
        assert!(parsed.has_changes);
        assert_eq!(parsed.content, content);
        assert_eq!(parsed.ai_version, ai_version);
    }

    #[test]
    fn resolution_invariants_hold_for_edge_inputs() {
        let cases = [
            ("", ""),
            ("", "only ai"),
            ("only human", ""),
            ("same", "same"),
            ("tab\tseparated", "tab separated"),
            ("trailing newline\n", "trailing newline"),
        ];
        for (content, ai_version) in cases {
            let merged = build_merged(content, ai_version);
            assert_eq!(accept_all(&merged), ai_version, "{content:?}");
            assert_eq!(reject_all(&merged), content, "{content:?}");
        }
    }
}
