//! Sentinel-marked merge buffer encode/decode.
//!
//! A merged buffer interleaves unchanged text with change regions wrapped in
//! four sentinel markers drawn from the Unicode noncharacter range — never
//! valid document content, so the structure is unambiguous. Canonical
//! content and AI draft are always stored sentinel-free; the merged form is
//! a client-side editing representation only.

use crate::segment::{Segment, cleaned_segments};

/// Start of a deleted span.
pub const DEL_START: char = '\u{FDD0}';
/// End of a deleted span.
pub const DEL_END: char = '\u{FDD1}';
/// Start of an inserted span.
pub const INS_START: char = '\u{FDD2}';
/// End of an inserted span.
pub const INS_END: char = '\u{FDD3}';

fn is_sentinel(c: char) -> bool {
    matches!(c, DEL_START | DEL_END | INS_START | INS_END)
}

/// True when the text carries any sentinel marker.
pub fn contains_sentinels(text: &str) -> bool {
    text.chars().any(is_sentinel)
}

/// Both halves recovered from a merged buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMerge {
    pub content: String,
    pub ai_version: String,
    pub has_changes: bool,
}

/// Encode two divergent texts into one sentinel-marked buffer.
///
/// Equal inputs return the content verbatim — the canonical no-open-session
/// form carries no markers. Each change region is emitted as
/// `DS deleted DE IS inserted IE` with both payloads possibly empty.
pub fn build_merged(content: &str, ai_version: &str) -> String {
    if content == ai_version {
        return strip_sentinels(content);
    }

    let content = strip_sentinels(content);
    let ai_version = strip_sentinels(ai_version);
    let segments = cleaned_segments(&content, &ai_version);

    let mut merged = String::with_capacity(content.len() + ai_version.len());
    for segment in &segments {
        match segment {
            Segment::Equal(text) => merged.push_str(text),
            Segment::Edit { deleted, inserted } => {
                merged.push(DEL_START);
                merged.push_str(deleted);
                merged.push(DEL_END);
                merged.push(INS_START);
                merged.push_str(inserted);
                merged.push(INS_END);
            }
        }
    }
    merged
}

/// Decode a merged buffer back into its two halves.
///
/// Content keeps deleted payloads and drops inserted spans; the AI draft
/// keeps inserted payloads and drops deleted spans; all sentinels are
/// stripped. A buffer without sentinels is returned unchanged on both
/// sides. Malformed sentinel sequences degrade to plain-text treatment —
/// every sentinel stripped, no changes reported — never an error.
pub fn parse_merged(merged: &str) -> ParsedMerge {
    if !contains_sentinels(merged) {
        return ParsedMerge {
            content: merged.to_string(),
            ai_version: merged.to_string(),
            has_changes: false,
        };
    }

    match parse_strict(merged) {
        Some(parsed) => parsed,
        None => {
            let plain = strip_sentinels(merged);
            ParsedMerge {
                content: plain.clone(),
                ai_version: plain,
                has_changes: false,
            }
        }
    }
}

/// Fully-resolved text with every change applied (the AI draft).
pub fn accept_all(merged: &str) -> String {
    parse_merged(merged).ai_version
}

/// Fully-resolved text with every change discarded (canonical content).
pub fn reject_all(merged: &str) -> String {
    parse_merged(merged).content
}

#[derive(Clone, Copy, PartialEq)]
enum ScanState {
    Outside,
    InDel,
    InIns,
}

fn parse_strict(merged: &str) -> Option<ParsedMerge> {
    let mut content = String::with_capacity(merged.len());
    let mut ai_version = String::with_capacity(merged.len());
    let mut state = ScanState::Outside;

    for c in merged.chars() {
        state = match (state, c) {
            (ScanState::Outside, DEL_START) => ScanState::InDel,
            (ScanState::Outside, INS_START) => ScanState::InIns,
            (ScanState::InDel, DEL_END) => ScanState::Outside,
            (ScanState::InIns, INS_END) => ScanState::Outside,
            (_, c) if is_sentinel(c) => return None,
            (ScanState::Outside, c) => {
                content.push(c);
                ai_version.push(c);
                ScanState::Outside
            }
            (ScanState::InDel, c) => {
                content.push(c);
                ScanState::InDel
            }
            (ScanState::InIns, c) => {
                ai_version.push(c);
                ScanState::InIns
            }
        };
    }

    if state != ScanState::Outside {
        return None;
    }

    let has_changes = content != ai_version;
    Some(ParsedMerge {
        content,
        ai_version,
        has_changes,
    })
}

fn strip_sentinels(text: &str) -> String {
    if !contains_sentinels(text) {
        return text.to_string();
    }
    text.chars().filter(|c| !is_sentinel(*c)).collect()
}
