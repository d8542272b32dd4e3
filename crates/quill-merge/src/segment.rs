//! Diff segmentation and cleanup passes.
//!
//! The raw char-level diff is folded into an alternating list of unchanged
//! and edited spans, then cleaned twice: short equalities between edits are
//! coalesced into one larger edit, and edit boundaries that split a word are
//! shifted onto word boundaries. Both passes preserve the reconstruction
//! invariant: equalities plus deleted payloads spell the old text, equalities
//! plus inserted payloads spell the new text.

use similar::{ChangeTag, TextDiff};

/// Fold an equality lying between two edits when shorter than this.
const COALESCE_MAX_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Equal(String),
    Edit { deleted: String, inserted: String },
}

/// Diff `old` against `new` and apply both cleanup passes.
pub(crate) fn cleaned_segments(old: &str, new: &str) -> Vec<Segment> {
    let raw = diff_segments(old, new);
    let coalesced = coalesce(raw);
    let aligned = align_boundaries(coalesced);
    normalize(aligned)
}

fn diff_segments(old: &str, new: &str) -> Vec<Segment> {
    let diff = TextDiff::from_chars(old, new);
    let mut segments: Vec<Segment> = Vec::new();

    for change in diff.iter_all_changes() {
        let value = change.value();
        match change.tag() {
            ChangeTag::Equal => match segments.last_mut() {
                Some(Segment::Equal(text)) => text.push_str(value),
                _ => segments.push(Segment::Equal(value.to_string())),
            },
            ChangeTag::Delete => match segments.last_mut() {
                Some(Segment::Edit { deleted, .. }) => deleted.push_str(value),
                _ => segments.push(Segment::Edit {
                    deleted: value.to_string(),
                    inserted: String::new(),
                }),
            },
            ChangeTag::Insert => match segments.last_mut() {
                Some(Segment::Edit { inserted, .. }) => inserted.push_str(value),
                _ => segments.push(Segment::Edit {
                    deleted: String::new(),
                    inserted: value.to_string(),
                }),
            },
        }
    }

    segments
}

/// Pass (a): coalesce adjacent micro-edits.
///
/// An equality between two edits that is shorter than [`COALESCE_MAX_CHARS`]
/// joins both payloads, merging its neighbors into one semantic edit.
fn coalesce(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();

    for segment in segments {
        match segment {
            Segment::Equal(text) => out.push(Segment::Equal(text)),
            Segment::Edit { deleted, inserted } => {
                let foldable = matches!(
                    out.last(),
                    Some(Segment::Equal(eq)) if eq.chars().count() < COALESCE_MAX_CHARS
                        || eq.chars().all(char::is_whitespace)
                ) && matches!(out.iter().rev().nth(1), Some(Segment::Edit { .. }));

                if foldable {
                    let Some(Segment::Equal(eq)) = out.pop() else {
                        unreachable!("last segment checked above");
                    };
                    let Some(Segment::Edit {
                        deleted: mut prev_deleted,
                        inserted: mut prev_inserted,
                    }) = out.pop()
                    else {
                        unreachable!("second-to-last segment checked above");
                    };
                    prev_deleted.push_str(&eq);
                    prev_deleted.push_str(&deleted);
                    prev_inserted.push_str(&eq);
                    prev_inserted.push_str(&inserted);
                    out.push(Segment::Edit {
                        deleted: prev_deleted,
                        inserted: prev_inserted,
                    });
                } else {
                    out.push(Segment::Edit { deleted, inserted });
                }
            }
        }
    }

    out
}

/// Pass (b): shift edit boundaries onto word boundaries.
///
/// When a boundary splits a word, the word characters of the adjacent
/// equality move into both payloads until the boundary lands on
/// whitespace/punctuation. Equalities emptied by shifting are dropped by
/// [`normalize`], merging their neighboring edits.
fn align_boundaries(mut segments: Vec<Segment>) -> Vec<Segment> {
    for i in 0..segments.len() {
        if !matches!(segments[i], Segment::Edit { .. }) {
            continue;
        }

        // Left boundary: pull the word-char suffix of the preceding equality.
        if i > 0 {
            let shift = match (&segments[i - 1], &segments[i]) {
                (Segment::Equal(eq), Segment::Edit { deleted, inserted }) => {
                    if starts_mid_word(eq, deleted, inserted) {
                        word_suffix(eq)
                    } else {
                        String::new()
                    }
                }
                _ => String::new(),
            };
            if !shift.is_empty() {
                if let Segment::Equal(eq) = &mut segments[i - 1] {
                    eq.truncate(eq.len() - shift.len());
                }
                if let Segment::Edit { deleted, inserted } = &mut segments[i] {
                    deleted.insert_str(0, &shift);
                    inserted.insert_str(0, &shift);
                }
            }
        }

        // Right boundary: pull the word-char prefix of the following equality.
        if i + 1 < segments.len() {
            let shift = match (&segments[i], &segments[i + 1]) {
                (Segment::Edit { deleted, inserted }, Segment::Equal(eq)) => {
                    if ends_mid_word(deleted, inserted, eq) {
                        word_prefix(eq)
                    } else {
                        String::new()
                    }
                }
                _ => String::new(),
            };
            if !shift.is_empty() {
                if let Segment::Equal(eq) = &mut segments[i + 1] {
                    eq.drain(..shift.len());
                }
                if let Segment::Edit { deleted, inserted } = &mut segments[i] {
                    deleted.push_str(&shift);
                    inserted.push_str(&shift);
                }
            }
        }
    }

    segments
}

/// Fuse adjacent same-kind segments and drop empty ones.
fn normalize(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();

    for segment in segments {
        match segment {
            Segment::Equal(text) if text.is_empty() => {}
            Segment::Edit { deleted, inserted } if deleted.is_empty() && inserted.is_empty() => {}
            Segment::Equal(text) => match out.last_mut() {
                Some(Segment::Equal(prev)) => prev.push_str(&text),
                _ => out.push(Segment::Equal(text)),
            },
            Segment::Edit { deleted, inserted } => match out.last_mut() {
                Some(Segment::Edit {
                    deleted: prev_deleted,
                    inserted: prev_inserted,
                }) => {
                    prev_deleted.push_str(&deleted);
                    prev_inserted.push_str(&inserted);
                }
                _ => out.push(Segment::Edit { deleted, inserted }),
            },
        }
    }

    out
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric()
}

fn starts_mid_word(eq: &str, deleted: &str, inserted: &str) -> bool {
    let eq_ends_word = eq.chars().next_back().is_some_and(is_word);
    let payload_starts_word = deleted.chars().next().is_some_and(is_word)
        || inserted.chars().next().is_some_and(is_word);
    eq_ends_word && payload_starts_word
}

fn ends_mid_word(deleted: &str, inserted: &str, eq: &str) -> bool {
    let payload_ends_word = deleted.chars().next_back().is_some_and(is_word)
        || inserted.chars().next_back().is_some_and(is_word);
    let eq_starts_word = eq.chars().next().is_some_and(is_word);
    payload_ends_word && eq_starts_word
}

/// Maximal word-character suffix of `text`.
fn word_suffix(text: &str) -> String {
    let boundary = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[boundary..].to_string()
}

/// Maximal word-character prefix of `text`.
fn word_prefix(text: &str) -> String {
    let end = text
        .char_indices()
        .find(|(_, c)| !is_word(*c))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end].to_string()
}

/// Reconstruct both sides from a segment list; test support.
#[cfg(test)]
pub(crate) fn reconstruct(segments: &[Segment]) -> (String, String) {
    let mut old = String::new();
    let mut new = String::new();
    for segment in segments {
        match segment {
            Segment::Equal(text) => {
                old.push_str(text);
                new.push_str(text);
            }
            Segment::Edit { deleted, inserted } => {
                old.push_str(deleted);
                new.push_str(inserted);
            }
        }
    }
    (old, new)
}
