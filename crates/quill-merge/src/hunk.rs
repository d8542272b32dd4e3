//! Hunk extraction over a merged buffer.

use crate::codec::{DEL_END, DEL_START, INS_END, INS_START};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// One change region within a merged buffer: the byte offsets of its four
/// sentinel markers plus both payloads.
///
/// The id hashes the region's position and payloads, giving a stable
/// identity for UI anchoring across scans of an unmodified buffer. Hunks
/// are recomputed by a fresh scan after every mutation; offsets from an
/// earlier scan are invalid once the buffer changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub id: String,
    pub del_start: usize,
    pub del_end: usize,
    pub ins_start: usize,
    pub ins_end: usize,
    pub deleted: String,
    pub inserted: String,
}

impl Hunk {
    /// Byte range covering the whole region, sentinels included.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.del_start..self.ins_end + INS_END.len_utf8()
    }
}

/// Scan for del-span-immediately-followed-by-ins-span patterns.
///
/// Returns hunks in buffer order. Sentinel sequences that do not form the
/// full four-marker pattern yield no hunk.
pub fn extract_hunks(merged: &str) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut chars = merged.char_indices().peekable();

    while let Some((del_start, c)) = chars.next() {
        if c != DEL_START {
            continue;
        }

        let Some((del_end, deleted)) = scan_span(&mut chars, DEL_END) else {
            break;
        };
        if !matches!(chars.peek(), Some((_, INS_START))) {
            continue;
        }
        let Some((ins_start, _)) = chars.next() else {
            break;
        };
        let Some((ins_end, inserted)) = scan_span(&mut chars, INS_END) else {
            break;
        };

        let id = hunk_id(del_start, &deleted, &inserted);
        hunks.push(Hunk {
            id,
            del_start,
            del_end,
            ins_start,
            ins_end,
            deleted,
            inserted,
        });
    }

    hunks
}

/// Consume payload chars until `end` is found; returns its offset and the
/// payload. `None` when the buffer ends first.
fn scan_span(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    end: char,
) -> Option<(usize, String)> {
    let mut payload = String::new();
    for (offset, c) in chars.by_ref() {
        if c == end {
            return Some((offset, payload));
        }
        payload.push(c);
    }
    None
}

fn hunk_id(position: usize, deleted: &str, inserted: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(position.to_le_bytes());
    hasher.update(deleted.as_bytes());
    hasher.update([0u8]);
    hasher.update(inserted.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
