//! Overlapping sliding-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters
//! where consecutive chunks share `overlap_chars` characters, so that a
//! statement straddling a window edge is fully contained in at least one
//! chunk. Cuts prefer sentence or whitespace boundaries within a tolerance
//! window below `max_chars`; if none is found there, a hard character cut
//! is made (snapped to a UTF-8 char boundary).
//!
//! Chunks are exact substrings of the input: concatenating consecutive
//! chunks minus the overlapping region reconstructs the source text.
//! The function is deterministic in its boundaries and content hashes,
//! which is what idempotent re-ingestion detection relies on.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Split `text` into overlapping chunks according to `cfg`.
///
/// Requires `cfg.max_chars > 0` and `cfg.overlap_chars < cfg.max_chars`
/// (enforced at config load). Returns an empty vector for empty input.
pub fn chunk_text(document_id: &str, text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if text.is_empty() || cfg.max_chars == 0 {
        return chunks;
    }

    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let mut hard_end = snap_to_char_boundary(text, (start + cfg.max_chars).min(text.len()));
        if hard_end <= start {
            // max_chars is narrower than the next character's UTF-8 width;
            // take the whole character rather than stalling on it.
            hard_end = next_char_boundary(text, start + 1);
        }
        let end = if hard_end < text.len() {
            find_cut_point(text, start, hard_end, cfg.boundary_window)
        } else {
            hard_end
        };

        chunks.push(make_chunk(document_id, index, &text[start..end]));
        index += 1;

        if end >= text.len() {
            break;
        }

        // Step back by the overlap, but always make forward progress. The
        // snap goes forward: snapping back could land on `start` again when
        // the byte after it sits inside a multibyte character. `end` is a
        // boundary at or past `start + 1`, so this never overshoots it.
        let next = end.saturating_sub(cfg.overlap_chars).max(start + 1);
        start = next_char_boundary(text, next);
    }

    chunks
}

/// Pick the cut point for a chunk ending near `hard_end`.
///
/// Searches the last `window` bytes before `hard_end` for a sentence end,
/// then a newline, then any whitespace. Falls back to the hard cut when the
/// window contains no boundary at all.
fn find_cut_point(text: &str, start: usize, hard_end: usize, window: usize) -> usize {
    let window_start = snap_to_char_boundary(text, hard_end.saturating_sub(window).max(start + 1));
    let slice = &text[window_start..hard_end];

    for pat in [". ", "! ", "? "] {
        if let Some(pos) = slice.rfind(pat) {
            // Cut after the punctuation, keeping the trailing space on the left.
            return window_start + pos + pat.len();
        }
    }
    if let Some(pos) = slice.rfind('\n') {
        return window_start + pos + 1;
    }
    if let Some(pos) = slice.rfind(' ') {
        return window_start + pos + 1;
    }

    hard_end
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the next valid UTF-8 char boundary.
fn next_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
