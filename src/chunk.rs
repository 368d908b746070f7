//! Sliding-window text chunker.
//!
//! Splits each text unit into fixed-size character windows that overlap by
//! a configured amount. Boundaries do not try to respect sentence or
//! paragraph structure; that is a known simplification. The split is fully
//! deterministic for a given input and configuration.

use crate::models::{Chunk, TextUnit};

/// Split text units into overlapping windows of `chunk_size` characters.
///
/// Consecutive windows share `overlap` characters, so each window starts
/// `chunk_size - overlap` characters after the previous one. Panics when
/// `overlap >= chunk_size`; config validation rejects that earlier.
pub fn split_into_chunks(
    units: &[TextUnit],
    scope: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    // Config validation rejects this too, but a zero step means the window
    // loop below never advances, so callers that bypass load_config must
    // not get past here.
    assert!(
        overlap < chunk_size,
        "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
    );
    let step = chunk_size - overlap;

    let mut chunks = Vec::new();
    for unit in units {
        if unit.text.is_empty() {
            continue;
        }

        // Byte offset of every char boundary, plus the end of the string,
        // so windows can slice without splitting a code point.
        let mut bounds: Vec<usize> = unit.text.char_indices().map(|(i, _)| i).collect();
        bounds.push(unit.text.len());
        let n_chars = bounds.len() - 1;

        let mut start = 0usize;
        let mut index: i64 = 0;
        loop {
            let end = (start + chunk_size).min(n_chars);
            let window = &unit.text[bounds[start]..bounds[end]];
            chunks.push(Chunk::new(
                scope,
                &unit.source_file,
                index,
                start as i64,
                window,
            ));
            index += 1;

            if end == n_chars {
                break;
            }
            start += step;
        }
    }

    chunks
}
