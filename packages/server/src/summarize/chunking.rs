//! Chunk planning for oversized inputs.
//!
//! Pure text partitioning, no I/O. The planner fixes the chunk list once
//! per job; everything downstream treats chunk texts as immutable.

use crate::summarize::error::{Result, SummarizeError};

/// Break markers in preference order. Paragraph breaks beat line-end
/// sentence breaks, which beat intra-line sentence breaks.
const BREAK_MARKERS: [&str; 5] = ["\n\n", ".\n", ". ", "! ", "? "];

/// Split text into ordered, non-overlapping chunks of at most
/// `max_chunk_chars` characters.
///
/// Invariants:
/// - Input at or under the budget produces exactly one chunk.
/// - Concatenating the chunks reproduces the input byte-for-byte.
/// - A chunk ends at a break marker whenever one lands past the midpoint
///   of the current window; the hard budget cut is the last resort.
///
/// Empty or whitespace-only input is an error: there is nothing to plan
/// and no job should exist for it.
pub fn plan_chunks(text: &str, max_chunk_chars: usize) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Err(SummarizeError::EmptyContent);
    }

    let max_chunk_chars = max_chunk_chars.max(1);

    // Fast path: byte length bounds character length.
    if text.len() <= max_chunk_chars {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let (window_end, midpoint) = window_bounds(remaining, max_chunk_chars);

        let mut cut = window_end;
        if window_end < remaining.len() {
            for marker in BREAK_MARKERS {
                if let Some(pos) = remaining[..window_end].rfind(marker) {
                    // A marker in the first half leaves the chunk too
                    // lopsided; fall through to the next marker.
                    if pos > midpoint {
                        cut = pos + marker.len();
                        break;
                    }
                }
            }
        }

        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }

    Ok(chunks)
}

/// Byte offsets of the window end (after `max_chars` characters) and the
/// window midpoint. Both land on character boundaries, so a hard cut never
/// splits a code point.
fn window_bounds(s: &str, max_chars: usize) -> (usize, usize) {
    let half_chars = max_chars / 2;
    let mut midpoint = None;
    let mut end = s.len();

    for (count, (byte_idx, _)) in s.char_indices().enumerate() {
        if count == half_chars {
            midpoint = Some(byte_idx);
        }
        if count == max_chars {
            end = byte_idx;
            break;
        }
    }

    (end, midpoint.unwrap_or(end))
}
