//! Deterministic text chunking with sentence-aware boundaries.
//!
//! Text is first cut at paragraph breaks and sentence endings, then merged
//! greedily into chunks up to the token budget with an overlap tail carried
//! between consecutive chunks. A span with no usable boundary inside the
//! budget falls back to fixed-size windows. Identical input and config
//! always produce byte-identical chunks, which makes re-ingestion
//! idempotent and tests reproducible.

use std::ops::Range;

use retrievio_core::{Chunk, ChunkId, DocId};

/// Chunker configuration, in approximate tokens (chars/4).
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum chunk size (default: 256 tokens).
    pub max_tokens: usize,
    /// Overlap carried between consecutive chunks (default: 32 tokens).
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            overlap_tokens: 32,
        }
    }
}

/// Splits normalized text into overlapping chunks with stable offsets.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk `text` into ordered, overlapping spans.
    ///
    /// Empty or whitespace-only text yields an empty sequence; text smaller
    /// than one window yields a single chunk with the full content.
    #[must_use]
    pub fn chunk(&self, doc_id: &DocId, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let max_bytes = self.config.max_tokens.saturating_mul(4).max(1);
        let overlap_bytes = self.config.overlap_tokens.saturating_mul(4);

        let segments = split_segments(text);
        let mut out = Vec::new();
        let mut seq = 0usize;

        let mut batch: Vec<Range<usize>> = Vec::new();
        let mut batch_len = 0usize;

        for segment in segments {
            if segment.len() > max_bytes {
                // No boundary inside the budget: flush what we have and
                // emit fixed-size windows for the oversized span.
                flush(text, doc_id, &batch, &mut out, &mut seq);
                batch.clear();
                batch_len = 0;

                for window in window_ranges(text, &segment, max_bytes, overlap_bytes) {
                    emit(text, doc_id, window, &mut out, &mut seq);
                }
                continue;
            }

            if batch_len + segment.len() > max_bytes && !batch.is_empty() {
                flush(text, doc_id, &batch, &mut out, &mut seq);

                // Seed the next chunk with the tail of the previous one.
                let mut kept: Vec<Range<usize>> = Vec::new();
                let mut kept_len = 0usize;
                for prev in batch.iter().rev() {
                    if kept_len + prev.len() > overlap_bytes {
                        break;
                    }
                    kept_len += prev.len();
                    kept.push(prev.clone());
                }
                kept.reverse();
                batch = kept;
                batch_len = kept_len;
            }

            batch_len += segment.len();
            batch.push(segment);
        }

        flush(text, doc_id, &batch, &mut out, &mut seq);
        out
    }
}

fn flush(
    text: &str,
    doc_id: &DocId,
    batch: &[Range<usize>],
    out: &mut Vec<Chunk>,
    seq: &mut usize,
) {
    if let (Some(first), Some(last)) = (batch.first(), batch.last()) {
        emit(text, doc_id, first.start..last.end, out, seq);
    }
}

fn emit(text: &str, doc_id: &DocId, range: Range<usize>, out: &mut Vec<Chunk>, seq: &mut usize) {
    let slice = &text[range.clone()];
    if slice.trim().is_empty() {
        return;
    }
    out.push(Chunk {
        chunk_id: ChunkId::derive(doc_id, *seq, slice),
        doc_id: doc_id.clone(),
        sequence_index: *seq,
        text: slice.to_string(),
        byte_range: range,
    });
    *seq += 1;
}

/// Split into contiguous byte ranges at paragraph breaks and sentence
/// endings. Ranges cover the whole text in order.
fn split_segments(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (_, c) = chars[i];
        let next = chars.get(i + 1);

        // Paragraph break: split after the blank line.
        if c == '\n' && next.is_some_and(|&(_, n)| n == '\n') {
            let end = chars
                .get(i + 2)
                .map_or(text.len(), |&(byte_index, _)| byte_index);
            segments.push(start..end);
            start = end;
            i += 2;
            continue;
        }

        // Sentence ending followed by a space: split after the punctuation.
        if matches!(c, '.' | '?' | '!') && next.is_some_and(|&(_, n)| n == ' ') {
            let end = next.map_or(text.len(), |&(byte_index, _)| byte_index);
            if end > start {
                segments.push(start..end);
                start = end;
            }
        }

        i += 1;
    }

    if start < text.len() {
        segments.push(start..text.len());
    }

    segments
}

/// Fixed-size windows over an oversized span, cut at char boundaries with
/// the configured overlap between consecutive windows.
fn window_ranges(
    text: &str,
    range: &Range<usize>,
    size_bytes: usize,
    overlap_bytes: usize,
) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let offsets: Vec<usize> = slice.char_indices().map(|(i, _)| i).collect();
    let step = size_bytes.saturating_sub(overlap_bytes).max(1);

    let mut out = Vec::new();
    let mut window_start = 0usize;

    while window_start < slice.len() {
        let target_end = window_start.saturating_add(size_bytes);
        let window_end = if target_end >= slice.len() {
            slice.len()
        } else {
            // Snap down to a char boundary.
            offsets
                .iter()
                .rev()
                .find(|&&o| o <= target_end)
                .copied()
                .unwrap_or(slice.len())
        };

        if window_end <= window_start {
            break;
        }
        out.push(range.start + window_start..range.start + window_end);
        if window_end == slice.len() {
            break;
        }

        let next_start = window_start.saturating_add(step);
        // Snap up to a char boundary.
        window_start = offsets
            .iter()
            .find(|&&o| o >= next_start)
            .copied()
            .unwrap_or(slice.len());
    }

    out
}
