//! Rendering retrieved chunks into a generation-ready context block.

use std::fmt::Write;

use crate::engine::Context;

/// Concatenate chunk texts with document/position provenance.
///
/// Chunks arrive already ordered best-first; the rendering preserves that
/// order so downstream truncation (if any) drops the weakest passages.
#[must_use]
pub fn format_context(context: &Context) -> String {
    if context.chunks.is_empty() {
        return String::new();
    }

    let mut out = String::from("Relevant passages:\n");
    for chunk in &context.chunks {
        let _ = writeln!(
            out,
            "\n[From: {}#{} score={:.2}]\n{}",
            chunk.doc_path, chunk.sequence_index, chunk.score, chunk.text
        );
    }

    if context.truncated {
        out.push_str("\n[context truncated to fit budget]\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RetrievedChunk;
    use retrievio_core::ChunkId;

    fn chunk(doc: &str, seq: usize, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: ChunkId::from_raw(format!("{doc}-{seq}")),
            doc_path: doc.into(),
            sequence_index: seq,
            text: text.into(),
            score,
        }
    }

    #[test]
    fn empty_context_formats_to_empty_string() {
        let context = Context {
            chunks: vec![],
            truncated: false,
            degraded: false,
        };
        assert_eq!(format_context(&context), "");
    }

    #[test]
    fn provenance_included_per_chunk() {
        let context = Context {
            chunks: vec![
                chunk("docs/a.txt", 0, "The cat sat.", 0.91),
                chunk("docs/b.txt", 3, "The dog ran.", 0.52),
            ],
            truncated: false,
            degraded: false,
        };
        let rendered = format_context(&context);
        assert!(rendered.contains("[From: docs/a.txt#0 score=0.91]"));
        assert!(rendered.contains("The cat sat."));
        assert!(rendered.contains("[From: docs/b.txt#3 score=0.52]"));
        assert!(!rendered.contains("truncated"));
    }

    #[test]
    fn truncation_noted() {
        let context = Context {
            chunks: vec![chunk("a.txt", 0, "text", 0.9)],
            truncated: true,
            degraded: false,
        };
        assert!(format_context(&context).contains("[context truncated to fit budget]"));
    }

    #[test]
    fn order_preserved() {
        let context = Context {
            chunks: vec![
                chunk("first.txt", 0, "first", 0.9),
                chunk("second.txt", 0, "second", 0.8),
            ],
            truncated: false,
            degraded: false,
        };
        let rendered = format_context(&context);
        let first = rendered.find("first.txt").unwrap();
        let second = rendered.find("second.txt").unwrap();
        assert!(first < second);
    }
}
