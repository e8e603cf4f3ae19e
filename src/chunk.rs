//! Boundary-aware text chunker.
//!
//! Splits long document text into overlapping [`Chunk`]s for embedding.
//! Split points prefer semantic boundaries in priority order: paragraph
//! breaks (blank-line runs), sentence ends (`. ! ?` followed by
//! whitespace), and a dense whitespace fallback so a boundary is always
//! findable even in punctuation-free text.
//!
//! # Algorithm
//!
//! 1. If the text fits in one chunk, return it whole.
//! 2. Otherwise collect all boundary candidates, sorted and de-duplicated.
//! 3. Greedily cut chunks: from the cursor, target `cursor + chunk_size`
//!    and take the nearest boundary at or after the target (binary
//!    search). If the nearest boundary would make the chunk more than
//!    half again too large, hard-cut at the target instead.
//! 4. The next chunk starts `overlap` characters before the previous end,
//!    so context carries across chunk edges.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Rough chars-to-tokens ratio for English text. Not a real tokenizer.
const TOKENS_PER_CHAR: f64 = 0.75;

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph regex"))
}

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+").expect("sentence regex"))
}

/// Splits documents into overlapping chunks along semantic boundaries.
///
/// Construct once from [`ChunkingConfig`]; all methods are pure functions
/// over their inputs.
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    chunk_size: usize,
    overlap: usize,
    fallback_gap: usize,
}

impl DocumentChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
            fallback_gap: config.fallback_boundary_gap.max(1),
        }
    }

    /// Whether `text` is long enough to be worth chunking.
    ///
    /// True iff the text exceeds 1.5x the chunk size. Documents only
    /// marginally larger than the target stay whole; the threshold keeps
    /// near-boundary documents from churning into a tiny second chunk.
    pub fn should_chunk(&self, text: &str) -> bool {
        text.len() * 2 > self.chunk_size * 3
    }

    /// Split `text` into ordered chunks carrying `metadata`.
    ///
    /// Returns an empty vec for empty text, and exactly one chunk (tagged
    /// `is_single_chunk`) when the text fits within the chunk size.
    /// Offsets reference the original untrimmed text; chunk text itself is
    /// trimmed of leading/trailing whitespace.
    pub fn chunk_document(&self, text: &str, metadata: &BTreeMap<String, String>) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        if text.len() <= self.chunk_size {
            let mut meta = metadata.clone();
            meta.insert("is_single_chunk".to_string(), "true".to_string());
            return vec![Chunk {
                chunk_number: 0,
                total_chunks: 1,
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
                estimated_tokens: estimate_tokens(text),
                metadata: meta,
            }];
        }

        let boundaries = self.detect_boundaries(text);
        self.build_chunks(text, &boundaries, metadata)
    }

    /// Collect candidate split positions, sorted ascending and de-duplicated.
    ///
    /// Paragraph breaks and sentence ends come from the compiled patterns;
    /// the whitespace fallback adds the first space at or after every
    /// `fallback_gap` characters.
    fn detect_boundaries(&self, text: &str) -> Vec<usize> {
        let mut boundaries: Vec<usize> = Vec::new();

        for m in paragraph_re().find_iter(text) {
            boundaries.push(m.end());
        }
        for m in sentence_re().find_iter(text) {
            boundaries.push(m.end());
        }

        let mut i = 0;
        while i < text.len() {
            let start = ceil_char_boundary(text, i);
            if let Some(pos) = text[start..].find(' ') {
                boundaries.push(start + pos);
            }
            i += self.fallback_gap;
        }

        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries
    }

    fn build_chunks(
        &self,
        text: &str,
        boundaries: &[usize],
        metadata: &BTreeMap<String, String>,
    ) -> Vec<Chunk> {
        let text_len = text.len();
        let mut chunks = Vec::new();
        let mut cursor = 0usize;
        let mut chunk_number = 0usize;

        while cursor < text_len {
            let target = cursor + self.chunk_size;

            let end = if target >= text_len {
                // Remainder fits in the final chunk.
                text_len
            } else {
                let cut = match nearest_boundary(boundaries, target) {
                    // A boundary past target + chunk_size/2 would make the
                    // chunk unreasonably large; hard-cut at the target.
                    Some(b) if b <= target + self.chunk_size / 2 => b,
                    _ => floor_char_boundary(text, target),
                };
                // Boundary snapping can collapse the cut back onto the
                // cursor when chunk_size is smaller than one character;
                // take the next whole character so the cursor always
                // advances and no zero-width chunk is emitted.
                if cut > cursor {
                    cut
                } else {
                    ceil_char_boundary(text, cursor + 1)
                }
            };

            let raw = &text[cursor..end];
            let mut meta = metadata.clone();
            if chunk_number > 0 {
                meta.insert("overlap_chars".to_string(), self.overlap.to_string());
            }

            chunks.push(Chunk {
                chunk_number,
                total_chunks: 0, // back-filled below
                text: raw.trim().to_string(),
                start_offset: cursor,
                end_offset: end,
                estimated_tokens: estimate_tokens(raw),
                metadata: meta,
            });

            let next = if end < text_len {
                floor_char_boundary(text, end.saturating_sub(self.overlap))
            } else {
                end
            };
            // The cursor must advance even if overlap snapping pulled the
            // start back to or before the previous position.
            cursor = if next > cursor { next } else { end };
            chunk_number += 1;
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }

        chunks
    }
}

/// Estimate token count from character length (round(len * 0.75)).
fn estimate_tokens(text: &str) -> usize {
    (text.len() as f64 * TOKENS_PER_CHAR).round() as usize
}

/// Binary search for the nearest boundary at or after `position`.
fn nearest_boundary(boundaries: &[usize], position: usize) -> Option<usize> {
    let idx = boundaries.partition_point(|&b| b < position);
    boundaries.get(idx).copied()
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap: usize) -> DocumentChunker {
        DocumentChunker::new(&ChunkingConfig {
            chunk_size,
            overlap,
            fallback_boundary_gap: 100,
        })
    }

    fn no_meta() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn test_empty_text_no_chunks() {
        let chunks = chunker(800, 75).chunk_document("", &no_meta());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "A short email body.";
        let chunks = chunker(800, 75).chunk_document(text, &no_meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_number, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, text.len());
        assert_eq!(chunks[0].metadata.get("is_single_chunk").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_metadata_carried_into_chunks() {
        let mut meta = BTreeMap::new();
        meta.insert("filename".to_string(), "report.pdf".to_string());
        let chunks = chunker(800, 75).chunk_document("tiny", &meta);
        assert_eq!(chunks[0].metadata.get("filename").map(String::as_str), Some("report.pdf"));
    }

    #[test]
    fn test_long_text_multiple_chunks() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} about the quarterly report. ", i))
            .collect::<String>();
        let chunks = chunker(200, 20).chunk_document(&text, &no_meta());

        assert!(chunks.len() > 1);
        let total = chunks.len();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_number, i);
            assert_eq!(c.total_chunks, total);
            assert!(c.end_offset > c.start_offset);
        }
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[chunks.len() - 1].end_offset, text.len());
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let text = "word ".repeat(200);
        let chunks = chunker(100, 10).chunk_document(&text, &no_meta());
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            // Each chunk starts `overlap` before the previous end (modulo
            // char-boundary snapping, exact here for ASCII).
            assert_eq!(pair[1].start_offset, pair[0].end_offset - 10);
        }
        assert!(chunks[0].metadata.get("overlap_chars").is_none());
        for c in &chunks[1..] {
            assert_eq!(c.metadata.get("overlap_chars").map(String::as_str), Some("10"));
        }
    }

    #[test]
    fn test_paragraph_boundary_preferred() {
        // Paragraph break ends at byte 102, within chunk_size/2 of the
        // target cut at 100, so the first chunk must end exactly there.
        let text = format!("{}\n\n{}\n\n{}", "x".repeat(60), "y".repeat(38), "z".repeat(300));
        let chunks = chunker(100, 10).chunk_document(&text, &no_meta());
        assert_eq!(chunks[0].end_offset, 102);
        assert!(chunks[0].text.ends_with('y'));
    }

    #[test]
    fn test_hard_cut_when_no_boundary_near() {
        // No whitespace, no punctuation: only fallback detection runs and
        // finds nothing, so the cut lands exactly at the target.
        let text = "a".repeat(350);
        let chunks = chunker(100, 10).chunk_document(&text, &no_meta());
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].end_offset, 100);
        assert_eq!(chunks[1].start_offset, 90);
    }

    #[test]
    fn test_final_chunk_has_no_trailing_overlap() {
        let text = "word ".repeat(100);
        let chunks = chunker(150, 15).chunk_document(&text, &no_meta());
        let last = &chunks[chunks.len() - 1];
        assert_eq!(last.end_offset, text.len());
    }

    #[test]
    fn test_should_chunk_threshold() {
        let c = chunker(100, 10);
        assert!(!c.should_chunk(&"a".repeat(100)));
        // Exactly at 1.5x the chunk size: still below threshold.
        assert!(!c.should_chunk(&"a".repeat(150)));
        assert!(c.should_chunk(&"a".repeat(151)));
    }

    #[test]
    fn test_token_estimate() {
        let chunks = chunker(800, 75).chunk_document("abcdefgh", &no_meta());
        // 8 chars * 0.75 = 6
        assert_eq!(chunks[0].estimated_tokens, 6);
    }

    #[test]
    fn test_chunk_text_is_trimmed_but_offsets_are_not() {
        let text = format!("{}.  \n\n  {}", "alpha ".repeat(20), "beta ".repeat(30));
        let chunks = chunker(100, 10).chunk_document(&text, &no_meta());
        for c in &chunks {
            assert_eq!(c.text, c.text.trim());
        }
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn test_multibyte_text_does_not_split_chars() {
        let text = "héllo wörld. ".repeat(40);
        let chunks = chunker(100, 10).chunk_document(&text, &no_meta());
        for c in &chunks {
            assert!(text.is_char_boundary(c.start_offset));
            assert!(text.is_char_boundary(c.end_offset));
        }
    }

    #[test]
    fn test_chunk_size_smaller_than_one_char_still_terminates() {
        // With a chunk size below the byte width of one character, the
        // hard cut must advance past the whole character instead of
        // collapsing onto the cursor and looping forever.
        let text = "€€€";
        let chunks = chunker(2, 1).chunk_document(text, &no_meta());
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.end_offset > c.start_offset);
            assert!(text.is_char_boundary(c.start_offset));
            assert!(text.is_char_boundary(c.end_offset));
        }
        assert_eq!(chunks[2].end_offset, text.len());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. ".repeat(30);
        let a = chunker(120, 12).chunk_document(&text, &no_meta());
        let b = chunker(120, 12).chunk_document(&text, &no_meta());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.start_offset, y.start_offset);
            assert_eq!(x.end_offset, y.end_offset);
        }
    }
}
