//! Text chunking with overlap for embedding.

use crate::error::ConfigError;
use crate::models::{Chunk, Document, IndexingConfig};

/// A chunk of text with its character span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Text chunker that splits documents into overlapping chunks.
///
/// Sizes are measured in characters. Consecutive chunks share exactly
/// `overlap` characters; every chunk is at most `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker. Requires `0 < overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if overlap == 0 || overlap >= chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk overlap must satisfy 0 < overlap < chunk_size (got {overlap} / {chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    pub fn with_defaults() -> Self {
        Self {
            chunk_size: 800,
            overlap: 150,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a document, assigning ordinals in text order.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| {
                Chunk::new(
                    &document.id,
                    span.text,
                    ordinal as u32,
                    span.start as u64,
                    span.end as u64,
                )
            })
            .collect()
    }

    /// Split text into overlapping spans. Blank input yields no spans.
    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        if text.trim().is_empty() {
            return spans;
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(total);
            if end >= total {
                spans.push(span(&chars, start, total));
                break;
            }

            let cut = self.find_break_point(&chars, start, end);
            spans.push(span(&chars, start, cut));

            // cut > start + overlap, so this always advances
            start = cut - self.overlap;
        }

        spans
    }

    /// Find a natural break point at or before `target_end`.
    ///
    /// Only the last fifth of the window is searched, and never at or before
    /// `start + overlap`.
    fn find_break_point(&self, chars: &[char], start: usize, target_end: usize) -> usize {
        let lookback = self.chunk_size / 5;
        let search_start = target_end
            .saturating_sub(lookback)
            .max(start + self.overlap + 1);
        if search_start >= target_end {
            return target_end;
        }

        // Priority: double newline > single newline > sentence end > space
        let mut best_break = None;
        let mut last_newline = None;
        let mut last_sentence = None;
        let mut last_space = None;

        for pos in search_start..target_end {
            match chars[pos] {
                '\n' => {
                    if pos > 0 && chars[pos - 1] == '\n' {
                        best_break = Some(pos + 1);
                    }
                    last_newline = Some(pos + 1);
                }
                '.' | '!' | '?' => {
                    if chars.get(pos + 1).is_some_and(|c| c.is_whitespace()) {
                        last_sentence = Some(pos + 1);
                    }
                }
                ' ' | '\t' => {
                    last_space = Some(pos + 1);
                }
                _ => {}
            }
        }

        best_break
            .or(last_newline)
            .or(last_sentence)
            .or(last_space)
            .unwrap_or(target_end)
    }
}

fn span(chars: &[char], start: usize, end: usize) -> TextSpan {
    TextSpan {
        text: chars[start..end].iter().collect(),
        start,
        end,
    }
}

/// Split `text` with the given limits.
pub fn split(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TextSpan>, ConfigError> {
    Ok(TextChunker::new(chunk_size, overlap)?.split(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_document(content: &str) -> Document {
        Document::new("test.txt", content.to_string())
    }

    fn shared_suffix_prefix(a: &str, b: &str) -> usize {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        (1..=a.len().min(b.len()))
            .rev()
            .find(|&n| a[a.len() - n..] == b[..n])
            .unwrap_or(0)
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunker = TextChunker::with_defaults();
        let doc = create_test_document("Hello, world!");
        let chunks = chunker.chunk(&doc);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].document_id, doc.id);
    }

    #[test]
    fn test_empty_document() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk(&create_test_document("")).is_empty());
        assert!(chunker.split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_rejects_invalid_limits() {
        assert!(TextChunker::new(100, 0).is_err());
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 150).is_err());
        assert!(TextChunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_two_thousand_chars_yields_three_chunks() {
        let chunker = TextChunker::new(800, 150).unwrap();
        let text = "abcdefghij".repeat(200);
        let doc = create_test_document(&text);
        let chunks = chunker.chunk(&doc);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i as u32);
            assert!(chunk.text.chars().count() <= 800);
        }
        assert!(shared_suffix_prefix(&chunks[0].text, &chunks[1].text) >= 150);
        assert_eq!(chunks[1].start_offset, 650);
        assert_eq!(chunks[2].end_offset, 2000);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let chunker = TextChunker::new(100, 20).unwrap();
        let mut text = "x".repeat(90);
        text.push_str("\n\n");
        text.push_str(&"y".repeat(100));

        let spans = chunker.split(&text);
        assert_eq!(spans[0].end, 92);
        assert!(spans[0].text.ends_with("\n\n"));
        assert_eq!(spans[1].start, 72);
    }

    #[test]
    fn test_prefers_sentence_over_space() {
        let chunker = TextChunker::new(50, 10).unwrap();
        let text = format!("{}. next words follow here and keep going on", "a".repeat(42));
        let spans = chunker.split(&text);
        assert_eq!(spans[0].text, format!("{}.", "a".repeat(42)));
    }

    #[test]
    fn test_size_and_overlap_bounds_hold() {
        let text = "Cells are the basic unit of life. They contain organelles!\n\
                    Mitochondria produce energy? Yes.\n\nThe nucleus stores DNA and \
                    controls the cell. Ribosomes build proteins from amino acids. "
            .repeat(12);
        for (size, overlap) in [(60, 10), (120, 40), (200, 199), (33, 1)] {
            let chunker = TextChunker::new(size, overlap).unwrap();
            let spans = chunker.split(&text);
            assert!(!spans.is_empty());
            assert_eq!(spans[0].start, 0);
            assert_eq!(spans.last().unwrap().end, text.chars().count());
            for span in &spans {
                assert!(span.text.chars().count() <= size);
                assert_eq!(span.text.chars().count(), span.end - span.start);
            }
            for pair in spans.windows(2) {
                assert_eq!(pair[0].end - pair[1].start, overlap);
                assert!(shared_suffix_prefix(&pair[0].text, &pair[1].text) >= overlap);
            }
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "Entropy measures disorder. ".repeat(100);
        let first = split(&text, 120, 30).unwrap();
        let second = split(&text, 120, 30).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let chunker = TextChunker::new(10, 3).unwrap();
        let text = "αβγδεζηθικλμνξοπρστυφχψω";
        let spans = chunker.split(text);
        for span in &spans {
            assert!(span.text.chars().count() <= 10);
        }
        assert_eq!(spans.last().unwrap().end, text.chars().count());
    }
}
