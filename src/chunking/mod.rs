//! Lossless, overlapping text chunking
//!
//! Long page text is cut into pieces of at most `size` characters so each
//! analyzer call fits a fixed context budget. Every chunk after the first
//! starts exactly `overlap` characters before the previous chunk ended, so
//! dropping each chunk's overlap prefix and concatenating gives back the
//! original text.
//!
//! # Algorithm
//!
//! 1. Texts of at most `size` characters become a single chunk
//! 2. Otherwise the cut point for a chunk starting at `s` is searched in
//!    `(s + overlap, s + size]`, preferring, in order: just after a blank
//!    line, just after sentence punctuation followed by whitespace, just
//!    after any whitespace. Paragraph and sentence cuts are only taken in the
//!    back half of the window to avoid tiny chunks
//! 3. With no boundary in the window the text is cut at `s + size`
//! 4. The next chunk starts at `cut - overlap`
//!
//! All positions are in characters (Unicode scalar values), never bytes.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// A bounded slice of a page's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk in the page (0-based)
    pub index: usize,
    pub text: String,
    pub source_url: String,
    /// Character offset of the chunk in the original text
    pub start: usize,
    /// Leading characters repeated from the previous chunk
    pub overlap: usize,
}

/// Splits text with a fixed size and overlap
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails if `size` is zero or `overlap >= size`
    pub fn new(size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::Validation(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(ConfigError::Validation(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk(&self, text: &str, source_url: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        // Byte offset of every char boundary, including the end of the text
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.size).min(total);
            let end = if hard_end == total {
                total
            } else {
                self.find_cut(&chars, start, hard_end)
            };

            chunks.push(TextChunk {
                index: chunks.len(),
                text: text[bounds[start]..bounds[end]].to_string(),
                source_url: source_url.to_string(),
                start,
                overlap: if chunks.is_empty() { 0 } else { self.overlap },
            });

            if end == total {
                break;
            }
            start = end - self.overlap;
        }
        chunks
    }

    /// Picks the cut position in `(start + overlap, hard_end]`
    fn find_cut(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let lowest = start + self.overlap + 1;
        let preferred_lowest = lowest.max(start + self.size / 2);

        let after_paragraph =
            |p: usize| p >= 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n';
        let after_sentence = |p: usize| {
            p >= 2 && chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '!' | '?')
        };
        let after_space = |p: usize| p >= 1 && chars[p - 1].is_whitespace();

        (preferred_lowest..=hard_end)
            .rev()
            .find(|&p| after_paragraph(p))
            .or_else(|| (preferred_lowest..=hard_end).rev().find(|&p| after_sentence(p)))
            .or_else(|| (lowest..=hard_end).rev().find(|&p| after_space(p)))
            .unwrap_or(hard_end)
    }
}

/// Splits `text` into overlapping chunks of at most `size` characters
///
/// # Examples
///
/// ```
/// use intent_crawler::chunking::{chunk_text, reassemble};
///
/// let text = "Applications open in March. Deadlines are in June.";
/// let chunks = chunk_text(text, 30, 5, "https://example.edu/").unwrap();
/// assert!(chunks.iter().all(|c| c.text.chars().count() <= 30));
/// assert_eq!(reassemble(&chunks), text);
/// ```
pub fn chunk_text(
    text: &str,
    size: usize,
    overlap: usize,
    source_url: &str,
) -> Result<Vec<TextChunk>, ConfigError> {
    Ok(Chunker::new(size, overlap)?.chunk(text, source_url))
}

/// Rebuilds the original text from chunks produced by [`Chunker::chunk`]
pub fn reassemble(chunks: &[TextChunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.extend(chunk.text.chars().skip(chunk.overlap));
    }
    out
}
