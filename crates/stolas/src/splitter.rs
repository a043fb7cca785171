//! Paragraph-aware document splitting.
//!
//! Segments are exact character ranges of the source text. A segment ends at
//! the latest paragraph break that fits, falling back to a sentence end, then
//! to whitespace, and finally to a hard cut at the size limit. The next segment
//! starts up to `max_overlap` characters before the previous end, snapped
//! forward to a word boundary when the overlap window contains one.

use paimon_core::{Error, Result};
use serde_json::Value;

use crate::document::{Document, TextSegment, INDEX};

/// Trait for strategies that cut documents into segments.
pub trait DocumentSplitter: Send + Sync {
    /// Splits a document into ordered segments.
    fn split(&self, document: &Document) -> Vec<TextSegment>;

    /// Splits every document, preserving order.
    fn split_all(&self, documents: &[Document]) -> Vec<TextSegment> {
        documents.iter().flat_map(|doc| self.split(doc)).collect()
    }
}

/// A segment's character range within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start offset in characters (inclusive).
    pub start: usize,
    /// End offset in characters (exclusive).
    pub end: usize,
    /// Segment index.
    pub index: usize,
}

impl Span {
    /// Returns the span length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the span is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits documents on paragraph boundaries into bounded, overlapping segments.
#[derive(Debug, Clone)]
pub struct ParagraphSplitter {
    max_segment_size: usize,
    max_overlap: usize,
}

impl ParagraphSplitter {
    /// Creates a splitter.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_segment_size` is zero or the overlap is not
    /// smaller than the segment size.
    pub fn new(max_segment_size: usize, max_overlap: usize) -> Result<Self> {
        if max_segment_size == 0 {
            return Err(Error::invalid_config("max_segment_size must be greater than 0"));
        }
        if max_overlap >= max_segment_size {
            return Err(Error::invalid_config(format!(
                "max_overlap ({max_overlap}) must be smaller than max_segment_size ({max_segment_size})"
            )));
        }
        Ok(Self {
            max_segment_size,
            max_overlap,
        })
    }

    /// Returns the maximum segment size in characters.
    #[must_use]
    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Returns the maximum overlap in characters.
    #[must_use]
    pub fn max_overlap(&self) -> usize {
        self.max_overlap
    }

    /// Computes segment spans over `text`.
    #[must_use]
    pub fn spans(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let len = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let end = if len - start <= self.max_segment_size {
                len
            } else {
                self.find_break(&chars, start)
            };

            spans.push(Span {
                start,
                end,
                index: spans.len(),
            });

            if end >= len {
                break;
            }

            start = self.overlap_start(&chars, end);
        }

        spans
    }

    /// Picks the end of the segment starting at `start`. Only called when the
    /// remaining text exceeds the size limit.
    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let limit = start + self.max_segment_size;
        // Ending past `start + max_overlap` guarantees the next start advances.
        let lowest = start + self.max_overlap + 1;

        let candidates = || (lowest..=limit).rev();

        candidates()
            .find(|&pos| is_paragraph_break(chars, pos))
            .or_else(|| candidates().find(|&pos| is_sentence_end(chars, pos)))
            .or_else(|| candidates().find(|&pos| chars[pos - 1].is_whitespace()))
            .unwrap_or(limit)
    }

    /// Picks the start of the segment following one that ends at `end`.
    fn overlap_start(&self, chars: &[char], end: usize) -> usize {
        if self.max_overlap == 0 {
            return end;
        }
        let from = end - self.max_overlap;
        (from..end)
            .find(|&pos| pos > 0 && chars[pos - 1].is_whitespace() && !chars[pos].is_whitespace())
            .unwrap_or(from)
    }
}

impl DocumentSplitter for ParagraphSplitter {
    fn split(&self, document: &Document) -> Vec<TextSegment> {
        let chars: Vec<char> = document.text().chars().collect();

        self.spans(document.text())
            .into_iter()
            .map(|span| {
                let text: String = chars[span.start..span.end].iter().collect();
                let mut metadata = document.metadata().clone();
                metadata.insert(INDEX.to_string(), Value::from(span.index));
                TextSegment::new(text, metadata)
            })
            .collect()
    }
}

/// True if `pos` directly follows a blank line.
fn is_paragraph_break(chars: &[char], pos: usize) -> bool {
    if pos < 2 || chars[pos - 1] != '\n' {
        return false;
    }
    chars[..pos - 1]
        .iter()
        .rev()
        .find(|c| !c.is_whitespace() || **c == '\n')
        .is_some_and(|c| *c == '\n')
}

/// True if `pos` directly follows sentence-ending punctuation.
fn is_sentence_end(chars: &[char], pos: usize) -> bool {
    match chars[pos - 1] {
        '。' | '！' | '？' => true,
        '.' | '!' | '?' => chars.get(pos).map_or(true, |c| c.is_whitespace()),
        _ => false,
    }
}
