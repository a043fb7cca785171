//! Segment transformation applied between splitting and embedding.

use crate::document::TextSegment;

/// Rewrites a segment before it is embedded and stored.
pub trait SegmentTransformer: Send + Sync {
    /// Transforms a single segment.
    fn transform(&self, segment: TextSegment) -> TextSegment;

    /// Transforms every segment, preserving order.
    fn transform_all(&self, segments: Vec<TextSegment>) -> Vec<TextSegment> {
        segments.into_iter().map(|s| self.transform(s)).collect()
    }
}

impl<F> SegmentTransformer for F
where
    F: Fn(TextSegment) -> TextSegment + Send + Sync,
{
    fn transform(&self, segment: TextSegment) -> TextSegment {
        self(segment)
    }
}

/// Prefixes each segment with its source file name on its own line.
///
/// Segments without a `file_name` entry pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileNamePrefixTransformer;

impl SegmentTransformer for FileNamePrefixTransformer {
    fn transform(&self, segment: TextSegment) -> TextSegment {
        match segment.file_name() {
            Some(name) => {
                let text = format!("{name}\n{}", segment.text);
                TextSegment::new(text, segment.metadata)
            }
            None => segment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Metadata, FILE_NAME};

    #[test]
    fn test_prefixes_file_name() {
        let mut metadata = Metadata::new();
        metadata.insert(FILE_NAME.into(), "notes.md".into());
        let segment = TextSegment::new("Body text", metadata.clone());

        let out = FileNamePrefixTransformer.transform(segment);
        assert_eq!(out.text, "notes.md\nBody text");
        assert_eq!(out.metadata, metadata);
    }

    #[test]
    fn test_without_file_name_is_unchanged() {
        let segment = TextSegment::from_text("Body text");
        let out = FileNamePrefixTransformer.transform(segment.clone());
        assert_eq!(out, segment);
    }

    #[test]
    fn test_closure_transformer() {
        let upper = |s: TextSegment| TextSegment::new(s.text.to_uppercase(), s.metadata);
        let out = upper.transform_all(vec![TextSegment::from_text("a"), TextSegment::from_text("b")]);
        assert_eq!(out[0].text, "A");
        assert_eq!(out[1].text, "B");
    }
}
