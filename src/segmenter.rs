//! Clause-boundary text segmenter.
//!
//! Splits legal documents on clause/article/section headings rather than
//! on size. A line opens a new segment when it matches one of a fixed set
//! of boundary patterns (`1.1`, `2.3.1`, `ARTICLE I`, `SECTION 5`,
//! `3. Definitions`); everything else accumulates into the current segment.
//!
//! Joining the emitted segments with `\n` reproduces the input lines
//! exactly — segmentation never loses or reorders content.

use std::collections::BTreeMap;

use regex::Regex;

use crate::models::Segment;

/// Sentinel clause id for text preceding the first boundary marker.
pub const INTRO_CLAUSE_ID: &str = "Intro";

/// Splits text into clause-level segments and attaches clause ids.
pub struct ClauseSegmenter {
    boundary: Regex,
}

impl Default for ClauseSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClauseSegmenter {
    pub fn new() -> Self {
        // Alternation order: part/article headings, section headings,
        // bare dotted numerals (the dominant commercial-contract style),
        // then "1. Title" numbered headers. Case-insensitive throughout.
        let boundary = Regex::new(
            r"(?i)^\s*(?:ARTICLE\s+[IVX0-9]+|SECTION\s+[0-9]+(?:\.[0-9]+)*|[0-9]+\.[0-9]+(?:\.[0-9]+)*|[0-9]+\.\s+[A-Z])",
        )
        .expect("boundary pattern is valid");

        Self { boundary }
    }

    /// Split text into raw segment strings on clause boundaries.
    ///
    /// Empty input yields an empty vector. Non-boundary leading lines form
    /// a preamble segment.
    pub fn segment(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut segments: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in text.lines() {
            if self.boundary.is_match(line) {
                if !current.is_empty() {
                    segments.push(current.join("\n"));
                }
                current = vec![line];
            } else {
                current.push(line);
            }
        }

        if !current.is_empty() {
            segments.push(current.join("\n"));
        }

        segments
    }

    /// Segment each text and build [`Segment`]s with clause ids and metadata.
    ///
    /// The metadata map for text `i` is copied onto every segment derived
    /// from it, then `clause_id` is injected. Whitespace-only segments are
    /// dropped.
    pub fn to_documents(
        &self,
        texts: &[String],
        metadatas: &[BTreeMap<String, String>],
    ) -> Vec<Segment> {
        let mut documents = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let base_metadata = metadatas.get(i).cloned().unwrap_or_default();

            for raw in self.segment(text) {
                if raw.trim().is_empty() {
                    continue;
                }
                let clause_id = self.extract_clause_id(&raw);
                let mut metadata = base_metadata.clone();
                metadata.insert("clause_id".to_string(), clause_id.clone());
                documents.push(Segment {
                    text: raw,
                    clause_id,
                    metadata,
                });
            }
        }

        documents
    }

    /// Clause id for a segment: the trimmed boundary match on its first
    /// line, or [`INTRO_CLAUSE_ID`] when the first line is not a boundary.
    fn extract_clause_id(&self, segment: &str) -> String {
        let first_line = segment.lines().next().unwrap_or("");
        match self.boundary.find(first_line) {
            Some(m) => m.as_str().trim().to_string(),
            None => INTRO_CLAUSE_ID.to_string(),
        }
    }
}
