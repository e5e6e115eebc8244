//! Source positions recorded while parsing.

use super::path::JsonPath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number in characters (1-indexed).
    pub column: usize,
    /// Byte offset from the start of the text.
    #[serde(skip)]
    pub offset: usize,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// Source range of one value token, from its first character to just past its last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start of the value.
    pub start: Position,
    /// End of the value (exclusive).
    pub end: Position,
}

impl Span {
    /// Creates a span between two positions.
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Length of the span in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    /// Whether the span covers no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start.offset, span.len()).into()
    }
}

/// Mapping from every structural path of a document to the span of its value.
#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    spans: HashMap<JsonPath, Span>,
}

impl PositionIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, path: JsonPath, span: Span) {
        self.spans.insert(path, span);
    }

    /// Drops `path` and everything below it.
    pub(crate) fn remove_subtree(&mut self, path: &JsonPath) {
        self.spans.retain(|recorded, _| !recorded.starts_with(path));
    }

    /// Returns the span recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &JsonPath) -> Option<Span> {
        self.spans.get(path).copied()
    }

    /// Returns the span of `path`, or of its closest recorded ancestor.
    #[must_use]
    pub fn nearest(&self, path: &JsonPath) -> Option<(JsonPath, Span)> {
        let mut candidate = path.clone();
        loop {
            if let Some(span) = self.get(&candidate) {
                return Some((candidate, span));
            }
            candidate.pop()?;
        }
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
