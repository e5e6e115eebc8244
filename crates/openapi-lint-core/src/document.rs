//! A single loaded source document.

use crate::graph::DependencyGraph;
use crate::json::{self, JsonPath, ParseError, PositionIndex, Span};
use crate::resolver::{ReferenceTable, Resolver};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Canonical identity of a document: its normalized absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(PathBuf);

impl DocumentId {
    /// Wraps an already canonical path.
    ///
    /// Use [`DependencyGraph::canonicalize`] to build ids from user input.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The document's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Directory relative references are resolved against.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.0.parent().unwrap_or_else(|| Path::new(""))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Lookup failures on a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// No position was recorded for the path (e.g. a path synthesized by a rule).
    #[error("no position recorded for {path} in {document}")]
    PathNotFound {
        /// Document that was searched.
        document: DocumentId,
        /// Path that was requested.
        path: JsonPath,
    },
}

/// One source document: raw text, parsed tree, position index and references.
///
/// The reference table is built once by [`Document::resolve`]; everything else
/// is fixed at parse time.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    content: String,
    value: Value,
    positions: PositionIndex,
    references: OnceCell<ReferenceTable>,
}

impl Document {
    /// Parses `content` as the document identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns the parser's error if `content` is not valid JSON.
    pub fn parse(id: DocumentId, content: impl Into<String>) -> Result<Self, ParseError> {
        let content = content.into();
        let parsed = json::parse(&content)?;
        debug!("Parsed {} ({} nodes)", id, parsed.positions.len());
        Ok(Self {
            id,
            content,
            value: parsed.value,
            positions: parsed.positions,
            references: OnceCell::new(),
        })
    }

    /// Builds the reference table, loading referenced documents through `graph`.
    ///
    /// Only the first call does any work; later calls return the same table.
    pub fn resolve(&self, graph: &DependencyGraph) -> &ReferenceTable {
        self.references.get_or_init(|| {
            debug!("Resolving references in {}", self.id);
            Resolver::new(self).resolve(graph)
        })
    }

    /// The document's identity.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// The parsed root value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The raw source text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The reference table, once resolved.
    #[must_use]
    pub fn references(&self) -> Option<&ReferenceTable> {
        self.references.get()
    }

    /// The position index built during parsing.
    #[must_use]
    pub fn positions(&self) -> &PositionIndex {
        &self.positions
    }

    /// The node at `path`, if any.
    #[must_use]
    pub fn value_at(&self, path: &JsonPath) -> Option<&Value> {
        path.get(&self.value)
    }

    /// Returns the source span of the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::PathNotFound`] if no position was recorded.
    pub fn position_from_path(&self, path: &JsonPath) -> Result<Span, DocumentError> {
        self.positions
            .get(path)
            .ok_or_else(|| DocumentError::PathNotFound {
                document: self.id.clone(),
                path: path.clone(),
            })
    }

    /// Returns the span of `path` or of its closest ancestor that has one.
    #[must_use]
    pub fn nearest_position(&self, path: &JsonPath) -> Option<(JsonPath, Span)> {
        self.positions.nearest(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::sync::Arc;

    fn doc(text: &str) -> Document {
        Document::parse(DocumentId::new("/specs/a.json"), text).unwrap()
    }

    #[test]
    fn exposes_content_and_value() {
        let d = doc(r#"{"swagger": "2.0"}"#);
        assert_eq!(d.content(), r#"{"swagger": "2.0"}"#);
        assert_eq!(d.value()["swagger"], "2.0");
        assert_eq!(d.id().path(), Path::new("/specs/a.json"));
        assert_eq!(d.id().directory(), Path::new("/specs"));
    }

    #[test]
    fn position_lookup_and_missing_path() {
        let d = doc(r#"{"x": {"y": 1}}"#);
        let span = d.position_from_path(&JsonPath::from(["x", "y"])).unwrap();
        assert_eq!(span.start.column, 13);

        let missing = JsonPath::from(["x", "y", "z"]);
        assert!(matches!(
            d.position_from_path(&missing),
            Err(DocumentError::PathNotFound { .. })
        ));
        let (found, span) = d.nearest_position(&missing).unwrap();
        assert_eq!(found, JsonPath::from(["x", "y"]));
        assert_eq!(span.start.column, 13);
    }

    #[test]
    fn resolve_is_idempotent() {
        let fs = Arc::new(MemoryFileSystem::new());
        let graph = DependencyGraph::with_base_dir(fs, "/specs");
        let d = doc(r##"{"a": {"$ref": "#/b"}, "b": {"type": "string"}}"##);

        assert!(d.references().is_none());
        let first = d.resolve(&graph) as *const ReferenceTable;
        let second = d.resolve(&graph) as *const ReferenceTable;
        assert_eq!(first, second);
        assert_eq!(d.references().map(ReferenceTable::len), Some(1));
        assert_eq!(d.positions().len(), 5);
    }
}
