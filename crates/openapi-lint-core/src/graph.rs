//! Document cache and identity authority for one analysis run.

use crate::document::{Document, DocumentId};
use crate::fs::FileSystem;
use crate::json::{JsonPath, ParseError};
use crate::resolver::{self, Resolution};
use crate::view::ResolvedView;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned by the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The file system could not provide the document.
    #[error("failed to read {document}: {message}")]
    Io {
        /// Document that failed.
        document: DocumentId,
        /// IO error message.
        message: String,
    },

    /// The document is not valid JSON.
    #[error("failed to parse {document}: {source}")]
    Parse {
        /// Document that failed.
        document: DocumentId,
        /// Parser error.
        #[source]
        source: ParseError,
    },

    /// The document was requested before anyone loaded it.
    #[error("document {0} has not been loaded")]
    NotLoaded(DocumentId),
}

impl GraphError {
    /// The document this error is about.
    #[must_use]
    pub fn document(&self) -> &DocumentId {
        match self {
            Self::Io { document, .. } | Self::Parse { document, .. } | Self::NotLoaded(document) => {
                document
            }
        }
    }
}

type LoadResult = Result<Arc<Document>, GraphError>;

/// Owns every document loaded during a run.
///
/// Each canonical path maps to a single once-cell, so concurrent requests for
/// the same document share one read, one parse and one resolution, and every
/// caller gets the same `Arc<Document>`. Failures are cached the same way.
pub struct DependencyGraph {
    fs: Arc<dyn FileSystem>,
    base_dir: PathBuf,
    entries: Mutex<IndexMap<DocumentId, Arc<OnceCell<LoadResult>>>>,
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("base_dir", &self.base_dir)
            .field("documents", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl DependencyGraph {
    /// Creates a graph resolving relative paths against the current directory.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::with_base_dir(fs, base_dir)
    }

    /// Creates a graph resolving relative paths against `base_dir`.
    #[must_use]
    pub fn with_base_dir(fs: Arc<dyn FileSystem>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            base_dir: base_dir.into(),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Maps `path` to its canonical document id.
    ///
    /// Purely lexical: relative paths are joined to the base directory and
    /// `.`/`..` components collapsed. Storage is never consulted.
    #[must_use]
    pub fn canonicalize(&self, path: &Path) -> DocumentId {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        DocumentId::new(normalize(&joined))
    }

    /// Id of `file` referenced from the document `from`.
    #[must_use]
    pub fn resolve_relative(&self, from: &DocumentId, file: &str) -> DocumentId {
        self.canonicalize(&from.directory().join(file))
    }

    fn entry(&self, id: &DocumentId) -> Arc<OnceCell<LoadResult>> {
        let mut entries = self.entries.lock();
        Arc::clone(entries.entry(id.clone()).or_default())
    }

    /// Reads and parses a document without resolving its references.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Io`] or [`GraphError::Parse`]; the failure is
    /// cached and returned to later callers as well.
    pub fn load_parsed(&self, path: &Path) -> LoadResult {
        let id = self.canonicalize(path);
        let cell = self.entry(&id);
        cell.get_or_init(|| self.read_and_parse(&id)).clone()
    }

    /// Loads a document and resolves its references.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Io`] or [`GraphError::Parse`] if the document
    /// itself cannot be loaded. Unresolvable references are recorded in the
    /// document's reference table instead.
    pub fn load_document(&self, path: &Path) -> LoadResult {
        let document = self.load_parsed(path)?;
        document.resolve(self);
        Ok(document)
    }

    /// Returns an already loaded document.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotLoaded`] if no load was started for `path`,
    /// or the cached load failure.
    pub fn get_document(&self, path: &Path) -> LoadResult {
        let id = self.canonicalize(path);
        let cell = self.entries.lock().get(&id).cloned();
        match cell.as_ref().and_then(|c| c.get()) {
            Some(result) => result.clone(),
            None => Err(GraphError::NotLoaded(id)),
        }
    }

    /// All successfully loaded documents, in first-request order.
    #[must_use]
    pub fn documents(&self) -> Vec<Arc<Document>> {
        let cells: Vec<_> = self.entries.lock().values().cloned().collect();
        cells
            .iter()
            .filter_map(|cell| cell.get().and_then(|r| r.as_ref().ok()).cloned())
            .collect()
    }

    /// Follows the reference chain starting at `path` in `document`.
    ///
    /// # Errors
    ///
    /// Returns an error only if `document` itself cannot be loaded.
    pub fn follow_reference(&self, document: &DocumentId, path: &JsonPath) -> Result<Resolution, GraphError> {
        let start = self.load_document(document.path())?;
        Ok(resolver::follow(self, start, path))
    }

    /// Resolved view of `document`: references are followed on access and
    /// targets are never copied.
    ///
    /// # Errors
    ///
    /// Returns an error only if `document` itself cannot be loaded.
    pub fn resolved_view(&self, document: &DocumentId) -> Result<ResolvedView, GraphError> {
        let root = self.load_document(document.path())?;
        Ok(ResolvedView::new(self, root))
    }

    fn read_and_parse(&self, id: &DocumentId) -> LoadResult {
        debug!("Loading {id}");
        let content = self.fs.read(id.path()).map_err(|e| GraphError::Io {
            document: id.clone(),
            message: e.to_string(),
        })?;
        let document = Document::parse(id.clone(), content).map_err(|source| GraphError::Parse {
            document: id.clone(),
            source,
        })?;
        Ok(Arc::new(document))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
