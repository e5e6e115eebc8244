//! `$ref` resolution across documents.
//!
//! Resolution never copies or rewrites the parsed tree. Each document gets a
//! [`ReferenceTable`] of edges `origin path -> (document, path)`; chains are
//! followed on demand, either one at a time here or node by node through a
//! [`ResolvedView`](crate::ResolvedView).
//!
//! Cycles are expressed as ordinary edges. Following stops at the first node
//! revisited on the current chain and reports [`Resolution::Cycle`].

use crate::document::{Document, DocumentId};
use crate::graph::DependencyGraph;
use crate::json::JsonPath;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Member name that marks a reference object.
pub const REF_KEY: &str = "$ref";

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReferenceTarget {
    /// Document holding the target.
    pub document: DocumentId,
    /// Path of the target inside that document.
    pub path: JsonPath,
}

/// A resolved `$ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceEdge {
    /// Path of the object carrying the `$ref` member.
    pub origin: JsonPath,
    /// The reference string as written.
    pub reference: String,
    /// The node it designates.
    pub target: ReferenceTarget,
}

/// A `$ref` that could not be resolved.
///
/// Cycles are never reported here.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReferenceError {
    /// The reference string is not a valid `file#/pointer`.
    #[error("{document}: malformed reference '{reference}' at {origin}")]
    Malformed {
        /// Referring document.
        document: DocumentId,
        /// Path of the reference object.
        origin: JsonPath,
        /// Reference as written.
        reference: String,
    },

    /// The pointer does not designate any node.
    #[error("{document}: reference '{reference}' at {origin} points to a missing target")]
    MissingTarget {
        /// Referring document.
        document: DocumentId,
        /// Path of the reference object.
        origin: JsonPath,
        /// Reference as written.
        reference: String,
    },

    /// The referenced file could not be read or parsed.
    #[error("{document}: reference '{reference}' at {origin} needs {target}: {message}")]
    DocumentUnavailable {
        /// Referring document.
        document: DocumentId,
        /// Path of the reference object.
        origin: JsonPath,
        /// Reference as written.
        reference: String,
        /// Document that failed to load.
        target: DocumentId,
        /// Load failure.
        message: String,
    },
}

impl ReferenceError {
    /// Referring document.
    #[must_use]
    pub fn document(&self) -> &DocumentId {
        match self {
            Self::Malformed { document, .. }
            | Self::MissingTarget { document, .. }
            | Self::DocumentUnavailable { document, .. } => document,
        }
    }

    /// Path of the offending reference object.
    #[must_use]
    pub fn origin(&self) -> &JsonPath {
        match self {
            Self::Malformed { origin, .. }
            | Self::MissingTarget { origin, .. }
            | Self::DocumentUnavailable { origin, .. } => origin,
        }
    }
}

/// All references of one document, in document order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    edges: IndexMap<JsonPath, ReferenceEdge>,
    unresolved: Vec<ReferenceError>,
}

impl ReferenceTable {
    /// Edge whose origin is `path`.
    #[must_use]
    pub fn get(&self, path: &JsonPath) -> Option<&ReferenceEdge> {
        self.edges.get(path)
    }

    /// All resolved edges.
    pub fn edges(&self) -> impl Iterator<Item = &ReferenceEdge> {
        self.edges.values()
    }

    /// References that could not be resolved.
    #[must_use]
    pub fn unresolved(&self) -> &[ReferenceError] {
        &self.unresolved
    }

    /// The resolution error recorded for `path`, if any.
    #[must_use]
    pub fn error_at(&self, path: &JsonPath) -> Option<&ReferenceError> {
        self.unresolved.iter().find(|e| e.origin() == path)
    }

    /// Number of resolved edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the document has no resolved edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Builds the reference table of one document.
pub struct Resolver<'a> {
    document: &'a Document,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver for `document`.
    #[must_use]
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Discovers every `$ref` and resolves it.
    ///
    /// External targets are loaded (read and parsed, not resolved) through
    /// `graph`, so documents referring to each other cannot wait on each other.
    pub fn resolve(&self, graph: &DependencyGraph) -> ReferenceTable {
        let mut sites = Vec::new();
        collect_reference_sites(self.document.value(), &mut JsonPath::root(), &mut sites);

        let mut table = ReferenceTable::default();
        for (origin, reference) in sites {
            match locate(graph, self.document, &origin, &reference) {
                Ok(target) => {
                    table.edges.insert(
                        origin.clone(),
                        ReferenceEdge {
                            origin,
                            reference,
                            target,
                        },
                    );
                }
                Err(e) => {
                    warn!("{e}");
                    table.unresolved.push(e);
                }
            }
        }

        debug!(
            "{}: {} reference(s) resolved, {} unresolved",
            self.document.id(),
            table.edges.len(),
            table.unresolved.len()
        );
        table
    }
}

fn collect_reference_sites(value: &Value, path: &mut JsonPath, out: &mut Vec<(JsonPath, String)>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get(REF_KEY) {
                out.push((path.clone(), reference.clone()));
            }
            for (key, child) in map {
                path.push(key.as_str());
                collect_reference_sites(child, path, out);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index);
                collect_reference_sites(child, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Resolves `reference`, written at `origin` in `from`, to a node.
pub(crate) fn locate(
    graph: &DependencyGraph,
    from: &Document,
    origin: &JsonPath,
    reference: &str,
) -> Result<ReferenceTarget, ReferenceError> {
    let Some((file, tokens)) = split_reference(reference) else {
        return Err(ReferenceError::Malformed {
            document: from.id().clone(),
            origin: origin.clone(),
            reference: reference.to_string(),
        });
    };

    let external: Arc<Document>;
    let target: &Document = if file.is_empty() {
        from
    } else {
        let id = graph.resolve_relative(from.id(), file);
        external = graph
            .load_parsed(id.path())
            .map_err(|e| ReferenceError::DocumentUnavailable {
                document: from.id().clone(),
                origin: origin.clone(),
                reference: reference.to_string(),
                target: id,
                message: e.to_string(),
            })?;
        &external
    };

    let path = walk_pointer(target.value(), &tokens).ok_or_else(|| ReferenceError::MissingTarget {
        document: from.id().clone(),
        origin: origin.clone(),
        reference: reference.to_string(),
    })?;

    Ok(ReferenceTarget {
        document: target.id().clone(),
        path,
    })
}

/// Splits `file#/json/pointer` into the file part and decoded pointer tokens.
fn split_reference(reference: &str) -> Option<(&str, Vec<String>)> {
    if reference.is_empty() {
        return None;
    }
    let (file, fragment) = reference.split_once('#').unwrap_or((reference, ""));

    if fragment.is_empty() {
        return Some((file, Vec::new()));
    }
    let pointer = fragment.strip_prefix('/')?;
    let tokens = pointer
        .split('/')
        .map(|token| percent_decode(token).map(|t| t.replace("~1", "/").replace("~0", "~")))
        .collect::<Option<Vec<_>>>()?;
    Some((file, tokens))
}

fn percent_decode(token: &str) -> Option<String> {
    if !token.contains('%') {
        return Some(token.to_string());
    }
    let bytes = token.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = token.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn walk_pointer(root: &Value, tokens: &[String]) -> Option<JsonPath> {
    let mut node = root;
    let mut path = JsonPath::root();
    for token in tokens {
        match node {
            Value::Object(map) => {
                node = map.get(token)?;
                path.push(token.as_str());
            }
            Value::Array(items) => {
                let index: usize = token.parse().ok()?;
                node = items.get(index)?;
                path.push(index);
            }
            _ => return None,
        }
    }
    Some(path)
}

/// Outcome of following a reference chain.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The chain ended at a node that is not itself a resolvable reference.
    Resolved {
        /// Document holding the final node.
        document: Arc<Document>,
        /// Path of the final node.
        path: JsonPath,
    },
    /// The chain came back to a node it had already visited.
    Cycle {
        /// Document of the revisited node.
        document: DocumentId,
        /// Path of the revisited node.
        path: JsonPath,
    },
    /// A link of the chain could not be resolved.
    Unresolved(ReferenceError),
}

impl Resolution {
    /// The final node, when the chain resolved.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Resolved { document, path } => document.value_at(path),
            Self::Cycle { .. } | Self::Unresolved(_) => None,
        }
    }

    /// Whether the chain was cut by a cycle.
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

/// Follows reference edges starting at `path` in `document`.
pub(crate) fn follow(graph: &DependencyGraph, document: Arc<Document>, path: &JsonPath) -> Resolution {
    let mut document = document;
    let mut path = path.clone();
    let mut visited = HashSet::new();
    visited.insert((document.id().clone(), path.clone()));

    loop {
        let table = document.resolve(graph);
        let Some(edge) = table.get(&path) else {
            if let Some(error) = table.error_at(&path) {
                return Resolution::Unresolved(error.clone());
            }
            return Resolution::Resolved { document, path };
        };

        let target = edge.target.clone();
        let reference = edge.reference.clone();
        if !visited.insert((target.document.clone(), target.path.clone())) {
            debug!("Reference cycle at {} {}", target.document, target.path);
            return Resolution::Cycle {
                document: target.document,
                path: target.path,
            };
        }

        if target.document != *document.id() {
            document = match graph.load_document(target.document.path()) {
                Ok(next) => next,
                Err(e) => {
                    return Resolution::Unresolved(ReferenceError::DocumentUnavailable {
                        document: document.id().clone(),
                        origin: path,
                        reference,
                        target: target.document,
                        message: e.to_string(),
                    })
                }
            };
        }
        path = target.path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_local_and_external_references() {
        assert_eq!(
            split_reference("#/definitions/Foo"),
            Some(("", vec!["definitions".to_string(), "Foo".to_string()]))
        );
        assert_eq!(
            split_reference("common.json#/parameters/ApiVersion"),
            Some((
                "common.json",
                vec!["parameters".to_string(), "ApiVersion".to_string()]
            ))
        );
        assert_eq!(split_reference("common.json"), Some(("common.json", vec![])));
        assert_eq!(split_reference("#"), Some(("", vec![])));
    }

    #[test]
    fn decodes_pointer_escapes() {
        assert_eq!(
            split_reference("#/paths/~1foo~0bar/a%20b"),
            Some((
                "",
                vec!["paths".to_string(), "/foo~bar".to_string(), "a b".to_string()]
            ))
        );
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(split_reference(""), None);
        assert_eq!(split_reference("#definitions/Foo"), None);
        assert_eq!(split_reference("#/bad%zz"), None);
    }

    #[test]
    fn walks_arrays_by_index() {
        let root = serde_json::json!({"a": [{"b": 1}, {"c": 2}]});
        let tokens = vec!["a".to_string(), "1".to_string(), "c".to_string()];
        assert_eq!(
            walk_pointer(&root, &tokens),
            Some(JsonPath::from(vec!["a".into(), 1usize.into(), "c".into()]))
        );
        assert_eq!(walk_pointer(&root, &["a".to_string(), "x".to_string()]), None);
    }
}
