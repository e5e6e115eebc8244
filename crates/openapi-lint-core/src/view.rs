//! Tree views handed to queries and rules.
//!
//! A [`Node`] is either raw, walking the parsed tree as written, or part of a
//! [`ResolvedView`], where stepping onto a `{"$ref": ...}` object lands on the
//! reference target instead. The resolved view never copies a target: every
//! node borrows its value from the document that physically holds it, so a
//! model referenced from many places exists once however it is reached.
//!
//! A reference whose target encloses the reference itself, or encloses any
//! reference already crossed on the way to it, is not followed; the node stays
//! on the `{"$ref": ...}` object as written.

use crate::document::{Document, DocumentId};
use crate::graph::DependencyGraph;
use crate::json::{JsonPath, PathSegment};

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A document together with every document its references reach.
pub struct ResolvedView {
    root: DocumentId,
    documents: IndexMap<DocumentId, Arc<Document>>,
}

impl fmt::Debug for ResolvedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedView")
            .field("root", &self.root)
            .field("documents", &self.documents.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolvedView {
    /// Resolves `root` and every document reachable through its references.
    pub fn new(graph: &DependencyGraph, root: Arc<Document>) -> Self {
        let root_id = root.id().clone();
        let mut documents = IndexMap::new();
        let mut pending = vec![root];

        while let Some(document) = pending.pop() {
            if documents.contains_key(document.id()) {
                continue;
            }
            let table = document.resolve(graph);
            for edge in table.edges() {
                let id = &edge.target.document;
                if documents.contains_key(id) || id == document.id() {
                    continue;
                }
                match graph.load_document(id.path()) {
                    Ok(next) => pending.push(next),
                    Err(e) => warn!("{e}"),
                }
            }
            documents.insert(document.id().clone(), document);
        }

        debug!("Resolved view of {root_id} spans {} document(s)", documents.len());
        Self {
            root: root_id,
            documents,
        }
    }

    /// Id of the viewed document.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.root
    }

    /// A document of the view.
    #[must_use]
    pub fn document(&self, id: &DocumentId) -> Option<&Arc<Document>> {
        self.documents.get(id)
    }

    /// Every document of the view, the viewed one first.
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.documents.values()
    }

    /// The viewed document.
    #[must_use]
    pub fn root_document(&self) -> &Arc<Document> {
        &self.documents[0]
    }

    /// Root of the viewed document.
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        let document: &Document = self.root_document();
        Node::enter(self, document, JsonPath::root(), document.value(), None)
    }

    /// Node at `path`, following references on the way.
    #[must_use]
    pub fn node_at(&self, path: &JsonPath) -> Option<Node<'_>> {
        self.root().at(path)
    }
}

/// A reference crossed on the way to a node.
struct Site {
    document: DocumentId,
    path: JsonPath,
    outer: Option<Arc<Site>>,
}

fn chain(innermost: Option<&Arc<Site>>) -> impl Iterator<Item = &Site> {
    std::iter::successors(innermost.map(Arc::as_ref), |site| site.outer.as_deref())
}

#[derive(Clone)]
struct Origin<'a> {
    view: &'a ResolvedView,
    document: &'a Document,
    path: JsonPath,
    sites: Option<Arc<Site>>,
}

/// One node of a raw tree or of a [`ResolvedView`].
#[derive(Clone)]
pub struct Node<'a> {
    value: &'a Value,
    origin: Option<Origin<'a>>,
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Node");
        if let Some(origin) = &self.origin {
            debug.field("document", origin.document.id()).field("path", &origin.path);
        }
        debug.field("value", self.value).finish()
    }
}

impl<'a> Node<'a> {
    /// A node of the parsed tree `value`; references are not followed.
    #[must_use]
    pub fn raw(value: &'a Value) -> Self {
        Self { value, origin: None }
    }

    /// Places a node at `path` in `document`, then follows any reference
    /// chain starting there.
    fn enter(
        view: &'a ResolvedView,
        document: &'a Document,
        path: JsonPath,
        value: &'a Value,
        sites: Option<Arc<Site>>,
    ) -> Self {
        let (mut document, mut path, mut value, mut sites) = (document, path, value, sites);

        while value.is_object() {
            let Some(edge) = document.references().and_then(|table| table.get(&path)) else {
                break;
            };
            let target = &edge.target;
            let encloses = |id: &DocumentId, at: &JsonPath| *id == target.document && at.starts_with(&target.path);
            if encloses(document.id(), &path) || chain(sites.as_ref()).any(|site| encloses(&site.document, &site.path)) {
                debug!("Cycle at {} {path} -> {}", document.id(), target.path);
                break;
            }

            let Some(target_document) = view.document(&target.document) else {
                break;
            };
            let Some(target_value) = target_document.value_at(&target.path) else {
                break;
            };

            sites = Some(Arc::new(Site {
                document: document.id().clone(),
                path,
                outer: sites,
            }));
            document = target_document;
            path = target.path.clone();
            value = target_value;
        }

        Self {
            value,
            origin: Some(Origin {
                view,
                document,
                path,
                sites,
            }),
        }
    }

    fn descend(&self, segment: PathSegment, value: &'a Value) -> Self {
        match &self.origin {
            None => Self::raw(value),
            Some(origin) => Self::enter(
                origin.view,
                origin.document,
                origin.path.child(segment),
                value,
                origin.sites.clone(),
            ),
        }
    }

    /// The value at this node. Inside a resolved view, nested references of
    /// the value are still as written; step through the node to follow them.
    #[must_use]
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Where the value physically lives, for nodes of a resolved view.
    #[must_use]
    pub fn source(&self) -> Option<(&'a DocumentId, &JsonPath)> {
        self.origin.as_ref().map(|origin| (origin.document.id(), &origin.path))
    }

    /// Member `key` of an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Self> {
        let child = self.value.as_object()?.get(key)?;
        Some(self.descend(PathSegment::Key(key.to_string()), child))
    }

    /// Element `index` of an array.
    #[must_use]
    pub fn index(&self, index: usize) -> Option<Self> {
        let child = self.value.as_array()?.get(index)?;
        Some(self.descend(PathSegment::Index(index), child))
    }

    /// The child designated by `segment`.
    #[must_use]
    pub fn child(&self, segment: &PathSegment) -> Option<Self> {
        match segment {
            PathSegment::Key(key) => self.get(key),
            PathSegment::Index(index) => self.index(*index),
        }
    }

    /// The node `path` leads to from here.
    #[must_use]
    pub fn at(&self, path: &JsonPath) -> Option<Self> {
        path.segments()
            .iter()
            .try_fold(self.clone(), |node, segment| node.child(segment))
    }

    /// Members of an object, in document order.
    pub fn members(&self) -> impl Iterator<Item = (&'a str, Self)> + '_ {
        self.value
            .as_object()
            .into_iter()
            .flatten()
            .map(|(key, child)| (key.as_str(), self.descend(PathSegment::Key(key.clone()), child)))
    }

    /// Elements of an array, in order.
    pub fn elements(&self) -> impl Iterator<Item = Self> + '_ {
        self.value
            .as_array()
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(index, child)| self.descend(PathSegment::Index(index), child))
    }

    /// Members or elements, each with the segment leading to it.
    pub fn children(&self) -> Box<dyn Iterator<Item = (PathSegment, Self)> + '_> {
        match self.value {
            Value::Object(_) => Box::new(
                self.members()
                    .map(|(key, child)| (PathSegment::Key(key.to_string()), child)),
            ),
            Value::Array(_) => Box::new(
                self.elements()
                    .enumerate()
                    .map(|(index, child)| (PathSegment::Index(index), child)),
            ),
            _ => Box::new(std::iter::empty()),
        }
    }
}
