//! Reference-aware helpers for inspecting a Swagger document from rules.

use crate::document::{Document, DocumentId};
use crate::graph::DependencyGraph;
use crate::json::JsonPath;
use crate::resolver::{self, Resolution, ReferenceTarget, REF_KEY};
use crate::view::{Node, ResolvedView};

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Helpers bound to the viewed document of a [`ResolvedView`].
///
/// References are resolved relative to the bound document. Results borrow
/// from the documents of the view.
pub struct SwaggerHelper<'v> {
    view: &'v ResolvedView,
    graph: &'v DependencyGraph,
}

impl fmt::Debug for SwaggerHelper<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwaggerHelper")
            .field("document", self.view.id())
            .finish_non_exhaustive()
    }
}

impl<'v> SwaggerHelper<'v> {
    /// Binds helpers to the document viewed by `view`.
    #[must_use]
    pub fn new(view: &'v ResolvedView, graph: &'v DependencyGraph) -> Self {
        Self { view, graph }
    }

    /// The bound document.
    #[must_use]
    pub fn document(&self) -> &'v Arc<Document> {
        self.view.root_document()
    }

    /// `#/definitions/<name>` of the bound document, as written.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&'v Value> {
        self.document().value().get("definitions")?.get(name)
    }

    /// Resolves `reference` as if written in the bound document and follows
    /// the chain to its end.
    #[must_use]
    pub fn resolve_reference(&self, reference: &str) -> Resolution {
        let origin = JsonPath::root();
        let target = match resolver::locate(self.graph, self.document(), &origin, reference) {
            Ok(target) => target,
            Err(e) => return Resolution::Unresolved(e),
        };
        self.follow_target(&target)
    }

    /// Target of a node.
    ///
    /// A `{"$ref": ...}` object yields the end of its reference chain; any
    /// other value is returned as is. `None` when the reference cannot be
    /// resolved, leads back to itself, or lands outside the view.
    #[must_use]
    pub fn follow_reference<'x>(&'x self, value: &'x Value) -> Option<&'x Value> {
        self.follow_tracked(value, &mut HashSet::new())
    }

    /// Node at `path` in the bound document, following references on the way.
    #[must_use]
    pub fn resolve_at(&self, path: &JsonPath) -> Option<Node<'v>> {
        self.view.node_at(path)
    }

    /// Schema of property `name` in `model`, looking through `allOf` parents.
    #[must_use]
    pub fn property_of_model<'x>(&'x self, model: &'x Value, name: &str) -> Option<&'x Value> {
        self.property_tracked(model, name, &mut HashSet::new())
    }

    /// Every property of `model`, own properties first, then inherited ones
    /// through `allOf`. The first declaration of a name wins.
    #[must_use]
    pub fn properties_of_model<'x>(&'x self, model: &'x Value) -> IndexMap<&'x str, &'x Value> {
        let mut properties = IndexMap::new();
        self.collect_properties(model, &mut properties, &mut HashSet::new());
        properties
    }

    fn follow_target(&self, target: &ReferenceTarget) -> Resolution {
        match self.graph.load_document(target.document.path()) {
            Ok(document) => resolver::follow(self.graph, document, &target.path),
            Err(e) => Resolution::Unresolved(resolver::ReferenceError::DocumentUnavailable {
                document: self.view.id().clone(),
                origin: JsonPath::root(),
                reference: target.path.to_pointer(),
                target: target.document.clone(),
                message: e.to_string(),
            }),
        }
    }

    fn follow_tracked<'x>(
        &'x self,
        value: &'x Value,
        seen: &mut HashSet<(DocumentId, JsonPath)>,
    ) -> Option<&'x Value> {
        let Some(reference) = value.get(REF_KEY).and_then(Value::as_str) else {
            return Some(value);
        };
        match self.resolve_reference(reference) {
            Resolution::Resolved { document, path } => {
                if !seen.insert((document.id().clone(), path.clone())) {
                    return None;
                }
                let Some(holder) = self.view.document(document.id()) else {
                    debug!("{reference} leads to {}, outside the view of {}", document.id(), self.view.id());
                    return None;
                };
                holder.value_at(&path)
            }
            Resolution::Cycle { .. } | Resolution::Unresolved(_) => None,
        }
    }

    fn property_tracked<'x>(
        &'x self,
        model: &'x Value,
        name: &str,
        seen: &mut HashSet<(DocumentId, JsonPath)>,
    ) -> Option<&'x Value> {
        let model = self.follow_tracked(model, seen)?;
        if let Some(property) = model.get("properties").and_then(|p| p.get(name)) {
            return Some(property);
        }
        model
            .get("allOf")
            .and_then(Value::as_array)?
            .iter()
            .find_map(|parent| self.property_tracked(parent, name, seen))
    }

    fn collect_properties<'x>(
        &'x self,
        model: &'x Value,
        out: &mut IndexMap<&'x str, &'x Value>,
        seen: &mut HashSet<(DocumentId, JsonPath)>,
    ) {
        let Some(model) = self.follow_tracked(model, seen) else {
            return;
        };
        if let Some(Value::Object(properties)) = model.get("properties") {
            for (name, schema) in properties {
                out.entry(name.as_str()).or_insert(schema);
            }
        }
        if let Some(Value::Array(parents)) = model.get("allOf") {
            for parent in parents {
                self.collect_properties(parent, out, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use serde_json::json;
    use std::path::Path;

    const MAIN: &str = r##"{
        "definitions": {
            "A": {"properties": {"p1": {"type": "string", "description": "p1"}}},
            "B": {
                "allOf": [{"$ref": "#/definitions/A"}],
                "properties": {"display": {"description": "a ref"}}
            },
            "C": {"allOf": [{"$ref": "#/definitions/B"}, {"$ref": "#/definitions/C"}]},
            "Remote": {"$ref": "common.json#/definitions/Error"}
        }
    }"##;

    const COMMON: &str = r#"{
        "parameters": {"ApiVersion": {"name": "api-version", "in": "query"}},
        "definitions": {"Error": {"properties": {"code": {"type": "string"}}}}
    }"#;

    fn with_helper(check: impl FnOnce(&SwaggerHelper<'_>)) {
        let fs = Arc::new(
            MemoryFileSystem::new()
                .with_file("/specs/main.json", MAIN)
                .with_file("/specs/common.json", COMMON),
        );
        let graph = DependencyGraph::with_base_dir(fs, "/specs");
        let document = graph.load_document(Path::new("main.json")).unwrap();
        let view = ResolvedView::new(&graph, document);
        let helper = SwaggerHelper::new(&view, &graph);
        check(&helper);
    }

    #[test]
    fn finds_properties_through_all_of() {
        with_helper(|helper| {
            let a = helper.definition("A").unwrap();
            assert_eq!(
                helper.property_of_model(a, "p1"),
                Some(&json!({"type": "string", "description": "p1"}))
            );

            let b = helper.definition("B").unwrap();
            assert_eq!(helper.property_of_model(b, "display"), Some(&json!({"description": "a ref"})));
            assert_eq!(helper.property_of_model(b, "p1").unwrap()["description"], "p1");
            assert_eq!(helper.property_of_model(b, "missing"), None);
        });
    }

    #[test]
    fn self_inheritance_terminates() {
        with_helper(|helper| {
            let c = helper.definition("C").unwrap();
            let names: Vec<_> = helper.properties_of_model(c).keys().copied().collect();
            assert_eq!(names, vec!["display", "p1"]);
            assert_eq!(helper.property_of_model(c, "nope"), None);
        });
    }

    #[test]
    fn follows_external_references() {
        with_helper(|helper| {
            let remote = helper.definition("Remote").unwrap();
            let resolved = helper.follow_reference(remote).unwrap();
            assert!(resolved.get("properties").is_some());
            assert_eq!(helper.property_of_model(remote, "error"), None);

            let resolution = helper.resolve_reference("common.json#/parameters/ApiVersion");
            assert_eq!(resolution.value().unwrap()["name"], "api-version");

            assert!(matches!(
                helper.resolve_reference("#/definitions/Nope"),
                Resolution::Unresolved(_)
            ));
        });
    }

    #[test]
    fn follow_reference_borrows_from_the_holding_document() {
        with_helper(|helper| {
            let remote = helper.definition("Remote").unwrap();
            let error = helper.follow_reference(remote).unwrap();
            let common = helper.view.documents().find(|d| d.id().to_string().ends_with("common.json")).unwrap();
            let expected = common.value_at(&JsonPath::from(["definitions", "Error"])).unwrap();
            assert!(std::ptr::eq(error, expected));
        });
    }

    #[test]
    fn resolve_at_follows_nested_references() {
        with_helper(|helper| {
            let b = helper.resolve_at(&JsonPath::from(["definitions", "B"])).unwrap();
            let parent = b.get("allOf").and_then(|all_of| all_of.index(0)).unwrap();
            assert_eq!(parent.value()["properties"]["p1"]["type"], "string");
            assert_eq!(
                parent.source().map(|(_, path)| path.to_string()),
                Some("$.definitions.A".to_string())
            );
            assert!(helper.resolve_at(&JsonPath::from(["nope"])).is_none());
        });
    }
}
