//! Context handed to rule functions.

use crate::document::DocumentId;
use crate::graph::DependencyGraph;
use crate::json::JsonPath;
use crate::swagger::SwaggerHelper;
use crate::view::Node;

/// Everything a rule function may consult besides the node it was given.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Root of the tree the rule's queries ran against (resolved or raw).
    pub document: &'a Node<'a>,
    /// Path of the node handed to the rule, relative to `document`.
    pub location: &'a JsonPath,
    /// Document being linted.
    pub document_id: &'a DocumentId,
    /// Graph owning every loaded document.
    pub graph: &'a DependencyGraph,
    /// Reference-following helpers bound to the document.
    pub utils: &'a SwaggerHelper<'a>,
}

impl<'a> RuleContext<'a> {
    /// Path of a node below the rule's location.
    #[must_use]
    pub fn path_to(&self, relative: &JsonPath) -> JsonPath {
        self.location.concat(relative)
    }
}
