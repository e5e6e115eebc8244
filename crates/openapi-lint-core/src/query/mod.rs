//! JSONPath-style queries used to select rule targets.
//!
//! Supported syntax:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `$` | root |
//! | `.name`, `['name']`, `["name"]` | object member |
//! | `[n]` | array element (negative counts from the end) |
//! | `.*`, `[*]` | every child |
//! | `['a', 'b', 0]` | union |
//! | `..name`, `..*`, `..[...]` | recursive descent |
//! | `[?(expr)]` | children for which `expr` is truthy |
//! | `^` | parent |
//!
//! Filter expressions see the candidate as `@` and its key or index as
//! `@property`, and support member access (`@.a.b`, `@['a']`), literals,
//! `== === != !== < <= > >=`, `&&`, `||`, `!` and parentheses.
//!
//! Queries run over a [`Node`]: against a raw node they see the tree as
//! written, against a node of a [`ResolvedView`](crate::ResolvedView) every
//! step, member access in filters included, follows references.

mod eval;
mod parser;

use crate::json::JsonPath;
use crate::view::Node;

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Invalid query expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid query '{query}' at offset {offset}: {message}")]
pub struct QueryError {
    /// The expression as given.
    pub query: String,
    /// Byte offset of the problem.
    pub offset: usize,
    /// What went wrong.
    pub message: String,
}

/// A compiled query.
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    steps: Vec<parser::Step>,
}

impl Query {
    /// Compiles `expr`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if `expr` is not a valid query.
    pub fn parse(expr: &str) -> Result<Self, QueryError> {
        let steps = parser::Parser::new(expr).parse()?;
        Ok(Self {
            source: expr.to_string(),
            steps,
        })
    }

    /// The expression this query was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Runs the query against the raw tree `root`.
    #[must_use]
    pub fn matches<'a>(&self, root: &'a Value) -> QueryMatches<'a> {
        self.matches_in(&Node::raw(root))
    }

    /// Runs the query against `root`, which may be part of a resolved view.
    ///
    /// Matches come in document order. The parent operator drops repeated
    /// parents, keeping the first. Evaluation is eager: the whole match set
    /// is computed before the first match is returned.
    #[must_use]
    pub fn matches_in<'a>(&self, root: &Node<'a>) -> QueryMatches<'a> {
        QueryMatches {
            inner: eval::evaluate(&self.steps, root).into_iter(),
        }
    }
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One node selected by a query.
#[derive(Debug, Clone)]
pub struct QueryMatch<'a> {
    /// Structural path of the node, relative to the queried root.
    pub path: JsonPath,
    /// The node itself.
    pub node: Node<'a>,
}

impl<'a> QueryMatch<'a> {
    /// Value of the matched node.
    #[must_use]
    pub fn value(&self) -> &'a Value {
        self.node.value()
    }
}

/// Iterator over the matches of a query, computed up front.
#[derive(Debug)]
pub struct QueryMatches<'a> {
    inner: std::vec::IntoIter<QueryMatch<'a>>,
}

impl<'a> Iterator for QueryMatches<'a> {
    type Item = QueryMatch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for QueryMatches<'_> {}

/// Compiles `expr` and runs it against `root`.
///
/// # Errors
///
/// Returns a [`QueryError`] if `expr` is not a valid query.
pub fn query<'a>(root: &'a Value, expr: &str) -> Result<QueryMatches<'a>, QueryError> {
    Ok(Query::parse(expr)?.matches(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(root: &Value, expr: &str) -> Vec<String> {
        query(root, expr).unwrap().map(|m| m.path.to_string()).collect()
    }

    fn spec() -> Value {
        json!({
            "paths": {
                "/a": {
                    "get": {"operationId": "A_Get", "parameters": [{"in": "query", "name": "x"}]},
                    "patch": {"parameters": [{"in": "body", "name": "body", "schema": {}}]}
                },
                "/b": {
                    "get": {"operationId": "B_Get"},
                    "put": {"parameters": [{"in": "path", "name": "y"}, {"in": "body", "name": "b"}]}
                }
            },
            "definitions": {
                "Pet": {"properties": {"name": {"type": "string", "default": "x"}}}
            }
        })
    }

    #[test]
    fn wildcard_matches_in_document_order() {
        assert_eq!(
            paths(&spec(), "$.paths.*.get"),
            vec!["$.paths['/a'].get", "$.paths['/b'].get"]
        );
    }

    #[test]
    fn filters_on_member_values() {
        assert_eq!(
            paths(&spec(), "$.paths.*.*.parameters[?(@.in === 'body')]"),
            vec![
                "$.paths['/a'].patch.parameters[0]",
                "$.paths['/b'].put.parameters[1]"
            ]
        );
        assert_eq!(
            paths(&spec(), "$.paths.*.*.parameters[?(@.in == 'body' && @.schema)]"),
            vec!["$.paths['/a'].patch.parameters[0]"]
        );
    }

    #[test]
    fn property_filter_with_parent_deduplicates() {
        assert_eq!(
            paths(&spec(), "$.paths.*[?(@property === 'get')]^"),
            vec!["$.paths['/a']", "$.paths['/b']"]
        );
        assert_eq!(
            paths(&spec(), "$.paths.*.*^^"),
            vec!["$.paths"]
        );
    }

    #[test]
    fn recursive_descent_visits_every_level() {
        assert_eq!(
            paths(&spec(), "$..default"),
            vec!["$.definitions.Pet.properties.name.default"]
        );
        assert_eq!(
            paths(&spec(), "$..operationId"),
            vec!["$.paths['/a'].get.operationId", "$.paths['/b'].get.operationId"]
        );
        assert_eq!(query(&json!({"a": [1, {"b": 2}]}), "$..*").unwrap().count(), 4);
    }

    #[test]
    fn unions_and_indexes() {
        let root = json!({"a": 1, "b": 2, "list": [10, 20, 30]});
        assert_eq!(paths(&root, "$['b', 'a']"), vec!["$.b", "$.a"]);
        assert_eq!(paths(&root, "$.list[0, -1]"), vec!["$.list[0]", "$.list[2]"]);
        assert_eq!(paths(&root, "$.list[?(@ > 15)]"), vec!["$.list[1]", "$.list[2]"]);
        assert_eq!(paths(&root, "$.list[?(@property == 0)]"), vec!["$.list[0]"]);
    }

    #[test]
    fn negation_applies_before_comparison() {
        let root = json!({"items": [{"a": 5}, {"a": 0}, {}]});
        // (!@.a) == false holds only where @.a is truthy.
        assert_eq!(paths(&root, "$.items[?(!@.a == false)]"), vec!["$.items[0]"]);
        assert_eq!(paths(&root, "$.items[?(!(@.a == 5))]"), vec!["$.items[1]", "$.items[2]"]);
    }

    #[test]
    fn resolved_views_are_queried_through_references() {
        use crate::{DependencyGraph, MemoryFileSystem};
        use std::path::Path;
        use std::sync::Arc;

        let fs = Arc::new(MemoryFileSystem::new().with_file(
            "/specs/a.json",
            r##"{
                "paths": {"/a": {"patch": {"parameters": [{"$ref": "#/parameters/Body"}]}}},
                "parameters": {"Body": {"in": "body", "schema": {"$ref": "#/definitions/Pet"}}},
                "definitions": {"Pet": {"properties": {"name": {"default": "x"}}}}
            }"##,
        ));
        let graph = DependencyGraph::with_base_dir(fs, "/specs");
        let document = graph.load_document(Path::new("a.json")).unwrap();
        let expr = "$.paths.*.patch.parameters[?(@.in === 'body')].schema.properties.*.default";

        assert!(query(document.value(), expr).unwrap().next().is_none());

        let view = graph.resolved_view(document.id()).unwrap();
        let found: Vec<_> = Query::parse(expr).unwrap().matches_in(&view.root()).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].path.to_string(),
            "$.paths['/a'].patch.parameters[0].schema.properties.name.default"
        );
        assert_eq!(found[0].value(), &json!("x"));
    }

    #[test]
    fn missing_members_yield_nothing() {
        assert!(paths(&spec(), "$.nope.*").is_empty());
        assert!(paths(&spec(), "$.paths['/a'].get.parameters[5]").is_empty());
        assert!(paths(&json!(1), "$^").is_empty());
    }

    #[test]
    fn root_query_matches_root() {
        let root = json!({"schema": {"type": "object"}});
        let matches: Vec<_> = query(&root, "$").unwrap().collect();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].path.is_empty());

        let selected: Vec<_> = query(&root, "$.schema").unwrap().collect();
        assert_eq!(selected[0].value(), &json!({"type": "object"}));
    }

    #[test]
    fn invalid_queries_fail() {
        for bad in ["", "paths", "$.", "$[", "$[?(@.a ==)]", "$['a'", "$[?(@.a)", "$ x"] {
            let err = Query::parse(bad).unwrap_err();
            assert_eq!(err.query, bad);
        }
        let parsed: Query = "$.paths".parse().unwrap();
        assert_eq!(parsed.to_string(), "$.paths");
    }
}
