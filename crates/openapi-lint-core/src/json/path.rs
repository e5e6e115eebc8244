//! Structural paths into a parsed JSON tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Marker some callers put in front of a path to denote the document root.
pub const ROOT_MARKER: &str = "$";

/// One step of a [`JsonPath`]: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index.
    Index(usize),
    /// Object member name.
    Key(String),
}

impl PathSegment {
    /// Returns the key if this segment is an object member name.
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Index(_) => None,
        }
    }

    /// Returns the index if this segment is an array index.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Ordered key/index sequence identifying a node in a parsed tree.
///
/// The empty path is the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath(Vec<PathSegment>);

impl JsonPath {
    /// The root path.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns the segments of this path.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment.into());
        Self(segments)
    }

    /// Appends a segment in place.
    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    /// Removes and returns the last segment.
    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Returns the last segment.
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Concatenates `other` onto this path.
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut segments = self.0.clone();
        segments.extend_from_slice(&other.0);
        Self(segments)
    }

    /// Whether `prefix` is an ancestor of (or equal to) this path.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Drops a leading `$` root marker if present.
    #[must_use]
    pub fn strip_root_marker(&self) -> Self {
        match self.0.first() {
            Some(PathSegment::Key(k)) if k == ROOT_MARKER => Self(self.0[1..].to_vec()),
            _ => self.clone(),
        }
    }

    /// Looks up the node this path designates in `root`.
    #[must_use]
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(root, |node, segment| match (node, segment) {
            (Value::Object(map), PathSegment::Key(k)) => map.get(k),
            (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
            _ => None,
        })
    }

    /// Joins the segments with `.` (e.g. `paths./foo.patch.parameters.0`).
    #[must_use]
    pub fn to_dotted(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Renders this path as a same-document JSON Pointer fragment (`#/a/b`).
    #[must_use]
    pub fn to_pointer(&self) -> String {
        let mut pointer = String::from("#");
        for segment in &self.0 {
            pointer.push('/');
            match segment {
                PathSegment::Index(i) => pointer.push_str(&i.to_string()),
                PathSegment::Key(k) => pointer.push_str(&k.replace('~', "~0").replace('/', "~1")),
            }
        }
        pointer
    }
}

impl fmt::Display for JsonPath {
    /// Canonical JSONPath form: `$.paths['/foo'].patch.parameters[0]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ROOT_MARKER)?;
        for segment in &self.0 {
            match segment {
                PathSegment::Index(i) => write!(f, "[{i}]")?,
                PathSegment::Key(k) if is_identifier(k) => write!(f, ".{k}")?,
                PathSegment::Key(k) => write!(f, "['{}']", k.replace('\\', "\\\\").replace('\'', "\\'"))?,
            }
        }
        Ok(())
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl From<Vec<PathSegment>> for JsonPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl<S: Into<PathSegment>, const N: usize> From<[S; N]> for JsonPath {
    fn from(segments: [S; N]) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for JsonPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a JsonPath {
    type Item = &'a PathSegment;
    type IntoIter = std::slice::Iter<'a, PathSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch_schema_path() -> JsonPath {
        JsonPath::from(vec![
            "paths".into(),
            "/foo".into(),
            "patch".into(),
            "parameters".into(),
            0usize.into(),
            "schema".into(),
        ])
    }

    #[test]
    fn display_uses_brackets_for_non_identifiers() {
        insta::assert_snapshot!(patch_schema_path().to_string(), @"$.paths['/foo'].patch.parameters[0].schema");
    }

    #[test]
    fn display_escapes_quotes() {
        let path = JsonPath::from(["it's"]);
        assert_eq!(path.to_string(), r"$['it\'s']");
    }

    #[test]
    fn dotted_form() {
        assert_eq!(
            patch_schema_path().to_dotted(),
            "paths./foo.patch.parameters.0.schema"
        );
    }

    #[test]
    fn pointer_escapes_slash_and_tilde() {
        let path = JsonPath::from(["paths", "/a~b"]);
        assert_eq!(path.to_pointer(), "#/paths/~1a~0b");
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let doc = json!({"a": [{"b": 1}]});
        let path = JsonPath::from(vec!["a".into(), 0usize.into(), "b".into()]);
        assert_eq!(path.get(&doc), Some(&json!(1)));
        assert_eq!(JsonPath::from(["a", "b"]).get(&doc), None);
    }

    #[test]
    fn strip_root_marker_only_strips_leading_dollar() {
        let path = JsonPath::from(["$", "paths"]);
        assert_eq!(path.strip_root_marker(), JsonPath::from(["paths"]));
        let path = JsonPath::from(["paths", "$"]);
        assert_eq!(path.strip_root_marker(), path);
    }

    #[test]
    fn parent_and_starts_with() {
        let path = JsonPath::from(["a", "b"]);
        assert_eq!(path.parent(), Some(JsonPath::from(["a"])));
        assert_eq!(JsonPath::root().parent(), None);
        assert!(path.starts_with(&JsonPath::from(["a"])));
        assert!(path.starts_with(&JsonPath::root()));
        assert!(!JsonPath::from(["a"]).starts_with(&path));
    }

    #[test]
    fn serializes_as_mixed_array() {
        let path = JsonPath::from(vec!["a".into(), 2usize.into()]);
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["a", 2]));
    }
}
