//! JSON parsing with source positions.
//!
//! The parser produces a plain [`serde_json::Value`] (member order preserved)
//! together with a [`PositionIndex`] mapping every [`JsonPath`] of the tree to
//! the span of its value token.

mod parser;
mod path;
mod position;

pub use parser::{parse, ParseError, ParsedJson, MAX_DEPTH};
pub use path::{JsonPath, PathSegment, ROOT_MARKER};
pub use position::{Position, PositionIndex, Span};
