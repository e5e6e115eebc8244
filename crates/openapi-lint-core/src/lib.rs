//! # openapi-lint-core
//!
//! Core engine for linting OpenAPI/Swagger documents.
//!
//! This crate provides:
//!
//! - a JSON parser that records the source span of every value ([`json`])
//! - a [`DependencyGraph`] that loads documents once and resolves `$ref`
//!   pointers across files, cycles included
//! - a lazy [`ResolvedView`] that follows references while it is walked
//! - a JSONPath-style [`Query`] language for selecting rule targets
//! - a [`Runner`] that executes a [`RuleSet`] and maps findings back to
//!   line/column positions
//!
//! ## Example
//!
//! ```ignore
//! use openapi_lint_core::{Finding, Rule, Runner};
//!
//! let rule = Rule::builder("R0001", "NoEmptyPaths")
//!     .given("$.paths")
//!     .legacy(|paths, ctx| {
//!         Ok(match paths.value().as_object() {
//!             Some(map) if map.is_empty() => vec![Finding::new("no paths", ctx.location.clone())],
//!             _ => Vec::new(),
//!         })
//!     })
//!     .build()?;
//!
//! let result = Runner::builder().rule(rule).build().execute(&["network.json".into()]);
//! for record in &result.records {
//!     println!("{record}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod document;
mod formatter;
mod fs;
mod graph;
mod resolver;
mod rule;
mod runner;
mod swagger;
mod types;
mod view;

pub mod json;
pub mod query;

pub use config::{AnalyzerConfig, Config, ConfigError, RuleConfig};
pub use context::RuleContext;
pub use document::{Document, DocumentError, DocumentId};
pub use formatter::{Formatter, JsonFormatter};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use graph::{DependencyGraph, GraphError};
pub use json::{JsonPath, PathSegment, Position, Span};
pub use query::{query, Query, QueryError, QueryMatch, QueryMatches};
pub use resolver::{ReferenceEdge, ReferenceError, ReferenceTable, ReferenceTarget, Resolution, Resolver, REF_KEY};
pub use rule::{
    Finding, FindingStream, LegacyFn, OpenApiType, OpenApiTypes, Rule, RuleBuilder, RuleDefinitionError,
    RuleFault, RuleFunction, RuleSet, StreamingFn,
};
pub use runner::{Runner, RunnerBuilder};
pub use swagger::SwaggerHelper;
pub use types::{
    Diagnostic, DocumentFailure, FormattedRecord, LintResult, ProviderInfo, RecordDiagnostic, Severity,
};
pub use view::{Node, ResolvedView};
