//! Mapping diagnostics back to source positions.

use crate::graph::DependencyGraph;
use crate::json::Span;
use crate::types::{Diagnostic, FormattedRecord};

use tracing::warn;

/// Converts diagnostics into output records.
pub trait Formatter {
    /// Record type produced.
    type Output;

    /// Formats `diagnostics`, keeping their order.
    fn format(&self, diagnostics: &[Diagnostic]) -> Vec<Self::Output>;
}

/// Produces [`FormattedRecord`]s with line/column ranges.
#[derive(Debug, Clone, Copy)]
pub struct JsonFormatter<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> JsonFormatter<'g> {
    /// Creates a formatter looking documents up in `graph`.
    #[must_use]
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Formats one diagnostic.
    ///
    /// Paths without a recorded position (e.g. built by a rule below a
    /// scalar) fall back to the closest recorded ancestor.
    #[must_use]
    pub fn format_one(&self, diagnostic: &Diagnostic) -> FormattedRecord {
        let path = diagnostic.path.strip_root_marker();

        let span = match self.graph.get_document(diagnostic.document.path()) {
            Ok(document) => match document.position_from_path(&path) {
                Ok(span) => span,
                Err(e) => {
                    let nearest = document.nearest_position(&path);
                    match &nearest {
                        Some((ancestor, _)) => warn!("{e}; using {ancestor}"),
                        None => warn!("{e}"),
                    }
                    nearest.map(|(_, span)| span).unwrap_or_default()
                }
            },
            Err(e) => {
                warn!("Cannot locate diagnostic of {}: {e}", diagnostic.rule_name);
                Span::default()
            }
        };

        FormattedRecord {
            severity: diagnostic.severity,
            code: diagnostic.rule_name.clone(),
            message: diagnostic.message.clone(),
            id: diagnostic.rule_id.clone(),
            validation_category: diagnostic.category.clone(),
            provider_namespace: diagnostic.provider.namespace.clone(),
            resource_type: diagnostic.provider.resource_type.clone(),
            sources: vec![format!(
                "{}:{}:{}",
                diagnostic.document, span.start.line, span.start.column
            )],
            json_path: path.to_string(),
            location: span.start,
            range: span,
        }
    }
}

impl Formatter for JsonFormatter<'_> {
    type Output = FormattedRecord;

    fn format(&self, diagnostics: &[Diagnostic]) -> Vec<FormattedRecord> {
        diagnostics.iter().map(|d| self.format_one(d)).collect()
    }
}
