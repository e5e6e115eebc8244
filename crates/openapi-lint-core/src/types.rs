//! Diagnostics, formatted records and run results.

use crate::document::DocumentId;
use crate::graph::GraphError;
use crate::json::{JsonPath, Position, Span};
use crate::resolver::ReferenceError;

use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message, does not fail lint.
    Info,
    /// Warning that should be addressed.
    Warning,
    /// Error that must be fixed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Provider namespace and resource type derived from an operation path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// e.g. `Microsoft.Network`.
    pub namespace: Option<String>,
    /// e.g. `applicationGateways`.
    pub resource_type: Option<String>,
}

impl ProviderInfo {
    /// Extracts provider details from a finding location.
    ///
    /// Only locations under `paths` carry them: the URL template is split on
    /// `/` and the two components after `providers` are returned.
    #[must_use]
    pub fn from_path(path: &JsonPath) -> Self {
        let path = path.strip_root_marker();
        let segments = path.segments();
        if segments.first().and_then(|s| s.as_key()) != Some("paths") {
            return Self::default();
        }
        let Some(template) = segments.get(1).and_then(|s| s.as_key()) else {
            return Self::default();
        };

        let mut tail = template.split('/').skip_while(|c| *c != "providers").skip(1);
        Self {
            namespace: tail.next().map(String::from),
            resource_type: tail.next().map(String::from),
        }
    }
}

/// One rule violation, not yet mapped to source positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Rule id (e.g. `R2029`).
    pub rule_id: String,
    /// Rule name (e.g. `PageableOperation`).
    pub rule_name: String,
    /// Severity after configuration overrides.
    pub severity: Severity,
    /// Validation category.
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// Document the violation is in.
    pub document: DocumentId,
    /// Location inside the document.
    pub path: JsonPath,
    /// Provider details, when the location is under an ARM path.
    #[serde(flatten)]
    pub provider: ProviderInfo,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} [{} {}] {}",
            self.document, self.path, self.severity, self.rule_id, self.rule_name, self.message
        )
    }
}

/// A diagnostic mapped back to its source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedRecord {
    /// Severity.
    #[serde(rename = "type")]
    pub severity: Severity,
    /// Rule name.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Rule id.
    pub id: String,
    /// Validation category.
    #[serde(rename = "validationCategory")]
    pub validation_category: String,
    /// Provider namespace, when derivable.
    #[serde(rename = "providerNamespace", skip_serializing_if = "Option::is_none")]
    pub provider_namespace: Option<String>,
    /// Resource type, when derivable.
    #[serde(rename = "resourceType", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// `<document>:<line>:<column>` strings.
    pub sources: Vec<String>,
    /// Canonical path, e.g. `$.paths['/foo'].patch`.
    #[serde(rename = "json-path")]
    pub json_path: String,
    /// Start of the located node.
    pub location: Position,
    /// Span of the located node.
    pub range: Span,
}

impl fmt::Display for FormattedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.sources.first().map_or("<unknown>", String::as_str);
        write!(
            f,
            "{source}: {} [{} {}] {}",
            self.severity, self.id, self.code, self.message
        )
    }
}

/// A record rendered through miette, with the offending source snippet.
#[derive(Debug, thiserror::Error, MietteDiagnostic)]
#[error("[{id}] {message}")]
pub struct RecordDiagnostic {
    id: String,
    message: String,
    #[source_code]
    source_code: NamedSource<String>,
    #[label("{code}")]
    span: SourceSpan,
    code: String,
    #[help]
    help: Option<String>,
}

impl RecordDiagnostic {
    /// Pairs `record` with the text of the document it points into.
    #[must_use]
    pub fn new(record: &FormattedRecord, document_name: &str, content: impl Into<String>) -> Self {
        Self {
            id: record.id.clone(),
            message: record.message.clone(),
            source_code: NamedSource::new(document_name, content.into()),
            span: record.range.into(),
            code: record.code.clone(),
            help: Some(format!("{} ({})", record.json_path, record.validation_category)),
        }
    }
}

/// A document that could not be linted at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    /// Document that failed.
    pub document: DocumentId,
    /// Why.
    pub message: String,
}

impl From<&GraphError> for DocumentFailure {
    fn from(e: &GraphError) -> Self {
        Self {
            document: e.document().clone(),
            message: e.to_string(),
        }
    }
}

/// Result of a lint run.
#[derive(Debug, Default, Serialize)]
pub struct LintResult {
    /// Location-resolved records, in discovery order.
    pub records: Vec<FormattedRecord>,
    /// Documents that could not be read or parsed.
    pub failures: Vec<DocumentFailure>,
    /// References that could not be resolved.
    pub reference_warnings: Vec<ReferenceError>,
    /// Number of documents rules ran against.
    pub documents_checked: usize,
}

impl LintResult {
    /// Creates a new empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if any record meets or exceeds the given severity.
    #[must_use]
    pub fn has_records_at(&self, severity: Severity) -> bool {
        self.records.iter().any(|r| r.severity >= severity)
    }

    /// Whether the run should fail: records at or above `fail_on`, or a
    /// document that could not be linted.
    #[must_use]
    pub fn is_failure(&self, fail_on: Severity) -> bool {
        self.has_records_at(fail_on) || !self.failures.is_empty()
    }

    /// Counts records as `(errors, warnings, infos)`.
    #[must_use]
    pub fn count_by_severity(&self) -> (usize, usize, usize) {
        let count = |severity| self.records.iter().filter(|r| r.severity == severity).count();
        (
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Info),
        )
    }
}
