//! Shared output formatting for lint results.

use anyhow::Result;
use openapi_lint_core::{DependencyGraph, FormattedRecord, LintResult, RecordDiagnostic};
use serde::Serialize;
use std::path::Path;

use crate::OutputFormat;

/// Print lint results in the specified format.
pub fn print(result: &LintResult, graph: &DependencyGraph, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(result, graph),
        OutputFormat::Json => return print_json(result),
        OutputFormat::Compact => print_compact(result),
    }
    Ok(())
}

fn print_text(result: &LintResult, graph: &DependencyGraph) {
    for record in &result.records {
        match snippet(record, graph) {
            Some(diagnostic) => println!("{:?}", miette::Report::new(diagnostic)),
            None => println!("{record}\n  at {}\n", record.json_path),
        }
    }

    for failure in &result.failures {
        println!("\x1b[31merror\x1b[0m: {}: {}", failure.document, failure.message);
    }
    for warning in &result.reference_warnings {
        println!("\x1b[33mwarning\x1b[0m: {warning}");
    }

    let (errors, warnings, infos) = result.count_by_severity();
    let summary_color = if errors > 0 || !result.failures.is_empty() {
        "\x1b[31m"
    } else if warnings > 0 {
        "\x1b[33m"
    } else {
        "\x1b[32m"
    };

    println!(
        "{}Found {} error(s), {} warning(s), {} info(s) in {} document(s)\x1b[0m",
        summary_color, errors, warnings, infos, result.documents_checked
    );
}

/// Pairs a record with the text of its document for miette rendering.
fn snippet(record: &FormattedRecord, graph: &DependencyGraph) -> Option<RecordDiagnostic> {
    let document = source_document(record)?;
    let loaded = graph.get_document(Path::new(document)).ok()?;
    Some(RecordDiagnostic::new(record, document, loaded.content()))
}

/// Document part of the first `<document>:<line>:<column>` source.
fn source_document(record: &FormattedRecord) -> Option<&str> {
    record.sources.first()?.rsplitn(3, ':').nth(2)
}

#[derive(Serialize)]
struct Summary {
    errors: usize,
    warnings: usize,
    infos: usize,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    result: &'a LintResult,
    summary: Summary,
}

fn print_json(result: &LintResult) -> Result<()> {
    let (errors, warnings, infos) = result.count_by_severity();
    let report = JsonReport {
        result,
        summary: Summary {
            errors,
            warnings,
            infos,
        },
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_compact(result: &LintResult) {
    for record in &result.records {
        let source = record.sources.first().map_or("<unknown>", String::as_str);
        println!(
            "{}: {} [{}] {}",
            source,
            record.severity,
            record.code,
            record.message,
        );
    }
    for failure in &result.failures {
        println!("{}: error [parse] {}", failure.document, failure.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapi_lint_core::{Position, Severity, Span};

    fn record(sources: Vec<String>) -> FormattedRecord {
        let start = Position::new(2, 3, 4);
        FormattedRecord {
            severity: Severity::Warning,
            code: "PageableOperation".into(),
            message: "might be pageable".into(),
            id: "R2029".into(),
            validation_category: "SDKViolation".into(),
            provider_namespace: None,
            resource_type: None,
            sources,
            json_path: "$.paths['/widgets'].get".into(),
            location: start,
            range: Span::new(start, Position::new(2, 5, 6)),
        }
    }

    #[test]
    fn source_document_strips_position() {
        let r = record(vec!["/specs/a.json:2:3".into()]);
        assert_eq!(source_document(&r), Some("/specs/a.json"));

        let windows = record(vec![r"C:\specs\a.json:2:3".into()]);
        assert_eq!(source_document(&windows), Some(r"C:\specs\a.json"));

        assert_eq!(source_document(&record(Vec::new())), None);
    }

    #[test]
    fn json_report_flattens_result() {
        let mut result = LintResult::new();
        result.records.push(record(vec!["/specs/a.json:2:3".into()]));
        result.documents_checked = 1;

        let report = JsonReport {
            result: &result,
            summary: Summary {
                errors: 0,
                warnings: 1,
                infos: 0,
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["records"][0]["code"], "PageableOperation");
        assert_eq!(value["records"][0]["json-path"], "$.paths['/widgets'].get");
        assert_eq!(value["summary"]["warnings"], 1);
        assert_eq!(value["documents_checked"], 1);
    }
}
