//! Check command implementation.

use anyhow::{Context, Result};
use openapi_lint_core::{OpenApiType, RuleSet, Runner};
use openapi_lint_rules::default_rules;
use std::path::{Path, PathBuf};

use crate::config_resolver::ConfigSource;
use crate::OutputFormat;

/// Flags of `openapi-lint check`.
#[derive(Debug, Default)]
pub struct CheckOptions {
    /// Output format.
    pub format: OutputFormat,
    /// Overrides `[analyzer] openapi_type`.
    pub openapi_type: Option<OpenApiType>,
    /// Comma-separated rule names or ids to keep.
    pub rules: Option<String>,
    /// Path substrings to skip while expanding directories.
    pub exclude: Vec<String>,
}

/// Runs the check command.
pub fn run(paths: &[PathBuf], options: &CheckOptions, source: &ConfigSource) -> Result<()> {
    let config = source.load()?;
    let fail_on = config.analyzer.fail_on();

    let mut rules = default_rules().context("Failed to build built-in rules")?;
    if let Some(filter) = &options.rules {
        filter_rules(&mut rules, filter);
    }

    let documents = discover_documents(paths, &options.exclude)?;
    if documents.is_empty() {
        tracing::warn!("No JSON documents found under {:?}", paths);
    }

    let mut builder = Runner::builder().config(config).rules(rules);
    if let Some(kind) = options.openapi_type {
        builder = builder.openapi_type(kind);
    }
    let runner = builder.build();

    let result = runner.execute(&documents);

    super::output::print(&result, runner.graph(), options.format)?;

    if result.is_failure(fail_on) {
        std::process::exit(1);
    }

    Ok(())
}

/// Keeps the rules named in `filter`; ids are accepted too.
fn filter_rules(rules: &mut RuleSet, filter: &str) {
    let mut names = Vec::new();
    for wanted in filter.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match rules.iter().find(|r| r.name() == wanted || r.id() == wanted) {
            Some(rule) => names.push(rule.name().to_string()),
            None => tracing::warn!("Unknown rule: {}", wanted),
        }
    }
    rules.retain_names(names.as_slice());
}

/// Expands directories to the `.json` files below them, sorted; files are
/// kept as given.
fn discover_documents(paths: &[PathBuf], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for path in paths {
        if path.is_dir() {
            documents.extend(walk_json(path, exclude)?);
        } else {
            documents.push(path.clone());
        }
    }
    Ok(documents)
}

fn walk_json(root: &Path, exclude: &[String]) -> Result<Vec<PathBuf>> {
    let mut builder = ignore::WalkBuilder::new(root);
    builder.hidden(false).git_ignore(true);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy();
        if exclude.iter().any(|pattern| !pattern.is_empty() && relative.contains(pattern.as_str())) {
            tracing::debug!("Excluded: {}", path.display());
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}
