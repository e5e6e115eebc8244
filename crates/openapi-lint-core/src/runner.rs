//! Rule execution across loaded documents.

use crate::config::Config;
use crate::context::RuleContext;
use crate::document::Document;
use crate::formatter::{Formatter, JsonFormatter};
use crate::fs::{FileSystem, OsFileSystem};
use crate::graph::{DependencyGraph, GraphError};
use crate::json::JsonPath;
use crate::query::QueryMatch;
use crate::resolver::ReferenceError;
use crate::rule::{Finding, OpenApiType, OpenApiTypes, Rule, RuleFault, RuleSet};
use crate::swagger::SwaggerHelper;
use crate::types::{Diagnostic, DocumentFailure, LintResult, ProviderInfo, Severity};
use crate::view::{Node, ResolvedView};

use rayon::prelude::*;
use rayon::ThreadPool;
use serde_json::Value;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builder for configuring a [`Runner`].
#[derive(Default)]
pub struct RunnerBuilder {
    fs: Option<Arc<dyn FileSystem>>,
    base_dir: Option<PathBuf>,
    rules: RuleSet,
    config: Option<Config>,
    openapi_type: Option<OpenApiType>,
    parallelism: Option<usize>,
}

impl RunnerBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets where documents are read from (default: the local disk).
    #[must_use]
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Sets the directory relative document paths are resolved against.
    #[must_use]
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Adds a rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.insert(rule);
        self
    }

    /// Adds every rule of `rules`, in order.
    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        for rule in rules {
            self.rules.insert(rule);
        }
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the configured description type.
    #[must_use]
    pub fn openapi_type(mut self, kind: OpenApiType) -> Self {
        self.openapi_type = Some(kind);
        self
    }

    /// Overrides the configured worker count.
    #[must_use]
    pub fn parallelism(mut self, workers: usize) -> Self {
        self.parallelism = Some(workers);
        self
    }

    /// Builds the runner and its (empty) dependency graph.
    #[must_use]
    pub fn build(self) -> Runner {
        let mut config = self.config.unwrap_or_default();
        if let Some(kind) = self.openapi_type {
            config.analyzer.openapi_type = kind;
        }
        if let Some(workers) = self.parallelism {
            config.analyzer.parallelism = Some(workers);
        }

        let fs = self.fs.unwrap_or_else(|| Arc::new(OsFileSystem));
        let graph = match self.base_dir {
            Some(dir) => DependencyGraph::with_base_dir(fs, dir),
            None => DependencyGraph::new(fs),
        };

        Runner {
            graph: Arc::new(graph),
            rules: self.rules,
            config,
        }
    }
}

/// Drives every applicable rule across every loaded document.
///
/// Use [`Runner::builder()`] to construct an instance.
pub struct Runner {
    graph: Arc<DependencyGraph>,
    rules: RuleSet,
    config: Config,
}

impl Runner {
    /// Creates a new builder for configuring a runner.
    #[must_use]
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    /// The graph documents are loaded into.
    #[must_use]
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    /// The registered rules.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Loads `paths`, runs the rules on each and formats the diagnostics.
    ///
    /// Documents that cannot be read or parsed are reported in
    /// [`LintResult::failures`]; the others are still linted.
    #[must_use]
    pub fn execute(&self, paths: &[PathBuf]) -> LintResult {
        let workers = self.config.analyzer.effective_parallelism();
        info!(
            "Linting {} document(s) as {} with {} rule(s)",
            paths.len(),
            self.config.analyzer.openapi_type,
            self.rules.len()
        );

        let pool = worker_pool(workers);
        let loaded = map_ordered(pool.as_ref(), paths, |path| self.graph.load_document(path));

        let mut result = LintResult::new();
        let mut documents = Vec::new();
        let mut seen = HashSet::new();
        for outcome in loaded {
            match outcome {
                Ok(document) => {
                    if seen.insert(document.id().clone()) {
                        documents.push(document);
                    }
                }
                Err(e) => {
                    warn!("{e}");
                    let failure = DocumentFailure::from(&e);
                    if !result.failures.contains(&failure) {
                        result.failures.push(failure);
                    }
                }
            }
        }

        let diagnostics: Vec<Diagnostic> = map_ordered(pool.as_ref(), &documents, |document| self.run_document(document))
            .into_iter()
            .flatten()
            .collect();

        result.reference_warnings = self.reference_warnings();
        result.records = JsonFormatter::new(&self.graph).format(&diagnostics);
        result.documents_checked = documents.len();

        info!(
            "Lint complete: {} record(s) in {} document(s), {} failure(s)",
            result.records.len(),
            result.documents_checked,
            result.failures.len()
        );
        result
    }

    /// Loads and lints a single document, returning raw diagnostics.
    ///
    /// # Errors
    ///
    /// Returns the graph error if the document cannot be loaded.
    pub fn lint_path(&self, path: &Path) -> Result<Vec<Diagnostic>, GraphError> {
        let document = self.graph.load_document(path)?;
        Ok(self.run_document(&document))
    }

    /// Runs every applicable rule against one loaded document.
    #[must_use]
    pub fn run_document(&self, document: &Arc<Document>) -> Vec<Diagnostic> {
        let run_types = OpenApiTypes::from(self.config.analyzer.openapi_type);
        let rules: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| {
                if !rule.openapi_type().intersects(run_types) {
                    return false;
                }
                if !self.config.is_rule_enabled(rule.name()) {
                    debug!("Skipping disabled rule: {}", rule.name());
                    return false;
                }
                true
            })
            .collect();

        debug!("Running {} rule(s) on {}", rules.len(), document.id());

        let view = ResolvedView::new(&self.graph, Arc::clone(document));
        let resolved_root = view.root();
        let raw_root = Node::raw(document.value());
        let utils = SwaggerHelper::new(&view, &self.graph);
        let mut diagnostics = Vec::new();

        for rule in rules {
            let tree = if rule.resolved() { &resolved_root } else { &raw_root };
            let options = rule.merged_options(&self.config.rule_options(rule.name()));
            let severity = self
                .config
                .rule_severity(rule.name())
                .unwrap_or_else(|| rule.severity());

            for target in targets(rule, tree) {
                let ctx = RuleContext {
                    document: tree,
                    location: &target.path,
                    document_id: document.id(),
                    graph: &self.graph,
                    utils: &utils,
                };
                let (findings, fault) = invoke_isolated(rule, target.node.clone(), &options, ctx);

                diagnostics.extend(
                    findings
                        .into_iter()
                        .map(|finding| diagnostic(rule, severity, document, finding)),
                );
                if let Some(fault) = fault {
                    error!("Rule {} failed on {} at {}: {fault}", rule.name(), document.id(), target.path);
                    let finding = Finding::new(format!("Rule {} failed: {fault}", rule.name()), target.path.clone());
                    diagnostics.push(diagnostic(rule, Severity::Error, document, finding));
                }
            }
        }

        diagnostics
    }

    fn reference_warnings(&self) -> Vec<ReferenceError> {
        self.graph
            .documents()
            .iter()
            .filter_map(|document| document.references())
            .flat_map(|table| table.unresolved().iter().cloned())
            .collect()
    }
}

/// Nodes a rule runs on: `given` matches, narrowed by the field selector.
fn targets<'a>(rule: &Rule, tree: &Node<'a>) -> Vec<QueryMatch<'a>> {
    let given: Vec<QueryMatch<'a>> = if rule.given().is_empty() {
        vec![QueryMatch {
            path: JsonPath::root(),
            node: tree.clone(),
        }]
    } else {
        rule.given().iter().flat_map(|query| query.matches_in(tree)).collect()
    };

    let Some(selector) = rule.field_selector() else {
        return given;
    };
    given
        .into_iter()
        .flat_map(|section| {
            selector
                .matches_in(&section.node)
                .map(|sub| QueryMatch {
                    path: section.path.concat(&sub.path),
                    node: sub.node,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Consumes the rule's findings, stopping at the first fault or panic.
///
/// Findings produced before the failure are kept.
fn invoke_isolated(rule: &Rule, target: Node<'_>, options: &Value, ctx: RuleContext<'_>) -> (Vec<Finding>, Option<RuleFault>) {
    let mut findings = Vec::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        for item in rule.function().invoke(target, options, ctx) {
            match item {
                Ok(finding) => findings.push(finding),
                Err(fault) => return Some(fault),
            }
        }
        None
    }));

    let fault = match outcome {
        Ok(fault) => fault,
        Err(payload) => Some(RuleFault::Panic(panic_message(payload.as_ref()))),
    };
    (findings, fault)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn diagnostic(rule: &Rule, severity: Severity, document: &Document, finding: Finding) -> Diagnostic {
    Diagnostic {
        rule_id: rule.id().to_string(),
        rule_name: rule.name().to_string(),
        severity,
        category: rule.category().to_string(),
        message: finding.message,
        document: document.id().clone(),
        provider: ProviderInfo::from_path(&finding.location),
        path: finding.location,
    }
}

/// Thread pool for `workers` threads; `None` means run on the calling thread.
fn worker_pool(workers: usize) -> Option<ThreadPool> {
    if workers <= 1 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Failed to start {workers} worker(s), linting sequentially: {e}");
            None
        }
    }
}

/// Maps `items` on `pool`, keeping input order.
fn map_ordered<T, R, F>(pool: Option<&ThreadPool>, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    match pool {
        Some(pool) if items.len() > 1 => pool.install(|| items.par_iter().map(f).collect()),
        _ => items.iter().map(f).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::rule::FindingStream;
    use serde_json::json;

    const SPEC: &str = r#"{
        "swagger": "2.0",
        "paths": {
            "/a": {"get": {"operationId": "A_Get"}},
            "/b": {"get": {"operationId": "b_get"}}
        }
    }"#;

    fn lowercase_operation_ids(value: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleFault> {
        let id = value.value().as_str().unwrap_or_default();
        if id.chars().next().is_some_and(char::is_lowercase) {
            return Ok(vec![Finding::new(format!("'{id}' should be PascalCase"), ctx.location.clone())]);
        }
        Ok(Vec::new())
    }

    fn operation_rule() -> Rule {
        Rule::builder("T001", "OperationIdCasing")
            .given("$.paths.*.get")
            .field_selector("$.operationId")
            .legacy(lowercase_operation_ids)
            .build()
            .unwrap()
    }

    fn faulting<'a>(_: Node<'a>, _: &'a Value, ctx: RuleContext<'a>) -> FindingStream<'a> {
        let first = Finding::new("before the fault", ctx.location.clone());
        Box::new(vec![Ok(first), Err(RuleFault::Message("boom".into()))].into_iter())
    }

    fn panicking(_: Node<'_>, _: &RuleContext<'_>) -> Result<Vec<Finding>, RuleFault> {
        panic!("rule bug");
    }

    fn runner(rules: Vec<Rule>, config: Config) -> Runner {
        let fs = Arc::new(MemoryFileSystem::new().with_file("/specs/a.json", SPEC));
        rules
            .into_iter()
            .fold(Runner::builder(), RunnerBuilder::rule)
            .file_system(fs)
            .base_dir("/specs")
            .config(config)
            .build()
    }

    #[test]
    fn targets_apply_field_selector() {
        let rule = operation_rule();
        let tree: Value = serde_json::from_str(SPEC).unwrap();
        let paths: Vec<String> = targets(&rule, &Node::raw(&tree)).iter().map(|t| t.path.to_dotted()).collect();
        assert_eq!(paths, vec!["paths./a.get.operationId", "paths./b.get.operationId"]);
    }

    #[test]
    fn reports_findings_with_rule_metadata() {
        let result = runner(vec![operation_rule()], Config::default()).execute(&[PathBuf::from("a.json")]);
        assert_eq!(result.documents_checked, 1);
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.id, "T001");
        assert_eq!(record.code, "OperationIdCasing");
        assert_eq!(record.severity, Severity::Warning);
        assert_eq!(record.json_path, "$.paths['/b'].get.operationId");
        assert_eq!(record.location.line, 5);
    }

    #[test]
    fn config_disables_and_overrides() {
        let mut config = Config::parse("[rules.OperationIdCasing]\nseverity = \"error\"").unwrap();
        let result = runner(vec![operation_rule()], config.clone()).execute(&[PathBuf::from("a.json")]);
        assert_eq!(result.records[0].severity, Severity::Error);

        config = Config::parse("[rules.OperationIdCasing]\nenabled = false").unwrap();
        let result = runner(vec![operation_rule()], config).execute(&[PathBuf::from("a.json")]);
        assert!(result.records.is_empty());
    }

    #[test]
    fn openapi_type_filters_rules() {
        fn arm_only() -> Rule {
            Rule::builder("T002", "ArmOnly")
                .openapi_type(OpenApiTypes::ARM)
                .legacy(|_, ctx| Ok(vec![Finding::new("arm", ctx.location.clone())]))
                .build()
                .unwrap()
        }

        let diagnostics = runner(vec![arm_only()], Config::default())
            .lint_path(Path::new("a.json"))
            .unwrap();
        assert!(diagnostics.is_empty());

        let mut config = Config::default();
        config.analyzer.openapi_type = OpenApiType::Arm;
        let diagnostics = runner(vec![arm_only()], config).lint_path(Path::new("a.json")).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].path.is_empty());
    }

    #[test]
    fn faults_are_isolated() {
        let streaming = Rule::builder("T003", "Faulting").streaming(faulting).build().unwrap();
        let panics = Rule::builder("T004", "Panicking").legacy(panicking).build().unwrap();
        let diagnostics = runner(vec![streaming, panics, operation_rule()], Config::default())
            .lint_path(Path::new("a.json"))
            .unwrap();

        let summary: Vec<(&str, Severity, &str)> = diagnostics
            .iter()
            .map(|d| (d.rule_name.as_str(), d.severity, d.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Faulting", Severity::Warning, "before the fault"),
                ("Faulting", Severity::Error, "Rule Faulting failed: boom"),
                ("Panicking", Severity::Error, "Rule Panicking failed: rule panicked: rule bug"),
                ("OperationIdCasing", Severity::Warning, "'b_get' should be PascalCase"),
            ]
        );
    }

    #[test]
    fn options_reach_streaming_functions() {
        fn echo<'a>(_: Node<'a>, options: &'a Value, ctx: RuleContext<'a>) -> FindingStream<'a> {
            let message = options["greeting"].as_str().unwrap_or("none").to_string();
            Box::new(std::iter::once(Ok(Finding::new(message, ctx.location.clone()))))
        }
        let rule = Rule::builder("T005", "Echo")
            .options(json!({"greeting": "hello"}))
            .streaming(echo)
            .build()
            .unwrap();
        let config = Config::parse("[rules.Echo]\ngreeting = \"hi\"").unwrap();
        let diagnostics = runner(vec![rule], config).lint_path(Path::new("a.json")).unwrap();
        assert_eq!(diagnostics[0].message, "hi");
    }

    #[test]
    fn missing_documents_are_failures() {
        let result = runner(vec![operation_rule()], Config::default())
            .execute(&[PathBuf::from("a.json"), PathBuf::from("missing.json"), PathBuf::from("a.json")]);
        assert_eq!(result.documents_checked, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].document.to_string(), "/specs/missing.json");
        assert!(result.is_failure(Severity::Error));
    }

    #[test]
    fn worker_pool_keeps_input_order() {
        let items: Vec<usize> = (0..37).collect();
        let expected: Vec<usize> = items.iter().map(|n| n * 2).collect();

        let pool = worker_pool(4);
        assert_eq!(pool.as_ref().map(ThreadPool::current_num_threads), Some(4));
        assert_eq!(map_ordered(pool.as_ref(), &items, |n| n * 2), expected);

        assert!(worker_pool(1).is_none());
        assert_eq!(map_ordered(None, &items, |n| n * 2), expected);
    }

    #[test]
    fn resolved_rules_walk_shared_models_without_copies() {
        // D0 -> ... -> D24, each level referencing the next twice.
        let mut definitions = serde_json::Map::new();
        for i in 0..24 {
            let next = json!({"$ref": format!("#/definitions/D{}", i + 1)});
            definitions.insert(format!("D{i}"), json!({"properties": {"l": next.clone(), "r": next}}));
        }
        definitions.insert("D24".to_string(), json!({"type": "string"}));
        let text = json!({"swagger": "2.0", "definitions": definitions}).to_string();

        fn leaf_type(model: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleFault> {
            let leaf = (0..24).try_fold(model, |node, _| node.get("properties")?.get("r"));
            let kind = leaf.and_then(|node| node.value()["type"].as_str().map(str::to_string));
            Ok(kind.into_iter().map(|k| Finding::new(k, ctx.location.clone())).collect())
        }
        let rule = Rule::builder("T006", "LeafType")
            .given("$.definitions.D0")
            .resolved(true)
            .legacy(leaf_type)
            .build()
            .unwrap();

        let fs = Arc::new(MemoryFileSystem::new().with_file("/specs/deep.json", text.as_str()));
        let runner = Runner::builder().file_system(fs).base_dir("/specs").rule(rule).build();
        let diagnostics = runner.lint_path(Path::new("deep.json")).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "string");
        assert_eq!(diagnostics[0].path.to_string(), "$.definitions.D0");

        let document = runner.graph().load_document(Path::new("deep.json")).unwrap();
        let view = ResolvedView::new(runner.graph(), document);
        assert_eq!(view.documents().count(), 1);
    }
}
