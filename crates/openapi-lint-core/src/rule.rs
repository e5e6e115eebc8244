//! Rule definitions and the two rule function shapes.

use crate::context::RuleContext;
use crate::graph::GraphError;
use crate::json::JsonPath;
use crate::query::{Query, QueryError};
use crate::types::Severity;
use crate::view::Node;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

/// Kind of API description a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenApiType {
    /// Any description.
    #[default]
    Default,
    /// Azure Resource Manager.
    Arm,
    /// Data-plane services.
    DataPlane,
    /// Resource-provider-as-a-service.
    Rpaas,
}

impl OpenApiType {
    /// Parses `arm`, `data-plane`, `rpaas` or `default`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "arm" => Some(Self::Arm),
            "data-plane" | "dataplane" => Some(Self::DataPlane),
            "rpaas" => Some(Self::Rpaas),
            _ => None,
        }
    }
}

impl fmt::Display for OpenApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Arm => "arm",
            Self::DataPlane => "data-plane",
            Self::Rpaas => "rpaas",
        })
    }
}

/// Set of [`OpenApiType`]s a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenApiTypes(u8);

impl OpenApiTypes {
    /// Plain descriptions.
    pub const DEFAULT: Self = Self(0b0001);
    /// Azure Resource Manager.
    pub const ARM: Self = Self(0b0010);
    /// Data-plane services.
    pub const DATA_PLANE: Self = Self(0b0100);
    /// Resource-provider-as-a-service.
    pub const RPAAS: Self = Self(0b1000);
    /// Every type.
    pub const ALL: Self = Self(0b1111);

    /// Whether the two sets share a type.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Names of the types in this set.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::DEFAULT, "default"),
            (Self::ARM, "arm"),
            (Self::DATA_PLANE, "data-plane"),
            (Self::RPAAS, "rpaas"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.intersects(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl BitOr for OpenApiTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<OpenApiType> for OpenApiTypes {
    fn from(kind: OpenApiType) -> Self {
        match kind {
            OpenApiType::Default => Self::DEFAULT,
            OpenApiType::Arm => Self::ARM,
            OpenApiType::DataPlane => Self::DATA_PLANE,
            OpenApiType::Rpaas => Self::RPAAS,
        }
    }
}

/// One problem reported by a rule function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Human-readable message.
    pub message: String,
    /// Where the problem is, relative to the document root.
    pub location: JsonPath,
}

impl Finding {
    /// Creates a finding.
    #[must_use]
    pub fn new(message: impl Into<String>, location: JsonPath) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Failure inside a rule function.
///
/// A fault ends the current invocation only; the runner reports it and moves on.
#[derive(Debug, Clone, Error)]
pub enum RuleFault {
    /// A document the rule needed could not be loaded.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A query built by the rule was invalid.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The rule gave up for its own reason.
    #[error("{0}")]
    Message(String),

    /// The rule panicked.
    #[error("rule panicked: {0}")]
    Panic(String),
}

/// Lazily consumed sequence of findings.
pub type FindingStream<'a> = Box<dyn Iterator<Item = Result<Finding, RuleFault>> + 'a>;

/// Rule function returning all its findings at once.
///
/// Receives the selected node and the run context. For resolved rules the
/// node follows references as it is walked.
pub type LegacyFn = dyn for<'a> Fn(Node<'a>, &RuleContext<'a>) -> Result<Vec<Finding>, RuleFault> + Send + Sync;

/// Rule function yielding findings one at a time.
///
/// Receives the selected node, the rule's options and the run context.
pub type StreamingFn = dyn for<'a> Fn(Node<'a>, &'a Value, RuleContext<'a>) -> FindingStream<'a> + Send + Sync;

/// The logic of a rule.
pub enum RuleFunction {
    /// Eager function.
    Legacy(Box<LegacyFn>),
    /// Lazy function.
    Streaming(Box<StreamingFn>),
}

impl RuleFunction {
    /// Wraps an eager function.
    pub fn legacy<F>(f: F) -> Self
    where
        F: for<'a> Fn(Node<'a>, &RuleContext<'a>) -> Result<Vec<Finding>, RuleFault> + Send + Sync + 'static,
    {
        Self::Legacy(Box::new(f))
    }

    /// Wraps a lazy function.
    pub fn streaming<F>(f: F) -> Self
    where
        F: for<'a> Fn(Node<'a>, &'a Value, RuleContext<'a>) -> FindingStream<'a> + Send + Sync + 'static,
    {
        Self::Streaming(Box::new(f))
    }

    /// Runs the function; both shapes come back as a stream.
    pub fn invoke<'a>(&'a self, target: Node<'a>, options: &'a Value, ctx: RuleContext<'a>) -> FindingStream<'a> {
        match self {
            Self::Legacy(f) => match f(target, &ctx) {
                Ok(findings) => Box::new(findings.into_iter().map(Ok)),
                Err(fault) => Box::new(std::iter::once(Err(fault))),
            },
            Self::Streaming(f) => f(target, options, ctx),
        }
    }

    /// Whether this is the streaming shape.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

impl fmt::Debug for RuleFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy(_) => "RuleFunction::Legacy",
            Self::Streaming(_) => "RuleFunction::Streaming",
        })
    }
}

/// Invalid rule definition.
#[derive(Debug, Clone, Error)]
pub enum RuleDefinitionError {
    /// A `given` or field selector query does not compile.
    #[error("rule {rule}: {source}")]
    Query {
        /// Rule name.
        rule: String,
        /// Compilation error.
        #[source]
        source: QueryError,
    },

    /// No function was supplied.
    #[error("rule {0} has no function")]
    MissingFunction(String),
}

/// A design rule: where it looks, and what it checks there.
#[derive(Debug)]
pub struct Rule {
    id: String,
    name: String,
    description: String,
    severity: Severity,
    category: String,
    openapi_type: OpenApiTypes,
    resolved: bool,
    given: Vec<Query>,
    field_selector: Option<Query>,
    options: Value,
    function: RuleFunction,
}

impl Rule {
    /// Starts building a rule.
    #[must_use]
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(id.into(), name.into())
    }

    /// Short identifier (e.g. `R2029`).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rule name, the key in a [`RuleSet`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the rule checks.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Default severity of its diagnostics.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Validation category, e.g. `SDKViolation`.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Description types the rule applies to.
    #[must_use]
    pub fn openapi_type(&self) -> OpenApiTypes {
        self.openapi_type
    }

    /// Whether the rule queries the resolved tree.
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.resolved
    }

    /// Target queries; a rule without any targets the root.
    #[must_use]
    pub fn given(&self) -> &[Query] {
        &self.given
    }

    /// Query applied inside each target.
    #[must_use]
    pub fn field_selector(&self) -> Option<&Query> {
        self.field_selector.as_ref()
    }

    /// Options passed to streaming functions.
    #[must_use]
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// The rule's logic.
    #[must_use]
    pub fn function(&self) -> &RuleFunction {
        &self.function
    }

    /// Returns a copy of the options with `overrides` merged in, member by member.
    #[must_use]
    pub fn merged_options(&self, overrides: &Value) -> Value {
        match (&self.options, overrides) {
            (Value::Object(base), Value::Object(extra)) => {
                let mut merged = base.clone();
                for (key, value) in extra {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            (_, Value::Null) => self.options.clone(),
            (_, other) => other.clone(),
        }
    }
}

/// Builder for [`Rule`].
pub struct RuleBuilder {
    id: String,
    name: String,
    description: String,
    severity: Severity,
    category: String,
    openapi_type: OpenApiTypes,
    resolved: bool,
    given: Vec<String>,
    field_selector: Option<String>,
    options: Value,
    function: Option<RuleFunction>,
}

impl RuleBuilder {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            description: String::new(),
            severity: Severity::Warning,
            category: "SDKViolation".to_string(),
            openapi_type: OpenApiTypes::ALL,
            resolved: false,
            given: Vec::new(),
            field_selector: None,
            options: Value::Null,
            function: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the default severity (default: warning).
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the validation category (default: `SDKViolation`).
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Restricts the description types (default: all).
    #[must_use]
    pub fn openapi_type(mut self, types: OpenApiTypes) -> Self {
        self.openapi_type = types;
        self
    }

    /// Runs the rule against the resolved tree.
    #[must_use]
    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = resolved;
        self
    }

    /// Adds a target query.
    #[must_use]
    pub fn given(mut self, query: impl Into<String>) -> Self {
        self.given.push(query.into());
        self
    }

    /// Sets the query applied inside each target.
    #[must_use]
    pub fn field_selector(mut self, query: impl Into<String>) -> Self {
        self.field_selector = Some(query.into());
        self
    }

    /// Sets the options passed to streaming functions.
    #[must_use]
    pub fn options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Uses an eager function.
    #[must_use]
    pub fn legacy<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(Node<'a>, &RuleContext<'a>) -> Result<Vec<Finding>, RuleFault> + Send + Sync + 'static,
    {
        self.function = Some(RuleFunction::legacy(f));
        self
    }

    /// Uses a lazy function.
    #[must_use]
    pub fn streaming<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(Node<'a>, &'a Value, RuleContext<'a>) -> FindingStream<'a> + Send + Sync + 'static,
    {
        self.function = Some(RuleFunction::streaming(f));
        self
    }

    /// Compiles the queries and builds the rule.
    ///
    /// # Errors
    ///
    /// Returns an error if a query does not compile or no function was set.
    pub fn build(self) -> Result<Rule, RuleDefinitionError> {
        let compile = |expr: &str| {
            Query::parse(expr).map_err(|source| RuleDefinitionError::Query {
                rule: self.name.clone(),
                source,
            })
        };
        let given = self
            .given
            .iter()
            .map(|expr| compile(expr.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let field_selector = self.field_selector.as_deref().map(compile).transpose()?;

        let function = self
            .function
            .ok_or_else(|| RuleDefinitionError::MissingFunction(self.name.clone()))?;

        Ok(Rule {
            id: self.id,
            name: self.name,
            description: self.description,
            severity: self.severity,
            category: self.category,
            openapi_type: self.openapi_type,
            resolved: self.resolved,
            given,
            field_selector,
            options: self.options,
            function,
        })
    }
}

/// Rules keyed by name, in execution order.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: IndexMap<String, Rule>,
}

impl RuleSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing any rule with the same name in place.
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    /// Adds a rule, builder style.
    #[must_use]
    pub fn with(mut self, rule: Rule) -> Self {
        self.insert(rule);
        self
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Keeps only the named rules, preserving order.
    pub fn retain_names(&mut self, names: &[impl AsRef<str>]) {
        self.rules
            .retain(|name, _| names.iter().any(|n| n.as_ref() == name));
    }

    /// Rules in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = indexmap::map::IntoValues<String, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_values()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_findings(_: Node<'_>, _: &RuleContext<'_>) -> Result<Vec<Finding>, RuleFault> {
        Ok(Vec::new())
    }

    #[test]
    fn openapi_types_intersect() {
        let rule_types = OpenApiTypes::ARM | OpenApiTypes::DATA_PLANE;
        assert!(rule_types.intersects(OpenApiType::Arm.into()));
        assert!(!rule_types.intersects(OpenApiType::Rpaas.into()));
        assert!(OpenApiTypes::ALL.intersects(OpenApiTypes::DEFAULT));
        assert_eq!(rule_types.names(), vec!["arm", "data-plane"]);
        assert_eq!(OpenApiType::from_name("Data-Plane"), Some(OpenApiType::DataPlane));
        assert_eq!(OpenApiType::from_name("grpc"), None);
    }

    #[test]
    fn builder_compiles_queries() {
        let rule = Rule::builder("R0001", "Sample")
            .given("$.paths.*")
            .given("$.x-ms-paths.*")
            .field_selector("$.get")
            .severity(Severity::Error)
            .legacy(no_findings)
            .build()
            .unwrap();
        assert_eq!(rule.given().len(), 2);
        assert_eq!(rule.field_selector().map(Query::as_str), Some("$.get"));
        assert_eq!(rule.severity(), Severity::Error);
        assert_eq!(rule.category(), "SDKViolation");
        assert!(!rule.function().is_streaming());
    }

    #[test]
    fn builder_rejects_bad_definitions() {
        let err = Rule::builder("R0001", "Broken")
            .given("paths")
            .legacy(no_findings)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleDefinitionError::Query { ref rule, .. } if rule == "Broken"));

        let err = Rule::builder("R0002", "Empty").build().unwrap_err();
        assert!(matches!(err, RuleDefinitionError::MissingFunction(_)));
    }

    #[test]
    fn options_merge_member_by_member() {
        let rule = Rule::builder("R0001", "Sample")
            .options(json!({"max": 3, "mode": "strict"}))
            .legacy(no_findings)
            .build()
            .unwrap();
        assert_eq!(
            rule.merged_options(&json!({"max": 5})),
            json!({"max": 5, "mode": "strict"})
        );
        assert_eq!(rule.merged_options(&Value::Null), json!({"max": 3, "mode": "strict"}));
    }

    #[test]
    fn rule_set_keeps_insertion_order() {
        let set: RuleSet = ["B", "A", "C"]
            .into_iter()
            .map(|name| Rule::builder("R", name).legacy(no_findings).build().unwrap())
            .collect();
        let names: Vec<_> = set.iter().map(Rule::name).collect();
        assert_eq!(names, vec!["B", "A", "C"]);

        let mut set = set;
        set.retain_names(&["C", "B"]);
        assert_eq!(set.iter().map(Rule::name).collect::<Vec<_>>(), vec!["B", "C"]);
    }
}
