//! Rule restricting the schema of PATCH request bodies.
//!
//! # Rationale
//!
//! A PATCH body only carries the properties a client wants to change. A
//! property with a `default` would silently reset values the client never
//! sent, a `required` property forces clients to resend it, and a
//! create-only property cannot be changed after creation at all.
//!
//! # Detected Patterns
//!
//! - properties (at any depth) declaring `default`
//! - top-level `required` entries, including those inherited through `allOf`
//! - properties (at any depth) marked `x-ms-mutability: ["create"]`
//!
//! Nested findings are reported at the enclosing property, e.g.
//! `paths./foo.patch.parameters.0.schema.properties.properties`.

use openapi_lint_core::{
    Finding, FindingStream, JsonPath, Node, OpenApiTypes, Rule, RuleContext, RuleDefinitionError, RuleFault,
    Severity,
};
use serde_json::Value;
use std::collections::VecDeque;

/// Rule id for PatchBodyParametersSchema.
pub const ID: &str = "R4007";

/// Rule name for PatchBodyParametersSchema.
pub const NAME: &str = "PatchBodyParametersSchema";

const MESSAGE: &str = "Properties of a PATCH request body must not";

/// Forbids defaults, required and create-only properties in PATCH bodies.
#[derive(Debug, Clone)]
pub struct PatchBodyParametersSchema {
    severity: Severity,
}

impl Default for PatchBodyParametersSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchBodyParametersSchema {
    /// Creates the rule with its default severity (error).
    #[must_use]
    pub fn new() -> Self {
        Self {
            severity: Severity::Error,
        }
    }

    /// Sets the severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Builds the runnable rule.
    ///
    /// # Errors
    ///
    /// Returns an error if a query of the rule does not parse.
    pub fn into_rule(self) -> Result<Rule, RuleDefinitionError> {
        Rule::builder(ID, NAME)
            .description("Properties of a PATCH request body must not be default, required or create-only")
            .severity(self.severity)
            .category("ARMViolation")
            .openapi_type(OpenApiTypes::ALL)
            .resolved(true)
            .given("$.paths.*.patch.parameters[?(@.in === 'body')]")
            .field_selector("$.schema")
            .streaming(check)
            .build()
    }
}

fn check<'a>(schema: Node<'a>, _options: &'a Value, ctx: RuleContext<'a>) -> FindingStream<'a> {
    Box::new(Violations::new(schema, ctx.location.clone()))
}

/// Depth-first walk over a body schema, yielding findings as it goes.
struct Violations<'a> {
    pending: VecDeque<Finding>,
    stack: Vec<(Node<'a>, JsonPath)>,
}

impl<'a> Violations<'a> {
    fn new(schema: Node<'a>, location: JsonPath) -> Self {
        let pending = required_properties(&schema)
            .into_iter()
            .map(|name| Finding::new(format!("{MESSAGE} be required, property:{name}."), location.clone()))
            .collect();
        Self {
            pending,
            stack: vec![(schema, location)],
        }
    }

    fn visit(&mut self, schema: &Node<'a>, location: &JsonPath) {
        let properties = properties(schema);

        for (name, property) in &properties {
            if property.value().get("default").is_some() {
                self.pending.push_back(Finding::new(
                    format!("{MESSAGE} have default value, property:{name}."),
                    location.clone(),
                ));
            }
            if is_create_only(property.value()) {
                self.pending.push_back(Finding::new(
                    format!("{MESSAGE} be x-ms-mutability: [\"create\"], property:{name}."),
                    location.clone(),
                ));
            }
        }

        // Reversed so that siblings are visited in declaration order.
        for (name, property) in properties.into_iter().rev() {
            self.stack
                .push((property, location.child("properties").child(name)));
        }
    }
}

impl Iterator for Violations<'_> {
    type Item = Result<Finding, RuleFault>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(finding) = self.pending.pop_front() {
                return Some(Ok(finding));
            }
            let (schema, location) = self.stack.pop()?;
            self.visit(&schema, &location);
        }
    }
}

/// Object-valued properties of `schema`, own first, then those of `allOf`
/// parents.
fn properties<'a>(schema: &Node<'a>) -> Vec<(&'a str, Node<'a>)> {
    let mut out = Vec::new();
    collect_properties(schema, &mut out);
    out
}

fn collect_properties<'a>(schema: &Node<'a>, out: &mut Vec<(&'a str, Node<'a>)>) {
    if let Some(properties) = schema.get("properties") {
        out.extend(properties.members().filter(|(_, property)| property.value().is_object()));
    }
    if let Some(parents) = schema.get("allOf") {
        for parent in parents.elements() {
            collect_properties(&parent, out);
        }
    }
}

/// Names listed in `required` at the top level of the body schema.
fn required_properties<'a>(schema: &Node<'a>) -> Vec<&'a str> {
    let mut names: Vec<&'a str> = schema
        .value()
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if let Some(parents) = schema.get("allOf") {
        for parent in parents.elements() {
            for name in required_properties(&parent) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// `x-ms-mutability` that allows setting the value on creation only.
fn is_create_only(property: &Value) -> bool {
    let Some(mutability) = property.get("x-ms-mutability").and_then(Value::as_array) else {
        return false;
    };
    let has = |kind: &str| mutability.iter().any(|m| m.as_str() == Some(kind));
    has("create") && !has("update")
}
