//! Rule suggesting `x-ms-pageable` on list-shaped GET operations.
//!
//! # Rationale
//!
//! A GET whose 200 response model has at most three properties, one of them
//! an array, is almost always a page (items, next link, count). Without
//! `x-ms-pageable` generated clients return only the first page.

use openapi_lint_core::{Finding, Node, OpenApiTypes, Rule, RuleContext, RuleDefinitionError, RuleFault, Severity};
use serde_json::Value;
use tracing::debug;

/// Rule id for PageableOperation.
pub const ID: &str = "R2029";

/// Rule name for PageableOperation.
pub const NAME: &str = "PageableOperation";

/// Pages carry the items, a next link and optionally a count.
const MAX_PAGE_PROPERTIES: usize = 3;

/// Flags GET operations that look pageable but are not marked so.
#[derive(Debug, Clone)]
pub struct PageableOperation {
    severity: Severity,
}

impl Default for PageableOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl PageableOperation {
    /// Creates the rule with its default severity (warning).
    #[must_use]
    pub fn new() -> Self {
        Self {
            severity: Severity::Warning,
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
            .description("List-shaped GET operations should be marked with x-ms-pageable")
            .severity(self.severity)
            .category("SDKViolation")
            .openapi_type(OpenApiTypes::ARM | OpenApiTypes::DATA_PLANE)
            .given("$.paths.*[?(@property === 'get')]^")
            .legacy(check)
            .build()
    }
}

fn check(path_item: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleFault> {
    let Some((get_key, operation)) = path_item
        .value()
        .as_object()
        .and_then(|item| item.iter().find(|(key, _)| key.eq_ignore_ascii_case("get")))
    else {
        return Ok(Vec::new());
    };

    let Some(schema) = operation.pointer("/responses/200/schema") else {
        return Ok(Vec::new());
    };
    let properties = ctx.utils.properties_of_model(schema);
    if properties.is_empty() || properties.len() > MAX_PAGE_PROPERTIES {
        return Ok(Vec::new());
    }

    let has_array = properties.values().any(|property| {
        ctx.utils
            .follow_reference(property)
            .is_some_and(|p| p.get("type").and_then(Value::as_str) == Some("array"))
    });
    if !has_array || operation.get("x-ms-pageable").is_some() {
        return Ok(Vec::new());
    }

    let operation_id = operation
        .get("operationId")
        .and_then(Value::as_str)
        .unwrap_or_default();
    debug!("{operation_id} returns a list-shaped model without x-ms-pageable");
    Ok(vec![Finding::new(
        format!(
            "Based on the response model schema, operation '{operation_id}' might be pageable. \
             Consider adding the x-ms-pageable extension."
        ),
        ctx.location.child(get_key.as_str()),
    )])
}
