//! Rule presets.

use crate::{PageableOperation, PatchBodyParametersSchema};
use openapi_lint_core::{RuleDefinitionError, RuleSet};

/// Returns every built-in rule, in registration order.
///
/// Includes:
/// - `PageableOperation` (R2029) - List-shaped GETs should be pageable
/// - `PatchBodyParametersSchema` (R4007) - Restricts PATCH body schemas
///
/// # Errors
///
/// Returns an error if a rule's query does not parse.
pub fn default_rules() -> Result<RuleSet, RuleDefinitionError> {
    Ok(RuleSet::new()
        .with(PageableOperation::new().into_rule()?)
        .with(PatchBodyParametersSchema::new().into_rule()?))
}
