//! # openapi-lint-rules
//!
//! Built-in lint rules for openapi-lint.
//!
//! ## Available Rules
//!
//! | Id | Name | Description |
//! |----|------|-------------|
//! | R2029 | `PageableOperation` | List-shaped GET operations should carry `x-ms-pageable` |
//! | R4007 | `PatchBodyParametersSchema` | PATCH bodies must not have defaults, required or create-only properties |
//!
//! ## Usage
//!
//! ```ignore
//! use openapi_lint_core::Runner;
//! use openapi_lint_rules::default_rules;
//!
//! let runner = Runner::builder().rules(default_rules()?).build();
//! let result = runner.execute(&["network.json".into()]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod pageable_operation;
pub mod patch_body_parameters;
mod presets;

pub use pageable_operation::PageableOperation;
pub use patch_body_parameters::PatchBodyParametersSchema;
pub use presets::default_rules;

/// Re-export core types for convenience.
pub use openapi_lint_core::{Finding, Rule, RuleSet, Severity};
