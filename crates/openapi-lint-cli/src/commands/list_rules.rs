//! List rules command implementation.

use anyhow::{Context, Result};
use openapi_lint_rules::default_rules;

/// Runs the list-rules command.
pub fn run() -> Result<()> {
    let rules = default_rules().context("Failed to build built-in rules")?;

    println!("Available rules:\n");
    println!("{:<8} {:<28} {:<9} {:<20} Description", "Id", "Name", "Severity", "Types");
    println!("{}", "-".repeat(100));

    for rule in rules.iter() {
        println!(
            "{:<8} {:<28} {:<9} {:<20} {}",
            rule.id(),
            rule.name(),
            rule.severity().to_string(),
            rule.openapi_type().names().join(","),
            rule.description()
        );
    }

    println!("\nUse --rules to run specific rules, e.g.:");
    println!("  openapi-lint check --rules PageableOperation specification/");
    println!("  openapi-lint check --rules R2029,R4007 network.json");

    Ok(())
}
