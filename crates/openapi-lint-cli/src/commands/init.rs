//! Init command implementation.

use anyhow::{bail, Result};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# openapi-lint configuration

[analyzer]
# Kind of description: "default", "arm", "data-plane" or "rpaas".
# Rules only run when they apply to this type.
openapi_type = "arm"

# Documents linted in parallel (default: available cores)
# parallelism = 4

# Lowest severity that fails the run: "error", "warning" or "info"
fail_on = "error"

# Rule configurations
# Each rule can be enabled/disabled and have its severity overridden.
# Other keys are handed to the rule as options.

[rules.PageableOperation]
enabled = true
# severity = "error"

[rules.PatchBodyParametersSchema]
enabled = true
"#;

/// Runs the init command.
pub fn run(force: bool) -> Result<()> {
    write_config(Path::new("openapi-lint.toml"), force)?;

    println!("Created openapi-lint.toml");
    println!("\nNext steps:");
    println!("  1. Edit openapi-lint.toml to configure rules");
    println!("  2. Run: openapi-lint check specification/");

    Ok(())
}

fn write_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }
    std::fs::write(config_path, DEFAULT_CONFIG)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapi_lint_core::{Config, OpenApiType, Severity};
    use tempfile::TempDir;

    #[test]
    fn default_config_parses() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.analyzer.openapi_type, OpenApiType::Arm);
        assert_eq!(config.analyzer.fail_on(), Severity::Error);
        assert!(config.is_rule_enabled("PageableOperation"));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("openapi-lint.toml");
        std::fs::write(&path, "# mine").unwrap();

        assert!(write_config(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");

        write_config(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
