//! Locating and loading `openapi-lint.toml`.
//!
//! Resolution order:
//!
//! 1. `--config` flag (explicit path)
//! 2. `{project}/openapi-lint.toml` or `.openapi-lint.toml`
//! 3. `$OPENAPI_LINT_CONFIG_DIR/config.toml`, else `~/.openapi-lint/config.toml`
//! 4. built-in defaults

use anyhow::{Context, Result};
use openapi_lint_core::Config;
use std::path::{Path, PathBuf};

/// Where the configuration was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Given with `--config`.
    Explicit(PathBuf),
    /// Found next to the linted documents.
    Project(PathBuf),
    /// Found in the user-wide config directory.
    Global(PathBuf),
    /// Nothing found.
    Default,
}

impl ConfigSource {
    /// Returns the resolved path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(p) | Self::Project(p) | Self::Global(p) => Some(p),
            Self::Default => None,
        }
    }

    /// Reads the configuration this source points at.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid configuration.
    /// An explicit path that does not exist is an error too.
    pub fn load(&self) -> Result<Config> {
        let Some(path) = self.path() else {
            return Ok(Config::default());
        };
        if matches!(self, Self::Global(_)) {
            tracing::info!("Using global config: {}", path.display());
        }
        Config::from_file(path).with_context(|| format!("Failed to load config: {}", path.display()))
    }
}

const PROJECT_CONFIG_NAMES: &[&str] = &["openapi-lint.toml", ".openapi-lint.toml"];

const GLOBAL_CONFIG_NAME: &str = "config.toml";

/// Resolves the configuration for documents under `project_dir`.
#[must_use]
pub fn resolve(project_dir: &Path, explicit: Option<&Path>) -> ConfigSource {
    resolve_inner(project_dir, explicit, global_config_dir())
}

/// Takes `global_dir` as a parameter so tests need not touch the environment.
fn resolve_inner(project_dir: &Path, explicit: Option<&Path>, global_dir: Option<PathBuf>) -> ConfigSource {
    if let Some(p) = explicit {
        return ConfigSource::Explicit(p.to_path_buf());
    }

    if let Some(found) = PROJECT_CONFIG_NAMES
        .iter()
        .map(|name| project_dir.join(name))
        .find(|candidate| candidate.is_file())
    {
        tracing::debug!("Found project config: {}", found.display());
        return ConfigSource::Project(found);
    }

    match global_dir.map(|dir| dir.join(GLOBAL_CONFIG_NAME)) {
        Some(candidate) if candidate.is_file() => {
            tracing::debug!("Found global config: {}", candidate.display());
            ConfigSource::Global(candidate)
        }
        _ => ConfigSource::Default,
    }
}

/// `$OPENAPI_LINT_CONFIG_DIR`, else `~/.openapi-lint/`.
#[must_use]
pub fn global_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("OPENAPI_LINT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    home::home_dir().map(|h| h.join(".openapi-lint"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapi_lint_core::{OpenApiType, Severity};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn explicit_wins_and_is_not_checked() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("openapi-lint.toml"), "").unwrap();

        let result = resolve_inner(tmp.path(), Some(Path::new("/nonexistent.toml")), None);
        assert_eq!(result, ConfigSource::Explicit(PathBuf::from("/nonexistent.toml")));
        assert!(result.load().is_err());
    }

    #[test]
    fn project_names_in_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".openapi-lint.toml"), "").unwrap();
        assert_eq!(
            resolve_inner(tmp.path(), None, None),
            ConfigSource::Project(tmp.path().join(".openapi-lint.toml"))
        );

        fs::write(tmp.path().join("openapi-lint.toml"), "").unwrap();
        assert_eq!(
            resolve_inner(tmp.path(), None, None),
            ConfigSource::Project(tmp.path().join("openapi-lint.toml"))
        );
    }

    #[test]
    fn global_only_without_project_config() {
        let project = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        assert_eq!(
            resolve_inner(project.path(), None, Some(global.path().to_path_buf())),
            ConfigSource::Default
        );

        fs::write(global.path().join("config.toml"), "").unwrap();
        assert_eq!(
            resolve_inner(project.path(), None, Some(global.path().to_path_buf())),
            ConfigSource::Global(global.path().join("config.toml"))
        );

        fs::write(project.path().join("openapi-lint.toml"), "").unwrap();
        assert!(matches!(
            resolve_inner(project.path(), None, Some(global.path().to_path_buf())),
            ConfigSource::Project(_)
        ));
    }

    #[test]
    fn loads_project_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("openapi-lint.toml"),
            "[analyzer]\nopenapi_type = \"arm\"\nfail_on = \"warning\"\n\n[rules.PageableOperation]\nenabled = false\n",
        )
        .unwrap();

        let config = resolve_inner(tmp.path(), None, None).load().unwrap();
        assert_eq!(config.analyzer.openapi_type, OpenApiType::Arm);
        assert_eq!(config.analyzer.fail_on(), Severity::Warning);
        assert!(!config.is_rule_enabled("PageableOperation"));
    }

    #[test]
    fn default_source_loads_defaults() {
        assert!(ConfigSource::Default.path().is_none());
        let config = ConfigSource::Default.load().unwrap();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn invalid_config_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("openapi-lint.toml");
        fs::write(&path, "[analyzer]\nopenapi_type = \"grpc\"\n").unwrap();

        let err = ConfigSource::Project(path.clone()).load().unwrap_err();
        assert!(format!("{err}").contains(&path.display().to_string()));
    }
}
