//! openapi-lint CLI tool.
//!
//! Usage:
//! ```bash
//! openapi-lint check [OPTIONS] [PATHS]...
//! openapi-lint list-rules
//! openapi-lint init
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use openapi_lint_core::OpenApiType;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;
mod config_resolver;

/// Linter for OpenAPI/Swagger 2.0 documents
#[derive(Parser)]
#[command(name = "openapi-lint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint documents
    Check {
        /// Documents or directories to lint (default: current directory)
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Kind of description: arm, data-plane, rpaas or default
        #[arg(long = "type", value_parser = parse_openapi_type)]
        openapi_type: Option<OpenApiType>,

        /// Only run specific rules, by name or id (comma-separated)
        #[arg(long)]
        rules: Option<String>,

        /// Skip files whose path contains this text (can be specified multiple times)
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// List available rules
    ListRules,

    /// Initialize configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

/// Output format for lint results.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Source snippets rendered through miette.
    #[default]
    Text,
    /// JSON report.
    Json,
    /// One line per record.
    Compact,
}

fn parse_openapi_type(name: &str) -> Result<OpenApiType, String> {
    OpenApiType::from_name(name)
        .ok_or_else(|| format!("unknown type '{name}' (expected arm, data-plane, rpaas or default)"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check {
            paths,
            format,
            openapi_type,
            rules,
            exclude,
        } => {
            let source = config_resolver::resolve(project_dir(&paths), cli.config.as_deref());
            let options = commands::check::CheckOptions {
                format,
                openapi_type,
                rules,
                exclude,
            };
            commands::check::run(&paths, &options, &source)
        }
        Commands::ListRules => commands::list_rules::run(),
        Commands::Init { force } => commands::init::run(force),
    }
}

/// Directory searched for a project config: the first path given, or its
/// parent when it is a file.
fn project_dir(paths: &[PathBuf]) -> &Path {
    match paths.first() {
        Some(path) if path.is_file() => path.parent().unwrap_or(Path::new(".")),
        Some(path) => path,
        None => Path::new("."),
    }
}
