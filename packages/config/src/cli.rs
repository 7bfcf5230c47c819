//! Command-line interface for inspecting and converting configuration files.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use tracing::debug;

use crate::config::PATH_SEPARATOR;
use crate::error::{ConfigError, Result};
use crate::registry::Registry;
use crate::value::Value;

/// Read, query, convert and merge ini/json/yaml/php/xml configuration files.
#[derive(Parser)]
#[command(name = "cms-config")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value at a dot path.
    Get {
        /// Configuration file
        file: PathBuf,

        /// Dot-separated path (e.g., app.debug)
        path: String,

        /// Printed when the path is not set
        #[arg(short, long)]
        default: Option<String>,

        /// Format of the input (default: from extension or content)
        #[arg(long)]
        from: Option<String>,
    },

    /// Convert a file to another format and print it.
    Convert {
        /// Configuration file
        file: PathBuf,

        /// Output format: ini, json, yaml, php or xml
        #[arg(short, long)]
        to: String,

        /// Format of the input (default: from extension or content)
        #[arg(long)]
        from: Option<String>,
    },

    /// Print every leaf as a `path = value` line.
    Flatten {
        /// Configuration file
        file: PathBuf,

        /// Path separator
        #[arg(short, long, default_value_t = PATH_SEPARATOR.to_string())]
        separator: String,

        /// Format of the input (default: from extension or content)
        #[arg(long)]
        from: Option<String>,
    },

    /// Merge files left to right and print the result.
    Merge {
        /// Configuration files, later files win
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format: ini, json, yaml, php or xml
        #[arg(short, long)]
        to: String,

        /// Merge nested mappings key by key instead of replacing top-level entries
        #[arg(short, long)]
        recursive: bool,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    execute(Cli::parse())
}

/// Execute already parsed arguments.
pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Get {
            file,
            path,
            default,
            from,
        } => get_command(&file, &path, default, from.as_deref()),
        Commands::Convert { file, to, from } => convert_command(&file, &to, from.as_deref()),
        Commands::Flatten {
            file,
            separator,
            from,
        } => flatten_command(&file, &separator, from.as_deref()),
        Commands::Merge {
            files,
            to,
            recursive,
        } => merge_command(&files, &to, recursive),
    }
}

fn load(file: &Path, format: Option<&str>) -> Result<Registry> {
    let mut registry = Registry::new();
    registry.read(file, format)?;
    debug!(path = %file.display(), entries = registry.count(), "loaded configuration");
    Ok(registry)
}

/// Print a document, making sure it ends with exactly the newline it has.
fn print_document(text: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

fn get_command(file: &Path, path: &str, default: Option<String>, from: Option<&str>) -> Result<()> {
    let registry = load(file, from)?;
    let value = match (registry.get(path), default) {
        (Some(value), _) => value.clone(),
        (None, Some(default)) => Value::String(default),
        (None, None) => return Err(ConfigError::PathNotFound(path.to_string())),
    };
    writeln!(io::stdout().lock(), "{value}")?;
    Ok(())
}

fn convert_command(file: &Path, to: &str, from: Option<&str>) -> Result<()> {
    let registry = load(file, from)?;
    print_document(&registry.to_format(to)?)
}

fn flatten_command(file: &Path, separator: &str, from: Option<&str>) -> Result<()> {
    let registry = load(file, from)?;
    let mut out = io::stdout().lock();
    for (path, value) in registry.flatten_with(separator) {
        writeln!(out, "{} = {}", style(path).cyan(), value)?;
    }
    Ok(())
}

fn merge_command(files: &[PathBuf], to: &str, recursive: bool) -> Result<()> {
    // Fail on an unknown output format before reading anything
    let mut merged = Registry::new();
    merged.processor(to)?;

    for file in files {
        merged.merge(Registry::from_file(file)?, recursive)?;
    }
    if files.len() > 1 {
        eprintln!(
            "{} {} files ({})",
            style("Merged").bold(),
            files.len(),
            if recursive { "recursive" } else { "shallow" }
        );
    }
    print_document(&merged.to_format(to)?)
}
