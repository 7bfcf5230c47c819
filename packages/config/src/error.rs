//! Error types for the configuration registry.
//!
//! Lookups never fail (they fall back to defaults), so every variant here
//! comes from loading, rendering or merging configuration data.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Line and column (both 1-based) inside a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// Main error type for the configuration library.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Text does not conform to the grammar of the selected format.
    #[error(
        "Failed to parse {format}{}: {message}{}",
        .path.as_ref().map(|p| format!(" file {}", p.display())).unwrap_or_default(),
        .location.map(|l| format!(" at {l}")).unwrap_or_default()
    )]
    Parse {
        format: &'static str,
        path: Option<PathBuf>,
        message: String,
        location: Option<Location>,
    },

    /// A tree could not be rendered in the selected format.
    #[error("Failed to serialize {format}: {message}")]
    Serialize {
        format: &'static str,
        message: String,
    },

    /// No processor is registered under the requested name.
    #[error("Unknown config processor: '{0}'. Expected one of ini, json, yaml, php, xml")]
    UnknownProcessor(String),

    /// Neither an explicit format, the extension nor content probing selected a processor.
    #[error("Unable to detect configuration format of {0}")]
    UndetectedFormat(String),

    /// `merge` was handed something other than a mapping.
    #[error("Cannot merge a {0} into a registry, expected a mapping")]
    NotMergeable(&'static str),

    /// A lookup requested from the command line found nothing.
    #[error("No value at path '{0}'")]
    PathNotFound(String),

    /// Input exceeds the accepted document size.
    #[error("Document of {size} bytes exceeds the limit of {limit} bytes")]
    DocumentTooLarge { size: u64, limit: u64 },

    /// Failed to read a configuration file.
    #[error("Failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Build a parse error without location information.
    pub fn parse(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            path: None,
            message: message.into(),
            location: None,
        }
    }

    /// Build a parse error pointing at a line and column.
    pub fn parse_at(
        format: &'static str,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self::Parse {
            format,
            path: None,
            message: message.into(),
            location: Some(Location { line, column }),
        }
    }

    /// Attach the file a parse error originated from.
    #[must_use]
    pub fn with_path(self, file: &Path) -> Self {
        match self {
            Self::Parse {
                format,
                message,
                location,
                ..
            } => Self::Parse {
                format,
                path: Some(file.to_path_buf()),
                message,
                location,
            },
            other => other,
        }
    }

    /// Whether this error reports malformed input.
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Location of a parse error, if the underlying parser reported one.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Parse { location, .. } => *location,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        let (line, column) = (err.line(), err.column());
        // serde_json reports line 0 for errors that are not tied to the input
        if line == 0 {
            Self::parse("json", err.to_string())
        } else {
            Self::parse_at("json", err.to_string(), line, column)
        }
    }
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        match err.location() {
            Some(loc) => Self::parse_at("yaml", err.to_string(), loc.line(), loc.column()),
            None => Self::parse("yaml", err.to_string()),
        }
    }
}

impl From<roxmltree::Error> for ConfigError {
    fn from(err: roxmltree::Error) -> Self {
        let pos = err.pos();
        Self::parse_at("xml", err.to_string(), pos.row as usize, pos.col as usize)
    }
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
