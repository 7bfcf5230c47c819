//! CMS Config - hierarchical configuration registry with format processors.
//!
//! This crate stores configuration as a tree of [`Value`]s addressed by dot
//! paths, and reads and writes that tree as INI, JSON, YAML, PHP array
//! literals or XML.
//!
//! # Example
//!
//! ```
//! use cms_config::Registry;
//!
//! let mut config = Registry::new();
//! config.parse_str("app:\n    debug: 1\n    editor: ckeditor\n", None).unwrap();
//!
//! assert_eq!(config.get_int("app.debug"), Some(1));
//! assert_eq!(config.to_format("json").unwrap(), r#"{"app":{"debug":1,"editor":"ckeditor"}}"#);
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Limits and formatting constants
//! - [`error`]: Error types and Result alias
//! - [`value`]: The configuration tree node type
//! - [`path`]: Dot-path splitting
//! - [`registry`]: The registry itself
//! - [`processor`]: One processor per file format
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod path;
pub mod processor;
pub mod registry;
pub mod value;

// Re-export commonly used items
pub use error::{ConfigError, Location, Result};
pub use processor::{Content, Format, Processor};
pub use registry::Registry;
pub use value::{Map, Value};
