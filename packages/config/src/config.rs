//! Configuration constants for the registry and its processors.
//!
//! # Security Considerations
//!
//! Configuration files are usually trusted, but the processors also accept
//! arbitrary strings. The limits below keep hostile input (huge documents,
//! deeply nested arrays) from exhausting memory or the stack.

/// Maximum document size in bytes accepted by the processors (8 MB).
pub const MAX_DOCUMENT_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum nesting depth for the recursive PHP and XML readers.
///
/// Prevents stack overflow on input like `array(array(array(...)))`.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Separator between path segments, e.g. `app.debug`.
pub const PATH_SEPARATOR: char = '.';

/// Spaces per nesting level in YAML output.
pub const YAML_INDENT: usize = 4;

/// Spaces per nesting level in PHP array output.
pub const PHP_INDENT: usize = 4;

/// Spaces per nesting level in XML output.
pub const XML_INDENT: usize = 4;

/// Name of the document element written by the XML processor.
pub const XML_ROOT_ELEMENT: &str = "config";
