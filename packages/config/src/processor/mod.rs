//! Format processors: text <-> configuration tree.
//!
//! Every processor is a stateless strategy for one serialization format. The
//! [`Registry`](crate::Registry) keeps one instance per format and selects
//! between them by name, by file extension, or by probing [`Processor::can_parse`].

mod ini;
mod json;
mod php;
mod xml;
mod yaml;

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::MAX_DOCUMENT_SIZE;
use crate::error::{ConfigError, Result};
use crate::value::{Map, Value};

pub use ini::Ini;
pub use json::Json;
pub use php::Php;
pub use xml::Xml;
pub use yaml::Yaml;

/// Supported configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Ini,
    Json,
    Yaml,
    Php,
    Xml,
}

impl Format {
    /// All formats, in probing order.
    pub const ALL: [Format; 5] = [
        Format::Ini,
        Format::Json,
        Format::Yaml,
        Format::Php,
        Format::Xml,
    ];

    /// Lowercase name the format is registered under.
    pub fn name(self) -> &'static str {
        match self {
            Format::Ini => "ini",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Php => "php",
            Format::Xml => "xml",
        }
    }

    /// File extensions associated with this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Ini => &["ini"],
            Format::Json => &["json"],
            Format::Yaml => &["yml", "yaml"],
            Format::Php => &["php"],
            Format::Xml => &["xml"],
        }
    }

    /// Look a format up by its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Guess the format from a file extension (without dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// Guess the format from a file path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Create the processor for this format.
    pub fn processor(self) -> Arc<dyn Processor> {
        match self {
            Format::Ini => Arc::new(Ini),
            Format::Json => Arc::new(Json),
            Format::Yaml => Arc::new(Yaml),
            Format::Php => Arc::new(Php),
            Format::Xml => Arc::new(Xml),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input to [`Processor::string_to_object`] and [`Processor::object_to_string`].
///
/// Callers may hand over either raw text or an already parsed tree; each
/// conversion passes through the side it already produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Tree(Map),
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Map> for Content {
    fn from(m: Map) -> Self {
        Content::Tree(m)
    }
}

impl From<&Map> for Content {
    fn from(m: &Map) -> Self {
        Content::Tree(m.clone())
    }
}

/// Trait for format processors.
///
/// Implementors provide format detection plus a decoder and encoder; file
/// handling and the pass-through conversions are shared.
pub trait Processor: Send + Sync {
    /// Format handled by this processor.
    fn format(&self) -> Format;

    /// Cheap structural probe: is `text` plausibly in this format?
    ///
    /// Must not accept text that would decode into a different tree than
    /// intended. Accepting text that later fails to decode is fine.
    fn can_parse(&self, text: &str) -> bool;

    /// Parse text into a tree.
    fn decode(&self, text: &str) -> Result<Map>;

    /// Render a tree as text.
    fn encode(&self, tree: &Map) -> Result<String>;

    /// Registered name of the format.
    fn name(&self) -> &'static str {
        self.format().name()
    }

    /// Lowercase file extensions this processor claims.
    fn supported_extensions(&self) -> &'static [&'static str] {
        self.format().extensions()
    }

    /// Read and parse a file.
    ///
    /// # Errors
    /// * `ConfigError::FileRead` if the file is missing or unreadable
    /// * `ConfigError::DocumentTooLarge` above [`MAX_DOCUMENT_SIZE`]
    /// * `ConfigError::Parse` if the content is not in this format
    fn parse(&self, path: &Path) -> Result<Map> {
        let read_err = |source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        };
        let size = fs::metadata(path).map_err(read_err)?.len();
        if size > MAX_DOCUMENT_SIZE {
            return Err(ConfigError::DocumentTooLarge {
                size,
                limit: MAX_DOCUMENT_SIZE,
            });
        }
        let text = fs::read_to_string(path).map_err(read_err)?;
        debug!(path = %path.display(), format = self.name(), "parsing config file");

        if !text.trim().is_empty() && !self.can_parse(&text) {
            // Prefer the decoder's diagnostics, they carry a location
            let err = match self.decode(&text) {
                Err(err) => err,
                Ok(_) => ConfigError::parse(
                    self.name(),
                    format!("content is not valid {}", self.name()),
                ),
            };
            return Err(err.with_path(path));
        }

        self.decode(&text).map_err(|e| e.with_path(path))
    }

    /// Convert text into a tree; trees are returned unchanged.
    fn string_to_object(&self, input: Content) -> Result<Map> {
        match input {
            Content::Tree(tree) => Ok(tree),
            Content::Text(text) => {
                check_size(&text)?;
                self.decode(&text)
            }
        }
    }

    /// Convert a tree into text; text is returned unchanged.
    fn object_to_string(&self, input: Content) -> Result<String> {
        match input {
            Content::Text(text) => Ok(text),
            Content::Tree(tree) => self.encode(&tree),
        }
    }

    /// Wrap a mapping as a tree node.
    fn to_object(&self, map: &Map) -> Value {
        Value::Map(map.clone())
    }

    /// Coerce any node into a mapping.
    ///
    /// Sequences become index-keyed mappings and scalars a single entry under `0`.
    fn as_array(&self, value: &Value) -> Map {
        as_map(value)
    }
}

/// Coerce a node into a mapping, see [`Processor::as_array`].
pub(crate) fn as_map(value: &Value) -> Map {
    match value {
        Value::Map(map) => map.clone(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Null => Map::new(),
        scalar => Map::from([("0".to_string(), scalar.clone())]),
    }
}

pub(crate) fn check_size(text: &str) -> Result<()> {
    let size = text.len() as u64;
    if size > MAX_DOCUMENT_SIZE {
        return Err(ConfigError::DocumentTooLarge {
            size,
            limit: MAX_DOCUMENT_SIZE,
        });
    }
    Ok(())
}

/// Find the first line of `text` that is neither blank nor a comment.
pub(crate) fn first_significant_line<'a>(text: &'a str, comments: &[char]) -> Option<&'a str> {
    text.lines().find(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with(comments)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup() {
        assert_eq!(Format::from_name("YAML"), Some(Format::Yaml));
        assert_eq!(Format::from_name("toml"), None);
        assert_eq!(Format::from_extension("yml"), Some(Format::Yaml));
        assert_eq!(Format::from_extension("XML"), Some(Format::Xml));
        assert_eq!(
            Format::from_path(Path::new("/etc/app/config.php")),
            Some(Format::Php)
        );
        assert_eq!(Format::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_every_format_claims_its_name() {
        for format in Format::ALL {
            let processor = format.processor();
            assert_eq!(processor.format(), format);
            assert!(processor.supported_extensions().contains(&format.name()));
        }
    }

    #[test]
    fn test_content_passthrough() {
        let processor = Json;
        let tree: Map = Map::from([("a".to_string(), Value::Int(1))]);

        let same = processor.string_to_object(Content::from(&tree)).unwrap();
        assert_eq!(same, tree);

        let text = processor.object_to_string(Content::from("{\"x\":1}")).unwrap();
        assert_eq!(text, "{\"x\":1}");
    }

    #[test]
    fn test_as_array_coercion() {
        let processor = Yaml;
        let map = processor.as_array(&Value::from(vec!["a", "b"]));
        assert_eq!(map.get("1"), Some(&Value::from("b")));

        let map = processor.as_array(&Value::Int(3));
        assert_eq!(map.get("0"), Some(&Value::Int(3)));

        assert!(processor.as_array(&Value::Null).is_empty());

        let tree = Map::from([("k".to_string(), Value::Bool(true))]);
        assert_eq!(processor.as_array(&processor.to_object(&tree)), tree);
    }

    #[test]
    fn test_parse_missing_file() {
        let err = Json.parse(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_first_significant_line() {
        let text = "\n; comment\n  \nkey = value\n";
        assert_eq!(first_significant_line(text, &[';', '#']), Some("key = value"));
        assert_eq!(first_significant_line("\n\n", &['#']), None);
    }
}
