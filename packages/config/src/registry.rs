//! The configuration registry.
//!
//! A [`Registry`] owns a tree of [`Value`]s addressed by dot paths
//! (`"app.debug"`). Lookups never fail: missing paths come back as `None` or
//! the caller's default. Loading and rendering go through the format
//! [`Processor`]s, selected by name, by file extension or by probing content.

use std::fmt;
use std::fs;
use std::ops::{Index, IndexMut};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::config::PATH_SEPARATOR;
use crate::error::{ConfigError, Result};
use crate::path;
use crate::processor::{as_map, check_size, Format, Processor};
use crate::value::{Map, Value};

static NULL: Value = Value::Null;

/// Hierarchical key/value store with dot-path access.
///
/// # Examples
/// ```
/// use cms_config::Registry;
///
/// let mut config = Registry::new();
/// config.set("app.debug", 1);
/// config.def("app.env", "production");
///
/// assert_eq!(config.get_int("app.debug"), Some(1));
/// assert_eq!(config.get_str("app.env"), Some("production"));
/// assert!(!config.has("app.missing"));
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    data: Map,
    processors: OnceLock<Vec<Arc<dyn Processor>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry around an existing tree.
    pub fn from_map(data: Map) -> Self {
        Self {
            data,
            processors: OnceLock::new(),
        }
    }

    /// Create a registry from a configuration file, detecting its format.
    ///
    /// # Errors
    /// See [`Registry::read`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Self::new();
        registry.read(path, None)?;
        Ok(registry)
    }

    /// Look up a node. The empty path denotes nothing, not the root.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = path::segments(path);
        let (first, rest) = segments.split_first()?;
        rest.iter()
            .try_fold(self.data.get(*first)?, |node, segment| path::child(node, segment))
    }

    /// Mutable variant of [`Registry::get`].
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let segments = path::segments(path);
        self.node_mut(&segments)
    }

    /// Look up a node, falling back to `default` when the path is missing.
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Value {
        self.get(path).cloned().unwrap_or_else(|| default.into())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_int(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_int)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Check if a path resolves to a node, null values included.
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Assign a value, creating intermediate mappings as needed.
    ///
    /// Scalars standing in the way are replaced by mappings. Returns the
    /// previous value at the path, if any. The empty path is ignored.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Option<Value> {
        let segments = path::segments(path);
        let (first, rest) = segments.split_first()?;
        assign_in_map(&mut self.data, first, rest, value.into())
    }

    /// Assign a value only if the path is not set yet.
    ///
    /// Returns `true` if the value was stored.
    pub fn def(&mut self, path: &str, value: impl Into<Value>) -> bool {
        if self.has(path) || path::segments(path).is_empty() {
            return false;
        }
        self.set(path, value);
        true
    }

    /// Remove a node, keeping the order of its siblings.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = path::segments(path);
        let (last, parents) = segments.split_last()?;
        if parents.is_empty() {
            return self.data.shift_remove(*last);
        }
        match self.node_mut(parents)? {
            Value::Map(map) => map.shift_remove(*last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
                Some(items.remove(index))
            }
            _ => None,
        }
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Number of top-level entries.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy a mapping subtree into a new, independent registry.
    ///
    /// Returns `None` if the path is missing or does not hold a mapping.
    pub fn extract(&self, path: &str) -> Option<Registry> {
        self.get(path)
            .and_then(Value::as_map)
            .map(|map| Registry::from_map(map.clone()))
    }

    /// Merge another tree into this one.
    ///
    /// Shallow merges replace top-level entries. Recursive merges descend
    /// into mappings present on both sides and replace everything else.
    ///
    /// # Errors
    /// `ConfigError::NotMergeable` if `source` is not a mapping; the registry
    /// is left untouched.
    pub fn merge(&mut self, source: impl Into<Value>, recursive: bool) -> Result<()> {
        let source = match source.into() {
            Value::Map(map) => map,
            other => return Err(ConfigError::NotMergeable(other.kind())),
        };
        debug!(entries = source.len(), recursive, "merging configuration");

        if recursive {
            merge_maps(&mut self.data, source);
        } else {
            self.data.extend(source);
        }
        Ok(())
    }

    /// The tree as a generic JSON object, keys in insertion order.
    pub fn to_object(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.data
                .iter()
                .map(|(key, value)| (key.clone(), serde_json::Value::from(value)))
                .collect(),
        )
    }

    /// Deep copy of the tree.
    pub fn to_array(&self) -> Map {
        self.data.clone()
    }

    /// Flatten the tree into `path -> leaf` pairs joined with dots.
    pub fn flatten(&self) -> Map {
        self.flatten_with(&PATH_SEPARATOR.to_string())
    }

    /// Flatten the tree with a custom separator.
    ///
    /// Sequences contribute index segments; empty containers have no leaves
    /// and are left out.
    pub fn flatten_with(&self, separator: &str) -> Map {
        let mut out = Map::new();
        for (key, value) in &self.data {
            flatten_into(&mut out, key, value, separator);
        }
        out
    }

    /// One processor per supported format, in probing order.
    pub fn processors(&self) -> &[Arc<dyn Processor>] {
        self.processors
            .get_or_init(|| Format::ALL.iter().map(|format| format.processor()).collect())
    }

    /// Look up a processor by format name.
    ///
    /// # Errors
    /// `ConfigError::UnknownProcessor` for names other than ini, json, yaml,
    /// php and xml.
    pub fn processor(&self, name: &str) -> Result<&dyn Processor> {
        let format =
            Format::from_name(name).ok_or_else(|| ConfigError::UnknownProcessor(name.to_string()))?;
        self.processor_for(format)
            .ok_or_else(|| ConfigError::UnknownProcessor(name.to_string()))
    }

    fn processor_for(&self, format: Format) -> Option<&dyn Processor> {
        self.processors()
            .iter()
            .find(|processor| processor.format() == format)
            .map(|processor| &**processor)
    }

    /// Probe the processors in order and return the first that accepts `text`.
    pub fn detect(&self, text: &str) -> Option<&dyn Processor> {
        let found = self
            .processors()
            .iter()
            .find(|processor| processor.can_parse(text))
            .map(|processor| &**processor);
        debug!(format = found.map(|p| p.name()), "probed content format");
        found
    }

    /// Iterate over the top-level entries.
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.data.iter()
    }

    /// Load a file and merge it into the root (shallow).
    ///
    /// The format is the explicit `format` name if given, else the file
    /// extension, else the first processor whose probe accepts the content.
    ///
    /// # Errors
    /// * `ConfigError::UnknownProcessor` for an unknown `format`
    /// * `ConfigError::UndetectedFormat` if nothing matches the content
    /// * any read or parse error of the selected processor
    pub fn read(&mut self, path: impl AsRef<Path>, format: Option<&str>) -> Result<()> {
        let path = path.as_ref();
        let selected = match format {
            Some(name) => Some(self.processor(name)?),
            None => Format::from_path(path).and_then(|format| self.processor_for(format)),
        };

        let tree = match selected {
            Some(processor) => {
                debug!(path = %path.display(), format = processor.name(), "loading configuration");
                processor.parse(path)?
            }
            None => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                check_size(&text)?;
                let processor = self
                    .detect(&text)
                    .ok_or_else(|| ConfigError::UndetectedFormat(path.display().to_string()))?;
                processor.decode(&text).map_err(|e| e.with_path(path))?
            }
        };

        self.data.extend(tree);
        Ok(())
    }

    /// Parse text and merge it into the root (shallow).
    ///
    /// # Errors
    /// Same as [`Registry::read`], minus the file access.
    pub fn parse_str(&mut self, text: &str, format: Option<&str>) -> Result<()> {
        let processor = match format {
            Some(name) => self.processor(name)?,
            None => self
                .detect(text)
                .ok_or_else(|| ConfigError::UndetectedFormat("input text".to_string()))?,
        };
        let tree = processor.string_to_object(text.into())?;
        self.data.extend(tree);
        Ok(())
    }

    /// Render the tree with the named processor.
    ///
    /// # Errors
    /// `ConfigError::UnknownProcessor` or a serialization error.
    pub fn to_format(&self, name: &str) -> Result<String> {
        self.processor(name)?.encode(&self.data)
    }

    fn node_mut(&mut self, segments: &[&str]) -> Option<&mut Value> {
        let (first, rest) = segments.split_first()?;
        rest.iter().try_fold(self.data.get_mut(*first)?, |node, segment| {
            path::child_mut(node, segment)
        })
    }
}

/// Assign below `map[segment]`, following `rest`.
fn assign_in_map(map: &mut Map, segment: &str, rest: &[&str], value: Value) -> Option<Value> {
    if rest.is_empty() {
        return map.insert(segment.to_string(), value);
    }
    let child = map
        .entry(segment.to_string())
        .or_insert_with(|| Value::Map(Map::new()));
    assign(child, rest, value)
}

fn assign(node: &mut Value, segments: &[&str], value: Value) -> Option<Value> {
    let (segment, rest) = segments.split_first()?;
    let index = segment.parse::<usize>().ok();

    match (node, index) {
        (Value::Map(map), _) => assign_in_map(map, segment, rest, value),
        // Sequences are addressed by index; one past the end appends
        (Value::Array(items), Some(i)) if i <= items.len() => {
            if i == items.len() {
                if rest.is_empty() {
                    items.push(value);
                    return None;
                }
                items.push(Value::Map(Map::new()));
            }
            if rest.is_empty() {
                Some(std::mem::replace(&mut items[i], value))
            } else {
                assign(&mut items[i], rest, value)
            }
        }
        (other, _) => {
            let replacement = if matches!(other, Value::Array(_)) {
                as_map(other)
            } else {
                Map::new()
            };
            *other = Value::Map(replacement);
            assign(other, segments, value)
        }
    }
}

fn merge_maps(target: &mut Map, source: Map) {
    for (key, value) in source {
        match value {
            Value::Map(incoming) => match target.get_mut(&key) {
                Some(Value::Map(existing)) => merge_maps(existing, incoming),
                _ => {
                    target.insert(key, Value::Map(incoming));
                }
            },
            value => {
                target.insert(key, value);
            }
        }
    }
}

fn flatten_into(out: &mut Map, prefix: &str, value: &Value, separator: &str) {
    match value {
        Value::Map(map) => {
            for (key, child) in map {
                flatten_into(out, &path::join(prefix, key, separator), child, separator);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(out, &path::join(prefix, &i.to_string(), separator), child, separator);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

impl From<Map> for Registry {
    fn from(data: Map) -> Self {
        Self::from_map(data)
    }
}

impl From<Registry> for Value {
    fn from(registry: Registry) -> Self {
        Value::Map(registry.data)
    }
}

impl From<&Registry> for Value {
    fn from(registry: &Registry) -> Self {
        Value::Map(registry.data.clone())
    }
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("data", &self.data).finish()
    }
}

/// Compact JSON, keys in insertion order.
impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.data).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl Serialize for Registry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

impl Index<&str> for Registry {
    type Output = Value;

    /// Missing paths index to `Value::Null`.
    fn index(&self, path: &str) -> &Value {
        self.get(path).unwrap_or(&NULL)
    }
}

impl IndexMut<&str> for Registry {
    /// Missing paths are created holding `Value::Null`, the way [`Registry::set`]
    /// creates them.
    ///
    /// # Panics
    ///
    /// Panics if `path` has no segments.
    #[allow(clippy::panic)] // Indexing has no way to report a bad path
    fn index_mut(&mut self, path: &str) -> &mut Value {
        if !self.has(path) {
            self.set(path, Value::Null);
        }
        match self.get_mut(path) {
            Some(node) => node,
            None => panic!("cannot index a registry with the empty path"),
        }
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
