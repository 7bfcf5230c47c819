//! JSON processor.

use serde::de::IgnoredAny;

use super::{Format, Processor};
use crate::error::{ConfigError, Result};
use crate::value::{Map, Value};

/// JSON documents with an object at the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Processor for Json {
    fn format(&self) -> Format {
        Format::Json
    }

    fn can_parse(&self, text: &str) -> bool {
        text.trim_start().starts_with('{') && serde_json::from_str::<IgnoredAny>(text).is_ok()
    }

    fn decode(&self, text: &str) -> Result<Map> {
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(text)? {
            Value::Map(map) => Ok(map),
            other => Err(ConfigError::parse(
                "json",
                format!("document root must be an object, found {}", other.kind()),
            )),
        }
    }

    fn encode(&self, tree: &Map) -> Result<String> {
        serde_json::to_string(tree).map_err(|e| ConfigError::Serialize {
            format: "json",
            message: e.to_string(),
        })
    }
}
