//! YAML processor.
//!
//! Parsing goes through `serde_yaml_ng`. Output uses a small block emitter
//! instead of the serializer so the layout is fixed: 4-space indentation, keys
//! in insertion order, strings quoted only when a plain scalar would be read
//! back differently.

use std::sync::LazyLock;

use regex::Regex;

use super::{first_significant_line, Format, Processor};
use crate::config::YAML_INDENT;
use crate::error::{ConfigError, Result};
use crate::value::{format_float, Map, Value};

/// First significant line of a block YAML document: a `key:` entry, a
/// sequence item or a document marker.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static YAML_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:(?:---|-)(?:\s|$)|(?:"(?:[^"\\]|\\.)*"|'(?:[^']|'')*'|[^\s:#'"\[{][^:#]*?)\s*:(?:\s|$))"#)
        .expect("valid regex")
});

/// YAML documents with a mapping at the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yaml;

impl Processor for Yaml {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn can_parse(&self, text: &str) -> bool {
        let trimmed = text.trim_start();
        // Empty document as written by `encode`
        if trimmed.trim_end() == "{}" {
            return true;
        }
        if trimmed.starts_with(&['<', '{', '['][..]) {
            return false;
        }

        // Tabs are never valid YAML indentation
        if text.lines().any(|line| line.starts_with('\t')) {
            return false;
        }

        first_significant_line(text, &['#', '%'])
            .is_some_and(|line| YAML_START_RE.is_match(line.trim_end()))
    }

    fn decode(&self, text: &str) -> Result<Map> {
        if first_significant_line(text, &['#']).is_none() {
            return Ok(Map::new());
        }
        match serde_yaml_ng::from_str::<Value>(text)? {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(ConfigError::parse(
                "yaml",
                format!("document root must be a mapping, found {}", other.kind()),
            )),
        }
    }

    fn encode(&self, tree: &Map) -> Result<String> {
        if tree.is_empty() {
            return Ok("{}\n".to_string());
        }
        let mut out = String::new();
        write_map(&mut out, tree, 0);
        Ok(out)
    }
}

fn write_indent(out: &mut String, depth: usize) {
    out.push_str(&" ".repeat(depth * YAML_INDENT));
}

fn write_map(out: &mut String, map: &Map, depth: usize) {
    for (key, value) in map {
        write_indent(out, depth);
        out.push_str(&scalar_string(key));
        out.push(':');
        write_node(out, value, depth);
    }
}

fn write_sequence(out: &mut String, items: &[Value], depth: usize) {
    for item in items {
        write_indent(out, depth);
        out.push('-');
        write_node(out, item, depth);
    }
}

/// Write the part after `key:` or `-`: an inline scalar, or a nested block.
fn write_node(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Map(map) if !map.is_empty() => {
            out.push('\n');
            write_map(out, map, depth + 1);
        }
        Value::Array(items) if !items.is_empty() => {
            out.push('\n');
            write_sequence(out, items, depth + 1);
        }
        _ => {
            out.push(' ');
            out.push_str(&scalar(value));
            out.push('\n');
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => ".nan".to_string(),
        Value::Float(f) if f.is_infinite() => (if *f > 0.0 { ".inf" } else { "-.inf" }).to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => scalar_string(s),
        Value::Array(_) => "[]".to_string(),
        Value::Map(_) => "{}".to_string(),
    }
}

fn scalar_string(s: &str) -> String {
    if s.chars().any(char::is_control) {
        double_quoted(s)
    } else if needs_quoting(s) {
        format!("'{}'", s.replace('\'', "''"))
    } else {
        s.to_string()
    }
}

/// Check if a string must be quoted to read back as the same string.
///
/// Plain output is limited to a conservative character set starting with a
/// letter, so numbers, dates, indicators and anything containing whitespace
/// are always quoted.
fn needs_quoting(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return true;
    };
    if !(first.is_alphabetic() || first == '_' || first == '/' || first == '$') {
        return true;
    }
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || "_-./()$+~".contains(c))
    {
        return true;
    }

    // Words that resolve to booleans, null or special floats
    if matches!(
        value.to_lowercase().as_str(),
        "true" | "false" | "yes" | "no" | "on" | "off" | "y" | "n" | "null"
    ) {
        return true;
    }

    // "inf", "NaN", "infinity" and friends
    value.parse::<f64>().is_ok()
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(yaml: &str) -> Map {
        Yaml.decode(yaml).unwrap()
    }

    #[test]
    fn test_can_parse() {
        assert!(Yaml.can_parse("app:\n    debug: 1\n"));
        assert!(Yaml.can_parse("# comment\n---\napp: {}\n"));
        assert!(Yaml.can_parse("- a\n- b\n"));
        assert!(!Yaml.can_parse("foo:\n\tbar"));
        assert!(!Yaml.can_parse("<?xml version=\"1.0\"?>\n<config/>"));
        assert!(!Yaml.can_parse("{\"a\": 1}"));
        assert!(Yaml.can_parse("{}\n"));
        assert!(Yaml.can_parse("'it''s': v\n"));
        assert!(Yaml.can_parse("\"say \\\"hi\\\"\\n\": v\n"));
        assert!(!Yaml.can_parse("[section]\nkey = value\n"));
        assert!(!Yaml.can_parse("key = value\nurl = http://example.com\n"));
    }

    #[test]
    fn test_decode_rejects_tab_indentation() {
        let err = Yaml.decode("foo:\n\tbar").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_decode_rejects_scalar_root() {
        let err = Yaml.decode("just some text").unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_decode_empty_document() {
        assert!(Yaml.decode("").unwrap().is_empty());
        assert!(Yaml.decode("# nothing here\n").unwrap().is_empty());
        assert!(Yaml.decode("~\n").unwrap().is_empty());
    }

    #[test]
    fn test_encode_layout() {
        let map = tree("app:\n  debug: 1\n  helpurl: English (GB) - help\n  env: development\nseo:\n  sef: 0\n");
        assert_eq!(
            Yaml.encode(&map).unwrap(),
            "app:\n    debug: 1\n    helpurl: 'English (GB) - help'\n    env: development\nseo:\n    sef: 0\n"
        );
    }

    #[test]
    fn test_encode_sequences_and_empty_containers() {
        let map = tree("list: [a, 1, {k: v}]\nnone: {}\nnothing: []\n");
        assert_eq!(
            Yaml.encode(&map).unwrap(),
            "list:\n    - a\n    - 1\n    -\n        k: v\nnone: {}\nnothing: []\n"
        );
    }

    #[test]
    fn test_encode_empty_tree() {
        assert_eq!(Yaml.encode(&Map::new()).unwrap(), "{}\n");
        assert!(Yaml.decode("{}\n").unwrap().is_empty());
    }

    #[test]
    fn test_needs_quoting() {
        assert!(needs_quoting(""));
        assert!(needs_quoting("25"));
        assert!(needs_quoting("1.5"));
        assert!(needs_quoting("2025-01-01"));
        assert!(needs_quoting("true"));
        assert!(needs_quoting("No"));
        assert!(needs_quoting("null"));
        assert!(needs_quoting("inf"));
        assert!(needs_quoting("with space"));
        assert!(needs_quoting("key: value"));
        assert!(needs_quoting("-dash"));
        assert!(needs_quoting("it's"));

        assert!(!needs_quoting("development"));
        assert!(!needs_quoting("ckeditor"));
        assert!(!needs_quoting("/var/www/html"));
        assert!(!needs_quoting("v1.2.3"));
    }

    #[test]
    fn test_round_trip_awkward_strings() {
        let mut map = Map::new();
        for (i, s) in [
            "it's",
            "line one\nline two",
            "tab\there",
            "\"quoted\"",
            "# not a comment",
            "trailing:",
            "  padded  ",
            "123",
            "0x1F",
            "yes",
            "~",
            "@at",
            "back\\slash",
            "bell\u{7}",
        ]
        .into_iter()
        .enumerate()
        {
            map.insert(format!("k{i}"), Value::from(s));
        }
        let text = Yaml.encode(&map).unwrap();
        assert_eq!(Yaml.decode(&text).unwrap(), map);
    }

    #[test]
    fn test_round_trip_scalars() {
        let mut map = Map::new();
        map.insert("int".to_string(), Value::Int(-7));
        map.insert("float".to_string(), Value::Float(1.0));
        map.insert("small".to_string(), Value::Float(1e-7));
        map.insert("bool".to_string(), Value::Bool(false));
        map.insert("null".to_string(), Value::Null);
        map.insert("1".to_string(), Value::from("numeric key"));
        let text = Yaml.encode(&map).unwrap();
        assert_eq!(Yaml.decode(&text).unwrap(), map);
    }
}
