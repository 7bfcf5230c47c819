//! XML processor.
//!
//! Element names are keys. Leaves hold text and carry an optional `type`
//! attribute (`integer`, `float`, `boolean`, `null`, defaulting to string).
//! Containers are elements with child elements; `type="list"` marks a
//! sequence whose children are written as `<item>`, `type="map"` marks an
//! empty mapping. Keys that are not valid element names are written as
//! `<entry key="...">`. Other attributes show up as `@name` entries and mixed
//! text as `#text`.
//!
//! `@name` and `#text` entries carry no type: any scalar stored there is
//! written as text and reads back as a string, and `#text` is trimmed.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <config>
//!     <app>
//!         <debug type="integer">1</debug>
//!         <name>My Hub</name>
//!     </app>
//! </config>
//! ```

use std::collections::HashSet;

use roxmltree::{Document, Node};

use super::{as_map, Format, Processor};
use crate::config::{MAX_NESTING_DEPTH, XML_INDENT, XML_ROOT_ELEMENT};
use crate::error::{ConfigError, Result};
use crate::value::{format_float, Map, Value};

const TYPE_ATTR: &str = "type";
const KEY_ATTR: &str = "key";
const TEXT_KEY: &str = "#text";
const ENTRY_ELEMENT: &str = "entry";
const ITEM_ELEMENT: &str = "item";

/// XML documents; the root element name is not significant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xml;

impl Processor for Xml {
    fn format(&self) -> Format {
        Format::Xml
    }

    fn can_parse(&self, text: &str) -> bool {
        let trimmed = text.trim_start_matches('\u{feff}').trim_start();
        trimmed.starts_with('<')
            && !trimmed
                .get(..5)
                .is_some_and(|open| open.eq_ignore_ascii_case("<?php"))
    }

    fn decode(&self, text: &str) -> Result<Map> {
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        let doc = Document::parse(text)?;
        let root = doc.root_element();

        match read_element(&doc, root, 0)? {
            Value::Map(map) => Ok(map),
            Value::Array(items) => Ok(as_map(&Value::Array(items))),
            Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
            other => Err(error_at(
                &doc,
                root,
                format!("root element must contain elements, found {}", other.kind()),
            )),
        }
    }

    fn encode(&self, tree: &Map) -> Result<String> {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        if tree.is_empty() {
            out.push_str(&format!("<{XML_ROOT_ELEMENT}/>\n"));
        } else {
            out.push('<');
            out.push_str(XML_ROOT_ELEMENT);
            write_map_body(&mut out, XML_ROOT_ELEMENT, tree, 0)?;
        }
        Ok(out)
    }
}

fn error_at(doc: &Document, node: Node, message: impl Into<String>) -> ConfigError {
    let pos = doc.text_pos_at(node.range().start);
    ConfigError::parse_at("xml", message, pos.row as usize, pos.col as usize)
}

/// Concatenated text children of an element, CDATA included.
fn text_of(node: Node) -> String {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect()
}

fn read_element(doc: &Document, node: Node, depth: usize) -> Result<Value> {
    if depth > MAX_NESTING_DEPTH {
        return Err(error_at(
            doc,
            node,
            format!("elements nested deeper than {MAX_NESTING_DEPTH} levels"),
        ));
    }

    let kind = node.attribute(TYPE_ATTR);
    let children: Vec<Node> = node.children().filter(|child| child.is_element()).collect();

    if kind == Some("list") {
        return children
            .into_iter()
            .map(|child| read_element(doc, child, depth + 1))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array);
    }

    let attributes: Vec<_> = node
        .attributes()
        .filter(|attr| attr.name() != TYPE_ATTR && attr.name() != KEY_ATTR)
        .collect();

    if children.is_empty() && attributes.is_empty() && kind != Some("map") {
        return read_leaf(doc, node, kind.unwrap_or("string"));
    }

    let mut map = Map::new();
    for attr in attributes {
        map.insert(format!("@{}", attr.name()), Value::from(attr.value()));
    }

    // Repeated sibling names collect into a sequence
    let mut repeated = HashSet::new();
    for child in children {
        let key = child
            .attribute(KEY_ATTR)
            .unwrap_or_else(|| child.tag_name().name())
            .to_string();
        let value = read_element(doc, child, depth + 1)?;
        match map.get_mut(&key) {
            Some(Value::Array(items)) if repeated.contains(&key) => items.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
                repeated.insert(key);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    let text = text_of(node);
    let text = text.trim();
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Value::from(text));
    }
    Ok(Value::Map(map))
}

fn read_leaf(doc: &Document, node: Node, kind: &str) -> Result<Value> {
    let text = text_of(node);
    if kind == "string" {
        return Ok(Value::String(text));
    }

    let trimmed = text.trim();
    let value = match kind {
        "integer" | "int" => trimmed.parse().ok().map(Value::Int),
        "float" | "double" => parse_float(trimmed).map(Value::Float),
        "boolean" | "bool" => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" | "" => Some(Value::Bool(false)),
            _ => None,
        },
        "null" => Some(Value::Null),
        other => return Err(error_at(doc, node, format!("unknown type '{other}'"))),
    };
    value.ok_or_else(|| error_at(doc, node, format!("invalid {kind} value '{trimmed}'")))
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NAN" => Some(f64::NAN),
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

/// Check if a key can be written as an element or attribute name.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("xml"))
}

fn escape(text: &str, attribute: bool) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\r' => out.push_str("&#13;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {
                return Err(ConfigError::Serialize {
                    format: "xml",
                    message: format!("character U+{:04X} cannot be written to XML", c as u32),
                })
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn write_indent(out: &mut String, depth: usize) {
    out.push_str(&" ".repeat(depth * XML_INDENT));
}

fn write_attr(out: &mut String, name: &str, value: &str) -> Result<()> {
    out.push_str(&format!(" {name}=\"{}\"", escape(value, true)?));
    Ok(())
}

fn write_element(out: &mut String, key: &str, value: &Value, depth: usize) -> Result<()> {
    write_indent(out, depth);
    let tag = if is_valid_name(key) { key } else { ENTRY_ELEMENT };
    out.push('<');
    out.push_str(tag);
    if tag != key {
        write_attr(out, KEY_ATTR, key)?;
    }

    match value {
        Value::Map(map) => write_map_body(out, tag, map, depth),
        Value::Array(items) => {
            write_attr(out, TYPE_ATTR, "list")?;
            if items.is_empty() {
                out.push_str("/>\n");
                return Ok(());
            }
            out.push_str(">\n");
            for item in items {
                write_element(out, ITEM_ELEMENT, item, depth + 1)?;
            }
            write_indent(out, depth);
            out.push_str(&format!("</{tag}>\n"));
            Ok(())
        }
        scalar => write_scalar(out, tag, scalar),
    }
}

/// Write the rest of an already opened `<tag` holding a mapping.
fn write_map_body(out: &mut String, tag: &str, map: &Map, depth: usize) -> Result<()> {
    let mut attributes = Vec::new();
    let mut text = None;
    let mut children = Vec::new();
    for (key, value) in map {
        let attr_name = key
            .strip_prefix('@')
            .filter(|name| is_valid_name(name) && *name != TYPE_ATTR && *name != KEY_ATTR);
        match attr_name {
            Some(name) if value.is_scalar() => attributes.push((name, value)),
            _ if key == TEXT_KEY && value.is_scalar() => text = Some(value),
            _ => children.push((key, value)),
        }
    }

    for (name, value) in &attributes {
        write_attr(out, name, &value.to_text())?;
    }
    if children.is_empty() && attributes.is_empty() {
        write_attr(out, TYPE_ATTR, "map")?;
    }

    match (children.is_empty(), text) {
        (true, None) => out.push_str("/>\n"),
        (true, Some(text)) => {
            out.push('>');
            out.push_str(&escape(&text.to_text(), false)?);
            out.push_str(&format!("</{tag}>\n"));
        }
        (false, text) => {
            out.push_str(">\n");
            if let Some(text) = text {
                write_indent(out, depth + 1);
                out.push_str(&escape(&text.to_text(), false)?);
                out.push('\n');
            }
            for (key, value) in children {
                write_element(out, key, value, depth + 1)?;
            }
            write_indent(out, depth);
            out.push_str(&format!("</{tag}>\n"));
        }
    }
    Ok(())
}

fn write_scalar(out: &mut String, tag: &str, value: &Value) -> Result<()> {
    let (kind, text) = match value {
        Value::Null => {
            write_attr(out, TYPE_ATTR, "null")?;
            out.push_str("/>\n");
            return Ok(());
        }
        Value::Bool(b) => ("boolean", b.to_string()),
        Value::Int(i) => ("integer", i.to_string()),
        Value::Float(f) => ("float", format_float(*f)),
        Value::String(s) if s.is_empty() => {
            out.push_str("/>\n");
            return Ok(());
        }
        Value::String(s) => ("string", escape(s, false)?),
        Value::Array(_) | Value::Map(_) => ("string", escape(&value.to_text(), false)?),
    };
    if kind != "string" {
        write_attr(out, TYPE_ATTR, kind)?;
    }
    out.push('>');
    out.push_str(&text);
    out.push_str(&format!("</{tag}>\n"));
    Ok(())
}
