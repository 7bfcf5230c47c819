//! INI processor.
//!
//! `[section]` headers become top-level mappings, keys before the first
//! header stay at the top level. One more level is available through the
//! array syntax: `key[] = v` appends to a sequence and `key[name] = v` fills a
//! mapping. All leaves decode to strings.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::{Format, Processor};
use crate::error::{ConfigError, Result};
use crate::value::{Map, Value};

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\[\]]+\]$").expect("valid regex"));

/// `key = ...`, `key[] = ...` or `key[name] = ...`. Keys follow [`valid_key`].
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\s;#=\[\]"<>{}][^=\[\]"<>{}]*(?:\[[^\[\]]*\])?\s*="#)
        .expect("valid regex")
});

const COMMENT_CHARS: [char; 2] = [';', '#'];

/// Characters never allowed in a key. Double quotes and angle or curly
/// brackets keep XML and JSON text from passing as INI.
const KEY_FORBIDDEN: &str = "=[]\"<>{}\n\r";

/// INI documents with optional sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ini;

impl Processor for Ini {
    fn format(&self) -> Format {
        Format::Ini
    }

    fn can_parse(&self, text: &str) -> bool {
        let mut significant = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(&COMMENT_CHARS[..]))
            .peekable();

        significant.peek().is_some()
            && significant.all(|line| SECTION_RE.is_match(line) || ENTRY_RE.is_match(line))
    }

    fn decode(&self, text: &str) -> Result<Map> {
        let mut root = Map::new();
        let mut section: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(&COMMENT_CHARS[..]) {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        ConfigError::parse_at("ini", "malformed section header", line_no, 1)
                    })?;
                if !root.get(name).is_some_and(Value::is_map) {
                    root.insert(name.to_string(), Value::Map(Map::new()));
                }
                section = Some(name.to_string());
                continue;
            }

            let Some((key, rest)) = line.split_once('=') else {
                return Err(ConfigError::parse_at(
                    "ini",
                    "expected 'key = value'",
                    line_no,
                    1,
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::parse_at("ini", "missing key", line_no, 1));
            }
            let value_col = raw.find('=').map_or(1, |pos| pos + 2);
            let value = parse_value(rest.trim(), line_no, value_col)?;

            let target = match section.as_deref() {
                Some(name) => root
                    .get_mut(name)
                    .and_then(Value::as_map_mut)
                    .ok_or_else(|| ConfigError::parse_at("ini", "lost section", line_no, 1))?,
                None => &mut root,
            };
            assign(target, key, value);
        }

        Ok(root)
    }

    fn encode(&self, tree: &Map) -> Result<String> {
        let mut out = String::new();

        for (key, value) in tree.iter().filter(|(_, v)| !v.is_map()) {
            write_entry(&mut out, key, value);
        }

        for (name, value) in tree {
            let Value::Map(section) = value else {
                continue;
            };
            if !valid_key(name) {
                warn!(section = %name, "skipping INI section with unrepresentable name");
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{name}]\n"));
            for (key, value) in section {
                write_entry(&mut out, key, value);
            }
        }

        Ok(out)
    }
}

/// Store a value under `key`, honouring the `key[]` / `key[name]` syntax.
fn assign(target: &mut Map, key: &str, value: Value) {
    let Some((base, sub)) = key
        .strip_suffix(']')
        .and_then(|k| k.split_once('['))
        .map(|(base, sub)| (base.trim(), sub.trim()))
    else {
        target.insert(key.to_string(), value);
        return;
    };

    if sub.is_empty() {
        match target.get_mut(base) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                target.insert(base.to_string(), Value::Array(vec![value]));
            }
        }
    } else {
        match target.get_mut(base) {
            Some(Value::Map(map)) => {
                map.insert(sub.to_string(), value);
            }
            _ => {
                let map = Map::from([(sub.to_string(), value)]);
                target.insert(base.to_string(), Value::Map(map));
            }
        }
    }
}

/// Parse the right-hand side of an entry into a string value.
fn parse_value(raw: &str, line: usize, column: usize) -> Result<Value> {
    let quote = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Ok(Value::String(strip_inline_comment(raw).to_string())),
    };

    let mut out = String::new();
    let mut chars = raw[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            let trailing = raw[i + 2..].trim();
            if !trailing.is_empty() && !trailing.starts_with(&COMMENT_CHARS[..]) {
                return Err(ConfigError::parse_at(
                    "ini",
                    "unexpected characters after quoted value",
                    line,
                    column + i + 2,
                ));
            }
            return Ok(Value::String(out));
        }
        if c == '\\' && quote == '"' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            }
        } else {
            out.push(c);
        }
    }

    Err(ConfigError::parse_at(
        "ini",
        "unterminated quoted value",
        line,
        column,
    ))
}

/// Cut a trailing ` ; comment` from an unquoted value.
fn strip_inline_comment(raw: &str) -> &str {
    raw.char_indices()
        .find(|&(i, c)| {
            COMMENT_CHARS.contains(&c)
                && raw[..i].ends_with(|p: char| p.is_whitespace())
        })
        .map_or(raw, |(i, _)| raw[..i].trim_end())
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.trim() == key
        && !key.starts_with(&COMMENT_CHARS[..])
        && !key.contains(|c| KEY_FORBIDDEN.contains(c))
}

fn write_entry(out: &mut String, key: &str, value: &Value) {
    if !valid_key(key) {
        warn!(key = %key, "skipping INI entry with unrepresentable key");
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                write_nested(out, &format!("{key}[]"), item);
            }
        }
        Value::Map(map) => {
            for (sub, item) in map {
                if valid_key(sub) {
                    write_nested(out, &format!("{key}[{sub}]"), item);
                } else {
                    warn!(key = %key, sub = %sub, "skipping INI entry with unrepresentable key");
                }
            }
        }
        scalar => write_line(out, key, scalar),
    }
}

fn write_nested(out: &mut String, key: &str, value: &Value) {
    if value.is_scalar() {
        write_line(out, key, value);
    } else {
        warn!(key = %key, "INI cannot represent nested {}; skipping", value.kind());
    }
}

fn write_line(out: &mut String, key: &str, value: &Value) {
    out.push_str(key);
    out.push('=');
    match value {
        Value::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        other => out.push_str(&other.to_text()),
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_can_parse() {
        assert!(Ini.can_parse("; comment\n[app]\ndebug = 1\nlist[] = a\n"));
        assert!(Ini.can_parse("name=\"value\"\n"));
        assert!(!Ini.can_parse("app:\n    debug: 1\n"));
        assert!(!Ini.can_parse("<config debug=\"1\"/>"));
        assert!(!Ini.can_parse("<?php return array('a' => 1);"));
        assert!(!Ini.can_parse("{\"a\": 1}"));
        assert!(!Ini.can_parse("\n; only comments\n"));
    }

    #[test]
    fn test_can_parse_free_form_keys() {
        assert!(Ini.can_parse("site name = demo\n"));
        assert!(Ini.can_parse("[général]\nnom du site = démo\nhost:port = x\n"));
        assert!(Ini.can_parse("mail.from name[] = a\n"));
        assert!(Ini.can_parse("it's = 1\n"));
        assert!(!Ini.can_parse("\"quoted\" = 1\n"));
    }

    #[test]
    fn test_encode_output_passes_can_parse() {
        let mut tree = Map::new();
        tree.insert("site name".to_string(), s("demo"));
        tree.insert("host:port".to_string(), s("localhost:80"));
        tree.insert("naïve".to_string(), s("yes"));
        tree.insert("app".to_string(), [("sef rewrite", 1)].into_iter().collect());

        let text = Ini.encode(&tree).unwrap();
        assert!(Ini.can_parse(&text), "rejected own output:\n{text}");
        let map = Ini.decode(&text).unwrap();
        assert_eq!(map["site name"], s("demo"));
        assert_eq!(map["app"].as_map().unwrap()["sef rewrite"], s("1"));
    }

    #[test]
    fn test_encode_skips_keys_that_cannot_read_back() {
        let tree = Map::from([
            (" padded".to_string(), s("x")),
            ("say \"hi\"".to_string(), s("x")),
            ("ok".to_string(), s("y")),
        ]);
        assert_eq!(Ini.encode(&tree).unwrap(), "ok=\"y\"\n");
    }

    #[test]
    fn test_decode_sections() {
        let map = Ini
            .decode("title = Site\n\n[app]\ndebug = 1\nhelpurl = \"English (GB) ; help\" ; note\n[seo]\nsef=0\n")
            .unwrap();

        assert_eq!(map["title"], s("Site"));
        let app = map["app"].as_map().unwrap();
        assert_eq!(app["debug"], s("1"));
        assert_eq!(app["helpurl"], s("English (GB) ; help"));
        assert_eq!(map["seo"].as_map().unwrap()["sef"], s("0"));
    }

    #[test]
    fn test_decode_array_syntax() {
        let map = Ini
            .decode("[mail]\nto[] = a@example.com\nto[] = b@example.com\nsmtp[host] = localhost\nsmtp[port] = 25\n")
            .unwrap();
        let mail = map["mail"].as_map().unwrap();
        assert_eq!(mail["to"], Value::from(vec!["a@example.com", "b@example.com"]));
        assert_eq!(mail["smtp"].as_map().unwrap()["port"], s("25"));
    }

    #[test]
    fn test_decode_inline_comments_and_escapes() {
        let map = Ini
            .decode("color = #fff\nplain = value ; trailing\nquoted = \"say \\\"hi\\\"\\nbye\"\nsingle = 'a\\b'\n")
            .unwrap();
        assert_eq!(map["color"], s("#fff"));
        assert_eq!(map["plain"], s("value"));
        assert_eq!(map["quoted"], s("say \"hi\"\nbye"));
        assert_eq!(map["single"], s("a\\b"));
    }

    #[test]
    fn test_decode_errors_carry_location() {
        let err = Ini.decode("[app]\ndebug 1\n").unwrap_err();
        assert_eq!(err.location().map(|l| l.line), Some(2));

        let err = Ini.decode("[app\n").unwrap_err();
        assert!(err.to_string().contains("section header"));

        let err = Ini.decode("a = \"open\n").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_encode_writes_globals_first() {
        let mut tree = Map::new();
        tree.insert("app".to_string(), [("debug", 1)].into_iter().collect());
        tree.insert("title".to_string(), s("My \"Site\""));
        tree.insert("enabled".to_string(), Value::Bool(true));
        tree.insert("tags".to_string(), Value::from(vec!["a", "b"]));

        assert_eq!(
            Ini.encode(&tree).unwrap(),
            "title=\"My \\\"Site\\\"\"\nenabled=true\ntags[]=\"a\"\ntags[]=\"b\"\n\n[app]\ndebug=1\n"
        );
    }

    #[test]
    fn test_encode_skips_deep_nesting() {
        let deep: Value = [("c", 1)].into_iter().collect();
        let mid: Value = [("b", deep)].into_iter().collect();
        let section: Value = [("a", mid), ("keep", s("yes"))].into_iter().collect();
        let tree = Map::from([("sec".to_string(), section)]);

        assert_eq!(Ini.encode(&tree).unwrap(), "[sec]\nkeep=\"yes\"\n");
    }

    #[test]
    fn test_round_trip_as_strings() {
        let text = "name=\"demo\"\n\n[app]\nlimit=\"25\"\nflags[]=\"x\"\nsmtp[host]=\"localhost\"\n";
        let map = Ini.decode(text).unwrap();
        assert_eq!(Ini.encode(&map).unwrap(), text);
        assert_eq!(Ini.decode(&Ini.encode(&map).unwrap()).unwrap(), map);
    }
}
