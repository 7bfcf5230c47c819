//! PHP array-literal processor.
//!
//! Reads configuration files of the form `<?php return array(...);` (or the
//! short `[...]` syntax). Only literals are understood: strings, numbers,
//! booleans, null, `NAN`/`INF` and nested arrays. Anything that would need a
//! PHP interpreter (variables, function calls, concatenation) is a parse error.

use std::sync::LazyLock;

use regex::Regex;

use super::{as_map, Format, Processor};
use crate::config::{MAX_NESTING_DEPTH, PHP_INDENT};
use crate::error::{ConfigError, Result};
use crate::value::{format_float, Map, Value};

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static RETURN_ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^return\s*(?:array\s*\(|\[)").expect("valid regex")
});

/// PHP files returning an array literal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Php;

impl Processor for Php {
    fn format(&self) -> Format {
        Format::Php
    }

    fn can_parse(&self, text: &str) -> bool {
        let trimmed = text.trim_start();
        trimmed
            .get(..5)
            .is_some_and(|open| open.eq_ignore_ascii_case("<?php"))
            || RETURN_ARRAY_RE.is_match(trimmed)
    }

    fn decode(&self, text: &str) -> Result<Map> {
        Parser::new(text).document()
    }

    fn encode(&self, tree: &Map) -> Result<String> {
        let mut out = String::from("<?php\n\nreturn ");
        write_map(&mut out, tree, 0);
        out.push_str(";\n");
        Ok(out)
    }
}

/// Recursive-descent reader over the source text.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.strip_prefix('\u{feff}').unwrap_or(src),
            pos: 0,
            depth: 0,
        }
    }

    fn document(mut self) -> Result<Map> {
        self.skip_trivia();
        if self.eat_keyword_ci("<?php") {
            self.skip_trivia();
        }
        if self.at_end() {
            return Ok(Map::new());
        }
        if self.eat_keyword_ci("return") {
            self.skip_trivia();
        }

        let value = self.value()?;
        self.skip_trivia();
        if self.peek() == Some(';') {
            self.pos += 1;
            self.skip_trivia();
        }
        if self.rest().starts_with("?>") {
            self.pos += 2;
            self.skip_trivia();
        }
        if !self.at_end() {
            return Err(self.error("unexpected content after the returned array"));
        }

        match value {
            Value::Map(map) => Ok(map),
            Value::Array(items) => Ok(as_map(&Value::Array(items))),
            other => Err(ConfigError::parse(
                "php",
                format!("file must return an array, found {}", other.kind()),
            )),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        let consumed = &self.src[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit('\n')
            .next()
            .map_or(0, |l| l.chars().count())
            + 1;
        ConfigError::parse_at("php", message, line, column)
    }

    /// Skip whitespace and `//`, `#` and `/* */` comments.
    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") || trimmed.starts_with('#') {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if trimmed.starts_with("/*") {
                self.pos += trimmed.find("*/").map_or(trimmed.len(), |end| end + 2);
            } else {
                return;
            }
        }
    }

    /// Consume `word` (ASCII case-insensitive) if it is next and not followed
    /// by an identifier character.
    fn eat_keyword_ci(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let Some(head) = rest.get(..word.len()) else {
            return false;
        };
        let boundary = rest[word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_ident_char(c));
        if head.eq_ignore_ascii_case(word) && boundary {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_trivia();
        match self.peek() {
            Some('\'') => self.single_quoted().map(Value::String),
            Some('"') => self.double_quoted().map(Value::String),
            Some('[') => {
                self.pos += 1;
                self.array(']')
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(false),
            Some(c @ ('-' | '+')) => {
                self.pos += 1;
                self.skip_trivia();
                let negative = c == '-';
                match self.peek() {
                    Some(d) if d.is_ascii_digit() || d == '.' => self.number(negative),
                    Some(d) if is_ident_char(d) => match self.word()?.to_ascii_uppercase().as_str() {
                        "INF" => Ok(Value::Float(if negative {
                            f64::NEG_INFINITY
                        } else {
                            f64::INFINITY
                        })),
                        _ => Err(self.error("expected a number after sign")),
                    },
                    _ => Err(self.error("expected a number after sign")),
                }
            }
            Some(c) if is_ident_char(c) => {
                let start = self.pos;
                let word = self.word()?;
                match word.to_ascii_lowercase().as_str() {
                    "array" => {
                        self.skip_trivia();
                        if self.peek() != Some('(') {
                            return Err(self.error("expected '(' after array"));
                        }
                        self.pos += 1;
                        self.array(')')
                    }
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    "nan" => Ok(Value::Float(f64::NAN)),
                    "inf" => Ok(Value::Float(f64::INFINITY)),
                    _ => {
                        self.pos = start;
                        Err(self.error(format!("unsupported expression '{word}'")))
                    }
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn word(&mut self) -> Result<String> {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected an identifier"));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    /// Parse array entries after the opening bracket up to `close`.
    fn array(&mut self, close: char) -> Result<Value> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "arrays nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }

        let mut entries: Vec<(Option<String>, Value)> = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.pos += 1;
                break;
            }

            let first = self.value()?;
            self.skip_trivia();
            if self.rest().starts_with("=>") {
                self.pos += 2;
                let key = self.key(first)?;
                let value = self.value()?;
                entries.push((Some(key), value));
            } else {
                entries.push((None, first));
            }

            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }

        self.depth -= 1;
        Ok(build_array(entries))
    }

    /// Convert a key expression the way PHP casts array keys.
    fn key(&self, key: Value) -> Result<String> {
        match key {
            Value::String(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) if f.is_finite() => Ok((f.trunc() as i64).to_string()),
            Value::Bool(b) => Ok(if b { "1" } else { "0" }.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(self.error(format!("{} cannot be used as an array key", other.kind()))),
        }
    }

    fn number(&mut self, negative: bool) -> Result<Value> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_'))
            .unwrap_or(rest.len());
        // Exponent signs: 1.5e-3
        let mut end = len;
        while let Some(sign) = rest[end..].chars().next().filter(|c| *c == '-' || *c == '+') {
            if !rest[..end].ends_with(&['e', 'E'][..]) {
                break;
            }
            let digits = rest[end + sign.len_utf8()..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len() - end - 1);
            end += sign.len_utf8() + digits;
        }

        let literal = rest[..end].replace('_', "");
        // i64::MIN has no positive counterpart, so decimal integers keep their sign
        let is_decimal = literal.bytes().all(|b| b.is_ascii_digit())
            && !(literal.len() > 1 && literal.starts_with('0'));
        if negative && is_decimal {
            if let Ok(i) = format!("-{literal}").parse::<i64>() {
                self.pos += end;
                return Ok(Value::Int(i));
            }
        }
        let parsed = parse_number(&literal)
            .ok_or_else(|| self.error(format!("invalid number '{}'", &rest[..end])))?;
        self.pos += end;

        Ok(match parsed {
            Value::Int(i) if negative => i.checked_neg().map_or(Value::Float(-(i as f64)), Value::Int),
            Value::Float(f) if negative => Value::Float(-f),
            other => other,
        })
    }

    fn single_quoted(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\'' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, e @ ('\'' | '\\'))) => out.push(e),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }
        self.pos = start;
        Err(self.error("unterminated string"))
    }

    fn double_quoted(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => {
                    let Some((_, e)) = chars.next() else {
                        break;
                    };
                    match e {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'v' => out.push('\u{0b}'),
                        'f' => out.push('\u{0c}'),
                        'e' => out.push('\u{1b}'),
                        '0' => out.push('\0'),
                        '\\' | '$' | '"' => out.push(e),
                        'u' if chars.peek().is_some_and(|(_, c)| *c == '{') => {
                            chars.next();
                            let mut hex = String::new();
                            for (_, h) in chars.by_ref() {
                                if h == '}' {
                                    break;
                                }
                                hex.push(h);
                            }
                            let decoded = u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32);
                            match decoded {
                                Some(ch) => out.push(ch),
                                None => {
                                    self.pos = start;
                                    return Err(self.error("invalid unicode escape"));
                                }
                            }
                        }
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
        self.pos = start;
        Err(self.error("unterminated string"))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a PHP integer or float literal without sign or underscores.
fn parse_number(literal: &str) -> Option<Value> {
    let lower = literal.to_ascii_lowercase();
    let radix = |digits: &str, radix: u32| i64::from_str_radix(digits, radix).ok().map(Value::Int);

    if let Some(hex) = lower.strip_prefix("0x") {
        return radix(hex, 16);
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return radix(bin, 2);
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return radix(oct, 8);
    }
    if lower.contains(&['.', 'e'][..]) {
        return lower.parse::<f64>().ok().map(Value::Float);
    }
    if lower.len() > 1 && lower.starts_with('0') {
        return radix(&lower[1..], 8);
    }
    if !lower.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Integers beyond i64 turn into floats, as in PHP
    Some(
        lower
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| lower.parse::<f64>().map_or(Value::Null, Value::Float)),
    )
}

/// Auto-indexed arrays become sequences; anything with explicit keys (or
/// nothing at all) becomes a mapping.
fn build_array(entries: Vec<(Option<String>, Value)>) -> Value {
    if !entries.is_empty() && entries.iter().all(|(key, _)| key.is_none()) {
        return Value::Array(entries.into_iter().map(|(_, v)| v).collect());
    }

    let mut map = Map::with_capacity(entries.len());
    let mut next_index: i64 = 0;
    for (key, value) in entries {
        let key = match key {
            Some(key) => {
                if let Ok(index) = key.parse::<i64>() {
                    next_index = next_index.max(index.saturating_add(1));
                }
                key
            }
            None => {
                let key = next_index.to_string();
                next_index = next_index.saturating_add(1);
                key
            }
        };
        map.insert(key, value);
    }
    Value::Map(map)
}

fn write_indent(out: &mut String, depth: usize) {
    out.push_str(&" ".repeat(depth * PHP_INDENT));
}

fn write_map(out: &mut String, map: &Map, depth: usize) {
    if map.is_empty() {
        out.push_str("array()");
        return;
    }
    out.push_str("array(\n");
    for (key, value) in map {
        write_indent(out, depth + 1);
        out.push_str(&quote(key));
        out.push_str(" => ");
        write_value(out, value, depth + 1);
        out.push_str(",\n");
    }
    write_indent(out, depth);
    out.push(')');
}

fn write_list(out: &mut String, items: &[Value], depth: usize) {
    out.push_str("array(\n");
    for item in items {
        write_indent(out, depth + 1);
        write_value(out, item, depth + 1);
        out.push_str(",\n");
    }
    write_indent(out, depth);
    out.push(')');
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::String(s) => out.push_str(&quote(s)),
        Value::Array(items) if items.is_empty() => out.push_str("array()"),
        Value::Array(items) => write_list(out, items, depth),
        Value::Map(map) => write_map(out, map, depth),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_can_parse() {
        assert!(Php.can_parse("<?php\nreturn array();"));
        assert!(Php.can_parse("  <?PHP return [];"));
        assert!(Php.can_parse("return array('a' => 1);"));
        assert!(!Php.can_parse("<?xml version=\"1.0\"?><config/>"));
        assert!(!Php.can_parse("app:\n    debug: 1\n"));
        assert!(!Php.can_parse("[section]\nreturn = 1\n"));
    }

    #[test]
    fn test_decode_nested_arrays() {
        let map = Php
            .decode(
                "<?php\n// site settings\nreturn array(\n    'app' => array(\n        'debug' => 1,\n        \"name\" => \"My \\\"Hub\\\"\\n\",\n        'ratio' => -0.5,\n        'on' => TRUE,\n        'none' => null, # unset\n    ),\n    'list' => ['a', 'b',],\n    /* block */ 'empty' => array(),\n);\n",
            )
            .unwrap();

        let app = map["app"].as_map().unwrap();
        assert_eq!(app["debug"], Value::Int(1));
        assert_eq!(app["name"], Value::from("My \"Hub\"\n"));
        assert_eq!(app["ratio"], Value::Float(-0.5));
        assert_eq!(app["on"], Value::Bool(true));
        assert_eq!(app["none"], Value::Null);
        assert_eq!(map["list"], Value::from(vec!["a", "b"]));
        assert_eq!(map["empty"], Value::Map(Map::new()));
    }

    #[test]
    fn test_decode_mixed_keys_follow_php_indexing() {
        let map = Php.decode("<?php return ['x', 5 => 'y', 'z', 'k' => 'v'];").unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), ["0", "5", "6", "k"]);
    }

    #[test]
    fn test_decode_numbers() {
        let map = Php
            .decode("<?php return ['hex' => 0x1F, 'oct' => 017, 'bin' => 0b101, 'big' => 1_000, 'exp' => 1.5e-3, 'neg' => -INF];")
            .unwrap();
        assert_eq!(map["hex"], Value::Int(31));
        assert_eq!(map["oct"], Value::Int(15));
        assert_eq!(map["bin"], Value::Int(5));
        assert_eq!(map["big"], Value::Int(1000));
        assert_eq!(map["exp"], Value::Float(0.0015));
        assert_eq!(map["neg"], Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_integer_extremes_stay_integers() {
        let mut map = Map::new();
        map.insert("min".to_string(), Value::Int(i64::MIN));
        map.insert("max".to_string(), Value::Int(i64::MAX));
        map.insert("neg".to_string(), Value::Int(-42));
        let text = Php.encode(&map).unwrap();
        assert!(text.contains("'min' => -9223372036854775808,"));
        assert_eq!(Php.decode(&text).unwrap(), map);

        // One past the range falls back to a float
        let map = Php.decode("<?php return ['x' => -9223372036854775809];").unwrap();
        assert_eq!(map["x"], Value::Float(i64::MIN as f64));
    }

    #[test]
    fn test_decode_errors_carry_location() {
        let err = Php.decode("<?php\nreturn array(\n    'a' => $b,\n);").unwrap_err();
        assert!(err.is_parse());
        assert_eq!(err.location().map(|l| l.line), Some(3));

        let err = Php.decode("<?php return array('a' => 1").unwrap_err();
        assert!(err.to_string().contains("expected"));

        let err = Php.decode("<?php return 'text';").unwrap_err();
        assert!(err.to_string().contains("must return an array"));
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        let depth = MAX_NESTING_DEPTH + 1;
        let text = format!("<?php return {}{};", "[".repeat(depth), "]".repeat(depth));
        let err = Php.decode(&text).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn test_encode_layout() {
        let map = Php
            .decode("<?php return ['app' => ['debug' => 1, 'help' => \"it's\"], 'tags' => ['a'], 'none' => []];")
            .unwrap();
        assert_eq!(
            Php.encode(&map).unwrap(),
            "<?php\n\nreturn array(\n    'app' => array(\n        'debug' => 1,\n        'help' => 'it\\'s',\n    ),\n    'tags' => array(\n        'a',\n    ),\n    'none' => array(),\n);\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let mut map = Map::new();
        map.insert("float".to_string(), Value::Float(2.0));
        map.insert("path".to_string(), Value::from("C:\\dir\\'quoted'"));
        map.insert("unicode".to_string(), Value::from("naïve ☃"));
        map.insert(
            "nested".to_string(),
            Value::from(vec![Value::from(vec![1, 2]), Value::Null]),
        );
        let text = Php.encode(&map).unwrap();
        assert_eq!(Php.decode(&text).unwrap(), map);
    }
}
