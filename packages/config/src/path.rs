//! Dot-notation path handling.

use crate::config::PATH_SEPARATOR;
use crate::value::Value;

/// Split a path into its segments, dropping empty ones.
///
/// # Examples
/// ```
/// use cms_config::path::segments;
///
/// assert_eq!(segments("app.debug"), vec!["app", "debug"]);
/// assert_eq!(segments("a..b."), vec!["a", "b"]);
/// assert!(segments("").is_empty());
/// ```
pub fn segments(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Join a parent path and a key with the given separator.
pub fn join(prefix: &str, key: &str, separator: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{separator}{key}")
    }
}

/// Descend one level: a mapping key, or a decimal index into a sequence.
pub(crate) fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Map(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Mutable variant of [`child`].
pub(crate) fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Map(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}
