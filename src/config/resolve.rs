//! Variable reference resolution for configuration values.
//!
//! Supports `${other.key}` syntax for cross-referencing values within config.
//! Use `$${...}` to escape and produce a literal `${...}`.

use super::filter::{FilterContext, PropertyFilter};
use super::value::PropertyValue;
use super::ConfigError;

/// Replaces `${key}` references with the value of `key`.
///
/// References are looked up in the raw configuration and resolved
/// recursively. A reference back to a key that is currently being resolved
/// fails with [`ConfigError::CircularReference`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceFilter;

impl PropertyFilter for ReferenceFilter {
    fn filter(
        &self,
        value: PropertyValue,
        ctx: &FilterContext<'_>,
    ) -> Result<Option<PropertyValue>, ConfigError> {
        if !value.value().contains('$') {
            return Ok(Some(value));
        }
        let mut stack = vec![ctx.key().to_string()];
        let resolved = resolve_string(value.value(), ctx, &mut stack)?;
        Ok(Some(value.with_value(resolved)))
    }
}

/// Resolves all `${...}` references in a string.
/// Handles `$$` escape sequences.
fn resolve_string(
    s: &str,
    ctx: &FilterContext<'_>,
    stack: &mut Vec<String>,
) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                let key = consume_until(&mut chars, '}').ok_or(ConfigError::UnclosedReference)?;
                result.push_str(&lookup_key(key.trim(), ctx, stack)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Consumes characters until the delimiter, returning the collected string.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None
}

fn lookup_key(
    key: &str,
    ctx: &FilterContext<'_>,
    stack: &mut Vec<String>,
) -> Result<String, ConfigError> {
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(ConfigError::InvalidReferencePath(key.to_string()));
    }
    if stack.iter().any(|k| k == key) {
        return Err(ConfigError::CircularReference(key.to_string()));
    }

    let raw = ctx
        .raw(key)
        .ok_or_else(|| ConfigError::ReferenceNotFound(key.to_string()))?;

    stack.push(key.to_string());
    let resolved = resolve_string(raw.value(), ctx, stack);
    stack.pop();
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn resolve(entries: &[(&str, &str)], key: &str) -> Result<String, ConfigError> {
        let map: BTreeMap<String, PropertyValue> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::new(*k, *v, "test")))
            .collect();
        let lookup = |k: &str| map.get(k).cloned();
        let ctx = FilterContext::new(key, true, &lookup);
        let value = map[key].clone();
        ReferenceFilter
            .filter(value, &ctx)
            .map(|v| v.unwrap().into_value())
    }

    #[test]
    fn test_simple_reference() {
        let resolved = resolve(&[("host", "localhost"), ("url", "http://${host}/api")], "url");
        assert_eq!(resolved.unwrap(), "http://localhost/api");
    }

    #[test]
    fn test_nested_path() {
        let resolved = resolve(
            &[
                ("server.host", "example.com"),
                ("server.port", "8080"),
                ("client.endpoint", "https://${server.host}:${ server.port }"),
            ],
            "client.endpoint",
        );
        assert_eq!(resolved.unwrap(), "https://example.com:8080");
    }

    #[test]
    fn test_chained_references() {
        let resolved = resolve(&[("a", "hello"), ("b", "${a} world"), ("c", "${b}!")], "c");
        assert_eq!(resolved.unwrap(), "hello world!");
    }

    #[test]
    fn test_escape_sequence() {
        let resolved = resolve(&[("value", "use $${VAR} for env vars, costs $5")], "value");
        assert_eq!(resolved.unwrap(), "use ${VAR} for env vars, costs $5");
    }

    #[test]
    fn test_circular_reference() {
        let result = resolve(&[("a", "${b}"), ("b", "${a}")], "a");
        assert!(matches!(result, Err(ConfigError::CircularReference(k)) if k == "a"));
    }

    #[test]
    fn test_self_reference() {
        let result = resolve(&[("a", "x${a}")], "a");
        assert!(matches!(result, Err(ConfigError::CircularReference(_))));
    }

    #[test]
    fn test_missing_reference() {
        let result = resolve(&[("url", "${nonexistent.path}")], "url");
        assert!(matches!(result, Err(ConfigError::ReferenceNotFound(_))));
    }

    #[test]
    fn test_invalid_reference() {
        let result = resolve(&[("url", "${a..b}")], "url");
        assert!(matches!(result, Err(ConfigError::InvalidReferencePath(_))));
    }

    #[test]
    fn test_unclosed_reference() {
        let result = resolve(&[("url", "${host")], "url");
        assert!(matches!(result, Err(ConfigError::UnclosedReference)));
    }

    #[test]
    fn test_same_key_referenced_twice_is_not_circular() {
        let resolved = resolve(&[("a", "x"), ("b", "${a}-${a}")], "b");
        assert_eq!(resolved.unwrap(), "x-x");
    }
}
