//! Conversion between flat dotted keys and nested TOML tables.

use std::collections::BTreeMap;

use toml::{Table, Value};

/// Builds a nested table from flat `a.b.c` keys, coercing scalar values.
///
/// When a key is both a leaf and a parent (`a` and `a.b`), the table wins.
pub(crate) fn to_table(properties: &BTreeMap<String, String>) -> Table {
    let mut table = Table::new();
    for (key, value) in properties {
        let path: Vec<String> = key.split('.').map(str::to_string).collect();
        merge_at_path(&mut table, &path, coerce_value(value));
    }
    table
}

/// Flattens a nested table into dotted keys.
///
/// Arrays of scalars are joined with `,` (embedded commas escaped as `\,`);
/// other array elements are addressed by index.
pub(crate) fn flatten_table(table: &Table) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in table {
        flatten_value(key, value, &mut out);
    }
    out
}

fn flatten_value(key: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Table(nested) => {
            for (k, v) in nested {
                flatten_value(&format!("{key}.{k}"), v, out);
            }
        }
        Value::Array(items) if items.iter().all(is_scalar) => {
            let joined = items
                .iter()
                .filter_map(scalar_to_string)
                .map(|s| s.replace(',', "\\,"))
                .collect::<Vec<_>>()
                .join(",");
            out.insert(key.to_string(), joined);
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_value(&format!("{key}.{i}"), item, out);
            }
        }
        scalar => {
            if let Some(s) = scalar_to_string(scalar) {
                out.insert(key.to_string(), s);
            }
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Table(_))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(dt) => Some(dt.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

pub(crate) fn merge_at_path(table: &mut Table, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        if let Value::Table(overlay) = value {
            deep_merge(table, overlay);
        }
        return;
    };

    if rest.is_empty() {
        match (table.get_mut(first), value) {
            (Some(Value::Table(base)), Value::Table(overlay)) => deep_merge(base, overlay),
            // an existing section is never replaced by a scalar
            (Some(Value::Table(_)), _) => {}
            (_, value) => {
                table.insert(first.clone(), value);
            }
        }
        return;
    }

    if !matches!(table.get(first), Some(Value::Table(_))) {
        table.insert(first.clone(), Value::Table(Table::new()));
    }

    if let Some(Value::Table(nested)) = table.get_mut(first) {
        merge_at_path(nested, rest, value);
    }
}

fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(base_table)), Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Coerces a string to the most specific scalar: boolean, integer, float, or string.
pub(crate) fn coerce_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Boolean(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Boolean(false);
    }

    if looks_like_integer(s) {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Integer(i);
        }
    }

    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
    }

    Value::String(s.to_string())
}

fn looks_like_integer(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_to_table_nests_and_coerces() {
        let table = to_table(&props(&[
            ("server.host", "localhost"),
            ("server.port", "8080"),
            ("debug", "TRUE"),
            ("ratio", "0.5"),
        ]));

        assert_eq!(table["server"]["host"].as_str(), Some("localhost"));
        assert_eq!(table["server"]["port"].as_integer(), Some(8080));
        assert_eq!(table["debug"].as_bool(), Some(true));
        assert_eq!(table["ratio"].as_float(), Some(0.5));
    }

    #[test]
    fn test_section_wins_over_leaf() {
        let table = to_table(&props(&[("a", "leaf"), ("a.b", "nested")]));
        assert_eq!(table["a"]["b"].as_str(), Some("nested"));
    }

    #[test]
    fn test_flatten_table() {
        let table: Table = toml::from_str(
            r#"
            name = "app"
            tags = ["x", "y,z"]

            [db]
            port = 5432

            [[users]]
            name = "ann"
            "#,
        )
        .unwrap();

        let flat = flatten_table(&table);
        assert_eq!(flat["name"], "app");
        assert_eq!(flat["tags"], "x,y\\,z");
        assert_eq!(flat["db.port"], "5432");
        assert_eq!(flat["users.0.name"], "ann");
    }

    #[test]
    fn test_negative_integer_and_plain_string() {
        assert_eq!(coerce_value("-12"), Value::Integer(-12));
        assert_eq!(coerce_value("1.2.3"), Value::String("1.2.3".into()));
        assert_eq!(coerce_value("-"), Value::String("-".into()));
    }
}
