//! Operators and queries over [`Configuration`]s.
//!
//! Operators are used with [`Configuration::with`]:
//!
//! ```
//! use dragon_conf::config::{functions, MapSource};
//! use dragon_conf::Configuration;
//!
//! let config = Configuration::builder()
//!     .add_source(MapSource::new("app", [("db.host", "localhost"), ("db.port", "5432")]))
//!     .build()?;
//!
//! let db = config.with(functions::section("db", true))?;
//! assert_eq!(db.get("port")?.as_deref(), Some("5432"));
//! # Ok::<(), dragon_conf::ConfigError>(())
//! ```
//!
//! The derived configurations hold a frozen copy of the filtered values and
//! keep the parent's converters.

use std::collections::{BTreeMap, BTreeSet};

use super::configuration::Configuration;
use super::value::PropertyValue;
use super::ConfigError;

/// Keeps the entries for which `predicate(key, value)` holds.
pub fn filter<P>(predicate: P) -> impl FnOnce(&Configuration) -> Result<Configuration, ConfigError>
where
    P: Fn(&str, &str) -> bool,
{
    move |config: &Configuration| {
        let values = config
            .property_values()?
            .into_iter()
            .filter(|(key, value)| predicate(key, value.value()))
            .collect();
        Ok(config.derive("filtered", values))
    }
}

/// Renames keys; entries the mapper returns `None` for are dropped.
///
/// When two keys map to the same name the later one (in key order) wins.
pub fn map_keys<M>(mapper: M) -> impl FnOnce(&Configuration) -> Result<Configuration, ConfigError>
where
    M: Fn(&str) -> Option<String>,
{
    move |config: &Configuration| {
        let mut values = BTreeMap::new();
        for (key, value) in config.property_values()? {
            if let Some(mapped) = mapper(&key) {
                values.insert(mapped.clone(), value.with_key(mapped));
            }
        }
        Ok(config.derive("mapped", values))
    }
}

/// Keeps the entries below `prefix` (`prefix.*`), optionally stripping it.
pub fn section(
    prefix: &str,
    strip: bool,
) -> impl FnOnce(&Configuration) -> Result<Configuration, ConfigError> {
    sections([prefix.to_string()], strip)
}

/// Keeps the entries below any of the given sections, optionally stripping
/// the section name. When stripped keys collide, later sections win.
pub fn sections<I, S>(
    names: I,
    strip: bool,
) -> impl FnOnce(&Configuration) -> Result<Configuration, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.as_ref().trim_end_matches('.').to_string())
        .collect();

    move |config: &Configuration| {
        let all = config.property_values()?;
        let mut values = BTreeMap::new();
        for name in &names {
            for (key, value) in &all {
                let Some(rest) = section_suffix(key, name) else {
                    continue;
                };
                let key = if strip { rest.to_string() } else { key.clone() };
                values.insert(key.clone(), value.clone().with_key(key));
            }
        }
        Ok(config.derive(&format!("section:{}", names.join(",")), values))
    }
}

/// Merges configurations into one; later configurations win.
///
/// The result uses the converters of the first configuration.
pub fn combine(name: &str, configs: &[Configuration]) -> Result<Configuration, ConfigError> {
    let Some(first) = configs.first() else {
        return Ok(Configuration::empty());
    };
    let mut values: BTreeMap<String, PropertyValue> = BTreeMap::new();
    for config in configs {
        values.extend(config.property_values()?);
    }
    Ok(first.derive(name, values))
}

/// Section names present in the configuration.
///
/// Without `transitive`, only the immediate parent of each key is reported
/// (`a.b` for `a.b.c`); with it, every ancestor (`a` and `a.b`).
pub fn section_names(config: &Configuration, transitive: bool) -> Result<BTreeSet<String>, ConfigError> {
    let mut names = BTreeSet::new();
    for key in config.properties()?.keys() {
        let Some((parent, _)) = key.rsplit_once('.') else {
            continue;
        };
        if transitive {
            let mut end = 0;
            for segment in parent.split('.') {
                end += segment.len();
                names.insert(parent[..end].to_string());
                end += 1;
            }
        } else {
            names.insert(parent.to_string());
        }
    }
    Ok(names)
}

/// Whether `key` lies below `section`.
pub fn is_key_of_section(key: &str, section: &str) -> bool {
    section_suffix(key, section.trim_end_matches('.')).is_some()
}

fn section_suffix<'k>(key: &'k str, section: &str) -> Option<&'k str> {
    if section.is_empty() {
        return Some(key);
    }
    key.strip_prefix(section)?
        .strip_prefix('.')
        .filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::MapSource;

    fn config() -> Configuration {
        Configuration::builder()
            .add_source(MapSource::new(
                "app",
                [
                    ("db.host", "localhost"),
                    ("db.port", "5432"),
                    ("db.pool.size", "4"),
                    ("dbx", "not a section member"),
                    ("web.port", "80"),
                ],
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_filter() {
        let ports = config().with(filter(|key, _| key.ends_with(".port"))).unwrap();
        let props = ports.properties().unwrap();

        assert_eq!(props.len(), 2);
        assert_eq!(props["web.port"], "80");
    }

    #[test]
    fn test_map_keys() {
        let mapped = config()
            .with(map_keys(|key| key.strip_prefix("web.").map(|k| format!("http.{k}"))))
            .unwrap();

        assert_eq!(mapped.get("http.port").unwrap().as_deref(), Some("80"));
        assert_eq!(mapped.properties().unwrap().len(), 1);
        assert_eq!(mapped.get_value("http.port").unwrap().unwrap().key(), "http.port");
    }

    #[test]
    fn test_section_with_and_without_strip() {
        let stripped = config().with(section("db", true)).unwrap();
        assert_eq!(stripped.get("host").unwrap().as_deref(), Some("localhost"));
        assert_eq!(stripped.get_as::<u32>("pool.size").unwrap(), Some(4));
        assert!(stripped.get("dbx").unwrap().is_none());

        let kept = config().with(section("db.", false)).unwrap();
        assert_eq!(kept.properties().unwrap().len(), 3);
        assert!(kept.get("db.port").unwrap().is_some());
    }

    #[test]
    fn test_multiple_sections() {
        let merged = config().with(sections(["db", "web"], true)).unwrap();
        assert_eq!(merged.get("port").unwrap().as_deref(), Some("80"));
        assert_eq!(merged.get("host").unwrap().as_deref(), Some("localhost"));
    }

    #[test]
    fn test_combine() {
        let other = Configuration::builder()
            .add_source(MapSource::new("other", [("web.port", "8080"), ("extra", "1")]))
            .build()
            .unwrap();

        let combined = combine("combined", &[config(), other]).unwrap();
        assert_eq!(combined.get("web.port").unwrap().as_deref(), Some("8080"));
        assert_eq!(combined.get("db.host").unwrap().as_deref(), Some("localhost"));
        assert_eq!(combined.get("extra").unwrap().as_deref(), Some("1"));
        assert_eq!(
            combined.context().property_sources()[0].name(),
            "combined"
        );

        assert!(combine("none", &[]).unwrap().properties().unwrap().is_empty());
    }

    #[test]
    fn test_section_names() {
        let immediate = section_names(&config(), false).unwrap();
        assert_eq!(
            immediate.into_iter().collect::<Vec<_>>(),
            ["db", "db.pool", "web"]
        );

        let transitive = section_names(&config(), true).unwrap();
        assert!(transitive.contains("db"));
        assert!(transitive.contains("db.pool"));
        assert_eq!(transitive.len(), 3);
    }

    #[test]
    fn test_is_key_of_section() {
        assert!(is_key_of_section("db.host", "db"));
        assert!(is_key_of_section("db.pool.size", "db."));
        assert!(!is_key_of_section("dbx", "db"));
        assert!(!is_key_of_section("db", "db"));
    }
}
