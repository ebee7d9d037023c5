use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::builder::ConfigurationBuilder;
use super::combine::OverridingPolicy;
use super::context::ConfigurationContext;
use super::convert::ConverterRegistry;
use super::filter::{apply_filters, FilterContext};
use super::source::{MapSource, PropertySource};
use super::tree::to_table;
use super::value::PropertyValue;
use super::ConfigError;

/// The combined view over all property sources of a [`ConfigurationContext`].
///
/// A lookup combines the values of every source defining the key, in
/// ascending ordinal order, through the combination policy, then runs the
/// result through the filter chain. Cloning is cheap; clones share the
/// same context.
#[derive(Debug, Clone)]
pub struct Configuration {
    context: Arc<ConfigurationContext>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::empty()
    }
}

impl Configuration {
    pub(crate) fn new(context: ConfigurationContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Creates a new configuration builder.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// A configuration without sources; every lookup is empty.
    pub fn empty() -> Self {
        Self::new(ConfigurationContext {
            sources: Vec::new(),
            filters: Vec::new(),
            converters: ConverterRegistry::with_defaults(),
            policy: Arc::new(OverridingPolicy),
        })
    }

    pub fn context(&self) -> &ConfigurationContext {
        &self.context
    }

    /// A builder pre-filled with this configuration's context.
    pub fn to_builder(&self) -> ConfigurationBuilder {
        ConfigurationBuilder::from_context(&self.context)
    }

    /// Combines the value of `key` across all sources, without filtering.
    fn evaluate_raw(&self, key: &str) -> Option<PropertyValue> {
        self.context
            .sources
            .iter()
            .fold(None, |current, source| match source.get(key) {
                Some(candidate) => Some(self.context.policy.combine(current, candidate)),
                None => current,
            })
    }

    /// Looks up a value together with its origin and metadata.
    pub fn get_value(&self, key: &str) -> Result<Option<PropertyValue>, ConfigError> {
        check_key(key)?;
        let Some(raw) = self.evaluate_raw(key) else {
            return Ok(None);
        };
        let lookup = |k: &str| self.evaluate_raw(k);
        let ctx = FilterContext::new(key, true, &lookup);
        apply_filters(&self.context.filters, raw, &ctx)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.get_value(key)?.map(PropertyValue::into_value))
    }

    /// Returns `default` when the key is missing.
    pub fn get_or(&self, key: &str, default: impl Into<String>) -> Result<String, ConfigError> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Converts the value with the registered converters for `T`.
    pub fn get_as<T: 'static>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key)? {
            Some(value) => self.context.converters.convert::<T>(key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`get_as`](Self::get_as), returning `default` when the key is missing.
    ///
    /// A value that is present but cannot be converted is still an error.
    pub fn get_as_or<T: 'static>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    /// Converts the value with `T`'s [`FromStr`] implementation.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::ParseFailed {
                key: key.to_string(),
                value: value.clone(),
                target: type_name::<T>(),
                message: e.to_string(),
            })
    }

    /// Splits a comma separated value and converts each item.
    ///
    /// Items are trimmed, empty items are skipped, and `\,` stands for a
    /// literal comma. A missing key yields an empty list.
    pub fn get_list<T: 'static>(&self, key: &str) -> Result<Vec<T>, ConfigError> {
        let Some(value) = self.get(key)? else {
            return Ok(Vec::new());
        };
        split_list(&value)
            .iter()
            .map(|item| self.context.converters.convert::<T>(key, item))
            .collect()
    }

    /// All filtered values of the scannable sources, with their metadata.
    pub fn property_values(&self) -> Result<BTreeMap<String, PropertyValue>, ConfigError> {
        let mut raw: BTreeMap<String, PropertyValue> = BTreeMap::new();
        for source in self.context.sources.iter().filter(|s| s.is_scannable()) {
            for (key, candidate) in source.properties() {
                let current = raw.remove(&key);
                raw.insert(key, self.context.policy.combine(current, candidate));
            }
        }

        let lookup = |k: &str| raw.get(k).cloned().or_else(|| self.evaluate_raw(k));
        let mut result = BTreeMap::new();
        for (key, value) in &raw {
            let ctx = FilterContext::new(key, false, &lookup);
            if let Some(filtered) = apply_filters(&self.context.filters, value.clone(), &ctx)? {
                result.insert(key.clone(), filtered);
            }
        }
        Ok(result)
    }

    /// All filtered key/value pairs of the scannable sources.
    pub fn properties(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        Ok(PropertyValue::to_string_map(&self.property_values()?))
    }

    /// Applies an operator deriving a new configuration, see [`functions`](super::functions).
    pub fn with<F>(&self, operator: F) -> Result<Configuration, ConfigError>
    where
        F: FnOnce(&Configuration) -> Result<Configuration, ConfigError>,
    {
        operator(self)
    }

    /// Runs a query against this configuration.
    pub fn query<R, F>(&self, query: F) -> R
    where
        F: FnOnce(&Configuration) -> R,
    {
        query(self)
    }

    /// Freezes the current [`properties`](Self::properties) into a new
    /// configuration that no longer follows changes of the sources.
    pub fn snapshot(&self) -> Result<Configuration, ConfigError> {
        Ok(self.derive("snapshot", self.property_values()?))
    }

    /// Deserializes the properties into `T`, nesting dotted keys into tables.
    ///
    /// Scalar strings are coerced first (`"8080"` becomes an integer,
    /// `"true"` a boolean), so numeric-looking values cannot populate
    /// `String` fields.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let table = to_table(&self.properties()?);
        toml::Value::Table(table)
            .try_into()
            .map_err(ConfigError::DeserializeError)
    }

    /// A configuration over fixed, already-filtered values, keeping this
    /// configuration's converters.
    pub(crate) fn derive(&self, name: &str, values: BTreeMap<String, PropertyValue>) -> Configuration {
        let source: Arc<dyn PropertySource> = Arc::new(MapSource::from_values(name, values));
        Self::new(ConfigurationContext {
            sources: vec![source],
            filters: Vec::new(),
            converters: self.context.converters.clone(),
            policy: Arc::new(OverridingPolicy),
        })
    }
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                chars.next();
                current.push(',');
            }
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::filter::HiddenKeyFilter;
    use crate::config::resolve::ReferenceFilter;
    use crate::config::system;
    use crate::config::system::SystemPropertySource;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug)]
    struct Hidden;

    impl PropertySource for Hidden {
        fn name(&self) -> &str {
            "hidden"
        }

        fn default_ordinal(&self) -> i32 {
            500
        }

        fn get(&self, key: &str) -> Option<PropertyValue> {
            (key == "secret").then(|| PropertyValue::new(key, "s3cr3t", "hidden"))
        }

        fn properties(&self) -> BTreeMap<String, PropertyValue> {
            BTreeMap::new()
        }

        fn is_scannable(&self) -> bool {
            false
        }
    }

    fn config() -> Configuration {
        Configuration::builder()
            .add_source(
                MapSource::new(
                    "defaults",
                    [
                        ("server.host", "localhost"),
                        ("server.port", "8080"),
                        ("server.url", "http://${server.host}:${server.port}"),
                        ("features", "a, b\\,c ,,d"),
                        ("_internal", "x"),
                    ],
                )
                .with_ordinal(10),
            )
            .add_source(MapSource::new("overrides", [("server.port", "9090")]).with_ordinal(20))
            .add_source(Hidden)
            .add_filter(ReferenceFilter)
            .add_filter(HiddenKeyFilter::default())
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_resolves_highest_ordinal_and_references() {
        let config = config();

        assert_eq!(config.get("server.port").unwrap().as_deref(), Some("9090"));
        assert_eq!(
            config.get("server.url").unwrap().as_deref(),
            Some("http://localhost:9090")
        );
        let value = config.get_value("server.port").unwrap().unwrap();
        assert_eq!(value.source(), "overrides");
    }

    #[test]
    fn test_missing_key_returns_default() {
        let config = config();

        assert_eq!(config.get("missing").unwrap(), None);
        assert_eq!(config.get_or("missing", "fallback").unwrap(), "fallback");
        assert_eq!(config.get_as_or::<u16>("missing", 7).unwrap(), 7);
        assert_eq!(config.get_or("server.host", "fallback").unwrap(), "localhost");
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(matches!(
            config().get(""),
            Err(ConfigError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_typed_access() {
        let config = config();

        assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(9090));
        assert!(matches!(
            config.get_as::<u16>("server.host"),
            Err(ConfigError::ConversionFailed { .. })
        ));
        assert_eq!(
            config.get_parsed::<std::net::IpAddr>("missing").unwrap(),
            None
        );
        assert!(matches!(
            config.get_parsed::<std::net::IpAddr>("server.host"),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_get_list() {
        let config = config();

        let features: Vec<String> = config.get_list("features").unwrap();
        assert_eq!(features, ["a", "b,c", "d"]);
        assert!(config.get_list::<String>("missing").unwrap().is_empty());
    }

    #[test]
    fn test_non_scannable_sources_only_answer_lookups() {
        let config = config();

        assert_eq!(config.get("secret").unwrap().as_deref(), Some("s3cr3t"));
        assert!(!config.properties().unwrap().contains_key("secret"));
    }

    #[test]
    fn test_properties_are_filtered() {
        let props = config().properties().unwrap();

        assert_eq!(props["server.url"], "http://localhost:9090");
        assert!(!props.contains_key("_internal"));
        assert_eq!(config().get("_internal").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_query_and_with() {
        let config = config();

        let count = config.query(|c| c.properties().map(|p| p.len()).unwrap_or(0));
        assert_eq!(count, 4);

        let same = config.with(|c| Ok(c.clone())).unwrap();
        assert_eq!(same.get("server.port").unwrap().as_deref(), Some("9090"));
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let _toggles = system::test_support::toggles(&[]);
        system::set_property("test.snapshot.frozen", "1");
        let live = Configuration::builder()
            .add_source(SystemPropertySource::new())
            .build()
            .unwrap();
        let snapshot = live.snapshot().unwrap();

        system::set_property("test.snapshot.frozen", "2");

        assert_eq!(live.get("test.snapshot.frozen").unwrap().as_deref(), Some("2"));
        assert_eq!(snapshot.get("test.snapshot.frozen").unwrap().as_deref(), Some("1"));
        system::remove_property("test.snapshot.frozen");
    }

    #[test]
    fn test_deserialize() {
        #[derive(Debug, Deserialize)]
        struct Server {
            host: String,
            port: u16,
            url: String,
        }

        #[derive(Debug, Deserialize)]
        struct App {
            server: Server,
        }

        let app: App = config().deserialize().unwrap();
        assert_eq!(app.server.host, "localhost");
        assert_eq!(app.server.port, 9090);
        assert_eq!(app.server.url, "http://localhost:9090");
    }

    #[test]
    fn test_empty_configuration() {
        let config = Configuration::empty();
        assert!(config.properties().unwrap().is_empty());
        assert_eq!(config.get("anything").unwrap(), None);
    }
}
