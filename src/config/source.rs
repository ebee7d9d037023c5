use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::warn;

use super::value::PropertyValue;
use super::ConfigError;
use crate::mutable::MutablePropertySource;

/// Key a source may define to override its own ordinal.
pub const ORDINAL_KEY: &str = "dragon.ordinal";

pub const DEFAULT_ORDINAL: i32 = 0;

/// A named collection of configuration entries.
///
/// Sources are combined in ascending [`ordinal`](Self::ordinal) order, so with
/// the default combination policy the source with the highest ordinal wins.
pub trait PropertySource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Ordinal used when the source does not define [`ORDINAL_KEY`].
    fn default_ordinal(&self) -> i32 {
        DEFAULT_ORDINAL
    }

    fn ordinal(&self) -> i32 {
        configured_ordinal(self).unwrap_or_else(|| self.default_ordinal())
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties().remove(key)
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue>;

    /// Non-scannable sources only answer single-key lookups and are left
    /// out of [`properties`](crate::Configuration::properties).
    fn is_scannable(&self) -> bool {
        true
    }

    fn as_mutable(&self) -> Option<&dyn MutablePropertySource> {
        None
    }
}

/// Supplies several property sources at once, e.g. one per resource file found.
pub trait PropertySourceProvider: Send + Sync + fmt::Debug {
    fn property_sources(&self) -> Result<Vec<Arc<dyn PropertySource>>, ConfigError>;
}

/// Reads [`ORDINAL_KEY`] from the source, if present and numeric.
pub fn configured_ordinal<S: PropertySource + ?Sized>(source: &S) -> Option<i32> {
    let value = source.get(ORDINAL_KEY)?;
    match value.value().trim().parse::<i32>() {
        Ok(ordinal) => Some(ordinal),
        Err(_) => {
            warn!(
                source = source.name(),
                value = value.value(),
                "ignoring non-numeric {ORDINAL_KEY}"
            );
            None
        }
    }
}

/// Orders sources by ascending ordinal, breaking ties by name.
pub fn compare_sources(a: &dyn PropertySource, b: &dyn PropertySource) -> Ordering {
    a.ordinal()
        .cmp(&b.ordinal())
        .then_with(|| a.name().cmp(b.name()))
}

/// An in-memory property source.
#[derive(Debug, Clone)]
pub struct MapSource {
    name: String,
    ordinal: Option<i32>,
    entries: BTreeMap<String, PropertyValue>,
}

impl MapSource {
    pub fn new<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let now = SystemTime::now();
        let entries = entries
            .into_iter()
            .map(|(k, v)| {
                let key = k.into();
                let value = PropertyValue::new(key.clone(), v, name.clone()).with_timestamp(now);
                (key, value)
            })
            .collect();
        Self {
            name,
            ordinal: None,
            entries,
        }
    }

    /// Wraps already-built values, keeping their origin and metadata.
    pub fn from_values(name: impl Into<String>, entries: BTreeMap<String, PropertyValue>) -> Self {
        Self {
            name: name.into(),
            ordinal: None,
            entries,
        }
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    /// Prepends `prefix` to every key.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if prefix.is_empty() {
            return self;
        }
        self.entries = std::mem::take(&mut self.entries)
            .into_values()
            .map(|v| {
                let key = format!("{prefix}{}", v.key());
                (key.clone(), v.with_key(key))
            })
            .collect();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PropertySource for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
            .or_else(|| configured_ordinal(self))
            .unwrap_or(DEFAULT_ORDINAL)
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.entries.get(key).cloned()
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.entries.clone()
    }
}
