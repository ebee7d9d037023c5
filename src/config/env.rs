use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::source::PropertySource;
use super::system::{toggle, toggle_enabled};
use super::value::PropertyValue;

pub const SOURCE_NAME: &str = "environment-properties";
pub const DEFAULT_ORDINAL: i32 = 300;

pub const PREFIX_TOGGLE: &str = "dragon.envprops.prefix";
pub const DISABLE_TOGGLE: &str = "dragon.envprops.disable";

/// Exposes environment variables as configuration entries.
///
/// The variables are captured when the source is created. By default every
/// variable is exposed under its own name; lookups of dotted keys also try
/// the `snake_case` and `UPPER_SNAKE` spellings, so `db.url` finds `DB_URL`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    name: String,
    prefix: String,
    entries: BTreeMap<String, PropertyValue>,
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSource {
    /// Captures the process environment, honoring [`DISABLE_TOGGLE`] and
    /// [`PREFIX_TOGGLE`].
    pub fn new() -> Self {
        if toggle_enabled(DISABLE_TOGGLE) {
            debug!("environment property source disabled");
            return Self::from_vars(std::iter::empty::<(String, String)>());
        }
        let source = Self::from_vars(utf8_vars(std::env::vars_os()));
        match toggle(PREFIX_TOGGLE) {
            Some(prefix) => source.with_prefix(prefix),
            None => source,
        }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let now = SystemTime::now();
        let entries = vars
            .into_iter()
            .map(|(k, v)| {
                let key = k.into();
                let value = PropertyValue::new(key.clone(), v, SOURCE_NAME).with_timestamp(now);
                (key, value)
            })
            .collect();
        Self {
            name: SOURCE_NAME.to_string(),
            prefix: String::new(),
            entries,
        }
    }

    /// Loads variables of the form `PREFIX<sep>A<sep>B` as the key `a.b`.
    ///
    /// Variables without the prefix are ignored. Path segments are
    /// lower-cased, so `MYAPP__DATABASE__HOST` becomes `database.host`.
    pub fn mapped(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self::mapped_from_vars(prefix, separator, utf8_vars(std::env::vars_os()))
    }

    pub fn mapped_from_vars<I>(
        prefix: impl Into<String>,
        separator: impl Into<String>,
        vars: I,
    ) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = prefix.into();
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");

        let prefix_with_sep = format!("{prefix}{separator}");
        let name = format!("{SOURCE_NAME}:{prefix}");
        let now = SystemTime::now();
        let mut entries = BTreeMap::new();

        for (key, value) in vars {
            let Some(path_str) = key.strip_prefix(&prefix_with_sep) else {
                continue;
            };
            if path_str.is_empty() {
                continue;
            }

            let path = path_str
                .split(&separator)
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            let value = PropertyValue::new(path.clone(), value, name.clone()).with_timestamp(now);
            entries.insert(path, value);
        }

        Self {
            name,
            prefix: String::new(),
            entries,
        }
    }

    /// Prepends `prefix` to every exposed key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.entries = std::mem::take(&mut self.entries)
            .into_values()
            .map(|v| {
                let key = format!("{prefix}{}", v.key());
                (key.clone(), v.with_key(key))
            })
            .collect();
        self.prefix = prefix;
        self
    }

    fn lookup_alternatives(&self, key: &str) -> Option<PropertyValue> {
        let rest = key.strip_prefix(self.prefix.as_str())?;
        let snake = rest.replace('.', "_");
        [snake.clone(), rest.to_uppercase(), snake.to_uppercase()]
            .into_iter()
            .filter(|candidate| candidate != rest)
            .find_map(|candidate| self.entries.get(&format!("{}{candidate}", self.prefix)))
            .map(|value| value.clone().with_key(key))
    }
}

/// Keeps the variables whose name and value are valid UTF-8.
fn utf8_vars(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> impl Iterator<Item = (String, String)> {
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                let key = key.unwrap_or_else(|k| k.to_string_lossy().into_owned());
                warn!(variable = %key, "skipping environment variable that is not valid UTF-8");
                None
            }
        })
}

impl PropertySource for EnvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        DEFAULT_ORDINAL
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.entries
            .get(key)
            .cloned()
            .or_else(|| self.lookup_alternatives(key))
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.entries.clone()
    }
}
