//! Process-wide "system properties" and the source exposing them.
//!
//! System properties are a string map owned by the process, typically filled
//! early in `main` (e.g. from `-Dkey=value` style flags) and read by the
//! [`SystemPropertySource`]. They also carry the feature toggles the default
//! sources consult, see [`toggle`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::source::PropertySource;
use super::value::PropertyValue;

pub const SOURCE_NAME: &str = "system-properties";
pub const DEFAULT_ORDINAL: i32 = 1000;

pub const PREFIX_TOGGLE: &str = "dragon.sysprops.prefix";
pub const DISABLE_TOGGLE: &str = "dragon.sysprops.disable";

struct Store {
    properties: RwLock<BTreeMap<String, String>>,
    generation: AtomicU64,
}

static STORE: LazyLock<Store> = LazyLock::new(|| Store {
    properties: RwLock::new(BTreeMap::new()),
    generation: AtomicU64::new(0),
});

fn bump() {
    STORE.generation.fetch_add(1, Ordering::AcqRel);
}

/// Sets a system property, returning the previous value.
pub fn set_property(key: impl Into<String>, value: impl Into<String>) -> Option<String> {
    let previous = STORE.properties.write().insert(key.into(), value.into());
    bump();
    previous
}

pub fn property(key: &str) -> Option<String> {
    STORE.properties.read().get(key).cloned()
}

pub fn remove_property(key: &str) -> Option<String> {
    let previous = STORE.properties.write().remove(key);
    if previous.is_some() {
        bump();
    }
    previous
}

pub fn properties() -> BTreeMap<String, String> {
    STORE.properties.read().clone()
}

pub fn clear_properties() {
    STORE.properties.write().clear();
    bump();
}

/// Counter incremented on every change to the system properties.
pub fn generation() -> u64 {
    STORE.generation.load(Ordering::Acquire)
}

/// Looks up a feature toggle: system properties first, then the environment
/// under the exact name, then under its `UPPER_SNAKE` form.
pub fn toggle(name: &str) -> Option<String> {
    property(name)
        .or_else(|| std::env::var(name).ok())
        .or_else(|| std::env::var(name.replace('.', "_").to_uppercase()).ok())
}

/// Returns true when the toggle is set to `true`, `yes`, `on` or `1`.
pub fn toggle_enabled(name: &str) -> bool {
    toggle(name).is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "on" | "1"
        )
    })
}

#[derive(Debug)]
struct Snapshot {
    generation: u64,
    entries: Arc<BTreeMap<String, PropertyValue>>,
}

/// Exposes the system properties, re-reading them only after a change.
#[derive(Debug, Default)]
pub struct SystemPropertySource {
    prefix: Option<String>,
    cache: Mutex<Option<Snapshot>>,
}

impl SystemPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends `prefix` to every key, overriding [`PREFIX_TOGGLE`].
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            cache: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Arc<BTreeMap<String, PropertyValue>> {
        let current = generation();
        let mut cache = self.cache.lock();
        if let Some(snapshot) = cache.as_ref() {
            if snapshot.generation == current {
                return Arc::clone(&snapshot.entries);
            }
        }

        trace!(generation = current, "refreshing system property snapshot");
        let entries = Arc::new(self.load());
        *cache = Some(Snapshot {
            generation: current,
            entries: Arc::clone(&entries),
        });
        entries
    }

    fn load(&self) -> BTreeMap<String, PropertyValue> {
        if toggle_enabled(DISABLE_TOGGLE) {
            return BTreeMap::new();
        }
        let prefix = self
            .prefix
            .clone()
            .or_else(|| toggle(PREFIX_TOGGLE))
            .unwrap_or_default();
        let now = SystemTime::now();

        properties()
            .into_iter()
            .map(|(k, v)| {
                let key = format!("{prefix}{k}");
                let value = PropertyValue::new(key.clone(), v, SOURCE_NAME).with_timestamp(now);
                (key, value)
            })
            .collect()
    }
}

impl PropertySource for SystemPropertySource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn default_ordinal(&self) -> i32 {
        DEFAULT_ORDINAL
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.snapshot().get(key).cloned()
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.snapshot().as_ref().clone()
    }
}
