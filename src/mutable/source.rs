use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{ConfigChangeRequest, MutablePropertySource};
use crate::config::file::load_file;
use crate::config::{
    configured_ordinal, properties, xml, ConfigError, FileFormat, PropertySource, PropertyValue,
    DEFAULT_ORDINAL,
};

/// Metadata key naming the transaction that last wrote an entry.
const META_TRANSACTION: &str = "transaction";

fn to_values(
    source: &str,
    entries: BTreeMap<String, String>,
    change: Option<&ConfigChangeRequest>,
) -> BTreeMap<String, PropertyValue> {
    let now = SystemTime::now();
    entries
        .into_iter()
        .map(|(k, v)| {
            let mut value = PropertyValue::new(k.clone(), v, source).with_timestamp(now);
            if let Some(change) = change.filter(|c| c.added().contains_key(&k)) {
                value = value.with_meta(META_TRANSACTION, change.id());
            }
            (k, value)
        })
        .collect()
}

/// An in-memory source that accepts changes.
#[derive(Debug)]
pub struct MutableMapSource {
    name: String,
    ordinal: Option<i32>,
    entries: RwLock<BTreeMap<String, PropertyValue>>,
}

impl MutableMapSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_entries<I, K, V>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        *self.entries.write() = to_values(&self.name, entries, None);
        self
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }
}

impl PropertySource for MutableMapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
            .or_else(|| configured_ordinal(self))
            .unwrap_or(DEFAULT_ORDINAL)
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.entries.read().get(key).cloned()
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.entries.read().clone()
    }

    fn as_mutable(&self) -> Option<&dyn MutablePropertySource> {
        Some(self)
    }
}

impl MutablePropertySource for MutableMapSource {
    fn apply_change(&self, change: &ConfigChangeRequest) -> Result<(), ConfigError> {
        let mut entries = self.entries.write();
        for key in change.removed() {
            entries.remove(key);
        }
        let added = change.added().clone();
        entries.extend(to_values(&self.name, added, Some(change)));
        Ok(())
    }
}

/// A `.properties` or `.xml` file that is rewritten on every change.
///
/// A missing file is treated as empty and created by the first change.
#[derive(Debug)]
pub struct MutableFileSource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    ordinal: Option<i32>,
    entries: RwLock<BTreeMap<String, PropertyValue>>,
}

impl MutableFileSource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let format = match FileFormat::from_path(&path) {
            Some(format @ (FileFormat::Properties | FileFormat::Xml)) => format,
            _ => return Err(ConfigError::UnsupportedFormat(path)),
        };
        let name = format!("file:{}", path.display());
        let entries = load_file(&path, false)?.unwrap_or_default();
        debug!(source = %name, entries = entries.len(), "loaded writable config file");

        Ok(Self {
            entries: RwLock::new(to_values(&name, entries, None)),
            name,
            path,
            format,
            ordinal: None,
        })
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, String>, change: &ConfigChangeRequest) -> Result<(), ConfigError> {
        let comment = format!("written by transaction {}", change.id());
        let contents = match self.format {
            FileFormat::Xml => xml::write(entries, Some(&comment)),
            _ => properties::write(entries, Some(&comment)),
        };
        let write_error = |source| ConfigError::WriteError {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        std::fs::write(&self.path, contents).map_err(write_error)
    }
}

impl PropertySource for MutableFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
            .or_else(|| configured_ordinal(self))
            .unwrap_or(crate::config::file::DEFAULT_ORDINAL)
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.entries.read().get(key).cloned()
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.entries.read().clone()
    }

    fn as_mutable(&self) -> Option<&dyn MutablePropertySource> {
        Some(self)
    }
}

impl MutablePropertySource for MutableFileSource {
    fn apply_change(&self, change: &ConfigChangeRequest) -> Result<(), ConfigError> {
        let mut entries = self.entries.write();
        let mut updated = PropertyValue::to_string_map(&entries);
        change.apply_to(&mut updated);

        self.write(&updated, change)?;
        info!(path = %self.path.display(), transaction = change.id(), "config file updated");

        let previous = std::mem::take(&mut *entries);
        *entries = to_values(&self.name, updated, Some(change))
            .into_iter()
            .map(|(key, value)| match previous.get(&key) {
                Some(old) if old.value() == value.value() => (key, old.clone()),
                _ => (key, value),
            })
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn change(id: &str, puts: &[(&str, &str)], removes: &[&str]) -> ConfigChangeRequest {
        let mut change = ConfigChangeRequest::new(id);
        change.put_all(puts.iter().copied());
        for key in removes {
            change.remove(*key);
        }
        change
    }

    #[test]
    fn test_map_source_apply_change() {
        let source = MutableMapSource::new("runtime").with_entries([("a", "1"), ("b", "2")]);
        source
            .apply_change(&change("tx-a", &[("a", "10"), ("c", "3")], &["b"]))
            .unwrap();

        let props = source.properties();
        assert_eq!(props.len(), 2);
        assert_eq!(props["a"].value(), "10");
        assert_eq!(props["a"].meta(META_TRANSACTION), Some("tx-a"));
        assert_eq!(props["c"].source(), "runtime");
        assert!(source.as_mutable().is_some());
    }

    #[test]
    fn test_file_source_writes_properties() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.properties");
        std::fs::write(&path, "keep = yes\ndrop = me\n").unwrap();

        let source = MutableFileSource::new(&path).unwrap();
        assert_eq!(source.get("keep").unwrap().value(), "yes");
        assert_eq!(source.ordinal(), 100);

        source
            .apply_change(&change("tx-f", &[("new.key", "a b")], &["drop"]))
            .unwrap();
        assert!(source.get("drop").is_none());

        let reloaded = MutableFileSource::new(&path).unwrap().properties();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded["new.key"].value(), "a b");
        assert_eq!(reloaded["keep"].value(), "yes");
    }

    #[test]
    fn test_file_source_creates_missing_xml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.xml");

        let source = MutableFileSource::new(&path).unwrap();
        assert!(source.properties().is_empty());

        source.apply_change(&change("tx-x", &[("k", "<v>")], &[])).unwrap();
        let reloaded = MutableFileSource::new(&path).unwrap();
        assert_eq!(reloaded.get("k").unwrap().value(), "<v>");
    }

    #[test]
    fn test_file_source_rejects_toml() {
        let result = MutableFileSource::new("config.toml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_failed_write_keeps_state() {
        let dir = TempDir::new().unwrap();
        // a directory where the file should be makes the write fail
        let path = dir.path().join("blocked.properties");
        std::fs::create_dir(&path).unwrap();
        let source = MutableFileSource {
            name: "file:blocked".into(),
            path: path.clone(),
            format: FileFormat::Properties,
            ordinal: None,
            entries: RwLock::new(BTreeMap::new()),
        };

        let result = source.apply_change(&change("tx-w", &[("k", "v")], &[]));
        assert!(matches!(result, Err(ConfigError::WriteError { .. })));
        assert!(source.get("k").is_none());
    }
}
