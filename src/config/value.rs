use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata entry recording when the owning source loaded a value,
/// in milliseconds since the Unix epoch.
pub const META_TIMESTAMP: &str = "_timestamp";

/// A single configuration entry together with where it came from.
///
/// Values are immutable; the `with_*` methods return modified copies, which
/// is how filters and combination policies derive new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    key: String,
    value: String,
    source: String,
    metadata: BTreeMap<String, String>,
}

impl PropertyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Name of the property source this value originated from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Stamps the value with the given load time.
    pub fn with_timestamp(self, at: SystemTime) -> Self {
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.with_meta(META_TIMESTAMP, millis.to_string())
    }

    pub fn into_value(self) -> String {
        self.value
    }

    /// Strips a map of property values down to plain key/value strings.
    pub fn to_string_map(map: &BTreeMap<String, PropertyValue>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_methods_leave_original_untouched() {
        let original = PropertyValue::new("a", "1", "test");
        let changed = original.clone().with_value("2").with_meta("origin", "unit");

        assert_eq!(original.value(), "1");
        assert!(original.metadata().is_empty());
        assert_eq!(changed.value(), "2");
        assert_eq!(changed.meta("origin"), Some("unit"));
        assert_eq!(changed.source(), "test");
    }

    #[test]
    fn test_timestamp_metadata() {
        let value = PropertyValue::new("a", "1", "test").with_timestamp(UNIX_EPOCH);
        assert_eq!(value.meta(META_TIMESTAMP), Some("0"));
    }
}
