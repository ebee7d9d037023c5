//! File-based configuration sources.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use super::source::{configured_ordinal, PropertySource, PropertySourceProvider};
use super::tree::flatten_table;
use super::value::PropertyValue;
use super::{properties, xml, ConfigError};

pub const DEFAULT_ORDINAL: i32 = 100;

/// Resource paths looked up under each root by [`ResourceSourceProvider`].
pub const DEFAULT_RESOURCES: [&str; 3] = [
    "META-INF/javaconfiguration.properties",
    "META-INF/javaconfiguration.xml",
    "META-INF/javaconfiguration.toml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Properties,
    Xml,
    Toml,
}

impl FileFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "properties" => Some(Self::Properties),
            "xml" => Some(Self::Xml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// A configuration source loaded from a `.properties`, `.xml` or `.toml` file.
///
/// Files can be marked as required or optional. Required files that don't exist
/// cause an error; optional files that don't exist yield an empty source.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    ordinal: Option<i32>,
    entries: BTreeMap<String, PropertyValue>,
}

impl FileSource {
    /// Loads the file.
    ///
    /// If `required` is true, loading fails if the file doesn't exist.
    pub fn new(path: impl AsRef<Path>, required: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        let entries = match load_file(&path, required)? {
            Some(entries) => {
                let now = SystemTime::now();
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        let value = PropertyValue::new(k.clone(), v, name.clone())
                            .with_timestamp(now)
                            .with_meta("path", path.display().to_string());
                        (k, value)
                    })
                    .collect()
            }
            None => BTreeMap::new(),
        };
        debug!(source = %name, entries = entries.len(), "loaded config file");

        Ok(Self {
            name,
            path,
            ordinal: None,
            entries,
        })
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PropertySource for FileSource {
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

/// Loads and parses a config file into flat key/value pairs.
///
/// Returns `Ok(None)` if the file doesn't exist and `required` is false.
pub(crate) fn load_file(
    path: &Path,
    required: bool,
) -> Result<Option<BTreeMap<String, String>>, ConfigError> {
    let format =
        FileFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return if required {
                Err(ConfigError::FileNotFound(path.to_path_buf()))
            } else {
                Ok(None)
            };
        }
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    parse_contents(path, format, &contents).map(Some)
}

fn parse_contents(
    path: &Path,
    format: FileFormat,
    contents: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    match format {
        FileFormat::Properties => {
            properties::parse(contents).map_err(|e| ConfigError::PropertiesError {
                path: path.to_path_buf(),
                line: e.line,
                message: e.message,
            })
        }
        FileFormat::Xml => xml::parse(contents).map_err(|message| ConfigError::XmlError {
            path: path.to_path_buf(),
            message,
        }),
        FileFormat::Toml => {
            let table: toml::Table =
                toml::from_str(contents).map_err(|e| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            Ok(flatten_table(&table))
        }
    }
}

/// Provides one [`FileSource`] per default resource found under the roots.
#[derive(Debug, Clone)]
pub struct ResourceSourceProvider {
    roots: Vec<PathBuf>,
    resources: Vec<PathBuf>,
}

impl Default for ResourceSourceProvider {
    /// Looks up [`DEFAULT_RESOURCES`] in the current directory.
    fn default() -> Self {
        Self::new([PathBuf::from(".")])
    }
}

impl ResourceSourceProvider {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            resources: DEFAULT_RESOURCES.iter().map(PathBuf::from).collect(),
        }
    }

    /// Replaces the resource paths looked up under each root.
    pub fn with_resources<I, P>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }
}

impl PropertySourceProvider for ResourceSourceProvider {
    fn property_sources(&self) -> Result<Vec<Arc<dyn PropertySource>>, ConfigError> {
        let mut sources: Vec<Arc<dyn PropertySource>> = Vec::new();
        for root in &self.roots {
            for resource in &self.resources {
                let path = root.join(resource);
                if !path.is_file() {
                    continue;
                }
                sources.push(Arc::new(FileSource::new(&path, true)?));
            }
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, TempDir};

    fn temp_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    fn value(source: &FileSource, key: &str) -> Option<String> {
        source.get(key).map(PropertyValue::into_value)
    }

    #[test]
    fn test_file_source_loads_toml() {
        let file = temp_file(".toml", "key = \"value\"\n[db]\nport = 5432\n");

        let source = FileSource::new(file.path(), true).unwrap();

        assert_eq!(value(&source, "key").as_deref(), Some("value"));
        assert_eq!(value(&source, "db.port").as_deref(), Some("5432"));
        assert_eq!(source.ordinal(), DEFAULT_ORDINAL);
        assert!(source.name().starts_with("file:"));
    }

    #[test]
    fn test_file_source_loads_properties_with_ordinal() {
        let file = temp_file(".properties", "dragon.ordinal=250\na.b=c\n");

        let source = FileSource::new(file.path(), true).unwrap();

        assert_eq!(value(&source, "a.b").as_deref(), Some("c"));
        assert_eq!(source.ordinal(), 250);
    }

    #[test]
    fn test_file_source_loads_xml() {
        let file = temp_file(".xml", "<properties><entry key=\"x\">1</entry></properties>");

        let source = FileSource::new(file.path(), true).unwrap();
        assert_eq!(value(&source, "x").as_deref(), Some("1"));
    }

    #[test]
    fn test_file_source_required_missing() {
        let result = FileSource::new("/nonexistent/path/config.toml", true);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_file_source_optional_missing() {
        let source = FileSource::new("/nonexistent/path/config.toml", false).unwrap();

        assert!(source.properties().is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = FileSource::new("/nonexistent/config.yaml", false);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let file = temp_file(".toml", "key = ");
        let result = FileSource::new(file.path(), true);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_resource_provider_finds_default_resources() {
        let root = TempDir::new().unwrap();
        let meta_inf = root.path().join("META-INF");
        std::fs::create_dir(&meta_inf).unwrap();
        std::fs::write(meta_inf.join("javaconfiguration.properties"), "a=1\n").unwrap();
        std::fs::write(
            meta_inf.join("javaconfiguration.xml"),
            "<properties><entry key=\"b\">2</entry></properties>",
        )
        .unwrap();

        let provider = ResourceSourceProvider::new([root.path()]);
        let sources = provider.property_sources().unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].get("a").unwrap().value(), "1");
        assert_eq!(sources[1].get("b").unwrap().value(), "2");
    }
}
