use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("required config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid properties file '{path}' at line {line}: {message}")]
    PropertiesError {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid XML properties file '{path}': {message}")]
    XmlError { path: PathBuf, message: String },

    #[error("unsupported config file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] toml::de::Error),

    #[error("circular reference detected while resolving '{0}'")]
    CircularReference(String),

    #[error("referenced key not found: {0}")]
    ReferenceNotFound(String),

    #[error("invalid reference key: {0:?}")]
    InvalidReferencePath(String),

    #[error("unclosed reference (missing '}}')")]
    UnclosedReference,

    #[error("cannot convert '{value}' of key '{key}' to {target}; supported formats: [{}]", .formats.join(", "))]
    ConversionFailed {
        key: String,
        value: String,
        target: &'static str,
        formats: Vec<String>,
    },

    #[error("cannot parse '{value}' of key '{key}' as {target}: {message}")]
    ParseFailed {
        key: String,
        value: String,
        target: &'static str,
        message: String,
    },

    #[error("no converter registered for {0}")]
    NoConverter(&'static str),

    #[error("property source already registered: {0}")]
    DuplicateSource(String),

    #[error("unknown property source: {0}")]
    UnknownSource(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transaction {0} is already running")]
    TransactionActive(String),

    #[error("no transaction is running")]
    NoTransaction,

    #[error("no writable property source accepted the change")]
    NoMutableTarget,
}
