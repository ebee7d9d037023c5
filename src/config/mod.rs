//! Configuration sources, their combination, and typed access.

mod builder;
pub mod cli;
mod combine;
mod configuration;
mod context;
mod convert;
pub mod env;
mod error;
pub mod file;
mod filter;
pub mod functions;
pub(crate) mod properties;
mod resolve;
mod source;
pub mod system;
mod tree;
mod value;
pub(crate) mod xml;

pub use builder::{ConfigurationBuilder, DEFAULTS_DISABLE_TOGGLE};
pub use cli::CliSource;
pub use combine::{CombinationPolicy, JoiningPolicy, OverridingPolicy};
pub use configuration::Configuration;
pub use context::ConfigurationContext;
pub use convert::{ConversionContext, ConverterProvider, ConverterRegistry, PropertyConverter};
pub use env::EnvSource;
pub use error::ConfigError;
pub use file::{FileFormat, FileSource, ResourceSourceProvider};
pub use filter::{filter_fn, FilterContext, FnFilter, HiddenKeyFilter, PropertyFilter, RawLookup};
pub use resolve::ReferenceFilter;
pub use source::{
    compare_sources, configured_ordinal, MapSource, PropertySource, PropertySourceProvider,
    DEFAULT_ORDINAL, ORDINAL_KEY,
};
pub use system::SystemPropertySource;
pub use value::{PropertyValue, META_TIMESTAMP};
