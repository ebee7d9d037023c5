pub mod config;
mod error;
pub mod mutable;
pub mod spi;

pub use config::{ConfigError, Configuration, ConfigurationBuilder};
pub use error::Error;
