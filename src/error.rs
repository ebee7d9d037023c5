use crate::config::ConfigError;
use crate::spi::ServiceError;
use thiserror::Error;

/// Top-level error type for the dragon-conf library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("service registry error: {0}")]
    Service(#[from] ServiceError),
}
