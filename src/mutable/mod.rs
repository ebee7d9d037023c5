//! Writable configuration.
//!
//! A [`MutableConfiguration`] wraps a [`Configuration`](crate::Configuration)
//! and routes changes, optionally grouped into a transaction, to the
//! [`MutablePropertySource`]s it contains. Which of them receive a change is
//! decided by a [`ChangePropagationPolicy`].

mod change;
mod configuration;
mod policy;
mod source;

pub use change::ConfigChangeRequest;
pub use configuration::MutableConfiguration;
pub use policy::ChangePropagationPolicy;
pub use source::{MutableFileSource, MutableMapSource};

use crate::config::{ConfigError, PropertySource};

/// A property source that accepts changes.
///
/// Implementations return `Some(self)` from
/// [`PropertySource::as_mutable`] so they can be found inside a built
/// configuration.
pub trait MutablePropertySource: PropertySource {
    /// Applies all puts and removals of `change` at once.
    ///
    /// On error the source keeps its previous state.
    fn apply_change(&self, change: &ConfigChangeRequest) -> Result<(), ConfigError>;
}
