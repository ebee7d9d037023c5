//! Service discovery and the process-wide configuration.
//!
//! Services (property sources, filters, converter providers, combination
//! policies) are registered explicitly in a [`ServiceRegistry`]. The active
//! registry is the *service context*; the global [`configuration`] is built
//! from it on first access.

pub mod provider;
mod registry;

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

pub use provider::{bootstrap, configuration, reset_configuration, set_configuration};
pub use registry::{ServiceError, ServiceRegistry, DEFAULT_PRIORITY};

static SERVICE_CONTEXT: LazyLock<ArcSwap<ServiceRegistry>> =
    LazyLock::new(|| ArcSwap::from_pointee(ServiceRegistry::with_defaults()));

/// The active service registry.
pub fn service_context() -> Arc<ServiceRegistry> {
    SERVICE_CONTEXT.load_full()
}

/// Replaces the active service registry, returning the previous one.
///
/// An already built global configuration is kept; call
/// [`reset_configuration`] to rebuild it from the new registry.
pub fn set_service_context(registry: Arc<ServiceRegistry>) -> Arc<ServiceRegistry> {
    SERVICE_CONTEXT.swap(registry)
}
