use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::info;

use super::{service_context, set_service_context, ServiceError, ServiceRegistry};
use crate::config::Configuration;
use crate::Error;

static CONFIGURATION: LazyLock<ArcSwapOption<Configuration>> = LazyLock::new(ArcSwapOption::empty);
static INIT: Mutex<()> = Mutex::new(());

/// The process-wide configuration, built from the [service
/// context](super::service_context) on first access.
///
/// A failed build is not cached; the next call tries again.
pub fn configuration() -> Result<Configuration, Error> {
    if let Some(config) = CONFIGURATION.load_full() {
        return Ok(Configuration::clone(&config));
    }

    let _guard = INIT.lock();
    if let Some(config) = CONFIGURATION.load_full() {
        return Ok(Configuration::clone(&config));
    }

    let registry = service_context();
    let config = Configuration::builder().add_discovered(&registry).build()?;
    info!(
        sources = config.context().property_sources().len(),
        "global configuration initialized"
    );
    CONFIGURATION.store(Some(Arc::new(config.clone())));
    Ok(config)
}

/// Replaces the process-wide configuration.
pub fn set_configuration(config: Configuration) {
    let _guard = INIT.lock();
    CONFIGURATION.store(Some(Arc::new(config)));
}

/// Drops the process-wide configuration; the next [`configuration`] call
/// rebuilds it.
pub fn reset_configuration() {
    let _guard = INIT.lock();
    CONFIGURATION.store(None);
}

/// Installs a fresh service context holding the defaults plus whatever
/// `register` adds, and rebuilds the process-wide configuration from it.
///
/// Nothing is installed if registration or the build fails.
pub fn bootstrap<F>(register: F) -> Result<Configuration, Error>
where
    F: FnOnce(&ServiceRegistry) -> Result<(), ServiceError>,
{
    let registry = ServiceRegistry::with_defaults();
    register(&registry)?;
    let config = Configuration::builder().add_discovered(&registry).build()?;

    let _guard = INIT.lock();
    set_service_context(Arc::new(registry));
    CONFIGURATION.store(Some(Arc::new(config.clone())));
    info!("service context replaced");
    Ok(config)
}
