use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::system::toggle_enabled;
use crate::config::{
    CliSource, CombinationPolicy, EnvSource, OverridingPolicy,
    PropertyFilter, PropertySource, PropertySourceProvider, ReferenceFilter,
    ResourceSourceProvider, SystemPropertySource, DEFAULTS_DISABLE_TOGGLE,
};

/// Priority of the services registered by [`ServiceRegistry::with_defaults`].
pub const DEFAULT_PRIORITY: i32 = 0;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("service '{name}' already registered for {service}")]
    Duplicate { service: &'static str, name: String },
}

type AnyService = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn() -> AnyService + Send + Sync>;

struct ServiceEntry {
    name: String,
    priority: i32,
    factory: Factory,
    // holds an `Arc<S>` for the keyed service type `S`
    instance: OnceLock<AnyService>,
}

impl ServiceEntry {
    fn instance(&self) -> &AnyService {
        self.instance.get_or_init(|| {
            debug!(service = %self.name, "instantiating service");
            (self.factory)()
        })
    }
}

/// A registry of services keyed by the (usually trait object) type they
/// provide, e.g. `dyn PropertySource`.
///
/// Services are listed by descending priority, ties broken by name. Services
/// registered through a factory are created on first lookup and cached.
///
/// ```
/// use std::sync::Arc;
/// use dragon_conf::config::{MapSource, PropertySource};
/// use dragon_conf::spi::ServiceRegistry;
///
/// let registry = ServiceRegistry::new();
/// let source: Arc<dyn PropertySource> = Arc::new(MapSource::new("app", [("a", "1")]));
/// registry.register("app", 10, source)?;
///
/// assert_eq!(registry.services::<dyn PropertySource>().len(), 1);
/// # Ok::<(), dragon_conf::spi::ServiceError>(())
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<TypeId, Vec<Arc<ServiceEntry>>>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut list = f.debug_list();
        for entry in entries.values().flatten() {
            list.entry(&(&entry.name, entry.priority));
        }
        list.finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the default property sources (unless
    /// `dragon.defaults.disable` is set), the reference filter and the
    /// overriding combination policy.
    pub fn with_defaults() -> Self {
        let registry = Self::new();

        if !toggle_enabled(DEFAULTS_DISABLE_TOGGLE) {
            registry.register_default::<dyn PropertySource, _>(
                "command-line-args",
                DEFAULT_PRIORITY,
                || -> Arc<dyn PropertySource> { Arc::new(CliSource::from_main_args()) },
            );
            registry.register_default::<dyn PropertySource, _>(
                "system-properties",
                DEFAULT_PRIORITY,
                || -> Arc<dyn PropertySource> { Arc::new(SystemPropertySource::new()) },
            );
            registry.register_default::<dyn PropertySource, _>(
                "environment-properties",
                DEFAULT_PRIORITY,
                || -> Arc<dyn PropertySource> { Arc::new(EnvSource::new()) },
            );
            registry.register_default::<dyn PropertySourceProvider, _>(
                "default-resources",
                DEFAULT_PRIORITY,
                || -> Arc<dyn PropertySourceProvider> {
                    Arc::new(ResourceSourceProvider::default())
                },
            );
        }
        registry.register_default::<dyn PropertyFilter, _>(
            "references",
            DEFAULT_PRIORITY,
            || -> Arc<dyn PropertyFilter> { Arc::new(ReferenceFilter) },
        );
        registry.register_default::<dyn CombinationPolicy, _>(
            "overriding",
            DEFAULT_PRIORITY,
            || -> Arc<dyn CombinationPolicy> { Arc::new(OverridingPolicy) },
        );

        registry
    }

    /// Registers a ready-made service under `name`.
    pub fn register<S>(&self, name: impl Into<String>, priority: i32, service: Arc<S>) -> Result<(), ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_factory(name, priority, move || Arc::clone(&service))
    }

    /// Registers a service created by `factory` on first lookup.
    pub fn register_factory<S, F>(
        &self,
        name: impl Into<String>,
        priority: i32,
        factory: F,
    ) -> Result<(), ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<S> + Send + Sync + 'static,
    {
        let entry = Arc::new(ServiceEntry {
            name: name.into(),
            priority,
            factory: Box::new(move || -> AnyService { Arc::new(factory()) }),
            instance: OnceLock::new(),
        });

        let mut entries = self.entries.write();
        let list = entries.entry(TypeId::of::<S>()).or_default();
        if list.iter().any(|e| e.name == entry.name) {
            return Err(ServiceError::Duplicate {
                service: type_name::<S>(),
                name: entry.name.clone(),
            });
        }
        debug!(service = type_name::<S>(), name = %entry.name, priority, "registering service");
        let index = list
            .iter()
            .position(|e| e.priority < priority || (e.priority == priority && e.name > entry.name))
            .unwrap_or(list.len());
        list.insert(index, entry);
        Ok(())
    }

    fn register_default<S, F>(&self, name: &str, priority: i32, factory: F)
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<S> + Send + Sync + 'static,
    {
        if let Err(e) = self.register_factory(name, priority, factory) {
            warn!(error = %e, "default service not registered");
        }
    }

    /// Removes the service registered under `name`, returning whether it existed.
    pub fn unregister<S>(&self, name: &str) -> bool
    where
        S: ?Sized + 'static,
    {
        let mut entries = self.entries.write();
        let Some(list) = entries.get_mut(&TypeId::of::<S>()) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.name != name);
        before != list.len()
    }

    fn entries<S: ?Sized + 'static>(&self) -> Vec<Arc<ServiceEntry>> {
        self.entries
            .read()
            .get(&TypeId::of::<S>())
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the services registered for `S`, in priority order.
    pub fn names<S: ?Sized + 'static>(&self) -> Vec<String> {
        self.entries::<S>().iter().map(|e| e.name.clone()).collect()
    }

    pub fn contains<S: ?Sized + 'static>(&self) -> bool {
        !self.entries::<S>().is_empty()
    }

    /// All services for `S`, highest priority first.
    pub fn services<S>(&self) -> Vec<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.entries::<S>()
            .iter()
            .filter_map(|e| e.instance().downcast_ref::<Arc<S>>().cloned())
            .collect()
    }

    /// The highest-priority service for `S`.
    ///
    /// When several services share the highest priority the one with the
    /// smallest name is returned and a warning is logged.
    pub fn service<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries::<S>();
        let first = entries.first()?;
        if let Some(second) = entries.get(1).filter(|e| e.priority == first.priority) {
            warn!(
                service = type_name::<S>(),
                chosen = %first.name,
                other = %second.name,
                priority = first.priority,
                "several services share the highest priority"
            );
        }
        first.instance().downcast_ref::<Arc<S>>().cloned()
    }
}
