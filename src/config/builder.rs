use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::cli::CliSource;
use super::combine::{CombinationPolicy, OverridingPolicy};
use super::configuration::Configuration;
use super::context::ConfigurationContext;
use super::convert::{ConverterProvider, ConverterRegistry, PropertyConverter};
use super::env::EnvSource;
use super::file::{FileSource, ResourceSourceProvider};
use super::filter::PropertyFilter;
use super::resolve::ReferenceFilter;
use super::source::{compare_sources, PropertySource, PropertySourceProvider};
use super::system::{toggle_enabled, SystemPropertySource};
use super::ConfigError;
use crate::spi::ServiceRegistry;

/// Disables [`ConfigurationBuilder::add_default_sources`] when enabled.
pub const DEFAULTS_DISABLE_TOGGLE: &str = "dragon.defaults.disable";

/// Builder for assembling a [`Configuration`] from sources, filters and converters.
///
/// Sources are kept from least to most significant. New sources are inserted
/// by ascending ordinal (ties broken by name); the priority methods move an
/// already registered source relative to the others.
///
/// Registration errors (a duplicate source name, an unreadable file, an
/// unknown source name) are held back and reported by [`build`](Self::build),
/// so calls can be chained freely. `build` consumes the builder, so a builder
/// can only ever produce one configuration.
///
/// ## Example
///
/// ```no_run
/// use dragon_conf::Configuration;
///
/// let config = Configuration::builder()
///     .with_file("config/default.toml", true)
///     .with_env("MYAPP", "__")
///     .with_file("config/local.properties", false)
///     .add_default_filters()
///     .build()?;
///
/// let port: u16 = config.get_as_or("server.port", 8080)?;
/// # Ok::<(), dragon_conf::ConfigError>(())
/// ```
#[derive(Debug)]
#[must_use = "builders do nothing until .build() is called"]
pub struct ConfigurationBuilder {
    sources: Vec<Arc<dyn PropertySource>>,
    filters: Vec<Arc<dyn PropertyFilter>>,
    converters: ConverterRegistry,
    policy: Arc<dyn CombinationPolicy>,
    error: Option<ConfigError>,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    /// Creates an empty builder with the built-in converters and the
    /// overriding combination policy.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            filters: Vec::new(),
            converters: ConverterRegistry::with_defaults(),
            policy: Arc::new(OverridingPolicy),
            error: None,
        }
    }

    pub(crate) fn from_context(context: &ConfigurationContext) -> Self {
        Self {
            sources: context.sources.clone(),
            filters: context.filters.clone(),
            converters: context.converters.clone(),
            policy: Arc::clone(&context.policy),
            error: None,
        }
    }

    fn fail(&mut self, error: ConfigError) {
        debug!(%error, "configuration builder error");
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn position(&mut self, name: &str) -> Option<usize> {
        let index = self.sources.iter().position(|s| s.name() == name);
        if index.is_none() {
            self.fail(ConfigError::UnknownSource(name.to_string()));
        }
        index
    }

    pub fn add_source(self, source: impl PropertySource + 'static) -> Self {
        self.add_shared_source(Arc::new(source))
    }

    pub fn add_shared_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        if self.sources.iter().any(|s| s.name() == source.name()) {
            self.fail(ConfigError::DuplicateSource(source.name().to_string()));
            return self;
        }
        let index = self
            .sources
            .iter()
            .rposition(|s| compare_sources(s.as_ref(), source.as_ref()) != Ordering::Greater)
            .map_or(0, |i| i + 1);
        debug!(source = source.name(), ordinal = source.ordinal(), "adding property source");
        self.sources.insert(index, source);
        self
    }

    pub fn add_sources<I>(self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PropertySource>>,
    {
        sources
            .into_iter()
            .fold(self, |builder, source| builder.add_shared_source(source))
    }

    pub fn add_provider(mut self, provider: &dyn PropertySourceProvider) -> Self {
        match provider.property_sources() {
            Ok(sources) => self.add_sources(sources),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Adds a `.properties`, `.xml` or `.toml` file.
    ///
    /// If `required` is `true`, the build will fail if the file doesn't exist.
    /// Optional files that are missing contribute nothing.
    pub fn with_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        match FileSource::new(path, required) {
            Ok(source) => self.add_source(source),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Adds environment variables of the form `PREFIX<sep>A<sep>B` as `a.b`.
    ///
    /// With `MYAPP__DATABASE__HOST=localhost`, `with_env("MYAPP", "__")`
    /// exposes `database.host`.
    pub fn with_env(self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.add_source(EnvSource::mapped(prefix, separator))
    }

    /// Adds the command line, system properties, environment and the default
    /// resource files, unless [`DEFAULTS_DISABLE_TOGGLE`] is enabled.
    pub fn add_default_sources(self) -> Self {
        if toggle_enabled(DEFAULTS_DISABLE_TOGGLE) {
            debug!("default property sources disabled");
            return self;
        }
        self.add_source(CliSource::from_main_args())
            .add_source(SystemPropertySource::new())
            .add_source(EnvSource::new())
            .add_provider(&ResourceSourceProvider::default())
    }

    pub fn remove_source(self, name: &str) -> Self {
        self.remove_sources([name])
    }

    /// Removes the named sources; names not registered are ignored.
    pub fn remove_sources<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        for name in names {
            self.sources.retain(|s| s.name() != name);
        }
        self
    }

    pub fn increase_priority(mut self, name: &str) -> Self {
        if let Some(i) = self.position(name) {
            if i + 1 < self.sources.len() {
                self.sources.swap(i, i + 1);
            }
        }
        self
    }

    pub fn decrease_priority(mut self, name: &str) -> Self {
        if let Some(i) = self.position(name) {
            if i > 0 {
                self.sources.swap(i - 1, i);
            }
        }
        self
    }

    pub fn highest_priority(mut self, name: &str) -> Self {
        if let Some(i) = self.position(name) {
            let source = self.sources.remove(i);
            self.sources.push(source);
        }
        self
    }

    pub fn lowest_priority(mut self, name: &str) -> Self {
        if let Some(i) = self.position(name) {
            let source = self.sources.remove(i);
            self.sources.insert(0, source);
        }
        self
    }

    /// Re-sorts the sources; the last one after sorting is the most significant.
    pub fn sort_sources_by<F>(mut self, mut compare: F) -> Self
    where
        F: FnMut(&dyn PropertySource, &dyn PropertySource) -> Ordering,
    {
        self.sources.sort_by(|a, b| compare(a.as_ref(), b.as_ref()));
        self
    }

    pub fn property_sources(&self) -> &[Arc<dyn PropertySource>] {
        &self.sources
    }

    pub fn add_filter(self, filter: impl PropertyFilter + 'static) -> Self {
        self.add_shared_filter(Arc::new(filter))
    }

    pub fn add_shared_filter(mut self, filter: Arc<dyn PropertyFilter>) -> Self {
        if !self.filters.iter().any(|f| Arc::ptr_eq(f, &filter)) {
            self.filters.push(filter);
        }
        self
    }

    /// Adds `${key}` reference resolution.
    pub fn add_default_filters(self) -> Self {
        self.add_filter(ReferenceFilter)
    }

    pub fn clear_filters(mut self) -> Self {
        self.filters.clear();
        self
    }

    /// Registers a converter, consulted before those already registered for `T`.
    pub fn add_converter<T: 'static>(mut self, converter: impl PropertyConverter<T> + 'static) -> Self {
        self.converters.register::<T>(converter);
        self
    }

    pub fn add_converter_provider(mut self, provider: &dyn ConverterProvider) -> Self {
        provider.register_converters(&mut self.converters);
        self
    }

    pub fn remove_converters<T: 'static>(mut self) -> Self {
        self.converters.remove::<T>();
        self
    }

    pub fn combination_policy(self, policy: impl CombinationPolicy + 'static) -> Self {
        self.shared_combination_policy(Arc::new(policy))
    }

    pub fn shared_combination_policy(mut self, policy: Arc<dyn CombinationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Adds everything registered in the service registry: property sources,
    /// source providers, filters (in priority order), converter providers and
    /// the highest-priority combination policy.
    pub fn add_discovered(self, registry: &ServiceRegistry) -> Self {
        let mut builder = self.add_sources(registry.services::<dyn PropertySource>());

        for provider in registry.services::<dyn PropertySourceProvider>() {
            builder = builder.add_provider(provider.as_ref());
        }
        for filter in registry.services::<dyn PropertyFilter>() {
            builder = builder.add_shared_filter(filter);
        }
        // lowest priority first, so the highest-priority converters are consulted first
        for provider in registry.services::<dyn ConverterProvider>().iter().rev() {
            builder = builder.add_converter_provider(provider.as_ref());
        }
        if let Some(policy) = registry.service::<dyn CombinationPolicy>() {
            builder = builder.shared_combination_policy(policy);
        }
        builder
    }

    /// Builds the configuration, reporting the first registration error.
    pub fn build(self) -> Result<Configuration, ConfigError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        debug!(
            sources = ?self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            filters = self.filters.len(),
            "built configuration"
        );
        Ok(Configuration::new(ConfigurationContext {
            sources: self.sources,
            filters: self.filters,
            converters: self.converters,
            policy: self.policy,
        }))
    }
}
