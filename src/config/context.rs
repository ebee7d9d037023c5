use std::sync::Arc;

use super::combine::CombinationPolicy;
use super::convert::ConverterRegistry;
use super::filter::PropertyFilter;
use super::source::PropertySource;

/// Everything a [`Configuration`](crate::Configuration) is made of.
///
/// Built once by [`ConfigurationBuilder`](crate::ConfigurationBuilder) and
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct ConfigurationContext {
    pub(crate) sources: Vec<Arc<dyn PropertySource>>,
    pub(crate) filters: Vec<Arc<dyn PropertyFilter>>,
    pub(crate) converters: ConverterRegistry,
    pub(crate) policy: Arc<dyn CombinationPolicy>,
}

impl ConfigurationContext {
    /// Sources from least to most significant.
    pub fn property_sources(&self) -> &[Arc<dyn PropertySource>] {
        &self.sources
    }

    pub fn property_source(&self, name: &str) -> Option<&Arc<dyn PropertySource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn filters(&self) -> &[Arc<dyn PropertyFilter>] {
        &self.filters
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn combination_policy(&self) -> &Arc<dyn CombinationPolicy> {
        &self.policy
    }
}
