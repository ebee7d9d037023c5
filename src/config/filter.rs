//! Filters applied to property values before they reach callers.

use std::fmt;
use std::sync::Arc;

use super::value::PropertyValue;
use super::ConfigError;

/// Looks up the raw (combined, unfiltered) value of another key.
pub type RawLookup<'a> = dyn Fn(&str) -> Option<PropertyValue> + 'a;

/// What a filter knows about the access it is part of.
pub struct FilterContext<'a> {
    key: &'a str,
    single_access: bool,
    lookup: &'a RawLookup<'a>,
}

impl<'a> FilterContext<'a> {
    pub fn new(key: &'a str, single_access: bool, lookup: &'a RawLookup<'a>) -> Self {
        Self {
            key,
            single_access,
            lookup,
        }
    }

    pub fn key(&self) -> &str {
        self.key
    }

    /// True for `get`-style lookups, false while evaluating the full map.
    pub fn is_single_access(&self) -> bool {
        self.single_access
    }

    pub fn raw(&self, key: &str) -> Option<PropertyValue> {
        (self.lookup)(key)
    }
}

impl fmt::Debug for FilterContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterContext")
            .field("key", &self.key)
            .field("single_access", &self.single_access)
            .finish_non_exhaustive()
    }
}

/// Transforms or suppresses a property value.
///
/// Returning `Ok(None)` removes the property and ends the chain.
pub trait PropertyFilter: Send + Sync + fmt::Debug {
    fn filter(
        &self,
        value: PropertyValue,
        ctx: &FilterContext<'_>,
    ) -> Result<Option<PropertyValue>, ConfigError>;
}

/// Runs the filters in order.
pub(crate) fn apply_filters(
    filters: &[Arc<dyn PropertyFilter>],
    value: PropertyValue,
    ctx: &FilterContext<'_>,
) -> Result<Option<PropertyValue>, ConfigError> {
    let mut current = value;
    for filter in filters {
        match filter.filter(current, ctx)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Hides keys starting with any of the given prefixes.
///
/// By default keys are only hidden from full-map access, so they can still
/// be read one at a time.
#[derive(Debug, Clone)]
pub struct HiddenKeyFilter {
    prefixes: Vec<String>,
    hide_single_access: bool,
}

impl Default for HiddenKeyFilter {
    /// Hides `_`-prefixed keys, which are conventionally metadata.
    fn default() -> Self {
        Self::new(["_"])
    }
}

impl HiddenKeyFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            hide_single_access: false,
        }
    }

    pub fn hide_single_access(mut self, hide: bool) -> Self {
        self.hide_single_access = hide;
        self
    }
}

impl PropertyFilter for HiddenKeyFilter {
    fn filter(
        &self,
        value: PropertyValue,
        ctx: &FilterContext<'_>,
    ) -> Result<Option<PropertyValue>, ConfigError> {
        if ctx.is_single_access() && !self.hide_single_access {
            return Ok(Some(value));
        }
        let hidden = self.prefixes.iter().any(|p| value.key().starts_with(p.as_str()));
        Ok((!hidden).then_some(value))
    }
}

/// A filter backed by a closure, see [`filter_fn`].
pub struct FnFilter<F> {
    name: &'static str,
    f: F,
}

impl<F> fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnFilter").field(&self.name).finish()
    }
}

impl<F> PropertyFilter for FnFilter<F>
where
    F: Fn(PropertyValue, &FilterContext<'_>) -> Result<Option<PropertyValue>, ConfigError>
        + Send
        + Sync,
{
    fn filter(
        &self,
        value: PropertyValue,
        ctx: &FilterContext<'_>,
    ) -> Result<Option<PropertyValue>, ConfigError> {
        (self.f)(value, ctx)
    }
}

/// Adapts a closure into a [`PropertyFilter`]; `name` shows up in debug output.
pub fn filter_fn<F>(name: &'static str, f: F) -> FnFilter<F>
where
    F: Fn(PropertyValue, &FilterContext<'_>) -> Result<Option<PropertyValue>, ConfigError>
        + Send
        + Sync,
{
    FnFilter { name, f }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_lookup(_: &str) -> Option<PropertyValue> {
        None
    }

    #[test]
    fn test_chain_applies_in_order() {
        let filters: Vec<Arc<dyn PropertyFilter>> = vec![
            Arc::new(filter_fn("append-a", |v: PropertyValue, _: &FilterContext<'_>| {
                let next = format!("{}a", v.value());
                Ok(Some(v.with_value(next)))
            })),
            Arc::new(filter_fn("append-b", |v: PropertyValue, _: &FilterContext<'_>| {
                let next = format!("{}b", v.value());
                Ok(Some(v.with_value(next)))
            })),
        ];
        let ctx = FilterContext::new("k", true, &no_lookup);

        let result = apply_filters(&filters, PropertyValue::new("k", "", "t"), &ctx).unwrap();
        assert_eq!(result.unwrap().value(), "ab");
    }

    #[test]
    fn test_chain_stops_on_suppression() {
        let filters: Vec<Arc<dyn PropertyFilter>> = vec![
            Arc::new(filter_fn("drop", |_: PropertyValue, _: &FilterContext<'_>| Ok(None))),
            Arc::new(filter_fn("fail", |_: PropertyValue, _: &FilterContext<'_>| {
                Err(ConfigError::InvalidArgument("should not run".into()))
            })),
        ];
        let ctx = FilterContext::new("k", true, &no_lookup);

        let result = apply_filters(&filters, PropertyValue::new("k", "v", "t"), &ctx).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_hidden_keys_only_hidden_from_full_access() {
        let filter = HiddenKeyFilter::default();
        let value = PropertyValue::new("_meta", "v", "t");

        let single = FilterContext::new("_meta", true, &no_lookup);
        let full = FilterContext::new("_meta", false, &no_lookup);

        assert!(filter.filter(value.clone(), &single).unwrap().is_some());
        assert!(filter.filter(value.clone(), &full).unwrap().is_none());

        let strict = HiddenKeyFilter::default().hide_single_access(true);
        assert!(strict.filter(value, &single).unwrap().is_none());
    }
}
