//! Policies deciding the value of a key defined by several sources.

use std::fmt;

use super::value::PropertyValue;

/// Combines the value collected so far with the next source's value.
///
/// Sources are visited in ascending ordinal order, so `candidate` always
/// comes from a source at least as significant as the ones behind `current`.
pub trait CombinationPolicy: Send + Sync + fmt::Debug {
    fn combine(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> PropertyValue;
}

/// The most significant source wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverridingPolicy;

impl CombinationPolicy for OverridingPolicy {
    fn combine(&self, _current: Option<PropertyValue>, candidate: PropertyValue) -> PropertyValue {
        candidate
    }
}

/// Concatenates the values of all sources, least significant first.
///
/// The combined value's source lists every contributing source, joined with
/// the same separator.
#[derive(Debug, Clone)]
pub struct JoiningPolicy {
    separator: String,
}

impl Default for JoiningPolicy {
    fn default() -> Self {
        Self::new(",")
    }
}

impl JoiningPolicy {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl CombinationPolicy for JoiningPolicy {
    fn combine(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> PropertyValue {
        let Some(current) = current else {
            return candidate;
        };
        let value = format!("{}{}{}", current.value(), self.separator, candidate.value());
        let source = format!("{}{}{}", current.source(), self.separator, candidate.source());
        candidate.with_value(value).with_source(source)
    }
}
