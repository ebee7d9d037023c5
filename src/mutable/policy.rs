use tracing::debug;

use super::{ConfigChangeRequest, MutablePropertySource};
use crate::config::ConfigError;

/// Decides which mutable sources of a configuration receive a change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChangePropagationPolicy {
    /// Every mutable source.
    #[default]
    All,
    /// Only the mutable source with the highest ordinal.
    MostSignificantOnly,
    /// The mutable sources with one of the given names.
    Selective(Vec<String>),
    /// No source; changes are discarded.
    None,
}

impl ChangePropagationPolicy {
    pub fn selective<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Selective(names.into_iter().map(Into::into).collect())
    }

    /// Applies `change` to the chosen `targets`, which are ordered from least
    /// to most significant, and returns how many accepted it.
    ///
    /// Stops at the first failing source.
    pub fn apply(
        &self,
        targets: &[&dyn MutablePropertySource],
        change: &ConfigChangeRequest,
    ) -> Result<usize, ConfigError> {
        let chosen: Vec<&dyn MutablePropertySource> = match self {
            Self::All => targets.to_vec(),
            Self::MostSignificantOnly => targets.last().copied().into_iter().collect(),
            Self::Selective(names) => targets
                .iter()
                .copied()
                .filter(|t| names.iter().any(|n| n == t.name()))
                .collect(),
            Self::None => Vec::new(),
        };

        for target in &chosen {
            debug!(source = target.name(), transaction = change.id(), "applying change");
            target.apply_change(change)?;
        }
        Ok(chosen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertySource;
    use crate::mutable::MutableMapSource;

    fn change() -> ConfigChangeRequest {
        let mut change = ConfigChangeRequest::new("t");
        change.put("k", "v");
        change
    }

    #[test]
    fn test_policies_pick_targets() {
        let low = MutableMapSource::new("low").with_ordinal(1);
        let high = MutableMapSource::new("high").with_ordinal(2);
        let targets: [&dyn MutablePropertySource; 2] = [&low, &high];

        assert_eq!(ChangePropagationPolicy::None.apply(&targets, &change()).unwrap(), 0);
        assert!(low.get("k").is_none());

        assert_eq!(
            ChangePropagationPolicy::MostSignificantOnly
                .apply(&targets, &change())
                .unwrap(),
            1
        );
        assert!(low.get("k").is_none());
        assert_eq!(high.get("k").unwrap().value(), "v");

        let selective = ChangePropagationPolicy::selective(["low", "missing"]);
        assert_eq!(selective.apply(&targets, &change()).unwrap(), 1);
        assert!(low.get("k").is_some());

        assert_eq!(ChangePropagationPolicy::All.apply(&targets, &change()).unwrap(), 2);
    }

    #[test]
    fn test_most_significant_without_targets() {
        let applied = ChangePropagationPolicy::MostSignificantOnly
            .apply(&[], &change())
            .unwrap();
        assert_eq!(applied, 0);
    }
}
