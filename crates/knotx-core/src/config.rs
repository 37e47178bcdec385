//! Forest configuration
//!
//! [`ForestSettings`] is plain data and loads from TOML. [`ForestConfig`]
//! adds the pluggable collaborators: id generator, generic filter handler and
//! percentage sampler.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::Result;
use crate::filter::{
    FilterEvaluator, GenericFilterHandler, PercentageSampler, RejectingGenericHandler,
    ThreadRngSampler,
};
use crate::ids::{IdGenerator, UuidV7Generator};

/// Structural limits and toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestSettings {
    pub max_filters_per_edge: usize,
    pub max_edges_per_knot: usize,
    /// All edges on one knot must test the same context field
    pub mutual_exclusivity: bool,
    pub single_filter_per_edge: bool,
    /// Evaluation descent/re-entry bound
    pub max_depth: usize,
}

impl Default for ForestSettings {
    fn default() -> Self {
        Self {
            max_filters_per_edge: 16,
            max_edges_per_knot: 256,
            mutual_exclusivity: false,
            single_filter_per_edge: false,
            max_depth: 64,
        }
    }
}

impl ForestSettings {
    /// Parse settings; absent fields take their defaults
    ///
    /// ```
    /// use knotx_core::config::ForestSettings;
    ///
    /// let settings = ForestSettings::from_toml_str("mutual_exclusivity = true").unwrap();
    /// assert!(settings.mutual_exclusivity);
    /// assert_eq!(settings.max_edges_per_knot, 256);
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Settings plus runtime collaborators
#[derive(Clone)]
pub struct ForestConfig {
    pub settings: ForestSettings,
    pub ids: Arc<dyn IdGenerator>,
    pub generic_filter: Arc<dyn GenericFilterHandler>,
    pub sampler: Arc<dyn PercentageSampler>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            settings: ForestSettings::default(),
            ids: Arc::new(UuidV7Generator),
            generic_filter: Arc::new(RejectingGenericHandler),
            sampler: Arc::new(ThreadRngSampler),
        }
    }
}

impl std::fmt::Debug for ForestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForestConfig")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ForestConfig {
    pub fn new(settings: ForestSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_generic_filter(mut self, handler: Arc<dyn GenericFilterHandler>) -> Self {
        self.generic_filter = handler;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn PercentageSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub(crate) fn filter_evaluator(&self) -> FilterEvaluator {
        FilterEvaluator::new(self.generic_filter.clone(), self.sampler.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::KnotXError;

    #[test]
    fn test_settings_defaults() {
        let settings = ForestSettings::from_toml_str("").unwrap();
        assert_eq!(settings, ForestSettings::default());
        assert_eq!(settings.max_filters_per_edge, 16);
        assert_eq!(settings.max_depth, 64);
    }

    #[test]
    fn test_settings_rejects_unknown_field() {
        let err = ForestSettings::from_toml_str("max_edges = 3").unwrap_err();
        assert!(matches!(err, KnotXError::Serialization { .. }));
    }

    #[test]
    fn test_partial_override() {
        let settings = ForestSettings::from_toml_str(
            "max_edges_per_knot = 4\nsingle_filter_per_edge = true\n",
        )
        .unwrap();
        assert_eq!(settings.max_edges_per_knot, 4);
        assert!(settings.single_filter_per_edge);
        assert!(!settings.mutual_exclusivity);
    }
}
