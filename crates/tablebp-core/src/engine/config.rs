//! Engine configuration owned by a graph-execution context.

use crate::engine::errors::EngineError;

/// Default density at or above which auxiliary tables are stored densely.
pub const DEFAULT_SPARSE_THRESHOLD: f64 = 1.0;

/// How a factor executor computes a full update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateStrategy {
    /// Apply the compiled plan, sharing partial marginals across edges.
    #[default]
    Optimized,
    /// Recompute every edge from the full table.
    Direct,
}

/// Configuration for factor table updates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Auxiliary tables with `non_zero >= cardinality * sparse_threshold` are dense.
    ///
    /// The default of 1.0 keeps an auxiliary table sparse unless every entry is used.
    pub sparse_threshold: f64,
    /// Strategy used by new executors for full updates.
    pub strategy: UpdateStrategy,
    /// Initial k-best truncation for new executors. `None` means unbounded.
    pub truncation_k: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sparse_threshold: DEFAULT_SPARSE_THRESHOLD,
            strategy: UpdateStrategy::Optimized,
            truncation_k: None,
        }
    }
}

impl EngineConfig {
    /// Returns a copy with a different sparse threshold.
    pub fn with_sparse_threshold(mut self, sparse_threshold: f64) -> Self {
        self.sparse_threshold = sparse_threshold;
        self
    }

    /// Returns a copy with a different update strategy.
    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns a copy with an initial k-best truncation threshold.
    pub fn with_truncation_k(mut self, k: usize) -> Self {
        self.truncation_k = Some(k);
        self
    }

    pub fn validate(self) -> Result<Self, EngineError> {
        if !self.sparse_threshold.is_finite() || self.sparse_threshold < 0.0 {
            return Err(EngineError::ValidationError(
                "engine config: sparse_threshold must be finite and >= 0".into(),
            ));
        }
        if self.truncation_k == Some(0) {
            return Err(EngineError::ValidationError(
                "engine config: truncation_k must be > 0".into(),
            ));
        }
        Ok(self)
    }

    /// Decides whether an auxiliary table with `non_zero` used entries out of
    /// `cardinality` joint entries should be dense.
    #[inline]
    pub fn use_dense(&self, non_zero: usize, cardinality: usize) -> bool {
        non_zero as f64 >= cardinality as f64 * self.sparse_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = EngineConfig::default().validate().expect("default");
        assert_eq!(config.sparse_threshold, 1.0);
        assert_eq!(config.strategy, UpdateStrategy::Optimized);
        assert_eq!(config.truncation_k, None);
    }

    #[test]
    fn rejects_negative_or_nan_threshold() {
        assert!(EngineConfig::default()
            .with_sparse_threshold(-0.5)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_sparse_threshold(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn rejects_zero_truncation() {
        let err = EngineConfig::default()
            .with_truncation_k(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationError(_)));
    }

    #[test]
    fn use_dense_respects_threshold() {
        let config = EngineConfig::default();
        assert!(config.use_dense(8, 8));
        assert!(!config.use_dense(7, 8));

        let half = config.with_sparse_threshold(0.5);
        assert!(half.use_dense(4, 8));
        assert!(!half.use_dense(3, 8));

        let always = config.with_sparse_threshold(0.0);
        assert!(always.use_dense(0, 8));
    }
}
