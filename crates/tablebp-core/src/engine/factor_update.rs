//! # Factor Update Executor
//!
//! Per-factor-instance state: incoming and outgoing message buffers, damping
//! coefficients, k-best truncation, and the compiled plan shared with every
//! other factor built on the same table.
//!
//! ## Engine selection
//!
//! | Condition                                  | Engine          |
//! |--------------------------------------------|-----------------|
//! | some edge's domain is larger than `k`      | k-best          |
//! | strategy is [`UpdateStrategy::Optimized`]  | compiled plan   |
//! | strategy is [`UpdateStrategy::Direct`]     | brute force     |
//!
//! `update_edge` always uses the same engine and the same arithmetic as
//! `update`, so recomputing one edge gives exactly the value a full update
//! would have written there.
//!
//! ## Lifecycle
//!
//! ```text
//! new(label, table) -> initialize(&cache) -> update()/update_edge() ...
//! ```
//!
//! Updating before `initialize` fails with [`EngineError::UninitializedPlan`].

use std::sync::Arc;

use crate::engine::config::{EngineConfig, UpdateStrategy};
use crate::engine::derivative::DerivativeTracker;
use crate::engine::direct;
use crate::engine::errors::EngineError;
use crate::engine::kbest;
use crate::engine::messages::{DampingState, EdgeMessages, MessageSemantics};
use crate::engine::plan_cache::PlanCache;
use crate::engine::update_plan::{ExecutionContext, PlanScratch, UpdatePlan};
use crate::engine::weight_table::WeightTable;

/// Sentinel stored in `k_override` for an explicitly unbounded k.
const UNBOUNDED_K: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Plan,
    Direct,
    KBest(usize),
}

/// Update state for one factor node.
#[derive(Debug)]
pub struct FactorUpdateExecutor {
    label: Arc<str>,
    table: Arc<WeightTable>,
    messages: EdgeMessages,
    damping: DampingState,
    plan: Option<Arc<UpdatePlan>>,
    scratch: PlanScratch,
    config: EngineConfig,
    k_override: Option<usize>,
    strategy_override: Option<UpdateStrategy>,
    derivatives: Option<DerivativeTracker>,
}

impl FactorUpdateExecutor {
    /// Creates an executor with uniform messages. Call [`initialize`](Self::initialize)
    /// before updating.
    pub fn new(label: impl Into<Arc<str>>, table: Arc<WeightTable>) -> Self {
        let messages = EdgeMessages::new(table.domain_sizes(), MessageSemantics::Probability);
        let damping = DampingState::new(table.dimensions());
        Self {
            label: label.into(),
            table,
            messages,
            damping,
            plan: None,
            scratch: PlanScratch::default(),
            config: EngineConfig::default(),
            k_override: None,
            strategy_override: None,
            derivatives: None,
        }
    }

    /// Resets every message to uniform, adopts the cache's configuration, and
    /// fetches (or compiles) the plan for this executor's table.
    pub fn initialize(&mut self, cache: &PlanCache) -> Result<(), EngineError> {
        self.config = *cache.config();
        let plan = cache.lookup_or_create(&self.table)?;
        self.scratch = plan.new_scratch();
        self.plan = Some(plan);
        self.reset_messages();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            factor = %self.label,
            degree = self.degree(),
            table = ?self.table.id(),
            "initialized factor executor"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.plan.is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn table(&self) -> &Arc<WeightTable> {
        &self.table
    }

    pub fn degree(&self) -> usize {
        self.table.dimensions()
    }

    pub fn plan(&self) -> Option<&Arc<UpdatePlan>> {
        self.plan.as_ref()
    }

    pub fn messages(&self) -> &EdgeMessages {
        &self.messages
    }

    /// Re-uniformizes every message and zeroes derivative buffers.
    pub fn reset_messages(&mut self) {
        self.messages.reset(MessageSemantics::Probability);
        if let Some(tracker) = &mut self.derivatives {
            tracker.reset();
        }
    }

    pub fn set_incoming(&mut self, edge: usize, values: &[f64]) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        self.messages
            .set_incoming(edge, values)
            .map_err(|expected| self.shape_mismatch(edge, expected, values.len()))
    }

    /// Overwrites an outgoing message, e.g. to seed the previous value used by damping.
    pub fn set_outgoing(&mut self, edge: usize, values: &[f64]) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        self.messages
            .set_outgoing(edge, values)
            .map_err(|expected| self.shape_mismatch(edge, expected, values.len()))
    }

    pub fn incoming(&self, edge: usize) -> Result<&[f64], EngineError> {
        self.check_edge(edge)?;
        Ok(self.messages.incoming(edge))
    }

    pub fn outgoing(&self, edge: usize) -> Result<&[f64], EngineError> {
        self.check_edge(edge)?;
        Ok(self.messages.outgoing(edge))
    }

    /// Sets the damping coefficient of one edge. Must lie in `[0, 1]`.
    pub fn set_damping(&mut self, edge: usize, coefficient: f64) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        if !(0.0..=1.0).contains(&coefficient) {
            return Err(EngineError::ValidationError(format!(
                "damping for edge {} of '{}' must be in [0, 1], got {}",
                edge, self.label, coefficient
            )));
        }
        self.damping.set(edge, coefficient, self.table.domain_size(edge));
        Ok(())
    }

    pub fn damping(&self, edge: usize) -> Result<f64, EngineError> {
        self.check_edge(edge)?;
        Ok(self.damping.coefficient(edge))
    }

    /// Restricts updates to the `k` most likely values of each incoming message.
    pub fn set_truncation_k(&mut self, k: usize) -> Result<(), EngineError> {
        if k == 0 {
            return Err(EngineError::ValidationError(format!(
                "truncation k for '{}' must be > 0",
                self.label
            )));
        }
        self.k_override = Some(k);
        Ok(())
    }

    /// Removes truncation regardless of the configured default.
    pub fn clear_truncation(&mut self) {
        self.k_override = Some(UNBOUNDED_K);
    }

    /// Effective truncation threshold; `None` when unbounded.
    pub fn truncation_k(&self) -> Option<usize> {
        match self.k_override {
            Some(UNBOUNDED_K) => None,
            Some(k) => Some(k),
            None => self.config.truncation_k,
        }
    }

    /// True when the effective k is smaller than some edge's domain.
    pub fn is_truncating(&self) -> bool {
        self.truncation_k()
            .is_some_and(|k| self.table.domain_sizes().iter().any(|&n| n > k))
    }

    pub fn set_strategy(&mut self, strategy: UpdateStrategy) {
        self.strategy_override = Some(strategy);
    }

    /// Returns to the strategy configured on the plan cache.
    pub fn use_default_strategy(&mut self) {
        self.strategy_override = None;
    }

    pub fn strategy(&self) -> UpdateStrategy {
        self.strategy_override.unwrap_or(self.config.strategy)
    }

    fn engine(&self) -> Engine {
        if self.is_truncating() {
            if let Some(k) = self.truncation_k() {
                return Engine::KBest(k);
            }
        }
        match self.strategy() {
            UpdateStrategy::Optimized => Engine::Plan,
            UpdateStrategy::Direct => Engine::Direct,
        }
    }

    /// Computes an outgoing message on every edge.
    ///
    /// Stops at the first degenerate edge: edges written earlier in the call
    /// keep their new values, the rest keep their prior values.
    pub fn update(&mut self) -> Result<(), EngineError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.update_with_scratch(&mut scratch);
        self.scratch = scratch;
        result
    }

    /// Like [`update`](Self::update), with auxiliary tables in a caller-owned scratch.
    pub fn update_with_scratch(&mut self, scratch: &mut PlanScratch) -> Result<(), EngineError> {
        let plan = self.require_plan()?;
        let engine = self.engine();

        #[cfg(feature = "tracing")]
        tracing::trace!(factor = %self.label, ?engine, "factor update");

        match engine {
            Engine::Plan => {
                let mut ctx = ExecutionContext {
                    factor: &self.label,
                    scratch,
                    messages: &mut self.messages,
                    damping: &mut self.damping,
                };
                plan.apply(&self.table, &mut ctx)?;
            }
            Engine::Direct => {
                direct::update(&self.table, &mut self.messages, &mut self.damping, &self.label)?
            }
            Engine::KBest(k) => kbest::update(
                &self.table,
                k,
                &mut self.messages,
                &mut self.damping,
                &self.label,
            )?,
        }

        if let Some(tracker) = &mut self.derivatives {
            for edge in 0..self.table.dimensions() {
                tracker.update_edge(&self.table, self.messages.incoming_all(), edge);
            }
        }
        Ok(())
    }

    /// Computes the outgoing message of one edge.
    pub fn update_edge(&mut self, edge: usize) -> Result<(), EngineError> {
        let plan = self.require_plan()?;
        self.check_edge(edge)?;

        match self.engine() {
            Engine::Plan => {
                let mut ctx = ExecutionContext {
                    factor: &self.label,
                    scratch: &mut self.scratch,
                    messages: &mut self.messages,
                    damping: &mut self.damping,
                };
                plan.apply_edge(&self.table, edge, &mut ctx)?;
            }
            Engine::Direct => direct::update_edge(
                &self.table,
                edge,
                &mut self.messages,
                &mut self.damping,
                &self.label,
            )?,
            Engine::KBest(k) => kbest::update_edge(
                &self.table,
                k,
                edge,
                &mut self.messages,
                &mut self.damping,
                &self.label,
            )?,
        }

        if let Some(tracker) = &mut self.derivatives {
            tracker.update_edge(&self.table, self.messages.incoming_all(), edge);
        }
        Ok(())
    }

    /// `w_e · Π_j in[j][idx_j]` for every stored table entry.
    pub fn unnormalized_belief(&self) -> Vec<f64> {
        let incoming = self.messages.incoming_all();
        self.table
            .sparse_entries()
            .map(|(tuple, weight)| {
                tuple
                    .iter()
                    .zip(incoming)
                    .fold(weight, |acc, (&value, message)| acc * message[value])
            })
            .collect()
    }

    /// Normalized joint belief over stored table entries.
    pub fn belief(&self) -> Result<Vec<f64>, EngineError> {
        let mut belief = self.unnormalized_belief();
        let sum: f64 = belief.iter().sum();
        if sum == 0.0 {
            return Err(EngineError::DegenerateBelief {
                factor: Arc::clone(&self.label),
            });
        }
        for b in &mut belief {
            *b /= sum;
        }
        Ok(belief)
    }

    /// Expected energy `Σ b_e · (-ln w_e)` under the joint belief.
    pub fn internal_energy(&self) -> Result<f64, EngineError> {
        let belief = self.belief()?;
        Ok(belief
            .iter()
            .zip(self.table.weights())
            .filter(|(&b, _)| b > 0.0)
            .map(|(&b, &w)| -b * w.ln())
            .sum())
    }

    /// Entropy `-Σ b_e ln b_e` of the joint belief, with `0 ln 0 = 0`.
    pub fn bethe_entropy(&self) -> Result<f64, EngineError> {
        let belief = self.belief()?;
        Ok(belief
            .iter()
            .filter(|&&b| b > 0.0)
            .map(|&b| -b * b.ln())
            .sum())
    }

    /// Starts tracking outgoing-message derivatives for `weight_count` weights.
    ///
    /// Derivatives always follow the exact quotient rule over the full table,
    /// without damping. Under k-best truncation they are the derivatives of the
    /// exact message, not of the truncated one written to the outgoing buffer.
    pub fn enable_derivatives(&mut self, weight_count: usize, factor_uses_table: bool) {
        self.derivatives = Some(DerivativeTracker::new(
            self.table.domain_sizes(),
            weight_count,
            factor_uses_table,
        ));
    }

    pub fn disable_derivatives(&mut self) {
        self.derivatives = None;
    }

    pub fn derivatives_enabled(&self) -> bool {
        self.derivatives.is_some()
    }

    /// Sets the derivative of an incoming message with respect to one weight.
    pub fn set_incoming_derivative(
        &mut self,
        weight: usize,
        edge: usize,
        values: &[f64],
    ) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        let label = &self.label;
        self.derivatives
            .as_mut()
            .ok_or_else(|| {
                EngineError::ValidationError(format!(
                    "derivative tracking is not enabled for '{}'",
                    label
                ))
            })?
            .set_incoming(weight, edge, values)
    }

    /// Derivative of an outgoing message with respect to one weight, after the last update.
    pub fn outgoing_derivative(&self, weight: usize, edge: usize) -> Option<&[f64]> {
        self.derivatives.as_ref()?.outgoing(weight, edge)
    }

    fn require_plan(&self) -> Result<Arc<UpdatePlan>, EngineError> {
        self.plan.clone().ok_or_else(|| {
            EngineError::UninitializedPlan(format!(
                "factor '{}' was updated before initialize()",
                self.label
            ))
        })
    }

    fn check_edge(&self, edge: usize) -> Result<(), EngineError> {
        if edge >= self.degree() {
            return Err(EngineError::EdgeOutOfRange {
                factor: Arc::clone(&self.label),
                edge,
                degree: self.degree(),
            });
        }
        Ok(())
    }

    fn shape_mismatch(&self, edge: usize, expected: usize, actual: usize) -> EngineError {
        EngineError::ShapeMismatch {
            factor: Arc::clone(&self.label),
            edge,
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close_vec(lhs: &[f64], rhs: &[f64], eps: f64) {
        assert_eq!(lhs.len(), rhs.len());
        for (i, (a, b)) in lhs.iter().zip(rhs.iter()).enumerate() {
            assert!(
                (a - b).abs() <= eps,
                "difference at index {}: |{} - {}| > {}",
                i,
                a,
                b,
                eps
            );
        }
    }

    fn reference_executor() -> FactorUpdateExecutor {
        let table = Arc::new(WeightTable::dense(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).expect("table"));
        let mut executor = FactorUpdateExecutor::new("f0", table);
        executor.initialize(&PlanCache::default()).expect("init");
        executor
    }

    fn three_way_executor(cache: &PlanCache) -> FactorUpdateExecutor {
        let weights: Vec<f64> = (0..24).map(|x| 0.5 + ((x * 7) % 11) as f64).collect();
        let table = Arc::new(WeightTable::dense(&[2, 3, 4], weights).expect("table"));
        let mut executor = FactorUpdateExecutor::new("f3", table);
        executor.initialize(cache).expect("init");
        executor.set_incoming(0, &[0.3, 0.7]).expect("in0");
        executor.set_incoming(1, &[0.2, 0.5, 0.3]).expect("in1");
        executor.set_incoming(2, &[0.1, 0.2, 0.3, 0.4]).expect("in2");
        executor
    }

    #[test]
    fn two_binary_edges_weighted_by_uniform_message() {
        let mut executor = reference_executor();
        executor.update().expect("update");
        assert_close_vec(executor.outgoing(1).expect("out"), &[0.4, 0.6], 1e-12);
    }

    #[test]
    fn update_before_initialize_fails() {
        let table = Arc::new(WeightTable::dense(&[2], vec![1.0, 1.0]).expect("table"));
        let mut executor = FactorUpdateExecutor::new("lonely", table);
        assert!(matches!(
            executor.update(),
            Err(EngineError::UninitializedPlan(_))
        ));
        assert!(matches!(
            executor.update_edge(0),
            Err(EngineError::UninitializedPlan(_))
        ));
    }

    #[test]
    fn shape_and_range_errors() {
        let mut executor = reference_executor();
        let err = executor.set_incoming(0, &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ShapeMismatch {
                edge: 0,
                expected: 2,
                actual: 3,
                ..
            }
        ));
        assert!(matches!(
            executor.update_edge(2),
            Err(EngineError::EdgeOutOfRange { degree: 2, .. })
        ));
        assert!(executor.set_damping(0, 1.5).is_err());
        assert!(executor.set_truncation_k(0).is_err());
    }

    #[test]
    fn strategies_agree_on_every_edge() {
        let cache = PlanCache::default();
        let mut optimized = three_way_executor(&cache);
        let mut direct = three_way_executor(&cache);
        direct.set_strategy(UpdateStrategy::Direct);

        optimized.update().expect("optimized");
        direct.update().expect("direct");
        for edge in 0..3 {
            assert_close_vec(
                optimized.outgoing(edge).expect("out"),
                direct.outgoing(edge).expect("out"),
                1e-12,
            );
            let sum: f64 = optimized.outgoing(edge).expect("out").iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn update_edge_is_identical_to_full_update() {
        let cache = PlanCache::default();
        for strategy in [UpdateStrategy::Optimized, UpdateStrategy::Direct] {
            let mut full = three_way_executor(&cache);
            full.set_strategy(strategy);
            full.update().expect("full");
            for edge in 0..3 {
                let mut single = three_way_executor(&cache);
                single.set_strategy(strategy);
                single.update_edge(edge).expect("edge");
                assert_eq!(
                    single.outgoing(edge).expect("out"),
                    full.outgoing(edge).expect("out"),
                    "{:?} edge {}",
                    strategy,
                    edge
                );
            }
        }
    }

    #[test]
    fn damping_zero_and_one() {
        let cache = PlanCache::default();
        let mut undamped = three_way_executor(&cache);
        undamped.update().expect("update");

        let mut zero = three_way_executor(&cache);
        zero.set_damping(1, 0.0).expect("damping");
        zero.update().expect("update");
        assert_eq!(zero.outgoing(1).expect("out"), undamped.outgoing(1).expect("out"));

        let mut one = three_way_executor(&cache);
        let previous = [0.6, 0.3, 0.1];
        one.set_outgoing(1, &previous).expect("seed");
        one.set_damping(1, 1.0).expect("damping");
        one.update().expect("update");
        assert_eq!(one.outgoing(1).expect("out"), &previous);
        assert_eq!(one.damping(1).expect("damping"), 1.0);
    }

    #[test]
    fn damping_blends_after_normalization() {
        let mut executor = reference_executor();
        executor.set_outgoing(1, &[1.0, 0.0]).expect("seed");
        executor.set_damping(1, 0.25).expect("damping");
        executor.update().expect("update");
        // 0.75 * [0.4, 0.6] + 0.25 * [1, 0]
        assert_close_vec(executor.outgoing(1).expect("out"), &[0.55, 0.45], 1e-12);
    }

    #[test]
    fn degenerate_edge_keeps_prior_value() {
        // Edge 0 = 1 has no weight, so edge 1 receives an all-zero message.
        let table = Arc::new(WeightTable::dense(&[2, 2], vec![1.0, 1.0, 0.0, 0.0]).expect("table"));
        let mut executor = FactorUpdateExecutor::new("zero", table);
        executor.initialize(&PlanCache::default()).expect("init");
        executor.set_incoming(0, &[0.0, 1.0]).expect("in0");
        executor.set_outgoing(1, &[0.8, 0.2]).expect("seed");

        let err = executor.update().unwrap_err();
        assert!(err.is_degenerate());
        match err {
            EngineError::DegenerateMessage { factor, edge } => {
                assert_eq!(&*factor, "zero");
                assert_eq!(edge, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(executor.outgoing(1).expect("out"), &[0.8, 0.2]);

        executor.update_edge(0).expect("edge 0");
        assert_eq!(executor.outgoing(0).expect("out"), &[1.0, 0.0]);
    }

    #[test]
    fn truncation_switches_to_kbest() {
        let cache = PlanCache::default();
        let mut executor = three_way_executor(&cache);
        assert!(!executor.is_truncating());
        executor.set_truncation_k(4).expect("k");
        assert!(!executor.is_truncating());
        executor.set_truncation_k(2).expect("k");
        assert!(executor.is_truncating());
        assert_eq!(executor.engine(), Engine::KBest(2));

        executor.update().expect("update");
        let sum: f64 = executor.outgoing(0).expect("out").iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        executor.clear_truncation();
        assert_eq!(executor.truncation_k(), None);
        assert_eq!(executor.engine(), Engine::Plan);
    }

    #[test]
    fn truncated_update_is_damped_after_normalization() {
        let table = Arc::new(
            WeightTable::dense(&[3, 2], vec![1.0, 1.0, 1.0, 3.0, 2.0, 2.0]).expect("table"),
        );
        let mut executor = FactorUpdateExecutor::new("kbest", table);
        executor.initialize(&PlanCache::default()).expect("init");
        executor.set_truncation_k(1).expect("k");
        executor.set_incoming(0, &[0.2, 0.5, 0.3]).expect("in0");
        executor.set_outgoing(1, &[1.0, 0.0]).expect("seed");
        executor.set_damping(1, 0.25).expect("damping");
        assert!(executor.is_truncating());

        executor.update().expect("update");
        // 0.75 * [0.25, 0.75] + 0.25 * [1, 0]
        assert_close_vec(executor.outgoing(1).expect("out"), &[0.4375, 0.5625], 1e-12);
    }

    #[test]
    fn derivatives_ignore_truncation() {
        let cache = PlanCache::default();
        let mut exact = three_way_executor(&cache);
        let mut truncated = three_way_executor(&cache);
        truncated.set_truncation_k(1).expect("k");
        for executor in [&mut exact, &mut truncated] {
            executor.enable_derivatives(24, true);
            executor.update().expect("update");
        }
        assert_ne!(
            exact.outgoing(0).expect("out"),
            truncated.outgoing(0).expect("out")
        );
        for weight in [0, 5, 23] {
            for edge in 0..3 {
                assert_eq!(
                    exact.outgoing_derivative(weight, edge),
                    truncated.outgoing_derivative(weight, edge)
                );
            }
        }
    }

    #[test]
    fn configured_defaults_are_adopted_at_initialize() {
        let config = EngineConfig::default()
            .with_strategy(UpdateStrategy::Direct)
            .with_truncation_k(3);
        let cache = PlanCache::new(config).expect("cache");
        let mut executor = three_way_executor(&cache);
        assert_eq!(executor.strategy(), UpdateStrategy::Direct);
        assert_eq!(executor.truncation_k(), Some(3));
        assert!(executor.is_truncating());

        executor.set_strategy(UpdateStrategy::Optimized);
        executor.use_default_strategy();
        assert_eq!(executor.strategy(), UpdateStrategy::Direct);
    }

    #[test]
    fn belief_energy_and_entropy() {
        let executor = reference_executor();
        let belief = executor.belief().expect("belief");
        assert_close_vec(&belief, &[0.1, 0.2, 0.3, 0.4], 1e-12);

        let energy = executor.internal_energy().expect("energy");
        let expected_energy: f64 = [(0.1, 1.0), (0.2, 2.0), (0.3, 3.0), (0.4, 4.0)]
            .iter()
            .map(|&(b, w): &(f64, f64)| -b * w.ln())
            .sum();
        assert!((energy - expected_energy).abs() < 1e-12);

        let entropy = executor.bethe_entropy().expect("entropy");
        let expected_entropy: f64 = belief.iter().map(|&b| -b * b.ln()).sum();
        assert!((entropy - expected_entropy).abs() < 1e-12);
    }

    #[test]
    fn zero_belief_is_degenerate() {
        let mut executor = reference_executor();
        executor.set_incoming(0, &[0.0, 0.0]).expect("in0");
        assert!(matches!(
            executor.belief(),
            Err(EngineError::DegenerateBelief { .. })
        ));
    }

    #[test]
    fn derivatives_follow_updates() {
        let mut executor = reference_executor();
        assert!(executor.set_incoming_derivative(0, 0, &[0.0, 0.0]).is_err());
        executor.enable_derivatives(4, true);
        executor.update().expect("update");
        let d = executor.outgoing_derivative(0, 1).expect("derivative");
        // Derivatives of a normalized message sum to zero.
        assert!((d[0] + d[1]).abs() < 1e-12);
        assert!(d[0] > 0.0);

        executor.reset_messages();
        assert_eq!(executor.outgoing_derivative(0, 1), Some(&[0.0, 0.0][..]));
        executor.disable_derivatives();
        assert!(executor.outgoing_derivative(0, 1).is_none());
    }

    #[test]
    fn reset_restores_uniform_messages() {
        let mut executor = reference_executor();
        executor.set_incoming(0, &[1.0, 0.0]).expect("in0");
        executor.update().expect("update");
        executor.reset_messages();
        assert_eq!(executor.incoming(0).expect("in"), &[0.5, 0.5]);
        assert_eq!(executor.outgoing(1).expect("out"), &[0.5, 0.5]);
    }
}
