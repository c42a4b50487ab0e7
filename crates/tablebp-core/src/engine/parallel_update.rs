//! Parallel updates of independent factor executors.
//!
//! Each executor owns its message buffers and its plan scratch, so a batch of
//! executors can be updated concurrently even when they share one compiled
//! plan. The caller guarantees that no other thread touches the same
//! executors, which `&mut [FactorUpdateExecutor]` already enforces.
//!
//! ## Feature gating
//!
//! Parallel execution is behind the `parallel` feature flag. When disabled,
//! executors are updated sequentially with the same result layout.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::engine::errors::EngineError;
use crate::engine::factor_update::FactorUpdateExecutor;

/// Result of updating a batch of executors.
#[derive(Debug)]
pub struct ParallelUpdateResult {
    /// One result per executor, in input order
    pub results: Vec<Result<(), EngineError>>,
    /// Statistics about the batch
    pub stats: ParallelUpdateStats,
}

impl ParallelUpdateResult {
    /// True when every executor updated successfully.
    pub fn all_ok(&self) -> bool {
        self.stats.failures == 0
    }
}

/// Statistics about a batch update.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParallelUpdateStats {
    /// Number of executors updated
    pub executors_updated: usize,
    /// Number of executors whose update failed
    pub failures: usize,
    /// Number of distinct compiled plans used by the batch
    pub distinct_plans: usize,
}

/// Updates every executor concurrently.
#[cfg(feature = "parallel")]
pub fn update_factors(executors: &mut [FactorUpdateExecutor]) -> ParallelUpdateResult {
    let results: Vec<Result<(), EngineError>> = executors
        .par_iter_mut()
        .map(FactorUpdateExecutor::update)
        .collect();
    summarize(executors, results)
}

/// Sequential fallback for batch updates.
#[cfg(not(feature = "parallel"))]
pub fn update_factors(executors: &mut [FactorUpdateExecutor]) -> ParallelUpdateResult {
    let results: Vec<Result<(), EngineError>> = executors
        .iter_mut()
        .map(FactorUpdateExecutor::update)
        .collect();
    summarize(executors, results)
}

fn summarize(
    executors: &[FactorUpdateExecutor],
    results: Vec<Result<(), EngineError>>,
) -> ParallelUpdateResult {
    let plans: FxHashSet<_> = executors
        .iter()
        .filter_map(|executor| executor.plan().map(|plan| plan.table_id()))
        .collect();
    let failures = results.iter().filter(|r| r.is_err()).count();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        executors = executors.len(),
        failures,
        distinct_plans = plans.len(),
        "batch factor update"
    );

    ParallelUpdateResult {
        stats: ParallelUpdateStats {
            executors_updated: executors.len(),
            failures,
            distinct_plans: plans.len(),
        },
        results,
    }
}
