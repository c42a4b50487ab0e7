//! # tablebp Core
//!
//! Factor-table message updates for sum-product and min-sum belief propagation.
//!
//! A factor's joint [`WeightTable`] is compiled once into an [`UpdatePlan`] that
//! computes the outgoing message of every edge from shared partial
//! marginalizations. Plans are cached per table in a [`PlanCache`] and applied
//! by any number of [`FactorUpdateExecutor`]s, each with its own message
//! buffers and scratch.

pub mod engine;

// Re-export commonly used types
pub use engine::config::{EngineConfig, UpdateStrategy, DEFAULT_SPARSE_THRESHOLD};
pub use engine::derivative::DerivativeTracker;
pub use engine::errors::EngineError;
pub use engine::factor_update::FactorUpdateExecutor;
pub use engine::messages::{EdgeMessages, MessageSemantics};
pub use engine::parallel_update::{update_factors, ParallelUpdateResult, ParallelUpdateStats};
pub use engine::plan_cache::{PlanCache, PlanCacheStats};
pub use engine::plan_compiler::{compile_plan, PlanCompiler};
pub use engine::update_plan::{PlanScratch, PlanStats, Step, UpdatePlan};
pub use engine::variable_update::VariableUpdateExecutor;
pub use engine::weight_table::{Representation, TableId, WeightTable};
