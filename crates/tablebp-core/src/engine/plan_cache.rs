//! Shared cache of compiled update plans, keyed by table identity.
//!
//! The cache belongs to a graph-execution context and is passed explicitly to
//! executors when they initialize. Factors sharing one `Arc<WeightTable>` get
//! the same `Arc<UpdatePlan>`.
//!
//! Compilation runs outside the lock. When two threads race on the same table,
//! both compile and the first insert wins, so every caller ends up holding the
//! same plan.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::engine::config::EngineConfig;
use crate::engine::errors::EngineError;
use crate::engine::plan_compiler::compile_plan;
use crate::engine::update_plan::UpdatePlan;
use crate::engine::weight_table::{TableId, WeightTable};

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Plans currently cached.
    pub plans: usize,
}

/// Thread-safe map from table identity to compiled plan.
#[derive(Debug)]
pub struct PlanCache {
    config: EngineConfig,
    plans: RwLock<FxHashMap<TableId, Arc<UpdatePlan>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::with_valid_config(EngineConfig::default())
    }
}

impl PlanCache {
    /// Creates an empty cache compiling plans under `config`.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::with_valid_config(config.validate()?))
    }

    fn with_valid_config(config: EngineConfig) -> Self {
        Self {
            config,
            plans: RwLock::new(FxHashMap::default()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the plan for `table`, compiling it on first request.
    pub fn lookup_or_create(&self, table: &WeightTable) -> Result<Arc<UpdatePlan>, EngineError> {
        if let Some(plan) = self.get(table.id())? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(plan);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile_plan(table, &self.config)?);
        let mut plans = self.plans.write().map_err(|_| poisoned())?;
        let plan = plans.entry(table.id()).or_insert(compiled);
        Ok(Arc::clone(plan))
    }

    /// Cached plan for a table, without compiling.
    pub fn get(&self, id: TableId) -> Result<Option<Arc<UpdatePlan>>, EngineError> {
        let plans = self.plans.read().map_err(|_| poisoned())?;
        Ok(plans.get(&id).cloned())
    }

    /// Drops every cached plan. Executors keep the plans they already hold.
    pub fn clear(&self) -> Result<(), EngineError> {
        self.plans.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.plans.read().map(|plans| plans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            plans: self.len(),
        }
    }
}

fn poisoned() -> EngineError {
    EngineError::Internal("plan cache lock poisoned".into())
}
