//! The factor-table update engine.
//!
//! This module provides:
//! - **errors**: Error types for table construction and message updates
//! - **config**: Engine configuration owned by a graph-execution context
//! - **weight_table**: Dense and sparse joint weight tables
//! - **plan_compiler**: Balanced binary reduction into shared marginalization steps
//! - **update_plan**: Compiled step lists and their execution
//! - **plan_cache**: Shared plan cache keyed by table identity
//! - **factor_update**: Per-factor executor (plan, brute force, k-best)
//! - **variable_update**: Per-variable executor in cost and probability conventions
//! - **parallel_update**: Concurrent updates of independent factor executors

pub mod config;
pub mod derivative;
pub mod errors;
pub mod factor_update;
pub mod messages;
pub mod numeric_kernels;
pub mod parallel_update;
pub mod plan_cache;
pub mod plan_compiler;
pub mod update_plan;
pub mod variable_update;
pub mod weight_table;

mod direct;
mod kbest;
