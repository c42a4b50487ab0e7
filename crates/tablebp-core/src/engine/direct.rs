//! Brute-force factor update.
//!
//! Recomputes each outgoing message from the full table:
//! `out[edge][v] = Σ_e w_e · Π_{j≠edge} in[j][idx_j]` over entries with
//! `idx_edge = v`. Costs `O(D · cardinality)` per full update, against the
//! compiled plan's shared partial sums. Used when the `Direct` strategy is
//! selected and as the reference the plan is tested against.

use std::sync::Arc;

use crate::engine::errors::EngineError;
use crate::engine::messages::{DampingState, EdgeMessages};
use crate::engine::weight_table::WeightTable;

/// Writes the unnormalized message for `edge` into `staged`.
pub(crate) fn stage_edge(
    table: &WeightTable,
    incoming: &[Vec<f64>],
    edge: usize,
    staged: &mut [f64],
) {
    staged.fill(0.0);
    table.for_each_entry(|tuple, weight| {
        if weight == 0.0 {
            return;
        }
        let mut product = weight;
        for (j, &value) in tuple.iter().enumerate() {
            if j != edge {
                product *= incoming[j][value];
            }
        }
        staged[tuple[edge]] += product;
    });
}

/// Recomputes every edge in order, stopping at the first degenerate one.
pub(crate) fn update(
    table: &WeightTable,
    messages: &mut EdgeMessages,
    damping: &mut DampingState,
    factor: &Arc<str>,
) -> Result<(), EngineError> {
    let mut staged = Vec::new();
    for edge in 0..table.dimensions() {
        commit_edge(table, edge, messages, damping, factor, &mut staged)?;
    }
    Ok(())
}

/// Recomputes one edge.
pub(crate) fn update_edge(
    table: &WeightTable,
    edge: usize,
    messages: &mut EdgeMessages,
    damping: &mut DampingState,
    factor: &Arc<str>,
) -> Result<(), EngineError> {
    let mut staged = Vec::new();
    commit_edge(table, edge, messages, damping, factor, &mut staged)
}

fn commit_edge(
    table: &WeightTable,
    edge: usize,
    messages: &mut EdgeMessages,
    damping: &mut DampingState,
    factor: &Arc<str>,
    staged: &mut Vec<f64>,
) -> Result<(), EngineError> {
    staged.clear();
    staged.resize(table.domain_size(edge), 0.0);
    let (incoming, mut port) = messages.split(damping);
    stage_edge(table, incoming, edge, staged);
    if !port.emit_probability_staged(edge, staged) {
        return Err(EngineError::degenerate_message(factor, edge));
    }
    Ok(())
}
