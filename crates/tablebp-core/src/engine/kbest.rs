//! k-best truncated factor update.
//!
//! For each output edge, every other edge contributes only the `k` values with
//! the largest incoming probability. The update sums table weight times message
//! product over the Cartesian product of those selections. Selection uses
//! partial ordering (`select_nth_unstable_by`), not a full sort.
//!
//! The result is an approximation whenever some edge's domain exceeds `k`.
//! Normalization and damping are the same as in the exact engines.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::errors::EngineError;
use crate::engine::messages::{DampingState, EdgeMessages};
use crate::engine::numeric_kernels::top_k_indices;
use crate::engine::weight_table::{Dims, WeightTable};

/// Selected values per edge, ascending.
type Selections = Vec<Vec<usize>>;

fn select_all(incoming: &[Vec<f64>], k: usize) -> Selections {
    incoming
        .iter()
        .map(|message| {
            let mut selected = top_k_indices(message, k);
            selected.sort_unstable();
            selected
        })
        .collect()
}

/// Writes the truncated unnormalized message for `edge` into `staged`.
pub(crate) fn stage_edge(
    table: &WeightTable,
    incoming: &[Vec<f64>],
    selections: &[Vec<usize>],
    edge: usize,
    staged: &mut [f64],
) {
    staged.fill(0.0);
    let others: SmallVec<[usize; 8]> = (0..table.dimensions()).filter(|&j| j != edge).collect();
    if others.iter().any(|&j| selections[j].is_empty()) {
        return;
    }

    let out_stride = table.stride(edge);
    let mut cursor: Dims = SmallVec::from_elem(0, others.len());
    loop {
        let mut base = 0;
        let mut product = 1.0;
        for (slot, &j) in others.iter().enumerate() {
            let value = selections[j][cursor[slot]];
            base += value * table.stride(j);
            product *= incoming[j][value];
        }
        if product != 0.0 {
            for (v, s) in staged.iter_mut().enumerate() {
                *s += table.dense_weight(base + v * out_stride) * product;
            }
        }

        let mut slot = others.len();
        loop {
            if slot == 0 {
                return;
            }
            slot -= 1;
            cursor[slot] += 1;
            if cursor[slot] < selections[others[slot]].len() {
                break;
            }
            cursor[slot] = 0;
        }
    }
}

/// Truncated update of every edge, stopping at the first degenerate one.
pub(crate) fn update(
    table: &WeightTable,
    k: usize,
    messages: &mut EdgeMessages,
    damping: &mut DampingState,
    factor: &Arc<str>,
) -> Result<(), EngineError> {
    let selections = select_all(messages.incoming_all(), k);
    let mut staged = Vec::new();
    for edge in 0..table.dimensions() {
        commit_edge(table, &selections, edge, messages, damping, factor, &mut staged)?;
    }
    Ok(())
}

/// Truncated update of one edge.
pub(crate) fn update_edge(
    table: &WeightTable,
    k: usize,
    edge: usize,
    messages: &mut EdgeMessages,
    damping: &mut DampingState,
    factor: &Arc<str>,
) -> Result<(), EngineError> {
    let selections = select_all(messages.incoming_all(), k);
    let mut staged = Vec::new();
    commit_edge(table, &selections, edge, messages, damping, factor, &mut staged)
}

fn commit_edge(
    table: &WeightTable,
    selections: &[Vec<usize>],
    edge: usize,
    messages: &mut EdgeMessages,
    damping: &mut DampingState,
    factor: &Arc<str>,
    staged: &mut Vec<f64>,
) -> Result<(), EngineError> {
    staged.clear();
    staged.resize(table.domain_size(edge), 0.0);
    let (incoming, mut port) = messages.split(damping);
    stage_edge(table, incoming, selections, edge, staged);
    if !port.emit_probability_staged(edge, staged) {
        return Err(EngineError::degenerate_message(factor, edge));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::direct;
    use crate::engine::messages::MessageSemantics;

    fn setup(table: &WeightTable) -> (EdgeMessages, DampingState, Arc<str>) {
        (
            EdgeMessages::new(table.domain_sizes(), MessageSemantics::Probability),
            DampingState::new(table.dimensions()),
            Arc::from("kbest"),
        )
    }

    #[test]
    fn unbounded_k_matches_direct_update() {
        let weights: Vec<f64> = (0..24).map(|x| 1.0 + (x % 5) as f64).collect();
        let table = WeightTable::dense(&[2, 3, 4], weights).expect("table");
        let (mut exact, mut exact_damping, factor) = setup(&table);
        let (mut truncated, mut truncated_damping, _) = setup(&table);
        for messages in [&mut exact, &mut truncated] {
            messages.set_incoming(0, &[0.3, 0.7]).expect("shape");
            messages.set_incoming(1, &[0.2, 0.5, 0.3]).expect("shape");
            messages.set_incoming(2, &[0.1, 0.2, 0.3, 0.4]).expect("shape");
        }

        direct::update(&table, &mut exact, &mut exact_damping, &factor).expect("direct");
        update(&table, 4, &mut truncated, &mut truncated_damping, &factor).expect("kbest");
        for edge in 0..3 {
            for (a, b) in exact.outgoing(edge).iter().zip(truncated.outgoing(edge)) {
                assert!((a - b).abs() < 1e-12, "edge {}: {} vs {}", edge, a, b);
            }
        }
    }

    #[test]
    fn k_one_follows_the_most_likely_value() {
        // Rows indexed by edge 0.
        let table = WeightTable::dense(
            &[3, 2],
            vec![
                1.0, 1.0, //
                1.0, 3.0, //
                2.0, 2.0,
            ],
        )
        .expect("table");
        let (mut messages, mut damping, factor) = setup(&table);
        messages.set_incoming(0, &[0.2, 0.5, 0.3]).expect("shape");
        update_edge(&table, 1, 1, &mut messages, &mut damping, &factor).expect("update");
        assert_eq!(messages.outgoing(1), &[0.25, 0.75]);
    }

    #[test]
    fn damping_blends_after_truncated_normalization() {
        let table = WeightTable::dense(&[3, 2], vec![1.0, 1.0, 1.0, 3.0, 2.0, 2.0]).expect("table");
        let (mut messages, mut damping, factor) = setup(&table);
        messages.set_incoming(0, &[0.2, 0.5, 0.3]).expect("shape");
        messages.set_outgoing(1, &[1.0, 0.0]).expect("shape");
        damping.set(1, 0.25, 2);
        update_edge(&table, 1, 1, &mut messages, &mut damping, &factor).expect("update");
        // 0.75 * [0.25, 0.75] + 0.25 * [1, 0]
        let out = messages.outgoing(1);
        assert!((out[0] - 0.4375).abs() < 1e-12, "{:?}", out);
        assert!((out[1] - 0.5625).abs() < 1e-12, "{:?}", out);
    }

    #[test]
    fn truncated_support_can_be_degenerate() {
        let table = WeightTable::sparse(&[3, 2], vec![(vec![0, 0], 1.0)]).expect("table");
        let (mut messages, mut damping, factor) = setup(&table);
        messages.set_incoming(0, &[0.1, 0.6, 0.3]).expect("shape");
        let err = update_edge(&table, 1, 1, &mut messages, &mut damping, &factor).unwrap_err();
        assert!(matches!(err, EngineError::DegenerateMessage { edge: 1, .. }));
        assert_eq!(messages.outgoing(1), &[0.5, 0.5]);
    }
}
