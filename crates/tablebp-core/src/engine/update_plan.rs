//! # Update Plans
//!
//! A compiled plan is an ordered list of [`Step`]s that turns a factor's weight
//! table and its incoming messages into an outgoing message on every edge.
//!
//! ## Design
//!
//! - Steps form a closed set of four kinds dispatched by `match`, keeping the
//!   hot loop free of dynamic dispatch.
//! - Slot 0 is the factor's own weight table. Every other slot is an auxiliary
//!   table produced by one marginalization step.
//! - A plan holds no mutable state. Auxiliary values live in a [`PlanScratch`]
//!   owned by the caller, so one plan can be applied concurrently to many
//!   factors that share a table.
//! - For each edge the plan records the subsequence of steps that feeds its
//!   output, so a single edge can be recomputed with exactly the same arithmetic
//!   as a full pass.

use std::sync::Arc;

use crate::engine::errors::EngineError;
use crate::engine::messages::{DampingState, EdgeMessages, OutputPort};
use crate::engine::weight_table::{Dims, Representation, TableId, WeightTable};

/// Index of a table within a plan. Slot [`ROOT_SLOT`] is the factor's table.
pub type SlotId = usize;

pub const ROOT_SLOT: SlotId = 0;

/// One step of an update plan.
#[derive(Debug, Clone)]
pub enum Step {
    /// Sums one dimension out of a dense table, weighting by that edge's incoming message.
    DenseMarginalize {
        source: SlotId,
        target: SlotId,
        in_edge: usize,
        /// Stride of the removed dimension in the source table.
        stride: usize,
        /// Domain size of the removed dimension.
        domain_size: usize,
    },
    /// Sums one dimension out of a sparse table using precomputed index maps.
    SparseMarginalize {
        source: SlotId,
        target: SlotId,
        in_edge: usize,
        /// Per source entry, the removed dimension's value.
        msg_indices: Box<[usize]>,
        /// Per source entry, the position it accumulates into in the target.
        target_indices: Box<[usize]>,
    },
    /// Normalizes a one-dimensional dense table into an outgoing message.
    DenseOutput { source: SlotId, out_edge: usize },
    /// Normalizes a one-dimensional sparse table into an outgoing message.
    SparseOutput {
        source: SlotId,
        out_edge: usize,
        /// Per source entry, the domain value it writes.
        values: Box<[usize]>,
    },
}

impl Step {
    pub fn source(&self) -> SlotId {
        match self {
            Step::DenseMarginalize { source, .. }
            | Step::SparseMarginalize { source, .. }
            | Step::DenseOutput { source, .. }
            | Step::SparseOutput { source, .. } => *source,
        }
    }

    /// Output edge for output steps.
    pub fn out_edge(&self) -> Option<usize> {
        match self {
            Step::DenseOutput { out_edge, .. } | Step::SparseOutput { out_edge, .. } => {
                Some(*out_edge)
            }
            _ => None,
        }
    }
}

/// Shape of one auxiliary table slot.
#[derive(Debug, Clone)]
pub struct SlotLayout {
    pub domain_sizes: Dims,
    pub representation: Representation,
    /// Number of stored values.
    pub len: usize,
}

/// Step counts of a compiled plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub dense_marginalize: usize,
    pub sparse_marginalize: usize,
    pub dense_output: usize,
    pub sparse_output: usize,
    /// Auxiliary tables, excluding the factor's own table.
    pub scratch_tables: usize,
}

impl PlanStats {
    pub fn marginalize_steps(&self) -> usize {
        self.dense_marginalize + self.sparse_marginalize
    }

    pub fn output_steps(&self) -> usize {
        self.dense_output + self.sparse_output
    }
}

/// A compiled, immutable update plan for one weight table.
#[derive(Debug)]
pub struct UpdatePlan {
    pub(crate) table_id: TableId,
    pub(crate) domain_sizes: Dims,
    pub(crate) steps: Vec<Step>,
    pub(crate) slots: Vec<SlotLayout>,
    pub(crate) edge_paths: Vec<Vec<usize>>,
    pub(crate) stats: PlanStats,
}

impl UpdatePlan {
    /// Identity of the table this plan was compiled for.
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn degree(&self) -> usize {
        self.domain_sizes.len()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn slots(&self) -> &[SlotLayout] {
        &self.slots
    }

    pub fn stats(&self) -> PlanStats {
        self.stats
    }

    /// Indices into [`steps`](Self::steps) that produce `edge`'s output, in order.
    pub fn edge_path(&self, edge: usize) -> Option<&[usize]> {
        self.edge_paths.get(edge).map(Vec::as_slice)
    }

    /// Allocates scratch storage sized for this plan.
    pub fn new_scratch(&self) -> PlanScratch {
        let mut scratch = PlanScratch::default();
        scratch.prepare(self);
        scratch
    }

    /// Runs every step, writing an outgoing message on every edge.
    ///
    /// Stops at the first degenerate output; edges already written keep their
    /// new values and the rest keep their prior values.
    pub fn apply(
        &self,
        table: &WeightTable,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), EngineError> {
        self.check_table(table)?;
        ctx.scratch.prepare(self);
        let (incoming, mut port) = ctx.messages.split(ctx.damping);
        for step in &self.steps {
            run_step(
                step,
                table.weights(),
                &mut ctx.scratch.buffers,
                incoming,
                &mut port,
                ctx.factor,
            )?;
        }
        Ok(())
    }

    /// Runs only the steps that feed `edge`'s output.
    pub fn apply_edge(
        &self,
        table: &WeightTable,
        edge: usize,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), EngineError> {
        self.check_table(table)?;
        let path = self.edge_paths.get(edge).ok_or_else(|| EngineError::EdgeOutOfRange {
            factor: ctx.factor.clone(),
            edge,
            degree: self.degree(),
        })?;
        ctx.scratch.prepare(self);
        let (incoming, mut port) = ctx.messages.split(ctx.damping);
        for &index in path {
            run_step(
                &self.steps[index],
                table.weights(),
                &mut ctx.scratch.buffers,
                incoming,
                &mut port,
                ctx.factor,
            )?;
        }
        Ok(())
    }

    fn check_table(&self, table: &WeightTable) -> Result<(), EngineError> {
        if table.id() != self.table_id {
            return Err(EngineError::Internal(format!(
                "plan for table {:?} applied to table {:?}",
                self.table_id,
                table.id()
            )));
        }
        Ok(())
    }
}

/// Scratch values for a plan's auxiliary tables.
///
/// Owned by one execution context at a time. A scratch can be reused across
/// plans; it is resized whenever it is handed a different plan.
#[derive(Debug, Default)]
pub struct PlanScratch {
    table_id: Option<TableId>,
    buffers: Vec<Vec<f64>>,
}

impl PlanScratch {
    fn prepare(&mut self, plan: &UpdatePlan) {
        if self.table_id == Some(plan.table_id) {
            return;
        }
        self.buffers.resize_with(plan.slots.len(), Vec::new);
        for (buffer, slot) in self.buffers.iter_mut().zip(&plan.slots).skip(1) {
            buffer.clear();
            buffer.resize(slot.len, 0.0);
        }
        self.table_id = Some(plan.table_id);
    }

    /// Values of an auxiliary slot after the last application.
    pub fn slot_values(&self, slot: SlotId) -> Option<&[f64]> {
        self.buffers.get(slot).map(Vec::as_slice)
    }
}

/// Everything one plan application touches besides the plan and table.
pub struct ExecutionContext<'a> {
    pub factor: &'a Arc<str>,
    pub scratch: &'a mut PlanScratch,
    pub messages: &'a mut EdgeMessages,
    pub damping: &'a mut DampingState,
}

fn run_step(
    step: &Step,
    root: &[f64],
    buffers: &mut [Vec<f64>],
    incoming: &[Vec<f64>],
    port: &mut OutputPort<'_>,
    factor: &Arc<str>,
) -> Result<(), EngineError> {
    match step {
        Step::DenseMarginalize {
            source,
            target,
            in_edge,
            stride,
            domain_size,
        } => {
            let (f, g) = source_and_target(root, buffers, *source, *target);
            dense_marginalize(f, g, &incoming[*in_edge], *stride, *domain_size);
        }
        Step::SparseMarginalize {
            source,
            target,
            in_edge,
            msg_indices,
            target_indices,
        } => {
            let (f, g) = source_and_target(root, buffers, *source, *target);
            sparse_marginalize(f, g, &incoming[*in_edge], msg_indices, target_indices);
        }
        Step::DenseOutput { source, out_edge } => {
            let f = source_values(root, buffers, *source);
            let sum: f64 = f.iter().sum();
            if !port.emit_probability(*out_edge, sum, |out| out.copy_from_slice(f)) {
                return Err(EngineError::degenerate_message(factor, *out_edge));
            }
        }
        Step::SparseOutput {
            source,
            out_edge,
            values,
        } => {
            let f = source_values(root, buffers, *source);
            let sum: f64 = f.iter().sum();
            let written = port.emit_probability(*out_edge, sum, |out| {
                out.fill(0.0);
                for (&value, &weight) in values.iter().zip(f) {
                    out[value] = weight;
                }
            });
            if !written {
                return Err(EngineError::degenerate_message(factor, *out_edge));
            }
        }
    }
    Ok(())
}

#[inline]
fn source_values<'a>(root: &'a [f64], buffers: &'a [Vec<f64>], source: SlotId) -> &'a [f64] {
    if source == ROOT_SLOT {
        root
    } else {
        &buffers[source]
    }
}

#[inline]
fn source_and_target<'a>(
    root: &'a [f64],
    buffers: &'a mut [Vec<f64>],
    source: SlotId,
    target: SlotId,
) -> (&'a [f64], &'a mut [f64]) {
    debug_assert!(source < target, "auxiliary tables are produced in order");
    let (lower, upper) = buffers.split_at_mut(target);
    let lower: &'a [Vec<f64>] = lower;
    (source_values(root, lower, source), &mut upper[0])
}

/// `g[outer, inner] = Σ_v f[outer, v, inner] * msg[v]` for a dimension with the given stride.
pub(crate) fn dense_marginalize(
    f: &[f64],
    g: &mut [f64],
    msg: &[f64],
    stride: usize,
    domain_size: usize,
) {
    g.fill(0.0);
    let block = stride * domain_size;
    for (outer, chunk) in f.chunks_exact(block).enumerate() {
        let target = &mut g[outer * stride..(outer + 1) * stride];
        for (row, &weight) in chunk.chunks_exact(stride).zip(msg) {
            for (t, &value) in target.iter_mut().zip(row) {
                *t += value * weight;
            }
        }
    }
}

/// `g[target[e]] += f[e] * msg[msg_index[e]]` for every source entry `e`.
pub(crate) fn sparse_marginalize(
    f: &[f64],
    g: &mut [f64],
    msg: &[f64],
    msg_indices: &[usize],
    target_indices: &[usize],
) {
    g.fill(0.0);
    for ((&value, &m), &t) in f.iter().zip(msg_indices).zip(target_indices) {
        g[t] += value * msg[m];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_marginalize_middle_dimension() {
        // Shape [2, 3, 2], removing dimension 1 (stride 2, size 3).
        let f: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let msg = [1.0, 10.0, 100.0];
        let mut g = vec![f64::NAN; 4];
        dense_marginalize(&f, &mut g, &msg, 2, 3);
        // g[a, c] = f[a,0,c] + 10 f[a,1,c] + 100 f[a,2,c]
        assert_eq!(
            g,
            vec![
                0.0 + 20.0 + 400.0,
                1.0 + 30.0 + 500.0,
                6.0 + 80.0 + 1000.0,
                7.0 + 90.0 + 1100.0
            ]
        );
    }

    #[test]
    fn dense_marginalize_first_and_last_dimension() {
        // Shape [2, 2]: weights w00=1, w01=2, w10=3, w11=4.
        let f = [1.0, 2.0, 3.0, 4.0];
        let mut g = vec![0.0; 2];
        dense_marginalize(&f, &mut g, &[0.5, 0.5], 2, 2);
        assert_eq!(g, vec![2.0, 3.0]);

        dense_marginalize(&f, &mut g, &[1.0, 2.0], 1, 2);
        assert_eq!(g, vec![5.0, 11.0]);
    }

    #[test]
    fn sparse_marginalize_accumulates_into_targets() {
        let f = [1.0, 2.0, 3.0];
        let msg = [0.5, 2.0];
        let mut g = vec![9.0; 2];
        sparse_marginalize(&f, &mut g, &msg, &[0, 1, 1], &[0, 0, 1]);
        assert_eq!(g, vec![0.5 + 4.0, 6.0]);
    }
}
