//! # Plan Compiler
//!
//! Converts a weight table's dimensional structure into an [`UpdatePlan`]: a
//! tree of shared partial marginalizations that yields the outgoing message of
//! every edge in `O(D log D)` table passes instead of `O(D²)`.
//!
//! ## Algorithm
//!
//! Dimensions are first ordered by domain size, largest first; position `q` in
//! that order stands for edge `mapping[q]`. The walk then works on residue
//! classes of positions. Starting from a table that still holds every position
//! congruent to `p` modulo `s`, it splits those positions into the classes
//! `p` and `p + s` modulo `2s`. Marginalizing out one class yields a shared
//! auxiliary table for the other class, and the walk recurses on it with the
//! step doubled. When a class holds a single position, the current table is
//! that edge's marginal and an output step is emitted.
//!
//! Each marginalization removes one local dimension from the current table, so
//! the remaining positions keep a compacted list of local dimension numbers that
//! is threaded through the recursion. The recursion depth is `log2(D)`.
//!
//! Sparse source tables produce sparse auxiliary tables unless the projected
//! support is dense enough (see [`EngineConfig::use_dense`]); dense tables
//! always produce dense tables.

use std::borrow::Cow;

use smallvec::SmallVec;

use crate::engine::config::EngineConfig;
use crate::engine::errors::EngineError;
use crate::engine::update_plan::{PlanStats, SlotId, SlotLayout, Step, UpdatePlan, ROOT_SLOT};
use crate::engine::weight_table::{layout, Dims, Representation, WeightTable};

/// Compiles the update plan for a table.
pub fn compile_plan(table: &WeightTable, config: &EngineConfig) -> Result<UpdatePlan, EngineError> {
    PlanCompiler::new(table, config).compile()
}

#[derive(Debug)]
enum SlotShape<'t> {
    Dense,
    /// Flat index tuples of the stored entries.
    Sparse(Cow<'t, [usize]>),
}

#[derive(Debug)]
struct CompileSlot<'t> {
    domain_sizes: Dims,
    strides: Dims,
    cardinality: usize,
    shape: SlotShape<'t>,
}

impl CompileSlot<'_> {
    fn layout(&self) -> SlotLayout {
        let (representation, len) = match &self.shape {
            SlotShape::Dense => (Representation::Dense, self.cardinality),
            SlotShape::Sparse(indices) => (
                Representation::Sparse,
                indices.len() / self.domain_sizes.len(),
            ),
        };
        SlotLayout {
            domain_sizes: self.domain_sizes.clone(),
            representation,
            len,
        }
    }
}

/// Builds the step list for one weight table.
pub struct PlanCompiler<'t> {
    table: &'t WeightTable,
    config: &'t EngineConfig,
    /// Edge index at each position of the size-sorted order.
    mapping: Dims,
    slots: Vec<CompileSlot<'t>>,
    /// Step that produced each slot; `None` for the root.
    producers: Vec<Option<usize>>,
    steps: Vec<Step>,
    edge_paths: Vec<Vec<usize>>,
    stats: PlanStats,
}

impl<'t> PlanCompiler<'t> {
    pub fn new(table: &'t WeightTable, config: &'t EngineConfig) -> Self {
        let sizes = table.domain_sizes();
        let mut mapping: Dims = (0..sizes.len()).collect();
        // Stable: equal sizes keep edge order.
        mapping.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

        let shape = if table.is_sparse() {
            SlotShape::Sparse(Cow::Borrowed(table.flat_indices()))
        } else {
            SlotShape::Dense
        };
        let root = CompileSlot {
            domain_sizes: sizes.iter().copied().collect(),
            strides: table.strides().iter().copied().collect(),
            cardinality: table.cardinality(),
            shape,
        };

        Self {
            table,
            config,
            mapping,
            slots: vec![root],
            producers: vec![None],
            steps: Vec::new(),
            edge_paths: vec![Vec::new(); sizes.len()],
            stats: PlanStats::default(),
        }
    }

    /// Edge order used by the walk, largest domain first.
    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }

    pub fn compile(mut self) -> Result<UpdatePlan, EngineError> {
        let order = self.table.dimensions();
        if order == 1 {
            self.output(ROOT_SLOT, 0);
        } else {
            let entries: Dims = self.mapping.clone();
            self.walk_pair(0, 1, ROOT_SLOT, &entries)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            table = ?self.table.id(),
            dimensions = order,
            marginalize_steps = self.stats.marginalize_steps(),
            sparse_marginalize = self.stats.sparse_marginalize,
            output_steps = self.stats.output_steps(),
            "compiled factor update plan"
        );

        self.stats.scratch_tables = self.slots.len() - 1;
        let slots = self.slots.iter().map(CompileSlot::layout).collect();
        Ok(UpdatePlan {
            table_id: self.table.id(),
            domain_sizes: self.table.domain_sizes().iter().copied().collect(),
            steps: self.steps,
            slots,
            edge_paths: self.edge_paths,
            stats: self.stats,
        })
    }

    /// Splits the class `p mod step` into `p` and `p + step` modulo `2 * step`.
    fn walk_pair(
        &mut self,
        p: usize,
        step: usize,
        slot: SlotId,
        entries: &[usize],
    ) -> Result<(), EngineError> {
        let left = p;
        let right = p + step;
        debug_assert!(right < self.table.dimensions());
        self.walk_side(left, right, step * 2, slot, entries)?;
        self.walk_side(right, left, step * 2, slot, entries)
    }

    /// Marginalizes every position in class `x mod step`, then continues with class `y`.
    ///
    /// `entries` lists the local dimension of each remaining position, in
    /// increasing position order. The `x` positions sit at list offsets
    /// `i + (x > y)` as earlier ones are removed.
    fn walk_side(
        &mut self,
        x: usize,
        y: usize,
        step: usize,
        mut slot: SlotId,
        entries: &[usize],
    ) -> Result<(), EngineError> {
        let order = self.table.dimensions();
        let offset = usize::from(x > y);
        let mut entries: Dims = entries.iter().copied().collect();

        let mut i = 0;
        while x + i * step < order {
            let edge = self.mapping[x + i * step];
            let raw = i + offset;
            let local = entries[raw];
            slot = self.marginalize(slot, edge, local)?;
            entries.remove(raw);
            for e in entries.iter_mut() {
                if *e > local {
                    *e -= 1;
                }
            }
            i += 1;
        }

        if y + step < order {
            self.walk_pair(y, step, slot, &entries)
        } else {
            let edge = self.mapping[y];
            self.output(slot, edge);
            Ok(())
        }
    }

    fn marginalize(
        &mut self,
        source: SlotId,
        in_edge: usize,
        local: usize,
    ) -> Result<SlotId, EngineError> {
        let src = &self.slots[source];
        let domain_sizes: Dims = src
            .domain_sizes
            .iter()
            .enumerate()
            .filter(|&(d, _)| d != local)
            .map(|(_, &size)| size)
            .collect();
        let (strides, cardinality) = layout(&domain_sizes)?;
        let target = self.slots.len();

        let (step, shape) = match &src.shape {
            SlotShape::Dense => {
                self.stats.dense_marginalize += 1;
                let step = Step::DenseMarginalize {
                    source,
                    target,
                    in_edge,
                    stride: src.strides[local],
                    domain_size: src.domain_sizes[local],
                };
                (step, SlotShape::Dense)
            }
            SlotShape::Sparse(indices) => {
                self.stats.sparse_marginalize += 1;
                let dims = src.domain_sizes.len();
                let mut msg_indices = Vec::with_capacity(indices.len() / dims);
                let mut projected = Vec::with_capacity(indices.len() / dims);
                for tuple in indices.chunks_exact(dims) {
                    msg_indices.push(tuple[local]);
                    projected.push(project_joint(tuple, local, &strides));
                }

                let mut support = projected.clone();
                support.sort_unstable();
                support.dedup();

                let (target_indices, shape) = if self.config.use_dense(support.len(), cardinality)
                {
                    (projected, SlotShape::Dense)
                } else {
                    let positions = projected
                        .iter()
                        .map(|joint| support.binary_search(joint).unwrap_or_else(|at| at))
                        .collect();
                    let mut flat = Vec::with_capacity(support.len() * domain_sizes.len());
                    for &joint in &support {
                        for (&stride, &size) in strides.iter().zip(domain_sizes.iter()) {
                            flat.push((joint / stride) % size);
                        }
                    }
                    (positions, SlotShape::Sparse(Cow::Owned(flat)))
                };

                let step = Step::SparseMarginalize {
                    source,
                    target,
                    in_edge,
                    msg_indices: msg_indices.into_boxed_slice(),
                    target_indices: target_indices.into_boxed_slice(),
                };
                (step, shape)
            }
        };

        self.steps.push(step);
        self.slots.push(CompileSlot {
            domain_sizes,
            strides,
            cardinality,
            shape,
        });
        self.producers.push(Some(self.steps.len() - 1));
        Ok(target)
    }

    fn output(&mut self, source: SlotId, out_edge: usize) {
        let step = match &self.slots[source].shape {
            SlotShape::Dense => {
                self.stats.dense_output += 1;
                Step::DenseOutput { source, out_edge }
            }
            SlotShape::Sparse(indices) => {
                self.stats.sparse_output += 1;
                Step::SparseOutput {
                    source,
                    out_edge,
                    values: indices.iter().copied().collect(),
                }
            }
        };
        self.steps.push(step);

        let mut path: SmallVec<[usize; 16]> = SmallVec::new();
        path.push(self.steps.len() - 1);
        let mut slot = source;
        while let Some(producer) = self.producers[slot] {
            path.push(producer);
            slot = self.steps[producer].source();
        }
        path.reverse();
        self.edge_paths[out_edge] = path.into_vec();
    }
}

/// Joint index of `tuple` with dimension `removed` dropped, under the target strides.
#[inline]
fn project_joint(tuple: &[usize], removed: usize, strides: &[usize]) -> usize {
    tuple
        .iter()
        .enumerate()
        .filter(|&(d, _)| d != removed)
        .map(|(_, &v)| v)
        .zip(strides)
        .map(|(v, &s)| v * s)
        .sum()
}
