//! Partial derivatives of outgoing messages with respect to table weights.
//!
//! An outgoing probability message is `out[v] = f(v) / g` with
//! `f(v) = Σ_{e: idx_edge = v} w_e Π_{j≠edge} in[j][idx_j]` and `g = Σ_v f(v)`.
//! For a tracked weight `w_n`:
//!
//! ```text
//! d out[v] / d w_n = (f'(v) g - f(v) g') / g²
//! f'(v) = Σ_e [tracks table and e = n] Π_{j≠edge} in[j][idx_j]
//!       + Σ_e Σ_{j≠edge} w_e Π_{k∉{edge,j}} in[k][idx_k] · d in[j][idx_j] / d w_n
//! ```
//!
//! Leave-one-out products come from prefix and suffix products, so zero-valued
//! incoming entries need no special case. The derivative is 0 when `g = 0`.
//! Damping is not differentiated through.

use crate::engine::errors::EngineError;
use crate::engine::weight_table::WeightTable;

/// Derivative buffers shaped `[weight][edge][value]`.
#[derive(Debug, Clone)]
pub struct DerivativeTracker {
    factor_uses_table: bool,
    incoming: Vec<Vec<Vec<f64>>>,
    outgoing: Vec<Vec<Vec<f64>>>,
}

impl DerivativeTracker {
    /// Tracks `weight_count` weights. When `factor_uses_table` is true, weight
    /// `n` is this factor's own table entry `n`; otherwise the weights belong
    /// to another table and reach this factor only through incoming derivatives.
    pub fn new(domain_sizes: &[usize], weight_count: usize, factor_uses_table: bool) -> Self {
        let zeros: Vec<Vec<f64>> = domain_sizes.iter().map(|&n| vec![0.0; n]).collect();
        Self {
            factor_uses_table,
            incoming: vec![zeros.clone(); weight_count],
            outgoing: vec![zeros; weight_count],
        }
    }

    pub fn weight_count(&self) -> usize {
        self.incoming.len()
    }

    pub fn factor_uses_table(&self) -> bool {
        self.factor_uses_table
    }

    /// Sets `d in[edge] / d w_weight`.
    pub(crate) fn set_incoming(
        &mut self,
        weight: usize,
        edge: usize,
        values: &[f64],
    ) -> Result<(), EngineError> {
        let buffer = self
            .incoming
            .get_mut(weight)
            .and_then(|edges| edges.get_mut(edge))
            .ok_or_else(|| out_of_range(weight, edge))?;
        if buffer.len() != values.len() {
            return Err(EngineError::ValidationError(format!(
                "derivative for weight {} on edge {} expects {} values, got {}",
                weight,
                edge,
                buffer.len(),
                values.len()
            )));
        }
        buffer.copy_from_slice(values);
        Ok(())
    }

    pub fn outgoing(&self, weight: usize, edge: usize) -> Option<&[f64]> {
        self.outgoing
            .get(weight)
            .and_then(|edges| edges.get(edge))
            .map(Vec::as_slice)
    }

    /// Recomputes `d out[edge] / d w` for every tracked weight.
    pub(crate) fn update_edge(&mut self, table: &WeightTable, incoming: &[Vec<f64>], edge: usize) {
        let degree = table.dimensions();
        let domain_size = table.domain_size(edge);
        let weight_count = self.weight_count();

        let mut f = vec![0.0; domain_size];
        let mut df = vec![vec![0.0; domain_size]; weight_count];
        let mut prefix = vec![1.0; degree + 1];
        let mut suffix = vec![1.0; degree + 1];

        for (entry, (tuple, weight)) in table.sparse_entries().enumerate() {
            for j in 0..degree {
                let factor = if j == edge { 1.0 } else { incoming[j][tuple[j]] };
                prefix[j + 1] = prefix[j] * factor;
            }
            for j in (0..degree).rev() {
                let factor = if j == edge { 1.0 } else { incoming[j][tuple[j]] };
                suffix[j] = suffix[j + 1] * factor;
            }
            let messages_only = prefix[degree];
            let v = tuple[edge];
            f[v] += weight * messages_only;

            for (n, df_n) in df.iter_mut().enumerate() {
                let mut term = 0.0;
                if self.factor_uses_table && n == entry {
                    term += messages_only;
                }
                for j in (0..degree).filter(|&j| j != edge) {
                    let d_in = self.incoming[n][j][tuple[j]];
                    if d_in != 0.0 {
                        term += weight * prefix[j] * suffix[j + 1] * d_in;
                    }
                }
                df_n[v] += term;
            }
        }

        let g: f64 = f.iter().sum();
        for (n, df_n) in df.iter().enumerate() {
            let out = &mut self.outgoing[n][edge];
            if g == 0.0 {
                out.fill(0.0);
                continue;
            }
            let dg: f64 = df_n.iter().sum();
            for ((o, &dfv), &fv) in out.iter_mut().zip(df_n).zip(&f) {
                *o = (dfv * g - fv * dg) / (g * g);
            }
        }
    }

    /// Zeroes every buffer.
    pub(crate) fn reset(&mut self) {
        for buffer in self
            .incoming
            .iter_mut()
            .chain(self.outgoing.iter_mut())
            .flatten()
        {
            buffer.fill(0.0);
        }
    }
}

fn out_of_range(weight: usize, edge: usize) -> EngineError {
    EngineError::ValidationError(format!(
        "no derivative buffer for weight {} on edge {}",
        weight, edge
    ))
}
