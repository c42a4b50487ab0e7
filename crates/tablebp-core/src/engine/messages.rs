//! Per-edge message buffers and damping state.
//!
//! A node owns one incoming and one outgoing buffer per edge, each sized to that
//! edge's domain. Outputs are committed through [`OutputPort`], which enforces
//! the failure contract: when normalization fails the edge keeps its prior value.

use crate::engine::numeric_kernels::{damp_in_place, message_min, scale_by_sum};

/// Numeric meaning of the values in a message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageSemantics {
    /// Non-negative weights, normalized to sum 1 (sum-product).
    Probability,
    /// Additive costs (negative log weights), normalized to minimum 0 (min-sum).
    Cost,
}

impl MessageSemantics {
    /// Initial message for a domain: uniform probabilities or zero costs.
    pub fn initial_message(self, domain_size: usize) -> Vec<f64> {
        match self {
            MessageSemantics::Probability => vec![1.0 / domain_size as f64; domain_size],
            MessageSemantics::Cost => vec![0.0; domain_size],
        }
    }
}

/// Per-edge damping coefficients with lazily allocated snapshot buffers.
#[derive(Debug, Clone, Default)]
pub struct DampingState {
    coefficients: Vec<f64>,
    saved: Vec<Option<Vec<f64>>>,
}

impl DampingState {
    pub fn new(degree: usize) -> Self {
        Self {
            coefficients: vec![0.0; degree],
            saved: vec![None; degree],
        }
    }

    pub fn coefficient(&self, edge: usize) -> f64 {
        self.coefficients.get(edge).copied().unwrap_or(0.0)
    }

    /// Sets an edge's coefficient. A snapshot buffer is allocated the first time
    /// the edge gets a non-zero coefficient.
    pub fn set(&mut self, edge: usize, coefficient: f64, domain_size: usize) {
        if edge >= self.coefficients.len() {
            self.coefficients.resize(edge + 1, 0.0);
            self.saved.resize(edge + 1, None);
        }
        self.coefficients[edge] = coefficient;
        if coefficient != 0.0 && self.saved[edge].is_none() {
            self.saved[edge] = Some(vec![0.0; domain_size]);
        }
    }

    /// True when any edge has a non-zero coefficient.
    pub fn in_use(&self) -> bool {
        self.coefficients.iter().any(|&c| c != 0.0)
    }

    /// Number of edges holding a snapshot buffer.
    pub fn allocated_snapshots(&self) -> usize {
        self.saved.iter().filter(|s| s.is_some()).count()
    }
}

/// Incoming and outgoing buffers for every edge of one node.
#[derive(Debug, Clone)]
pub struct EdgeMessages {
    incoming: Vec<Vec<f64>>,
    outgoing: Vec<Vec<f64>>,
}

impl EdgeMessages {
    /// Buffers initialized to the semantics' initial message.
    pub fn new(domain_sizes: &[usize], semantics: MessageSemantics) -> Self {
        let fresh = |&n: &usize| semantics.initial_message(n);
        Self {
            incoming: domain_sizes.iter().map(fresh).collect(),
            outgoing: domain_sizes.iter().map(fresh).collect(),
        }
    }

    pub fn degree(&self) -> usize {
        self.incoming.len()
    }

    pub fn domain_size(&self, edge: usize) -> usize {
        self.incoming[edge].len()
    }

    pub fn incoming(&self, edge: usize) -> &[f64] {
        &self.incoming[edge]
    }

    pub fn outgoing(&self, edge: usize) -> &[f64] {
        &self.outgoing[edge]
    }

    pub fn incoming_all(&self) -> &[Vec<f64>] {
        &self.incoming
    }

    /// Copies `values` into an incoming buffer. Returns the expected length on mismatch.
    pub fn set_incoming(&mut self, edge: usize, values: &[f64]) -> Result<(), usize> {
        let buffer = &mut self.incoming[edge];
        if buffer.len() != values.len() {
            return Err(buffer.len());
        }
        buffer.copy_from_slice(values);
        Ok(())
    }

    /// Copies `values` into an outgoing buffer. Returns the expected length on mismatch.
    pub fn set_outgoing(&mut self, edge: usize, values: &[f64]) -> Result<(), usize> {
        let buffer = &mut self.outgoing[edge];
        if buffer.len() != values.len() {
            return Err(buffer.len());
        }
        buffer.copy_from_slice(values);
        Ok(())
    }

    /// Resets every buffer to the semantics' initial message.
    pub fn reset(&mut self, semantics: MessageSemantics) {
        for buffer in self.incoming.iter_mut().chain(self.outgoing.iter_mut()) {
            let n = buffer.len();
            buffer.copy_from_slice(&semantics.initial_message(n));
        }
    }

    /// Splits into read-only incoming buffers and a writable output port.
    pub(crate) fn split<'a>(
        &'a mut self,
        damping: &'a mut DampingState,
    ) -> (&'a [Vec<f64>], OutputPort<'a>) {
        (
            &self.incoming,
            OutputPort {
                outgoing: &mut self.outgoing,
                damping,
            },
        )
    }
}

/// Write access to outgoing buffers, with damping applied on commit.
pub(crate) struct OutputPort<'a> {
    outgoing: &'a mut [Vec<f64>],
    damping: &'a mut DampingState,
}

impl OutputPort<'_> {
    /// Commits a probability message whose unnormalized values sum to `sum`.
    ///
    /// `fill` writes the unnormalized values into the buffer. Returns false
    /// without touching the buffer when `sum` is zero.
    pub(crate) fn emit_probability(
        &mut self,
        edge: usize,
        sum: f64,
        fill: impl FnOnce(&mut [f64]),
    ) -> bool {
        if sum == 0.0 {
            return false;
        }
        let out = &mut self.outgoing[edge];
        let damping = self.damping.coefficient(edge);
        if damping != 0.0 {
            let saved = self.damping.saved[edge].get_or_insert_with(|| vec![0.0; out.len()]);
            saved.copy_from_slice(out);
        }
        fill(out);
        scale_by_sum(out, sum);
        if damping != 0.0 {
            if let Some(saved) = &self.damping.saved[edge] {
                damp_in_place(out, saved, damping);
            }
        }
        true
    }

    /// Commits staged unnormalized probabilities.
    pub(crate) fn emit_probability_staged(&mut self, edge: usize, staged: &[f64]) -> bool {
        let sum = staged.iter().sum();
        self.emit_probability(edge, sum, |out| out.copy_from_slice(staged))
    }

    /// Commits staged raw costs, subtracting their minimum. Returns false without
    /// touching the buffer when the minimum is not finite.
    pub(crate) fn emit_cost_staged(&mut self, edge: usize, staged: &[f64]) -> bool {
        let min = message_min(staged);
        if !min.is_finite() {
            return false;
        }
        let out = &mut self.outgoing[edge];
        let damping = self.damping.coefficient(edge);
        if damping != 0.0 {
            let saved = self.damping.saved[edge].get_or_insert_with(|| vec![0.0; out.len()]);
            saved.copy_from_slice(out);
        }
        for (o, &s) in out.iter_mut().zip(staged) {
            *o = s - min;
        }
        if damping != 0.0 {
            if let Some(saved) = &self.damping.saved[edge] {
                damp_in_place(out, saved, damping);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_messages_follow_semantics() {
        let probs = EdgeMessages::new(&[2, 4], MessageSemantics::Probability);
        assert_eq!(probs.incoming(0), &[0.5, 0.5]);
        assert_eq!(probs.outgoing(1), &[0.25; 4]);

        let costs = EdgeMessages::new(&[3], MessageSemantics::Cost);
        assert_eq!(costs.incoming(0), &[0.0; 3]);
    }

    #[test]
    fn set_incoming_checks_length() {
        let mut messages = EdgeMessages::new(&[2, 3], MessageSemantics::Probability);
        assert_eq!(messages.set_incoming(1, &[1.0, 2.0]), Err(3));
        assert!(messages.set_incoming(1, &[1.0, 2.0, 3.0]).is_ok());
        assert_eq!(messages.incoming(1), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn damping_snapshots_are_lazy() {
        let mut damping = DampingState::new(3);
        assert!(!damping.in_use());
        damping.set(1, 0.0, 4);
        assert_eq!(damping.allocated_snapshots(), 0);
        damping.set(2, 0.3, 4);
        assert!(damping.in_use());
        assert_eq!(damping.allocated_snapshots(), 1);
        assert_eq!(damping.coefficient(2), 0.3);
    }

    #[test]
    fn failed_emit_keeps_prior_value() {
        let mut messages = EdgeMessages::new(&[2], MessageSemantics::Probability);
        let mut damping = DampingState::new(1);
        let (_, mut port) = messages.split(&mut damping);
        assert!(!port.emit_probability_staged(0, &[0.0, 0.0]));
        assert_eq!(messages.outgoing(0), &[0.5, 0.5]);
    }

    #[test]
    fn damped_emit_blends_with_previous_output() {
        let mut messages = EdgeMessages::new(&[2], MessageSemantics::Probability);
        let mut damping = DampingState::new(1);
        damping.set(0, 0.5, 2);
        let (_, mut port) = messages.split(&mut damping);
        assert!(port.emit_probability_staged(0, &[3.0, 1.0]));
        let out = messages.outgoing(0);
        assert!((out[0] - 0.625).abs() < 1e-12);
        assert!((out[1] - 0.375).abs() < 1e-12);
    }

    #[test]
    fn cost_emit_subtracts_minimum() {
        let mut messages = EdgeMessages::new(&[3], MessageSemantics::Cost);
        let mut damping = DampingState::new(1);
        let (_, mut port) = messages.split(&mut damping);
        assert!(port.emit_cost_staged(0, &[4.0, 2.0, 5.0]));
        assert_eq!(messages.outgoing(0), &[2.0, 0.0, 3.0]);
    }
}
