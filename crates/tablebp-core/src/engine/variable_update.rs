//! # Variable Update Executor
//!
//! The variable side of message passing. A variable with `P` edges combines its
//! input (prior) with every incoming factor message and sends each edge the
//! combination of all the *other* edges.
//!
//! - Cost convention (min-sum): `out[q] = input + Σ_{p≠q} in[p]`, then the
//!   minimum is subtracted. Leave-one-out sums come from prefix and suffix
//!   sums, so an infinite cost on edge `q` never reaches `out[q]`.
//! - Probability convention (sum-product): `out[q] = input · Π_{p≠q} in[p]`,
//!   then divided by its sum. Leave-one-out products come from prefix and
//!   suffix products, so zero entries need no division.
//!
//! Damping blends each normalized output with the previous one, the same way
//! the factor executor does. Buffers use the same layout as
//! [`FactorUpdateExecutor`](crate::engine::factor_update::FactorUpdateExecutor)
//! so one side's outgoing message is the other side's incoming message.

use std::sync::Arc;

use crate::engine::errors::EngineError;
use crate::engine::messages::{DampingState, EdgeMessages, MessageSemantics};
use crate::engine::numeric_kernels::{
    costs_from_probabilities, normalize_probabilities, probabilities_from_costs,
};

/// Update state for one variable node.
#[derive(Debug)]
pub struct VariableUpdateExecutor {
    label: Arc<str>,
    semantics: MessageSemantics,
    input: Vec<f64>,
    messages: EdgeMessages,
    damping: DampingState,
}

impl VariableUpdateExecutor {
    /// Creates a variable over `domain_size` values with `degree` edges and a
    /// neutral input (uniform probabilities or zero costs).
    pub fn new(
        label: impl Into<Arc<str>>,
        domain_size: usize,
        degree: usize,
        semantics: MessageSemantics,
    ) -> Result<Self, EngineError> {
        let label = label.into();
        if domain_size == 0 {
            return Err(EngineError::ValidationError(format!(
                "variable '{}' must have a non-empty domain",
                label
            )));
        }
        Ok(Self {
            label,
            semantics,
            input: semantics.initial_message(domain_size),
            messages: EdgeMessages::new(&vec![domain_size; degree], semantics),
            damping: DampingState::new(degree),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn semantics(&self) -> MessageSemantics {
        self.semantics
    }

    pub fn domain_size(&self) -> usize {
        self.input.len()
    }

    pub fn degree(&self) -> usize {
        self.messages.degree()
    }

    pub fn messages(&self) -> &EdgeMessages {
        &self.messages
    }

    pub fn input(&self) -> &[f64] {
        &self.input
    }

    /// Sets the input in this executor's own convention.
    pub fn set_input(&mut self, values: &[f64]) -> Result<(), EngineError> {
        self.check_input_len(values.len())?;
        self.input.copy_from_slice(values);
        Ok(())
    }

    /// Sets the input from probabilities, converting to costs (`-ln p`) when needed.
    pub fn set_input_probabilities(&mut self, probabilities: &[f64]) -> Result<(), EngineError> {
        self.check_input_len(probabilities.len())?;
        match self.semantics {
            MessageSemantics::Probability => self.input.copy_from_slice(probabilities),
            MessageSemantics::Cost => self.input = costs_from_probabilities(probabilities),
        }
        Ok(())
    }

    pub fn set_incoming(&mut self, edge: usize, values: &[f64]) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        self.messages
            .set_incoming(edge, values)
            .map_err(|expected| self.shape_mismatch(edge, expected, values.len()))
    }

    pub fn set_outgoing(&mut self, edge: usize, values: &[f64]) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        self.messages
            .set_outgoing(edge, values)
            .map_err(|expected| self.shape_mismatch(edge, expected, values.len()))
    }

    pub fn incoming(&self, edge: usize) -> Result<&[f64], EngineError> {
        self.check_edge(edge)?;
        Ok(self.messages.incoming(edge))
    }

    pub fn outgoing(&self, edge: usize) -> Result<&[f64], EngineError> {
        self.check_edge(edge)?;
        Ok(self.messages.outgoing(edge))
    }

    pub fn set_damping(&mut self, edge: usize, coefficient: f64) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        if !(0.0..=1.0).contains(&coefficient) {
            return Err(EngineError::ValidationError(format!(
                "damping for edge {} of '{}' must be in [0, 1], got {}",
                edge, self.label, coefficient
            )));
        }
        self.damping.set(edge, coefficient, self.domain_size());
        Ok(())
    }

    pub fn damping(&self, edge: usize) -> Result<f64, EngineError> {
        self.check_edge(edge)?;
        Ok(self.damping.coefficient(edge))
    }

    pub fn reset_messages(&mut self) {
        self.messages.reset(self.semantics);
    }

    /// Computes an outgoing message on every edge, stopping at the first degenerate one.
    pub fn update(&mut self) -> Result<(), EngineError> {
        match self.semantics {
            MessageSemantics::Cost => self.update_costs(),
            MessageSemantics::Probability => self.update_probabilities(),
        }
    }

    fn update_costs(&mut self) -> Result<(), EngineError> {
        let (incoming, mut port) = self.messages.split(&mut self.damping);
        let degree = incoming.len();
        let n = self.input.len();

        // suffix[p] = Σ_{r >= p} in[r]
        let mut suffix = vec![vec![0.0; n]; degree + 1];
        for p in (0..degree).rev() {
            let (head, tail) = suffix.split_at_mut(p + 1);
            for ((s, &next), &m) in head[p].iter_mut().zip(&tail[0]).zip(&incoming[p]) {
                *s = next + m;
            }
        }

        let mut prefix = self.input.clone();
        let mut staged = vec![0.0; n];
        for edge in 0..degree {
            for ((s, &before), &after) in staged.iter_mut().zip(&prefix).zip(&suffix[edge + 1]) {
                *s = before + after;
            }
            if !port.emit_cost_staged(edge, &staged) {
                return Err(EngineError::degenerate_message(&self.label, edge));
            }
            for (before, &m) in prefix.iter_mut().zip(&incoming[edge]) {
                *before += m;
            }
        }
        Ok(())
    }

    fn update_probabilities(&mut self) -> Result<(), EngineError> {
        let (incoming, mut port) = self.messages.split(&mut self.damping);
        let degree = incoming.len();
        let n = self.input.len();

        // suffix[p] = Π_{r >= p} in[r]
        let mut suffix = vec![vec![1.0; n]; degree + 1];
        for p in (0..degree).rev() {
            let (head, tail) = suffix.split_at_mut(p + 1);
            for ((s, &next), &m) in head[p].iter_mut().zip(&tail[0]).zip(&incoming[p]) {
                *s = next * m;
            }
        }

        let mut prefix = self.input.clone();
        let mut staged = vec![0.0; n];
        for edge in 0..degree {
            for ((s, &before), &after) in staged.iter_mut().zip(&prefix).zip(&suffix[edge + 1]) {
                *s = before * after;
            }
            if !port.emit_probability_staged(edge, &staged) {
                return Err(EngineError::degenerate_message(&self.label, edge));
            }
            for (before, &m) in prefix.iter_mut().zip(&incoming[edge]) {
                *before *= m;
            }
        }
        Ok(())
    }

    /// Computes the outgoing message of one edge from the other edges directly.
    pub fn update_edge(&mut self, edge: usize) -> Result<(), EngineError> {
        self.check_edge(edge)?;
        let (incoming, mut port) = self.messages.split(&mut self.damping);
        let mut staged = self.input.clone();
        let others = incoming
            .iter()
            .enumerate()
            .filter(|&(p, _)| p != edge)
            .map(|(_, message)| message);

        let written = match self.semantics {
            MessageSemantics::Cost => {
                for message in others {
                    for (s, &m) in staged.iter_mut().zip(message) {
                        *s += m;
                    }
                }
                port.emit_cost_staged(edge, &staged)
            }
            MessageSemantics::Probability => {
                for message in others {
                    for (s, &m) in staged.iter_mut().zip(message) {
                        *s *= m;
                    }
                }
                port.emit_probability_staged(edge, &staged)
            }
        };
        if !written {
            return Err(EngineError::degenerate_message(&self.label, edge));
        }
        Ok(())
    }

    /// Normalized marginal probabilities, in both conventions.
    pub fn belief(&self) -> Result<Vec<f64>, EngineError> {
        let incoming = self.messages.incoming_all();
        match self.semantics {
            MessageSemantics::Cost => {
                let mut total = self.input.clone();
                for message in incoming {
                    for (t, &m) in total.iter_mut().zip(message) {
                        *t += m;
                    }
                }
                if total.iter().all(|c| !c.is_finite()) {
                    return Err(self.degenerate_belief());
                }
                Ok(probabilities_from_costs(&total))
            }
            MessageSemantics::Probability => {
                let mut total = self.input.clone();
                for message in incoming {
                    for (t, &m) in total.iter_mut().zip(message) {
                        *t *= m;
                    }
                }
                if !normalize_probabilities(&mut total) {
                    return Err(self.degenerate_belief());
                }
                Ok(total)
            }
        }
    }

    fn check_input_len(&self, actual: usize) -> Result<(), EngineError> {
        if actual != self.input.len() {
            return Err(EngineError::ValidationError(format!(
                "input for '{}' expects {} values, got {}",
                self.label,
                self.input.len(),
                actual
            )));
        }
        Ok(())
    }

    fn check_edge(&self, edge: usize) -> Result<(), EngineError> {
        if edge >= self.degree() {
            return Err(EngineError::EdgeOutOfRange {
                factor: Arc::clone(&self.label),
                edge,
                degree: self.degree(),
            });
        }
        Ok(())
    }

    fn shape_mismatch(&self, edge: usize, expected: usize, actual: usize) -> EngineError {
        EngineError::ShapeMismatch {
            factor: Arc::clone(&self.label),
            edge,
            expected,
            actual,
        }
    }

    fn degenerate_belief(&self) -> EngineError {
        EngineError::DegenerateBelief {
            factor: Arc::clone(&self.label),
        }
    }
}
