//! # Weight Tables
//!
//! Immutable-shape joint weight tables over `D >= 1` discrete dimensions.
//!
//! A table stores either a dense array indexed by joint index or a sparse list of
//! `(index tuple, weight)` entries. Joint indices are row-major: the last
//! dimension has stride 1.
//!
//! Every table receives a process-unique [`TableId`] at construction. Compiled
//! update plans are keyed on that identity, so factors that share one
//! `Arc<WeightTable>` share one plan.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::EngineError;

/// Inline storage for per-dimension values. Factor degree is usually small.
pub type Dims = SmallVec<[usize; 8]>;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a weight table.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TableId(pub u64);

impl TableId {
    fn next() -> Self {
        TableId(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Storage strategy of a weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Representation {
    Dense,
    Sparse,
}

#[derive(Debug)]
enum TableStorage {
    Dense {
        weights: Vec<f64>,
        /// Flat index tuples, materialized on first use by the fallback engines.
        indices: OnceLock<Vec<usize>>,
    },
    Sparse {
        /// Flat index tuples, `dimensions` values per entry.
        indices: Vec<usize>,
        weights: Vec<f64>,
        joint_to_entry: FxHashMap<usize, usize>,
    },
}

/// A joint weight table for one factor.
#[derive(Debug)]
pub struct WeightTable {
    id: TableId,
    domain_sizes: Dims,
    strides: Dims,
    cardinality: usize,
    storage: TableStorage,
}

impl WeightTable {
    /// Creates a dense table from weights in row-major joint order.
    pub fn dense(domain_sizes: &[usize], weights: Vec<f64>) -> Result<Self, EngineError> {
        let (strides, cardinality) = layout(domain_sizes)?;
        if weights.len() != cardinality {
            return Err(EngineError::InvalidTable(format!(
                "dense table expects {} weights, got {}",
                cardinality,
                weights.len()
            )));
        }
        check_weights(&weights)?;
        Ok(Self {
            id: TableId::next(),
            domain_sizes: domain_sizes.iter().copied().collect(),
            strides,
            cardinality,
            storage: TableStorage::Dense {
                weights,
                indices: OnceLock::new(),
            },
        })
    }

    /// Creates a sparse table from `(index tuple, weight)` entries.
    ///
    /// Entries keep the given order; that order defines entry numbering for
    /// [`weights`](Self::weights) and joint beliefs.
    pub fn sparse<I, T>(domain_sizes: &[usize], entries: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (T, f64)>,
        T: AsRef<[usize]>,
    {
        let (strides, cardinality) = layout(domain_sizes)?;
        let dimensions = domain_sizes.len();
        let mut indices = Vec::new();
        let mut weights = Vec::new();
        let mut joint_to_entry = FxHashMap::default();

        for (entry, (tuple, weight)) in entries.into_iter().enumerate() {
            let tuple = tuple.as_ref();
            if tuple.len() != dimensions {
                return Err(EngineError::InvalidTable(format!(
                    "sparse entry {} has {} indices, table has {} dimensions",
                    entry,
                    tuple.len(),
                    dimensions
                )));
            }
            let mut joint = 0usize;
            for (d, (&value, &size)) in tuple.iter().zip(domain_sizes.iter()).enumerate() {
                if value >= size {
                    return Err(EngineError::InvalidTable(format!(
                        "sparse entry {} index {} out of range for dimension {} of size {}",
                        entry, value, d, size
                    )));
                }
                joint += value * strides[d];
            }
            if joint_to_entry.insert(joint, entry).is_some() {
                return Err(EngineError::InvalidTable(format!(
                    "sparse entry {} duplicates index tuple {:?}",
                    entry, tuple
                )));
            }
            indices.extend_from_slice(tuple);
            weights.push(weight);
        }
        check_weights(&weights)?;

        Ok(Self {
            id: TableId::next(),
            domain_sizes: domain_sizes.iter().copied().collect(),
            strides,
            cardinality,
            storage: TableStorage::Sparse {
                indices,
                weights,
                joint_to_entry,
            },
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    /// Number of dimensions (factor degree).
    pub fn dimensions(&self) -> usize {
        self.domain_sizes.len()
    }

    pub fn domain_size(&self, dimension: usize) -> usize {
        self.domain_sizes[dimension]
    }

    pub fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    /// Row-major stride of a dimension.
    pub fn stride(&self, dimension: usize) -> usize {
        self.strides[dimension]
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Product of all domain sizes.
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn representation(&self) -> Representation {
        match self.storage {
            TableStorage::Dense { .. } => Representation::Dense,
            TableStorage::Sparse { .. } => Representation::Sparse,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, TableStorage::Sparse { .. })
    }

    /// Number of stored entries: the cardinality when dense.
    pub fn len(&self) -> usize {
        self.weights().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored weights in entry order (joint order when dense).
    pub fn weights(&self) -> &[f64] {
        match &self.storage {
            TableStorage::Dense { weights, .. } => weights,
            TableStorage::Sparse { weights, .. } => weights,
        }
    }

    /// Weight at a joint index; zero for joint indices absent from a sparse table.
    pub fn dense_weight(&self, joint: usize) -> f64 {
        match &self.storage {
            TableStorage::Dense { weights, .. } => weights.get(joint).copied().unwrap_or(0.0),
            TableStorage::Sparse {
                weights,
                joint_to_entry,
                ..
            } => joint_to_entry
                .get(&joint)
                .map(|&entry| weights[entry])
                .unwrap_or(0.0),
        }
    }

    /// Index tuple of a stored entry.
    pub fn entry_indices(&self, entry: usize) -> &[usize] {
        let d = self.dimensions();
        &self.flat_indices()[entry * d..(entry + 1) * d]
    }

    /// Flat index tuples for every stored entry, `dimensions()` values per entry.
    pub fn flat_indices(&self) -> &[usize] {
        match &self.storage {
            TableStorage::Sparse { indices, .. } => indices,
            TableStorage::Dense { indices, .. } => indices.get_or_init(|| {
                let mut flat = Vec::with_capacity(self.cardinality * self.dimensions());
                let mut counter: Dims = SmallVec::from_elem(0, self.dimensions());
                for _ in 0..self.cardinality {
                    flat.extend_from_slice(&counter);
                    advance_odometer(&mut counter, &self.domain_sizes);
                }
                flat
            }),
        }
    }

    /// Iterates `(index tuple, weight)` over stored entries.
    pub fn sparse_entries(&self) -> impl Iterator<Item = (&[usize], f64)> + '_ {
        let d = self.dimensions();
        self.flat_indices()
            .chunks_exact(d)
            .zip(self.weights().iter().copied())
    }

    /// Visits every stored entry in entry order without materializing index
    /// tuples for dense tables.
    pub fn for_each_entry(&self, mut visit: impl FnMut(&[usize], f64)) {
        match &self.storage {
            TableStorage::Dense { weights, .. } => {
                let mut counter: Dims = SmallVec::from_elem(0, self.dimensions());
                for &weight in weights {
                    visit(&counter, weight);
                    advance_odometer(&mut counter, &self.domain_sizes);
                }
            }
            TableStorage::Sparse { .. } => {
                for (tuple, weight) in self.sparse_entries() {
                    visit(tuple, weight);
                }
            }
        }
    }

    /// Joint index of an index tuple, or `None` if any index is out of range.
    pub fn joint_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.dimensions() {
            return None;
        }
        let mut joint = 0;
        for ((&value, &size), &stride) in indices
            .iter()
            .zip(self.domain_sizes.iter())
            .zip(self.strides.iter())
        {
            if value >= size {
                return None;
            }
            joint += value * stride;
        }
        Some(joint)
    }

    /// Index tuple of a joint index.
    pub fn indices_of(&self, joint: usize) -> Dims {
        self.strides
            .iter()
            .zip(self.domain_sizes.iter())
            .map(|(&stride, &size)| (joint / stride) % size)
            .collect()
    }

    pub fn count_non_zero(&self) -> usize {
        self.weights().iter().filter(|&&w| w != 0.0).count()
    }

    /// Dense copy of this table, with a new identity.
    pub fn to_dense(&self) -> WeightTable {
        let weights = match &self.storage {
            TableStorage::Dense { weights, .. } => weights.clone(),
            TableStorage::Sparse {
                indices, weights, ..
            } => {
                let mut dense = vec![0.0; self.cardinality];
                for (tuple, &weight) in indices.chunks_exact(self.dimensions()).zip(weights) {
                    dense[joint_of(tuple, &self.strides)] = weight;
                }
                dense
            }
        };
        WeightTable {
            id: TableId::next(),
            domain_sizes: self.domain_sizes.clone(),
            strides: self.strides.clone(),
            cardinality: self.cardinality,
            storage: TableStorage::Dense {
                weights,
                indices: OnceLock::new(),
            },
        }
    }

    /// Sparse copy holding only the non-zero entries in joint order, with a new identity.
    pub fn to_sparse(&self) -> WeightTable {
        let mut entries: Vec<(usize, Dims, f64)> = self
            .sparse_entries()
            .filter(|(_, weight)| *weight != 0.0)
            .map(|(tuple, weight)| {
                (
                    joint_of(tuple, &self.strides),
                    tuple.iter().copied().collect(),
                    weight,
                )
            })
            .collect();
        entries.sort_unstable_by_key(|(joint, _, _)| *joint);

        let mut indices = Vec::with_capacity(entries.len() * self.dimensions());
        let mut weights = Vec::with_capacity(entries.len());
        let mut joint_to_entry = FxHashMap::default();
        for (entry, (joint, tuple, weight)) in entries.into_iter().enumerate() {
            indices.extend_from_slice(&tuple);
            weights.push(weight);
            joint_to_entry.insert(joint, entry);
        }
        WeightTable {
            id: TableId::next(),
            domain_sizes: self.domain_sizes.clone(),
            strides: self.strides.clone(),
            cardinality: self.cardinality,
            storage: TableStorage::Sparse {
                indices,
                weights,
                joint_to_entry,
            },
        }
    }
}

/// Computes row-major strides and the cardinality of a shape.
pub(crate) fn layout(domain_sizes: &[usize]) -> Result<(Dims, usize), EngineError> {
    if domain_sizes.is_empty() {
        return Err(EngineError::InvalidTable(
            "table must have at least one dimension".into(),
        ));
    }
    let mut strides: Dims = SmallVec::from_elem(0, domain_sizes.len());
    let mut cardinality = 1usize;
    for (d, &size) in domain_sizes.iter().enumerate().rev() {
        if size == 0 {
            return Err(EngineError::InvalidTable(format!(
                "dimension {} has an empty domain",
                d
            )));
        }
        strides[d] = cardinality;
        cardinality = cardinality.checked_mul(size).ok_or_else(|| {
            EngineError::InvalidTable(format!(
                "joint cardinality of {:?} overflows usize",
                domain_sizes
            ))
        })?;
    }
    Ok((strides, cardinality))
}

#[inline]
pub(crate) fn joint_of(indices: &[usize], strides: &[usize]) -> usize {
    indices.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

/// Advances a row-major index counter by one joint position.
#[inline]
pub(crate) fn advance_odometer(counter: &mut [usize], domain_sizes: &[usize]) {
    for d in (0..counter.len()).rev() {
        counter[d] += 1;
        if counter[d] < domain_sizes[d] {
            return;
        }
        counter[d] = 0;
    }
}

fn check_weights(weights: &[f64]) -> Result<(), EngineError> {
    if let Some((entry, weight)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(EngineError::InvalidTable(format!(
            "weight {} at entry {} must be finite and >= 0",
            weight, entry
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_layout_is_row_major() {
        let table = WeightTable::dense(&[2, 3, 4], vec![1.0; 24]).expect("table");
        assert_eq!(table.dimensions(), 3);
        assert_eq!(table.strides(), &[12, 4, 1]);
        assert_eq!(table.cardinality(), 24);
        assert_eq!(table.joint_index(&[1, 2, 3]), Some(23));
        assert_eq!(table.indices_of(23).as_slice(), &[1, 2, 3]);
        assert_eq!(table.joint_index(&[2, 0, 0]), None);
    }

    #[test]
    fn dense_rejects_wrong_length_and_negative_weights() {
        assert!(WeightTable::dense(&[2, 2], vec![1.0; 3]).is_err());
        assert!(WeightTable::dense(&[2, 2], vec![1.0, -1.0, 0.0, 0.0]).is_err());
        assert!(WeightTable::dense(&[2, 2], vec![1.0, f64::NAN, 0.0, 0.0]).is_err());
        assert!(WeightTable::dense(&[], vec![]).is_err());
        assert!(WeightTable::dense(&[2, 0], vec![]).is_err());
    }

    #[test]
    fn sparse_rejects_bad_entries() {
        let out_of_range = WeightTable::sparse(&[2, 2], vec![(vec![0, 2], 1.0)]);
        assert!(matches!(out_of_range, Err(EngineError::InvalidTable(_))));

        let duplicate = WeightTable::sparse(&[2, 2], vec![(vec![0, 1], 1.0), (vec![0, 1], 2.0)]);
        assert!(matches!(duplicate, Err(EngineError::InvalidTable(_))));

        let wrong_arity = WeightTable::sparse(&[2, 2], vec![(vec![0], 1.0)]);
        assert!(wrong_arity.is_err());
    }

    #[test]
    fn sparse_lookup_and_conversion_roundtrip() {
        let sparse = WeightTable::sparse(
            &[2, 3],
            vec![(vec![1, 2], 5.0), (vec![0, 1], 2.0), (vec![1, 0], 0.0)],
        )
        .expect("sparse");
        assert!(sparse.is_sparse());
        assert_eq!(sparse.len(), 3);
        assert_eq!(sparse.count_non_zero(), 2);
        assert_eq!(sparse.dense_weight(5), 5.0);
        assert_eq!(sparse.dense_weight(1), 2.0);
        assert_eq!(sparse.dense_weight(0), 0.0);
        assert_eq!(sparse.entry_indices(1), &[0, 1]);

        let dense = sparse.to_dense();
        assert_eq!(dense.representation(), Representation::Dense);
        assert_eq!(dense.weights(), &[0.0, 2.0, 0.0, 0.0, 0.0, 5.0]);
        assert_ne!(dense.id(), sparse.id());

        let back = dense.to_sparse();
        assert_eq!(back.len(), 2);
        assert_eq!(back.entry_indices(0), &[0, 1]);
        assert_eq!(back.entry_indices(1), &[1, 2]);
    }

    #[test]
    fn dense_flat_indices_follow_joint_order() {
        let table = WeightTable::dense(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).expect("table");
        let entries: Vec<(Vec<usize>, f64)> = table
            .sparse_entries()
            .map(|(t, w)| (t.to_vec(), w))
            .collect();
        assert_eq!(
            entries,
            vec![
                (vec![0, 0], 1.0),
                (vec![0, 1], 2.0),
                (vec![1, 0], 3.0),
                (vec![1, 1], 4.0)
            ]
        );
    }

    #[test]
    fn for_each_entry_matches_sparse_entries() {
        let table = WeightTable::dense(&[2, 3], (0..6).map(|x| x as f64).collect()).expect("table");
        let mut visited = Vec::new();
        table.for_each_entry(|tuple, weight| visited.push((tuple.to_vec(), weight)));
        let expected: Vec<(Vec<usize>, f64)> = table
            .sparse_entries()
            .map(|(t, w)| (t.to_vec(), w))
            .collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn tables_get_distinct_identities() {
        let a = WeightTable::dense(&[2], vec![1.0, 1.0]).expect("a");
        let b = WeightTable::dense(&[2], vec![1.0, 1.0]).expect("b");
        assert_ne!(a.id(), b.id());
    }
}
