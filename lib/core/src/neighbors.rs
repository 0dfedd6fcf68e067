use crate::{Error, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;

/// k nearest neighbors of every point, stored column by column
///
/// Column `j` holds the `k` neighbors of point `j`: `indices(j)[r]` is the
/// 0-based identifier of its `r`-th nearest neighbor and `distances(j)[r]` the
/// distance to it. Columns are sorted by ascending distance (ties by index)
/// and never repeat an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNeighborGraph")]
pub struct NeighborGraph {
    k: usize,
    n: usize,
    indices: Vec<usize>,
    distances: Vec<f32>,
}

/// Unchecked wire form of [`NeighborGraph`]
#[derive(Deserialize)]
struct RawNeighborGraph {
    k: usize,
    n: usize,
    indices: Vec<usize>,
    distances: Vec<f32>,
}

impl TryFrom<RawNeighborGraph> for NeighborGraph {
    type Error = Error;

    fn try_from(raw: RawNeighborGraph) -> Result<Self> {
        let expected = raw.k.checked_mul(raw.n).ok_or_else(|| {
            Error::MalformedInput(format!("{} columns of {} neighbors overflow", raw.n, raw.k))
        })?;
        if raw.indices.len() != expected || raw.distances.len() != expected {
            return Err(Error::MalformedInput(format!(
                "expected {} entries, got {} indices and {} distances",
                expected,
                raw.indices.len(),
                raw.distances.len()
            )));
        }
        let graph = Self {
            k: raw.k,
            n: raw.n,
            indices: raw.indices,
            distances: raw.distances,
        };
        graph.validate(false)?;
        Ok(graph)
    }
}

impl NeighborGraph {
    /// Assemble a graph from per-point neighbor lists of length `k`
    ///
    /// Each list is sorted here; callers only guarantee distinct entries.
    pub fn from_columns(k: usize, columns: Vec<Vec<(usize, f32)>>) -> Result<Self> {
        let n = columns.len();
        let mut indices = Vec::with_capacity(n * k);
        let mut distances = Vec::with_capacity(n * k);
        for (j, mut column) in columns.into_iter().enumerate() {
            if column.len() != k {
                return Err(Error::MalformedInput(format!(
                    "column {} has {} neighbors, expected {}",
                    j,
                    column.len(),
                    k
                )));
            }
            column.sort_unstable_by_key(|&(idx, dist)| (OrderedFloat(dist), idx));
            for (idx, dist) in column {
                indices.push(idx);
                distances.push(dist);
            }
        }
        Ok(Self {
            k,
            n,
            indices,
            distances,
        })
    }

    /// Neighbors per point
    #[inline]
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of columns (query points)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    #[must_use]
    pub fn indices(&self, j: usize) -> &[usize] {
        &self.indices[j * self.k..(j + 1) * self.k]
    }

    #[inline]
    #[must_use]
    pub fn distances(&self, j: usize) -> &[f32] {
        &self.distances[j * self.k..(j + 1) * self.k]
    }

    #[inline]
    #[must_use]
    pub fn column(&self, j: usize) -> (&[usize], &[f32]) {
        (self.indices(j), self.distances(j))
    }

    /// Iterate over `(point, neighbor, distance)` in column order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.indices
            .iter()
            .zip(&self.distances)
            .enumerate()
            .map(move |(pos, (&idx, &dist))| (pos / self.k.max(1), idx, dist))
    }

    /// Check the column invariants
    ///
    /// With `self_query` set, column `j` must not contain `j` itself.
    pub fn validate(&self, self_query: bool) -> Result<()> {
        for j in 0..self.n {
            let (idx, dist) = self.column(j);
            if dist.windows(2).any(|w| !(w[0] <= w[1])) {
                return Err(Error::MalformedInput(format!(
                    "column {j} is not sorted by distance"
                )));
            }
            let mut seen = idx.to_vec();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != idx.len() {
                return Err(Error::MalformedInput(format!(
                    "column {j} repeats a neighbor"
                )));
            }
            if self_query && idx.contains(&j) {
                return Err(Error::MalformedInput(format!("column {j} lists itself")));
            }
        }
        Ok(())
    }

    /// Check that every neighbor identifier is below `bound`
    pub fn check_bounds(&self, bound: usize) -> Result<()> {
        match self.indices.iter().position(|&idx| idx >= bound) {
            Some(pos) => Err(Error::MalformedInput(format!(
                "column {} refers to point {}, but there are only {} points",
                pos / self.k.max(1),
                self.indices[pos],
                bound
            ))),
            None => Ok(()),
        }
    }
}

/// Select the `k` smallest candidates without fully sorting the rest
///
/// Bounded max-heap, O(m log k) for m candidates. The result is sorted by
/// ascending distance, ties broken by index.
pub(crate) fn select_nearest<I>(candidates: I, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = (usize, f32)>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(k + 1);
    for (idx, dist) in candidates {
        let key = (OrderedFloat(dist), idx);
        if heap.len() < k {
            heap.push(key);
        } else if let Some(worst) = heap.peek() {
            if key < *worst {
                heap.pop();
                heap.push(key);
            }
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|(dist, idx)| (idx, dist.into_inner()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_nearest() {
        let row = [5.0, 1.0, 3.0, 0.5, 2.0];
        let picked = select_nearest(row.iter().copied().enumerate(), 3);
        assert_eq!(picked, vec![(3, 0.5), (1, 1.0), (4, 2.0)]);
    }

    #[test]
    fn test_select_nearest_ties_by_index() {
        let row = [1.0, 1.0, 1.0, 0.0];
        let picked = select_nearest(row.iter().copied().enumerate(), 2);
        assert_eq!(picked, vec![(3, 0.0), (0, 1.0)]);
    }

    #[test]
    fn test_from_columns_sorts_and_validates() {
        let graph = NeighborGraph::from_columns(
            2,
            vec![vec![(2, 3.0), (1, 1.0)], vec![(0, 1.0), (2, 2.0)], vec![(1, 2.0), (0, 3.0)]],
        )
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.indices(0), &[1, 2]);
        assert_eq!(graph.distances(0), &[1.0, 3.0]);
        assert!(graph.validate(true).is_ok());

        let triples: Vec<_> = graph.iter().collect();
        assert_eq!(triples[2], (1, 0, 1.0));
    }

    #[test]
    fn test_from_columns_wrong_length() {
        let err = NeighborGraph::from_columns(2, vec![vec![(1, 1.0)]]).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_validate_detects_self() {
        let graph = NeighborGraph::from_columns(1, vec![vec![(0, 0.0)], vec![(0, 1.0)]]).unwrap();
        assert!(graph.validate(false).is_ok());
        assert!(graph.validate(true).is_err());
    }

    #[test]
    fn test_check_bounds() {
        let graph = NeighborGraph::from_columns(1, vec![vec![(1, 1.0)], vec![(5, 2.0)]]).unwrap();
        assert!(graph.check_bounds(6).is_ok());
        assert!(matches!(graph.check_bounds(2), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_deserialize_validates() {
        let graph = NeighborGraph::from_columns(1, vec![vec![(1, 1.0)], vec![(0, 1.0)]]).unwrap();
        let json = serde_json::to_string(&graph).unwrap();
        let back: NeighborGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);

        let short = r#"{"k": 2, "n": 2, "indices": [1, 0], "distances": [1.0, 1.0]}"#;
        assert!(serde_json::from_str::<NeighborGraph>(short).is_err());

        let unsorted = r#"{"k": 2, "n": 1, "indices": [1, 2], "distances": [3.0, 1.0]}"#;
        assert!(serde_json::from_str::<NeighborGraph>(unsorted).is_err());
    }
}
