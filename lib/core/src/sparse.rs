use crate::{Error, Matrix, NeighborGraph, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Compressed sparse row matrix of `f32` weights
///
/// Row `i` owns `indices[indptr[i]..indptr[i + 1]]` (strictly increasing
/// column ids) and the matching `values`. Stored entries are the structural
/// nonzeros; an entry may still hold `0.0` and is kept as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCsr")]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct RawCsr {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl TryFrom<RawCsr> for CsrMatrix {
    type Error = Error;

    fn try_from(raw: RawCsr) -> Result<Self> {
        Self::new(raw.n_rows, raw.n_cols, raw.indptr, raw.indices, raw.values)
    }
}

impl CsrMatrix {
    /// Wrap raw CSR buffers after checking their structure
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        if indptr.len() != n_rows + 1 || indptr.first() != Some(&0) {
            return Err(Error::MalformedInput(format!(
                "indptr must start at 0 and have {} entries",
                n_rows + 1
            )));
        }
        if indices.len() != values.len() || indptr[n_rows] != indices.len() {
            return Err(Error::MalformedInput(format!(
                "indptr ends at {} but there are {} indices and {} values",
                indptr[n_rows],
                indices.len(),
                values.len()
            )));
        }
        for i in 0..n_rows {
            if indptr[i] > indptr[i + 1] || indptr[i + 1] > indices.len() {
                return Err(Error::MalformedInput(format!(
                    "indptr decreases or overruns at row {i}"
                )));
            }
            let cols = &indices[indptr[i]..indptr[i + 1]];
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Error::MalformedInput(format!(
                    "column indices of row {i} are not strictly increasing"
                )));
            }
            if let Some(&c) = cols.last() {
                if c >= n_cols {
                    return Err(Error::MalformedInput(format!(
                        "column {c} out of bounds for {n_cols} columns"
                    )));
                }
            }
        }
        Ok(Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            values,
        })
    }

    /// Matrix without stored entries
    #[must_use]
    pub fn empty(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            indptr: vec![0; n_rows + 1],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from coordinate triplets, summing duplicates
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f32],
    ) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != vals.len() {
            return Err(Error::MalformedInput(format!(
                "triplet lists differ in length: {} rows, {} cols, {} values",
                rows.len(),
                cols.len(),
                vals.len()
            )));
        }
        if let Some((&r, &c)) = rows
            .iter()
            .zip(cols)
            .find(|(&r, &c)| r >= n_rows || c >= n_cols)
        {
            return Err(Error::MalformedInput(format!(
                "entry ({r}, {c}) out of bounds for {n_rows}x{n_cols}"
            )));
        }

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_unstable_by_key(|&e| (rows[e], cols[e]));

        let mut indptr = vec![0usize; n_rows + 1];
        let mut indices: Vec<usize> = Vec::with_capacity(order.len());
        let mut values: Vec<f32> = Vec::with_capacity(order.len());
        let mut last: Option<(usize, usize)> = None;
        for e in order {
            let key = (rows[e], cols[e]);
            if last == Some(key) {
                if let Some(v) = values.last_mut() {
                    *v += vals[e];
                }
                continue;
            }
            indptr[key.0 + 1] += 1;
            indices.push(key.1);
            values.push(vals[e]);
            last = Some(key);
        }
        for i in 0..n_rows {
            indptr[i + 1] += indptr[i];
        }

        Ok(Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            values,
        })
    }

    /// Keep every nonzero entry of a dense matrix
    #[must_use]
    pub fn from_dense(matrix: &Matrix) -> Self {
        let mut indptr = Vec::with_capacity(matrix.rows() + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for i in 0..matrix.rows() {
            for (j, &v) in matrix.row(i).iter().enumerate() {
                if v != 0.0 {
                    indices.push(j);
                    values.push(v);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            n_rows: matrix.rows(),
            n_cols: matrix.cols(),
            indptr,
            indices,
            values,
        }
    }

    /// Directed strength matrix from a neighbor graph
    ///
    /// `strengths` is aligned with the graph's entries in column order; entry
    /// `(point, neighbor)` receives the strength of that edge.
    pub fn from_neighbor_graph(graph: &NeighborGraph, strengths: &[f32]) -> Result<Self> {
        let expected = graph.len() * graph.k();
        if strengths.len() != expected {
            return Err(Error::MalformedInput(format!(
                "{} strengths given for {} graph entries",
                strengths.len(),
                expected
            )));
        }
        let (rows, cols): (Vec<usize>, Vec<usize>) =
            graph.iter().map(|(point, neighbor, _)| (point, neighbor)).unzip();
        Self::from_triplets(graph.len(), graph.len(), &rows, &cols, strengths)
    }

    #[inline]
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[inline]
    #[must_use]
    pub fn is_square(&self) -> bool {
        self.n_rows == self.n_cols
    }

    /// Number of stored entries
    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Column ids and values stored in row `i`
    #[inline]
    #[must_use]
    pub fn row(&self, i: usize) -> (&[usize], &[f32]) {
        let range = self.indptr[i]..self.indptr[i + 1];
        (&self.indices[range.clone()], &self.values[range])
    }

    /// Stored value at `(i, j)`, if any
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        let (cols, vals) = self.row(i);
        cols.binary_search(&j).ok().map(|pos| vals[pos])
    }

    /// `(row, col, value)` in row-major order, columns ascending within a row
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.n_rows).flat_map(move |i| {
            let (cols, vals) = self.row(i);
            cols.iter().zip(vals).map(move |(&j, &v)| (i, j, v))
        })
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut indptr = vec![0usize; self.n_cols + 1];
        for &j in &self.indices {
            indptr[j + 1] += 1;
        }
        for j in 0..self.n_cols {
            indptr[j + 1] += indptr[j];
        }

        let mut next = indptr.clone();
        let mut indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0f32; self.nnz()];
        for (i, j, v) in self.iter() {
            let slot = next[j];
            indices[slot] = i;
            values[slot] = v;
            next[j] += 1;
        }

        Self {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr,
            indices,
            values,
        }
    }

    #[must_use]
    pub fn to_dense(&self) -> Matrix {
        let mut out = Matrix::zeros(self.n_rows, self.n_cols);
        for (i, j, v) in self.iter() {
            out.set(i, j, v);
        }
        out
    }

    /// New matrix with the same pattern and `f(row, col, value)` as values
    #[must_use]
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(usize, usize, f32) -> f32 + Sync,
    {
        let values: Vec<f32> = (0..self.n_rows)
            .into_par_iter()
            .flat_map_iter(|i| {
                let (cols, vals) = self.row(i);
                let f = &f;
                cols.iter().zip(vals).map(move |(&j, &v)| f(i, j, v))
            })
            .collect();
        Self {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            indptr: self.indptr.clone(),
            indices: self.indices.clone(),
            values,
        }
    }

    /// Whether `other` stores exactly the same positions
    #[must_use]
    pub fn same_pattern(&self, other: &CsrMatrix) -> bool {
        self.n_rows == other.n_rows
            && self.n_cols == other.n_cols
            && self.indptr == other.indptr
            && self.indices == other.indices
    }

    /// Same pattern as the transpose and values within `tolerance`
    #[must_use]
    pub fn is_symmetric(&self, tolerance: f32) -> bool {
        if !self.is_square() {
            return false;
        }
        let transposed = self.transpose();
        self.same_pattern(&transposed)
            && self
                .values
                .iter()
                .zip(&transposed.values)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}
