//! Fuzzy simplicial set union
//!
//! Point `i` holds its own confidence `S(i, j)` that `j` is a neighbor, and
//! `j` holds `S(j, i)`. Treating both as probabilities of independent events,
//! the combined weight is a blend of
//!
//! ```text
//! union(i, j)        = S(i, j) + S(j, i) - S(i, j) * S(j, i)
//! intersection(i, j) = S(i, j) * S(j, i)
//! C = t * union + (1 - t) * intersection
//! ```
//!
//! Both formulas are symmetric in `(i, j)`, so `C` is symmetric for any square
//! `S`.

use crate::{CsrMatrix, Error, Matrix, Result};
use rayon::prelude::*;

/// Probabilistic t-conorm `x + y - x * y`
#[inline]
#[must_use]
pub fn fuzzy_union(x: f32, y: f32) -> f32 {
    x + y - x * y
}

/// Product t-norm `x * y`
#[inline]
#[must_use]
pub fn fuzzy_intersection(x: f32, y: f32) -> f32 {
    x * y
}

/// `t * union + (1 - t) * intersection`
#[inline]
#[must_use]
pub fn blend(x: f32, y: f32, t: f32) -> f32 {
    t * fuzzy_union(x, y) + (1.0 - t) * fuzzy_intersection(x, y)
}

fn check_mix_ratio(t: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&t) {
        return Err(Error::InvalidConfig(format!(
            "set operation mix ratio must lie in [0, 1], got {t}"
        )));
    }
    Ok(())
}

/// Combine a dense directed strength matrix
pub fn combine_dense(strengths: &Matrix, t: f32) -> Result<Matrix> {
    check_mix_ratio(t)?;
    if !strengths.is_square() {
        return Err(Error::MalformedInput(format!(
            "strength matrix must be square, got {}x{}",
            strengths.rows(),
            strengths.cols()
        )));
    }
    let n = strengths.rows();
    let data: Vec<f32> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (0..n).map(move |j| blend(strengths.get(i, j), strengths.get(j, i), t)))
        .collect();
    Matrix::new(n, n, data)
}

/// Combine a sparse directed strength matrix
///
/// The result stores the union of the positions of `S` and `S^T`, including
/// entries whose blended weight is zero.
pub fn combine_sparse(strengths: &CsrMatrix, t: f32) -> Result<CsrMatrix> {
    check_mix_ratio(t)?;
    if !strengths.is_square() {
        return Err(Error::MalformedInput(format!(
            "strength matrix must be square, got {}x{}",
            strengths.n_rows(),
            strengths.n_cols()
        )));
    }
    let transposed = strengths.transpose();

    let rows: Vec<Vec<(usize, f32)>> = (0..strengths.n_rows())
        .into_par_iter()
        .map(|i| merge_row(strengths.row(i), transposed.row(i), t))
        .collect();

    let mut indptr = Vec::with_capacity(rows.len() + 1);
    let mut indices = Vec::new();
    let mut values = Vec::new();
    indptr.push(0);
    for row in rows {
        for (j, v) in row {
            indices.push(j);
            values.push(v);
        }
        indptr.push(indices.len());
    }
    CsrMatrix::new(
        strengths.n_rows(),
        strengths.n_cols(),
        indptr,
        indices,
        values,
    )
}

/// Merge row `i` of `S` with row `i` of `S^T` (column `i` of `S`)
fn merge_row(
    (fwd_cols, fwd_vals): (&[usize], &[f32]),
    (rev_cols, rev_vals): (&[usize], &[f32]),
    t: f32,
) -> Vec<(usize, f32)> {
    let mut out = Vec::with_capacity(fwd_cols.len() + rev_cols.len());
    let (mut a, mut b) = (0, 0);
    while a < fwd_cols.len() || b < rev_cols.len() {
        let next_fwd = fwd_cols.get(a).copied().unwrap_or(usize::MAX);
        let next_rev = rev_cols.get(b).copied().unwrap_or(usize::MAX);
        let (j, x, y) = if next_fwd == next_rev {
            a += 1;
            b += 1;
            (next_fwd, fwd_vals[a - 1], rev_vals[b - 1])
        } else if next_fwd < next_rev {
            a += 1;
            (next_fwd, fwd_vals[a - 1], 0.0)
        } else {
            b += 1;
            (next_rev, 0.0, rev_vals[b - 1])
        };
        out.push((j, blend(x, y, t)));
    }
    out
}
