//! Pairwise distance matrices
//!
//! Leaf utility of the exact search path. Rows are computed in parallel.

use crate::{Error, Matrix, Metric, Result};
use rayon::prelude::*;

/// Evaluate `metric` and reject values that break the semimetric contract
#[inline]
pub(crate) fn checked_distance<P, M>(metric: &M, a: &P, b: &P) -> Result<f32>
where
    P: ?Sized,
    M: Metric<P> + ?Sized,
{
    let d = metric.distance(a, b);
    if d.is_nan() || d < 0.0 {
        return Err(Error::InvalidMetric(format!(
            "metric returned {d}, distances must be non-negative numbers"
        )));
    }
    Ok(d)
}

/// Full symmetric distance matrix of `points` against themselves
///
/// Each unordered pair is evaluated once; the diagonal is zero.
pub fn pairwise<P, M>(points: &[P], metric: &M) -> Result<Matrix>
where
    P: Sync,
    M: Metric<P> + ?Sized,
{
    let n = points.len();
    let upper: Vec<Vec<f32>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| checked_distance(metric, &points[i], &points[j]))
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<_>>()?;

    let mut out = Matrix::zeros(n, n);
    for (i, row) in upper.into_iter().enumerate() {
        for (offset, d) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            out.set(i, j, d);
            out.set(j, i, d);
        }
    }
    Ok(out)
}

/// Rectangular distance matrix, row `q` = distances from `queries[q]` to every reference point
pub fn cross<P, M>(queries: &[P], reference: &[P], metric: &M) -> Result<Matrix>
where
    P: Sync,
    M: Metric<P> + ?Sized,
{
    let rows: Vec<Vec<f32>> = queries
        .par_iter()
        .map(|q| {
            reference
                .iter()
                .map(|r| checked_distance(metric, q, r))
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<_>>()?;

    let data: Vec<f32> = rows.into_iter().flatten().collect();
    Matrix::new(queries.len(), reference.len(), data)
}
