//! Distance functions over points
//!
//! A [`Metric`] only needs to be a semimetric: non-negative and symmetric.
//! The triangle inequality is never relied upon by the search code.

use crate::{Error, Vector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance function between two points of type `P`
pub trait Metric<P: ?Sized>: Sync {
    fn distance(&self, a: &P, b: &P) -> f32;
}

impl<P: ?Sized, F> Metric<P> for F
where
    F: Fn(&P, &P) -> f32 + Sync,
{
    #[inline]
    fn distance(&self, a: &P, b: &P) -> f32 {
        self(a, b)
    }
}

/// Built-in metrics over dense `f32` vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Euclidean,
    SquaredEuclidean,
    Manhattan,
    Chebyshev,
    Cosine,
}

impl Distance {
    /// Distance between two slices, `NaN` when the dimensions differ
    #[inline]
    pub fn eval(self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::NAN;
        }
        match self {
            Distance::Euclidean => squared_euclidean(a, b).sqrt(),
            Distance::SquaredEuclidean => squared_euclidean(a, b),
            Distance::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            Distance::Chebyshev => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f32::max),
            Distance::Cosine => cosine(a, b),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Distance::Euclidean => "euclidean",
            Distance::SquaredEuclidean => "squared_euclidean",
            Distance::Manhattan => "manhattan",
            Distance::Chebyshev => "chebyshev",
            Distance::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Distance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Distance::Euclidean),
            "squared_euclidean" | "sqeuclidean" => Ok(Distance::SquaredEuclidean),
            "manhattan" | "cityblock" | "l1" => Ok(Distance::Manhattan),
            "chebyshev" | "linf" => Ok(Distance::Chebyshev),
            "cosine" => Ok(Distance::Cosine),
            other => Err(Error::InvalidMetric(format!("unknown metric '{other}'"))),
        }
    }
}

impl Metric<[f32]> for Distance {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.eval(a, b)
    }
}

impl Metric<Vec<f32>> for Distance {
    #[inline]
    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> f32 {
        self.eval(a, b)
    }
}

impl Metric<Vector> for Distance {
    #[inline]
    fn distance(&self, a: &Vector, b: &Vector) -> f32 {
        self.eval(a.as_slice(), b.as_slice())
    }
}

/// Dot product with two accumulators for better pipelining
#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum1 = 0.0f32;
    let mut sum2 = 0.0f32;
    let chunks = a.len() / 2;
    for i in 0..chunks {
        sum1 += a[2 * i] * b[2 * i];
        sum2 += a[2 * i + 1] * b[2 * i + 1];
    }
    if a.len() % 2 == 1 {
        sum1 += a[a.len() - 1] * b[a.len() - 1];
    }
    sum1 + sum2
}

#[inline]
fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    let mut sum1 = 0.0f32;
    let mut sum2 = 0.0f32;
    let chunks = a.len() / 2;
    for i in 0..chunks {
        let d1 = a[2 * i] - b[2 * i];
        let d2 = a[2 * i + 1] - b[2 * i + 1];
        sum1 += d1 * d1;
        sum2 += d2 * d2;
    }
    if a.len() % 2 == 1 {
        let d = a[a.len() - 1] - b[a.len() - 1];
        sum1 += d * d;
    }
    sum1 + sum2
}

#[inline]
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 && norm_b == 0.0 {
        return 0.0;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    // Rounding can push identical directions slightly below zero
    (1.0 - dot(a, b) / (norm_a * norm_b)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_metrics() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0];
        assert!((Distance::Euclidean.eval(&a, &b) - 5.0).abs() < 1e-6);
        assert!((Distance::SquaredEuclidean.eval(&a, &b) - 25.0).abs() < 1e-6);
        assert!((Distance::Manhattan.eval(&a, &b) - 7.0).abs() < 1e-6);
        assert!((Distance::Chebyshev.eval(&a, &b) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine() {
        let x = Vector::new(vec![1.0, 0.0]);
        let y = Vector::new(vec![0.0, 2.0]);
        let z = Vector::new(vec![2.0, 0.0]);
        assert!((Distance::Cosine.distance(&x, &y) - 1.0).abs() < 1e-6);
        assert!(Distance::Cosine.distance(&x, &z).abs() < 1e-6);
        assert_eq!(Distance::Cosine.eval(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_is_nan() {
        assert!(Distance::Euclidean.eval(&[1.0], &[1.0, 2.0]).is_nan());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("L2".parse::<Distance>().unwrap(), Distance::Euclidean);
        assert_eq!("cityblock".parse::<Distance>().unwrap(), Distance::Manhattan);
        assert!(matches!(
            "hamming".parse::<Distance>(),
            Err(Error::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_closure_metric() {
        let abs_diff = |a: &i64, b: &i64| (a - b).abs() as f32;
        assert_eq!(Metric::<i64>::distance(&abs_diff, &3, &10), 7.0);
    }
}
