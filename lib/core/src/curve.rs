//! Fit of the low-dimensional membership curve
//!
//! The embedding optimizer scores distances `d` with the differentiable family
//! `phi(d) = 1 / (1 + a * d^(2b))`. `a` and `b` are chosen so that `phi`
//! approximates the offset exponential kernel
//!
//! ```text
//! psi(d) = 1                               if d < min_dist
//!        = exp(-(d - min_dist) / spread)   otherwise
//! ```
//!
//! sampled on `[0, 3 * spread]`, in the least squares sense.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Parameters `(a, b)` of `1 / (1 + a * d^(2b))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    pub a: f64,
    pub b: f64,
}

impl CurveParams {
    #[inline]
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Value of the curve at distance `d`
    #[inline]
    #[must_use]
    pub fn evaluate(&self, d: f64) -> f64 {
        model(d, *self).0
    }
}

/// Sampling and solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveFitConfig {
    pub n_samples: usize,
    pub max_iterations: usize,
    /// Relative cost reduction under which an accepted step ends the fit
    pub ftol: f64,
    /// Relative step size under which an accepted step ends the fit
    pub xtol: f64,
}

impl Default for CurveFitConfig {
    fn default() -> Self {
        Self {
            n_samples: 300,
            max_iterations: 500,
            ftol: 1e-12,
            xtol: 1e-10,
        }
    }
}

/// Nonlinear least squares solver for the curve family
pub trait CurveSolver {
    /// Minimize the squared residuals of `phi(xs)` against `ys` starting from `initial`
    fn solve(&self, xs: &[f64], ys: &[f64], initial: CurveParams) -> Result<CurveParams>;
}

/// Damped Gauss-Newton with `a` projected onto `a >= 0` after every step
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        let config = CurveFitConfig::default();
        Self::from(&config)
    }
}

impl From<&CurveFitConfig> for LevenbergMarquardt {
    fn from(config: &CurveFitConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            ftol: config.ftol,
            xtol: config.xtol,
        }
    }
}

const MAX_DAMPING: f64 = 1e16;
const STATIONARY_GRADIENT: f64 = 1e-8;

/// `phi(x)` and its partial derivatives in `a` and `b`
#[inline]
fn model(x: f64, p: CurveParams) -> (f64, f64, f64) {
    if x <= 0.0 {
        return (1.0, 0.0, 0.0);
    }
    let pow = x.powf(2.0 * p.b);
    if !pow.is_finite() {
        return (0.0, 0.0, 0.0);
    }
    let denom = 1.0 + p.a * pow;
    let denom_sq = denom * denom;
    (
        1.0 / denom,
        -pow / denom_sq,
        -2.0 * p.a * pow * x.ln() / denom_sq,
    )
}

fn cost(xs: &[f64], ys: &[f64], p: CurveParams) -> f64 {
    0.5 * xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = p.evaluate(x) - y;
            r * r
        })
        .sum::<f64>()
}

/// `J^T J` and `J^T r` at `p`
fn normal_equations(xs: &[f64], ys: &[f64], p: CurveParams) -> ([[f64; 2]; 2], [f64; 2]) {
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = [0.0; 2];
    for (&x, &y) in xs.iter().zip(ys) {
        let (phi, da, db) = model(x, p);
        let r = phi - y;
        jtj[0][0] += da * da;
        jtj[0][1] += da * db;
        jtj[1][1] += db * db;
        jtr[0] += da * r;
        jtr[1] += db * r;
    }
    jtj[1][0] = jtj[0][1];
    (jtj, jtr)
}

impl CurveSolver for LevenbergMarquardt {
    fn solve(&self, xs: &[f64], ys: &[f64], initial: CurveParams) -> Result<CurveParams> {
        let mut p = CurveParams::new(initial.a.max(0.0), initial.b);
        let mut current = cost(xs, ys, p);
        if !current.is_finite() {
            return Err(Error::FitNonConvergence {
                iterations: 0,
                cost: current,
            });
        }
        let mut damping = 1e-3;

        for iteration in 1..=self.max_iterations {
            let (jtj, g) = normal_equations(xs, ys, p);
            // At the a = 0 bound only descent into the feasible side counts
            let g_a = if p.a <= 0.0 && g[0] > 0.0 { 0.0 } else { g[0] };
            let gradient = g_a.abs().max(g[1].abs());
            if gradient <= f64::EPSILON {
                debug!(iteration, cost = current, "curve fit reached a stationary point");
                return Ok(p);
            }

            let mut accepted = None;
            while damping <= MAX_DAMPING {
                let a11 = jtj[0][0] + damping * jtj[0][0].max(f64::MIN_POSITIVE);
                let a22 = jtj[1][1] + damping * jtj[1][1].max(f64::MIN_POSITIVE);
                let a12 = jtj[0][1];
                let det = a11 * a22 - a12 * a12;
                if !(det > 0.0) || !det.is_finite() {
                    damping *= 10.0;
                    continue;
                }
                let step_a = -(a22 * g[0] - a12 * g[1]) / det;
                let step_b = -(a11 * g[1] - a12 * g[0]) / det;
                let candidate = CurveParams::new((p.a + step_a).max(0.0), p.b + step_b);
                let candidate_cost = cost(xs, ys, candidate);

                if candidate_cost.is_finite() && candidate_cost < current {
                    accepted = Some((candidate, candidate_cost));
                    damping = (damping / 10.0).max(1e-12);
                    break;
                }
                damping *= 10.0;
            }

            let Some((candidate, candidate_cost)) = accepted else {
                if gradient <= STATIONARY_GRADIENT {
                    debug!(iteration, cost = current, "curve fit stalled at a minimum");
                    return Ok(p);
                }
                return Err(Error::FitNonConvergence {
                    iterations: iteration,
                    cost: current,
                });
            };

            let step = ((candidate.a - p.a).powi(2) + (candidate.b - p.b).powi(2)).sqrt();
            let scale = (p.a * p.a + p.b * p.b).sqrt();
            let reduction = current - candidate_cost;
            p = candidate;
            current = candidate_cost;

            if reduction <= self.ftol * current || step <= self.xtol * (scale + self.xtol) {
                debug!(iteration, cost = current, a = p.a, b = p.b, "curve fit converged");
                return Ok(p);
            }
        }

        Err(Error::FitNonConvergence {
            iterations: self.max_iterations,
            cost: current,
        })
    }
}

/// Sample the target kernel at `n_samples` evenly spaced points of `[0, 3 * spread]`
#[must_use]
pub fn target_kernel(min_dist: f64, spread: f64, n_samples: usize) -> (Vec<f64>, Vec<f64>) {
    let last = (n_samples.max(2) - 1) as f64;
    let xs: Vec<f64> = (0..n_samples)
        .map(|i| 3.0 * spread * i as f64 / last)
        .collect();
    let ys = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();
    (xs, ys)
}

/// Membership curve fitter with a pluggable solver
#[derive(Debug, Clone)]
pub struct CurveFitter<S = LevenbergMarquardt> {
    config: CurveFitConfig,
    solver: S,
}

impl Default for CurveFitter {
    fn default() -> Self {
        Self::new(CurveFitConfig::default())
    }
}

impl CurveFitter {
    pub fn new(config: CurveFitConfig) -> Self {
        let solver = LevenbergMarquardt::from(&config);
        Self { config, solver }
    }
}

impl<S: CurveSolver> CurveFitter<S> {
    pub fn with_solver(config: CurveFitConfig, solver: S) -> Self {
        Self { config, solver }
    }

    /// Return `preset` untouched if given, otherwise fit `(a, b)` from `a = b = 1`
    pub fn fit(
        &self,
        min_dist: f64,
        spread: f64,
        preset: Option<CurveParams>,
    ) -> Result<CurveParams> {
        if let Some(params) = preset {
            return Ok(params);
        }
        if !spread.is_finite() || spread <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "spread must be positive, got {spread}"
            )));
        }
        if !min_dist.is_finite() || min_dist < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_dist must be non-negative, got {min_dist}"
            )));
        }
        if self.config.n_samples < 2 {
            return Err(Error::InvalidConfig(
                "curve fit needs at least 2 samples".to_string(),
            ));
        }

        let (xs, ys) = target_kernel(min_dist, spread, self.config.n_samples);
        let params = self.solver.solve(&xs, &ys, CurveParams::new(1.0, 1.0))?;
        if params.b < 0.0 {
            warn!(
                a = params.a,
                b = params.b,
                min_dist,
                spread,
                "fitted curve has a negative exponent"
            );
        }
        Ok(params)
    }
}

/// Fit `(a, b)` with the default solver, or pass `preset` through
pub fn fit_ab(min_dist: f64, spread: f64, preset: Option<CurveParams>) -> Result<CurveParams> {
    CurveFitter::default().fit(min_dist, spread, preset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct PanickingSolver;

    impl CurveSolver for PanickingSolver {
        fn solve(&self, _: &[f64], _: &[f64], _: CurveParams) -> Result<CurveParams> {
            panic!("solver must not run when parameters are supplied");
        }
    }

    struct CountingSolver {
        calls: Cell<usize>,
    }

    impl CurveSolver for CountingSolver {
        fn solve(&self, xs: &[f64], ys: &[f64], initial: CurveParams) -> Result<CurveParams> {
            self.calls.set(self.calls.get() + 1);
            LevenbergMarquardt::default().solve(xs, ys, initial)
        }
    }

    #[test]
    fn test_preset_bypasses_solver() {
        let fitter = CurveFitter::with_solver(CurveFitConfig::default(), PanickingSolver);
        let preset = CurveParams::new(1.234, -0.5);
        assert_eq!(fitter.fit(0.1, 1.0, Some(preset)).unwrap(), preset);
        // bypass does not validate the kernel parameters either
        assert_eq!(fitter.fit(-1.0, 0.0, Some(preset)).unwrap(), preset);
    }

    #[test]
    fn test_solver_invoked_once_without_preset() {
        let solver = CountingSolver {
            calls: Cell::new(0),
        };
        let fitter = CurveFitter::with_solver(CurveFitConfig::default(), solver);
        fitter.fit(0.1, 1.0, None).unwrap();
        fitter.fit(0.1, 1.0, Some(CurveParams::new(1.0, 1.0))).unwrap();
        assert_eq!(fitter.solver.calls.get(), 1);
    }

    #[test]
    fn test_default_parameters() {
        // Reference values for min_dist = 0.1, spread = 1.0
        let params = fit_ab(0.1, 1.0, None).unwrap();
        assert!((params.a - 1.577).abs() < 0.02, "a = {}", params.a);
        assert!((params.b - 0.895).abs() < 0.01, "b = {}", params.b);
    }

    #[test]
    fn test_fit_tracks_kernel() {
        let params = fit_ab(0.5, 1.5, None).unwrap();
        let (xs, ys) = target_kernel(0.5, 1.5, 300);
        let max_err = xs
            .iter()
            .zip(&ys)
            .map(|(&x, &y)| (params.evaluate(x) - y).abs())
            .fold(0.0, f64::max);
        assert!(params.a > 0.0);
        assert!(max_err < 0.15, "max error {max_err}");
    }

    #[test]
    fn test_fit_is_deterministic() {
        let a = fit_ab(0.25, 1.0, None).unwrap();
        let b = fit_ab(0.25, 1.0, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_iteration_cap_reports_failure() {
        let fitter = CurveFitter::new(CurveFitConfig {
            max_iterations: 1,
            ..Default::default()
        });
        let err = fitter.fit(0.1, 1.0, None).unwrap_err();
        assert!(matches!(err, Error::FitNonConvergence { iterations: 1, .. }));
    }

    #[test]
    fn test_invalid_kernel_parameters() {
        assert!(matches!(fit_ab(0.1, 0.0, None), Err(Error::InvalidConfig(_))));
        assert!(matches!(fit_ab(-0.1, 1.0, None), Err(Error::InvalidConfig(_))));
        assert!(matches!(fit_ab(f64::NAN, 1.0, None), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_target_kernel_samples() {
        let (xs, ys) = target_kernel(0.1, 1.0, 300);
        assert_eq!(xs.len(), 300);
        assert_eq!(xs[0], 0.0);
        assert!((xs[299] - 3.0).abs() < 1e-12);
        assert_eq!(ys[0], 1.0);
        assert!((ys[299] - (-2.9f64).exp()).abs() < 1e-12);
    }
}
