//! k-nearest-neighbor search with exact, precomputed and approximate strategies
//!
//! The strategy is chosen once by [`select_strategy`] from the input shape and
//! size, then run through the [`NeighborSearch`] capability.

use crate::distance;
use crate::neighbors::select_nearest;
use crate::nndescent::{NnDescent, NnDescentConfig};
use crate::{Error, Matrix, Metric, NeighborGraph, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sample count at which the approximate path takes over
pub const DEFAULT_EXACT_THRESHOLD: usize = 4096;

/// Input to a neighbor search
#[derive(Debug, Clone, Copy)]
pub enum SampleSet<'a, P> {
    /// Points in feature space
    Points(&'a [P]),
    /// Square matrix of distances, `(i, j)` is the distance from `i` to `j`
    Precomputed(&'a Matrix),
}

impl<'a, P> SampleSet<'a, P> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            SampleSet::Points(points) => points.len(),
            SampleSet::Precomputed(matrix) => matrix.rows(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How distances are obtained
pub enum MetricSpec<'m, P> {
    /// The samples already are a distance matrix
    Precomputed,
    /// Distances come from a function over points
    Function(&'m (dyn Metric<P> + 'm)),
}

impl<P> Clone for MetricSpec<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for MetricSpec<'_, P> {}

impl<P> std::fmt::Debug for MetricSpec<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricSpec::Precomputed => f.write_str("Precomputed"),
            MetricSpec::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Search strategy picked for a given input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Precomputed,
    Exact,
    Approximate,
}

/// Configuration for [`KnnSearch`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Inputs with at least this many points use NN-descent
    pub exact_threshold: usize,
    /// Queries explore at most `query_candidate_factor * k` candidates
    pub query_candidate_factor: usize,
    pub nndescent: NnDescentConfig,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            exact_threshold: DEFAULT_EXACT_THRESHOLD,
            query_candidate_factor: 8,
            nndescent: NnDescentConfig::default(),
        }
    }
}

/// Pick the search strategy for `samples` under `metric`
///
/// Rejects a precomputed tag on points, a metric function on a matrix and
/// non-square precomputed matrices.
pub fn select_strategy<P>(
    samples: &SampleSet<'_, P>,
    metric: &MetricSpec<'_, P>,
    exact_threshold: usize,
) -> Result<SearchStrategy> {
    match (samples, metric) {
        (SampleSet::Precomputed(matrix), MetricSpec::Precomputed) => {
            if !matrix.is_square() {
                return Err(Error::MalformedInput(format!(
                    "precomputed distances must be square, got {}x{}",
                    matrix.rows(),
                    matrix.cols()
                )));
            }
            Ok(SearchStrategy::Precomputed)
        }
        (SampleSet::Points(_), MetricSpec::Precomputed) => Err(Error::MalformedInput(
            "precomputed metric requires a distance matrix, got points".to_string(),
        )),
        (SampleSet::Precomputed(_), MetricSpec::Function(_)) => Err(Error::MalformedInput(
            "a distance matrix was given together with a metric function".to_string(),
        )),
        (SampleSet::Points(points), MetricSpec::Function(_)) => {
            if points.len() < exact_threshold {
                Ok(SearchStrategy::Exact)
            } else {
                Ok(SearchStrategy::Approximate)
            }
        }
    }
}

/// Capability shared by every search strategy
pub trait NeighborSearch<P> {
    fn search(
        &self,
        samples: &SampleSet<'_, P>,
        k: usize,
        metric: &MetricSpec<'_, P>,
    ) -> Result<NeighborGraph>;
}

/// Neighbors read straight off a distance matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedSearch;

/// Full pairwise distances followed by partial selection
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSearch;

/// NN-descent
#[derive(Debug, Clone, Default)]
pub struct ApproximateSearch {
    builder: NnDescent,
}

impl ApproximateSearch {
    pub fn new(config: NnDescentConfig) -> Self {
        Self {
            builder: NnDescent::new(config),
        }
    }
}

impl<P> NeighborSearch<P> for PrecomputedSearch {
    fn search(
        &self,
        samples: &SampleSet<'_, P>,
        k: usize,
        _metric: &MetricSpec<'_, P>,
    ) -> Result<NeighborGraph> {
        let SampleSet::Precomputed(matrix) = samples else {
            return Err(Error::MalformedInput(
                "precomputed search needs a distance matrix".to_string(),
            ));
        };
        if !matrix.is_square() {
            return Err(Error::MalformedInput(format!(
                "precomputed distances must be square, got {}x{}",
                matrix.rows(),
                matrix.cols()
            )));
        }
        if let Some(bad) = matrix.as_slice().iter().find(|d| d.is_nan() || **d < 0.0) {
            return Err(Error::MalformedInput(format!(
                "precomputed distances must be non-negative, found {bad}"
            )));
        }
        check_k(k, matrix.rows().saturating_sub(1))?;
        extract_neighbors(matrix, k, true)
    }
}

impl<P: Sync> NeighborSearch<P> for ExactSearch {
    fn search(
        &self,
        samples: &SampleSet<'_, P>,
        k: usize,
        metric: &MetricSpec<'_, P>,
    ) -> Result<NeighborGraph> {
        let (points, metric) = points_and_metric(samples, metric)?;
        check_k(k, points.len().saturating_sub(1))?;
        let distances = distance::pairwise(points, metric)?;
        extract_neighbors(&distances, k, true)
    }
}

impl<P: Sync> NeighborSearch<P> for ApproximateSearch {
    fn search(
        &self,
        samples: &SampleSet<'_, P>,
        k: usize,
        metric: &MetricSpec<'_, P>,
    ) -> Result<NeighborGraph> {
        let (points, metric) = points_and_metric(samples, metric)?;
        check_k(k, points.len().saturating_sub(1))?;
        self.builder.build(points, k, metric)
    }
}

fn points_and_metric<'a, 'm, P>(
    samples: &SampleSet<'a, P>,
    metric: &MetricSpec<'m, P>,
) -> Result<(&'a [P], &'m (dyn Metric<P> + 'm))> {
    match (samples, metric) {
        (SampleSet::Points(points), MetricSpec::Function(metric)) => Ok((*points, *metric)),
        _ => Err(Error::MalformedInput(
            "search over points needs a metric function".to_string(),
        )),
    }
}

fn check_k(k: usize, available: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::InvalidConfig("k must be at least 1".to_string()));
    }
    if k > available {
        return Err(Error::InsufficientNeighbors { k, available });
    }
    Ok(())
}

/// k smallest entries of every row of `distances`
///
/// Row `j` becomes column `j` of the graph. With `skip_diagonal`, entry
/// `(j, j)` is never selected.
fn extract_neighbors(distances: &Matrix, k: usize, skip_diagonal: bool) -> Result<NeighborGraph> {
    let columns: Vec<Vec<(usize, f32)>> = (0..distances.rows())
        .into_par_iter()
        .map(|j| {
            let row = distances.row(j).iter().copied().enumerate();
            if skip_diagonal {
                select_nearest(row.filter(|&(i, _)| i != j), k)
            } else {
                select_nearest(row, k)
            }
        })
        .collect();
    NeighborGraph::from_columns(k, columns)
}

/// Neighbor search dispatcher
#[derive(Debug, Clone, Default)]
pub struct KnnSearch {
    config: KnnConfig,
}

impl KnnSearch {
    pub fn new(config: KnnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KnnConfig {
        &self.config
    }

    /// Strategy that [`KnnSearch::search`] would use for this input
    pub fn strategy<P>(
        &self,
        samples: &SampleSet<'_, P>,
        metric: &MetricSpec<'_, P>,
    ) -> Result<SearchStrategy> {
        select_strategy(samples, metric, self.config.exact_threshold)
    }

    /// k nearest neighbors of every sample among the other samples
    pub fn search<P: Sync>(
        &self,
        samples: SampleSet<'_, P>,
        k: usize,
        metric: MetricSpec<'_, P>,
    ) -> Result<NeighborGraph> {
        let strategy = self.strategy(&samples, &metric)?;
        debug!(?strategy, n = samples.len(), k, "knn search");
        match strategy {
            SearchStrategy::Precomputed => PrecomputedSearch.search(&samples, k, &metric),
            SearchStrategy::Exact => ExactSearch.search(&samples, k, &metric),
            SearchStrategy::Approximate => {
                ApproximateSearch::new(self.config.nndescent.clone()).search(&samples, k, &metric)
            }
        }
    }

    /// k nearest reference points of every query point
    ///
    /// `reference_graph` is the graph previously built over `reference`. Small
    /// combined inputs are answered exactly; otherwise the graph is searched
    /// with `query_candidate_factor * k` candidates per query.
    pub fn query<P: Sync>(
        &self,
        reference: &[P],
        reference_graph: &NeighborGraph,
        queries: &[P],
        k: usize,
        metric: &dyn Metric<P>,
    ) -> Result<NeighborGraph> {
        if reference_graph.len() != reference.len() {
            return Err(Error::MalformedInput(format!(
                "reference graph has {} columns but there are {} reference points",
                reference_graph.len(),
                reference.len()
            )));
        }
        reference_graph.check_bounds(reference.len())?;
        check_k(k, reference.len())?;

        if reference.len() + queries.len() < self.config.exact_threshold {
            debug!(n = reference.len(), queries = queries.len(), k, "exact query");
            let distances = distance::cross(queries, reference, metric)?;
            return extract_neighbors(&distances, k, false);
        }

        let max_candidates = self.config.query_candidate_factor.saturating_mul(k);
        debug!(
            n = reference.len(),
            queries = queries.len(),
            k,
            max_candidates,
            "approximate query"
        );
        NnDescent::new(self.config.nndescent.clone()).query(
            reference,
            reference_graph,
            queries,
            k,
            metric,
            max_candidates,
        )
    }
}
