//! # fuzzgraph Core
//!
//! Neighbor graph and fuzzy topology layer for manifold-learning
//! dimensionality reduction.
//!
//! This crate provides:
//!
//! - [`KnnSearch`] - k nearest neighbors, exact below a size threshold,
//!   NN-descent above it, or read from a precomputed distance matrix
//! - [`NnDescent`] - approximate kNN graph construction and querying
//! - [`combine_sparse`] / [`combine_dense`] - fuzzy union/intersection blend
//!   of directed membership strengths into a symmetric graph
//! - [`fit_ab`] - the `(a, b)` parameters of the low-dimensional membership curve
//! - [`CsrMatrix`] - compressed sparse rows for weighted graphs
//!
//! Everything here is a pure transform. Turning neighbor distances into
//! membership strengths and optimizing the embedding are left to the caller.
//!
//! ## Example
//!
//! ```rust
//! use fuzzgraph_core::{
//!     combine_sparse, fit_ab, CsrMatrix, Distance, KnnSearch, MetricSpec, SampleSet, Vector,
//! };
//!
//! let points: Vec<Vector> = (0..10)
//!     .map(|i| Vector::new(vec![i as f32, (i % 3) as f32]))
//!     .collect();
//!
//! let graph = KnnSearch::default()
//!     .search(SampleSet::Points(&points), 3, MetricSpec::Function(&Distance::Euclidean))
//!     .unwrap();
//!
//! // Stand-in for a calibrated membership strength per neighbor
//! let strengths: Vec<f32> = graph.iter().map(|(_, _, d)| (-d).exp()).collect();
//! let directed = CsrMatrix::from_neighbor_graph(&graph, &strengths).unwrap();
//! let combined = combine_sparse(&directed, 1.0).unwrap();
//! assert!(combined.is_symmetric(0.0));
//!
//! let curve = fit_ab(0.1, 1.0, None).unwrap();
//! assert!(curve.a > 0.0);
//! ```

pub mod curve;
pub mod distance;
pub mod error;
pub mod fuzzy;
pub mod knn;
pub mod matrix;
pub mod metric;
pub mod neighbors;
pub mod nndescent;
pub mod sparse;
pub mod vector;

pub use curve::{fit_ab, CurveFitConfig, CurveFitter, CurveParams, CurveSolver, LevenbergMarquardt};
pub use error::{Error, Result};
pub use fuzzy::{combine_dense, combine_sparse, fuzzy_intersection, fuzzy_union};
pub use knn::{
    select_strategy, ApproximateSearch, ExactSearch, KnnConfig, KnnSearch, MetricSpec,
    NeighborSearch, PrecomputedSearch, SampleSet, SearchStrategy, DEFAULT_EXACT_THRESHOLD,
};
pub use matrix::Matrix;
pub use metric::{Distance, Metric};
pub use neighbors::NeighborGraph;
pub use nndescent::{NnDescent, NnDescentConfig};
pub use sparse::CsrMatrix;
pub use vector::Vector;
