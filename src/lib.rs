//! # fuzzgraph
//!
//! Neighbor graphs and fuzzy topology for manifold-learning dimensionality
//! reduction.
//!
//! fuzzgraph covers the graph-building half of a UMAP-style pipeline:
//!
//! 1. **kNN search** - exact below 4096 points, NN-descent above, or straight
//!    from a precomputed distance matrix
//! 2. **Fuzzy set union** - directed membership strengths blended into one
//!    symmetric weighted graph
//! 3. **Label reweighting** - optional semi-supervised damping of edges
//! 4. **Curve fitting** - `(a, b)` of `1 / (1 + a * d^(2b))` for the optimizer
//!
//! Calibrating distances into membership strengths and running the layout
//! optimizer are left to the caller.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! fuzzgraph knn --input points.json -k 15 --metric euclidean
//! fuzzgraph fit-curve --min-dist 0.1 --spread 1.0
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use fuzzgraph::prelude::*;
//!
//! let points: Vec<Vector> = (0..20)
//!     .map(|i| Vector::new(vec![(i % 5) as f32, (i / 5) as f32]))
//!     .collect();
//!
//! let graph = KnnSearch::default()
//!     .search(SampleSet::Points(&points), 4, MetricSpec::Function(&Distance::Euclidean))
//!     .unwrap();
//!
//! let strengths: Vec<f32> = graph.iter().map(|(_, _, d)| (-d).exp()).collect();
//! let directed = CsrMatrix::from_neighbor_graph(&graph, &strengths).unwrap();
//! let combined = combine_sparse(&directed, 1.0).unwrap();
//!
//! let labels: Vec<Label<u8>> = (0..20).map(|i| Label::Known((i % 2) as u8)).collect();
//! let supervised = reweight(&combined, &labels, LabelPenalties::default()).unwrap();
//! assert_eq!(supervised.nnz(), combined.nnz());
//! ```
//!
//! ## Crate Structure
//!
//! - [`fuzzgraph-core`](https://docs.rs/fuzzgraph-core) - kNN, NN-descent, fuzzy union, curve fit
//! - [`fuzzgraph-supervised`](https://docs.rs/fuzzgraph-supervised) - categorical label reweighting

// Re-export core types
pub use fuzzgraph_core::{
    combine_dense, combine_sparse, fit_ab, CsrMatrix, CurveFitConfig, CurveFitter, CurveParams,
    Distance, Error, KnnConfig, KnnSearch, Matrix, Metric, MetricSpec, NeighborGraph, NnDescent,
    NnDescentConfig, Result, SampleSet, SearchStrategy, Vector,
};

// Re-export supervised
pub use fuzzgraph_supervised::{reweight, Agreement, Label, LabelPenalties};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        combine_dense, combine_sparse, fit_ab, reweight, CsrMatrix, CurveParams, Distance, Error,
        KnnConfig, KnnSearch, Label, LabelPenalties, Matrix, Metric, MetricSpec, NeighborGraph,
        Result, SampleSet, Vector,
    };
}
