//! # fuzzgraph Supervised
//!
//! Semi-supervised adjustment of fuzzy neighbor graphs.
//!
//! Given a symmetric graph from `fuzzgraph-core` and one [`Label`] per point,
//! [`reweight`] damps edges whose endpoints disagree or are unlabeled, leaving
//! the sparsity pattern untouched.
//!
//! ## Example
//!
//! ```rust
//! use fuzzgraph_core::CsrMatrix;
//! use fuzzgraph_supervised::{reweight, Label, LabelPenalties};
//!
//! let graph = CsrMatrix::from_triplets(2, 2, &[0, 1], &[1, 0], &[1.0, 1.0]).unwrap();
//! let labels = vec![Label::Known("a"), Label::Unknown];
//!
//! let penalties = LabelPenalties { far_dist: 5.0, unknown_dist: 1.0 };
//! let out = reweight(&graph, &labels, penalties).unwrap();
//! assert!((out.values()[0] - (-1.0f32).exp()).abs() < 1e-6);
//! ```

pub mod label;
pub mod reweight;

pub use label::{Agreement, Label};
pub use reweight::{reweight, LabelPenalties};
