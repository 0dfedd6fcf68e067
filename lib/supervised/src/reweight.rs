//! Label-driven reweighting of a fuzzy neighbor graph
//!
//! Edges between points with different labels are damped by
//! `exp(-far_dist)`, edges touching an unlabeled point by
//! `exp(-unknown_dist)`. Every stored entry survives, however small its
//! new weight; pruning is up to the caller.

use crate::label::{Agreement, Label};
use fuzzgraph_core::{CsrMatrix, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Penalties applied to disagreeing or unlabeled edges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelPenalties {
    pub far_dist: f32,
    pub unknown_dist: f32,
}

impl Default for LabelPenalties {
    fn default() -> Self {
        Self {
            far_dist: 5.0,
            unknown_dist: 1.0,
        }
    }
}

impl LabelPenalties {
    pub fn validate(&self) -> Result<()> {
        let penalties = [("far_dist", self.far_dist), ("unknown_dist", self.unknown_dist)];
        for (name, value) in penalties {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Reweight every stored edge `(i, j)` of `graph` by the agreement of `labels[i]` and `labels[j]`
///
/// Returns a new matrix with exactly the same sparsity pattern.
pub fn reweight<L>(
    graph: &CsrMatrix,
    labels: &[Label<L>],
    penalties: LabelPenalties,
) -> Result<CsrMatrix>
where
    L: PartialEq + Sync,
{
    penalties.validate()?;
    if !graph.is_square() {
        return Err(Error::MalformedInput(format!(
            "graph must be square, got {}x{}",
            graph.n_rows(),
            graph.n_cols()
        )));
    }
    if labels.len() != graph.n_rows() {
        return Err(Error::MalformedInput(format!(
            "{} labels given for a graph of {} points",
            labels.len(),
            graph.n_rows()
        )));
    }

    let unknown_scale = (-penalties.unknown_dist).exp();
    let far_scale = (-penalties.far_dist).exp();
    debug!(
        nnz = graph.nnz(),
        unlabeled = labels.iter().filter(|label| !label.is_known()).count(),
        unknown_scale,
        far_scale,
        "reweighting graph by label agreement"
    );

    Ok(graph.map_values(|i, j, w| match labels[i].agreement(&labels[j]) {
        Agreement::Same => w,
        Agreement::Different => w * far_scale,
        Agreement::Unknown => w * unknown_scale,
    }))
}
