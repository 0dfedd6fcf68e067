use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Insufficient neighbors: requested k = {k}, only {available} candidates available")]
    InsufficientNeighbors { k: usize, available: usize },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Curve fit did not converge after {iterations} iterations (cost {cost})")]
    FitNonConvergence { iterations: usize, cost: f64 },

    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
