use std::error::Error;
use std::fmt;

use crate::Result;

/// Failures raised by rate matrix construction, equilibrium solving, indicator priors and
/// likelihood mixtures. Errors are bailed through `anyhow` and can be recovered with
/// `downcast_ref::<ModelError>()`.
#[derive(Clone, PartialEq)]
pub enum ModelError {
    /// Vector lengths do not fit the state count or the symmetry mode.
    DimensionMismatch(String),
    /// A rate matrix row has no outgoing rate or a column has no inflow.
    DegenerateMatrix(String),
    /// A derived probability is outside of [0, 1].
    InvalidProbability(String),
    /// Weights do not sum up to 1.
    InvalidWeights(String),
    /// The indicator graph is not strongly connected.
    NotStronglyConnected(String),
    /// A rejection sampling loop ran out of retries.
    MaxIterationsExceeded(String),
    /// Transition probability rows did not converge before the time cap.
    EquilibriumNotReached(String),
    /// The eigen system could not decompose the matrix.
    EigenDecomposition(String),
    /// A configuration value is outside of its valid range.
    InvalidParameter(String),
}

impl ModelError {
    /// Errors that only reject the current parameter state. An outer sampler should see these as
    /// a log-density of minus infinity rather than a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ModelError::DegenerateMatrix(_)
                | ModelError::InvalidProbability(_)
                | ModelError::NotStronglyConnected(_)
                | ModelError::EigenDecomposition(_)
        )
    }

    fn message(&self) -> &str {
        match self {
            ModelError::DimensionMismatch(m)
            | ModelError::DegenerateMatrix(m)
            | ModelError::InvalidProbability(m)
            | ModelError::InvalidWeights(m)
            | ModelError::NotStronglyConnected(m)
            | ModelError::MaxIterationsExceeded(m)
            | ModelError::EquilibriumNotReached(m)
            | ModelError::EigenDecomposition(m)
            | ModelError::InvalidParameter(m) => m,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ModelError::DimensionMismatch(_) => "Dimension mismatch",
            ModelError::DegenerateMatrix(_) => "Degenerate rate matrix",
            ModelError::InvalidProbability(_) => "Invalid probability",
            ModelError::InvalidWeights(_) => "Invalid weights",
            ModelError::NotStronglyConnected(_) => "Graph not strongly connected",
            ModelError::MaxIterationsExceeded(_) => "Max iterations exceeded",
            ModelError::EquilibriumNotReached(_) => "Equilibrium not reached",
            ModelError::EigenDecomposition(_) => "Eigen decomposition failed",
            ModelError::InvalidParameter(_) => "Invalid parameter",
        }
    }
}

impl fmt::Debug for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl Error for ModelError {}

/// Turns a rejected parameter state into a log-density of minus infinity, any other error is
/// passed on to the caller.
///
/// # Example
/// ```
/// use anyhow::anyhow;
/// use phylo_ctmc::errors::{reject_as_neg_infinity, ModelError};
/// let rejected: anyhow::Result<f64> =
///     Err(anyhow!(ModelError::DegenerateMatrix("Empty row 2".to_string())));
/// assert_eq!(reject_as_neg_infinity(rejected).unwrap(), f64::NEG_INFINITY);
/// let fatal: anyhow::Result<f64> =
///     Err(anyhow!(ModelError::DimensionMismatch("3 rates".to_string())));
/// assert!(reject_as_neg_infinity(fatal).is_err());
/// ```
pub fn reject_as_neg_infinity(result: Result<f64>) -> Result<f64> {
    match result {
        Ok(logp) => Ok(logp),
        Err(e) => match e.downcast_ref::<ModelError>() {
            Some(model_error) if model_error.is_rejection() => Ok(f64::NEG_INFINITY),
            _ => Err(e),
        },
    }
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
