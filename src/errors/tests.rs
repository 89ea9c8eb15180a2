use anyhow::{anyhow, bail};
use assert_matches::assert_matches;

use crate::errors::{reject_as_neg_infinity, ModelError};
use crate::Result;

fn failing(error: ModelError) -> Result<f64> {
    bail!(error)
}

#[test]
fn rejections_become_neg_infinity() {
    for error in [
        ModelError::DegenerateMatrix("row".to_string()),
        ModelError::InvalidProbability("p".to_string()),
        ModelError::NotStronglyConnected("graph".to_string()),
        ModelError::EigenDecomposition("singular".to_string()),
    ] {
        assert!(error.is_rejection());
        assert_eq!(
            reject_as_neg_infinity(failing(error)).unwrap(),
            f64::NEG_INFINITY
        );
    }
}

#[test]
fn fatal_errors_propagate() {
    for error in [
        ModelError::DimensionMismatch("dim".to_string()),
        ModelError::InvalidWeights("weights".to_string()),
        ModelError::MaxIterationsExceeded("tries".to_string()),
        ModelError::EquilibriumNotReached("time".to_string()),
        ModelError::InvalidParameter("shape".to_string()),
    ] {
        assert!(!error.is_rejection());
        let result = reject_as_neg_infinity(failing(error.clone()));
        assert_eq!(result.unwrap_err().downcast_ref::<ModelError>(), Some(&error));
    }
}

#[test]
fn values_pass_through() {
    assert_eq!(reject_as_neg_infinity(Ok(-12.5)).unwrap(), -12.5);
}

#[test]
fn foreign_errors_propagate() {
    let result = reject_as_neg_infinity(Err(anyhow!("unrelated")));
    assert_matches!(result, Err(_));
}

#[test]
fn display_contains_kind_and_message() {
    let error = ModelError::InvalidWeights("sum is 0.9".to_string());
    assert_eq!(error.to_string(), "Invalid weights: sum is 0.9");
}
