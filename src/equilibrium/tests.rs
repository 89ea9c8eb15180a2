use approx::assert_relative_eq;
use assert_matches::assert_matches;
use nalgebra::dmatrix;
use rstest::*;

use crate::eigen::ComplexEigenSystem;
use crate::equilibrium::{EquilibriumSettings, EquilibriumSolver};
use crate::errors::ModelError;
use crate::evolutionary_models::EvoModel;
use crate::substitution_models::{FreqVector, SubstMatrix};

fn nonreversible_q() -> SubstMatrix {
    dmatrix![
        -0.6, 0.3, 0.2, 0.1;
        0.05, -0.5, 0.4, 0.05;
        0.3, 0.1, -0.9, 0.5;
        0.7, 0.2, 0.1, -1.0
    ]
}

fn cyclic_q() -> SubstMatrix {
    dmatrix![
        -1.0, 1.0, 0.0;
        0.0, -2.0, 2.0;
        0.5, 0.0, -0.5
    ]
}

/// Left null vector of q, normalised to sum to 1.
fn reference_stationary(q: &SubstMatrix) -> FreqVector {
    let svd = q.transpose().svd(false, true);
    let v_t = svd.v_t.unwrap();
    let (k, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .unwrap();
    let v = v_t.row(k).transpose();
    let sum = v.sum();
    v / sum
}

#[rstest]
#[case::four_states(nonreversible_q())]
#[case::cycle(cyclic_q())]
fn recovers_stationary_distribution(#[case] q: SubstMatrix) {
    let freqs = EquilibriumSolver::default().equilibrium(&q).unwrap();
    assert_relative_eq!(freqs.sum(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(freqs, reference_stationary(&q), epsilon = 1e-5);
}

#[rstest]
#[case::four_states(nonreversible_q())]
#[case::cycle(cyclic_q())]
fn stationary_is_fixed_point(#[case] q: SubstMatrix, #[values(0.01, 0.1, 1.0)] dt: f64) {
    let freqs = EquilibriumSolver::default().equilibrium(&q).unwrap();
    let moved = (freqs.transpose() * (q.clone() * dt).exp()).transpose();
    assert_relative_eq!(moved, freqs, epsilon = 1e-5);
}

#[test]
fn cyclic_stationary_values() {
    // pi Q = 0 for the 3-cycle gives pi proportional to (1/1, 1/2, 1/0.5)
    let freqs = EquilibriumSolver::default().equilibrium(&cyclic_q()).unwrap();
    let expected = FreqVector::from_column_slice(&[1.0, 0.5, 2.0]) / 3.5;
    assert_relative_eq!(freqs, expected, epsilon = 1e-6);
}

#[test]
fn complex_spectrum_converges() {
    let q = dmatrix![
        -1.0, 1.0, 0.0;
        0.0, -1.0, 1.0;
        1.0, 0.0, -1.0
    ];
    let freqs = EquilibriumSolver::default().equilibrium(&q).unwrap();
    assert_relative_eq!(
        freqs,
        FreqVector::from_column_slice(&[1.0 / 3.0; 3]),
        epsilon = 1e-6
    );
}

#[test]
fn reducible_matrix_not_reached() {
    // two closed classes {0, 1} and {2, 3}
    let q = dmatrix![
        -1.0, 1.0, 0.0, 0.0;
        1.0, -1.0, 0.0, 0.0;
        0.0, 0.0, -2.0, 2.0;
        0.0, 0.0, 2.0, -2.0
    ];
    let settings = EquilibriumSettings::default().initial_time(1.0).max_time(1e3);
    let solver = EquilibriumSolver::new(Box::new(ComplexEigenSystem::default()), settings).unwrap();
    assert_matches!(
        solver.equilibrium(&q).unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::EquilibriumNotReached(_))
    );
}

#[test]
fn reducible_matrix_tolerated() {
    let q = dmatrix![
        -1.0, 1.0, 0.0, 0.0;
        1.0, -1.0, 0.0, 0.0;
        0.0, 0.0, -2.0, 2.0;
        0.0, 0.0, 2.0, -2.0
    ];
    let settings = EquilibriumSettings::default()
        .initial_time(1.0)
        .max_time(1e3)
        .allow_unconverged(true);
    let solver = EquilibriumSolver::new(Box::new(ComplexEigenSystem::default()), settings).unwrap();
    let freqs = solver.equilibrium(&q).unwrap();
    assert_relative_eq!(
        freqs,
        FreqVector::from_column_slice(&[0.5, 0.5, 0.0, 0.0]),
        epsilon = 1e-6
    );
}

#[test]
fn tied_rate_generator_reaches_equilibrium() {
    // 0→1, 0→2, 1→2, 2→0 at unit rates
    let q = dmatrix![
        -2.0, 1.0, 1.0;
        0.0, -1.0, 1.0;
        1.0, 0.0, -1.0
    ];
    let freqs = EquilibriumSolver::default().equilibrium(&q).unwrap();
    assert_relative_eq!(
        freqs,
        FreqVector::from_column_slice(&[0.25, 0.25, 0.5]),
        epsilon = 1e-6
    );
    assert_relative_eq!(freqs, reference_stationary(&q), epsilon = 1e-6);
}

#[test]
fn tied_rate_transition_probabilities() {
    let q = dmatrix![
        -2.0, 1.0, 1.0;
        0.0, -1.0, 1.0;
        1.0, 0.0, -1.0
    ];
    let p = EquilibriumSolver::default()
        .transition_probabilities(&q, 0.3)
        .unwrap();
    assert_relative_eq!(p, (q * 0.3).exp(), epsilon = 1e-8);
}

#[test]
fn non_finite_generator_is_not_retried() {
    let q = dmatrix![
        -1.0, 1.0;
        f64::NAN, 0.0
    ];
    let err = EquilibriumSolver::default().equilibrium(&q).unwrap_err();
    assert_matches!(
        err.downcast_ref::<ModelError>(),
        Some(ModelError::EigenDecomposition(_))
    );
}

#[rstest]
#[case::zero_time(EquilibriumSettings::default().initial_time(0.0))]
#[case::no_growth(EquilibriumSettings::default().growth(1.0))]
#[case::zero_tolerance(EquilibriumSettings::default().tolerance(0.0))]
#[case::cap_below_start(EquilibriumSettings::default().max_time(1.0))]
fn invalid_settings(#[case] settings: EquilibriumSettings) {
    let result = EquilibriumSolver::new(Box::new(ComplexEigenSystem::default()), settings);
    assert_matches!(
        result.unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::InvalidParameter(_))
    );
}

#[test]
fn transition_probabilities_match_exponential() {
    let q = nonreversible_q();
    let p = EquilibriumSolver::default()
        .transition_probabilities(&q, 0.7)
        .unwrap();
    assert_relative_eq!(p, (q * 0.7).exp(), epsilon = 1e-8);
}

struct FixedModel {
    q: SubstMatrix,
    freqs: FreqVector,
}

impl EvoModel for FixedModel {
    fn q(&self) -> &SubstMatrix {
        &self.q
    }

    fn freqs(&self) -> &FreqVector {
        &self.freqs
    }
}

#[test]
fn stationary_from_model_transitions() {
    let model = FixedModel {
        q: cyclic_q(),
        freqs: FreqVector::from_column_slice(&[1.0, 0.5, 2.0]) / 3.5,
    };
    let settings = EquilibriumSettings::default().initial_time(10.0);
    let solver = EquilibriumSolver::new(Box::new(ComplexEigenSystem::default()), settings).unwrap();
    let freqs = solver.stationary_from_transitions(&model).unwrap();
    assert_relative_eq!(freqs, model.freqs().clone(), epsilon = 1e-5);
}
