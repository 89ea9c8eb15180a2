use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rstest::*;

use crate::diagnostics::{
    detailed_balance_deviations, net_fluxes, root_mean_square, simple_cycles, StateLabels,
};
use crate::errors::ModelError;
use crate::substitution_models::{RateMatrix, RateMatrixBuilder};

fn gtr() -> RateMatrix {
    RateMatrixBuilder::new(&[1.0, 2.5, 0.7, 1.3, 3.0, 0.4])
        .frequencies(&[0.1, 0.2, 0.3, 0.4])
        .symmetric(true)
        .build()
        .unwrap()
}

fn nonreversible() -> RateMatrix {
    RateMatrixBuilder::new(&[0.3, 0.2, 0.1, 0.05, 0.4, 0.05, 0.3, 0.1, 0.5, 0.7, 0.2, 0.1])
        .build()
        .unwrap()
}

#[test]
fn four_state_cycles() {
    assert_eq!(
        simple_cycles(4),
        vec![
            vec![0, 1, 2],
            vec![0, 1, 3],
            vec![0, 2, 3],
            vec![1, 2, 3],
            vec![0, 1, 2, 3],
            vec![0, 1, 3, 2],
            vec![0, 2, 1, 3],
        ]
    );
}

#[rstest]
#[case(2, 0)]
#[case(3, 1)]
#[case(4, 7)]
#[case(5, 37)]
fn cycle_counts(#[case] n: usize, #[case] expected: usize) {
    assert_eq!(simple_cycles(n).len(), expected);
}

#[test]
fn reversible_model_is_balanced() {
    let model = gtr();
    let deviations = detailed_balance_deviations(&model);
    assert_eq!(deviations.len(), 6);
    assert_relative_eq!(root_mean_square(&deviations), 0.0, epsilon = 1e-12);
    let fluxes = net_fluxes(&model, &simple_cycles(4));
    assert_eq!(fluxes.len(), 7);
    assert_relative_eq!(root_mean_square(&fluxes), 0.0, epsilon = 1e-12);
}

#[test]
fn nonreversible_model_has_net_flux() {
    let model = nonreversible();
    assert!(root_mean_square(&detailed_balance_deviations(&model)) > 1e-6);
    assert!(root_mean_square(&net_fluxes(&model, &simple_cycles(4))) > 1e-6);
}

#[test]
fn flux_reverses_with_cycle() {
    let model = nonreversible();
    let forward = net_fluxes(&model, &[vec![0, 1, 2]]);
    let backward = net_fluxes(&model, &[vec![0, 2, 1]]);
    assert_relative_eq!(forward[0], -backward[0], epsilon = 1e-12);
}

#[test]
fn rms() {
    assert_relative_eq!(root_mean_square(&[3.0, 4.0]), 12.5_f64.sqrt());
    assert!(root_mean_square(&[]).is_nan());
}

#[test]
fn keys() {
    let labels = StateLabels::new("rates", Some("A C G T"), 4).unwrap();
    assert_eq!(
        labels.pair_keys(),
        ["rates.AC", "rates.AG", "rates.AT", "rates.CG", "rates.CT", "rates.GT"]
    );
    assert_eq!(
        labels.cycle_keys(&simple_cycles(4))[4..],
        ["rates.ACGT", "rates.ACTG", "rates.AGCT"]
    );
    assert_eq!(labels.states().len(), 4);
}

#[test]
fn wrong_number_of_names() {
    let err = StateLabels::new("freq", Some("A C G"), 4).unwrap_err();
    assert_matches!(
        err.downcast_ref::<ModelError>(),
        Some(ModelError::DimensionMismatch(_))
    );
}
