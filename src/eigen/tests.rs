use approx::assert_relative_eq;
use assert_matches::assert_matches;
use nalgebra::{dmatrix, dvector};
use rstest::*;

use crate::eigen::{ComplexEigenSystem, EigenDecomposition, EigenSystem};
use crate::errors::ModelError;
use crate::substitution_models::SubstMatrix;

fn uniform_q() -> SubstMatrix {
    dmatrix![
        -3.0, 1.0, 1.0, 1.0;
        1.0, -3.0, 1.0, 1.0;
        1.0, 1.0, -3.0, 1.0;
        1.0, 1.0, 1.0, -3.0
    ]
}

fn cyclic_q() -> SubstMatrix {
    dmatrix![
        -1.0, 1.0, 0.0;
        0.0, -1.0, 1.0;
        1.0, 0.0, -1.0
    ]
}

fn skewed_q() -> SubstMatrix {
    dmatrix![
        -0.6, 0.3, 0.2, 0.1;
        0.05, -0.5, 0.4, 0.05;
        0.3, 0.1, -0.9, 0.5;
        0.7, 0.2, 0.1, -1.0
    ]
}

#[test]
fn uniform_real_spectrum() {
    let eigen = ComplexEigenSystem::default().decompose(&uniform_q()).unwrap();
    assert!(!eigen.is_complex());
    let mut values: Vec<f64> = eigen.values_re().iter().copied().collect();
    values.sort_by(|a, b| a.total_cmp(b));
    crate::assert_float_relative_slice_eq(&values, &[-4.0, -4.0, -4.0, 0.0], 1e-8);
}

#[test]
fn cyclic_complex_pair() {
    let eigen = ComplexEigenSystem::default().decompose(&cyclic_q()).unwrap();
    assert!(eigen.is_complex());
    let mut im: Vec<f64> = eigen.values_im().iter().copied().collect();
    im.sort_by(|a, b| a.total_cmp(b));
    let half_root3 = 3.0_f64.sqrt() / 2.0;
    crate::assert_float_relative_slice_eq(&im, &[-half_root3, 0.0, half_root3], 1e-8);
    for (re, im) in eigen.values_re().iter().zip(eigen.values_im().iter()) {
        if *im == 0.0 {
            assert_relative_eq!(*re, 0.0, epsilon = 1e-8);
        } else {
            assert_relative_eq!(*re, -1.5, epsilon = 1e-8);
        }
    }
}

#[test]
fn fast_complex_pair_scales_tolerance() {
    // |λ| = 200·sqrt(3) for the conjugate pair
    let q = cyclic_q() * 200.0;
    let eigen = ComplexEigenSystem::default().decompose(&q).unwrap();
    assert!(eigen.is_complex());
    assert_relative_eq!(eigen.exp(0.002), (q * 0.002).exp(), epsilon = 1e-8);
}

#[rstest]
#[case::uniform(uniform_q())]
#[case::cyclic(cyclic_q())]
#[case::skewed(skewed_q())]
fn exp_matches_matrix_exponential(
    #[case] q: SubstMatrix,
    #[values(0.0, 0.1, 1.0, 3.5)] t: f64,
) {
    let eigen = ComplexEigenSystem::default().decompose(&q).unwrap();
    let p = eigen.exp(t);
    let expected = (q.clone() * t).exp();
    assert_relative_eq!(p, expected, epsilon = 1e-8);
    for row in p.row_iter() {
        assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-8);
    }
}

#[rstest]
#[case::uniform(uniform_q())]
#[case::cyclic(cyclic_q())]
#[case::skewed(skewed_q())]
fn inverse_vectors_invert(#[case] q: SubstMatrix) {
    let eigen = ComplexEigenSystem::default().decompose(&q).unwrap();
    let n = eigen.n();
    assert_relative_eq!(
        eigen.inverse_vectors() * eigen.vectors(),
        SubstMatrix::identity(n, n),
        epsilon = 1e-8
    );
}

#[test]
fn defective_matrix_fails() {
    let q = dmatrix![
        -1.0, 1.0, 0.0;
        0.0, -1.0, 1.0;
        0.0, 0.0, 0.0
    ];
    let result = ComplexEigenSystem::default().decompose(&q);
    assert_matches!(
        result.unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::EigenDecomposition(_))
    );
}

#[test]
fn non_finite_matrix_fails() {
    let mut q = uniform_q();
    q[(1, 2)] = f64::NAN;
    let result = ComplexEigenSystem::default().decompose(&q);
    assert_matches!(
        result.unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::EigenDecomposition(_))
    );
}

#[test]
fn non_square_matrix_fails() {
    let q = SubstMatrix::zeros(2, 3);
    let result = ComplexEigenSystem::default().decompose(&q);
    assert_matches!(
        result.unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::DimensionMismatch(_))
    );
}

#[test]
fn decomposition_shape_checked() {
    let result = EigenDecomposition::new(
        dvector![0.0, -1.0],
        dvector![0.0],
        SubstMatrix::identity(2, 2),
        SubstMatrix::identity(2, 2),
    );
    assert_matches!(
        result.unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::DimensionMismatch(_))
    );
}

#[test]
fn diagonal_decomposition_exp() {
    let eigen = EigenDecomposition::new(
        dvector![0.0, -2.0],
        dvector![0.0, 0.0],
        SubstMatrix::identity(2, 2),
        SubstMatrix::identity(2, 2),
    )
    .unwrap();
    let p = eigen.exp(0.5);
    assert_relative_eq!(p, dmatrix![1.0, 0.0; 0.0, (-1.0_f64).exp()]);
}

#[test]
fn boxed_system_clones() {
    let system: Box<dyn EigenSystem> = Box::new(ComplexEigenSystem::new(1e-10, 500));
    let copy = system.clone();
    let a = system.decompose(&cyclic_q()).unwrap();
    let b = copy.decompose(&cyclic_q()).unwrap();
    assert_eq!(a, b);
}
