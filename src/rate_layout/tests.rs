use rstest::*;

use crate::errors::ModelError;
use crate::rate_layout::RateLayout::{self, Asymmetric, Symmetric};

#[rstest]
#[case::dna_sym(Symmetric, 4, 6)]
#[case::dna_asym(Asymmetric, 4, 12)]
#[case::protein_sym(Symmetric, 20, 190)]
#[case::protein_asym(Asymmetric, 20, 380)]
#[case::binary(Asymmetric, 2, 2)]
fn rate_counts(#[case] layout: RateLayout, #[case] n: usize, #[case] count: usize) {
    assert_eq!(layout.rate_count(n), count);
    assert_eq!(layout.states_for(count).unwrap(), n);
}

#[rstest]
#[case::sym(Symmetric, 5)]
#[case::asym(Asymmetric, 7)]
#[case::empty(Asymmetric, 0)]
fn states_for_bad_counts(#[case] layout: RateLayout, #[case] count: usize) {
    let result = layout.states_for(count);
    assert!(matches!(
        result.unwrap_err().downcast_ref::<ModelError>(),
        Some(ModelError::DimensionMismatch(_))
    ));
}

#[test]
fn asymmetric_row_major_skip_diagonal() {
    let expected = [
        (0, 1),
        (0, 2),
        (0, 3),
        (1, 0),
        (1, 2),
        (1, 3),
        (2, 0),
        (2, 1),
        (2, 3),
        (3, 0),
        (3, 1),
        (3, 2),
    ];
    for (k, &(i, j)) in expected.iter().enumerate() {
        assert_eq!(Asymmetric.index(i, j, 4), Some(k));
        assert_eq!(Asymmetric.cell(k, 4), Some((i, j)));
    }
}

#[test]
fn symmetric_upper_triangle() {
    let expected = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
    for (k, &(i, j)) in expected.iter().enumerate() {
        assert_eq!(Symmetric.index(i, j, 4), Some(k));
        assert_eq!(Symmetric.index(j, i, 4), Some(k));
        assert_eq!(Symmetric.cell(k, 4), Some((i, j)));
    }
}

#[rstest]
fn diagonal_and_out_of_range(#[values(Symmetric, Asymmetric)] layout: RateLayout) {
    assert_eq!(layout.index(2, 2, 4), None);
    assert_eq!(layout.index(0, 4, 4), None);
    assert_eq!(layout.cell(layout.rate_count(4), 4), None);
}

#[rstest]
fn index_cell_inverse(
    #[values(Symmetric, Asymmetric)] layout: RateLayout,
    #[values(2, 3, 4, 7, 20)] n: usize,
) {
    let cells: Vec<_> = layout.cells(n).collect();
    assert_eq!(cells.len(), layout.rate_count(n));
    for (k, (i, j)) in cells {
        assert_eq!(layout.index(i, j, n), Some(k));
    }
}
