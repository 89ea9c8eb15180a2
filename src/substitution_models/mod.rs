use nalgebra::{DMatrix, DVector};

pub mod empirical_models;
pub mod model_averaging;
pub mod rate_matrix;

pub use empirical_models::{EmpiricalModel, AMINO_ACIDS};
pub use model_averaging::{ModelAveraging, PseudoPrior};
pub use rate_matrix::{
    check_degenerate, normalise, unnormalised_q, RateMatrix, RateMatrixBuilder,
};

pub type SubstMatrix = DMatrix<f64>;
pub type FreqVector = DVector<f64>;

#[macro_export]
macro_rules! frequencies {
    ($slice:expr) => {
        $crate::substitution_models::FreqVector::from_column_slice($slice)
    };
}
