use std::fmt::Debug;

use anyhow::bail;
use dyn_clone::DynClone;
use log::debug;
use nalgebra::{Complex, DMatrix, DVector};

use crate::errors::ModelError;
use crate::substitution_models::SubstMatrix;
use crate::Result;

/// Real eigen decomposition Q = V·Λ·V⁻¹ of a (possibly nonsymmetric) rate matrix.
///
/// Complex-conjugate eigenvalues a ± bi occupy two consecutive slots, `+b` first and `-b`
/// second, and the matching columns of `vectors` hold the real and the imaginary part of the
/// eigenvector of a + bi. Real eigenvalues have a zero imaginary part.
#[derive(Clone, Debug, PartialEq)]
pub struct EigenDecomposition {
    values_re: DVector<f64>,
    values_im: DVector<f64>,
    vectors: SubstMatrix,
    inverse_vectors: SubstMatrix,
}

impl EigenDecomposition {
    pub fn new(
        values_re: DVector<f64>,
        values_im: DVector<f64>,
        vectors: SubstMatrix,
        inverse_vectors: SubstMatrix,
    ) -> Result<Self> {
        let n = values_re.len();
        if values_im.len() != n
            || vectors.shape() != (n, n)
            || inverse_vectors.shape() != (n, n)
        {
            bail!(ModelError::DimensionMismatch(format!(
                "Eigen decomposition of {} values has {} imaginary parts, {:?} eigenvectors and {:?} inverse eigenvectors",
                n,
                values_im.len(),
                vectors.shape(),
                inverse_vectors.shape()
            )));
        }
        Ok(EigenDecomposition {
            values_re,
            values_im,
            vectors,
            inverse_vectors,
        })
    }

    pub fn n(&self) -> usize {
        self.values_re.len()
    }

    pub fn values_re(&self) -> &DVector<f64> {
        &self.values_re
    }

    pub fn values_im(&self) -> &DVector<f64> {
        &self.values_im
    }

    pub fn vectors(&self) -> &SubstMatrix {
        &self.vectors
    }

    pub fn inverse_vectors(&self) -> &SubstMatrix {
        &self.inverse_vectors
    }

    pub fn is_complex(&self) -> bool {
        self.values_im.iter().any(|&b| b != 0.0)
    }

    /// Spectral form of exp(Q·t). Real eigenvalues contribute exp(λt) to their row of V⁻¹,
    /// conjugate pairs a ± bi rotate their two rows by exp(at)·[cos(bt), sin(bt); −sin(bt), cos(bt)].
    pub fn exp(&self, t: f64) -> SubstMatrix {
        let n = self.n();
        let mut iexp = SubstMatrix::zeros(n, n);
        let mut i = 0;
        while i < n {
            let b = self.values_im[i];
            if b == 0.0 || i + 1 == n {
                let scale = (self.values_re[i] * t).exp();
                iexp.set_row(i, &self.inverse_vectors.row(i).scale(scale));
                i += 1;
            } else {
                let expat = (self.values_re[i] * t).exp();
                let expat_cos = expat * (b * t).cos();
                let expat_sin = expat * (b * t).sin();
                let row = self.inverse_vectors.row(i);
                let row_pair = self.inverse_vectors.row(i + 1);
                iexp.set_row(i, &(row.scale(expat_cos) + row_pair.scale(expat_sin)));
                iexp.set_row(i + 1, &(row_pair.scale(expat_cos) - row.scale(expat_sin)));
                i += 2;
            }
        }
        &self.vectors * iexp
    }
}

/// Dense eigen solver for square real matrices with real or complex-conjugate spectra.
pub trait EigenSystem: Debug + DynClone + Send + Sync {
    fn decompose(&self, q: &SubstMatrix) -> Result<EigenDecomposition>;
}

dyn_clone::clone_trait_object!(EigenSystem);

/// Eigen solver built on nalgebra. Eigenvalues come from the real Schur form, eigenvectors from
/// the null space of (Q − λI), taking as many right singular vectors as the multiplicity of λ.
/// Fails with `EigenDecomposition` when the eigenvectors do not form an invertible basis, which
/// happens for defective matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComplexEigenSystem {
    /// Relative distance under which eigenvalues are treated as equal, and imaginary parts as 0.
    tolerance: f64,
    max_iterations: usize,
}

impl Default for ComplexEigenSystem {
    fn default() -> Self {
        ComplexEigenSystem {
            tolerance: 1e-8,
            max_iterations: 10_000,
        }
    }
}

impl ComplexEigenSystem {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        ComplexEigenSystem {
            tolerance,
            max_iterations,
        }
    }

    fn real_null_space(&self, q: &SubstMatrix, lambda: f64, dim: usize) -> Result<Vec<DVector<f64>>> {
        let mut shifted = q.clone();
        for i in 0..q.nrows() {
            shifted[(i, i)] -= lambda;
        }
        let Some(svd) = shifted.try_svd(false, true, f64::EPSILON, self.max_iterations) else {
            bail!(ModelError::EigenDecomposition(format!(
                "SVD did not converge for eigenvalue {}",
                lambda
            )));
        };
        let Some(v_t) = svd.v_t else {
            bail!(ModelError::EigenDecomposition(
                "SVD did not return right singular vectors".to_string()
            ));
        };
        Ok(smallest_first(&svd.singular_values)
            .into_iter()
            .take(dim)
            .map(|k| v_t.row(k).transpose())
            .collect())
    }

    fn complex_null_space(
        &self,
        q: &SubstMatrix,
        lambda: Complex<f64>,
        dim: usize,
    ) -> Result<Vec<DVector<Complex<f64>>>> {
        let mut shifted: DMatrix<Complex<f64>> = q.map(|x| Complex::new(x, 0.0));
        for i in 0..q.nrows() {
            shifted[(i, i)] -= lambda;
        }
        let Some(svd) = shifted.try_svd(false, true, f64::EPSILON, self.max_iterations) else {
            bail!(ModelError::EigenDecomposition(format!(
                "SVD did not converge for eigenvalue {}",
                lambda
            )));
        };
        let Some(v_t) = svd.v_t else {
            bail!(ModelError::EigenDecomposition(
                "SVD did not return right singular vectors".to_string()
            ));
        };
        Ok(smallest_first(&svd.singular_values)
            .into_iter()
            .take(dim)
            .map(|k| v_t.row(k).adjoint())
            .collect())
    }
}

/// Real block diagonal form of the eigenvalues, 2×2 blocks [a, b; −b, a] for conjugate pairs.
fn block_diagonal(values_re: &[f64], values_im: &[f64]) -> SubstMatrix {
    let n = values_re.len();
    let mut lambda = SubstMatrix::zeros(n, n);
    let mut i = 0;
    while i < n {
        lambda[(i, i)] = values_re[i];
        if values_im[i] != 0.0 && i + 1 < n {
            lambda[(i + 1, i + 1)] = values_re[i + 1];
            lambda[(i, i + 1)] = values_im[i];
            lambda[(i + 1, i)] = -values_im[i];
            i += 2;
        } else {
            i += 1;
        }
    }
    lambda
}

fn smallest_first(singular_values: &DVector<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..singular_values.len()).collect();
    order.sort_by(|&a, &b| singular_values[a].total_cmp(&singular_values[b]));
    order
}

impl EigenSystem for ComplexEigenSystem {
    fn decompose(&self, q: &SubstMatrix) -> Result<EigenDecomposition> {
        let n = q.nrows();
        if n == 0 || q.ncols() != n {
            bail!(ModelError::DimensionMismatch(format!(
                "Can only decompose non-empty square matrices, got {}x{}",
                q.nrows(),
                q.ncols()
            )));
        }
        if q.iter().any(|x| !x.is_finite()) {
            bail!(ModelError::EigenDecomposition(
                "Matrix has non-finite entries".to_string()
            ));
        }
        let Some(schur) = q.clone().try_schur(f64::EPSILON, self.max_iterations) else {
            bail!(ModelError::EigenDecomposition(
                "Schur decomposition did not converge".to_string()
            ));
        };
        let values = schur.complex_eigenvalues();
        let scale = values.iter().map(|v| v.norm_sqr().sqrt()).fold(1.0, f64::max);
        let tol = self.tolerance * scale;

        let mut values_re = Vec::with_capacity(n);
        let mut values_im = Vec::with_capacity(n);
        let mut columns: Vec<DVector<f64>> = Vec::with_capacity(n);
        let mut used = vec![false; n];
        for i in 0..n {
            if used[i] {
                continue;
            }
            let lambda = values[i];
            if lambda.im.abs() <= tol {
                let group: Vec<usize> = (i..n)
                    .filter(|&j| {
                        !used[j]
                            && values[j].im.abs() <= tol
                            && (values[j].re - lambda.re).abs() <= tol
                    })
                    .collect();
                let a = group.iter().map(|&j| values[j].re).sum::<f64>() / group.len() as f64;
                group.iter().for_each(|&j| used[j] = true);
                for vector in self.real_null_space(q, a, group.len())? {
                    values_re.push(a);
                    values_im.push(0.0);
                    columns.push(vector);
                }
            } else {
                let b = lambda.im.abs();
                let group: Vec<usize> = (i..n)
                    .filter(|&j| {
                        !used[j]
                            && values[j].im.abs() > tol
                            && (values[j].re - lambda.re).abs() <= tol
                            && (values[j].im.abs() - b).abs() <= tol
                    })
                    .collect();
                if group.len() % 2 != 0 {
                    bail!(ModelError::EigenDecomposition(format!(
                        "Complex eigenvalue {} has no conjugate",
                        lambda
                    )));
                }
                let a = group.iter().map(|&j| values[j].re).sum::<f64>() / group.len() as f64;
                let b = group.iter().map(|&j| values[j].im.abs()).sum::<f64>() / group.len() as f64;
                group.iter().for_each(|&j| used[j] = true);
                for vector in self.complex_null_space(q, Complex::new(a, b), group.len() / 2)? {
                    values_re.push(a);
                    values_im.push(b);
                    columns.push(vector.map(|c| c.re));
                    values_re.push(a);
                    values_im.push(-b);
                    columns.push(vector.map(|c| c.im));
                }
            }
        }
        if columns.len() != n {
            bail!(ModelError::EigenDecomposition(format!(
                "Found {} eigenvectors for a {}x{} matrix",
                columns.len(),
                n,
                n
            )));
        }

        let vectors = SubstMatrix::from_columns(&columns);
        let residual = (q * &vectors - &vectors * block_diagonal(&values_re, &values_im)).amax();
        if !residual.is_finite() || residual > 1e-6 * scale {
            bail!(ModelError::EigenDecomposition(format!(
                "Eigenvectors do not span the matrix, |QV − VΛ| = {}",
                residual
            )));
        }
        let Some(inverse_vectors) = vectors.clone().try_inverse() else {
            bail!(ModelError::EigenDecomposition(
                "Eigenvectors are linearly dependent, the matrix is defective".to_string()
            ));
        };
        let identity_error = (&inverse_vectors * &vectors - SubstMatrix::identity(n, n)).amax();
        if !identity_error.is_finite() || identity_error > 1e-6 {
            bail!(ModelError::EigenDecomposition(format!(
                "Eigenvector basis is ill-conditioned, |V⁻¹V − I| = {}",
                identity_error
            )));
        }
        debug!(
            "Decomposed {}x{} matrix, eigenvalues {:?} + {:?}i",
            n,
            n,
            values_re,
            values_im
        );
        EigenDecomposition::new(
            DVector::from_vec(values_re),
            DVector::from_vec(values_im),
            vectors,
            inverse_vectors,
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
