use anyhow::bail;
use log::{error, warn};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use statrs::function::gamma::ln_gamma;

use crate::errors::ModelError;
use crate::Result;

const MIN_ENTRY: f64 = 1e-15;
const MIN_SAMPLED_ENTRY: f64 = 1e-6;

/// Dirichlet prior on a rate or frequency vector whose concentrations follow empirical values:
/// α_i = scale · L · c_i / Σc for L entries, so the concentrations sum up to scale · L.
#[derive(Clone, Debug, PartialEq)]
pub struct InformedDirichlet {
    alpha: Vec<f64>,
    scale: f64,
}

impl InformedDirichlet {
    /// Bails with `InvalidParameter` for fewer than two entries, a non-positive scale or a
    /// concentration that is not positive.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::svs::InformedDirichlet;
    /// let prior = InformedDirichlet::new(&[1.0, 3.0], 2.0).unwrap();
    /// assert_eq!(prior.alpha(), &[1.0, 3.0]);
    /// ```
    pub fn new(concentrations: &[f64], scale: f64) -> Result<InformedDirichlet> {
        if concentrations.len() < 2 {
            bail!(ModelError::InvalidParameter(format!(
                "A Dirichlet needs at least two concentrations, got {}",
                concentrations.len()
            )));
        }
        if !(scale > 0.0 && scale.is_finite()) {
            bail!(ModelError::InvalidParameter(format!(
                "Scale must be positive, got {}",
                scale
            )));
        }
        if concentrations.iter().any(|c| !(*c > 0.0 && c.is_finite())) {
            bail!(ModelError::InvalidParameter(format!(
                "Concentrations {:?} must be positive",
                concentrations
            )));
        }
        let total: f64 = concentrations.iter().sum();
        let len = concentrations.len();
        let alpha: Vec<f64> = concentrations
            .iter()
            .map(|c| c / total * scale * len as f64)
            .collect();
        let below_one = alpha.iter().filter(|&&a| a < 1.0).count();
        if below_one > len / 10 {
            warn!(
                "{} of {} concentrations are below 1 after scaling, consider a larger scale than {}",
                below_one, len, scale
            );
        }
        Ok(InformedDirichlet { alpha, scale })
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Log-density of `x` after normalising it to sum up to 1, with the Jacobian of that
    /// normalisation. Minus infinity if an entry is not positive.
    /// Bails with `DimensionMismatch` if `x` has the wrong length.
    pub fn log_density(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.alpha.len() {
            bail!(ModelError::DimensionMismatch(format!(
                "{} values given for {} concentrations",
                x.len(),
                self.alpha.len()
            )));
        }
        if x.iter().any(|v| !(*v > MIN_ENTRY && v.is_finite())) {
            return Ok(f64::NEG_INFINITY);
        }
        let total: f64 = x.iter().sum();
        let alpha_sum: f64 = self.alpha.iter().sum();
        let kernel: f64 = self
            .alpha
            .iter()
            .zip(x)
            .map(|(a, v)| (a - 1.0) * (v / total).ln() - ln_gamma(*a))
            .sum();
        Ok(ln_gamma(alpha_sum) + kernel - (alpha_sum - x.len() as f64) * total.ln())
    }

    /// Normalised Gamma(α_i, 1) draws.
    /// Bails with `InvalidParameter` if more than a tenth of the entries are below 1e-6, as the
    /// scale is then too small for the concentrations.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        let mut draws = Vec::with_capacity(self.alpha.len());
        for &a in &self.alpha {
            let gamma = Gamma::new(a, 1.0).map_err(|e| {
                ModelError::InvalidParameter(format!("No Gamma({}, 1) distribution: {}", a, e))
            })?;
            draws.push(gamma.sample(rng));
        }
        let total: f64 = draws.iter().sum();
        let draws: Vec<f64> = draws.iter().map(|d| d / total).collect();
        let near_zero = draws.iter().filter(|&&d| !(d >= MIN_SAMPLED_ENTRY)).count();
        if near_zero > draws.len() / 10 {
            error!(
                "{} of {} Dirichlet entries are close to zero, increase the scale {}",
                near_zero,
                draws.len(),
                self.scale
            );
            bail!(ModelError::InvalidParameter(format!(
                "{} entries below {} with scale {}",
                near_zero, MIN_SAMPLED_ENTRY, self.scale
            )));
        }
        Ok(draws)
    }
}
