use anyhow::bail;
use log::{error, warn};
use rand::Rng;

use crate::connectivity::{is_strongly_connected, is_well_conditioned, WELL_CONDITIONED_TOLERANCE};
use crate::eigen::{ComplexEigenSystem, EigenSystem};
use crate::errors::{reject_as_neg_infinity, ModelError};
use crate::rate_layout::RateLayout;
use crate::substitution_models::{unnormalised_q, SubstMatrix};
use crate::Result;

pub mod informed_dirichlet;
pub use informed_dirichlet::InformedDirichlet;

pub const DEFAULT_MAX_TRIES: usize = 10_000;
const RATE_SUM_TOLERANCE: f64 = 1e-6;

/// Per-edge activation probabilities p_i = a / (a + exp(−k·ln(L·r_i))) for normalised
/// empirical rates r_i, L = number of edges, scale a and shape k.
///
/// # Example
/// ```
/// use phylo_ctmc::svs::activation_probabilities;
/// let p = activation_probabilities(&[0.25; 4], 1.0, 1.0).unwrap();
/// assert_eq!(p, vec![0.5; 4]);
/// ```
pub fn activation_probabilities(rates: &[f64], scale: f64, shape: f64) -> Result<Vec<f64>> {
    if !(scale > 0.0 && scale.is_finite()) {
        bail!(ModelError::InvalidParameter(format!(
            "Scale must be positive, got {}",
            scale
        )));
    }
    if !(shape > 0.0 && shape.is_finite()) {
        bail!(ModelError::InvalidParameter(format!(
            "Shape must be positive, got {}",
            shape
        )));
    }
    if rates.iter().any(|r| !(r.is_finite() && *r >= 0.0)) {
        bail!(ModelError::InvalidParameter(format!(
            "Empirical rates {:?} must be non-negative",
            rates
        )));
    }
    let total: f64 = rates.iter().sum();
    if (total - 1.0).abs() > RATE_SUM_TOLERANCE {
        bail!(ModelError::InvalidParameter(format!(
            "Empirical rates sum up to {}, not 1",
            total
        )));
    }
    let edges = rates.len() as f64;
    Ok(rates
        .iter()
        .map(|r| scale / (scale + (-shape * (edges * r).ln()).exp()))
        .collect())
}

/// Bernoulli prior on rate indicators restricted to configurations with at least n active
/// edges whose graph is strongly connected.
pub trait IndicatorPrior {
    /// Activation probability of every edge in layout order.
    fn probabilities(&self) -> &[f64];

    fn layout(&self) -> RateLayout;

    /// Number of states.
    fn n(&self) -> usize;

    fn max_tries(&self) -> usize {
        DEFAULT_MAX_TRIES
    }

    /// Log-density of `indicators`, minus infinity for configurations the prior excludes or
    /// when a probability is outside of [0, 1].
    /// Bails with `DimensionMismatch` if the indicators do not fit the prior.
    fn log_density(&self, indicators: &[bool]) -> Result<f64> {
        let probabilities = self.probabilities();
        if indicators.len() != probabilities.len() {
            bail!(ModelError::DimensionMismatch(format!(
                "{} indicators given for {} edges",
                indicators.len(),
                probabilities.len()
            )));
        }
        if !valid_probabilities(probabilities) {
            return Ok(f64::NEG_INFINITY);
        }
        let active = indicators.iter().filter(|&&b| b).count();
        if active < self.n() || !is_strongly_connected(indicators, self.n(), self.layout()) {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(indicators
            .iter()
            .zip(probabilities)
            .map(|(&on, &p)| if on { p.ln() } else { (1.0 - p).ln() })
            .sum())
    }

    /// [`IndicatorPrior::log_density`] gated on the transition probabilities of the gated rate
    /// matrix: minus infinity unless every entry of `transitions` is at least
    /// `WELL_CONDITIONED_TOLERANCE` and below 1.
    ///
    /// # Example
    /// ```
    /// use nalgebra::dmatrix;
    /// use phylo_ctmc::rate_layout::RateLayout;
    /// use phylo_ctmc::svs::{IndicatorPrior, UniformBernoulli};
    /// let prior = UniformBernoulli::new(0.5, 2, RateLayout::Asymmetric).unwrap();
    /// let mixing = dmatrix![0.6, 0.4; 0.3, 0.7];
    /// assert!(prior.conditioned_log_density(&[true, true], &mixing).unwrap().is_finite());
    /// let identity = dmatrix![1.0, 0.0; 0.0, 1.0];
    /// assert_eq!(prior.conditioned_log_density(&[true, true], &identity).unwrap(), f64::NEG_INFINITY);
    /// ```
    fn conditioned_log_density(
        &self,
        indicators: &[bool],
        transitions: &SubstMatrix,
    ) -> Result<f64> {
        let density = self.log_density(indicators)?;
        if !is_well_conditioned(transitions, WELL_CONDITIONED_TOLERANCE) {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(density)
    }

    /// Draws independent Bernoulli indicators until the draw has at least n active edges and a
    /// strongly connected graph.
    /// Bails with `MaxIterationsExceeded` after `max_tries` draws, and with
    /// `InvalidProbability` if a probability is outside of [0, 1].
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<bool>> {
        let probabilities = self.probabilities();
        if !valid_probabilities(probabilities) {
            bail!(ModelError::InvalidProbability(format!(
                "Activation probabilities {:?} must lie in [0, 1]",
                probabilities
            )));
        }
        let max_tries = self.max_tries();
        let report_every = (max_tries / 10).max(1);
        for tries in 1..=max_tries {
            let indicators: Vec<bool> = probabilities
                .iter()
                .map(|&p| rng.gen::<f64>() < p)
                .collect();
            let active = indicators.iter().filter(|&&b| b).count();
            if active >= self.n() && is_strongly_connected(&indicators, self.n(), self.layout()) {
                return Ok(indicators);
            }
            if tries % report_every == 0 && tries < max_tries {
                warn!(
                    "No strongly connected indicators after {} of {} draws, consider a larger scale",
                    tries, max_tries
                );
            }
        }
        error!(
            "Could not sample strongly connected indicators in {} draws",
            max_tries
        );
        bail!(ModelError::MaxIterationsExceeded(format!(
            "{} draws without a strongly connected configuration, adjust the scale or shape",
            max_tries
        )))
    }
}

fn valid_probabilities(probabilities: &[f64]) -> bool {
    probabilities.iter().all(|p| (0.0..=1.0).contains(p))
}

/// Indicator prior informed by empirical rates, see [`activation_probabilities`].
#[derive(Clone, Debug, PartialEq)]
pub struct InformedBernoulli {
    rates: Vec<f64>,
    scale: f64,
    shape: f64,
    layout: RateLayout,
    n: usize,
    max_tries: usize,
    probabilities: Vec<f64>,
}

impl InformedBernoulli {
    /// Prior with scale 1 and shape 1.
    pub fn new(rates: &[f64], layout: RateLayout) -> Result<InformedBernoulli> {
        InformedBernoulliBuilder::new(rates, layout).build()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Changes the scale, the prior is unchanged on failure.
    pub fn set_scale(&mut self, scale: f64) -> Result<()> {
        self.probabilities = activation_probabilities(&self.rates, scale, self.shape)?;
        self.scale = scale;
        Ok(())
    }

    /// Changes the shape, the prior is unchanged on failure.
    pub fn set_shape(&mut self, shape: f64) -> Result<()> {
        self.probabilities = activation_probabilities(&self.rates, self.scale, shape)?;
        self.shape = shape;
        Ok(())
    }
}

impl IndicatorPrior for InformedBernoulli {
    fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    fn layout(&self) -> RateLayout {
        self.layout
    }

    fn n(&self) -> usize {
        self.n
    }

    fn max_tries(&self) -> usize {
        self.max_tries
    }
}

pub struct InformedBernoulliBuilder {
    rates: Vec<f64>,
    layout: RateLayout,
    scale: f64,
    shape: f64,
    max_tries: usize,
}

impl InformedBernoulliBuilder {
    /// # Example
    /// ```
    /// use phylo_ctmc::rate_layout::RateLayout;
    /// use phylo_ctmc::svs::{IndicatorPrior, InformedBernoulliBuilder};
    /// let prior = InformedBernoulliBuilder::new(&[1.0 / 6.0; 6], RateLayout::Symmetric)
    ///     .scale(3.0)
    ///     .shape(2.0)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(prior.n(), 4);
    /// assert!((prior.probabilities()[0] - 0.75).abs() < 1e-12);
    /// ```
    pub fn new(rates: &[f64], layout: RateLayout) -> InformedBernoulliBuilder {
        InformedBernoulliBuilder {
            rates: rates.to_vec(),
            layout,
            scale: 1.0,
            shape: 1.0,
            max_tries: DEFAULT_MAX_TRIES,
        }
    }

    pub fn scale(mut self, scale: f64) -> InformedBernoulliBuilder {
        self.scale = scale;
        self
    }

    pub fn shape(mut self, shape: f64) -> InformedBernoulliBuilder {
        self.shape = shape;
        self
    }

    pub fn max_tries(mut self, max_tries: usize) -> InformedBernoulliBuilder {
        self.max_tries = max_tries;
        self
    }

    /// Bails with `DimensionMismatch` if the rates do not fit the layout, with
    /// `InvalidParameter` for a non-positive scale, shape or retry budget, or for rates that do
    /// not sum up to 1.
    pub fn build(self) -> Result<InformedBernoulli> {
        let n = self.layout.states_for(self.rates.len())?;
        if self.max_tries == 0 {
            bail!(ModelError::InvalidParameter(
                "At least one sampling attempt is needed".to_string()
            ));
        }
        let probabilities = activation_probabilities(&self.rates, self.scale, self.shape)?;
        Ok(InformedBernoulli {
            rates: self.rates,
            scale: self.scale,
            shape: self.shape,
            layout: self.layout,
            n,
            max_tries: self.max_tries,
            probabilities,
        })
    }
}

/// Indicator prior where every edge is active with the same probability.
/// The density is the product of the independent Bernoullis, without the binomial coefficient
/// C(L, k) a prior on the number of active edges would carry.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformBernoulli {
    p: f64,
    layout: RateLayout,
    n: usize,
    max_tries: usize,
    probabilities: Vec<f64>,
}

impl UniformBernoulli {
    pub fn new(p: f64, n: usize, layout: RateLayout) -> Result<UniformBernoulli> {
        if !(0.0..=1.0).contains(&p) {
            bail!(ModelError::InvalidParameter(format!(
                "Activation probability must lie in [0, 1], got {}",
                p
            )));
        }
        if n < 2 {
            bail!(ModelError::DimensionMismatch(format!(
                "Need at least 2 states, got {}",
                n
            )));
        }
        Ok(UniformBernoulli {
            p,
            layout,
            n,
            max_tries: DEFAULT_MAX_TRIES,
            probabilities: vec![p; layout.rate_count(n)],
        })
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> UniformBernoulli {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

impl IndicatorPrior for UniformBernoulli {
    fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    fn layout(&self) -> RateLayout {
        self.layout
    }

    fn n(&self) -> usize {
        self.n
    }

    fn max_tries(&self) -> usize {
        self.max_tries
    }
}

/// Prior that only admits nonreversible rate configurations whose (indicator-gated,
/// unnormalised) rate matrix the eigen system can decompose: log-density 0 if it can, minus
/// infinity otherwise.
#[derive(Clone, Debug)]
pub struct EigenFriendlyPrior {
    eigen_system: Box<dyn EigenSystem>,
}

impl Default for EigenFriendlyPrior {
    fn default() -> Self {
        EigenFriendlyPrior {
            eigen_system: Box::new(ComplexEigenSystem::default()),
        }
    }
}

impl EigenFriendlyPrior {
    pub fn new(eigen_system: Box<dyn EigenSystem>) -> EigenFriendlyPrior {
        EigenFriendlyPrior { eigen_system }
    }

    /// Bails with `DimensionMismatch` if the rates or indicators do not fit an asymmetric matrix.
    pub fn log_density(&self, rates: &[f64], indicators: Option<&[bool]>) -> Result<f64> {
        let q = unnormalised_q(rates, None, indicators, RateLayout::Asymmetric);
        reject_as_neg_infinity(q.and_then(|q| self.eigen_system.decompose(&q)).map(|_| 0.0))
    }
}
