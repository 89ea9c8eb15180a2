use std::fmt::{Debug, Display};
use std::str::FromStr;

use anyhow::bail;
use log::{debug, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::errors::ModelError;
use crate::Result;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Numerically stable log(Σ exp(x_i)). Returns minus infinity for an empty slice or when every
/// value is minus infinity.
///
/// # Example
/// ```
/// use phylo_ctmc::mixture::log_sum_exp;
/// assert!((log_sum_exp(&[-1.0, -1.0, -1.0]) - (-1.0 + 3.0_f64.ln())).abs() < 1e-15);
/// assert_eq!(log_sum_exp(&[0.0]), 0.0);
/// assert_eq!(log_sum_exp(&[-1000.0, f64::NEG_INFINITY]), -1000.0);
/// ```
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// How component log-likelihoods are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CombinationMode {
    /// Site mixture: every site is explained by a weighted mixture of the components.
    Mix,
    /// Model averaging: the whole alignment is explained by one of the components.
    Avg,
    /// Model averaging over the components and their site mixture.
    Both,
}

impl FromStr for CombinationMode {
    type Err = anyhow::Error;

    fn from_str(mode: &str) -> Result<Self> {
        match mode.to_lowercase().as_str() {
            "mix" => Ok(CombinationMode::Mix),
            "avg" => Ok(CombinationMode::Avg),
            "both" => Ok(CombinationMode::Both),
            _ => bail!(ModelError::InvalidParameter(format!(
                "Unknown combination mode '{}', expected mix, avg or both",
                mode
            ))),
        }
    }
}

impl Display for CombinationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombinationMode::Mix => write!(f, "mix"),
            CombinationMode::Avg => write!(f, "avg"),
            CombinationMode::Both => write!(f, "both"),
        }
    }
}

/// Non-negative weights summing up to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct MixtureWeights(Vec<f64>);

impl MixtureWeights {
    /// Bails with `InvalidWeights` if a weight is negative or the weights do not sum up to 1
    /// within 1e-6.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::mixture::MixtureWeights;
    /// assert!(MixtureWeights::new(&[0.2, 0.8]).is_ok());
    /// assert!(MixtureWeights::new(&[0.2, 0.7]).is_err());
    /// ```
    pub fn new(weights: &[f64]) -> Result<MixtureWeights> {
        if weights.is_empty() {
            bail!(ModelError::InvalidWeights("No weights given".to_string()));
        }
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            bail!(ModelError::InvalidWeights(format!(
                "Weights {:?} must be non-negative",
                weights
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!(ModelError::InvalidWeights(format!(
                "Weights {:?} sum up to {}, not 1",
                weights, sum
            )));
        }
        Ok(MixtureWeights(weights.to_vec()))
    }

    pub fn uniform(count: usize) -> MixtureWeights {
        MixtureWeights(vec![1.0 / count as f64; count])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn log(&self, i: usize) -> f64 {
        self.0[i].ln()
    }
}

fn weights_or_uniform(weights: Option<&[f64]>, count: usize, name: &str) -> Result<MixtureWeights> {
    match weights {
        None => Ok(MixtureWeights::uniform(count)),
        Some(weights) if weights.len() != count => {
            bail!(ModelError::DimensionMismatch(format!(
                "{} {} weights given, expected {}",
                weights.len(),
                name,
                count
            )))
        }
        Some(weights) => MixtureWeights::new(weights),
    }
}

/// Combines the log-likelihoods of several components in log space.
///
/// Model weights hold one entry per component in `Avg` mode and one more for the site mixture
/// in `Both` mode. Site weights hold one entry per component and are used by `Mix` and `Both`.
/// Missing weights default to uniform.
#[derive(Clone, Debug, PartialEq)]
pub struct MixtureCombiner {
    mode: CombinationMode,
    n_components: usize,
    model_weights: MixtureWeights,
    site_weights: MixtureWeights,
}

impl MixtureCombiner {
    /// Bails with `InvalidWeights` if weights are negative or do not sum up to 1, and with
    /// `DimensionMismatch` if there are no components or the weight counts do not fit.
    pub fn new(
        mode: CombinationMode,
        n_components: usize,
        model_weights: Option<&[f64]>,
        site_weights: Option<&[f64]>,
    ) -> Result<MixtureCombiner> {
        if n_components == 0 {
            bail!(ModelError::DimensionMismatch(
                "Need at least one component".to_string()
            ));
        }
        let model_count = match mode {
            CombinationMode::Avg => n_components,
            CombinationMode::Both => n_components + 1,
            CombinationMode::Mix => {
                if model_weights.is_some() {
                    warn!("Model weights are not used in mix mode, ignoring them");
                }
                1
            }
        };
        let model_weights = match mode {
            CombinationMode::Mix => MixtureWeights::uniform(1),
            _ => weights_or_uniform(model_weights, model_count, "model")?,
        };
        if mode == CombinationMode::Avg && site_weights.is_some() {
            warn!("Site weights are not used in avg mode, ignoring them");
        }
        let site_weights = match mode {
            CombinationMode::Avg => MixtureWeights::uniform(n_components),
            _ => weights_or_uniform(site_weights, n_components, "site")?,
        };
        debug!(
            "Combining {} components in {} mode with model weights {:?} and site weights {:?}",
            n_components,
            mode,
            model_weights.as_slice(),
            site_weights.as_slice()
        );
        Ok(MixtureCombiner {
            mode,
            n_components,
            model_weights,
            site_weights,
        })
    }

    pub fn mode(&self) -> CombinationMode {
        self.mode
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn model_weights(&self) -> &MixtureWeights {
        &self.model_weights
    }

    pub fn site_weights(&self) -> &MixtureWeights {
        &self.site_weights
    }

    /// Whether the combination needs a site mixture log-likelihood.
    pub fn uses_site_mixture(&self) -> bool {
        self.mode != CombinationMode::Avg
    }

    /// Site mixture log-likelihood Σ_j w_j · log Σ_i s_i·exp(ℓ_ij) over patterns j with
    /// multiplicities w_j, components i with site weights s_i and per-pattern log-likelihoods
    /// ℓ_ij (`pattern_log_likelihoods[i][j]`).
    pub fn site_mixture<P: AsRef<[f64]>>(
        &self,
        pattern_log_likelihoods: &[P],
        pattern_weights: &[f64],
    ) -> Result<f64> {
        if pattern_log_likelihoods.len() != self.n_components {
            bail!(ModelError::DimensionMismatch(format!(
                "{} components given pattern log-likelihoods, expected {}",
                pattern_log_likelihoods.len(),
                self.n_components
            )));
        }
        if let Some(i) = pattern_log_likelihoods
            .iter()
            .position(|p| p.as_ref().len() != pattern_weights.len())
        {
            bail!(ModelError::DimensionMismatch(format!(
                "Component {} has {} pattern log-likelihoods for {} patterns",
                i,
                pattern_log_likelihoods[i].as_ref().len(),
                pattern_weights.len()
            )));
        }
        let mut terms = vec![0.0; self.n_components];
        Ok(pattern_weights
            .iter()
            .enumerate()
            .map(|(j, w)| {
                for (i, p) in pattern_log_likelihoods.iter().enumerate() {
                    terms[i] = p.as_ref()[j] + self.site_weights.log(i);
                }
                w * log_sum_exp(&terms)
            })
            .sum())
    }

    /// Weighted terms whose log-sum-exp is the combined log-likelihood: ℓ_i + log w_i for the
    /// averaged components, then the site mixture with its own weight.
    pub fn partial_log_likelihoods(
        &self,
        component_log_likelihoods: &[f64],
        site_mixture: Option<f64>,
    ) -> Result<Vec<f64>> {
        let site_mixture = match (self.uses_site_mixture(), site_mixture) {
            (true, None) => bail!(ModelError::DimensionMismatch(format!(
                "A site mixture log-likelihood is needed in {} mode",
                self.mode
            ))),
            (_, site_mixture) => site_mixture,
        };
        if self.mode != CombinationMode::Mix
            && component_log_likelihoods.len() != self.n_components
        {
            bail!(ModelError::DimensionMismatch(format!(
                "{} component log-likelihoods given, expected {}",
                component_log_likelihoods.len(),
                self.n_components
            )));
        }
        Ok(match (self.mode, site_mixture) {
            (CombinationMode::Mix, Some(site_mixture)) => vec![site_mixture],
            (CombinationMode::Both, Some(site_mixture)) => component_log_likelihoods
                .iter()
                .enumerate()
                .map(|(i, l)| l + self.model_weights.log(i))
                .chain(std::iter::once(
                    site_mixture + self.model_weights.log(self.n_components),
                ))
                .collect(),
            _ => component_log_likelihoods
                .iter()
                .enumerate()
                .map(|(i, l)| l + self.model_weights.log(i))
                .collect(),
        })
    }

    /// Combined log-likelihood. An infinite or NaN input is returned as it is.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::mixture::{CombinationMode, MixtureCombiner};
    /// let avg = MixtureCombiner::new(CombinationMode::Avg, 1, None, None).unwrap();
    /// assert_eq!(avg.combine(&[-12.5], None).unwrap(), -12.5);
    /// ```
    pub fn combine(&self, component_log_likelihoods: &[f64], site_mixture: Option<f64>) -> Result<f64> {
        if let Some(invalid) = component_log_likelihoods
            .iter()
            .chain(site_mixture.iter())
            .find(|l| !l.is_finite())
        {
            return Ok(*invalid);
        }
        Ok(log_sum_exp(
            &self.partial_log_likelihoods(component_log_likelihoods, site_mixture)?,
        ))
    }
}

/// Likelihood of one component model, evaluated by an external tree likelihood.
pub trait ComponentLikelihood: Debug {
    /// True if the parameters changed since the last evaluation.
    fn is_dirty(&self) -> bool;
    fn calculate_log_likelihood(&mut self) -> Result<f64>;
    /// Value of the last evaluation.
    fn current_log_likelihood(&self) -> f64;
    /// Log-likelihood of every site pattern from the last evaluation.
    fn pattern_log_likelihoods(&self) -> &[f64];
}

/// Mixture of component likelihoods over one alignment. Only dirty components are
/// re-evaluated, the others contribute their cached value.
#[derive(Debug)]
pub struct MixedLikelihood {
    components: Vec<Box<dyn ComponentLikelihood>>,
    combiner: MixtureCombiner,
    pattern_weights: Vec<f64>,
    site_patterns: Vec<usize>,
    partials: Vec<f64>,
    log_likelihood: f64,
}

impl MixedLikelihood {
    /// `pattern_weights` are the pattern multiplicities, `site_patterns` the pattern of every
    /// alignment site.
    pub fn new(
        components: Vec<Box<dyn ComponentLikelihood>>,
        combiner: MixtureCombiner,
        pattern_weights: &[f64],
        site_patterns: &[usize],
    ) -> Result<MixedLikelihood> {
        if components.len() != combiner.n_components() {
            bail!(ModelError::DimensionMismatch(format!(
                "{} components given to a combiner of {}",
                components.len(),
                combiner.n_components()
            )));
        }
        if let Some(&pattern) = site_patterns.iter().find(|&&p| p >= pattern_weights.len()) {
            bail!(ModelError::DimensionMismatch(format!(
                "Site pattern {} out of {} patterns",
                pattern,
                pattern_weights.len()
            )));
        }
        Ok(MixedLikelihood {
            components,
            combiner,
            pattern_weights: pattern_weights.to_vec(),
            site_patterns: site_patterns.to_vec(),
            partials: Vec::new(),
            log_likelihood: f64::NEG_INFINITY,
        })
    }

    pub fn combiner(&self) -> &MixtureCombiner {
        &self.combiner
    }

    pub fn components(&self) -> &[Box<dyn ComponentLikelihood>] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Box<dyn ComponentLikelihood>] {
        &mut self.components
    }

    /// Weights of the averaged terms, with the site mixture weight last in `Both` mode.
    pub fn meta_weights(&self) -> &[f64] {
        self.combiner.model_weights().as_slice()
    }

    pub fn current_log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Terms of the last evaluation, see [`MixtureCombiner::partial_log_likelihoods`].
    pub fn partial_log_likelihoods(&self) -> &[f64] {
        &self.partials
    }

    pub fn calculate_log_likelihood(&mut self) -> Result<f64> {
        let mut component_log_likelihoods = Vec::with_capacity(self.components.len());
        for component in self.components.iter_mut() {
            let logl = if component.is_dirty() {
                component.calculate_log_likelihood()?
            } else {
                component.current_log_likelihood()
            };
            if !logl.is_finite() {
                self.partials.clear();
                self.log_likelihood = logl;
                return Ok(logl);
            }
            component_log_likelihoods.push(logl);
        }
        let site_mixture = if self.combiner.uses_site_mixture() {
            let patterns: Vec<&[f64]> = self
                .components
                .iter()
                .map(|c| c.pattern_log_likelihoods())
                .collect();
            Some(self.combiner.site_mixture(&patterns, &self.pattern_weights)?)
        } else {
            None
        };
        self.partials = self
            .combiner
            .partial_log_likelihoods(&component_log_likelihoods, site_mixture)?;
        self.log_likelihood = self.combiner.combine(&component_log_likelihoods, site_mixture)?;
        Ok(self.log_likelihood)
    }

    /// Site mixture log-likelihood of the last evaluation with its meta weight removed.
    /// Bails with `InvalidParameter` in `Avg` mode, which has no site mixture.
    pub fn site_mixture_log_likelihood(&self) -> Result<f64> {
        let index = match self.combiner.mode() {
            CombinationMode::Avg => bail!(ModelError::InvalidParameter(
                "No site mixture in avg mode".to_string()
            )),
            CombinationMode::Mix => 0,
            CombinationMode::Both => self.combiner.n_components(),
        };
        let Some(&partial) = self.partials.get(index) else {
            bail!(ModelError::DimensionMismatch(
                "No finite likelihood has been calculated for the current state".to_string()
            ));
        };
        Ok(match self.combiner.mode() {
            CombinationMode::Both => partial - self.meta_weights()[index].ln(),
            _ => partial,
        })
    }

    /// Posterior probability of every averaged term, proportional to exp(partial). Empty when
    /// the last evaluation was not finite.
    pub fn model_posteriors(&self) -> Vec<f64> {
        normalised_exp(&self.partials)
    }

    /// Posterior probability of every component for every pattern, weighted by the site
    /// weights.
    /// Bails with `DimensionMismatch` if a component does not report one log-likelihood per
    /// pattern.
    pub fn site_model_posteriors(&self) -> Result<Vec<Vec<f64>>> {
        let patterns = self.pattern_weights.len();
        if let Some(i) = self
            .components
            .iter()
            .position(|c| c.pattern_log_likelihoods().len() != patterns)
        {
            bail!(ModelError::DimensionMismatch(format!(
                "Component {} has {} pattern log-likelihoods for {} patterns",
                i,
                self.components[i].pattern_log_likelihoods().len(),
                patterns
            )));
        }
        let site_weights = self.combiner.site_weights().as_slice();
        Ok((0..patterns)
            .map(|j| {
                let terms: Vec<f64> = self
                    .components
                    .iter()
                    .zip(site_weights)
                    .map(|(c, w)| c.pattern_log_likelihoods()[j] + w.ln())
                    .collect();
                normalised_exp(&terms)
            })
            .collect())
    }

    /// Draws the averaged term that explains the alignment from [`Self::model_posteriors`].
    pub fn sample_model<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        let posteriors = self.model_posteriors();
        match WeightedIndex::new(&posteriors) {
            Ok(dist) => Ok(dist.sample(rng)),
            Err(e) => bail!(ModelError::InvalidProbability(format!(
                "Cannot sample from model posteriors {:?}: {}",
                posteriors, e
            ))),
        }
    }

    /// Draws the component explaining every site. If the sampled term is a single component,
    /// every site gets that component; if it is the site mixture, every site is drawn from the
    /// posterior of its pattern. Sites whose pattern posterior does not sum up to 1 get `None`.
    pub fn sample_site_models<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Option<usize>>> {
        let model = self.sample_model(rng)?;
        if self.combiner.mode() != CombinationMode::Mix && model < self.combiner.n_components() {
            return Ok(vec![Some(model); self.site_patterns.len()]);
        }
        let posteriors = self.site_model_posteriors()?;
        Ok(self
            .site_patterns
            .iter()
            .map(|&pattern| {
                let p = &posteriors[pattern];
                if (p.iter().sum::<f64>() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                    return None;
                }
                WeightedIndex::new(p).ok().map(|dist| dist.sample(&mut *rng))
            })
            .collect())
    }
}

fn normalised_exp(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|e| e / sum).collect()
}
