use anyhow::bail;
use log::warn;

use crate::errors::ModelError;
use crate::evolutionary_models::EvoModel;
use crate::substitution_models::{FreqVector, SubstMatrix};
use crate::Result;

/// Set of candidate substitution models with an integer indicator choosing the active one.
/// All candidates must have the same number of states.
#[derive(Clone, Debug)]
pub struct ModelAveraging<M: EvoModel> {
    models: Vec<M>,
    indicator: usize,
}

impl<M: EvoModel> ModelAveraging<M> {
    pub fn new(models: Vec<M>) -> Result<Self> {
        let Some(first) = models.first() else {
            bail!(ModelError::DimensionMismatch(
                "Model averaging needs at least one model".to_string()
            ));
        };
        let n = first.n();
        if let Some(k) = models.iter().position(|m| m.n() != n) {
            bail!(ModelError::DimensionMismatch(format!(
                "Model {} has {} states, model 0 has {}",
                k,
                models[k].n(),
                n
            )));
        }
        Ok(ModelAveraging {
            models,
            indicator: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn indicator(&self) -> usize {
        self.indicator
    }

    /// Selects the active model. Values outside of the model range are clamped to the nearest
    /// valid index.
    pub fn set_indicator(&mut self, indicator: i64) {
        let last = self.models.len() - 1;
        self.indicator = if indicator < 0 {
            warn!("Model indicator {} is below 0, using model 0", indicator);
            0
        } else if indicator as usize > last {
            warn!(
                "Model indicator {} is above {}, using model {}",
                indicator, last, last
            );
            last
        } else {
            indicator as usize
        };
    }

    pub fn active(&self) -> &M {
        &self.models[self.indicator]
    }

    pub fn active_mut(&mut self) -> &mut M {
        &mut self.models[self.indicator]
    }

    pub fn models(&self) -> &[M] {
        &self.models
    }
}

impl<M: EvoModel> EvoModel for ModelAveraging<M> {
    fn q(&self) -> &SubstMatrix {
        self.active().q()
    }

    fn freqs(&self) -> &FreqVector {
        self.active().freqs()
    }

    fn p(&self, time: f64) -> SubstMatrix {
        self.active().p(time)
    }
}

/// Prior that switches between a proper prior and a pseudo prior depending on the model chosen
/// by a model averaging indicator. The proper prior applies while one of `model_indices` is
/// active, the pseudo prior keeps the parameters of inactive models well mixed.
#[derive(Clone, Debug, PartialEq)]
pub struct PseudoPrior {
    model_indices: Vec<usize>,
}

impl PseudoPrior {
    pub fn new(model_indices: &[usize]) -> PseudoPrior {
        PseudoPrior {
            model_indices: model_indices.to_vec(),
        }
    }

    pub fn uses_prior(&self, indicator: usize) -> bool {
        self.model_indices.contains(&indicator)
    }

    /// Evaluates only the density that applies to `indicator`.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::substitution_models::PseudoPrior;
    /// let pseudo = PseudoPrior::new(&[1, 2]);
    /// assert_eq!(pseudo.log_density(2, || Ok(-1.0), || Ok(-5.0)).unwrap(), -1.0);
    /// assert_eq!(pseudo.log_density(0, || Ok(-1.0), || Ok(-5.0)).unwrap(), -5.0);
    /// ```
    pub fn log_density(
        &self,
        indicator: usize,
        prior: impl FnOnce() -> Result<f64>,
        pseudo_prior: impl FnOnce() -> Result<f64>,
    ) -> Result<f64> {
        if self.uses_prior(indicator) {
            prior()
        } else {
            pseudo_prior()
        }
    }
}
