use anyhow::bail;
use log::{debug, error, warn};

use crate::eigen::{ComplexEigenSystem, EigenSystem};
use crate::errors::ModelError;
use crate::evolutionary_models::EvoModel;
use crate::substitution_models::{FreqVector, SubstMatrix};
use crate::Result;

/// Time schedule of the equilibrium search. The search evaluates exp(Q·t) at `initial_time`,
/// `initial_time·growth`, ... until all rows agree within `tolerance` or t exceeds `max_time`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EquilibriumSettings {
    pub initial_time: f64,
    pub tolerance: f64,
    pub growth: f64,
    pub max_time: f64,
    /// Return the last estimate with a warning instead of failing when `max_time` is hit.
    pub allow_unconverged: bool,
}

impl Default for EquilibriumSettings {
    fn default() -> Self {
        EquilibriumSettings {
            initial_time: 1e4,
            tolerance: 1e-5,
            growth: 10.0,
            max_time: 1e10,
            allow_unconverged: false,
        }
    }
}

impl EquilibriumSettings {
    pub fn initial_time(mut self, initial_time: f64) -> Self {
        self.initial_time = initial_time;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn growth(mut self, growth: f64) -> Self {
        self.growth = growth;
        self
    }

    pub fn max_time(mut self, max_time: f64) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn allow_unconverged(mut self, allow_unconverged: bool) -> Self {
        self.allow_unconverged = allow_unconverged;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.initial_time > 0.0 && self.initial_time.is_finite()) {
            bail!(ModelError::InvalidParameter(format!(
                "Initial time must be positive, got {}",
                self.initial_time
            )));
        }
        if !(self.tolerance > 0.0) {
            bail!(ModelError::InvalidParameter(format!(
                "Tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.growth > 1.0 && self.growth.is_finite()) {
            bail!(ModelError::InvalidParameter(format!(
                "Time growth factor must be greater than 1, got {}",
                self.growth
            )));
        }
        if !(self.max_time >= self.initial_time) {
            bail!(ModelError::InvalidParameter(format!(
                "Maximum time {} is below the initial time {}",
                self.max_time, self.initial_time
            )));
        }
        Ok(())
    }
}

/// Stationary distribution of general (possibly nonreversible) rate matrices, found by
/// evaluating exp(Q·t) at growing times until every row is the same.
#[derive(Clone, Debug)]
pub struct EquilibriumSolver {
    eigen_system: Box<dyn EigenSystem>,
    settings: EquilibriumSettings,
}

impl Default for EquilibriumSolver {
    fn default() -> Self {
        EquilibriumSolver {
            eigen_system: Box::new(ComplexEigenSystem::default()),
            settings: EquilibriumSettings::default(),
        }
    }
}

impl EquilibriumSolver {
    /// Bails with `InvalidParameter` if the time schedule cannot terminate or converge.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::eigen::ComplexEigenSystem;
    /// use phylo_ctmc::equilibrium::{EquilibriumSettings, EquilibriumSolver};
    /// let solver = EquilibriumSolver::new(
    ///     Box::new(ComplexEigenSystem::default()),
    ///     EquilibriumSettings::default().tolerance(1e-6),
    /// )
    /// .unwrap();
    /// assert_eq!(solver.settings().tolerance, 1e-6);
    /// assert!(EquilibriumSolver::new(
    ///     Box::new(ComplexEigenSystem::default()),
    ///     EquilibriumSettings::default().growth(1.0),
    /// )
    /// .is_err());
    /// ```
    pub fn new(eigen_system: Box<dyn EigenSystem>, settings: EquilibriumSettings) -> Result<Self> {
        settings.validate()?;
        Ok(EquilibriumSolver {
            eigen_system,
            settings,
        })
    }

    pub fn settings(&self) -> &EquilibriumSettings {
        &self.settings
    }

    pub fn eigen_system(&self) -> &dyn EigenSystem {
        self.eigen_system.as_ref()
    }

    /// Stationary frequencies of `q`. The matrix is decomposed once and exp(Q·t) is evaluated
    /// in spectral form for every time step. Matrices the eigen system cannot decompose (tied
    /// rates often give defective generators), and spectral estimates that are not stationary,
    /// are retried on the scaling and squaring exponential of nalgebra.
    ///
    /// # Example
    /// ```
    /// use nalgebra::dmatrix;
    /// use phylo_ctmc::equilibrium::EquilibriumSolver;
    /// let q = dmatrix![-1.0, 1.0; 3.0, -3.0];
    /// let freqs = EquilibriumSolver::default().equilibrium(&q).unwrap();
    /// assert!((freqs[0] - 0.75).abs() < 1e-6);
    /// assert!((freqs[1] - 0.25).abs() < 1e-6);
    /// ```
    pub fn equilibrium(&self, q: &SubstMatrix) -> Result<FreqVector> {
        let spectral = self
            .eigen_system
            .decompose(q)
            .and_then(|eigen| self.converge(|time| Ok(eigen.exp(time))));
        match spectral {
            Ok(freqs) if is_stationary(q, &freqs, self.settings.tolerance) => Ok(freqs),
            Ok(_) => {
                debug!("Spectral equilibrium is not stationary, using the direct exponential");
                self.converge(|time| Ok((q * time).exp()))
            }
            Err(e) if decomposition_failed(&e, q) => {
                debug!("{}, using the direct exponential", e);
                self.converge(|time| Ok((q * time).exp()))
            }
            Err(e) => Err(e),
        }
    }

    /// exp(Q·time) through the eigen system, or directly when `q` cannot be decomposed.
    pub fn transition_probabilities(&self, q: &SubstMatrix, time: f64) -> Result<SubstMatrix> {
        match self.eigen_system.decompose(q) {
            Ok(eigen) => Ok(eigen.exp(time)),
            Err(e) if decomposition_failed(&e, q) => Ok((q * time).exp()),
            Err(e) => Err(e),
        }
    }

    /// Stationary frequencies measured from the transition probabilities a model reports,
    /// with the same schedule as [`EquilibriumSolver::equilibrium`].
    pub fn stationary_from_transitions(&self, model: &impl EvoModel) -> Result<FreqVector> {
        self.converge(|time| Ok(model.p(time)))
    }

    fn converge(&self, mut probabilities: impl FnMut(f64) -> Result<SubstMatrix>) -> Result<FreqVector> {
        let settings = &self.settings;
        let mut time = settings.initial_time;
        let mut last = None;
        while time <= settings.max_time {
            let p = probabilities(time)?.map(f64::abs);
            if rows_converged(&p, settings.tolerance) {
                debug!("Equilibrium reached at time {}", time);
                return Ok(p.row(0).transpose());
            }
            debug!("Rows of exp(Qt) still differ at time {}", time);
            last = Some(p.row(0).transpose());
            time *= settings.growth;
        }
        match last {
            Some(freqs) if settings.allow_unconverged => {
                warn!(
                    "Equilibrium not reached by time {}, using the last estimate {:?}",
                    settings.max_time,
                    freqs.as_slice()
                );
                Ok(freqs)
            }
            _ => {
                error!(
                    "Equilibrium not reached by time {}, the rate matrix may be reducible",
                    settings.max_time
                );
                bail!(ModelError::EquilibriumNotReached(format!(
                    "Rows of exp(Qt) differ by more than {} at t = {}",
                    settings.tolerance, settings.max_time
                )))
            }
        }
    }
}

/// Decomposition failures of finite matrices, which the direct exponential can still handle.
fn decomposition_failed(e: &anyhow::Error, q: &SubstMatrix) -> bool {
    matches!(
        e.downcast_ref::<ModelError>(),
        Some(ModelError::EigenDecomposition(_))
    ) && q.iter().all(|x| x.is_finite())
}

/// |πQ| within `tolerance` relative to the largest rate and the number of states.
fn is_stationary(q: &SubstMatrix, freqs: &FreqVector, tolerance: f64) -> bool {
    let flow = (freqs.transpose() * q).amax();
    flow.is_finite() && flow <= tolerance * q.nrows() as f64 * q.amax().max(f64::MIN_POSITIVE)
}

/// True if every row matches row 0 within `tolerance`.
fn rows_converged(p: &SubstMatrix, tolerance: f64) -> bool {
    let first = p.row(0);
    p.row_iter()
        .skip(1)
        .all(|row| row.iter().zip(first.iter()).all(|(a, b)| (a - b).abs() <= tolerance))
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
