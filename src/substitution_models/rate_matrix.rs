use anyhow::bail;
use log::{info, warn};

use crate::connectivity::{check_connected, support};
use crate::equilibrium::EquilibriumSolver;
use crate::errors::ModelError;
use crate::evolutionary_models::{EvoModel, Reversibility};
use crate::rate_layout::RateLayout;
use crate::substitution_models::{FreqVector, SubstMatrix};
use crate::Result;

const FREQUENCY_SUM_TOLERANCE: f64 = 1e-6;

/// Fills the off-diagonal cells of an n×n rate matrix from `rates`, n is inferred from the
/// number of rates and the layout. Inactive indicators zero their cell(s).
///
/// * Symmetric: cell (i, j) is `rate[k]·f[j]`, its mirror (j, i) is `rate[k]·f[i]`; frequencies
///   are required.
/// * Asymmetric: cell (i, j) is `rate[k]`; frequencies are not used.
///
/// Diagonal cells are minus the sum of the rest of their row.
pub fn unnormalised_q(
    rates: &[f64],
    frequencies: Option<&FreqVector>,
    indicators: Option<&[bool]>,
    layout: RateLayout,
) -> Result<SubstMatrix> {
    let n = layout.states_for(rates.len())?;
    if let Some(indicators) = indicators {
        if indicators.len() != rates.len() {
            bail!(ModelError::DimensionMismatch(format!(
                "{} indicators given for {} rates",
                indicators.len(),
                rates.len()
            )));
        }
    }
    if let Some(k) = rates.iter().position(|r| !(r.is_finite() && *r >= 0.0)) {
        bail!(ModelError::DegenerateMatrix(format!(
            "Rate {} is {}, rates must be finite and non-negative",
            k, rates[k]
        )));
    }
    let active = |k: usize| indicators.map_or(true, |ind| ind[k]);

    let mut q = SubstMatrix::zeros(n, n);
    match layout {
        RateLayout::Symmetric => {
            let Some(freqs) = frequencies else {
                bail!(ModelError::DimensionMismatch(format!(
                    "Symmetric rate matrices need {} frequencies, none given",
                    n
                )));
            };
            if freqs.len() != n {
                bail!(ModelError::DimensionMismatch(format!(
                    "{} frequencies given for {} states",
                    freqs.len(),
                    n
                )));
            }
            for (k, (i, j)) in layout.cells(n).filter(|&(k, _)| active(k)) {
                q[(i, j)] = rates[k] * freqs[j];
                q[(j, i)] = rates[k] * freqs[i];
            }
        }
        RateLayout::Asymmetric => {
            for (k, (i, j)) in layout.cells(n).filter(|&(k, _)| active(k)) {
                q[(i, j)] = rates[k];
            }
        }
    }
    for i in 0..n {
        let row_sum = q.row(i).sum();
        q[(i, i)] = -row_sum;
    }
    Ok(q)
}

/// Bails with `DegenerateMatrix` if a state has no outgoing rate or no incoming rate.
pub fn check_degenerate(q: &SubstMatrix) -> Result<()> {
    for i in 0..q.nrows() {
        if q[(i, i)] == 0.0 {
            bail!(ModelError::DegenerateMatrix(format!(
                "State {} has no outgoing rates",
                i
            )));
        }
        let inflow = q.column(i).sum() - q[(i, i)];
        if inflow == 0.0 {
            bail!(ModelError::DegenerateMatrix(format!(
                "State {} has no incoming rates",
                i
            )));
        }
    }
    Ok(())
}

/// Scales `q` to one expected substitution per unit time under `freqs`.
pub fn normalise(q: &mut SubstMatrix, freqs: &FreqVector) -> Result<()> {
    let subst = -q.diagonal().dot(freqs);
    if !(subst.is_finite() && subst > 0.0) {
        bail!(ModelError::DegenerateMatrix(format!(
            "Expected substitution rate is {}, cannot normalise",
            subst
        )));
    }
    *q /= subst;
    Ok(())
}

fn check_frequencies(freqs: &FreqVector) -> Result<()> {
    if freqs.iter().any(|f| !(f.is_finite() && *f >= 0.0)) {
        bail!(ModelError::InvalidProbability(format!(
            "Frequencies {:?} must be non-negative",
            freqs.as_slice()
        )));
    }
    if (freqs.sum() - 1.0).abs() > FREQUENCY_SUM_TOLERANCE {
        bail!(ModelError::InvalidProbability(format!(
            "Frequencies sum up to {}, not 1",
            freqs.sum()
        )));
    }
    Ok(())
}

/// Builds a normalised rate matrix and its stationary frequencies. Rejects degenerate and
/// disconnected matrices before any frequencies are computed.
fn assemble(
    rates: &[f64],
    frequencies: Option<&FreqVector>,
    indicators: Option<&[bool]>,
    layout: RateLayout,
    solver: &EquilibriumSolver,
) -> Result<(SubstMatrix, FreqVector)> {
    let mut q = unnormalised_q(rates, frequencies, indicators, layout)?;
    check_degenerate(&q)?;
    check_connected(&support(&q, layout), q.nrows(), layout)?;
    let freqs = match (layout, frequencies) {
        (RateLayout::Symmetric, Some(freqs)) => {
            check_frequencies(freqs)?;
            freqs.clone()
        }
        _ => solver.equilibrium(&q)?,
    };
    normalise(&mut q, &freqs)?;
    Ok((q, freqs))
}

/// Rate matrix with optional stochastic variable selection indicators, normalised to one
/// expected substitution per unit time.
#[derive(Clone, Debug)]
pub struct RateMatrix {
    rates: Vec<f64>,
    indicators: Option<Vec<bool>>,
    freqs: FreqVector,
    layout: RateLayout,
    solver: EquilibriumSolver,
    q: SubstMatrix,
}

impl RateMatrix {
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn indicators(&self) -> Option<&[bool]> {
        self.indicators.as_deref()
    }

    pub fn layout(&self) -> RateLayout {
        self.layout
    }

    pub fn reversibility(&self) -> Reversibility {
        match self.layout {
            RateLayout::Symmetric => Reversibility::Reversible,
            RateLayout::Asymmetric => Reversibility::NonReversible,
        }
    }

    /// Number of active rates, all of them if there are no indicators.
    pub fn active_count(&self) -> usize {
        self.indicators
            .as_ref()
            .map_or(self.rates.len(), |ind| ind.iter().filter(|&&b| b).count())
    }

    /// Replaces the rates and rebuilds the matrix. The model is unchanged if rebuilding fails.
    pub fn set_rates(&mut self, rates: &[f64]) -> Result<()> {
        let (q, freqs) = assemble(
            rates,
            self.supplied_freqs(),
            self.indicators.as_deref(),
            self.layout,
            &self.solver,
        )?;
        self.rates = rates.to_vec();
        self.q = q;
        self.freqs = freqs;
        Ok(())
    }

    /// Replaces the indicators and rebuilds the matrix. The model is unchanged if rebuilding fails.
    pub fn set_indicators(&mut self, indicators: &[bool]) -> Result<()> {
        let (q, freqs) = assemble(
            &self.rates,
            self.supplied_freqs(),
            Some(indicators),
            self.layout,
            &self.solver,
        )?;
        self.indicators = Some(indicators.to_vec());
        self.q = q;
        self.freqs = freqs;
        Ok(())
    }

    /// Replaces the frequencies of a symmetric model and rebuilds the matrix. Frequencies of
    /// nonreversible models are derived from the rates, so setting them bails with
    /// `DimensionMismatch`.
    pub fn set_frequencies(&mut self, frequencies: &[f64]) -> Result<()> {
        if !self.layout.is_symmetric() {
            bail!(ModelError::DimensionMismatch(
                "Frequencies of nonreversible models are computed, not set".to_string()
            ));
        }
        let freqs = FreqVector::from_column_slice(frequencies);
        let (q, freqs) = assemble(
            &self.rates,
            Some(&freqs),
            self.indicators.as_deref(),
            self.layout,
            &self.solver,
        )?;
        self.q = q;
        self.freqs = freqs;
        Ok(())
    }

    fn supplied_freqs(&self) -> Option<&FreqVector> {
        self.layout.is_symmetric().then_some(&self.freqs)
    }
}

impl EvoModel for RateMatrix {
    fn q(&self) -> &SubstMatrix {
        &self.q
    }

    fn freqs(&self) -> &FreqVector {
        &self.freqs
    }
}

pub struct RateMatrixBuilder {
    rates: Vec<f64>,
    frequencies: Option<Vec<f64>>,
    indicators: Option<Vec<bool>>,
    symmetric: bool,
    solver: Option<EquilibriumSolver>,
}

impl RateMatrixBuilder {
    /// Starts a nonreversible rate matrix without indicators from `rates`.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::substitution_models::RateMatrixBuilder;
    /// let builder = RateMatrixBuilder::new(&[1.0; 12]);
    /// ```
    pub fn new(rates: &[f64]) -> RateMatrixBuilder {
        RateMatrixBuilder {
            rates: rates.to_vec(),
            frequencies: None,
            indicators: None,
            symmetric: false,
            solver: None,
        }
    }

    /// Sets the stationary frequencies, required for symmetric matrices.
    pub fn frequencies(mut self, frequencies: &[f64]) -> RateMatrixBuilder {
        self.frequencies = Some(frequencies.to_vec());
        self
    }

    /// Sets one indicator per rate, inactive rates are zeroed.
    pub fn indicators(mut self, indicators: &[bool]) -> RateMatrixBuilder {
        self.indicators = Some(indicators.to_vec());
        self
    }

    pub fn symmetric(mut self, symmetric: bool) -> RateMatrixBuilder {
        self.symmetric = symmetric;
        self
    }

    /// Sets the solver used for the frequencies of nonreversible matrices.
    pub fn solver(mut self, solver: EquilibriumSolver) -> RateMatrixBuilder {
        self.solver = Some(solver);
        self
    }

    /// Builds the normalised rate matrix.
    /// Bails with `DimensionMismatch` if the vector lengths do not fit, with `DegenerateMatrix`
    /// if a state has no outgoing or incoming rate, with `NotStronglyConnected` if some state
    /// cannot reach another, and with `InvalidProbability` if symmetric frequencies do not sum
    /// up to 1.
    ///
    /// # Example
    /// ```
    /// use approx::assert_relative_eq;
    /// use phylo_ctmc::evolutionary_models::EvoModel;
    /// use phylo_ctmc::substitution_models::RateMatrixBuilder;
    /// let gtr = RateMatrixBuilder::new(&[1.0, 2.0, 1.0, 1.0, 2.0, 1.0])
    ///     .frequencies(&[0.1, 0.2, 0.3, 0.4])
    ///     .symmetric(true)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(gtr.n(), 4);
    /// let rate: f64 = (0..4).map(|i| -gtr.rate(i, i) * gtr.freqs()[i]).sum();
    /// assert_relative_eq!(rate, 1.0, epsilon = 1e-12);
    /// ```
    pub fn build(self) -> Result<RateMatrix> {
        let layout = RateLayout::new(self.symmetric);
        let solver = self.solver.unwrap_or_default();
        let frequencies = match (layout, self.frequencies) {
            (RateLayout::Asymmetric, Some(_)) => {
                warn!("Frequencies of nonreversible rate matrices are computed, ignoring the given ones");
                None
            }
            (_, frequencies) => frequencies.map(|f| FreqVector::from_column_slice(&f)),
        };
        let (q, freqs) = assemble(
            &self.rates,
            frequencies.as_ref(),
            self.indicators.as_deref(),
            layout,
            &solver,
        )?;
        let model = RateMatrix {
            rates: self.rates,
            indicators: self.indicators,
            freqs,
            layout,
            solver,
            q,
        };
        info!(
            "Set up {} rate matrix on {} states with {} active rates",
            model.reversibility(),
            model.n(),
            model.active_count()
        );
        Ok(model)
    }
}
