use anyhow::bail;
use itertools::Itertools;

use crate::errors::ModelError;
use crate::evolutionary_models::EvoModel;
use crate::Result;

/// Deviations from detailed balance, Q_ij·π_i − Q_ji·π_j for every pair i < j in row-major
/// order. All zero for time-reversible models.
pub fn detailed_balance_deviations(model: &impl EvoModel) -> Vec<f64> {
    let n = model.n();
    let freqs = model.freqs();
    (0..n)
        .tuple_combinations()
        .map(|(i, j)| model.rate(i, j) * freqs[i] - model.rate(j, i) * freqs[j])
        .collect()
}

/// Every simple cycle of length 3 to `n` on `n` states, each listed once: the cycle starts at its
/// smallest state and its second state is smaller than its last one.
///
/// # Example
/// ```
/// use phylo_ctmc::diagnostics::simple_cycles;
/// assert_eq!(
///     simple_cycles(4),
///     vec![
///         vec![0, 1, 2], vec![0, 1, 3], vec![0, 2, 3], vec![1, 2, 3],
///         vec![0, 1, 2, 3], vec![0, 1, 3, 2], vec![0, 2, 1, 3],
///     ]
/// );
/// ```
pub fn simple_cycles(n: usize) -> Vec<Vec<usize>> {
    (3..=n)
        .flat_map(|len| (0..n).combinations(len))
        .flat_map(|states| {
            let first = states[0];
            states[1..]
                .iter()
                .copied()
                .permutations(states.len() - 1)
                .filter(|rest| rest[0] < rest[rest.len() - 1])
                .map(move |rest| std::iter::once(first).chain(rest).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Net flux around every cycle, the product of the rates along the cycle minus the product of
/// the rates against it. Zero for time-reversible models (Kolmogorov's criterion).
pub fn net_fluxes(model: &impl EvoModel, cycles: &[Vec<usize>]) -> Vec<f64> {
    cycles
        .iter()
        .map(|cycle| {
            let (forward, backward) = cycle
                .iter()
                .zip(cycle.iter().cycle().skip(1))
                .fold((1.0, 1.0), |(forward, backward), (&i, &j)| {
                    (forward * model.rate(i, j), backward * model.rate(j, i))
                });
            forward - backward
        })
        .collect()
}

/// sqrt(Σ v²/len), NaN for an empty slice.
pub fn root_mean_square(values: &[f64]) -> f64 {
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Column keys `id.state`, `id.pair` and `id.cycle` for the diagnostic arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateLabels {
    id: String,
    states: Vec<String>,
}

impl StateLabels {
    /// State names are split at whitespace, `None` names the states by their index.
    /// Bails with `DimensionMismatch` if the number of names is not `n`.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::diagnostics::StateLabels;
    /// let labels = StateLabels::new("freq", Some("A C G T"), 4).unwrap();
    /// assert_eq!(labels.frequency_keys()[2], "freq.G");
    /// assert_eq!(StateLabels::new("freq", None, 2).unwrap().frequency_keys(), ["freq.0", "freq.1"]);
    /// ```
    pub fn new(id: &str, names: Option<&str>, n: usize) -> Result<StateLabels> {
        let states: Vec<String> = match names {
            Some(names) => names.split_whitespace().map(String::from).collect(),
            None => (0..n).map(|i| i.to_string()).collect(),
        };
        if states.len() != n {
            bail!(ModelError::DimensionMismatch(format!(
                "{} state names given for {} states",
                states.len(),
                n
            )));
        }
        Ok(StateLabels {
            id: id.to_string(),
            states,
        })
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn frequency_keys(&self) -> Vec<String> {
        self.states
            .iter()
            .map(|state| format!("{}.{}", self.id, state))
            .collect()
    }

    /// Keys matching [`detailed_balance_deviations`].
    pub fn pair_keys(&self) -> Vec<String> {
        self.states
            .iter()
            .tuple_combinations()
            .map(|(a, b)| format!("{}.{}{}", self.id, a, b))
            .collect()
    }

    /// Keys matching [`net_fluxes`] for `cycles`.
    pub fn cycle_keys(&self, cycles: &[Vec<usize>]) -> Vec<String> {
        cycles
            .iter()
            .map(|cycle| {
                format!(
                    "{}.{}",
                    self.id,
                    cycle.iter().map(|&i| self.states[i].as_str()).join("")
                )
            })
            .collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
