use std::fmt::Display;

use crate::substitution_models::{FreqVector, SubstMatrix};

/// Continuous-time Markov model of state substitution.
pub trait EvoModel {
    /// Instantaneous rate matrix, rows sum up to zero.
    fn q(&self) -> &SubstMatrix;

    /// Stationary distribution of `q`.
    fn freqs(&self) -> &FreqVector;

    fn n(&self) -> usize {
        self.q().nrows()
    }

    fn rate(&self, i: usize, j: usize) -> f64 {
        self.q()[(i, j)]
    }

    /// Transition probabilities over `time` expected substitutions, exp(Q·time).
    fn p(&self, time: f64) -> SubstMatrix {
        (self.q().clone() * time).exp()
    }

    fn p_to(&self, time: f64, to: &mut SubstMatrix) {
        to.copy_from(self.q());
        *to *= time;
        *to = to.exp();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reversibility {
    Reversible,
    NonReversible,
}

impl Display for Reversibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reversibility::Reversible => write!(f, "time-reversible"),
            Reversibility::NonReversible => write!(f, "nonreversible"),
        }
    }
}
