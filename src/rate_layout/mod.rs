use anyhow::bail;

use crate::errors::ModelError;
use crate::Result;

/// Positional mapping between a flat rate (or indicator) vector and the off-diagonal cells of
/// an n×n rate matrix.
///
/// * `Asymmetric`: n(n−1) entries in row-major order with the diagonal skipped,
///   k = i·(n−1) + j, minus one when j > i.
/// * `Symmetric`: n(n−1)/2 entries for the upper triangle in row-major order, cell (j, i) shares
///   the entry of cell (i, j).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLayout {
    Symmetric,
    Asymmetric,
}

impl RateLayout {
    pub fn new(symmetric: bool) -> RateLayout {
        if symmetric {
            RateLayout::Symmetric
        } else {
            RateLayout::Asymmetric
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, RateLayout::Symmetric)
    }

    /// Number of rates needed for `n` states.
    pub fn rate_count(&self, n: usize) -> usize {
        match self {
            RateLayout::Symmetric => n * n.saturating_sub(1) / 2,
            RateLayout::Asymmetric => n * n.saturating_sub(1),
        }
    }

    /// Recovers the number of states from the length of a rate vector.
    /// Bails with a `DimensionMismatch` if the length is not n(n−1) (asymmetric) or n(n−1)/2
    /// (symmetric) for some n ≥ 2.
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::rate_layout::RateLayout;
    /// assert_eq!(RateLayout::Asymmetric.states_for(12).unwrap(), 4);
    /// assert_eq!(RateLayout::Symmetric.states_for(190).unwrap(), 20);
    /// assert!(RateLayout::Symmetric.states_for(7).is_err());
    /// ```
    pub fn states_for(&self, rate_count: usize) -> Result<usize> {
        let discriminant = match self {
            RateLayout::Symmetric => 1.0 + 8.0 * rate_count as f64,
            RateLayout::Asymmetric => 1.0 + 4.0 * rate_count as f64,
        };
        let n = ((1.0 + discriminant.sqrt()) / 2.0).round() as usize;
        if n < 2 || self.rate_count(n) != rate_count {
            bail!(ModelError::DimensionMismatch(format!(
                "{} rates do not fit a {} rate matrix, expected n(n-1){} rates for n states",
                rate_count,
                if self.is_symmetric() {
                    "symmetric"
                } else {
                    "asymmetric"
                },
                if self.is_symmetric() { "/2" } else { "" },
            )));
        }
        Ok(n)
    }

    /// Flat position of cell (i, j), `None` for the diagonal or for cells outside of n×n.
    pub fn index(&self, i: usize, j: usize, n: usize) -> Option<usize> {
        if i == j || i >= n || j >= n {
            return None;
        }
        match self {
            RateLayout::Symmetric => {
                let (i, j) = if i < j { (i, j) } else { (j, i) };
                Some(i * n - i * (i + 1) / 2 + j - i - 1)
            }
            RateLayout::Asymmetric => {
                let k = i * (n - 1) + j;
                Some(if j > i { k - 1 } else { k })
            }
        }
    }

    /// Matrix cell stored at flat position `k`. Symmetric entries are reported as their upper
    /// triangle cell (i < j).
    pub fn cell(&self, k: usize, n: usize) -> Option<(usize, usize)> {
        if k >= self.rate_count(n) {
            return None;
        }
        match self {
            RateLayout::Symmetric => {
                let mut rest = k;
                for i in 0..n {
                    let row_len = n - 1 - i;
                    if rest < row_len {
                        return Some((i, i + 1 + rest));
                    }
                    rest -= row_len;
                }
                None
            }
            RateLayout::Asymmetric => {
                let i = k / (n - 1);
                let r = k % (n - 1);
                Some((i, if r < i { r } else { r + 1 }))
            }
        }
    }

    /// All (k, (i, j)) pairs in flat order.
    pub fn cells(&self, n: usize) -> impl Iterator<Item = (usize, (usize, usize))> + '_ {
        let layout = *self;
        (0..self.rate_count(n)).filter_map(move |k| layout.cell(k, n).map(|cell| (k, cell)))
    }
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
