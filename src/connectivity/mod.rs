use anyhow::bail;
use fixedbitset::FixedBitSet;

use crate::errors::ModelError;
use crate::rate_layout::RateLayout;
use crate::substitution_models::SubstMatrix;
use crate::Result;

/// Smallest transition probability still considered numerically usable.
pub const WELL_CONDITIONED_TOLERANCE: f64 = 1e-20;

/// Checks whether the graph on `n` states induced by `indicators` is strongly connected.
/// Edge (i, j) exists when the indicator at the layout position of (i, j) is set. Symmetric
/// layouts describe undirected graphs, so a single traversal decides connectivity; asymmetric
/// ones need every state to reach every other state.
/// Returns false if the indicator vector does not fit `n` and `layout`.
///
/// # Example
/// ```
/// use phylo_ctmc::connectivity::is_strongly_connected;
/// use phylo_ctmc::rate_layout::RateLayout;
/// assert!(is_strongly_connected(&[true; 12], 4, RateLayout::Asymmetric));
/// assert!(!is_strongly_connected(&[false; 6], 4, RateLayout::Symmetric));
/// ```
pub fn is_strongly_connected(indicators: &[bool], n: usize, layout: RateLayout) -> bool {
    if n == 0 || indicators.len() != layout.rate_count(n) {
        return false;
    }
    let has_edge = |i: usize, j: usize| layout.index(i, j, n).is_some_and(|k| indicators[k]);
    let roots = if layout.is_symmetric() { 1 } else { n };
    (0..roots).all(|root| reachable_from(root, n, has_edge).count_ones(..) == n)
}

fn reachable_from(root: usize, n: usize, has_edge: impl Fn(usize, usize) -> bool) -> FixedBitSet {
    let mut visited = FixedBitSet::with_capacity(n);
    visited.insert(root);
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        for j in 0..n {
            if !visited.contains(j) && has_edge(i, j) {
                visited.insert(j);
                stack.push(j);
            }
        }
    }
    visited
}

/// Same as [`is_strongly_connected`], but bails with `NotStronglyConnected` instead of
/// returning false, and with `DimensionMismatch` when the indicators do not fit `n`.
pub fn check_connected(indicators: &[bool], n: usize, layout: RateLayout) -> Result<()> {
    if indicators.len() != layout.rate_count(n) {
        bail!(ModelError::DimensionMismatch(format!(
            "{} indicators given for {} states, expected {}",
            indicators.len(),
            n,
            layout.rate_count(n)
        )));
    }
    if !is_strongly_connected(indicators, n, layout) {
        bail!(ModelError::NotStronglyConnected(format!(
            "Active edges {:?} leave some of the {} states unreachable",
            indicators, n
        )));
    }
    Ok(())
}

/// Indicator vector of the off-diagonal cells of `q` that carry a positive rate. A symmetric
/// entry is active if either of its two cells is.
pub fn support(q: &SubstMatrix, layout: RateLayout) -> Vec<bool> {
    let n = q.nrows();
    layout
        .cells(n)
        .map(|(_, (i, j))| match layout {
            RateLayout::Symmetric => q[(i, j)] > 0.0 || q[(j, i)] > 0.0,
            RateLayout::Asymmetric => q[(i, j)] > 0.0,
        })
        .collect()
}

/// Transition probabilities are well conditioned when every entry lies in [tolerance, 1).
pub fn is_well_conditioned(probabilities: &SubstMatrix, tolerance: f64) -> bool {
    probabilities
        .iter()
        .all(|&p| p >= tolerance && p < 1.0)
}
