//! Early-stopping policy over the signed objective history.

/// Whether the search has stalled.
///
/// Nothing is decided until `early_step` values exist beyond the first
/// `n_random_starts`. From then on the condition holds when the best (first
/// minimum) value of the whole history was reached `early_step` or more
/// entries ago, counting itself, so nothing in the most recent window
/// improved on it. A best found during the random phase counts too.
pub fn early_condition(func_vals: &[f64], early_step: usize, n_random_starts: usize) -> bool {
    if early_step == 0 || func_vals.len() < n_random_starts + early_step {
        return false;
    }
    let best = func_vals
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    func_vals.len() - best >= early_step
}
