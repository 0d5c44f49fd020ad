//! Minimum Description Length model order selection
//!
//! For singular values `σ_0 >= ... >= σ_{L-1}` of a data matrix built from
//! `N` samples, the description length of a model of order `k` is
//!
//! ```text
//! MDL(k) = -N Σ_{i>=k} ln σ_i + N (L - k) ln( (1 / (L - k)) Σ_{i>=k} σ_i ) + k (2L - k) ln(N) / 2
//! ```
//!
//! The first two terms vanish when the trailing singular values are equal
//! (pure noise); the last penalises model complexity.

/// Description length for each candidate order `0..L`.
pub fn mdl_costs(singular_values: &[f64], samples: usize) -> Vec<f64> {
    let l = singular_values.len();
    let n = samples as f64;
    let ln_n = n.ln();
    let sigma: Vec<f64> = singular_values
        .iter()
        .map(|s| s.max(f64::MIN_POSITIVE))
        .collect();

    (0..l)
        .map(|k| {
            let tail = &sigma[k..];
            let count = (l - k) as f64;
            let log_sum: f64 = tail.iter().map(|s| s.ln()).sum();
            let mean = tail.iter().sum::<f64>() / count;
            let penalty = k as f64 * (2 * l - k) as f64 * ln_n / 2.0;
            -n * log_sum + n * count * mean.ln() + penalty
        })
        .collect()
}

/// Model order minimising the description length.
///
/// # Arguments
/// * `singular_values` - Singular values in descending order
/// * `samples` - Number of data points the matrix was built from
pub fn mdl_order(singular_values: &[f64], samples: usize) -> usize {
    mdl_costs(singular_values, samples)
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_finite())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| k)
        .unwrap_or(0)
}
