//! Discrete distribution quantiles used by connectivity estimates
//!
//! Row-length bounds are taken at a fixed upper quantile of the exact
//! distribution of connections per row, summing probability masses in log
//! space so large populations do not overflow.

/// Quantile at which maximum row lengths are estimated
pub const ESTIMATE_QUANTILE: f64 = 0.9999;

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function for positive arguments
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection
        return (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = LANCZOS[0];
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        #[allow(clippy::cast_precision_loss)]
        let i = i as f64;
        sum += c / (x + i);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

#[allow(clippy::cast_precision_loss)]
fn ln_choose(n: u64, k: u64) -> f64 {
    ln_gamma(n as f64 + 1.0) - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0)
}

/// Smallest `k` with `P(X <= k) >= q` for `X ~ Binomial(n, p)`
#[allow(clippy::cast_precision_loss)]
pub fn binomial_ppf(q: f64, n: u64, p: f64) -> u64 {
    if n == 0 || p <= 0.0 {
        return 0;
    }
    if p >= 1.0 {
        return n;
    }
    let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());
    let mut cdf = 0.0;
    for k in 0..=n {
        cdf += (ln_choose(n, k) + k as f64 * ln_p + (n - k) as f64 * ln_q).exp();
        if cdf >= q {
            return k;
        }
    }
    n
}

/// Smallest `k` with `P(X <= k) >= q` for `X ~ Hypergeometric`
///
/// `total` items of which `good` are marked; `draws` items are taken without
/// replacement and `X` counts the marked ones.
pub fn hypergeom_ppf(q: f64, total: u64, good: u64, draws: u64) -> u64 {
    let good = good.min(total);
    let draws = draws.min(total);
    let low = draws.saturating_sub(total - good);
    let high = good.min(draws);
    if low == high {
        return low;
    }
    let ln_norm = ln_choose(total, draws);
    let mut cdf = 0.0;
    for k in low..=high {
        cdf += (ln_choose(good, k) + ln_choose(total - good, draws - k) - ln_norm).exp();
        if cdf >= q {
            return k;
        }
    }
    high
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!((ln_gamma(1.0)).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(11.0) - 3_628_800f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn binomial_edges() {
        assert_eq!(binomial_ppf(ESTIMATE_QUANTILE, 0, 0.5), 0);
        assert_eq!(binomial_ppf(ESTIMATE_QUANTILE, 50, 0.0), 0);
        assert_eq!(binomial_ppf(ESTIMATE_QUANTILE, 50, 1.0), 50);
    }

    #[test]
    fn binomial_upper_tail_is_bounded() {
        let k = binomial_ppf(ESTIMATE_QUANTILE, 50, 0.1);
        assert!(k > 5 && k < 50, "k = {k}");
    }

    #[test]
    fn hypergeom_degenerate_and_tail() {
        // Every item marked: all draws are marked
        assert_eq!(hypergeom_ppf(ESTIMATE_QUANTILE, 100, 100, 10), 10);
        assert_eq!(hypergeom_ppf(ESTIMATE_QUANTILE, 100, 0, 10), 0);

        let k = hypergeom_ppf(ESTIMATE_QUANTILE, 1000, 100, 50);
        assert!(k >= 5 && k <= 50, "k = {k}");
    }
}
