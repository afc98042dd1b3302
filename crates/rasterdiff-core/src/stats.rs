//! Summary statistics over the unmasked difference values.
//!
//! Population definitions throughout: the standard deviation divides by N,
//! percentiles interpolate linearly between closest ranks (rank = p·(N−1)).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Unmasked cells whose difference is non-zero.
    pub npix_diff: usize,
    /// Unmasked cells.
    pub npix_total: usize,
    /// 100 · npix_diff / npix_total, rounded to 3 decimals; 100.0 when npix_total is 0.
    pub pct_diff: f64,
    pub mean: f64,
    pub abs_mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub p25: f64,
    pub p75: f64,
    pub iqr: f64,
}

/// Percentage of differing pixels, guarded against an empty valid set.
pub fn percent_different(npix_diff: usize, npix_total: usize) -> f64 {
    if npix_total == 0 {
        return 100.0;
    }
    let pct = npix_diff as f64 / npix_total as f64 * 100.0;
    (pct * 1000.0).round() / 1000.0
}

/// Linear-interpolation percentile of an ascending slice. `p` in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

impl DiffStats {
    /// Compute every statistic from the unmasked differences.
    ///
    /// With no valid pixels the counts are zero, `pct_diff` is 100.0 and all
    /// moment and order statistics are NaN.
    pub fn compute<I>(valid: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let mut values: Vec<f64> = valid.into_iter().map(f64::from).collect();
        let n = values.len();
        let npix_diff = values.iter().filter(|&&v| v != 0.0).count();
        let pct_diff = percent_different(npix_diff, n);

        if n == 0 {
            return Self {
                npix_diff,
                npix_total: 0,
                pct_diff,
                mean: f64::NAN,
                abs_mean: f64::NAN,
                median: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                std_dev: f64::NAN,
                p25: f64::NAN,
                p75: f64::NAN,
                iqr: f64::NAN,
            };
        }

        let nf = n as f64;
        let mean = values.iter().sum::<f64>() / nf;
        let abs_mean = values.iter().map(|v| v.abs()).sum::<f64>() / nf;
        let std_dev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf).sqrt();

        values.sort_by(|a, b| a.total_cmp(b));
        let p25 = percentile(&values, 25.0);
        let p75 = percentile(&values, 75.0);

        Self {
            npix_diff,
            npix_total: n,
            pct_diff,
            mean,
            abs_mean,
            median: percentile(&values, 50.0),
            min: values[0],
            max: values[n - 1],
            std_dev,
            p25,
            p75,
            iqr: p75 - p25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn two_by_two_example() {
        // truth [[1,2],[3,4]] − test [[1,1],[3,5]]
        let s = DiffStats::compute([0.0f32, 1.0, 0.0, -1.0]);
        assert_eq!(s.npix_diff, 2);
        assert_eq!(s.npix_total, 4);
        assert_eq!(s.pct_diff, 50.0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.abs_mean, 0.5);
        assert_eq!(s.median, 0.0);
        assert_eq!(s.min, -1.0);
        assert_eq!(s.max, 1.0);
        assert_relative_eq!(s.std_dev, 0.5f64.sqrt(), epsilon = 1e-12);
        assert_eq!(s.p25, -0.25);
        assert_eq!(s.p75, 0.25);
        assert_eq!(s.iqr, 0.5);
    }

    #[test]
    fn empty_input_is_all_different() {
        let s = DiffStats::compute(std::iter::empty());
        assert_eq!(s.npix_total, 0);
        assert_eq!(s.npix_diff, 0);
        assert_eq!(s.pct_diff, 100.0);
        assert!(s.mean.is_nan());
        assert!(s.min.is_nan());
        assert!(s.iqr.is_nan());
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 10.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 10.0);
        assert_relative_eq!(percentile(&v, 90.0), 7.6, epsilon = 1e-12);
    }

    #[test]
    fn pct_diff_rounds_to_three_decimals() {
        assert_eq!(percent_different(1, 3), 33.333);
        assert_eq!(percent_different(2, 3), 66.667);
        assert_eq!(percent_different(0, 7), 0.0);
    }

    #[test]
    fn std_dev_is_population() {
        let s = DiffStats::compute([2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(s.std_dev, 2.0, epsilon = 1e-12);
        assert_relative_eq!(s.mean, 5.0, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn pct_diff_stays_in_range(values in proptest::collection::vec(-1000.0f32..1000.0, 0..200)) {
            let s = DiffStats::compute(values.iter().copied());
            prop_assert!((0.0..=100.0).contains(&s.pct_diff));
            prop_assert!(s.npix_diff <= s.npix_total);
        }

        #[test]
        fn order_statistics_are_monotone(values in proptest::collection::vec(-1e6f32..1e6, 1..200)) {
            let s = DiffStats::compute(values.iter().copied());
            prop_assert!(s.min <= s.p25);
            prop_assert!(s.p25 <= s.median);
            prop_assert!(s.median <= s.p75);
            prop_assert!(s.p75 <= s.max);
            prop_assert!(s.iqr >= 0.0);
            prop_assert!(s.abs_mean >= s.mean.abs() - 1e-6);
        }
    }
}
