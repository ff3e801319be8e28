//! Running mean and variance statistics for stochastic estimates.

/// Welford accumulator of `(n, mean, m2)`, where `m2` is the sum of squared deviations
/// from the running mean.
///
/// Two accumulators built from disjoint streams can be merged with [`RunningStats::merge`],
/// which gives the same result (up to rounding) as pushing both streams into one.
///
/// # Examples
///
/// ```rust
/// use mini_quad::stats::RunningStats;
///
/// let mut left = RunningStats::new();
/// let mut right = RunningStats::new();
/// [1.0, 2.0].iter().for_each(|&x| left.push(x));
/// [3.0, 4.0, 5.0].iter().for_each(|&x| right.push(x));
/// left.merge(&right);
/// assert_eq!(left.count(), 5);
/// assert!((left.mean() - 3.0).abs() < 1e-12);
/// assert!((left.variance().unwrap() - 2.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    n: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one observation.
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Folds another accumulator into this one using the pairwise combination
    /// `mean += δ·n_k/(n+n_k)`, `m2 += m2_k + δ²·n·n_k/(n+n_k)`.
    pub fn merge(&mut self, other: &RunningStats) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let n = self.n as f64;
        let k = other.n as f64;
        let total = n + k;
        let delta = other.mean - self.mean;
        self.mean += delta * k / total;
        self.m2 += other.m2 + delta * delta * n * k / total;
        self.n += other.n;
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn m2(&self) -> f64 {
        self.m2
    }

    /// Sample variance `m2 / (n - 1)`; undefined for fewer than two observations.
    pub fn variance(&self) -> Option<f64> {
        (self.n > 1).then(|| self.m2 / (self.n - 1) as f64)
    }
}

/// Snapshot of an expectation estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Estimated expectation.
    pub value: f64,
    /// Sample variance of the averaged function values, if at least two trials ran.
    pub variance: Option<f64>,
    /// Total trials, summed over all experiments.
    pub trials: usize,
    /// Number of worker experiments that contributed.
    pub experiments: usize,
}

impl Estimate {
    pub(crate) fn from_stats(stats: &RunningStats, experiments: usize) -> Self {
        Self {
            value: stats.mean(),
            variance: stats.variance(),
            trials: stats.count(),
            experiments,
        }
    }

    /// Standard error of the mean, `sqrt(variance / n)`.
    pub fn std_error(&self) -> Option<f64> {
        self.variance.map(|v| (v / self.trials as f64).sqrt())
    }

    /// Half-width of the 2σ confidence interval around the estimate.
    pub fn half_width(&self) -> Option<f64> {
        self.std_error().map(|s| 2.0 * s)
    }
}
