//! Draws deviates from a [`Distribution`] using a private, seeded random source.
//!
//! A [`Sampler`] is owned by exactly one worker. Concurrent code creates one sampler per
//! worker from a list of seeds rather than sharing a random source, so sampling itself needs
//! no synchronization.

use rand::distributions::Open01;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};

use crate::distributions::{Distribution, Uniform, Unit};
use crate::error::QuadError;

/// A distribution paired with its own random number generator.
///
/// # Examples
///
/// ```rust
/// use mini_quad::distributions::Distribution;
/// use mini_quad::sampler::Sampler;
///
/// let mut sampler = Sampler::uniform(0.0, 1.0, 42).unwrap();
/// assert_eq!(sampler.prob(-5.0), 0.0);
/// let x = sampler.sample();
/// assert!((0.0..=1.0).contains(&x));
/// ```
#[derive(Debug, Clone)]
pub struct Sampler<D> {
    distribution: D,
    seed: u64,
    rng: SmallRng,
}

impl<D: Distribution> Sampler<D> {
    /// Creates a sampler for `distribution` whose generator is seeded with `seed`.
    pub fn new(distribution: D, seed: u64) -> Self {
        Self {
            distribution,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Draws one deviate.
    ///
    /// Uniform deviates come from the open interval (0, 1), which keeps inverse CDFs with
    /// unbounded support finite.
    pub fn sample(&mut self) -> f64 {
        let u: f64 = self.rng.sample(Open01);
        self.distribution.transform(u)
    }

    pub fn distribution(&self) -> &D {
        &self.distribution
    }

    /// Swaps the distribution while keeping the random stream position.
    pub fn set_distribution(&mut self, distribution: D) {
        self.distribution = distribution;
    }

    /// The seed this sampler was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Sampler<Unit> {
    /// A sampler of plain uniform deviates on `[0, 1)`.
    pub fn unit(seed: u64) -> Self {
        Self::new(Unit, seed)
    }
}

impl Sampler<Uniform> {
    /// A sampler of the uniform distribution on `[a, b]`.
    pub fn uniform(a: f64, b: f64, seed: u64) -> Result<Self, QuadError> {
        Ok(Self::new(Uniform::new(a, b)?, seed))
    }
}

impl<D: Distribution> Distribution for Sampler<D> {
    fn transform(&self, u: f64) -> f64 {
        self.distribution.transform(u)
    }

    fn prob(&self, x: f64) -> f64 {
        self.distribution.prob(x)
    }

    fn support(&self) -> (f64, f64) {
        self.distribution.support()
    }
}

/// Returns a fresh seed drawn from the thread-local generator.
pub fn seed() -> u64 {
    thread_rng().gen::<u64>()
}

/// Returns `n` fresh seeds, convenient for seeding one sampler per worker.
pub fn noise(n: usize) -> Vec<u64> {
    let mut rng = thread_rng();
    (0..n).map(|_| rng.gen::<u64>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Linear, Normal};
    use approx::assert_abs_diff_eq;
    use rand_distr::Distribution as _;

    #[test]
    fn test_uniform_sampler_stays_in_support() {
        let mut sampler = Sampler::uniform(0.0, 1.0, 42).unwrap();
        assert_eq!(sampler.prob(-5.0), 0.0);
        assert_eq!(sampler.prob(0.5), 1.0);
        for _ in 0..1000 {
            let x = sampler.sample();
            assert!((0.0..=1.0).contains(&x), "{x} outside [0, 1]");
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut s1 = Sampler::new(Normal::new(0.0, 1.0).unwrap(), 7);
        let mut s2 = Sampler::new(Normal::new(0.0, 1.0).unwrap(), 7);
        for _ in 0..100 {
            assert_eq!(s1.sample(), s2.sample());
        }
    }

    #[test]
    fn test_unit_sampler_is_finite() {
        let mut sampler = Sampler::unit(3);
        assert_eq!(sampler.seed(), 3);
        for _ in 0..1000 {
            let x = sampler.sample();
            assert!(x > 0.0 && x < 1.0);
        }
    }

    #[test]
    fn test_normal_sampler_matches_reference() {
        const N: usize = 5_000;
        let mut sampler = Sampler::new(Normal::new(3.0, 2.0).unwrap(), 42);
        let ours: Vec<f64> = (0..N).map(|_| sampler.sample()).collect();

        let mut rng = SmallRng::seed_from_u64(1234);
        let reference = rand_distr::Normal::new(3.0, 2.0).unwrap();
        let theirs: Vec<f64> = (0..N).map(|_| reference.sample(&mut rng)).collect();

        let result = kolmogorov_smirnov::test_f64(&ours, &theirs, 0.99);
        assert!(
            !result.is_rejected,
            "KS test rejected sampler output (statistic {})",
            result.statistic
        );
    }

    #[test]
    fn test_linear_sampler_moments() {
        const N: usize = 100_000;
        let mut sampler = Sampler::new(Linear::new(0.0, 1.0, 2.0, 0.0).unwrap(), 42);
        let xs: Vec<f64> = (0..N).map(|_| sampler.sample()).collect();
        let mean = xs.iter().sum::<f64>() / N as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (N - 1) as f64;
        assert_abs_diff_eq!(mean, 2.0 / 3.0, epsilon = 1e-2);
        assert_abs_diff_eq!(var, 0.5 - 4.0 / 9.0, epsilon = 1e-2);
    }

    #[test]
    fn test_set_distribution_keeps_stream() {
        let mut moved = Sampler::new(Normal::new(0.0, 1.0).unwrap(), 11);
        let mut reference = Sampler::new(Normal::new(5.0, 1.0).unwrap(), 11);
        moved.set_distribution(Normal::new(5.0, 1.0).unwrap());
        assert_eq!(moved.sample(), reference.sample());
        assert_eq!(moved.distribution().mu(), 5.0);
    }

    #[test]
    fn test_noise_length() {
        assert_eq!(noise(16).len(), 16);
        assert!(noise(0).is_empty());
    }
}
