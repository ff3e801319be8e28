/*!
# Adaptive Population Importance Sampling

Estimates

```text
I = (1/Z) ∫ f(x) π(x) dx      Z = ∫ π(x) dx
```

for an unnormalized target density `π`, using a population of Gaussian proposals instead of a
single hand-picked one. The algorithm follows Martino, Elvira, Luengo and Corander, "An
Adaptive Population Importance Sampler: Learning From Uncertainty", IEEE Transactions on
Signal Processing 63 (16), 2015.

Every iteration draws one sample `z_i` from each of the `N` proposals `q_i` and weights it
against the whole mixture,

```text
w_i = π(z_i) · N / Σ_j q_j(z_i)
```

Rounds are combined with weights equal to their total weight mass. Meanwhile every proposal
tracks a weighted mean of its own samples, and at the end of an epoch moves its mean there.
Standard deviations never change.

The estimator runs on the calling thread. Given fixed seeds, epochs, iterations and initial
family, [`Apis::estimate`] is deterministic; every call starts again from the initial family.

## Example

```rust
use mini_quad::apis::Apis;

let target = |x: f64| (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt();
let mut apis = Apis::new(|x: f64| x * x, target)
    .with_epochs(32)
    .with_iterations(32)
    .with_family(vec![-2.0, 0.5, 2.0], vec![1.0, 2.0, 3.0], vec![1, 2, 3]);
let (i, z) = apis.estimate().unwrap();
assert!((i - 1.0).abs() < 0.1);
assert!((z - 1.0).abs() < 0.1);
```
*/

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, trace};

use crate::distributions::{Distribution, Normal};
use crate::error::QuadError;
use crate::sampler::Sampler;

pub const DEFAULT_EPOCHS: usize = 64;
pub const DEFAULT_ITERATIONS: usize = 32;

/// APIS estimator for `function` under the unnormalized `target` density.
pub struct Apis<F, P> {
    function: F,
    target: P,
    epochs: usize,
    iterations: usize,
    means: Vec<f64>,
    sigmas: Vec<f64>,
    seeds: Vec<u64>,
    adapted: Vec<f64>,
}

/// Running estimate of `I` together with its weight mass `L`.
struct Tally {
    integral: f64,
    mass: f64,
}

impl<F, P> Apis<F, P>
where
    F: Fn(f64) -> f64,
    P: Fn(f64) -> f64,
{
    /// Creates an estimator with an empty proposal family; set one with [`Apis::with_family`].
    pub fn new(function: F, target: P) -> Self {
        Self {
            function,
            target,
            epochs: DEFAULT_EPOCHS,
            iterations: DEFAULT_ITERATIONS,
            means: Vec::new(),
            sigmas: Vec::new(),
            seeds: Vec::new(),
            adapted: Vec::new(),
        }
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the initial Gaussian family. Proposal `i` has mean `means[i]`, standard deviation
    /// `sigmas[i]`, and draws from a generator seeded with `seeds[i]`.
    pub fn with_family(mut self, means: Vec<f64>, sigmas: Vec<f64>, seeds: Vec<u64>) -> Self {
        self.means = means;
        self.sigmas = sigmas;
        self.seeds = seeds;
        self
    }

    /// Proposal means reached at the end of the last estimate; empty before the first one.
    pub fn adapted_means(&self) -> &[f64] {
        &self.adapted
    }

    /// Returns the estimates `(I, Z)`.
    ///
    /// Fails if the family arrays differ in length, the family is empty, or a standard
    /// deviation is not positive. With zero epochs or iterations nothing is sampled and both
    /// estimates are zero.
    pub fn estimate(&mut self) -> Result<(f64, f64), QuadError> {
        self.run(None)
    }

    /// Like [`Apis::estimate`], reporting finished epochs on a progress bar.
    pub fn estimate_with_progress(&mut self) -> Result<(f64, f64), QuadError> {
        let pb = ProgressBar::new(self.epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_prefix("APIS");
        let result = self.run(Some(&pb));
        pb.finish_with_message("Done!");
        result
    }

    fn family(&self) -> Result<Vec<Sampler<Normal>>, QuadError> {
        let (means, sigmas, seeds) = (self.means.len(), self.sigmas.len(), self.seeds.len());
        if means != sigmas || means != seeds {
            return Err(QuadError::FamilyMismatch { means, sigmas, seeds });
        }
        if means == 0 {
            return Err(QuadError::InvalidDistribution(
                "the proposal family is empty".into(),
            ));
        }
        self.means
            .iter()
            .zip(&self.sigmas)
            .zip(&self.seeds)
            .map(|((&mu, &sigma), &seed)| Ok(Sampler::new(Normal::new(mu, sigma)?, seed)))
            .collect()
    }

    fn run(&mut self, pb: Option<&ProgressBar>) -> Result<(f64, f64), QuadError> {
        let mut samplers = self.family()?;
        let n = samplers.len();
        let mut tally = Tally {
            integral: 0.0,
            mass: 0.0,
        };

        // Per proposal learning accumulators: weight mass and weighted mean location.
        let mut learned = Array1::<f64>::zeros(n);
        let mut eta = Array1::<f64>::zeros(n);

        for epoch in 0..self.epochs {
            for _ in 0..self.iterations {
                let z: Array1<f64> = samplers.iter_mut().map(|s| s.sample()).collect();
                let q = Array2::from_shape_fn((n, n), |(i, j)| samplers[j].prob(z[i]));
                let mixture = q.sum_axis(Axis(1));

                let target: Array1<f64> = z.mapv(|x| (self.target)(x));
                let w: Array1<f64> = target
                    .iter()
                    .zip(mixture.iter())
                    .map(|(&p, &m)| if m > 0.0 { p * n as f64 / m } else { 0.0 })
                    .collect();
                self.absorb(&mut tally, &z, &w);

                for i in 0..n {
                    let own = q[[i, i]];
                    let rho = if own > 0.0 { target[i] / own } else { 0.0 };
                    if learned[i] + rho != 0.0 {
                        eta[i] = (learned[i] * eta[i] + rho * z[i]) / (learned[i] + rho);
                    }
                    learned[i] += rho;
                }
            }

            for (i, sampler) in samplers.iter_mut().enumerate() {
                // A proposal that learned nothing stays where it is.
                if learned[i] > 0.0 {
                    sampler.set_distribution(Normal::new(eta[i], self.sigmas[i])?);
                }
            }
            learned.fill(0.0);
            eta.fill(0.0);

            trace!(epoch, integral = tally.integral, mass = tally.mass, "APIS epoch");
            if let Some(pb) = pb {
                pb.inc(1);
                pb.set_message(format!("I≈{:.4}", tally.integral));
            }
        }

        self.adapted = samplers.iter().map(|s| s.distribution().mu()).collect();

        let samples = n * self.epochs * self.iterations;
        let z = if samples == 0 {
            0.0
        } else {
            tally.mass / samples as f64
        };
        debug!(
            integral = tally.integral,
            normalization = z,
            proposals = n,
            samples,
            "APIS estimate"
        );
        Ok((tally.integral, z))
    }

    /// Folds one round of weighted samples into the running estimate of `I`.
    fn absorb(&self, tally: &mut Tally, z: &Array1<f64>, w: &Array1<f64>) {
        let mass = w.sum();
        if tally.mass + mass <= 0.0 {
            return;
        }
        let weighted: f64 = z
            .iter()
            .zip(w.iter())
            .filter(|&(_, &w)| w > 0.0)
            .map(|(&x, &w)| w * (self.function)(x))
            .sum();
        tally.integral = (tally.mass * tally.integral + weighted) / (tally.mass + mass);
        tally.mass += mass;
    }
}

/// Draws a random initial family of `size` proposals: means and standard deviations are both
/// sampled from `sampler`, the latter made non-negative.
pub fn apis_family<D: Distribution>(sampler: &mut Sampler<D>, size: usize) -> (Vec<f64>, Vec<f64>) {
    let mut means = Vec::with_capacity(size);
    let mut sigmas = Vec::with_capacity(size);
    for _ in 0..size {
        means.push(sampler.sample());
        sigmas.push(sampler.sample().abs());
    }
    (means, sigmas)
}
