/*!
# Expectation

Estimates `E[f(X)]` and the variance of `f(X)` for `X` drawn from a [`Distribution`], using
a fixed number of concurrent workers.

Each worker owns a private [`Sampler`] seeded from a worker-indexed seed list and computes a
Welford mean/variance over its own trials. The partial results are then folded into one
running [`RunningStats`] with the pairwise combination formula. Samplers persist across calls
to [`Expectation::refine`], so worker `k` always continues its own random stream: refining
twice with `t1` then `t2` trials per worker aggregates exactly the draws of a single refinement
with `t1 + t2` trials per worker.

## Example

```rust
use mini_quad::distributions::Uniform;
use mini_quad::expectation::Expectation;

let dist = Uniform::new(0.0, 10.0).unwrap();
let exp = Expectation::new(dist, |x: f64| x, vec![1, 2, 3, 4]);
let estimate = exp.refine(1_000, 4).unwrap();
assert_eq!(estimate.trials, 4_000);
assert!((estimate.value - 5.0).abs() < 0.5);
```
*/

use std::sync::{PoisonError, RwLock};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

use crate::distributions::Distribution;
use crate::error::QuadError;
use crate::sampler::Sampler;
use crate::stats::{Estimate, RunningStats};

/// The expectation of `function` under `distribution`.
///
/// `function` and `distribution` are shared by all workers and must therefore be `Sync`.
pub struct Expectation<D, F> {
    distribution: D,
    function: F,
    seeds: Vec<u64>,
    tally: RwLock<Tally<D>>,
}

/// Mutable state, only touched under the exclusive lock.
struct Tally<D> {
    samplers: Vec<Sampler<D>>,
    stats: RunningStats,
    experiments: usize,
    pool: Option<(usize, ThreadPool)>,
}

impl<D, F> Expectation<D, F>
where
    D: Distribution + Clone + Send + Sync,
    F: Fn(f64) -> f64 + Sync,
{
    /// Creates an expectation. `seeds[k]` seeds the sampler of worker `k`, so at least as
    /// many seeds as workers are needed when refining.
    pub fn new(distribution: D, function: F, seeds: Vec<u64>) -> Self {
        Self {
            distribution,
            function,
            seeds,
            tally: RwLock::new(Tally {
                samplers: Vec::new(),
                stats: RunningStats::new(),
                experiments: 0,
                pool: None,
            }),
        }
    }

    pub fn distribution(&self) -> &D {
        &self.distribution
    }

    /// Runs `trials` draws on each of `workers` concurrent workers and merges them into the
    /// running estimate.
    ///
    /// Fails with [`QuadError::InsufficientSeeds`] before drawing anything if fewer seeds than
    /// workers were supplied.
    pub fn refine(&self, trials: usize, workers: usize) -> Result<Estimate, QuadError> {
        if workers > self.seeds.len() {
            return Err(QuadError::InsufficientSeeds {
                workers,
                seeds: self.seeds.len(),
            });
        }

        let mut guard = self.tally.write().unwrap_or_else(PoisonError::into_inner);
        let tally = &mut *guard;
        if workers == 0 || trials == 0 {
            return Ok(Estimate::from_stats(&tally.stats, tally.experiments));
        }

        // Samplers are created once per worker and live as long as the expectation.
        while tally.samplers.len() < workers {
            let k = tally.samplers.len();
            tally
                .samplers
                .push(Sampler::new(self.distribution.clone(), self.seeds[k]));
        }

        // The pool is kept between refinements with the same worker count.
        let pool = match tally.pool.take() {
            Some((size, pool)) if size == workers => pool,
            _ => ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("expectation-worker-{i}"))
                .build()
                .map_err(|e| QuadError::WorkerPool(e.to_string()))?,
        };

        let function = &self.function;
        let samplers = &mut tally.samplers[..workers];
        let partials: Vec<RunningStats> = pool.install(|| {
            samplers
                .par_iter_mut()
                .map(|sampler| run_trials(sampler, function, trials))
                .collect()
        });
        tally.pool = Some((workers, pool));

        for partial in &partials {
            tally.stats.merge(partial);
        }
        tally.experiments += workers;

        let estimate = Estimate::from_stats(&tally.stats, tally.experiments);
        trace!(
            trials = estimate.trials,
            value = estimate.value,
            variance = ?estimate.variance,
            "refined expectation"
        );
        Ok(estimate)
    }

    /// The current estimate.
    pub fn result(&self) -> Estimate {
        let tally = self.tally.read().unwrap_or_else(PoisonError::into_inner);
        Estimate::from_stats(&tally.stats, tally.experiments)
    }
}

/// One worker's experiment: a Welford accumulation over `trials` draws.
fn run_trials<D, F>(sampler: &mut Sampler<D>, function: &F, trials: usize) -> RunningStats
where
    D: Distribution,
    F: Fn(f64) -> f64,
{
    let mut stats = RunningStats::new();
    for _ in 0..trials {
        stats.push(function(sampler.sample()));
    }
    stats
}
