/*!
# Monte-Carlo integration

Importance sampling estimate of `∫ f` over `[a, b]`: for a proposal density `π` whose support
is exactly `[a, b]`,

```text
∫ f(x) dx = E_π[ f(X) / π(X) ]
```

The expectation is refined in batches of `batch` trials on each of `workers` workers until
the 2σ confidence half-width of the estimate drops below the accuracy target, or the
evaluation budget would be exceeded. The half-width is only trusted after five batches, so a
few identical draws of a rare event do not pass for convergence.

## Example

```rust
use std::sync::Arc;
use mini_quad::core::Integral;
use mini_quad::monte_carlo::MonteCarloIntegral;

let scheme = MonteCarloIntegral::uniform(4, 1_000, vec![1, 2, 3, 4]).with_accuracy(1e-2);
scheme.set_function(Arc::new(|x: f64| 2.0 * x)).unwrap();
let value = scheme.integrate(0.0, 1.0).unwrap();
assert!((value - 1.0).abs() < 2e-2);
```
*/

use crate::core::{Configuration, Integral, IntegralState, Integrand, Stats};
use crate::distributions::{Distribution, Uniform};
use crate::error::{ConvergenceError, QuadError};
use crate::expectation::Expectation;

pub const DEFAULT_ACCURACY: f64 = 1e-3;
pub const DEFAULT_STEPS: usize = 100_000_000;

/// Batches to take before the half-width may stop a run.
const MIN_BATCHES: usize = 5;

/// Where the proposal for a run comes from.
enum Proposal<D> {
    Fixed(D),
    /// Built from the bounds of every run.
    Fit(fn(f64, f64) -> Result<D, QuadError>),
}

impl<D: Clone> Proposal<D> {
    fn resolve(&self, a: f64, b: f64) -> Result<D, QuadError> {
        match self {
            Proposal::Fixed(dist) => Ok(dist.clone()),
            Proposal::Fit(fit) => fit(a, b),
        }
    }
}

/// An [`Integral`] estimated by importance sampling from a proposal distribution.
pub struct MonteCarloIntegral<D> {
    proposal: Proposal<D>,
    workers: usize,
    batch: usize,
    seeds: Vec<u64>,
    config: Configuration,
}

impl<D> MonteCarloIntegral<D>
where
    D: Distribution + Clone + Send + Sync,
{
    /// Creates an integral sampling from `proposal`.
    ///
    /// Each refinement draws `batch` samples on each of `workers` workers (at least one).
    /// `seeds[k]` seeds worker `k`, so at least `workers` seeds are required.
    pub fn new(proposal: D, workers: usize, batch: usize, seeds: Vec<u64>) -> Self {
        Self::with_proposal(Proposal::Fixed(proposal), workers, batch, seeds)
    }

    fn with_proposal(proposal: Proposal<D>, workers: usize, batch: usize, seeds: Vec<u64>) -> Self {
        Self {
            proposal,
            workers: workers.max(1),
            batch,
            seeds,
            config: Configuration::new("monte-carlo", DEFAULT_ACCURACY, Some(DEFAULT_STEPS)),
        }
    }

    /// Sets the accuracy target, the 2σ half-width to reach (clamped to at least 1e-16).
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.config = self.config.with_accuracy(accuracy);
        self
    }

    /// Sets the evaluation budget; `None` removes it.
    pub fn with_steps(mut self, steps: Option<usize>) -> Self {
        self.config = self.config.with_steps(steps);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    /// The fixed proposal, if there is one.
    pub fn proposal(&self) -> Option<&D> {
        match &self.proposal {
            Proposal::Fixed(dist) => Some(dist),
            Proposal::Fit(_) => None,
        }
    }
}

impl MonteCarloIntegral<Uniform> {
    /// Creates an integral that samples uniformly over the bounds of each run.
    pub fn uniform(workers: usize, batch: usize, seeds: Vec<u64>) -> Self {
        Self::with_proposal(Proposal::Fit(Uniform::new), workers, batch, seeds)
    }
}

impl<D> Integral for MonteCarloIntegral<D>
where
    D: Distribution + Clone + Send + Sync,
{
    fn accuracy(&self) -> f64 {
        self.config.accuracy()
    }

    fn set_accuracy(&self, accuracy: f64) -> Result<f64, QuadError> {
        self.config.set_accuracy(accuracy)
    }

    fn steps(&self) -> Option<usize> {
        self.config.steps()
    }

    fn set_steps(&self, steps: Option<usize>) -> Result<Option<usize>, QuadError> {
        self.config.set_steps(steps)
    }

    fn set_function(&self, function: Integrand) -> Result<(), QuadError> {
        self.config.set_function(function)
    }

    fn integrate(&self, a: f64, b: f64) -> Result<f64, QuadError> {
        let run = self.config.begin(a, b)?;

        let proposal = match self.proposal.resolve(a, b) {
            Ok(proposal) => proposal,
            Err(err) => return Err(run.reject(err)),
        };
        let (min, max) = proposal.support();
        if min != a || max != b {
            return Err(run.reject(QuadError::SupportMismatch { min, max, a, b }));
        }
        if self.workers > self.seeds.len() {
            return Err(run.reject(QuadError::InsufficientSeeds {
                workers: self.workers,
                seeds: self.seeds.len(),
            }));
        }

        let Some(per_batch) = self.batch.checked_mul(self.workers) else {
            return Err(run.reject(QuadError::BatchOverflow {
                batch: self.batch,
                workers: self.workers,
            }));
        };
        let function = run.function.clone();
        let density = proposal.clone();
        let expectation = Expectation::new(
            proposal,
            move |x: f64| match density.prob(x) {
                p if p > 0.0 => function(x) / p,
                _ => 0.0,
            },
            self.seeds.clone(),
        );

        let mut value = 0.0;
        let mut steps = 0;
        let mut batches = 0;
        let mut half_width = f64::INFINITY;
        let mut converged = false;
        while per_batch > 0 && run.allows(steps, per_batch) {
            let estimate = match expectation.refine(self.batch, self.workers) {
                Ok(estimate) => estimate,
                Err(err) => return Err(run.reject(err)),
            };
            steps += per_batch;
            batches += 1;
            value = estimate.value;
            half_width = estimate.half_width().unwrap_or(f64::INFINITY);
            if batches >= MIN_BATCHES && half_width < run.accuracy {
                converged = true;
                break;
            }
        }

        let error = if steps == 0 {
            Some(ConvergenceError::MinSteps)
        } else if batches < MIN_BATCHES {
            Some(ConvergenceError::InsufficientSteps)
        } else if !converged {
            Some(ConvergenceError::Converge)
        } else {
            None
        };
        let stats = Stats {
            steps,
            accuracy: half_width,
            error,
        };
        run.finish(value, stats)
    }

    fn stats(&self) -> Option<Stats> {
        self.config.stats()
    }

    fn state(&self) -> IntegralState {
        self.config.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Linear, Normal};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn seeds(n: usize) -> Vec<u64> {
        (0..n as u64).map(|i| 42 + i).collect()
    }

    fn counted<F>(calls: &Arc<AtomicUsize>, f: F) -> Integrand
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        let calls = calls.clone();
        Arc::new(move |x| {
            calls.fetch_add(1, Ordering::SeqCst);
            f(x)
        })
    }

    #[test]
    fn test_density_integrates_to_one() {
        let scheme = MonteCarloIntegral::new(Uniform::new(0.0, 2.0).unwrap(), 4, 100, seeds(4));
        scheme.set_function(Arc::new(|_: f64| 0.5)).unwrap();
        assert_abs_diff_eq!(scheme.integrate(0.0, 2.0).unwrap(), 1.0, epsilon = 1e-12);
        let stats = scheme.stats().unwrap();
        assert_eq!(stats.steps, 5 * 400);
        assert_eq!(stats.error, None);
        assert_eq!(scheme.state(), IntegralState::Converged);
    }

    #[test]
    fn test_importance_sampling_removes_variance() {
        // f(x) = x against the density 2x leaves a constant ratio.
        let scheme = MonteCarloIntegral::new(Linear::new(0.0, 1.0, 2.0, 0.0).unwrap(), 2, 50, seeds(2));
        scheme.set_function(Arc::new(|x: f64| x)).unwrap();
        assert_abs_diff_eq!(scheme.integrate(0.0, 1.0).unwrap(), 0.5, epsilon = 1e-9);
        assert_eq!(scheme.stats().unwrap().steps, 5 * 100);
    }

    #[test]
    fn test_uniform_quadratic() {
        let accuracy = 0.05;
        let scheme = MonteCarloIntegral::uniform(4, 1_000, seeds(4)).with_accuracy(accuracy);
        scheme.set_function(Arc::new(|x: f64| x * x)).unwrap();
        let value = scheme.integrate(0.0, 3.0).unwrap();
        assert_abs_diff_eq!(value, 9.0, epsilon = 2.0 * accuracy);
        let stats = scheme.stats().unwrap();
        assert!(stats.accuracy < accuracy);
        assert_eq!(stats.steps % 4_000, 0);
    }

    #[test]
    fn test_normal_proposal_over_real_line() {
        let accuracy = 1e-2;
        let scheme = MonteCarloIntegral::new(Normal::new(0.0, 1.0).unwrap(), 4, 1_000, seeds(4))
            .with_accuracy(accuracy);
        scheme.set_function(Arc::new(|x: f64| (-x * x).exp())).unwrap();
        let value = scheme.integrate(f64::NEG_INFINITY, f64::INFINITY).unwrap();
        assert_abs_diff_eq!(value, PI.sqrt(), epsilon = 2.0 * accuracy);
    }

    #[test]
    fn test_support_mismatch_draws_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheme = MonteCarloIntegral::new(Uniform::new(0.0, 1.0).unwrap(), 2, 10, seeds(2));
        scheme.set_function(counted(&calls, |x| x)).unwrap();
        let err = scheme.integrate(0.0, 2.0).unwrap_err();
        assert!(matches!(err, QuadError::SupportMismatch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheme.state(), IntegralState::ConfigError);
    }

    #[test]
    fn test_insufficient_seeds_draws_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheme = MonteCarloIntegral::uniform(4, 10, seeds(2));
        scheme.set_function(counted(&calls, |x| x)).unwrap();
        let err = scheme.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err, QuadError::InsufficientSeeds { workers: 4, seeds: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_uniform_range_is_rejected() {
        let scheme = MonteCarloIntegral::uniform(1, 10, seeds(1));
        scheme.set_function(Arc::new(|x: f64| x)).unwrap();
        assert!(scheme.integrate(1.0, 1.0).unwrap_err().is_config());
    }

    #[test]
    fn test_budget_below_one_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheme = MonteCarloIntegral::uniform(2, 100, seeds(2)).with_steps(Some(199));
        scheme.set_function(counted(&calls, |x| x)).unwrap();
        let err = scheme.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::MinSteps));
        assert_eq!(err.estimate(), Some(0.0));
        assert_eq!(scheme.stats().unwrap().steps, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_batch_is_min_steps() {
        let scheme = MonteCarloIntegral::uniform(2, 0, seeds(2)).with_steps(None);
        scheme.set_function(Arc::new(|x: f64| x)).unwrap();
        let err = scheme.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::MinSteps));
    }

    #[test]
    fn test_rare_event_is_not_converged_early() {
        // Early batches are likely to miss (0.99, 1] entirely and have zero variance.
        let calls = Arc::new(AtomicUsize::new(0));
        let scheme = MonteCarloIntegral::uniform(2, 20, seeds(2))
            .with_accuracy(1e-3)
            .with_steps(Some(1_000_000));
        let rare = |x: f64| if x > 0.99 { 1.0 } else { 0.0 };
        scheme.set_function(counted(&calls, rare)).unwrap();
        let _ = scheme.integrate(0.0, 1.0);
        let stats = scheme.stats().unwrap();
        assert!(stats.steps >= 5 * 40, "stopped after {} steps", stats.steps);
        assert_eq!(stats.steps % 40, 0);
        assert_eq!(stats.steps, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn test_budget_below_five_batches() {
        let scheme = MonteCarloIntegral::uniform(2, 20, seeds(2)).with_steps(Some(199));
        scheme.set_function(Arc::new(|x: f64| if x > 0.99 { 1.0 } else { 0.0 })).unwrap();
        let err = scheme.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::InsufficientSteps));
        assert_eq!(scheme.stats().unwrap().steps, 4 * 40);
        assert_eq!(scheme.state(), IntegralState::Exhausted);
    }

    #[test]
    fn test_overflowing_batch_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheme = MonteCarloIntegral::uniform(2, usize::MAX, seeds(2)).with_steps(None);
        scheme.set_function(counted(&calls, |x| x)).unwrap();
        let err = scheme.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err, QuadError::BatchOverflow { batch: usize::MAX, workers: 2 });
        assert!(err.is_config());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheme.state(), IntegralState::ConfigError);
    }

    #[test]
    fn test_exhausted_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheme = MonteCarloIntegral::uniform(2, 100, seeds(2))
            .with_accuracy(1e-16)
            .with_steps(Some(1_000));
        scheme.set_function(counted(&calls, |x| x.exp())).unwrap();
        let err = scheme.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::Converge));
        assert_abs_diff_eq!(err.estimate().unwrap(), 1.0_f64.exp() - 1.0, epsilon = 0.1);
        let stats = scheme.stats().unwrap();
        assert_eq!(stats.steps, 1_000);
        assert_eq!(stats.steps, calls.load(Ordering::SeqCst));
        assert_eq!(scheme.state(), IntegralState::Exhausted);
    }

    #[test]
    fn test_fixed_seeds_reproduce() {
        let run = || {
            let scheme = MonteCarloIntegral::uniform(3, 200, seeds(3)).with_steps(Some(3_000));
            scheme.set_function(Arc::new(|x: f64| x.sin())).unwrap();
            scheme.integrate(0.0, 2.0)
        };
        assert_eq!(run(), run());
    }
}
