/*!
# Quadrature

Deterministic integration with the composite trapezoidal rule or Simpson's rule.

Both rules sit on top of the same [`Stepper`](crate::stepper::Stepper), which keeps doubling
the resolution and hands back trapezoidal estimates `T_k`. The trapezoidal rule uses them as
they are; Simpson's rule combines consecutive ones, `S_k = (4 T_k - T_{k-1}) / 3`.

A run stops as soon as two consecutive estimates differ by less than the accuracy target,
but only once a round adds more than 32 new points, so that early coincidences on coarse
grids are not mistaken for convergence. It also stops when the next round would exceed the
evaluation budget, which is then reported as a [`ConvergenceError`].

## Example

```rust
use std::sync::Arc;
use mini_quad::core::Integral;
use mini_quad::quadrature::QuadratureIntegral;

let simpson = QuadratureIntegral::simpson(4).with_accuracy(1e-8);
simpson.set_function(Arc::new(|x: f64| x.sin())).unwrap();
let value = simpson.integrate(0.0, std::f64::consts::PI).unwrap();
assert!((value - 2.0).abs() < 1e-8);
assert!(simpson.stats().unwrap().steps <= 1_000_000);
```
*/

use std::thread;

use crate::core::{Configuration, Integral, IntegralState, Integrand, Run, Stats};
use crate::error::{ConvergenceError, QuadError};
use crate::stepper::Stepper;

pub const DEFAULT_ACCURACY: f64 = 1e-5;
pub const DEFAULT_STEPS: usize = 1_000_000;

/// Rounds must add more than this many points before convergence is trusted.
const CONFIDENCE_FLOOR: usize = 1 << 5;

/// Which estimator to build from the trapezoidal sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Trapezoidal,
    Simpson,
}

impl Rule {
    /// Evaluations needed for the first estimate.
    pub fn min_steps(self) -> usize {
        match self {
            Rule::Trapezoidal => 2,
            Rule::Simpson => 3,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Rule::Trapezoidal => "trapezoidal",
            Rule::Simpson => "simpson",
        }
    }
}

/// An [`Integral`] evaluated with a trapezoidal or Simpson rule on a pool of workers.
pub struct QuadratureIntegral {
    rule: Rule,
    workers: usize,
    config: Configuration,
}

impl QuadratureIntegral {
    /// Creates an integral using `rule`. Fewer than one worker means one.
    ///
    /// With more than one worker the integrand is called concurrently.
    pub fn new(rule: Rule, workers: usize) -> Self {
        Self {
            rule,
            workers: workers.max(1),
            config: Configuration::new(rule.name(), DEFAULT_ACCURACY, Some(DEFAULT_STEPS)),
        }
    }

    pub fn trapezoidal(workers: usize) -> Self {
        Self::new(Rule::Trapezoidal, workers)
    }

    pub fn simpson(workers: usize) -> Self {
        Self::new(Rule::Simpson, workers)
    }

    /// Sets the accuracy target (clamped to at least 1e-16).
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.config = self.config.with_accuracy(accuracy);
        self
    }

    /// Sets the evaluation budget; `None` removes it.
    pub fn with_steps(mut self, steps: Option<usize>) -> Self {
        self.config = self.config.with_steps(steps);
        self
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drives the stepper until the estimate settles or the budget is spent.
    fn converge(&self, stepper: &mut Stepper, run: &Run<'_>) -> (f64, Stats) {
        let mut trap = 0.0;
        let mut estimate = 0.0;
        // The first estimate: T_0 for the trapezoidal rule, S_1 for Simpson.
        if let Some(t0) = stepper.next() {
            trap = t0;
            estimate = t0;
            if self.rule == Rule::Simpson {
                if let Some(t1) = stepper.next() {
                    estimate = (4.0 * t1 - t0) / 3.0;
                    trap = t1;
                }
            }
        }

        let mut previous = None;
        let mut confident = false;
        let mut converged = false;
        let mut n = match self.rule {
            Rule::Trapezoidal => 1,
            Rule::Simpson => 2,
        };
        while run.allows(stepper.evaluations(), n) {
            let Some(t) = stepper.next() else { break };
            let last = estimate;
            estimate = match self.rule {
                Rule::Trapezoidal => t,
                Rule::Simpson => (4.0 * t - trap) / 3.0,
            };
            trap = t;
            previous = Some(last);

            confident = n > CONFIDENCE_FLOOR;
            if confident && (estimate - last).abs() < run.accuracy {
                converged = true;
                break;
            }
            n *= 2;
        }

        let error = match (converged, confident) {
            (true, _) => None,
            (false, true) => Some(ConvergenceError::Converge),
            (false, false) => Some(ConvergenceError::InsufficientSteps),
        };
        let stats = Stats {
            steps: stepper.evaluations(),
            accuracy: previous.map_or(f64::INFINITY, |p: f64| (estimate - p).abs()),
            error,
        };
        (estimate, stats)
    }
}

impl Integral for QuadratureIntegral {
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
        if !run.allows(0, self.rule.min_steps()) {
            let stats = Stats {
                steps: 0,
                accuracy: f64::INFINITY,
                error: Some(ConvergenceError::MinSteps),
            };
            return run.finish(0.0, stats);
        }

        let function = run.function.clone();
        let (value, stats) = thread::scope(|scope| {
            let mut stepper = Stepper::spawn(scope, self.workers, &*function, a, b);
            self.converge(&mut stepper, &run)
        });
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
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn with_function<F>(integral: QuadratureIntegral, f: F) -> QuadratureIntegral
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        integral.set_function(Arc::new(f)).unwrap();
        integral
    }

    #[test]
    fn test_defaults() {
        let trap = QuadratureIntegral::trapezoidal(0);
        assert_eq!(trap.workers(), 1);
        assert_eq!(trap.accuracy(), DEFAULT_ACCURACY);
        assert_eq!(trap.steps(), Some(DEFAULT_STEPS));
        assert_eq!(trap.state(), IntegralState::Idle);
        assert_eq!(trap.stats(), None);
    }

    #[test]
    fn test_trapezoidal_quadratic() {
        let trap = with_function(QuadratureIntegral::trapezoidal(4), |x| x * x);
        let value = trap.integrate(0.0, 10.0).unwrap();
        assert_abs_diff_eq!(value, 1000.0 / 3.0, epsilon = 1e-4);
        let stats = trap.stats().unwrap();
        assert!(stats.accuracy < 1e-5);
        assert_eq!(stats.error, None);
        assert_eq!(trap.state(), IntegralState::Converged);
    }

    #[test]
    fn test_simpson_is_exact_for_cubics() {
        let simp = with_function(QuadratureIntegral::simpson(2), |x| x * x * x - 2.0 * x);
        let value = simp.integrate(-1.0, 3.0).unwrap();
        // x^4/4 - x^2 from -1 to 3
        assert_abs_diff_eq!(value, (81.0 / 4.0 - 9.0) - (0.25 - 1.0), epsilon = 1e-9);
        // Exactness means the first confident round already settles.
        let stats = simp.stats().unwrap();
        assert_eq!(stats.steps, 3 + 2 + 4 + 8 + 16 + 32 + 64);
    }

    #[test]
    fn test_steps_match_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let trap = with_function(QuadratureIntegral::trapezoidal(3), move |x: f64| {
            counter.fetch_add(1, Ordering::SeqCst);
            x.exp()
        })
        .with_steps(Some(1000));
        let _ = trap.integrate(0.0, 1.0);
        let stats = trap.stats().unwrap();
        assert_eq!(stats.steps, calls.load(Ordering::SeqCst));
        assert!(stats.steps <= 1000);
    }

    #[test]
    fn test_budget_below_minimum() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let simp = with_function(QuadratureIntegral::simpson(1), move |x: f64| {
            counter.fetch_add(1, Ordering::SeqCst);
            x
        })
        .with_steps(Some(2));
        let err = simp.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::MinSteps));
        assert_eq!(err.estimate(), Some(0.0));
        assert_eq!(simp.stats().unwrap().steps, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(simp.state(), IntegralState::Exhausted);
    }

    #[test]
    fn test_small_budget_is_insufficient() {
        // 2 + 1 + 2 + 4 + 8 + 16 = 33 evaluations, never past the confidence floor.
        let trap = with_function(QuadratureIntegral::trapezoidal(1), |x: f64| x * x).with_steps(Some(40));
        let err = trap.integrate(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::InsufficientSteps));
        assert_abs_diff_eq!(err.estimate().unwrap(), 1.0 / 3.0, epsilon = 1e-2);
        assert_eq!(trap.stats().unwrap().steps, 33);
    }

    #[test]
    fn test_exhausted_budget_does_not_converge() {
        let simp = with_function(QuadratureIntegral::simpson(2), |x: f64| (50.0 * x).sin())
            .with_accuracy(1e-16)
            .with_steps(Some(200));
        let err = simp.integrate(0.0, 10.0).unwrap_err();
        assert_eq!(err.kind(), Some(ConvergenceError::Converge));
        let stats = simp.stats().unwrap();
        assert!(stats.steps <= 200);
        assert!(stats.accuracy.is_finite());
    }

    #[test]
    fn test_unbounded_budget() {
        let trap = with_function(QuadratureIntegral::trapezoidal(2), |x: f64| x.cos()).with_steps(None);
        let value = trap.integrate(0.0, 1.0).unwrap();
        assert_abs_diff_eq!(value, 1.0_f64.sin(), epsilon = 1e-4);
    }

    #[test]
    fn test_empty_range() {
        let simp = with_function(QuadratureIntegral::simpson(1), |x: f64| x + 1.0);
        assert_abs_diff_eq!(simp.integrate(2.0, 2.0).unwrap(), 0.0);
    }

    #[test]
    fn test_reversed_bounds() {
        let simp = with_function(QuadratureIntegral::simpson(1), |x: f64| x);
        let err = simp.integrate(1.0, -1.0).unwrap_err();
        assert!(err.is_config());
        assert_eq!(simp.state(), IntegralState::ConfigError);
        assert_eq!(simp.stats(), None);
    }

    #[test]
    fn test_missing_function() {
        let trap = QuadratureIntegral::trapezoidal(1);
        assert_eq!(trap.integrate(0.0, 1.0), Err(QuadError::MissingFunction));
    }

    #[test]
    fn test_panicking_integrand_resets_state() {
        let trap = with_function(QuadratureIntegral::trapezoidal(2), |x: f64| {
            if x > 0.5 {
                panic!("outside domain");
            }
            x
        });
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| trap.integrate(0.0, 1.0)));
        assert!(outcome.is_err());
        assert_eq!(trap.state(), IntegralState::Idle);
        assert!(trap.set_accuracy(1e-3).is_ok());
    }
}
