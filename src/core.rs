//! The [`Integral`] contract shared by every integration scheme, the statistics a run
//! reports, and the guarded configuration the schemes are built on.
//!
//! An integral moves through a small state machine:
//!
//! ```text
//! Idle -> Running -> { Converged, Exhausted, ConfigError }
//! ```
//!
//! While it is `Running`, configuration changes and further runs are rejected with
//! [`QuadError::Busy`] instead of being queued. Any finished state accepts new configuration.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::{ConvergenceError, QuadError};
use crate::quadrature::QuadratureIntegral;

/// A scalar integrand. Schemes with several workers call it concurrently.
pub type Integrand = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Accuracies are clamped to at least this value.
pub const MIN_ACCURACY: f64 = 1e-16;

/// Where an integral is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegralState {
    /// Never run.
    Idle,
    /// A call to `integrate` is in flight.
    Running,
    /// The last run met its accuracy target.
    Converged,
    /// The last run ran out of steps.
    Exhausted,
    /// The last run was rejected because of its configuration or arguments.
    ConfigError,
}

/// Statistics about the last integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    /// Number of function evaluations.
    pub steps: usize,
    /// Estimated absolute error: the last change of the estimate for quadrature rules, the
    /// 2σ confidence half-width for Monte Carlo schemes.
    pub accuracy: f64,
    /// `None` if the accuracy target was met.
    pub error: Option<ConvergenceError>,
}

/// An integration procedure that can be configured and evaluated on different bounds.
///
/// All methods take `&self`; implementors guard their configuration internally, so an
/// integral can be shared between threads. Only one `integrate` call runs at a time.
pub trait Integral {
    /// The accuracy target.
    fn accuracy(&self) -> f64;

    /// Sets the accuracy target, clamped to at least [`MIN_ACCURACY`], and returns the
    /// stored value.
    fn set_accuracy(&self, accuracy: f64) -> Result<f64, QuadError>;

    /// Maximum number of function evaluations per run; `None` means unbounded.
    fn steps(&self) -> Option<usize>;

    /// Sets the evaluation budget and returns the stored value.
    fn set_steps(&self, steps: Option<usize>) -> Result<Option<usize>, QuadError>;

    /// Sets the function to integrate.
    fn set_function(&self, function: Integrand) -> Result<(), QuadError>;

    /// Integrates the configured function over `[a, b]`.
    ///
    /// Numeric failures are reported as [`QuadError::Convergence`], which carries the best
    /// effort estimate. Everything else is a configuration error.
    fn integrate(&self, a: f64, b: f64) -> Result<f64, QuadError>;

    /// Statistics of the last completed run.
    fn stats(&self) -> Option<Stats>;

    /// Where the integral is in its lifecycle.
    fn state(&self) -> IntegralState;
}

/// Integrates `function` over `[a, b]` with `scheme`.
///
/// Without a scheme this uses Simpson's rule on a single worker, so the function is never
/// called concurrently.
///
/// # Examples
///
/// ```rust
/// use mini_quad::core::integrate;
///
/// let value = integrate(|x| x * x, 0.0, 10.0, None).unwrap();
/// assert!((value - 1000.0 / 3.0).abs() < 1e-5);
/// ```
pub fn integrate<F>(function: F, a: f64, b: f64, scheme: Option<&dyn Integral>) -> Result<f64, QuadError>
where
    F: Fn(f64) -> f64 + Send + Sync + 'static,
{
    match scheme {
        Some(scheme) => {
            scheme.set_function(Arc::new(function))?;
            scheme.integrate(a, b)
        }
        None => {
            let scheme = QuadratureIntegral::simpson(1);
            scheme.set_function(Arc::new(function))?;
            scheme.integrate(a, b)
        }
    }
}

struct Settings {
    function: Option<Integrand>,
    accuracy: f64,
    steps: Option<usize>,
    state: IntegralState,
    stats: Option<Stats>,
}

/// Configuration shared by all schemes, behind one reader/writer lock.
pub(crate) struct Configuration {
    scheme: &'static str,
    settings: RwLock<Settings>,
}

impl Configuration {
    pub(crate) fn new(scheme: &'static str, accuracy: f64, steps: Option<usize>) -> Self {
        Self {
            scheme,
            settings: RwLock::new(Settings {
                function: None,
                accuracy: accuracy.max(MIN_ACCURACY),
                steps,
                state: IntegralState::Idle,
                stats: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access for mutators, refused while a run is in flight.
    fn write_idle(&self) -> Result<RwLockWriteGuard<'_, Settings>, QuadError> {
        let settings = self.write();
        if settings.state == IntegralState::Running {
            return Err(QuadError::Busy);
        }
        Ok(settings)
    }

    pub(crate) fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.settings_mut().accuracy = accuracy.max(MIN_ACCURACY);
        self
    }

    pub(crate) fn with_steps(mut self, steps: Option<usize>) -> Self {
        self.settings_mut().steps = steps;
        self
    }

    fn settings_mut(&mut self) -> &mut Settings {
        self.settings.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn accuracy(&self) -> f64 {
        self.read().accuracy
    }

    pub(crate) fn set_accuracy(&self, accuracy: f64) -> Result<f64, QuadError> {
        let mut settings = self.write_idle()?;
        settings.accuracy = accuracy.max(MIN_ACCURACY);
        Ok(settings.accuracy)
    }

    pub(crate) fn steps(&self) -> Option<usize> {
        self.read().steps
    }

    pub(crate) fn set_steps(&self, steps: Option<usize>) -> Result<Option<usize>, QuadError> {
        let mut settings = self.write_idle()?;
        settings.steps = steps;
        Ok(settings.steps)
    }

    pub(crate) fn set_function(&self, function: Integrand) -> Result<(), QuadError> {
        self.write_idle()?.function = Some(function);
        Ok(())
    }

    pub(crate) fn stats(&self) -> Option<Stats> {
        self.read().stats
    }

    pub(crate) fn state(&self) -> IntegralState {
        self.read().state
    }

    /// Moves to `Running` and snapshots the configuration for one run over `[a, b]`.
    pub(crate) fn begin(&self, a: f64, b: f64) -> Result<Run<'_>, QuadError> {
        let mut settings = self.write_idle()?;
        let function = match &settings.function {
            _ if !(a <= b) => Err(QuadError::InvalidBounds { a, b }),
            None => Err(QuadError::MissingFunction),
            Some(function) => Ok(function.clone()),
        };
        let function = function.map_err(|err| {
            settings.state = IntegralState::ConfigError;
            err
        })?;
        settings.state = IntegralState::Running;
        Ok(Run {
            config: self,
            function,
            accuracy: settings.accuracy,
            steps: settings.steps,
            done: false,
        })
    }
}

/// A snapshot of the configuration for one run. Dropping it without finishing (for example
/// when the integrand panics) returns the integral to `Idle`.
pub(crate) struct Run<'a> {
    config: &'a Configuration,
    pub(crate) function: Integrand,
    pub(crate) accuracy: f64,
    pub(crate) steps: Option<usize>,
    done: bool,
}

impl Run<'_> {
    /// Whether `steps` more evaluations fit into the budget after `taken`.
    pub(crate) fn allows(&self, taken: usize, steps: usize) -> bool {
        self.steps.map_or(true, |max| taken + steps <= max)
    }

    /// Ends the run with a configuration error detected after it started.
    pub(crate) fn reject(mut self, err: QuadError) -> QuadError {
        self.done = true;
        self.config.write().state = IntegralState::ConfigError;
        err
    }

    /// Records the statistics and ends the run.
    pub(crate) fn finish(mut self, value: f64, stats: Stats) -> Result<f64, QuadError> {
        self.done = true;
        let mut settings = self.config.write();
        settings.stats = Some(stats);
        settings.state = match stats.error {
            None => IntegralState::Converged,
            Some(_) => IntegralState::Exhausted,
        };
        drop(settings);

        match stats.error {
            None => {
                debug!(
                    scheme = self.config.scheme,
                    value,
                    steps = stats.steps,
                    accuracy = stats.accuracy,
                    "integral converged"
                );
                Ok(value)
            }
            Some(kind) => {
                warn!(
                    scheme = self.config.scheme,
                    value,
                    steps = stats.steps,
                    accuracy = stats.accuracy,
                    target = self.accuracy,
                    "integral stopped early: {kind}"
                );
                Err(QuadError::from((kind, value)))
            }
        }
    }
}

impl Drop for Run<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.config.write().state = IntegralState::Idle;
        }
    }
}
