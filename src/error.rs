//! Error types shared by all integration schemes.

use thiserror::Error;

/// Classification of a numeric run that did not reach its accuracy target.
///
/// This is what [`Stats::error`](crate::core::Stats) records. `None` there means the run
/// converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConvergenceError {
    /// The step budget ran out before the accuracy target was met.
    #[error("integral did not converge")]
    Converge,
    /// The step budget is lower than the minimum number of evaluations the scheme needs.
    #[error("the number of steps allowed is lower than the min needed")]
    MinSteps,
    /// The step budget ran out before enough refinements were taken to judge convergence.
    #[error("not enough steps taken to determine convergence")]
    InsufficientSteps,
}

/// Errors returned by integrals, expectations and the APIS estimator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuadError {
    /// A run finished without meeting its target. `estimate` carries the best effort value.
    #[error("{kind} (estimate: {estimate})")]
    Convergence {
        kind: ConvergenceError,
        estimate: f64,
    },
    #[error("lower bound {a} is greater than upper bound {b}")]
    InvalidBounds { a: f64, b: f64 },
    #[error("support [{min}, {max}] of the distribution must match the bounds [{a}, {b}]")]
    SupportMismatch { min: f64, max: f64, a: f64, b: f64 },
    #[error("{workers} workers were requested but only {seeds} seeds were supplied")]
    InsufficientSeeds { workers: usize, seeds: usize },
    #[error("a batch of {batch} trials on {workers} workers overflows the step counter")]
    BatchOverflow { batch: usize, workers: usize },
    #[error("need the same amount of means ({means}), sigmas ({sigmas}) and seeds ({seeds})")]
    FamilyMismatch {
        means: usize,
        sigmas: usize,
        seeds: usize,
    },
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
    #[error("no function was set to integrate")]
    MissingFunction,
    /// Configuration changes and new runs are rejected while a run is in flight.
    #[error("the integral is running; configuration can not change until it finishes")]
    Busy,
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl QuadError {
    /// Best effort value of an unconverged run.
    pub fn estimate(&self) -> Option<f64> {
        match self {
            QuadError::Convergence { estimate, .. } => Some(*estimate),
            _ => None,
        }
    }

    /// Convergence classification, if this is a numeric error.
    pub fn kind(&self) -> Option<ConvergenceError> {
        match self {
            QuadError::Convergence { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the error stems from caller misuse rather than numerical difficulty.
    /// Configuration errors are not worth retrying without changing the inputs.
    pub fn is_config(&self) -> bool {
        !matches!(self, QuadError::Convergence { .. } | QuadError::Busy)
    }
}

impl From<(ConvergenceError, f64)> for QuadError {
    fn from((kind, estimate): (ConvergenceError, f64)) -> Self {
        QuadError::Convergence { kind, estimate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_error_carries_estimate() {
        let err = QuadError::from((ConvergenceError::Converge, 1.5));
        assert_eq!(err.estimate(), Some(1.5));
        assert_eq!(err.kind(), Some(ConvergenceError::Converge));
        assert!(!err.is_config());
    }

    #[test]
    fn test_config_errors_are_flagged() {
        let err = QuadError::InvalidBounds { a: 1.0, b: 0.0 };
        assert!(err.is_config());
        assert_eq!(err.estimate(), None);
        assert!(!QuadError::Busy.is_config());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ConvergenceError::MinSteps.to_string(),
            "the number of steps allowed is lower than the min needed"
        );
        let err = QuadError::InsufficientSeeds {
            workers: 4,
            seeds: 2,
        };
        assert_eq!(
            err.to_string(),
            "4 workers were requested but only 2 seeds were supplied"
        );
    }
}
