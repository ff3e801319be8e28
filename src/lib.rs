//! Concurrent numerical integration of scalar functions.
//!
//! - [`quadrature`]: trapezoidal and Simpson rules, refined by doubling the grid with the
//!   evaluations spread over worker threads.
//! - [`monte_carlo`]: importance sampling over a proposal distribution, refined in batches by
//!   a pool of independently seeded workers.
//! - [`apis`]: adaptive population importance sampling of an unnormalized target.
//!
//! The first two implement the [`Integral`] trait; [`integrate`] is the short way in.
//!
//! ```rust
//! use std::sync::Arc;
//! use mini_quad::{integrate, Integral, QuadratureIntegral};
//!
//! assert!((integrate(|x| x.exp(), 0.0, 1.0, None).unwrap() - (1f64.exp() - 1.0)).abs() < 1e-5);
//!
//! let trapezoidal = QuadratureIntegral::trapezoidal(4).with_accuracy(1e-6);
//! trapezoidal.set_function(Arc::new(|x: f64| 3.0 * x * x)).unwrap();
//! assert!((trapezoidal.integrate(0.0, 2.0).unwrap() - 8.0).abs() < 1e-5);
//! ```

pub mod apis;
pub mod core;
pub mod distributions;
pub mod error;
pub mod expectation;
pub mod monte_carlo;
pub mod quadrature;
pub mod sampler;
pub mod stats;
pub mod stepper;

pub use crate::core::{integrate, Integral, IntegralState, Integrand, Stats};
pub use crate::error::{ConvergenceError, QuadError};
pub use crate::monte_carlo::MonteCarloIntegral;
pub use crate::quadrature::{QuadratureIntegral, Rule};
