use std::sync::Arc;

use mini_quad::{integrate, Integral, MonteCarloIntegral, QuadratureIntegral};

fn main() {
    // Simpson's rule on a single worker.
    let value = integrate(|x: f64| x * x, 0.0, 3.0, None).unwrap();
    assert!((value - 9.0).abs() < 1e-5);

    // The trapezoidal rule with 4 workers and a tighter target.
    let trapezoidal = QuadratureIntegral::trapezoidal(4).with_accuracy(1e-7);
    trapezoidal.set_function(Arc::new(|x: f64| x.sin())).unwrap();
    let value = trapezoidal.integrate(0.0, std::f64::consts::PI).unwrap();
    let stats = trapezoidal.stats().unwrap();
    println!("trapezoidal: {value:.8} after {} evaluations", stats.steps);

    // Uniform Monte Carlo with 4 seeded workers drawing 1,000 samples per batch.
    let monte_carlo = MonteCarloIntegral::uniform(4, 1_000, vec![1, 2, 3, 4]).with_accuracy(1e-2);
    monte_carlo.set_function(Arc::new(|x: f64| x.sin())).unwrap();
    let value = monte_carlo.integrate(0.0, std::f64::consts::PI).unwrap();
    let stats = monte_carlo.stats().unwrap();
    println!(
        "monte carlo: {value:.4} ± {:.4} after {} evaluations",
        stats.accuracy, stats.steps
    );
}
