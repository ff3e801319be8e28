//! Estimates the second moment and normalization of an unnormalized Gaussian with APIS,
//! starting from a random proposal family.

use mini_quad::apis::{apis_family, Apis};
use mini_quad::distributions::Uniform;
use mini_quad::sampler::{noise, seed, Sampler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    const PROPOSALS: usize = 16;
    const SIGMA: f64 = 1.5;

    // Target: N(2, 1.5²) without its normalizing constant.
    let target = |x: f64| (-0.5 * ((x - 2.0) / SIGMA).powi(2)).exp();

    let mut family = Sampler::new(Uniform::new(-10.0, 10.0)?, seed());
    let (means, sigmas) = apis_family(&mut family, PROPOSALS);

    let mut apis = Apis::new(|x: f64| x * x, target)
        .with_epochs(128)
        .with_iterations(64)
        .with_family(means, sigmas, noise(PROPOSALS));
    let (i, z) = apis.estimate_with_progress()?;

    println!("E[x²] ≈ {i:.4} (exact {:.4})", 4.0 + SIGMA * SIGMA);
    println!(
        "Z ≈ {z:.4} (exact {:.4})",
        SIGMA * (2.0 * std::f64::consts::PI).sqrt()
    );
    println!("adapted means: {:.2?}", apis.adapted_means());
    Ok(())
}
