/*!
Defines the one-dimensional probability distributions used to draw samples and to weight
them. Every distribution exposes an inverse CDF ([`Distribution::transform`]) that maps a
uniform deviate to a draw, its density ([`Distribution::prob`]) and its support.

The family holds a unit uniform, a uniform on `[a, b]`, a linear density on `[a, b]` and a
normal distribution: the proposals of the Monte Carlo integrals and the Gaussian family of
APIS.

# Examples

```rust
use mini_quad::distributions::{Distribution, Linear, Normal, Uniform};

let uniform = Uniform::new(0.0, 10.0).unwrap();
assert_eq!(uniform.prob(5.0), 0.1);
assert_eq!(uniform.support(), (0.0, 10.0));

// A density proportional to 2x on [0, 1].
let linear = Linear::new(0.0, 1.0, 2.0, 0.0).unwrap();
assert!((linear.transform(0.25) - 0.5).abs() < 1e-12);

let normal = Normal::new(3.0, 2.0).unwrap();
assert!((normal.transform(0.5) - 3.0).abs() < 1e-12);
```
*/

use std::f64::consts::PI;

use crate::error::QuadError;

/// A continuous distribution over the real line that can be sampled by inversion.
///
/// `transform` must map uniform deviates from `[0, 1)` to values whose density matches
/// `prob` almost everywhere, and `prob` must vanish outside of `support`.
pub trait Distribution {
    /// Inverse CDF: maps a uniform deviate to a draw from this distribution.
    fn transform(&self, u: f64) -> f64;

    /// Probability density at `x`.
    fn prob(&self, x: f64) -> f64;

    /// Smallest interval `(min, max)` outside of which the density is zero.
    fn support(&self) -> (f64, f64);
}

/// The uniform distribution on `[0, 1)`. This is what a sampler without a specific
/// distribution hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Unit;

impl Distribution for Unit {
    fn transform(&self, u: f64) -> f64 {
        u
    }

    fn prob(&self, x: f64) -> f64 {
        if (0.0..=1.0).contains(&x) {
            1.0
        } else {
            0.0
        }
    }

    fn support(&self) -> (f64, f64) {
        (0.0, 1.0)
    }
}

/// The uniform distribution on `[a, b]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uniform {
    a: f64,
    b: f64,
}

impl Uniform {
    /// Creates a uniform distribution on `[a, b]`. Fails unless `a < b` and both are finite.
    pub fn new(a: f64, b: f64) -> Result<Self, QuadError> {
        if !(a.is_finite() && b.is_finite() && a < b) {
            return Err(QuadError::InvalidDistribution(format!(
                "uniform range [{a}, {b}] must be finite and non-empty"
            )));
        }
        Ok(Self { a, b })
    }
}

impl Distribution for Uniform {
    fn transform(&self, u: f64) -> f64 {
        self.a + (self.b - self.a) * u
    }

    fn prob(&self, x: f64) -> f64 {
        if x < self.a || x > self.b {
            return 0.0;
        }
        1.0 / (self.b - self.a)
    }

    fn support(&self) -> (f64, f64) {
        (self.a, self.b)
    }
}

/// A density `gamma * (alpha * x + beta)` on `[a, b]`, where `gamma` normalizes it.
///
/// Useful as an importance sampling proposal for integrands that fall or rise roughly
/// linearly across the integration range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    a: f64,
    b: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
}

impl Linear {
    /// Creates the linear distribution proportional to `alpha * x + beta` with support `[a, b]`.
    ///
    /// Fails if the range is empty or if the line is negative anywhere inside `[a, b]`.
    pub fn new(a: f64, b: f64, alpha: f64, beta: f64) -> Result<Self, QuadError> {
        if !(a.is_finite() && b.is_finite() && a < b) {
            return Err(QuadError::InvalidDistribution(format!(
                "linear range [{a}, {b}] must be finite and non-empty"
            )));
        }
        if alpha * a + beta < 0.0 || alpha * b + beta < 0.0 {
            return Err(QuadError::InvalidDistribution(
                "the linear function can not be negative within [a, b]".into(),
            ));
        }
        let mass = beta * (b - a) + 0.5 * alpha * (b * b - a * a);
        if mass <= 0.0 || !mass.is_finite() {
            return Err(QuadError::InvalidDistribution(format!(
                "the linear function has no mass on [{a}, {b}]"
            )));
        }
        Ok(Self {
            a,
            b,
            alpha,
            beta,
            gamma: 1.0 / mass,
        })
    }

    /// Cumulative distribution function.
    pub fn cdf(&self, x: f64) -> f64 {
        let x = x.clamp(self.a, self.b);
        self.gamma * (0.5 * self.alpha * (x * x - self.a * self.a) + self.beta * (x - self.a))
    }
}

impl Distribution for Linear {
    fn transform(&self, u: f64) -> f64 {
        if self.alpha == 0.0 {
            return self.a + (self.b - self.a) * u;
        }
        // Solve cdf(x) = u. The root that starts at `a` for u = 0 takes the sign of alpha,
        // since alpha * a + beta >= 0.
        let p = self.beta / self.alpha;
        let disc = (self.a + p).powi(2) + 2.0 * u / (self.gamma * self.alpha);
        let x = -p + self.alpha.signum() * disc.max(0.0).sqrt();
        x.clamp(self.a, self.b)
    }

    fn prob(&self, x: f64) -> f64 {
        if x < self.a || x > self.b {
            return 0.0;
        }
        self.gamma * (self.alpha * x + self.beta)
    }

    fn support(&self) -> (f64, f64) {
        (self.a, self.b)
    }
}

/// The normal distribution with mean `mu` and standard deviation `sigma`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    /// Creates a normal distribution. `sigma` must be positive and finite.
    pub fn new(mu: f64, sigma: f64) -> Result<Self, QuadError> {
        if !mu.is_finite() || !(sigma.is_finite() && sigma > 0.0) {
            return Err(QuadError::InvalidDistribution(format!(
                "normal distribution needs a finite mean and positive sigma, got ({mu}, {sigma})"
            )));
        }
        Ok(Self { mu, sigma })
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Distribution for Normal {
    fn transform(&self, u: f64) -> f64 {
        self.mu + self.sigma * inverse_normal_cdf(u)
    }

    fn prob(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        (-0.5 * z * z).exp() / ((2.0 * PI).sqrt() * self.sigma)
    }

    fn support(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, f64::INFINITY)
    }
}

/// Quantile function of the standard normal distribution.
///
/// Wichura's algorithm AS 241 (PPND16), accurate to about 1e-16 over `(0, 1)`.
/// Returns `-inf` at 0, `inf` at 1 and NaN outside `[0, 1]`.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let q = p - 0.5;
    if q.abs() <= 0.425 {
        let r = 0.180625 - q * q;
        let num = ((((((r * 2509.080_928_730_122_7 + 33430.575_583_588_128) * r
            + 67265.770_927_008_700)
            * r
            + 45921.953_931_549_871)
            * r
            + 13731.693_765_509_461)
            * r
            + 1971.590_950_306_551_4)
            * r
            + 133.141_667_891_784_38)
            * r
            + 3.387_132_872_796_366_6;
        let den = ((((((r * 5226.495_278_852_545_9 + 28729.085_735_721_943) * r
            + 39307.895_800_092_711)
            * r
            + 21213.794_301_586_596)
            * r
            + 5394.196_021_424_751_1)
            * r
            + 687.187_007_492_057_91)
            * r
            + 42.313_330_701_600_911)
            * r
            + 1.0;
        return q * num / den;
    }

    let tail = if q < 0.0 { p } else { 1.0 - p };
    let mut r = (-tail.ln()).sqrt();
    let value = if r <= 5.0 {
        r -= 1.6;
        let num = ((((((r * 7.745_450_142_783_414_1e-4 + 0.022_723_844_989_269_185) * r
            + 0.241_780_725_177_450_61)
            * r
            + 1.270_458_252_452_368_4)
            * r
            + 3.647_848_324_763_204_6)
            * r
            + 5.769_497_221_460_691_4)
            * r
            + 4.630_337_846_156_545_3)
            * r
            + 1.423_437_110_749_683_6;
        let den = ((((((r * 1.050_750_071_644_416_8e-9 + 5.475_938_084_995_345e-4) * r
            + 0.015_198_666_563_616_457)
            * r
            + 0.148_103_976_427_480_07)
            * r
            + 0.689_767_334_985_100_05)
            * r
            + 1.676_384_830_183_803_8)
            * r
            + 2.053_191_626_637_758_8)
            * r
            + 1.0;
        num / den
    } else {
        r -= 5.0;
        let num = ((((((r * 2.010_334_399_292_288_1e-7 + 2.711_555_568_743_487_6e-5) * r
            + 0.001_242_660_947_388_078_4)
            * r
            + 0.026_532_189_526_576_123)
            * r
            + 0.296_560_571_828_504_89)
            * r
            + 1.784_826_539_917_291_3)
            * r
            + 5.463_784_911_164_114_4)
            * r
            + 6.657_904_643_501_103_8;
        let den = ((((((r * 2.044_263_103_389_939_8e-15 + 1.421_511_758_316_445_9e-7) * r
            + 1.846_318_317_510_054_7e-5)
            * r
            + 7.868_691_311_456_132_6e-4)
            * r
            + 0.014_875_361_290_850_615)
            * r
            + 0.136_929_880_922_735_81)
            * r
            + 0.599_832_206_555_887_94)
            * r
            + 1.0;
        num / den
    };

    if q < 0.0 {
        -value
    } else {
        value
    }
}
