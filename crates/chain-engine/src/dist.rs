//! Distribution families of the `bugs` module.

use std::f64::consts::PI;

use crate::rng::EngineRng;

/// A supported distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// `dnorm(mean, precision)`.
    Normal,
    /// `dgamma(shape, rate)`.
    Gamma,
    /// `dunif(lower, upper)`.
    Uniform,
    /// `dbern(p)`.
    Bernoulli,
    /// `dbeta(a, b)`.
    Beta,
}

/// Names of every family, in catalogue order.
pub const FAMILY_NAMES: [&str; 5] = ["dnorm", "dgamma", "dunif", "dbern", "dbeta"];

impl Family {
    /// Looks a family up by its model-language name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dnorm" => Some(Family::Normal),
            "dgamma" => Some(Family::Gamma),
            "dunif" => Some(Family::Uniform),
            "dbern" => Some(Family::Bernoulli),
            "dbeta" => Some(Family::Beta),
            _ => None,
        }
    }

    /// Model-language name.
    pub fn name(&self) -> &'static str {
        match self {
            Family::Normal => "dnorm",
            Family::Gamma => "dgamma",
            Family::Uniform => "dunif",
            Family::Bernoulli => "dbern",
            Family::Beta => "dbeta",
        }
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        match self {
            Family::Bernoulli => 1,
            _ => 2,
        }
    }

    /// True for families over a finite support.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Family::Bernoulli)
    }

    /// Whether `params` describe a proper distribution.
    pub fn valid_params(&self, params: &[f64]) -> bool {
        if params.iter().any(|value| !value.is_finite()) {
            return false;
        }
        match (self, params) {
            (Family::Normal, [_, tau]) => *tau > 0.0,
            (Family::Gamma, [shape, rate]) | (Family::Beta, [shape, rate]) => {
                *shape > 0.0 && *rate > 0.0
            }
            (Family::Uniform, [lower, upper]) => lower < upper,
            (Family::Bernoulli, [p]) => (0.0..=1.0).contains(p),
            _ => false,
        }
    }

    /// Log density (or log mass) of `x`; negative infinity outside the
    /// support or for invalid parameters.
    pub fn log_density(&self, x: f64, params: &[f64]) -> f64 {
        if !x.is_finite() || !self.valid_params(params) {
            return f64::NEG_INFINITY;
        }
        match (self, params) {
            (Family::Normal, [mean, tau]) => {
                0.5 * (tau / (2.0 * PI)).ln() - 0.5 * tau * (x - mean).powi(2)
            }
            (Family::Gamma, [shape, rate]) if x > 0.0 => {
                shape * rate.ln() + (shape - 1.0) * x.ln() - rate * x - ln_gamma(*shape)
            }
            (Family::Uniform, [lower, upper]) if (*lower..=*upper).contains(&x) => {
                -(upper - lower).ln()
            }
            (Family::Bernoulli, [p]) if x == 1.0 => p.ln(),
            (Family::Bernoulli, [p]) if x == 0.0 => (1.0 - p).ln(),
            (Family::Beta, [a, b]) if x > 0.0 && x < 1.0 => {
                (a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - ln_beta(*a, *b)
            }
            _ => f64::NEG_INFINITY,
        }
    }

    /// Draws one value. `params` must satisfy [`Family::valid_params`].
    pub fn sample(&self, params: &[f64], rng: &mut dyn EngineRng) -> f64 {
        match (self, params) {
            (Family::Normal, [mean, tau]) => mean + rng.normal() / tau.sqrt(),
            (Family::Gamma, [shape, rate]) => sample_gamma(*shape, rng) / rate,
            (Family::Uniform, [lower, upper]) => lower + rng.uniform() * (upper - lower),
            (Family::Bernoulli, [p]) => {
                if rng.uniform() < *p {
                    1.0
                } else {
                    0.0
                }
            }
            (Family::Beta, [a, b]) => {
                let x = sample_gamma(*a, rng);
                let y = sample_gamma(*b, rng);
                x / (x + y)
            }
            _ => f64::NAN,
        }
    }
}

/// Marsaglia-Tsang gamma draw with unit rate.
fn sample_gamma(shape: f64, rng: &mut dyn EngineRng) -> f64 {
    if shape < 1.0 {
        let boost = rng.uniform().powf(1.0 / shape);
        return sample_gamma(shape + 1.0, rng) * boost;
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let z = rng.normal();
        let v = (1.0 + c * z).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u = rng.uniform();
        if u.ln() < 0.5 * z * z + d - d * v + d * v.ln() {
            return d * v;
        }
    }
}

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Log of the gamma function (Lanczos, g = 7).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = LANCZOS[0];
    for (idx, coefficient) in LANCZOS.iter().enumerate().skip(1) {
        sum += coefficient / (x + idx as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::WichmannHill;

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn densities_respect_support() {
        assert_eq!(Family::Gamma.log_density(-1.0, &[2.0, 1.0]), f64::NEG_INFINITY);
        assert_eq!(Family::Bernoulli.log_density(0.5, &[0.3]), f64::NEG_INFINITY);
        assert_eq!(Family::Normal.log_density(0.0, &[0.0, -1.0]), f64::NEG_INFINITY);
        assert!((Family::Uniform.log_density(0.5, &[0.0, 2.0]) + 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn draws_land_in_support() {
        let mut rng = WichmannHill::new(3);
        for _ in 0..500 {
            assert!(Family::Gamma.sample(&[0.5, 2.0], &mut rng) > 0.0);
            let beta = Family::Beta.sample(&[2.0, 3.0], &mut rng);
            assert!(beta > 0.0 && beta < 1.0);
            let bit = Family::Bernoulli.sample(&[0.4], &mut rng);
            assert!(bit == 0.0 || bit == 1.0);
        }
    }
}
