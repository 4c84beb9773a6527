//! Sample programs for the command-line driver.

use gradient_oracle::{Ds, Program, SamplingContext};
use log::debug;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Step function: 1 for `x < 0`, else 0.
///
/// `d E[y] / d mu` is `-phi(mu; 0, sigma)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heaviside;

impl Program<1> for Heaviside {
    fn run(&self, ctx: &mut SamplingContext<1>, params: &[Ds<1>; 1]) -> Ds<1> {
        if ctx.branch(&params[0]) {
            Ds::constant(1.0)
        } else {
            Ds::constant(0.0)
        }
    }
}

/// Number of chained thresholds in [`Synthetic`].
pub const SYNTHETIC_THRESHOLDS: usize = 32;

/// A value repeatedly shifted by thresholds it falls below.
///
/// Every branch depends on the outcome of the previous ones.
#[derive(Clone, Debug)]
pub struct Synthetic {
    thresholds: Vec<f64>,
}

impl Synthetic {
    /// Draw the thresholds uniformly from `[-1, 1)`.
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let dist = Uniform::new(-1.0, 1.0);
        let thresholds: Vec<f64> = (0..SYNTHETIC_THRESHOLDS).map(|_| dist.sample(&mut rng)).collect();
        debug!("synthetic thresholds: {thresholds:?}");
        Synthetic { thresholds }
    }

    pub fn with_thresholds(thresholds: Vec<f64>) -> Self {
        Synthetic { thresholds }
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }
}

impl Program<1> for Synthetic {
    fn run(&self, ctx: &mut SamplingContext<1>, params: &[Ds<1>; 1]) -> Ds<1> {
        let x = &params[0];
        let y = x / 2.0;
        let mut v = x - &y;
        for &t in &self.thresholds {
            if ctx.branch(&(&v - t)) {
                v -= t;
            }
        }
        v
    }
}

/// Two interacting branches over two inputs, plus a continuous term.
///
/// `y = 0.1 b + [a < 0] + 2 [a + b < 0]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThresholdPair;

impl Program<2> for ThresholdPair {
    fn run(&self, ctx: &mut SamplingContext<2>, params: &[Ds<2>; 2]) -> Ds<2> {
        let [a, b] = params;
        let mut out = b * 0.1;
        if ctx.branch(a) {
            out += 1.0;
        }
        if ctx.branch(&(a + b)) {
            out += 2.0;
        }
        out
    }
}
