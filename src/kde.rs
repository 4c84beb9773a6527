//! One-dimensional Gaussian kernel density estimation.
//!
//! Used to estimate the density of a branch predicate at its decision
//! boundary (zero). The bandwidth follows Scott's rule `n^(-1/5) · σ̂` by
//! default, or Silverman's rule `(4/3)^(1/5) · n^(-1/5) · σ̂`, where `σ̂` is the
//! sample standard deviation.

use num_traits::Float;

use crate::error::KdeError;

/// Bandwidth selection rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bandwidth {
    #[default]
    Scott,
    Silverman,
}

/// Sample variance with Bessel's correction (`n - 1` denominator).
///
/// Returns zero for fewer than two points.
pub fn sample_variance<F: Float>(data: &[F]) -> F {
    if data.len() < 2 {
        return F::zero();
    }
    let n = F::from(data.len()).unwrap_or_else(F::infinity);
    let mean = data.iter().fold(F::zero(), |acc, &x| acc + x) / n;
    let ss = data.iter().fold(F::zero(), |acc, &x| acc + (x - mean) * (x - mean));
    ss / (n - F::one())
}

/// Fitted Gaussian kernel density estimate over 1-D data.
#[derive(Clone, Debug)]
pub struct Kde1d<F: Float> {
    data: Vec<F>,
    /// Kernel standard deviation.
    bandwidth: F,
    /// `1 / (bandwidth · sqrt(2π))`.
    norm: F,
}

impl<F: Float> Kde1d<F> {
    /// Fit a density estimate to `data`.
    ///
    /// Fails on fewer than two points, on all-equal data, and when the
    /// resulting bandwidth is not a positive finite number.
    pub fn new(data: Vec<F>, rule: Bandwidth) -> Result<Self, KdeError> {
        if data.len() < 2 {
            return Err(KdeError::TooFewPoints(data.len()));
        }
        if data.iter().all(|&x| x == data[0]) {
            return Err(KdeError::AllEqual);
        }

        let n = data.len() as f64;
        let std_dev = sample_variance(&data).to_f64().unwrap_or(f64::NAN).sqrt();
        let scale = match rule {
            Bandwidth::Scott => 1.0,
            Bandwidth::Silverman => (4.0f64 / 3.0).powf(0.2),
        };
        let h = scale * n.powf(-0.2) * std_dev;
        if !(h.is_finite() && h > 0.0) {
            return Err(KdeError::ZeroBandwidth);
        }

        let norm = 1.0 / (h * (2.0 * std::f64::consts::PI).sqrt());
        Ok(Kde1d {
            data,
            bandwidth: F::from(h).ok_or(KdeError::ZeroBandwidth)?,
            norm: F::from(norm).ok_or(KdeError::ZeroBandwidth)?,
        })
    }

    /// Kernel standard deviation.
    pub fn bandwidth(&self) -> F {
        self.bandwidth
    }

    /// Number of data points.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: a fitted estimate holds at least two points.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Estimated density at `x`.
    pub fn eval(&self, x: F) -> F {
        let half = F::from(0.5).unwrap_or_else(F::zero);
        let sum = self.data.iter().fold(F::zero(), |acc, &d| {
            let z = (x - d) / self.bandwidth;
            acc + (-half * z * z).exp()
        });
        self.norm * sum / self.count()
    }

    /// Estimated probability mass in `[low, high]`.
    pub fn integrate(&self, low: F, high: F) -> F {
        let h = self.bandwidth.to_f64().unwrap_or(f64::NAN);
        let (low, high) = (
            low.to_f64().unwrap_or(f64::NAN),
            high.to_f64().unwrap_or(f64::NAN),
        );
        let sum: f64 = self
            .data
            .iter()
            .map(|d| {
                let d = d.to_f64().unwrap_or(f64::NAN);
                norm_cdf((high - d) / h) - norm_cdf((low - d) / h)
            })
            .sum();
        F::from(sum / self.data.len() as f64).unwrap_or_else(F::nan)
    }

    fn count(&self) -> F {
        F::from(self.data.len()).unwrap_or_else(F::infinity)
    }
}

/// Standard normal CDF.
#[inline]
fn norm_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x * std::f64::consts::FRAC_1_SQRT_2)
}
