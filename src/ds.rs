//! Differentiable scalar with a sparse-or-dense tangent over `N` inputs.
//!
//! [`Ds<N>`] is the forward-mode value every instrumented program computes
//! with. The tangent is a tagged union:
//!
//! - [`Tangent::None`]: crisp value, operations never allocate.
//! - [`Tangent::Sparse`]: exactly one nonzero input dimension, O(1) per op.
//! - [`Tangent::Dense`]: all `N` lanes in a pooled buffer, O(N) per op.
//!
//! Two operands with single dimensions that differ (or any dense operand)
//! widen to dense; widening is lossless. Comparisons look at the value only,
//! so a branch on a `Ds` drops its derivative, which is what the branch ledger
//! compensates for.

use std::fmt::{self, Display};

use crate::pool::DenseTangent;

/// Tangent representation of a [`Ds`].
#[derive(Clone, Debug, Default)]
pub enum Tangent<const N: usize> {
    /// No dependence on any input.
    #[default]
    None,
    /// Dependence on a single input dimension.
    Sparse { dim: usize, value: f64 },
    /// Full tangent vector.
    Dense(DenseTangent<N>),
}

impl<const N: usize> Tangent<N> {
    /// Tangent component for `dim` (0 when absent).
    #[inline]
    pub fn get(&self, dim: usize) -> f64 {
        match self {
            Tangent::None => 0.0,
            Tangent::Sparse { dim: d, value } => {
                if *d == dim {
                    *value
                } else {
                    0.0
                }
            }
            Tangent::Dense(lanes) => lanes.as_slice()[dim],
        }
    }

    #[inline]
    fn scale_in_place(&mut self, s: f64) {
        match self {
            Tangent::None => {}
            Tangent::Sparse { value, .. } => *value = scale(*value, s),
            Tangent::Dense(lanes) => lanes.as_mut_slice().iter_mut().for_each(|t| *t = scale(*t, s)),
        }
    }

    #[inline]
    fn scaled(&self, s: f64) -> Self {
        match self {
            Tangent::None => Tangent::None,
            Tangent::Sparse { dim, value } => Tangent::Sparse {
                dim: *dim,
                value: scale(*value, s),
            },
            Tangent::Dense(lanes) => {
                let t = lanes.as_slice();
                Tangent::Dense(DenseTangent::from_fn(|k| scale(t[k], s)))
            }
        }
    }

    /// `da * a + db * b`, staying sparse whenever both sides allow it.
    #[inline]
    fn linear(a: &Self, da: f64, b: &Self, db: f64) -> Self {
        match (a, b) {
            (Tangent::None, Tangent::None) => Tangent::None,
            (Tangent::Sparse { dim, value }, Tangent::None) => Tangent::Sparse {
                dim: *dim,
                value: scale(*value, da),
            },
            (Tangent::None, Tangent::Sparse { dim, value }) => Tangent::Sparse {
                dim: *dim,
                value: scale(*value, db),
            },
            (Tangent::Sparse { dim: i, value: x }, Tangent::Sparse { dim: j, value: y })
                if i == j =>
            {
                Tangent::Sparse {
                    dim: *i,
                    value: scale(*x, da) + scale(*y, db),
                }
            }
            (a, Tangent::None) => a.scaled(da),
            (Tangent::None, b) => b.scaled(db),
            (a, b) => Tangent::Dense(DenseTangent::from_fn(|k| {
                scale(a.get(k), da) + scale(b.get(k), db)
            })),
        }
    }
}

/// `t * s`, where a zero lane stays zero even for an infinite or NaN `s`.
///
/// Absent sparse lanes are implicitly zero; dense lanes must behave the same.
#[inline]
fn scale(t: f64, s: f64) -> f64 {
    if t == 0.0 {
        0.0
    } else {
        t * s
    }
}

/// Differentiable scalar: a value and its tangent over `N` inputs.
#[derive(Clone, Debug, Default)]
pub struct Ds<const N: usize> {
    pub(crate) value: f64,
    pub(crate) tangent: Tangent<N>,
}

impl<const N: usize> Display for Ds<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        match &self.tangent {
            Tangent::None => Ok(()),
            Tangent::Sparse { dim, value } => write!(f, " + {}\u{03b5}{}", value, dim),
            Tangent::Dense(lanes) => {
                for (k, t) in lanes.as_slice().iter().enumerate() {
                    write!(f, " + {}\u{03b5}{}", t, k)?;
                }
                Ok(())
            }
        }
    }
}

impl<const N: usize> From<f64> for Ds<N> {
    #[inline]
    fn from(value: f64) -> Self {
        Ds::constant(value)
    }
}

impl<const N: usize> Ds<N> {
    /// Create a tangent-free value.
    #[inline]
    pub fn constant(value: f64) -> Self {
        Ds {
            value,
            tangent: Tangent::None,
        }
    }

    /// Create a value with unit tangent in `dim`.
    #[inline]
    pub fn variable(value: f64, dim: usize) -> Self {
        let mut x = Ds::constant(value);
        x.set_initial_tangent(dim, 1.0);
        x
    }

    /// Create a value with an explicit tangent vector.
    pub fn with_tangent(value: f64, tangent: [f64; N]) -> Self {
        Ds {
            value,
            tangent: Tangent::Dense(DenseTangent::from_fn(|k| tangent[k])),
        }
    }

    /// Primal value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Borrow the tangent representation.
    #[inline]
    pub fn tangent(&self) -> &Tangent<N> {
        &self.tangent
    }

    /// True if any tangent representation is active.
    #[inline]
    pub fn has_tangent(&self) -> bool {
        !matches!(self.tangent, Tangent::None)
    }

    /// True if the tangent lives in a pooled dense buffer.
    #[inline]
    pub fn is_dense(&self) -> bool {
        matches!(self.tangent, Tangent::Dense(_))
    }

    /// Tangent component for input `dim` (0 when absent).
    ///
    /// # Panics
    ///
    /// Panics if `dim >= N`.
    #[inline]
    pub fn get_tangent(&self, dim: usize) -> f64 {
        assert!(dim < N, "tangent dimension {} out of range (N = {})", dim, N);
        self.tangent.get(dim)
    }

    /// All tangent components as an array.
    pub fn tangent_array(&self) -> [f64; N] {
        match &self.tangent {
            Tangent::Dense(lanes) => lanes.to_array(),
            t => std::array::from_fn(|k| t.get(k)),
        }
    }

    /// Seed the tangent with a single component, replacing any previous tangent.
    ///
    /// Used to mark the differentiated inputs with unit basis vectors.
    ///
    /// # Panics
    ///
    /// Panics if `dim >= N`.
    #[inline]
    pub fn set_initial_tangent(&mut self, dim: usize, value: f64) {
        assert!(dim < N, "tangent dimension {} out of range (N = {})", dim, N);
        self.tangent = Tangent::Sparse { dim, value };
    }

    /// Overwrite one tangent component, widening to dense when needed.
    ///
    /// # Panics
    ///
    /// Panics if `dim >= N`.
    pub fn set_tangent(&mut self, dim: usize, value: f64) {
        assert!(dim < N, "tangent dimension {} out of range (N = {})", dim, N);
        match self.tangent {
            Tangent::None => self.tangent = Tangent::Sparse { dim, value },
            Tangent::Sparse { dim: d, .. } if d == dim => {
                self.tangent = Tangent::Sparse { dim, value };
            }
            Tangent::Sparse { .. } => {
                self.widen();
                if let Tangent::Dense(ref mut lanes) = self.tangent {
                    lanes.as_mut_slice()[dim] = value;
                }
            }
            Tangent::Dense(ref mut lanes) => lanes.as_mut_slice()[dim] = value,
        }
    }

    /// Convert a sparse tangent to the dense representation in place.
    ///
    /// A tangent-free value stays tangent-free.
    pub fn widen(&mut self) {
        if let Tangent::Sparse { dim, value } = self.tangent {
            self.tangent = Tangent::Dense(DenseTangent::from_fn(|k| if k == dim { value } else { 0.0 }));
        }
    }

    /// Drop the tangent, keeping the value.
    #[inline]
    pub fn clear_tangent(&mut self) {
        self.tangent = Tangent::None;
    }

    /// Apply the chain rule: given `f(self.value)` and `f'(self.value)`.
    #[inline]
    pub(crate) fn chain(&self, f_val: f64, f_deriv: f64) -> Self {
        Ds {
            value: f_val,
            tangent: self.tangent.scaled(f_deriv),
        }
    }

    /// Result with value `value` and tangent `da * a' + db * b'`.
    #[inline]
    pub(crate) fn linear(value: f64, a: &Self, da: f64, b: &Self, db: f64) -> Self {
        Ds {
            value,
            tangent: Tangent::linear(&a.tangent, da, &b.tangent, db),
        }
    }

    /// In-place affine update `value = f_val`, `tangent *= f_deriv`.
    #[inline]
    pub(crate) fn chain_in_place(&mut self, f_val: f64, f_deriv: f64) {
        self.value = f_val;
        if f_deriv != 1.0 {
            self.tangent.scale_in_place(f_deriv);
        }
    }

    // ── Powers ──

    #[inline]
    pub fn recip(&self) -> Self {
        let inv = 1.0 / self.value;
        self.chain(inv, -inv * inv)
    }

    #[inline]
    pub fn sqrt(&self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 1.0 / (2.0 * s))
    }

    #[inline]
    pub fn powi(&self, n: i32) -> Self {
        if n == 0 {
            return Ds::constant(1.0);
        }
        self.chain(self.value.powi(n), f64::from(n) * self.value.powi(n - 1))
    }

    #[inline]
    pub fn powf(&self, n: &Self) -> Self {
        // d(x^y) = y x^(y-1) dx + x^y ln(x) dy
        let val = self.value.powf(n.value);
        let dx = n.value * self.value.powf(n.value - 1.0);
        let dy = if n.has_tangent() { val * self.value.ln() } else { 0.0 };
        Ds::linear(val, self, dx, n, dy)
    }

    // ── Exp/Log ──

    #[inline]
    pub fn exp(&self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    #[inline]
    pub fn ln(&self) -> Self {
        self.chain(self.value.ln(), 1.0 / self.value)
    }

    #[inline]
    pub fn log10(&self) -> Self {
        self.chain(self.value.log10(), 1.0 / (self.value * std::f64::consts::LN_10))
    }

    // ── Trig ──

    #[inline]
    pub fn sin(&self) -> Self {
        let (s, c) = self.value.sin_cos();
        self.chain(s, c)
    }

    #[inline]
    pub fn cos(&self) -> Self {
        let (s, c) = self.value.sin_cos();
        self.chain(c, -s)
    }

    #[inline]
    pub fn tan(&self) -> Self {
        let c = self.value.cos();
        self.chain(self.value.tan(), 1.0 / (c * c))
    }

    #[inline]
    pub fn atan(&self) -> Self {
        self.chain(self.value.atan(), 1.0 / (1.0 + self.value * self.value))
    }

    #[inline]
    pub fn atan2(&self, other: &Self) -> Self {
        // d atan2(y, x) = x/(x²+y²) dy - y/(x²+y²) dx
        let denom = self.value * self.value + other.value * other.value;
        Ds::linear(
            self.value.atan2(other.value),
            self,
            other.value / denom,
            other,
            -self.value / denom,
        )
    }

    // ── Hyperbolic ──

    #[inline]
    pub fn sinh(&self) -> Self {
        self.chain(self.value.sinh(), self.value.cosh())
    }

    #[inline]
    pub fn cosh(&self) -> Self {
        self.chain(self.value.cosh(), self.value.sinh())
    }

    #[inline]
    pub fn tanh(&self) -> Self {
        let t = self.value.tanh();
        self.chain(t, 1.0 - t * t)
    }

    // ── Special ──

    #[inline]
    pub fn erf(&self) -> Self {
        let d = std::f64::consts::FRAC_2_SQRT_PI * (-self.value * self.value).exp();
        self.chain(libm::erf(self.value), d)
    }

    /// Logistic function `1 / (1 + e^-x)`.
    #[inline]
    pub fn sigmoid(&self) -> Self {
        let s = 1.0 / (1.0 + (-self.value).exp());
        self.chain(s, s * (1.0 - s))
    }

    // ── Misc ──

    #[inline]
    pub fn abs(&self) -> Self {
        self.chain(self.value.abs(), self.value.signum())
    }

    #[inline]
    pub fn floor(&self) -> Self {
        Ds::constant(self.value.floor())
    }

    #[inline]
    pub fn hypot(&self, other: &Self) -> Self {
        let h = self.value.hypot(other.value);
        Ds::linear(h, self, self.value / h, other, other.value / h)
    }

    /// Larger of the two operands (value comparison; the winner's tangent is kept).
    #[inline]
    pub fn max(&self, other: &Self) -> Self {
        if self.value >= other.value {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// Smaller of the two operands (value comparison; the winner's tangent is kept).
    #[inline]
    pub fn min(&self, other: &Self) -> Self {
        if self.value <= other.value {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// Clamp into `[lower, upper]` by value.
    pub fn clamp(&self, lower: f64, upper: f64) -> Self {
        if self.value < lower {
            Ds::constant(lower)
        } else if self.value > upper {
            Ds::constant(upper)
        } else {
            self.clone()
        }
    }

    /// Arithmetic mean of a non-empty set of values.
    ///
    /// Returns `None` for an empty iterator.
    pub fn mean<'a>(values: impl IntoIterator<Item = &'a Self>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum: Option<Self> = None;
        for v in values {
            count += 1;
            sum = Some(match sum {
                None => v.clone(),
                Some(acc) => acc + v,
            });
        }
        sum.map(|s| s / count as f64)
    }
}
