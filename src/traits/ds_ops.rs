use std::cmp::Ordering;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::ds::Ds;

// ──────────────────────────────────────────────
//  Ds<N> ⊕ Ds<N>
// ──────────────────────────────────────────────

#[inline]
fn add_ds<const N: usize>(a: &Ds<N>, b: &Ds<N>) -> Ds<N> {
    Ds::linear(a.value + b.value, a, 1.0, b, 1.0)
}

#[inline]
fn sub_ds<const N: usize>(a: &Ds<N>, b: &Ds<N>) -> Ds<N> {
    Ds::linear(a.value - b.value, a, 1.0, b, -1.0)
}

#[inline]
fn mul_ds<const N: usize>(a: &Ds<N>, b: &Ds<N>) -> Ds<N> {
    Ds::linear(a.value * b.value, a, b.value, b, a.value)
}

#[inline]
fn div_ds<const N: usize>(a: &Ds<N>, b: &Ds<N>) -> Ds<N> {
    let inv = 1.0 / b.value;
    Ds::linear(a.value / b.value, a, inv, b, -a.value * inv * inv)
}

macro_rules! impl_ds_binary {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $kernel:ident) => {
        impl<const N: usize> $trait<&Ds<N>> for &Ds<N> {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, rhs: &Ds<N>) -> Ds<N> {
                $kernel(self, rhs)
            }
        }

        impl<const N: usize> $trait<Ds<N>> for Ds<N> {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, rhs: Ds<N>) -> Ds<N> {
                $kernel(&self, &rhs)
            }
        }

        impl<const N: usize> $trait<&Ds<N>> for Ds<N> {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, rhs: &Ds<N>) -> Ds<N> {
                $kernel(&self, rhs)
            }
        }

        impl<const N: usize> $trait<Ds<N>> for &Ds<N> {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, rhs: Ds<N>) -> Ds<N> {
                $kernel(self, &rhs)
            }
        }

        impl<const N: usize> $assign_trait<&Ds<N>> for Ds<N> {
            #[inline]
            fn $assign_method(&mut self, rhs: &Ds<N>) {
                *self = $kernel(self, rhs);
            }
        }

        impl<const N: usize> $assign_trait<Ds<N>> for Ds<N> {
            #[inline]
            fn $assign_method(&mut self, rhs: Ds<N>) {
                *self = $kernel(self, &rhs);
            }
        }
    };
}

impl_ds_binary!(Add, add, AddAssign, add_assign, add_ds);
impl_ds_binary!(Sub, sub, SubAssign, sub_assign, sub_ds);
impl_ds_binary!(Mul, mul, MulAssign, mul_assign, mul_ds);
impl_ds_binary!(Div, div, DivAssign, div_assign, div_ds);

impl<const N: usize> Neg for Ds<N> {
    type Output = Ds<N>;
    #[inline]
    fn neg(mut self) -> Ds<N> {
        self.chain_in_place(-self.value, -1.0);
        self
    }
}

impl<const N: usize> Neg for &Ds<N> {
    type Output = Ds<N>;
    #[inline]
    fn neg(self) -> Ds<N> {
        self.chain(-self.value, -1.0)
    }
}

// ──────────────────────────────────────────────
//  Mixed ops: Ds<N> with f64
// ──────────────────────────────────────────────

// Each entry gives the new value and the derivative with respect to the Ds
// operand, as functions of (ds value, scalar).
macro_rules! impl_ds_scalar_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident,
     |$x:ident, $c:ident| ($val:expr, $deriv:expr),
     |$rx:ident, $rc:ident| ($rval:expr, $rderiv:expr)) => {
        impl<const N: usize> $trait<f64> for Ds<N> {
            type Output = Ds<N>;
            #[inline]
            fn $method(mut self, $c: f64) -> Ds<N> {
                let $x = self.value;
                self.chain_in_place($val, $deriv);
                self
            }
        }

        impl<const N: usize> $trait<f64> for &Ds<N> {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, $c: f64) -> Ds<N> {
                let $x = self.value;
                self.chain($val, $deriv)
            }
        }

        impl<const N: usize> $trait<Ds<N>> for f64 {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, mut rhs: Ds<N>) -> Ds<N> {
                let ($rx, $rc) = (rhs.value, self);
                rhs.chain_in_place($rval, $rderiv);
                rhs
            }
        }

        impl<const N: usize> $trait<&Ds<N>> for f64 {
            type Output = Ds<N>;
            #[inline]
            fn $method(self, rhs: &Ds<N>) -> Ds<N> {
                let ($rx, $rc) = (rhs.value, self);
                rhs.chain($rval, $rderiv)
            }
        }

        impl<const N: usize> $assign_trait<f64> for Ds<N> {
            #[inline]
            fn $assign_method(&mut self, $c: f64) {
                let $x = self.value;
                self.chain_in_place($val, $deriv);
            }
        }
    };
}

impl_ds_scalar_op!(Add, add, AddAssign, add_assign,
    |x, c| (x + c, 1.0),
    |x, c| (c + x, 1.0));
impl_ds_scalar_op!(Sub, sub, SubAssign, sub_assign,
    |x, c| (x - c, 1.0),
    |x, c| (c - x, -1.0));
impl_ds_scalar_op!(Mul, mul, MulAssign, mul_assign,
    |x, c| (x * c, c),
    |x, c| (c * x, c));
impl_ds_scalar_op!(Div, div, DivAssign, div_assign,
    |x, c| (x / c, 1.0 / c),
    |x, c| (c / x, -c / (x * x)));

// ──────────────────────────────────────────────
//  Sums
// ──────────────────────────────────────────────

impl<const N: usize> Sum for Ds<N> {
    fn sum<I: Iterator<Item = Ds<N>>>(iter: I) -> Ds<N> {
        iter.fold(Ds::constant(0.0), |acc, x| acc + x)
    }
}

impl<'a, const N: usize> Sum<&'a Ds<N>> for Ds<N> {
    fn sum<I: Iterator<Item = &'a Ds<N>>>(iter: I) -> Ds<N> {
        iter.fold(Ds::constant(0.0), |acc, x| acc + x)
    }
}

// ──────────────────────────────────────────────
//  Comparisons (value only)
// ──────────────────────────────────────────────

impl<const N: usize> PartialEq for Ds<N> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<const N: usize> PartialOrd for Ds<N> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<const N: usize> PartialEq<f64> for Ds<N> {
    #[inline]
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}

impl<const N: usize> PartialOrd<f64> for Ds<N> {
    #[inline]
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}

impl<const N: usize> PartialEq<Ds<N>> for f64 {
    #[inline]
    fn eq(&self, other: &Ds<N>) -> bool {
        *self == other.value
    }
}

impl<const N: usize> PartialOrd<Ds<N>> for f64 {
    #[inline]
    fn partial_cmp(&self, other: &Ds<N>) -> Option<Ordering> {
        self.partial_cmp(&other.value)
    }
}
