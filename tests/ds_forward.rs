use approx::assert_relative_eq;
use gradient_oracle::{Ds, Tangent};

type D1 = Ds<1>;
type D3 = Ds<3>;

/// Central finite difference: (f(x+h) - f(x-h)) / 2h
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-6;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

/// Test a Ds elemental against finite differences.
fn check_elemental(f_ds: impl Fn(D1) -> D1, f_f64: impl Fn(f64) -> f64, x: f64, tol: f64) {
    let d = f_ds(Ds::variable(x, 0));
    let expected = finite_diff(&f_f64, x);
    assert_relative_eq!(d.value(), f_f64(x), max_relative = 1e-12);
    assert_relative_eq!(d.get_tangent(0), expected, max_relative = tol);
}

// ── Arithmetic ──

#[test]
fn product_rule() {
    // (3 + ε)(4 + 2ε) = 12 + 10ε
    let a = D1::with_tangent(3.0, [1.0]);
    let b = D1::with_tangent(4.0, [2.0]);
    let c = &a * &b;
    assert_relative_eq!(c.value(), 12.0);
    assert_relative_eq!(c.get_tangent(0), 10.0);
}

#[test]
fn quotient_rule() {
    // d/dx (x / (x+1)) at x=2: 1/(x+1)^2 = 1/9
    let x = D1::variable(2.0, 0);
    let y = &x / (&x + 1.0);
    assert_relative_eq!(y.value(), 2.0 / 3.0, max_relative = 1e-12);
    assert_relative_eq!(y.get_tangent(0), 1.0 / 9.0, max_relative = 1e-12);
}

#[test]
fn mixed_scalar_ops() {
    let x = D1::variable(3.0, 0);
    let y = &x * 2.0;
    assert_relative_eq!(y.value(), 6.0);
    assert_relative_eq!(y.get_tangent(0), 2.0);

    let z = 2.0 * &x;
    assert_relative_eq!(z.get_tangent(0), 2.0);

    let w = 1.0 / &x;
    assert_relative_eq!(w.value(), 1.0 / 3.0, max_relative = 1e-12);
    assert_relative_eq!(w.get_tangent(0), -1.0 / 9.0, max_relative = 1e-12);

    let v = 10.0 - x;
    assert_relative_eq!(v.value(), 7.0);
    assert_relative_eq!(v.get_tangent(0), -1.0);
}

#[test]
fn assign_ops() {
    let mut x = D1::variable(2.0, 0);
    x += 1.0;
    x *= 3.0;
    assert_relative_eq!(x.value(), 9.0);
    assert_relative_eq!(x.get_tangent(0), 3.0);

    let y = D1::variable(2.0, 0);
    x -= &y;
    assert_relative_eq!(x.value(), 7.0);
    assert_relative_eq!(x.get_tangent(0), 2.0);
    x /= y;
    assert_relative_eq!(x.value(), 3.5);
    // (x' y - x y') / y² = (2·2 - 7·1) / 4
    assert_relative_eq!(x.get_tangent(0), -0.75);
}

#[test]
fn negation_and_sum() {
    let x = D1::variable(1.5, 0);
    let n = -&x;
    assert_relative_eq!(n.value(), -1.5);
    assert_relative_eq!(n.get_tangent(0), -1.0);

    let xs = [D1::variable(1.0, 0), D1::constant(2.0), D1::variable(3.0, 0)];
    let s: D1 = xs.iter().sum();
    assert_relative_eq!(s.value(), 6.0);
    assert_relative_eq!(s.get_tangent(0), 2.0);
}

// ── Elementals vs finite differences ──

#[test]
fn elementals_match_finite_differences() {
    check_elemental(|x| x.exp(), f64::exp, 0.7, 1e-6);
    check_elemental(|x| x.ln(), f64::ln, 1.7, 1e-6);
    check_elemental(|x| x.log10(), f64::log10, 2.5, 1e-6);
    check_elemental(|x| x.sqrt(), f64::sqrt, 2.0, 1e-6);
    check_elemental(|x| x.recip(), |x| 1.0 / x, 1.3, 1e-6);
    check_elemental(|x| x.sin(), f64::sin, 0.4, 1e-6);
    check_elemental(|x| x.cos(), f64::cos, 0.4, 1e-6);
    check_elemental(|x| x.tan(), f64::tan, 0.4, 1e-6);
    check_elemental(|x| x.atan(), f64::atan, 0.8, 1e-6);
    check_elemental(|x| x.sinh(), f64::sinh, 0.6, 1e-6);
    check_elemental(|x| x.cosh(), f64::cosh, 0.6, 1e-6);
    check_elemental(|x| x.tanh(), f64::tanh, 0.6, 1e-6);
    check_elemental(|x| x.erf(), libm::erf, 0.3, 1e-6);
    check_elemental(|x| x.sigmoid(), |x| 1.0 / (1.0 + (-x).exp()), -0.5, 1e-6);
    check_elemental(|x| x.abs(), f64::abs, -2.0, 1e-6);
    check_elemental(|x| x.powi(3), |x| x.powi(3), 1.2, 1e-6);
    check_elemental(|x| x.powi(-2), |x| x.powi(-2), 1.2, 1e-6);
}

#[test]
fn composition_matches_finite_difference() {
    let f = |x: f64| (x * x + 1.0).sqrt() * (0.5 * x).sin() - x.exp().atan2(2.0 - x);
    let f_ds = |x: D1| {
        let two = D1::constant(2.0);
        (&x * &x + 1.0).sqrt() * (&x * 0.5).sin() - x.exp().atan2(&(two - &x))
    };
    check_elemental(f_ds, f, 0.9, 1e-6);
}

#[test]
fn binary_elementals() {
    // hypot(x, 2x) = sqrt(5) |x|
    let x = D1::variable(1.5, 0);
    let h = x.hypot(&(&x * 2.0));
    assert_relative_eq!(h.value(), 5f64.sqrt() * 1.5, max_relative = 1e-12);
    assert_relative_eq!(h.get_tangent(0), 5f64.sqrt(), max_relative = 1e-12);

    // d/dx x^x = x^x (1 + ln x)
    let p = x.powf(&x);
    let expected = finite_diff(|v| v.powf(v), 1.5);
    assert_relative_eq!(p.get_tangent(0), expected, max_relative = 1e-6);

    // Constant exponent carries no ln term, so negative bases work.
    let neg = D1::variable(-2.0, 0);
    let sq = neg.powf(&D1::constant(2.0));
    assert_relative_eq!(sq.value(), 4.0);
    assert_relative_eq!(sq.get_tangent(0), -4.0);
}

#[test]
fn max_min_clamp_floor() {
    let x = D1::variable(2.0, 0);
    let c = D1::constant(5.0);
    assert!(!x.max(&c).has_tangent());
    assert_relative_eq!(x.min(&c).get_tangent(0), 1.0);
    assert!(!x.clamp(3.0, 4.0).has_tangent());
    assert_relative_eq!(x.clamp(0.0, 4.0).get_tangent(0), 1.0);
    assert!(!x.floor().has_tangent());
    assert_relative_eq!(x.powi(0).value(), 1.0);
    assert!(!x.powi(0).has_tangent());
}

// ── Representations ──

#[test]
fn crisp_values_stay_crisp() {
    let a = D3::constant(2.0);
    let b = D3::constant(3.0);
    let c = (&a * &b).exp() / (&a + 1.0);
    assert!(!c.has_tangent());
    assert_eq!(c.get_tangent(2), 0.0);
}

#[test]
fn same_dimension_stays_sparse() {
    let x = D3::variable(2.0, 1);
    let y = (&x * &x).sin() + &x * 3.0;
    assert!(y.has_tangent());
    assert!(!y.is_dense());
    assert!(matches!(y.tangent(), Tangent::Sparse { dim: 1, .. }));
    assert_eq!(y.get_tangent(0), 0.0);
}

#[test]
fn different_dimensions_widen() {
    let x = D3::variable(2.0, 0);
    let y = D3::variable(5.0, 2);
    let z = &x * &y;
    assert!(z.is_dense());
    assert_eq!(z.tangent_array(), [5.0, 0.0, 2.0]);
}

#[test]
fn sparse_and_dense_agree_bitwise() {
    let programs: [fn(&D3) -> D3; 4] = [
        |x| (x * x + 1.0).ln() * x.cos(),
        |x| x.exp().atan2(&(x * 3.0)) - x.tanh(),
        |x| (x / (x + 2.0)).sqrt().erf(),
        |x| x.powi(5) * 0.25 + x.sigmoid(),
    ];
    for f in programs {
        for &v in &[0.3, 1.7, 4.0] {
            let sparse = D3::variable(v, 1);
            let mut dense = D3::variable(v, 1);
            dense.widen();
            assert!(dense.is_dense());

            let a = f(&sparse);
            let b = f(&dense);
            assert_eq!(a.value().to_bits(), b.value().to_bits());
            for dim in 0..3 {
                assert_eq!(a.get_tangent(dim), b.get_tangent(dim), "dim {dim} at {v}");
            }
        }
    }
}

#[test]
fn sparse_and_dense_agree_at_singular_points() {
    // Infinite partials at 0 must not turn absent lanes into NaN.
    let programs: [fn(&D3) -> D3; 5] = [
        |x| x.sqrt(),
        |x| x.recip(),
        |x| x.ln(),
        |x| x.powf(&D3::constant(0.5)),
        |x| &D3::constant(1.0) / x,
    ];
    for f in programs {
        let sparse = D3::variable(0.0, 1);
        let mut dense = D3::variable(0.0, 1);
        dense.widen();

        let a = f(&sparse);
        let b = f(&dense);
        assert_eq!(a.value().to_bits(), b.value().to_bits());
        for dim in 0..3 {
            assert_eq!(
                a.get_tangent(dim).to_bits(),
                b.get_tangent(dim).to_bits(),
                "dim {dim}"
            );
        }
        assert_eq!(b.get_tangent(0), 0.0);
        assert_eq!(b.get_tangent(2), 0.0);
        assert!(b.get_tangent(1).is_infinite());
    }
}

#[test]
fn set_tangent_widens() {
    let mut x = D3::variable(1.0, 0);
    x.set_tangent(0, 4.0);
    assert!(!x.is_dense());
    x.set_tangent(2, -1.0);
    assert!(x.is_dense());
    assert_eq!(x.tangent_array(), [4.0, 0.0, -1.0]);

    x.set_initial_tangent(1, 1.0);
    assert_eq!(x.tangent_array(), [0.0, 1.0, 0.0]);
    x.clear_tangent();
    assert!(!x.has_tangent());
}

#[test]
#[should_panic(expected = "out of range")]
fn get_tangent_out_of_range_panics() {
    let x = D3::variable(1.0, 0);
    x.get_tangent(3);
}

#[test]
#[should_panic(expected = "out of range")]
fn set_initial_tangent_out_of_range_panics() {
    let mut x = D1::constant(1.0);
    x.set_initial_tangent(1, 1.0);
}

// ── Comparisons and IEEE behaviour ──

#[test]
fn comparisons_use_value_only() {
    let a = D3::variable(1.0, 0);
    let b = D3::with_tangent(1.0, [9.0, 9.0, 9.0]);
    assert!(a == b);
    assert!(a <= b && a >= b);
    assert!(a < 2.0);
    assert!(0.5 < a);
    assert!(a != 1.5);
    assert!(D3::constant(f64::NAN) != D3::constant(f64::NAN));
}

#[test]
fn division_by_zero_propagates() {
    let x = D1::variable(1.0, 0);
    let zero = D1::variable(0.0, 0);
    let q = &x / &zero;
    assert!(q.value().is_infinite());
    assert!(!q.get_tangent(0).is_finite());

    let nan = &zero / &zero;
    assert!(nan.value().is_nan());
    assert!(nan.get_tangent(0).is_nan());
}

#[test]
fn mean_of_values() {
    let xs = [D3::variable(1.0, 0), D3::variable(3.0, 2)];
    let m = Ds::mean(xs.iter()).unwrap();
    assert_relative_eq!(m.value(), 2.0);
    assert_eq!(m.tangent_array(), [0.5, 0.0, 0.5]);
    assert!(Ds::<3>::mean(std::iter::empty()).is_none());
}

#[test]
fn display_shows_tangent() {
    let x = D1::variable(2.0, 0);
    assert_eq!(format!("{x}"), "2 + 1ε0");
    assert_eq!(format!("{}", D1::constant(2.5)), "2.5");
}
