use approx::{assert_abs_diff_eq, assert_relative_eq};
use gradient_oracle::kde::sample_variance;
use gradient_oracle::{Bandwidth, Kde1d, KdeError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn normal_sample(n: usize, mean: f64, sd: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(mean, sd).unwrap();
    (0..n).map(|_| dist.sample(&mut rng)).collect()
}

#[test]
fn variance_uses_bessel_correction() {
    assert_relative_eq!(sample_variance(&[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0, max_relative = 1e-12);
    assert_eq!(sample_variance(&[3.0f64]), 0.0);
    assert_eq!(sample_variance::<f32>(&[]), 0.0);
}

#[test]
fn scott_bandwidth() {
    let data = vec![1.0, 2.0, 3.0, 4.0];
    let kde = Kde1d::new(data, Bandwidth::Scott).unwrap();
    let expected = 4f64.powf(-0.2) * (5.0f64 / 3.0).sqrt();
    assert_relative_eq!(kde.bandwidth(), expected, max_relative = 1e-12);
    assert_eq!(kde.len(), 4);
}

#[test]
fn silverman_is_wider_than_scott() {
    let data = normal_sample(200, 0.0, 1.0, 3);
    let scott = Kde1d::new(data.clone(), Bandwidth::Scott).unwrap();
    let silverman = Kde1d::new(data, Bandwidth::Silverman).unwrap();
    assert_relative_eq!(
        silverman.bandwidth() / scott.bandwidth(),
        (4.0f64 / 3.0).powf(0.2),
        max_relative = 1e-12
    );
}

#[test]
fn density_of_standard_normal_at_zero() {
    let data = normal_sample(5000, 0.0, 1.0, 11);
    let kde = Kde1d::new(data, Bandwidth::Scott).unwrap();
    // phi(0) = 0.3989; smoothing biases slightly low.
    assert_abs_diff_eq!(kde.eval(0.0), 0.399, epsilon = 0.03);
    assert!(kde.eval(0.0) > kde.eval(2.0));
}

#[test]
fn density_integrates_to_one() {
    let data = normal_sample(300, 2.0, 0.5, 5);
    let kde = Kde1d::new(data, Bandwidth::Scott).unwrap();
    assert_abs_diff_eq!(kde.integrate(-10.0, 14.0), 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(kde.integrate(2.0, 100.0), 0.5, epsilon = 0.1);

    // Numeric integral of eval agrees with the closed form.
    let (lo, hi, steps) = (1.0, 3.0, 20_000);
    let h = (hi - lo) / steps as f64;
    let riemann: f64 = (0..steps).map(|i| kde.eval(lo + (i as f64 + 0.5) * h) * h).sum();
    assert_abs_diff_eq!(riemann, kde.integrate(lo, hi), epsilon = 1e-6);
}

#[test]
fn works_in_single_precision() {
    let data: Vec<f32> = vec![-1.0, -0.5, 0.25, 0.5, 1.5];
    let kde = Kde1d::new(data, Bandwidth::Scott).unwrap();
    assert!(kde.eval(0.0) > 0.0);
    assert!(kde.eval(0.0).is_finite());
}

#[test]
fn rejects_degenerate_input() {
    assert_eq!(Kde1d::new(vec![1.0f64], Bandwidth::Scott).unwrap_err(), KdeError::TooFewPoints(1));
    assert_eq!(Kde1d::<f64>::new(vec![], Bandwidth::Scott).unwrap_err(), KdeError::TooFewPoints(0));
    assert_eq!(Kde1d::new(vec![2.0f64; 5], Bandwidth::Scott).unwrap_err(), KdeError::AllEqual);
}
