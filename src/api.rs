use crate::config::OracleConfig;
use crate::driver::{Oracle, SamplingContext};
use crate::ds::Ds;
use crate::error::ConfigError;
use crate::result::Estimate;

/// Estimate `E[f(params + noise)]` and its derivative, accounting for the
/// jumps at every branch `f` decides through [`SamplingContext::branch`].
///
/// ```
/// use gradient_oracle::{Ds, OracleConfig};
///
/// let config = OracleConfig { num_samples: 2000, ..OracleConfig::default() };
/// let est = gradient_oracle::estimate(
///     |ctx, x| {
///         if ctx.branch(&x[0]) {
///             Ds::constant(0.0)
///         } else {
///             Ds::constant(1.0)
///         }
///     },
///     &[0.0],
///     config,
/// )
/// .unwrap();
/// // Density of the standard normal at zero is about 0.399.
/// assert!((est.derivative[0] - 0.399).abs() < 0.1);
/// ```
pub fn estimate<const N: usize>(
    f: impl Fn(&mut SamplingContext<N>, &[Ds<N>; N]) -> Ds<N>,
    params: &[f64; N],
    config: OracleConfig,
) -> Result<Estimate<N>, ConfigError> {
    let oracle = Oracle::new(config)?;
    Ok(oracle.estimate(&f, params))
}

/// Estimate `E[f(params + noise)]` with plain forward-mode derivatives.
///
/// Branches are taken by value and contribute nothing to the derivative.
///
/// ```
/// use gradient_oracle::{Ds, OracleConfig};
///
/// let config = OracleConfig { stddev: 0.0, num_samples: 4, ..OracleConfig::default() };
/// let est = gradient_oracle::estimate_crisp(|_, x| &x[0] * &x[0], &[3.0], config).unwrap();
/// assert_eq!(est.expectation, 9.0);
/// assert_eq!(est.derivative[0], 6.0);
/// ```
pub fn estimate_crisp<const N: usize>(
    f: impl Fn(&mut SamplingContext<N>, &[Ds<N>; N]) -> Ds<N>,
    params: &[f64; N],
    config: OracleConfig,
) -> Result<Estimate<N>, ConfigError> {
    let oracle = Oracle::new(config)?;
    Ok(oracle.estimate_crisp(&f, params))
}
