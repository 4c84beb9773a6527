//! Command-line driver support: parameter input and result output.

pub mod programs;

use std::io::Write;

use anyhow::{bail, Context, Result};
use gradient_oracle::{Estimate, Oracle, Program};

/// Parse the next `N` parameters from whitespace-separated input.
pub fn read_params<'a, const N: usize>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<[f64; N]> {
    let mut params = [0.0; N];
    for (dim, p) in params.iter_mut().enumerate() {
        let Some(token) = tokens.next() else {
            bail!("program expects {N} parameters, got {dim}");
        };
        *p = token
            .parse()
            .with_context(|| format!("parameter {dim}: cannot parse {token:?}"))?;
    }
    Ok(params)
}

/// Print an estimate in the line format downstream scripts parse.
pub fn write_estimate<const N: usize>(out: &mut impl Write, estimate: &Estimate<N>) -> std::io::Result<()> {
    writeln!(out, "estimation_duration: {}us", estimate.duration.as_micros())?;
    writeln!(out, "expectation: {}", estimate.expectation)?;
    for d in &estimate.derivative {
        writeln!(out, "derivative: {d}")?;
    }
    Ok(())
}

/// Estimate `program` for every parameter combination in `input`.
///
/// `combinations` defaults to every combination `input` starts; an incomplete
/// trailing one is an error.
pub fn run<const N: usize, P: Program<N>>(
    oracle: &Oracle<N>,
    program: &P,
    crisp: bool,
    combinations: Option<usize>,
    input: &str,
    out: &mut impl Write,
) -> Result<()> {
    let mut tokens = input.split_whitespace();
    let combinations =
        combinations.unwrap_or_else(|| input.split_whitespace().count().div_ceil(N.max(1)).max(1));

    for _ in 0..combinations {
        let params: [f64; N] = read_params(&mut tokens)?;
        let estimate = if crisp {
            oracle.estimate_crisp(program, &params)
        } else {
            oracle.estimate(program, &params)
        };
        write_estimate(&mut *out, &estimate)?;
    }
    Ok(())
}
