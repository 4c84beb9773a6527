use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gradient_oracle::{Oracle, OracleConfig};
use gradient_oracle_cli::programs::{Heaviside, Synthetic, ThresholdPair};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgramKind {
    /// Step function over one input
    Heaviside,
    /// 32 chained thresholds over one input
    Synthetic,
    /// Two interacting branches over two inputs
    #[value(name = "threshold_pair")]
    ThresholdPair,
}

/// Estimate expectation and gradient of a stochastic program.
///
/// Parameters are read from stdin, one whitespace-separated group per combination.
#[derive(Parser, Debug)]
#[command(name = "gradient-oracle")]
struct Cli {
    /// Seed of the replication seeds; -1 draws from entropy
    #[arg(short = 's', long, default_value_t = 1, allow_negative_numbers = true)]
    seed: i64,
    /// Parameter combinations to read (default: all on stdin)
    #[arg(long)]
    nc: Option<usize>,
    /// Replications, averaged
    #[arg(long, default_value_t = 1)]
    nr: usize,
    /// Perturbation variance
    #[arg(long, default_value_t = 1.0)]
    var: f64,
    /// Samples per replication
    #[arg(long, default_value_t = 100)]
    ns: usize,
    /// Program to estimate
    #[arg(long, value_enum, default_value_t = ProgramKind::Heaviside)]
    program: ProgramKind,
    /// Additional estimator option as key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// Plain forward-mode derivatives, no branch correction
    #[arg(long)]
    crisp: bool,
    /// Log per-branch details
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn config(&self) -> Result<OracleConfig> {
        let mut config = OracleConfig::default();
        let typed = [
            ("s", self.seed.to_string()),
            ("nr", self.nr.to_string()),
            ("var", self.var.to_string()),
            ("ns", self.ns.to_string()),
        ];
        for (key, value) in &typed {
            config.set_option(key, value)?;
        }
        for option in &self.set {
            let (key, value) = option
                .split_once('=')
                .with_context(|| format!("expected KEY=VALUE, got {option:?}"))?;
            config.set_option(key.trim(), value)?;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = cli.config()?;
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading parameters from stdin")?;
    let mut stdout = std::io::stdout().lock();

    match cli.program {
        ProgramKind::Heaviside => {
            let oracle = Oracle::<1>::new(config)?;
            gradient_oracle_cli::run(&oracle, &Heaviside, cli.crisp, cli.nc, &input, &mut stdout)
        }
        ProgramKind::Synthetic => {
            let program = Synthetic::new(config.seed);
            let oracle = Oracle::<1>::new(config)?;
            gradient_oracle_cli::run(&oracle, &program, cli.crisp, cli.nc, &input, &mut stdout)
        }
        ProgramKind::ThresholdPair => {
            let oracle = Oracle::<2>::new(config)?;
            gradient_oracle_cli::run(&oracle, &ThresholdPair, cli.crisp, cli.nc, &input, &mut stdout)
        }
    }
}
