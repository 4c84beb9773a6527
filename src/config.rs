//! Estimator configuration.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::kde::Bandwidth;

/// How the program's own random generator is seeded for each sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Every sample of a replication sees the same program seed.
    #[default]
    PerReplication,
    /// Each sample gets its own program seed derived from the replication seed.
    PerSample,
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

impl FromStr for SeedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "replication" | "per-replication" => Ok(SeedPolicy::PerReplication),
            "sample" | "per-sample" => Ok(SeedPolicy::PerSample),
            _ => Err(invalid("seed-policy", s)),
        }
    }
}

impl FromStr for Bandwidth {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "scott" => Ok(Bandwidth::Scott),
            "silverman" => Ok(Bandwidth::Silverman),
            _ => Err(invalid("bandwidth", s)),
        }
    }
}

/// Configuration for the gradient oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleConfig {
    /// Standard deviation of the Gaussian input perturbation (default: 1).
    pub stddev: f64,
    /// Samples per replication (default: 100).
    pub num_samples: usize,
    /// Independent replications whose results are averaged (default: 1).
    pub num_replications: usize,
    /// Perturb only this input dimension (default: all).
    pub perturb_dim: Option<usize>,
    /// Seed of the replication seed generator; `None` draws from entropy (default: 1).
    pub seed: Option<u64>,
    /// Program seeding policy (default: per replication).
    pub seed_policy: SeedPolicy,
    /// Carrier list capacity per branch side, K (default: 10).
    pub carrier_capacity: usize,
    /// Minimum visits and carriers per side for a branch to qualify (default: 1).
    pub min_carriers: usize,
    /// Maximum carrier pairs used to estimate a branch's output step (default: 10).
    pub max_carriers: usize,
    /// Per-branch cap on recorded predicate values (default: unbounded).
    pub max_recorded_conditions: usize,
    /// Cap on the number of branch records per replication (default: unbounded).
    pub max_branches: usize,
    /// Distinct calling contexts tracked per static branch site; 0 disables
    /// context splitting (default: 0).
    pub fork_limit: usize,
    /// Branches whose output step is bounded below this are ignored (default: 0).
    pub min_y_step: f64,
    /// Branches whose predicate variance does not exceed this are ignored (default: 0).
    pub min_condition_variance: f64,
    /// Predicates with larger magnitude are not recorded (default: 65000).
    pub kde_delta: f64,
    /// Carrier magnitude bound in units of `stddev` (default: 1e15).
    pub carrier_delta: f64,
    /// KDE bandwidth rule (default: Scott).
    pub bandwidth: Bandwidth,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            stddev: 1.0,
            num_samples: 100,
            num_replications: 1,
            perturb_dim: None,
            seed: Some(1),
            seed_policy: SeedPolicy::PerReplication,
            carrier_capacity: 10,
            min_carriers: 1,
            max_carriers: 10,
            max_recorded_conditions: usize::MAX,
            max_branches: usize::MAX,
            fork_limit: 0,
            min_y_step: 0.0,
            min_condition_variance: 0.0,
            kde_delta: 65000.0,
            carrier_delta: 1e15,
            bandwidth: Bandwidth::Scott,
        }
    }
}

fn parse<T: FromStr>(option: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(option, value))
}

impl OracleConfig {
    /// Apply a single `key = value` option.
    ///
    /// Keys follow the command-line names (`s`, `nr`, `ns`, `var`, ...). `var`
    /// sets the standard deviation to `sqrt(var)`; `s = -1` selects an entropy
    /// seed.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "s" | "seed" => {
                let seed: i64 = parse(key, value)?;
                self.seed = if seed == -1 { None } else { Some(seed as u64) };
            }
            "nr" | "replications" => self.num_replications = parse(key, value)?,
            "ns" | "samples" => self.num_samples = parse(key, value)?,
            "var" | "variance" => {
                let var: f64 = parse(key, value)?;
                if !(var >= 0.0) {
                    return Err(ConfigError::InvalidStddev(var));
                }
                self.stddev = var.sqrt();
            }
            "stddev" => self.stddev = parse(key, value)?,
            "dim" | "perturb-dim" => self.perturb_dim = Some(parse(key, value)?),
            "seed-policy" => self.seed_policy = parse(key, value)?,
            "k" | "carrier-capacity" => self.carrier_capacity = parse(key, value)?,
            "min-carriers" => self.min_carriers = parse(key, value)?,
            "max-carriers" => self.max_carriers = parse(key, value)?,
            "max-conditions" => self.max_recorded_conditions = parse(key, value)?,
            "max-branches" => self.max_branches = parse(key, value)?,
            "fork-limit" => self.fork_limit = parse(key, value)?,
            "min-y-step" => self.min_y_step = parse(key, value)?,
            "min-cond-variance" => self.min_condition_variance = parse(key, value)?,
            "kde-delta" => self.kde_delta = parse(key, value)?,
            "carrier-delta" => self.carrier_delta = parse(key, value)?,
            "bandwidth" => self.bandwidth = parse(key, value)?,
            _ => return Err(ConfigError::UnknownOption(key.to_string())),
        }
        Ok(())
    }

    /// Check the configuration for a program with `num_inputs` inputs.
    pub fn validate(&self, num_inputs: usize) -> Result<(), ConfigError> {
        if self.num_samples == 0 {
            return Err(ConfigError::NonPositive("num_samples"));
        }
        if self.num_replications == 0 {
            return Err(ConfigError::NonPositive("num_replications"));
        }
        if self.carrier_capacity == 0 {
            return Err(ConfigError::NonPositive("carrier_capacity"));
        }
        if self.max_carriers == 0 {
            return Err(ConfigError::NonPositive("max_carriers"));
        }
        if !(self.stddev.is_finite() && self.stddev >= 0.0) {
            return Err(ConfigError::InvalidStddev(self.stddev));
        }
        if self.min_carriers == 0 || self.min_carriers > self.carrier_capacity {
            return Err(ConfigError::CarrierBounds {
                min: self.min_carriers,
                capacity: self.carrier_capacity,
            });
        }
        if let Some(dim) = self.perturb_dim {
            if dim >= num_inputs {
                return Err(ConfigError::DimensionOutOfRange { dim, num_inputs });
            }
        }
        Ok(())
    }

    /// Largest predicate magnitude that may carry a tangent.
    pub fn carrier_bound(&self) -> f64 {
        self.carrier_delta * self.stddev
    }
}
