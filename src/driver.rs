//! Two-pass sampling driver.
//!
//! One [`Replication`] runs the user program once per perturbed sample,
//! letting every tracked branch populate a [`BranchLedger`] and the sample's
//! [`PathSignature`]. Only once every sample has been seen can the ledger fit
//! boundary densities ([`Replication::correlate`]) and the jump contributions
//! be aggregated ([`Replication::aggregate`]). [`Oracle`] strings replications
//! together and averages their results.

use std::panic::Location;
use std::time::Instant;

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::aggregate::aggregate;
use crate::branch_id::{advance_path, mix, BranchId, INITIAL_PATH_HASH};
use crate::config::{OracleConfig, SeedPolicy};
use crate::ds::Ds;
use crate::error::ConfigError;
use crate::ledger::{BranchLedger, CorrelationSummary};
use crate::result::{Diagnostics, Estimate, ReplicationResult};
use crate::signature::PathSignature;

/// Output of one sample: value and tangent.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleRecord<const N: usize> {
    pub output: f64,
    pub tangent: [f64; N],
}

/// State a program sees while it runs: branch tracking and its random source.
pub struct SamplingContext<const N: usize> {
    ledger: BranchLedger<N>,
    signature: PathSignature,
    rng: StdRng,
    sample_id: usize,
    path_hash: u64,
    tracking: bool,
}

impl<const N: usize> SamplingContext<N> {
    fn new(config: &OracleConfig, tracking: bool) -> Self {
        SamplingContext {
            ledger: BranchLedger::new(config),
            signature: PathSignature::new(),
            rng: StdRng::seed_from_u64(0),
            sample_id: 0,
            path_hash: INITIAL_PATH_HASH,
            tracking,
        }
    }

    fn begin_sample(&mut self, sample_id: usize, program_seed: u64) {
        self.sample_id = sample_id;
        self.path_hash = INITIAL_PATH_HASH;
        self.signature = PathSignature::new();
        self.rng = StdRng::seed_from_u64(program_seed);
    }

    /// Decide a branch, tracking it under the caller's source location.
    ///
    /// Returns `predicate < 0`.
    #[track_caller]
    pub fn branch(&mut self, predicate: &Ds<N>) -> bool {
        let site = BranchId::from_location(Location::caller()).0;
        self.branch_at(site, predicate)
    }

    /// Decide a branch, tracking it under an explicit site id.
    ///
    /// Returns `predicate < 0`.
    pub fn branch_at(&mut self, site: u64, predicate: &Ds<N>) -> bool {
        let taken = predicate.value() < 0.0;
        if !self.tracking {
            return taken;
        }
        let id = self.ledger.resolve(site, self.path_hash);
        self.ledger.visit(id, predicate, self.sample_id);
        self.signature.push(taken);
        self.path_hash = advance_path(self.path_hash, id, taken);
        taken
    }

    /// The program's random generator, reseeded per the seed policy.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Index of the running sample within its replication.
    pub fn sample_id(&self) -> usize {
        self.sample_id
    }

    /// Branch ledger accumulated so far.
    pub fn ledger(&self) -> &BranchLedger<N> {
        &self.ledger
    }
}

/// A stochastic program over `N` differentiated inputs.
pub trait Program<const N: usize> {
    fn run(&self, ctx: &mut SamplingContext<N>, params: &[Ds<N>; N]) -> Ds<N>;
}

impl<const N: usize, F> Program<N> for F
where
    F: Fn(&mut SamplingContext<N>, &[Ds<N>; N]) -> Ds<N>,
{
    fn run(&self, ctx: &mut SamplingContext<N>, params: &[Ds<N>; N]) -> Ds<N> {
        self(ctx, params)
    }
}

/// Seeds of one replication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicationSeeds {
    /// Seed of the program's random generator.
    pub program: u64,
    /// Seed of the input perturbation stream.
    pub perturbation: u64,
}

/// Progress of a [`Replication`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Correlating,
    Aggregating,
    Done,
}

/// One pass over `num_samples` perturbed samples and its branch analysis.
pub struct Replication<'a, const N: usize> {
    config: &'a OracleConfig,
    seeds: ReplicationSeeds,
    phase: Phase,
    ctx: SamplingContext<N>,
    samples: Vec<SampleRecord<N>>,
    signatures: Vec<PathSignature>,
    correlation: CorrelationSummary,
}

impl<'a, const N: usize> Replication<'a, N> {
    /// Prepare a replication. With `tracking` off, branches are decided but not recorded.
    pub fn new(config: &'a OracleConfig, seeds: ReplicationSeeds, tracking: bool) -> Self {
        Replication {
            config,
            seeds,
            phase: Phase::Idle,
            ctx: SamplingContext::new(config, tracking),
            samples: Vec::with_capacity(config.num_samples),
            signatures: Vec::with_capacity(if tracking { config.num_samples } else { 0 }),
            correlation: CorrelationSummary::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, expected: Phase, next: Phase) {
        assert!(
            self.phase == expected,
            "replication phase {:?} cannot advance to {:?}",
            self.phase,
            next
        );
        trace!("replication phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Run `program` once per sample around `params`.
    ///
    /// # Panics
    ///
    /// Panics unless the replication is idle.
    pub fn sample<P: Program<N> + ?Sized>(&mut self, program: &P, params: &[f64; N]) {
        self.enter(Phase::Idle, Phase::Sampling);

        let config = self.config;
        let mut perturbation = StdRng::seed_from_u64(self.seeds.perturbation);
        let perturbed = |dim: usize| config.perturb_dim.map_or(true, |d| d == dim);

        for sample_id in 0..config.num_samples {
            let inputs: [Ds<N>; N] = std::array::from_fn(|dim| {
                let mut x = Ds::variable(params[dim], dim);
                if perturbed(dim) && config.stddev > 0.0 {
                    let z: f64 = perturbation.sample(StandardNormal);
                    x += z * config.stddev;
                }
                x
            });

            let program_seed = match config.seed_policy {
                SeedPolicy::PerReplication => self.seeds.program,
                SeedPolicy::PerSample => mix(self.seeds.program, sample_id as u64),
            };
            self.ctx.begin_sample(sample_id, program_seed);

            let output = program.run(&mut self.ctx, &inputs);
            trace!("sample {sample_id}: output {output}");

            self.samples.push(SampleRecord {
                output: output.value(),
                tangent: output.tangent_array(),
            });
            if self.ctx.tracking {
                self.signatures.push(std::mem::take(&mut self.ctx.signature));
            }
        }
    }

    /// Fit boundary densities for every recorded branch.
    ///
    /// # Panics
    ///
    /// Panics unless sampling has finished.
    pub fn correlate(&mut self) -> CorrelationSummary {
        self.enter(Phase::Sampling, Phase::Correlating);
        self.correlation = self.ctx.ledger.correlate();
        self.correlation
    }

    /// Combine the continuous tangents with accepted branch jumps.
    ///
    /// # Panics
    ///
    /// Panics unless the replication has been correlated.
    pub fn aggregate(&mut self) -> ReplicationResult<N> {
        self.enter(Phase::Correlating, Phase::Aggregating);

        let n = self.samples.len() as f64;
        let expectation = self.samples.iter().map(|s| s.output).sum::<f64>() / n;
        let mut continuous = [0.0; N];
        for s in &self.samples {
            for (acc, t) in continuous.iter_mut().zip(&s.tangent) {
                *acc += t;
            }
        }
        for c in &mut continuous {
            *c /= n;
        }

        let jumps = aggregate(&self.ctx.ledger, &self.samples, &self.signatures, self.config);
        let derivative: [f64; N] = std::array::from_fn(|k| continuous[k] + jumps.jump[k]);

        let diagnostics = Diagnostics {
            branches_observed: self.ctx.ledger.len(),
            branches_skipped: self.correlation.skipped,
            branches_degenerate: self.correlation.degenerate,
            branches_contributing: jumps.contributing,
            claims_rejected: jumps.claims_rejected,
            visits_dropped: self.ctx.ledger.visits_dropped(),
        };
        debug!(
            "replication: expectation {expectation:.6}, continuous {continuous:?}, jump {:?}, {diagnostics:?}",
            jumps.jump
        );

        self.enter(Phase::Aggregating, Phase::Done);
        ReplicationResult {
            expectation,
            derivative,
            continuous,
            diagnostics,
        }
    }

    /// Run all phases.
    pub fn run<P: Program<N> + ?Sized>(mut self, program: &P, params: &[f64; N]) -> ReplicationResult<N> {
        self.sample(program, params);
        self.correlate();
        self.aggregate()
    }

    /// Branch ledger of this replication.
    pub fn ledger(&self) -> &BranchLedger<N> {
        &self.ctx.ledger
    }

    /// Sample records gathered so far.
    pub fn samples(&self) -> &[SampleRecord<N>] {
        &self.samples
    }

    /// Path signatures gathered so far (empty without tracking).
    pub fn signatures(&self) -> &[PathSignature] {
        &self.signatures
    }
}

/// Gradient estimator for stochastic programs with `N` inputs.
#[derive(Clone, Debug)]
pub struct Oracle<const N: usize> {
    config: OracleConfig,
}

impl<const N: usize> Oracle<N> {
    /// Create an oracle, validating `config` for `N` inputs.
    pub fn new(config: OracleConfig) -> Result<Self, ConfigError> {
        config.validate(N)?;
        Ok(Oracle { config })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Seeds of every replication, drawn from the configured seed.
    pub fn replication_seeds(&self) -> Vec<ReplicationSeeds> {
        let mut seeder = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        (0..self.config.num_replications)
            .map(|_| {
                let program = seeder.gen();
                let perturbation = seeder.gen();
                ReplicationSeeds {
                    program,
                    perturbation,
                }
            })
            .collect()
    }

    /// Estimate `E[program(params)]` and its derivative, correcting for branches.
    pub fn estimate<P: Program<N> + ?Sized>(&self, program: &P, params: &[f64; N]) -> Estimate<N> {
        let start = Instant::now();
        let results = self
            .replication_seeds()
            .into_iter()
            .map(|seeds| Replication::new(&self.config, seeds, true).run(program, params))
            .collect();
        self.combine(results, start)
    }

    /// Estimate with plain forward-mode derivatives, ignoring branch jumps.
    pub fn estimate_crisp<P: Program<N> + ?Sized>(&self, program: &P, params: &[f64; N]) -> Estimate<N> {
        let start = Instant::now();
        let results = self
            .replication_seeds()
            .into_iter()
            .map(|seeds| Replication::new(&self.config, seeds, false).run(program, params))
            .collect();
        self.combine(results, start)
    }

    /// Like [`estimate`](Self::estimate), running replications on the rayon pool.
    ///
    /// Produces the same result as the sequential estimate.
    #[cfg(feature = "parallel")]
    pub fn estimate_par<P: Program<N> + Sync + ?Sized>(
        &self,
        program: &P,
        params: &[f64; N],
    ) -> Estimate<N> {
        use rayon::prelude::*;

        let start = Instant::now();
        let results = self
            .replication_seeds()
            .into_par_iter()
            .map(|seeds| Replication::new(&self.config, seeds, true).run(program, params))
            .collect();
        self.combine(results, start)
    }

    fn combine(&self, results: Vec<ReplicationResult<N>>, start: Instant) -> Estimate<N> {
        let reps = results.len() as f64;
        let mut expectation = 0.0;
        let mut derivative = [0.0; N];
        let mut diagnostics = Diagnostics::default();
        for r in &results {
            expectation += r.expectation;
            for (acc, d) in derivative.iter_mut().zip(&r.derivative) {
                *acc += d;
            }
            diagnostics += r.diagnostics;
        }
        expectation /= reps;
        for d in &mut derivative {
            *d /= reps;
        }

        let duration = start.elapsed();
        info!(
            "expectation {:.6}, derivative {:?} ({} samples x {} replications, {:?})",
            expectation, derivative, self.config.num_samples, self.config.num_replications, duration
        );
        Estimate {
            expectation,
            derivative,
            diagnostics,
            num_samples: self.config.num_samples,
            num_replications: self.config.num_replications,
            duration,
        }
    }
}
