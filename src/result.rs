use std::ops::AddAssign;
use std::time::Duration;

/// Branch bookkeeping counts, summed over replications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Branch records created.
    pub branches_observed: usize,
    /// Branches without enough carriers on one side.
    pub branches_skipped: usize,
    /// Branches dropped for zero density or insufficient predicate variance.
    pub branches_degenerate: usize,
    /// Branches whose jump contribution was accepted in at least one dimension.
    pub branches_contributing: usize,
    /// Branch contributions rejected because their carriers were already claimed.
    pub claims_rejected: usize,
    /// Visits discarded because the branch-record cap was reached.
    pub visits_dropped: usize,
}

impl AddAssign for Diagnostics {
    fn add_assign(&mut self, rhs: Self) {
        self.branches_observed += rhs.branches_observed;
        self.branches_skipped += rhs.branches_skipped;
        self.branches_degenerate += rhs.branches_degenerate;
        self.branches_contributing += rhs.branches_contributing;
        self.claims_rejected += rhs.claims_rejected;
        self.visits_dropped += rhs.visits_dropped;
    }
}

/// Outcome of one replication.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicationResult<const N: usize> {
    /// Mean sample output.
    pub expectation: f64,
    /// Mean output tangent plus accepted branch jumps.
    pub derivative: [f64; N],
    /// Mean output tangent alone.
    pub continuous: [f64; N],
    pub diagnostics: Diagnostics,
}

/// Estimated expectation and derivative of a stochastic program.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate<const N: usize> {
    /// Estimate of `E[output]`.
    pub expectation: f64,
    /// Estimate of `d E[output] / d params[k]` per input.
    pub derivative: [f64; N],
    pub diagnostics: Diagnostics,
    /// Samples per replication.
    pub num_samples: usize,
    pub num_replications: usize,
    /// Wall-clock time of the estimation.
    pub duration: Duration,
}
