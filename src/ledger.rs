//! Per-branch bookkeeping for the gradient oracle.
//!
//! Every tracked branch visit lands in a [`BranchRecord`]: visit counts per
//! side, the predicate values seen (stored as `f16`), and two bounded lists of
//! the samples whose predicates came closest to the decision boundary on
//! either side ("carriers"). After sampling, [`BranchLedger::correlate`] fits a
//! density to each branch's predicate values and turns it into a
//! weight-tangent: how fast probability mass crosses the boundary as each input
//! moves.
//!
//! The *true* side of a branch is `predicate < 0`.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;

use half::f16;
use log::debug;

use crate::branch_id::{context_key, BranchId};
use crate::config::OracleConfig;
use crate::ds::Ds;
use crate::kde::{sample_variance, Bandwidth, Kde1d};

/// Side of a branch decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// `predicate < 0`.
    True,
    /// `predicate >= 0` (and NaN).
    False,
}

impl Side {
    /// Side taken for a predicate value.
    #[inline]
    pub fn of(value: f64) -> Side {
        if value < 0.0 {
            Side::True
        } else {
            Side::False
        }
    }
}

/// A sample whose predicate came close to a branch's boundary.
#[derive(Clone, Debug)]
pub struct Carrier<const N: usize> {
    /// Predicate value and tangent in that sample.
    pub predicate: Ds<N>,
    /// Index of the sample within the replication.
    pub sample_id: usize,
}

impl<const N: usize> Carrier<N> {
    /// Distance of the predicate from the boundary.
    #[inline]
    pub fn magnitude(&self) -> f64 {
        self.predicate.value().abs()
    }
}

/// Bounded list of carriers sorted by ascending `|predicate|`.
///
/// When full, a closer candidate evicts the farthest entry. Among equal
/// magnitudes the earlier sample stays ahead.
#[derive(Clone, Debug)]
pub struct CarrierList<const N: usize> {
    entries: Vec<Carrier<N>>,
    capacity: usize,
}

impl<const N: usize> CarrierList<N> {
    /// Create an empty list holding at most `capacity` carriers.
    pub fn new(capacity: usize) -> Self {
        CarrierList {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Whether a candidate at `magnitude` would be kept.
    #[inline]
    pub fn accepts(&self, magnitude: f64) -> bool {
        if self.entries.len() < self.capacity {
            return true;
        }
        self.entries
            .last()
            .is_some_and(|worst| magnitude < worst.magnitude())
    }

    /// Insert a carrier, evicting the farthest one when full.
    ///
    /// Returns `false` if the candidate was not kept.
    pub fn insert(&mut self, carrier: Carrier<N>) -> bool {
        let m = carrier.magnitude();
        if !self.accepts(m) {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop();
        }
        let pos = self.entries.partition_point(|c| c.magnitude() <= m);
        self.entries.insert(pos, carrier);
        true
    }

    /// Carriers, closest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Carrier<N>> {
        self.entries.iter()
    }

    /// Number of carriers held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no carrier is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of carriers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Everything recorded about one branch during a replication.
#[derive(Clone, Debug)]
pub struct BranchRecord<const N: usize> {
    id: BranchId,
    visit_count: usize,
    true_count: usize,
    false_count: usize,
    predicate_values: Vec<f16>,
    carriers_true: CarrierList<N>,
    carriers_false: CarrierList<N>,
    density_at_zero: f64,
    mean_predicate: Option<Ds<N>>,
    weight_tangent: Option<[f64; N]>,
}

impl<const N: usize> BranchRecord<N> {
    fn new(id: BranchId, capacity: usize) -> Self {
        BranchRecord {
            id,
            visit_count: 0,
            true_count: 0,
            false_count: 0,
            predicate_values: Vec::new(),
            carriers_true: CarrierList::new(capacity),
            carriers_false: CarrierList::new(capacity),
            density_at_zero: 0.0,
            mean_predicate: None,
            weight_tangent: None,
        }
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    /// Total visits, including visits without tangent or with non-finite predicates.
    pub fn visit_count(&self) -> usize {
        self.visit_count
    }

    pub fn true_count(&self) -> usize {
        self.true_count
    }

    pub fn false_count(&self) -> usize {
        self.false_count
    }

    /// Recorded predicate values, in visit order.
    pub fn predicate_values(&self) -> &[f16] {
        &self.predicate_values
    }

    /// Carrier list for one side.
    pub fn carriers(&self, side: Side) -> &CarrierList<N> {
        match side {
            Side::True => &self.carriers_true,
            Side::False => &self.carriers_false,
        }
    }

    fn carriers_mut(&mut self, side: Side) -> &mut CarrierList<N> {
        match side {
            Side::True => &mut self.carriers_true,
            Side::False => &mut self.carriers_false,
        }
    }

    /// Predicate density at zero (0 until correlated, or when degenerate).
    pub fn density_at_zero(&self) -> f64 {
        self.density_at_zero
    }

    /// Mean predicate over all carriers, once correlated.
    pub fn mean_predicate(&self) -> Option<&Ds<N>> {
        self.mean_predicate.as_ref()
    }

    /// Weight-tangent, once correlated; `None` for skipped branches.
    pub fn weight_tangent(&self) -> Option<&[f64; N]> {
        self.weight_tangent.as_ref()
    }
}

/// Outcome counts of [`BranchLedger::correlate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    /// Branches that received a weight-tangent.
    pub qualified: usize,
    /// Branches lacking carriers on at least one side.
    pub skipped: usize,
    /// Branches with a zero or non-finite boundary density, or too little variance.
    pub degenerate: usize,
}

#[derive(Clone, Copy, Debug)]
struct Limits {
    carrier_capacity: usize,
    min_carriers: usize,
    max_recorded_conditions: usize,
    max_branches: usize,
    fork_limit: usize,
    kde_delta: f64,
    carrier_bound: f64,
    min_condition_variance: f64,
    bandwidth: Bandwidth,
}

/// Branch records of one replication.
#[derive(Clone, Debug)]
pub struct BranchLedger<const N: usize> {
    records: BTreeMap<BranchId, BranchRecord<N>>,
    contexts: HashMap<u64, Vec<u64>>,
    visits_dropped: usize,
    limits: Limits,
}

impl<const N: usize> BranchLedger<N> {
    /// Create an empty ledger using the limits in `config`.
    pub fn new(config: &OracleConfig) -> Self {
        BranchLedger {
            records: BTreeMap::new(),
            contexts: HashMap::new(),
            visits_dropped: 0,
            limits: Limits {
                carrier_capacity: config.carrier_capacity,
                min_carriers: config.min_carriers,
                max_recorded_conditions: config.max_recorded_conditions,
                max_branches: config.max_branches,
                fork_limit: config.fork_limit,
                kde_delta: config.kde_delta,
                carrier_bound: config.carrier_bound(),
                min_condition_variance: config.min_condition_variance,
                bandwidth: config.bandwidth,
            },
        }
    }

    /// Identity of `site` reached along the execution path `path_hash`.
    ///
    /// Without a fork limit this is the site itself. Otherwise each site keeps
    /// up to `fork_limit` distinct contexts; further contexts collapse onto one
    /// of the existing ones.
    pub fn resolve(&mut self, site: u64, path_hash: u64) -> BranchId {
        let limit = self.limits.fork_limit;
        if limit == 0 {
            return BranchId(site);
        }
        let key = context_key(site, path_hash);
        let known = self.contexts.entry(site).or_default();
        if known.contains(&key) {
            return BranchId(key);
        }
        if known.len() < limit {
            known.push(key);
            return BranchId(key);
        }
        BranchId(known[(key % known.len() as u64) as usize])
    }

    /// Record one visit of branch `id` with `predicate` in sample `sample_id`.
    pub fn visit(&mut self, id: BranchId, predicate: &Ds<N>, sample_id: usize) {
        let limits = self.limits;
        let num_records = self.records.len();
        let record = match self.records.entry(id) {
            btree_map::Entry::Occupied(e) => e.into_mut(),
            btree_map::Entry::Vacant(e) => {
                if num_records >= limits.max_branches {
                    self.visits_dropped += 1;
                    return;
                }
                e.insert(BranchRecord::new(id, limits.carrier_capacity))
            }
        };

        let value = predicate.value();
        let side = Side::of(value);
        record.visit_count += 1;
        match side {
            Side::True => record.true_count += 1,
            Side::False => record.false_count += 1,
        }

        if !value.is_finite() {
            return;
        }
        let magnitude = value.abs();
        if magnitude <= limits.kde_delta
            && record.predicate_values.len() < limits.max_recorded_conditions
        {
            record.predicate_values.push(f16::from_f64(value));
        }

        if record.true_count < limits.min_carriers || record.false_count < limits.min_carriers {
            return;
        }
        if !predicate.has_tangent() || magnitude > limits.carrier_bound {
            return;
        }

        let list = record.carriers_mut(side);
        if list.accepts(magnitude) {
            list.insert(Carrier {
                predicate: predicate.clone(),
                sample_id,
            });
        }
    }

    /// Fit boundary densities and compute weight-tangents for every branch.
    pub fn correlate(&mut self) -> CorrelationSummary {
        let limits = self.limits;
        let mut summary = CorrelationSummary::default();

        for record in self.records.values_mut() {
            if record.carriers_true.len() < limits.min_carriers
                || record.carriers_false.len() < limits.min_carriers
            {
                summary.skipped += 1;
                continue;
            }

            let data: Vec<f32> = record.predicate_values.iter().map(|v| v.to_f32()).collect();
            let variance = f64::from(sample_variance(&data));
            if !(variance > limits.min_condition_variance) {
                debug!("branch {}: predicate variance {:.3e} too small", record.id, variance);
                summary.degenerate += 1;
                continue;
            }

            let density = match Kde1d::new(data, limits.bandwidth) {
                Ok(kde) => f64::from(kde.eval(0.0)),
                Err(err) => {
                    debug!("branch {}: no density estimate ({})", record.id, err);
                    0.0
                }
            };
            if !(density.is_finite() && density > 0.0) {
                summary.degenerate += 1;
                continue;
            }

            let carriers = record
                .carriers_true
                .iter()
                .chain(record.carriers_false.iter())
                .map(|c| &c.predicate);
            let Some(mean) = Ds::mean(carriers) else {
                summary.skipped += 1;
                continue;
            };

            let weight_tangent: [f64; N] = std::array::from_fn(|k| density * mean.tangent().get(k));
            debug!(
                "branch {}: {} visits ({} true, {} false), {} values, density at zero {:.4}, mean predicate {}",
                record.id,
                record.visit_count,
                record.true_count,
                record.false_count,
                record.predicate_values.len(),
                density,
                mean
            );

            record.density_at_zero = density;
            record.mean_predicate = Some(mean);
            record.weight_tangent = Some(weight_tangent);
            summary.qualified += 1;
        }

        summary
    }

    /// Branch records in ascending id order.
    pub fn records(&self) -> btree_map::Values<'_, BranchId, BranchRecord<N>> {
        self.records.values()
    }

    /// Record of branch `id`, if any.
    pub fn get(&self, id: BranchId) -> Option<&BranchRecord<N>> {
        self.records.get(&id)
    }

    /// Number of branch records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no branch was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Visits discarded because the branch-record cap was reached.
    pub fn visits_dropped(&self) -> usize {
        self.visits_dropped
    }

    /// Forget all records and contexts.
    pub fn clear(&mut self) {
        self.records.clear();
        self.contexts.clear();
        self.visits_dropped = 0;
    }
}
