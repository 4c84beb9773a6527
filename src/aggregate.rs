//! Conflict-free aggregation of branch jump contributions.
//!
//! Each correlated branch yields a *y-step*, the expected output change when a
//! sample crosses its boundary, estimated from its carriers. Its candidate
//! contribution to `d E[y] / d x_dim` is
//! `weight_tangent[dim] * (visit_count / num_samples) * y_step`.
//!
//! Branches frequently share carrier samples (nested or correlated
//! conditions). Per dimension, candidates are taken greedily in order of
//! decreasing magnitude, and a branch is only accepted if none of its carrier
//! samples has already been claimed in the same role and jump direction.

use log::debug;

use crate::branch_id::BranchId;
use crate::config::OracleConfig;
use crate::driver::SampleRecord;
use crate::ledger::{BranchLedger, BranchRecord, Carrier, Side};
use crate::signature::PathSignature;

/// Output step of one branch, with the carrier samples it was estimated from.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchStep {
    pub id: BranchId,
    /// `mean(false-side outputs) - mean(true-side outputs)`.
    pub y_step: f64,
    /// True-side carrier samples used.
    pub true_samples: Vec<usize>,
    /// False-side carrier samples used (deduplicated).
    pub false_samples: Vec<usize>,
    /// Whether carriers were paired by path similarity.
    pub paired: bool,
}

/// Estimate the output step of `record`.
///
/// Returns `None` when the branch cannot plausibly affect the output: no
/// carriers on a side, or the largest possible output difference over all
/// true/false carrier pairs is below `min_y_step`.
///
/// If the output ranges of the two sides do not overlap, the closest
/// `max_pairs` carriers of each side are averaged directly. Otherwise each of
/// the closest `max_pairs` true-side carriers is paired with the false-side
/// carrier whose path signature is nearest in Hamming distance, which reduces
/// the influence of unrelated randomness on the step.
pub fn branch_step<const N: usize>(
    record: &BranchRecord<N>,
    samples: &[SampleRecord<N>],
    signatures: &[PathSignature],
    min_y_step: f64,
    max_pairs: usize,
) -> Option<BranchStep> {
    let trues: Vec<&Carrier<N>> = record.carriers(Side::True).iter().collect();
    let falses: Vec<&Carrier<N>> = record.carriers(Side::False).iter().collect();
    if trues.is_empty() || falses.is_empty() || max_pairs == 0 {
        return None;
    }

    let output = |sample_id: usize| samples[sample_id].output;
    let (t_min, t_max) = output_range(trues.iter().map(|c| output(c.sample_id)));
    let (f_min, f_max) = output_range(falses.iter().map(|c| output(c.sample_id)));

    let bound = (f_max - t_min).max(t_max - f_min);
    if !(bound >= min_y_step) || bound == 0.0 {
        debug!(
            "branch {}: output step bound {:.3e} below threshold",
            record.id(),
            bound
        );
        return None;
    }

    let overlap = t_min <= f_max && f_min <= t_max;
    let trues = &trues[..trues.len().min(max_pairs)];

    if !overlap {
        let falses = &falses[..falses.len().min(max_pairs)];
        let t_mean = mean(trues.iter().map(|c| output(c.sample_id)));
        let f_mean = mean(falses.iter().map(|c| output(c.sample_id)));
        return Some(BranchStep {
            id: record.id(),
            y_step: f_mean - t_mean,
            true_samples: trues.iter().map(|c| c.sample_id).collect(),
            false_samples: falses.iter().map(|c| c.sample_id).collect(),
            paired: false,
        });
    }

    let mut diff_sum = 0.0;
    let mut true_samples = Vec::with_capacity(trues.len());
    let mut false_samples: Vec<usize> = Vec::with_capacity(trues.len());
    for t in trues {
        let sig = &signatures[t.sample_id];
        let mut best = falses[0];
        let mut best_dist = sig.hamming(&signatures[best.sample_id]);
        for &f in &falses[1..] {
            let dist = sig.hamming(&signatures[f.sample_id]);
            if dist < best_dist {
                best = f;
                best_dist = dist;
            }
        }
        diff_sum += output(best.sample_id) - output(t.sample_id);
        true_samples.push(t.sample_id);
        if !false_samples.contains(&best.sample_id) {
            false_samples.push(best.sample_id);
        }
    }

    Some(BranchStep {
        id: record.id(),
        y_step: diff_sum / trues.len() as f64,
        true_samples,
        false_samples,
        paired: true,
    })
}

fn output_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len() as f64;
    values.sum::<f64>() / n
}

/// Direction in which probability mass crosses a boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JumpDirection {
    /// Mass moves from the true side to the false side as the input grows.
    TrueToFalse,
    /// Mass moves from the false side to the true side as the input grows.
    FalseToTrue,
}

impl JumpDirection {
    /// Direction implied by a weight-tangent component.
    pub fn of(weight: f64) -> Self {
        if weight >= 0.0 {
            JumpDirection::TrueToFalse
        } else {
            JumpDirection::FalseToTrue
        }
    }
}

/// Per-sample claim flags: one bit per (carrier role, jump direction).
#[derive(Clone, Debug)]
pub struct ClaimSet {
    flags: Vec<u8>,
}

impl ClaimSet {
    /// No claims over `num_samples` samples.
    pub fn new(num_samples: usize) -> Self {
        ClaimSet {
            flags: vec![0; num_samples],
        }
    }

    #[inline]
    fn bit(role: Side, direction: JumpDirection) -> u8 {
        let r = match role {
            Side::True => 0,
            Side::False => 2,
        };
        let d = match direction {
            JumpDirection::TrueToFalse => 0,
            JumpDirection::FalseToTrue => 1,
        };
        1 << (r + d)
    }

    /// Whether `sample` is claimed as a `role` carrier in `direction`.
    pub fn is_claimed(&self, sample: usize, role: Side, direction: JumpDirection) -> bool {
        self.flags[sample] & Self::bit(role, direction) != 0
    }

    /// Claim all samples of `step` in `direction`, unless any is already taken.
    ///
    /// Returns `true` if the claim succeeded.
    pub fn try_claim(&mut self, step: &BranchStep, direction: JumpDirection) -> bool {
        let t_bit = Self::bit(Side::True, direction);
        let f_bit = Self::bit(Side::False, direction);
        let taken = step.true_samples.iter().any(|&s| self.flags[s] & t_bit != 0)
            || step.false_samples.iter().any(|&s| self.flags[s] & f_bit != 0);
        if taken {
            return false;
        }
        for &s in &step.true_samples {
            self.flags[s] |= t_bit;
        }
        for &s in &step.false_samples {
            self.flags[s] |= f_bit;
        }
        true
    }
}

/// Jump part of the derivative for one replication.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregation<const N: usize> {
    /// Sum of accepted branch contributions per dimension.
    pub jump: [f64; N],
    /// Branches accepted in at least one dimension.
    pub contributing: usize,
    /// Candidates rejected because a carrier was already claimed.
    pub claims_rejected: usize,
}

/// Accumulate accepted branch contributions of a correlated ledger.
pub fn aggregate<const N: usize>(
    ledger: &BranchLedger<N>,
    samples: &[SampleRecord<N>],
    signatures: &[PathSignature],
    config: &OracleConfig,
) -> Aggregation<N> {
    let num_samples = samples.len() as f64;
    let steps: Vec<(&[f64; N], f64, BranchStep)> = ledger
        .records()
        .filter_map(|record| {
            let weight = record.weight_tangent()?;
            let step = branch_step(
                record,
                samples,
                signatures,
                config.min_y_step,
                config.max_carriers,
            )?;
            let visit_ratio = record.visit_count() as f64 / num_samples;
            Some((weight, visit_ratio, step))
        })
        .collect();

    let mut accepted = vec![false; steps.len()];
    let mut jump = [0.0; N];
    let mut claims_rejected = 0;

    for (dim, total) in jump.iter_mut().enumerate() {
        let mut candidates: Vec<(usize, f64)> = steps
            .iter()
            .enumerate()
            .filter_map(|(i, (weight, visit_ratio, step))| {
                let cd = weight[dim] * visit_ratio * step.y_step;
                (cd != 0.0 && cd.is_finite()).then_some((i, cd))
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.1.abs()
                .total_cmp(&a.1.abs())
                .then(steps[a.0].2.id.cmp(&steps[b.0].2.id))
        });

        let mut claims = ClaimSet::new(samples.len());
        for (i, cd) in candidates {
            let (weight, _, step) = &steps[i];
            let direction = JumpDirection::of(weight[dim]);
            if claims.try_claim(step, direction) {
                debug!("dim {dim}: branch {} contributes {cd:.6}", step.id);
                *total += cd;
                accepted[i] = true;
            } else {
                debug!("dim {dim}: branch {} rejected ({cd:.6}), carriers claimed", step.id);
                claims_rejected += 1;
            }
        }
    }

    Aggregation {
        jump,
        contributing: accepted.iter().filter(|&&a| a).count(),
        claims_rejected,
    }
}
