use approx::assert_relative_eq;
use gradient_oracle::branch_id::context_key;
use gradient_oracle::ledger::CorrelationSummary;
use gradient_oracle::{
    Bandwidth, BranchId, BranchLedger, Carrier, CarrierList, Ds, Kde1d, OracleConfig, Side,
};
use half::f16;

type D2 = Ds<2>;

const ID: BranchId = BranchId(42);

fn ledger(config: OracleConfig) -> BranchLedger<2> {
    BranchLedger::new(&config)
}

fn visit_all(ledger: &mut BranchLedger<2>, values: &[f64]) {
    for (sample, &v) in values.iter().enumerate() {
        ledger.visit(ID, &D2::variable(v, 0), sample);
    }
}

fn carrier(v: f64, sample_id: usize) -> Carrier<2> {
    Carrier {
        predicate: D2::variable(v, 0),
        sample_id,
    }
}

#[test]
fn side_follows_sign() {
    assert_eq!(Side::of(-0.1), Side::True);
    assert_eq!(Side::of(0.0), Side::False);
    assert_eq!(Side::of(2.0), Side::False);
    assert_eq!(Side::of(f64::NAN), Side::False);
}

#[test]
fn carrier_list_keeps_closest() {
    let mut list = CarrierList::new(3);
    for (i, v) in [0.5, -0.1, 0.9, 0.3, -0.05, 2.0].into_iter().enumerate() {
        list.insert(carrier(v, i));
    }
    let kept: Vec<usize> = list.iter().map(|c| c.sample_id).collect();
    assert_eq!(kept, vec![4, 1, 3]);
    assert_eq!(list.len(), 3);
    assert!(!list.accepts(0.3));
    assert!(list.accepts(0.29));
}

#[test]
fn carrier_list_ties_keep_first() {
    let mut list = CarrierList::new(2);
    assert!(list.insert(carrier(0.2, 0)));
    assert!(list.insert(carrier(-0.2, 1)));
    assert!(!list.insert(carrier(0.2, 2)));
    let kept: Vec<usize> = list.iter().map(|c| c.sample_id).collect();
    assert_eq!(kept, vec![0, 1]);
}

#[test]
fn visits_count_sides_and_record_values() {
    let mut l = ledger(OracleConfig::default());
    visit_all(&mut l, &[-1.0, 1.0, -0.5, 0.5]);
    let r = l.get(ID).unwrap();
    assert_eq!(r.visit_count(), 4);
    assert_eq!(r.true_count(), 2);
    assert_eq!(r.false_count(), 2);
    assert_eq!(r.predicate_values(), &[-1.0, 1.0, -0.5, 0.5].map(f16::from_f64));
    // The first visit precedes the gate opening.
    assert_eq!(r.carriers(Side::True).len(), 1);
    assert_eq!(r.carriers(Side::False).len(), 2);
}

#[test]
fn gate_waits_for_both_sides() {
    let mut l = ledger(OracleConfig {
        min_carriers: 2,
        ..OracleConfig::default()
    });
    visit_all(&mut l, &[0.1, 0.2, -0.3, 0.4, -0.5, -0.6]);
    let r = l.get(ID).unwrap();
    // Tracking starts at the visit that brings the true side to two.
    let trues: Vec<usize> = r.carriers(Side::True).iter().map(|c| c.sample_id).collect();
    assert_eq!(trues, vec![4, 5]);
    assert!(r.carriers(Side::False).is_empty());
}

#[test]
fn untracked_predicates_still_count() {
    let mut l = ledger(OracleConfig {
        stddev: 1.0,
        carrier_delta: 2.0,
        ..OracleConfig::default()
    });
    l.visit(ID, &D2::variable(-1.0, 0), 0);
    l.visit(ID, &D2::variable(1.0, 0), 1);
    l.visit(ID, &D2::constant(-0.5), 2);
    l.visit(ID, &D2::variable(5.0, 0), 3);
    l.visit(ID, &D2::variable(f64::NAN, 0), 4);
    l.visit(ID, &D2::variable(f64::NEG_INFINITY, 0), 5);

    let r = l.get(ID).unwrap();
    assert_eq!(r.visit_count(), 6);
    assert_eq!(r.true_count(), 3);
    assert_eq!(r.false_count(), 3);
    assert_eq!(r.predicate_values().len(), 4);
    let tracked: Vec<usize> = r
        .carriers(Side::True)
        .iter()
        .chain(r.carriers(Side::False).iter())
        .map(|c| c.sample_id)
        .collect();
    assert_eq!(tracked, vec![1]);
}

#[test]
fn recording_caps() {
    let mut l = ledger(OracleConfig {
        max_recorded_conditions: 3,
        kde_delta: 10.0,
        ..OracleConfig::default()
    });
    visit_all(&mut l, &[-20.0, 1.0, -2.0, 3.0, -4.0, 5.0]);
    let r = l.get(ID).unwrap();
    assert_eq!(r.predicate_values(), &[1.0, -2.0, 3.0].map(f16::from_f64));
    assert_eq!(r.visit_count(), 6);
}

#[test]
fn branch_cap_drops_new_branches() {
    let mut l = ledger(OracleConfig {
        max_branches: 2,
        ..OracleConfig::default()
    });
    for site in 0..4 {
        l.visit(BranchId(site), &D2::variable(1.0, 0), 0);
    }
    l.visit(BranchId(1), &D2::variable(1.0, 0), 1);
    assert_eq!(l.len(), 2);
    assert_eq!(l.visits_dropped(), 2);
    assert_eq!(l.get(BranchId(1)).unwrap().visit_count(), 2);
    assert!(l.get(BranchId(3)).is_none());
}

#[test]
fn correlate_computes_weight_tangent() {
    let mut l = ledger(OracleConfig::default());
    let values = [-1.0, 1.0, -0.5, 0.5];
    for (sample, &v) in values.iter().enumerate() {
        // Predicate moves with input 0 at rate 2 and with input 1 at rate -1.
        l.visit(ID, &D2::with_tangent(v, [2.0, -1.0]), sample);
    }
    let summary = l.correlate();
    assert_eq!(
        summary,
        CorrelationSummary {
            qualified: 1,
            skipped: 0,
            degenerate: 0
        }
    );

    let density = Kde1d::new(values.to_vec(), Bandwidth::Scott).unwrap().eval(0.0);
    let r = l.get(ID).unwrap();
    assert_relative_eq!(r.density_at_zero(), density, max_relative = 1e-6);
    let w = r.weight_tangent().unwrap();
    assert_relative_eq!(w[0], 2.0 * density, max_relative = 1e-6);
    assert_relative_eq!(w[1], -density, max_relative = 1e-6);
    // Mean over carriers -0.5, 0.5 and 1.0.
    assert_relative_eq!(r.mean_predicate().unwrap().value(), 1.0 / 3.0, max_relative = 1e-12);
}

#[test]
fn one_sided_branch_is_skipped() {
    let mut l = ledger(OracleConfig::default());
    visit_all(&mut l, &[0.5, 0.7, 0.9]);
    assert_eq!(l.correlate().skipped, 1);
    assert!(l.get(ID).unwrap().weight_tangent().is_none());
}

#[test]
fn identical_recorded_predicates_are_degenerate() {
    // Both values round to zero in half precision.
    let mut l = ledger(OracleConfig::default());
    visit_all(&mut l, &[-1e-9, 1e-9, -1e-9, 1e-9]);
    let summary = l.correlate();
    assert_eq!(summary.degenerate, 1);
    let r = l.get(ID).unwrap();
    assert!(r.weight_tangent().is_none());
    assert_eq!(r.density_at_zero(), 0.0);
}

#[test]
fn variance_threshold_marks_degenerate() {
    let mut l = ledger(OracleConfig {
        min_condition_variance: 100.0,
        ..OracleConfig::default()
    });
    visit_all(&mut l, &[-1.0, 1.0, -0.5, 0.5]);
    assert_eq!(l.correlate().degenerate, 1);
}

#[test]
fn fork_limit_bounds_contexts() {
    let site = 0xdead_beef;
    let mut flat = ledger(OracleConfig::default());
    assert_eq!(flat.resolve(site, 1), BranchId(site));
    assert_eq!(flat.resolve(site, 2), BranchId(site));

    let mut forked = ledger(OracleConfig {
        fork_limit: 2,
        ..OracleConfig::default()
    });
    let a = forked.resolve(site, 1);
    let b = forked.resolve(site, 2);
    assert_eq!(a, BranchId(context_key(site, 1)));
    assert_eq!(b, BranchId(context_key(site, 2)));
    assert_ne!(a, b);
    assert_eq!(forked.resolve(site, 1), a);
    for path in 3..20 {
        let c = forked.resolve(site, path);
        assert!(c == a || c == b);
    }
    // Other sites have their own budget.
    assert_eq!(forked.resolve(7, 3), BranchId(context_key(7, 3)));
}

#[test]
fn clear_forgets_everything() {
    let mut l = ledger(OracleConfig::default());
    visit_all(&mut l, &[-1.0, 1.0]);
    assert!(!l.is_empty());
    l.clear();
    assert!(l.is_empty());
    assert_eq!(l.visits_dropped(), 0);
}
