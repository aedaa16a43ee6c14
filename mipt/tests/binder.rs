mod common;

use std::sync::Mutex;
use proptest::prelude::*;
use mipt::{
    binder::{ self, TrialStats },
    chain::Chain,
    correlator::{ self, manual_sum, CorrelatorConfig, Order, Strategy },
    evolve::{ Evolution, EvolutionConfig, Policy },
    kraus::{ KrausSet, Strengths },
    observe::{ ChunkProgress, Observer, Silent, TupleKind },
    stats::trial_rng,
};
use nalgebra as na;
use tensor_net::{ ops::{ LocalState, ZMAT }, Truncation, C64, MPS };
use common::*;

fn config(strategy: Strategy) -> CorrelatorConfig {
    CorrelatorConfig { strategy, ..Default::default() }
}

fn estimate(state: &MPS, chain: &Chain, strategy: Strategy) -> TrialStats {
    binder::estimate(state, chain, &config(strategy), Truncation::exact(), &Silent)
        .unwrap()
}

fn evolved(l: usize, strengths: Strengths, policy: Policy, seed: u64) -> MPS {
    let chain = Chain::new(l).unwrap();
    let kraus = KrausSet::new(&chain, strengths).unwrap();
    let config = EvolutionConfig { cutoff: 0.0, ..Default::default() };
    let engine = Evolution::new(chain, &kraus, config).unwrap();
    let mut rng = trial_rng(Some(seed), 0);
    engine.run(LocalState::Up, &policy, &mut rng, &Silent).unwrap().state
}

#[test]
fn zero_strength_keeps_ordered_binder() {
    let l = 5;
    let chain = Chain::new(l).unwrap();
    let psi = evolved(l, Strengths::new(0.0, 0.0), Policy::Sampled, 11);
    for strategy in [Strategy::Batched, Strategy::Manual] {
        let stats = estimate(&psi, &chain, strategy);
        assert_close(stats.s2, (l * l) as f64, 1e-10);
        assert_close(stats.s4, (l * l * l * l) as f64, 1e-10);
        assert_close(stats.b, 2.0 / 3.0, 1e-10);
        assert_eq!(stats.skipped, 0);
    }
}

#[test]
fn plus_state_binder_is_closed_form() {
    for l in [2, 3, 4, 6] {
        let chain = Chain::new(l).unwrap();
        let psi = chain.product_state(LocalState::Plus, Truncation::exact()).unwrap();
        let lf = l as f64;
        for strategy in [Strategy::Batched, Strategy::Manual] {
            let stats = estimate(&psi, &chain, strategy);
            assert_close(stats.s2, lf, 1e-10);
            assert_close(stats.s4, lf + 3.0 * lf * (lf - 1.0), 1e-10);
            assert_close(stats.b, 2.0 / (3.0 * lf), 1e-10);
        }
    }
}

#[test]
fn strategies_agree_with_dense_reference() {
    let l = 4;
    let strengths = Strengths::new(0.3, 0.7);
    let chain = Chain::new(l).unwrap();
    let psi = evolved(l, strengths, Policy::Forced, 0);
    let batched = estimate(&psi, &chain, Strategy::Batched);
    let manual = estimate(&psi, &chain, Strategy::Manual);
    let (s2, s4) = sums(&forced(l, strengths, 2 * l, Default::default()), l);
    assert_close(batched.s2, s2, 1e-8);
    assert_close(batched.s4, s4, 1e-8);
    assert_close(manual.s2, s2, 1e-8);
    assert_close(manual.s4, s4, 1e-8);
    assert_close(batched.b, manual.b, 1e-8);
}

#[test]
fn sampled_strategies_agree() {
    let l = 5;
    let chain = Chain::new(l).unwrap();
    let psi = evolved(l, Strengths::from_lambda(0.5), Policy::Sampled, 3);
    let batched = estimate(&psi, &chain, Strategy::Batched);
    let manual = estimate(&psi, &chain, Strategy::Manual);
    assert_close(batched.s2, manual.s2, 1e-6);
    assert_close(batched.s4, manual.s4, 1e-6);
}

#[test]
fn self_correlators_survive_truncation() {
    let l = 6;
    let mut psi = evolved(l, Strengths::from_lambda(0.6), Policy::Sampled, 8);
    psi.truncate(Truncation::new(2, 1e-8)).unwrap();
    psi.normalize().unwrap();
    for i in 0..l {
        let c = psi.correlator(&ZMAT, &[i, i]).unwrap();
        assert_close(c.re, 1.0, 1e-10);
        assert!(c.im.abs() < 1e-10);
    }
}

#[derive(Default)]
struct Chunks(Mutex<Vec<ChunkProgress>>);

impl Observer for Chunks {
    fn chunk(&self, progress: ChunkProgress) {
        self.0.lock().unwrap().push(progress);
    }
}

#[test]
fn chunked_evaluation_reports_progress() {
    let l = 6;
    let chain = Chain::new(l).unwrap();
    let psi = evolved(l, Strengths::from_lambda(0.5), Policy::Sampled, 1);
    let obs = Chunks::default();
    let small = CorrelatorConfig { strategy: Strategy::Batched, chunk: 4, eps: 1e-12 };
    let corr = correlator::correlators(&psi, &chain, &small, Truncation::exact(), &obs)
        .unwrap();
    assert!(corr.is_complete());
    assert_eq!(corr.evaluated, (l * l + l * l * l * l) as u64);

    let progress = obs.0.into_inner().unwrap();
    let pairs: Vec<_> = progress.iter().filter(|p| p.kind == TupleKind::Pair).collect();
    let quads: Vec<_> = progress.iter().filter(|p| p.kind == TupleKind::Quad).collect();
    assert_eq!(pairs.len(), 4); // 15 pairs
    assert_eq!(quads.len(), 4); // 15 quads
    assert_eq!(pairs.last().unwrap().done, 15);
    assert_eq!(quads.last().unwrap().done, 15);

    let whole = correlator::correlators(
        &psi, &chain, &config(Strategy::Batched), Truncation::exact(), &Silent)
        .unwrap();
    assert_close(corr.s2, whole.s2, 1e-12);
    assert_close(corr.s4, whole.s4, 1e-12);
}

#[test]
fn manual_ranges_merge() {
    let l = 4;
    let chain = Chain::new(l).unwrap();
    let mut psi = evolved(l, Strengths::from_lambda(0.5), Policy::Sampled, 21);
    psi.orthogonalize(chain.center()).unwrap();
    psi.normalize().unwrap();
    let trunc = Truncation::exact();
    let total = Order::Four.count(l);
    let whole = manual_sum(&psi, l, Order::Four, 0..total, 64, trunc, &Silent);
    let head = manual_sum(&psi, l, Order::Four, 0..100, 7, trunc, &Silent);
    let tail = manual_sum(&psi, l, Order::Four, 100..total, 64, trunc, &Silent);
    let merged = head.merge(tail);
    assert_eq!(merged.evaluated, total);
    assert_eq!(whole.evaluated, total);
    assert_close(merged.sum, whole.sum, 1e-12);
}

// two qubits in |+⟩ followed by a qutrit, which no Z can act on
fn qutrit_tail() -> (MPS, Chain) {
    let qutrit =
        na::DVector::from_column_slice(&[C64::from(1.0), C64::from(0.0), C64::from(0.0)]);
    let locals = [LocalState::Plus.vector(), LocalState::Plus.vector(), qutrit];
    let psi = MPS::from_locals(locals, Truncation::exact()).unwrap();
    (psi, Chain::new(3).unwrap())
}

#[test]
fn manual_sum_skips_failed_tuples() {
    let (psi, _) = qutrit_tail();
    let trunc = Truncation::exact();

    // (0, 0) and (1, 1) give 1, (0, 1) and (1, 0) give 0
    let pairs = manual_sum(&psi, 3, Order::Two, 0..9, 4, trunc, &Silent);
    assert_close(pairs.sum, 2.0, 1e-12);
    assert_eq!(pairs.evaluated, 4);
    assert_eq!(pairs.skipped, 5);

    // 16 tuples on sites 0 and 1, half with even multiplicities
    let quads = manual_sum(&psi, 3, Order::Four, 0..81, 10, trunc, &Silent);
    assert_close(quads.sum, 8.0, 1e-12);
    assert_eq!(quads.evaluated, 16);
    assert_eq!(quads.skipped, 65);

    let chain = Chain::new(3).unwrap();
    let corr =
        correlator::correlators(&psi, &chain, &config(Strategy::Manual), trunc, &Silent)
        .unwrap();
    assert_close(corr.s2, 2.0, 1e-12);
    assert_close(corr.s4, 8.0, 1e-12);
    assert_eq!(corr.evaluated, 20);
    assert_eq!(corr.skipped, 70);
    assert!(!corr.is_complete());
}

#[test]
fn failed_chunks_are_skipped_whole() {
    let (psi, chain) = qutrit_tail();
    let trunc = Truncation::exact();
    let empty_s2 = 3.0;
    let empty_s4 = 3.0 + 3.0 * 3.0 * 2.0;

    // one pair per chunk: only (0, 1) survives, with weight 2 + 20
    let single = CorrelatorConfig { strategy: Strategy::Batched, chunk: 1, eps: 1e-12 };
    let corr = correlator::correlators(&psi, &chain, &single, trunc, &Silent).unwrap();
    assert_close(corr.s2, empty_s2, 1e-12);
    assert_close(corr.s4, empty_s4, 1e-12);
    assert_eq!(corr.evaluated, 24 + 22);
    assert_eq!(corr.skipped, 44);
    assert!(!corr.is_complete());

    // every pair in one chunk: the failing pairs take (0, 1) down with them
    let corr =
        correlator::correlators(&psi, &chain, &config(Strategy::Batched), trunc, &Silent)
        .unwrap();
    assert_close(corr.s2, empty_s2, 1e-12);
    assert_close(corr.s4, empty_s4, 1e-12);
    assert_eq!(corr.evaluated, 24);
    assert_eq!(corr.skipped, 66);
    assert_eq!(corr.evaluated + corr.skipped, 9 + 81);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn binder_is_bounded(seed in any::<u64>(), lambda in 0.0_f64..1.0) {
        let l = 4;
        let chain = Chain::new(l).unwrap();
        let psi = evolved(l, Strengths::from_lambda(lambda), Policy::Sampled, seed);
        let stats = estimate(&psi, &chain, Strategy::Batched);
        prop_assert!(stats.s2 >= 0.0);
        prop_assert!(stats.s4 >= 0.0);
        prop_assert!(stats.b <= 1.0);
        prop_assert!(stats.b.is_finite());
    }
}
