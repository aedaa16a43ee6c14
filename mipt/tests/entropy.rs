use mipt::{
    chain::Chain,
    entropy::{ cut_entropies, cut_entropy, run_entropy, EntropyConfig },
    kraus::Strengths,
    observe::Silent,
};
use tensor_net::{ ops::LocalState, Truncation, C64, MPS };

fn ghz(l: usize) -> MPS {
    let n = 1 << l;
    let amp = C64::from(0.5_f64.sqrt());
    let state = (0..n).map(|k| if k == 0 || k == n - 1 { amp } else { C64::from(0.0) });
    MPS::from_vector(&vec![2; l], state, Truncation::exact()).unwrap()
}

fn seeded(l: usize, strengths: Strengths, ntrials: usize) -> EntropyConfig {
    EntropyConfig { ntrials, seed: Some(77), ..EntropyConfig::new(l, strengths) }
}

#[test]
fn bell_pair_carries_one_bit() {
    let chain = Chain::new(2).unwrap();
    let mut psi = ghz(2);
    let s = cut_entropy(&mut psi, &chain, 1, 1e-12, 1e-30).unwrap();
    assert!((s - 1.0).abs() < 1e-10);
}

#[test]
fn ghz_is_one_bit_at_every_cut() {
    let l = 5;
    let chain = Chain::new(l).unwrap();
    let mut psi = ghz(l);
    let s = cut_entropies(&mut psi, &chain, 1e-12, 1e-30).unwrap();
    assert_eq!(s.len(), l - 1);
    assert!(s.iter().all(|sc| (sc - 1.0).abs() < 1e-10));
}

#[test]
fn outer_cuts_are_zero() {
    let l = 4;
    let chain = Chain::new(l).unwrap();
    let mut psi = ghz(l);
    assert_eq!(cut_entropy(&mut psi, &chain, 0, 1e-12, 1e-30).unwrap(), 0.0);
    assert_eq!(cut_entropy(&mut psi, &chain, l, 1e-12, 1e-30).unwrap(), 0.0);
}

#[test]
fn product_states_have_no_entanglement() {
    let chain = Chain::with_dummy(4).unwrap();
    let mut psi = chain.product_state(LocalState::Minus, Truncation::exact()).unwrap();
    let s = cut_entropies(&mut psi, &chain, 1e-12, 1e-30).unwrap();
    assert_eq!(s.len(), 3);
    assert!(s.iter().all(|sc| sc.abs() < 1e-12));

    // measurements that commute with the initial all-plus state
    for strengths in [Strengths::new(0.0, 0.0), Strengths::new(1.0, 0.0)] {
        let res = run_entropy(&seeded(4, strengths, 6), &Silent).unwrap();
        assert_eq!(res.successful_trials, 6);
        assert!(res.avg_entropies.iter().all(|s| s.abs() < 1e-10));
        assert!(res.max_entropy.abs() < 1e-10);
    }
}

#[test]
fn ensemble_shape_and_bounds() {
    let l = 6;
    let res = run_entropy(&seeded(l, Strengths::from_lambda(0.3), 10), &Silent).unwrap();
    assert_eq!(res.cuts, vec![1, 2, 3, 4, 5]);
    assert_eq!(res.avg_entropies.len(), l - 1);
    assert_eq!(res.std_entropies.len(), l - 1);
    assert_eq!(res.ntrials, 10);
    assert_eq!(res.successful_trials, 10);
    assert_eq!(res.central_entropy, res.avg_entropies[2]);
    assert!(res.avg_entropies.iter().all(|s| *s <= res.max_entropy));
    for (c, s) in res.cuts.iter().zip(&res.avg_entropies) {
        let bound = (*c).min(l - c) as f64;
        assert!(*s >= -1e-12 && *s <= bound + 1e-9, "S({}) = {}", c, s);
    }
    assert!(res.std_entropies.iter().all(|s| *s >= 0.0));
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let config = seeded(5, Strengths::from_lambda(0.4), 8);
    let par = run_entropy(&config, &Silent).unwrap();
    let seq = run_entropy(&EntropyConfig { parallel: false, ..config }, &Silent).unwrap();
    assert_eq!(par, seq);
}

#[test]
fn invalid_config_is_rejected() {
    let config = EntropyConfig { eps: 0.0, ..EntropyConfig::new(4, Strengths::from_lambda(0.5)) };
    assert!(run_entropy(&config, &Silent).is_err());
}
