use std::io::Cursor;

use chain_core::{
    DiagnosticChannel, DumpType, Engine, EngineArrays, SArray, StateDump, RNG_SEED_KEY,
    RNG_STATE_KEY,
};
use chain_engine::{modules, Console};

const NORMAL_MEAN_MODEL: &str = "model {\n  mu ~ dnorm(0, 0.0001)\n  y[] ~ dnorm(mu, 1)\n}";

fn observations() -> SArray {
    SArray::from_parts(
        vec![10],
        vec![4.8, 5.3, 5.1, 4.9, 5.2, 4.7, 5.0, 5.4, 4.6, 5.0],
    )
    .unwrap()
}

fn compiled(text: &str, data: EngineArrays, chains: usize) -> (Console, DiagnosticChannel) {
    modules::ensure_loaded("basemod").unwrap();
    modules::ensure_loaded("bugs").unwrap();
    let mut console = Console::new();
    let mut channel = DiagnosticChannel::new();
    channel
        .invoke(|io| console.check_model(&mut Cursor::new(text.as_bytes()), io))
        .unwrap();
    channel
        .invoke(|io| console.compile(&data, chains, false, io))
        .unwrap();
    (console, channel)
}

fn trace(console: &mut Console, channel: &mut DiagnosticChannel, name: &str) -> Vec<f64> {
    let mut out = EngineArrays::new();
    channel
        .invoke(|io| console.dump_monitors(&mut out, "trace", false, io))
        .unwrap();
    out[name].values().to_vec()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[test]
fn random_walk_recovers_normal_mean() {
    let data = EngineArrays::from([("y".to_string(), observations())]);
    let (mut console, mut channel) = compiled(NORMAL_MEAN_MODEL, data, 1);
    channel.invoke(|io| console.initialize(io)).unwrap();
    channel.invoke(|io| console.update(1000, io)).unwrap();
    let mut converged = false;
    channel
        .invoke(|io| console.check_adaptation(&mut converged, io))
        .unwrap();
    channel.invoke(|io| console.adapt_off(io)).unwrap();
    channel
        .invoke(|io| console.set_monitor("mu", 1, "trace", io))
        .unwrap();
    channel.invoke(|io| console.update(4000, io)).unwrap();

    let samples = trace(&mut console, &mut channel, "mu");
    assert_eq!(samples.len(), 4000);
    assert!((mean(&samples) - 5.0).abs() < 0.3, "mean {}", mean(&samples));
    assert_eq!(console.iteration(), 5000);
}

#[test]
fn finite_sampler_matches_bernoulli_prior() {
    let (mut console, mut channel) = compiled("model { z ~ dbern(0.3) }", EngineArrays::new(), 1);
    channel.invoke(|io| console.initialize(io)).unwrap();
    assert!(!console.is_adapting());
    channel
        .invoke(|io| console.set_monitor("z", 1, "mean", io))
        .unwrap();
    channel.invoke(|io| console.update(5000, io)).unwrap();

    let mut out = EngineArrays::new();
    channel
        .invoke(|io| console.dump_monitors(&mut out, "mean", true, io))
        .unwrap();
    let estimate = out["z"].values()[0];
    assert!((estimate - 0.3).abs() < 0.05, "estimate {estimate}");
}

#[test]
fn seeded_chains_are_reproducible() {
    let run = || {
        let data = EngineArrays::from([("y".to_string(), observations())]);
        let (mut console, mut channel) = compiled(NORMAL_MEAN_MODEL, data, 1);
        channel
            .invoke(|io| console.set_rng_name("base::Wichmann-Hill", 0, io))
            .unwrap();
        let seed = EngineArrays::from([(RNG_SEED_KEY.to_string(), SArray::scalar(42.0))]);
        channel
            .invoke(|io| console.set_parameters(&seed, 0, io))
            .unwrap();
        channel.invoke(|io| console.initialize(io)).unwrap();
        channel
            .invoke(|io| console.set_monitor("mu", 1, "trace", io))
            .unwrap();
        channel.invoke(|io| console.update(50, io)).unwrap();
        trace(&mut console, &mut channel, "mu")
    };
    assert_eq!(run(), run());
}

#[test]
fn dumped_generator_state_resumes_the_chain() {
    let data = EngineArrays::from([("y".to_string(), observations())]);
    let (mut original, mut channel) = compiled(NORMAL_MEAN_MODEL, data.clone(), 1);
    channel
        .invoke(|io| original.set_rng_name("base::Marsaglia-Multicarry", 0, io))
        .unwrap();
    channel.invoke(|io| original.initialize(io)).unwrap();
    channel.invoke(|io| original.update(30, io)).unwrap();

    let mut dump = StateDump::default();
    channel
        .invoke(|io| original.dump_state(&mut dump, DumpType::Parameters, 0, io))
        .unwrap();
    assert_eq!(dump.rng_name, "base::Marsaglia-Multicarry");
    channel
        .invoke(|io| original.set_monitor("mu", 1, "trace", io))
        .unwrap();
    channel.invoke(|io| original.update(20, io)).unwrap();
    let expected = trace(&mut original, &mut channel, "mu");

    let (mut resumed, mut channel) = compiled(NORMAL_MEAN_MODEL, data, 1);
    channel
        .invoke(|io| resumed.set_rng_name(&dump.rng_name, 0, io))
        .unwrap();
    channel
        .invoke(|io| resumed.set_parameters(&dump.values, 0, io))
        .unwrap();
    channel.invoke(|io| resumed.initialize(io)).unwrap();
    channel
        .invoke(|io| resumed.set_monitor("mu", 1, "trace", io))
        .unwrap();
    channel.invoke(|io| resumed.update(20, io)).unwrap();
    assert_eq!(trace(&mut resumed, &mut channel, "mu"), expected);
}

#[test]
fn generator_state_requires_a_bound_generator() {
    let data = EngineArrays::from([("y".to_string(), observations())]);
    let (mut console, mut channel) = compiled(NORMAL_MEAN_MODEL, data, 1);
    let state = EngineArrays::from([(
        RNG_STATE_KEY.to_string(),
        SArray::from_parts(vec![2], vec![1.0, 2.0]).unwrap(),
    )]);
    let err = channel
        .invoke(|io| console.set_parameters(&state, 0, io))
        .unwrap_err();
    assert!(err.info().message.contains("no RNG"));

    assert!(channel
        .invoke(|io| console.set_rng_name("base::Mersenne-Twister", 0, io))
        .is_err());
}

#[test]
fn generator_words_must_be_exact_integers() {
    let data = EngineArrays::from([("y".to_string(), observations())]);
    let (mut console, mut channel) = compiled(NORMAL_MEAN_MODEL, data, 1);
    channel
        .invoke(|io| console.set_rng_name("base::Wichmann-Hill", 0, io))
        .unwrap();
    let mut before = StateDump::default();
    channel
        .invoke(|io| console.dump_state(&mut before, DumpType::Parameters, 0, io))
        .unwrap();

    for words in [vec![1.5, 2.7, 3.9], vec![1.0, 2.0, 3e10], vec![1.0, f64::NAN, 3.0]] {
        let state = EngineArrays::from([(
            RNG_STATE_KEY.to_string(),
            SArray::from_parts(vec![3], words).unwrap(),
        )]);
        let err = channel
            .invoke(|io| console.set_parameters(&state, 0, io))
            .unwrap_err();
        assert!(err.info().message.contains(".RNG.state"));
    }
    for seed in [-1.0, 0.5, 4_294_967_296.0, chain_core::NA] {
        let values = EngineArrays::from([(RNG_SEED_KEY.to_string(), SArray::scalar(seed))]);
        let err = channel
            .invoke(|io| console.set_parameters(&values, 0, io))
            .unwrap_err();
        assert!(err.info().message.contains(".RNG.seed"));
    }

    let mut after = StateDump::default();
    channel
        .invoke(|io| console.dump_state(&mut after, DumpType::Parameters, 0, io))
        .unwrap();
    assert_eq!(after.values[RNG_STATE_KEY], before.values[RNG_STATE_KEY]);

    let largest = EngineArrays::from([(
        RNG_SEED_KEY.to_string(),
        SArray::scalar(4_294_967_295.0),
    )]);
    channel
        .invoke(|io| console.set_parameters(&largest, 0, io))
        .unwrap();
}

#[test]
fn parallel_chains_are_dumped_side_by_side() {
    let data = EngineArrays::from([("y".to_string(), observations())]);
    let (mut console, mut channel) = compiled(NORMAL_MEAN_MODEL, data, 2);
    channel.invoke(|io| console.initialize(io)).unwrap();
    channel
        .invoke(|io| console.set_monitor("mu", 1, "trace", io))
        .unwrap();
    channel.invoke(|io| console.update(10, io)).unwrap();

    let mut out = EngineArrays::new();
    channel
        .invoke(|io| console.dump_monitors(&mut out, "trace", false, io))
        .unwrap();
    assert_eq!(out["mu"].dims(), &[1, 10, 2]);
    channel
        .invoke(|io| console.dump_monitors(&mut out, "trace", true, io))
        .unwrap();
    assert_eq!(out["mu"].dims(), &[1, 20]);
}
