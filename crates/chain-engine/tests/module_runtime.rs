use std::sync::Mutex;

use chain_core::FactoryCategory;
use chain_engine::modules::{self, RuntimeError};

static RUNTIME_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn modules_load_in_order_and_refuse_repeats() {
    let _guard = RUNTIME_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
    modules::ensure_loaded("basemod").unwrap();
    modules::ensure_loaded("bugs").unwrap();
    assert_eq!(
        modules::load_module("basemod"),
        Err(RuntimeError::AlreadyLoaded("basemod".into()))
    );
    assert_eq!(
        modules::load_module("glm"),
        Err(RuntimeError::UnknownModule("glm".into()))
    );

    modules::ensure_loaded("streams").unwrap();
    let loaded = modules::list_modules();
    let position = |name: &str| loaded.iter().position(|module| module == name).unwrap();
    assert!(position("basemod") < position("streams"));

    modules::unload_module("streams").unwrap();
    assert!(!modules::list_modules().contains(&"streams".to_string()));
    assert_eq!(
        modules::unload_module("streams"),
        Err(RuntimeError::NotLoaded("streams".into()))
    );
}

#[test]
fn factory_flags_gate_generators() {
    let _guard = RUNTIME_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
    modules::ensure_loaded("basemod").unwrap();
    modules::ensure_loaded("streams").unwrap();

    let rngs = modules::list_factories(FactoryCategory::Rng);
    assert!(rngs
        .iter()
        .any(|factory| factory.name == "streams::ChaChaFactory" && factory.active));

    modules::set_factory_active("streams::ChaChaFactory", FactoryCategory::Rng, false).unwrap();
    assert_eq!(
        modules::make_rngs("streams::ChaChaFactory", 2).unwrap_err(),
        RuntimeError::Inactive("streams::ChaChaFactory".into())
    );
    assert!(modules::make_rng("streams::ChaCha8").is_none());

    modules::set_factory_active("streams::ChaChaFactory", FactoryCategory::Rng, true).unwrap();
    let minted = modules::make_rngs("streams::ChaChaFactory", 3).unwrap();
    assert_eq!(minted.len(), 3);
    assert!(minted.iter().all(|rng| rng.name() == "streams::ChaCha8"));

    assert!(matches!(
        modules::set_factory_active("base::Slice", FactoryCategory::Sampler, false),
        Err(RuntimeError::UnknownFactory { .. })
    ));
    assert!(matches!(
        modules::make_rngs("lecuyer::RngStreamFactory", 1),
        Err(RuntimeError::UnknownFactory { .. })
    ));
}

#[test]
fn sampler_and_monitor_availability_follow_flags() {
    let _guard = RUNTIME_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
    modules::ensure_loaded("basemod").unwrap();
    assert!(modules::sampler_active("base::RandomWalk"));
    modules::set_factory_active("base::MeanMonitor", FactoryCategory::Monitor, false).unwrap();
    assert!(!modules::monitor_available("mean"));
    assert!(modules::monitor_available("trace"));
    modules::set_factory_active("base::MeanMonitor", FactoryCategory::Monitor, true).unwrap();
    assert!(modules::monitor_available("mean"));
}
