use chain_core::{HostState, NamedArrays};
use ndarray::arr2;

#[test]
fn host_state_round_trip_json() {
    let values = NamedArrays::new()
        .with("mu", 0.25)
        .unwrap()
        .with("theta", arr2(&[[1.0, 2.0], [3.0, 4.0]]))
        .unwrap();
    let state = HostState {
        values,
        rng_name: Some("streams::ChaCha8".into()),
        rng_state: Some(vec![7, -3, 11]),
    };

    let json = serde_json::to_string_pretty(&state).expect("serialize");
    let decoded: HostState = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(decoded, state);
    assert_eq!(decoded.rng().unwrap().state, vec![7, -3, 11]);
}

#[test]
fn data_only_state_has_no_generator() {
    let state = HostState::default();
    let json = serde_json::to_value(&state).unwrap();
    assert!(json.get(".RNG.name").is_none());
    assert!(state.rng().is_none());
}
