use chain_core::codec::{coerce_json, collapse_dims, to_engine, to_host};
use chain_core::{element_count, is_na, ConsoleError, NamedArrays, SArray};
use ndarray::{arr0, arr2, Array3, ArrayD, IxDyn, ShapeBuilder};
use serde_json::json;

#[test]
fn trailing_singletons_are_dropped() {
    assert_eq!(collapse_dims(&[1]), Vec::<usize>::new());
    assert_eq!(collapse_dims(&[5, 1]), vec![5]);
    assert_eq!(collapse_dims(&[3, 1, 1]), vec![3]);
    assert_eq!(collapse_dims(&[2, 3]), vec![2, 3]);
    assert_eq!(collapse_dims(&[1, 4]), vec![1, 4]);
}

#[test]
fn engine_scalar_reports_rank_zero() {
    let host = to_host(&SArray::scalar(2.5)).unwrap();
    assert_eq!(host.ndim(), 0);
    assert_eq!(host[IxDyn(&[])], 2.5);
}

#[test]
fn engine_column_vector_reports_rank_one() {
    let engine = SArray::from_parts(vec![5, 1], vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    let host = to_host(&engine).unwrap();
    assert_eq!(host.shape(), &[5]);
    assert_eq!(host.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn host_matrix_is_stored_first_index_fastest() {
    let host = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn();
    let engine = to_engine(&host.view()).unwrap();
    assert_eq!(engine.dims(), &[2, 3]);
    assert_eq!(engine.values(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}

#[test]
fn fortran_ordered_input_is_laid_out_by_logical_index() {
    let data: Vec<f64> = (0..24).map(f64::from).collect();
    let fortran = Array3::from_shape_vec((2, 3, 4).f(), data.clone()).unwrap();
    let engine = to_engine(&fortran.into_dyn().view()).unwrap();
    assert_eq!(engine.values(), data.as_slice());
}

#[test]
fn engine_to_host_copies_logical_elements() {
    let engine = SArray::from_parts(vec![2, 2, 2], (0..8).map(f64::from).collect()).unwrap();
    let host = to_host(&engine).unwrap();
    assert_eq!(host[IxDyn(&[1, 0, 0])], 1.0);
    assert_eq!(host[IxDyn(&[0, 1, 0])], 2.0);
    assert_eq!(host[IxDyn(&[0, 0, 1])], 4.0);
    assert!(host.is_standard_layout());
}

#[test]
fn rank_zero_input_becomes_length_one() {
    let engine = to_engine(&arr0(7.0).into_dyn().view()).unwrap();
    assert_eq!(engine.dims(), &[1]);
    assert_eq!(engine.values(), &[7.0]);
}

#[test]
fn payload_length_must_match_dimensions() {
    let err = SArray::from_parts(vec![2, 2], vec![1.0]).unwrap_err();
    assert_eq!(err.info().code, "array.length");
}

#[test]
fn oversized_dimensions_are_a_conversion_error() {
    let huge = vec![100_000_000_000, 100_000_000_000];
    assert_eq!(element_count(&huge), None);
    assert_eq!(element_count(&[usize::MAX / 2 + 1, 2]), None);
    assert_eq!(element_count(&[3, 4]), Some(12));
    assert_eq!(element_count(&[]), Some(1));

    let err = SArray::from_parts(huge.clone(), vec![1.0]).unwrap_err();
    assert_eq!(err.info().code, "array.too_large");
    let err = SArray::new(huge).unwrap_err();
    assert!(matches!(err, ConsoleError::Conversion(_)));
    assert_eq!(SArray::new(vec![2, 2]).unwrap().len(), 4);
}

#[test]
fn nested_json_is_coerced_row_major() {
    let array = coerce_json(&json!([[1, 0, 1], [1, 1, 1]])).unwrap();
    assert_eq!(array.shape(), &[2, 3]);
    assert_eq!(array[IxDyn(&[0, 2])], 1.0);
    assert_eq!(array[IxDyn(&[0, 1])], 0.0);
}

#[test]
fn null_elements_become_missing() {
    let array = coerce_json(&json!([0, 1, null])).unwrap();
    assert!(is_na(array[IxDyn(&[2])]));
    let masked = NamedArrays::new().with("x", vec![Some(0.0), None]).unwrap();
    assert!(is_na(masked.get("x").unwrap()[IxDyn(&[1])]));
}

#[test]
fn ragged_and_non_numeric_input_is_rejected() {
    let ragged = coerce_json(&json!([[1, 2], [3]])).unwrap_err();
    assert_eq!(ragged.info().code, "array.ragged");
    let mixed = coerce_json(&json!([1, [2]])).unwrap_err();
    assert_eq!(mixed.info().code, "array.ragged");
    let text = coerce_json(&json!(["a", "b"])).unwrap_err();
    assert!(matches!(text, ConsoleError::Conversion(_)));
    assert_eq!(text.info().code, "array.non_numeric");
    let rows = NamedArrays::new()
        .with("m", vec![vec![1.0, 2.0], vec![3.0]])
        .unwrap_err();
    assert_eq!(rows.info().code, "array.ragged");
    assert_eq!(rows.info().context["name"], "m");
}

#[test]
fn named_arrays_reject_duplicates_and_empty_names() {
    let mut arrays = NamedArrays::new();
    arrays.insert("y", 5.0).unwrap();
    assert_eq!(arrays.insert("y", 1.0).unwrap_err().info().code, "array.duplicate");
    assert_eq!(arrays.insert(" ", 1.0).unwrap_err().info().code, "array.name");
}

#[test]
fn mapping_from_json_keeps_entries() {
    let arrays = NamedArrays::from_json(&json!({"N": 3, "x": [1.5, 2.5, 3.5], "e": []})).unwrap();
    assert_eq!(arrays.len(), 3);
    let empty: &ArrayD<f64> = arrays.get("e").unwrap();
    assert_eq!(empty.shape(), &[0]);
    let mut trimmed = arrays.clone();
    trimmed.retain_non_empty();
    assert_eq!(trimmed.len(), 2);
    assert!(!trimmed.contains("e"));
    assert!(NamedArrays::from_json(&json!([1, 2])).is_err());
}
