//! Layout-correct conversion between host arrays and engine buffers.
//!
//! Host arrays are `ndarray` arrays in whatever memory order they were built
//! with; the engine stores every array flat in column-major order (first
//! index fastest). Both directions copy through a logical view laid out with
//! column-major strides, so each element lands at its column-major offset
//! and no returned array aliases engine memory.

use ndarray::{ArrayD, ArrayView, ArrayViewD, ArrayViewMut, IxDyn, ShapeBuilder};
use serde_json::Value;

use crate::array::{element_count, EngineArrays, HostState, NamedArrays, SArray, NA};
use crate::engine::StateDump;
use crate::errors::{ConsoleError, ErrorInfo};
use crate::rng::RNG_STATE_KEY;

/// Copies a host array into a fresh engine buffer.
///
/// Rank-0 input is promoted to rank 1 of length 1.
pub fn to_engine(source: &ArrayViewD<'_, f64>) -> Result<SArray, ConsoleError> {
    let mut dims = source.shape().to_vec();
    if dims.is_empty() {
        dims.push(1);
    }
    let len = element_count(&dims).ok_or_else(|| {
        ConsoleError::conversion("array.too_large", format!("cannot store {dims:?} elements"))
    })?;
    let mut buffer = vec![0.0; len];
    {
        let mut view = ArrayViewMut::from_shape(IxDyn(&dims).f(), buffer.as_mut_slice())
            .map_err(|err| ConsoleError::conversion("codec.view", err.to_string()))?;
        let source = source.broadcast(IxDyn(&dims)).ok_or_else(|| {
            ConsoleError::conversion("codec.shape", format!("cannot view input as {dims:?}"))
        })?;
        view.assign(&source);
    }
    SArray::from_parts(dims, buffer)
}

/// Copies an engine buffer into a freshly allocated host array.
///
/// The reported shape has trailing singleton axes removed, see
/// [`collapse_dims`].
pub fn to_host(array: &SArray) -> Result<ArrayD<f64>, ConsoleError> {
    let view = ArrayView::from_shape(IxDyn(array.dims()).f(), array.values())
        .map_err(|err| ConsoleError::conversion("codec.view", err.to_string()))?;
    let mut host = ArrayD::<f64>::zeros(IxDyn(array.dims()));
    host.assign(&view);
    host.into_shape(IxDyn(&collapse_dims(array.dims())))
        .map_err(|err| ConsoleError::conversion("codec.collapse", err.to_string()))
}

/// Drops trailing axes of length one.
///
/// `[1]` becomes rank 0, `[5, 1]` becomes `[5]`, `[2, 3]` is unchanged.
pub fn collapse_dims(dims: &[usize]) -> Vec<usize> {
    let keep = dims.iter().rposition(|&dim| dim != 1).map_or(0, |idx| idx + 1);
    dims[..keep].to_vec()
}

/// Converts every entry of a host mapping.
pub fn to_engine_map(arrays: &NamedArrays) -> Result<EngineArrays, ConsoleError> {
    arrays
        .iter()
        .map(|(name, array)| {
            to_engine(&array.view())
                .map(|converted| (name.to_string(), converted))
                .map_err(|err| with_name(err, name))
        })
        .collect()
}

/// Converts every entry of an engine mapping.
pub fn to_host_map(arrays: &EngineArrays) -> Result<NamedArrays, ConsoleError> {
    let mut host = NamedArrays::new();
    for (name, array) in arrays {
        let converted = to_host(array).map_err(|err| with_name(err, name))?;
        host.push_unchecked(name.clone(), converted);
    }
    Ok(host)
}

/// Converts a state dump, lifting the reserved generator entries out of the
/// value mapping.
pub fn state_to_host(mut dump: StateDump) -> Result<HostState, ConsoleError> {
    let rng_state = dump
        .values
        .remove(RNG_STATE_KEY)
        .map(|state| state.values().iter().map(|&word| word as i32).collect());
    let values = to_host_map(&dump.values)?;
    let rng_name = Some(dump.rng_name).filter(|name| !name.is_empty());
    Ok(HostState {
        values,
        rng_name,
        rng_state,
    })
}

/// Coerces an arbitrary JSON value into a dense numeric array.
///
/// Numbers and booleans become scalars, `null` becomes [`NA`], nested lists
/// must be rectangular.
pub fn coerce_json(value: &Value) -> Result<ArrayD<f64>, ConsoleError> {
    let shape = json_shape(value);
    let len = element_count(&shape).ok_or_else(|| {
        ConsoleError::conversion("array.too_large", format!("cannot store {shape:?} elements"))
    })?;
    let mut flat = Vec::with_capacity(len);
    flatten_json(value, &shape, &mut flat)?;
    ArrayD::from_shape_vec(IxDyn(&shape), flat)
        .map_err(|err| ConsoleError::conversion("array.shape", err.to_string()))
}

fn json_shape(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    shape
}

fn flatten_json(value: &Value, shape: &[usize], out: &mut Vec<f64>) -> Result<(), ConsoleError> {
    match (value, shape.split_first()) {
        (Value::Array(items), Some((&len, rest))) => {
            if items.len() != len {
                return Err(ragged());
            }
            for item in items {
                flatten_json(item, rest, out)?;
            }
            Ok(())
        }
        (Value::Array(_), None) | (_, Some(_)) => Err(ragged()),
        (leaf, None) => {
            out.push(json_scalar(leaf)?);
            Ok(())
        }
    }
}

fn json_scalar(value: &Value) -> Result<f64, ConsoleError> {
    match value {
        Value::Null => Ok(NA),
        Value::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64().ok_or_else(|| {
            ConsoleError::conversion("array.non_numeric", format!("{number} is not representable"))
        }),
        other => Err(ConsoleError::Conversion(
            ErrorInfo::new("array.non_numeric", "array elements must be numeric")
                .with_context("value", other.to_string()),
        )),
    }
}

fn ragged() -> ConsoleError {
    ConsoleError::conversion("array.ragged", "nested sequences have inconsistent lengths")
}

fn with_name(err: ConsoleError, name: &str) -> ConsoleError {
    match err {
        ConsoleError::Conversion(info) => ConsoleError::Conversion(info.with_context("name", name)),
        other => other,
    }
}
