//! Named numeric arrays on both sides of the engine boundary.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use ndarray::{arr0, Array, Array1, Array2, ArrayD, Dimension};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::errors::ConsoleError;
use crate::rng::RngDescriptor;

/// Sentinel marking a missing ("not available") element.
///
/// It is a finite value no engine computation produces, so it survives
/// every numeric round trip unchanged.
pub const NA: f64 = -f64::MAX * (1.0 - 1e-15);

/// Returns true when `value` is the [`NA`] sentinel.
pub fn is_na(value: f64) -> bool {
    value == NA
}

/// Number of elements an array of shape `dims` holds, or `None` when it
/// would not fit in addressable memory.
pub fn element_count(dims: &[usize]) -> Option<usize> {
    let limit = isize::MAX as usize / std::mem::size_of::<f64>();
    dims.iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .filter(|&len| len <= limit)
}

fn oversized(dims: &[usize]) -> ConsoleError {
    ConsoleError::conversion(
        "array.too_large",
        format!("dimensions {dims:?} describe more elements than can be stored"),
    )
}

/// Engine-side array: flat column-major values plus the full dimension list.
#[derive(Debug, Clone, PartialEq)]
pub struct SArray {
    dims: Vec<usize>,
    values: Vec<f64>,
}

impl SArray {
    /// Creates an array of the given shape filled with [`NA`].
    pub fn new(dims: Vec<usize>) -> Result<Self, ConsoleError> {
        let dims = if dims.is_empty() { vec![1] } else { dims };
        let len = element_count(&dims).ok_or_else(|| oversized(&dims))?;
        Ok(Self {
            dims,
            values: vec![NA; len],
        })
    }

    /// Rank-1 array over `values`.
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            dims: vec![values.len()],
            values,
        }
    }

    /// Wraps column-major `values` with their dimensions.
    ///
    /// An empty dimension list denotes a scalar and is stored as `[1]`.
    pub fn from_parts(dims: Vec<usize>, values: Vec<f64>) -> Result<Self, ConsoleError> {
        let dims = if dims.is_empty() { vec![1] } else { dims };
        let expected = element_count(&dims).ok_or_else(|| oversized(&dims))?;
        if expected != values.len() {
            return Err(ConsoleError::conversion(
                "array.length",
                format!(
                    "payload holds {} values but dimensions {:?} require {}",
                    values.len(),
                    dims,
                    expected
                ),
            ));
        }
        Ok(Self { dims, values })
    }

    /// Single-element array.
    pub fn scalar(value: f64) -> Self {
        Self {
            dims: vec![1],
            values: vec![value],
        }
    }

    /// Full dimension list, never empty.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Values in column-major order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable access to the column-major values.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Name to array mapping exchanged with the engine.
pub type EngineArrays = BTreeMap<String, SArray>;

/// Ordered host-side mapping from variable name to array.
///
/// Entries are validated when inserted: names must be non-empty and unique
/// and values must coerce to dense numeric arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedArrays(IndexMap<String, ArrayD<f64>>);

impl NamedArrays {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Coerces `value` and inserts it under `name`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl IntoHostArray,
    ) -> Result<(), ConsoleError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConsoleError::conversion(
                "array.name",
                "array name must not be empty",
            ));
        }
        if self.0.contains_key(&name) {
            return Err(ConsoleError::Conversion(
                crate::ErrorInfo::new("array.duplicate", format!("duplicate array name {name}"))
                    .with_context("name", name),
            ));
        }
        let array = value.into_host_array().map_err(|err| match err {
            ConsoleError::Conversion(info) => {
                ConsoleError::Conversion(info.with_context("name", name.clone()))
            }
            other => other,
        })?;
        self.0.insert(name, array);
        Ok(())
    }

    /// Builder form of [`NamedArrays::insert`].
    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl IntoHostArray,
    ) -> Result<Self, ConsoleError> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Builds a mapping from a JSON object whose members are array-like.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConsoleError> {
        let object = value.as_object().ok_or_else(|| {
            ConsoleError::conversion("array.mapping", "expected an object of named arrays")
        })?;
        let mut arrays = Self::new();
        for (name, member) in object {
            arrays.insert(name.clone(), member)?;
        }
        Ok(arrays)
    }

    /// Returns the array stored under `name`.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.0.get(name)
    }

    /// True when `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Removes `name`, preserving the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<ArrayD<f64>> {
        self.0.shift_remove(name)
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f64>)> {
        self.0.iter().map(|(name, array)| (name.as_str(), array))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops entries holding zero elements.
    pub fn retain_non_empty(&mut self) {
        self.0.retain(|_, array| array.len() > 0);
    }

    pub(crate) fn push_unchecked(&mut self, name: String, array: ArrayD<f64>) {
        self.0.insert(name, array);
    }
}

impl IntoIterator for NamedArrays {
    type Item = (String, ArrayD<f64>);
    type IntoIter = indexmap::map::IntoIter<String, ArrayD<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Host view of one chain's dumped state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    /// Variable values.
    pub values: NamedArrays,
    /// Generator bound to the chain, if any.
    #[serde(rename = ".RNG.name", default, skip_serializing_if = "Option::is_none")]
    pub rng_name: Option<String>,
    /// Generator state, present for parameter dumps.
    #[serde(rename = ".RNG.state", default, skip_serializing_if = "Option::is_none")]
    pub rng_state: Option<Vec<i32>>,
}

impl HostState {
    /// Generator descriptor when both name and state were dumped.
    pub fn rng(&self) -> Option<RngDescriptor> {
        match (&self.rng_name, &self.rng_state) {
            (Some(name), Some(state)) => Some(RngDescriptor {
                name: name.clone(),
                state: state.clone(),
            }),
            _ => None,
        }
    }
}

/// Values that can be coerced into a dense host array.
pub trait IntoHostArray {
    /// Performs the coercion.
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError>;
}

impl<D: Dimension> IntoHostArray for Array<f64, D> {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        Ok(self.into_dyn())
    }
}

impl IntoHostArray for f64 {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        Ok(arr0(self).into_dyn())
    }
}

impl IntoHostArray for Vec<f64> {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        Ok(Array1::from(self).into_dyn())
    }
}

impl IntoHostArray for &[f64] {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        self.to_vec().into_host_array()
    }
}

/// Masked input: `None` elements become [`NA`].
impl IntoHostArray for Vec<Option<f64>> {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        Ok(Array1::from_iter(self.into_iter().map(|value| value.unwrap_or(NA))).into_dyn())
    }
}

impl IntoHostArray for Vec<Vec<f64>> {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        let rows = self.len();
        let cols = self.first().map_or(0, Vec::len);
        if self.iter().any(|row| row.len() != cols) {
            return Err(ConsoleError::conversion(
                "array.ragged",
                "rows have differing lengths",
            ));
        }
        let flat: Vec<f64> = self.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((rows, cols), flat).map_err(|err| {
            ConsoleError::conversion("array.shape", err.to_string())
        })?;
        Ok(matrix.into_dyn())
    }
}

impl IntoHostArray for &serde_json::Value {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        codec::coerce_json(self)
    }
}

impl IntoHostArray for serde_json::Value {
    fn into_host_array(self) -> Result<ArrayD<f64>, ConsoleError> {
        codec::coerce_json(&self)
    }
}
