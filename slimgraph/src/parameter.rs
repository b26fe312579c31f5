//! Materialization of the needed initializers into a [`ParameterTable`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rayon::prelude::*;
use tracing::debug;
use tract_onnx::pb::TensorProto;

use crate::{Array, DType, LoadError};

/// Learned weights of a pruned graph, by tensor name.
#[derive(Debug, Clone, Default, PartialEq, derive_more::From)]
pub struct ParameterTable(BTreeMap<String, Array>);

impl ParameterTable {
    pub fn get(&self, name: &str) -> Option<&Array> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Array)> {
        self.0.iter()
    }

    /// Total size of all buffers, in bytes.
    pub fn byte_len(&self) -> usize {
        self.0.values().map(Array::byte_len).sum()
    }

    pub fn into_inner(self) -> BTreeMap<String, Array> {
        self.0
    }
}

/// Declared initializer names of a graph.
pub fn parameter_names(initializers: &[TensorProto]) -> BTreeSet<String> {
    initializers.iter().map(|t| t.name.clone()).collect()
}

/// Turns one initializer into an [`Array`], moving its payload out of the proto.
fn materialize(mut tensor: TensorProto) -> Result<(String, Array), LoadError> {
    let name = std::mem::take(&mut tensor.name);
    let dtype = DType::from_onnx(tensor.data_type).ok_or_else(|| LoadError::UnsupportedDataType {
        name: name.clone(),
        code: tensor.data_type,
    })?;
    let mut dims = Vec::with_capacity(tensor.dims.len());
    let mut expected = dtype.size();
    for &dim in &tensor.dims {
        let invalid = || LoadError::InvalidDimension {
            name: name.clone(),
            dim,
        };
        let size = usize::try_from(dim).map_err(|_| invalid())?;
        expected = expected.checked_mul(size).ok_or_else(invalid)?;
        dims.push(size);
    }

    // raw_data is the usual encoding, float_data is the fallback some exporters use
    let payload = if tensor.raw_data.is_empty() && !tensor.float_data.is_empty() {
        tensor.float_data.iter().flat_map(|v| v.to_le_bytes()).collect()
    } else {
        std::mem::take(&mut tensor.raw_data)
    };
    let array = Array::new(dtype, dims, payload).map_err(|payload| LoadError::SizeMismatch {
        name: name.clone(),
        expected,
        actual: payload.len(),
    })?;
    Ok((name, array))
}

/// Builds the [`ParameterTable`] holding exactly the `needed` initializers.
///
/// The other initializers are dropped without being decoded. Work is spread over the rayon
/// pool; on failure the error of the first failing initializer, in declaration order, wins.
pub fn materialize_parameters(
    initializers: Vec<TensorProto>,
    needed: &BTreeSet<String>,
) -> Result<ParameterTable, LoadError> {
    let mut seen = HashSet::with_capacity(initializers.len());
    for tensor in &initializers {
        if !seen.insert(tensor.name.as_str()) {
            return Err(LoadError::DuplicateParameter {
                name: tensor.name.clone(),
            });
        }
    }
    drop(seen);

    let (wanted, skipped): (Vec<_>, Vec<_>) = initializers
        .into_iter()
        .partition(|tensor| needed.contains(&tensor.name));
    let released: usize = skipped
        .iter()
        .map(|t| t.raw_data.len() + t.float_data.len() * std::mem::size_of::<f32>())
        .sum();
    debug!(
        "materializing {} initializers, releasing {} unneeded ones ({} bytes)",
        wanted.len(),
        skipped.len(),
        released
    );
    drop(skipped);

    let results: Vec<Result<(String, Array), LoadError>> =
        wanted.into_par_iter().map(materialize).collect();
    let table = results.into_iter().collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(ParameterTable(table))
}
