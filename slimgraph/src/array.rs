//! Owned, typed tensor buffers built from initializer payloads.

use serde::{Deserialize, Serialize};
use tract_onnx::pb::tensor_proto::DataType;

/// Element type of an [`Array`]. Only 32-bit floats are materialized for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum DType {
    #[display("f32")]
    F32,
}

impl DType {
    /// Size in bytes of one element.
    pub fn size(&self) -> usize {
        match self {
            DType::F32 => std::mem::size_of::<f32>(),
        }
    }

    /// Maps an ONNX `TensorProto.data_type` code, `None` when unsupported.
    pub fn from_onnx(code: i32) -> Option<Self> {
        match DataType::from_i32(code) {
            Some(DataType::Float) => Some(DType::F32),
            _ => None,
        }
    }

    pub fn onnx_code(&self) -> i32 {
        match self {
            DType::F32 => DataType::Float as i32,
        }
    }
}

/// A dense row-major tensor owning its little-endian element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    dtype: DType,
    dims: Vec<usize>,
    data: Vec<u8>,
}

impl Array {
    /// Takes ownership of `data`. Returns the buffer back when its length does not match
    /// `dtype.size() * product(dims)`, or when that product overflows; callers turn that into
    /// a [`crate::LoadError::SizeMismatch`].
    pub fn new(dtype: DType, dims: Vec<usize>, data: Vec<u8>) -> Result<Self, Vec<u8>> {
        if Self::expected_len(dtype, &dims) != Some(data.len()) {
            return Err(data);
        }
        Ok(Self { dtype, dims, data })
    }

    /// Byte length of an array of this shape, `None` if it does not fit a `usize`.
    pub fn expected_len(dtype: DType, dims: &[usize]) -> Option<usize> {
        dims.iter().try_fold(dtype.size(), |len, &dim| len.checked_mul(dim))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Raw element bytes, little-endian.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Decodes the elements. Returns `None` if the array does not hold `f32`s.
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        match self.dtype {
            DType::F32 => Some(
                self.data
                    .chunks_exact(4)
                    .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect(),
            ),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
