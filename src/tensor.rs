//! Host-side tensor collaborator
//!
//! Stores shape, dtype, and the underlying data, and converts host tensors
//! into the backend-native buffer representation. Marshalling only; no
//! compilation logic lives here.

use serde::{Deserialize, Serialize};

use crate::device::DeviceBuffer;
use crate::error::{CompileError, CompileResult};

/// Scalar element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
}

impl DType {
    /// The string identifier used in annotations, e.g. `"float32"`
    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::I32 => "int32",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float32" => Some(DType::F32),
            "float64" => Some(DType::F64),
            "int32" => Some(DType::I32),
            _ => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The static shape + dtype contract a parameter or buffer must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorType {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl TensorType {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    /// The degenerate empty-shape type used for functions without a return
    pub fn unit() -> Self {
        Self::new(Vec::new(), DType::F32)
    }

    /// A scalar (empty-shape) type of the given dtype
    pub fn scalar(dtype: DType) -> Self {
        Self::new(Vec::new(), dtype)
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Total number of elements
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

impl std::fmt::Display for TensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

/// Typed element storage shared by host tensors and device buffers
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I32(_) => DType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage filled with a single value, converted to the dtype
    pub fn splat(dtype: DType, value: f64, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(vec![value as f32; len]),
            DType::F64 => TensorData::F64(vec![value; len]),
            DType::I32 => TensorData::I32(vec![value as i32; len]),
        }
    }
}

/// A host tensor: declared type plus element data
///
/// Mirrors the front-end tensor object callers hand to a compiled kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    ty: TensorType,
    data: TensorData,
}

impl Tensor {
    fn from_data(shape: Vec<usize>, data: TensorData) -> CompileResult<Self> {
        let ty = TensorType::new(shape, data.dtype());
        if data.len() != ty.numel() {
            return Err(CompileError::ShapeMismatch {
                expected: format!("{} element(s) for shape {:?}", ty.numel(), ty.shape),
                got: format!("{}", data.len()),
            });
        }
        Ok(Self { ty, data })
    }

    pub fn from_f32(shape: Vec<usize>, values: Vec<f32>) -> CompileResult<Self> {
        Self::from_data(shape, TensorData::F32(values))
    }

    pub fn from_f64(shape: Vec<usize>, values: Vec<f64>) -> CompileResult<Self> {
        Self::from_data(shape, TensorData::F64(values))
    }

    pub fn from_i32(shape: Vec<usize>, values: Vec<i32>) -> CompileResult<Self> {
        Self::from_data(shape, TensorData::I32(values))
    }

    /// Tensor filled with ones
    pub fn ones(shape: Vec<usize>, dtype: DType) -> Self {
        Self::full(shape, dtype, 1.0)
    }

    /// Tensor filled with a constant value
    pub fn full(shape: Vec<usize>, dtype: DType, value: f64) -> Self {
        let numel: usize = shape.iter().product();
        let data = TensorData::splat(dtype, value, numel);
        Self {
            ty: TensorType::new(shape, dtype),
            data,
        }
    }

    pub fn ty(&self) -> &TensorType {
        &self.ty
    }

    pub fn shape(&self) -> &[usize] {
        &self.ty.shape
    }

    pub fn dtype(&self) -> DType {
        self.ty.dtype
    }

    /// Convert into the backend-native buffer for a declared parameter type
    ///
    /// Fails if the tensor's shape or dtype does not match the declared
    /// contract; no data is copied to the device on failure.
    pub fn to_device_buffer(&self, declared: &TensorType) -> CompileResult<DeviceBuffer> {
        if self.ty.shape != declared.shape {
            return Err(CompileError::ShapeMismatch {
                expected: format!("{:?}", declared.shape),
                got: format!("{:?}", self.ty.shape),
            });
        }
        if self.ty.dtype != declared.dtype {
            return Err(CompileError::DtypeMismatch {
                expected: declared.dtype.name().to_string(),
                got: self.ty.dtype.name().to_string(),
            });
        }
        Ok(DeviceBuffer::new(self.ty.shape.clone(), self.data.clone()))
    }
}

impl std::fmt::Display for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dtype_names_round_trip() {
        for dtype in [DType::F32, DType::F64, DType::I32] {
            assert_eq!(DType::from_name(dtype.name()), Some(dtype));
        }
        assert_eq!(DType::from_name("float16"), None);
    }

    #[test]
    fn test_tensor_type_display() {
        let ty = TensorType::new(vec![2, 3], DType::F32);
        assert_eq!(ty.to_string(), "float32[2, 3]");
        assert_eq!(ty.numel(), 6);
    }

    #[test]
    fn test_ones() {
        let t = Tensor::ones(vec![2, 3], DType::F32);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.dtype(), DType::F32);
    }

    #[test]
    fn test_from_values_length_check() {
        let err = Tensor::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_marshal_ok() {
        let declared = TensorType::new(vec![2, 2], DType::F32);
        let buf = Tensor::ones(vec![2, 2], DType::F32)
            .to_device_buffer(&declared)
            .unwrap();
        assert_eq!(buf.shape(), &[2, 2]);
        assert_eq!(buf.dtype(), DType::F32);
    }

    #[test]
    fn test_marshal_shape_mismatch() {
        let declared = TensorType::new(vec![2, 3], DType::F32);
        let err = Tensor::ones(vec![3, 2], DType::F32)
            .to_device_buffer(&declared)
            .unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_marshal_dtype_mismatch() {
        let declared = TensorType::new(vec![2, 3], DType::F32);
        let err = Tensor::ones(vec![2, 3], DType::F64)
            .to_device_buffer(&declared)
            .unwrap_err();
        assert!(matches!(err, CompileError::DtypeMismatch { .. }));
    }
}
