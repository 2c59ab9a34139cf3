//! Device model and kernel execution
//!
//! These types are the backend side of the pipeline: the resolved device
//! a kernel is bound to, the native buffer representation arguments are
//! marshalled into, and the lowered [`Executable`] tape the compiled
//! kernel runs. Execution is a straight interpretation of the tape; GPU
//! launches walk their assigned block grid so a schedule produced by the
//! auto-scheduler is actually exercised.

use std::ops::{Add, Mul};

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::ir::ElemOp;
use crate::tensor::{DType, TensorData};

/// The class of device a kernel executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// A resolved target: device class plus codegen identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    pub codegen: &'static str,
}

/// A bound device instance
#[derive(Debug, Clone)]
pub struct Device {
    spec: DeviceSpec,
    ordinal: usize,
}

impl Device {
    /// Bind a resolved target to a device instance
    ///
    /// GPU binding selects the accelerator context; there is a single
    /// simulated context, ordinal 0.
    pub fn bind(spec: DeviceSpec) -> CompileResult<Self> {
        Ok(Self { spec, ordinal: 0 })
    }

    pub fn kind(&self) -> DeviceKind {
        self.spec.kind
    }

    pub fn codegen(&self) -> &'static str {
        self.spec.codegen
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Thread/block partitioning assigned to one kernel launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub blocks: usize,
    pub threads: usize,
}

impl LaunchConfig {
    /// Maximum threads per block in the simulated device model
    pub const MAX_THREADS: usize = 256;

    /// Partition an element count into a block grid
    pub fn for_elements(numel: usize) -> Self {
        let numel = numel.max(1);
        let threads = numel.min(Self::MAX_THREADS);
        let blocks = numel.div_ceil(threads);
        Self { blocks, threads }
    }
}

/// Backend-native buffer: shape plus typed element storage
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer {
    shape: Vec<usize>,
    data: TensorData,
}

impl DeviceBuffer {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Self {
        Self { shape, data }
    }

    /// The empty-shape buffer returned by functions without a return
    pub fn unit() -> Self {
        Self::new(Vec::new(), TensorData::F32(Vec::new()))
    }

    /// An untyped scalar constant
    pub fn scalar(value: f64) -> Self {
        Self::new(Vec::new(), TensorData::F64(vec![value]))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    fn is_scalar(&self) -> bool {
        self.shape.is_empty() && self.data.len() == 1
    }

    fn scalar_value(&self) -> Option<f64> {
        if !self.is_scalar() {
            return None;
        }
        Some(match &self.data {
            TensorData::F32(v) => v[0] as f64,
            TensorData::F64(v) => v[0],
            TensorData::I32(v) => v[0] as f64,
        })
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Element values widened to f64, in storage order
    pub fn scalars(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

/// One micro-operation in the lowered tape
#[derive(Debug, Clone, PartialEq)]
pub struct MicroOp {
    pub dst: usize,
    pub kind: MicroOpKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MicroOpKind {
    /// Bind the caller's argument buffer into a register
    BindParam { index: usize },
    /// Materialize a scalar constant
    Splat { value: f64 },
    /// Elementwise binary operation over two registers
    Elementwise { op: ElemOp, lhs: usize, rhs: usize },
    /// Materialize the empty-shape unit value
    Unit,
}

/// One kernel launch: a run of micro-ops with an optional block grid
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub ops: Vec<MicroOp>,
    pub launch: Option<LaunchConfig>,
}

/// The lowered, device-executable form of a module
///
/// Immutable after compilation; `run` allocates its register file per
/// call, so one executable can serve repeated invocations.
#[derive(Debug, Clone)]
pub struct Executable {
    pub(crate) entry: String,
    pub(crate) steps: Vec<Step>,
    pub(crate) num_slots: usize,
    pub(crate) ret_slot: usize,
}

impl Executable {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn num_launches(&self) -> usize {
        self.steps.len()
    }

    /// Execute the tape with pre-marshalled argument buffers
    pub fn run(&self, args: &[DeviceBuffer]) -> CompileResult<DeviceBuffer> {
        let mut registers: Vec<Option<DeviceBuffer>> = vec![None; self.num_slots];

        for step in &self.steps {
            for op in &step.ops {
                let result = match &op.kind {
                    MicroOpKind::BindParam { index } => args
                        .get(*index)
                        .cloned()
                        .ok_or_else(|| CompileError::internal("missing argument buffer"))?,
                    MicroOpKind::Splat { value } => DeviceBuffer::scalar(*value),
                    MicroOpKind::Unit => DeviceBuffer::unit(),
                    MicroOpKind::Elementwise { op, lhs, rhs } => {
                        let lhs = read_register(&registers, *lhs)?;
                        let rhs = read_register(&registers, *rhs)?;
                        apply_binary(*op, lhs, rhs, step.launch.as_ref())?
                    }
                };
                registers[op.dst] = Some(result);
            }
        }

        registers
            .get_mut(self.ret_slot)
            .and_then(Option::take)
            .ok_or_else(|| CompileError::internal("return value was never produced"))
    }
}

fn read_register(registers: &[Option<DeviceBuffer>], slot: usize) -> CompileResult<&DeviceBuffer> {
    registers
        .get(slot)
        .and_then(Option::as_ref)
        .ok_or_else(|| CompileError::internal(format!("use of undefined value in slot {}", slot)))
}

fn apply<T>(op: ElemOp, x: T, y: T) -> T
where
    T: Copy + Add<Output = T> + Mul<Output = T>,
{
    match op {
        ElemOp::Add => x + y,
        ElemOp::Mul => x * y,
    }
}

/// Zip two equal-length slices, walking the block grid when launched
fn zip_chunked<T>(op: ElemOp, a: &[T], b: &[T], launch: Option<&LaunchConfig>) -> Vec<T>
where
    T: Copy + Add<Output = T> + Mul<Output = T>,
{
    match launch {
        None => a.iter().zip(b).map(|(&x, &y)| apply(op, x, y)).collect(),
        Some(lc) => {
            let mut out = Vec::with_capacity(a.len());
            for block in 0..lc.blocks {
                let start = block * lc.threads;
                if start >= a.len() {
                    break;
                }
                let end = (start + lc.threads).min(a.len());
                for i in start..end {
                    out.push(apply(op, a[i], b[i]));
                }
            }
            out
        }
    }
}

/// Broadcast a scalar against a slice, preserving operand order
fn broadcast_chunked<T>(
    op: ElemOp,
    scalar: T,
    values: &[T],
    scalar_on_left: bool,
    launch: Option<&LaunchConfig>,
) -> Vec<T>
where
    T: Copy + Add<Output = T> + Mul<Output = T>,
{
    let one = |x: T| {
        if scalar_on_left {
            apply(op, scalar, x)
        } else {
            apply(op, x, scalar)
        }
    };
    match launch {
        None => values.iter().map(|&x| one(x)).collect(),
        Some(lc) => {
            let mut out = Vec::with_capacity(values.len());
            for block in 0..lc.blocks {
                let start = block * lc.threads;
                if start >= values.len() {
                    break;
                }
                let end = (start + lc.threads).min(values.len());
                for i in start..end {
                    out.push(one(values[i]));
                }
            }
            out
        }
    }
}

/// Apply an elementwise op over two buffers
///
/// Scalar (empty-shape) operands broadcast against the tensor operand and
/// adopt its dtype. Two tensor operands must agree on shape and dtype;
/// this is the runtime backstop for modules compiled with the static
/// checking passes skipped.
fn apply_binary(
    op: ElemOp,
    lhs: &DeviceBuffer,
    rhs: &DeviceBuffer,
    launch: Option<&LaunchConfig>,
) -> CompileResult<DeviceBuffer> {
    if lhs.data.is_empty() || rhs.data.is_empty() {
        return Err(CompileError::internal("use of unit value in arithmetic"));
    }

    match (lhs.scalar_value(), rhs.scalar_value()) {
        (Some(x), Some(y)) => Ok(DeviceBuffer::scalar(apply(op, x, y))),
        (Some(s), None) => broadcast_buffer(op, s, rhs, true, launch),
        (None, Some(s)) => broadcast_buffer(op, s, lhs, false, launch),
        (None, None) => {
            if lhs.shape != rhs.shape {
                return Err(CompileError::ShapeMismatch {
                    expected: format!("{:?}", lhs.shape),
                    got: format!("{:?}", rhs.shape),
                });
            }
            let data = match (&lhs.data, &rhs.data) {
                (TensorData::F32(a), TensorData::F32(b)) => {
                    TensorData::F32(zip_chunked(op, a, b, launch))
                }
                (TensorData::F64(a), TensorData::F64(b)) => {
                    TensorData::F64(zip_chunked(op, a, b, launch))
                }
                (TensorData::I32(a), TensorData::I32(b)) => {
                    TensorData::I32(zip_chunked(op, a, b, launch))
                }
                _ => {
                    return Err(CompileError::DtypeMismatch {
                        expected: lhs.dtype().name().to_string(),
                        got: rhs.dtype().name().to_string(),
                    })
                }
            };
            Ok(DeviceBuffer::new(lhs.shape.clone(), data))
        }
    }
}

fn broadcast_buffer(
    op: ElemOp,
    scalar: f64,
    tensor: &DeviceBuffer,
    scalar_on_left: bool,
    launch: Option<&LaunchConfig>,
) -> CompileResult<DeviceBuffer> {
    let data = match &tensor.data {
        TensorData::F32(v) => {
            TensorData::F32(broadcast_chunked(op, scalar as f32, v, scalar_on_left, launch))
        }
        TensorData::F64(v) => {
            TensorData::F64(broadcast_chunked(op, scalar, v, scalar_on_left, launch))
        }
        TensorData::I32(v) => {
            TensorData::I32(broadcast_chunked(op, scalar as i32, v, scalar_on_left, launch))
        }
    };
    Ok(DeviceBuffer::new(tensor.shape.clone(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_launch_config_partitioning() {
        let lc = LaunchConfig::for_elements(1000);
        assert_eq!(lc.threads, 256);
        assert_eq!(lc.blocks, 4);

        let small = LaunchConfig::for_elements(6);
        assert_eq!(small.threads, 6);
        assert_eq!(small.blocks, 1);
    }

    #[test]
    fn test_apply_binary_elementwise() {
        let a = DeviceBuffer::new(vec![2, 2], TensorData::F32(vec![1.0, 2.0, 3.0, 4.0]));
        let b = DeviceBuffer::new(vec![2, 2], TensorData::F32(vec![10.0, 20.0, 30.0, 40.0]));
        let out = apply_binary(ElemOp::Add, &a, &b, None).unwrap();
        assert_eq!(out.as_f32().unwrap(), &[11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_apply_binary_chunked_matches_unchunked() {
        let data: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let a = DeviceBuffer::new(vec![1000], TensorData::F32(data.clone()));
        let b = DeviceBuffer::new(vec![1000], TensorData::F32(data));

        let launch = LaunchConfig::for_elements(1000);
        let chunked = apply_binary(ElemOp::Mul, &a, &b, Some(&launch)).unwrap();
        let plain = apply_binary(ElemOp::Mul, &a, &b, None).unwrap();
        assert_eq!(chunked, plain);
    }

    #[test]
    fn test_scalar_broadcast() {
        let t = DeviceBuffer::new(vec![3], TensorData::F32(vec![1.0, 2.0, 3.0]));
        let s = DeviceBuffer::scalar(10.0);
        let out = apply_binary(ElemOp::Mul, &s, &t, None).unwrap();
        assert_eq!(out.as_f32().unwrap(), &[10.0, 20.0, 30.0]);
        assert_eq!(out.shape(), &[3]);
    }

    #[test]
    fn test_runtime_shape_mismatch() {
        let a = DeviceBuffer::new(vec![2], TensorData::F32(vec![1.0, 2.0]));
        let b = DeviceBuffer::new(vec![3], TensorData::F32(vec![1.0, 2.0, 3.0]));
        let err = apply_binary(ElemOp::Add, &a, &b, None).unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_runtime_dtype_mismatch() {
        let a = DeviceBuffer::new(vec![2], TensorData::F32(vec![1.0, 2.0]));
        let b = DeviceBuffer::new(vec![2], TensorData::F64(vec![1.0, 2.0]));
        let err = apply_binary(ElemOp::Add, &a, &b, None).unwrap_err();
        assert!(matches!(err, CompileError::DtypeMismatch { .. }));
    }

    #[test]
    fn test_executable_run() {
        // %0 = param a, %1 = param b, %2 = a + b, return %2
        let exec = Executable {
            entry: "add".to_string(),
            steps: vec![Step {
                ops: vec![
                    MicroOp {
                        dst: 0,
                        kind: MicroOpKind::BindParam { index: 0 },
                    },
                    MicroOp {
                        dst: 1,
                        kind: MicroOpKind::BindParam { index: 1 },
                    },
                    MicroOp {
                        dst: 2,
                        kind: MicroOpKind::Elementwise {
                            op: ElemOp::Add,
                            lhs: 0,
                            rhs: 1,
                        },
                    },
                ],
                launch: None,
            }],
            num_slots: 3,
            ret_slot: 2,
        };

        let a = DeviceBuffer::new(vec![2], TensorData::F32(vec![1.0, 2.0]));
        let b = DeviceBuffer::new(vec![2], TensorData::F32(vec![3.0, 4.0]));
        let out = exec.run(&[a, b]).unwrap();
        assert_eq!(out.as_f32().unwrap(), &[4.0, 6.0]);
    }

    #[test]
    fn test_executable_undefined_slot() {
        let exec = Executable {
            entry: "bad".to_string(),
            steps: vec![Step {
                ops: vec![MicroOp {
                    dst: 1,
                    kind: MicroOpKind::Elementwise {
                        op: ElemOp::Add,
                        lhs: 0,
                        rhs: 0,
                    },
                }],
                launch: None,
            }],
            num_slots: 2,
            ret_slot: 1,
        };
        let err = exec.run(&[]).unwrap_err();
        assert!(matches!(err, CompileError::Internal { .. }));
    }

    #[test]
    fn test_device_bind() {
        let spec = DeviceSpec {
            kind: DeviceKind::Gpu,
            codegen: "gpu.block",
        };
        let device = Device::bind(spec).unwrap();
        assert_eq!(device.kind(), DeviceKind::Gpu);
        assert_eq!(device.ordinal(), 0);
    }
}
