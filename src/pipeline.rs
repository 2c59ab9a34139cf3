//! Compilation pipeline orchestrator
//!
//! Drives a built module through the staged pipeline: optimization
//! passes, target resolution, device-specific auto-scheduling, backend
//! lowering, and device binding. Stages run strictly in order and any
//! failure is fatal to the compilation: passes mutate the module
//! destructively, so a retry must re-translate from source.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{Device, DeviceKind, DeviceSpec, Executable, LaunchConfig, MicroOp, MicroOpKind, Step};
use crate::error::{CompileError, CompileResult};
use crate::ir::{KernelGroup, Module, OpPattern, ValueId, ValueKind};
use crate::kernel::CompiledKernel;
use crate::tensor::{DType, TensorType};

/// Logical device class a kernel is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Cpu,
    Gpu,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Cpu => "cpu",
            Target::Gpu => "gpu",
        }
    }

    /// Resolve the logical target to a concrete device and codegen pair
    pub fn resolve(&self) -> DeviceSpec {
        match self {
            Target::Cpu => DeviceSpec {
                kind: DeviceKind::Cpu,
                codegen: "cpu.native",
            },
            Target::Gpu => DeviceSpec {
                kind: DeviceKind::Gpu,
                codegen: "gpu.block",
            },
        }
    }
}

impl FromStr for Target {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        match s {
            "cpu" => Ok(Target::Cpu),
            "gpu" => Ok(Target::Gpu),
            other => Err(CompileError::unknown_target(other)),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Compilation policy
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target: Target,
    /// Run the dataflow optimization pass sequence. Skipping it still
    /// produces a correct, merely less-optimized, executable.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: Target::Cpu,
            optimize: true,
        }
    }
}

impl CompileOptions {
    pub fn for_target(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }
}

/// Compile a built module into a kernel bound to the requested device
///
/// The module is consumed: it must not be reused across compilations.
pub fn compile_module(
    mut module: Module,
    options: &CompileOptions,
) -> CompileResult<CompiledKernel> {
    if options.optimize {
        debug!(entry = %module.entry, "running optimization passes");
        run_default_passes(&mut module)?;
    }

    let spec = options.target.resolve();
    debug!(target = %options.target, codegen = spec.codegen, "resolved target");

    if spec.kind == DeviceKind::Gpu {
        schedule_for_gpu(&mut module)?;
    }

    let exec = lower_to_executable(&module)?;
    let device = Device::bind(spec)?;
    debug!(entry = %exec.entry(), launches = exec.num_launches(), "kernel compiled");

    CompiledKernel::new(&module, device, exec)
}

/// The fixed optimization pass sequence, applied in order
pub fn run_default_passes(module: &mut Module) -> CompileResult<()> {
    convert_to_dataflow(module)?;
    legalize(module)?;
    annotate_patterns(module);
    fuse_ops(module);
    fuse_kernel_groups(module);
    Ok(())
}

/// Verify the value table is in dataflow (def-before-use) order
pub fn convert_to_dataflow(module: &mut Module) -> CompileResult<()> {
    for (id, info) in module.iter() {
        if let ValueKind::Binary { lhs, rhs, .. } = &info.kind {
            if lhs.index() >= id.index() || rhs.index() >= id.index() {
                return Err(CompileError::internal(format!(
                    "value {} uses an operand defined after it",
                    id
                )));
            }
        }
    }
    module.dataflow = true;
    Ok(())
}

/// Resolve a static type for every value and check shape/dtype agreement
///
/// Scalar constants broadcast against their tensor operand and adopt its
/// dtype. Placeholders stay untyped.
pub fn legalize(module: &mut Module) -> CompileResult<()> {
    infer_value_types(module)
}

fn infer_value_types(module: &mut Module) -> CompileResult<()> {
    for id in module.ids().collect::<Vec<_>>() {
        let ty = match &module.value(id).kind {
            ValueKind::Param { ty, .. } => Some(ty.clone()),
            ValueKind::Const { .. } => Some(TensorType::scalar(DType::F64)),
            ValueKind::Unit => Some(TensorType::unit()),
            ValueKind::Placeholder => None,
            ValueKind::Binary { lhs, rhs, .. } => {
                binary_result_type(module.value(*lhs).ty.as_ref(), module.value(*rhs).ty.as_ref())?
            }
        };
        module.value_mut(id).ty = ty;
    }
    Ok(())
}

fn binary_result_type(
    lhs: Option<&TensorType>,
    rhs: Option<&TensorType>,
) -> CompileResult<Option<TensorType>> {
    let (lhs, rhs) = match (lhs, rhs) {
        (Some(l), Some(r)) => (l, r),
        // An untyped operand (a dangling placeholder) leaves the result
        // untyped; execution reports the undefined value.
        _ => return Ok(None),
    };

    if lhs.is_scalar() && rhs.is_scalar() {
        return Ok(Some(TensorType::scalar(DType::F64)));
    }
    if lhs.is_scalar() {
        return Ok(Some(rhs.clone()));
    }
    if rhs.is_scalar() {
        return Ok(Some(lhs.clone()));
    }

    if lhs.shape != rhs.shape {
        return Err(CompileError::ShapeMismatch {
            expected: format!("{:?}", lhs.shape),
            got: format!("{:?}", rhs.shape),
        });
    }
    if lhs.dtype != rhs.dtype {
        return Err(CompileError::DtypeMismatch {
            expected: lhs.dtype.name().to_string(),
            got: rhs.dtype.name().to_string(),
        });
    }
    Ok(Some(lhs.clone()))
}

/// Tag every value with its dataflow pattern
pub fn annotate_patterns(module: &mut Module) {
    for id in module.ids().collect::<Vec<_>>() {
        let pattern = match module.value(id).kind {
            ValueKind::Binary { .. } => OpPattern::Elementwise,
            _ => OpPattern::Opaque,
        };
        module.value_mut(id).pattern = Some(pattern);
    }
}

/// Wrap each elementwise value in its own kernel group
pub fn fuse_ops(module: &mut Module) {
    let groups: Vec<KernelGroup> = module
        .iter()
        .filter(|(_, info)| info.pattern == Some(OpPattern::Elementwise))
        .map(|(id, _)| KernelGroup {
            values: vec![id],
            launch: None,
        })
        .collect();
    module.groups = groups;
}

/// Merge directly adjacent producer-consumer groups into single launches
///
/// Groups are only fused when no other value sits between them in the
/// tape, so every operand from outside a fused group is still produced
/// before the group's launch step.
pub fn fuse_kernel_groups(module: &mut Module) {
    let mut fused: Vec<KernelGroup> = Vec::new();

    for group in std::mem::take(&mut module.groups) {
        let consumes_previous = match (fused.last(), group.values.first()) {
            (Some(prev), Some(first)) => {
                let last = *prev.values.last().expect("groups are non-empty");
                let adjacent = first.index() == last.index() + 1;
                adjacent
                    && match &module.value(*first).kind {
                        ValueKind::Binary { lhs, rhs, .. } => *lhs == last || *rhs == last,
                        _ => false,
                    }
            }
            _ => false,
        };

        if consumes_previous {
            fused
                .last_mut()
                .expect("checked non-empty")
                .values
                .extend(group.values);
        } else {
            fused.push(group);
        }
    }

    module.groups = fused;
}

/// Assign a thread-block partitioning to every schedulable operation
///
/// Runs for accelerator targets only, after the (optional) optimization
/// passes. When fusion was skipped, singleton groups are materialized
/// first so the schedule covers every elementwise op.
pub fn schedule_for_gpu(module: &mut Module) -> CompileResult<()> {
    infer_value_types(module)?;

    if module.groups.is_empty() {
        let singletons: Vec<KernelGroup> = module
            .iter()
            .filter(|(_, info)| matches!(info.kind, ValueKind::Binary { .. }))
            .map(|(id, _)| KernelGroup {
                values: vec![id],
                launch: None,
            })
            .collect();
        module.groups = singletons;
    }

    for i in 0..module.groups.len() {
        let last = *module.groups[i]
            .values
            .last()
            .ok_or_else(|| CompileError::internal("empty kernel group"))?;
        let numel = module
            .value(last)
            .ty
            .as_ref()
            .map(TensorType::numel)
            .ok_or_else(|| {
                CompileError::internal(format!("cannot schedule untyped value {}", last))
            })?;
        let launch = LaunchConfig::for_elements(numel);
        debug!(group = i, numel, blocks = launch.blocks, threads = launch.threads, "scheduled");
        module.groups[i].launch = Some(launch);
    }
    Ok(())
}

/// Lower a module into the backend-executable tape
///
/// Each kernel group becomes one launch step; ungrouped values become
/// singleton steps in emission order. Placeholders lower to nothing.
pub fn lower_to_executable(module: &Module) -> CompileResult<Executable> {
    let mut group_of: Vec<Option<usize>> = vec![None; module.len()];
    for (gi, group) in module.groups.iter().enumerate() {
        for id in &group.values {
            group_of[id.index()] = Some(gi);
        }
    }

    let mut steps: Vec<Step> = Vec::new();
    let mut emitted_groups = vec![false; module.groups.len()];

    for (id, info) in module.iter() {
        match group_of[id.index()] {
            Some(gi) => {
                if emitted_groups[gi] {
                    continue;
                }
                emitted_groups[gi] = true;
                let group = &module.groups[gi];
                let mut ops = Vec::with_capacity(group.values.len());
                for vid in &group.values {
                    if let Some(op) = lower_value(*vid, &module.value(*vid).kind)? {
                        ops.push(op);
                    }
                }
                steps.push(Step {
                    ops,
                    launch: group.launch,
                });
            }
            None => {
                if let Some(op) = lower_value(id, &info.kind)? {
                    steps.push(Step {
                        ops: vec![op],
                        launch: None,
                    });
                }
            }
        }
    }

    Ok(Executable {
        entry: module.entry.clone(),
        steps,
        num_slots: module.len(),
        ret_slot: module.ret.index(),
    })
}

fn lower_value(id: ValueId, kind: &ValueKind) -> CompileResult<Option<MicroOp>> {
    let kind = match kind {
        ValueKind::Param { index, .. } => MicroOpKind::BindParam { index: *index },
        ValueKind::Const { value } => MicroOpKind::Splat { value: *value },
        ValueKind::Binary { op, lhs, rhs } => MicroOpKind::Elementwise {
            op: *op,
            lhs: lhs.index(),
            rhs: rhs.index(),
        },
        ValueKind::Unit => MicroOpKind::Unit,
        ValueKind::Placeholder => return Ok(None),
    };
    Ok(Some(MicroOp {
        dst: id.index(),
        kind,
    }))
}
