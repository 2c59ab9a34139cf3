//! Compiled kernels and invocation
//!
//! A [`CompiledKernel`] is the immutable artifact the pipeline produces:
//! an executable bound to one device and one entry point. The invocation
//! adapter marshals caller tensors into device buffers (delegating the
//! checks to the tensor collaborator) and returns the backend-native
//! result unconverted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annot::ResolutionContext;
use crate::device::{Device, DeviceBuffer, Executable, LaunchConfig};
use crate::error::{CompileError, CompileResult};
use crate::ir::Module;
use crate::pipeline::CompileOptions;
use crate::tensor::{Tensor, TensorType};

/// One declared kernel parameter
#[derive(Debug, Clone, PartialEq)]
pub struct KernelParam {
    pub name: String,
    pub ty: TensorType,
}

/// An executable kernel bound to a device and entry point
///
/// Immutable after creation. `invoke` takes `&self` and allocates its
/// register state per call, so a kernel may be invoked repeatedly with
/// different inputs of matching type.
#[derive(Debug, Clone)]
pub struct CompiledKernel {
    entry: String,
    device: Device,
    exec: Executable,
    params: Vec<KernelParam>,
    kernel_groups: usize,
    launches: Vec<LaunchConfig>,
}

impl CompiledKernel {
    /// Assemble the kernel from the compiled module's artifacts
    pub(crate) fn new(
        module: &Module,
        device: Device,
        exec: Executable,
    ) -> CompileResult<Self> {
        let mut params = Vec::with_capacity(module.params.len());
        for id in &module.params {
            let info = module.value(*id);
            let name = info
                .name_hint
                .clone()
                .ok_or_else(|| CompileError::internal("parameter without a name"))?;
            let ty = info
                .ty
                .clone()
                .ok_or_else(|| CompileError::internal("parameter without a type"))?;
            params.push(KernelParam { name, ty });
        }

        let launches = module.groups.iter().filter_map(|g| g.launch).collect();

        Ok(Self {
            entry: module.entry.clone(),
            device,
            exec,
            params,
            kernel_groups: module.groups.len(),
            launches,
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn params(&self) -> &[KernelParam] {
        &self.params
    }

    /// Invoke the kernel with one tensor per declared parameter
    ///
    /// Arguments are marshalled in declaration order; the first shape or
    /// dtype violation aborts the call before execution starts.
    pub fn invoke(&self, args: &[Tensor]) -> CompileResult<DeviceBuffer> {
        if args.len() != self.params.len() {
            return Err(CompileError::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }

        let mut buffers = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&self.params) {
            buffers.push(arg.to_device_buffer(&param.ty)?);
        }

        debug!(entry = %self.entry, device = %self.device.kind(), "invoking kernel");
        self.exec.run(&buffers)
    }

    /// Summary of the compiled artifact
    pub fn report(&self) -> KernelReport {
        KernelReport {
            entry: self.entry.clone(),
            device: self.device.kind().to_string(),
            codegen: self.device.codegen().to_string(),
            kernel_groups: self.kernel_groups,
            launches: self.launches.clone(),
            params: self.params.iter().map(|p| p.ty.to_string()).collect(),
        }
    }
}

/// Serializable summary of a compiled kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelReport {
    pub entry: String,
    pub device: String,
    pub codegen: String,
    pub kernel_groups: usize,
    pub launches: Vec<LaunchConfig>,
    pub params: Vec<String>,
}

impl KernelReport {
    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A function compiled lazily on every call
///
/// Holds the source, the definition-site resolution context, and the
/// compile policy. Each `invoke` re-runs the whole pipeline from source;
/// there is no kernel cache keyed by function or argument types.
#[derive(Debug, Clone)]
pub struct JitFunction {
    source: String,
    context: ResolutionContext,
    options: CompileOptions,
}

impl JitFunction {
    pub fn new(source: impl Into<String>, options: CompileOptions) -> Self {
        Self {
            source: source.into(),
            context: ResolutionContext::new(),
            options,
        }
    }

    pub fn with_context(
        source: impl Into<String>,
        context: ResolutionContext,
        options: CompileOptions,
    ) -> Self {
        Self {
            source: source.into(),
            context,
            options,
        }
    }

    /// Compile the source and call the resulting kernel
    pub fn invoke(&self, args: &[Tensor]) -> CompileResult<DeviceBuffer> {
        let kernel = crate::compile_with_context(&self.source, &self.context, &self.options)?;
        kernel.invoke(args)
    }
}
