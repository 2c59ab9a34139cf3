//! Trace-and-Compile Front End
//!
//! This library compiles restricted, annotated straight-line tensor
//! functions: the body is translated into an intermediate dataflow
//! representation, run through an optimization pass sequence, scheduled
//! for the chosen device, and lowered into a callable kernel.
//!
//! # Example
//!
//! ```rust
//! use tracejit::{compile, CompileOptions, DType, Tensor};
//!
//! let source = "fn add(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) {
//!     out = a + b;
//!     return out;
//! }";
//! let kernel = compile(source, &CompileOptions::default()).unwrap();
//!
//! let a = Tensor::ones(vec![2, 3], DType::F32);
//! let b = Tensor::ones(vec![2, 3], DType::F32);
//! let result = kernel.invoke(&[a, b]).unwrap();
//! assert_eq!(result.scalars(), vec![2.0; 6]);
//! ```

pub mod annot;
pub mod ast;
pub mod device;
pub mod error;
pub mod ir;
pub mod kernel;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod tensor;
pub mod translate;

pub use annot::{ContextValue, ResolutionContext};
pub use device::{Device, DeviceBuffer, DeviceKind, LaunchConfig};
pub use error::{CompileError, CompileResult};
pub use ir::{Module, ModuleBuilder};
pub use kernel::{CompiledKernel, JitFunction, KernelReport};
pub use parser::Parser;
pub use pipeline::{CompileOptions, Target};
pub use tensor::{DType, Tensor, TensorType};
pub use translate::Translator;

/// Compile a source function with an empty resolution context
pub fn compile(source: &str, options: &CompileOptions) -> CompileResult<CompiledKernel> {
    compile_with_context(source, &ResolutionContext::new(), options)
}

/// Compile a source function, resolving annotation names against the
/// definition site's visible names
pub fn compile_with_context(
    source: &str,
    ctx: &ResolutionContext,
    options: &CompileOptions,
) -> CompileResult<CompiledKernel> {
    let module = translate::translate_source(source, ctx)?;
    pipeline::compile_module(module, options)
}
