//! Example: Chained Operations and Symbolic Shapes
//!
//! Demonstrates rebinding a name across statements (accumulation via
//! shadowing), symbolic dimensions resolved from the definition-site
//! context, and the recompile-per-call JIT wrapper.
//!
//! Run with: cargo run --example chained_ops

use tracejit::{
    CompileOptions, DType, JitFunction, ResolutionContext, Tensor,
};

fn main() {
    println!("=== Chained Operations Example ===\n");

    let source = "fn affine(x: Tensor((m, n), float32), w: Tensor((m, n), float32)) {
        out = x * w;
        out = out + x;
        out = out * 2;
        return out;
    }";
    println!("Source:\n{}\n", source);

    let mut ctx = ResolutionContext::new();
    ctx.bind_dim("m", 2);
    ctx.bind_dim("n", 4);

    let jit = JitFunction::with_context(source, ctx, CompileOptions::default());

    let x = Tensor::ones(vec![2, 4], DType::F32);
    let w = Tensor::full(vec![2, 4], DType::F32, 3.0);

    // (1 * 3 + 1) * 2 = 8 everywhere
    let result = jit.invoke(&[x, w]).unwrap();
    println!("affine(ones, 3s) shape: {:?}", result.shape());
    println!("affine(ones, 3s) values: {:?}", result.scalars());
}
