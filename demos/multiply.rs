//! Example: Elementwise Multiplication on GPU
//!
//! Compiles a multiply function for the GPU target. The pipeline fuses
//! the elementwise op and assigns a thread-block schedule before
//! lowering; the report shows the resulting launch configuration.
//!
//! Run with: cargo run --example multiply

use tracejit::{compile, CompileOptions, DType, Target, Tensor};

fn main() {
    println!("=== Elementwise Multiplication Example (GPU) ===\n");

    let source = "fn multiply(a: Tensor((2, 2), float32), b: Tensor((2, 2), float32)) {
        out = a * b;
        return out;
    }";
    println!("Source:\n{}\n", source);

    let kernel = compile(source, &CompileOptions::for_target(Target::Gpu)).unwrap();

    let report = kernel.report();
    println!("Device: {} ({})", report.device, report.codegen);
    for (i, launch) in report.launches.iter().enumerate() {
        println!(
            "Launch {}: {} block(s) x {} thread(s)",
            i, launch.blocks, launch.threads
        );
    }
    println!();

    let a = Tensor::full(vec![2, 2], DType::F32, 5.0);
    let b = Tensor::full(vec![2, 2], DType::F32, 3.0);
    let result = kernel.invoke(&[a, b]).unwrap();

    // Expected: all entries 5 * 3 = 15
    println!("multiply(5s, 3s) values: {:?}", result.scalars());
}
