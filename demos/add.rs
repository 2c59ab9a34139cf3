//! Example: Elementwise Addition
//!
//! Compiles an annotated add function for the CPU target and invokes it
//! with all-ones inputs.
//!
//! Run with: cargo run --example add

use tracejit::{compile, CompileOptions, DType, Tensor};

fn main() {
    println!("=== Elementwise Addition Example ===\n");

    let source = "fn add(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) {
        out = a + b;
        return out;
    }";
    println!("Source:\n{}\n", source);

    let kernel = compile(source, &CompileOptions::default()).unwrap();
    println!("Compiled entry: {}", kernel.entry());
    println!("Report:\n{}\n", kernel.report().to_json().unwrap());

    let a = Tensor::ones(vec![2, 3], DType::F32);
    let b = Tensor::ones(vec![2, 3], DType::F32);
    let result = kernel.invoke(&[a, b]).unwrap();

    println!("add(ones, ones) shape: {:?}", result.shape());
    println!("add(ones, ones) values: {:?}", result.scalars());
}
