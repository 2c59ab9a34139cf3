//! Trace-and-Compile CLI
//!
//! Usage:
//!   tracejit "fn add(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) { out = a + b; return out; }"
//!   tracejit -f kernel.fn --target gpu --run-ones
//!   tracejit -f kernel.fn --dim m=4 --dim n=8 --json

use clap::Parser as ClapParser;
use colored::Colorize;
use std::fs;
use std::io::{self, Read};

use tracejit::{
    pipeline, translate, CompileOptions, DType, ResolutionContext, Target, Tensor,
};

#[derive(ClapParser, Debug)]
#[command(name = "tracejit")]
#[command(version = "0.1.0")]
#[command(about = "Compiles annotated straight-line tensor functions into device kernels")]
struct Args {
    /// Function definition to compile
    #[arg(value_name = "SOURCE")]
    source: Option<String>,

    /// Read the function definition from a file
    #[arg(short = 'f', long = "file")]
    input_file: Option<String>,

    /// Target device
    #[arg(short = 't', long = "target", default_value = "cpu")]
    target: Target,

    /// Bind a symbolic dimension (e.g. "m=4")
    #[arg(long = "dim", value_parser = parse_dim_binding)]
    dims: Vec<(String, usize)>,

    /// Bind a dtype alias (e.g. "dt=float32")
    #[arg(long = "dtype", value_parser = parse_dtype_binding)]
    dtypes: Vec<(String, DType)>,

    /// Skip the optimization pass sequence
    #[arg(long = "no-opt")]
    no_opt: bool,

    /// Print the translated IR module
    #[arg(long = "ir")]
    show_ir: bool,

    /// Output the kernel report as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Invoke the kernel with all-ones inputs and print the result
    #[arg(long = "run-ones")]
    run_ones: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_dim_binding(s: &str) -> Result<(String, usize), String> {
    let (name, value) = split_binding(s)?;
    let dim = value
        .parse::<usize>()
        .map_err(|_| format!("Invalid dimension value: {}", value))?;
    Ok((name, dim))
}

fn parse_dtype_binding(s: &str) -> Result<(String, DType), String> {
    let (name, value) = split_binding(s)?;
    let dtype =
        DType::from_name(&value).ok_or_else(|| format!("Unknown dtype: {}", value))?;
    Ok((name, dtype))
}

fn split_binding(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.split('=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid binding format: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

fn main() {
    let args = Args::parse();

    // Get the source from argument, file, or stdin
    let source = if let Some(src) = args.source {
        src
    } else if let Some(file) = args.input_file {
        fs::read_to_string(&file).unwrap_or_else(|e| {
            eprintln!("{}: Failed to read file '{}': {}", "Error".red(), file, e);
            std::process::exit(1);
        })
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).unwrap_or_else(|e| {
            eprintln!("{}: Failed to read stdin: {}", "Error".red(), e);
            std::process::exit(1);
        });
        buffer
    };

    if args.verbose {
        println!("{}", "Trace-and-Compile Front End".bold().blue());
        println!("{}", "=".repeat(30));
        println!();
        println!("{}: {}", "Input".green(), source.trim());
        println!("{}: {}", "Target".green(), args.target);
        println!();
    }

    // Build the resolution context from the command-line bindings
    let mut ctx = ResolutionContext::new();
    for (name, dim) in &args.dims {
        ctx.bind_dim(name, *dim);
    }
    for (name, dtype) in &args.dtypes {
        ctx.bind_dtype(name, *dtype);
    }

    // Translate
    let module = match translate::translate_source(&source, &ctx) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}: {}", "Translation error".red(), e);
            std::process::exit(1);
        }
    };

    if args.show_ir {
        println!("{}", "IR Module".bold().yellow());
        println!("{}", "-".repeat(30));
        println!("{}", module);
        println!();
    }

    // Compile
    let options = CompileOptions {
        target: args.target,
        optimize: !args.no_opt,
    };
    let kernel = match pipeline::compile_module(module, &options) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("{}: {}", "Compilation error".red(), e);
            std::process::exit(1);
        }
    };

    let report = kernel.report();

    if args.json_output {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    } else {
        println!("{}", "Compilation Results".bold().green());
        println!("{}", "=".repeat(40));
        println!("{}: {}", "Entry".cyan(), report.entry);
        println!("{}: {} ({})", "Device".cyan(), report.device, report.codegen);
        println!("{}: {}", "Kernel groups".cyan(), report.kernel_groups);
        for (i, launch) in report.launches.iter().enumerate() {
            println!(
                "  {} {}: {} block(s) x {} thread(s)",
                "Launch".cyan(),
                i,
                launch.blocks,
                launch.threads
            );
        }
        println!(
            "{}: [{}]",
            "Parameters".cyan(),
            report.params.join(", ")
        );
    }

    if args.run_ones {
        let inputs: Vec<Tensor> = kernel
            .params()
            .iter()
            .map(|p| Tensor::ones(p.ty.shape.to_vec(), p.ty.dtype))
            .collect();

        match kernel.invoke(&inputs) {
            Ok(result) => {
                println!();
                println!("{}", "Execution (all-ones inputs)".bold().green());
                println!("{}: {:?}", "Output shape".cyan(), result.shape());
                println!("{}: {:?}", "Output values".cyan(), result.scalars());
            }
            Err(e) => {
                eprintln!("{}: {}", "Execution error".red(), e);
                std::process::exit(1);
            }
        }
    }
}
