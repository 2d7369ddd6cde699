use std::path::PathBuf;

use clap::Parser;

/// Compiles a C-like source file to WebAssembly.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Source file to compile.
    pub input: PathBuf,

    /// Output path. Defaults to `a.out.wat` with `-S`, `a.out.wasm` otherwise.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop after emitting WebAssembly text; don't run the assembler.
    #[arg(short = 'S')]
    pub text_only: bool,

    /// Keep the intermediate `.wat` file after assembling.
    #[arg(long)]
    pub keep_wat: bool,

    /// Print the typed syntax tree to stdout.
    #[arg(long)]
    pub dump_ast: bool,

    /// Command used to turn the text module into a binary one. It's called
    /// as `<CMD> <input.wat> -o <output.wasm>`.
    #[arg(long, value_name = "CMD", default_value = "wat2wasm")]
    pub assembler: String,
}
