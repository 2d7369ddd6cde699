mod cli;

use std::{fs, path::Path, process::Command};

use anyhow::{bail, Context, Result};
use clap::Parser as CliParser;
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use crate::cli::Cli;

const DEFAULT_WAT: &str = "a.out.wat";
const DEFAULT_WASM: &str = "a.out.wasm";

fn main() -> Result<()> {
    // Logging setup
    let fmt_layer = fmt::layer().with_writer(std::io::stderr);
    let filter_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env()
        .context("error reading logging directives")?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let args = Cli::parse();
    let src = fs::read_to_string(&args.input)
        .with_context(|| format!("error reading {}", args.input.display()))?;

    let program = cwat::check(&src).context("compilation failed")?;
    if args.dump_ast {
        print!("{}", cwat::util::fmt::tree::print_program_string(&program));
    }
    let wat = cwat::generate(&program).context("compilation failed")?;

    if args.text_only {
        let output = args.output.as_deref().unwrap_or(Path::new(DEFAULT_WAT));
        return write_wat(output, &wat);
    }

    let wat_path = Path::new(DEFAULT_WAT);
    let wasm_path = args.output.as_deref().unwrap_or(Path::new(DEFAULT_WASM));
    write_wat(wat_path, &wat)?;
    let assembled = assemble(&args.assembler, wat_path, wasm_path);
    if !args.keep_wat {
        fs::remove_file(wat_path)
            .with_context(|| format!("error removing {}", wat_path.display()))?;
    }
    assembled
}

fn write_wat(path: &Path, wat: &str) -> Result<()> {
    fs::write(path, wat).with_context(|| format!("error writing {}", path.display()))?;
    info!(path = %path.display(), "wrote text module");
    Ok(())
}

/// Runs the external assembler on `wat`, producing `wasm`.
fn assemble(assembler: &str, wat: &Path, wasm: &Path) -> Result<()> {
    debug!(assembler, wat = %wat.display(), wasm = %wasm.display(), "running assembler");
    let status = Command::new(assembler)
        .arg(wat)
        .arg("-o")
        .arg(wasm)
        .status()
        .with_context(|| format!("error running `{assembler}`"))?;
    if !status.success() {
        bail!("`{assembler}` failed with {status}");
    }
    info!(path = %wasm.display(), "wrote binary module");
    Ok(())
}
