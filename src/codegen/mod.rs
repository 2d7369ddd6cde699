use tracing::debug;

use crate::{
    ast::{Item, Program, Typed},
    token::Spanned,
    types::Type,
};

pub mod lower;
pub mod wasm;

#[cfg(test)]
mod tests;

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Lowers a checked program into a WebAssembly module. Functions are
/// generated in source order and share the linear memory cursor.
pub fn generate(program: &Program<Typed>) -> Result<wasm::Module> {
    let mut compiler = lower::Compiler::new();
    for item in &program.items {
        match item {
            Item::Global(global) => compiler.global(global)?,
            Item::Function(function) => compiler.function(function)?,
        }
    }
    let module = compiler.finish();
    debug!(functions = module.functions.len(), "lowered program");
    Ok(module)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("function `{0}` must return a value")]
    MissingReturn(Box<str>),
    #[error("unresolved variable `{0}`")]
    UnresolvedLocal(Box<str>),
    #[error("arrays cannot be initialized")]
    ArrayInitializer,
    #[error("unary `{op}` is not supported on `{ty}`")]
    UnsupportedUnary { op: &'static str, ty: Type },
    #[error("binary `{op}` is not supported on `{ty}`")]
    UnsupportedOperator { op: &'static str, ty: Type },
    #[error("`break` outside of a loop")]
    BreakOutsideLoop,
    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop,
    #[error("initializer of global `{0}` must be a literal")]
    NonConstantGlobal(Box<str>),
    #[error("out of linear memory: {requested} more byte(s) needed at offset {cursor}")]
    OutOfMemory { cursor: u32, requested: u32 },
    #[error("elements of type `{0}` are not supported, only byte-sized elements are")]
    UnsupportedElementType(Type),
}
