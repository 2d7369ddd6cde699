//! A compiler from a small C-like language to the WebAssembly text format.
//!
//! The pipeline is: [`lexer`] → [`parser`] (untyped AST) → [`type_checker`]
//! (typed AST) → [`codegen`] (module model, serialized as text).

use tracing::{debug, warn};

use crate::ast::{Program, Typed};

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The type checker takes an untyped AST, checks the soundness of its types,
/// and maps it into a typed AST.
pub mod type_checker;

/// The code generator lowers a typed AST into a WebAssembly module.
pub mod codegen;

pub mod ast;
pub mod error;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt {
        pub mod tree;
    }
    #[cfg(test)]
    pub(crate) mod test_utils;
}

pub use error::Error;

/// Runs every stage up to type checking.
pub fn check(src: &str) -> Result<Program<Typed>, Error> {
    let mut tokens = Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY);
    let program = parser::parse_program(src, &mut tokens)?;
    let program = type_checker::Checker::new().check(program)?;
    Ok(program)
}

/// Generates the full module text (header included) for a checked program.
pub fn generate(program: &Program<Typed>) -> Result<String, Error> {
    let module = codegen::generate(program)?;
    if module.function("main").is_none() {
        warn!("module has no `main` export");
    }
    let wat = codegen::wasm::to_wat(&module);
    debug!(bytes = wat.len(), "serialized module");
    Ok(wat)
}

/// Compiles a source program into WebAssembly text.
pub fn compile(src: &str) -> Result<String, Error> {
    generate(&check(src)?)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_compile_whole_module() {
        let wat = compile("int main() { logInt(42); return 0; }").unwrap();
        assert_eq!(
            wat,
            indoc! {r#"
                (module
                  (import "env" "log" (func $log (param i32)))
                  (import "env" "logInt" (func $logInt (param i32)))
                  (import "env" "memory" (memory 1))

                  (func $main (export "main") (result i32)
                    i32.const 42
                    call $logInt
                    i32.const 0
                    return
                  )
                )
            "#}
        );
    }

    #[test]
    fn test_samples_compile() {
        for src in [
            include_str!("../samples/hello.c"),
            include_str!("../samples/loops.c"),
            include_str!("../samples/big.c"),
        ] {
            if let Err(error) = compile(src) {
                panic!("sample failed to compile: {error}");
            }
        }
    }

    #[test]
    fn test_error_stages() {
        let error = compile("int main() { return 0 $ }").unwrap_err();
        assert!(matches!(error, Error::Lex(_)), "{error:?}");
        assert_eq!(error.to_string(), "line 1: unexpected character '$'");

        let error = compile("int main() { return 0; }\0 garbage").unwrap_err();
        assert!(matches!(error, Error::Lex(_)), "{error:?}");

        let error = compile("int main() { return 0 }").unwrap_err();
        assert!(matches!(error, Error::Parse(_)), "{error:?}");

        let error = compile("void f(int* p) { char a[2]; char b[2] = a; }").unwrap_err();
        assert!(matches!(error, Error::Codegen(_)), "{error:?}");
    }

    #[test]
    fn test_bad_calls_abort_before_codegen() {
        let error = compile("int main() {\n  return missing(1);\n}").unwrap_err();
        assert!(matches!(error, Error::Check(_)), "{error:?}");
        assert_eq!(error.to_string(), "line 2: undefined function `missing`");
        assert_eq!(error.line(), 2);

        let error = compile("int one() { return 1; } int main() { return one(2); }").unwrap_err();
        assert!(matches!(error, Error::Check(_)), "{error:?}");
        assert_eq!(
            error.to_string(),
            "line 1: `one` takes 0 argument(s) but 1 were supplied"
        );
    }
}
