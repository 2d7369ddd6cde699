use crate::{codegen, lexer, parser, token::Spanned, type_checker};

/// Any error that aborts a compilation. Every variant displays as
/// `line N: <message>`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Lex(Spanned<lexer::Error>),
    #[error("{0}")]
    Parse(Spanned<parser::Error>),
    #[error("{0}")]
    Check(#[from] Spanned<type_checker::Error>),
    #[error("{0}")]
    Codegen(#[from] Spanned<codegen::Error>),
}

impl Error {
    pub fn line(&self) -> u32 {
        match self {
            Error::Lex(e) => e.span.line,
            Error::Parse(e) => e.span.line,
            Error::Check(e) => e.span.line,
            Error::Codegen(e) => e.span.line,
        }
    }
}

impl From<Spanned<lexer::Error>> for Error {
    fn from(error: Spanned<lexer::Error>) -> Self {
        Error::Lex(error)
    }
}

/// Lexing failures reach the parser's caller wrapped in
/// [`parser::Error::Lexer`]; they are reported as lexing errors again.
impl From<Spanned<parser::Error>> for Error {
    fn from(error: Spanned<parser::Error>) -> Self {
        match error.inner {
            parser::Error::Lexer(inner) => Error::Lex(error.span.wrap(inner)),
            inner => Error::Parse(error.span.wrap(inner)),
        }
    }
}
