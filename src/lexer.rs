use std::{iter::Peekable, num::ParseIntError};

use tracing::debug;

use crate::token::{Span, Spanned, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// Lexes the provided string, producing the tokens into the provided buffer.
///
/// The whole input is always scanned. If any error token was produced, the
/// first one is returned as the lexing error.
pub fn lex(src: &str, tokens: &mut Vec<Token>) -> Result<(), Spanned<Error>> {
    Lexer::new(src, tokens).lex();
    debug!(count = tokens.len(), "lexed source");
    match tokens.iter().find(|t| t.kind.is_error()) {
        Some(token) => Err(token.span().wrap(Error::from_token(*token, src))),
        None => Ok(()),
    }
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it, error tokens included.
pub fn lex_in_new(src: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    Lexer::new(src, &mut tokens).lex();
    tokens
}

struct Lexer<'src, 'tok> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    line: u32,
    current_lo: usize,
    current_line: u32,
    tokens: &'tok mut Vec<Token>,
}

impl Lexer<'_, '_> {
    /// Scans the source string until the input is exhausted.
    ///
    /// Tokens are written into the provided tokens buffer.
    fn lex(mut self) {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            let next = self.scan_token_kind();
            let is_eof = matches!(next, TokenKind::Eof);
            self.produce(next);
            if is_eof {
                break;
            }
        }
    }

    /// Tries to scan the current character.
    fn scan_token_kind(&mut self) -> TokenKind {
        use TokenKind::*;
        if self.is_at_end() {
            self.mark();
            return Eof;
        }
        match self.mark_advance() {
            '+' => match self.peek() {
                '+' => self.advance_with(PlusPlus),
                _ => Plus,
            },
            '-' => match self.peek() {
                '-' => self.advance_with(MinusMinus),
                _ => Minus,
            },
            '*' => Star,
            '/' => match self.peek() {
                '/' => self.inline_comment(),
                '*' => self.multiline_comment(),
                _ => Slash,
            },
            '%' => Percent,
            '=' => match self.peek() {
                '=' => self.advance_with(EqEq),
                _ => Assign,
            },
            '!' => match self.peek() {
                '=' => self.advance_with(NotEq),
                _ => Bang,
            },
            '<' => match self.peek() {
                '=' => self.advance_with(LessEq),
                _ => Less,
            },
            '>' => match self.peek() {
                '=' => self.advance_with(GreaterEq),
                _ => Greater,
            },
            '&' => match self.peek() {
                '&' => self.advance_with(AndAnd),
                _ => Amp,
            },
            '|' => match self.peek() {
                '|' => self.advance_with(OrOr),
                _ => Pipe,
            },
            '^' => Caret,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ';' => Semicolon,
            ',' => Comma,
            '"' => self.string(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_whitespace() => self.whitespace(),
            _ => ErrorUnexpectedChar,
        }
    }

    /// Lexes a string token. Escapes are only detected here; they're resolved
    /// later by [`extract::escaped_string`], so plain strings never pay for a
    /// copy.
    fn string(&mut self) -> TokenKind {
        let mut has_escaped = false;
        let mut is_escaping = false;
        loop {
            if self.is_at_end() {
                return TokenKind::ErrorUnclosedString;
            }
            let (current, current_span) = self.advance_with_span();
            match (is_escaping, current) {
                (false, '"') => {
                    return if has_escaped {
                        TokenKind::EscapedString
                    } else {
                        TokenKind::String
                    };
                }
                // Line breaks must be escaped. The error token is emitted but
                // scanning of the string goes on.
                (false, '\n') => {
                    self.produce_spanned(TokenKind::ErrorUnescapedLineBreak, current_span);
                }
                (false, '\\') => {
                    has_escaped = true;
                    is_escaping = true;
                }
                (_, _) => {
                    is_escaping = false;
                }
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        while valid_identifier_suffix(self.peek()) {
            self.advance();
        }
        KEYWORDS
            .get(self.substr())
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    fn number(&mut self) -> TokenKind {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == '.' && self.peek_second().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            return TokenKind::Decimal;
        }
        TokenKind::Number
    }

    fn whitespace(&mut self) -> TokenKind {
        while self.peek().is_ascii_whitespace() {
            self.advance();
        }
        TokenKind::Whitespace
    }

    fn inline_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), '/');
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        TokenKind::InlineComment
    }

    fn multiline_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), '*');
        loop {
            if self.is_at_end() {
                return TokenKind::ErrorUnclosedComment;
            }
            if self.advance() != '*' {
                continue;
            }
            // `**/` must still close the comment.
            while self.peek() == '*' {
                self.advance();
            }
            if self.is_at_end() {
                return TokenKind::ErrorUnclosedComment;
            }
            if self.advance() == '/' {
                break;
            }
        }
        TokenKind::MultilineComment
    }
}

impl Lexer<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok mut Vec<Token>) -> Lexer<'src, 'tok> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            line: 1,
            current_lo: 0,
            current_line: 1,
            tokens,
        }
    }

    /// Starts a new token "mark".
    fn mark(&mut self) {
        self.current_lo = self.cursor;
        self.current_line = self.line;
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.mark();
        self.advance()
    }

    /// Returns the next char and advances the iterator. Past the end of the
    /// input this returns `'\0'`; use [`Lexer::is_at_end`] to tell it apart
    /// from a NUL in the source.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        c
    }

    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next char (with its span) and advances the iterator.
    fn advance_with_span(&mut self) -> (char, Span) {
        let lo = self.cursor;
        let line = self.line;
        let char = self.advance();
        let span = Span::new_of_bounds(lo..self.cursor, line);
        (char, span)
    }

    fn is_at_end(&mut self) -> bool {
        self.iter.peek().is_none()
    }

    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the char after the peeked one.
    fn peek_second(&self) -> char {
        self.src[self.cursor..].chars().nth(1).unwrap_or('\0')
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor, self.current_line)
    }

    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    fn produce(&mut self, kind: TokenKind) {
        self.produce_spanned(kind, self.span());
    }

    fn produce_spanned(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token::new(kind, span));
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnclosedString,
    #[error("unterminated block comment")]
    UnclosedComment,
    #[error("line break inside string literal")]
    UnescapedLineBreak,
}

impl Error {
    fn from_token(token: Token, src: &str) -> Error {
        match token.kind {
            TokenKind::ErrorUnexpectedChar => {
                let c = token.span().substr(src).chars().next().unwrap_or('\0');
                Error::UnexpectedChar(c)
            }
            TokenKind::ErrorUnclosedString => Error::UnclosedString,
            TokenKind::ErrorUnclosedComment => Error::UnclosedComment,
            TokenKind::ErrorUnescapedLineBreak => Error::UnescapedLineBreak,
            other => unreachable!("{other:?} is not an error token"),
        }
    }
}

pub mod extract {
    use super::*;

    pub fn int(token: Token, src: &str) -> Result<i32, ParseIntError> {
        debug_assert_eq!(token.kind, TokenKind::Number);
        token.span().substr(src).parse()
    }

    pub fn decimal(token: Token, src: &str) -> Result<f32, std::num::ParseFloatError> {
        debug_assert_eq!(token.kind, TokenKind::Decimal);
        token.span().substr(src).parse()
    }

    pub fn ident(token: Token, src: &str) -> Box<str> {
        debug_assert_eq!(token.kind, TokenKind::Identifier);
        token.span().substr(src).into()
    }

    pub fn string(token: Token, src: &str) -> Box<str> {
        debug_assert_eq!(token.kind, TokenKind::String);
        token.span().offset(1, -1).substr(src).into()
    }

    pub fn escaped_string(token: Token, src: &str) -> Box<str> {
        debug_assert_eq!(token.kind, TokenKind::EscapedString);
        let s = token.span().offset(1, -1).substr(src);
        perform_escape(s).into_boxed_str()
    }
}

fn perform_escape(raw: &str) -> String {
    let mut buf = String::with_capacity(raw.len());
    let mut escaped = false;
    for char in raw.chars() {
        let char = match (escaped, char) {
            (true, 'n') => '\n',
            (true, 't') => '\t',
            (true, 'r') => '\r',
            (true, '0') => '\0',
            (false, '\\') => {
                escaped = true;
                continue;
            }
            (_, char) => char,
        };
        escaped = false;
        buf.push(char);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_samples_have_no_errors() {
        for input in [
            include_str!("../samples/hello.c"),
            include_str!("../samples/loops.c"),
            include_str!("../samples/big.c"),
        ] {
            assert_eq!(lex(input, &mut Vec::new()), Ok(()));
        }
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/%" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Percent, 4..5),
                (Eof, 5..5),
            ],
            "++x--" => [
                (PlusPlus, 0..2),
                (Identifier, 2..3),
                (MinusMinus, 3..5),
                (Eof, 5..5),
            ],
            "int/Int/float/char/void/returned" => [
                (Int, 0..3),
                (Slash, 3..4),
                (Identifier, 4..7),
                (Slash, 7..8),
                (Float, 8..13),
                (Slash, 13..14),
                (Char, 14..18),
                (Slash, 18..19),
                (Void, 19..23),
                (Slash, 23..24),
                (Identifier, 24..32),
                (Eof, 32..32),
            ],
            "1 12 1.5 3. 0.25" => [
                (Number, 0..1),
                (Whitespace, 1..2),
                (Number, 2..4),
                (Whitespace, 4..5),
                (Decimal, 5..8),
                (Whitespace, 8..9),
                (Number, 9..10),
                (ErrorUnexpectedChar, 10..11),
                (Whitespace, 11..12),
                (Decimal, 12..16),
                (Eof, 16..16),
            ],
            "(= == ! != < <= > >= & && | || ^)" => [
                (LParen, 0..1),
                (Assign, 1..2),
                (Whitespace, 2..3),
                (EqEq, 3..5),
                (Whitespace, 5..6),
                (Bang, 6..7),
                (Whitespace, 7..8),
                (NotEq, 8..10),
                (Whitespace, 10..11),
                (Less, 11..12),
                (Whitespace, 12..13),
                (LessEq, 13..15),
                (Whitespace, 15..16),
                (Greater, 16..17),
                (Whitespace, 17..18),
                (GreaterEq, 18..20),
                (Whitespace, 20..21),
                (Amp, 21..22),
                (Whitespace, 22..23),
                (AndAnd, 23..25),
                (Whitespace, 25..26),
                (Pipe, 26..27),
                (Whitespace, 27..28),
                (OrOr, 28..30),
                (Whitespace, 30..31),
                (Caret, 31..32),
                (RParen, 32..33),
                (Eof, 33..33),
            ],
            r#"""/"hi there"/"oi"# => [
                (String, 0..2),
                (Slash, 2..3),
                (String, 3..13),
                (Slash, 13..14),
                (ErrorUnclosedString, 14..17),
                (Eof, 17..17),
            ],
            r#""a\"b" "\\""# => [
                (EscapedString, 0..6),
                (Whitespace, 6..7),
                (EscapedString, 7..11),
                (Eof, 11..11),
            ],
            "a // comment\n/* block */b" => [
                (Identifier, 0..1),
                (Whitespace, 1..2),
                (InlineComment, 2..12),
                (Whitespace, 12..13),
                (MultilineComment, 13..24),
                (Identifier, 24..25),
                (Eof, 25..25),
            ],
            "/* unclosed *" => [
                (ErrorUnclosedComment, 0..13),
                (Eof, 13..13),
            ],
            "x[25];" => [
                (Identifier, 0..1),
                (LBracket, 1..2),
                (Number, 2..4),
                (RBracket, 4..5),
                (Semicolon, 5..6),
                (Eof, 6..6),
            ],
        });

        for (input, tokens) in cases {
            let lexed: Vec<_> = lex_in_new(input)
                .into_iter()
                .map(|t| (t.kind, t.span().lo..t.span().hi()))
                .collect();
            assert_eq!(lexed, tokens.as_slice(), "input: {input:?}");
        }
    }

    #[test]
    fn test_lines_are_tracked() {
        let src = "int\nmain\n\n/* a\nb */ x \"s\"";
        let lines: Vec<_> = lex_in_new(src)
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, t.span().line))
            .collect();
        assert_eq!(
            lines,
            [
                (TokenKind::Int, 1),
                (TokenKind::Identifier, 2),
                (TokenKind::Identifier, 5),
                (TokenKind::String, 5),
                (TokenKind::Eof, 5),
            ]
        );
    }

    #[test]
    fn test_first_error_is_reported() {
        let src = "int main() {\n  return $;\n}";
        let error = lex(src, &mut Vec::new()).unwrap_err();
        assert_eq!(error.inner, Error::UnexpectedChar('$'));
        assert_eq!(error.span.line, 2);
        assert_eq!(error.to_string(), "line 2: unexpected character '$'");
    }

    #[test]
    fn test_unescaped_line_break() {
        let error = lex("\"ab\ncd\"", &mut Vec::new()).unwrap_err();
        assert_eq!(error.inner, Error::UnescapedLineBreak);
        assert_eq!(error.span.line, 1);
    }

    #[test]
    fn test_nul_byte_is_not_end_of_input() {
        let src = "int main() { return 0; }\0 garbage $$$ int";
        let error = lex(src, &mut Vec::new()).unwrap_err();
        assert_eq!(error.inner, Error::UnexpectedChar('\0'));
        assert_eq!(error.span.lo, 24);

        let kinds: Vec<_> = lex_in_new("a\0b")
            .into_iter()
            .map(|t| (t.kind, t.span().lo..t.span().hi()))
            .collect();
        assert_eq!(
            kinds,
            [
                (TokenKind::Identifier, 0..1),
                (TokenKind::ErrorUnexpectedChar, 1..2),
                (TokenKind::Identifier, 2..3),
                (TokenKind::Eof, 3..3),
            ]
        );

        let tokens = lex_in_new("\"a\0b\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].span().hi(), 5);
    }

    #[test]
    fn test_extract_escaped_string() {
        let src = r#""a\n\t\"\\\0z""#;
        let tokens = lex_in_new(src);
        assert_eq!(tokens[0].kind, TokenKind::EscapedString);
        assert_eq!(&*extract::escaped_string(tokens[0], src), "a\n\t\"\\\0z");
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![$(($kind, $range)),*],
            )),*]
        }};
    }
    use cases;
}
