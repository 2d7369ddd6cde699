use std::{fmt, ops::Range};

#[derive(Copy, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct Token {
    pub kind: TokenKind,
    lo: usize,
    len: u32,
    line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            lo: span.lo,
            len: span.len,
            line: span.line,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            lo: self.lo,
            len: self.len,
            line: self.line,
        }
    }

    /// A synthetic end-of-file token placed just past the last byte.
    pub fn eof_for(src: &str, line: u32) -> Token {
        Token::new(TokenKind::Eof, Span::new_of_length(src.len(), 0, line))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {})", self.kind, self.span())
    }
}

/// A byte range in the source, plus the (1-based) line where it starts.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub lo: usize,
    pub len: u32,
    pub line: u32,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>, line: u32) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap(), line)
    }

    pub fn new_of_length(lo: usize, len: u32, line: u32) -> Span {
        Span { lo, len, line }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }

    /// Returns a span that covers both `self` and `other`. The line is the
    /// one of `self`.
    pub fn to(self, other: Span) -> Span {
        let lo = self.lo.min(other.lo);
        let hi = self.hi().max(other.hi());
        Span::new_of_bounds(lo..hi, self.line)
    }

    /// Shrinks (or grows) the span on both ends.
    pub fn offset(self, lo: isize, hi: isize) -> Span {
        let new_lo = self.lo.checked_add_signed(lo).unwrap();
        let new_hi = self.hi().checked_add_signed(hi).unwrap();
        Span::new_of_bounds(new_lo..new_hi, self.line)
    }

    pub fn substr(self, src: &str) -> &str {
        &src[self.lo..self.hi()]
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, line: {})", self.line)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

/// Some value (usually an error) attached to the source location it refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> fmt::Display for Spanned<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.span.line, self.inner)
    }
}

impl<T> std::error::Error for Spanned<T> where T: std::error::Error {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Float,
    Char,
    Void,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Continue,
    Break,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,

    /// `=`
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    /// `&&`
    AndAnd,
    /// `&`
    Amp,
    /// `||`
    OrOr,
    /// `|`
    Pipe,
    Caret,
    Bang,
    PlusPlus,
    MinusMinus,

    Identifier,
    /// Digits only.
    Number,
    /// Digits, a dot and more digits.
    Decimal,
    String,
    /// A string literal that contains at least one escape sequence.
    EscapedString,

    Whitespace,
    InlineComment,
    MultilineComment,

    Eof,

    ErrorUnexpectedChar,
    ErrorUnclosedString,
    ErrorUnclosedComment,
    ErrorUnescapedLineBreak,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        use TokenKind::*;
        matches!(self, Whitespace | InlineComment | MultilineComment)
    }

    pub fn is_error(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            ErrorUnexpectedChar
                | ErrorUnclosedString
                | ErrorUnclosedComment
                | ErrorUnescapedLineBreak
        )
    }

    /// Whether this token starts a type (`int`, `float`, `char` or `void`).
    pub fn is_base_type(self) -> bool {
        use TokenKind::*;
        matches!(self, Int | Float | Char | Void)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let s = match self {
            Int => "`int`",
            Float => "`float`",
            Char => "`char`",
            Void => "`void`",
            Return => "`return`",
            If => "`if`",
            Else => "`else`",
            While => "`while`",
            Do => "`do`",
            For => "`for`",
            Continue => "`continue`",
            Break => "`break`",
            LParen => "`(`",
            RParen => "`)`",
            LBrace => "`{`",
            RBrace => "`}`",
            LBracket => "`[`",
            RBracket => "`]`",
            Semicolon => "`;`",
            Comma => "`,`",
            Assign => "`=`",
            Plus => "`+`",
            Minus => "`-`",
            Star => "`*`",
            Slash => "`/`",
            Percent => "`%`",
            EqEq => "`==`",
            NotEq => "`!=`",
            Less => "`<`",
            LessEq => "`<=`",
            Greater => "`>`",
            GreaterEq => "`>=`",
            AndAnd => "`&&`",
            Amp => "`&`",
            OrOr => "`||`",
            Pipe => "`|`",
            Caret => "`^`",
            Bang => "`!`",
            PlusPlus => "`++`",
            MinusMinus => "`--`",
            Identifier => "identifier",
            Number => "integer literal",
            Decimal => "decimal literal",
            String | EscapedString => "string literal",
            Whitespace => "whitespace",
            InlineComment | MultilineComment => "comment",
            Eof => "end of file",
            ErrorUnexpectedChar => "unexpected character",
            ErrorUnclosedString => "unclosed string",
            ErrorUnclosedComment => "unclosed comment",
            ErrorUnescapedLineBreak => "unescaped line break",
        };
        f.write_str(s)
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "int" => TokenKind::Int,
    "float" => TokenKind::Float,
    "char" => TokenKind::Char,
    "void" => TokenKind::Void,
    "return" => TokenKind::Return,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "do" => TokenKind::Do,
    "for" => TokenKind::For,
    "continue" => TokenKind::Continue,
    "break" => TokenKind::Break,
};
