use tracing::debug;

use crate::{
    ast::{
        BinaryOperator, Constant, Expr, ExprKind, FunctionDefinition, FunctionParam,
        GlobalDefinition, Ident, Item, LoopKind, Program, Stmt, StmtKind, UnaryOperator, Untyped,
    },
    lexer::{self, extract},
    token::{Span, Spanned, Token, TokenKind},
    types::Type,
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Lexes `src` into `tokens` and parses the whole program.
///
/// Parsing stops at the first error.
pub fn parse_program(src: &str, tokens: &mut Vec<Token>) -> Result<Program<Untyped>> {
    assert!(tokens.is_empty());

    lexer::lex(src, tokens).map_err(|e| e.span.wrap(Error::Lexer(e.inner)))?;
    let mut p = Parser::new(src, tokens);
    let program = p.parse_program()?;
    debug!(items = program.items.len(), "parsed program");
    Ok(program)
}

struct Parser<'src, 'tok> {
    src: &'src str,
    tokens: &'tok [Token],
    cursor: usize,
    /// Span of the last token returned by [`Parser::advance`].
    prev: Span,
}

impl Parser<'_, '_> {
    fn parse_program(&mut self) -> Result<Program<Untyped>> {
        let mut items = Vec::with_capacity(8);
        while self.except([]) {
            items.push(self.parse_item()?);
        }
        self.consume(TokenKind::Eof)?;
        Ok(Program { items })
    }

    /// Parses a function definition or a global definition. Both start with
    /// `type ID`.
    fn parse_item(&mut self) -> Result<Item<Untyped>> {
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;

        if self.take(TokenKind::LParen) {
            let params = self.parse_list(TokenKind::RParen, TokenKind::Comma, |p| {
                let ty = p.parse_type()?;
                let name = p.parse_ident()?;
                Ok(FunctionParam { name, ty })
            })?;
            self.consume(TokenKind::RParen)?;
            let body = self.parse_block()?;
            return Ok(Item::Function(FunctionDefinition {
                name,
                return_ty: ty,
                params,
                body,
            }));
        }

        let initializer = self.parse_initializer()?;
        self.consume(TokenKind::Semicolon)?;
        Ok(Item::Global(GlobalDefinition {
            name,
            ty,
            initializer,
        }))
    }

    fn parse_type(&mut self) -> Result<Type> {
        use TokenKind::*;
        let base = match self.consume_any(&[Int, Float, Char, Void])?.kind {
            Int => Type::Int,
            Float => Type::Float,
            Char => Type::Char,
            Void => Type::Void,
            _ => unreachable!(),
        };
        let mut pointers = 0;
        while self.take(Star) {
            pointers += 1;
        }
        Ok(Type::build(base, pointers))
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.consume(TokenKind::Identifier)?;
        Ok(Ident {
            name: extract::ident(token, self.src),
            span: token.span(),
        })
    }

    fn parse_initializer(&mut self) -> Result<Option<Expr<Untyped>>> {
        if !self.take(TokenKind::Assign) {
            return Ok(None);
        }
        self.parse_expr().map(Some)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt<Untyped>>> {
        self.consume(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while self.except([TokenKind::RBrace]) {
            body.push(self.parse_stmt()?);
        }
        self.consume(TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_stmt(&mut self) -> Result<Stmt<Untyped>> {
        let start = self.peek().span();
        let kind = match self.peek().kind {
            TokenKind::Return => {
                self.advance();
                let value = if self.is(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Return(value)
            }
            TokenKind::If => return self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_paren_cond()?;
                let body = self.parse_block()?;
                StmtKind::Loop {
                    kind: LoopKind::While,
                    cond,
                    body,
                }
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.consume(TokenKind::While)?;
                let cond = self.parse_paren_cond()?;
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Loop {
                    kind: LoopKind::DoWhile,
                    cond,
                    body,
                }
            }
            TokenKind::For => return self.parse_for(),
            TokenKind::Continue => {
                self.advance();
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Continue
            }
            TokenKind::Break => {
                self.advance();
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Break
            }
            _ => {
                let simple = self.parse_simple_stmt()?;
                self.consume(TokenKind::Semicolon)?;
                simple.kind
            }
        };
        Ok(Stmt {
            kind,
            span: start.to(self.prev),
        })
    }

    fn parse_paren_cond(&mut self) -> Result<Expr<Untyped>> {
        self.consume(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> Result<Stmt<Untyped>> {
        let start = self.consume(TokenKind::If)?.span();
        let cond = self.parse_paren_cond()?;
        let body = self.parse_block()?;
        let else_body = if !self.take(TokenKind::Else) {
            Vec::new()
        } else if self.is(TokenKind::If) {
            vec![self.parse_if()?]
        } else {
            self.parse_block()?
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                body,
                else_body,
            },
            span: start.to(self.prev),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt<Untyped>> {
        let start = self.consume(TokenKind::For)?.span();
        self.consume(TokenKind::LParen)?;
        let decl = if self.is(TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        self.consume(TokenKind::Semicolon)?;
        let cond = if self.is(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::Semicolon)?;
        let update = if self.is(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        self.consume(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::For {
                decl,
                cond,
                update,
                body,
            },
            span: start.to(self.prev),
        })
    }

    /// Parses a declaration, an assignment, an array store or a bare
    /// expression. The trailing `;` is left to the caller.
    fn parse_simple_stmt(&mut self) -> Result<Stmt<Untyped>> {
        let start = self.peek().span();
        let kind = match self.peek().kind {
            kind if kind.is_base_type() => self.parse_declaration()?,
            TokenKind::Identifier => {
                let ident = self.parse_ident()?;
                if self.take(TokenKind::Assign) {
                    let value = self.parse_expr()?;
                    StmtKind::SetLocalVar {
                        target: ident,
                        value,
                    }
                } else if self.is(TokenKind::LBracket) {
                    let (base, offset) = self.parse_indices(Self::variable(ident))?;
                    if self.take(TokenKind::Assign) {
                        let value = self.parse_expr()?;
                        StmtKind::SetArray {
                            base,
                            offset,
                            value,
                        }
                    } else {
                        let span = base.span.to(self.prev);
                        let lhs = Self::expr(Self::array_offset(base, offset), span);
                        StmtKind::Expr(self.parse_binary_tail(lhs)?)
                    }
                } else {
                    let lhs = self.parse_ident_tail(ident)?;
                    StmtKind::Expr(self.parse_binary_tail(lhs)?)
                }
            }
            _ => StmtKind::Expr(self.parse_expr()?),
        };
        Ok(Stmt {
            kind,
            span: start.to(self.prev),
        })
    }

    fn parse_declaration(&mut self) -> Result<StmtKind<Untyped>> {
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;

        let mut dims = Vec::new();
        while self.take(TokenKind::LBracket) {
            let token = self.advance();
            let size = match token.kind {
                TokenKind::Number => extract::int(token, self.src)
                    .ok()
                    .and_then(|size| u32::try_from(size).ok())
                    .ok_or_else(|| token.span().wrap(Error::ParseInt))?,
                actual => return Err(token.span().wrap(Error::InvalidArraySize { actual })),
            };
            dims.push(size);
            self.consume(TokenKind::RBracket)?;
        }
        let ty = dims.into_iter().rev().fold(ty, Type::array_of);

        let initializer = self.parse_initializer()?;
        Ok(StmtKind::DeclareVar {
            name,
            ty,
            initializer,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr<Untyped>> {
        let lhs = self.parse_primary()?;
        self.parse_binary_tail(lhs)
    }

    /// If a binary operator follows, the rest of the expression becomes its
    /// right-hand side (there is no precedence climbing).
    fn parse_binary_tail(&mut self, lhs: Expr<Untyped>) -> Result<Expr<Untyped>> {
        let Some(op) = Self::binary_operator(self.peek().kind) else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_expr()?;
        let span = lhs.span.to(rhs.span);
        let kind = ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        Ok(Self::expr(kind, span))
    }

    fn parse_primary(&mut self) -> Result<Expr<Untyped>> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::String => ExprKind::String(extract::string(token, self.src)),
            TokenKind::EscapedString => {
                ExprKind::String(extract::escaped_string(token, self.src))
            }
            TokenKind::Number => {
                let Ok(parsed) = extract::int(token, self.src) else {
                    return Err(token.span().wrap(Error::ParseInt));
                };
                ExprKind::Const(Constant::Int(parsed))
            }
            TokenKind::Decimal => {
                let Ok(parsed) = extract::decimal(token, self.src) else {
                    return Err(token.span().wrap(Error::ParseFloat));
                };
                ExprKind::Const(Constant::Float(parsed))
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let end = self.consume(TokenKind::RParen)?;
                return Ok(Expr {
                    span: token.span().to(end.span()),
                    ..inner
                });
            }
            kind @ (TokenKind::PlusPlus
            | TokenKind::MinusMinus
            | TokenKind::Bang
            | TokenKind::Star
            | TokenKind::Minus) => {
                let op = match kind {
                    TokenKind::PlusPlus => UnaryOperator::Increment,
                    TokenKind::MinusMinus => UnaryOperator::Decrement,
                    TokenKind::Bang => UnaryOperator::Not,
                    TokenKind::Star => UnaryOperator::Deref,
                    TokenKind::Minus => UnaryOperator::Negate,
                    _ => unreachable!(),
                };
                let operand = if op == UnaryOperator::Negate && self.at_int_min_magnitude() {
                    // Only fits once negated; it wraps to the same bit pattern.
                    let literal = self.advance();
                    let lhs = Self::expr(ExprKind::Const(Constant::Int(i32::MIN)), literal.span());
                    self.parse_binary_tail(lhs)?
                } else {
                    self.parse_expr()?
                };
                let span = token.span().to(operand.span);
                let kind = ExprKind::Unary {
                    op,
                    expr: Box::new(operand),
                    postfix: false,
                };
                return Ok(Self::expr(kind, span));
            }
            TokenKind::Identifier => {
                let ident = Ident {
                    name: extract::ident(token, self.src),
                    span: token.span(),
                };
                return self.parse_ident_tail(ident);
            }
            other => {
                let error = Error::UnexpectedTokenInExpr { token: other };
                return Err(token.span().wrap(error));
            }
        };
        Ok(Self::expr(kind, token.span()))
    }

    /// Whether the current token is the literal `2147483648`.
    fn at_int_min_magnitude(&self) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Number
            && token.span().substr(self.src).parse::<i64>() == Ok(1 << 31)
    }

    /// Parses what may follow an identifier inside an expression: a call, an
    /// index or a postfix operator.
    fn parse_ident_tail(&mut self, ident: Ident) -> Result<Expr<Untyped>> {
        let start = ident.span;
        if self.take(TokenKind::LParen) {
            let args = self.parse_list(TokenKind::RParen, TokenKind::Comma, Parser::parse_expr)?;
            let end = self.consume(TokenKind::RParen)?;
            let kind = ExprKind::Call {
                function: ident,
                args,
            };
            return Ok(Self::expr(kind, start.to(end.span())));
        }
        if self.is(TokenKind::LBracket) {
            let (base, offset) = self.parse_indices(Self::variable(ident))?;
            let kind = Self::array_offset(base, offset);
            return Ok(Self::expr(kind, start.to(self.prev)));
        }
        let postfix = match self.peek().kind {
            TokenKind::PlusPlus => Some(UnaryOperator::Increment),
            TokenKind::MinusMinus => Some(UnaryOperator::Decrement),
            _ => None,
        };
        if let Some(op) = postfix {
            let end = self.advance();
            let kind = ExprKind::Unary {
                op,
                expr: Box::new(Self::variable(ident)),
                postfix: true,
            };
            return Ok(Self::expr(kind, start.to(end.span())));
        }
        Ok(Self::variable(ident))
    }

    /// Parses one or more `[expr]` suffixes after `base`. Every suffix but
    /// the last is folded into the returned base, so `g[i][j]` yields
    /// `(g[i], j)`.
    fn parse_indices(
        &mut self,
        mut base: Expr<Untyped>,
    ) -> Result<(Expr<Untyped>, Expr<Untyped>)> {
        loop {
            self.consume(TokenKind::LBracket)?;
            let offset = self.parse_expr()?;
            self.consume(TokenKind::RBracket)?;
            if !self.is(TokenKind::LBracket) {
                return Ok((base, offset));
            }
            let span = base.span.to(self.prev);
            base = Self::expr(Self::array_offset(base, offset), span);
        }
    }

    fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
        let op = match kind {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Sub,
            TokenKind::Star => BinaryOperator::Mul,
            TokenKind::Slash => BinaryOperator::Div,
            TokenKind::Percent => BinaryOperator::Rem,
            TokenKind::EqEq => BinaryOperator::Eq,
            TokenKind::NotEq => BinaryOperator::Ne,
            TokenKind::Less => BinaryOperator::Lt,
            TokenKind::Greater => BinaryOperator::Gt,
            TokenKind::LessEq => BinaryOperator::Le,
            TokenKind::GreaterEq => BinaryOperator::Ge,
            TokenKind::AndAnd => BinaryOperator::LogicalAnd,
            TokenKind::Amp => BinaryOperator::BitAnd,
            TokenKind::OrOr => BinaryOperator::LogicalOr,
            TokenKind::Pipe => BinaryOperator::BitOr,
            TokenKind::Caret => BinaryOperator::Xor,
            _ => return None,
        };
        Some(op)
    }

    /// Parses `item (separator item)*` until `end_delim` is found. Does
    /// **NOT** consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        separator: TokenKind,
        parse_item: impl Fn(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        debug_assert_ne!(end_delim, separator);

        let mut items = Vec::new();
        while self.except([end_delim]) {
            items.push(parse_item(self)?);

            if !self.take(separator) {
                if self.is(end_delim) {
                    break;
                }
                let c = self.peek();
                return Err(c.span().wrap(Error::UnexpectedAny {
                    actual: c.kind,
                    expected: Box::from([separator, end_delim]),
                }));
            }
        }
        Ok(items)
    }

    fn variable(ident: Ident) -> Expr<Untyped> {
        let span = ident.span;
        Self::expr(ExprKind::Variable(ident), span)
    }

    fn array_offset(base: Expr<Untyped>, offset: Expr<Untyped>) -> ExprKind<Untyped> {
        ExprKind::ArrayOffset {
            base: Box::new(base),
            offset: Box::new(offset),
        }
    }

    fn expr(kind: ExprKind<Untyped>, span: Span) -> Expr<Untyped> {
        Expr {
            kind,
            span,
            info: (),
        }
    }
}

impl Parser<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok [Token]) -> Parser<'src, 'tok> {
        let mut p = Parser {
            src,
            tokens,
            cursor: 0,
            prev: Span::new_of_length(0, 0, 1),
        };
        p.setup();
        p
    }

    /// Skips any leading trivia.
    fn setup(&mut self) {
        while self.peek().kind.is_trivia() {
            self.cursor += 1;
        }
    }

    /// Returns the current token.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => {
                let line = self.tokens.last().map_or(1, |t| t.span().line);
                Token::eof_for(self.src, line)
            }
        }
    }

    /// Returns the current token and advances. Skips any trivia.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        self.prev = c.span();
        while {
            self.cursor += 1;
            self.peek().kind.is_trivia()
        } {}
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one, returning it.
    /// If not, fails with an error.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        let c = self.peek();
        if self.is(expect) {
            self.advance();
            Ok(c)
        } else {
            Err(c.span().wrap(Error::Unexpected {
                actual: c.kind,
                expected: expect,
            }))
        }
    }

    /// Advances if the current token matches any of the provided tokens,
    /// returning the matched one. If not, fails with an error.
    fn consume_any(&mut self, expect: &'static [TokenKind]) -> Result<Token> {
        for t in expect {
            if self.is(*t) {
                return Ok(self.advance());
            }
        }
        let c = self.peek();
        Err(c.span().wrap(Error::UnexpectedAny {
            actual: c.kind,
            expected: Box::from(expect),
        }))
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    ///
    /// This won't advance the cursor.
    fn except(&self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek().kind;
        c != TokenKind::Eof && except.into_iter().all(|e| c != e)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected {expected}, found {actual}")]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    #[error("expected one of {}, found {actual}", list(.expected))]
    UnexpectedAny {
        actual: TokenKind,
        expected: Box<[TokenKind]>,
    },
    #[error("unexpected {token} in expression")]
    UnexpectedTokenInExpr { token: TokenKind },
    #[error("array size must be an integer literal, found {actual}")]
    InvalidArraySize { actual: TokenKind },
    #[error("integer literal out of range")]
    ParseInt,
    #[error("malformed decimal literal")]
    ParseFloat,
    #[error(transparent)]
    Lexer(lexer::Error),
}

fn list(kinds: &[TokenKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
