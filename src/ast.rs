// program     ::= (global | function)*
// global      ::= type ID ['=' expr] ';'
// function    ::= type ID '(' [type ID (',' type ID)*] ')' '{' stmt* '}'
// type        ::= ('int' | 'float' | 'char' | 'void') '*'*
// stmt        ::= 'return' [expr] ';'
//               | 'if' '(' expr ')' block ['else' ('if' ... | block)]
//               | 'while' '(' expr ')' block
//               | 'do' block 'while' '(' expr ')' ';'
//               | 'for' '(' [simple] ';' [expr] ';' [simple] ')' block
//               | 'continue' ';'
//               | 'break' ';'
//               | simple ';'
// simple      ::= type ID ('[' NUMBER ']')* ['=' expr]
//               | ID '=' expr
//               | ID '[' expr ']' '=' expr
//               | expr
// block       ::= '{' stmt* '}'
// expr        ::= primary [binop expr]
// primary     ::= STRING | NUMBER | DECIMAL
//               | '(' expr ')'
//               | ('++' | '--' | '!' | '*' | '-') expr
//               | ID ['(' [expr (',' expr)*] ')' | '[' expr ']' | '++' | '--']
//
// There is no precedence: the operator chain after a primary is parsed
// right-recursively, so `a - b - c` is `a - (b - c)`.

use std::fmt;

use crate::{token::Span, types::Type};

/// Describes which extra information the tree carries for each phase.
pub trait Info {
    type Expr: fmt::Debug + PartialEq + Clone;
}

/// The tree as produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub struct Untyped;

impl Info for Untyped {
    type Expr = ();
}

/// The tree as produced by the type checker; every expression knows its type.
#[derive(Clone, Debug, PartialEq)]
pub struct Typed;

impl Info for Typed {
    type Expr = Type;
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program<I: Info = Untyped> {
    pub items: Vec<Item<I>>,
}

impl<I: Info> Default for Program<I> {
    fn default() -> Self {
        Program { items: Vec::new() }
    }
}

impl<I: Info> Program<I> {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition<I>> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(function) => Some(function),
            Item::Global(_) => None,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Item<I: Info = Untyped> {
    Global(GlobalDefinition<I>),
    Function(FunctionDefinition<I>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct GlobalDefinition<I: Info = Untyped> {
    pub name: Ident,
    pub ty: Type,
    pub initializer: Option<Expr<I>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionParam {
    pub name: Ident,
    pub ty: Type,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionDefinition<I: Info = Untyped> {
    pub name: Ident,
    pub return_ty: Type,
    pub params: Vec<FunctionParam>,
    pub body: Vec<Stmt<I>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Stmt<I: Info = Untyped> {
    pub kind: StmtKind<I>,
    pub span: Span,
}

#[derive(Debug, PartialEq, Clone)]
pub enum StmtKind<I: Info = Untyped> {
    Return(Option<Expr<I>>),
    SetLocalVar {
        target: Ident,
        value: Expr<I>,
    },
    DeclareVar {
        name: Ident,
        ty: Type,
        initializer: Option<Expr<I>>,
    },
    SetArray {
        base: Expr<I>,
        offset: Expr<I>,
        value: Expr<I>,
    },
    If {
        cond: Expr<I>,
        body: Vec<Stmt<I>>,
        /// Empty when there is no `else`. An `else if` is a single nested
        /// `If` statement.
        else_body: Vec<Stmt<I>>,
    },
    Loop {
        kind: LoopKind,
        cond: Expr<I>,
        body: Vec<Stmt<I>>,
    },
    For {
        decl: Option<Box<Stmt<I>>>,
        cond: Option<Expr<I>>,
        update: Option<Box<Stmt<I>>>,
        body: Vec<Stmt<I>>,
    },
    Continue,
    Break,
    /// An expression whose value is discarded.
    Expr(Expr<I>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopKind {
    /// Tests the condition before each iteration.
    While,
    /// Runs the body once before the first test.
    DoWhile,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Expr<I: Info = Untyped> {
    pub kind: ExprKind<I>,
    pub span: Span,
    pub info: I::Expr,
}

impl Expr<Typed> {
    pub fn ty(&self) -> &Type {
        &self.info
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum ExprKind<I: Info = Untyped> {
    Const(Constant),
    /// Always typed `*char`.
    String(Box<str>),
    Variable(Ident),
    Call {
        function: Ident,
        args: Vec<Expr<I>>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr<I>>,
        rhs: Box<Expr<I>>,
    },
    Unary {
        op: UnaryOperator,
        expr: Box<Expr<I>>,
        postfix: bool,
    },
    ArrayOffset {
        base: Box<Expr<I>>,
        offset: Box<Expr<I>>,
    },
}

/// A numeric literal. Its type follows from its lexical shape.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
}

impl Constant {
    pub fn ty(self) -> Type {
        match self {
            Constant::Int(_) => Type::Int,
            Constant::Float(_) => Type::Float,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Increment,
    Decrement,
    Not,
    Deref,
    Negate,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Increment => "++",
            UnaryOperator::Decrement => "--",
            UnaryOperator::Not => "!",
            UnaryOperator::Deref => "*",
            UnaryOperator::Negate => "-",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    /// `&&`
    LogicalAnd,
    /// `&`
    BitAnd,
    /// `||`
    LogicalOr,
    /// `|`
    BitOr,
    Xor,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            LogicalAnd => "&&",
            BitAnd => "&",
            LogicalOr => "||",
            BitOr => "|",
            Xor => "^",
        }
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Ne | Lt | Gt | Le | Ge)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Ident {
    pub name: Box<str>,
    pub span: Span,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
