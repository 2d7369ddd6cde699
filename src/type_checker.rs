use std::collections::HashMap;

use tracing::debug;

use crate::{
    ast::{
        BinaryOperator, Expr, ExprKind, FunctionDefinition, GlobalDefinition, Ident, Item,
        Program, Stmt, StmtKind, Typed, UnaryOperator, Untyped,
    },
    token::{Span, Spanned},
    types::Type,
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// A function's declared parameter and return types.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Functions provided by the host through the module's `env` imports.
pub fn builtins() -> [(&'static str, Signature); 2] {
    [
        (
            "log",
            Signature {
                params: vec![Type::pointer_to(Type::Char)],
                ret: Type::Void,
            },
        ),
        (
            "logInt",
            Signature {
                params: vec![Type::Int],
                ret: Type::Void,
            },
        ),
    ]
}

pub struct Checker {
    functions: HashMap<Box<str>, Signature>,
    globals: HashMap<Box<str>, Type>,
    /// Variables visible in the function being checked. Blocks don't open a
    /// new scope: a nested declaration overwrites the outer one for the rest
    /// of the function.
    vars: HashMap<Box<str>, Type>,
    function: Box<str>,
    return_ty: Type,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker {
    pub fn new() -> Checker {
        Checker {
            functions: HashMap::with_capacity(16),
            globals: HashMap::with_capacity(16),
            vars: HashMap::with_capacity(32),
            function: Box::from(""),
            return_ty: Type::Void,
        }
    }

    /// Checks the whole program, producing its typed counterpart. The first
    /// error aborts the check.
    pub fn check(mut self, program: Program<Untyped>) -> Result<Program<Typed>> {
        self.register_functions(&program)?;

        let mut items = Vec::with_capacity(program.items.len());
        for item in program.items {
            let item = match item {
                Item::Global(global) => Item::Global(self.check_global(global)?),
                Item::Function(function) => Item::Function(self.check_function(function)?),
            };
            items.push(item);
        }
        debug!(functions = self.functions.len(), "checked program");
        Ok(Program { items })
    }

    /// Records every function signature (built-ins first) so that calls may
    /// refer to functions defined later in the source.
    fn register_functions(&mut self, program: &Program<Untyped>) -> Result<()> {
        for (name, signature) in builtins() {
            self.functions.insert(Box::from(name), signature);
        }
        for function in program.functions() {
            for param in &function.params {
                Self::ensure_not_void(&param.name, &param.ty)?;
            }
            let signature = Signature {
                params: function.params.iter().map(|p| p.ty.clone()).collect(),
                ret: function.return_ty.clone(),
            };
            let name = &function.name;
            if self.functions.insert(name.name.clone(), signature).is_some() {
                let error = Error::DuplicateFunction(name.name.clone());
                return Err(name.span.wrap(error));
            }
        }
        Ok(())
    }

    /// Globals are checked in source order, so an initializer only sees the
    /// globals defined before it.
    fn check_global(&mut self, global: GlobalDefinition<Untyped>) -> Result<GlobalDefinition<Typed>> {
        let GlobalDefinition {
            name,
            ty,
            initializer,
        } = global;
        Self::ensure_not_void(&name, &ty)?;
        if self.globals.contains_key(&name.name) {
            return Err(name.span.wrap(Error::DuplicateGlobal(name.name.clone())));
        }

        self.vars.clone_from(&self.globals);
        let initializer = initializer
            .map(|init| {
                let init = self.check_expr(init)?;
                Self::ensure_assignable(&ty, &init)?;
                Ok(init)
            })
            .transpose()?;

        self.globals.insert(name.name.clone(), ty.clone());
        Ok(GlobalDefinition {
            name,
            ty,
            initializer,
        })
    }

    fn check_function(
        &mut self,
        function: FunctionDefinition<Untyped>,
    ) -> Result<FunctionDefinition<Typed>> {
        let FunctionDefinition {
            name,
            return_ty,
            params,
            body,
        } = function;

        self.vars.clone_from(&self.globals);
        for param in &params {
            self.vars.insert(param.name.name.clone(), param.ty.clone());
        }
        self.function.clone_from(&name.name);
        self.return_ty = return_ty.clone();

        let body = self.check_block(body)?;
        debug!(function = %name, locals = self.vars.len(), "checked function");
        Ok(FunctionDefinition {
            name,
            return_ty,
            params,
            body,
        })
    }

    fn check_block(&mut self, body: Vec<Stmt<Untyped>>) -> Result<Vec<Stmt<Typed>>> {
        body.into_iter().map(|stmt| self.check_stmt(stmt)).collect()
    }

    fn check_boxed_stmt(&mut self, stmt: Option<Box<Stmt<Untyped>>>) -> Result<Option<Box<Stmt<Typed>>>> {
        stmt.map(|stmt| self.check_stmt(*stmt).map(Box::new))
            .transpose()
    }

    fn check_stmt(&mut self, stmt: Stmt<Untyped>) -> Result<Stmt<Typed>> {
        let span = stmt.span;
        let kind = match stmt.kind {
            StmtKind::Return(None) => {
                if self.return_ty != Type::Void {
                    let error = Error::MissingReturnValue(self.return_ty.clone());
                    return Err(span.wrap(error));
                }
                StmtKind::Return(None)
            }
            StmtKind::Return(Some(value)) => {
                if self.return_ty == Type::Void {
                    let error = Error::UnexpectedReturnValue(self.function.clone());
                    return Err(value.span.wrap(error));
                }
                let value = self.check_expr(value)?;
                Self::ensure_assignable(&self.return_ty, &value)?;
                StmtKind::Return(Some(value))
            }
            StmtKind::SetLocalVar { target, value } => {
                let target_ty = self.lookup(&target)?;
                let value = self.check_expr(value)?;
                Self::ensure_assignable(&target_ty, &value)?;
                StmtKind::SetLocalVar { target, value }
            }
            StmtKind::DeclareVar {
                name,
                ty,
                initializer,
            } => {
                Self::ensure_not_void(&name, &ty)?;
                // Visible from its own initializer onwards.
                self.vars.insert(name.name.clone(), ty.clone());
                let initializer = initializer
                    .map(|init| {
                        let init = self.check_expr(init)?;
                        Self::ensure_assignable(&ty, &init)?;
                        Ok(init)
                    })
                    .transpose()?;
                StmtKind::DeclareVar {
                    name,
                    ty,
                    initializer,
                }
            }
            StmtKind::SetArray {
                base,
                offset,
                value,
            } => {
                let base = self.check_expr(base)?;
                let element = Self::element_of(&base)?.clone();
                if let Type::Array(..) = element {
                    return Err(span.wrap(Error::ArrayStore(element)));
                }
                let offset = self.check_index(offset)?;
                let value = self.check_expr(value)?;
                Self::ensure_assignable(&element, &value)?;
                StmtKind::SetArray {
                    base,
                    offset,
                    value,
                }
            }
            StmtKind::If {
                cond,
                body,
                else_body,
            } => StmtKind::If {
                cond: self.check_cond(cond)?,
                body: self.check_block(body)?,
                else_body: self.check_block(else_body)?,
            },
            StmtKind::Loop { kind, cond, body } => StmtKind::Loop {
                kind,
                cond: self.check_cond(cond)?,
                body: self.check_block(body)?,
            },
            StmtKind::For {
                decl,
                cond,
                update,
                body,
            } => StmtKind::For {
                decl: self.check_boxed_stmt(decl)?,
                cond: cond.map(|cond| self.check_cond(cond)).transpose()?,
                update: self.check_boxed_stmt(update)?,
                body: self.check_block(body)?,
            },
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::Break => StmtKind::Break,
            StmtKind::Expr(expr) => StmtKind::Expr(self.check_expr(expr)?),
        };
        Ok(Stmt { kind, span })
    }

    fn check_expr(&mut self, expr: Expr<Untyped>) -> Result<Expr<Typed>> {
        let span = expr.span;
        let (kind, ty) = match expr.kind {
            ExprKind::Const(constant) => (ExprKind::Const(constant), constant.ty()),
            ExprKind::String(val) => (ExprKind::String(val), Type::pointer_to(Type::Char)),
            ExprKind::Variable(ident) => {
                let ty = self.lookup(&ident)?;
                (ExprKind::Variable(ident), ty)
            }
            ExprKind::Call { function, args } => {
                let Some(signature) = self.functions.get(&function.name).cloned() else {
                    let error = Error::UndefinedFunction(function.name.clone());
                    return Err(function.span.wrap(error));
                };
                if signature.params.len() != args.len() {
                    let error = Error::IncorrectNumberOfArguments {
                        function: function.name.clone(),
                        expected: signature.params.len(),
                        actual: args.len(),
                    };
                    return Err(span.wrap(error));
                }
                let args = args
                    .into_iter()
                    .zip(&signature.params)
                    .map(|(arg, param_ty)| {
                        let arg = self.check_expr(arg)?;
                        Self::ensure_assignable(param_ty, &arg)?;
                        Ok(arg)
                    })
                    .collect::<Result<Vec<_>>>()?;
                (ExprKind::Call { function, args }, signature.ret)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expr(*lhs)?;
                let rhs = self.check_expr(*rhs)?;
                let ty = Self::binary_type(op, span, lhs.ty(), rhs.ty())?;
                let kind = ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (kind, ty)
            }
            ExprKind::Unary { op, expr, postfix } => {
                let operand = self.check_expr(*expr)?;
                let ty = Self::unary_type(op, span, &operand)?;
                let kind = ExprKind::Unary {
                    op,
                    expr: Box::new(operand),
                    postfix,
                };
                (kind, ty)
            }
            ExprKind::ArrayOffset { base, offset } => {
                let base = self.check_expr(*base)?;
                let element = Self::element_of(&base)?.clone();
                let offset = self.check_index(*offset)?;
                let kind = ExprKind::ArrayOffset {
                    base: Box::new(base),
                    offset: Box::new(offset),
                };
                (kind, element)
            }
        };
        Ok(Expr {
            kind,
            span,
            info: ty,
        })
    }

    fn check_index(&mut self, offset: Expr<Untyped>) -> Result<Expr<Typed>> {
        let offset = self.check_expr(offset)?;
        if !offset.ty().is_integral() {
            let error = Error::NonIntegralIndex(offset.ty().clone());
            return Err(offset.span.wrap(error));
        }
        Ok(offset)
    }

    /// Conditions are tested as `i32` values.
    fn check_cond(&mut self, cond: Expr<Untyped>) -> Result<Expr<Typed>> {
        let cond = self.check_expr(cond)?;
        if matches!(cond.ty(), Type::Float | Type::Void) {
            let error = Error::InvalidCondition(cond.ty().clone());
            return Err(cond.span.wrap(error));
        }
        Ok(cond)
    }

    fn lookup(&self, ident: &Ident) -> Result<Type> {
        match self.vars.get(&ident.name) {
            Some(ty) => Ok(ty.clone()),
            None => Err(ident.span.wrap(Error::UndefinedName(ident.name.clone()))),
        }
    }

    fn binary_type(op: BinaryOperator, span: Span, lhs: &Type, rhs: &Type) -> Result<Type> {
        for ty in [lhs, rhs] {
            let float_ok = op.is_comparison()
                || matches!(
                    op,
                    BinaryOperator::Add
                        | BinaryOperator::Sub
                        | BinaryOperator::Mul
                        | BinaryOperator::Div
                );
            if *ty == Type::Void || (*ty == Type::Float && !float_ok) {
                let error = Error::InvalidOperand {
                    op: op.symbol(),
                    ty: ty.clone(),
                };
                return Err(span.wrap(error));
            }
        }

        let compatible = lhs == rhs
            || (lhs.is_integral() && rhs.is_integral())
            || (lhs.is_indexable()
                && rhs.is_integral()
                && matches!(op, BinaryOperator::Add | BinaryOperator::Sub));
        if !compatible {
            let error = Error::IncompatibleOperands {
                op: op.symbol(),
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            };
            return Err(span.wrap(error));
        }

        if op.is_comparison() {
            Ok(Type::Int)
        } else {
            Ok(lhs.clone())
        }
    }

    fn unary_type(op: UnaryOperator, span: Span, operand: &Expr<Typed>) -> Result<Type> {
        let ty = operand.ty();
        let invalid = || {
            span.wrap(Error::InvalidOperand {
                op: op.symbol(),
                ty: ty.clone(),
            })
        };
        match op {
            UnaryOperator::Increment | UnaryOperator::Decrement => {
                if !matches!(operand.kind, ExprKind::Variable(_)) {
                    return Err(span.wrap(Error::NotAssignable(op.symbol())));
                }
                if !matches!(ty, Type::Int | Type::Char | Type::Float) {
                    return Err(invalid());
                }
                Ok(ty.clone())
            }
            UnaryOperator::Not => match ty {
                Type::Float | Type::Void => Err(invalid()),
                _ => Ok(Type::Int),
            },
            UnaryOperator::Deref => ty.wrapped().cloned().ok_or_else(invalid),
            UnaryOperator::Negate => match ty {
                Type::Int | Type::Char | Type::Float => Ok(ty.clone()),
                _ => Err(invalid()),
            },
        }
    }

    fn element_of(base: &Expr<Typed>) -> Result<&Type> {
        base.ty()
            .wrapped()
            .ok_or_else(|| base.span.wrap(Error::NotIndexable(base.ty().clone())))
    }

    fn ensure_not_void(name: &Ident, ty: &Type) -> Result<()> {
        if *ty == Type::Void {
            return Err(name.span.wrap(Error::VoidVariable(name.name.clone())));
        }
        Ok(())
    }

    fn ensure_assignable(target: &Type, value: &Expr<Typed>) -> Result<()> {
        if is_assignable(target, value.ty()) {
            return Ok(());
        }
        let error = Error::Mismatch {
            expected: target.clone(),
            actual: value.ty().clone(),
        };
        Err(value.span.wrap(error))
    }
}

/// Whether a value of type `value` may be stored where `target` is expected.
///
/// Besides identical types, `int` and `char` are interchangeable (both are
/// plain `i32` values and there are no character literals) and an array may
/// be passed where a pointer to its element type is expected.
pub fn is_assignable(target: &Type, value: &Type) -> bool {
    if target == value || (target.is_integral() && value.is_integral()) {
        return true;
    }
    matches!((target, value), (Type::Pointer(t), Type::Array(v, _)) if t == v)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("undefined name `{0}`")]
    UndefinedName(Box<str>),
    #[error("undefined function `{0}`")]
    UndefinedFunction(Box<str>),
    #[error("function `{0}` is already defined")]
    DuplicateFunction(Box<str>),
    #[error("global `{0}` is already defined")]
    DuplicateGlobal(Box<str>),
    #[error("`{function}` takes {expected} argument(s) but {actual} were supplied")]
    IncorrectNumberOfArguments {
        function: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("mismatched types: expected `{expected}`, found `{actual}`")]
    Mismatch { expected: Type, actual: Type },
    #[error("cannot apply `{op}` to `{lhs}` and `{rhs}`")]
    IncompatibleOperands {
        op: &'static str,
        lhs: Type,
        rhs: Type,
    },
    #[error("cannot apply `{op}` to `{ty}`")]
    InvalidOperand { op: &'static str, ty: Type },
    #[error("`{0}` can only be applied to a variable")]
    NotAssignable(&'static str),
    #[error("type `{0}` cannot be indexed")]
    NotIndexable(Type),
    #[error("index must be an integer, found `{0}`")]
    NonIntegralIndex(Type),
    #[error("condition must be an integer or a pointer, found `{0}`")]
    InvalidCondition(Type),
    #[error("missing return value in function returning `{0}`")]
    MissingReturnValue(Type),
    #[error("void function `{0}` cannot return a value")]
    UnexpectedReturnValue(Box<str>),
    #[error("`{0}` cannot have type `void`")]
    VoidVariable(Box<str>),
    #[error("cannot store into a whole row of type `{0}`")]
    ArrayStore(Type),
}
