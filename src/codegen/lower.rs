use std::collections::HashMap;

use tracing::{debug, trace};

use super::{
    wasm::{DataSegment, Function, Instr, Module, ValType, PAGE_SIZE},
    Error, Result,
};
use crate::{
    ast::{
        BinaryOperator, Constant, Expr, ExprKind, FunctionDefinition, GlobalDefinition, Ident,
        LoopKind, Stmt, StmtKind, Typed, UnaryOperator,
    },
    token::Span,
    types::Type,
};

/// Maps a source type to the machine type of values of that type. Pointers
/// and arrays are `i32` addresses.
pub fn val_type(ty: &Type) -> ValType {
    match ty {
        Type::Float => ValType::F32,
        _ => ValType::I32,
    }
}

/// Program-wide state: the linear memory cursor and where each global lives.
pub struct Compiler {
    /// Next free byte of linear memory. Offset 0 is never handed out.
    cursor: u32,
    data: Vec<DataSegment>,
    /// Address of the 4-byte cell backing each global.
    globals: HashMap<Box<str>, (u32, Type)>,
    /// Address of each string literal, keyed by its source offset. Loop
    /// conditions are lowered twice and must not allocate twice.
    strings: HashMap<usize, u32>,
    functions: Vec<Function>,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            cursor: 1,
            data: Vec::with_capacity(16),
            globals: HashMap::with_capacity(16),
            strings: HashMap::with_capacity(16),
            functions: Vec::with_capacity(16),
        }
    }

    pub fn finish(mut self) -> Module {
        self.data.sort_by_key(|segment| segment.offset);
        debug!(
            data = self.data.len(),
            functions = self.functions.len(),
            memory = self.cursor,
            "generated module"
        );
        Module {
            data: self.data,
            functions: self.functions,
        }
    }

    /// Hands out `len` bytes of linear memory.
    fn alloc(&mut self, len: u32, span: Span) -> Result<u32> {
        let offset = self.cursor;
        match offset.checked_add(len) {
            Some(end) if end <= PAGE_SIZE => self.cursor = end,
            _ => {
                let error = Error::OutOfMemory {
                    cursor: offset,
                    requested: len,
                };
                return Err(span.wrap(error));
            }
        }
        trace!(offset, len, "allocated linear memory");
        Ok(offset)
    }

    /// Places a null-terminated copy of `val` in memory, returning its
    /// address.
    fn alloc_string(&mut self, val: &str, span: Span) -> Result<u32> {
        if let Some(&offset) = self.strings.get(&span.lo) {
            return Ok(offset);
        }
        let mut bytes = Vec::with_capacity(val.len() + 1);
        bytes.extend_from_slice(val.as_bytes());
        bytes.push(0);
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        let offset = self.alloc(len, span)?;
        self.data.push(DataSegment { offset, bytes });
        self.strings.insert(span.lo, offset);
        Ok(offset)
    }

    /// Reserves backing storage for an array variable, returning its address.
    fn alloc_array(&mut self, ty: &Type, span: Span) -> Result<u32> {
        if *ty.base() == Type::Float {
            return Err(span.wrap(Error::UnsupportedElementType(Type::Float)));
        }
        self.alloc(ty.byte_len(), span)
    }

    pub fn global(&mut self, global: &GlobalDefinition<Typed>) -> Result<()> {
        let span = global.name.span;
        let cell = self.alloc(4, span)?;
        let init = match (&global.ty, &global.initializer) {
            (Type::Array(..), Some(init)) => {
                return Err(init.span.wrap(Error::ArrayInitializer));
            }
            (Type::Array(..), None) => {
                let storage = self.alloc_array(&global.ty, span)?;
                Some(storage.to_le_bytes())
            }
            (_, Some(init)) => Some(self.global_initializer(&global.name, init)?),
            (_, None) => None,
        };
        if let Some(bytes) = init {
            self.data.push(DataSegment {
                offset: cell,
                bytes: bytes.to_vec(),
            });
        }
        trace!(name = %global.name, cell, "placed global");
        self.globals
            .insert(global.name.name.clone(), (cell, global.ty.clone()));
        Ok(())
    }

    /// Evaluates a global initializer to the little-endian bytes of its cell.
    fn global_initializer(&mut self, name: &Ident, init: &Expr<Typed>) -> Result<[u8; 4]> {
        let bytes = match &init.kind {
            ExprKind::Const(Constant::Int(val)) => val.to_le_bytes(),
            ExprKind::Const(Constant::Float(val)) => val.to_le_bytes(),
            ExprKind::String(val) => self.alloc_string(val, init.span)?.to_le_bytes(),
            ExprKind::Unary {
                op: UnaryOperator::Negate,
                expr,
                ..
            } => match expr.kind {
                ExprKind::Const(Constant::Int(val)) => val.wrapping_neg().to_le_bytes(),
                ExprKind::Const(Constant::Float(val)) => (-val).to_le_bytes(),
                _ => return Err(init.span.wrap(Error::NonConstantGlobal(name.name.clone()))),
            },
            _ => return Err(init.span.wrap(Error::NonConstantGlobal(name.name.clone()))),
        };
        Ok(bytes)
    }

    pub fn function(&mut self, function: &FunctionDefinition<Typed>) -> Result<()> {
        let generated = FunctionGen::new(self, function).generate(function)?;
        debug!(
            function = %generated.name,
            locals = generated.locals.len(),
            instrs = generated.body.len(),
            "generated function"
        );
        self.functions.push(generated);
        Ok(())
    }
}

/// What a branch may target inside the current function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Label {
    /// A structured block no `break`/`continue` refers to.
    Plain,
    /// Branching here leaves the innermost loop.
    Break,
    /// Branching here skips the rest of the innermost loop's body.
    Continue,
}

struct FunctionGen<'c> {
    compiler: &'c mut Compiler,
    /// Machine type of every slot, parameters first.
    slots: Vec<ValType>,
    param_count: usize,
    /// The most recent slot declared under each name.
    names: HashMap<Box<str>, u32>,
    /// One entry per enclosing `block`, `loop` or `if`, innermost last.
    labels: Vec<Label>,
    body: Vec<Instr>,
    has_return: bool,
}

impl<'c> FunctionGen<'c> {
    fn new(compiler: &'c mut Compiler, function: &FunctionDefinition<Typed>) -> FunctionGen<'c> {
        let mut generator = FunctionGen {
            compiler,
            slots: Vec::with_capacity(function.params.len() + 8),
            param_count: function.params.len(),
            names: HashMap::with_capacity(16),
            labels: Vec::with_capacity(8),
            body: Vec::with_capacity(64),
            has_return: false,
        };
        for param in &function.params {
            generator.declare(&param.name, &param.ty);
        }
        generator
    }

    fn generate(mut self, function: &FunctionDefinition<Typed>) -> Result<Function> {
        self.block(&function.body)?;

        if function.return_ty != Type::Void {
            if !self.has_return {
                let error = Error::MissingReturn(function.name.name.clone());
                return Err(function.name.span.wrap(error));
            }
            let ends_in_return = matches!(
                function.body.last(),
                Some(Stmt {
                    kind: StmtKind::Return(_),
                    ..
                })
            );
            if !ends_in_return {
                self.emit(Instr::Unreachable);
            }
        }

        let result = (function.return_ty != Type::Void).then(|| val_type(&function.return_ty));
        Ok(Function {
            name: function.name.name.clone(),
            params: self.slots[..self.param_count].to_vec(),
            result,
            locals: self.slots[self.param_count..].to_vec(),
            body: self.body,
        })
    }

    fn block(&mut self, body: &[Stmt<Typed>]) -> Result<()> {
        for stmt in body {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt<Typed>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
                self.emit(Instr::Return);
                self.has_return = true;
            }
            StmtKind::SetLocalVar { target, value } => self.set_var(target, value)?,
            StmtKind::DeclareVar {
                name,
                ty,
                initializer,
            } => {
                if let Type::Array(..) = ty {
                    if let Some(init) = initializer {
                        return Err(init.span.wrap(Error::ArrayInitializer));
                    }
                    let storage = self.compiler.alloc_array(ty, stmt.span)?;
                    let slot = self.declare(name, ty);
                    self.emit(Instr::I32Const(i32_of(storage)));
                    self.emit(Instr::LocalSet(slot));
                } else {
                    let slot = self.declare(name, ty);
                    if let Some(init) = initializer {
                        self.expr(init)?;
                        self.emit(Instr::LocalSet(slot));
                    }
                }
            }
            StmtKind::SetArray {
                base,
                offset,
                value,
            } => {
                self.address(base, offset)?;
                self.expr(value)?;
                self.emit(Instr::Store8);
            }
            StmtKind::If {
                cond,
                body,
                else_body,
            } => {
                self.expr(cond)?;
                self.open(Instr::If, Label::Plain);
                self.block(body)?;
                if !else_body.is_empty() {
                    self.emit(Instr::Else);
                    self.block(else_body)?;
                }
                self.close();
            }
            StmtKind::Loop {
                kind: LoopKind::While,
                cond,
                body,
            } => self.while_loop(Some(cond), body, None)?,
            StmtKind::Loop {
                kind: LoopKind::DoWhile,
                cond,
                body,
            } => {
                let needs_block = contains(body, &StmtKind::Break);
                if needs_block {
                    self.open(Instr::Block, Label::Break);
                }
                self.do_while(Some(cond), body, None)?;
                if needs_block {
                    self.close();
                }
            }
            StmtKind::For {
                decl,
                cond,
                update,
                body,
            } => {
                if let Some(decl) = decl {
                    self.stmt(decl)?;
                }
                self.while_loop(cond.as_ref(), body, update.as_deref())?;
            }
            StmtKind::Continue => {
                let depth = self.depth_of(Label::Continue);
                let depth = depth.ok_or_else(|| stmt.span.wrap(Error::ContinueOutsideLoop))?;
                self.emit(Instr::Br(depth));
            }
            StmtKind::Break => {
                let depth = self.depth_of(Label::Break);
                let depth = depth.ok_or_else(|| stmt.span.wrap(Error::BreakOutsideLoop))?;
                self.emit(Instr::Br(depth));
            }
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Unary {
                    op: op @ (UnaryOperator::Increment | UnaryOperator::Decrement),
                    expr: operand,
                    postfix,
                } => self.increment(*op, operand, *postfix, false)?,
                _ => {
                    self.expr(expr)?;
                    if *expr.ty() != Type::Void {
                        self.emit(Instr::Drop);
                    }
                }
            },
        }
        Ok(())
    }

    /// `cond; if; <do-while>; end`. A missing condition is always true. The
    /// `if` is the `break` target.
    fn while_loop(
        &mut self,
        cond: Option<&Expr<Typed>>,
        body: &[Stmt<Typed>],
        update: Option<&Stmt<Typed>>,
    ) -> Result<()> {
        self.cond(cond)?;
        self.open(Instr::If, Label::Break);
        self.do_while(cond, body, update)?;
        self.close();
        Ok(())
    }

    /// `loop; <body>; <update>; <cond>; br_if 0; end`. A body that uses
    /// `continue` is wrapped in a `block` so that `continue` lands just
    /// before the update.
    fn do_while(
        &mut self,
        cond: Option<&Expr<Typed>>,
        body: &[Stmt<Typed>],
        update: Option<&Stmt<Typed>>,
    ) -> Result<()> {
        self.open(Instr::Loop, Label::Plain);
        if contains(body, &StmtKind::Continue) {
            self.open(Instr::Block, Label::Continue);
            self.block(body)?;
            self.close();
        } else {
            self.block(body)?;
        }
        if let Some(update) = update {
            self.stmt(update)?;
        }
        self.cond(cond)?;
        self.emit(Instr::BrIf(0));
        self.close();
        Ok(())
    }

    fn cond(&mut self, cond: Option<&Expr<Typed>>) -> Result<()> {
        match cond {
            Some(cond) => self.expr(cond),
            None => {
                self.emit(Instr::I32Const(1));
                Ok(())
            }
        }
    }

    /// Pushes the value of `expr`, if it has one.
    fn expr(&mut self, expr: &Expr<Typed>) -> Result<()> {
        match &expr.kind {
            ExprKind::Const(Constant::Int(val)) => self.emit(Instr::I32Const(*val)),
            ExprKind::Const(Constant::Float(val)) => self.emit(Instr::F32Const(*val)),
            ExprKind::String(val) => {
                let offset = self.compiler.alloc_string(val, expr.span)?;
                self.emit(Instr::I32Const(i32_of(offset)));
            }
            ExprKind::Variable(ident) => match self.resolve(ident)? {
                Place::Local(slot) => self.emit(Instr::LocalGet(slot)),
                Place::Global(cell, ty) => {
                    self.emit(Instr::I32Const(i32_of(cell)));
                    self.emit(Instr::Load(ty));
                }
            },
            ExprKind::Call { function, args } => {
                for arg in args {
                    self.expr(arg)?;
                }
                self.emit(Instr::Call(function.name.clone()));
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                let ty = val_type(lhs.ty());
                let Some(op_name) = opcode(*op, ty) else {
                    let error = Error::UnsupportedOperator {
                        op: op.symbol(),
                        ty: lhs.ty().clone(),
                    };
                    return Err(expr.span.wrap(error));
                };
                self.emit(Instr::Numeric { ty, op: op_name });
            }
            ExprKind::Unary {
                op,
                expr: operand,
                postfix,
            } => self.unary(*op, operand, *postfix, expr.span)?,
            ExprKind::ArrayOffset { base, offset } => {
                self.address(base, offset)?;
                // A row of a multi-dimensional array is its own address.
                if !matches!(expr.ty(), Type::Array(..)) {
                    self.emit(Instr::Load8S);
                }
            }
        }
        Ok(())
    }

    fn unary(
        &mut self,
        op: UnaryOperator,
        operand: &Expr<Typed>,
        postfix: bool,
        span: Span,
    ) -> Result<()> {
        let ty = val_type(operand.ty());
        let unsupported = || {
            span.wrap(Error::UnsupportedUnary {
                op: op.symbol(),
                ty: operand.ty().clone(),
            })
        };
        match op {
            UnaryOperator::Increment | UnaryOperator::Decrement => {
                return self.increment(op, operand, postfix, true);
            }
            UnaryOperator::Not => {
                if ty != ValType::I32 {
                    return Err(unsupported());
                }
                self.expr(operand)?;
                self.emit(Instr::i32("eqz"));
            }
            UnaryOperator::Deref => {
                match operand.ty().wrapped() {
                    Some(Type::Float) => {
                        return Err(span.wrap(Error::UnsupportedElementType(Type::Float)));
                    }
                    Some(Type::Array(..)) => return self.expr(operand),
                    Some(_) => {}
                    None => return Err(unsupported()),
                }
                self.expr(operand)?;
                self.emit(Instr::Load8S);
            }
            UnaryOperator::Negate => match ty {
                ValType::I32 => {
                    self.emit(Instr::I32Const(0));
                    self.expr(operand)?;
                    self.emit(Instr::i32("sub"));
                }
                ValType::F32 => {
                    self.expr(operand)?;
                    self.emit(Instr::Numeric { ty, op: "neg" });
                }
            },
        }
        Ok(())
    }

    /// Lowers `++`/`--`. When `used`, the expression's value (the old one for
    /// postfix, the new one for prefix) is left on the stack.
    fn increment(
        &mut self,
        op: UnaryOperator,
        operand: &Expr<Typed>,
        postfix: bool,
        used: bool,
    ) -> Result<()> {
        let ExprKind::Variable(ident) = &operand.kind else {
            let error = Error::UnsupportedUnary {
                op: op.symbol(),
                ty: operand.ty().clone(),
            };
            return Err(operand.span.wrap(error));
        };
        let ty = val_type(operand.ty());
        let one = match ty {
            ValType::I32 => Instr::I32Const(1),
            ValType::F32 => Instr::F32Const(1.0),
        };
        let step = Instr::Numeric {
            ty,
            op: if op == UnaryOperator::Increment { "add" } else { "sub" },
        };

        match self.resolve(ident)? {
            Place::Local(slot) => {
                self.emit(Instr::LocalGet(slot));
                if used && postfix {
                    self.emit(Instr::LocalGet(slot));
                }
                self.emit(one);
                self.emit(step);
                if used && !postfix {
                    self.emit(Instr::LocalTee(slot));
                } else {
                    self.emit(Instr::LocalSet(slot));
                }
            }
            Place::Global(cell, ty) => {
                let cell = i32_of(cell);
                self.emit(Instr::I32Const(cell));
                self.emit(Instr::I32Const(cell));
                self.emit(Instr::Load(ty));
                let scratch = used.then(|| self.scratch(ty));
                if let (Some(scratch), true) = (scratch, postfix) {
                    self.emit(Instr::LocalTee(scratch));
                }
                self.emit(one);
                self.emit(step);
                if let (Some(scratch), false) = (scratch, postfix) {
                    self.emit(Instr::LocalTee(scratch));
                }
                self.emit(Instr::Store(ty));
                if let Some(scratch) = scratch {
                    self.emit(Instr::LocalGet(scratch));
                }
            }
        }
        Ok(())
    }

    fn set_var(&mut self, target: &Ident, value: &Expr<Typed>) -> Result<()> {
        match self.resolve(target)? {
            Place::Local(slot) => {
                self.expr(value)?;
                self.emit(Instr::LocalSet(slot));
            }
            Place::Global(cell, ty) => {
                self.emit(Instr::I32Const(i32_of(cell)));
                self.expr(value)?;
                self.emit(Instr::Store(ty));
            }
        }
        Ok(())
    }

    /// Pushes `base + offset`. Elements are one byte wide.
    /// Pushes `base + offset * stride`, where the stride is one byte for
    /// scalar elements and the full row size for nested arrays.
    fn address(&mut self, base: &Expr<Typed>, offset: &Expr<Typed>) -> Result<()> {
        let stride = match base.ty().wrapped() {
            Some(Type::Float) => {
                return Err(base.span.wrap(Error::UnsupportedElementType(Type::Float)));
            }
            Some(row @ Type::Array(..)) => row.byte_len(),
            _ => 1,
        };
        self.expr(base)?;
        self.expr(offset)?;
        if stride != 1 {
            self.emit(Instr::I32Const(i32_of(stride)));
            self.emit(Instr::i32("mul"));
        }
        self.emit(Instr::i32("add"));
        Ok(())
    }

    fn resolve(&self, ident: &Ident) -> Result<Place> {
        if let Some(&slot) = self.names.get(&ident.name) {
            return Ok(Place::Local(slot));
        }
        match self.compiler.globals.get(&ident.name) {
            Some((cell, ty)) => Ok(Place::Global(*cell, val_type(ty))),
            None => Err(ident.span.wrap(Error::UnresolvedLocal(ident.name.clone()))),
        }
    }

    /// Gives `name` a fresh slot. Slots are never reused.
    fn declare(&mut self, name: &Ident, ty: &Type) -> u32 {
        let slot = self.scratch(val_type(ty));
        self.names.insert(name.name.clone(), slot);
        trace!(name = %name, slot, ty = %ty, "declared local");
        slot
    }

    /// Allocates an anonymous slot.
    fn scratch(&mut self, ty: ValType) -> u32 {
        let slot = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(ty);
        slot
    }

    fn open(&mut self, instr: Instr, label: Label) {
        debug_assert!(instr.opens_block());
        self.emit(instr);
        self.labels.push(label);
    }

    fn close(&mut self) {
        self.labels.pop();
        self.emit(Instr::End);
    }

    /// The relative branch depth of the innermost label of the given kind.
    fn depth_of(&self, label: Label) -> Option<u32> {
        let index = self.labels.iter().rposition(|l| *l == label)?;
        u32::try_from(self.labels.len() - 1 - index).ok()
    }

    fn emit(&mut self, instr: Instr) {
        self.body.push(instr);
    }
}

enum Place {
    Local(u32),
    /// Address of the cell and the machine type stored there.
    Global(u32, ValType),
}

/// Whether `target` (a `break` or `continue`) occurs in `body` outside of any
/// nested loop.
fn contains(body: &[Stmt<Typed>], target: &StmtKind<Typed>) -> bool {
    body.iter().any(|stmt| match &stmt.kind {
        StmtKind::If {
            body, else_body, ..
        } => contains(body, target) || contains(else_body, target),
        kind => kind == target,
    })
}

/// Linear memory addresses always fit in the single page.
fn i32_of(offset: u32) -> i32 {
    i32::try_from(offset).unwrap_or(i32::MAX)
}

fn opcode(op: BinaryOperator, ty: ValType) -> Option<&'static str> {
    use BinaryOperator::*;
    let name = match (ty, op) {
        (_, Add) => "add",
        (_, Sub) => "sub",
        (_, Mul) => "mul",
        (_, Eq) => "eq",
        (_, Ne) => "ne",
        (ValType::I32, Div) => "div_s",
        (ValType::I32, Rem) => "rem_s",
        (ValType::I32, Lt) => "lt_s",
        (ValType::I32, Gt) => "gt_s",
        (ValType::I32, Le) => "le_s",
        (ValType::I32, Ge) => "ge_s",
        (ValType::I32, LogicalAnd | BitAnd) => "and",
        (ValType::I32, LogicalOr | BitOr) => "or",
        (ValType::I32, Xor) => "xor",
        (ValType::F32, Div) => "div",
        (ValType::F32, Lt) => "lt",
        (ValType::F32, Gt) => "gt",
        (ValType::F32, Le) => "le",
        (ValType::F32, Ge) => "ge",
        (ValType::F32, Rem | LogicalAnd | BitAnd | LogicalOr | BitOr | Xor) => return None,
    };
    Some(name)
}
