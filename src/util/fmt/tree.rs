use std::io::Write;

use crate::{ast::*, types::Type};

const INDENT_WIDTH: usize = 2;

pub fn print_program_string<I: InfoWriter>(program: &Program<I>) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_program<I: InfoWriter>(
    w: &mut impl Write,
    program: &Program<I>,
) -> std::io::Result<()> {
    for item in &program.items {
        match item {
            Item::Global(global) => print_global(w, 0, global)?,
            Item::Function(function) => print_function(w, 0, function)?,
        }
    }
    Ok(())
}

fn print_global<I: InfoWriter>(
    w: &mut impl Write,
    i: usize,
    global: &GlobalDefinition<I>,
) -> std::io::Result<()> {
    sp(w, i)?;
    writeln!(w, "global {}: {}", global.name, global.ty)?;
    if let Some(initializer) = &global.initializer {
        print_expr(w, i + 1, initializer)?;
    }
    Ok(())
}

fn print_function<I: InfoWriter>(
    w: &mut impl Write,
    i: usize,
    function: &FunctionDefinition<I>,
) -> std::io::Result<()> {
    sp(w, i)?;
    write!(w, "function {}(", function.name)?;
    for (idx, param) in function.params.iter().enumerate() {
        if idx > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}: {}", param.name, param.ty)?;
    }
    writeln!(w, ") -> {}", function.return_ty)?;
    print_block(w, i + 1, &function.body)
}

fn print_block<I: InfoWriter>(
    w: &mut impl Write,
    i: usize,
    body: &[Stmt<I>],
) -> std::io::Result<()> {
    for stmt in body {
        print_stmt(w, i, stmt)?;
    }
    Ok(())
}

/// Prints a `label` line followed by the nested statements.
fn print_labeled_block<I: InfoWriter>(
    w: &mut impl Write,
    i: usize,
    label: &str,
    body: &[Stmt<I>],
) -> std::io::Result<()> {
    sp(w, i)?;
    writeln!(w, "{label}")?;
    print_block(w, i + 1, body)
}

pub fn print_stmt<I: InfoWriter>(
    w: &mut impl Write,
    i: usize,
    stmt: &Stmt<I>,
) -> std::io::Result<()> {
    if let StmtKind::Expr(expr) = &stmt.kind {
        return print_expr(w, i, expr);
    }
    sp(w, i)?;
    match &stmt.kind {
        StmtKind::Return(value) => {
            writeln!(w, "return")?;
            if let Some(value) = value {
                print_expr(w, i + 1, value)?;
            }
        }
        StmtKind::SetLocalVar { target, value } => {
            writeln!(w, "set {target}")?;
            print_expr(w, i + 1, value)?;
        }
        StmtKind::DeclareVar {
            name,
            ty,
            initializer,
        } => {
            writeln!(w, "declare {name}: {ty}")?;
            if let Some(initializer) = initializer {
                print_expr(w, i + 1, initializer)?;
            }
        }
        StmtKind::SetArray {
            base,
            offset,
            value,
        } => {
            writeln!(w, "set-array")?;
            print_expr(w, i + 1, base)?;
            print_expr(w, i + 1, offset)?;
            print_expr(w, i + 1, value)?;
        }
        StmtKind::If {
            cond,
            body,
            else_body,
        } => {
            writeln!(w, "if")?;
            print_expr(w, i + 1, cond)?;
            print_labeled_block(w, i + 1, "then", body)?;
            if !else_body.is_empty() {
                print_labeled_block(w, i + 1, "else", else_body)?;
            }
        }
        StmtKind::Loop { kind, cond, body } => {
            match kind {
                LoopKind::While => writeln!(w, "while")?,
                LoopKind::DoWhile => writeln!(w, "do-while")?,
            }
            print_expr(w, i + 1, cond)?;
            print_labeled_block(w, i + 1, "body", body)?;
        }
        StmtKind::For {
            decl,
            cond,
            update,
            body,
        } => {
            writeln!(w, "for")?;
            if let Some(decl) = decl {
                sp(w, i + 1)?;
                writeln!(w, "init")?;
                print_stmt(w, i + 2, decl)?;
            }
            if let Some(cond) = cond {
                sp(w, i + 1)?;
                writeln!(w, "cond")?;
                print_expr(w, i + 2, cond)?;
            }
            if let Some(update) = update {
                sp(w, i + 1)?;
                writeln!(w, "update")?;
                print_stmt(w, i + 2, update)?;
            }
            print_labeled_block(w, i + 1, "body", body)?;
        }
        StmtKind::Continue => writeln!(w, "continue")?,
        StmtKind::Break => writeln!(w, "break")?,
        StmtKind::Expr(_) => unreachable!(),
    }
    Ok(())
}

pub fn print_expr<I: InfoWriter>(
    w: &mut impl Write,
    i: usize,
    expr: &Expr<I>,
) -> std::io::Result<()> {
    sp(w, i)?;
    let info = expr.info.write_resolved(); // inferred type, for typed trees
    match &expr.kind {
        ExprKind::Const(constant) => writeln!(w, "const {constant}{info}")?,
        ExprKind::String(val) => writeln!(w, "string {val:?}{info}")?,
        ExprKind::Variable(ident) => writeln!(w, "variable {ident}{info}")?,
        ExprKind::Call { function, args } => {
            writeln!(w, "call {function}{info}")?;
            for arg in args {
                print_expr(w, i + 1, arg)?;
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {}{info}", op.symbol())?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)?;
        }
        ExprKind::Unary {
            op,
            expr: inner,
            postfix,
        } => {
            let postfix = if *postfix { " (postfix)" } else { "" };
            writeln!(w, "unary {}{postfix}{info}", op.symbol())?;
            print_expr(w, i + 1, inner)?;
        }
        ExprKind::ArrayOffset { base, offset } => {
            writeln!(w, "index{info}")?;
            print_expr(w, i + 1, base)?;
            print_expr(w, i + 1, offset)?;
        }
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

pub trait InfoWriter: Info<Expr: NameWriter> {}

impl<I> InfoWriter for I
where
    I: Info,
    I::Expr: NameWriter,
{
}

pub trait NameWriter {
    fn write_resolved(&self) -> impl std::fmt::Display + '_;
}

impl NameWriter for () {
    fn write_resolved(&self) -> impl std::fmt::Display + '_ {
        ""
    }
}

impl NameWriter for Type {
    fn write_resolved(&self) -> impl std::fmt::Display + '_ {
        pub struct TypeWriter<'a>(&'a Type);

        impl std::fmt::Display for TypeWriter<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, " : {}", self.0)
            }
        }

        TypeWriter(self)
    }
}
