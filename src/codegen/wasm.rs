//! An in-memory model of the emitted WebAssembly module and its text
//! serialization.

use std::fmt;

/// Size of the single linear memory page the host provides.
pub const PAGE_SIZE: u32 = 64 * 1024;

/// Declares the host imports. [`to_wat`] closes it.
pub const MODULE_HEADER: &str = "\
(module
  (import \"env\" \"log\" (func $log (param i32)))
  (import \"env\" \"logInt\" (func $logInt (param i32)))
  (import \"env\" \"memory\" (memory 1))

";

/// Wraps the serialized module body with the fixed header and the closing
/// parenthesis.
pub fn to_wat(module: &Module) -> String {
    format!("{MODULE_HEADER}{module})\n")
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValType {
    I32,
    F32,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => f.write_str("i32"),
            ValType::F32 => f.write_str("f32"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    I32Const(i32),
    F32Const(f32),
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    /// A 4-byte load or store.
    Load(ValType),
    Store(ValType),
    /// `i32.load8_s`
    Load8S,
    /// `i32.store8`
    Store8,
    /// A numeric instruction named `<ty>.<op>`, e.g. `i32.lt_s`.
    Numeric {
        ty: ValType,
        op: &'static str,
    },
    Call(Box<str>),
    Drop,
    Block,
    Loop,
    If,
    Else,
    End,
    Br(u32),
    BrIf(u32),
    Return,
    Unreachable,
}

impl Instr {
    pub fn i32(op: &'static str) -> Instr {
        Instr::Numeric {
            ty: ValType::I32,
            op,
        }
    }

    /// Whether this instruction opens a structured block, closed by
    /// [`Instr::End`].
    pub fn opens_block(&self) -> bool {
        matches!(self, Instr::Block | Instr::Loop | Instr::If)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::I32Const(val) => write!(f, "i32.const {val}"),
            Instr::F32Const(val) => write!(f, "f32.const {val:?}"),
            Instr::LocalGet(slot) => write!(f, "local.get {slot}"),
            Instr::LocalSet(slot) => write!(f, "local.set {slot}"),
            Instr::LocalTee(slot) => write!(f, "local.tee {slot}"),
            Instr::Load(ty) => write!(f, "{ty}.load"),
            Instr::Store(ty) => write!(f, "{ty}.store"),
            Instr::Load8S => f.write_str("i32.load8_s"),
            Instr::Store8 => f.write_str("i32.store8"),
            Instr::Numeric { ty, op } => write!(f, "{ty}.{op}"),
            Instr::Call(name) => write!(f, "call ${name}"),
            Instr::Drop => f.write_str("drop"),
            Instr::Block => f.write_str("block"),
            Instr::Loop => f.write_str("loop"),
            Instr::If => f.write_str("if"),
            Instr::Else => f.write_str("else"),
            Instr::End => f.write_str("end"),
            Instr::Br(depth) => write!(f, "br {depth}"),
            Instr::BrIf(depth) => write!(f, "br_if {depth}"),
            Instr::Return => f.write_str("return"),
            Instr::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Bytes placed at a fixed offset of linear memory when the module loads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

impl fmt::Display for DataSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(data (i32.const {}) \"", self.offset)?;
        for &byte in &self.bytes {
            let printable = (0x20..=0x7e).contains(&byte) && byte != b'"' && byte != b'\\';
            if printable {
                write!(f, "{}", char::from(byte))?;
            } else {
                write!(f, "\\{byte:02x}")?;
            }
        }
        f.write_str("\")")
    }
}

/// An exported function.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: Box<str>,
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
    /// Locals declared after the parameters.
    pub locals: Vec<ValType>,
    pub body: Vec<Instr>,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.name;
        write!(f, "  (func ${name} (export \"{name}\")")?;
        for param in &self.params {
            write!(f, " (param {param})")?;
        }
        if let Some(result) = self.result {
            write!(f, " (result {result})")?;
        }
        for local in &self.locals {
            write!(f, " (local {local})")?;
        }
        writeln!(f)?;

        let mut depth: usize = 2;
        for instr in &self.body {
            if matches!(instr, Instr::End | Instr::Else) {
                depth = depth.saturating_sub(1);
            }
            writeln!(f, "{:width$}{instr}", "", width = depth * 2)?;
            if instr.opens_block() || *instr == Instr::Else {
                depth += 1;
            }
        }
        writeln!(f, "  )")
    }
}

/// Everything generated for a program. Its [`Display`](fmt::Display)
/// implementation renders the module body: data segments, then functions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub data: Vec<DataSegment>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| &*f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.data {
            writeln!(f, "  {segment}")?;
        }
        for function in &self.functions {
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
