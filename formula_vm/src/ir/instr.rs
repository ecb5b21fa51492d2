use std::fmt;

use serde::{Deserialize, Serialize};

use formula_vm_runtime::Span;

/// Opcodes with their operands.
///
/// Operands ride inside the variant: slot indices for loads and stores,
/// constant indices, label ids for jumps, and a `{name, argc}` pair for
/// builtin calls. `STORE_OUTPUT` additionally carries the output name so the
/// instruction is self-contained; executing it never depends on debug data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Push `constants[idx]`.
    LoadConst(usize),
    /// Push `locals[slot]`.
    LoadVar(usize),
    /// Push `globals[slot]`.
    LoadGlobal(usize),
    /// Pop into `locals[slot]`.
    StoreVar(usize),
    /// Pop into `globals[slot]`.
    StoreGlobal(usize),
    /// Pop; assign to `globals[slot]` only on the first round. The one-shot
    /// initialiser behind `VARIABLE:` declarations.
    InitGlobal(usize),
    /// Pop and record in the output map under `name`.
    StoreOutput { slot: usize, name: String },

    // Arithmetic. Null operands propagate (null op x -> null); division by
    // zero is an error.
    Add,
    Sub,
    Mul,
    Div,

    UnaryPlus,
    UnaryMinus,

    // Ordered comparisons require numeric operands and propagate null.
    Gt,
    Lt,
    Gte,
    Lte,
    // Strict structural equality; never coerces.
    Eq,
    Neq,

    // Logical operators evaluate both operands and push a boolean.
    And,
    Or,

    /// Unconditional jump to a label.
    Jump(u32),
    /// Pop; jump when falsy.
    JumpIfFalse(u32),
    /// Pop; jump when truthy.
    JumpIfTrue(u32),

    /// Pop `argc` arguments, invoke the named registry entry, push its
    /// return value.
    CallBuiltin { name: String, argc: usize },
    /// Pop `argc` arguments and a callable. Reserved: the language has no
    /// user functions, so executing this always fails.
    CallFunc(usize),

    Pop,
    Dup,
    Swap,

    /// Pop the result value and finish the bar.
    Return,
    /// Label landing pad; safe to execute.
    Nop,
}

impl Op {
    /// Uppercase opcode name, used in error context and disassembly.
    pub fn name(&self) -> &'static str {
        match self {
            Op::LoadConst(_) => "LOAD_CONST",
            Op::LoadVar(_) => "LOAD_VAR",
            Op::LoadGlobal(_) => "LOAD_GLOBAL",
            Op::StoreVar(_) => "STORE_VAR",
            Op::StoreGlobal(_) => "STORE_GLOBAL",
            Op::InitGlobal(_) => "INIT_GLOBAL",
            Op::StoreOutput { .. } => "STORE_OUTPUT",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::UnaryPlus => "UNARY_PLUS",
            Op::UnaryMinus => "UNARY_MINUS",
            Op::Gt => "GT",
            Op::Lt => "LT",
            Op::Gte => "GTE",
            Op::Lte => "LTE",
            Op::Eq => "EQ",
            Op::Neq => "NEQ",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Op::JumpIfTrue(_) => "JUMP_IF_TRUE",
            Op::CallBuiltin { .. } => "CALL_BUILTIN",
            Op::CallFunc(_) => "CALL_FUNC",
            Op::Pop => "POP",
            Op::Dup => "DUP",
            Op::Swap => "SWAP",
            Op::Return => "RETURN",
            Op::Nop => "NOP",
        }
    }
}

/// Stack effect of an opcode as `(pops, pushes)`.
///
/// The compiler folds this over every emitted instruction to compute the
/// function's `max_stack_depth`; the VM trusts that bound.
pub fn stack_effect(op: &Op) -> (usize, usize) {
    match op {
        Op::LoadConst(_) | Op::LoadVar(_) | Op::LoadGlobal(_) => (0, 1),
        Op::StoreVar(_) | Op::StoreGlobal(_) | Op::InitGlobal(_) | Op::StoreOutput { .. } => (1, 0),
        Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Gt
        | Op::Lt
        | Op::Gte
        | Op::Lte
        | Op::Eq
        | Op::Neq
        | Op::And
        | Op::Or => (2, 1),
        Op::UnaryPlus | Op::UnaryMinus => (1, 1),
        Op::Jump(_) | Op::Nop => (0, 0),
        Op::JumpIfFalse(_) | Op::JumpIfTrue(_) => (1, 0),
        Op::CallBuiltin { argc, .. } => (*argc, 1),
        Op::CallFunc(argc) => (argc + 1, 1),
        Op::Pop => (1, 0),
        Op::Dup => (1, 2),
        Op::Swap => (2, 2),
        Op::Return => (1, 0),
    }
}

/// One instruction: a stable id, the opcode, and the source span captured at
/// compile time when debug mode is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub id: u32,
    pub op: Op,
    #[serde(default)]
    pub span: Option<Span>,
}

impl Instr {
    pub fn new(id: u32, op: Op) -> Self {
        Self { id, op, span: None }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}  {}", self.id, self.op.name())?;
        match &self.op {
            Op::LoadConst(i)
            | Op::LoadVar(i)
            | Op::LoadGlobal(i)
            | Op::StoreVar(i)
            | Op::StoreGlobal(i)
            | Op::InitGlobal(i)
            | Op::CallFunc(i) => write!(f, " {}", i),
            Op::StoreOutput { slot, name } => write!(f, " {} ({})", slot, name),
            Op::Jump(l) | Op::JumpIfFalse(l) | Op::JumpIfTrue(l) => write!(f, " L{}", l),
            Op::CallBuiltin { name, argc } => write!(f, " {}/{}", name, argc),
            _ => Ok(()),
        }
    }
}
