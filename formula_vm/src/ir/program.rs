use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use formula_vm_runtime::{ErrorKind, ScriptError, ScriptResult, Value};

use super::instr::{Instr, Op};

/// One compiled function: an instruction sequence plus its slot and stack
/// requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub code: Vec<Instr>,
    pub locals_count: usize,
    pub globals_count: usize,
    pub max_stack_depth: usize,
}

/// A compiled program.
///
/// Exactly one `main` function (the language has no user functions), a
/// constants vector interned by append, a label table mapping label id to
/// the instruction index of its `NOP` landing pad, and name maps for result
/// reporting. Programs are immutable after compilation and may be shared
/// across VM instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub main: Function,
    pub constants: Vec<Value>,
    pub labels: Vec<usize>,
    /// Global name to slot index. Market fields occupy the low slots.
    pub global_slots: BTreeMap<String, usize>,
    /// Slot index to name, for locals.
    pub local_names: Vec<String>,
    /// Slot index to name, for globals.
    pub global_names: Vec<String>,
}

impl Program {
    /// Check the structural invariants every compiled program must satisfy:
    /// constant and slot operands in bounds, jump targets present in the
    /// label table and pointing at in-range instructions.
    pub fn validate(&self) -> ScriptResult<()> {
        let func = &self.main;
        for instr in &func.code {
            match &instr.op {
                Op::LoadConst(idx) => {
                    if *idx >= self.constants.len() {
                        return Err(self.invariant_error(instr, "constant index out of bounds"));
                    }
                }
                Op::LoadVar(slot) | Op::StoreVar(slot) => {
                    if *slot >= func.locals_count {
                        return Err(self.invariant_error(instr, "local slot out of bounds"));
                    }
                }
                Op::LoadGlobal(slot) | Op::StoreGlobal(slot) | Op::InitGlobal(slot) => {
                    if *slot >= func.globals_count {
                        return Err(self.invariant_error(instr, "global slot out of bounds"));
                    }
                }
                Op::StoreOutput { slot, .. } => {
                    if *slot >= func.globals_count && *slot >= func.locals_count {
                        return Err(self.invariant_error(instr, "output slot out of bounds"));
                    }
                }
                Op::Jump(label) | Op::JumpIfFalse(label) | Op::JumpIfTrue(label) => {
                    match self.labels.get(*label as usize) {
                        None => {
                            return Err(self.invariant_error(instr, "jump to unknown label"));
                        }
                        Some(target) if *target >= func.code.len() => {
                            return Err(
                                self.invariant_error(instr, "label points past end of code")
                            );
                        }
                        Some(_) => {}
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn invariant_error(&self, instr: &Instr, message: &str) -> ScriptError {
        ScriptError::new(ErrorKind::RuntimeError, message)
            .with_span(instr.span)
            .with_context("opcode", instr.op.name())
            .with_context("instruction", instr.id.to_string())
    }

    /// Human-readable listing of the program, one instruction per line.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for instr in &self.main.code {
            out.push_str(&format!("{}\n", instr));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_program() -> Program {
        Program {
            main: Function {
                code: vec![],
                locals_count: 0,
                globals_count: 0,
                max_stack_depth: 0,
            },
            constants: vec![],
            labels: vec![],
            global_slots: BTreeMap::new(),
            local_names: vec![],
            global_names: vec![],
        }
    }

    #[test]
    fn empty_program_validates() {
        assert!(empty_program().validate().is_ok());
    }

    #[test]
    fn out_of_bounds_constant_is_rejected() {
        let mut program = empty_program();
        program.main.code.push(Instr::new(0, Op::LoadConst(3)));
        let err = program.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.context.get("opcode").map(String::as_str), Some("LOAD_CONST"));
    }

    #[test]
    fn unknown_label_is_rejected() {
        let mut program = empty_program();
        program.main.code.push(Instr::new(0, Op::Jump(0)));
        assert!(program.validate().is_err());
    }

    #[test]
    fn valid_jump_passes() {
        let mut program = empty_program();
        program.main.code.push(Instr::new(0, Op::Jump(0)));
        program.main.code.push(Instr::new(1, Op::Nop));
        program.labels.push(1);
        assert!(program.validate().is_ok());
    }
}
