//! Statement lowering.

use formula_vm_runtime::{ErrorKind, ScriptError, ScriptResult, Value};

use crate::ast::Stmt;
use crate::ir::Op;

use super::Compiler;

impl Compiler {
    /// Lower one statement. `tail` is true only for the final top-level
    /// statement of the script, whose value (if any) becomes the bar's
    /// last result; every other expression statement pops what it produced.
    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt, tail: bool) -> ScriptResult<()> {
        match stmt {
            Stmt::Expr { expr } => {
                let before = self.current_depth();
                self.lower_expr(expr)?;
                if self.current_depth() > before && !tail {
                    self.emit(Op::Pop, expr.span())?;
                }
                Ok(())
            }
            Stmt::VarDecl { decls } => {
                for decl in decls {
                    if Self::is_protected(&decl.name) {
                        return Err(ScriptError::new(
                            ErrorKind::InvalidAssignment,
                            format!("cannot declare protected name `{}`", decl.name),
                        )
                        .with_span(decl.span));
                    }
                    let slot = self.global_slot(&decl.name);
                    match &decl.init {
                        Some(init) => self.lower_expr(init)?,
                        None => self.emit_const(Value::Null, decl.span)?,
                    }
                    // The store itself runs every bar; the VM only assigns on
                    // the first round.
                    self.emit(Op::InitGlobal(slot), decl.span)?;
                }
                Ok(())
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let l_else = self.new_label();
                let l_end = self.new_label();
                self.lower_expr(test)?;
                self.emit(Op::JumpIfFalse(l_else), test.span())?;
                self.lower_stmt(consequent, false)?;
                self.emit(Op::Jump(l_end), test.span())?;
                self.place_label(l_else, test.span())?;
                if let Some(alternate) = alternate {
                    // else-if chains arrive as a nested `If` here.
                    self.lower_stmt(alternate, false)?;
                }
                self.place_label(l_end, test.span())
            }
            Stmt::Block { body } => {
                // Blocks do not open a scope; they are just statement lists.
                for stmt in body {
                    self.lower_stmt(stmt, false)?;
                }
                Ok(())
            }
            Stmt::Return { argument } => {
                match argument {
                    Some(expr) => self.lower_expr(expr)?,
                    None => self.emit_const(Value::Null, None)?,
                }
                self.emit(Op::Return, argument.as_ref().and_then(|e| e.span()))
            }
        }
    }
}
