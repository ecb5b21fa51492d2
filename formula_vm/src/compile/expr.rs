//! Expression lowering.

use formula_vm_runtime::{ErrorKind, ScriptError, ScriptResult, Span, Value};

use crate::ast::{AssignOp, BinaryOp, Expr, UnaryOp};
use crate::ir::Op;

use super::Compiler;

/// Bar predicates whose zero-argument form is sugar for reading the `O` and
/// `C` globals at the call site.
const BAR_PREDICATES: [&str; 3] = ["ISUP", "ISDOWN", "ISEQUAL"];

impl Compiler {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> ScriptResult<()> {
        match expr {
            Expr::Number { value, span } => self.emit_const(Value::Num(*value), *span),
            Expr::Str { value, span } => self.emit_const(Value::Str(value.clone()), *span),
            Expr::Bool { value, span } => self.emit_const(Value::Bool(*value), *span),
            Expr::Ident { name, span } => self.lower_ident(name, *span),
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                self.emit(binary_opcode(*op), *span)
            }
            Expr::Unary { op, argument, span } => {
                self.lower_expr(argument)?;
                let op = match op {
                    UnaryOp::Plus => Op::UnaryPlus,
                    UnaryOp::Minus => Op::UnaryMinus,
                };
                self.emit(op, *span)
            }
            Expr::Assign {
                op,
                target,
                value,
                span,
            } => self.lower_assign(*op, target, value, *span),
            Expr::Call { callee, args, span } => self.lower_call(callee, args, *span),
            Expr::Member { span, .. } => Err(ScriptError::new(
                ErrorKind::RuntimeError,
                "member expressions are not supported",
            )
            .with_span(*span)),
        }
    }

    fn lower_ident(&mut self, name: &str, span: Option<Span>) -> ScriptResult<()> {
        if let Some(slot) = self.resolve_local(name) {
            return self.emit(Op::LoadVar(slot), span);
        }
        if let Some(slot) = self.resolve_global(name) {
            return self.emit(Op::LoadGlobal(slot), span);
        }
        Err(ScriptError::new(
            ErrorKind::UndefinedVariable,
            format!("`{}` is not defined", name),
        )
        .with_span(span)
        .with_context("name", name))
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        span: Option<Span>,
    ) -> ScriptResult<()> {
        let name = match target {
            Expr::Ident { name, .. } => name.clone(),
            other => {
                return Err(ScriptError::new(
                    ErrorKind::InvalidAssignment,
                    "assignment target must be an identifier",
                )
                .with_span(other.span().or(span)))
            }
        };
        if Self::is_protected(&name) {
            return Err(ScriptError::new(
                ErrorKind::InvalidAssignment,
                format!("cannot assign to protected word `{}`", name),
            )
            .with_span(target.span().or(span))
            .with_context("name", name));
        }
        match op {
            AssignOp::CaretCaret | AssignOp::DotDot => {
                return Err(ScriptError::new(
                    ErrorKind::UnimplementedFeature,
                    "this assignment operator is not supported",
                )
                .with_span(span))
            }
            AssignOp::Assign | AssignOp::Display => {}
        }

        let before = self.current_depth();
        self.lower_expr(value)?;
        if self.current_depth() != before + 1 {
            return Err(ScriptError::new(
                ErrorKind::InvalidAssignment,
                "assignment source produces no value",
            )
            .with_span(value.span().or(span)));
        }

        // Globals win over locals: a declared (or market) name keeps its
        // global slot; anything else becomes function-local to main.
        let store = match self.resolve_global(&name) {
            Some(slot) => Op::StoreGlobal(slot),
            None => Op::StoreVar(self.local_slot(&name)),
        };
        let slot = match store {
            Op::StoreGlobal(slot) | Op::StoreVar(slot) => slot,
            _ => unreachable!(),
        };

        match op {
            AssignOp::Assign => self.emit(store, span),
            AssignOp::Display => {
                // Assign, record in the output map, and leave the value as
                // the expression's result.
                self.emit(Op::Dup, span)?;
                self.emit(Op::Dup, span)?;
                self.emit(store, span)?;
                self.emit(Op::StoreOutput { slot, name }, span)
            }
            AssignOp::CaretCaret | AssignOp::DotDot => unreachable!(),
        }
    }

    fn lower_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        span: Option<Span>,
    ) -> ScriptResult<()> {
        if let Expr::Ident { name, .. } = callee {
            // ISUP() and friends read the current bar through the ordinary
            // O/C globals.
            if args.is_empty() && BAR_PREDICATES.contains(&name.as_str()) {
                self.lower_ident("O", span)?;
                self.lower_ident("C", span)?;
                return self.emit(
                    Op::CallBuiltin {
                        name: name.clone(),
                        argc: 2,
                    },
                    span,
                );
            }
            for arg in args {
                self.lower_expr(arg)?;
            }
            return self.emit(
                Op::CallBuiltin {
                    name: name.clone(),
                    argc: args.len(),
                },
                span,
            );
        }

        // No user functions exist; this compiles but always fails when
        // executed.
        self.lower_expr(callee)?;
        for arg in args {
            self.lower_expr(arg)?;
        }
        self.emit(Op::CallFunc(args.len()), span)
    }
}

fn binary_opcode(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Gt => Op::Gt,
        BinaryOp::Lt => Op::Lt,
        BinaryOp::Gte => Op::Gte,
        BinaryOp::Lte => Op::Lte,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::Neq => Op::Neq,
        BinaryOp::And => Op::And,
        BinaryOp::Or => Op::Or,
    }
}
