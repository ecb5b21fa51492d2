//! Shared helpers for the end-to-end script tests.
#![allow(dead_code)]

use formula_vm::ast::{AssignOp, Expr, Script, Stmt, VarDecl};
use formula_vm::{api, Bar, ExecutionResult, Value};

/// `name := expr;`
pub fn assign(name: &str, expr: Expr) -> Stmt {
    Stmt::expr(Expr::assign(AssignOp::Assign, Expr::ident(name), expr))
}

/// `name : expr;`
pub fn display(name: &str, expr: Expr) -> Stmt {
    Stmt::expr(Expr::assign(AssignOp::Display, Expr::ident(name), expr))
}

/// `VARIABLE: name := init;`
pub fn var_decl(name: &str, init: Expr) -> Stmt {
    Stmt::VarDecl {
        decls: vec![VarDecl {
            name: name.to_string(),
            init: Some(init),
            span: None,
        }],
    }
}

/// Close-only bars with sequential timestamps.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::close_only(i as f64, *c))
        .collect()
}

/// Compile and run a script body over close-only bars.
pub fn run(body: Vec<Stmt>, closes: &[f64]) -> Vec<ExecutionResult> {
    api::run_script(&Script::new(body), &bars_from_closes(closes))
        .expect("script should execute")
}

/// The output map entry `key` across all bars.
pub fn output_series(results: &[ExecutionResult], key: &str) -> Vec<Value> {
    results
        .iter()
        .map(|r| r.output.get(key).cloned().unwrap_or(Value::Null))
        .collect()
}

pub fn n(v: f64) -> Value {
    Value::Num(v)
}
