// Library code must not write to stderr directly; script output goes through
// the embedder-provided sink.
#![deny(clippy::print_stderr)]

//! Compiler and stack VM for a small technical-analysis formula language.
//!
//! A script is compiled once into a linear, stack-oriented intermediate
//! representation and then executed repeatedly, once per incoming market
//! bar. Rolling indicators (`MA`, `HHV`, `REF`, `CROSS`, …) keep per-call-site
//! state inside the VM so they progress in lock-step with the input stream.
//!
//! ```
//! use formula_vm::{api, ast, Bar};
//!
//! // m := MA(C, 3); m : m;
//! let script = ast::Script::new(vec![
//!     ast::Stmt::expr(ast::Expr::assign(
//!         ast::AssignOp::Assign,
//!         ast::Expr::ident("m"),
//!         ast::Expr::call("MA", vec![ast::Expr::ident("C"), ast::Expr::num(3.0)]),
//!     )),
//!     ast::Stmt::expr(ast::Expr::assign(
//!         ast::AssignOp::Display,
//!         ast::Expr::ident("m"),
//!         ast::Expr::ident("m"),
//!     )),
//! ]);
//!
//! let bars: Vec<Bar> = (0..5).map(|i| Bar::close_only(i as f64, 100.0 + i as f64)).collect();
//! let results = api::run_script(&script, &bars).unwrap();
//! assert!(results[0].output["m"].is_null());
//! assert_eq!(results[2].output["m"].as_num(), Some(101.0));
//! ```

pub mod api;
pub mod ast;
pub mod bytecode;
pub mod compile;
pub mod indicators;
pub mod ir;
pub mod registry;
pub mod vm;

// Re-export the shared runtime data model at the crate root.
pub use formula_vm_runtime::{
    canonical_field, Bar, ErrorKind, Ring, ScriptError, ScriptResult, Span, StatsRing, Value,
};

pub use compile::{CompileOptions, Compiler};
pub use ir::{Function, Instr, Op, Program};
pub use registry::{registry, CallContext, Entry, OutputSink, StdoutSink};
pub use vm::{ExecutionResult, Vm, VmOptions};
