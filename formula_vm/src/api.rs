//! Convenience API for compiling and running scripts.

use std::sync::Arc;

use formula_vm_runtime::{Bar, ErrorKind, ScriptError, ScriptResult};

use crate::ast::Script;
use crate::compile::{CompileOptions, Compiler};
use crate::ir::Program;
use crate::vm::{ExecutionResult, Vm, VmOptions};

/// Compile a parsed script with default options.
pub fn compile(script: &Script) -> ScriptResult<Program> {
    Compiler::new().compile(script)
}

/// Compile a parsed script with explicit options.
pub fn compile_with_options(script: &Script, options: CompileOptions) -> ScriptResult<Program> {
    Compiler::with_options(options).compile(script)
}

/// Compile once, then execute once per bar, collecting every result.
pub fn run_script(script: &Script, bars: &[Bar]) -> ScriptResult<Vec<ExecutionResult>> {
    run_script_with_options(script, bars, CompileOptions::default(), VmOptions::default())
}

/// [`run_script`] with explicit compiler and VM options.
pub fn run_script_with_options(
    script: &Script,
    bars: &[Bar],
    compile_options: CompileOptions,
    vm_options: VmOptions,
) -> ScriptResult<Vec<ExecutionResult>> {
    let program = Arc::new(Compiler::with_options(compile_options).compile(script)?);
    let mut vm = Vm::with_options(program, vm_options);
    bars.iter().map(|bar| vm.execute(bar)).collect()
}

/// Serialize a compiled program to JSON.
pub fn program_to_json(program: &Program) -> ScriptResult<String> {
    serde_json::to_string(program)
        .map_err(|e| ScriptError::new(ErrorKind::RuntimeError, format!("serialize: {}", e)))
}

/// Load a compiled program from JSON, validating its invariants.
pub fn program_from_json(json: &str) -> ScriptResult<Program> {
    let program: Program = serde_json::from_str(json)
        .map_err(|e| ScriptError::new(ErrorKind::RuntimeError, format!("deserialize: {}", e)))?;
    program.validate()?;
    Ok(program)
}
