//! The stack virtual machine.
//!
//! A [`Vm`] owns everything mutable: the operand stack, the per-bar locals,
//! the persistent globals, the output map, and the per-call-site indicator
//! state. [`Vm::execute`] runs the compiled `main` function once against a
//! single bar; calling it repeatedly over a stream advances every rolling
//! indicator in lock-step.
//!
//! The compiled [`Program`] itself is immutable and may be shared between VM
//! instances; each stream gets its own `Vm`.

mod ops;
pub mod stack_ops;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::Serialize;

use formula_vm_runtime::{canonical_field, Bar, ErrorKind, ScriptError, ScriptResult, Value};

use crate::ir::{Instr, Op, Program};
use crate::registry::{registry, CallContext, OutputSink, SiteState, StdoutSink};

pub use stack_ops::StackOps;

/// Default operand stack bound.
pub const DEFAULT_MAX_STACK: usize = 1000;

/// VM construction options.
pub struct VmOptions {
    /// Destination for `PRINT` output.
    pub sink: Box<dyn OutputSink>,
    /// Initial values for embedder-declared globals, written once at
    /// construction.
    pub user_globals: BTreeMap<String, Value>,
    /// Hard bound on operand stack growth.
    pub max_stack: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            sink: Box::new(StdoutSink),
            user_globals: BTreeMap::new(),
            max_stack: DEFAULT_MAX_STACK,
        }
    }
}

/// What one bar's execution produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    /// Values recorded by display-assignment, keyed by variable name.
    pub output: HashMap<String, Value>,
    /// Locals at the end of the bar, by name.
    pub vars: HashMap<String, Value>,
    /// Globals at the end of the bar, by name.
    pub global_vars: HashMap<String, Value>,
    /// The final value left on the stack (or returned), if any.
    pub last_result: Option<Value>,
}

enum Flow {
    Continue,
    Jump(usize),
    Finish(Value),
}

/// A virtual machine bound to one compiled program and one input stream.
pub struct Vm {
    program: Arc<Program>,
    stack: Vec<Value>,
    locals: Vec<Value>,
    globals: Vec<Value>,
    output: HashMap<String, Value>,
    states: HashMap<u32, SiteState>,
    round: u64,
    market_ts: f64,
    sink: Box<dyn OutputSink>,
    max_stack: usize,
}

impl Vm {
    pub fn new(program: impl Into<Arc<Program>>) -> Self {
        Self::with_options(program, VmOptions::default())
    }

    pub fn with_options(program: impl Into<Arc<Program>>, options: VmOptions) -> Self {
        let program = program.into();
        let mut globals = vec![Value::Null; program.main.globals_count];
        for (name, value) in options.user_globals {
            match program.global_slots.get(canonical_field(&name)) {
                Some(slot) => globals[*slot] = value,
                None => warn!("user global `{}` has no slot in this program", name),
            }
        }
        Self {
            locals: vec![Value::Null; program.main.locals_count],
            globals,
            stack: Vec::with_capacity(program.main.max_stack_depth.max(8)),
            output: HashMap::new(),
            states: HashMap::new(),
            round: 0,
            market_ts: 0.0,
            sink: options.sink,
            max_stack: options.max_stack,
            program,
        }
    }

    /// Rounds executed so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Read a global by name (aliases resolve), mainly for embedders and
    /// tests.
    pub fn global(&self, name: &str) -> Option<&Value> {
        let slot = self.program.global_slots.get(canonical_field(name))?;
        self.globals.get(*slot)
    }

    /// Execute the program against one bar.
    ///
    /// On success the returned [`ExecutionResult`] reflects a fully advanced
    /// bar. On failure the error carries the failing instruction's opcode,
    /// id, and compile-time source span; the VM should be discarded, since
    /// indicator state mutated before the failure is not rolled back.
    pub fn execute(&mut self, bar: &Bar) -> ScriptResult<ExecutionResult> {
        let program = Arc::clone(&self.program);

        // Per-bar reset.
        self.stack.clear();
        self.output.clear();
        for slot in &mut self.locals {
            *slot = Value::Null;
        }
        self.round += 1;

        // Bar ingest: write every field whose canonical name has a slot.
        for (name, value) in bar.iter() {
            let canonical = canonical_field(name);
            if canonical == "T" {
                self.market_ts = value;
            }
            if let Some(slot) = program.global_slots.get(canonical) {
                self.globals[*slot] = Value::Num(value);
            }
        }
        trace!("executing round {} at ts {}", self.round, self.market_ts);

        let code = &program.main.code;
        let mut pc = 0usize;
        while pc < code.len() {
            let instr = &code[pc];
            pc += 1;
            match self.dispatch(instr, &program) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Finish(value)) => return Ok(self.build_result(Some(value))),
                Err(err) => {
                    let err = decorate(err, instr);
                    debug!("round {} failed: {}", self.round, err);
                    return Err(err);
                }
            }
        }

        let last = self.stack.pop();
        Ok(self.build_result(last))
    }

    fn dispatch(&mut self, instr: &Instr, program: &Program) -> ScriptResult<Flow> {
        match &instr.op {
            Op::LoadConst(idx) => {
                let value = program
                    .constants
                    .get(*idx)
                    .cloned()
                    .ok_or_else(|| internal("constant index out of bounds"))?;
                self.push(value)?;
            }
            Op::LoadVar(slot) => {
                let value = self
                    .locals
                    .get(*slot)
                    .cloned()
                    .ok_or_else(|| internal("local slot out of bounds"))?;
                self.push(value)?;
            }
            Op::LoadGlobal(slot) => {
                let value = self
                    .globals
                    .get(*slot)
                    .cloned()
                    .ok_or_else(|| internal("global slot out of bounds"))?;
                self.push(value)?;
            }
            Op::StoreVar(slot) => {
                let value = self.stack.pop_value()?;
                let cell = self
                    .locals
                    .get_mut(*slot)
                    .ok_or_else(|| internal("local slot out of bounds"))?;
                *cell = value;
            }
            Op::StoreGlobal(slot) => {
                let value = self.stack.pop_value()?;
                let cell = self
                    .globals
                    .get_mut(*slot)
                    .ok_or_else(|| internal("global slot out of bounds"))?;
                *cell = value;
            }
            Op::InitGlobal(slot) => {
                // Pops every round; assigns only on the first.
                let value = self.stack.pop_value()?;
                if self.round == 1 {
                    let cell = self
                        .globals
                        .get_mut(*slot)
                        .ok_or_else(|| internal("global slot out of bounds"))?;
                    *cell = value;
                }
            }
            Op::StoreOutput { name, .. } => {
                let value = self.stack.pop_value()?;
                self.output.insert(name.clone(), value);
            }
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
            | Op::Or => {
                let (a, b) = self.stack.pop_pair()?;
                let result = ops::binary(&instr.op, a, b)?;
                self.push(result)?;
            }
            Op::UnaryPlus | Op::UnaryMinus => {
                let v = self.stack.pop_value()?;
                let result = ops::unary(&instr.op, v)?;
                self.push(result)?;
            }
            Op::Jump(label) => return Ok(Flow::Jump(jump_target(program, *label)?)),
            Op::JumpIfFalse(label) => {
                let v = self.stack.pop_value()?;
                if !v.is_truthy() {
                    return Ok(Flow::Jump(jump_target(program, *label)?));
                }
            }
            Op::JumpIfTrue(label) => {
                let v = self.stack.pop_value()?;
                if v.is_truthy() {
                    return Ok(Flow::Jump(jump_target(program, *label)?));
                }
            }
            Op::CallBuiltin { name, argc } => {
                let mut call_args = Vec::with_capacity(*argc);
                for _ in 0..*argc {
                    call_args.push(self.stack.pop_value()?);
                }
                // Last popped is the leftmost argument.
                call_args.reverse();

                let entry = registry().lookup(name).ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::InvalidFunctionCall,
                        format!("`{}` is not a registered function", name),
                    )
                })?;
                let state = self.states.entry(instr.id).or_default();
                let mut ctx = CallContext {
                    state,
                    market_ts: self.market_ts,
                    sink: self.sink.as_mut(),
                };
                let result = (entry.execute)(&call_args, &mut ctx)?;
                self.push(result)?;
            }
            Op::CallFunc(argc) => {
                for _ in 0..(*argc + 1) {
                    self.stack.pop_value()?;
                }
                return Err(ScriptError::new(
                    ErrorKind::InvalidFunctionCall,
                    "user-defined functions are not supported",
                ));
            }
            Op::Pop => {
                self.stack.pop_value()?;
            }
            Op::Dup => {
                let top = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| ScriptError::new(ErrorKind::RuntimeError, "stack underflow"))?;
                self.push(top)?;
            }
            Op::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(ScriptError::new(ErrorKind::RuntimeError, "stack underflow"));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Op::Return => {
                let value = self.stack.pop_value()?;
                return Ok(Flow::Finish(value));
            }
            Op::Nop => {}
        }
        Ok(Flow::Continue)
    }

    fn push(&mut self, value: Value) -> ScriptResult<()> {
        if self.stack.len() >= self.max_stack {
            return Err(ScriptError::new(ErrorKind::RuntimeError, "stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn build_result(&mut self, last_result: Option<Value>) -> ExecutionResult {
        let vars = self
            .program
            .local_names
            .iter()
            .zip(self.locals.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let global_vars = self
            .program
            .global_names
            .iter()
            .zip(self.globals.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        ExecutionResult {
            output: std::mem::take(&mut self.output),
            vars,
            global_vars,
            last_result,
        }
    }
}

fn jump_target(program: &Program, label: u32) -> ScriptResult<usize> {
    program
        .labels
        .get(label as usize)
        .copied()
        .ok_or_else(|| ScriptError::new(ErrorKind::UndefinedLabel, format!("unknown label L{}", label)))
}

fn internal(message: &str) -> ScriptError {
    ScriptError::new(ErrorKind::RuntimeError, format!("internal: {}", message))
}

/// Attach the failing instruction's identity to an error.
fn decorate(err: ScriptError, instr: &Instr) -> ScriptError {
    let mut err = err
        .with_span(instr.span)
        .with_context("opcode", instr.op.name())
        .with_context("instruction", instr.id.to_string());
    match &instr.op {
        Op::CallBuiltin { name, .. } => err = err.with_context("name", name.clone()),
        Op::StoreOutput { name, .. } => err = err.with_context("name", name.clone()),
        _ => {}
    }
    err
}
