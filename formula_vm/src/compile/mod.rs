//! Tree-to-IR compiler.
//!
//! The compiler walks the parsed statement list once and emits a single flat
//! instruction stream for `main`, threading its mutable state (the constants
//! vector, the local and global slot maps, the label table, and the stack
//! depth) explicitly through the walk.
//!
//! # Module Organization
//!
//! - `stmt.rs`: statement lowering (expression statements, `VARIABLE:`
//!   declarations, `IF`/`BEGIN`/`RETURN`)
//! - `expr.rs`: expression lowering (literals, identifiers, operators,
//!   assignment forms, calls)

mod expr;
mod stmt;

use std::collections::{BTreeMap, HashMap};

use log::debug;

use formula_vm_runtime::{canonical_field, ErrorKind, ScriptError, ScriptResult, Span, Value};

use crate::ast::Script;
use crate::ir::{stack_effect, Function, Instr, Op, Program};

/// Market-data globals reserved before anything else, in slot order.
pub const MARKET_GLOBALS: [&str; 4] = ["O", "H", "L", "C"];

/// Names the compiler forbids on the left-hand side of any assignment.
pub const PROTECTED_WORDS: [&str; 11] = [
    "O", "H", "L", "C", "VARIABLE", "IF", "THEN", "ELSE", "BEGIN", "END", "RETURN",
];

/// Compilation options.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Capture source spans into instructions for runtime error reporting.
    pub debug: bool,
    /// Additional embedder-declared globals, reserved after the market
    /// fields so bar ingestion can target them (e.g. `"V"`).
    pub globals: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            debug: true,
            globals: Vec::new(),
        }
    }
}

/// Unplaced-label sentinel in the label table during compilation.
const UNPLACED: usize = usize::MAX;

/// The tree-to-IR compiler. One instance compiles one script.
pub struct Compiler {
    options: CompileOptions,
    code: Vec<Instr>,
    constants: Vec<Value>,
    locals: HashMap<String, usize>,
    local_names: Vec<String>,
    globals: HashMap<String, usize>,
    global_names: Vec<String>,
    labels: Vec<usize>,
    next_id: u32,
    depth: i64,
    max_depth: i64,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        let mut compiler = Self {
            options,
            code: Vec::new(),
            constants: Vec::new(),
            locals: HashMap::new(),
            local_names: Vec::new(),
            globals: HashMap::new(),
            global_names: Vec::new(),
            labels: Vec::new(),
            next_id: 0,
            depth: 0,
            max_depth: 0,
        };
        // Market fields first so bar writes always target stable slots.
        for name in MARKET_GLOBALS {
            compiler.global_slot(name);
        }
        let declared: Vec<String> = compiler.options.globals.clone();
        for name in declared {
            let canonical = canonical_field(&name).to_string();
            compiler.global_slot(&canonical);
        }
        compiler
    }

    /// Compile a parsed script into an executable program.
    pub fn compile(mut self, script: &Script) -> ScriptResult<Program> {
        let last = script.body.len().saturating_sub(1);
        for (i, stmt) in script.body.iter().enumerate() {
            self.lower_stmt(stmt, i == last)?;
        }

        if let Some(unplaced) = self.labels.iter().position(|pos| *pos == UNPLACED) {
            return Err(ScriptError::new(
                ErrorKind::UndefinedLabel,
                format!("label L{} was never placed", unplaced),
            ));
        }

        let program = Program {
            main: Function {
                code: self.code,
                locals_count: self.local_names.len(),
                globals_count: self.global_names.len(),
                max_stack_depth: self.max_depth.max(0) as usize,
            },
            constants: self.constants,
            labels: self.labels,
            global_slots: self
                .globals
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect::<BTreeMap<_, _>>(),
            local_names: self.local_names,
            global_names: self.global_names,
        };
        program.validate()?;

        debug!(
            "compiled script: {} instructions, {} constants, {} locals, {} globals, max stack {}",
            program.main.code.len(),
            program.constants.len(),
            program.main.locals_count,
            program.main.globals_count,
            program.main.max_stack_depth
        );
        Ok(program)
    }

    // ==================== Emission helpers ====================

    /// Append one instruction, updating the stack-depth accounting.
    pub(crate) fn emit(&mut self, op: Op, span: Option<Span>) -> ScriptResult<()> {
        let (pops, pushes) = stack_effect(&op);
        self.depth -= pops as i64;
        if self.depth < 0 {
            // A negative depth can only come from a lowering bug, never from
            // user input.
            return Err(ScriptError::new(
                ErrorKind::RuntimeError,
                format!("internal: stack depth went negative at {}", op.name()),
            )
            .with_span(span));
        }
        self.depth += pushes as i64;
        self.max_depth = self.max_depth.max(self.depth);

        let mut instr = Instr::new(self.next_id, op);
        if self.options.debug {
            instr.span = span;
        }
        self.next_id += 1;
        self.code.push(instr);
        Ok(())
    }

    pub(crate) fn current_depth(&self) -> i64 {
        self.depth
    }

    /// Intern a constant by append; returns its index.
    pub(crate) fn intern(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub(crate) fn emit_const(&mut self, value: Value, span: Option<Span>) -> ScriptResult<()> {
        let idx = self.intern(value);
        self.emit(Op::LoadConst(idx), span)
    }

    // ==================== Labels ====================

    /// Reserve a fresh label id; it must be placed before compilation ends.
    pub(crate) fn new_label(&mut self) -> u32 {
        self.labels.push(UNPLACED);
        (self.labels.len() - 1) as u32
    }

    /// Record the label's position and emit its `NOP` landing pad, so jumps
    /// always land on an executable instruction.
    pub(crate) fn place_label(&mut self, label: u32, span: Option<Span>) -> ScriptResult<()> {
        self.labels[label as usize] = self.code.len();
        self.emit(Op::Nop, span)
    }

    // ==================== Slots ====================

    /// Slot for a global name, allocating on first sight.
    pub(crate) fn global_slot(&mut self, name: &str) -> usize {
        if let Some(slot) = self.globals.get(name) {
            return *slot;
        }
        let slot = self.global_names.len();
        self.globals.insert(name.to_string(), slot);
        self.global_names.push(name.to_string());
        slot
    }

    /// Look up a global without allocating. Market aliases resolve to their
    /// canonical slot.
    pub(crate) fn resolve_global(&self, name: &str) -> Option<usize> {
        self.globals.get(canonical_field(name)).copied()
    }

    /// Slot for a local name, allocating on first sight.
    pub(crate) fn local_slot(&mut self, name: &str) -> usize {
        if let Some(slot) = self.locals.get(name) {
            return *slot;
        }
        let slot = self.local_names.len();
        self.locals.insert(name.to_string(), slot);
        self.local_names.push(name.to_string());
        slot
    }

    pub(crate) fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals.get(name).copied()
    }

    pub(crate) fn is_protected(name: &str) -> bool {
        let canonical = canonical_field(name);
        PROTECTED_WORDS.iter().any(|w| *w == canonical)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
