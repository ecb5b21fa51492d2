//! Unified error model for compilation and execution.
//!
//! Every layer of the system (ring buffers, the compiler, indicator entries,
//! the VM) reports failures as a [`ScriptError`]: a kind tag, a human
//! message, an optional source span, and a sorted context map. The text form
//! is `[Kind] message at line L, column C {key: value, …}`.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// Error category tags.
///
/// Tags rather than distinct types: callers match on the kind, the rest of
/// the payload is uniform. The parser-facing kinds (`SyntaxError`,
/// `UnexpectedToken`, `MissingToken`, `InvalidOperator`,
/// `InvalidMemberAccess`) are part of the vocabulary so the external
/// lexer/parser can surface errors through the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("RuntimeError")]
    RuntimeError,
    #[error("TypeError")]
    TypeError,
    #[error("DivisionByZero")]
    DivisionByZero,
    #[error("InvalidArgument")]
    InvalidArgument,
    #[error("InvalidOperator")]
    InvalidOperator,
    #[error("InvalidAssignment")]
    InvalidAssignment,
    #[error("InvalidFunctionCall")]
    InvalidFunctionCall,
    #[error("InvalidMemberAccess")]
    InvalidMemberAccess,
    #[error("UndefinedVariable")]
    UndefinedVariable,
    #[error("UndefinedLabel")]
    UndefinedLabel,
    #[error("UnimplementedFeature")]
    UnimplementedFeature,
    #[error("SyntaxError")]
    SyntaxError,
    #[error("UnexpectedToken")]
    UnexpectedToken,
    #[error("MissingToken")]
    MissingToken,
    #[error("BuiltinError")]
    BuiltinError,
}

/// A tagged script error with optional source location and context.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub context: BTreeMap<String, String>,
}

pub type ScriptResult<T> = Result<T, ScriptError>;

impl ScriptError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a source span. An already-present span is kept; the innermost
    /// location is the most precise one.
    pub fn with_span(mut self, span: Option<Span>) -> Self {
        if self.span.is_none() {
            self.span = span;
        }
        self
    }

    /// Add one context entry (opcode name, operand, offending value, …).
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn type_error<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create a TypeError for "expected {expected}, got {got}" argument shapes.
    pub fn expected<S: Into<String>>(what: S, expected: &str, got: &str) -> Self {
        Self::new(
            ErrorKind::TypeError,
            format!("{}: expected {}, got {}", what.into(), expected, got),
        )
        .with_context("expected", expected)
        .with_context("actual", got)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(span) = &self.span {
            write!(
                f,
                " at line {}, column {}",
                span.start_line, span.start_column
            )?;
        }
        if !self.context.is_empty() {
            let entries: Vec<String> = self
                .context
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            write!(f, " {{{}}}", entries.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}
