//! Shared runtime data model for FormulaVM.
//!
//! This crate holds the pieces that both the compiler and the virtual machine
//! depend on, with no dependency on either: the tagged [`Value`], the [`Bar`]
//! market-data input, the fixed-capacity [`Ring`] / [`StatsRing`] buffers that
//! back rolling indicators, source [`Span`]s, and the unified
//! [`ScriptError`] / [`ErrorKind`] error model.

pub mod bar;
pub mod error;
pub mod ring;
pub mod span;
pub mod value;

pub use bar::{canonical_field, Bar};
pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use ring::{Ring, StatsRing};
pub use span::Span;
pub use value::Value;
