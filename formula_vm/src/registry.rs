//! The indicator registry.
//!
//! A process-global, write-once map from uppercase name to a stateful
//! function entry. The VM resolves `CALL_BUILTIN` instructions here and hands
//! each entry the argument vector plus a [`CallContext`] carrying the
//! call site's persistent state, the current bar timestamp, and the output
//! sink.

use std::any::Any;
use std::collections::HashMap;
use std::io::Write;

use once_cell::sync::Lazy;

use formula_vm_runtime::{ScriptResult, Value};

use crate::indicators;

/// Destination for script-visible output (`PRINT`).
pub trait OutputSink {
    fn write_line(&mut self, line: &str);
}

/// Default sink: stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "{}", line);
    }
}

/// Sink that collects lines in memory; used by tests and embedders that
/// capture output.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub lines: Vec<String>,
}

impl OutputSink for BufferSink {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

/// Type-erased per-call-site state.
///
/// The VM owns one of these per `CALL_BUILTIN` instruction and never looks
/// inside; the owning indicator downcasts to its concrete state struct. The
/// compiler binds one call site to one registry name, so the type stored
/// here is stable for the lifetime of the VM.
#[derive(Default)]
pub struct SiteState {
    inner: Option<Box<dyn Any>>,
}

impl SiteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the state as `T`, initialising it with `T::default()` on the
    /// first call (or after a type change, which the call-site binding rules
    /// make unreachable).
    pub fn get_or_default<T: Default + 'static>(&mut self) -> &mut T {
        let needs_init = match &self.inner {
            Some(boxed) => !boxed.is::<T>(),
            None => true,
        };
        if needs_init {
            self.inner = Some(Box::<T>::default());
        }
        // The variant was just ensured above.
        match self.inner.as_mut().and_then(|b| b.downcast_mut::<T>()) {
            Some(state) => state,
            None => unreachable!("site state was initialised immediately above"),
        }
    }
}

/// Per-call context handed to every entry.
pub struct CallContext<'a> {
    /// Persistent state for this call site; survives across bars.
    pub state: &'a mut SiteState,
    /// Timestamp of the current bar.
    pub market_ts: f64,
    /// Embedder-provided output sink.
    pub sink: &'a mut dyn OutputSink,
}

/// The function type implementing one indicator.
pub type EntryFn = fn(&[Value], &mut CallContext<'_>) -> ScriptResult<Value>;

/// One registry entry.
#[derive(Clone, Copy)]
pub struct Entry {
    pub name: &'static str,
    pub execute: EntryFn,
}

/// Name-to-entry map, immutable after initialisation.
pub struct Registry {
    entries: HashMap<&'static str, Entry>,
}

impl Registry {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an entry under its primary name. Duplicate keys are a
    /// startup invariant violation.
    pub(crate) fn register(&mut self, name: &'static str, execute: EntryFn) {
        let entry = Entry { name, execute };
        if self.entries.insert(name, entry).is_some() {
            panic!("duplicate indicator registration: {}", name);
        }
    }

    /// Register the same entry under an additional name.
    pub(crate) fn alias(&mut self, alias: &'static str, target: &'static str) {
        let entry = match self.entries.get(target) {
            Some(entry) => *entry,
            None => panic!("alias {} points at unregistered entry {}", alias, target),
        };
        if self.entries.insert(alias, entry).is_some() {
            panic!("duplicate indicator registration: {}", alias);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::new();
    indicators::install(&mut registry);
    registry
});

/// The process-global registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_core_entries() {
        let reg = registry();
        for name in [
            "MA", "SMA", "EMA", "DMA", "SUM", "COUNT", "HHV", "LLV", "HHVBARS", "LLVBARS", "REF",
            "CROSS", "CROSSDOWN", "LONGCROSS", "BARSLAST", "VALUEWHEN", "EXIST", "EVERY", "LAST",
            "FILTER", "VAR", "VARP", "STD", "STDP", "AVEDEV", "DEVSQ", "SLOPE", "FORCAST", "TRMA",
            "TSMA", "EMA2", "ABS", "SQRT", "POW", "MOD", "MAX", "MIN", "MAX2", "MIN2", "IFELSE",
            "NOT", "BETWEEN", "RANGE", "PRINT", "ISUP", "ISDOWN", "ISEQUAL",
        ] {
            assert!(reg.lookup(name).is_some(), "missing entry {}", name);
        }
    }

    #[test]
    fn aliases_share_the_entry() {
        let reg = registry();
        let iff = reg.lookup("IFF").unwrap();
        let ifelse = reg.lookup("IFELSE").unwrap();
        assert_eq!(iff.execute as usize, ifelse.execute as usize);
        let crossup = reg.lookup("CROSSUP").unwrap();
        let cross = reg.lookup("CROSS").unwrap();
        assert_eq!(crossup.execute as usize, cross.execute as usize);
    }

    #[test]
    fn unknown_name_misses() {
        assert!(registry().lookup("NOSUCH").is_none());
    }

    #[test]
    fn site_state_round_trips_a_typed_value() {
        let mut state = SiteState::new();
        {
            let counter = state.get_or_default::<u64>();
            *counter += 5;
        }
        assert_eq!(*state.get_or_default::<u64>(), 5);
    }

    #[test]
    fn buffer_sink_collects_lines() {
        let mut sink = BufferSink::default();
        sink.write_line("a");
        sink.write_line("b");
        assert_eq!(sink.lines, vec!["a", "b"]);
    }
}
