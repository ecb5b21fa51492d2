//! Market bar input and field-name canonicalisation.
//!
//! A [`Bar`] is one tick of OHLC(+T) data: a map from uppercase field name to
//! numeric value. `T` (timestamp), `O`, `H`, `L`, `C` are the fields the VM
//! knows about; embedders may declare more. Long-form aliases (`OPEN`,
//! `HIGH`, `LOW`, `CLOSE`, `VOL`) resolve to the same slots as the short
//! names; canonicalisation is a lookup concern, applied both when a bar is
//! ingested and when the compiler resolves a global name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Long-form to short-form field aliases.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("OPEN", "O"),
    ("HIGH", "H"),
    ("LOW", "L"),
    ("CLOSE", "C"),
    ("VOL", "V"),
];

/// Resolve a field name to its canonical (short) form.
pub fn canonical_field(name: &str) -> &str {
    for (alias, short) in FIELD_ALIASES {
        if name == *alias {
            return short;
        }
    }
    name
}

/// One bar of market data.
///
/// Backed by a `BTreeMap` so iteration order (and therefore global-slot
/// ingestion order in the VM) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    fields: BTreeMap<String, f64>,
}

impl Bar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard OHLC bar with timestamp.
    pub fn ohlc(t: f64, o: f64, h: f64, l: f64, c: f64) -> Self {
        Bar::new()
            .with("T", t)
            .with("O", o)
            .with("H", h)
            .with("L", l)
            .with("C", c)
    }

    /// Bar carrying only a close (open/high/low mirror it). Convenient for
    /// tests and close-only feeds.
    pub fn close_only(t: f64, c: f64) -> Self {
        Self::ohlc(t, c, c, c, c)
    }

    pub fn with<S: Into<String>>(mut self, field: S, value: f64) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn set<S: Into<String>>(&mut self, field: S, value: f64) {
        self.fields.insert(field.into(), value);
    }

    /// Look a field up by exact name.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    /// Timestamp, if the bar carries one.
    pub fn timestamp(&self) -> Option<f64> {
        self.get("T")
    }

    /// Iterate `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_field_maps_long_names() {
        assert_eq!(canonical_field("OPEN"), "O");
        assert_eq!(canonical_field("CLOSE"), "C");
        assert_eq!(canonical_field("VOL"), "V");
        assert_eq!(canonical_field("C"), "C");
        assert_eq!(canonical_field("MYFIELD"), "MYFIELD");
    }

    #[test]
    fn ohlc_constructor_sets_all_fields() {
        let bar = Bar::ohlc(1.0, 10.0, 12.0, 9.0, 11.0);
        assert_eq!(bar.get("T"), Some(1.0));
        assert_eq!(bar.get("O"), Some(10.0));
        assert_eq!(bar.get("H"), Some(12.0));
        assert_eq!(bar.get("L"), Some(9.0));
        assert_eq!(bar.get("C"), Some(11.0));
        assert_eq!(bar.get("V"), None);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let bar = Bar::new().with("T", 1.0).with("C", 2.0).with("A", 3.0);
        let keys: Vec<&str> = bar.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "C", "T"]);
    }
}
