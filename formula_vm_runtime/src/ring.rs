//! Fixed-capacity ring buffers.
//!
//! [`Ring`] is the FIFO that backs every rolling indicator: O(1)
//! push-with-eviction, O(1) indexed read (index 0 is the oldest element),
//! no reallocation after construction. [`StatsRing`] specialises it to
//! numeric samples and maintains a running sum incrementally, so moving
//! averages are O(1) per bar.

use crate::error::{ScriptError, ScriptResult};

/// Fixed-capacity FIFO with O(1) indexed access.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    buf: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    /// Create a ring with the given capacity. Capacity must be positive.
    pub fn with_capacity(cap: usize) -> ScriptResult<Self> {
        if cap == 0 {
            return Err(ScriptError::invalid_argument(
                "ring buffer capacity must be positive",
            ));
        }
        let mut buf = Vec::with_capacity(cap);
        buf.resize_with(cap, || None);
        Ok(Self { buf, head: 0, len: 0 })
    }

    /// Append a value, evicting and returning the oldest element when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let cap = self.buf.len();
        let tail = (self.head + self.len) % cap;
        if self.len == cap {
            let evicted = self.buf[tail].replace(value);
            self.head = (self.head + 1) % cap;
            evicted
        } else {
            self.buf[tail] = Some(value);
            self.len += 1;
            None
        }
    }

    /// The i-th oldest element, `i` in `[0, len)`.
    pub fn get(&self, i: usize) -> Option<&T> {
        if i >= self.len {
            return None;
        }
        let cap = self.buf.len();
        self.buf[(self.head + i) % cap].as_ref()
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&T> {
        if self.len == 0 {
            None
        } else {
            self.get(self.len - 1)
        }
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.buf {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn full(&self) -> bool {
        self.len == self.buf.len()
    }

    pub fn cap(&self) -> usize {
        self.buf.len()
    }
}

impl<T: Clone> Ring<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Numeric ring with an incrementally maintained running sum.
///
/// Samples are `Option<f64>` so upstream warm-up nulls can flow through a
/// window; a null sample contributes `0.0` to the running sum.
#[derive(Debug, Clone)]
pub struct StatsRing {
    ring: Ring<Option<f64>>,
    sum: f64,
}

impl StatsRing {
    pub fn with_capacity(cap: usize) -> ScriptResult<Self> {
        Ok(Self {
            ring: Ring::with_capacity(cap)?,
            sum: 0.0,
        })
    }

    /// Push a sample, updating the running sum; returns the evicted sample.
    pub fn push(&mut self, sample: Option<f64>) -> Option<Option<f64>> {
        self.sum += sample.unwrap_or(0.0);
        let evicted = self.ring.push(sample);
        if let Some(old) = evicted {
            self.sum -= old.unwrap_or(0.0);
        }
        evicted
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Running average; 0 when empty.
    pub fn avg(&self) -> f64 {
        if self.ring.is_empty() {
            0.0
        } else {
            self.sum / self.ring.len() as f64
        }
    }

    /// Window values oldest to newest, nulls read as `0.0`.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.ring.iter().map(|s| s.unwrap_or(0.0))
    }

    /// Raw samples oldest to newest, nulls preserved.
    pub fn samples(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.ring.iter().copied()
    }

    pub fn get(&self, i: usize) -> Option<Option<f64>> {
        self.ring.get(i).copied()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.sum = 0.0;
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn full(&self) -> bool {
        self.ring.full()
    }

    pub fn cap(&self) -> usize {
        self.ring.cap()
    }
}
