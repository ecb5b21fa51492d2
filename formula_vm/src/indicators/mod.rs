//! The stateful indicator library.
//!
//! Every entry obeys one contract: it is called once per bar per call site,
//! and whatever it stashes in the call site's [`SiteState`] survives to the
//! next bar. Rolling indicators keep ring buffers there; smoothers keep a
//! scalar; cross detectors keep the previous difference.
//!
//! Families:
//! - [`rolling`]: fixed-window statistics (`MA`, `SUM`, `HHV`, `REF`, …)
//! - [`smooth`]: exponential and weighted smoothing (`EMA`, `SMA`, `DMA`)
//! - [`cross`]: crossings and event tracking (`CROSS`, `BARSLAST`, …)
//! - [`stats`]: regression and deviation over a window (`STD`, `SLOPE`, …)
//! - [`math`]: stateless scalar math, variadic reducers, bar predicates

pub mod cross;
pub mod math;
pub mod rolling;
pub mod smooth;
pub mod stats;

use std::collections::HashMap;

use formula_vm_runtime::{ScriptError, ScriptResult, StatsRing, Value};

use crate::registry::{CallContext, Registry};

/// Window capacity used when a window argument of 0 means "since the
/// beginning of the stream".
pub const SINCE_BEGINNING_CAP: usize = 1000;

/// Install every indicator family plus the aliases.
pub fn install(registry: &mut Registry) {
    rolling::install(registry);
    smooth::install(registry);
    cross::install(registry);
    stats::install(registry);
    math::install(registry);

    registry.alias("IFF", "IFELSE");
    registry.alias("CROSSUP", "CROSS");
}

// ==================== Argument helpers ====================

pub(crate) fn expect_arity(name: &str, args: &[Value], n: usize) -> ScriptResult<()> {
    if args.len() != n {
        return Err(ScriptError::expected(
            name,
            &format!("{} arguments", n),
            &format!("{}", args.len()),
        ));
    }
    Ok(())
}

/// Numeric argument: numbers as-is, booleans as 0/1, null as `None`.
pub(crate) fn num_arg(name: &str, args: &[Value], i: usize) -> ScriptResult<Option<f64>> {
    match args.get(i) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_num() {
            Some(n) => Ok(Some(n)),
            None => Err(ScriptError::expected(
                format!("{} argument {}", name, i + 1),
                "number",
                v.type_name(),
            )),
        },
    }
}

/// Window-size argument: a non-null, non-negative number, truncated.
pub(crate) fn window_arg(name: &str, args: &[Value], i: usize) -> ScriptResult<usize> {
    let n = num_arg(name, args, i)?.ok_or_else(|| {
        ScriptError::expected(format!("{} argument {}", name, i + 1), "window size", "null")
    })?;
    if n < 0.0 || !n.is_finite() {
        return Err(ScriptError::expected(
            format!("{} argument {}", name, i + 1),
            "non-negative window size",
            &n.to_string(),
        ));
    }
    Ok(n as usize)
}

/// Condition argument: plain truthiness, null reads as false.
pub(crate) fn truthy_arg(args: &[Value], i: usize) -> bool {
    args.get(i).map(Value::is_truthy).unwrap_or(false)
}

// ==================== Shared window state ====================

/// Ring buffers keyed by effective window size.
///
/// One call site normally sees one window size for its whole life, but the
/// window argument is an expression and may change mid-stream; each distinct
/// size gets its own buffer, so the site keeps one sub-state per argument
/// shape.
#[derive(Default)]
pub(crate) struct WindowBank {
    bufs: HashMap<usize, StatsRing>,
}

impl WindowBank {
    pub(crate) fn window(&mut self, cap: usize) -> ScriptResult<&mut StatsRing> {
        if !self.bufs.contains_key(&cap) {
            self.bufs.insert(cap, StatsRing::with_capacity(cap)?);
        }
        match self.bufs.get_mut(&cap) {
            Some(ring) => Ok(ring),
            None => unreachable!("window buffer inserted immediately above"),
        }
    }
}

/// Boolean ring buffers keyed by window size, for condition windows.
#[derive(Default)]
pub(crate) struct BoolBank {
    bufs: HashMap<usize, formula_vm_runtime::Ring<bool>>,
}

impl BoolBank {
    pub(crate) fn window(&mut self, cap: usize) -> ScriptResult<&mut formula_vm_runtime::Ring<bool>> {
        if !self.bufs.contains_key(&cap) {
            self.bufs
                .insert(cap, formula_vm_runtime::Ring::with_capacity(cap)?);
        }
        match self.bufs.get_mut(&cap) {
            Some(ring) => Ok(ring),
            None => unreachable!("window buffer inserted immediately above"),
        }
    }
}

/// Common shape of the numeric rolling indicators: push `x` into the site's
/// window of size `n`, return null until the window fills, then compute the
/// statistic. `zero_means_all` enables the `n == 0` "since beginning"
/// convention.
pub(crate) fn rolling_num<F>(
    name: &str,
    args: &[Value],
    ctx: &mut CallContext<'_>,
    zero_means_all: bool,
    stat: F,
) -> ScriptResult<Value>
where
    F: FnOnce(&StatsRing) -> Value,
{
    expect_arity(name, args, 2)?;
    let x = num_arg(name, args, 0)?;
    let n = window_arg(name, args, 1)?;
    let cap = if n == 0 {
        if !zero_means_all {
            return Err(ScriptError::expected(
                format!("{} argument 2", name),
                "positive window size",
                "0",
            ));
        }
        SINCE_BEGINNING_CAP
    } else {
        n
    };

    let bank = ctx.state.get_or_default::<WindowBank>();
    let ring = bank.window(cap)?;
    ring.push(x);
    if n > 0 && !ring.full() {
        return Ok(Value::Null);
    }
    Ok(stat(ring))
}

/// Common shape of the boolean condition windows (`COUNT`, `EXIST`,
/// `EVERY`): push the condition, null until full, then fold the window.
pub(crate) fn rolling_bool<F>(
    name: &str,
    args: &[Value],
    ctx: &mut CallContext<'_>,
    fold: F,
) -> ScriptResult<Value>
where
    F: FnOnce(&formula_vm_runtime::Ring<bool>) -> Value,
{
    expect_arity(name, args, 2)?;
    let cond = truthy_arg(args, 0);
    let n = window_arg(name, args, 1)?;
    if n == 0 {
        return Err(ScriptError::expected(
            format!("{} argument 2", name),
            "positive window size",
            "0",
        ));
    }

    let bank = ctx.state.get_or_default::<BoolBank>();
    let ring = bank.window(n)?;
    ring.push(cond);
    if !ring.full() {
        return Ok(Value::Null);
    }
    Ok(fold(ring))
}
