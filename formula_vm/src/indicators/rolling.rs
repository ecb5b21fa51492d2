//! Fixed-window rolling indicators.

use formula_vm_runtime::{Ring, ScriptError, ScriptResult, Value};

use crate::registry::{CallContext, Registry};

use super::{expect_arity, rolling_bool, rolling_num, truthy_arg, window_arg, BoolBank};

pub fn install(registry: &mut Registry) {
    registry.register("MA", ma);
    registry.register("SUM", sum);
    registry.register("COUNT", count);
    registry.register("HHV", hhv);
    registry.register("LLV", llv);
    registry.register("HHVBARS", hhvbars);
    registry.register("LLVBARS", llvbars);
    registry.register("REF", ref_);
    registry.register("EXIST", exist);
    registry.register("EVERY", every);
    registry.register("LAST", last);
}

/// MA(x, n): simple moving average, O(1) via the running sum.
pub(crate) fn ma(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_num("MA", args, ctx, false, |ring| Value::Num(ring.avg()))
}

/// SUM(x, n): running window sum; n == 0 sums since the beginning.
/// With any other arity, the variadic reducer.
fn sum(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    if args.len() != 2 {
        return super::math::variadic_sum(args, ctx);
    }
    rolling_num("SUM", args, ctx, true, |ring| Value::Num(ring.sum()))
}

/// COUNT(cond, n): number of true conditions in the window.
fn count(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_bool("COUNT", args, ctx, |ring| {
        Value::Num(ring.iter().filter(|b| **b).count() as f64)
    })
}

/// HHV(x, n): highest value in the window; n == 0 means since beginning.
fn hhv(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_num("HHV", args, ctx, true, |ring| {
        Value::Num(ring.values().fold(f64::NEG_INFINITY, f64::max))
    })
}

/// LLV(x, n): lowest value in the window; n == 0 means since beginning.
fn llv(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_num("LLV", args, ctx, true, |ring| {
        Value::Num(ring.values().fold(f64::INFINITY, f64::min))
    })
}

/// Bars between the window's extreme and its newest element. Ties resolve
/// to the most recent occurrence.
fn bars_since_extreme<F: Fn(f64, f64) -> bool>(
    ring: &formula_vm_runtime::StatsRing,
    better: F,
) -> f64 {
    let mut best = f64::NAN;
    let mut best_idx = 0usize;
    for (idx, v) in ring.values().enumerate() {
        if best.is_nan() || better(v, best) || v == best {
            best = v;
            best_idx = idx;
        }
    }
    (ring.len() - 1 - best_idx) as f64
}

/// HHVBARS(x, n): bars since the window high.
fn hhvbars(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_num("HHVBARS", args, ctx, false, |ring| {
        Value::Num(bars_since_extreme(ring, |v, best| v > best))
    })
}

/// LLVBARS(x, n): bars since the window low.
fn llvbars(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_num("LLVBARS", args, ctx, false, |ring| {
        Value::Num(bars_since_extreme(ring, |v, best| v < best))
    })
}

#[derive(Default)]
struct RefState {
    bufs: std::collections::HashMap<usize, Ring<Value>>,
}

/// REF(x, n): the value from n bars ago. The window is read before the
/// current value is pushed, so the oldest buffered element is exactly n
/// bars old once the buffer fills.
fn ref_(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("REF", args, 2)?;
    let x = args[0].clone();
    let n = window_arg("REF", args, 1)?;
    if n == 0 {
        return Ok(x);
    }

    let state = ctx.state.get_or_default::<RefState>();
    if !state.bufs.contains_key(&n) {
        state.bufs.insert(n, Ring::with_capacity(n)?);
    }
    let ring = match state.bufs.get_mut(&n) {
        Some(ring) => ring,
        None => unreachable!("ref buffer inserted immediately above"),
    };
    let result = if ring.full() {
        ring.first().cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    };
    ring.push(x);
    Ok(result)
}

/// EXIST(cond, n): 1 when at least one condition in the window was true.
fn exist(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_bool("EXIST", args, ctx, |ring| {
        Value::Num(if ring.iter().any(|b| *b) { 1.0 } else { 0.0 })
    })
}

/// EVERY(cond, n): 1 when every condition in the window was true.
fn every(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    rolling_bool("EVERY", args, ctx, |ring| {
        Value::Num(if ring.iter().all(|b| *b) { 1.0 } else { 0.0 })
    })
}

/// LAST(cond, n1, n2): 1 when the condition held continuously from n2 to
/// n1 bars ago inclusive (n1 >= n2, 0 = the current bar).
fn last(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("LAST", args, 3)?;
    let cond = truthy_arg(args, 0);
    let n1 = window_arg("LAST", args, 1)?;
    let n2 = window_arg("LAST", args, 2)?;
    if n1 < n2 {
        return Err(ScriptError::expected(
            "LAST argument 2",
            "n1 >= n2",
            &format!("n1={} n2={}", n1, n2),
        ));
    }

    let cap = n1 + 1;
    let bank = ctx.state.get_or_default::<BoolBank>();
    let ring = bank.window(cap)?;
    ring.push(cond);
    if !ring.full() {
        return Ok(Value::Null);
    }
    let newest = ring.len() - 1;
    let held = (n2..=n1).all(|ago| ring.get(newest - ago).copied().unwrap_or(false));
    Ok(Value::Num(if held { 1.0 } else { 0.0 }))
}
