//! Crossings and event tracking.

use formula_vm_runtime::{Ring, ScriptResult, Value};

use crate::registry::{CallContext, Registry};

use super::{expect_arity, num_arg, truthy_arg, window_arg};

pub fn install(registry: &mut Registry) {
    registry.register("CROSS", cross);
    registry.register("CROSSDOWN", crossdown);
    registry.register("LONGCROSS", longcross);
    registry.register("BARSLAST", barslast);
    registry.register("VALUEWHEN", valuewhen);
    registry.register("FILTER", filter);
}

/// Sign of a - b from the previous bar.
#[derive(Default)]
struct DiffState {
    prev: Option<f64>,
}

fn cross_impl(
    name: &str,
    args: &[Value],
    ctx: &mut CallContext<'_>,
    golden: bool,
) -> ScriptResult<Value> {
    expect_arity(name, args, 2)?;
    let a = num_arg(name, args, 0)?;
    let b = num_arg(name, args, 1)?;
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(Value::Null),
    };
    let diff = a - b;
    let state = ctx.state.get_or_default::<DiffState>();
    let crossed = match state.prev {
        Some(prev) if golden => prev < 0.0 && diff > 0.0,
        Some(prev) => prev > 0.0 && diff < 0.0,
        None => false,
    };
    state.prev = Some(diff);
    Ok(if crossed { Value::Num(1.0) } else { Value::Null })
}

/// CROSS(a, b): 1 on the bar where a crosses above b (golden cross).
fn cross(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    cross_impl("CROSS", args, ctx, true)
}

/// CROSSDOWN(a, b): 1 on the bar where a crosses below b.
fn crossdown(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    cross_impl("CROSSDOWN", args, ctx, false)
}

#[derive(Default)]
struct LongCrossState {
    below: std::collections::HashMap<usize, Ring<bool>>,
}

/// LONGCROSS(a, b, n): 1 when a < b held for the prior n bars and a >= b
/// now. Null until n prior bars have been seen.
fn longcross(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("LONGCROSS", args, 3)?;
    let a = num_arg("LONGCROSS", args, 0)?;
    let b = num_arg("LONGCROSS", args, 1)?;
    let n = window_arg("LONGCROSS", args, 2)?;
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(Value::Null),
    };
    if n == 0 {
        return Err(formula_vm_runtime::ScriptError::expected(
            "LONGCROSS argument 3",
            "positive window size",
            "0",
        ));
    }

    let state = ctx.state.get_or_default::<LongCrossState>();
    if !state.below.contains_key(&n) {
        state.below.insert(n, Ring::with_capacity(n)?);
    }
    let ring = match state.below.get_mut(&n) {
        Some(ring) => ring,
        None => unreachable!("longcross buffer inserted immediately above"),
    };

    let result = if !ring.full() {
        Value::Null
    } else {
        let held_below = ring.iter().all(|lt| *lt);
        Value::Num(if held_below && a >= b { 1.0 } else { 0.0 })
    };
    ring.push(a < b);
    Ok(result)
}

#[derive(Default)]
struct BarsLastState {
    bars_seen: u64,
    last_true: Option<u64>,
}

/// BARSLAST(cond): bars since the condition was last true; 0 on the bar it
/// holds, null before it has ever held.
fn barslast(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("BARSLAST", args, 1)?;
    let cond = truthy_arg(args, 0);
    let state = ctx.state.get_or_default::<BarsLastState>();
    let current = state.bars_seen;
    state.bars_seen += 1;
    if cond {
        state.last_true = Some(current);
        return Ok(Value::Num(0.0));
    }
    match state.last_true {
        Some(last) => Ok(Value::Num((current - last) as f64)),
        None => Ok(Value::Null),
    }
}

#[derive(Default)]
struct ValueWhenState {
    last_value: Option<Value>,
}

/// VALUEWHEN(cond, data): the data value captured the last time the
/// condition was true; null until the first trigger.
fn valuewhen(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("VALUEWHEN", args, 2)?;
    let cond = truthy_arg(args, 0);
    let state = ctx.state.get_or_default::<ValueWhenState>();
    if cond {
        state.last_value = Some(args[1].clone());
    }
    Ok(state.last_value.clone().unwrap_or(Value::Null))
}

#[derive(Default)]
struct FilterState {
    bars_seen: u64,
    last_emit: Option<u64>,
}

/// FILTER(cond, n): 1 when the condition is true and at least n bars have
/// passed since the previous emission; 0 otherwise.
fn filter(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("FILTER", args, 2)?;
    let cond = truthy_arg(args, 0);
    let n = window_arg("FILTER", args, 1)? as u64;
    let state = ctx.state.get_or_default::<FilterState>();
    let current = state.bars_seen;
    state.bars_seen += 1;

    let allowed = match state.last_emit {
        Some(last) => current - last >= n,
        None => true,
    };
    if cond && allowed {
        state.last_emit = Some(current);
        Ok(Value::Num(1.0))
    } else {
        Ok(Value::Num(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{n, run_stream};
    use formula_vm_runtime::Value;

    fn pairs(series: &[(f64, f64)]) -> Vec<Vec<Value>> {
        series
            .iter()
            .map(|(a, b)| vec![Value::Num(*a), Value::Num(*b)])
            .collect()
    }

    #[test]
    fn cross_fires_once_at_the_crossover() {
        let out = run_stream(
            "CROSS",
            pairs(&[(1.0, 2.0), (1.5, 2.0), (2.5, 2.0), (3.0, 2.0)]),
        );
        assert_eq!(out, vec![Value::Null, Value::Null, n(1.0), Value::Null]);
    }

    #[test]
    fn crossdown_is_the_mirror() {
        let out = run_stream("CROSSDOWN", pairs(&[(3.0, 2.0), (1.0, 2.0), (0.5, 2.0)]));
        assert_eq!(out, vec![Value::Null, n(1.0), Value::Null]);
    }

    #[test]
    fn cross_with_null_operand_is_null() {
        let calls = vec![
            vec![Value::Null, Value::Num(2.0)],
            vec![Value::Num(1.0), Value::Num(2.0)],
            vec![Value::Num(3.0), Value::Num(2.0)],
        ];
        let out = run_stream("CROSS", calls);
        assert_eq!(out[0], Value::Null);
        assert_eq!(out[2], n(1.0));
    }

    #[test]
    fn longcross_needs_a_sustained_hold() {
        // a < b for two bars, then a >= b.
        let out = run_stream(
            "LONGCROSS",
            [(1.0, 5.0), (2.0, 5.0), (6.0, 5.0), (7.0, 5.0)]
                .iter()
                .map(|(a, b)| vec![Value::Num(*a), Value::Num(*b), Value::Num(2.0)])
                .collect(),
        );
        assert_eq!(out, vec![Value::Null, Value::Null, n(1.0), n(0.0)]);
    }

    #[test]
    fn barslast_counts_bars_since_trigger() {
        let calls: Vec<Vec<Value>> = [false, true, false, false, true]
            .iter()
            .map(|c| vec![Value::Bool(*c)])
            .collect();
        let out = run_stream("BARSLAST", calls);
        assert_eq!(
            out,
            vec![Value::Null, n(0.0), n(1.0), n(2.0), n(0.0)]
        );
    }

    #[test]
    fn valuewhen_latches_the_trigger_value() {
        let calls = vec![
            vec![Value::Bool(false), Value::Num(10.0)],
            vec![Value::Bool(true), Value::Num(20.0)],
            vec![Value::Bool(false), Value::Num(30.0)],
        ];
        let out = run_stream("VALUEWHEN", calls);
        assert_eq!(out, vec![Value::Null, n(20.0), n(20.0)]);
    }

    #[test]
    fn filter_spaces_out_emissions() {
        let calls: Vec<Vec<Value>> = [true, true, true, true]
            .iter()
            .map(|c| vec![Value::Bool(*c), Value::Num(2.0)])
            .collect();
        let out = run_stream("FILTER", calls);
        assert_eq!(out, vec![n(1.0), n(0.0), n(1.0), n(0.0)]);
    }
}
