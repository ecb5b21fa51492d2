//! Exponential and weighted smoothing.

use formula_vm_runtime::{ScriptError, ScriptResult, Value};

use crate::registry::{CallContext, Registry};

use super::{expect_arity, num_arg, rolling_num, window_arg};

pub fn install(registry: &mut Registry) {
    registry.register("EMA", ema);
    registry.register("SMA", sma);
    registry.register("DMA", dma);
}

/// Previous smoothed value, carried across bars.
#[derive(Default)]
struct SmoothState {
    prev: Option<f64>,
}

/// EMA(x, n): exponential moving average with alpha 2/(n+1). The first
/// sample (and n == 1) passes through; a null sample yields null without
/// disturbing the state; n <= 0 yields null.
fn ema(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("EMA", args, 2)?;
    let x = match num_arg("EMA", args, 0)? {
        Some(x) => x,
        None => return Ok(Value::Null),
    };
    let n = match num_arg("EMA", args, 1)? {
        Some(n) if n >= 1.0 => n,
        _ => return Ok(Value::Null),
    };

    let state = ctx.state.get_or_default::<SmoothState>();
    let next = match state.prev {
        None => x,
        Some(_) if n == 1.0 => x,
        Some(prev) => (x - prev) * 2.0 / (n + 1.0) + prev,
    };
    state.prev = Some(next);
    Ok(Value::Num(next))
}

/// SMA(x, n) behaves as `MA`; SMA(x, n, m) is the weighted smoothing
/// `prev * (n - m) / n + x * m / n` with `0 < m <= n`.
fn sma(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    if args.len() == 2 {
        return rolling_num("SMA", args, ctx, false, |ring| Value::Num(ring.avg()));
    }
    expect_arity("SMA", args, 3)?;
    let n = window_arg("SMA", args, 1)? as f64;
    let m = window_arg("SMA", args, 2)? as f64;
    if m <= 0.0 || m > n {
        return Err(ScriptError::expected(
            "SMA argument 3",
            "0 < m <= n",
            &format!("n={} m={}", n, m),
        ));
    }
    let x = match num_arg("SMA", args, 0)? {
        Some(x) => x,
        None => return Ok(Value::Null),
    };

    let state = ctx.state.get_or_default::<SmoothState>();
    let next = match state.prev {
        None => x,
        Some(prev) => prev * (n - m) / n + x * m / n,
    };
    state.prev = Some(next);
    Ok(Value::Num(next))
}

/// DMA(x, a): dynamic smoothing `prev * (1 - a) + x * a` with `0 < a < 1`.
fn dma(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("DMA", args, 2)?;
    let a = num_arg("DMA", args, 1)?.ok_or_else(|| {
        ScriptError::expected("DMA argument 2", "smoothing factor", "null")
    })?;
    if a <= 0.0 || a >= 1.0 {
        return Err(ScriptError::expected(
            "DMA argument 2",
            "0 < a < 1",
            &a.to_string(),
        ));
    }
    let x = match num_arg("DMA", args, 0)? {
        Some(x) => x,
        None => return Ok(Value::Null),
    };

    let state = ctx.state.get_or_default::<SmoothState>();
    let next = match state.prev {
        None => x,
        Some(prev) => prev * (1.0 - a) + x * a,
    };
    state.prev = Some(next);
    Ok(Value::Num(next))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{n, run_stream};
    use formula_vm_runtime::Value;

    #[test]
    fn ema_seeds_with_first_sample() {
        let calls: Vec<Vec<Value>> = [10.0, 13.0, 16.0]
            .iter()
            .map(|v| vec![Value::Num(*v), Value::Num(3.0)])
            .collect();
        let out = run_stream("EMA", calls);
        assert_eq!(out[0], n(10.0));
        // alpha = 2/(3+1) = 0.5
        assert_eq!(out[1], n(11.5));
        assert_eq!(out[2], n(13.75));
    }

    #[test]
    fn ema_with_unit_window_tracks_input() {
        let calls: Vec<Vec<Value>> = [5.0, 9.0]
            .iter()
            .map(|v| vec![Value::Num(*v), Value::Num(1.0)])
            .collect();
        assert_eq!(run_stream("EMA", calls), vec![n(5.0), n(9.0)]);
    }

    #[test]
    fn ema_null_propagates_without_touching_state() {
        let calls = vec![
            vec![Value::Num(10.0), Value::Num(3.0)],
            vec![Value::Null, Value::Num(3.0)],
            vec![Value::Num(14.0), Value::Num(3.0)],
        ];
        let out = run_stream("EMA", calls);
        assert_eq!(out[1], Value::Null);
        assert_eq!(out[2], n(12.0));
    }

    #[test]
    fn ema_invalid_window_is_null() {
        let out = run_stream("EMA", vec![vec![Value::Num(5.0), Value::Num(0.0)]]);
        assert_eq!(out, vec![Value::Null]);
    }

    #[test]
    fn sma_two_args_is_a_window_average() {
        let calls: Vec<Vec<Value>> = [2.0, 4.0, 6.0]
            .iter()
            .map(|v| vec![Value::Num(*v), Value::Num(2.0)])
            .collect();
        let out = run_stream("SMA", calls);
        assert_eq!(out, vec![Value::Null, n(3.0), n(5.0)]);
    }

    #[test]
    fn sma_three_args_smooths() {
        let calls: Vec<Vec<Value>> = [10.0, 20.0]
            .iter()
            .map(|v| vec![Value::Num(*v), Value::Num(4.0), Value::Num(1.0)])
            .collect();
        let out = run_stream("SMA", calls);
        assert_eq!(out[0], n(10.0));
        // 10 * 3/4 + 20 * 1/4
        assert_eq!(out[1], n(12.5));
    }

    #[test]
    fn dma_smooths_with_fixed_alpha() {
        let calls: Vec<Vec<Value>> = [10.0, 20.0]
            .iter()
            .map(|v| vec![Value::Num(*v), Value::Num(0.5)])
            .collect();
        let out = run_stream("DMA", calls);
        assert_eq!(out, vec![n(10.0), n(15.0)]);
    }

    #[test]
    fn dma_rejects_alpha_out_of_range() {
        let entry = crate::registry::registry().lookup("DMA").unwrap();
        let mut state = crate::registry::SiteState::new();
        let mut sink = crate::registry::BufferSink::default();
        let mut ctx = crate::registry::CallContext {
            state: &mut state,
            market_ts: 0.0,
            sink: &mut sink,
        };
        let err = (entry.execute)(&[Value::Num(1.0), Value::Num(1.5)], &mut ctx).unwrap_err();
        assert_eq!(err.kind, formula_vm_runtime::ErrorKind::TypeError);
    }
}
