//! Deviation and regression statistics over a rolling window.
//!
//! All of these share the rolling contract: null until the window fills,
//! then an O(n) scan of the window.

use formula_vm_runtime::{StatsRing, Value};

use crate::registry::Registry;

use super::rolling_num;

pub fn install(registry: &mut Registry) {
    registry.register("VAR", |args, ctx| {
        rolling_num("VAR", args, ctx, false, |ring| sample_variance(ring, 1.0))
    });
    registry.register("VARP", |args, ctx| {
        rolling_num("VARP", args, ctx, false, |ring| sample_variance(ring, 0.0))
    });
    registry.register("STD", |args, ctx| {
        rolling_num("STD", args, ctx, false, |ring| sqrt_of(sample_variance(ring, 1.0)))
    });
    registry.register("STDP", |args, ctx| {
        rolling_num("STDP", args, ctx, false, |ring| sqrt_of(sample_variance(ring, 0.0)))
    });
    registry.register("AVEDEV", |args, ctx| {
        rolling_num("AVEDEV", args, ctx, false, avedev)
    });
    registry.register("DEVSQ", |args, ctx| {
        rolling_num("DEVSQ", args, ctx, false, devsq)
    });
    registry.register("SLOPE", |args, ctx| {
        rolling_num("SLOPE", args, ctx, false, |ring| {
            Value::Num(regression(ring).0)
        })
    });
    registry.register("FORCAST", |args, ctx| {
        rolling_num("FORCAST", args, ctx, false, |ring| {
            let (slope, intercept) = regression(ring);
            Value::Num(intercept + slope * (ring.len() as f64 - 1.0))
        })
    });
    registry.register("TSMA", |args, ctx| {
        rolling_num("TSMA", args, ctx, false, |ring| {
            let (slope, intercept) = regression(ring);
            Value::Num(intercept + slope * ring.len() as f64)
        })
    });
    registry.register("TRMA", |args, ctx| {
        rolling_num("TRMA", args, ctx, false, triangular_mean)
    });
    registry.register("EMA2", |args, ctx| {
        rolling_num("EMA2", args, ctx, false, linear_weighted_mean)
    });
}

/// Variance with the given degrees-of-freedom correction (1 = sample,
/// 0 = population). A one-element sample window has no sample variance.
fn sample_variance(ring: &StatsRing, ddof: f64) -> Value {
    let len = ring.len() as f64;
    if len - ddof <= 0.0 {
        return Value::Null;
    }
    let mean = ring.avg();
    let ss: f64 = ring.values().map(|v| (v - mean) * (v - mean)).sum();
    Value::Num(ss / (len - ddof))
}

fn sqrt_of(v: Value) -> Value {
    match v {
        Value::Num(n) if n >= 0.0 => Value::Num(n.sqrt()),
        _ => Value::Null,
    }
}

/// Mean absolute deviation from the window mean.
fn avedev(ring: &StatsRing) -> Value {
    let mean = ring.avg();
    let total: f64 = ring.values().map(|v| (v - mean).abs()).sum();
    Value::Num(total / ring.len() as f64)
}

/// Sum of squared deviations from the window mean.
fn devsq(ring: &StatsRing) -> Value {
    let mean = ring.avg();
    Value::Num(ring.values().map(|v| (v - mean) * (v - mean)).sum())
}

/// Least-squares line over the window with x positions 0..len. Returns
/// (slope, intercept). A single-point window has slope 0.
fn regression(ring: &StatsRing) -> (f64, f64) {
    let len = ring.len() as f64;
    if ring.len() < 2 {
        return (0.0, ring.avg());
    }
    let mean_x = (len - 1.0) / 2.0;
    let mean_y = ring.avg();
    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (i, y) in ring.values().enumerate() {
        let dx = i as f64 - mean_x;
        cov += dx * (y - mean_y);
        var_x += dx * dx;
    }
    let slope = cov / var_x;
    (slope, mean_y - slope * mean_x)
}

/// Triangular weighted mean: weights rise to the middle of the window and
/// fall again (1, 2, …, peak, …, 2, 1).
fn triangular_mean(ring: &StatsRing) -> Value {
    let len = ring.len();
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (i, v) in ring.values().enumerate() {
        let w = (i + 1).min(len - i) as f64;
        total += v * w;
        weight_sum += w;
    }
    Value::Num(total / weight_sum)
}

/// Linearly weighted mean with the newest sample weighted heaviest.
fn linear_weighted_mean(ring: &StatsRing) -> Value {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (i, v) in ring.values().enumerate() {
        let w = (i + 1) as f64;
        total += v * w;
        weight_sum += w;
    }
    Value::Num(total / weight_sum)
}
