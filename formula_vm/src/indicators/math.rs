//! Stateless scalar math, variadic reducers, and bar predicates.
//!
//! Every function here null-propagates, and domain violations (square root
//! of a negative, log of a non-positive, acos outside [-1, 1], modulo by
//! zero) return null rather than fail.

use formula_vm_runtime::{ScriptResult, Value};

use crate::registry::{CallContext, Registry};

use super::{expect_arity, num_arg};

pub fn install(registry: &mut Registry) {
    registry.register("ABS", |args, _ctx| unary("ABS", args, |x| Some(x.abs())));
    registry.register("ACOS", |args, _ctx| {
        unary("ACOS", args, |x| domain(x.acos(), (-1.0..=1.0).contains(&x)))
    });
    registry.register("ASIN", |args, _ctx| {
        unary("ASIN", args, |x| domain(x.asin(), (-1.0..=1.0).contains(&x)))
    });
    registry.register("ATAN", |args, _ctx| unary("ATAN", args, |x| Some(x.atan())));
    registry.register("SIN", |args, _ctx| unary("SIN", args, |x| Some(x.sin())));
    registry.register("COS", |args, _ctx| unary("COS", args, |x| Some(x.cos())));
    registry.register("TAN", |args, _ctx| unary("TAN", args, |x| Some(x.tan())));
    registry.register("EXP", |args, _ctx| unary("EXP", args, |x| Some(x.exp())));
    registry.register("LN", |args, _ctx| {
        unary("LN", args, |x| domain(x.ln(), x > 0.0))
    });
    registry.register("LOG", |args, _ctx| {
        unary("LOG", args, |x| domain(x.log10(), x > 0.0))
    });
    registry.register("SQRT", |args, _ctx| {
        unary("SQRT", args, |x| domain(x.sqrt(), x >= 0.0))
    });
    registry.register("SQUARE", |args, _ctx| unary("SQUARE", args, |x| Some(x * x)));
    registry.register("CUBE", |args, _ctx| unary("CUBE", args, |x| Some(x * x * x)));
    registry.register("CEILING", |args, _ctx| {
        unary("CEILING", args, |x| Some(x.ceil()))
    });
    registry.register("FLOOR", |args, _ctx| unary("FLOOR", args, |x| Some(x.floor())));
    registry.register("INTPART", |args, _ctx| {
        unary("INTPART", args, |x| Some(x.trunc()))
    });
    registry.register("SGN", |args, _ctx| {
        unary("SGN", args, |x| {
            Some(if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            })
        })
    });
    registry.register("REVERSE", |args, _ctx| unary("REVERSE", args, |x| Some(-x)));

    registry.register("POW", |args, _ctx| {
        binary("POW", args, |a, b| Some(a.powf(b)))
    });
    registry.register("MOD", |args, _ctx| {
        binary("MOD", args, |a, b| domain(a % b, b != 0.0))
    });
    registry.register("MAX2", |args, _ctx| binary("MAX2", args, |a, b| Some(a.max(b))));
    registry.register("MIN2", |args, _ctx| binary("MIN2", args, |a, b| Some(a.min(b))));

    registry.register("NOT", not);
    registry.register("BETWEEN", between);
    registry.register("RANGE", range);
    registry.register("IFELSE", ifelse);

    registry.register("MAX", |args, _ctx| variadic("MAX", args, f64::max));
    registry.register("MIN", |args, _ctx| variadic("MIN", args, f64::min));
    registry.register("PRINT", print);

    registry.register("ISUP", |args, _ctx| predicate("ISUP", args, |o, c| c > o));
    registry.register("ISDOWN", |args, _ctx| predicate("ISDOWN", args, |o, c| c < o));
    registry.register("ISEQUAL", |args, _ctx| predicate("ISEQUAL", args, |o, c| c == o));
}

fn domain(result: f64, in_domain: bool) -> Option<f64> {
    if in_domain {
        Some(result)
    } else {
        None
    }
}

fn unary<F: FnOnce(f64) -> Option<f64>>(
    name: &str,
    args: &[Value],
    f: F,
) -> ScriptResult<Value> {
    expect_arity(name, args, 1)?;
    match num_arg(name, args, 0)? {
        Some(x) => Ok(f(x).into()),
        None => Ok(Value::Null),
    }
}

fn binary<F: FnOnce(f64, f64) -> Option<f64>>(
    name: &str,
    args: &[Value],
    f: F,
) -> ScriptResult<Value> {
    expect_arity(name, args, 2)?;
    match (num_arg(name, args, 0)?, num_arg(name, args, 1)?) {
        (Some(a), Some(b)) => Ok(f(a, b).into()),
        _ => Ok(Value::Null),
    }
}

/// Variadic numeric reducer; any null argument makes the result null.
fn variadic(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> ScriptResult<Value> {
    if args.is_empty() {
        return Err(formula_vm_runtime::ScriptError::expected(
            name,
            "at least 1 argument",
            "0",
        ));
    }
    let mut acc: Option<f64> = None;
    for i in 0..args.len() {
        match num_arg(name, args, i)? {
            Some(v) => acc = Some(match acc {
                Some(a) => f(a, v),
                None => v,
            }),
            None => return Ok(Value::Null),
        }
    }
    Ok(acc.into())
}

/// Variadic sum, reached through `SUM` when the arity is not the windowed
/// two-argument form.
pub(crate) fn variadic_sum(args: &[Value], _ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    variadic("SUM", args, |a, b| a + b)
}

/// NOT(x): 1 when falsy, 0 when truthy; null passes through.
fn not(args: &[Value], _ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("NOT", args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Num(if args[0].is_truthy() { 0.0 } else { 1.0 }))
}

/// BETWEEN(x, a, b): 1 when x lies within [min(a,b), max(a,b)].
fn between(args: &[Value], _ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("BETWEEN", args, 3)?;
    match (
        num_arg("BETWEEN", args, 0)?,
        num_arg("BETWEEN", args, 1)?,
        num_arg("BETWEEN", args, 2)?,
    ) {
        (Some(x), Some(a), Some(b)) => {
            let (lo, hi) = (a.min(b), a.max(b));
            Ok(Value::Num(if x >= lo && x <= hi { 1.0 } else { 0.0 }))
        }
        _ => Ok(Value::Null),
    }
}

/// RANGE(x, a, b): 1 when a < x < b (strict).
fn range(args: &[Value], _ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("RANGE", args, 3)?;
    match (
        num_arg("RANGE", args, 0)?,
        num_arg("RANGE", args, 1)?,
        num_arg("RANGE", args, 2)?,
    ) {
        (Some(x), Some(a), Some(b)) => Ok(Value::Num(if a < x && x < b { 1.0 } else { 0.0 })),
        _ => Ok(Value::Null),
    }
}

/// IFELSE(cond, a, b): a when the condition is truthy, b otherwise (null
/// conditions are falsy).
fn ifelse(args: &[Value], _ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    expect_arity("IFELSE", args, 3)?;
    if args[0].is_truthy() {
        Ok(args[1].clone())
    } else {
        Ok(args[2].clone())
    }
}

/// PRINT(…): write the arguments space-separated to the output sink.
fn print(args: &[Value], ctx: &mut CallContext<'_>) -> ScriptResult<Value> {
    let line = args
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    ctx.sink.write_line(&line);
    Ok(Value::Null)
}

/// Bar predicates compare close to open; both arrive as ordinary arguments
/// (the compiler supplies them for the zero-argument call form).
fn predicate(name: &str, args: &[Value], f: fn(f64, f64) -> bool) -> ScriptResult<Value> {
    expect_arity(name, args, 2)?;
    match (num_arg(name, args, 0)?, num_arg(name, args, 1)?) {
        (Some(o), Some(c)) => Ok(Value::Bool(f(o, c))),
        _ => Ok(Value::Null),
    }
}
