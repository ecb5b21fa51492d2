use criterion::{black_box, criterion_group, criterion_main, Criterion};

use formula_vm::ast::{AssignOp, Expr, Script, Stmt};
use formula_vm::{api, Bar, StatsRing, Vm};

fn display(name: &str, expr: Expr) -> Stmt {
    Stmt::expr(Expr::assign(AssignOp::Display, Expr::ident(name), expr))
}

fn bench_stats_ring(c: &mut Criterion) {
    c.bench_function("stats_ring_push_window_20", |b| {
        let mut ring = StatsRing::with_capacity(20).unwrap();
        let mut x = 0.0f64;
        b.iter(|| {
            x += 1.0;
            ring.push(Some(black_box(x)));
            black_box(ring.avg())
        });
    });
}

fn bench_execute_bar(c: &mut Criterion) {
    // m := MA(C, 20); s := EMA(C, 12); x := CROSS(m, s); x : x;
    let script = Script::new(vec![
        Stmt::expr(Expr::assign(
            AssignOp::Assign,
            Expr::ident("m"),
            Expr::call("MA", vec![Expr::ident("C"), Expr::num(20.0)]),
        )),
        Stmt::expr(Expr::assign(
            AssignOp::Assign,
            Expr::ident("s"),
            Expr::call("EMA", vec![Expr::ident("C"), Expr::num(12.0)]),
        )),
        Stmt::expr(Expr::assign(
            AssignOp::Assign,
            Expr::ident("x"),
            Expr::call("CROSS", vec![Expr::ident("m"), Expr::ident("s")]),
        )),
        display("x", Expr::ident("x")),
    ]);
    let program = api::compile(&script).unwrap();

    c.bench_function("execute_bar_ma_ema_cross", |b| {
        let mut vm = Vm::new(program.clone());
        let mut t = 0.0f64;
        b.iter(|| {
            t += 1.0;
            let close = 100.0 + (t * 0.1).sin() * 5.0;
            let bar = Bar::close_only(t, close);
            black_box(vm.execute(&bar).unwrap())
        });
    });
}

fn bench_compile(c: &mut Criterion) {
    let script = Script::new(vec![display(
        "k",
        Expr::call("MA", vec![Expr::ident("C"), Expr::num(5.0)]),
    )]);
    c.bench_function("compile_small_script", |b| {
        b.iter(|| api::compile(black_box(&script)).unwrap())
    });
}

criterion_group!(benches, bench_stats_ring, bench_execute_bar, bench_compile);
criterion_main!(benches);
