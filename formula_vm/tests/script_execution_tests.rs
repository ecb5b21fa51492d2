//! End-to-end script scenarios: compile once, execute once per bar.

mod common;

use common::{assign, bars_from_closes, display, n, output_series, run, var_decl};

use formula_vm::ast::{AssignOp, BinaryOp, Expr, Script, Stmt};
use formula_vm::{api, Bar, ErrorKind, Value, Vm, VmOptions};

#[test]
fn assigning_to_a_market_field_fails_at_compile_time() {
    // C := MA(C, 3); K : C;
    let script = Script::new(vec![
        assign(
            "C",
            Expr::call("MA", vec![Expr::ident("C"), Expr::num(3.0)]),
        ),
        display("K", Expr::ident("C")),
    ]);
    let err = api::compile(&script).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidAssignment);
}

#[test]
fn counter_survives_across_bars() {
    // VARIABLE: cnt := 0; cnt := cnt + 1; cnt : cnt;
    let body = vec![
        var_decl("cnt", Expr::num(0.0)),
        assign(
            "cnt",
            Expr::binary(BinaryOp::Add, Expr::ident("cnt"), Expr::num(1.0)),
        ),
        display("cnt", Expr::ident("cnt")),
    ];
    let results = run(body, &[1.0; 10]);
    let series = output_series(&results, "cnt");
    let expected: Vec<Value> = (1..=10).map(|i| n(i as f64)).collect();
    assert_eq!(series, expected);
}

#[test]
fn moving_average_warms_up_then_tracks() {
    // m := MA(C, 3); m : m;
    let body = vec![
        assign(
            "m",
            Expr::call("MA", vec![Expr::ident("C"), Expr::num(3.0)]),
        ),
        display("m", Expr::ident("m")),
    ];
    let results = run(body, &[102.0, 106.0, 107.0, 109.0, 113.0]);
    let series = output_series(&results, "m");
    assert_eq!(series[0], Value::Null);
    assert_eq!(series[1], Value::Null);
    assert_eq!(series[2], n(105.0));
    assert!((series[3].as_num().unwrap() - 107.333333).abs() < 1e-5);
    assert!((series[4].as_num().unwrap() - 109.666666).abs() < 1e-5);
}

#[test]
fn ref_looks_one_bar_back() {
    // p := REF(C, 1); p : p;
    let body = vec![
        assign(
            "p",
            Expr::call("REF", vec![Expr::ident("C"), Expr::num(1.0)]),
        ),
        display("p", Expr::ident("p")),
    ];
    let results = run(body, &[10.0, 20.0, 30.0]);
    assert_eq!(
        output_series(&results, "p"),
        vec![Value::Null, n(10.0), n(20.0)]
    );
}

#[test]
fn if_branches_assign_different_values() {
    // IF C > O THEN BEGIN t := 1; END ELSE BEGIN t := -1; END
    let body = vec![Stmt::If {
        test: Expr::binary(BinaryOp::Gt, Expr::ident("C"), Expr::ident("O")),
        consequent: Box::new(Stmt::block(vec![assign("t", Expr::num(1.0))])),
        alternate: Some(Box::new(Stmt::block(vec![assign("t", Expr::num(-1.0))]))),
    }];
    let script = Script::new(body);

    let up = api::run_script(&script, &[Bar::ohlc(1.0, 100.0, 103.0, 99.0, 102.0)]).unwrap();
    assert_eq!(up[0].vars["t"], n(1.0));

    let down = api::run_script(&script, &[Bar::ohlc(1.0, 100.0, 101.0, 94.0, 95.0)]).unwrap();
    assert_eq!(down[0].vars["t"], n(-1.0));
}

#[test]
fn golden_cross_fires_exactly_once() {
    // x := CROSS(MA(C,2), MA(C,4)); x : x;
    let body = vec![
        assign(
            "x",
            Expr::call(
                "CROSS",
                vec![
                    Expr::call("MA", vec![Expr::ident("C"), Expr::num(2.0)]),
                    Expr::call("MA", vec![Expr::ident("C"), Expr::num(4.0)]),
                ],
            ),
        ),
        display("x", Expr::ident("x")),
    ];
    let closes = [20.0, 18.0, 16.0, 14.0, 12.0, 10.0, 14.0, 18.0, 22.0, 26.0];
    let results = run(body, &closes);
    let series = output_series(&results, "x");

    let ones: Vec<usize> = series
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == n(1.0))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(ones, vec![7], "short MA crosses the long MA on bar 7");
    for (i, v) in series.iter().enumerate() {
        if i != 7 {
            assert_eq!(*v, Value::Null, "bar {}", i);
        }
    }
}

#[test]
fn unregistered_function_compiles_but_fails_at_runtime() {
    let script = Script::new(vec![assign(
        "x",
        Expr::call("NOSUCH", vec![Expr::num(1.0)]),
    )]);
    let program = api::compile(&script).expect("compiler does not pre-validate names");
    let mut vm = Vm::new(program);
    let err = vm.execute(&Bar::close_only(1.0, 1.0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidFunctionCall);
}

#[test]
fn division_by_zero_reports_kind_and_location() {
    let body = vec![Stmt::expr(Expr::binary(
        BinaryOp::Div,
        Expr::ident("C"),
        Expr::num(0.0),
    ))];
    let script = Script::new(body);
    let program = api::compile(&script).unwrap();
    let mut vm = Vm::new(program);
    let err = vm.execute(&Bar::close_only(1.0, 5.0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
    assert_eq!(err.context.get("opcode").map(String::as_str), Some("DIV"));
    let text = err.to_string();
    assert!(text.starts_with("[DivisionByZero]"), "{}", text);
}

#[test]
fn last_statement_value_is_the_bar_result() {
    let body = vec![
        assign("x", Expr::num(3.0)),
        Stmt::expr(Expr::binary(
            BinaryOp::Mul,
            Expr::ident("x"),
            Expr::num(2.0),
        )),
    ];
    let results = run(body, &[1.0]);
    assert_eq!(results[0].last_result, Some(n(6.0)));
}

#[test]
fn logical_operators_combine_conditions() {
    // hot := C > 10 && C < 20; hot : hot;
    let body = vec![display(
        "hot",
        Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::Gt, Expr::ident("C"), Expr::num(10.0)),
            Expr::binary(BinaryOp::Lt, Expr::ident("C"), Expr::num(20.0)),
        ),
    )];
    let results = run(body, &[5.0, 15.0, 25.0]);
    assert_eq!(
        output_series(&results, "hot"),
        vec![Value::Bool(false), Value::Bool(true), Value::Bool(false)]
    );
}

#[test]
fn print_writes_to_the_provided_sink() {
    // PRINT(C); (sink output is observed via a shared buffer)
    use formula_vm::OutputSink;
    use std::sync::{Arc, Mutex};

    struct SharedSink(Arc<Mutex<Vec<String>>>);
    impl OutputSink for SharedSink {
        fn write_line(&mut self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = SharedSink(Arc::clone(&lines));

    let script = Script::new(vec![Stmt::expr(Expr::call(
        "PRINT",
        vec![Expr::ident("C"), Expr::str("close")],
    ))]);
    let program = api::compile(&script).unwrap();
    let options = VmOptions {
        sink: Box::new(sink),
        ..VmOptions::default()
    };
    let mut vm = Vm::with_options(program, options);
    vm.execute(&Bar::close_only(1.0, 42.0)).unwrap();

    assert_eq!(lines.lock().unwrap().as_slice(), &["42 close".to_string()]);
}

#[test]
fn else_if_chains_pick_the_matching_branch() {
    // IF C > 20 THEN t := 2 ELSE IF C > 10 THEN t := 1 ELSE t := 0
    let body = vec![Stmt::If {
        test: Expr::binary(BinaryOp::Gt, Expr::ident("C"), Expr::num(20.0)),
        consequent: Box::new(assign("t", Expr::num(2.0))),
        alternate: Some(Box::new(Stmt::If {
            test: Expr::binary(BinaryOp::Gt, Expr::ident("C"), Expr::num(10.0)),
            consequent: Box::new(assign("t", Expr::num(1.0))),
            alternate: Some(Box::new(assign("t", Expr::num(0.0)))),
        })),
    }];
    let script = Script::new(body);
    for (close, expected) in [(25.0, 2.0), (15.0, 1.0), (5.0, 0.0)] {
        let results = api::run_script(&script, &bars_from_closes(&[close])).unwrap();
        assert_eq!(results[0].vars["t"], n(expected), "close {}", close);
    }
}

#[test]
fn display_assign_of_a_global_updates_both_maps() {
    // VARIABLE: lvl := 0; lvl : C;
    let body = vec![
        var_decl("lvl", Expr::num(0.0)),
        Stmt::expr(Expr::assign(
            AssignOp::Display,
            Expr::ident("lvl"),
            Expr::ident("C"),
        )),
    ];
    let results = run(body, &[42.0]);
    assert_eq!(results[0].output["lvl"], n(42.0));
    assert_eq!(results[0].global_vars["lvl"], n(42.0));
}
