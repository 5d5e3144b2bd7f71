/*!
# Instrumentation Integration Tests

Instruments whole compilation units and runs them on the reference
evaluator, checking the reports a trace sink receives.
*/

use scribe_core::ast::{
    Annotation, AssignOp, BinaryOp, Block, ClassDecl, CompilationUnit, Expr, FieldDecl, ForInit,
    Literal, MethodDecl, Stmt, SwitchCase, TypeRef, UnaryOp,
};
use scribe_core::config::DEFAULT_RUNTIME_CLASS;
use scribe_core::interp::EvalResult;
use scribe_core::model::{ClassInfo, Method};
use scribe_core::translator::PassContext;
use scribe_core::{
    InstrumentError, InstrumentationConfig, InstrumentationPipeline, Interpreter, MarkerSet,
    Outcome, Pass, RecordingSink, SkipReason, ThrownValue, ToSource, TraceEvent, TraceValue,
    TreeBuilder, Unwind, Value,
};

fn int_field(name: &str, value: i64) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        ty: TypeRef::new("int"),
        is_static: true,
        init: Some(Expr::int(value)),
    }
}

fn single_class(class: ClassDecl) -> CompilationUnit {
    CompilationUnit {
        package: None,
        classes: vec![class],
    }
}

fn instrument(
    mut unit: CompilationUnit,
    config: InstrumentationConfig,
) -> anyhow::Result<CompilationUnit> {
    InstrumentationPipeline::new(config).instrument_unit(&mut unit)?;
    Ok(unit)
}

fn run(
    unit: &CompilationUnit,
    class: &str,
    method: &str,
    args: Vec<Value>,
) -> (EvalResult<Value>, Vec<TraceEvent>) {
    let sink = RecordingSink::new();
    let result = Interpreter::new(unit, &sink, DEFAULT_RUNTIME_CLASS).call(class, method, args);
    (result, sink.events())
}

fn count(events: &[TraceEvent], method: &str, pred: fn(&TraceEvent) -> bool) -> usize {
    events
        .iter()
        .filter(|e| e.method() == method && pred(e))
        .count()
}

fn is_exit(event: &TraceEvent) -> bool {
    matches!(event, TraceEvent::Exiting { .. })
}

fn is_error(event: &TraceEvent) -> bool {
    matches!(event, TraceEvent::Error { .. })
}

#[test]
fn test_value_reported_after_assignment_takes_effect() -> anyhow::Result<()> {
    // void bump(int a) { total = total + a; total += 1; }
    let unit = single_class(
        ClassDecl::new("Counter")
            .with_field(int_field("total", 0))
            .with_method(MethodDecl::new("bump").param("a", "int").body(vec![
                Stmt::expr(Expr::assign(
                    Expr::name("total"),
                    Expr::binary(BinaryOp::Add, Expr::name("total"), Expr::name("a")),
                )),
                Stmt::expr(Expr::compound(AssignOp::Add, Expr::name("total"), Expr::int(1))),
            ])),
    );
    let unit = instrument(unit, InstrumentationConfig::default())?;

    let sink = RecordingSink::new();
    let mut interp = Interpreter::new(&unit, &sink, DEFAULT_RUNTIME_CLASS);
    interp.call("Counter", "bump", vec![Value::Int(2)])?;

    assert_eq!(
        sink.value_changes("Counter.bump"),
        vec![
            ("total".to_string(), TraceValue::Int(2)),
            ("total".to_string(), TraceValue::Int(3)),
        ]
    );
    assert_eq!(interp.static_field("Counter", "total")?, Value::Int(3));
    Ok(())
}

/// `class Seq { static int calls = 0; static int next() { calls += 1; return calls; } }`
/// with `method` added, instrumented with the default configuration
fn sequence_unit(method: MethodDecl) -> anyhow::Result<CompilationUnit> {
    let next = MethodDecl::new("next").returns("int").body(vec![
        Stmt::expr(Expr::compound(AssignOp::Add, Expr::name("calls"), Expr::int(1))),
        Stmt::ret(Expr::name("calls")),
    ]);
    let class = ClassDecl::new("Seq")
        .with_field(int_field("calls", 0))
        .with_method(next)
        .with_method(method);
    instrument(single_class(class), InstrumentationConfig::default())
}

/// Call `Seq.<method>` and collect the values reported for `name`
fn reported(
    unit: &CompilationUnit,
    method: &str,
    args: Vec<Value>,
    name: &str,
) -> anyhow::Result<(Value, Vec<TraceValue>)> {
    let sink = RecordingSink::new();
    let value = Interpreter::new(unit, &sink, DEFAULT_RUNTIME_CLASS).call("Seq", method, args)?;
    let values = sink
        .value_changes(&format!("Seq.{method}"))
        .into_iter()
        .filter(|(target, _)| target == name)
        .map(|(_, value)| value)
        .collect();
    Ok((value, values))
}

fn ints(values: &[i64]) -> Vec<TraceValue> {
    values.iter().copied().map(TraceValue::Int).collect()
}

fn assign(name: &str, value: Expr) -> Expr {
    Expr::assign(Expr::name(name), value)
}

fn next() -> Expr {
    Expr::call("next", vec![])
}

#[test]
fn test_else_if_conditions_reported() -> anyhow::Result<()> {
    // int pick(int a) {
    //     int n = 0;
    //     if (a == 1) {} else if ((n = a) == 2) {} else if ((n = n * 10) > 0) {}
    //     return n;
    // }
    let chain = Stmt::if_then(
        Expr::binary(BinaryOp::Eq, Expr::name("a"), Expr::int(1)),
        Stmt::block(Vec::new()),
        Some(Stmt::if_then(
            Expr::binary(BinaryOp::Eq, assign("n", Expr::name("a")), Expr::int(2)),
            Stmt::block(Vec::new()),
            Some(Stmt::if_then(
                Expr::binary(
                    BinaryOp::Gt,
                    assign(
                        "n",
                        Expr::binary(BinaryOp::Mul, Expr::name("n"), Expr::int(10)),
                    ),
                    Expr::int(0),
                ),
                Stmt::block(Vec::new()),
                None,
            )),
        )),
    );
    let unit = sequence_unit(MethodDecl::new("pick").returns("int").param("a", "int").body(
        vec![
            Stmt::local("int", "n", Expr::int(0)),
            chain,
            Stmt::ret(Expr::name("n")),
        ],
    ))?;

    let (value, n) = reported(&unit, "pick", vec![Value::Int(3)], "n")?;
    assert_eq!(value, Value::Int(30));
    assert_eq!(n, ints(&[0, 3, 30]));

    let (value, n) = reported(&unit, "pick", vec![Value::Int(2)], "n")?;
    assert_eq!(value, Value::Int(2));
    assert_eq!(n, ints(&[0, 2]));

    let (_, n) = reported(&unit, "pick", vec![Value::Int(1)], "n")?;
    assert_eq!(n, ints(&[0]));
    Ok(())
}

#[test]
fn test_while_condition_reported_once_per_evaluation() -> anyhow::Result<()> {
    // int untilBreak() { int n = 0; while ((n = next()) > 0) { if (n == 2) { break; } } return n; }
    let until_break = MethodDecl::new("untilBreak").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::while_loop(
            Expr::binary(BinaryOp::Gt, assign("n", next()), Expr::int(0)),
            Stmt::block(vec![Stmt::if_then(
                Expr::binary(BinaryOp::Eq, Expr::name("n"), Expr::int(2)),
                Stmt::block(vec![Stmt::Break(None)]),
                None,
            )]),
        ),
        Stmt::ret(Expr::name("n")),
    ]);
    let unit = sequence_unit(until_break)?;
    let (value, n) = reported(&unit, "untilBreak", vec![], "n")?;
    assert_eq!(value, Value::Int(2));
    assert_eq!(n, ints(&[0, 1, 2]));

    // int untilFalse() { int n = 0; while ((n = next()) < 3) {} return n; }
    let until_false = MethodDecl::new("untilFalse").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::while_loop(
            Expr::binary(BinaryOp::Lt, assign("n", next()), Expr::int(3)),
            Stmt::block(Vec::new()),
        ),
        Stmt::ret(Expr::name("n")),
    ]);
    let unit = sequence_unit(until_false)?;
    let (value, n) = reported(&unit, "untilFalse", vec![], "n")?;
    assert_eq!(value, Value::Int(3));
    assert_eq!(n, ints(&[0, 1, 2, 3]));
    Ok(())
}

#[test]
fn test_for_condition_with_continue_and_break() -> anyhow::Result<()> {
    // int skipTwo() {
    //     int n = 0; int seen = 0;
    //     for (int i = 0; (n = next()) < 4; i++) { if (n == 2) { continue; } seen += n; }
    //     return seen;
    // }
    let skip_two = MethodDecl::new("skipTwo").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::local("int", "seen", Expr::int(0)),
        Stmt::For {
            init: ForInit::Decl {
                ty: TypeRef::new("int"),
                name: "i".into(),
                init: Expr::int(0),
            },
            cond: Some(Expr::binary(BinaryOp::Lt, assign("n", next()), Expr::int(4))),
            update: vec![Expr::unary(UnaryOp::PostInc, Expr::name("i"))],
            body: Box::new(Stmt::block(vec![
                Stmt::if_then(
                    Expr::binary(BinaryOp::Eq, Expr::name("n"), Expr::int(2)),
                    Stmt::block(vec![Stmt::Continue(None)]),
                    None,
                ),
                Stmt::expr(Expr::compound(AssignOp::Add, Expr::name("seen"), Expr::name("n"))),
            ])),
        },
        Stmt::ret(Expr::name("seen")),
    ]);
    let unit = sequence_unit(skip_two)?;
    let (value, n) = reported(&unit, "skipTwo", vec![], "n")?;
    assert_eq!(value, Value::Int(4));
    assert_eq!(n, ints(&[0, 1, 2, 3, 4]));
    let (_, i) = reported(&unit, "skipTwo", vec![], "i")?;
    assert_eq!(i, ints(&[0, 1, 2, 3]));

    // int firstThree() { int n = 0; for (; (n = next()) > 0;) { if (n == 3) { break; } } return n; }
    let first_three = MethodDecl::new("firstThree").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::For {
            init: ForInit::default(),
            cond: Some(Expr::binary(BinaryOp::Gt, assign("n", next()), Expr::int(0))),
            update: Vec::new(),
            body: Box::new(Stmt::block(vec![Stmt::if_then(
                Expr::binary(BinaryOp::Eq, Expr::name("n"), Expr::int(3)),
                Stmt::block(vec![Stmt::Break(None)]),
                None,
            )])),
        },
        Stmt::ret(Expr::name("n")),
    ]);
    let unit = sequence_unit(first_three)?;
    let (value, n) = reported(&unit, "firstThree", vec![], "n")?;
    assert_eq!(value, Value::Int(3));
    assert_eq!(n, ints(&[0, 1, 2, 3]));
    Ok(())
}

#[test]
fn test_do_while_condition_reported_each_iteration() -> anyhow::Result<()> {
    // int count() { int n = 0; do {} while ((n = n + 1) < 3); return n; }
    let increment = || {
        Expr::binary(
            BinaryOp::Lt,
            assign("n", Expr::binary(BinaryOp::Add, Expr::name("n"), Expr::int(1))),
            Expr::int(3),
        )
    };
    let count_up = MethodDecl::new("count").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::DoWhile {
            body: Box::new(Stmt::block(Vec::new())),
            cond: increment(),
        },
        Stmt::ret(Expr::name("n")),
    ]);
    let unit = sequence_unit(count_up)?;
    let (value, n) = reported(&unit, "count", vec![], "n")?;
    assert_eq!(value, Value::Int(3));
    assert_eq!(n, ints(&[0, 1, 2, 3]));

    // int odd() {
    //     int n = 0; int odd = 0;
    //     do { if (n % 2 == 0) { continue; } odd += 1; } while ((n = n + 1) < 5);
    //     return odd;
    // }
    let odd = MethodDecl::new("odd").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::local("int", "odd", Expr::int(0)),
        Stmt::DoWhile {
            body: Box::new(Stmt::block(vec![
                Stmt::if_then(
                    Expr::binary(
                        BinaryOp::Eq,
                        Expr::binary(BinaryOp::Rem, Expr::name("n"), Expr::int(2)),
                        Expr::int(0),
                    ),
                    Stmt::block(vec![Stmt::Continue(None)]),
                    None,
                ),
                Stmt::expr(Expr::compound(AssignOp::Add, Expr::name("odd"), Expr::int(1))),
            ])),
            cond: Expr::binary(
                BinaryOp::Lt,
                assign("n", Expr::binary(BinaryOp::Add, Expr::name("n"), Expr::int(1))),
                Expr::int(5),
            ),
        },
        Stmt::ret(Expr::name("odd")),
    ]);
    let unit = sequence_unit(odd)?;
    let (value, n) = reported(&unit, "odd", vec![], "n")?;
    assert_eq!(value, Value::Int(2));
    assert_eq!(n, ints(&[0, 1, 2, 3, 4, 5]));
    let (_, odd) = reported(&unit, "odd", vec![], "odd")?;
    assert_eq!(odd, ints(&[0, 1, 2]));

    // int labeled() {
    //     int n = 0;
    //     outer: do { for (int k = 0; k < 2; k++) { if (k == 1) { continue outer; } } }
    //            while ((n = n + 1) < 3);
    //     return n;
    // }
    let inner = Stmt::For {
        init: ForInit::Decl {
            ty: TypeRef::new("int"),
            name: "k".into(),
            init: Expr::int(0),
        },
        cond: Some(Expr::binary(BinaryOp::Lt, Expr::name("k"), Expr::int(2))),
        update: vec![Expr::unary(UnaryOp::PostInc, Expr::name("k"))],
        body: Box::new(Stmt::block(vec![Stmt::if_then(
            Expr::binary(BinaryOp::Eq, Expr::name("k"), Expr::int(1)),
            Stmt::block(vec![Stmt::Continue(Some("outer".into()))]),
            None,
        )])),
    };
    let labeled = MethodDecl::new("labeled").returns("int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::Labeled {
            label: "outer".into(),
            body: Box::new(Stmt::DoWhile {
                body: Box::new(Stmt::block(vec![inner])),
                cond: increment(),
            }),
        },
        Stmt::ret(Expr::name("n")),
    ]);
    let unit = sequence_unit(labeled)?;
    let (value, n) = reported(&unit, "labeled", vec![], "n")?;
    assert_eq!(value, Value::Int(3));
    assert_eq!(n, ints(&[0, 1, 2, 3]));
    Ok(())
}

#[test]
fn test_switch_selector_reported_after_switch() -> anyhow::Result<()> {
    // int route(int a) {
    //     int hit = 0; int n = 0;
    //     switch (n = a * 2) { case 4: hit = 1; break; default: hit = 2; }
    //     return hit;
    // }
    let route = MethodDecl::new("route").returns("int").param("a", "int").body(vec![
        Stmt::local("int", "hit", Expr::int(0)),
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::Switch {
            selector: assign("n", Expr::binary(BinaryOp::Mul, Expr::name("a"), Expr::int(2))),
            cases: vec![
                SwitchCase {
                    labels: vec![Literal::Int(4)],
                    body: vec![Stmt::expr(assign("hit", Expr::int(1))), Stmt::Break(None)],
                },
                SwitchCase {
                    labels: Vec::new(),
                    body: vec![Stmt::expr(assign("hit", Expr::int(2)))],
                },
            ],
        },
        Stmt::ret(Expr::name("hit")),
    ]);
    let unit = sequence_unit(route)?;

    let sink = RecordingSink::new();
    let value = Interpreter::new(&unit, &sink, DEFAULT_RUNTIME_CLASS).call(
        "Seq",
        "route",
        vec![Value::Int(2)],
    )?;
    assert_eq!(value, Value::Int(1));
    assert_eq!(
        sink.value_changes("Seq.route"),
        vec![
            ("hit".to_string(), TraceValue::Int(0)),
            ("n".to_string(), TraceValue::Int(0)),
            ("hit".to_string(), TraceValue::Int(1)),
            ("n".to_string(), TraceValue::Int(4)),
        ]
    );

    let (value, n) = reported(&unit, "route", vec![Value::Int(5)], "n")?;
    assert_eq!(value, Value::Int(2));
    assert_eq!(n, ints(&[0, 10]));
    Ok(())
}

#[test]
fn test_synchronized_lock_reported_in_body() -> anyhow::Result<()> {
    // int guarded(int a) { int n = 0; synchronized (n = a) { n = n + 1; } return n; }
    let guarded = MethodDecl::new("guarded").returns("int").param("a", "int").body(vec![
        Stmt::local("int", "n", Expr::int(0)),
        Stmt::Synchronized {
            lock: assign("n", Expr::name("a")),
            body: Block::new(vec![Stmt::expr(assign(
                "n",
                Expr::binary(BinaryOp::Add, Expr::name("n"), Expr::int(1)),
            ))]),
        },
        Stmt::ret(Expr::name("n")),
    ]);
    let unit = sequence_unit(guarded)?;
    let (value, n) = reported(&unit, "guarded", vec![Value::Int(5)], "n")?;
    assert_eq!(value, Value::Int(6));
    assert_eq!(n, ints(&[0, 5, 6]));
    Ok(())
}

#[test]
fn test_for_each_variable_and_iterable_reported() -> anyhow::Result<()> {
    // int total() {
    //     int sum = 0; int[] items = new int[]{};
    //     for (int item : items = new int[]{3, 4}) { sum += item; }
    //     return sum;
    // }
    let array = |elements: Vec<Expr>| Expr::ArrayInit {
        elem_ty: TypeRef::new("int"),
        elements,
    };
    let total = MethodDecl::new("total").returns("int").body(vec![
        Stmt::local("int", "sum", Expr::int(0)),
        Stmt::local("int[]", "items", array(Vec::new())),
        Stmt::ForEach {
            ty: TypeRef::new("int"),
            name: "item".into(),
            iterable: assign("items", array(vec![Expr::int(3), Expr::int(4)])),
            body: Box::new(Stmt::block(vec![Stmt::expr(Expr::compound(
                AssignOp::Add,
                Expr::name("sum"),
                Expr::name("item"),
            ))])),
        },
        Stmt::ret(Expr::name("sum")),
    ]);
    let unit = sequence_unit(total)?;

    let sink = RecordingSink::new();
    let value = Interpreter::new(&unit, &sink, DEFAULT_RUNTIME_CLASS).call("Seq", "total", vec![])?;
    assert_eq!(value, Value::Int(7));
    let change = |name: &str, value: TraceValue| (name.to_string(), value);
    assert_eq!(
        sink.value_changes("Seq.total"),
        vec![
            change("sum", TraceValue::Int(0)),
            change("items", TraceValue::Array(Vec::new())),
            change("item", TraceValue::Int(3)),
            change("sum", TraceValue::Int(3)),
            change("item", TraceValue::Int(4)),
            change("sum", TraceValue::Int(7)),
            change("items", TraceValue::Array(ints(&[3, 4]))),
        ]
    );
    Ok(())
}

#[test]
fn test_instrumented_expressions_evaluate_once() -> anyhow::Result<()> {
    // int next() { calls++; return calls; }
    // int compute() { return next() * 10; }
    // void fill() { int[] slots = new int[]{0, 0, 0}; slots[next()] = 7; }
    let next = MethodDecl::new("next").returns("int").body(vec![
        Stmt::expr(Expr::unary(UnaryOp::PostInc, Expr::name("calls"))),
        Stmt::ret(Expr::name("calls")),
    ]);
    let compute = MethodDecl::new("compute").returns("int").body(vec![Stmt::ret(
        Expr::binary(BinaryOp::Mul, Expr::call("next", vec![]), Expr::int(10)),
    )]);
    let fill = MethodDecl::new("fill").body(vec![
        Stmt::local(
            "int[]",
            "slots",
            Expr::ArrayInit {
                elem_ty: TypeRef::new("int"),
                elements: vec![Expr::int(0), Expr::int(0), Expr::int(0)],
            },
        ),
        Stmt::expr(Expr::assign(
            Expr::index(Expr::name("slots"), Expr::call("next", vec![])),
            Expr::int(7),
        )),
    ]);
    let unit = single_class(
        ClassDecl::new("Svc")
            .with_field(int_field("calls", 0))
            .with_method(next)
            .with_method(compute)
            .with_method(fill),
    );
    let unit = instrument(unit, InstrumentationConfig::default())?;

    let sink = RecordingSink::new();
    let mut interp = Interpreter::new(&unit, &sink, DEFAULT_RUNTIME_CLASS);
    assert_eq!(interp.call("Svc", "compute", vec![])?, Value::Int(10));
    assert_eq!(interp.static_field("Svc", "calls")?, Value::Int(1));
    assert!(sink.events().contains(&TraceEvent::Returning {
        method: "Svc.compute".into(),
        value: TraceValue::Int(10),
    }));

    interp.call("Svc", "fill", vec![])?;
    assert_eq!(interp.static_field("Svc", "calls")?, Value::Int(2));
    let last = sink.value_changes("Svc.fill").pop();
    assert_eq!(
        last,
        Some((
            "slots".to_string(),
            TraceValue::Array(vec![TraceValue::Int(0), TraceValue::Int(0), TraceValue::Int(7)])
        ))
    );
    Ok(())
}

#[test]
fn test_exit_reported_once_on_every_path() -> anyhow::Result<()> {
    // int find(int limit) {
    //     if (limit < 0) throw new IllegalArgumentException("negative");
    //     int i = 0;
    //     while (true) { if (i == limit) return i; i++; }
    // }
    let find = MethodDecl::new("find").returns("int").param("limit", "int").body(vec![
        Stmt::if_then(
            Expr::binary(BinaryOp::Lt, Expr::name("limit"), Expr::int(0)),
            Stmt::throw_new("IllegalArgumentException", "negative"),
            None,
        ),
        Stmt::local("int", "i", Expr::int(0)),
        Stmt::while_loop(
            Expr::bool(true),
            Stmt::block(vec![
                Stmt::if_then(
                    Expr::binary(BinaryOp::Eq, Expr::name("i"), Expr::name("limit")),
                    Stmt::ret(Expr::name("i")),
                    None,
                ),
                Stmt::expr(Expr::unary(UnaryOp::PostInc, Expr::name("i"))),
            ]),
        ),
    ]);
    // void scan(int n) { for (int k = 0; k < 10; k++) { if (k == n) break; } }
    let scan = MethodDecl::new("scan").param("n", "int").body(vec![Stmt::For {
        init: scribe_core::ast::ForInit::Decl {
            ty: TypeRef::new("int"),
            name: "k".into(),
            init: Expr::int(0),
        },
        cond: Some(Expr::binary(BinaryOp::Lt, Expr::name("k"), Expr::int(10))),
        update: vec![Expr::unary(UnaryOp::PostInc, Expr::name("k"))],
        body: Box::new(Stmt::if_then(
            Expr::binary(BinaryOp::Eq, Expr::name("k"), Expr::name("n")),
            Stmt::Break(None),
            None,
        )),
    }]);
    let unit = instrument(
        single_class(ClassDecl::new("Paths").with_method(find).with_method(scan)),
        InstrumentationConfig::default(),
    )?;

    let (result, events) = run(&unit, "Paths", "find", vec![Value::Int(3)]);
    assert_eq!(result, Ok(Value::Int(3)));
    assert_eq!(count(&events, "Paths.find", is_exit), 1);
    assert!(matches!(events.last(), Some(TraceEvent::Exiting { .. })));

    let (result, events) = run(&unit, "Paths", "find", vec![Value::Int(-1)]);
    assert!(matches!(result, Err(Unwind::Thrown(_))));
    assert_eq!(count(&events, "Paths.find", is_exit), 1);

    for n in [4, 42] {
        let (result, events) = run(&unit, "Paths", "scan", vec![Value::Int(n)]);
        assert_eq!(result, Ok(Value::Null));
        assert_eq!(count(&events, "Paths.scan", is_exit), 1);
    }
    Ok(())
}

#[test]
fn test_recursive_calls_balance_entries_and_exits() -> anyhow::Result<()> {
    // int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
    let fact = MethodDecl::new("fact").returns("int").param("n", "int").body(vec![
        Stmt::if_then(
            Expr::binary(BinaryOp::Le, Expr::name("n"), Expr::int(1)),
            Stmt::ret(Expr::int(1)),
            None,
        ),
        Stmt::ret(Expr::binary(
            BinaryOp::Mul,
            Expr::name("n"),
            Expr::call(
                "fact",
                vec![Expr::binary(BinaryOp::Sub, Expr::name("n"), Expr::int(1))],
            ),
        )),
    ]);
    let unit = instrument(
        single_class(ClassDecl::new("Maths").with_method(fact)),
        InstrumentationConfig::default(),
    )?;

    let (result, events) = run(&unit, "Maths", "fact", vec![Value::Int(5)]);
    assert_eq!(result, Ok(Value::Int(120)));
    let entries = count(&events, "Maths.fact", |e| {
        matches!(e, TraceEvent::Entering { .. })
    });
    assert_eq!(entries, 5);
    assert_eq!(count(&events, "Maths.fact", is_exit), 5);
    assert_eq!(
        events.first(),
        Some(&TraceEvent::Entering {
            method: "Maths.fact".into(),
            params: vec![("n".into(), TraceValue::Int(5))],
        })
    );
    Ok(())
}

#[test]
fn test_error_passes_through_unchanged() -> anyhow::Result<()> {
    // void inner() { throw new IllegalStateException("boom"); }
    // void outer() { inner(); }
    let unit = single_class(
        ClassDecl::new("Jobs")
            .with_method(
                MethodDecl::new("inner")
                    .body(vec![Stmt::throw_new("IllegalStateException", "boom")]),
            )
            .with_method(
                MethodDecl::new("outer").body(vec![Stmt::expr(Expr::call("inner", vec![]))]),
            ),
    );
    let plain = unit.clone();
    let unit = instrument(unit, InstrumentationConfig::default())?;

    let expected = Err(Unwind::Thrown(ThrownValue::new(
        "IllegalStateException",
        Some("boom".to_string()),
    )));
    let (uninstrumented, _) = run(&plain, "Jobs", "outer", vec![]);
    let (result, events) = run(&unit, "Jobs", "outer", vec![]);
    assert_eq!(uninstrumented, expected);
    assert_eq!(result, expected);

    let boom = TraceValue::Error {
        class: "IllegalStateException".into(),
        message: Some("boom".into()),
    };
    assert_eq!(count(&events, "Jobs.inner", is_error), 1);
    assert_eq!(count(&events, "Jobs.outer", is_error), 1);
    let inner_error = events
        .iter()
        .position(|e| *e == TraceEvent::Error { method: "Jobs.inner".into(), error: boom.clone() });
    let inner_exit = events
        .iter()
        .position(|e| *e == TraceEvent::Exiting { method: "Jobs.inner".into() });
    assert!(inner_error.is_some());
    assert!(inner_error < inner_exit);
    Ok(())
}

#[test]
fn test_disabled_error_reporting() -> anyhow::Result<()> {
    let unit = single_class(ClassDecl::new("Jobs").with_method(
        MethodDecl::new("fail").body(vec![Stmt::throw_new("IllegalStateException", "boom")]),
    ));
    let config = InstrumentationConfig {
        trace_on_error: false,
        ..InstrumentationConfig::default()
    };
    let unit = instrument(unit, config)?;
    let (result, events) = run(&unit, "Jobs", "fail", vec![]);
    assert!(matches!(result, Err(Unwind::Thrown(_))));
    assert_eq!(count(&events, "Jobs.fail", is_error), 0);
    assert_eq!(count(&events, "Jobs.fail", is_exit), 1);
    Ok(())
}

#[test]
fn test_exclusion_wins_over_inclusion() -> anyhow::Result<()> {
    let unit = single_class(
        ClassDecl::new("Mixed")
            .with_annotation(Annotation::marker("Include"))
            .with_method(
                MethodDecl::new("hidden")
                    .annotated(Annotation::marker("Exclude"))
                    .annotated(Annotation::marker("Include")),
            )
            .with_method(MethodDecl::new("shown")),
    );

    for annotated_only in [false, true] {
        let config = InstrumentationConfig {
            annotated_only,
            ..InstrumentationConfig::default()
        };
        let mut staged = unit.clone();
        let report = InstrumentationPipeline::new(config).instrument_unit(&mut staged)?;
        assert_eq!(
            report.find("Mixed", "hidden").map(|m| m.outcome.clone()),
            Some(Outcome::Skipped(SkipReason::Excluded))
        );
        assert!(report.find("Mixed", "shown").is_some_and(|m| m.is_instrumented()));

        let (_, events) = run(&staged, "Mixed", "hidden", vec![]);
        assert!(events.is_empty());
        let (_, events) = run(&staged, "Mixed", "shown", vec![]);
        assert_eq!(events.len(), 2);
    }
    Ok(())
}

#[test]
fn test_annotated_only_mode() -> anyhow::Result<()> {
    let unit = CompilationUnit {
        package: Some("app".into()),
        classes: vec![
            ClassDecl::new("Plain").with_method(MethodDecl::new("run")),
            ClassDecl::new("Picked")
                .with_method(MethodDecl::new("run").annotated(Annotation::marker("Include"))),
        ],
    };
    let config = InstrumentationConfig {
        annotated_only: true,
        ..InstrumentationConfig::default()
    };
    let mut staged = unit.clone();
    let report = InstrumentationPipeline::new(config).instrument_unit(&mut staged)?;
    assert_eq!(
        report.find("app.Plain", "run").map(|m| m.outcome.clone()),
        Some(Outcome::Skipped(SkipReason::NotAnnotated))
    );
    assert_eq!(staged.classes[0], unit.classes[0]);
    assert_ne!(staged.classes[1], unit.classes[1]);
    Ok(())
}

#[test]
fn test_constructor_delegation_runs_first() -> anyhow::Result<()> {
    // class Helper { static int check(int n) { return n; } }
    // class Account { int balance; Account(int n) { super(Helper.check(n)); this.balance = n; } }
    // class Main { static Account open() { return new Account(3); } }
    let helper = ClassDecl::new("Helper").with_method(
        MethodDecl::new("check")
            .returns("int")
            .param("n", "int")
            .body(vec![Stmt::ret(Expr::name("n"))]),
    );
    let account = ClassDecl::new("Account")
        .with_field(FieldDecl {
            name: "balance".into(),
            ty: TypeRef::new("int"),
            is_static: false,
            init: None,
        })
        .with_method(MethodDecl::constructor("Account").param("n", "int").body(vec![
            Stmt::expr(Expr::SuperCall(vec![Expr::method_call(
                Expr::name("Helper"),
                "check",
                vec![Expr::name("n")],
            )])),
            Stmt::expr(Expr::assign(Expr::field(Expr::This, "balance"), Expr::name("n"))),
        ]));
    let main = ClassDecl::new("Main").with_method(
        MethodDecl::new("open")
            .returns("Account")
            .body(vec![Stmt::ret(Expr::new_object("Account", vec![Expr::int(3)]))]),
    );
    let unit = CompilationUnit {
        package: None,
        classes: vec![helper, account, main],
    };
    let unit = instrument(unit, InstrumentationConfig::default())?;

    let ctor = unit.classes[1].method("Account").map(|m| m.to_source());
    assert!(ctor.is_some_and(|s| s.contains("{\n    super(Helper.check(n));\n")));

    let (result, events) = run(&unit, "Main", "open", vec![]);
    assert_eq!(result, Ok(Value::Object("Account".into())));
    let position = |target: TraceEvent| events.iter().position(|e| *e == target);
    let helper_exit = position(TraceEvent::Exiting {
        method: "Helper.check".into(),
    });
    let account_entry = position(TraceEvent::Entering {
        method: "Account.Account".into(),
        params: vec![("n".into(), TraceValue::Int(3))],
    });
    assert!(helper_exit.is_some());
    assert!(helper_exit < account_entry);
    assert!(events.contains(&TraceEvent::ValueChanged {
        method: "Account.Account".into(),
        name: "this.balance".into(),
        value: TraceValue::Int(3),
    }));
    Ok(())
}

#[test]
fn test_timeout_marker_reports_overrun() -> anyhow::Result<()> {
    let timeout = |ms: i64| Annotation::marker("Timeout").with_arg("value", Literal::Int(ms));
    let unit = single_class(
        ClassDecl::new("Clock")
            .with_method(
                MethodDecl::new("slow")
                    .annotated(timeout(0))
                    .body(vec![Stmt::expr(Expr::method_call(
                        Expr::name("Thread"),
                        "sleep",
                        vec![Expr::int(5)],
                    ))]),
            )
            .with_method(MethodDecl::new("fast").annotated(timeout(60_000))),
    );
    let unit = instrument(unit, InstrumentationConfig::default())?;

    let (result, events) = run(&unit, "Clock", "slow", vec![]);
    assert_eq!(result, Ok(Value::Null));
    assert!(matches!(
        events.as_slice(),
        [
            TraceEvent::Entering { .. },
            TraceEvent::TimeoutArmed { declared_ms: 0, .. },
            TraceEvent::TimedOut { declared_ms: 0, .. },
            TraceEvent::Exiting { .. },
        ]
    ));

    let (_, events) = run(&unit, "Clock", "fast", vec![]);
    assert!(!events.iter().any(|e| matches!(e, TraceEvent::TimedOut { .. })));
    Ok(())
}

#[test]
fn test_failed_unit_is_left_untouched() {
    let unit = single_class(
        ClassDecl::new("Legacy")
            .with_method(MethodDecl::new("ok").body(vec![Stmt::Return(None)]))
            .with_method(MethodDecl::new("broken").body(vec![
                Stmt::Opaque("asm { nop }".into()),
            ])),
    );
    let mut staged = unit.clone();
    let err = InstrumentationPipeline::new(InstrumentationConfig::default())
        .instrument_unit(&mut staged)
        .unwrap_err();

    assert_eq!(staged, unit);
    assert!(matches!(err, InstrumentError::Translation { ref method, .. } if method == "broken"));
    assert!(err.to_string().contains("Legacy.broken"));
}

#[test]
fn test_normalization_is_idempotent() -> anyhow::Result<()> {
    let mut decl = MethodDecl::new("loop").param("n", "int").body(vec![Stmt::while_loop(
        Expr::binary(BinaryOp::Gt, Expr::name("n"), Expr::int(0)),
        Stmt::expr(Expr::unary(UnaryOp::PostDec, Expr::name("n"))),
    )]);
    let class = ClassInfo::new("Loops", MarkerSet::default());
    let config = InstrumentationConfig::default();
    let builder = TreeBuilder::new(config.runtime_class.as_str());
    let cx = PassContext::new(&builder, &config);

    Pass::Normalize.run(&mut Method::new(&class, &mut decl, MarkerSet::default()), &cx)?;
    let once = decl.clone();
    Pass::Normalize.run(&mut Method::new(&class, &mut decl, MarkerSet::default()), &cx)?;
    assert_eq!(decl, once);
    Ok(())
}

#[test]
fn test_instrumented_unit_survives_json() -> anyhow::Result<()> {
    let unit = single_class(
        ClassDecl::new("Counter")
            .with_field(int_field("total", 0))
            .with_method(MethodDecl::new("add").returns("int").param("a", "int").body(vec![
                Stmt::expr(Expr::compound(AssignOp::Add, Expr::name("total"), Expr::name("a"))),
                Stmt::ret(Expr::name("total")),
            ])),
    );
    let unit = instrument(unit, InstrumentationConfig::default())?;

    let json = serde_json::to_string(&unit)?;
    let restored: CompilationUnit = serde_json::from_str(&json)?;
    assert_eq!(restored, unit);

    let (result, _) = run(&restored, "Counter", "add", vec![Value::Int(4)]);
    assert_eq!(result, Ok(Value::Int(4)));
    Ok(())
}
