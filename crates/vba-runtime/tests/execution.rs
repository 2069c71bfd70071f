use pretty_assertions::assert_eq;
use vba_runtime::{
    evaluate_expression, execute_statements, parse_expression, parse_procedure_body, Context,
    EvalLimits, NullHost, Value, VbaError, VbaRuntime,
};

fn run(code: &str) -> Context<'static> {
    // Leak a host per test run; tests are short-lived processes.
    let host = Box::leak(Box::new(NullHost));
    let mut ctx = Context::new(host);
    let body = parse_procedure_body(code).expect("body parses");
    execute_statements(&body, &mut ctx).expect("execution succeeds");
    ctx
}

fn eval(source: &str) -> Value {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let expr = parse_expression(source).expect("expression parses");
    evaluate_expression(&expr, &mut ctx).expect("evaluation succeeds")
}

#[test]
fn for_loop_sums_one_to_five() {
    let ctx = run("sum = 0 : For i = 1 To 5 : sum = sum + i : Next");
    assert_eq!(ctx.get_variable("sum"), Value::Number(15.0));
}

#[test]
fn string_concat_and_numeric_coercion() {
    assert_eq!(
        eval("\"Hello\" & \" \" & \"World\""),
        Value::from("Hello World")
    );
    assert_eq!(eval("1 + \"2\""), Value::Number(3.0));
}

#[test]
fn select_case_picks_the_matching_arm() {
    let ctx = run(
        "x = 2 : Select Case x : Case 1 : r = \"one\" : Case 2 : r = \"two\" : Case Else : r = \"other\" : End Select",
    );
    assert_eq!(ctx.get_variable("r"), Value::from("two"));
}

#[test]
fn select_case_falls_back_to_else() {
    let ctx = run(
        "x = 9 : Select Case x : Case 1 : r = \"one\" : Case Else : r = \"other\" : End Select",
    );
    assert_eq!(ctx.get_variable("r"), Value::from("other"));
}

#[test]
fn exit_for_leaves_the_loop_early() {
    let ctx = run("count = 0 : For i = 1 To 10 : count = count + 1 : If i = 3 Then Exit For : Next");
    assert_eq!(ctx.get_variable("count"), Value::Number(3.0));
}

#[test]
fn for_loop_honors_negative_step() {
    let ctx = run("s = \"\" : For i = 3 To 1 Step -1 : s = s & i : Next");
    assert_eq!(ctx.get_variable("s"), Value::from("321"));
}

#[test]
fn for_loop_with_zero_step_is_an_invalid_call() {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let body = parse_procedure_body("For i = 1 To 3 Step 0\nNext\n").expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert!(matches!(err, VbaError::InvalidProcedureCall(_)));
}

#[test]
fn do_until_and_do_while_forms() {
    let ctx = run("i = 0 : Do Until i = 3 : i = i + 1 : Loop");
    assert_eq!(ctx.get_variable("i"), Value::Number(3.0));

    let ctx = run("i = 0 : Do While i < 4 : i = i + 1 : Loop");
    assert_eq!(ctx.get_variable("i"), Value::Number(4.0));

    // Post-conditioned loops run the body at least once.
    let ctx = run("i = 9 : Do : i = i + 1 : Loop While i < 5");
    assert_eq!(ctx.get_variable("i"), Value::Number(10.0));
}

#[test]
fn while_wend_loops() {
    let ctx = run("i = 0 : While i < 10 : i = i + 2 : Wend");
    assert_eq!(ctx.get_variable("i"), Value::Number(10.0));
}

#[test]
fn exit_do_breaks_the_innermost_loop() {
    let ctx = run("n = 0 : Do : n = n + 1 : If n = 7 Then Exit Do : Loop");
    assert_eq!(ctx.get_variable("n"), Value::Number(7.0));
}

#[test]
fn unconditional_do_loop_trips_the_iteration_cap() {
    let mut host = NullHost;
    let limits = EvalLimits {
        max_loop_iterations: 50,
        ..EvalLimits::default()
    };
    let mut ctx = Context::with_limits(&mut host, limits);
    let body = parse_procedure_body("Do\nx = x + 1\nLoop\n").expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert_eq!(err, VbaError::Overflow);
}

#[test]
fn for_each_iterates_array_elements() {
    let ctx = run("total = 0 : For Each v In Array(1, 2, 3) : total = total + v : Next");
    assert_eq!(ctx.get_variable("total"), Value::Number(6.0));
}

#[test]
fn dim_declares_arrays_and_indexing_is_zero_based() {
    let ctx = run("Dim a(3)\na(0) = 10\na(3) = 13\nfirst = a(0)\nlast = a(3)\n");
    assert_eq!(ctx.get_variable("first"), Value::Number(10.0));
    assert_eq!(ctx.get_variable("last"), Value::Number(13.0));
}

#[test]
fn out_of_range_subscripts_are_reported() {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let body = parse_procedure_body("Dim a(2)\nx = a(5)\n").expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert_eq!(err, VbaError::SubscriptOutOfRange);
}

#[test]
fn string_indexing_is_one_based_and_total() {
    let ctx = run("s = \"abc\"\nfirst = s(1)\nnone = s(9)\n");
    assert_eq!(ctx.get_variable("first"), Value::from("a"));
    assert_eq!(ctx.get_variable("none"), Value::from(""));
}

#[test]
fn undeclared_reads_are_empty_not_errors() {
    let ctx = run("x = ghost + 1");
    assert_eq!(ctx.get_variable("x"), Value::Number(1.0));
}

#[test]
fn date_literals_evaluate_to_dates() {
    let value = eval("#1/15/2020#");
    assert_eq!(value.to_vba_string(), "1/15/2020");
}

#[test]
fn like_operator_supports_the_pattern_forms() {
    assert_eq!(eval("\"hat\" Like \"h?t\""), Value::Boolean(true));
    assert_eq!(eval("\"heat\" Like \"h*t\""), Value::Boolean(true));
    assert_eq!(eval("\"a5\" Like \"a#\""), Value::Boolean(true));
    assert_eq!(eval("\"ab\" Like \"a[bc]\""), Value::Boolean(true));
    assert_eq!(eval("\"ad\" Like \"a[!bc]\""), Value::Boolean(true));
    assert_eq!(eval("\"ab\" Like \"a[!bc]\""), Value::Boolean(false));
    // Unmatchable patterns are false, never an error.
    assert_eq!(eval("\"x\" Like \"[\""), Value::Boolean(false));
}

#[test]
fn logical_operators_do_not_short_circuit_numeric_operands() {
    assert_eq!(eval("6 And 3"), Value::Number(2.0));
    assert_eq!(eval("6 Or 1"), Value::Number(7.0));
    assert_eq!(eval("True And False"), Value::Boolean(false));
    assert_eq!(eval("Not True"), Value::Boolean(false));
    assert_eq!(eval("Not 0"), Value::Number(-1.0));
}

#[test]
fn on_error_resume_next_suppresses_runtime_errors() {
    let ctx = run("On Error Resume Next\nx = 1 \\ 0\ny = 5\n");
    assert_eq!(ctx.get_variable("y"), Value::Number(5.0));
}

#[test]
fn on_error_goto_zero_restores_propagation() {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let body = parse_procedure_body(
        "On Error Resume Next\nOn Error GoTo 0\nx = 1 \\ 0\n",
    )
    .expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert_eq!(err, VbaError::DivisionByZero);
}

#[test]
fn on_error_goto_label_degrades_to_disabled_handling() {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let body = parse_procedure_body("On Error GoTo Handler\nx = 1 \\ 0\nHandler:\n").expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert_eq!(err, VbaError::DivisionByZero);
}

#[test]
fn raise_event_is_not_implemented() {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let body = parse_procedure_body("RaiseEvent Changed\n").expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert!(matches!(err, VbaError::NotImplemented(_)));
}

#[test]
fn new_expressions_are_not_implemented() {
    let mut host = NullHost;
    let mut ctx = Context::new(&mut host);
    let body = parse_procedure_body("Set c = New Collection\n").expect("parses");
    let err = execute_statements(&body, &mut ctx).unwrap_err();
    assert!(matches!(err, VbaError::NotImplemented(_)));
}

// ----- runtime handle -------------------------------------------------

#[test]
fn runtime_registers_and_calls_procedures() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Sub Store(n)\n    kept = n * 2\nEnd Sub\n\nFunction Add(a, b)\n    Add = a + b\nEnd Function\n",
        )
        .expect("registers");
    assert!(runtime.has_procedure("store"));

    let mut host = NullHost;
    let sum = runtime
        .call(&mut host, "Add", &[Value::Number(2.0), Value::Number(3.0)])
        .expect("call succeeds");
    assert_eq!(sum, Value::Number(5.0));
}

#[test]
fn functions_return_by_assigning_to_their_own_name() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Function Pick(flag)\n    If flag Then\n        Pick = \"yes\"\n    Else\n        Pick = \"no\"\n    End If\nEnd Function\n",
        )
        .expect("registers");
    let mut host = NullHost;
    assert_eq!(
        runtime.call(&mut host, "Pick", &[Value::Boolean(true)]).unwrap(),
        Value::from("yes")
    );
    assert_eq!(
        runtime.call(&mut host, "Pick", &[Value::Boolean(false)]).unwrap(),
        Value::from("no")
    );
}

#[test]
fn exit_sub_stops_the_procedure_without_leaking_flags() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Function Probe()\n    Probe = 1\n    Exit Function\n    Probe = 2\nEnd Function\n",
        )
        .expect("registers");
    let mut host = NullHost;
    assert_eq!(
        runtime.call(&mut host, "Probe", &[]).unwrap(),
        Value::Number(1.0)
    );
    // A second call must start with clean flags.
    assert_eq!(
        runtime.call(&mut host, "Probe", &[]).unwrap(),
        Value::Number(1.0)
    );
}

#[test]
fn optional_parameters_take_their_defaults() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Function Scale(n, Optional factor = 10)\n    Scale = n * factor\nEnd Function\n",
        )
        .expect("registers");
    let mut host = NullHost;
    assert_eq!(
        runtime.call(&mut host, "Scale", &[Value::Number(3.0)]).unwrap(),
        Value::Number(30.0)
    );
    assert_eq!(
        runtime
            .call(&mut host, "Scale", &[Value::Number(3.0), Value::Number(2.0)])
            .unwrap(),
        Value::Number(6.0)
    );
}

#[test]
fn procedures_call_each_other_and_recursion_works() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Function Fact(n)\n    If n <= 1 Then\n        Fact = 1\n    Else\n        Fact = n * Fact(n - 1)\n    End If\nEnd Function\n",
        )
        .expect("registers");
    let mut host = NullHost;
    assert_eq!(
        runtime.call(&mut host, "Fact", &[Value::Number(6.0)]).unwrap(),
        Value::Number(720.0)
    );
}

#[test]
fn runaway_recursion_hits_the_call_stack_bound() {
    let mut runtime = VbaRuntime::new().with_limits(EvalLimits {
        max_call_depth: 16,
        ..EvalLimits::default()
    });
    runtime
        .register_source("Function Down(n)\n    Down = Down(n + 1)\nEnd Function\n")
        .expect("registers");
    let mut host = NullHost;
    let err = runtime.call(&mut host, "Down", &[Value::Number(0.0)]).unwrap_err();
    assert_eq!(err, VbaError::StackOverflow);
}

#[test]
fn module_level_statements_seed_the_global_scope() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Const Greeting = \"hi\"\n\nFunction Fetch()\n    Fetch = Greeting\nEnd Function\n",
        )
        .expect("registers");
    let mut host = NullHost;
    assert_eq!(
        runtime.call(&mut host, "Fetch", &[]).unwrap(),
        Value::from("hi")
    );
}

#[test]
fn calling_an_unknown_procedure_is_reported_by_name() {
    let runtime = VbaRuntime::new();
    let mut host = NullHost;
    let err = runtime.call(&mut host, "Missing", &[]).unwrap_err();
    assert!(matches!(err, VbaError::ProcedureNotDefined(name) if name == "Missing"));
}

#[test]
fn call_statements_invoke_registered_subs() {
    let mut runtime = VbaRuntime::new();
    runtime
        .register_source(
            "Sub Outer()\n    Inner 4\nEnd Sub\n\nSub Inner(n)\n    result = n\nEnd Sub\n",
        )
        .expect("registers");
    let mut host = NullHost;
    // `Inner 4` resolves and runs; its locals stay procedure-scoped, so
    // success here just means the call dispatched.
    runtime.call(&mut host, "Outer", &[]).expect("outer runs");
}
