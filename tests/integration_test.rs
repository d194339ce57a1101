// End-to-end tests driving the public API: serialized specification and
// input in, serialized output out.

use std::sync::{Arc, Mutex};

use serde_json::json;

use transpec::{
    Config, DiagnosticsSink, ErrorMode, EvalError, Param, ParamKind, Registration,
    TransformError, Transformer,
};

fn run(specification: &str, input: &str) -> serde_json::Value {
    let engine = Transformer::with_defaults();
    let output = engine.transform(specification, input).unwrap();
    serde_json::from_str(&output).unwrap()
}

fn run_err(specification: &str, input: &str) -> TransformError {
    let engine = Transformer::with_defaults();
    engine.transform(specification, input).unwrap_err()
}

#[test]
fn test_value_of_scalar() {
    let output = run(
        r##"{"Integer": "#valueOf($.integerLiteral)"}"##,
        r##"{"integerLiteral": 1}"##,
    );
    assert_eq!(output, json!({"Integer": 1}));
}

#[test]
fn test_loop_with_index() {
    let output = run(
        r##"{"Array": ["#loop($.items)", {"Id": "#valueOf($.id)", "Index": "#loopIndex()"}]}"##,
        r##"{"items":[{"id":1},{"id":2}]}"##,
    );
    assert_eq!(
        output,
        json!({"Array": [{"Id": 1, "Index": 0}, {"Id": 2, "Index": 1}]})
    );
}

#[test]
fn test_if_branches() {
    let spec = r##"{"Result": "#if(#valueOf($.flag), 'yes', 'no')"}"##;
    assert_eq!(run(spec, r##"{"flag": true}"##), json!({"Result": "yes"}));
    assert_eq!(run(spec, r##"{"flag": false}"##), json!({"Result": "no"}));
    // an absent condition counts as false
    assert_eq!(run(spec, r##"{}"##), json!({"Result": "no"}));
}

#[test]
fn test_literal_passthrough() {
    let output = run(
        r##"{"kept": {"text": "plain", "n": 7, "flag": true}, "Derived": "#valueOf($.x)"}"##,
        r##"{"x": "y"}"##,
    );
    assert_eq!(
        output,
        json!({"kept": {"text": "plain", "n": 7, "flag": true}, "Derived": "y"})
    );
}

#[test]
fn test_rename_suffix() {
    let output = run(
        r##"{"#valueOf($.name) -> DisplayName": null}"##,
        r##"{"name": "Ada"}"##,
    );
    assert_eq!(output, json!({"DisplayName": "Ada"}));
}

#[test]
fn test_name_expression_without_rename_keeps_key() {
    // without a rename suffix only the value changes, never the key set
    let output = run(r##"{"#valueOf($.name)": null}"##, r##"{"name": "Ada"}"##);
    assert_eq!(output, json!({"#valueOf($.name)": "Ada"}));
}

#[test]
fn test_numeric_promotion() {
    let output = run(r##"{"N": "#eval('2 + 3 * 4 + 5')"}"##, r##"{}"##);
    assert_eq!(output, json!({"N": 19}));

    // one floating operand promotes the whole expression
    let output = run(r##"{"N": "#eval('1 + 1.123')"}"##, r##"{}"##);
    let n = output["N"].as_f64().unwrap();
    assert!((n - 2.123).abs() < 1e-9);
    assert!(output["N"].as_i64().is_none());
}

#[test]
fn test_path_multiple_matches_become_array() {
    let output = run(
        r##"{"Ids": "#valueOf($.items[*].id)"}"##,
        r##"{"items":[{"id":1},{"id":2},{"id":3}]}"##,
    );
    assert_eq!(output, json!({"Ids": [1, 2, 3]}));
}

#[test]
fn test_loop_enumeration_binding() {
    let output = run(
        r##"{"Lines": ["#loop($.lines as line)", {"Net": "#eval('line.net')"}]}"##,
        r##"{"lines":[{"net": 10}, {"net": 20}]}"##,
    );
    assert_eq!(output, json!({"Lines": [{"Net": 10}, {"Net": 20}]}));
}

#[test]
fn test_loop_over_range() {
    let output = run(r##"{"Seq": ["#loop(0..3)", "#loopIndex()"]}"##, r##"{}"##);
    assert_eq!(output, json!({"Seq": [0, 1, 2]}));
}

#[test]
fn test_loop_empty_source() {
    let output = run(
        r##"{"Array": ["#loop($.items)", {"Id": "#valueOf($.id)"}]}"##,
        r##"{"items":[]}"##,
    );
    assert_eq!(output, json!({"Array": []}));
}

#[test]
fn test_object_loop_with_pair_binding() {
    let output = run(
        r##"{"Attrs": {"s": "#loop($.attrs, k:v)", "item": {"Key": "#eval('k')", "Value": "#eval('v')"}}}"##,
        r##"{"attrs":{"color":"red","size":42}}"##,
    );
    assert_eq!(
        output,
        json!({"Attrs": [
            {"Key": "color", "Value": "red"},
            {"Key": "size", "Value": 42}
        ]})
    );
}

#[test]
fn test_object_loop_property_and_value() {
    let output = run(
        r##"{"Attrs": {"s": "#loop($.attrs)", "item": {"Key": "#loopProperty()", "Value": "#loopValue()"}}}"##,
        r##"{"attrs":{"a":1,"b":2}}"##,
    );
    assert_eq!(
        output,
        json!({"Attrs": [
            {"Key": "a", "Value": 1},
            {"Key": "b", "Value": 2}
        ]})
    );
}

#[test]
fn test_object_loop_with_content_listed_first() {
    // The statement property owns the sibling content even when the
    // content property precedes it in the template object.
    let output = run(
        r##"{"Attrs": {"x": "#loopProperty()", "s": "#loop($.attrs)"}}"##,
        r##"{"attrs":{"a":1,"b":2}}"##,
    );
    assert_eq!(output, json!({"Attrs": ["a", "b"]}));
}

#[test]
fn test_nested_loops_and_nearest_enclosing_lookup() {
    let output = run(
        r##"{"Orders": ["#loop($.orders)", {
            "Customer": "#loopValueOf($.customer)",
            "Lines": ["#loop($.lines)", {
                "Sku": "#valueOf($.sku)",
                "Order": "#loopValueOf($.orderId)"
            }]
        }]}"##,
        r##"{"orders":[
            {"orderId": 1, "customer": "A", "lines": [{"sku": "s1"}, {"sku": "s2"}]},
            {"orderId": 2, "customer": "B", "lines": [{"sku": "s3"}]}
        ]}"##,
    );
    assert_eq!(
        output,
        json!({"Orders": [
            {"Customer": "A", "Lines": [
                {"Sku": "s1", "Order": 1},
                {"Sku": "s2", "Order": 1}
            ]},
            {"Customer": "B", "Lines": [
                {"Sku": "s3", "Order": 2}
            ]}
        ]})
    );
}

#[test]
fn test_using_binds_for_block_body() {
    let output = run(
        r##"{"Out": ["#using($.customer as c)", {"Name": "#eval('c.name')"}]}"##,
        r##"{"customer":{"name":"Ada"}}"##,
    );
    assert_eq!(output, json!({"Out": [{"Name": "Ada"}]}));
}

#[test]
fn test_using_variable_source_chains() {
    let output = run(
        r##"{"Out": ["#using($.customer as c)", ["#using(c as cust)", {"N": "#eval('cust.name')"}]]}"##,
        r##"{"customer":{"name":"Ada"}}"##,
    );
    assert_eq!(output, json!({"Out": [[{"N": "Ada"}]]}));
}

#[test]
fn test_range_variable_dies_with_its_scope() {
    // "x" is bound per iteration inside the loop; after the loop it must not
    // resolve
    let output = run(
        r##"{"A": ["#loop($.xs as x)", "#eval('x')"], "B": "#exists(x)"}"##,
        r##"{"xs":[1,2]}"##,
    );
    assert_eq!(output, json!({"A": [1, 2], "B": false}));
}

#[test]
fn test_exists() {
    let spec = r##"{"Has": "#exists($.present)", "Missing": "#exists($.other)"}"##;
    assert_eq!(
        run(spec, r##"{"present": 0}"##),
        json!({"Has": true, "Missing": false})
    );
}

#[test]
fn test_filter_and_map() {
    let output = run(
        r##"{"Cheap": "#filter($.items, x -> x.price < 10)", "Ids": "#map($.items, x -> x.id)"}"##,
        r##"{"items":[{"id":1,"price":5},{"id":2,"price":50},{"id":3,"price":9}]}"##,
    );
    assert_eq!(
        output,
        json!({
            "Cheap": [{"id": 1, "price": 5}, {"id": 3, "price": 9}],
            "Ids": [1, 2, 3]
        })
    );
}

#[test]
fn test_aggregates() {
    let spec = r##"{
        "Sum": "#sum($.nums)",
        "Min": "#min($.nums)",
        "Max": "#max($.nums)",
        "Avg": "#average($.nums)"
    }"##;
    assert_eq!(
        run(spec, r##"{"nums":[4,1,7,2]}"##),
        json!({"Sum": 14, "Min": 1, "Max": 7, "Avg": 3})
    );
    // a single floating element switches the whole aggregate to decimals
    let output = run(r##"{"Sum": "#sum($.nums)"}"##, r##"{"nums":[1,2,0.5]}"##);
    assert_eq!(output, json!({"Sum": 3.5}));
}

#[test]
fn test_aggregate_rejects_non_numeric() {
    let err = run_err(r##"{"Sum": "#sum($.nums)"}"##, r##"{"nums":[1,"two"]}"##);
    assert!(matches!(
        err,
        TransformError::Eval(EvalError::NonNumericAggregate(_))
    ));
}

#[test]
fn test_group_and_order() {
    let input = r##"{"people":[
        {"name":"c","dept":"eng"},
        {"name":"a","dept":"ops"},
        {"name":"b","dept":"eng"}
    ]}"##;
    let output = run(r##"{"ByDept": "#groupBy($.people, 'dept')"}"##, input);
    assert_eq!(
        output,
        json!({"ByDept": [
            {"dept": "eng", "items": [
                {"name": "c", "dept": "eng"},
                {"name": "b", "dept": "eng"}
            ]},
            {"dept": "ops", "items": [
                {"name": "a", "dept": "ops"}
            ]}
        ]})
    );

    let output = run(r##"{"Sorted": "#orderBy($.people, 'name')"}"##, input);
    let names: Vec<&str> = output["Sorted"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    let output = run(r##"{"Sorted": "#orderByDesc($.people, 'name')"}"##, input);
    let names: Vec<&str> = output["Sorted"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["c", "b", "a"]);
}

#[test]
fn test_append() {
    let output = run(
        r##"{"Joined": "#append($.a, $.b)", "Text": "#append('foo', 'bar')"}"##,
        r##"{"a":[1,2],"b":[3]}"##,
    );
    assert_eq!(output, json!({"Joined": [1, 2, 3], "Text": "foobar"}));

    let output = run(
        r##"{"Merged": "#append($.a, $.b)"}"##,
        r##"{"a":{"x":1},"b":{"y":2}}"##,
    );
    assert_eq!(output, json!({"Merged": {"x": 1, "y": 2}}));
}

#[test]
fn test_string_functions() {
    let output = run(
        r##"{
            "Idx": "#indexOf(#valueOf($.text), 'world')",
            "Len": "#length(#valueOf($.text))",
            "Sub": "#substring(#valueOf($.text), 0, 5)",
            "Has": "#contains(#valueOf($.text), 'wor')",
            "Parts": "#split('a,b,c', ',')",
            "Glued": "#join($.nums, '-')"
        }"##,
        r##"{"text": "hello world", "nums": [1, 2, 3]}"##,
    );
    assert_eq!(
        output,
        json!({
            "Idx": 6,
            "Len": 11,
            "Sub": "hello",
            "Has": true,
            "Parts": ["a", "b", "c"],
            "Glued": "1-2-3"
        })
    );
}

#[test]
fn test_predicates_and_coercions() {
    let output = run(
        r##"{
            "IsInt": "#isInteger(#valueOf($.n))",
            "IsStr": "#isString(#valueOf($.s))",
            "IsDec": "#isDecimal(#valueOf($.f))",
            "AsInt": "#toInteger(#valueOf($.s))",
            "AsStr": "#toString(#valueOf($.n))",
            "AsDec": "#toDecimal(#valueOf($.n))",
            "AsBool": "#toBoolean('true')"
        }"##,
        r##"{"n": 5, "s": "42", "f": 1.5}"##,
    );
    assert_eq!(
        output,
        json!({
            "IsInt": true,
            "IsStr": true,
            "IsDec": true,
            "AsInt": 42,
            "AsStr": "5",
            "AsDec": 5.0,
            "AsBool": true
        })
    );
}

#[test]
fn test_comparison_in_condition() {
    let spec = r##"{"Adult": "#if(#valueOf($.age) >= 18, 'yes', 'no')"}"##;
    assert_eq!(run(spec, r##"{"age": 21}"##), json!({"Adult": "yes"}));
    assert_eq!(run(spec, r##"{"age": 12}"##), json!({"Adult": "no"}));
}

// ── Error propagation ────────────────────────────────────────────────────────

#[test]
fn test_strict_mode_aborts() {
    let err = run_err(r##"{"N": "#toInteger('nope')"}"##, r##"{}"##);
    assert!(matches!(
        err,
        TransformError::Eval(EvalError::Conversion { .. })
    ));
}

#[derive(Default)]
struct CollectSink {
    errors: Mutex<Vec<String>>,
}

impl DiagnosticsSink for CollectSink {
    fn report(&self, error: &EvalError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[test]
fn test_loose_mode_substitutes_null_and_reports() {
    let sink = Arc::new(CollectSink::default());
    let engine = Transformer::new(Config {
        error_mode: ErrorMode::Loose,
        sink: Some(sink.clone()),
        ..Config::default()
    })
    .unwrap();
    let output = engine
        .transform(
            r##"{"Bad": "#toInteger('nope')", "Good": "#valueOf($.x)"}"##,
            r##"{"x": 1}"##,
        )
        .unwrap();
    let output: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(output, json!({"Bad": null, "Good": 1}));
    let reported = sink.errors.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert!(reported[0].contains("cannot convert"));
}

#[test]
fn test_parse_errors_abort_even_in_loose_mode() {
    let engine = Transformer::new(Config {
        error_mode: ErrorMode::Loose,
        ..Config::default()
    })
    .unwrap();
    let err = engine
        .transform(r##"{"X": "#unknownFunction()"}"##, r##"{}"##)
        .unwrap_err();
    assert!(matches!(err, TransformError::Parse(_)));
}

#[test]
fn test_loop_template_errors() {
    let err = run_err(r##"{"A": ["#loop($.items)"]}"##, r##"{"items":[1]}"##);
    assert!(matches!(
        err,
        TransformError::Eval(EvalError::EmptyLoopTemplate)
    ));

    let err = run_err(
        r##"{"A": ["#loop($.scalar)", {}]}"##,
        r##"{"scalar": 5}"##,
    );
    assert!(matches!(
        err,
        TransformError::Eval(EvalError::LoopSourceKind { .. })
    ));
}

#[test]
fn test_loop_index_outside_loop() {
    let err = run_err(r##"{"X": "#loopIndex()"}"##, r##"{}"##);
    assert!(matches!(
        err,
        TransformError::Eval(EvalError::OutsideLoop(_))
    ));
}

// ── Host callables ───────────────────────────────────────────────────────────

#[test]
fn test_host_function_registration() {
    let engine = Transformer::with_defaults();
    engine
        .register(Registration::function(
            "triple",
            vec![Param::new("value", ParamKind::Int)],
            |args| {
                let n = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(n * 3))
            },
        ))
        .unwrap();
    let output = engine
        .transform(r##"{"T": "#triple(#valueOf($.n))"}"##, r##"{"n": 7}"##)
        .unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&output).unwrap(),
        json!({"T": 21})
    );
}

#[test]
fn test_instance_method_uses_context() {
    let engine = Transformer::new(Config {
        registrations: vec![Registration::method(
            "greet",
            vec![Param::new("name", ParamKind::Str)],
            |ctx, args| {
                let greeting = ctx.get("greeting").and_then(|v| v.as_str()).unwrap_or("hi");
                let name = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(format!("{} {}", greeting, name)))
            },
        )],
        method_context: Some(json!({"greeting": "hello"})),
        ..Config::default()
    })
    .unwrap();
    let output = engine
        .transform(r##"{"G": "#greet(#valueOf($.who))"}"##, r##"{"who": "world"}"##)
        .unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&output).unwrap(),
        json!({"G": "hello world"})
    );
}

#[test]
fn test_ambiguous_host_alias_fails_at_parse() {
    let engine = Transformer::with_defaults();
    for _ in 0..2 {
        engine
            .register(Registration::function(
                "dup",
                vec![Param::new("value", ParamKind::Any)],
                |args| Ok(args.first().cloned().unwrap_or(serde_json::Value::Null)),
            ))
            .unwrap();
    }
    let err = engine.transform(r##"{"X": "#dup(1)"}"##, r##"{}"##).unwrap_err();
    assert!(matches!(err, TransformError::Parse(_)));
}

#[test]
fn test_builtin_wins_alias_collision() {
    let engine = Transformer::with_defaults();
    engine
        .register(Registration::function(
            "valueOf",
            vec![Param::new("value", ParamKind::Any)],
            |_| Ok(json!("shadowed")),
        ))
        .unwrap();
    let output = engine
        .transform(r##"{"V": "#valueOf($.x)"}"##, r##"{"x": 1}"##)
        .unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&output).unwrap(),
        json!({"V": 1})
    );
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[test]
fn test_shared_transformer_across_threads() {
    let engine = Arc::new(Transformer::with_defaults());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let input = format!(r##"{{"n": {}}}"##, i);
                let output = engine
                    .transform(r##"{"Out": "#valueOf($.n)"}"##, &input)
                    .unwrap();
                let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
                assert_eq!(parsed["Out"], json!(i));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
