// crates/loomruntime/tests/runtime_test.rs

mod common;

use async_trait::async_trait;
use common::*;
use loomcore::edits::{AddDataflowInput, AddDataflowOutput, AddMerge, AddMergeInput, AddProcessor, Connect, CreateCondition};
use loomcore::{
    Activity, ActivityError, ActivityOutput, ActivitySpec, Dataflow, Datum, DispatchError, DispatchLayerSpec,
    DispatchStack, ExecutionEvent, FlowError,
    IndexPath, InvocationContext, IterationError, IterationStrategy, IterationStrategyStack, Merge, Processor,
    RetryConfig, Sink, Source, TerminationReason, Token, Value, WorkflowStructureError,
};
use loomruntime::RuntimeConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Emits its configured `value` without needing any input
struct Constant;

#[async_trait]
impl Activity for Constant {
    fn activity_type(&self) -> &str {
        "constant"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        Ok(ActivityOutput::new().with_output("out", ctx.get_config_or("value", Value::from("hello"))))
    }
}

fn concat_processor() -> Processor {
    Processor::new("cat")
        .with_input("left", 0)
        .with_input("right", 0)
        .with_output("joined", 0)
        .with_activity(ActivitySpec::new("concat"))
}

/// x, z -> cat(left, right) -> y
fn pairing_flow(processor: Processor) -> Dataflow {
    let mut df = Dataflow::new("pairing");
    df.edit(AddDataflowInput::new("x", 1)).unwrap();
    df.edit(AddDataflowInput::new("z", 1)).unwrap();
    df.edit(AddDataflowOutput::new("y")).unwrap();
    df.edit(AddProcessor::new(processor)).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor("cat", "left"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("z"), Sink::processor("cat", "right"))).unwrap();
    df.edit(Connect::new(Source::processor("cat", "joined"), Sink::dataflow_output("y"))).unwrap();
    df.set_immutable();
    df
}

fn echo(name: &str) -> Processor {
    Processor::new(name)
        .with_input("in", 0)
        .with_output("out", 0)
        .with_activity(ActivitySpec::new("echo"))
}

fn inputs(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn counted(name: &str) -> Processor {
    Processor::new(name)
        .with_input("in", 0)
        .with_output("out", 0)
        .with_activity(ActivitySpec::new("counted"))
}

/// Polls `condition` for up to two seconds
async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Echoes, but holds the value "hold" until released
struct Hold {
    release: Notify,
}

#[async_trait]
impl Activity for Hold {
    fn activity_type(&self) -> &str {
        "hold"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let value = ctx.require_input("in")?.clone();
        if value == Value::from("hold") {
            self.release.notified().await;
        }
        Ok(ActivityOutput::new().with_output("out", value))
    }
}

// ============================================================================
// Iteration
// ============================================================================

#[tokio::test]
async fn test_cross_product_is_row_major() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let df = pairing_flow(concat_processor());

    let result = runtime
        .execute(&df, inputs(vec![("x", strings(&["a", "b", "c"])), ("z", strings(&["1", "2", "3", "4"]))]))
        .await
        .unwrap();

    let y = result.outputs.get("y").unwrap();
    assert_eq!(y.depth, 2);
    let rows = y.value.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(row.as_array().unwrap().len(), 4);
    }
    assert_eq!(rows[0], strings(&["a1", "a2", "a3", "a4"]));
    assert_eq!(rows[2], strings(&["c1", "c2", "c3", "c4"]));
    assert_eq!(result.layer_property("cat", "invoke", "invocations"), Some(12));
}

#[tokio::test]
async fn test_cross_product_streams_in_post_order() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let df = pairing_flow(concat_processor());

    let mut handle = runtime.start(&df).unwrap();
    let mut outputs = handle.take_outputs().unwrap();
    handle.push_value("x", strings(&["a", "b"])).unwrap();
    handle.push_value("z", strings(&["1", "2"])).unwrap();
    handle.wait().await.unwrap();

    let mut indices = Vec::new();
    while let Ok(out) = outputs.try_recv() {
        assert_eq!(out.port, "y");
        indices.push(out.token.index.to_string());
    }
    assert_eq!(indices, vec!["[0,0]", "[0,1]", "[0]", "[1,0]", "[1,1]", "[1]", "[]"]);
}

#[tokio::test]
async fn test_dot_product_zips_inputs() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let processor = concat_processor().with_iteration(IterationStrategyStack::single(IterationStrategy::dot_product([
        ("left", 0),
        ("right", 0),
    ])));
    let df = pairing_flow(processor);

    let result = runtime
        .execute(&df, inputs(vec![("x", strings(&["a", "b", "c"])), ("z", strings(&["1", "2", "3"]))]))
        .await
        .unwrap();

    assert_eq!(result.output("y"), Some(&strings(&["a1", "b2", "c3"])));
}

#[tokio::test]
async fn test_dot_product_length_mismatch_fails_the_run() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let processor = concat_processor().with_iteration(IterationStrategyStack::single(IterationStrategy::dot_product([
        ("left", 0),
        ("right", 0),
    ])));
    let df = pairing_flow(processor);

    let err = runtime
        .execute(&df, inputs(vec![("x", strings(&["a", "b", "c"])), ("z", strings(&["1", "2", "3", "4", "5"]))]))
        .await
        .unwrap_err();

    match err {
        FlowError::WorkflowFailure(failure) => {
            assert_eq!(failure.processor, "cat");
            assert!(matches!(
                failure.error,
                DispatchError::Iteration(IterationError::DotProductMismatch(_))
            ));
        }
        other => panic!("expected a workflow failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_collection_completes_with_empty_output() {
    init_tracing();
    let slow = Slow::new(Duration::from_millis(1));
    let runtime = runtime_with(vec![slow.clone()]);
    let df = single_processor_flow(
        Processor::new("p")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::new("slow")),
        1,
    );

    let result = runtime
        .execute(&df, inputs(vec![("x", Value::Array(Vec::new()))]))
        .await
        .unwrap();

    assert_eq!(result.output("y"), Some(&Value::Array(Vec::new())));
    assert_eq!(result.outputs["y"].depth, 1);
    assert_eq!(slow.calls(), 0);
}

#[tokio::test]
async fn test_jobs_start_before_the_final_token() {
    init_tracing();
    let calls = Flaky::new("counted", 0);
    let runtime = runtime_with(vec![calls.clone()]);
    let df = single_processor_flow(counted("p"), 1);

    let mut handle = runtime.start(&df).unwrap();
    let mut outputs = handle.take_outputs().unwrap();
    let process = handle.process().clone();
    handle
        .push("x", Token::data(process.clone(), IndexPath::new(vec![0]), Datum::new("a", 0)))
        .unwrap();
    handle
        .push("x", Token::data(process.clone(), IndexPath::new(vec![1]), Datum::new("b", 0)))
        .unwrap();

    assert!(eventually(|| calls.calls() == 2).await, "elements waited for the whole list");
    for expected in ["[0]", "[1]"] {
        let out = tokio::time::timeout(Duration::from_secs(2), outputs.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.token.index.to_string(), expected);
    }

    handle
        .push("x", Token::data(process.clone(), IndexPath::root(), Datum::new(strings(&["a", "b"]), 1)))
        .unwrap();
    let result = handle.wait().await.unwrap();
    assert_eq!(result.output("y"), Some(&strings(&["a", "b"])));
    assert_eq!(calls.calls(), 2);
}

#[tokio::test]
async fn test_downstream_consumes_elements_while_upstream_still_runs() {
    init_tracing();
    let hold = Arc::new(Hold { release: Notify::new() });
    let calls = Flaky::new("counted", 0);
    let runtime = runtime_with(vec![hold.clone(), calls.clone()]);

    let mut df = Dataflow::new("chained");
    df.edit(AddDataflowInput::new("x", 1)).unwrap();
    df.edit(AddDataflowOutput::new("y")).unwrap();
    df.edit(AddProcessor::new(
        Processor::new("up")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::new("hold")),
    ))
    .unwrap();
    df.edit(AddProcessor::new(counted("down"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor("up", "in"))).unwrap();
    df.edit(Connect::new(Source::processor("up", "out"), Sink::processor("down", "in"))).unwrap();
    df.edit(Connect::new(Source::processor("down", "out"), Sink::dataflow_output("y"))).unwrap();
    df.set_immutable();

    let handle = runtime.start(&df).unwrap();
    handle.push_value("x", strings(&["a", "hold"])).unwrap();

    assert!(eventually(|| calls.calls() == 1).await, "down waited for up to finish");
    hold.release.notify_one();

    let result = handle.wait().await.unwrap();
    assert_eq!(result.output("y"), Some(&strings(&["a", "hold"])));
    assert_eq!(result.outputs["y"].depth, 1);
    assert_eq!(calls.calls(), 2);
}

// ============================================================================
// Merges and control links
// ============================================================================

/// x -> first, z -> second, both into merge m -> y
fn merging_flow(first_type: &str) -> Dataflow {
    let mut df = Dataflow::new("merging");
    df.edit(AddDataflowInput::new("x", 0)).unwrap();
    df.edit(AddDataflowInput::new("z", 0)).unwrap();
    df.edit(AddDataflowOutput::new("y")).unwrap();
    df.edit(AddProcessor::new(
        Processor::new("first")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::new(first_type)),
    ))
    .unwrap();
    df.edit(AddProcessor::new(echo("second"))).unwrap();
    df.edit(AddMerge::new(Merge::new("m"))).unwrap();
    df.edit(AddMergeInput::new("m", "a")).unwrap();
    df.edit(AddMergeInput::new("m", "b")).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor("first", "in"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("z"), Sink::processor("second", "in"))).unwrap();
    df.edit(Connect::new(Source::processor("first", "out"), Sink::merge("m", "a"))).unwrap();
    df.edit(Connect::new(Source::processor("second", "out"), Sink::merge("m", "b"))).unwrap();
    df.edit(Connect::new(Source::merge("m"), Sink::dataflow_output("y"))).unwrap();
    df.set_immutable();
    df
}

#[tokio::test]
async fn test_merge_orders_by_port_not_arrival() {
    init_tracing();
    let slow = Slow::new(Duration::from_millis(50));
    let runtime = runtime_with(vec![slow.clone()]);
    let df = merging_flow("slow");

    let mut handle = runtime.start(&df).unwrap();
    let mut outputs = handle.take_outputs().unwrap();
    handle.push_value("x", "from-first").unwrap();
    handle.push_value("z", "from-second").unwrap();
    let result = handle.wait().await.unwrap();

    assert_eq!(result.output("y"), Some(&strings(&["from-first", "from-second"])));
    assert_eq!(result.outputs["y"].depth, 1);

    let mut indices = Vec::new();
    while let Ok(out) = outputs.try_recv() {
        indices.push(out.token.index.to_string());
    }
    assert_eq!(indices, vec!["[0]", "[1]", "[]"]);
}

#[tokio::test]
async fn test_merge_streams_elements_into_a_consumer() {
    init_tracing();
    let calls = Flaky::new("counted", 0);
    let runtime = runtime_with(vec![calls.clone()]);

    let mut df = Dataflow::new("streamed-merge");
    df.edit(AddDataflowInput::new("x", 1)).unwrap();
    df.edit(AddDataflowInput::new("z", 1)).unwrap();
    df.edit(AddDataflowOutput::new("y")).unwrap();
    df.edit(AddMerge::new(Merge::new("m"))).unwrap();
    df.edit(AddMergeInput::new("m", "a")).unwrap();
    df.edit(AddMergeInput::new("m", "b")).unwrap();
    df.edit(AddProcessor::new(counted("p"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::merge("m", "a"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("z"), Sink::merge("m", "b"))).unwrap();
    df.edit(Connect::new(Source::merge("m"), Sink::processor("p", "in"))).unwrap();
    df.edit(Connect::new(Source::processor("p", "out"), Sink::dataflow_output("y"))).unwrap();
    df.set_immutable();

    let mut handle = runtime.start(&df).unwrap();
    let mut outputs = handle.take_outputs().unwrap();
    let process = handle.process().clone();
    let element = |index: usize, value: &str| Token::data(process.clone(), IndexPath::new(vec![index]), Datum::new(value, 0));

    handle.push("x", element(0, "x0")).unwrap();
    handle.push("z", element(0, "z0")).unwrap();
    assert!(eventually(|| calls.calls() == 1).await, "merged element waited for the whole list");
    let first = tokio::time::timeout(Duration::from_secs(2), outputs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.token.index.to_string(), "[0,0]");
    assert_eq!(first.token.datum().map(|d| d.value.clone()), Some(Value::from("x0")));

    handle.push("x", element(1, "x1")).unwrap();
    handle
        .push("x", Token::data(process.clone(), IndexPath::root(), Datum::new(strings(&["x0", "x1"]), 1)))
        .unwrap();
    handle
        .push("z", Token::data(process.clone(), IndexPath::root(), Datum::new(strings(&["z0"]), 1)))
        .unwrap();
    let result = handle.wait().await.unwrap();

    assert_eq!(
        result.output("y"),
        Some(&Value::Array(vec![strings(&["x0", "x1"]), strings(&["z0"])]))
    );
    assert_eq!(result.outputs["y"].depth, 2);
    assert_eq!(calls.calls(), 3);

    let mut indices = Vec::new();
    while let Ok(out) = outputs.try_recv() {
        indices.push(out.token.index.to_string());
    }
    assert_eq!(indices, vec!["[0,1]", "[0]", "[1,0]", "[1]", "[]"]);
}

#[tokio::test]
async fn test_condition_holds_back_controlled_processor() {
    init_tracing();
    let slow = Slow::new(Duration::from_millis(30));
    let runtime = runtime_with(vec![slow.clone()]);
    let mut df = Dataflow::new("ordered");
    df.edit(AddDataflowInput::new("x", 0)).unwrap();
    df.edit(AddDataflowOutput::new("y1")).unwrap();
    df.edit(AddDataflowOutput::new("y2")).unwrap();
    df.edit(AddProcessor::new(
        Processor::new("first")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::new("slow")),
    ))
    .unwrap();
    df.edit(AddProcessor::new(echo("second"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor("first", "in"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor("second", "in"))).unwrap();
    df.edit(Connect::new(Source::processor("first", "out"), Sink::dataflow_output("y1"))).unwrap();
    df.edit(Connect::new(Source::processor("second", "out"), Sink::dataflow_output("y2"))).unwrap();
    df.edit(CreateCondition::new("first", "second")).unwrap();
    df.set_immutable();

    let mut events = runtime.subscribe_events();
    runtime.execute(&df, inputs(vec![("x", Value::from("v"))])).await.unwrap();

    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::ProcessorStarted { processor, .. } => order.push(format!("start:{}", processor)),
            ExecutionEvent::ProcessorCompleted { processor, .. } => order.push(format!("done:{}", processor)),
            _ => {}
        }
    }
    let first_done = order.iter().position(|e| e == "done:first").unwrap();
    let second_start = order.iter().position(|e| e == "start:second").unwrap();
    assert!(first_done < second_start, "events out of order: {:?}", order);
}

// ============================================================================
// Nested dataflows
// ============================================================================

#[tokio::test]
async fn test_nested_dataflow_runs_once_per_item() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let inner = single_processor_flow(echo("inner"), 0);
    let outer = single_processor_flow(
        Processor::new("wrap")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::nested_dataflow(inner).map_input("in", "x").map_output("out", "y")),
        1,
    );

    let result = runtime
        .execute(&outer, inputs(vec![("x", strings(&["a", "b", "c"]))]))
        .await
        .unwrap();

    assert_eq!(result.output("y"), Some(&strings(&["a", "b", "c"])));
    assert_eq!(result.layer_property("wrap", "invoke", "invocations"), Some(3));
}

// ============================================================================
// Instantiation and input handling
// ============================================================================

#[tokio::test]
async fn test_fire_runs_a_dataflow_without_inputs() {
    init_tracing();
    let runtime = runtime_with(vec![Arc::new(Constant)]);
    let mut df = Dataflow::new("source");
    df.edit(AddDataflowOutput::new("y")).unwrap();
    df.edit(AddProcessor::new(
        Processor::new("gen")
            .with_output("out", 0)
            .with_activity(ActivitySpec::new("constant").with_config("value", "generated")),
    ))
    .unwrap();
    df.edit(Connect::new(Source::processor("gen", "out"), Sink::dataflow_output("y"))).unwrap();
    df.set_immutable();

    let result = runtime.fire(&df).unwrap().wait().await.unwrap();
    assert_eq!(result.output("y"), Some(&Value::from("generated")));
}

#[tokio::test]
async fn test_fire_rejects_dataflow_with_inputs() {
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(echo("p"), 0);
    match runtime.fire(&df) {
        Err(FlowError::NotSelfStarting { inputs, .. }) => assert_eq!(inputs, 1),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("fire should refuse a dataflow with inputs"),
    }
}

#[tokio::test]
async fn test_compile_requires_immutable_dataflow() {
    let runtime = runtime_with(vec![]);
    let mut df = Dataflow::new("draft");
    df.edit(AddDataflowInput::new("x", 0)).unwrap();
    assert!(matches!(runtime.compile(&df), Err(FlowError::NotImmutable(name)) if name == "draft"));
}

#[tokio::test]
async fn test_compile_rejects_invalid_dataflow() {
    let runtime = runtime_with(vec![]);
    let mut df = Dataflow::new("dangling");
    df.edit(AddDataflowInput::new("x", 0)).unwrap();
    df.edit(AddDataflowOutput::new("y")).unwrap();
    df.edit(AddProcessor::new(echo("p"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor("p", "in"))).unwrap();
    df.set_immutable();

    match runtime.compile(&df) {
        Err(FlowError::InvalidDataflow(report)) => assert!(!report.is_valid()),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("an unconnected output must not compile"),
    }
}

#[tokio::test]
async fn test_compile_rejects_unknown_activity() {
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(
        Processor::new("p")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::new("missing")),
        0,
    );
    assert!(matches!(runtime.compile(&df), Err(FlowError::UnknownActivityType(t)) if t == "missing"));
}

#[tokio::test]
async fn test_granular_input_tokens_are_accepted_in_order() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(echo("p"), 1);
    let handle = runtime.start(&df).unwrap();
    let process = handle.process().clone();

    handle
        .push("x", Token::data(process.clone(), IndexPath::new(vec![0]), Datum::new("a", 0)))
        .unwrap();
    handle
        .push("x", Token::data(process.clone(), IndexPath::new(vec![1]), Datum::new("b", 0)))
        .unwrap();
    handle
        .push("x", Token::data(process.clone(), IndexPath::root(), Datum::new(strings(&["a", "b"]), 1)))
        .unwrap();

    let result = handle.wait().await.unwrap();
    assert_eq!(result.output("y"), Some(&strings(&["a", "b"])));
}

#[tokio::test]
async fn test_push_rejects_out_of_order_tokens() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(echo("p"), 1);
    let handle = runtime.start(&df).unwrap();
    let process = handle.process().clone();

    handle
        .push("x", Token::data(process.clone(), IndexPath::new(vec![1]), Datum::new("b", 0)))
        .unwrap();
    let err = handle
        .push("x", Token::data(process.clone(), IndexPath::new(vec![0]), Datum::new("a", 0)))
        .unwrap_err();
    assert!(matches!(err, FlowError::Structure(WorkflowStructureError::OutOfOrder { .. })));

    let err = handle
        .push("x", Token::data(process.clone(), IndexPath::root(), Datum::new("flat", 0)))
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Structure(WorkflowStructureError::DepthMismatch { expected: 1, actual: 0, .. })
    ));

    let err = handle.push("x", Token::completion(process.clone(), IndexPath::root())).unwrap_err();
    assert!(matches!(err, FlowError::Structure(WorkflowStructureError::Other(_))));

    let err = handle.push_value("nope", "v").unwrap_err();
    assert!(matches!(err, FlowError::Structure(WorkflowStructureError::UnknownPort { .. })));

    handle.cancel();
    assert!(matches!(handle.wait().await, Err(FlowError::Cancelled(_))));
}

#[tokio::test]
async fn test_concurrent_pushes_reach_the_run_in_order() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(echo("p"), 1);
    let handle = runtime.start(&df).unwrap();
    let process = handle.process().clone();
    let items: Vec<String> = (0..200).map(|i| format!("v{}", i)).collect();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for (i, item) in items.iter().enumerate() {
                    let token = Token::data(process.clone(), IndexPath::new(vec![i]), Datum::new(item.as_str(), 0));
                    // another thread may already have pushed this index
                    let _ = handle.push("x", token);
                }
            });
        }
    });

    let all = Value::Array(items.iter().map(|item| Value::from(item.as_str())).collect());
    handle
        .push("x", Token::data(process.clone(), IndexPath::root(), Datum::new(all.clone(), 1)))
        .unwrap();
    let result = handle.wait().await.unwrap();
    assert_eq!(result.output("y"), Some(&all));
}

#[tokio::test]
async fn test_run_without_closed_inputs_fails() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(echo("p"), 0);
    let handle = runtime.start(&df).unwrap();
    assert!(matches!(handle.wait().await, Err(FlowError::Execution(_))));
}

#[tokio::test]
async fn test_execute_requires_every_input() {
    let runtime = runtime_with(vec![]);
    let df = single_processor_flow(echo("p"), 0);
    let err = runtime.execute(&df, HashMap::new()).await.unwrap_err();
    assert!(matches!(err, FlowError::Configuration(_)));
}

#[tokio::test]
async fn test_run_timeout_cancels_the_run() {
    init_tracing();
    let slow = Slow::new(Duration::from_secs(30));
    let mut registry = loomruntime::ActivityRegistry::new();
    registry.register(SharedFactory::new(slow.clone()));
    let config = RuntimeConfig {
        run_timeout_ms: Some(50),
        ..RuntimeConfig::default()
    };
    let runtime = loomruntime::LoomRuntime::with_registry(Arc::new(registry), config);
    let df = single_processor_flow(
        Processor::new("p")
            .with_input("in", 0)
            .with_output("out", 0)
            .with_activity(ActivitySpec::new("slow")),
        0,
    );

    let err = runtime.execute(&df, inputs(vec![("x", Value::from("v"))])).await.unwrap_err();
    assert!(matches!(err, FlowError::Execution(msg) if msg.contains("timed out")));
}

#[tokio::test]
async fn test_completed_run_terminates_once() {
    init_tracing();
    let runtime = runtime_with(vec![]);
    let stack = DispatchStack::from_layers(vec![
        DispatchLayerSpec::retry(RetryConfig::fixed(1, 1)),
        DispatchLayerSpec::invoke(),
    ])
    .unwrap();
    let df = single_processor_flow(echo("p").with_dispatch_stack(stack), 0);

    let mut events = runtime.subscribe_events();
    let result = runtime.execute(&df, inputs(vec![("x", Value::from("v"))])).await.unwrap();

    let mut terminations = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::ProcessTerminated { process, reason, .. } = event {
            if process == result.process {
                terminations.push(reason);
            }
        }
    }
    assert_eq!(terminations.len(), 1);
    assert!(matches!(terminations[0], TerminationReason::Completed));
    assert!(!runtime.monitor().is_registered(&result.process));
}
