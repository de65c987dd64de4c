// crates/loomactivities/tests/activities_test.rs

use loomactivities::*;
use loomcore::edits::{AddDataflowInput, AddDataflowOutput, AddProcessor, Connect};
use loomcore::{
    Activity, ActivityError, ActivitySpec, Dataflow, EventBus, IndexPath, InvocationContext, OwningProcess,
    Processor, Sink, Source, Value,
};
use loomruntime::{ActivityFactory, ActivityRegistry, LoomRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

// Helper function to create a test context
fn create_test_context(inputs: Vec<(&str, Value)>) -> InvocationContext {
    let event_bus = EventBus::new(100);
    let process = OwningProcess::run("test").processor("p").invocation(IndexPath::root());

    InvocationContext {
        owning_process: process.clone(),
        processor: "p".to_string(),
        index: IndexPath::root(),
        inputs: inputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        config: HashMap::new(),
        events: event_bus.create_emitter(process, "p"),
        cancellation: tokio_util::sync::CancellationToken::new(),
    }
}

fn config(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn strings(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|s| Value::from(*s)).collect())
}

// ============================================================================
// Individual activities
// ============================================================================

#[tokio::test]
async fn test_debug_passes_message_on() {
    init_tracing();
    let output = DebugActivity
        .invoke(create_test_context(vec![("message", Value::from("hello"))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("message"), Some(&Value::from("hello")));
}

#[tokio::test]
async fn test_json_parse_turns_arrays_into_collections() {
    let output = JsonParseActivity
        .invoke(create_test_context(vec![("json", Value::from(r#"["a", "b"]"#))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("parsed"), Some(&strings(&["a", "b"])));
}

#[tokio::test]
async fn test_json_parse_rejects_bad_input() {
    let err = JsonParseActivity
        .invoke(create_test_context(vec![("json", Value::from("{not json"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::ExecutionFailed(_)));

    let err = JsonParseActivity
        .invoke(create_test_context(vec![("json", Value::Number(1.0))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::InvalidInputType { .. }));
}

#[tokio::test]
async fn test_json_stringify_compact() {
    let activity = JsonStringifyActivityFactory
        .create(&config(vec![("pretty", Value::Bool(false))]))
        .unwrap();
    let output = activity
        .invoke(create_test_context(vec![("value", strings(&["a", "b"]))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("json"), Some(&Value::from(r#"["a","b"]"#)));
}

#[tokio::test]
async fn test_split_and_concat() {
    let split = SplitActivityFactory.create(&config(vec![("separator", Value::from(";"))])).unwrap();
    let output = split
        .invoke(create_test_context(vec![("text", Value::from("x;y;z"))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("parts"), Some(&strings(&["x", "y", "z"])));

    let output = split
        .invoke(create_test_context(vec![("text", Value::from(""))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("parts"), Some(&Value::Array(Vec::new())));

    let concat = ConcatActivityFactory.create(&config(vec![("separator", Value::from("-"))])).unwrap();
    let output = concat
        .invoke(create_test_context(vec![("left", Value::from("a")), ("right", Value::from("b"))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("joined"), Some(&Value::from("a-b")));
}

#[tokio::test]
async fn test_factories_reject_bad_config() {
    assert!(matches!(
        SplitActivityFactory.create(&config(vec![("separator", Value::from(""))])),
        Err(ActivityError::Configuration(_))
    ));
    assert!(matches!(
        DelayActivityFactory.create(&config(vec![("delay_ms", Value::from("soon"))])),
        Err(ActivityError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_flatten_removes_one_level() {
    let nested = Value::Array(vec![strings(&["a", "b"]), strings(&[]), strings(&["c"])]);
    let output = FlattenActivity
        .invoke(create_test_context(vec![("list", nested)]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("flat"), Some(&strings(&["a", "b", "c"])));

    let err = FlattenActivity
        .invoke(create_test_context(vec![("list", strings(&["a"]))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::InvalidInputType { .. }));
}

#[tokio::test]
async fn test_delay_stops_when_cancelled() {
    let delay = DelayActivity::new(Duration::from_secs(30));
    let ctx = create_test_context(vec![("value", Value::from("v"))]);
    ctx.cancellation.cancel();
    let err = delay.invoke(ctx).await.unwrap_err();
    assert_eq!(err, ActivityError::Cancelled);
}

#[tokio::test]
async fn test_delay_and_identity_pass_inputs_through() {
    let delay = DelayActivityFactory.create(&config(vec![("delay_ms", Value::Number(5.0))])).unwrap();
    let output = delay
        .invoke(create_test_context(vec![("value", Value::from("v"))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.get("value"), Some(&Value::from("v")));

    let output = IdentityActivity
        .invoke(create_test_context(vec![("a", Value::Number(1.0)), ("b", Value::Bool(true))]))
        .await
        .unwrap();
    assert_eq!(output.outputs.len(), 2);
    assert_eq!(output.outputs.get("b"), Some(&Value::Bool(true)));
}

// ============================================================================
// Registered library
// ============================================================================

#[test]
fn test_register_all_lists_every_activity() {
    let mut registry = ActivityRegistry::new();
    register_all(&mut registry);
    assert_eq!(
        registry.list_activity_types(),
        vec![
            "debug.log",
            "identity",
            "list.flatten",
            "text.concat",
            "text.split",
            "time.delay",
            "transform.json_parse",
            "transform.json_stringify",
        ]
    );
    assert_eq!(registry.get_metadata("text.split").unwrap().category, "text");
}

#[tokio::test]
async fn test_split_then_concat_each_part() {
    init_tracing();
    let mut registry = ActivityRegistry::new();
    register_all(&mut registry);
    let runtime = LoomRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());

    // text -> split -> parts (depth 1) -> concat with suffix, once per part
    let mut df = Dataflow::new("tagging");
    df.edit(AddDataflowInput::new("text", 0)).unwrap();
    df.edit(AddDataflowInput::new("suffix", 0)).unwrap();
    df.edit(AddDataflowOutput::new("tagged")).unwrap();
    df.edit(AddProcessor::new(
        Processor::new("split")
            .with_input("text", 0)
            .with_output("parts", 1)
            .with_activity(ActivitySpec::new("text.split")),
    ))
    .unwrap();
    df.edit(AddProcessor::new(
        Processor::new("tag")
            .with_input("left", 0)
            .with_input("right", 0)
            .with_output("joined", 0)
            .with_activity(ActivitySpec::new("text.concat").with_config("separator", ":")),
    ))
    .unwrap();
    df.edit(Connect::new(Source::dataflow_input("text"), Sink::processor("split", "text"))).unwrap();
    df.edit(Connect::new(Source::processor("split", "parts"), Sink::processor("tag", "left"))).unwrap();
    df.edit(Connect::new(Source::dataflow_input("suffix"), Sink::processor("tag", "right"))).unwrap();
    df.edit(Connect::new(Source::processor("tag", "joined"), Sink::dataflow_output("tagged"))).unwrap();
    df.set_immutable();

    let inputs = HashMap::from([
        ("text".to_string(), Value::from("a,b,c")),
        ("suffix".to_string(), Value::from("x")),
    ]);
    let result = runtime.execute(&df, inputs).await.unwrap();
    assert_eq!(result.output("tagged"), Some(&strings(&["a:x", "b:x", "c:x"])));
}
