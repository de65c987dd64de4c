// crates/loomcore/tests/document_test.rs

use loomcore::dispatch::{PARALLELIZE, RETRY};
use loomcore::{DataflowDocument, FlowError, RetryConfig, Sink, Source};

const SPLIT_AND_JOIN: &str = r#"{
  "name": "split_and_join",
  "inputs": [{ "name": "sentence", "depth": 0 }],
  "outputs": [{ "name": "words" }, { "name": "shout" }],
  "processors": [
    {
      "name": "split",
      "inputs": [{ "name": "text", "depth": 0 }],
      "outputs": [{ "name": "parts", "depth": 1 }],
      "activities": [{ "type": "text.split", "config": { "separator": " " } }]
    },
    {
      "name": "upper",
      "inputs": [{ "name": "text", "depth": 0 }],
      "outputs": [{ "name": "result", "depth": 0 }],
      "dispatch": [
        { "type": "parallelize", "config": { "max_jobs": 4 } },
        { "type": "retry", "config": { "max_retries": 2, "initial_delay_ms": 5 } },
        { "type": "invoke" }
      ],
      "activities": [{ "type": "identity", "input_mapping": { "text": "value" }, "output_mapping": { "result": "value" } }]
    }
  ],
  "links": [
    { "source": { "kind": "dataflow_input", "port": "sentence" }, "sink": { "kind": "processor_input", "processor": "split", "port": "text" } },
    { "source": { "kind": "processor_output", "processor": "split", "port": "parts" }, "sink": { "kind": "processor_input", "processor": "upper", "port": "text" } },
    { "source": { "kind": "processor_output", "processor": "split", "port": "parts" }, "sink": { "kind": "dataflow_output", "port": "words" } },
    { "source": { "kind": "processor_output", "processor": "upper", "port": "result" }, "sink": { "kind": "dataflow_output", "port": "shout" } }
  ],
  "conditions": [{ "control": "split", "target": "upper" }]
}"#;

#[test]
fn test_document_builds_a_valid_dataflow() {
    let doc = DataflowDocument::from_json(SPLIT_AND_JOIN).unwrap();
    let df = doc.build().unwrap();

    assert_eq!(df.name(), "split_and_join");
    assert_eq!(df.processors().len(), 2);
    assert_eq!(df.links().len(), 4);
    assert_eq!(df.links_from(&Source::processor("split", "parts")).count(), 2);
    assert!(df.link_to(&Sink::dataflow_output("shout")).is_some());
    assert_eq!(df.conditions().len(), 1);

    let upper = df.processor("upper").unwrap();
    let layers: Vec<&str> = upper
        .dispatch_stack()
        .layers()
        .iter()
        .map(|l| l.layer_type.as_str())
        .collect();
    assert_eq!(layers, vec![PARALLELIZE, RETRY, "invoke"]);
    let retry = RetryConfig::from_config(&upper.dispatch_stack().layers()[1].config).unwrap();
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.initial_delay_ms, 5);
    assert_eq!(upper.activities()[0].activity_input("text"), "value");

    let report = df.check_validity();
    assert!(report.is_valid(), "{}", report);
    assert_eq!(report.output("words").unwrap().depth, 1);
    assert_eq!(report.output("shout").unwrap().depth, 1);
}

#[test]
fn test_document_round_trip() {
    let df = DataflowDocument::from_json(SPLIT_AND_JOIN).unwrap().build().unwrap();
    let json = df.to_document().to_json_pretty().unwrap();
    let rebuilt = DataflowDocument::from_json(&json).unwrap().build().unwrap();

    assert_eq!(rebuilt.processors(), df.processors());
    assert_eq!(rebuilt.links(), df.links());
    assert_eq!(rebuilt.input_ports(), df.input_ports());
    assert_eq!(rebuilt.output_ports(), df.output_ports());
}

#[test]
fn test_document_with_bad_link_is_rejected() {
    let json = r#"{
      "name": "bad",
      "outputs": [{ "name": "y" }],
      "links": [{ "source": { "kind": "dataflow_input", "port": "x" }, "sink": { "kind": "dataflow_output", "port": "y" } }]
    }"#;
    let err = DataflowDocument::from_json(json).unwrap().build().unwrap_err();
    assert!(matches!(err, FlowError::Edit(_)), "{}", err);
}

#[test]
fn test_dispatch_without_invoke_is_rejected() {
    let json = r#"{
      "name": "no_invoke",
      "processors": [{ "name": "p", "dispatch": [{ "type": "retry" }] }]
    }"#;
    let err = DataflowDocument::from_json(json).unwrap().build().unwrap_err();
    assert!(matches!(err, FlowError::Configuration(_)), "{}", err);
}
