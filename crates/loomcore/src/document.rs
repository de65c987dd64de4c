//! JSON workflow documents.
//!
//! A document is a plain description of a dataflow. [`DataflowDocument::build`]
//! turns it into a graph by applying one compound edit, so a document can
//! never produce a graph the edits would reject.

use crate::edits::{
    AddDataflowInput, AddDataflowOutput, AddMerge, AddMergeInput, AddProcessor, CompoundEdit, Connect,
    CreateCondition,
};
use crate::value::{json_to_value, value_to_json};
use crate::{
    ActivitySpec, Condition, Dataflow, Datalink, DispatchLayerSpec, DispatchStack, FlowError,
    IterationStrategyStack, Merge, Port, Processor, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataflowDocument {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<PortDoc>,
    #[serde(default)]
    pub outputs: Vec<PortDoc>,
    #[serde(default)]
    pub processors: Vec<ProcessorDoc>,
    #[serde(default)]
    pub merges: Vec<MergeDoc>,
    #[serde(default)]
    pub links: Vec<Datalink>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDoc {
    pub name: String,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granular_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorDoc {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<PortDoc>,
    #[serde(default)]
    pub outputs: Vec<PortDoc>,
    /// Defaults to a cross product over every input at its port depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<IterationStrategyStack>,
    /// Defaults to the standard six-layer stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<Vec<LayerDoc>>,
    #[serde(default)]
    pub activities: Vec<ActivityDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDoc {
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub config: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDoc {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub config: JsonMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_mapping: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_mapping: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataflow: Option<Box<DataflowDocument>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDoc {
    pub name: String,
    pub inputs: Vec<String>,
}

fn config_from_json(config: &JsonMap) -> HashMap<String, Value> {
    config
        .iter()
        .map(|(k, v)| (k.clone(), json_to_value(v.clone())))
        .collect()
}

fn config_to_json(config: &HashMap<String, Value>) -> JsonMap {
    config.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect()
}

impl DataflowDocument {
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the described dataflow. The result is still mutable.
    pub fn build(&self) -> Result<Dataflow, FlowError> {
        let mut edits = CompoundEdit::new();
        for port in &self.inputs {
            edits.push(Box::new(AddDataflowInput::new(port.name.clone(), port.depth)));
        }
        for port in &self.outputs {
            edits.push(Box::new(AddDataflowOutput::new(port.name.clone())));
        }
        for processor in &self.processors {
            edits.push(Box::new(AddProcessor::new(processor.to_processor()?)));
        }
        for merge in &self.merges {
            edits.push(Box::new(AddMerge::new(Merge::new(merge.name.clone()))));
            for port in &merge.inputs {
                edits.push(Box::new(AddMergeInput::new(merge.name.clone(), port.clone())));
            }
        }
        for link in &self.links {
            edits.push(Box::new(Connect::new(link.source.clone(), link.sink.clone())));
        }
        for condition in &self.conditions {
            edits.push(Box::new(CreateCondition::new(
                condition.control.clone(),
                condition.target.clone(),
            )));
        }

        let mut dataflow = Dataflow::new(self.name.clone());
        dataflow.edit(edits)?;
        tracing::debug!(
            dataflow = %self.name,
            processors = self.processors.len(),
            links = self.links.len(),
            "built dataflow from document"
        );
        Ok(dataflow)
    }
}

impl ProcessorDoc {
    fn to_processor(&self) -> Result<Processor, FlowError> {
        let mut processor = Processor::new(self.name.clone());
        for port in &self.inputs {
            processor = processor.with_input(port.name.clone(), port.depth);
        }
        for port in &self.outputs {
            processor = match port.granular_depth {
                Some(granular) => processor.with_granular_output(port.name.clone(), port.depth, granular),
                None => processor.with_output(port.name.clone(), port.depth),
            };
        }
        if let Some(iteration) = &self.iteration {
            processor = processor.with_iteration(iteration.clone());
        }
        if let Some(layers) = &self.dispatch {
            let specs = layers
                .iter()
                .map(|l| DispatchLayerSpec {
                    layer_type: l.layer_type.clone(),
                    config: config_from_json(&l.config),
                })
                .collect();
            let stack = DispatchStack::from_layers(specs)
                .map_err(|e| FlowError::Configuration(format!("processor '{}': {}", self.name, e)))?;
            processor = processor.with_dispatch_stack(stack);
        }
        for activity in &self.activities {
            processor = processor.with_activity(activity.to_spec()?);
        }
        Ok(processor)
    }
}

impl ActivityDoc {
    fn to_spec(&self) -> Result<ActivitySpec, FlowError> {
        let nested = match &self.dataflow {
            Some(doc) => {
                let mut dataflow = doc.build()?;
                dataflow.set_immutable();
                Some(Box::new(dataflow))
            }
            None => None,
        };
        Ok(ActivitySpec {
            activity_type: self.activity_type.clone(),
            config: config_from_json(&self.config),
            input_mapping: self.input_mapping.clone(),
            output_mapping: self.output_mapping.clone(),
            nested,
        })
    }
}

fn port_doc(port: &Port) -> PortDoc {
    PortDoc {
        name: port.name().to_string(),
        depth: port.depth(),
        granular_depth: (!port.is_input() && port.granular_depth() != port.depth())
            .then_some(port.granular_depth()),
    }
}

impl Dataflow {
    /// Describe this dataflow as a document; building it gives back an equal graph.
    pub fn to_document(&self) -> DataflowDocument {
        DataflowDocument {
            name: self.name().to_string(),
            inputs: self.input_ports().iter().map(port_doc).collect(),
            outputs: self.output_ports().iter().map(port_doc).collect(),
            processors: self
                .processors()
                .iter()
                .map(|p| ProcessorDoc {
                    name: p.name().to_string(),
                    inputs: p.input_ports().iter().map(port_doc).collect(),
                    outputs: p.output_ports().iter().map(port_doc).collect(),
                    iteration: Some(p.iteration_strategy().clone()),
                    dispatch: Some(
                        p.dispatch_stack()
                            .layers()
                            .iter()
                            .map(|l| LayerDoc {
                                layer_type: l.layer_type.clone(),
                                config: config_to_json(&l.config),
                            })
                            .collect(),
                    ),
                    activities: p
                        .activities()
                        .iter()
                        .map(|a| ActivityDoc {
                            activity_type: a.activity_type.clone(),
                            config: config_to_json(&a.config),
                            input_mapping: a.input_mapping.clone(),
                            output_mapping: a.output_mapping.clone(),
                            dataflow: a.nested.as_ref().map(|d| Box::new(d.to_document())),
                        })
                        .collect(),
                })
                .collect(),
            merges: self
                .merges()
                .iter()
                .map(|m| MergeDoc {
                    name: m.name().to_string(),
                    inputs: m.inputs().to_vec(),
                })
                .collect(),
            links: self.links().to_vec(),
            conditions: self.conditions(),
        }
    }
}
