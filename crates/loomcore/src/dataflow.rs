use crate::{Datalink, Merge, Port, Processor, Sink, Source};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Control dependency: `target` waits until `control` has finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub control: String,
    pub target: String,
}

/// Complete workflow graph.
///
/// Read-only from the outside: every change goes through an
/// [`Edit`](crate::edits::Edit) applied with [`Dataflow::edit`]. Each applied
/// edit gives the dataflow a fresh internal identifier so caches keyed on it
/// notice the change. Once [`set_immutable`](Dataflow::set_immutable) is
/// called all edits fail and the graph may be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataflow {
    name: String,
    internal_id: Uuid,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    processors: Vec<Processor>,
    merges: Vec<Merge>,
    links: Vec<Datalink>,
    immutable: bool,
}

impl Dataflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            internal_id: Uuid::new_v4(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            processors: Vec::new(),
            merges: Vec::new(),
            links: Vec::new(),
            immutable: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn internal_id(&self) -> Uuid {
        self.internal_id
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    pub fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn processor(&self, name: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.name() == name)
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn merge(&self, name: &str) -> Option<&Merge> {
        self.merges.iter().find(|m| m.name() == name)
    }

    pub fn links(&self) -> &[Datalink] {
        &self.links
    }

    /// Outgoing links of a source, in creation order.
    pub fn links_from<'a>(&'a self, source: &'a Source) -> impl Iterator<Item = &'a Datalink> + 'a {
        self.links.iter().filter(move |l| &l.source == source)
    }

    /// The single incoming link of a sink.
    pub fn link_to(&self, sink: &Sink) -> Option<&Datalink> {
        self.links.iter().find(|l| &l.sink == sink)
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.processors
            .iter()
            .flat_map(|p| {
                p.preconditions().iter().map(move |control| Condition {
                    control: control.clone(),
                    target: p.name().to_string(),
                })
            })
            .collect()
    }

    /// Processors whose start is blocked on `control`.
    pub fn controlled_by<'a>(&'a self, control: &'a str) -> impl Iterator<Item = &'a Processor> + 'a {
        self.processors
            .iter()
            .filter(move |p| p.preconditions().contains(control))
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Freeze the graph; required before execution.
    pub fn set_immutable(&mut self) {
        self.immutable = true;
    }

    /// Whether a processor or merge already uses `name`.
    pub(crate) fn has_entity(&self, name: &str) -> bool {
        self.processor(name).is_some() || self.merge(name).is_some()
    }

    pub(crate) fn touch(&mut self) {
        self.internal_id = Uuid::new_v4();
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut Vec<Port> {
        &mut self.inputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut Vec<Port> {
        &mut self.outputs
    }

    pub(crate) fn processors_mut(&mut self) -> &mut Vec<Processor> {
        &mut self.processors
    }

    pub(crate) fn processor_mut(&mut self, name: &str) -> Option<&mut Processor> {
        self.processors.iter_mut().find(|p| p.name() == name)
    }

    pub(crate) fn merges_mut(&mut self) -> &mut Vec<Merge> {
        &mut self.merges
    }

    pub(crate) fn merge_mut(&mut self, name: &str) -> Option<&mut Merge> {
        self.merges.iter_mut().find(|m| m.name() == name)
    }

    pub(crate) fn links_mut(&mut self) -> &mut Vec<Datalink> {
        &mut self.links
    }
}
