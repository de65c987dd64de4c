use crate::{ActivitySpec, DispatchStack, IterationStrategyStack, Port};
use std::collections::BTreeSet;

/// Unit of computation in a dataflow.
///
/// A processor is assembled with the `with_*` builders before it is added to a
/// dataflow; once added it only changes through edits.
#[derive(Debug, Clone, PartialEq)]
pub struct Processor {
    name: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    iteration: IterationStrategyStack,
    dispatch: DispatchStack,
    activities: Vec<ActivitySpec>,
    preconditions: BTreeSet<String>,
}

impl Processor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            iteration: IterationStrategyStack::default(),
            dispatch: DispatchStack::default(),
            activities: Vec::new(),
            preconditions: BTreeSet::new(),
        }
    }

    /// Adds an input port and binds it in the first iteration strategy.
    pub fn with_input(mut self, name: impl Into<String>, depth: usize) -> Self {
        self.push_input(Port::input(name, depth));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, depth: usize) -> Self {
        self.outputs.push(Port::output(name, depth));
        self
    }

    pub fn with_granular_output(mut self, name: impl Into<String>, depth: usize, granular_depth: usize) -> Self {
        self.outputs
            .push(Port::output_with_granularity(name, depth, granular_depth));
        self
    }

    pub fn with_activity(mut self, activity: ActivitySpec) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn with_iteration(mut self, iteration: IterationStrategyStack) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_dispatch_stack(mut self, dispatch: DispatchStack) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    pub fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    pub fn iteration_strategy(&self) -> &IterationStrategyStack {
        &self.iteration
    }

    pub fn dispatch_stack(&self) -> &DispatchStack {
        &self.dispatch
    }

    pub fn activities(&self) -> &[ActivitySpec] {
        &self.activities
    }

    /// Processors that must finish before this one may start.
    pub fn preconditions(&self) -> &BTreeSet<String> {
        &self.preconditions
    }

    pub(crate) fn push_input(&mut self, port: Port) {
        self.iteration.add_port(port.name(), port.depth());
        self.inputs.push(port);
    }

    pub(crate) fn remove_input(&mut self, name: &str) -> Option<Port> {
        let position = self.inputs.iter().position(|p| p.name() == name)?;
        self.iteration.remove_port(name);
        Some(self.inputs.remove(position))
    }

    pub(crate) fn push_output(&mut self, port: Port) {
        self.outputs.push(port);
    }

    pub(crate) fn remove_output(&mut self, name: &str) -> Option<Port> {
        let position = self.outputs.iter().position(|p| p.name() == name)?;
        Some(self.outputs.remove(position))
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn iteration_mut(&mut self) -> &mut IterationStrategyStack {
        &mut self.iteration
    }

    pub(crate) fn dispatch_mut(&mut self) -> &mut DispatchStack {
        &mut self.dispatch
    }

    pub(crate) fn activities_mut(&mut self) -> &mut Vec<ActivitySpec> {
        &mut self.activities
    }

    pub(crate) fn preconditions_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.preconditions
    }
}
