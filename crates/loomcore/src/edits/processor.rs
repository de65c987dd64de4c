//! Edits that change the inside of a single processor.
//!
//! They all work on a copy of the processor and swap it in only when the
//! change is accepted; the inverse puts the previous copy back.

use super::Edit;
use crate::port::is_valid_name;
use crate::{
    ActivitySpec, Dataflow, DispatchLayerSpec, EditError, IterationStrategyStack, NamingError, Port,
    Processor, Sink, Source,
};

fn not_found(kind: &'static str, name: impl Into<String>) -> EditError {
    EditError::NotFound {
        kind,
        name: name.into(),
    }
}

/// Run `change` on a copy of the named processor and install the copy.
fn update_processor<F>(dataflow: &mut Dataflow, name: &str, change: F) -> Result<Box<dyn Edit>, EditError>
where
    F: FnOnce(&mut Processor) -> Result<(), EditError>,
{
    let current = dataflow
        .processor_mut(name)
        .ok_or_else(|| not_found("processor", name))?;
    let mut updated = current.clone();
    change(&mut updated)?;
    let previous = std::mem::replace(current, updated);
    Ok(Box::new(ReplaceProcessor { snapshot: previous }))
}

/// Restores a processor to an earlier snapshot.
#[derive(Debug)]
struct ReplaceProcessor {
    snapshot: Processor,
}

impl Edit for ReplaceProcessor {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let snapshot = self.snapshot.clone();
        update_processor(dataflow, self.snapshot.name(), move |p| {
            *p = snapshot;
            Ok(())
        })
    }

    fn description(&self) -> String {
        format!("restore processor '{}'", self.snapshot.name())
    }
}

#[derive(Debug)]
pub struct AddProcessorInput {
    pub processor: String,
    pub port: Port,
}

impl AddProcessorInput {
    pub fn new(processor: impl Into<String>, port: impl Into<String>, depth: usize) -> Self {
        Self {
            processor: processor.into(),
            port: Port::input(port, depth),
        }
    }
}

impl Edit for AddProcessorInput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let port = self.port.clone();
        update_processor(dataflow, &self.processor, |p| {
            if !is_valid_name(port.name()) {
                return Err(NamingError::InvalidName(port.name().to_string()).into());
            }
            if p.input(port.name()).is_some() {
                return Err(NamingError::DuplicatePort {
                    owner: p.name().to_string(),
                    port: port.name().to_string(),
                }
                .into());
            }
            p.push_input(port);
            Ok(())
        })
    }

    fn description(&self) -> String {
        format!("add input '{}' to '{}'", self.port.name(), self.processor)
    }
}

#[derive(Debug)]
pub struct RemoveProcessorInput {
    pub processor: String,
    pub port: String,
}

impl RemoveProcessorInput {
    pub fn new(processor: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            port: port.into(),
        }
    }
}

impl Edit for RemoveProcessorInput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let sink = Sink::processor(self.processor.clone(), self.port.clone());
        if dataflow.link_to(&sink).is_some() {
            return Err(EditError::InUse {
                kind: "processor input",
                name: sink.to_string(),
            });
        }
        update_processor(dataflow, &self.processor, |p| {
            p.remove_input(&self.port)
                .map(|_| ())
                .ok_or_else(|| not_found("processor input", self.port.clone()))
        })
    }

    fn description(&self) -> String {
        format!("remove input '{}' from '{}'", self.port, self.processor)
    }
}

#[derive(Debug)]
pub struct AddProcessorOutput {
    pub processor: String,
    pub port: Port,
}

impl AddProcessorOutput {
    pub fn new(processor: impl Into<String>, port: impl Into<String>, depth: usize) -> Self {
        Self {
            processor: processor.into(),
            port: Port::output(port, depth),
        }
    }

    pub fn granular(processor: impl Into<String>, port: impl Into<String>, depth: usize, granular_depth: usize) -> Self {
        Self {
            processor: processor.into(),
            port: Port::output_with_granularity(port, depth, granular_depth),
        }
    }
}

impl Edit for AddProcessorOutput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let port = self.port.clone();
        update_processor(dataflow, &self.processor, |p| {
            if !is_valid_name(port.name()) {
                return Err(NamingError::InvalidName(port.name().to_string()).into());
            }
            if p.output(port.name()).is_some() {
                return Err(NamingError::DuplicatePort {
                    owner: p.name().to_string(),
                    port: port.name().to_string(),
                }
                .into());
            }
            p.push_output(port);
            Ok(())
        })
    }

    fn description(&self) -> String {
        format!("add output '{}' to '{}'", self.port.name(), self.processor)
    }
}

#[derive(Debug)]
pub struct RemoveProcessorOutput {
    pub processor: String,
    pub port: String,
}

impl RemoveProcessorOutput {
    pub fn new(processor: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            port: port.into(),
        }
    }
}

impl Edit for RemoveProcessorOutput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let source = Source::processor(self.processor.clone(), self.port.clone());
        if dataflow.links_from(&source).next().is_some() {
            return Err(EditError::InUse {
                kind: "processor output",
                name: source.to_string(),
            });
        }
        update_processor(dataflow, &self.processor, |p| {
            p.remove_output(&self.port)
                .map(|_| ())
                .ok_or_else(|| not_found("processor output", self.port.clone()))
        })
    }

    fn description(&self) -> String {
        format!("remove output '{}' from '{}'", self.port, self.processor)
    }
}

/// Replaces the whole iteration strategy stack of a processor.
#[derive(Debug)]
pub struct SetIterationStrategy {
    pub processor: String,
    pub strategy: IterationStrategyStack,
}

impl SetIterationStrategy {
    pub fn new(processor: impl Into<String>, strategy: IterationStrategyStack) -> Self {
        Self {
            processor: processor.into(),
            strategy,
        }
    }
}

impl Edit for SetIterationStrategy {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let strategy = self.strategy.clone();
        update_processor(dataflow, &self.processor, |p| {
            let inputs: Vec<&str> = p.input_ports().iter().map(Port::name).collect();
            strategy.check(&inputs).map_err(EditError::IterationStrategy)?;
            *p.iteration_mut() = strategy;
            Ok(())
        })
    }

    fn description(&self) -> String {
        format!("set iteration strategy of '{}'", self.processor)
    }
}

#[derive(Debug)]
pub struct AddDispatchLayer {
    pub processor: String,
    pub position: usize,
    pub layer: DispatchLayerSpec,
}

impl AddDispatchLayer {
    pub fn new(processor: impl Into<String>, position: usize, layer: DispatchLayerSpec) -> Self {
        Self {
            processor: processor.into(),
            position,
            layer,
        }
    }
}

impl Edit for AddDispatchLayer {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let layer = self.layer.clone();
        update_processor(dataflow, &self.processor, |p| {
            p.dispatch_mut()
                .insert(self.position, layer)
                .map_err(EditError::DispatchStack)
        })
    }

    fn description(&self) -> String {
        format!(
            "add '{}' layer to '{}' at {}",
            self.layer.layer_type, self.processor, self.position
        )
    }
}

#[derive(Debug)]
pub struct RemoveDispatchLayer {
    pub processor: String,
    pub position: usize,
}

impl RemoveDispatchLayer {
    pub fn new(processor: impl Into<String>, position: usize) -> Self {
        Self {
            processor: processor.into(),
            position,
        }
    }
}

impl Edit for RemoveDispatchLayer {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        update_processor(dataflow, &self.processor, |p| {
            p.dispatch_mut()
                .remove(self.position)
                .map(|_| ())
                .map_err(EditError::DispatchStack)
        })
    }

    fn description(&self) -> String {
        format!("remove layer {} from '{}'", self.position, self.processor)
    }
}

/// Swaps the layer at `position` for a reconfigured one.
#[derive(Debug)]
pub struct ConfigureDispatchLayer {
    pub processor: String,
    pub position: usize,
    pub layer: DispatchLayerSpec,
}

impl ConfigureDispatchLayer {
    pub fn new(processor: impl Into<String>, position: usize, layer: DispatchLayerSpec) -> Self {
        Self {
            processor: processor.into(),
            position,
            layer,
        }
    }
}

impl Edit for ConfigureDispatchLayer {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let layer = self.layer.clone();
        update_processor(dataflow, &self.processor, |p| {
            p.dispatch_mut()
                .replace(self.position, layer)
                .map(|_| ())
                .map_err(EditError::DispatchStack)
        })
    }

    fn description(&self) -> String {
        format!("configure layer {} of '{}'", self.position, self.processor)
    }
}

#[derive(Debug)]
pub struct AddActivity {
    pub processor: String,
    pub activity: ActivitySpec,
}

impl AddActivity {
    pub fn new(processor: impl Into<String>, activity: ActivitySpec) -> Self {
        Self {
            processor: processor.into(),
            activity,
        }
    }
}

impl Edit for AddActivity {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let activity = self.activity.clone();
        update_processor(dataflow, &self.processor, |p| {
            p.activities_mut().push(activity);
            Ok(())
        })
    }

    fn description(&self) -> String {
        format!(
            "bind '{}' activity to '{}'",
            self.activity.activity_type, self.processor
        )
    }
}

#[derive(Debug)]
pub struct RemoveActivity {
    pub processor: String,
    pub position: usize,
}

impl RemoveActivity {
    pub fn new(processor: impl Into<String>, position: usize) -> Self {
        Self {
            processor: processor.into(),
            position,
        }
    }
}

impl Edit for RemoveActivity {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        update_processor(dataflow, &self.processor, |p| {
            let activities = p.activities_mut();
            if self.position >= activities.len() {
                return Err(not_found("activity", self.position.to_string()));
            }
            activities.remove(self.position);
            Ok(())
        })
    }

    fn description(&self) -> String {
        format!("unbind activity {} from '{}'", self.position, self.processor)
    }
}

/// `target` will not start before `control` has finished.
#[derive(Debug)]
pub struct CreateCondition {
    pub control: String,
    pub target: String,
}

impl CreateCondition {
    pub fn new(control: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            control: control.into(),
            target: target.into(),
        }
    }
}

impl Edit for CreateCondition {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        if self.control == self.target {
            return Err(EditError::InvalidCondition(format!(
                "'{}' cannot control itself",
                self.control
            )));
        }
        if dataflow.processor(&self.control).is_none() {
            return Err(not_found("processor", self.control.clone()));
        }
        let target = dataflow
            .processor_mut(&self.target)
            .ok_or_else(|| not_found("processor", self.target.clone()))?;
        if !target.preconditions_mut().insert(self.control.clone()) {
            return Err(EditError::InvalidCondition(format!(
                "'{}' already waits for '{}'",
                self.target, self.control
            )));
        }
        Ok(Box::new(RemoveCondition::new(self.control.clone(), self.target.clone())))
    }

    fn description(&self) -> String {
        format!("make '{}' wait for '{}'", self.target, self.control)
    }
}

#[derive(Debug)]
pub struct RemoveCondition {
    pub control: String,
    pub target: String,
}

impl RemoveCondition {
    pub fn new(control: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            control: control.into(),
            target: target.into(),
        }
    }
}

impl Edit for RemoveCondition {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let target = dataflow
            .processor_mut(&self.target)
            .ok_or_else(|| not_found("processor", self.target.clone()))?;
        if !target.preconditions_mut().remove(&self.control) {
            return Err(not_found("condition", format!("{} -> {}", self.control, self.target)));
        }
        Ok(Box::new(CreateCondition::new(self.control.clone(), self.target.clone())))
    }

    fn description(&self) -> String {
        format!("drop wait of '{}' on '{}'", self.target, self.control)
    }
}
