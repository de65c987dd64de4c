use super::Edit;
use crate::port::is_valid_name;
use crate::{Dataflow, Datalink, EditError, Merge, NamingError, Port, Processor, Sink, Source};
use std::collections::HashSet;

fn check_name(name: &str) -> Result<(), EditError> {
    if !is_valid_name(name) {
        return Err(NamingError::InvalidName(name.to_string()).into());
    }
    Ok(())
}

fn not_found(kind: &'static str, name: impl Into<String>) -> EditError {
    EditError::NotFound {
        kind,
        name: name.into(),
    }
}

fn check_unique_ports(owner: &str, ports: &[Port]) -> Result<(), EditError> {
    let mut seen = HashSet::new();
    for port in ports {
        check_name(port.name())?;
        if !seen.insert(port.name()) {
            return Err(NamingError::DuplicatePort {
                owner: owner.to_string(),
                port: port.name().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

pub(crate) fn check_source(dataflow: &Dataflow, source: &Source) -> Result<(), EditError> {
    let found = match source {
        Source::DataflowInput { port } => dataflow.input_port(port).is_some(),
        Source::ProcessorOutput { processor, port } => dataflow
            .processor(processor)
            .is_some_and(|p| p.output(port).is_some()),
        Source::Merge { merge } => dataflow.merge(merge).is_some(),
    };
    if found {
        Ok(())
    } else {
        Err(not_found("source", source.to_string()))
    }
}

pub(crate) fn check_sink(dataflow: &Dataflow, sink: &Sink) -> Result<(), EditError> {
    let found = match sink {
        Sink::DataflowOutput { port } => dataflow.output_port(port).is_some(),
        Sink::ProcessorInput { processor, port } => dataflow
            .processor(processor)
            .is_some_and(|p| p.input(port).is_some()),
        Sink::MergeInput { merge, port } => dataflow
            .merge(merge)
            .is_some_and(|m| m.position(port).is_some()),
    };
    if found {
        Ok(())
    } else {
        Err(not_found("sink", sink.to_string()))
    }
}

fn touches_processor(link: &Datalink, name: &str) -> bool {
    matches!(&link.source, Source::ProcessorOutput { processor, .. } if processor == name)
        || matches!(&link.sink, Sink::ProcessorInput { processor, .. } if processor == name)
}

fn touches_merge(link: &Datalink, name: &str) -> bool {
    matches!(&link.source, Source::Merge { merge } if merge == name)
        || matches!(&link.sink, Sink::MergeInput { merge, .. } if merge == name)
}

#[derive(Debug)]
pub struct AddProcessor {
    pub processor: Processor,
    pub position: Option<usize>,
}

impl AddProcessor {
    pub fn new(processor: Processor) -> Self {
        Self {
            processor,
            position: None,
        }
    }
}

impl Edit for AddProcessor {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let p = &self.processor;
        check_name(p.name())?;
        if dataflow.has_entity(p.name()) {
            return Err(NamingError::DuplicateProcessor(p.name().to_string()).into());
        }
        check_unique_ports(p.name(), p.input_ports())?;
        check_unique_ports(p.name(), p.output_ports())?;
        let inputs: Vec<&str> = p.input_ports().iter().map(Port::name).collect();
        p.iteration_strategy()
            .check(&inputs)
            .map_err(EditError::IterationStrategy)?;
        for control in p.preconditions() {
            if control == p.name() || dataflow.processor(control).is_none() {
                return Err(not_found("control processor", control.clone()));
            }
        }
        let processors = dataflow.processors_mut();
        let position = self.position.unwrap_or(processors.len()).min(processors.len());
        processors.insert(position, p.clone());
        Ok(Box::new(RemoveProcessor::new(p.name())))
    }

    fn description(&self) -> String {
        format!("add processor '{}'", self.processor.name())
    }
}

/// Removes a processor with no links and no dependants.
#[derive(Debug)]
pub struct RemoveProcessor {
    pub name: String,
}

impl RemoveProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Edit for RemoveProcessor {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let position = dataflow
            .processors()
            .iter()
            .position(|p| p.name() == self.name)
            .ok_or_else(|| not_found("processor", self.name.clone()))?;
        if dataflow.links().iter().any(|l| touches_processor(l, &self.name))
            || dataflow.controlled_by(&self.name).next().is_some()
        {
            return Err(EditError::InUse {
                kind: "processor",
                name: self.name.clone(),
            });
        }
        let removed = dataflow.processors_mut().remove(position);
        Ok(Box::new(AddProcessor {
            processor: removed,
            position: Some(position),
        }))
    }

    fn description(&self) -> String {
        format!("remove processor '{}'", self.name)
    }
}

/// Renames a processor and rewrites every link and condition naming it.
#[derive(Debug)]
pub struct RenameProcessor {
    pub from: String,
    pub to: String,
}

impl RenameProcessor {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Edit for RenameProcessor {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_name(&self.to)?;
        if dataflow.processor(&self.from).is_none() {
            return Err(not_found("processor", self.from.clone()));
        }
        if dataflow.has_entity(&self.to) {
            return Err(NamingError::DuplicateProcessor(self.to.clone()).into());
        }
        for p in dataflow.processors_mut() {
            if p.name() == self.from {
                p.set_name(self.to.clone());
            }
            let preconditions = p.preconditions_mut();
            if preconditions.remove(&self.from) {
                preconditions.insert(self.to.clone());
            }
        }
        for link in dataflow.links_mut() {
            if let Source::ProcessorOutput { processor, .. } = &mut link.source {
                if *processor == self.from {
                    *processor = self.to.clone();
                }
            }
            if let Sink::ProcessorInput { processor, .. } = &mut link.sink {
                if *processor == self.from {
                    *processor = self.to.clone();
                }
            }
        }
        Ok(Box::new(RenameProcessor::new(self.to.clone(), self.from.clone())))
    }

    fn description(&self) -> String {
        format!("rename processor '{}' to '{}'", self.from, self.to)
    }
}

#[derive(Debug)]
pub struct AddDataflowInput {
    pub port: Port,
    pub position: Option<usize>,
}

impl AddDataflowInput {
    pub fn new(name: impl Into<String>, depth: usize) -> Self {
        Self {
            port: Port::input(name, depth),
            position: None,
        }
    }
}

impl Edit for AddDataflowInput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_name(self.port.name())?;
        if dataflow.input_port(self.port.name()).is_some() {
            return Err(NamingError::DuplicatePort {
                owner: format!("dataflow '{}'", dataflow.name()),
                port: self.port.name().to_string(),
            }
            .into());
        }
        let inputs = dataflow.inputs_mut();
        let position = self.position.unwrap_or(inputs.len()).min(inputs.len());
        inputs.insert(position, self.port.clone());
        Ok(Box::new(RemoveDataflowInput::new(self.port.name())))
    }

    fn description(&self) -> String {
        format!("add dataflow input '{}'", self.port.name())
    }
}

#[derive(Debug)]
pub struct RemoveDataflowInput {
    pub name: String,
}

impl RemoveDataflowInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Edit for RemoveDataflowInput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let position = dataflow
            .input_ports()
            .iter()
            .position(|p| p.name() == self.name)
            .ok_or_else(|| not_found("dataflow input", self.name.clone()))?;
        let source = Source::dataflow_input(self.name.clone());
        if dataflow.links_from(&source).next().is_some() {
            return Err(EditError::InUse {
                kind: "dataflow input",
                name: self.name.clone(),
            });
        }
        let port = dataflow.inputs_mut().remove(position);
        Ok(Box::new(AddDataflowInput {
            port,
            position: Some(position),
        }))
    }

    fn description(&self) -> String {
        format!("remove dataflow input '{}'", self.name)
    }
}

/// Adds a workflow output; its depth is resolved from whatever feeds it.
#[derive(Debug)]
pub struct AddDataflowOutput {
    pub port: Port,
    pub position: Option<usize>,
}

impl AddDataflowOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            port: Port::output(name, 0),
            position: None,
        }
    }
}

impl Edit for AddDataflowOutput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_name(self.port.name())?;
        if dataflow.output_port(self.port.name()).is_some() {
            return Err(NamingError::DuplicatePort {
                owner: format!("dataflow '{}'", dataflow.name()),
                port: self.port.name().to_string(),
            }
            .into());
        }
        let outputs = dataflow.outputs_mut();
        let position = self.position.unwrap_or(outputs.len()).min(outputs.len());
        outputs.insert(position, self.port.clone());
        Ok(Box::new(RemoveDataflowOutput::new(self.port.name())))
    }

    fn description(&self) -> String {
        format!("add dataflow output '{}'", self.port.name())
    }
}

#[derive(Debug)]
pub struct RemoveDataflowOutput {
    pub name: String,
}

impl RemoveDataflowOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Edit for RemoveDataflowOutput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let position = dataflow
            .output_ports()
            .iter()
            .position(|p| p.name() == self.name)
            .ok_or_else(|| not_found("dataflow output", self.name.clone()))?;
        if dataflow.link_to(&Sink::dataflow_output(self.name.clone())).is_some() {
            return Err(EditError::InUse {
                kind: "dataflow output",
                name: self.name.clone(),
            });
        }
        let port = dataflow.outputs_mut().remove(position);
        Ok(Box::new(AddDataflowOutput {
            port,
            position: Some(position),
        }))
    }

    fn description(&self) -> String {
        format!("remove dataflow output '{}'", self.name)
    }
}

#[derive(Debug)]
pub struct AddMerge {
    pub merge: Merge,
    pub position: Option<usize>,
}

impl AddMerge {
    pub fn new(merge: Merge) -> Self {
        Self {
            merge,
            position: None,
        }
    }
}

impl Edit for AddMerge {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_name(self.merge.name())?;
        if dataflow.has_entity(self.merge.name()) {
            return Err(NamingError::DuplicateMerge(self.merge.name().to_string()).into());
        }
        let mut seen = HashSet::new();
        for port in self.merge.inputs() {
            check_name(port)?;
            if !seen.insert(port.as_str()) {
                return Err(NamingError::DuplicatePort {
                    owner: format!("merge '{}'", self.merge.name()),
                    port: port.clone(),
                }
                .into());
            }
        }
        let merges = dataflow.merges_mut();
        let position = self.position.unwrap_or(merges.len()).min(merges.len());
        merges.insert(position, self.merge.clone());
        Ok(Box::new(RemoveMerge::new(self.merge.name())))
    }

    fn description(&self) -> String {
        format!("add merge '{}'", self.merge.name())
    }
}

#[derive(Debug)]
pub struct RemoveMerge {
    pub name: String,
}

impl RemoveMerge {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Edit for RemoveMerge {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let position = dataflow
            .merges()
            .iter()
            .position(|m| m.name() == self.name)
            .ok_or_else(|| not_found("merge", self.name.clone()))?;
        if dataflow.links().iter().any(|l| touches_merge(l, &self.name)) {
            return Err(EditError::InUse {
                kind: "merge",
                name: self.name.clone(),
            });
        }
        let merge = dataflow.merges_mut().remove(position);
        Ok(Box::new(AddMerge {
            merge,
            position: Some(position),
        }))
    }

    fn description(&self) -> String {
        format!("remove merge '{}'", self.name)
    }
}

/// Adds an input port to a merge; `position` defaults to the end.
#[derive(Debug)]
pub struct AddMergeInput {
    pub merge: String,
    pub port: String,
    pub position: Option<usize>,
}

impl AddMergeInput {
    pub fn new(merge: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            merge: merge.into(),
            port: port.into(),
            position: None,
        }
    }
}

impl Edit for AddMergeInput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_name(&self.port)?;
        let merge = dataflow
            .merge_mut(&self.merge)
            .ok_or_else(|| not_found("merge", self.merge.clone()))?;
        if merge.position(&self.port).is_some() {
            return Err(NamingError::DuplicatePort {
                owner: format!("merge '{}'", self.merge),
                port: self.port.clone(),
            }
            .into());
        }
        let position = self.position.unwrap_or(merge.inputs().len());
        merge.insert_input(position, self.port.clone());
        Ok(Box::new(RemoveMergeInput::new(self.merge.clone(), self.port.clone())))
    }

    fn description(&self) -> String {
        format!("add input '{}' to merge '{}'", self.port, self.merge)
    }
}

#[derive(Debug)]
pub struct RemoveMergeInput {
    pub merge: String,
    pub port: String,
}

impl RemoveMergeInput {
    pub fn new(merge: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            merge: merge.into(),
            port: port.into(),
        }
    }
}

impl Edit for RemoveMergeInput {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        if dataflow
            .link_to(&Sink::merge(self.merge.clone(), self.port.clone()))
            .is_some()
        {
            return Err(EditError::InUse {
                kind: "merge input",
                name: self.port.clone(),
            });
        }
        let merge = dataflow
            .merge_mut(&self.merge)
            .ok_or_else(|| not_found("merge", self.merge.clone()))?;
        let position = merge
            .remove_input(&self.port)
            .ok_or_else(|| not_found("merge input", self.port.clone()))?;
        Ok(Box::new(AddMergeInput {
            merge: self.merge.clone(),
            port: self.port.clone(),
            position: Some(position),
        }))
    }

    fn description(&self) -> String {
        format!("remove input '{}' from merge '{}'", self.port, self.merge)
    }
}

/// Links a source to an unconnected sink.
#[derive(Debug)]
pub struct Connect {
    pub link: Datalink,
    pub position: Option<usize>,
}

impl Connect {
    pub fn new(source: Source, sink: Sink) -> Self {
        Self {
            link: Datalink::new(source, sink),
            position: None,
        }
    }
}

impl Edit for Connect {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_source(dataflow, &self.link.source)?;
        check_sink(dataflow, &self.link.sink)?;
        if dataflow.link_to(&self.link.sink).is_some() {
            return Err(EditError::SinkConnected(self.link.sink.to_string()));
        }
        let links = dataflow.links_mut();
        let position = self.position.unwrap_or(links.len()).min(links.len());
        links.insert(position, self.link.clone());
        Ok(Box::new(Disconnect::new(self.link.clone())))
    }

    fn description(&self) -> String {
        format!("connect {}", self.link)
    }
}

#[derive(Debug)]
pub struct Disconnect {
    pub link: Datalink,
}

impl Disconnect {
    pub fn new(link: Datalink) -> Self {
        Self { link }
    }
}

impl Edit for Disconnect {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let position = dataflow
            .links()
            .iter()
            .position(|l| *l == self.link)
            .ok_or_else(|| not_found("datalink", self.link.to_string()))?;
        let link = dataflow.links_mut().remove(position);
        Ok(Box::new(Connect {
            link,
            position: Some(position),
        }))
    }

    fn description(&self) -> String {
        format!("disconnect {}", self.link)
    }
}

#[derive(Debug)]
pub struct RenameDataflow {
    pub name: String,
}

impl RenameDataflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Edit for RenameDataflow {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        check_name(&self.name)?;
        let previous = dataflow.name().to_string();
        dataflow.set_name(self.name.clone());
        Ok(Box::new(RenameDataflow::new(previous)))
    }

    fn description(&self) -> String {
        format!("rename dataflow to '{}'", self.name)
    }
}
