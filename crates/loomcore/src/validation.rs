//! Static checking of a dataflow before it runs.
//!
//! Entities (processors and merges) are resolved in dependency order: an
//! entity can be checked once everything feeding it, and every processor it
//! waits on, has a resolved output depth. Entities caught in a cycle, or fed
//! by something that never resolves, end up unsatisfied; entities whose own
//! configuration is wrong end up failed.

use crate::dispatch::{ParallelizeConfig, RetryConfig, StopConfig, PARALLELIZE, RETRY, STOP};
use crate::{ActivitySpec, Dataflow, Merge, Port, Processor, Sink, Source};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Processor,
    Merge,
}

/// Depth a resolved output will carry, and the finest grain it streams at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortDepth {
    pub depth: usize,
    pub granular_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum UnsatisfiedReason {
    /// An input port has no incoming link.
    MissingInput(String),
    /// Fed by an entity that is itself unsatisfied.
    Upstream(String),
    /// Fed by an entity that failed.
    UpstreamFailed(String),
    /// Member of a dependency cycle with the listed entities.
    Cycle(Vec<String>),
}

impl fmt::Display for UnsatisfiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsatisfiedReason::MissingInput(port) => write!(f, "input '{}' is not connected", port),
            UnsatisfiedReason::Upstream(name) => write!(f, "waits on unsatisfied '{}'", name),
            UnsatisfiedReason::UpstreamFailed(name) => write!(f, "waits on failed '{}'", name),
            UnsatisfiedReason::Cycle(names) => write!(f, "part of cycle [{}]", names.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum EntityStatus {
    Valid,
    Unsatisfied(UnsatisfiedReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub name: String,
    pub kind: EntityKind,
    pub status: EntityStatus,
    /// Resolved depths of each output, for valid entities.
    pub outputs: BTreeMap<String, PortDepth>,
    /// Report of a nested dataflow that made this entity fail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<ValidationReport>>,
}

/// Outcome of [`Dataflow::check_validity`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub dataflow: String,
    pub entities: Vec<EntityReport>,
    /// Resolved depth of each dataflow output; `None` when unresolved.
    pub outputs: BTreeMap<String, Option<PortDepth>>,
    /// No processors and no connected outputs.
    pub incomplete: bool,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.incomplete
            && self.entities.iter().all(|e| e.status == EntityStatus::Valid)
            && self.outputs.values().all(Option::is_some)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &EntityReport> {
        self.entities
            .iter()
            .filter(|e| matches!(e.status, EntityStatus::Failed(_)))
    }

    pub fn unsatisfied(&self) -> impl Iterator<Item = &EntityReport> {
        self.entities
            .iter()
            .filter(|e| matches!(e.status, EntityStatus::Unsatisfied(_)))
    }

    pub fn output(&self, port: &str) -> Option<PortDepth> {
        self.outputs.get(port).copied().flatten()
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        let verdict = if self.is_valid() { "valid" } else { "invalid" };
        writeln!(f, "{}dataflow '{}': {}", pad, self.dataflow, verdict)?;
        if self.incomplete {
            writeln!(f, "{}  structurally incomplete: no processors and no connected outputs", pad)?;
        }
        for entity in &self.entities {
            let kind = match entity.kind {
                EntityKind::Processor => "processor",
                EntityKind::Merge => "merge",
            };
            match &entity.status {
                EntityStatus::Valid => writeln!(f, "{}  {} '{}': valid", pad, kind, entity.name)?,
                EntityStatus::Unsatisfied(reason) => {
                    writeln!(f, "{}  {} '{}': unsatisfied, {}", pad, kind, entity.name, reason)?
                }
                EntityStatus::Failed(msg) => writeln!(f, "{}  {} '{}': failed, {}", pad, kind, entity.name, msg)?,
            }
            if let Some(nested) = &entity.nested {
                nested.write_indented(f, indent + 4)?;
            }
        }
        for (port, depth) in &self.outputs {
            match depth {
                Some(d) => writeln!(
                    f,
                    "{}  output '{}': depth {} (granular {})",
                    pad, port, d.depth, d.granular_depth
                )?,
                None => writeln!(f, "{}  output '{}': unresolved", pad, port)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

enum Resolution {
    Pending,
    Done(EntityStatus, BTreeMap<String, PortDepth>, Option<Box<ValidationReport>>),
}

struct Checker<'a> {
    dataflow: &'a Dataflow,
    statuses: HashMap<&'a str, EntityStatus>,
    depths: HashMap<&'a str, BTreeMap<String, PortDepth>>,
}

impl<'a> Checker<'a> {
    /// Entity feeding a source, if the source is not a dataflow input.
    fn upstream_of(source: &'a Source) -> Option<&'a str> {
        match source {
            Source::DataflowInput { .. } => None,
            Source::ProcessorOutput { processor, .. } => Some(processor),
            Source::Merge { merge } => Some(merge),
        }
    }

    fn source_depth(&self, source: &Source) -> Option<PortDepth> {
        match source {
            Source::DataflowInput { port } => self.dataflow.input_port(port).map(|p| PortDepth {
                depth: p.depth(),
                granular_depth: p.depth(),
            }),
            Source::ProcessorOutput { processor, port } => {
                self.depths.get(processor.as_str())?.get(port).copied()
            }
            Source::Merge { merge } => self.depths.get(merge.as_str())?.get(Merge::OUTPUT).copied(),
        }
    }

    /// Pending while any dependency is unresolved; otherwise the status the
    /// dependencies force on the entity, if any.
    fn blocked_by<'b>(&self, dependencies: impl Iterator<Item = &'b str>) -> Option<Resolution> {
        let mut pending = false;
        for dependency in dependencies {
            match self.statuses.get(dependency) {
                None => pending = true,
                Some(EntityStatus::Valid) => {}
                Some(EntityStatus::Unsatisfied(_)) => {
                    return Some(Resolution::Done(
                        EntityStatus::Unsatisfied(UnsatisfiedReason::Upstream(dependency.to_string())),
                        BTreeMap::new(),
                        None,
                    ))
                }
                Some(EntityStatus::Failed(_)) => {
                    return Some(Resolution::Done(
                        EntityStatus::Unsatisfied(UnsatisfiedReason::UpstreamFailed(dependency.to_string())),
                        BTreeMap::new(),
                        None,
                    ))
                }
            }
        }
        pending.then_some(Resolution::Pending)
    }

    fn check_processor(&self, processor: &'a Processor) -> Resolution {
        let mut sources = Vec::new();
        for port in processor.input_ports() {
            let sink = Sink::processor(processor.name(), port.name());
            match self.dataflow.link_to(&sink) {
                Some(link) => sources.push((port, &link.source)),
                None => return unsatisfied(UnsatisfiedReason::MissingInput(port.name().to_string())),
            }
        }
        let dependencies = sources
            .iter()
            .filter_map(|(_, s)| Self::upstream_of(*s))
            .chain(processor.preconditions().iter().map(String::as_str));
        if let Some(resolution) = self.blocked_by(dependencies) {
            return resolution;
        }

        let mut incoming = BTreeMap::new();
        for (port, source) in &sources {
            let Some(depth) = self.source_depth(source) else {
                return failed(format!("'{}' is fed by unresolved {}", port.name(), source));
            };
            incoming.insert(port.name().to_string(), depth.depth);
        }

        if processor.activities().is_empty() {
            return failed("no activity bound".to_string());
        }
        let names: Vec<&str> = processor.input_ports().iter().map(Port::name).collect();
        if let Err(e) = processor.iteration_strategy().check(&names) {
            return failed(e);
        }
        let (iteration_depth, delivered) = match processor.iteration_strategy().iteration_depth(&incoming) {
            Ok(result) => result,
            Err(e) => return failed(e.to_string()),
        };
        for port in processor.input_ports() {
            let actual = delivered.get(port.name()).copied().unwrap_or(0);
            if actual != port.depth() {
                return failed(format!(
                    "iteration delivers '{}' at depth {}, the port declares {}",
                    port.name(),
                    actual,
                    port.depth()
                ));
            }
        }
        if let Err(e) = check_layer_configs(processor) {
            return failed(e);
        }
        for activity in processor.activities() {
            if activity.activity_type == ActivitySpec::NESTED_DATAFLOW {
                if let Err((msg, nested)) = check_nested(processor, activity) {
                    return Resolution::Done(EntityStatus::Failed(msg), BTreeMap::new(), nested);
                }
            }
        }

        let outputs = processor
            .output_ports()
            .iter()
            .map(|p| {
                (
                    p.name().to_string(),
                    PortDepth {
                        depth: p.depth() + iteration_depth,
                        granular_depth: p.granular_depth() + iteration_depth,
                    },
                )
            })
            .collect();
        Resolution::Done(EntityStatus::Valid, outputs, None)
    }

    fn check_merge(&self, merge: &'a Merge) -> Resolution {
        if merge.inputs().is_empty() {
            return failed("merge has no inputs".to_string());
        }
        let mut sources = Vec::new();
        for port in merge.inputs() {
            match self.dataflow.link_to(&Sink::merge(merge.name(), port.as_str())) {
                Some(link) => sources.push((port, &link.source)),
                None => return unsatisfied(UnsatisfiedReason::MissingInput(port.clone())),
            }
        }
        if let Some(resolution) = self.blocked_by(sources.iter().filter_map(|(_, s)| Self::upstream_of(*s))) {
            return resolution;
        }
        let mut resolved: Option<PortDepth> = None;
        for (port, source) in &sources {
            let Some(depth) = self.source_depth(source) else {
                return failed(format!("'{}' is fed by unresolved {}", port, source));
            };
            resolved = match resolved {
                None => Some(depth),
                Some(prev) if prev.depth != depth.depth => {
                    return failed(format!(
                        "inputs disagree on depth: {} and {} (on '{}')",
                        prev.depth, depth.depth, port
                    ))
                }
                Some(prev) => Some(PortDepth {
                    depth: prev.depth,
                    granular_depth: prev.granular_depth.min(depth.granular_depth),
                }),
            };
        }
        let outputs = resolved
            .map(|d| {
                BTreeMap::from([(
                    Merge::OUTPUT.to_string(),
                    PortDepth {
                        depth: d.depth + 1,
                        granular_depth: d.granular_depth,
                    },
                )])
            })
            .unwrap_or_default();
        Resolution::Done(EntityStatus::Valid, outputs, None)
    }
}

fn failed(msg: String) -> Resolution {
    Resolution::Done(EntityStatus::Failed(msg), BTreeMap::new(), None)
}

fn unsatisfied(reason: UnsatisfiedReason) -> Resolution {
    Resolution::Done(EntityStatus::Unsatisfied(reason), BTreeMap::new(), None)
}

fn check_layer_configs(processor: &Processor) -> Result<(), String> {
    for layer in processor.dispatch_stack().layers() {
        let parsed = match layer.layer_type.as_str() {
            PARALLELIZE => ParallelizeConfig::from_config(&layer.config).map(|_| ()),
            RETRY => RetryConfig::from_config(&layer.config).map(|_| ()),
            STOP => StopConfig::from_config(&layer.config).map(|_| ()),
            _ => Ok(()),
        };
        parsed.map_err(|e| format!("layer '{}': {}", layer.layer_type, e))?;
    }
    Ok(())
}

type NestedFailure = (String, Option<Box<ValidationReport>>);

fn check_nested(processor: &Processor, activity: &ActivitySpec) -> Result<(), NestedFailure> {
    let Some(nested) = activity.nested.as_deref() else {
        return Err(("nested dataflow activity has no dataflow".to_string(), None));
    };
    let report = nested.check_validity();
    if !report.is_valid() {
        return Err((
            format!("nested dataflow '{}' is invalid", nested.name()),
            Some(Box::new(report)),
        ));
    }
    for port in processor.input_ports() {
        let inner = activity.activity_input(port.name());
        if nested.input_port(inner).is_none() {
            return Err((
                format!("input '{}' maps to missing nested input '{}'", port.name(), inner),
                None,
            ));
        }
    }
    for port in processor.output_ports() {
        let inner = activity.activity_output(port.name());
        match report.output(inner) {
            None => {
                return Err((
                    format!("output '{}' maps to missing nested output '{}'", port.name(), inner),
                    None,
                ))
            }
            Some(d) if d.depth != port.depth() => {
                return Err((
                    format!(
                        "output '{}' declares depth {} but nested output '{}' has depth {}",
                        port.name(),
                        port.depth(),
                        inner,
                        d.depth
                    ),
                    None,
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Names of entities that sit on a dependency cycle, with their cycle.
fn find_cycles(dataflow: &Dataflow) -> HashMap<&str, Vec<String>> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for name in dataflow
        .processors()
        .iter()
        .map(Processor::name)
        .chain(dataflow.merges().iter().map(Merge::name))
    {
        nodes.insert(name, graph.add_node(name));
    }
    let entity_of_sink = |sink: &Sink| -> Option<String> {
        match sink {
            Sink::ProcessorInput { processor, .. } => Some(processor.clone()),
            Sink::MergeInput { merge, .. } => Some(merge.clone()),
            Sink::DataflowOutput { .. } => None,
        }
    };
    for link in dataflow.links() {
        let from = Checker::upstream_of(&link.source);
        let to = entity_of_sink(&link.sink);
        if let (Some(from), Some(to)) = (from, to) {
            if let (Some(&a), Some(&b)) = (nodes.get(from), nodes.get(to.as_str())) {
                graph.add_edge(a, b, ());
            }
        }
    }
    for condition in dataflow.conditions() {
        if let (Some(&a), Some(&b)) = (
            nodes.get(condition.control.as_str()),
            nodes.get(condition.target.as_str()),
        ) {
            graph.add_edge(a, b, ());
        }
    }

    let mut cycles = HashMap::new();
    for component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.find_edge(n, n).is_some());
        if !cyclic {
            continue;
        }
        let mut members: Vec<String> = component.iter().map(|&n| graph[n].to_string()).collect();
        members.sort();
        for &n in &component {
            cycles.insert(graph[n], members.clone());
        }
    }
    cycles
}

impl Dataflow {
    /// Classify every processor and merge and resolve output depths.
    pub fn check_validity(&self) -> ValidationReport {
        let cycles = find_cycles(self);
        let mut checker = Checker {
            dataflow: self,
            statuses: HashMap::new(),
            depths: HashMap::new(),
        };
        let mut nested_reports: HashMap<&str, Box<ValidationReport>> = HashMap::new();

        for (name, members) in cycles {
            checker
                .statuses
                .insert(name, EntityStatus::Unsatisfied(UnsatisfiedReason::Cycle(members)));
        }

        loop {
            let mut progress = false;
            for processor in self.processors() {
                if checker.statuses.contains_key(processor.name()) {
                    continue;
                }
                if let Resolution::Done(status, outputs, nested) = checker.check_processor(processor) {
                    checker.statuses.insert(processor.name(), status);
                    checker.depths.insert(processor.name(), outputs);
                    if let Some(nested) = nested {
                        nested_reports.insert(processor.name(), nested);
                    }
                    progress = true;
                }
            }
            for merge in self.merges() {
                if checker.statuses.contains_key(merge.name()) {
                    continue;
                }
                if let Resolution::Done(status, outputs, _) = checker.check_merge(merge) {
                    checker.statuses.insert(merge.name(), status);
                    checker.depths.insert(merge.name(), outputs);
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }

        let mut entities = Vec::new();
        let kinds = self
            .processors()
            .iter()
            .map(|p| (p.name(), EntityKind::Processor))
            .chain(self.merges().iter().map(|m| (m.name(), EntityKind::Merge)));
        for (name, kind) in kinds {
            let status = checker
                .statuses
                .get(name)
                .cloned()
                .unwrap_or_else(|| EntityStatus::Unsatisfied(UnsatisfiedReason::Upstream(name.to_string())));
            entities.push(EntityReport {
                name: name.to_string(),
                kind,
                status,
                outputs: checker.depths.get(name).cloned().unwrap_or_default(),
                nested: nested_reports.remove(name),
            });
        }

        let mut outputs = BTreeMap::new();
        let mut connected_outputs = 0;
        for port in self.output_ports() {
            let depth = self.link_to(&Sink::dataflow_output(port.name())).and_then(|link| {
                connected_outputs += 1;
                checker.source_depth(&link.source)
            });
            outputs.insert(port.name().to_string(), depth);
        }

        let report = ValidationReport {
            dataflow: self.name().to_string(),
            entities,
            outputs,
            incomplete: self.processors().is_empty() && connected_outputs == 0,
        };
        tracing::debug!(dataflow = %self.name(), valid = report.is_valid(), "checked validity");
        report
    }
}
