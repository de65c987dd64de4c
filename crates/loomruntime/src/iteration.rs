//! Expansion of complete input values into jobs.
//!
//! A processor's strategy stack is evaluated over the values that arrived on
//! its input ports. Port leaves drill into their value down to the desired
//! depth, cross products graft the trees of their children one below the
//! other (leftmost outermost), dot products zip them level by level. Later
//! strategies in the stack are evaluated again at every leaf of the tree the
//! earlier ones produced. The resulting tree is flattened in post-order into
//! jobs and collection completions.
//!
//! While ports are still streaming, [`plan_partial`] evaluates the first
//! strategy over the elements received so far. Any combination whose inputs
//! are all present becomes a job right away; completions are only planned
//! for the part of the tree no later token can change.

use loomcore::{Datum, IndexPath, IterationError, IterationNode, IterationStrategyStack, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum IterationTree {
    Leaf(BTreeMap<String, Datum>),
    Branch(Vec<IterationTree>),
}

/// Input bindings for one job
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJob {
    pub index: IndexPath,
    pub inputs: BTreeMap<String, Datum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// The job at this index
    Job(IndexPath),
    /// All `size` elements below the index have been planned
    Complete { index: IndexPath, size: usize },
}

/// Jobs of one processor firing, and the post-order in which their results
/// and the collections enclosing them are emitted.
#[derive(Debug, Clone)]
pub struct IterationPlan {
    /// Index levels added by the iteration
    pub depth: usize,
    pub jobs: Vec<PlannedJob>,
    pub steps: Vec<PlanStep>,
}

impl IterationPlan {
    pub fn indices(&self) -> Vec<&IndexPath> {
        self.jobs.iter().map(|j| &j.index).collect()
    }
}

pub fn plan(
    stack: &IterationStrategyStack,
    inputs: &BTreeMap<String, Datum>,
) -> Result<IterationPlan, IterationError> {
    let incoming: BTreeMap<String, usize> = inputs.iter().map(|(port, d)| (port.clone(), d.depth)).collect();
    let (depth, _) = stack.iteration_depth(&incoming)?;

    let mut tree = IterationTree::Leaf(inputs.clone());
    for strategy in stack.strategies() {
        tree = expand(tree, strategy.root())?;
    }

    let mut jobs = Vec::new();
    let mut steps = Vec::new();
    flatten(tree, IndexPath::root(), &mut jobs, &mut steps);
    Ok(IterationPlan { depth, jobs, steps })
}

/// Tokens received so far on the input ports of one processor run
#[derive(Debug, Default)]
pub struct InputBuffer {
    ports: BTreeMap<String, PortBuffer>,
}

#[derive(Debug)]
struct PortBuffer {
    /// Depth of the port's complete value
    depth: usize,
    /// Received values by index; a collection replaces its elements
    received: BTreeMap<IndexPath, Datum>,
}

impl InputBuffer {
    pub fn receive(&mut self, port: &str, index: IndexPath, datum: Datum) {
        let depth = index.len() + datum.depth;
        let buffer = self.ports.entry(port.to_string()).or_insert_with(|| PortBuffer {
            depth,
            received: BTreeMap::new(),
        });
        buffer.received.retain(|key, _| !index.is_prefix_of(key));
        buffer.received.insert(index, datum);
    }

    /// Whether every named port has received at least one token
    pub fn covers<'a>(&self, ports: impl IntoIterator<Item = &'a str>) -> bool {
        ports.into_iter().all(|port| self.ports.contains_key(port))
    }

    /// Whether every named port has received its complete value
    pub fn is_closed<'a>(&self, ports: impl IntoIterator<Item = &'a str>) -> bool {
        ports.into_iter().all(|port| {
            self.ports
                .get(port)
                .is_some_and(|b| b.received.contains_key(&IndexPath::root()))
        })
    }

    /// Complete values of the ports that have closed
    pub fn complete(&self) -> BTreeMap<String, Datum> {
        self.ports
            .iter()
            .filter_map(|(port, b)| b.received.get(&IndexPath::root()).map(|d| (port.clone(), d.clone())))
            .collect()
    }

    fn depths(&self) -> BTreeMap<String, usize> {
        self.ports.iter().map(|(port, b)| (port.clone(), b.depth)).collect()
    }
}

/// An iteration tree with parts still missing
#[derive(Debug, Clone)]
enum Partial {
    /// Nothing known yet at this position
    Pending,
    Leaf(BTreeMap<String, Datum>),
    Branch { children: Vec<Partial>, closed: bool },
}

impl From<IterationTree> for Partial {
    fn from(tree: IterationTree) -> Self {
        match tree {
            IterationTree::Leaf(bindings) => Partial::Leaf(bindings),
            IterationTree::Branch(children) => Partial::Branch {
                children: children.into_iter().map(Partial::from).collect(),
                closed: true,
            },
        }
    }
}

impl Partial {
    /// Put `subtree` at `path`, opening branches on the way.
    fn place(&mut self, path: &[usize], subtree: Partial) {
        let Some((&first, rest)) = path.split_first() else {
            *self = subtree;
            return;
        };
        if !matches!(self, Partial::Branch { .. }) {
            *self = Partial::Branch {
                children: Vec::new(),
                closed: false,
            };
        }
        if let Partial::Branch { children, .. } = self {
            if children.len() <= first {
                children.resize(first + 1, Partial::Pending);
            }
            children[first].place(rest, subtree);
        }
    }
}

/// Plan what the tokens received so far allow.
///
/// Returns `None` while some input port has not delivered anything. The
/// plan's jobs are every job whose inputs are complete; its steps are the
/// settled prefix of the post-order that [`plan`] will produce once all
/// ports have closed.
pub fn plan_partial(
    stack: &IterationStrategyStack,
    buffer: &InputBuffer,
) -> Result<Option<IterationPlan>, IterationError> {
    let Some((first, later)) = stack.strategies().split_first() else {
        return Ok(None);
    };
    if !buffer.covers(first.ports()) {
        return Ok(None);
    }
    let (depth, _) = stack.iteration_depth(&buffer.depths())?;

    let mut tree = evaluate_partial(first.root(), buffer)?;
    for strategy in later {
        tree = expand_partial(tree, strategy.root())?;
    }

    let mut jobs = Vec::new();
    collect_jobs(&tree, IndexPath::root(), &mut jobs);
    let mut steps = Vec::new();
    settled_steps(&tree, IndexPath::root(), &mut steps);
    Ok(Some(IterationPlan { depth, jobs, steps }))
}

fn evaluate_partial(node: &IterationNode, buffer: &InputBuffer) -> Result<Partial, IterationError> {
    match node {
        IterationNode::Port { port, desired_depth } => {
            let received = buffer
                .ports
                .get(port)
                .ok_or_else(|| IterationError::MissingBinding(port.clone()))?;
            if received.depth < *desired_depth {
                return Err(IterationError::InsufficientDepth {
                    port: port.clone(),
                    desired: *desired_depth,
                    actual: received.depth,
                });
            }
            let levels = received.depth - desired_depth;
            let mut tree = Partial::Pending;
            for (index, datum) in &received.received {
                // finer than the desired depth: wait for the enclosing element
                if index.len() > levels {
                    continue;
                }
                let subtree = drill(port, datum.value.clone(), datum.depth, *desired_depth)?;
                tree.place(index.as_slice(), subtree.into());
            }
            Ok(tree)
        }
        IterationNode::Cross { children } => {
            let mut tree = Partial::Leaf(BTreeMap::new());
            for child in children {
                let inner = evaluate_partial(child, buffer)?;
                tree = graft_partial(tree, &inner);
            }
            Ok(tree)
        }
        IterationNode::Dot { children } => {
            let trees = children
                .iter()
                .map(|child| evaluate_partial(child, buffer))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(zip_partial(trees))
        }
    }
}

fn expand_partial(tree: Partial, node: &IterationNode) -> Result<Partial, IterationError> {
    match tree {
        Partial::Pending => Ok(Partial::Pending),
        Partial::Leaf(bindings) => Ok(expand(IterationTree::Leaf(bindings), node)?.into()),
        Partial::Branch { children, closed } => Ok(Partial::Branch {
            children: children
                .into_iter()
                .map(|child| expand_partial(child, node))
                .collect::<Result<_, _>>()?,
            closed,
        }),
    }
}

fn graft_partial(outer: Partial, inner: &Partial) -> Partial {
    match outer {
        Partial::Pending => Partial::Pending,
        Partial::Leaf(bindings) => attach_partial(inner.clone(), &bindings),
        Partial::Branch { children, closed } => Partial::Branch {
            children: children.into_iter().map(|child| graft_partial(child, inner)).collect(),
            closed,
        },
    }
}

fn attach_partial(tree: Partial, extra: &BTreeMap<String, Datum>) -> Partial {
    match tree {
        Partial::Pending => Partial::Pending,
        Partial::Leaf(mut bindings) => {
            for (port, datum) in extra {
                bindings.entry(port.clone()).or_insert_with(|| datum.clone());
            }
            Partial::Leaf(bindings)
        }
        Partial::Branch { children, closed } => Partial::Branch {
            children: children.into_iter().map(|child| attach_partial(child, extra)).collect(),
            closed,
        },
    }
}

/// Zip what is known so far. Shape disagreements stay pending and are
/// reported by [`plan`] once every port has closed.
fn zip_partial(trees: Vec<Partial>) -> Partial {
    if trees.iter().any(|t| matches!(t, Partial::Pending)) {
        return Partial::Pending;
    }
    if trees.iter().all(|t| matches!(t, Partial::Leaf(_))) {
        let mut merged = BTreeMap::new();
        for tree in trees {
            if let Partial::Leaf(bindings) = tree {
                merged.extend(bindings);
            }
        }
        return Partial::Leaf(merged);
    }

    let mut lengths = Vec::with_capacity(trees.len());
    let mut all_closed = true;
    for tree in &trees {
        match tree {
            Partial::Branch { children, closed } => {
                lengths.push(children.len());
                all_closed &= *closed;
            }
            _ => return Partial::Pending,
        }
    }
    let len = lengths.iter().copied().min().unwrap_or(0);
    if all_closed && lengths.iter().any(|l| *l != len) {
        return Partial::Pending;
    }

    let mut columns: Vec<Vec<Partial>> = (0..len).map(|_| Vec::with_capacity(trees.len())).collect();
    for tree in trees {
        if let Partial::Branch { children, .. } = tree {
            for (column, child) in columns.iter_mut().zip(children) {
                column.push(child);
            }
        }
    }
    Partial::Branch {
        children: columns.into_iter().map(zip_partial).collect(),
        closed: all_closed,
    }
}

fn collect_jobs(tree: &Partial, index: IndexPath, jobs: &mut Vec<PlannedJob>) {
    match tree {
        Partial::Pending => {}
        Partial::Leaf(inputs) => jobs.push(PlannedJob {
            index,
            inputs: inputs.clone(),
        }),
        Partial::Branch { children, .. } => {
            for (position, child) in children.iter().enumerate() {
                collect_jobs(child, index.child(position), jobs);
            }
        }
    }
}

/// Post-order steps up to the first position still open; returns whether the
/// whole subtree is settled.
fn settled_steps(tree: &Partial, index: IndexPath, steps: &mut Vec<PlanStep>) -> bool {
    match tree {
        Partial::Pending => false,
        Partial::Leaf(_) => {
            steps.push(PlanStep::Job(index));
            true
        }
        Partial::Branch { children, closed } => {
            for (position, child) in children.iter().enumerate() {
                if !settled_steps(child, index.child(position), steps) {
                    return false;
                }
            }
            if *closed {
                steps.push(PlanStep::Complete {
                    index,
                    size: children.len(),
                });
            }
            *closed
        }
    }
}

fn expand(tree: IterationTree, node: &IterationNode) -> Result<IterationTree, IterationError> {
    match tree {
        IterationTree::Leaf(bindings) => {
            let mentioned = node.ports();
            let rest: BTreeMap<String, Datum> = bindings
                .iter()
                .filter(|(port, _)| !mentioned.contains(&port.as_str()))
                .map(|(port, d)| (port.clone(), d.clone()))
                .collect();
            let expanded = evaluate(node, &bindings)?;
            Ok(attach(expanded, &rest))
        }
        IterationTree::Branch(children) => Ok(IterationTree::Branch(
            children
                .into_iter()
                .map(|child| expand(child, node))
                .collect::<Result<_, _>>()?,
        )),
    }
}

fn evaluate(node: &IterationNode, bindings: &BTreeMap<String, Datum>) -> Result<IterationTree, IterationError> {
    match node {
        IterationNode::Port { port, desired_depth } => {
            let datum = bindings
                .get(port)
                .ok_or_else(|| IterationError::MissingBinding(port.clone()))?;
            if datum.depth < *desired_depth {
                return Err(IterationError::InsufficientDepth {
                    port: port.clone(),
                    desired: *desired_depth,
                    actual: datum.depth,
                });
            }
            drill(port, datum.value.clone(), datum.depth, *desired_depth)
        }
        IterationNode::Cross { children } => {
            let mut tree = IterationTree::Leaf(BTreeMap::new());
            for child in children {
                let inner = evaluate(child, bindings)?;
                tree = graft(tree, &inner);
            }
            Ok(tree)
        }
        IterationNode::Dot { children } => {
            let trees = children
                .iter()
                .map(|child| evaluate(child, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            zip(trees)
        }
    }
}

fn drill(port: &str, value: Value, depth: usize, desired: usize) -> Result<IterationTree, IterationError> {
    if depth == desired {
        let mut leaf = BTreeMap::new();
        leaf.insert(port.to_string(), Datum::new(value, desired));
        return Ok(IterationTree::Leaf(leaf));
    }
    match value {
        Value::Array(items) => Ok(IterationTree::Branch(
            items
                .into_iter()
                .map(|item| drill(port, item, depth - 1, desired))
                .collect::<Result<_, _>>()?,
        )),
        // A failed collection stands in for a single element so the error
        // still reaches a job.
        error @ Value::Error(_) => Ok(IterationTree::Branch(vec![drill(port, error, depth - 1, desired)?])),
        _ => Err(IterationError::NotACollection {
            port: port.to_string(),
            depth,
        }),
    }
}

/// Put `inner` below every leaf of `outer`.
fn graft(outer: IterationTree, inner: &IterationTree) -> IterationTree {
    match outer {
        IterationTree::Leaf(bindings) => attach(inner.clone(), &bindings),
        IterationTree::Branch(children) => {
            IterationTree::Branch(children.into_iter().map(|child| graft(child, inner)).collect())
        }
    }
}

fn attach(tree: IterationTree, extra: &BTreeMap<String, Datum>) -> IterationTree {
    match tree {
        IterationTree::Leaf(mut bindings) => {
            for (port, datum) in extra {
                bindings.entry(port.clone()).or_insert_with(|| datum.clone());
            }
            IterationTree::Leaf(bindings)
        }
        IterationTree::Branch(children) => {
            IterationTree::Branch(children.into_iter().map(|child| attach(child, extra)).collect())
        }
    }
}

fn zip(trees: Vec<IterationTree>) -> Result<IterationTree, IterationError> {
    if trees.iter().all(|t| matches!(t, IterationTree::Leaf(_))) {
        let mut merged = BTreeMap::new();
        for tree in trees {
            if let IterationTree::Leaf(bindings) = tree {
                merged.extend(bindings);
            }
        }
        return Ok(IterationTree::Leaf(merged));
    }

    let mut lengths = Vec::with_capacity(trees.len());
    for tree in &trees {
        match tree {
            IterationTree::Branch(children) => lengths.push(children.len()),
            IterationTree::Leaf(_) => {
                return Err(IterationError::DotProductMismatch(
                    "children iterate over different depths".to_string(),
                ))
            }
        }
    }
    let len = lengths[0];
    if let Some(other) = lengths.iter().find(|l| **l != len) {
        return Err(IterationError::DotProductMismatch(format!(
            "collections of length {} and {}",
            len, other
        )));
    }

    let mut columns: Vec<Vec<IterationTree>> = (0..len).map(|_| Vec::with_capacity(trees.len())).collect();
    for tree in trees {
        if let IterationTree::Branch(children) = tree {
            for (column, child) in columns.iter_mut().zip(children) {
                column.push(child);
            }
        }
    }
    Ok(IterationTree::Branch(
        columns.into_iter().map(zip).collect::<Result<_, _>>()?,
    ))
}

fn flatten(tree: IterationTree, index: IndexPath, jobs: &mut Vec<PlannedJob>, steps: &mut Vec<PlanStep>) {
    match tree {
        IterationTree::Leaf(inputs) => {
            steps.push(PlanStep::Job(index.clone()));
            jobs.push(PlannedJob { index, inputs });
        }
        IterationTree::Branch(children) => {
            let size = children.len();
            for (position, child) in children.into_iter().enumerate() {
                flatten(child, index.child(position), jobs, steps);
            }
            steps.push(PlanStep::Complete { index, size });
        }
    }
}
