//! Iteration strategy trees.
//!
//! A processor's iteration strategy decides how collections arriving on its
//! input ports are turned into individual jobs. Leaves bind an input port and
//! the depth the processor wants to see on it; composite nodes combine their
//! children either as a cartesian product or element-wise. The expansion
//! itself happens at run time in `loomruntime`; this module holds the model
//! and the depth arithmetic validation relies on.

use crate::IterationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum IterationNode {
    Port { port: String, desired_depth: usize },
    Cross { children: Vec<IterationNode> },
    Dot { children: Vec<IterationNode> },
}

impl IterationNode {
    pub fn port(port: impl Into<String>, desired_depth: usize) -> Self {
        IterationNode::Port {
            port: port.into(),
            desired_depth,
        }
    }

    pub fn cross(children: Vec<IterationNode>) -> Self {
        IterationNode::Cross { children }
    }

    pub fn dot(children: Vec<IterationNode>) -> Self {
        IterationNode::Dot { children }
    }

    /// Port names below this node, left to right.
    pub fn ports(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_ports(&mut out);
        out
    }

    fn collect_ports<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            IterationNode::Port { port, .. } => out.push(port),
            IterationNode::Cross { children } | IterationNode::Dot { children } => {
                for child in children {
                    child.collect_ports(out);
                }
            }
        }
    }

    pub fn desired_depth(&self, name: &str) -> Option<usize> {
        match self {
            IterationNode::Port { port, desired_depth } => (port == name).then_some(*desired_depth),
            IterationNode::Cross { children } | IterationNode::Dot { children } => {
                children.iter().find_map(|c| c.desired_depth(name))
            }
        }
    }

    /// Number of index levels this node adds, given the depth arriving on
    /// each port.
    pub fn iteration_depth(&self, incoming: &BTreeMap<String, usize>) -> Result<usize, IterationError> {
        match self {
            IterationNode::Port { port, desired_depth } => {
                let actual = *incoming
                    .get(port)
                    .ok_or_else(|| IterationError::MissingBinding(port.clone()))?;
                actual
                    .checked_sub(*desired_depth)
                    .ok_or_else(|| IterationError::InsufficientDepth {
                        port: port.clone(),
                        desired: *desired_depth,
                        actual,
                    })
            }
            IterationNode::Cross { children } => children
                .iter()
                .map(|c| c.iteration_depth(incoming))
                .sum(),
            IterationNode::Dot { children } => {
                let mut depth = None;
                for child in children {
                    let d = child.iteration_depth(incoming)?;
                    match depth {
                        None => depth = Some(d),
                        Some(prev) if prev != d => {
                            return Err(IterationError::DotProductMismatch(format!(
                                "children iterate over depths {} and {}",
                                prev, d
                            )))
                        }
                        Some(_) => {}
                    }
                }
                Ok(depth.unwrap_or(0))
            }
        }
    }

    fn remove_port(&mut self, name: &str) -> bool {
        match self {
            IterationNode::Port { .. } => false,
            IterationNode::Cross { children } | IterationNode::Dot { children } => {
                let before = children.len();
                children.retain(|c| !matches!(c, IterationNode::Port { port, .. } if port == name));
                if children.len() != before {
                    return true;
                }
                children.iter_mut().any(|c| c.remove_port(name))
            }
        }
    }
}

/// One strategy: the child of a terminal node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStrategy {
    root: IterationNode,
}

impl IterationStrategy {
    pub fn new(root: IterationNode) -> Self {
        Self { root }
    }

    /// Cross product over the given ports at their desired depths.
    pub fn cross_product<'a>(ports: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        Self::new(IterationNode::cross(
            ports.into_iter().map(|(p, d)| IterationNode::port(p, d)).collect(),
        ))
    }

    pub fn dot_product<'a>(ports: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        Self::new(IterationNode::dot(
            ports.into_iter().map(|(p, d)| IterationNode::port(p, d)).collect(),
        ))
    }

    pub fn root(&self) -> &IterationNode {
        &self.root
    }

    pub fn ports(&self) -> Vec<&str> {
        self.root.ports()
    }
}

impl Default for IterationStrategy {
    fn default() -> Self {
        Self::new(IterationNode::cross(Vec::new()))
    }
}

/// Strategies applied one after another.
///
/// The first strategy must bind every input port of its processor. Each later
/// strategy expands the bindings produced by the one before it; ports it does
/// not mention pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStrategyStack {
    strategies: Vec<IterationStrategy>,
}

impl IterationStrategyStack {
    pub fn new(strategies: Vec<IterationStrategy>) -> Self {
        Self { strategies }
    }

    pub fn single(strategy: IterationStrategy) -> Self {
        Self::new(vec![strategy])
    }

    pub fn strategies(&self) -> &[IterationStrategy] {
        &self.strategies
    }

    /// Check the stack against a processor's input port names.
    pub fn check(&self, input_ports: &[&str]) -> Result<(), String> {
        let Some(first) = self.strategies.first() else {
            return if input_ports.is_empty() {
                Ok(())
            } else {
                Err("empty strategy stack on a processor with inputs".to_string())
            };
        };
        let known: HashSet<&str> = input_ports.iter().copied().collect();
        for (i, strategy) in self.strategies.iter().enumerate() {
            let mut seen = HashSet::new();
            for port in strategy.ports() {
                if !known.contains(port) {
                    return Err(format!("strategy {} names unknown port '{}'", i, port));
                }
                if !seen.insert(port) {
                    return Err(format!("strategy {} binds port '{}' twice", i, port));
                }
            }
        }
        let bound: HashSet<&str> = first.ports().into_iter().collect();
        if let Some(missing) = input_ports.iter().find(|p| !bound.contains(**p)) {
            return Err(format!("port '{}' is not bound by the first strategy", missing));
        }
        Ok(())
    }

    /// Total index levels added by the stack and the depth each port ends up
    /// with in a job.
    pub fn iteration_depth(
        &self,
        incoming: &BTreeMap<String, usize>,
    ) -> Result<(usize, BTreeMap<String, usize>), IterationError> {
        let mut current = incoming.clone();
        let mut total = 0;
        for strategy in &self.strategies {
            total += strategy.root.iteration_depth(&current)?;
            for port in strategy.ports() {
                if let Some(d) = strategy.root.desired_depth(port) {
                    current.insert(port.to_string(), d);
                }
            }
        }
        Ok((total, current))
    }

    /// Depth a port is finally delivered at, if any strategy binds it.
    pub fn final_desired_depth(&self, port: &str) -> Option<usize> {
        self.strategies.iter().rev().find_map(|s| s.root.desired_depth(port))
    }

    pub(crate) fn add_port(&mut self, port: &str, depth: usize) {
        if self.strategies.is_empty() {
            self.strategies.push(IterationStrategy::default());
        }
        let node = IterationNode::port(port, depth);
        match &mut self.strategies[0].root {
            IterationNode::Cross { children } | IterationNode::Dot { children } => children.push(node),
            leaf @ IterationNode::Port { .. } => {
                let previous = leaf.clone();
                *leaf = IterationNode::cross(vec![previous, node]);
            }
        }
    }

    pub(crate) fn remove_port(&mut self, port: &str) {
        for strategy in &mut self.strategies {
            if matches!(&strategy.root, IterationNode::Port { port: p, .. } if p == port) {
                strategy.root = IterationNode::cross(Vec::new());
            } else {
                strategy.root.remove_port(port);
            }
        }
    }
}

impl Default for IterationStrategyStack {
    fn default() -> Self {
        Self::single(IterationStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depths(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(p, d)| (p.to_string(), *d)).collect()
    }

    #[test]
    fn cross_product_adds_depths() {
        let s = IterationStrategy::cross_product([("a", 0), ("b", 0)]);
        let d = s.root().iteration_depth(&depths(&[("a", 1), ("b", 2)])).unwrap();
        assert_eq!(d, 3);
    }

    #[test]
    fn dot_product_requires_equal_depths() {
        let s = IterationStrategy::dot_product([("a", 0), ("b", 0)]);
        assert_eq!(s.root().iteration_depth(&depths(&[("a", 1), ("b", 1)])).unwrap(), 1);
        let err = s.root().iteration_depth(&depths(&[("a", 1), ("b", 2)])).unwrap_err();
        assert!(matches!(err, IterationError::DotProductMismatch(_)));
    }

    #[test]
    fn shallow_input_is_a_type_mismatch() {
        let s = IterationStrategy::cross_product([("a", 1)]);
        let err = s.root().iteration_depth(&depths(&[("a", 0)])).unwrap_err();
        assert_eq!(
            err,
            IterationError::InsufficientDepth {
                port: "a".into(),
                desired: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn stacked_strategies_sum_their_levels() {
        let stack = IterationStrategyStack::new(vec![
            IterationStrategy::cross_product([("a", 1)]),
            IterationStrategy::cross_product([("a", 0)]),
        ]);
        let (total, finals) = stack.iteration_depth(&depths(&[("a", 2)])).unwrap();
        assert_eq!(total, 2);
        assert_eq!(finals["a"], 0);
    }

    #[test]
    fn first_strategy_must_bind_every_port() {
        let stack = IterationStrategyStack::single(IterationStrategy::cross_product([("a", 0)]));
        assert!(stack.check(&["a"]).is_ok());
        assert!(stack.check(&["a", "b"]).is_err());
        assert!(stack.check(&[]).is_err());
    }

    #[test]
    fn ports_are_added_and_removed() {
        let mut stack = IterationStrategyStack::default();
        stack.add_port("a", 0);
        stack.add_port("b", 1);
        assert_eq!(stack.strategies()[0].ports(), vec!["a", "b"]);
        stack.remove_port("a");
        assert_eq!(stack.strategies()[0].ports(), vec!["b"]);
    }
}
