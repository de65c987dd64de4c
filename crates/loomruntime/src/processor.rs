use crate::iteration::PlanStep;
use crate::layers::{Below, BoundActivity, DispatchContext, DispatchLayer, Job, JobResult, LayerProperties};
use crate::monitor::Monitor;
use loomcore::{Datum, DispatchError, IndexPath, OwningProcess, Port, Processor, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A processor ready to run: its model, runtime layers and activities.
pub struct ProcessorRuntime {
    processor: Processor,
    layers: Vec<Arc<dyn DispatchLayer>>,
    context: DispatchContext,
}

impl ProcessorRuntime {
    pub fn new(
        processor: Processor,
        layers: Vec<Arc<dyn DispatchLayer>>,
        activities: Vec<BoundActivity>,
        monitor: Arc<Monitor>,
    ) -> Self {
        let context = DispatchContext {
            processor: processor.name().to_string(),
            outputs: processor.output_ports().to_vec(),
            activities,
            monitor,
        };
        Self {
            processor,
            layers,
            context,
        }
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn name(&self) -> &str {
        self.processor.name()
    }

    pub fn layers(&self) -> &[Arc<dyn DispatchLayer>] {
        &self.layers
    }

    pub async fn dispatch(&self, job: Job) -> Result<JobResult, DispatchError> {
        Below::new(&self.layers, &self.context).dispatch(job).await
    }

    pub fn layer_properties(&self, process: &OwningProcess) -> Vec<LayerProperties> {
        self.layers
            .iter()
            .map(|layer| LayerProperties {
                layer_type: layer.layer_type().to_string(),
                values: layer.properties(process),
            })
            .collect()
    }
}

/// Reorder buffer between a processor's jobs and its output ports.
///
/// Results are released strictly in plan order, whatever order jobs finish
/// in; each completed collection is assembled from its elements and emitted
/// right after them. While inputs still stream, only the settled part of the
/// plan is known and the collector stops at its end.
pub(crate) struct OutputCollector {
    outputs: Vec<Port>,
    depth: usize,
    steps: Vec<PlanStep>,
    /// The steps are the full plan
    settled: bool,
    cursor: usize,
    values: HashMap<IndexPath, BTreeMap<String, Datum>>,
    errors: usize,
}

impl OutputCollector {
    pub fn new(outputs: Vec<Port>, depth: usize, steps: Vec<PlanStep>, settled: bool) -> Self {
        Self {
            outputs,
            depth,
            steps,
            settled,
            cursor: 0,
            values: HashMap::new(),
            errors: 0,
        }
    }

    /// Take a longer prefix of the plan, or the full plan once `settled`.
    pub fn extend(&mut self, steps: Vec<PlanStep>, settled: bool) {
        if settled || steps.len() > self.steps.len() {
            self.steps = steps;
        }
        self.settled = settled;
    }

    pub fn record(&mut self, index: IndexPath, result: JobResult) {
        if result.outputs.values().any(|d| d.value.contains_error()) {
            self.errors += 1;
        }
        self.values.insert(index, result.outputs);
    }

    /// Tokens that can be emitted now, as (port, index, datum).
    pub fn drain(&mut self) -> Vec<(String, IndexPath, Datum)> {
        let mut emitted = Vec::new();
        while let Some(step) = self.steps.get(self.cursor) {
            match step {
                PlanStep::Job(index) => {
                    let Some(values) = self.values.get(index) else {
                        break;
                    };
                    for (port, datum) in values {
                        emitted.push((port.clone(), index.clone(), datum.clone()));
                    }
                }
                PlanStep::Complete { index, size } => {
                    let mut children: Vec<BTreeMap<String, Datum>> = (0..*size)
                        .map(|k| self.values.remove(&index.child(k)).unwrap_or_default())
                        .collect();
                    let depth_below = self.depth - index.len();
                    let mut assembled = BTreeMap::new();
                    for port in &self.outputs {
                        let items: Vec<Value> = children
                            .iter_mut()
                            .map(|child| child.remove(port.name()).map(|d| d.value).unwrap_or(Value::Null))
                            .collect();
                        let datum = Datum::new(Value::Array(items), port.depth() + depth_below);
                        emitted.push((port.name().to_string(), index.clone(), datum.clone()));
                        assembled.insert(port.name().to_string(), datum);
                    }
                    self.values.insert(index.clone(), assembled);
                }
            }
            self.cursor += 1;
        }
        emitted
    }

    pub fn is_complete(&self) -> bool {
        self.settled && self.cursor == self.steps.len()
    }

    pub fn jobs(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, PlanStep::Job(_))).count()
    }

    /// Jobs whose results carry error documents
    pub fn errors(&self) -> usize {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ix(v: &[usize]) -> IndexPath {
        IndexPath::new(v.to_vec())
    }

    fn result(value: &str) -> JobResult {
        let mut outputs = BTreeMap::new();
        outputs.insert("out".to_string(), Datum::new(value, 0));
        JobResult { outputs }
    }

    #[test]
    fn results_are_released_in_plan_order() {
        let steps = vec![
            PlanStep::Job(ix(&[0])),
            PlanStep::Job(ix(&[1])),
            PlanStep::Complete { index: ix(&[]), size: 2 },
        ];
        let mut collector = OutputCollector::new(vec![Port::output("out", 0)], 1, steps, true);

        collector.record(ix(&[1]), result("second"));
        assert!(collector.drain().is_empty());

        collector.record(ix(&[0]), result("first"));
        let emitted = collector.drain();
        let indices: Vec<String> = emitted.iter().map(|(_, i, _)| i.to_string()).collect();
        assert_eq!(indices, vec!["[0]", "[1]", "[]"]);
        assert_eq!(emitted[2].2, Datum::new(Value::Array(vec!["first".into(), "second".into()]), 1));
        assert!(collector.is_complete());
    }

    #[test]
    fn empty_plan_emits_an_empty_collection() {
        let steps = vec![PlanStep::Complete { index: ix(&[]), size: 0 }];
        let mut collector = OutputCollector::new(vec![Port::output("out", 0)], 1, steps, true);
        let emitted = collector.drain();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].2, Datum::new(Value::Array(vec![]), 1));
        assert_eq!(collector.jobs(), 0);
    }

    #[test]
    fn settled_prefix_grows_until_the_plan_is_complete() {
        let mut collector = OutputCollector::new(vec![Port::output("out", 0)], 1, vec![PlanStep::Job(ix(&[0]))], false);
        collector.record(ix(&[0]), result("first"));
        collector.record(ix(&[1]), result("second"));
        assert_eq!(collector.drain().len(), 1);
        assert!(!collector.is_complete());

        collector.extend(vec![PlanStep::Job(ix(&[0])), PlanStep::Job(ix(&[1]))], false);
        assert_eq!(collector.drain()[0].1, ix(&[1]));
        assert!(!collector.is_complete());

        collector.extend(
            vec![
                PlanStep::Job(ix(&[0])),
                PlanStep::Job(ix(&[1])),
                PlanStep::Complete { index: ix(&[]), size: 2 },
            ],
            true,
        );
        let emitted = collector.drain();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].2, Datum::new(Value::Array(vec!["first".into(), "second".into()]), 1));
        assert!(collector.is_complete());
    }
}
