//! Compiled dataflows and their runs.
//!
//! A [`DataflowInstance`] pairs an immutable, valid dataflow with the runtime
//! objects its processors need. Every run of it is a separate tokio task that
//! owns the run's bookkeeping and routes tokens along the dataflow's links;
//! jobs are spawned as their own tasks and report back to the run task.

use crate::failure::{FailureListener, FailureTransmitter};
use crate::iteration::{self, InputBuffer, IterationPlan};
use crate::layers::{BoundActivity, Job, JobResult, LayerProperties};
use crate::merge::MergeRuntime;
use crate::monitor::{Monitor, MonitorNodeKind};
use crate::nested::NestedDataflowActivity;
use crate::processor::{OutputCollector, ProcessorRuntime};
use crate::registry::{ActivityRegistry, LayerRegistry};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use loomcore::{
    Activity, ActivitySpec, Dataflow, Datum, DispatchError, ExecutionEvent, FlowError, IndexPath, OwningProcess,
    ProcessFailure, Sink, Source, TerminationReason, Token, ValidationReport, Value, WorkflowStructureError,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Everything needed to turn a dataflow model into runnable objects
pub(crate) struct CompileContext<'a> {
    pub activities: &'a ActivityRegistry,
    pub layers: &'a LayerRegistry,
    pub monitor: Arc<Monitor>,
    pub listeners: Arc<Vec<Arc<dyn FailureListener>>>,
}

/// An immutable, validated dataflow ready to be run any number of times
pub struct DataflowInstance {
    dataflow: Arc<Dataflow>,
    report: ValidationReport,
    processors: HashMap<String, Arc<ProcessorRuntime>>,
    merges: HashMap<String, MergeRuntime>,
    monitor: Arc<Monitor>,
    listeners: Arc<Vec<Arc<dyn FailureListener>>>,
}

impl DataflowInstance {
    pub(crate) fn compile(dataflow: &Dataflow, ctx: &CompileContext<'_>) -> Result<Arc<Self>, FlowError> {
        if !dataflow.is_immutable() {
            return Err(FlowError::NotImmutable(dataflow.name().to_string()));
        }
        let report = dataflow.check_validity();
        if !report.is_valid() {
            return Err(FlowError::InvalidDataflow(Box::new(report)));
        }

        let mut processors = HashMap::new();
        for processor in dataflow.processors() {
            let layers = processor
                .dispatch_stack()
                .layers()
                .iter()
                .map(|spec| ctx.layers.create_layer(spec))
                .collect::<Result<Vec<_>, _>>()?;

            let mut activities = Vec::with_capacity(processor.activities().len());
            for spec in processor.activities() {
                let activity: Arc<dyn Activity> = match &spec.nested {
                    Some(nested) => {
                        let mut nested = (**nested).clone();
                        nested.set_immutable();
                        // a nested failure reaches listeners through the run it escalates to
                        let inner = CompileContext {
                            activities: ctx.activities,
                            layers: ctx.layers,
                            monitor: ctx.monitor.clone(),
                            listeners: Arc::new(Vec::new()),
                        };
                        Arc::new(NestedDataflowActivity::new(Self::compile(&nested, &inner)?))
                    }
                    None if spec.activity_type == ActivitySpec::NESTED_DATAFLOW => {
                        return Err(FlowError::Configuration(format!(
                            "processor '{}' binds a dataflow activity without a dataflow",
                            processor.name()
                        )))
                    }
                    None => ctx.activities.create_activity(spec)?,
                };
                activities.push(BoundActivity {
                    spec: spec.clone(),
                    activity,
                });
            }

            tracing::debug!(
                "Compiled processor '{}' with {} layer(s) and {} activity(ies)",
                processor.name(),
                layers.len(),
                activities.len()
            );
            processors.insert(
                processor.name().to_string(),
                Arc::new(ProcessorRuntime::new(
                    processor.clone(),
                    layers,
                    activities,
                    ctx.monitor.clone(),
                )),
            );
        }

        let merges = dataflow
            .merges()
            .iter()
            .map(|m| (m.name().to_string(), MergeRuntime::new(m)))
            .collect();

        Ok(Arc::new(Self {
            dataflow: Arc::new(dataflow.clone()),
            report,
            processors,
            merges,
            monitor: ctx.monitor.clone(),
            listeners: ctx.listeners.clone(),
        }))
    }

    pub fn dataflow(&self) -> &Dataflow {
        &self.dataflow
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Start a run under `process`. Tokens are pushed into it through the
    /// returned handle.
    pub fn start(self: &Arc<Self>, process: OwningProcess, cancellation: CancellationToken) -> RunHandle {
        let (sender, messages) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let run = RunState::new(self.clone(), process.clone(), cancellation.clone(), output_tx);
        let task = tokio::spawn(run.run(messages));
        RunHandle {
            process,
            instance: self.clone(),
            sender,
            cancellation,
            streams: Mutex::new(HashMap::new()),
            outputs: Some(output_rx),
            task,
        }
    }

    /// Start a run of a dataflow without input ports.
    pub fn fire(self: &Arc<Self>, process: OwningProcess) -> Result<RunHandle, FlowError> {
        let inputs = self.dataflow.input_ports().len();
        if inputs > 0 {
            return Err(FlowError::NotSelfStarting {
                dataflow: self.dataflow.name().to_string(),
                inputs,
            });
        }
        Ok(self.start(process, CancellationToken::new()))
    }

    fn layer_properties(&self, process: &OwningProcess) -> BTreeMap<String, Vec<LayerProperties>> {
        self.processors
            .iter()
            .map(|(name, runtime)| (name.clone(), runtime.layer_properties(&process.processor(name))))
            .collect()
    }
}

/// A token leaving the dataflow on one of its output ports
#[derive(Debug, Clone, PartialEq)]
pub struct OutputToken {
    pub port: String,
    pub token: Token,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub process: OwningProcess,
    /// Complete value of every output port
    pub outputs: BTreeMap<String, Datum>,
    pub duration_ms: u64,
    /// Layer counters per processor, taken as the run completed
    pub layer_properties: BTreeMap<String, Vec<LayerProperties>>,
}

impl RunResult {
    pub fn output(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port).map(|d| &d.value)
    }

    pub fn layer_property(&self, processor: &str, layer_type: &str, key: &str) -> Option<u64> {
        self.layer_properties
            .get(processor)?
            .iter()
            .find(|l| l.layer_type == layer_type)?
            .get(key)
    }
}

enum RunMessage {
    Token { port: String, token: Token },
}

/// Handle to a running dataflow
pub struct RunHandle {
    process: OwningProcess,
    instance: Arc<DataflowInstance>,
    sender: mpsc::UnboundedSender<RunMessage>,
    cancellation: CancellationToken,
    streams: Mutex<HashMap<String, IndexPath>>,
    outputs: Option<mpsc::UnboundedReceiver<OutputToken>>,
    task: JoinHandle<Result<RunResult, FlowError>>,
}

impl RunHandle {
    pub fn process(&self) -> &OwningProcess {
        &self.process
    }

    /// Push a token into a dataflow input port.
    ///
    /// Tokens of one port must arrive in post-order and the complete value at
    /// the empty index must match the port's declared depth.
    pub fn push(&self, port: &str, token: Token) -> Result<(), FlowError> {
        let dataflow = self.instance.dataflow();
        let declared = dataflow
            .input_port(port)
            .ok_or_else(|| WorkflowStructureError::UnknownPort {
                owner: format!("dataflow '{}'", dataflow.name()),
                port: port.to_string(),
            })?;
        let Some(cardinality) = token.cardinality() else {
            return Err(WorkflowStructureError::Other(format!(
                "completion token pushed into input '{}'",
                port
            ))
            .into());
        };
        if cardinality != declared.depth() {
            return Err(WorkflowStructureError::DepthMismatch {
                port: port.to_string(),
                expected: declared.depth(),
                actual: cardinality,
            }
            .into());
        }

        // the guard stays held until the token is queued, so concurrent
        // pushes reach the run in the order they were checked
        let mut streams = self
            .streams
            .lock()
            .map_err(|_| FlowError::Execution("input stream state poisoned".to_string()))?;
        if let Some(previous) = streams.get(port) {
            if !token.index.may_follow(previous) {
                return Err(WorkflowStructureError::OutOfOrder {
                    port: port.to_string(),
                    previous: previous.clone(),
                    received: token.index.clone(),
                }
                .into());
            }
        }
        self.sender
            .send(RunMessage::Token {
                port: port.to_string(),
                token: token.with_process(self.process.clone()),
            })
            .map_err(|_| FlowError::Execution(format!("run {} has already ended", self.process)))?;
        streams.insert(port.to_string(), token.index.clone());
        Ok(())
    }

    /// Push the complete value of an input port at its declared depth.
    pub fn push_value(&self, port: &str, value: impl Into<Value>) -> Result<(), FlowError> {
        let depth = self
            .instance
            .dataflow()
            .input_port(port)
            .map(|p| p.depth())
            .unwrap_or_default();
        self.push(
            port,
            Token::data(self.process.clone(), IndexPath::root(), Datum::new(value, depth)),
        )
    }

    pub fn cancel(&self) {
        tracing::info!("Cancelling run {}", self.process);
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Hold back jobs that have not reached their activity yet.
    pub fn pause(&self) {
        for (name, runtime) in &self.instance.processors {
            for layer in runtime.layers() {
                layer.pause(&self.process.processor(name));
            }
        }
    }

    pub fn resume(&self) {
        for (name, runtime) in &self.instance.processors {
            for layer in runtime.layers() {
                layer.resume(&self.process.processor(name));
            }
        }
    }

    /// Current counters of a processor's dispatch layers
    pub fn layer_properties(&self, processor: &str) -> Option<Vec<LayerProperties>> {
        self.instance
            .processors
            .get(processor)
            .map(|runtime| runtime.layer_properties(&self.process.processor(processor)))
    }

    /// Stream of output tokens; available once.
    pub fn take_outputs(&mut self) -> Option<mpsc::UnboundedReceiver<OutputToken>> {
        self.outputs.take()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the inputs and wait for the run to end.
    pub async fn wait(self) -> Result<RunResult, FlowError> {
        let RunHandle { sender, task, .. } = self;
        drop(sender);
        task.await
            .map_err(|e| FlowError::Execution(format!("run task failed: {}", e)))?
    }
}

struct JobDone {
    processor: String,
    index: IndexPath,
    result: Result<JobResult, DispatchError>,
}

#[derive(Default)]
struct ProcessorRun {
    inputs: InputBuffer,
    dispatched: HashSet<IndexPath>,
    collector: Option<OutputCollector>,
    finished: bool,
}

/// Bookkeeping of one run, owned by the run task
struct RunState {
    instance: Arc<DataflowInstance>,
    process: OwningProcess,
    cancellation: CancellationToken,
    failure: FailureTransmitter,
    output_tx: mpsc::UnboundedSender<OutputToken>,
    started: Instant,
    inputs_closed: HashSet<String>,
    last_index: HashMap<Sink, IndexPath>,
    processors: HashMap<String, ProcessorRun>,
    outputs: BTreeMap<String, Datum>,
    jobs: FuturesUnordered<JoinHandle<JobDone>>,
}

impl RunState {
    fn new(
        instance: Arc<DataflowInstance>,
        process: OwningProcess,
        cancellation: CancellationToken,
        output_tx: mpsc::UnboundedSender<OutputToken>,
    ) -> Self {
        let processors = instance
            .processors
            .keys()
            .map(|name| (name.clone(), ProcessorRun::default()))
            .collect();
        let failure = FailureTransmitter::new(process.clone(), instance.listeners.clone());
        Self {
            instance,
            process,
            cancellation,
            failure,
            output_tx,
            started: Instant::now(),
            inputs_closed: HashSet::new(),
            last_index: HashMap::new(),
            processors,
            outputs: BTreeMap::new(),
            jobs: FuturesUnordered::new(),
        }
    }

    async fn run(mut self, mut messages: mpsc::UnboundedReceiver<RunMessage>) -> Result<RunResult, FlowError> {
        let dataflow = self.instance.dataflow.clone();
        tracing::info!("Starting run {} of dataflow '{}'", self.process, dataflow.name());
        self.instance
            .monitor
            .register(self.process.clone(), MonitorNodeKind::Run, dataflow.name());
        self.emit(ExecutionEvent::RunStarted {
            process: self.process.clone(),
            dataflow: dataflow.name().to_string(),
            timestamp: Utc::now(),
        });

        let mut messages_open = true;
        let mut step = self.begin();
        let outcome = loop {
            if let Err(e) = step {
                break Err(e);
            }
            if self.is_done() {
                break Ok(());
            }
            if !messages_open && self.jobs.is_empty() {
                let missing: Vec<&str> = dataflow
                    .input_ports()
                    .iter()
                    .map(|p| p.name())
                    .filter(|p| !self.inputs_closed.contains(*p))
                    .collect();
                break Err(FlowError::Execution(format!(
                    "run {} cannot complete, inputs never closed: {:?}",
                    self.process, missing
                )));
            }

            step = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(FlowError::Cancelled(self.process.clone())),
                Some(joined) = self.jobs.next(), if !self.jobs.is_empty() => self.job_done(joined),
                message = messages.recv(), if messages_open => match message {
                    Some(RunMessage::Token { port, token }) => self.accept_input(&port, token),
                    None => {
                        messages_open = false;
                        Ok(())
                    }
                },
            };
        };

        match outcome {
            Ok(()) => Ok(self.complete()),
            Err(FlowError::Cancelled(process)) => {
                self.terminate_cancelled();
                Err(FlowError::Cancelled(process))
            }
            Err(error) => {
                self.terminate_failed(&error);
                Err(error)
            }
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        self.instance.monitor.emit(event);
    }

    /// Fire every processor that needs no input.
    fn begin(&mut self) -> Result<(), FlowError> {
        let names: Vec<String> = self.instance.dataflow.processors().iter().map(|p| p.name().to_string()).collect();
        for name in names {
            self.try_fire(&name)?;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        let dataflow = &self.instance.dataflow;
        self.inputs_closed.len() == dataflow.input_ports().len()
            && self.jobs.is_empty()
            && self.processors.values().all(|p| p.finished)
            && self.outputs.len() == dataflow.output_ports().len()
    }

    fn accept_input(&mut self, port: &str, token: Token) -> Result<(), FlowError> {
        if token.is_final() {
            self.inputs_closed.insert(port.to_string());
        }
        self.route(Source::dataflow_input(port), token)
    }

    fn job_done(&mut self, joined: Result<JobDone, JoinError>) -> Result<(), FlowError> {
        let done = joined.map_err(|e| FlowError::Execution(format!("job task failed: {}", e)))?;
        match done.result {
            Ok(result) => {
                let tokens = match self
                    .processors
                    .get_mut(&done.processor)
                    .and_then(|run| run.collector.as_mut())
                {
                    Some(collector) => {
                        collector.record(done.index, result);
                        collector.drain()
                    }
                    None => Vec::new(),
                };
                self.emit_processor_outputs(&done.processor, tokens)?;
                self.check_finished(&done.processor)
            }
            Err(DispatchError::Cancelled) if self.cancellation.is_cancelled() => Ok(()),
            Err(error) => Err(self.job_failure(&done.processor, done.index, error)),
        }
    }

    fn job_failure(&self, processor: &str, index: IndexPath, error: DispatchError) -> FlowError {
        FlowError::WorkflowFailure(Box::new(ProcessFailure {
            process: self.process.processor(processor),
            processor: processor.to_string(),
            index,
            error,
        }))
    }

    /// Dispatch every job the inputs received so far make ready.
    fn try_fire(&mut self, name: &str) -> Result<(), FlowError> {
        let instance = self.instance.clone();
        let Some(runtime) = instance.processors.get(name) else {
            return Ok(());
        };
        let processor = runtime.processor();
        let Some(run) = self.processors.get(name) else {
            return Ok(());
        };
        let ports: Vec<&str> = processor.input_ports().iter().map(|p| p.name()).collect();
        let ready = !run.finished
            && run.inputs.covers(ports.iter().copied())
            && processor
                .preconditions()
                .iter()
                .all(|control| self.processors.get(control).map_or(true, |c| c.finished));
        if !ready {
            return Ok(());
        }

        let settled = run.inputs.is_closed(ports.iter().copied());
        let planned = if settled {
            iteration::plan(processor.iteration_strategy(), &run.inputs.complete()).map(Some)
        } else {
            iteration::plan_partial(processor.iteration_strategy(), &run.inputs)
        };
        let plan = match planned {
            Ok(Some(plan)) => plan,
            Ok(None) => return Ok(()),
            Err(e) => return Err(self.job_failure(name, IndexPath::root(), DispatchError::Iteration(e))),
        };
        let IterationPlan { depth, jobs, steps } = plan;
        let fresh: Vec<_> = jobs.into_iter().filter(|j| !run.dispatched.contains(&j.index)).collect();
        let first = run.collector.is_none();

        let process = self.process.processor(name);
        if first {
            tracing::debug!("Processor '{}' of {} starts with {} job(s)", name, self.process, fresh.len());
            instance
                .monitor
                .register(process.clone(), MonitorNodeKind::Processor, name);
            self.emit(ExecutionEvent::ProcessorStarted {
                process: self.process.clone(),
                processor: name.to_string(),
                jobs: fresh.len(),
                timestamp: Utc::now(),
            });
        } else if !fresh.is_empty() {
            tracing::debug!("Processor '{}' of {} adds {} job(s)", name, self.process, fresh.len());
        }

        let Some(run) = self.processors.get_mut(name) else {
            return Ok(());
        };
        for planned in fresh {
            run.dispatched.insert(planned.index.clone());
            let job = Job {
                process: process.clone(),
                index: planned.index.clone(),
                inputs: planned.inputs,
                activity: 0,
                cancellation: self.cancellation.clone(),
            };
            let runtime = runtime.clone();
            let processor_name = name.to_string();
            self.jobs.push(tokio::spawn(async move {
                let result = runtime.dispatch(job).await;
                JobDone {
                    processor: processor_name,
                    index: planned.index,
                    result,
                }
            }));
        }

        if let Some(collector) = run.collector.as_mut() {
            collector.extend(steps, settled);
        } else {
            run.collector = Some(OutputCollector::new(
                processor.output_ports().to_vec(),
                depth,
                steps,
                settled,
            ));
        }
        let tokens = run.collector.as_mut().map(OutputCollector::drain).unwrap_or_default();
        self.emit_processor_outputs(name, tokens)?;
        self.check_finished(name)
    }

    fn check_finished(&mut self, name: &str) -> Result<(), FlowError> {
        let Some(run) = self.processors.get_mut(name) else {
            return Ok(());
        };
        let Some(collector) = run.collector.as_ref() else {
            return Ok(());
        };
        if run.finished || !collector.is_complete() {
            return Ok(());
        }
        run.finished = true;
        let (jobs, errors) = (collector.jobs(), collector.errors());

        tracing::debug!("Processor '{}' of {} finished ({} job(s), {} error(s))", name, self.process, jobs, errors);
        self.instance.monitor.deregister(&self.process.processor(name));
        self.emit(ExecutionEvent::ProcessorCompleted {
            process: self.process.clone(),
            processor: name.to_string(),
            jobs,
            errors,
            timestamp: Utc::now(),
        });

        let instance = self.instance.clone();
        for target in instance.dataflow.controlled_by(name) {
            self.try_fire(target.name())?;
        }
        Ok(())
    }

    fn emit_processor_outputs(&mut self, name: &str, tokens: Vec<(String, IndexPath, Datum)>) -> Result<(), FlowError> {
        for (port, index, datum) in tokens {
            let token = Token::data(self.process.clone(), index, datum);
            self.route(Source::processor(name, port), token)?;
        }
        Ok(())
    }

    /// Deliver a token to every sink linked to `source`, following merges.
    fn route(&mut self, source: Source, token: Token) -> Result<(), FlowError> {
        let instance = self.instance.clone();
        let mut queue = VecDeque::from([(source, token)]);

        while let Some((source, token)) = queue.pop_front() {
            for link in instance.dataflow.links_from(&source) {
                self.check_order(&link.sink, &token)?;
                match &link.sink {
                    Sink::DataflowOutput { port } => self.deliver_output(port, token.clone()),
                    Sink::ProcessorInput { processor, port } => {
                        if let Some(datum) = token.datum() {
                            if let Some(run) = self.processors.get_mut(processor) {
                                run.inputs.receive(port, token.index.clone(), datum.clone());
                            }
                            self.try_fire(processor)?;
                        }
                    }
                    Sink::MergeInput { merge, port } => {
                        let runtime = instance.merges.get(merge).ok_or_else(|| {
                            FlowError::Execution(format!("merge '{}' was not compiled", merge))
                        })?;
                        for released in runtime.receive(port, token.clone())? {
                            queue.push_back((Source::merge(merge.clone()), released));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_order(&mut self, sink: &Sink, token: &Token) -> Result<(), WorkflowStructureError> {
        if token.is_completion() {
            return Ok(());
        }
        if let Some(previous) = self.last_index.get(sink) {
            if !token.index.may_follow(previous) {
                return Err(WorkflowStructureError::OutOfOrder {
                    port: sink.to_string(),
                    previous: previous.clone(),
                    received: token.index.clone(),
                });
            }
        }
        self.last_index.insert(sink.clone(), token.index.clone());
        Ok(())
    }

    fn deliver_output(&mut self, port: &str, token: Token) {
        self.emit(ExecutionEvent::OutputToken {
            process: self.process.clone(),
            port: port.to_string(),
            index: token.index.clone(),
            timestamp: Utc::now(),
        });
        if let (true, Some(datum)) = (token.is_final(), token.datum()) {
            self.outputs.insert(port.to_string(), datum.clone());
        }
        let _ = self.output_tx.send(OutputToken {
            port: port.to_string(),
            token,
        });
    }

    fn complete(mut self) -> RunResult {
        let layer_properties = self.instance.layer_properties(&self.process);
        let duration_ms = self.started.elapsed().as_millis() as u64;
        tracing::info!("Run {} completed in {}ms", self.process, duration_ms);

        self.emit(ExecutionEvent::RunCompleted {
            process: self.process.clone(),
            success: true,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.emit(ExecutionEvent::ProcessTerminated {
            process: self.process.clone(),
            reason: TerminationReason::Completed,
            timestamp: Utc::now(),
        });
        self.release();

        RunResult {
            process: self.process.clone(),
            outputs: std::mem::take(&mut self.outputs),
            duration_ms,
            layer_properties,
        }
    }

    fn terminate_failed(&mut self, error: &FlowError) {
        self.failure.transmit(error);
        self.cancellation.cancel();
        self.stop_everything();
        self.emit(ExecutionEvent::RunCompleted {
            process: self.process.clone(),
            success: false,
            duration_ms: self.started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        self.emit(ExecutionEvent::ProcessTerminated {
            process: self.process.clone(),
            reason: TerminationReason::Failed(error.to_string()),
            timestamp: Utc::now(),
        });
        self.release();
    }

    fn terminate_cancelled(&mut self) {
        tracing::info!("Run {} cancelled", self.process);
        self.stop_everything();
        self.emit(ExecutionEvent::ProcessTerminated {
            process: self.process.clone(),
            reason: TerminationReason::Cancelled,
            timestamp: Utc::now(),
        });
        self.release();
    }

    /// Abort outstanding jobs and flush layer and merge state.
    fn stop_everything(&mut self) {
        for job in self.jobs.iter() {
            job.abort();
        }
        for runtime in self.instance.processors.values() {
            for layer in runtime.layers() {
                layer.cancel(&self.process);
            }
        }
        for merge in self.instance.merges.values() {
            merge.cancel(&self.process);
        }
    }

    fn release(&mut self) {
        for runtime in self.instance.processors.values() {
            for layer in runtime.layers() {
                layer.finished(&self.process);
            }
        }
        self.instance.monitor.deregister_all(&self.process);
    }
}
