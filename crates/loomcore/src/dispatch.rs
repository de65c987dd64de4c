//! Dispatch stack configuration.
//!
//! The model only records which layers a processor uses and how they are
//! configured; `loomruntime` resolves each `layer_type` through its layer
//! registry when a dataflow is instantiated.

use crate::{FlowError, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const PARALLELIZE: &str = "parallelize";
pub const ERROR_BOUNCE: &str = "errorbounce";
pub const FAILOVER: &str = "failover";
pub const RETRY: &str = "retry";
pub const STOP: &str = "stop";
pub const INVOKE: &str = "invoke";

/// One layer of a processor's dispatch stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLayerSpec {
    pub layer_type: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl DispatchLayerSpec {
    pub fn new(layer_type: impl Into<String>) -> Self {
        Self {
            layer_type: layer_type.into(),
            config: HashMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn parallelize(max_jobs: usize) -> Self {
        ParallelizeConfig { max_jobs }.to_spec()
    }

    pub fn error_bounce() -> Self {
        Self::new(ERROR_BOUNCE)
    }

    pub fn failover() -> Self {
        Self::new(FAILOVER)
    }

    pub fn retry(config: RetryConfig) -> Self {
        config.to_spec()
    }

    pub fn stop(max_attempts: Option<u32>) -> Self {
        StopConfig { max_attempts }.to_spec()
    }

    pub fn invoke() -> Self {
        Self::new(INVOKE)
    }

    pub fn is_invoke(&self) -> bool {
        self.layer_type == INVOKE
    }
}

/// Ordered dispatch layers of a processor.
///
/// Never empty, and always ends in the single `invoke` layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DispatchLayerSpec>", into = "Vec<DispatchLayerSpec>")]
pub struct DispatchStack {
    layers: Vec<DispatchLayerSpec>,
}

impl DispatchStack {
    /// Parallelize, ErrorBounce, Failover, Retry, Stop, Invoke.
    pub fn default_stack(max_jobs: usize) -> Self {
        Self {
            layers: vec![
                DispatchLayerSpec::parallelize(max_jobs),
                DispatchLayerSpec::error_bounce(),
                DispatchLayerSpec::failover(),
                DispatchLayerSpec::retry(RetryConfig::default()),
                DispatchLayerSpec::stop(None),
                DispatchLayerSpec::invoke(),
            ],
        }
    }

    pub fn invoke_only() -> Self {
        Self {
            layers: vec![DispatchLayerSpec::invoke()],
        }
    }

    pub fn from_layers(layers: Vec<DispatchLayerSpec>) -> Result<Self, String> {
        check_layers(&layers)?;
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[DispatchLayerSpec] {
        &self.layers
    }

    pub fn position(&self, layer_type: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.layer_type == layer_type)
    }

    pub fn find(&self, layer_type: &str) -> Option<&DispatchLayerSpec> {
        self.layers.iter().find(|l| l.layer_type == layer_type)
    }

    pub(crate) fn insert(&mut self, position: usize, layer: DispatchLayerSpec) -> Result<(), String> {
        let mut layers = self.layers.clone();
        if position > layers.len() {
            return Err(format!("position {} is past the end of the stack", position));
        }
        layers.insert(position, layer);
        check_layers(&layers)?;
        self.layers = layers;
        Ok(())
    }

    pub(crate) fn remove(&mut self, position: usize) -> Result<DispatchLayerSpec, String> {
        if position >= self.layers.len() {
            return Err(format!("no layer at position {}", position));
        }
        let mut layers = self.layers.clone();
        let removed = layers.remove(position);
        check_layers(&layers)?;
        self.layers = layers;
        Ok(removed)
    }

    pub(crate) fn replace(&mut self, position: usize, layer: DispatchLayerSpec) -> Result<DispatchLayerSpec, String> {
        if position >= self.layers.len() {
            return Err(format!("no layer at position {}", position));
        }
        let mut layers = self.layers.clone();
        let previous = std::mem::replace(&mut layers[position], layer);
        check_layers(&layers)?;
        self.layers = layers;
        Ok(previous)
    }
}

impl Default for DispatchStack {
    fn default() -> Self {
        Self::default_stack(ParallelizeConfig::default().max_jobs)
    }
}

impl TryFrom<Vec<DispatchLayerSpec>> for DispatchStack {
    type Error = String;

    fn try_from(layers: Vec<DispatchLayerSpec>) -> Result<Self, Self::Error> {
        Self::from_layers(layers)
    }
}

impl From<DispatchStack> for Vec<DispatchLayerSpec> {
    fn from(stack: DispatchStack) -> Self {
        stack.layers
    }
}

fn check_layers(layers: &[DispatchLayerSpec]) -> Result<(), String> {
    match layers.last() {
        None => return Err("dispatch stack is empty".to_string()),
        Some(last) if !last.is_invoke() => {
            return Err(format!("last layer is '{}', expected '{}'", last.layer_type, INVOKE))
        }
        Some(_) => {}
    }
    if layers.iter().filter(|l| l.is_invoke()).count() > 1 {
        return Err("more than one invoke layer".to_string());
    }
    Ok(())
}

fn config_u64(config: &HashMap<String, Value>, key: &str) -> Result<Option<u64>, FlowError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Ok(Some(*n as u64)),
        Some(other) => Err(FlowError::Configuration(format!(
            "'{}' must be a non-negative integer, got {:?}",
            key, other
        ))),
    }
}

fn config_u32(config: &HashMap<String, Value>, key: &str) -> Result<Option<u32>, FlowError> {
    config_u64(config, key)?
        .map(|n| {
            u32::try_from(n).map_err(|_| FlowError::Configuration(format!("'{}' is too large: {}", key, n)))
        })
        .transpose()
}

/// Configuration of the parallelize layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelizeConfig {
    pub max_jobs: usize,
}

impl Default for ParallelizeConfig {
    fn default() -> Self {
        Self { max_jobs: 1 }
    }
}

impl ParallelizeConfig {
    pub fn from_config(config: &HashMap<String, Value>) -> Result<Self, FlowError> {
        let max_jobs = config_u64(config, "max_jobs")?
            .map(|n| n as usize)
            .unwrap_or(Self::default().max_jobs);
        if max_jobs == 0 {
            return Err(FlowError::Configuration("max_jobs must be at least 1".to_string()));
        }
        Ok(Self { max_jobs })
    }

    pub fn to_spec(self) -> DispatchLayerSpec {
        DispatchLayerSpec::new(PARALLELIZE).with_config("max_jobs", self.max_jobs as i64)
    }
}

/// Configuration of the retry layer.
///
/// A backoff factor of 1.0 gives a fixed delay; larger factors grow the delay
/// exponentially up to `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_factor: 1.0,
        }
    }
}

impl RetryConfig {
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff_factor: 1.0,
        }
    }

    pub fn exponential(max_retries: u32, initial_delay_ms: u64, backoff_factor: f64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms: max_delay_ms.max(initial_delay_ms),
            backoff_factor: if backoff_factor < 1.0 { 1.0 } else { backoff_factor },
        }
    }

    /// Delay before retry number `retries_done + 1`.
    pub fn backoff(&self, retries_done: u32) -> Duration {
        let exp = self.backoff_factor.powi(retries_done as i32);
        let delay = (self.initial_delay_ms as f64 * exp).round() as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn from_config(config: &HashMap<String, Value>) -> Result<Self, FlowError> {
        let defaults = Self::default();
        let backoff_factor = match config.get("backoff_factor") {
            None | Some(Value::Null) => defaults.backoff_factor,
            Some(Value::Number(n)) if *n >= 1.0 => *n,
            Some(other) => {
                return Err(FlowError::Configuration(format!(
                    "'backoff_factor' must be a number >= 1, got {:?}",
                    other
                )))
            }
        };
        let initial_delay_ms = config_u64(config, "initial_delay_ms")?.unwrap_or(defaults.initial_delay_ms);
        Ok(Self {
            max_retries: config_u32(config, "max_retries")?.unwrap_or(defaults.max_retries),
            initial_delay_ms,
            max_delay_ms: config_u64(config, "max_delay_ms")?
                .unwrap_or(defaults.max_delay_ms)
                .max(initial_delay_ms),
            backoff_factor,
        })
    }

    pub fn to_spec(&self) -> DispatchLayerSpec {
        DispatchLayerSpec::new(RETRY)
            .with_config("max_retries", self.max_retries as i64)
            .with_config("initial_delay_ms", self.initial_delay_ms as i64)
            .with_config("max_delay_ms", self.max_delay_ms as i64)
            .with_config("backoff_factor", self.backoff_factor)
    }
}

/// Configuration of the stop layer; `None` places no cap on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StopConfig {
    pub max_attempts: Option<u32>,
}

impl StopConfig {
    pub fn from_config(config: &HashMap<String, Value>) -> Result<Self, FlowError> {
        let max_attempts = config_u32(config, "max_attempts")?;
        Ok(Self { max_attempts })
    }

    pub fn to_spec(self) -> DispatchLayerSpec {
        let spec = DispatchLayerSpec::new(STOP);
        match self.max_attempts {
            Some(n) => spec.with_config("max_attempts", n as i64),
            None => spec,
        }
    }
}
