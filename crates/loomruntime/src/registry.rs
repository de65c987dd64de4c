use crate::layers::{
    DispatchLayer, ErrorBounceLayer, FailoverLayer, InvokeLayer, ParallelizeLayer, RetryLayer, StopLayer,
};
use loomcore::dispatch::{ERROR_BOUNCE, FAILOVER, INVOKE, PARALLELIZE, RETRY, STOP};
use loomcore::{Activity, ActivityError, ActivitySpec, DispatchLayerSpec, FlowError, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating activity instances
pub trait ActivityFactory: Send + Sync {
    /// Create a new instance of the activity with given configuration
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError>;

    /// Get activity type identifier
    fn activity_type(&self) -> &str;

    /// Optional: Get activity metadata (description, input/output ports, etc.)
    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata::default()
    }
}

/// Metadata about an activity type
#[derive(Debug, Clone)]
pub struct ActivityMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for ActivityMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PortDefinition {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Registry of available activity types
pub struct ActivityRegistry {
    factories: HashMap<String, Arc<dyn ActivityFactory>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an activity factory
    pub fn register(&mut self, factory: Arc<dyn ActivityFactory>) {
        let activity_type = factory.activity_type().to_string();
        tracing::info!("Registering activity type: {}", activity_type);
        self.factories.insert(activity_type, factory);
    }

    /// Create an activity instance for a bound activity
    pub fn create_activity(&self, spec: &ActivitySpec) -> Result<Arc<dyn Activity>, FlowError> {
        let factory = self
            .factories
            .get(&spec.activity_type)
            .ok_or_else(|| FlowError::UnknownActivityType(spec.activity_type.clone()))?;

        factory.create(&spec.config).map_err(|e| {
            FlowError::Configuration(format!("Failed to create activity '{}': {}", spec.activity_type, e))
        })
    }

    pub fn contains(&self, activity_type: &str) -> bool {
        self.factories.contains_key(activity_type)
    }

    /// Get all registered activity types, sorted
    pub fn list_activity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for an activity type
    pub fn get_metadata(&self, activity_type: &str) -> Option<ActivityMetadata> {
        self.factories.get(activity_type).map(|f| f.metadata())
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a runtime layer from the config map of its spec
pub type LayerConstructor =
    Arc<dyn Fn(&HashMap<String, Value>) -> Result<Arc<dyn DispatchLayer>, FlowError> + Send + Sync>;

/// Registry mapping dispatch layer type ids to constructors
pub struct LayerRegistry {
    constructors: HashMap<String, LayerConstructor>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the six built-in layers. Parallelize layers whose
    /// config omits `max_jobs` get `default_max_jobs`.
    pub fn with_builtins(default_max_jobs: usize) -> Self {
        let mut registry = Self::new();
        registry.register(PARALLELIZE, move |config| {
            let layer = if config.contains_key("max_jobs") {
                ParallelizeLayer::from_config(config)?
            } else {
                ParallelizeLayer::new(default_max_jobs.max(1))
            };
            Ok(Arc::new(layer) as Arc<dyn DispatchLayer>)
        });
        registry.register(ERROR_BOUNCE, |_| Ok(Arc::new(ErrorBounceLayer::new()) as Arc<dyn DispatchLayer>));
        registry.register(FAILOVER, |_| Ok(Arc::new(FailoverLayer::new()) as Arc<dyn DispatchLayer>));
        registry.register(RETRY, |config| {
            Ok(Arc::new(RetryLayer::from_config(config)?) as Arc<dyn DispatchLayer>)
        });
        registry.register(STOP, |config| {
            Ok(Arc::new(StopLayer::from_config(config)?) as Arc<dyn DispatchLayer>)
        });
        registry.register(INVOKE, |_| Ok(Arc::new(InvokeLayer::new()) as Arc<dyn DispatchLayer>));
        registry
    }

    pub fn register<F>(&mut self, layer_type: impl Into<String>, constructor: F)
    where
        F: Fn(&HashMap<String, Value>) -> Result<Arc<dyn DispatchLayer>, FlowError> + Send + Sync + 'static,
    {
        let layer_type = layer_type.into();
        tracing::debug!("Registering dispatch layer type: {}", layer_type);
        self.constructors.insert(layer_type, Arc::new(constructor));
    }

    pub fn create_layer(&self, spec: &DispatchLayerSpec) -> Result<Arc<dyn DispatchLayer>, FlowError> {
        let constructor = self
            .constructors
            .get(&spec.layer_type)
            .ok_or_else(|| FlowError::UnknownLayerType(spec.layer_type.clone()))?;
        constructor(&spec.config)
    }

    pub fn list_layer_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::with_builtins(1)
    }
}
