use async_trait::async_trait;
use loomcore::{
    json_to_value, value_to_json, Activity, ActivityError, ActivityOutput, InvocationContext, InvocationMetadata, Value,
};
use loomruntime::{ActivityFactory, ActivityMetadata, PortDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Parse a JSON string; arrays become collections
pub struct JsonParseActivity;

#[async_trait]
impl Activity for JsonParseActivity {
    fn activity_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let input = ctx.require_str("json")?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| ActivityError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(ActivityOutput::new().with_output("parsed", json_to_value(parsed)))
    }
}

pub struct JsonParseActivityFactory;

impl ActivityFactory for JsonParseActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(JsonParseActivity))
    }

    fn activity_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortDefinition::required("json", "JSON text")],
            outputs: vec![PortDefinition::required("parsed", "Parsed value")],
        }
    }
}

/// Render a value as JSON text
pub struct JsonStringifyActivity {
    pretty: bool,
}

impl JsonStringifyActivity {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Default for JsonStringifyActivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Activity for JsonStringifyActivity {
    fn activity_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let json = value_to_json(ctx.require_input("value")?);

        let rendered = if self.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        }
        .map_err(|e| ActivityError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(ActivityOutput::new().with_output("json", rendered))
    }
}

pub struct JsonStringifyActivityFactory;

impl ActivityFactory for JsonStringifyActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        let pretty = match config.get("pretty") {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ActivityError::Configuration(format!(
                    "'pretty' must be a boolean, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(Arc::new(JsonStringifyActivity::new(pretty)))
    }

    fn activity_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortDefinition::required("value", "Value to render")],
            outputs: vec![PortDefinition::required("json", "JSON text")],
        }
    }
}

/// Copies every input to the output port of the same name
pub struct IdentityActivity;

#[async_trait]
impl Activity for IdentityActivity {
    fn activity_type(&self) -> &str {
        "identity"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        Ok(ActivityOutput {
            outputs: ctx.inputs,
            metadata: InvocationMetadata::default(),
        })
    }
}

pub struct IdentityActivityFactory;

impl ActivityFactory for IdentityActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(IdentityActivity))
    }

    fn activity_type(&self) -> &str {
        "identity"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Pass inputs through unchanged".to_string(),
            category: "transform".to_string(),
            ..Default::default()
        }
    }
}
