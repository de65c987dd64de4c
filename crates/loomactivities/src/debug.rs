use async_trait::async_trait;
use loomcore::{value_to_json, Activity, ActivityError, ActivityOutput, InvocationContext, Value};
use loomruntime::{ActivityFactory, ActivityMetadata, PortDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Logs its inputs and passes `message` on
pub struct DebugActivity;

#[async_trait]
impl Activity for DebugActivity {
    fn activity_type(&self) -> &str {
        "debug.log"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let message = ctx
            .inputs
            .get("message")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => value_to_json(other).to_string(),
            })
            .unwrap_or_else(|| "(no message)".to_string());

        tracing::info!(processor = %ctx.processor, index = %ctx.index, "DEBUG: {}", message);
        ctx.events.info(format!("DEBUG: {}", message));

        let mut names: Vec<&String> = ctx.inputs.keys().collect();
        names.sort();
        for name in names {
            ctx.events.info(format!("  {}: {}", name, value_to_json(&ctx.inputs[name])));
        }

        Ok(ActivityOutput::new().with_output("message", message))
    }
}

pub struct DebugActivityFactory;

impl ActivityFactory for DebugActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(DebugActivity))
    }

    fn activity_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            inputs: vec![PortDefinition::optional("message", "Text to log")],
            outputs: vec![PortDefinition::required("message", "The logged text")],
        }
    }
}
