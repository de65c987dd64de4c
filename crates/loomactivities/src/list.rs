use async_trait::async_trait;
use loomcore::{Activity, ActivityError, ActivityOutput, InvocationContext, Value};
use loomruntime::{ActivityFactory, ActivityMetadata, PortDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Removes one level of nesting from a list of lists
pub struct FlattenActivity;

#[async_trait]
impl Activity for FlattenActivity {
    fn activity_type(&self) -> &str {
        "list.flatten"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let list = ctx.require_input("list")?;
        let Value::Array(outer) = list else {
            return Err(ActivityError::InvalidInputType {
                field: "list".to_string(),
                expected: "array".to_string(),
                actual: list.type_name().to_string(),
            });
        };

        let mut flat = Vec::new();
        for item in outer {
            match item {
                Value::Array(inner) => flat.extend(inner.iter().cloned()),
                other => {
                    return Err(ActivityError::InvalidInputType {
                        field: "list".to_string(),
                        expected: "array of arrays".to_string(),
                        actual: format!("array containing {}", other.type_name()),
                    })
                }
            }
        }
        Ok(ActivityOutput::new().with_output("flat", Value::Array(flat)))
    }
}

pub struct FlattenActivityFactory;

impl ActivityFactory for FlattenActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(FlattenActivity))
    }

    fn activity_type(&self) -> &str {
        "list.flatten"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Flatten a list of lists by one level".to_string(),
            category: "list".to_string(),
            inputs: vec![PortDefinition::required("list", "List of lists")],
            outputs: vec![PortDefinition::required("flat", "Concatenated inner lists")],
        }
    }
}
