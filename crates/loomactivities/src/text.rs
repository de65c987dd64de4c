use async_trait::async_trait;
use loomcore::{Activity, ActivityError, ActivityOutput, InvocationContext, Value};
use loomruntime::{ActivityFactory, ActivityMetadata, PortDefinition};
use std::collections::HashMap;
use std::sync::Arc;

fn separator(config: &HashMap<String, Value>, default: &str) -> Result<String, ActivityError> {
    match config.get("separator") {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ActivityError::Configuration(format!(
            "'separator' must be a string, got {}",
            other.type_name()
        ))),
    }
}

/// Joins `left` and `right` with a separator
pub struct ConcatActivity {
    separator: String,
}

impl ConcatActivity {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

#[async_trait]
impl Activity for ConcatActivity {
    fn activity_type(&self) -> &str {
        "text.concat"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let left = ctx.require_str("left")?;
        let right = ctx.require_str("right")?;
        let joined = format!("{}{}{}", left, self.separator, right);
        Ok(ActivityOutput::new().with_output("joined", joined))
    }
}

pub struct ConcatActivityFactory;

impl ActivityFactory for ConcatActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(ConcatActivity::new(separator(config, "")?)))
    }

    fn activity_type(&self) -> &str {
        "text.concat"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Concatenate two strings".to_string(),
            category: "text".to_string(),
            inputs: vec![
                PortDefinition::required("left", "First string"),
                PortDefinition::required("right", "Second string"),
            ],
            outputs: vec![PortDefinition::required("joined", "left, separator, right")],
        }
    }
}

/// Splits `text` into a list of strings
pub struct SplitActivity {
    separator: String,
}

impl SplitActivity {
    pub fn new(separator: impl Into<String>) -> Result<Self, ActivityError> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(ActivityError::Configuration("'separator' must not be empty".to_string()));
        }
        Ok(Self { separator })
    }
}

#[async_trait]
impl Activity for SplitActivity {
    fn activity_type(&self) -> &str {
        "text.split"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let text = ctx.require_str("text")?;
        // an empty text is an empty list, not a list holding ""
        let parts: Vec<Value> = if text.is_empty() {
            Vec::new()
        } else {
            text.split(self.separator.as_str()).map(Value::from).collect()
        };
        Ok(ActivityOutput::new().with_output("parts", Value::Array(parts)))
    }
}

pub struct SplitActivityFactory;

impl ActivityFactory for SplitActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(SplitActivity::new(separator(config, ",")?)?))
    }

    fn activity_type(&self) -> &str {
        "text.split"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Split a string into a list".to_string(),
            category: "text".to_string(),
            inputs: vec![PortDefinition::required("text", "String to split")],
            outputs: vec![PortDefinition::required("parts", "List of pieces")],
        }
    }
}
