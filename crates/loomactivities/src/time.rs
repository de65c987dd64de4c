use async_trait::async_trait;
use loomcore::{Activity, ActivityError, ActivityOutput, InvocationContext, InvocationMetadata, Value};
use loomruntime::{ActivityFactory, ActivityMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

const DEFAULT_DELAY_MS: u64 = 1000;

/// Waits, then passes every input through unchanged
pub struct DelayActivity {
    delay: Duration,
}

impl DelayActivity {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Activity for DelayActivity {
    fn activity_type(&self) -> &str {
        "time.delay"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        ctx.events.info(format!("Delaying for {}ms", self.delay.as_millis()));

        let started = Instant::now();
        tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(ActivityError::Cancelled),
            _ = sleep(self.delay) => {}
        }

        Ok(ActivityOutput {
            outputs: ctx.inputs,
            metadata: InvocationMetadata {
                execution_time_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            },
        })
    }
}

pub struct DelayActivityFactory;

impl ActivityFactory for DelayActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        let delay_ms = match config.get("delay_ms") {
            None => DEFAULT_DELAY_MS,
            Some(Value::Number(n)) if *n >= 0.0 => *n as u64,
            Some(other) => {
                return Err(ActivityError::Configuration(format!(
                    "'delay_ms' must be a non-negative number, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(Arc::new(DelayActivity::new(Duration::from_millis(delay_ms))))
    }

    fn activity_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
