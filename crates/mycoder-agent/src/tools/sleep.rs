//! Sleep tool: pause the agent for a bounded number of seconds.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{optional_f64, Tool, ToolArgs};

/// Upper bound on a single sleep.
pub const MAX_SLEEP_SECS: f64 = 60.0;

pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Pause execution for a number of seconds, e.g. to wait for a background process. \
         Maximum sleep time is 60 seconds."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": MAX_SLEEP_SECS,
                    "description": "Number of seconds to sleep"
                }
            },
            "required": ["seconds"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let seconds = optional_f64(&args, "seconds")
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: seconds"))?;
        if !(0.0..=MAX_SLEEP_SECS).contains(&seconds) {
            anyhow::bail!("Sleep time must be between 0 and {MAX_SLEEP_SECS} seconds");
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(json!({ "message": format!("Slept for {seconds} seconds") }))
    }
}
