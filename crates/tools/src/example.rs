//! Greeting tool, the smallest end-to-end exercise of function calling.

use ada_core::error::ToolError;
use ada_core::tool::Tool;
use async_trait::async_trait;

pub struct ExampleTool;

#[async_trait]
impl Tool for ExampleTool {
    fn name(&self) -> &str {
        "example_tool"
    }

    fn description(&self) -> &str {
        "An example tool that returns a greeting"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The name to greet"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let name = arguments["name"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'name' argument".into()))?;

        Ok(format!("Hello, {name}! This is an example tool."))
    }
}
