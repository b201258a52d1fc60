//! Tools the assistant can call.
//!
//! Every tool is offered to the backend on every request and listed in the
//! system prompt by its signature, `name(param, ...): description`. A call
//! naming anything outside the [`ToolRegistry`] is an error.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::backend::ToolDefinition;
use crate::error::ToolError;

/// One decoded tool call from a completion.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The backend's call id, or a generated one.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. The returned text becomes the reply body.
    async fn execute(&self, arguments: Value) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    /// `name(param, ...): description`, parameters in schema order.
    fn to_signature(&self) -> String {
        let schema = self.parameters_schema();
        let params: Vec<&str> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default();
        format!("{}({}): {}", self.name(), params.join(", "), self.description())
    }
}

/// The tools of a session, ordered by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing one with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn signatures(&self) -> Vec<String> {
        self.tools.values().map(|t| t.to_signature()).collect()
    }

    /// Run the named tool with the call's arguments.
    pub async fn invoke(&self, call: &Invocation) -> Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        debug!(tool = %call.name, call_id = %call.id, "Running tool");
        tool.execute(call.arguments.clone()).await
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts the words of `text`, optionally only those longer than `min`.
    struct WordCount;

    #[async_trait]
    impl Tool for WordCount {
        fn name(&self) -> &str {
            "word_count"
        }
        fn description(&self) -> &str {
            "Count the words in a text"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "min": { "type": "integer" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            let min = arguments["min"].as_u64().unwrap_or(0) as usize;
            Ok(text.split_whitespace().filter(|w| w.len() > min).count().to_string())
        }
    }

    /// Takes no arguments at all.
    struct Ping;

    #[async_trait]
    impl Tool for Ping {
        fn name(&self) -> &str {
            "ping"
        }
        fn description(&self) -> &str {
            "Answer pong"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
            Ok("pong".into())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WordCount));
        registry.register(Box::new(Ping));
        registry
    }

    fn call(name: &str, arguments: Value) -> Invocation {
        Invocation {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn signatures_follow_schema_properties() {
        assert_eq!(
            registry().signatures(),
            vec!["ping(): Answer pong", "word_count(text, min): Count the words in a text"]
        );
    }

    #[test]
    fn definitions_are_ordered_by_name() {
        let defs = registry().definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ping", "word_count"]);
        assert_eq!(defs[1].parameters["required"][0], "text");
        assert_eq!(registry().names(), names);
    }

    #[test]
    fn registering_a_name_again_replaces_the_tool() {
        let mut registry = registry();
        registry.register(Box::new(Ping));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn invoke_passes_arguments_through() {
        let registry = registry();
        let out = registry
            .invoke(&call("word_count", serde_json::json!({ "text": "a bb ccc", "min": 1 })))
            .await
            .unwrap();
        assert_eq!(out, "2");
        assert_eq!(registry.invoke(&call("ping", Value::Null)).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn invoke_reports_unknown_and_bad_calls() {
        let registry = registry();
        let err = registry.invoke(&call("rm_rf", serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "rm_rf"));

        let err = registry.invoke(&call("word_count", serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
