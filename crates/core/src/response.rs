//! Response interpreter.
//!
//! Turns one backend completion into display text plus the structured
//! payload kept in the conversation. Models answer in inconsistent shapes
//! (plain text, JSON objects with varying keys, tool calls), so every
//! recognised shape is normalised here and anything else degrades to
//! [`NULL_OUTPUT`] instead of failing the turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::{Completion, WireToolCall};
use crate::error::ToolError;
use crate::message::Role;
use crate::tool::{Invocation, ToolRegistry};

/// Body used whenever a completion cannot be interpreted.
pub const NULL_OUTPUT: &str = "DERP";

/// Keys read from a JSON object answer, in display order.
const BODY_KEYS: [&str; 5] = ["text", "answer", "result", "message", "output"];
const CODE_KEY: &str = "code";

#[derive(Debug, Error)]
enum InterpretError {
    #[error("completion has no choices")]
    NoChoice,

    #[error("unexpected content type: {0}")]
    UnexpectedContent(&'static str),

    #[error("malformed arguments for {name}: {source}")]
    Arguments {
        name: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// An interpreted completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Total tokens reported by the backend (0 when absent)
    pub tokens: u32,

    /// Display text; never empty
    pub body: String,

    /// Structured payload stored in the conversation
    pub content: Option<String>,

    pub role: Role,
}

impl Response {
    /// Interpret a canonical completion, dispatching any tool calls.
    pub async fn interpret(completion: &Completion, tools: &ToolRegistry) -> Self {
        debug!(completion = ?completion, "Interpreting completion");
        let tokens = completion.usage.total_tokens;

        match parse(completion, tools).await {
            Ok((body, content)) => {
                let body = if body.is_empty() {
                    NULL_OUTPUT.to_string()
                } else {
                    body
                };
                Self {
                    tokens,
                    body,
                    content,
                    role: Role::Assistant,
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    raw = %serde_json::to_string(completion).unwrap_or_default(),
                    "Unable to interpret backend completion"
                );
                let content = completion
                    .choices
                    .first()
                    .and_then(|c| c.message.content.clone());
                Self::null(tokens, content)
            }
        }
    }

    /// Interpret a raw JSON completion of unknown shape.
    pub async fn from_raw(raw: &Value, tools: &ToolRegistry) -> Self {
        match serde_json::from_value::<Completion>(raw.clone()) {
            Ok(completion) => Self::interpret(&completion, tools).await,
            Err(e) => {
                error!(error = %e, raw = %raw, "Completion does not have the expected shape");
                let tokens = raw
                    .pointer("/usage/total_tokens")
                    .and_then(Value::as_u64)
                    .and_then(|t| u32::try_from(t).ok())
                    .unwrap_or(0);
                let content = raw
                    .pointer("/choices/0/message/content")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Self::null(tokens, content)
            }
        }
    }

    fn null(tokens: u32, content: Option<String>) -> Self {
        Self {
            tokens,
            body: NULL_OUTPUT.to_string(),
            content,
            role: Role::Assistant,
        }
    }

    pub fn is_null(&self) -> bool {
        self.body == NULL_OUTPUT
    }
}

async fn parse(
    completion: &Completion,
    tools: &ToolRegistry,
) -> Result<(String, Option<String>), InterpretError> {
    let message = &completion
        .choices
        .first()
        .ok_or(InterpretError::NoChoice)?
        .message;

    let (mut body, content) = match &message.content {
        None => (String::new(), None),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Err(_) => {
                info!("Content treated as plain text");
                (raw.clone(), Some(text_payload(raw)))
            }
            Ok(Value::String(text)) => (text.clone(), Some(text_payload(&text))),
            Ok(Value::Object(object)) => {
                info!("Content parsed as JSON");
                (format_object(&object), Some(raw.clone()))
            }
            Ok(other) => return Err(InterpretError::UnexpectedContent(json_kind(&other))),
        },
    };

    if let Some(calls) = &message.tool_calls {
        let output = dispatch_tool_calls(calls, tools).await?;
        if !output.is_empty() {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&output);
        }
    }

    Ok((body, content))
}

fn text_payload(text: &str) -> String {
    serde_json::json!({ "text": text }).to_string()
}

fn format_object(object: &serde_json::Map<String, Value>) -> String {
    let mut parts: Vec<String> = BODY_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .map(render_value)
        .collect();

    match object.get(CODE_KEY) {
        Some(Value::Null) | None => {}
        Some(Value::String(code)) if code.trim().is_empty() => {}
        Some(code) => parts.push(format!("```\n{}\n```", render_value(code))),
    }

    if parts.is_empty() {
        let keys: Vec<&String> = object.keys().collect();
        error!(keys = ?keys, "No recognised keys in JSON answer");
        return NULL_OUTPUT.to_string();
    }

    parts.join("\n\n")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Object(_) => "object",
    }
}

async fn dispatch_tool_calls(
    calls: &[WireToolCall],
    tools: &ToolRegistry,
) -> Result<String, InterpretError> {
    let mut outputs = Vec::new();

    for call in calls.iter().filter(|c| c.kind == "function") {
        let name = call.function.name.clone();
        let raw_args = call.function.arguments.trim();
        let arguments = if raw_args.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw_args).map_err(|source| InterpretError::Arguments {
                name: name.clone(),
                source,
            })?
        };

        info!(tool = %name, arguments = %arguments, "Invoking tool");
        let call = Invocation {
            id: call.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            name,
            arguments,
        };
        outputs.push(tools.invoke(&call).await?);
    }

    Ok(outputs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompletionMessage, Usage};
    use crate::tool::Tool;
    use async_trait::async_trait;

    struct GreetTool;

    #[async_trait]
    impl Tool for GreetTool {
        fn name(&self) -> &str { "greet" }
        fn description(&self) -> &str { "Greets someone" }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            })
        }
        async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
            let name = arguments["name"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'name'".into()))?;
            Ok(format!("Hello, {name}!"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(GreetTool));
        registry
    }

    fn text(content: &str) -> Completion {
        Completion::single(CompletionMessage::text(content), Usage::new(10, 2))
    }

    #[tokio::test]
    async fn plain_text_is_wrapped() {
        let response = Response::interpret(&text("hi there"), &registry()).await;
        assert_eq!(response.body, "hi there");
        assert_eq!(response.content.as_deref(), Some(r#"{"text":"hi there"}"#));
        assert_eq!(response.tokens, 12);
        assert_eq!(response.role, Role::Assistant);
    }

    #[tokio::test]
    async fn json_object_keys_are_joined_in_order() {
        let raw = r#"{"answer":"42","text":"The answer","code":"print(42)"}"#;
        let response = Response::interpret(&text(raw), &registry()).await;
        assert_eq!(response.body, "The answer\n\n42\n\n```\nprint(42)\n```");
        assert_eq!(response.content.as_deref(), Some(raw));
    }

    #[tokio::test]
    async fn blank_code_is_skipped_and_non_strings_are_encoded() {
        let raw = r#"{"result":3,"code":"   "}"#;
        let response = Response::interpret(&text(raw), &registry()).await;
        assert_eq!(response.body, "3");
    }

    #[tokio::test]
    async fn unknown_keys_yield_null_output() {
        let raw = r#"{"foo":"bar"}"#;
        let response = Response::interpret(&text(raw), &registry()).await;
        assert_eq!(response.body, NULL_OUTPUT);
        assert_eq!(response.content.as_deref(), Some(raw));
    }

    #[tokio::test]
    async fn non_object_json_yields_null_output() {
        let response = Response::interpret(&text("[1,2]"), &registry()).await;
        assert!(response.is_null());
        assert_eq!(response.content.as_deref(), Some("[1,2]"));
    }

    #[tokio::test]
    async fn tool_calls_are_dispatched() {
        let completion = Completion::single(
            CompletionMessage::tool_calls(vec![WireToolCall::function(
                "greet",
                &serde_json::json!({ "name": "Ada" }),
            )]),
            Usage::default(),
        );
        let response = Response::interpret(&completion, &registry()).await;
        assert_eq!(response.body, "Hello, Ada!");
        assert!(response.content.is_none());
    }

    #[tokio::test]
    async fn tool_output_follows_text() {
        let mut message = CompletionMessage::text(r#"{"text":"Sure."}"#);
        message.tool_calls = Some(vec![
            WireToolCall::function("greet", &serde_json::json!({ "name": "A" })),
            WireToolCall::function("greet", &serde_json::json!({ "name": "B" })),
        ]);
        let completion = Completion::single(message, Usage::default());
        let response = Response::interpret(&completion, &registry()).await;
        assert_eq!(response.body, "Sure.\nHello, A!\nHello, B!");
    }

    #[tokio::test]
    async fn unknown_tool_yields_null_output() {
        let completion = Completion::single(
            CompletionMessage::tool_calls(vec![WireToolCall::function(
                "rm_rf",
                &serde_json::json!({}),
            )]),
            Usage::default(),
        );
        let response = Response::interpret(&completion, &registry()).await;
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn malformed_arguments_yield_null_output() {
        let mut call = WireToolCall::function("greet", &serde_json::json!({}));
        call.function.arguments = "{not json".into();
        let completion = Completion::single(CompletionMessage::tool_calls(vec![call]), Usage::default());
        let response = Response::interpret(&completion, &registry()).await;
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn empty_completion_yields_null_output() {
        let response = Response::interpret(&Completion::default(), &registry()).await;
        assert!(response.is_null());

        let no_content = Completion::single(
            CompletionMessage { role: Role::Assistant, content: None, tool_calls: None },
            Usage::default(),
        );
        let response = Response::interpret(&no_content, &registry()).await;
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn raw_values_of_the_wrong_shape_are_contained() {
        let raw = serde_json::json!({ "choices": "nope", "usage": { "total_tokens": 7 } });
        let response = Response::from_raw(&raw, &registry()).await;
        assert!(response.is_null());
        assert_eq!(response.tokens, 7);

        let raw = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"text\":\"ok\"}" } }]
        });
        let response = Response::from_raw(&raw, &registry()).await;
        assert_eq!(response.body, "ok");
        assert_eq!(response.tokens, 0);
    }
}
