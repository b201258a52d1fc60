//! Backend trait: the abstraction over model-serving engines.
//!
//! A Backend takes a chat request and returns a completion in one canonical,
//! OpenAI-style shape regardless of how the underlying engine represents it.
//!
//! Implementations: in-process GGUF inference, remote Ollama server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BackendError;
use crate::message::{ChatMessage, Role};

/// Context window assumed when a backend cannot report one.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 2048;

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// The `{"type":"function","function":{...}}` envelope used on the wire.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// How the model may choose among offered tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    /// Force a call to the named function.
    Function(String),
}

impl ToolChoice {
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            ToolChoice::Auto => "auto".into(),
            ToolChoice::None => "none".into(),
            ToolChoice::Required => "required".into(),
            ToolChoice::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub response_format: Option<ResponseFormat>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            response_format: None,
            temperature: 0.7,
            max_tokens: None,
            stop: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn wants_json(&self) -> bool {
        self.response_format == Some(ResponseFormat::JsonObject)
    }
}

/// Canonical completion returned by every backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl Completion {
    /// A single-choice completion.
    pub fn single(message: CompletionMessage, usage: Usage) -> Self {
        Self {
            choices: vec![Choice { message }],
            usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    #[serde(default = "assistant_role")]
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

fn assistant_role() -> Role {
    Role::Assistant
}

impl CompletionMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn tool_calls(calls: Vec<WireToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls),
        }
    }
}

/// A tool call as it appears in a completion: arguments are a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: WireFunction,
}

fn function_kind() -> String {
    "function".into()
}

impl WireToolCall {
    pub fn function(name: impl Into<String>, arguments: &serde_json::Value) -> Self {
        Self {
            id: None,
            kind: function_kind(),
            function: WireFunction {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The core Backend trait.
///
/// Engine errors are returned unmodified; callers decide what to show.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier (e.g., "ollama", "llama").
    fn name(&self) -> &str;

    /// Produce a completion for the given request.
    async fn chat_completion(&self, request: ChatRequest) -> Result<Completion, BackendError>;

    /// The model the backend is currently bound to.
    fn current_model(&self) -> &str;

    /// Models this backend could serve.
    async fn available_models(&self) -> Vec<String>;

    /// Context window of the current model in tokens.
    async fn context_window(&self) -> u32;

    fn describe(&self) -> String {
        format!("{}(model={})", self.name(), self.current_model())
    }
}

/// Facts about a backend queried once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub name: String,
    pub current_model: String,
    pub available_models: Vec<String>,
    context_window: u32,
}

impl BackendInfo {
    pub async fn probe(backend: &dyn Backend) -> Self {
        let mut context_window = backend.context_window().await;
        if context_window == 0 {
            warn!(backend = backend.name(), "Backend reported an empty context window, using default");
            context_window = DEFAULT_CONTEXT_WINDOW;
        }
        Self {
            name: backend.name().to_string(),
            current_model: backend.current_model().to_string(),
            available_models: backend.available_models().await,
            context_window,
        }
    }

    /// Always greater than zero.
    pub fn context_window(&self) -> u32 {
        self.context_window
    }
}
