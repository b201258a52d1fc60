//! Ollama backend implementation.
//!
//! Talks to a running Ollama server (`ollama serve`) over its native REST
//! API and normalises the answers into the canonical completion shape:
//!
//! - `POST /api/chat` for completions
//! - `GET  /api/tags` for the model list
//! - `POST /api/show` for the context window

use ada_config::OllamaConfig;
use ada_core::backend::{
    Backend, ChatRequest, Completion, CompletionMessage, DEFAULT_CONTEXT_WINDOW, Usage,
    WireToolCall,
};
use ada_core::error::BackendError;
use ada_core::message::Role;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// A backend served by a remote Ollama instance.
pub struct OllamaBackend {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig) -> Result<Self, BackendError> {
        let model = config
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or(BackendError::MissingModel)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        let base_url = config.url.trim_end_matches('/').to_string();
        info!(model = %model, url = %base_url, "Initializing Ollama backend");

        Ok(Self {
            model,
            base_url,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    fn chat_body(&self, request: &ChatRequest) -> Value {
        let mut options = serde_json::json!({ "temperature": request.temperature });
        if !request.stop.is_empty() {
            options["stop"] = serde_json::json!(request.stop);
        }
        // Ollama calls max_tokens "num_predict"
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": options,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_wire()).collect();
            body["tools"] = Value::Array(tools);
        }

        if request.wants_json() {
            body["format"] = Value::String("json".into());
        }

        body
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Ollama returned error");
            return Err(BackendError::Api {
                status_code: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Api {
                status_code: response.status().as_u16(),
                message: "model listing failed".into(),
            });
        }

        let tags: ApiTags = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<Completion, BackendError> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request"
        );
        let body = self.chat_body(&request);
        let raw = self.post_json("/api/chat", &body).await.inspect_err(|e| {
            error!(error = %e, "Ollama error");
        })?;
        convert_response(raw)
    }

    fn current_model(&self) -> &str {
        &self.model
    }

    async fn available_models(&self) -> Vec<String> {
        match self.fetch_tags().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "Failed to list models from Ollama server");
                vec![self.model.clone()]
            }
        }
    }

    async fn context_window(&self) -> u32 {
        let body = serde_json::json!({ "model": self.model });
        match self.post_json("/api/show", &body).await {
            Ok(show) => context_window_from_show(&show).unwrap_or_else(|| {
                debug!("Could not find num_ctx in model metadata, using default");
                DEFAULT_CONTEXT_WINDOW
            }),
            Err(e) => {
                warn!(error = %e, "Failed to get context window from Ollama, using default");
                DEFAULT_CONTEXT_WINDOW
            }
        }
    }

    fn describe(&self) -> String {
        format!("OllamaBackend(model={}, url={})", self.model, self.base_url)
    }
}

// --- Ollama API types ---

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ApiTags {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    name: String,
}

/// Normalise an `/api/chat` answer into a canonical completion.
pub fn convert_response(raw: Value) -> Result<Completion, BackendError> {
    let parsed: ApiChatResponse = serde_json::from_value(raw)
        .map_err(|e| BackendError::InvalidResponse(format!("Unexpected chat response: {e}")))?;

    let usage = Usage::new(
        parsed.prompt_eval_count.unwrap_or(0),
        parsed.eval_count.unwrap_or(0),
    );

    let message = match parsed.message {
        None => CompletionMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: None,
        },
        Some(message) => CompletionMessage {
            role: message.role.unwrap_or(Role::Assistant),
            content: message.content,
            tool_calls: message.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| {
                        let arguments = match call.function.arguments {
                            Value::String(s) => s,
                            Value::Null => "{}".to_string(),
                            other => other.to_string(),
                        };
                        let mut wire = WireToolCall::function(call.function.name, &Value::Null);
                        wire.id = call.id;
                        wire.function.arguments = arguments;
                        wire
                    })
                    .collect()
            }),
        },
    };

    Ok(Completion::single(message, usage))
}

/// Extract the context window from an `/api/show` answer.
pub fn context_window_from_show(show: &Value) -> Option<u32> {
    if let Some(info) = show.get("model_info").and_then(Value::as_object) {
        for key in ["num_ctx", "context_length"] {
            if let Some(n) = info.get(key).and_then(as_window) {
                return Some(n);
            }
        }
        // Architecture-prefixed form, e.g. "llama.context_length"
        if let Some(n) = info
            .iter()
            .filter(|(k, _)| k.ends_with(".context_length"))
            .find_map(|(_, v)| as_window(v))
        {
            return Some(n);
        }
    }

    match show.get("parameters") {
        Some(Value::Object(params)) => params.get("num_ctx").and_then(as_window),
        // Modelfile text form: one "name value" pair per line
        Some(Value::String(text)) => text.lines().find_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("num_ctx"), Some(value)) => value.parse().ok().filter(|n| *n > 0),
                _ => None,
            }
        }),
        _ => None,
    }
}

fn as_window(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ada_core::backend::{ResponseFormat, ToolDefinition};
    use ada_core::message::ChatMessage;

    fn backend() -> OllamaBackend {
        OllamaBackend::new(&OllamaConfig {
            model: Some("llama3.2".into()),
            url: "http://localhost:11434/".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn model_is_required() {
        let err = OllamaBackend::new(&OllamaConfig {
            model: None,
            ..OllamaConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, BackendError::MissingModel));
    }

    #[test]
    fn url_is_normalised() {
        let b = backend();
        assert_eq!(b.url(), "http://localhost:11434");
        assert_eq!(b.current_model(), "llama3.2");
        assert_eq!(b.describe(), "OllamaBackend(model=llama3.2, url=http://localhost:11434)");
    }

    #[test]
    fn chat_body_maps_options() {
        let request = ChatRequest::new(vec![ChatMessage::system("sys"), ChatMessage::user("hi")])
            .with_tools(vec![ToolDefinition {
                name: "example_tool".into(),
                description: "greets".into(),
                parameters: serde_json::json!({ "type": "object" }),
            }])
            .with_response_format(ResponseFormat::JsonObject)
            .with_max_tokens(Some(64))
            .with_stop(vec!["USER:".into()]);
        let body = backend().chat_body(&request);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["options"]["stop"][0], "USER:");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "example_tool");
    }

    #[test]
    fn chat_body_omits_empty_fields() {
        let body = backend().chat_body(&ChatRequest::new(vec![ChatMessage::user("hi")]));
        assert!(body.get("tools").is_none());
        assert!(body.get("format").is_none());
        assert!(body["options"].get("stop").is_none());
        assert!(body["options"].get("num_predict").is_none());
    }

    #[test]
    fn convert_text_response() {
        let raw = serde_json::json!({
            "model": "llama3.2",
            "message": { "role": "assistant", "content": "{\"text\":\"hi\"}" },
            "done": true,
            "prompt_eval_count": 10,
            "eval_count": 4
        });
        let completion = convert_response(raw).unwrap();
        let message = &completion.choices[0].message;
        assert_eq!(message.content.as_deref(), Some("{\"text\":\"hi\"}"));
        assert_eq!(completion.usage.total_tokens, 14);
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn convert_tool_call_response() {
        let raw = serde_json::json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "example_tool", "arguments": { "name": "Bob" } } }
                ]
            }
        });
        let completion = convert_response(raw).unwrap();
        let calls = completion.choices[0].message.tool_calls.clone().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, "function");
        assert_eq!(calls[0].function.name, "example_tool");
        let args: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args["name"], "Bob");
        assert_eq!(completion.usage.total_tokens, 0);
    }

    #[test]
    fn convert_missing_message() {
        let completion = convert_response(serde_json::json!({ "done": true })).unwrap();
        let message = &completion.choices[0].message;
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.is_none());
    }

    #[test]
    fn context_window_sources() {
        assert_eq!(
            context_window_from_show(&serde_json::json!({ "model_info": { "num_ctx": 4096 } })),
            Some(4096)
        );
        assert_eq!(
            context_window_from_show(&serde_json::json!({ "model_info": { "context_length": 8192 } })),
            Some(8192)
        );
        assert_eq!(
            context_window_from_show(&serde_json::json!({
                "model_info": { "general.architecture": "llama", "llama.context_length": 131072 }
            })),
            Some(131072)
        );
        assert_eq!(
            context_window_from_show(&serde_json::json!({ "parameters": { "num_ctx": "2048" } })),
            Some(2048)
        );
        assert_eq!(
            context_window_from_show(&serde_json::json!({
                "parameters": "stop \"<|eot_id|>\"\nnum_ctx 16384"
            })),
            Some(16384)
        );
        assert_eq!(context_window_from_show(&serde_json::json!({ "license": "..." })), None);
        assert_eq!(
            context_window_from_show(&serde_json::json!({ "model_info": { "num_ctx": 0 } })),
            None
        );
    }

    #[tokio::test]
    async fn unreachable_server_falls_back() {
        let b = OllamaBackend::new(&OllamaConfig {
            model: Some("llama3.2".into()),
            url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        })
        .unwrap();
        assert_eq!(b.available_models().await, vec!["llama3.2".to_string()]);
        assert_eq!(b.context_window().await, DEFAULT_CONTEXT_WINDOW);
        let err = b
            .chat_completion(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
    }
}
