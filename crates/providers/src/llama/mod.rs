//! In-process inference backend.
//!
//! Runs GGUF-quantized models directly on the host CPU via
//! [Candle](https://github.com/huggingface/candle) when the crate is built
//! with the `local` feature. Model selection is driven by configuration:
//!
//! ```toml
//! [backends.local]
//! type = "llama"
//! model = "tinyllama"
//!
//! [[backends.local.models]]
//! name = "tinyllama"
//! url = "hf://TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf"
//! tokenizer = "TinyLlama/TinyLlama-1.1B-Chat-v1.0"
//! tokens = 2048
//! ```
//!
//! Resolution and output post-processing are always compiled so that
//! configuration errors surface the same way with or without the engine.

pub mod source;
pub mod template;

#[cfg(feature = "local")]
mod backend;
#[cfg(feature = "local")]
mod engine;

#[cfg(feature = "local")]
pub use backend::LlamaBackend;

use ada_config::LlamaConfig;
use ada_core::backend::{ToolDefinition, WireToolCall};
use ada_core::error::BackendError;
use serde_json::Value;

pub use source::ModelSource;
pub use template::ChatTemplate;

/// The configured model entry after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub name: String,
    pub source: ModelSource,
    pub tokens: Option<u32>,
    pub tokenizer: Option<String>,
}

/// Pick the configured model out of the model list.
pub fn resolve_model(config: &LlamaConfig) -> Result<ResolvedModel, BackendError> {
    let name = config
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .ok_or(BackendError::MissingModel)?;

    let definition = config
        .models
        .iter()
        .find(|m| m.name.as_deref() == Some(name))
        .ok_or_else(|| BackendError::ModelNotFound(name.to_string()))?;

    let url = definition
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| BackendError::MissingUrl(name.to_string()))?;

    Ok(ResolvedModel {
        name: name.to_string(),
        source: ModelSource::parse(url),
        tokens: definition.tokens.filter(|t| *t > 0),
        tokenizer: definition.tokenizer.clone(),
    })
}

/// Names of every model entry; entries without a name are skipped.
pub fn model_names(config: &LlamaConfig) -> Vec<String> {
    config.models.iter().filter_map(|m| m.name.clone()).collect()
}

/// Cut generated text at the earliest stop sequence.
pub fn truncate_at_stop(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Strip template end markers and surrounding whitespace.
pub fn clean_output(text: &str, template: ChatTemplate) -> String {
    let mut out = text.trim();
    loop {
        let before = out.len();
        for marker in template.end_markers() {
            out = out.trim_end_matches(marker).trim_end();
        }
        if out.len() == before {
            break;
        }
    }
    out.to_string()
}

/// Recognise a bare `{"name": ..., "arguments": {...}}` answer as a tool call.
///
/// Only names among the offered tools are accepted; anything else stays text.
pub fn extract_tool_call(text: &str, tools: &[ToolDefinition]) -> Option<WireToolCall> {
    if tools.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?;
    if !tools.iter().any(|t| t.name == name) {
        return None;
    }
    let arguments = match object.get("arguments").or_else(|| object.get("parameters")) {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(s)) => serde_json::from_str(s).ok()?,
        Some(other) => other.clone(),
    };
    Some(WireToolCall::function(name, &arguments))
}
