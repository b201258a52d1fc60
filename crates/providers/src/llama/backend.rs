use std::sync::Arc;

use ada_config::{LlamaConfig, expand_home};
use ada_core::backend::{Backend, ChatRequest, Completion, CompletionMessage, Usage};
use ada_core::error::BackendError;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::engine::{GenerationParams, LlamaEngine};
use super::template::ChatTemplate;
use super::{clean_output, extract_tool_call, model_names, resolve_model};

const DEFAULT_MAX_TOKENS: u32 = 512;

/// A backend that runs a GGUF model in-process.
///
/// The engine sits behind a Mutex because Candle inference is
/// single-threaded CPU work; requests are serialised.
pub struct LlamaBackend {
    model: String,
    available: Vec<String>,
    context_window: u32,
    engine: Arc<Mutex<LlamaEngine>>,
}

impl LlamaBackend {
    /// Resolve, fetch, and load the configured model.
    pub async fn load(config: &LlamaConfig) -> Result<Self, BackendError> {
        let resolved = resolve_model(config)?;
        let path = resolved.source.fetch(&expand_home(&config.cache_dir)).await?;

        let template = match config.template.as_deref() {
            Some(name) => ChatTemplate::parse(name)
                .ok_or_else(|| BackendError::NotConfigured(format!("Unknown chat template '{name}'")))?,
            None => ChatTemplate::infer(&path.to_string_lossy()),
        };

        info!(model = %resolved.name, source = %resolved.source, "Initializing llama backend");

        let tokenizer = resolved.tokenizer.clone();
        let tokens = resolved.tokens;
        let engine = tokio::task::spawn_blocking(move || {
            LlamaEngine::load(&path, tokenizer.as_deref(), template, tokens)
        })
        .await
        .map_err(|e| BackendError::Engine(format!("Model loading task failed: {e}")))??;

        Ok(Self {
            model: resolved.name,
            available: model_names(config),
            context_window: engine.context_window(),
            engine: Arc::new(Mutex::new(engine)),
        })
    }
}

#[async_trait]
impl Backend for LlamaBackend {
    fn name(&self) -> &str {
        "llama"
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<Completion, BackendError> {
        let params = GenerationParams {
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stop: request.stop.clone(),
        };
        let messages = request.messages;

        // Run inference on a blocking thread (Candle is CPU-bound)
        let engine = self.engine.clone();
        let (generation, template) = tokio::task::spawn_blocking(move || {
            let mut engine = engine.blocking_lock();
            let template = engine.template();
            let prompt = template.format(&messages);
            engine.generate(&prompt, &params).map(|g| (g, template))
        })
        .await
        .map_err(|e| BackendError::Engine(format!("Inference task panicked: {e}")))??;

        let text = clean_output(&generation.text, template);
        let message = match extract_tool_call(&text, &request.tools) {
            Some(call) => CompletionMessage::tool_calls(vec![call]),
            None => CompletionMessage::text(text),
        };

        Ok(Completion::single(
            message,
            Usage::new(generation.prompt_tokens, generation.completion_tokens),
        ))
    }

    fn current_model(&self) -> &str {
        &self.model
    }

    async fn available_models(&self) -> Vec<String> {
        self.available.clone()
    }

    async fn context_window(&self) -> u32 {
        self.context_window
    }

    fn describe(&self) -> String {
        format!("LlamaBackend(model={})", self.model)
    }
}
