//! Candle inference engine for quantized llama-family models.

use std::path::Path;

use ada_core::backend::DEFAULT_CONTEXT_WINDOW;
use ada_core::error::BackendError;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::source::fetch::hub_get;
use super::template::ChatTemplate;
use super::truncate_at_stop;

const SAMPLING_SEED: u64 = 299792458;

/// Knobs for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// The loaded model state (tokenizer + weights + config).
pub struct LlamaEngine {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    template: ChatTemplate,
    eos_token_ids: Vec<u32>,
    context_window: u32,
}

impl LlamaEngine {
    /// Load weights and tokenizer. Blocking; call from `spawn_blocking`.
    pub fn load(
        model_path: &Path,
        tokenizer: Option<&str>,
        template: ChatTemplate,
        tokens: Option<u32>,
    ) -> Result<Self, BackendError> {
        let device = Device::Cpu;
        info!(path = %model_path.display(), "Loading GGUF model");

        let mut file = std::fs::File::open(model_path)
            .map_err(|e| BackendError::Engine(format!("Failed to open model file: {e}")))?;
        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| BackendError::Engine(format!("Failed to parse GGUF file: {e}")))?;

        let context_window = tokens
            .or_else(|| context_length(&gguf))
            .unwrap_or(DEFAULT_CONTEXT_WINDOW);

        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device)
            .map_err(|e| BackendError::Engine(format!("Failed to load model weights: {e}")))?;

        let tokenizer = load_tokenizer(model_path, tokenizer)?;
        let mut eos_token_ids: Vec<u32> = ["</s>", "<|endoftext|>", "<|im_end|>", "<|eot_id|>", "<|end_of_text|>"]
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        if eos_token_ids.is_empty() {
            // common EOS id
            eos_token_ids.push(2);
        }

        info!(
            context_window,
            eos_tokens = ?eos_token_ids,
            template = ?template,
            "Local model loaded successfully"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            template,
            eos_token_ids,
            context_window,
        })
    }

    pub fn template(&self) -> ChatTemplate {
        self.template
    }

    pub fn context_window(&self) -> u32 {
        self.context_window
    }

    /// Run inference: tokenize → generate tokens → decode.
    pub fn generate(&mut self, prompt: &str, params: &GenerationParams) -> Result<Generation, BackendError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| BackendError::Engine(format!("Tokenization failed: {e}")))?;
        let prompt_ids = encoding.get_ids();
        let prompt_tokens = prompt_ids.len() as u32;

        if prompt_tokens >= self.context_window {
            return Err(BackendError::Engine(format!(
                "Prompt of {prompt_tokens} tokens does not fit the {} token context window",
                self.context_window
            )));
        }
        let budget = params
            .max_tokens
            .min(self.context_window - prompt_tokens);

        debug!(
            prompt_tokens,
            max_tokens = budget,
            temperature = params.temperature,
            "Starting local generation"
        );

        let mut logits_processor = if params.temperature <= 0.0 {
            LogitsProcessor::new(SAMPLING_SEED, None, None)
        } else {
            LogitsProcessor::new(SAMPLING_SEED, Some(params.temperature as f64), None)
        };

        let mut generated: Vec<u32> = Vec::new();
        let mut input = Tensor::new(prompt_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut index_pos = 0usize;
        let mut text = String::new();

        for _ in 0..budget {
            let step_len = input.dim(1).map_err(map_candle_err)?;
            let logits = self.model.forward(&input, index_pos).map_err(map_candle_err)?;
            index_pos += step_len;

            // Logits for the last position
            let logits = logits.squeeze(0).map_err(map_candle_err)?;
            let next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;

            if self.eos_token_ids.contains(&next_token) {
                break;
            }
            generated.push(next_token);

            if !params.stop.is_empty() {
                text = self.decode(&generated)?;
                if let Some(cut) = truncate_at_stop(&text, &params.stop) {
                    text.truncate(cut);
                    break;
                }
            }

            input = Tensor::new(&[next_token][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        if params.stop.is_empty() {
            text = self.decode(&generated)?;
        }

        let completion_tokens = generated.len() as u32;
        debug!(completion_tokens, output_len = text.len(), "Generation complete");

        Ok(Generation {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }

    fn decode(&self, ids: &[u32]) -> Result<String, BackendError> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| BackendError::Engine(format!("Detokenization failed: {e}")))
    }
}

/// `<architecture>.context_length` from GGUF metadata.
fn context_length(gguf: &gguf_file::Content) -> Option<u32> {
    let arch = gguf.metadata.get("general.architecture")?.to_string().ok()?;
    let value = gguf.metadata.get(&format!("{arch}.context_length"))?;
    value
        .to_u32()
        .ok()
        .or_else(|| value.to_u64().ok().and_then(|v| u32::try_from(v).ok()))
        .filter(|n| *n > 0)
}

fn load_tokenizer(model_path: &Path, hint: Option<&str>) -> Result<Tokenizer, BackendError> {
    let path = match hint {
        Some(hint) if Path::new(hint).is_file() => Path::new(hint).to_path_buf(),
        Some(repo) => hub_get(repo, "tokenizer.json")?,
        None => {
            let sibling = model_path.with_file_name("tokenizer.json");
            if !sibling.is_file() {
                return Err(BackendError::NotConfigured(format!(
                    "No tokenizer.json next to {}; set 'tokenizer' on the model entry",
                    model_path.display()
                )));
            }
            sibling
        }
    };
    Tokenizer::from_file(&path)
        .map_err(|e| BackendError::Engine(format!("Failed to load tokenizer {}: {e}", path.display())))
}

fn map_candle_err(e: candle_core::Error) -> BackendError {
    BackendError::Engine(format!("Candle inference error: {e}"))
}
