//! Chat templates used to turn a message list into a single prompt string.

use ada_core::message::{ChatMessage, Role};

/// Chat template format used to structure messages for the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatTemplate {
    /// `<|system|>\n{content}</s>\n<|user|>\n{content}</s>\n<|assistant|>\n`
    TinyLlama,
    /// `<|im_start|>system\n{content}<|im_end|>\n<|im_start|>assistant\n`
    #[default]
    ChatML,
    /// `[INST] <<SYS>>\n{system}\n<</SYS>>\n\n{content} [/INST]`
    Llama2,
    /// `<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{content}<|eot_id|>`
    Llama3,
}

impl ChatTemplate {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tinyllama" | "zephyr" => Some(Self::TinyLlama),
            "chatml" | "qwen" | "smollm" => Some(Self::ChatML),
            "llama2" | "llama-2" | "mistral" => Some(Self::Llama2),
            "llama3" | "llama-3" => Some(Self::Llama3),
            _ => None,
        }
    }

    /// Guess a template from a model file name.
    pub fn infer(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        if lower.contains("tinyllama") {
            Self::TinyLlama
        } else if lower.contains("llama-3") || lower.contains("llama3") {
            Self::Llama3
        } else if lower.contains("llama-2") || lower.contains("llama2") || lower.contains("mistral") {
            Self::Llama2
        } else {
            Self::ChatML
        }
    }

    /// Special-token strings that end an assistant turn.
    pub fn end_markers(&self) -> &'static [&'static str] {
        match self {
            Self::TinyLlama | Self::Llama2 => &["</s>"],
            Self::ChatML => &["<|im_end|>", "<|endoftext|>"],
            Self::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
        }
    }

    pub fn format(&self, messages: &[ChatMessage]) -> String {
        match self {
            Self::TinyLlama => format_tinyllama(messages),
            Self::ChatML => format_chatml(messages),
            Self::Llama2 => format_llama2(messages),
            Self::Llama3 => format_llama3(messages),
        }
    }
}

/// Tool results are shown to the model as user turns.
fn header_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

fn format_tinyllama(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str("<|");
        prompt.push_str(header_role(msg.role));
        prompt.push_str("|>\n");
        if msg.role == Role::Tool {
            prompt.push_str("[Tool Result] ");
        }
        prompt.push_str(&msg.content);
        prompt.push_str("</s>\n");
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

fn format_chatml(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str("<|im_start|>");
        prompt.push_str(header_role(msg.role));
        prompt.push('\n');
        if msg.role == Role::Tool {
            prompt.push_str("[Tool Result] ");
        }
        prompt.push_str(&msg.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

fn format_llama2(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    let mut system_prompt = String::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system_prompt = msg.content.clone();
            }
            Role::User | Role::Tool => {
                prompt.push_str("[INST] ");
                if !system_prompt.is_empty() {
                    prompt.push_str("<<SYS>>\n");
                    prompt.push_str(&system_prompt);
                    prompt.push_str("\n<</SYS>>\n\n");
                    system_prompt.clear();
                }
                if msg.role == Role::Tool {
                    prompt.push_str("[Tool Result] ");
                }
                prompt.push_str(&msg.content);
                prompt.push_str(" [/INST]");
            }
            Role::Assistant => {
                prompt.push(' ');
                prompt.push_str(&msg.content);
                prompt.push_str(" </s>");
            }
        }
    }
    prompt
}

fn format_llama3(messages: &[ChatMessage]) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    for msg in messages {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(header_role(msg.role));
        prompt.push_str("<|end_header_id|>\n\n");
        if msg.role == Role::Tool {
            prompt.push_str("[Tool Result] ");
        }
        prompt.push_str(&msg.content);
        prompt.push_str("<|eot_id|>");
    }
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}
