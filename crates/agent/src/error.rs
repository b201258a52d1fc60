use ada_core::error::{BackendError, ConversationError, PersonaError};
use thiserror::Error;

/// Errors raised by the orchestrator and its tasks.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Persona error: {0}")]
    Persona(#[from] PersonaError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Failed to watch {path}: {reason}")]
    Watch { path: String, reason: String },

    #[error("Input error: {0}")]
    Input(String),

    #[error("Task '{name}' failed: {reason}")]
    Task { name: String, reason: String },

    #[error("Task group has shut down")]
    GroupClosed,
}
