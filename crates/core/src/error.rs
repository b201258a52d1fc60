//! Error types for the ADA domain, one enum per concern.

use thiserror::Error;

/// Errors raised while constructing or invoking a backend.
///
/// The first group is raised at construction and is fatal for the session.
/// The second group comes from a single `chat_completion` call and is
/// reported to the operator without ending the session.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("'model' is required")]
    MissingModel,

    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Model '{0}' is missing 'url'")]
    MissingUrl(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api {
        status_code: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Inference engine error: {0}")]
    Engine(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Failed to persist conversation to {path}: {reason}")]
    Persist { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("Unknown persona: {0}")]
    NotFound(String),

    #[error("Failed to prepare memory directory {path}: {reason}")]
    MemoryDir { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_carry_status_and_message() {
        let err = BackendError::Api {
            status_code: 404,
            message: "model not loaded".into(),
        };
        assert_eq!(err.to_string(), "API request failed: model not loaded (status: 404)");
    }

    #[test]
    fn model_resolution_messages() {
        assert_eq!(BackendError::MissingModel.to_string(), "'model' is required");
        assert_eq!(
            BackendError::ModelNotFound("phi".into()).to_string(),
            "Model 'phi' not found"
        );
        assert!(BackendError::MissingUrl("phi".into()).to_string().contains("is missing 'url'"));
    }

    #[test]
    fn memory_dir_error_names_the_path() {
        let err = PersonaError::MemoryDir {
            path: "/data/jester".into(),
            reason: "File exists".into(),
        };
        assert!(err.to_string().contains("/data/jester"));
    }
}
