//! Backend implementations for ADA.
//!
//! All backends implement the `ada_core::Backend` trait.
//! The registry builds the active one from configuration.

pub mod llama;
pub mod ollama;
pub mod registry;

#[cfg(feature = "local")]
pub use llama::LlamaBackend;
pub use ollama::OllamaBackend;
pub use registry::BackendRegistry;
