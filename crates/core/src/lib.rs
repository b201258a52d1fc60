//! # ADA Core
//!
//! Domain types, traits, and error definitions for the ADA conversational
//! agent. This crate does not depend on an async runtime; it defines the domain
//! model that the backend adapters, tools, and orchestrator implement against.
//!
//! Implementations of [`Backend`] and [`Tool`] live in their own crates;
//! everything here is plain data or a trait.

pub mod error;
pub mod message;
pub mod entry;
pub mod conversation;
pub mod backend;
pub mod tool;
pub mod response;
pub mod persona;
pub mod personas;

// Re-export key types at crate root for ergonomics
pub use error::{BackendError, ToolError, ConversationError, PersonaError};
pub use message::{ChatMessage, Role};
pub use entry::Entry;
pub use conversation::{Conversation, banner};
pub use backend::{
    Backend, BackendInfo, ChatRequest, Completion, CompletionMessage, ResponseFormat, ToolChoice,
    ToolDefinition, Usage, WireToolCall, DEFAULT_CONTEXT_WINDOW,
};
pub use tool::{Invocation, Tool, ToolRegistry};
pub use response::{Response, NULL_OUTPUT};
pub use persona::Persona;
pub use personas::Personas;
