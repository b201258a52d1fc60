//! Built-in tool implementations for ADA.
//!
//! Tools are offered to the model on every request; a tool call naming
//! anything not registered here is rejected by the interpreter.

pub mod current_time;
pub mod example;

use ada_core::tool::ToolRegistry;

/// Create the tool registry handed to the agent.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(example::ExampleTool));
    registry.register(Box::new(current_time::CurrentTimeTool));
    registry
}
