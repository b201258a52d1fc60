//! The ADA orchestrator.
//!
//! Ties the domain pieces together into an interactive session:
//!
//! 1. **Read** a line from the operator
//! 2. **Dispatch** slash commands locally
//! 3. **Send** everything else to the active backend with the persona's
//!    system prompt and the tool list
//! 4. **Interpret** the completion, record it, and print the body
//!
//! Memory files are hot-reloaded: a filesystem watcher invalidates the
//! active persona's cached memories, which are re-read on the next prompt.

pub mod active;
pub mod agent;
pub mod command;
pub mod console;
pub mod error;
pub mod session;
pub mod supervisor;
pub mod watcher;

pub use active::{ActivePersona, PersonaWatch};
pub use agent::{Agent, AgentSettings, Step, Turn, exceeds_usage};
pub use command::Command;
pub use console::{Console, StdConsole};
pub use error::AgentError;
pub use session::{chat_loop, run_session};
pub use supervisor::{GroupHandle, TaskExit, TaskGroup, TaskResult};
pub use watcher::{DirectoryWatcher, MEMORY_EVENT_CAPACITY, MemoryEvent, MemoryEventKind};
