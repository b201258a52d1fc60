//! Slash commands recognised by the chat loop.
//!
//! Commands are matched case-insensitively on their first word. Anything
//! that is not a known command, including unknown `/words`, is sent to the
//! backend as a message.

/// An operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    History,
    Tools,
    Prompt,
    Personas,
    /// `/switch <name>`; `None` when the name was left out.
    Switch(Option<String>),
    Backends,
    Models,
    Exit,
}

pub const HELP: &str = "\
Commands:
  /help, /?            Show this help
  /clear               Clear the conversation (and its saved record)
  /history             Print the conversation so far
  /tools               List the tools offered to the model
  /prompt              Print the current system prompt
  /persona, /personas  List personas
  /switch <name>       Switch to another persona
  /backend, /backends  List configured backends
  /model, /models      List models of the active backend
  /exit, /quit, /bye   Leave";

impl Command {
    /// Parse a line of operator input. Returns `None` for plain messages.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }

        let mut words = line.split_whitespace();
        let word = words.next()?.to_lowercase();
        let command = match word.as_str() {
            "/help" | "/?" => Self::Help,
            "/clear" => Self::Clear,
            "/history" => Self::History,
            "/tools" => Self::Tools,
            "/prompt" => Self::Prompt,
            "/persona" | "/personas" => Self::Personas,
            "/switch" => Self::Switch(words.next().map(str::to_string)),
            "/backend" | "/backends" => Self::Backends,
            "/model" | "/models" => Self::Models,
            "/exit" | "/quit" | "/bye" => Self::Exit,
            _ => return None,
        };
        Some(command)
    }
}
