//! Operator I/O for the chat loop.

use std::io::{BufRead, Write};

use async_trait::async_trait;

use crate::error::AgentError;

/// Where operator input comes from and output goes to.
#[async_trait]
pub trait Console: Send + 'static {
    /// Show `prompt` and read one line. `None` at end of input.
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, AgentError>;

    fn write(&mut self, text: &str);
}

/// Standard input and output.
///
/// Reading blocks an OS thread, so each line is read with `spawn_blocking`
/// and awaited back on the scheduler.
pub struct StdConsole;

#[async_trait]
impl Console for StdConsole {
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, AgentError> {
        print!("{prompt}");
        std::io::stdout()
            .flush()
            .map_err(|e| AgentError::Input(e.to_string()))?;

        tokio::task::spawn_blocking(|| read_one(&mut std::io::stdin().lock()))
            .await
            .map_err(|e| AgentError::Input(format!("Input task failed: {e}")))?
            .map_err(|e| AgentError::Input(e.to_string()))
    }

    fn write(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Read one line, replacing invalid UTF-8. `None` at end of input.
fn read_one(reader: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut bytes = Vec::new();
    if reader.read_until(b'\n', &mut bytes)? == 0 {
        return Ok(None);
    }
    Ok(Some(trim_newline(&String::from_utf8_lossy(&bytes)).to_string()))
}

fn trim_newline(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}
