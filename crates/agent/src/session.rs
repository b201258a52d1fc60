//! A running chat session.
//!
//! The session is one [`TaskGroup`] with these members:
//!
//! - the memory invalidation consumer
//! - the watch task of the active persona (replaced on `/switch`)
//! - the chat loop, which owns the [`Agent`] and its conversation
//! - a Ctrl-C listener
//!
//! `/exit`, end of input and Ctrl-C all end the group with
//! [`TaskExit::StopRequested`].

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::active::PersonaWatch;
use crate::agent::{Agent, Step};
use crate::console::Console;
use crate::error::AgentError;
use crate::supervisor::{TaskExit, TaskGroup, TaskResult};
use crate::watcher::{invalidate_loop, memory_channel};

/// Run `agent` against `console` until the operator leaves.
pub async fn run_session<C: Console>(mut agent: Agent, console: C) -> Result<(), AgentError> {
    let mut group = TaskGroup::new();
    let (events_tx, events_rx) = memory_channel();

    group.spawn(
        "invalidate",
        invalidate_loop(events_rx, agent.active_persona(), group.child_token()),
    );

    let mut watch = PersonaWatch::new(group.handle(), events_tx);
    watch.start(agent.persona())?;
    agent.attach_watch(watch);

    group.spawn("signals", stop_on_ctrl_c(group.child_token()));
    group.spawn("chat", chat_loop(agent, console, group.child_token()));

    group.run().await
}

/// Read, handle and answer operator input until exit or cancellation.
pub async fn chat_loop<C: Console>(mut agent: Agent, mut console: C, token: CancellationToken) -> TaskResult {
    let assistant = agent.settings().assistant.clone();
    let prompt = format!("{}: ", agent.settings().operator);

    console.write(&format!(
        "{assistant} is ready ({}, persona '{}'). Type /help for commands.",
        agent.backend().describe(),
        agent.persona().name()
    ));

    loop {
        let line = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(TaskExit::Finished),
            line = console.read_line(&prompt) => line?,
        };

        let Some(line) = line else {
            info!("End of input");
            return Ok(TaskExit::StopRequested);
        };

        let step = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(TaskExit::Finished),
            step = agent.handle_input(&line) => step?,
        };

        match step {
            Step::Continue(Some(output)) => console.write(&output),
            Step::Continue(None) => {}
            Step::Exit => {
                console.write(&format!("{assistant}: Goodbye"));
                return Ok(TaskExit::StopRequested);
            }
        }
    }
}

async fn stop_on_ctrl_c(token: CancellationToken) -> TaskResult {
    tokio::select! {
        _ = token.cancelled() => Ok(TaskExit::Finished),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Interrupted");
                Ok(TaskExit::StopRequested)
            }
            // No signal handling available; leave shutdown to the other tasks.
            Err(_) => {
                token.cancelled().await;
                Ok(TaskExit::Finished)
            }
        },
    }
}
