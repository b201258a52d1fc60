//! Task supervision for a chat session.
//!
//! A [`TaskGroup`] owns every task of the session in one `JoinSet` and a
//! root [`CancellationToken`]. Tasks end with a [`TaskExit`]:
//!
//! - `Finished`: the task is done; the rest of the group keeps running.
//! - `StopRequested`: the whole group is cancelled and `run` returns `Ok`.
//!
//! An `Err` or a panic also cancels the group, and the first failure is
//! returned from [`TaskGroup::run`] once every task has wound down.
//!
//! Running tasks add more tasks through a cloneable [`GroupHandle`]. Its
//! spawn requests travel over a channel serviced by the group loop, so the
//! `JoinSet` itself is never shared.

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AgentError;

/// How a supervised task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    Finished,
    StopRequested,
}

pub type TaskResult = Result<TaskExit, AgentError>;

struct SpawnRequest {
    name: String,
    task: BoxFuture<'static, TaskResult>,
}

/// Cloneable access to a running [`TaskGroup`].
#[derive(Clone)]
pub struct GroupHandle {
    requests: mpsc::UnboundedSender<SpawnRequest>,
    token: CancellationToken,
}

impl GroupHandle {
    /// Queue a task for the group to spawn.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> Result<(), AgentError>
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        self.requests
            .send(SpawnRequest {
                name: name.into(),
                task: Box::pin(task),
            })
            .map_err(|_| AgentError::GroupClosed)
    }

    /// A token cancelled with the group, or on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancel every task in the group.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

pub struct TaskGroup {
    set: JoinSet<TaskResult>,
    names: HashMap<Id, String>,
    token: CancellationToken,
    requests_tx: mpsc::UnboundedSender<SpawnRequest>,
    requests_rx: mpsc::UnboundedReceiver<SpawnRequest>,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            set: JoinSet::new(),
            names: HashMap::new(),
            token: CancellationToken::new(),
            requests_tx,
            requests_rx,
        }
    }

    pub fn handle(&self) -> GroupHandle {
        GroupHandle {
            requests: self.requests_tx.clone(),
            token: self.token.clone(),
        }
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Spawn a task directly, before the group is running.
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        self.start(name.into(), Box::pin(task));
    }

    fn start(&mut self, name: String, task: BoxFuture<'static, TaskResult>) {
        debug!(task = %name, "Spawning task");
        let id = self.set.spawn(task).id();
        self.names.insert(id, name);
    }

    fn name_of(&mut self, id: Id) -> String {
        self.names.remove(&id).unwrap_or_else(|| format!("task-{id}"))
    }

    /// Drive the group until every task has exited.
    pub async fn run(mut self) -> Result<(), AgentError> {
        let mut first_err: Option<AgentError> = None;

        loop {
            tokio::select! {
                biased;

                Some(request) = self.requests_rx.recv() => {
                    self.start(request.name, request.task);
                }

                joined = self.set.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((id, result))) => {
                        let name = self.name_of(id);
                        match result {
                            Ok(TaskExit::Finished) => debug!(task = %name, "Task finished"),
                            Ok(TaskExit::StopRequested) => {
                                info!(task = %name, "Stop requested, shutting down");
                                self.token.cancel();
                            }
                            Err(e) => {
                                error!(task = %name, error = %e, "Task failed");
                                self.token.cancel();
                                first_err.get_or_insert(e);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let name = self.name_of(e.id());
                        error!(task = %name, error = %e, "Task panicked");
                        self.token.cancel();
                        first_err.get_or_insert(AgentError::Task {
                            name,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}
