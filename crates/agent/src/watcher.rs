//! Memory hot-reload.
//!
//! A [`DirectoryWatcher`] watches a persona's memory directory with `notify`.
//! Its callback runs on notify's own thread, so it only filters the raw
//! event and hands a [`MemoryEvent`] to a bounded channel with `try_send`.
//! [`invalidate_loop`] is the single consumer on the scheduler side; every
//! event drops the cached memories of whichever persona is active now.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ada_core::persona::Persona;
use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::active::ActivePersona;
use crate::error::AgentError;
use crate::supervisor::{TaskExit, TaskResult};

/// Pending events beyond this are dropped; invalidation is idempotent.
pub const MEMORY_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEventKind {
    Created,
    Modified,
    Removed,
}

/// A change to a file under a memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEvent {
    pub kind: MemoryEventKind,
    pub path: PathBuf,
}

pub fn memory_channel() -> (mpsc::Sender<MemoryEvent>, mpsc::Receiver<MemoryEvent>) {
    mpsc::channel(MEMORY_EVENT_CAPACITY)
}

/// Turn a raw notify event into memory events. Directory events are dropped.
pub fn classify(event: &Event) -> Vec<MemoryEvent> {
    let kind = match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            return Vec::new();
        }
        EventKind::Create(_) => MemoryEventKind::Created,
        EventKind::Modify(_) => MemoryEventKind::Modified,
        EventKind::Remove(_) => MemoryEventKind::Removed,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| !path.is_dir())
        .map(|path| MemoryEvent {
            kind,
            path: path.clone(),
        })
        .collect()
}

/// Keeps a recursive watch alive until dropped.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl DirectoryWatcher {
    pub fn start(path: &Path, events: mpsc::Sender<MemoryEvent>) -> Result<Self, AgentError> {
        let watch_err = |e: notify::Error| AgentError::Watch {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        if !path.is_dir() {
            return Err(AgentError::Watch {
                path: path.display().to_string(),
                reason: "not a directory".into(),
            });
        }

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for memory_event in classify(&event) {
                    match events.try_send(memory_event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(dropped)) => {
                            debug!(path = %dropped.path.display(), "Memory event queue full, coalescing");
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("Memory event consumer gone");
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "Memory watch error"),
        })
        .map_err(watch_err)?;

        watcher.watch(path, RecursiveMode::Recursive).map_err(watch_err)?;
        debug!(path = %path.display(), "Watching memory directory");

        Ok(Self {
            _watcher: watcher,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Memory watcher dropped");
    }
}

/// Watch one persona's memory directory until `token` is cancelled.
///
/// A watch that cannot be established is logged; the task still waits for
/// cancellation so the persona can be switched away from normally.
pub async fn watch_persona(
    persona: Arc<Persona>,
    events: mpsc::Sender<MemoryEvent>,
    token: CancellationToken,
) -> TaskResult {
    let watcher = match DirectoryWatcher::start(persona.memory_dir(), events) {
        Ok(watcher) => {
            info!(persona = %persona.name(), path = %watcher.path().display(), "Watching memories");
            Some(watcher)
        }
        Err(e) => {
            warn!(persona = %persona.name(), error = %e, "Memory hot-reload disabled");
            None
        }
    };

    token.cancelled().await;
    drop(watcher);
    debug!(persona = %persona.name(), "Stopped watching memories");
    Ok(TaskExit::Finished)
}

/// Drop the active persona's memory cache on every event, in arrival order.
pub async fn invalidate_loop(
    mut events: mpsc::Receiver<MemoryEvent>,
    active: Arc<ActivePersona>,
    token: CancellationToken,
) -> TaskResult {
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            event = events.recv() => match event {
                Some(event) => {
                    let persona = active.get();
                    debug!(
                        persona = %persona.name(),
                        kind = ?event.kind,
                        path = %event.path.display(),
                        "Memory changed, clearing cache"
                    );
                    persona.clear_cached_memories();
                }
                None => break,
            },
        }
    }
    Ok(TaskExit::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, ModifyKind};
    use std::time::Duration;

    fn persona(dir: &Path) -> Arc<Persona> {
        Arc::new(Persona::new("test", "test persona", "Base prompt.", dir))
    }

    #[test]
    fn directory_events_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("001.txt");
        std::fs::write(&file, "x").unwrap();

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        assert_eq!(
            classify(&created),
            vec![MemoryEvent {
                kind: MemoryEventKind::Created,
                path: file.clone()
            }]
        );

        let modified =
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(file.clone());
        assert_eq!(classify(&modified)[0].kind, MemoryEventKind::Modified);

        let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path(tmp.path().to_path_buf());
        assert!(classify(&folder).is_empty());

        let dir_modified = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(tmp.path().to_path_buf());
        assert!(classify(&dir_modified).is_empty());

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(tmp.path().join("gone.txt"));
        assert_eq!(classify(&removed)[0].kind, MemoryEventKind::Removed);

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(file);
        assert!(classify(&access).is_empty());
    }

    #[tokio::test]
    async fn events_invalidate_the_active_persona() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("001.txt"), "1").unwrap();
        let persona = persona(tmp.path());
        persona.get_prompt();
        assert!(persona.has_cached_memories());

        let active = Arc::new(ActivePersona::new(persona.clone()));
        let (tx, rx) = memory_channel();
        let token = CancellationToken::new();
        let consumer = tokio::spawn(invalidate_loop(rx, active, token.clone()));

        tx.send(MemoryEvent {
            kind: MemoryEventKind::Modified,
            path: tmp.path().join("001.txt"),
        })
        .await
        .unwrap();
        drop(tx);

        assert_eq!(consumer.await.unwrap().unwrap(), TaskExit::Finished);
        assert!(!persona.has_cached_memories());
    }

    #[tokio::test]
    async fn consumer_stops_on_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let active = Arc::new(ActivePersona::new(persona(tmp.path())));
        let (_tx, rx) = memory_channel();
        let token = CancellationToken::new();
        let consumer = tokio::spawn(invalidate_loop(rx, active, token.clone()));

        token.cancel();
        assert_eq!(consumer.await.unwrap().unwrap(), TaskExit::Finished);
    }

    #[tokio::test]
    async fn watcher_reports_file_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = memory_channel();
        let _watcher = DirectoryWatcher::start(tmp.path(), tx).unwrap();

        let file = tmp.path().join("001.txt");
        std::fs::write(&file, "remember this").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no watch event within 5s")
            .unwrap();
        assert!(event.path.ends_with("001.txt"));
    }

    #[tokio::test]
    async fn missing_directory_keeps_task_alive() {
        let tmp = tempfile::tempdir().unwrap();
        let persona = persona(&tmp.path().join("does-not-exist"));
        let (tx, _rx) = memory_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(watch_persona(persona, tx, token.clone()));

        tokio::task::yield_now().await;
        assert!(!task.is_finished());
        token.cancel();
        assert_eq!(task.await.unwrap().unwrap(), TaskExit::Finished);
    }
}
