//! The active persona and the watch that follows it.

use std::sync::{Arc, RwLock};

use ada_core::persona::Persona;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::supervisor::GroupHandle;
use crate::watcher::{MemoryEvent, watch_persona};

/// The persona currently in use, shared between the chat loop and the
/// memory invalidation task.
#[derive(Debug)]
pub struct ActivePersona {
    inner: RwLock<Arc<Persona>>,
}

impl ActivePersona {
    pub fn new(persona: Arc<Persona>) -> Self {
        Self {
            inner: RwLock::new(persona),
        }
    }

    pub fn get(&self) -> Arc<Persona> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn set(&self, persona: Arc<Persona>) {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = persona;
    }
}

/// Runs exactly one memory watch task at a time inside the session's group.
pub struct PersonaWatch {
    group: GroupHandle,
    events: mpsc::Sender<MemoryEvent>,
    current: Option<CancellationToken>,
}

impl PersonaWatch {
    pub fn new(group: GroupHandle, events: mpsc::Sender<MemoryEvent>) -> Self {
        Self {
            group,
            events,
            current: None,
        }
    }

    /// Stop any running watch, make sure the memory directory exists, and
    /// watch it from a new task.
    ///
    /// A directory that cannot be created is logged; the watch task still
    /// runs and reports that hot-reload is off for this persona.
    pub fn start(&mut self, persona: Arc<Persona>) -> Result<(), AgentError> {
        self.stop();
        if let Err(e) = persona.ensure_memory_dir() {
            warn!(persona = %persona.name(), error = %e, "Memory directory unavailable");
        }

        let token = self.group.child_token();
        let name = format!("watch:{}", persona.name());
        info!(persona = %persona.name(), "Starting memory watch");
        self.group
            .spawn(name, watch_persona(persona, self.events.clone(), token.clone()))?;
        self.current = Some(token);
        Ok(())
    }

    /// Cancel the running watch. Does nothing when none is running.
    pub fn stop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    /// Token of the running watch task.
    pub fn token(&self) -> Option<&CancellationToken> {
        self.current.as_ref()
    }
}

impl Drop for PersonaWatch {
    fn drop(&mut self) {
        self.stop();
    }
}
