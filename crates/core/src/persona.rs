//! Personas and their on-disk memories.
//!
//! A persona's effective system prompt is its base prompt followed by every
//! memory file found under its memory directory:
//!
//! ```text
//! {base prompt}
//!
//! {MEMORY_PREAMBLE}
//! <memory>
//! {001.txt}
//! </memory>
//! <memory>
//! {002.txt}
//! </memory>
//! ```
//!
//! Files are gathered recursively and ordered by full path. The assembled
//! memory text is cached on first use and only dropped by
//! [`Persona::clear_cached_memories`]; the next prompt build re-reads the disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::PersonaError;

/// Instruction placed between the base prompt and the memory blocks.
pub const MEMORY_PREAMBLE: &str =
    "The following memories are additional instructions from the USER. Follow them.";

const MEMORY_OPEN: &str = "<memory>";
const MEMORY_CLOSE: &str = "</memory>";

/// Default cap on the total memory text placed in a prompt.
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 32 * 1024;

#[derive(Debug)]
pub struct Persona {
    name: String,
    description: String,
    prompt: String,
    memory_dir: PathBuf,
    memory_limit: usize,
    cache: Mutex<Option<String>>,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
        memory_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompt: prompt.into(),
            memory_dir: memory_dir.into(),
            memory_limit: DEFAULT_MEMORY_LIMIT_BYTES,
            cache: Mutex::new(None),
        }
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The base prompt without memories.
    pub fn base_prompt(&self) -> &str {
        &self.prompt
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    /// The effective system prompt, memories included.
    pub fn get_prompt(&self) -> String {
        let memories = self.memories();
        if memories.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\n\n{MEMORY_PREAMBLE}\n{memories}", self.prompt)
        }
    }

    /// Drop the memory cache. Nothing is read until the next prompt build.
    pub fn clear_cached_memories(&self) {
        if self.lock_cache().take().is_some() {
            debug!(persona = %self.name, "Memory cache invalidated");
        }
    }

    pub fn has_cached_memories(&self) -> bool {
        self.lock_cache().is_some()
    }

    /// Create the memory directory if it does not exist.
    pub fn ensure_memory_dir(&self) -> Result<(), PersonaError> {
        std::fs::create_dir_all(&self.memory_dir).map_err(|e| PersonaError::MemoryDir {
            path: self.memory_dir.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn memories(&self) -> String {
        let mut cache = self.lock_cache();
        if let Some(cached) = cache.as_ref() {
            return cached.clone();
        }
        let loaded = self.load_memories();
        *cache = Some(loaded.clone());
        loaded
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<String>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_memories(&self) -> String {
        if !self.memory_dir.is_dir() {
            debug!(persona = %self.name, dir = %self.memory_dir.display(), "No memory directory");
            return String::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.memory_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(persona = %self.name, error = %e, "Skipping unreadable memory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        // Sort for deterministic ordering
        files.sort();

        let mut blocks: Vec<String> = Vec::new();
        let mut used = 0usize;
        for path in files {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable memory file");
                    continue;
                }
            };
            if used + content.len() > self.memory_limit {
                warn!(
                    file = %path.display(),
                    size = content.len(),
                    limit = self.memory_limit,
                    "Memory file exceeds the remaining memory budget, skipping"
                );
                continue;
            }
            used += content.len();
            debug!(file = %path.display(), "Loaded memory file");
            blocks.push(format!("{MEMORY_OPEN}\n{}\n{MEMORY_CLOSE}", content.trim_end()));
        }

        debug!(persona = %self.name, files = blocks.len(), bytes = used, "Memories loaded");
        blocks.join("\n")
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}
