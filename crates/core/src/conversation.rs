//! Conversation history.
//!
//! An append-only sequence of [`Entry`] values that is only ever emptied by
//! [`Conversation::clear`]. When persistence is enabled every mutation
//! rewrites a JSON record file with the full history.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::entry::Entry;
use crate::error::ConversationError;
use crate::message::ChatMessage;
use crate::response::Response;

const BANNER_WIDTH: usize = 20;
const BANNER_FILL: char = '*';

/// Render `text` centred inside a starred banner.
pub fn banner(text: &str) -> String {
    let rule: String = std::iter::repeat_n(BANNER_FILL, BANNER_WIDTH).collect();
    let pad = BANNER_WIDTH.saturating_sub(text.chars().count());
    let left = pad / 2;
    let right = pad - left;
    format!(
        "{rule}\n{}{text}{}\n{rule}",
        BANNER_FILL.to_string().repeat(left),
        BANNER_FILL.to_string().repeat(right),
    )
}

#[derive(Debug, Default)]
pub struct Conversation {
    history: Vec<Entry>,
    record: Option<PathBuf>,
}

impl Conversation {
    /// An in-memory conversation.
    pub fn new() -> Self {
        info!("Initializing conversation");
        Self::default()
    }

    /// A conversation persisted to `<dir>/<unix-ts>-<id>.json`.
    ///
    /// The directory is created if needed; the record file is only written on
    /// the first mutation.
    pub fn persistent(dir: impl AsRef<Path>) -> Result<Self, ConversationError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| ConversationError::Persist {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let id = Uuid::new_v4().simple().to_string();
        let file = format!("{}-{}.json", chrono::Utc::now().timestamp(), &id[..8]);
        let record = dir.join(file);
        info!(record = %record.display(), "Initializing persistent conversation");

        Ok(Self {
            history: Vec::new(),
            record: Some(record),
        })
    }

    /// Append a plain operator entry.
    pub fn append(&mut self, author: &str, body: &str) -> Result<(), ConversationError> {
        self.history.push(Entry::new(author, body));
        self.persist()
    }

    /// Append an interpreted backend response.
    pub fn append_response(&mut self, author: &str, response: &Response) -> Result<(), ConversationError> {
        self.history.push(Entry::from_response(author, response));
        self.persist()
    }

    /// Drop every entry and remove the record file, if any.
    pub fn clear(&mut self) -> Result<(), ConversationError> {
        self.history.clear();
        if let Some(path) = &self.record {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(record = %path.display(), "Removed conversation record"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ConversationError::Persist {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Wire projection of the full history, in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.iter().map(Entry::message).collect()
    }

    pub fn history(&self) -> &[Entry] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn record_path(&self) -> Option<&Path> {
        self.record.as_deref()
    }

    fn persist(&self) -> Result<(), ConversationError> {
        let Some(path) = &self.record else {
            return Ok(());
        };
        let err = |reason: String| ConversationError::Persist {
            path: path.display().to_string(),
            reason,
        };
        let json = serde_json::to_string_pretty(&self.history).map_err(|e| err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| err(e.to_string()))?;
        debug!(record = %path.display(), entries = self.history.len(), "Persisted conversation");
        Ok(())
    }
}

impl std::fmt::Display for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", banner("HISTORY START"))?;
        for entry in &self.history {
            writeln!(f, "{entry}")?;
        }
        write!(f, "{}", banner("HISTORY END"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn response(body: &str) -> Response {
        Response {
            tokens: 3,
            body: body.into(),
            content: Some(serde_json::json!({ "text": body }).to_string()),
            role: Role::Assistant,
        }
    }

    #[test]
    fn append_projects_user_messages() {
        let mut conversation = Conversation::new();
        conversation.append("USER", "Hello").unwrap();
        conversation.append_response("ADA", &response("Hi there!")).unwrap();

        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::user("Hello"));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, r#"{"text":"Hi there!"}"#);
    }

    #[test]
    fn display_frames_history() {
        let mut conversation = Conversation::new();
        conversation.append("USER", "Hello").unwrap();
        let rendered = conversation.to_string();
        assert!(rendered.starts_with("********************\n***HISTORY START****"));
        assert!(rendered.contains("USER: Hello"));
        assert!(rendered.ends_with("****HISTORY END*****\n********************"));
    }

    #[test]
    fn banner_is_fixed_width() {
        let rendered = banner("HISTORY CLEARED");
        for line in rendered.lines() {
            assert_eq!(line.len(), 20);
        }
        assert!(rendered.contains("HISTORY CLEARED"));
    }

    #[test]
    fn persistent_conversation_writes_and_clears_record() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conversation = Conversation::persistent(tmp.path().join("history")).unwrap();
        let record = conversation.record_path().unwrap().to_path_buf();
        assert!(!record.exists());

        conversation.append("USER", "one").unwrap();
        conversation.append_response("ADA", &response("two")).unwrap();
        let saved: Vec<Entry> =
            serde_json::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].body(), "two");

        conversation.clear().unwrap();
        assert!(conversation.is_empty());
        assert!(!record.exists());
    }

    #[test]
    fn record_name_has_timestamp_and_id() {
        let tmp = tempfile::tempdir().unwrap();
        let conversation = Conversation::persistent(tmp.path()).unwrap();
        let name = conversation
            .record_path()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        let stem = name.strip_suffix(".json").unwrap();
        let (ts, id) = stem.split_once('-').unwrap();
        assert!(ts.parse::<i64>().is_ok());
        assert_eq!(id.len(), 8);
    }

    #[test]
    fn clear_without_record_is_fine() {
        let mut conversation = Conversation::new();
        conversation.append("USER", "x").unwrap();
        conversation.clear().unwrap();
        assert_eq!(conversation.len(), 0);
    }
}
