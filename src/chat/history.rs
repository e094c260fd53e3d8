// File-backed chat history, one JSON document per chat session id

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RelayError, Result};

const MAX_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatHistoryStore {
    dir: PathBuf,
}

impl ChatHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids become file names, so only `[A-Za-z0-9_-]{1,64}` is accepted.
    pub fn validate_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(RelayError::Protocol(format!("invalid session id: {:?}", id)))
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Load a history; a missing file is an empty history.
    pub async fn load(&self, id: &str) -> Result<Vec<ChatMessage>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                RelayError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("corrupt chat history {}: {}", path.display(), e),
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, id: &str, history: &[ChatMessage]) -> Result<()> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let data = serde_json::to_vec_pretty(history).map_err(|e| {
            RelayError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(session_id = id, messages = history.len(), "Chat history saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(ChatHistoryStore::validate_id("abc-123_X").is_ok());
        assert!(ChatHistoryStore::validate_id(&"a".repeat(64)).is_ok());

        assert!(ChatHistoryStore::validate_id("").is_err());
        assert!(ChatHistoryStore::validate_id(&"a".repeat(65)).is_err());
        assert!(ChatHistoryStore::validate_id("../etc/passwd").is_err());
        assert!(ChatHistoryStore::validate_id("a.b").is_err());
    }
}
