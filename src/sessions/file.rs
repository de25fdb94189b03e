//! Session snapshots as one JSON file per user.

use super::traits::{SessionPersistence, SessionSnapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Keeps nothing. Sessions live only as long as the process.
pub struct NoopPersistence;

#[async_trait]
impl SessionPersistence for NoopPersistence {
    async fn load(&self, _user_id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(None)
    }

    async fn save(&self, _snapshot: &SessionSnapshot) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _user_id: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

pub struct FileSessionPersistence {
    dir: PathBuf,
}

impl FileSessionPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl SessionPersistence for FileSessionPersistence {
    async fn load(&self, user_id: &str) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(user_id);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read session {}", path.display()))
            }
        };
        let snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session {}", path.display()))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(&snapshot.user_id);
        let body = serde_json::to_string_pretty(snapshot).context("Failed to serialize session")?;
        let temp = self
            .dir
            .join(format!(".session.tmp-{}", uuid::Uuid::new_v4()));

        fs::write(&temp, body)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::StateId;
    use crate::sessions::{SessionContext, SessionManager};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let dir = TempDir::new().unwrap();
        let persistence = Arc::new(FileSessionPersistence::new(dir.path().join("sessions")));

        let sessions = SessionManager::new(persistence.clone());
        let mut context = sessions.get_context("tg:42").await;
        context.state = StateId::EnteringScore;
        context.username = Some("alice".into());
        sessions.save_context(&context).await;

        let restarted = SessionManager::new(persistence);
        let restored = restarted.get_context("tg:42").await;
        assert_eq!(restored.state, StateId::EnteringScore);
        assert_eq!(restored.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn user_ids_are_sanitized_into_file_names() {
        let dir = TempDir::new().unwrap();
        let persistence = FileSessionPersistence::new(dir.path());
        persistence
            .save(&SessionSnapshot::from(&SessionContext::new("../evil")))
            .await
            .unwrap();
        assert!(dir.path().join("___evil.json").exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let persistence = FileSessionPersistence::new(dir.path());
        persistence
            .save(&SessionSnapshot::from(&SessionContext::new("7")))
            .await
            .unwrap();
        persistence.delete("7").await.unwrap();
        persistence.delete("7").await.unwrap();
        assert!(persistence.load("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("7.json"), "{").await.unwrap();
        let persistence = FileSessionPersistence::new(dir.path());
        assert!(persistence.load("7").await.is_err());
    }
}
