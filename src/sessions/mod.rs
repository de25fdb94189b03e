//! Session management: one conversation context per user, kept resident and
//! optionally snapshotted to disk.

pub mod file;
pub mod manager;
pub mod traits;

pub use file::{FileSessionPersistence, NoopPersistence};
pub use manager::{SessionManager, UserGuard};
pub use traits::{SessionContext, SessionData, SessionPersistence, SessionSnapshot, TransportHandle};

use crate::config::Config;
use anyhow::{bail, Result};
use std::sync::Arc;

/// Create the session manager with the persistence selected by `sessions.persistence`.
pub fn create_session_manager(config: &Config) -> Result<Arc<SessionManager>> {
    let persistence: Arc<dyn SessionPersistence> = match config.sessions.persistence.trim() {
        "none" => Arc::new(NoopPersistence),
        "file" => Arc::new(FileSessionPersistence::new(
            config.workspace_path(&config.sessions.dir),
        )),
        other => bail!("Unknown session persistence '{other}'. Supported: none, file"),
    };
    Ok(Arc::new(SessionManager::new(persistence)))
}
