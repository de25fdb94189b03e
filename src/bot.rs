//! Builds every service once from [`Config`] and wires them together.

use crate::cache::TtlCache;
use crate::config::Config;
use crate::dialogue::{DialogueEngine, Services};
use crate::reports::{create_report_store, ReportStore, SheetsReportStore};
use crate::sessions::{create_session_manager, SessionManager};
use crate::sheets::Row;
use crate::transport::Transport;
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Cache of decoded sheet rows, shared by the report store and health checks.
pub type RowCache = TtlCache<Arc<Vec<Row>>>;

pub struct Bot {
    pub engine: Arc<DialogueEngine>,
    pub store: Arc<SheetsReportStore>,
    pub sessions: Arc<SessionManager>,
    pub cache: Arc<RowCache>,
    sweeper: Option<JoinHandle<()>>,
}

impl Bot {
    /// Must run inside a tokio runtime; the cache sweeper is spawned here.
    pub fn build(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let cache: Arc<RowCache> = Arc::new(TtlCache::new());
        let sweeper = (config.cache.sweep_interval_secs > 0)
            .then(|| cache.spawn_sweeper(config.cache.sweep_interval()));

        let store = create_report_store(config, Arc::clone(&cache))?;
        let sessions = create_session_manager(config)?;

        tracing::info!(
            store = store.name(),
            sessions = sessions.persistence_name(),
            transport = transport.name(),
            "bot services ready"
        );

        let services = Services {
            store: Arc::clone(&store) as Arc<dyn ReportStore>,
            transport,
            sessions: Arc::clone(&sessions),
            limits: config.dialogue.clone(),
        };

        Ok(Self {
            engine: Arc::new(DialogueEngine::new(services)),
            store,
            sessions,
            cache,
            sweeper,
        })
    }

    pub fn health(&self) -> serde_json::Value {
        json!({
            "status": "ok",
            "store_backend": self.store.backend_name(),
            "session_persistence": self.sessions.persistence_name(),
            "active_sessions": self.sessions.active_count(),
            "resident_sessions": self.sessions.resident_count(),
            "cache": self.cache.snapshot(),
        })
    }
}

impl Drop for Bot {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InboundUpdate, RecordingTransport};

    #[tokio::test]
    async fn builds_from_default_memory_config() {
        let mut config = Config::default();
        config.store.backend = "memory".into();
        let transport = Arc::new(RecordingTransport::new());
        let bot = Bot::build(&config, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        bot.engine
            .handle_update(InboundUpdate::message("1", "1", "start report"))
            .await;

        assert_eq!(bot.sessions.active_count(), 1);
        let health = bot.health();
        assert_eq!(health["active_sessions"], 1);
        assert_eq!(health["store_backend"], "memory");
        assert!(transport.texts().iter().any(|t| t.contains("week 1")));
    }

    #[tokio::test]
    async fn unknown_backend_fails_to_build() {
        let mut config = Config::default();
        config.store.backend = "excel".into();
        let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::new());
        assert!(Bot::build(&config, transport).is_err());
    }
}
