//! Weekly reports: domain model, sheet row codec, text rendering and the
//! cached, retrying store.

pub mod codec;
pub mod format;
pub mod model;
pub mod store;

pub use model::{
    normalize_task, DraftIncomplete, DraftReport, DraftStep, PlanningPhase, ReportRecord, Score,
    ScoreError, TaskList, UserStats,
};
pub use store::{ReportStore, SheetsReportStore};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::sheets::{self, Row};
use anyhow::Result;
use std::sync::Arc;

/// Build the configured backend and wrap it in a [`SheetsReportStore`].
///
/// The cache is passed in so the caller can run its sweeper and report stats.
pub fn create_report_store(
    config: &Config,
    cache: Arc<TtlCache<Arc<Vec<Row>>>>,
) -> Result<Arc<SheetsReportStore>> {
    let backend = sheets::create_backend(config)?;
    tracing::info!(
        backend = backend.name(),
        reports_sheet = %config.store.reports_sheet,
        cache_ttl_secs = config.cache.ttl_secs,
        max_retries = config.retry.max_retries,
        "report store configured"
    );
    Ok(Arc::new(SheetsReportStore::from_config(config, backend, cache)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factory_uses_configured_backend() {
        let mut config = Config::default();
        config.store.backend = "memory".into();
        let store = create_report_store(&config, Arc::new(TtlCache::new())).unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.get_next_week_number().await.unwrap(), 1);
    }
}
