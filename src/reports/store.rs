//! Report store: domain operations over a spreadsheet backend, with a
//! read-through cache and retries on every remote call.

use super::codec::{self, UserSummary, REPORT_HEADER, USER_HEADER};
use super::model::{DraftReport, ReportRecord, UserStats};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::retry::{ErrorCode, RetryPolicy, StoreError, StoreResult};
use crate::sheets::{column_letters, Cell, Row, SheetMetadata, SheetsBackend};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Report persistence as seen by the dialogue.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// The user's reports ordered by week, most recent last, at most `limit`.
    async fn get_reports(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ReportRecord>>;

    /// Every decodable report. `force_refresh` bypasses the cache.
    async fn all_reports(&self, force_refresh: bool) -> StoreResult<Vec<ReportRecord>>;

    /// Persist a finished draft and return the stored record.
    async fn save_report(&self, draft: &DraftReport) -> StoreResult<ReportRecord>;

    async fn get_user_stats(&self, user_id: &str) -> StoreResult<UserStats>;

    /// One more than the highest week number stored, or 1.
    async fn get_next_week_number(&self) -> StoreResult<u32>;

    /// Planned tasks of the report for `week_number - 1`, or empty.
    async fn get_previous_week_plans(&self, week_number: u32) -> StoreResult<Vec<String>>;

    /// Like [`ReportStore::get_previous_week_plans`], preferring `user_id`'s own report.
    async fn get_user_previous_week_plans(
        &self,
        user_id: &str,
        week_number: u32,
    ) -> StoreResult<Vec<String>>;

    async fn has_report_for_week(&self, user_id: &str, week_number: u32) -> StoreResult<bool>;

    fn name(&self) -> &str;
}

/// Where each logical table lives in the spreadsheet.
#[derive(Debug, Clone)]
struct SheetLayout {
    name: String,
    width: usize,
}

impl SheetLayout {
    fn new(name: &str, width: usize) -> Self {
        Self {
            name: name.to_string(),
            width,
        }
    }

    fn last_column(&self) -> String {
        column_letters(self.width.saturating_sub(1))
    }

    fn header_range(&self) -> String {
        a1(&self.name, &format!("A1:{}1", self.last_column()))
    }

    fn data_range(&self) -> String {
        a1(&self.name, &format!("A2:{}", self.last_column()))
    }

    fn append_range(&self) -> String {
        a1(&self.name, &format!("A:{}", self.last_column()))
    }

    /// Range of data row `index` (0-based, header excluded).
    fn row_range(&self, index: usize) -> String {
        let row = index + 2;
        a1(&self.name, &format!("A{row}:{}{row}", self.last_column()))
    }

    fn cache_key(&self, op: &str) -> String {
        format!("{}:{op}", self.name)
    }

    fn cache_prefix(&self) -> String {
        format!("{}:", self.name)
    }
}

fn a1(sheet: &str, cells: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{sheet}!{cells}")
    } else {
        format!("'{}'!{cells}", sheet.replace('\'', "''"))
    }
}

/// [`ReportStore`] over any [`SheetsBackend`].
pub struct SheetsReportStore {
    backend: Arc<dyn SheetsBackend>,
    cache: Arc<TtlCache<Arc<Vec<Row>>>>,
    retry: RetryPolicy,
    ttl: Duration,
    reports: SheetLayout,
    users: Option<SheetLayout>,
    ready: OnceCell<SheetMetadata>,
}

impl SheetsReportStore {
    pub fn new(
        backend: Arc<dyn SheetsBackend>,
        cache: Arc<TtlCache<Arc<Vec<Row>>>>,
        retry: RetryPolicy,
        ttl: Duration,
        reports_sheet: &str,
        users_sheet: Option<&str>,
    ) -> Self {
        Self {
            backend,
            cache,
            retry,
            ttl,
            reports: SheetLayout::new(reports_sheet, REPORT_HEADER.len()),
            users: users_sheet.map(|name| SheetLayout::new(name, USER_HEADER.len())),
            ready: OnceCell::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        backend: Arc<dyn SheetsBackend>,
        cache: Arc<TtlCache<Arc<Vec<Row>>>>,
    ) -> Self {
        Self::new(
            backend,
            cache,
            RetryPolicy::from_config(&config.retry),
            config.cache.ttl(),
            &config.store.reports_sheet,
            config.store.users_sheet(),
        )
    }

    pub fn cache(&self) -> &Arc<TtlCache<Arc<Vec<Row>>>> {
        &self.cache
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Probe the backend and verify or write sheet headers, once.
    ///
    /// A failed attempt leaves the store uninitialized so the next call retries.
    pub async fn ensure_ready(&self) -> StoreResult<&SheetMetadata> {
        self.ready.get_or_try_init(|| self.initialize()).await
    }

    async fn initialize(&self) -> StoreResult<SheetMetadata> {
        let metadata = self
            .retry
            .execute("probe", || self.backend.probe())
            .await?;

        self.ensure_header(&self.reports, &REPORT_HEADER).await?;
        if let Some(users) = &self.users {
            self.ensure_header(users, &USER_HEADER).await?;
        }

        tracing::info!(
            backend = self.backend.name(),
            title = %metadata.title,
            reports_sheet = %self.reports.name,
            users_sheet = self.users.as_ref().map_or("-", |u| u.name.as_str()),
            "report store ready"
        );
        Ok(metadata)
    }

    async fn ensure_header(&self, layout: &SheetLayout, header: &[&str]) -> StoreResult<()> {
        let range = layout.header_range();
        let rows = self
            .retry
            .execute("read_header", || self.backend.read_range(&range))
            .await?;

        let existing = rows.first().filter(|row| !row.iter().all(Cell::is_blank));
        match existing {
            None => {
                let header_row = codec::header_row(header);
                self.retry
                    .execute("write_header", || {
                        self.backend.write_range(&range, vec![header_row.clone()])
                    })
                    .await?;
                tracing::info!(sheet = %layout.name, "wrote missing header row");
                Ok(())
            }
            Some(row) if codec::header_matches(header, row) => Ok(()),
            Some(row) => {
                let found: Vec<String> = row.iter().map(ToString::to_string).collect();
                Err(StoreError::rejected(
                    "verify_header",
                    ErrorCode::Schema,
                    format!(
                        "sheet '{}' has header [{}], expected [{}]",
                        layout.name,
                        found.join(", "),
                        header.join(", ")
                    ),
                ))
            }
        }
    }

    /// Data rows of a sheet, from cache when fresh.
    async fn sheet_rows(
        &self,
        layout: &SheetLayout,
        force_refresh: bool,
    ) -> StoreResult<Arc<Vec<Row>>> {
        self.ensure_ready().await?;

        let key = layout.cache_key("rows");
        if !force_refresh {
            if let Some(rows) = self.cache.get(&key) {
                return Ok(rows);
            }
        }

        let range = layout.data_range();
        let rows = self
            .retry
            .execute("read_range", || self.backend.read_range(&range))
            .await?;
        let rows = Arc::new(rows);
        self.cache.set(key, Arc::clone(&rows), self.ttl);
        Ok(rows)
    }

    fn invalidate(&self, layout: &SheetLayout) {
        let removed = self.cache.delete_by_prefix(&layout.cache_prefix());
        tracing::debug!(sheet = %layout.name, removed, "cache invalidated");
    }

    fn decode_rows(&self, rows: &[Row]) -> Vec<ReportRecord> {
        rows.iter()
            .enumerate()
            .filter(|(_, row)| !row.iter().all(Cell::is_blank))
            .filter_map(|(index, row)| match codec::decode_report(row) {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!(
                        sheet = %self.reports.name,
                        row = index + 2,
                        %error,
                        "skipping malformed report row"
                    );
                    None
                }
            })
            .collect()
    }

    async fn records(&self, force_refresh: bool) -> StoreResult<Vec<ReportRecord>> {
        let rows = self.sheet_rows(&self.reports, force_refresh).await?;
        Ok(self.decode_rows(&rows))
    }

    async fn user_records(&self, user_id: &str) -> StoreResult<Vec<ReportRecord>> {
        let mut records: Vec<ReportRecord> = self
            .records(false)
            .await?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by_key(|r| (r.week_number, r.date));
        Ok(records)
    }

    async fn upsert_user_summary(&self, layout: &SheetLayout, record: &ReportRecord) -> StoreResult<()> {
        let stats = self.get_user_stats(&record.user_id).await?;
        let summary = UserSummary::from_stats(&stats, &record.username, Utc::now());
        let row = codec::encode_user(&summary);

        let rows = self.sheet_rows(layout, true).await?;
        let existing = rows
            .iter()
            .position(|r| codec::user_row_id(r).as_deref() == Some(record.user_id.as_str()));

        match existing {
            Some(index) => {
                let range = layout.row_range(index);
                self.retry
                    .execute("update_user", || {
                        self.backend.write_range(&range, vec![row.clone()])
                    })
                    .await?;
            }
            None => {
                let range = layout.append_range();
                self.retry
                    .execute("append_user", || {
                        self.backend.append_rows(&range, vec![row.clone()])
                    })
                    .await?;
            }
        }
        self.invalidate(layout);
        Ok(())
    }
}

#[async_trait]
impl ReportStore for SheetsReportStore {
    async fn get_reports(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ReportRecord>> {
        let mut records = self.user_records(user_id).await?;
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
        Ok(records)
    }

    async fn all_reports(&self, force_refresh: bool) -> StoreResult<Vec<ReportRecord>> {
        self.records(force_refresh).await
    }

    async fn save_report(&self, draft: &DraftReport) -> StoreResult<ReportRecord> {
        let record = ReportRecord::from_draft(draft).map_err(|e| {
            StoreError::rejected("save_report", ErrorCode::InvalidArgument, e.to_string())
        })?;
        self.ensure_ready().await?;

        let row = codec::encode_report(&record);
        let range = self.reports.append_range();
        self.retry
            .execute("append_report", || {
                self.backend.append_rows(&range, vec![row.clone()])
            })
            .await?;
        self.invalidate(&self.reports);

        tracing::info!(
            user_id = %record.user_id,
            week = record.week_number,
            score = record.score.value(),
            completed = record.completed_tasks.len(),
            planned = record.planned_tasks.len(),
            "report saved"
        );

        if let Some(users) = &self.users {
            if let Err(error) = self.upsert_user_summary(users, &record).await {
                tracing::warn!(
                    user_id = %record.user_id,
                    %error,
                    "report saved but user summary was not updated"
                );
            }
        }

        Ok(record)
    }

    async fn get_user_stats(&self, user_id: &str) -> StoreResult<UserStats> {
        let records = self.user_records(user_id).await?;
        Ok(UserStats::from_records(user_id, &records))
    }

    async fn get_next_week_number(&self) -> StoreResult<u32> {
        let records = self.records(false).await?;
        Ok(records
            .iter()
            .map(|r| r.week_number)
            .max()
            .map_or(1, |max| max.saturating_add(1)))
    }

    async fn get_previous_week_plans(&self, week_number: u32) -> StoreResult<Vec<String>> {
        if week_number <= 1 {
            return Ok(Vec::new());
        }
        let records = self.records(false).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.week_number == week_number - 1)
            .last()
            .map(|r| r.planned_tasks)
            .unwrap_or_default())
    }

    async fn get_user_previous_week_plans(
        &self,
        user_id: &str,
        week_number: u32,
    ) -> StoreResult<Vec<String>> {
        if week_number <= 1 {
            return Ok(Vec::new());
        }
        let own = self
            .user_records(user_id)
            .await?
            .into_iter()
            .filter(|r| r.week_number == week_number - 1)
            .last();
        match own {
            Some(record) => Ok(record.planned_tasks),
            None => self.get_previous_week_plans(week_number).await,
        }
    }

    async fn has_report_for_week(&self, user_id: &str, week_number: u32) -> StoreResult<bool> {
        Ok(self
            .user_records(user_id)
            .await?
            .iter()
            .any(|r| r.week_number == week_number))
    }

    fn name(&self) -> &str {
        "sheets"
    }
}
