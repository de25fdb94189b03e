use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "WEEKBOT_CONFIG_DIR";

pub const STORE_BACKENDS: &[&str] = &["memory", "local", "sheets"];
pub const SESSION_PERSISTENCE_MODES: &[&str] = &["none", "file"];

// ── Top-level config ──────────────────────────────────────────────

/// Top-level weekbot configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` / `WEEKBOT_CONFIG_DIR` → `~/.weekbot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Workspace directory - computed from the config dir, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Report storage (`[store]`).
    #[serde(default)]
    pub store: StoreConfig,

    /// Read-through cache in front of the store (`[cache]`).
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy for remote-store calls (`[retry]`).
    #[serde(default)]
    pub retry: RetryConfig,

    /// Conversation limits (`[dialogue]`).
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Session persistence (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Webhook gateway (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Telegram Bot API transport (`[telegram]`).
    #[serde(default)]
    pub telegram: TelegramConfig,
}

// ── Store ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// `"memory"`, `"local"` (JSON file in the workspace) or `"sheets"` (Google Sheets). Default: `"local"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Spreadsheet id for the `sheets` backend. Overridden by `WEEKBOT_SHEET_ID` or `GOOGLE_SHEET_ID`.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    /// OAuth bearer token for the `sheets` backend. Overridden by `WEEKBOT_SHEETS_TOKEN`.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Base URL of the Sheets API. Default: `https://sheets.googleapis.com/v4`.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_store_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Sheet that receives one row per submitted report.
    #[serde(default = "default_reports_sheet")]
    pub reports_sheet: String,
    /// Optional sheet with one aggregate row per user. Empty or absent disables it.
    #[serde(default = "default_users_sheet")]
    pub users_sheet: Option<String>,
    /// File for the `local` backend, relative to the workspace. Default: `sheets.json`.
    #[serde(default = "default_local_file")]
    pub local_file: String,
}

fn default_store_backend() -> String {
    "local".into()
}

fn default_store_request_timeout_secs() -> u64 {
    30
}

fn default_reports_sheet() -> String {
    "Reports".into()
}

#[allow(clippy::unnecessary_wraps)]
fn default_users_sheet() -> Option<String> {
    Some("Users".into())
}

fn default_local_file() -> String {
    "sheets.json".into()
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The users sheet name, if one is configured and non-empty.
    pub fn users_sheet(&self) -> Option<&str> {
        self.users_sheet
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            spreadsheet_id: None,
            access_token: None,
            api_base_url: None,
            request_timeout_secs: default_store_request_timeout_secs(),
            reports_sheet: default_reports_sheet(),
            users_sheet: default_users_sheet(),
            local_file: default_local_file(),
        }
    }
}

// ── Cache ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// Lifetime of cached sheet reads in seconds. Default: `300`.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval of the background sweep that drops expired entries. Default: `60`.
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_cache_sweep_interval_secs(),
        }
    }
}

// ── Retry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1). Default: `3`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds. Default: `500`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per retry. Default: `2.0`.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for a single delay in milliseconds. Default: `10000`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the computed delay (0.0–1.0). Default: `0.3`.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter_ratio() -> f64 {
    0.3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

// ── Dialogue ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DialogueConfig {
    /// Maximum comment length in characters. Default: `1000`.
    #[serde(default = "default_max_comment_chars")]
    pub max_comment_chars: usize,
    /// Maximum length of a single task line. Default: `300`.
    #[serde(default = "default_max_task_chars")]
    pub max_task_chars: usize,
    /// Maximum number of tasks per list. Default: `30`.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    /// Reports shown by `/history`. Default: `5`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Upper bound for handling one update, in seconds. Default: `30`.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

fn default_max_comment_chars() -> usize {
    1000
}

fn default_max_task_chars() -> usize {
    300
}

fn default_max_tasks() -> usize {
    30
}

fn default_history_limit() -> usize {
    5
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

impl DialogueConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_comment_chars: default_max_comment_chars(),
            max_task_chars: default_max_task_chars(),
            max_tasks: default_max_tasks(),
            history_limit: default_history_limit(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionsConfig {
    /// `"none"` keeps sessions in memory only; `"file"` also writes snapshots to disk.
    #[serde(default = "default_session_persistence")]
    pub persistence: String,
    /// Snapshot directory for `file` persistence, relative to the workspace. Default: `sessions`.
    #[serde(default = "default_sessions_dir")]
    pub dir: String,
}

fn default_session_persistence() -> String {
    "none".into()
}

fn default_sessions_dir() -> String {
    "sessions".into()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            persistence: default_session_persistence(),
            dir: default_sessions_dir(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway port (default: 8080)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Shared secret expected in `X-Telegram-Bot-Api-Secret-Token`. Overridden by `WEEKBOT_WEBHOOK_SECRET`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            webhook_secret: None,
        }
    }
}

// ── Telegram ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TelegramConfig {
    /// Bot token from @BotFather. Overridden by `WEEKBOT_TELEGRAM_TOKEN` or `TELEGRAM_TOKEN`.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Bot API base URL. Default: `https://api.telegram.org`.
    #[serde(default)]
    pub api_base_url: Option<String>,
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let weekbot_dir = home.join(".weekbot");

        Self {
            workspace_dir: weekbot_dir.join("workspace"),
            config_path: weekbot_dir.join(CONFIG_FILE_NAME),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            dialogue: DialogueConfig::default(),
            sessions: SessionsConfig::default(),
            gateway: GatewayConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".weekbot"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    default_config_dir()
}

impl Config {
    /// Load `config.toml` from the resolved config directory, writing defaults
    /// on first run.
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        let mut config = Self::load_or_init_at(&config_dir).await?;
        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            workspace = %config.workspace_dir.display(),
            backend = %config.store.backend,
            "Config loaded"
        );
        Ok(config)
    }

    /// Load or create the config in `config_dir` without env overrides.
    pub async fn load_or_init_at(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let workspace_dir = config_dir.join("workspace");

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;
        fs::create_dir_all(&workspace_dir)
            .await
            .context("Failed to create workspace directory")?;

        if config_path.exists() {
            // Warn if config file is world-readable (may contain tokens)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.workspace_dir = workspace_dir;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.workspace_dir = workspace_dir;
            config.save().await?;

            // Restrict permissions on newly created config file (may contain tokens)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            tracing::info!(path = %config.config_path.display(), "Wrote default config");
            Ok(config)
        }
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Called after TOML deserialization and env-override application to catch
    /// obviously invalid values early instead of failing mid-conversation.
    pub fn validate(&self) -> Result<()> {
        // Store
        let backend = self.store.backend.trim();
        if !STORE_BACKENDS.contains(&backend) {
            anyhow::bail!(
                "store.backend '{backend}' is not supported; expected one of {}",
                STORE_BACKENDS.join(", ")
            );
        }
        if backend == "sheets" {
            if blank(self.store.spreadsheet_id.as_deref()) {
                anyhow::bail!("store.backend = \"sheets\" requires store.spreadsheet_id");
            }
            if blank(self.store.access_token.as_deref()) {
                anyhow::bail!("store.backend = \"sheets\" requires store.access_token");
            }
        }
        if self.store.reports_sheet.trim().is_empty() {
            anyhow::bail!("store.reports_sheet must not be empty");
        }
        if self.store.users_sheet() == Some(self.store.reports_sheet.trim()) {
            anyhow::bail!("store.users_sheet must differ from store.reports_sheet");
        }
        if self.store.request_timeout_secs == 0 {
            anyhow::bail!("store.request_timeout_secs must be greater than 0");
        }

        // Cache
        if self.cache.sweep_interval_secs == 0 {
            anyhow::bail!("cache.sweep_interval_secs must be greater than 0");
        }

        // Retry
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            anyhow::bail!("retry.backoff_factor must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            anyhow::bail!("retry.jitter_ratio must be between 0.0 and 1.0");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            anyhow::bail!("retry.max_delay_ms must not be smaller than retry.base_delay_ms");
        }

        // Dialogue
        for (field, value) in [
            ("dialogue.max_comment_chars", self.dialogue.max_comment_chars),
            ("dialogue.max_task_chars", self.dialogue.max_task_chars),
            ("dialogue.max_tasks", self.dialogue.max_tasks),
            ("dialogue.history_limit", self.dialogue.history_limit),
        ] {
            if value == 0 {
                anyhow::bail!("{field} must be greater than 0");
            }
        }
        if self.dialogue.dispatch_timeout_secs == 0 {
            anyhow::bail!("dialogue.dispatch_timeout_secs must be greater than 0");
        }

        // Sessions
        let persistence = self.sessions.persistence.trim();
        if !SESSION_PERSISTENCE_MODES.contains(&persistence) {
            anyhow::bail!(
                "sessions.persistence '{persistence}' is not supported; expected one of {}",
                SESSION_PERSISTENCE_MODES.join(", ")
            );
        }

        // Gateway
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .find(|value| !value.trim().is_empty())
        };

        // Telegram token: WEEKBOT_TELEGRAM_TOKEN or TELEGRAM_TOKEN
        if let Some(token) = first(&["WEEKBOT_TELEGRAM_TOKEN", "TELEGRAM_TOKEN"]) {
            self.telegram.bot_token = Some(token);
        }

        // Spreadsheet: WEEKBOT_SHEET_ID or GOOGLE_SHEET_ID
        if let Some(id) = first(&["WEEKBOT_SHEET_ID", "GOOGLE_SHEET_ID"]) {
            self.store.spreadsheet_id = Some(id);
        }

        if let Some(token) = first(&["WEEKBOT_SHEETS_TOKEN"]) {
            self.store.access_token = Some(token);
        }

        if let Some(backend) = first(&["WEEKBOT_STORE_BACKEND"]) {
            self.store.backend = backend.trim().to_ascii_lowercase();
        }

        if let Some(secret) = first(&["WEEKBOT_WEBHOOK_SECRET"]) {
            self.gateway.webhook_secret = Some(secret);
        }

        // Gateway port: WEEKBOT_GATEWAY_PORT or PORT
        if let Some(port) = first(&["WEEKBOT_GATEWAY_PORT", "PORT"]) {
            if let Ok(port) = port.trim().parse::<u16>() {
                self.gateway.port = port;
            }
        }

        // Gateway host: WEEKBOT_GATEWAY_HOST or HOST
        if let Some(host) = first(&["WEEKBOT_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }

    /// Resolve a workspace-relative path from config.
    pub fn workspace_path(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_dir.join(path)
        }
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.store.backend, "local");
        assert_eq!(c.store.reports_sheet, "Reports");
        assert_eq!(c.store.users_sheet(), Some("Users"));
        assert_eq!(c.cache.ttl(), Duration::from_secs(300));
        assert_eq!(c.retry.max_retries, 3);
        assert!((c.retry.jitter_ratio - 0.3).abs() < f64::EPSILON);
        assert_eq!(c.dialogue.max_comment_chars, 1000);
        assert!(c.workspace_dir.to_string_lossy().contains("workspace"));
        c.validate().unwrap();
    }

    #[test]
    fn config_minimal_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[store]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(parsed.store.backend, "memory");
        assert_eq!(parsed.store.reports_sheet, "Reports");
        assert_eq!(parsed.cache.sweep_interval_secs, 60);
        assert_eq!(parsed.retry.base_delay_ms, 500);
        assert_eq!(parsed.sessions.persistence, "none");
        assert_eq!(parsed.gateway.port, 8080);
        assert!(parsed.telegram.bot_token.is_none());
    }

    #[test]
    fn empty_users_sheet_disables_it() {
        let parsed: Config = toml::from_str("[store]\nusers_sheet = \"\"\n").unwrap();
        assert_eq!(parsed.store.users_sheet(), None);
    }

    // ── Validation ───────────────────────────────────────────

    #[test]
    fn sheets_backend_requires_credentials() {
        let mut c = Config::default();
        c.store.backend = "sheets".into();
        assert!(c.validate().is_err());

        c.store.spreadsheet_id = Some("abc".into());
        assert!(c.validate().is_err());

        c.store.access_token = Some("ya29.x".into());
        c.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_backend_and_persistence() {
        let mut c = Config::default();
        c.store.backend = "postgres".into();
        assert!(c.validate().unwrap_err().to_string().contains("store.backend"));

        let mut c = Config::default();
        c.sessions.persistence = "redis".into();
        assert!(c.validate().unwrap_err().to_string().contains("sessions.persistence"));
    }

    #[test]
    fn rejects_bad_retry_values() {
        let mut c = Config::default();
        c.retry.backoff_factor = 0.5;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.retry.jitter_ratio = 1.5;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.retry.max_delay_ms = 10;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let mut c = Config::default();
        c.dialogue.max_comment_chars = 0;
        assert!(c
            .validate()
            .unwrap_err()
            .to_string()
            .contains("dialogue.max_comment_chars"));
    }

    #[test]
    fn rejects_same_users_and_reports_sheet() {
        let mut c = Config::default();
        c.store.users_sheet = Some("Reports".into());
        assert!(c.validate().is_err());
    }

    // ── Env overrides ────────────────────────────────────────

    #[test]
    fn overrides_apply_with_fallback_names() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TELEGRAM_TOKEN", "123:abc"),
            ("GOOGLE_SHEET_ID", "sheet-1"),
            ("WEEKBOT_STORE_BACKEND", " Sheets "),
            ("PORT", "9000"),
            ("WEEKBOT_GATEWAY_HOST", "0.0.0.0"),
        ]);
        let mut c = Config::default();
        c.apply_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(c.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(c.store.spreadsheet_id.as_deref(), Some("sheet-1"));
        assert_eq!(c.store.backend, "sheets");
        assert_eq!(c.gateway.port, 9000);
        assert_eq!(c.gateway.host, "0.0.0.0");
    }

    #[test]
    fn prefixed_override_wins_and_blank_is_ignored() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WEEKBOT_TELEGRAM_TOKEN", "primary"),
            ("TELEGRAM_TOKEN", "legacy"),
            ("WEEKBOT_SHEET_ID", "   "),
            ("PORT", "not-a-port"),
        ]);
        let mut c = Config::default();
        c.apply_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(c.telegram.bot_token.as_deref(), Some("primary"));
        assert!(c.store.spreadsheet_id.is_none());
        assert_eq!(c.gateway.port, 8080);
    }

    // ── Persistence ──────────────────────────────────────────

    #[tokio::test]
    async fn load_or_init_writes_defaults_then_reloads_edits() {
        let dir = TempDir::new().unwrap();

        let config = Config::load_or_init_at(dir.path()).await.unwrap();
        assert!(config.config_path.exists());
        assert!(config.workspace_dir.is_dir());

        let mut edited = config.clone();
        edited.store.backend = "memory".into();
        edited.dialogue.history_limit = 9;
        edited.save().await.unwrap();

        let reloaded = Config::load_or_init_at(dir.path()).await.unwrap();
        assert_eq!(reloaded.store.backend, "memory");
        assert_eq!(reloaded.dialogue.history_limit, 9);
        assert!(!dir.path().join("config.toml.bak").exists());
    }

    #[test]
    fn workspace_path_resolves_relative_and_absolute() {
        let mut c = Config::default();
        c.workspace_dir = PathBuf::from("/srv/weekbot/workspace");
        assert_eq!(
            c.workspace_path("sheets.json"),
            PathBuf::from("/srv/weekbot/workspace/sheets.json")
        );
        assert_eq!(c.workspace_path("/data/s.json"), PathBuf::from("/data/s.json"));
    }

    #[test]
    fn schema_exports() {
        let schema = schemars::schema_for!(Config);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json["properties"]["store"].is_object());
    }
}
