//! Spreadsheet persisted as a JSON document in the workspace.
//!
//! Good enough for a single-user deployment or a demo without cloud access.
//! Every mutation rewrites the file through a temp file and rename.

use super::grid::{Grid, RangeRef};
use super::traits::{Row, SheetMetadata, SheetsBackend};
use crate::retry::{ErrorCode, RemoteError};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

pub struct LocalSheets {
    path: PathBuf,
    grid: Mutex<Option<Grid>>,
}

impl LocalSheets {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            grid: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Grid, RemoteError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                RemoteError::new(
                    ErrorCode::Schema,
                    format!("corrupt sheet file {}: {e}", self.path.display()),
                )
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Grid::default()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    async fn persist(&self, grid: &Grid) -> Result<(), RemoteError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, &e))?;

        let body = serde_json::to_string_pretty(grid)
            .map_err(|e| RemoteError::new(ErrorCode::Unknown, e.to_string()))?;
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sheets.json");
        let temp = parent.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        fs::write(&temp, body)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error(&self.path, &e));
        }
        Ok(())
    }

    async fn mutate(&self, f: impl FnOnce(&mut Grid)) -> Result<(), RemoteError> {
        let mut slot = self.grid.lock().await;
        let mut grid = match slot.take() {
            Some(grid) => grid,
            None => self.load().await?,
        };
        f(&mut grid);
        let result = self.persist(&grid).await;
        *slot = Some(grid);
        result
    }

    async fn snapshot(&self) -> Result<Grid, RemoteError> {
        let mut slot = self.grid.lock().await;
        if let Some(grid) = slot.as_ref() {
            return Ok(grid.clone());
        }
        let grid = self.load().await?;
        *slot = Some(grid.clone());
        Ok(grid)
    }
}

fn io_error(path: &Path, error: &io::Error) -> RemoteError {
    let code = match error.kind() {
        io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
        io::ErrorKind::TimedOut => ErrorCode::Timeout,
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => ErrorCode::Unavailable,
        _ => ErrorCode::Unknown,
    };
    RemoteError::new(code, format!("{}: {error}", path.display()))
}

#[async_trait]
impl SheetsBackend for LocalSheets {
    async fn read_range(&self, range: &str) -> Result<Vec<Row>, RemoteError> {
        let range = RangeRef::parse(range)?;
        Ok(self.snapshot().await?.read(&range))
    }

    async fn write_range(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        let range = RangeRef::parse(range)?;
        self.mutate(|grid| grid.write(&range, rows)).await
    }

    async fn append_rows(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        let range = RangeRef::parse(range)?;
        self.mutate(|grid| grid.append(&range, rows)).await
    }

    async fn probe(&self) -> Result<SheetMetadata, RemoteError> {
        let grid = self.snapshot().await?;
        let title = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("local")
            .to_string();
        Ok(SheetMetadata {
            title,
            sheets: grid.sheet_names(),
        })
    }

    fn name(&self) -> &str {
        "local"
    }
}
