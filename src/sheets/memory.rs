//! In-memory spreadsheet backend with fault injection for tests.

use super::grid::{Grid, RangeRef};
use super::traits::{Row, SheetMetadata, SheetsBackend};
use crate::retry::{ErrorCode, RemoteError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// Which backend call a counter or injected fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetsCall {
    Read,
    Write,
    Append,
    Probe,
}

#[derive(Debug, Default)]
struct CallCounters {
    read: AtomicU32,
    write: AtomicU32,
    append: AtomicU32,
    probe: AtomicU32,
}

impl CallCounters {
    fn slot(&self, call: SheetsCall) -> &AtomicU32 {
        match call {
            SheetsCall::Read => &self.read,
            SheetsCall::Write => &self.write,
            SheetsCall::Append => &self.append,
            SheetsCall::Probe => &self.probe,
        }
    }
}

/// Spreadsheet kept entirely in process memory.
pub struct InMemorySheets {
    title: String,
    grid: Mutex<Grid>,
    faults: Mutex<VecDeque<(Option<SheetsCall>, ErrorCode)>>,
    calls: CallCounters,
}

impl InMemorySheets {
    pub fn new() -> Self {
        Self::with_title("weekbot")
    }

    pub fn with_title(title: &str) -> Self {
        Self {
            title: title.to_string(),
            grid: Mutex::new(Grid::default()),
            faults: Mutex::new(VecDeque::new()),
            calls: CallCounters::default(),
        }
    }

    /// Make the next `times` calls of any kind fail with `code`.
    pub fn fail_next(&self, code: ErrorCode, times: usize) {
        let mut faults = self.faults.lock();
        faults.extend(std::iter::repeat((None, code)).take(times));
    }

    /// Make the next `times` calls of kind `call` fail with `code`.
    pub fn fail_next_call(&self, call: SheetsCall, code: ErrorCode, times: usize) {
        let mut faults = self.faults.lock();
        faults.extend(std::iter::repeat((Some(call), code)).take(times));
    }

    pub fn calls(&self, call: SheetsCall) -> u32 {
        self.calls.slot(call).load(Ordering::SeqCst)
    }

    /// Copy of every row in `sheet`, header included.
    pub fn rows(&self, sheet: &str) -> Vec<Row> {
        self.grid.lock().rows(sheet).to_vec()
    }

    /// Seed rows directly, bypassing fault injection and counters.
    pub fn seed(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        let range = RangeRef::parse(range)?;
        self.grid.lock().write(&range, rows);
        Ok(())
    }

    fn enter(&self, call: SheetsCall) -> Result<(), RemoteError> {
        self.calls.slot(call).fetch_add(1, Ordering::SeqCst);
        let mut faults = self.faults.lock();
        let position = faults
            .iter()
            .position(|(target, _)| target.map_or(true, |t| t == call));
        if let Some(index) = position {
            if let Some((_, code)) = faults.remove(index) {
                return Err(RemoteError::new(code, format!("injected {code} fault")));
            }
        }
        Ok(())
    }
}

impl Default for InMemorySheets {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetsBackend for InMemorySheets {
    async fn read_range(&self, range: &str) -> Result<Vec<Row>, RemoteError> {
        self.enter(SheetsCall::Read)?;
        let range = RangeRef::parse(range)?;
        Ok(self.grid.lock().read(&range))
    }

    async fn write_range(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        self.enter(SheetsCall::Write)?;
        let range = RangeRef::parse(range)?;
        self.grid.lock().write(&range, rows);
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        self.enter(SheetsCall::Append)?;
        let range = RangeRef::parse(range)?;
        self.grid.lock().append(&range, rows);
        Ok(())
    }

    async fn probe(&self) -> Result<SheetMetadata, RemoteError> {
        self.enter(SheetsCall::Probe)?;
        Ok(SheetMetadata {
            title: self.title.clone(),
            sheets: self.grid.lock().sheet_names(),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
