//! Remote spreadsheet backends addressed by A1 ranges.

pub mod grid;
pub mod http;
pub mod local;
pub mod memory;
pub mod traits;

pub use grid::{column_letters, Grid, RangeRef};
pub use http::HttpSheets;
pub use local::LocalSheets;
pub use memory::{InMemorySheets, SheetsCall};
pub use traits::{Cell, Row, SheetMetadata, SheetsBackend};

use crate::config::Config;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

/// Build the backend selected by `store.backend`.
pub fn create_backend(config: &Config) -> Result<Arc<dyn SheetsBackend>> {
    let store = &config.store;
    match store.backend.trim() {
        "memory" => Ok(Arc::new(InMemorySheets::new())),
        "local" => Ok(Arc::new(LocalSheets::new(
            config.workspace_path(&store.local_file),
        ))),
        "sheets" => {
            let spreadsheet_id = store
                .spreadsheet_id
                .as_deref()
                .context("store.spreadsheet_id is required for the sheets backend")?;
            let token = store
                .access_token
                .as_deref()
                .context("store.access_token is required for the sheets backend")?;
            Ok(Arc::new(HttpSheets::new(
                store.api_base_url.as_deref(),
                spreadsheet_id,
                token,
                store.request_timeout(),
            )))
        }
        other => bail!("Unknown store backend '{other}'. Supported: memory, local, sheets"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_each_backend() {
        let mut config = Config::default();

        config.store.backend = "memory".into();
        assert_eq!(create_backend(&config).unwrap().name(), "memory");

        config.store.backend = "local".into();
        assert_eq!(create_backend(&config).unwrap().name(), "local");

        config.store.backend = "sheets".into();
        assert!(create_backend(&config).is_err());
        config.store.spreadsheet_id = Some("id".into());
        config.store.access_token = Some("token".into());
        assert_eq!(create_backend(&config).unwrap().name(), "sheets");
    }

    #[test]
    fn factory_rejects_unknown_backend() {
        let mut config = Config::default();
        config.store.backend = "excel".into();
        let err = create_backend(&config).err().unwrap();
        assert!(err.to_string().contains("excel"));
    }
}
