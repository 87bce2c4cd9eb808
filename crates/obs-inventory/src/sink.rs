//! Storage sink for inventory records and command telemetry.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{InventoryError, Result};
use crate::records::{HpssCmdResult, TarballFileMeta};

/// Durable destination for inventory output.
///
/// Implementations must accept concurrent calls from several sources.
/// Writes are append-only; deduplication across runs is left to the store.
#[async_trait]
pub trait InventorySink: Send + Sync {
    async fn insert_obs_inv_items(&self, items: &[TarballFileMeta]) -> Result<()>;

    async fn insert_hpss_cmd_result(&self, result: &HpssCmdResult) -> Result<()>;
}

/// In-memory sink, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<TarballFileMeta>>,
    cmd_results: Mutex<Vec<HpssCmdResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<TarballFileMeta> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn cmd_results(&self) -> Vec<HpssCmdResult> {
        self.cmd_results
            .lock()
            .map(|results| results.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InventorySink for MemorySink {
    async fn insert_obs_inv_items(&self, items: &[TarballFileMeta]) -> Result<()> {
        self.items
            .lock()
            .map_err(|_| InventoryError::Storage("memory sink poisoned".to_string()))?
            .extend_from_slice(items);
        Ok(())
    }

    async fn insert_hpss_cmd_result(&self, result: &HpssCmdResult) -> Result<()> {
        self.cmd_results
            .lock()
            .map_err(|_| InventoryError::Storage("memory sink poisoned".to_string()))?
            .push(result.clone());
        Ok(())
    }
}
