//! Inventory persistence using SQLite with sqlx.
//!
//! Both tables are append-only: every run adds rows, and repeated runs over
//! the same days produce repeated rows. Consumers deduplicate on
//! `(filename, parent_dir, obs_day)`.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use obs_inventory::{HpssCmdResult, InventoryError, InventorySink, TarballFileMeta};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS obs_inventory (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        parent_dir TEXT NOT NULL,
        platform TEXT NOT NULL,
        s3_bucket TEXT,
        prefix TEXT,
        cycle_tag TEXT,
        data_type TEXT,
        cycle_time INTEGER,
        obs_day TEXT NOT NULL,
        data_format TEXT NOT NULL,
        suffix TEXT,
        nr_tag BOOLEAN NOT NULL,
        file_size INTEGER NOT NULL,
        permissions TEXT NOT NULL,
        last_modified TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        latency_secs REAL NOT NULL,
        inserted_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_obs_inventory_file_day ON obs_inventory(filename, obs_day)",
    r#"
    CREATE TABLE IF NOT EXISTS hpss_cmd_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        command TEXT NOT NULL,
        arg0 TEXT NOT NULL,
        raw_output TEXT NOT NULL,
        raw_error TEXT NOT NULL,
        error_code INTEGER NOT NULL,
        obs_day TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        latency_secs REAL NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hpss_cmd_results_command ON hpss_cmd_results(command)",
];

/// Inventory records and command telemetry stored in SQLite.
pub struct SqliteInventoryStore {
    pool: SqlitePool,
}

impl SqliteInventoryStore {
    /// Open or create the inventory database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        init_schema(&pool).await?;
        info!(path = %path.display(), "Opened inventory database");

        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // a second connection would see a different in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn get_stats(&self) -> Result<InventoryStats> {
        let records: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM obs_inventory")
            .fetch_one(&self.pool)
            .await?;

        let total_bytes: (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(file_size), 0) FROM obs_inventory")
                .fetch_one(&self.pool)
                .await?;

        let commands: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hpss_cmd_results")
            .fetch_one(&self.pool)
            .await?;

        let failed_commands: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM hpss_cmd_results WHERE error_code != 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(InventoryStats {
            records: records.0 as u64,
            total_bytes: total_bytes.0 as u64,
            commands: commands.0 as u64,
            failed_commands: failed_commands.0 as u64,
        })
    }

    /// Filenames recorded for one observation day, in insertion order.
    #[cfg(test)]
    pub async fn filenames_for_day(&self, obs_day: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT filename FROM obs_inventory WHERE obs_day = ? ORDER BY id")
                .bind(obs_day)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn insert_items(&self, items: &[TarballFileMeta]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO obs_inventory (
                    filename, parent_dir, platform, s3_bucket, prefix, cycle_tag,
                    data_type, cycle_time, obs_day, data_format, suffix, nr_tag,
                    file_size, permissions, last_modified, submitted_at,
                    latency_secs, inserted_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.filename)
            .bind(&item.parent_dir)
            .bind(&item.platform)
            .bind(&item.s3_bucket)
            .bind(&item.prefix)
            .bind(&item.cycle_tag)
            .bind(&item.data_type)
            .bind(item.cycle_time)
            .bind(obs_day_key(item.obs_day))
            .bind(item.data_format.as_str())
            .bind(&item.suffix)
            .bind(item.nr_tag)
            .bind(item.file_size as i64)
            .bind(&item.permissions)
            .bind(item.last_modified.to_rfc3339())
            .bind(item.submitted_at.to_rfc3339())
            .bind(item.latency.as_secs_f64())
            .bind(item.inserted_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = items.len(), "Inserted inventory records");
        Ok(())
    }

    async fn insert_cmd_result(&self, result: &HpssCmdResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hpss_cmd_results (
                command, arg0, raw_output, raw_error, error_code, obs_day,
                submitted_at, latency_secs
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.command)
        .bind(&result.arg0)
        .bind(&result.raw_output)
        .bind(&result.raw_error)
        .bind(result.error_code)
        .bind(obs_day_key(result.obs_day))
        .bind(result.submitted_at.to_rfc3339())
        .bind(result.latency.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Observation days are stored as `YYYY-MM-DD`.
pub fn obs_day_key(day: chrono::DateTime<chrono::Utc>) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl InventorySink for SqliteInventoryStore {
    async fn insert_obs_inv_items(&self, items: &[TarballFileMeta]) -> obs_inventory::Result<()> {
        self.insert_items(items)
            .await
            .map_err(|e| InventoryError::Storage(format!("obs_inventory: {:#}", e)))
    }

    async fn insert_hpss_cmd_result(&self, result: &HpssCmdResult) -> obs_inventory::Result<()> {
        self.insert_cmd_result(result)
            .await
            .map_err(|e| InventoryError::Storage(format!("hpss_cmd_results: {:#}", e)))
    }
}

/// Row counts across both tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryStats {
    pub records: u64,
    pub total_bytes: u64,
    pub commands: u64,
    pub failed_commands: u64,
}
