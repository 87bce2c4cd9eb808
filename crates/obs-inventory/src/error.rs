//! Error types for the inventory crate.

use thiserror::Error;

/// Errors that can occur while running an inventory search.
///
/// Command failures reported by the archive are not errors: they are
/// classified into [`crate::hpss::CommandStatus`] and recorded as telemetry.
/// This type covers the conditions that stop a run or reject input.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid search path template '{template}' for source '{source_key}'")]
    InvalidPathTemplate { source_key: String, template: String },

    #[error("Failed to parse tarball listing for {path}: {message}")]
    ListingParse { path: String, message: String },

    #[error("Command did not succeed (exit code {exit_code}); no listing to parse")]
    CommandNotSuccessful { exit_code: i32 },

    #[error("Failed to write to storage: {0}")]
    Storage(String),

    #[error("Unknown search source: {0}")]
    UnknownSource(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
