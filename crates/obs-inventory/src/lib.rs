//! Observation archive inventory.
//!
//! Walks per-source date ranges over tarballs archived on HPSS, inspects
//! each day's tarball, parses the member filenames into structured metadata
//! and hands the resulting records, together with telemetry for every
//! archive command, to a storage sink.
//!
//! # Architecture
//!
//! - [`filename`]: the filename grammar (prefix, cycle tag, data type,
//!   format, suffix, restriction marker)
//! - [`hpss`]: the archive command client and `htar` listing parser
//! - [`progress`]: per-source date cursor and search state
//! - [`listing`]: tarball contents to inventory records
//! - [`engine`]: round-robin orchestration with bounded concurrency
//! - [`sink`]: the storage seam

pub mod config;
pub mod engine;
pub mod error;
pub mod filename;
pub mod hpss;
pub mod listing;
pub mod progress;
pub mod records;
pub mod sink;

// Re-exports
pub use config::{
    EngineConfig, FailurePolicy, NceplibsCommand, ObservationsConfig, SearchConfig, SourceConfig,
};
pub use engine::{SearchEngine, SearchSummary, SourceSummary};
pub use error::{InventoryError, Result};
pub use filename::{parse_filename, DataFormat, FilenameMeta};
pub use hpss::{
    ArchiveClient, ArchiveTransport, ClientConfig, CommandRequest, CommandStatus, HpssCommandKind,
    RawResponse, TarballContents, TransportOutput,
};
pub use listing::process_inspect_tarball_resp;
pub use progress::{DateRange, SearchProgress, SearchState};
pub use records::{HpssCmdResult, TarballFileMeta};
pub use sink::{InventorySink, MemorySink};
