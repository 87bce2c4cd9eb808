//! Records emitted to the storage sink.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filename::DataFormat;
use crate::hpss::RawResponse;

/// Inventory entry for one file inside one inspected tarball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TarballFileMeta {
    pub filename: String,
    pub parent_dir: String,
    pub platform: String,
    pub s3_bucket: Option<String>,
    pub prefix: Option<String>,
    pub cycle_tag: Option<String>,
    pub data_type: Option<String>,
    pub cycle_time: Option<i64>,
    /// Day the enclosing tarball represents.
    pub obs_day: DateTime<Utc>,
    pub data_format: DataFormat,
    pub suffix: Option<String>,
    pub nr_tag: bool,
    pub file_size: u64,
    pub permissions: String,
    pub last_modified: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub latency: Duration,
    pub inserted_at: DateTime<Utc>,
}

/// Telemetry for one archive command attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpssCmdResult {
    pub command: String,
    pub arg0: String,
    pub raw_output: String,
    pub raw_error: String,
    pub error_code: i32,
    pub obs_day: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub latency: Duration,
}

impl HpssCmdResult {
    pub fn from_response(response: &RawResponse, obs_day: DateTime<Utc>) -> Self {
        Self {
            command: response.command.clone(),
            arg0: response.arg0.clone(),
            raw_output: response.output.clone(),
            raw_error: response.error.clone(),
            error_code: response.return_code,
            obs_day,
            submitted_at: response.submitted_at,
            latency: response.latency,
        }
    }
}
