//! Archive command client for the HPSS tape archive.
//!
//! The client sends one command for one search path through an
//! [`ArchiveTransport`], measures its latency, and classifies the outcome
//! as success, transient failure (eligible for retry) or permanent failure.
//! The transport itself (running `htar`, or a scripted stand-in for tests)
//! is outside this module.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::error::{InventoryError, Result};

/// Recorded when a send exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Recorded when the command could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;
/// Recorded when the command was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

const HTAR_LINE_PREFIX: &str = "HTAR:";
const LISTING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Commands the inventory issues against the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HpssCommandKind {
    /// List the members of a tarball without extracting it.
    InspectTarball,
}

impl HpssCommandKind {
    pub fn program(&self) -> &'static str {
        match self {
            Self::InspectTarball => "htar",
        }
    }

    pub fn base_args(&self) -> &'static [&'static str] {
        match self {
            Self::InspectTarball => &["-tvf"],
        }
    }

    /// Command name as recorded in telemetry.
    pub fn name(&self) -> String {
        let mut name = self.program().to_string();
        for arg in self.base_args() {
            name.push(' ');
            name.push_str(arg);
        }
        name
    }
}

/// A command ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub kind: HpssCommandKind,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn inspect_tarball(path: &str) -> Self {
        Self {
            kind: HpssCommandKind::InspectTarball,
            args: vec![path.to_string()],
        }
    }

    pub fn arg0(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

/// What a transport returns for one executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Executes archive commands.
///
/// An `Err` means the command could not be run at all (binary missing,
/// permission denied); a command that ran and failed is an `Ok` with a
/// non-zero exit code.
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    async fn execute(&self, request: &CommandRequest) -> std::io::Result<TransportOutput>;
}

/// Outcome class of one command attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Success,
    /// Archive busy or timed out; the same day may be retried later.
    Transient,
    /// Path not found, authorization, bad argument; retrying will not help.
    Permanent,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

/// Raw result of one command attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub command: String,
    pub arg0: String,
    pub output: String,
    pub error: String,
    pub return_code: i32,
    pub submitted_at: DateTime<Utc>,
    pub latency: Duration,
    pub status: CommandStatus,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    pub fn can_retry(&self) -> bool {
        self.status == CommandStatus::Transient
    }

    /// Parse the output of a successful tarball inspection.
    ///
    /// Malformed entry lines are collected in
    /// [`TarballContents::rejected`] without affecting their siblings. The
    /// listing as a whole is rejected only when it has entry lines and none
    /// of them parse.
    pub fn parse_tarball_contents(&self, observation_day: DateTime<Utc>) -> Result<TarballContents> {
        if !self.is_success() {
            return Err(InventoryError::CommandNotSuccessful {
                exit_code: self.return_code,
            });
        }

        let (inspected_files, rejected) = parse_listing(&self.output);

        if inspected_files.is_empty() && !rejected.is_empty() {
            return Err(InventoryError::ListingParse {
                path: self.arg0.clone(),
                message: format!("all {} entries malformed, first: {}", rejected.len(), rejected[0]),
            });
        }

        Ok(TarballContents {
            parent_dir: self.arg0.clone(),
            observation_day,
            inspected_files,
            rejected,
            submitted_at: self.submitted_at,
            latency: self.latency,
        })
    }
}

/// One member of an inspected tarball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedFile {
    pub name: String,
    /// Directory of the member inside the tarball, if any.
    pub member_dir: Option<String>,
    pub size: u64,
    pub permissions: String,
    pub owner: String,
    pub last_modified: DateTime<Utc>,
}

/// A listing line that looked like a file entry but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: '{line}'")]
pub struct ListingEntryError {
    pub line: String,
    pub reason: String,
}

/// Parsed contents of one tarball.
#[derive(Debug, Clone, PartialEq)]
pub struct TarballContents {
    pub parent_dir: String,
    pub observation_day: DateTime<Utc>,
    pub inspected_files: Vec<InspectedFile>,
    pub rejected: Vec<ListingEntryError>,
    pub submitted_at: DateTime<Utc>,
    pub latency: Duration,
}

/// Parse `htar -tvf` output into file entries and rejected lines.
///
/// Entry lines look like
/// `HTAR: -rw-r--r--  nwprod/rstprod  104857 2020-01-02 03:41  ./gdas.t00z.prepbufr.nr`.
/// Informational lines (`HTAR: Listing complete ...`, `HTAR: HTAR SUCCESSFUL`)
/// and entries that are not regular files are skipped.
pub fn parse_listing(output: &str) -> (Vec<InspectedFile>, Vec<ListingEntryError>) {
    let mut files = Vec::new();
    let mut rejected = Vec::new();

    for raw in output.lines() {
        let line = raw.trim();
        let body = line
            .strip_prefix(HTAR_LINE_PREFIX)
            .map(str::trim_start)
            .unwrap_or(line);

        let Some(mode) = body.split_whitespace().next() else {
            continue;
        };
        if !looks_like_mode(mode) {
            continue;
        }
        if !mode.starts_with('-') {
            debug!(line = %line, "Skipping non-file listing entry");
            continue;
        }

        match parse_entry(body) {
            Ok(file) => files.push(file),
            Err(reason) => rejected.push(ListingEntryError {
                line: line.to_string(),
                reason,
            }),
        }
    }

    (files, rejected)
}

/// `drwxr-xr-x`, `-rw-r-----` and friends.
fn looks_like_mode(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 10
        && b"-dlbcps".contains(&bytes[0])
        && bytes[1..].iter().all(|b| b"rwxsStT-".contains(b))
}

fn parse_entry(body: &str) -> std::result::Result<InspectedFile, String> {
    let (fields, member) =
        split_fields(body, 5).ok_or_else(|| "truncated entry".to_string())?;
    let [permissions, owner, size, date, time] = [fields[0], fields[1], fields[2], fields[3], fields[4]];

    let size: u64 = size
        .parse()
        .map_err(|_| format!("invalid size '{}'", size))?;

    let last_modified = NaiveDateTime::parse_from_str(
        &format!("{} {}", date, time),
        LISTING_TIMESTAMP_FORMAT,
    )
    .map(|naive| Utc.from_utc_datetime(&naive))
    .map_err(|_| format!("invalid timestamp '{} {}'", date, time))?;

    let member = member.strip_prefix("./").unwrap_or(member);
    if member.is_empty() {
        return Err("missing member name".to_string());
    }
    let (member_dir, name) = match member.rsplit_once('/') {
        Some((dir, name)) => (Some(dir.to_string()), name),
        None => (None, member),
    };
    if name.is_empty() {
        return Err("missing member name".to_string());
    }

    Ok(InspectedFile {
        name: name.to_string(),
        member_dir,
        size,
        permissions: permissions.to_string(),
        owner: owner.to_string(),
        last_modified,
    })
}

/// Split off `n` whitespace-separated fields, returning them and the
/// remainder of the line (which may itself contain spaces).
fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields, rest.trim_end()))
}

/// Client settings resolved from the engine configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-send timeout. A timeout is a transient failure.
    pub timeout: Duration,
    /// Exit codes that indicate a transient archive condition.
    pub transient_codes: HashSet<i32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            transient_codes: crate::config::default_transient_codes().into_iter().collect(),
        }
    }
}

/// Sends archive commands and classifies their outcome.
pub struct ArchiveClient {
    transport: Arc<dyn ArchiveTransport>,
    config: ClientConfig,
}

impl ArchiveClient {
    pub fn new(transport: Arc<dyn ArchiveTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Classify the exit code of a command that ran to completion.
    pub fn classify(&self, exit_code: i32) -> CommandStatus {
        if exit_code == 0 {
            CommandStatus::Success
        } else if exit_code == TIMEOUT_EXIT_CODE || self.config.transient_codes.contains(&exit_code)
        {
            CommandStatus::Transient
        } else {
            CommandStatus::Permanent
        }
    }

    /// Send one command for one search path.
    ///
    /// Never returns an error: spawn failures and timeouts are folded into
    /// the response as permanent and transient failures respectively.
    #[instrument(skip(self), fields(command = %request.kind.name(), path = %request.arg0()))]
    pub async fn send(&self, request: &CommandRequest) -> RawResponse {
        let submitted_at = Utc::now();
        let started = Instant::now();

        let result = tokio::time::timeout(self.config.timeout, self.transport.execute(request)).await;
        let latency = started.elapsed();

        let (output, error, return_code, status) = match result {
            Ok(Ok(out)) => {
                let code = out.exit_code.unwrap_or(SIGNAL_EXIT_CODE);
                (out.stdout, out.stderr, code, self.classify(code))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to start archive command");
                (
                    String::new(),
                    e.to_string(),
                    SPAWN_FAILURE_EXIT_CODE,
                    CommandStatus::Permanent,
                )
            }
            Err(_) => {
                warn!(timeout_secs = self.config.timeout.as_secs(), "Archive command timed out");
                (
                    String::new(),
                    format!("command timed out after {}s", self.config.timeout.as_secs()),
                    TIMEOUT_EXIT_CODE,
                    CommandStatus::Transient,
                )
            }
        };

        info!(
            exit_code = return_code,
            status = status.as_str(),
            latency_ms = latency.as_millis() as u64,
            "Archive command finished"
        );

        RawResponse {
            command: request.kind.name(),
            arg0: request.arg0().to_string(),
            output,
            error,
            return_code,
            submitted_at,
            latency,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTransport(std::sync::Mutex<Option<std::io::Result<TransportOutput>>>);

    #[async_trait]
    impl ArchiveTransport for FixedTransport {
        async fn execute(&self, _request: &CommandRequest) -> std::io::Result<TransportOutput> {
            self.0.lock().unwrap().take().unwrap()
        }
    }

    struct SlowTransport;

    #[async_trait]
    impl ArchiveTransport for SlowTransport {
        async fn execute(&self, _request: &CommandRequest) -> std::io::Result<TransportOutput> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(TransportOutput::default())
        }
    }

    fn client(transport: impl ArchiveTransport + 'static, transient: &[i32]) -> ArchiveClient {
        ArchiveClient::new(
            Arc::new(transport),
            ClientConfig {
                timeout: Duration::from_millis(50),
                transient_codes: transient.iter().copied().collect(),
            },
        )
    }

    fn fixed(result: std::io::Result<TransportOutput>) -> FixedTransport {
        FixedTransport(std::sync::Mutex::new(Some(result)))
    }

    const LISTING: &str = "\
HTAR: -rw-r--r--  nwprod/rstprod   104857 2020-01-02 03:41  ./gdas.t00z.prepbufr.nr
HTAR: -rw-r--r--  nwprod/nwprod     2048 2020-01-02 03:42  gdas.20200101/00/gdas.t00z.1bamua.tm00.bufr_d
HTAR: drwxr-xr-x  nwprod/nwprod        0 2020-01-02 03:40  gdas.20200101/00
HTAR: Listing complete for /NCEPPROD/x.tar, 2 files 106905 total bytes
HTAR: HTAR SUCCESSFUL
";

    #[test]
    fn test_command_name() {
        assert_eq!(HpssCommandKind::InspectTarball.name(), "htar -tvf");
        let request = CommandRequest::inspect_tarball("/a/b.tar");
        assert_eq!(request.arg0(), "/a/b.tar");
    }

    #[test]
    fn test_parse_listing() {
        let (files, rejected) = parse_listing(LISTING);
        assert!(rejected.is_empty());
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].name, "gdas.t00z.prepbufr.nr");
        assert_eq!(files[0].member_dir, None);
        assert_eq!(files[0].size, 104857);
        assert_eq!(files[0].permissions, "-rw-r--r--");
        assert_eq!(files[0].owner, "nwprod/rstprod");
        assert_eq!(
            files[0].last_modified,
            Utc.with_ymd_and_hms(2020, 1, 2, 3, 41, 0).unwrap()
        );

        assert_eq!(files[1].name, "gdas.t00z.1bamua.tm00.bufr_d");
        assert_eq!(files[1].member_dir.as_deref(), Some("gdas.20200101/00"));
    }

    #[test]
    fn test_parse_listing_rejects_bad_entries_only() {
        let listing = "\
HTAR: -rw-r--r--  nwprod/nwprod  10 2020-01-02 03:41  a.t00z.b.bufr
HTAR: -rw-r--r--  nwprod/nwprod  ten 2020-01-02 03:41  c.t00z.d.bufr
HTAR: -rw-r--r--  nwprod/nwprod  10 2020-13-02 03:41  e.t00z.f.bufr
HTAR: -rw-r--r--  nwprod/nwprod  10 2020-01-02
HTAR: -rw-r--r--  nwprod/nwprod  12 2020-01-02 03:41  g.t06z.h.bufr
";
        let (files, rejected) = parse_listing(listing);
        assert_eq!(files.len(), 2);
        assert_eq!(rejected.len(), 3);
        assert!(rejected[0].reason.contains("invalid size"));
        assert!(rejected[1].reason.contains("invalid timestamp"));
        assert_eq!(rejected[2].reason, "truncated entry");
    }

    #[test]
    fn test_parse_empty_listing() {
        let (files, rejected) = parse_listing("HTAR: HTAR SUCCESSFUL\n");
        assert!(files.is_empty());
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn test_send_success() {
        let client = client(
            fixed(Ok(TransportOutput {
                stdout: LISTING.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            })),
            &[72],
        );
        let response = client.send(&CommandRequest::inspect_tarball("/x.tar")).await;
        assert!(response.is_success());
        assert!(!response.can_retry());
        assert_eq!(response.command, "htar -tvf");
        assert_eq!(response.arg0, "/x.tar");

        let day = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let contents = response.parse_tarball_contents(day).unwrap();
        assert_eq!(contents.parent_dir, "/x.tar");
        assert_eq!(contents.observation_day, day);
        assert_eq!(contents.inspected_files.len(), 2);
    }

    #[tokio::test]
    async fn test_send_classification() {
        let transient = client(
            fixed(Ok(TransportOutput {
                exit_code: Some(72),
                ..Default::default()
            })),
            &[72],
        )
        .send(&CommandRequest::inspect_tarball("/x.tar"))
        .await;
        assert_eq!(transient.status, CommandStatus::Transient);
        assert!(transient.can_retry());

        let permanent = client(
            fixed(Ok(TransportOutput {
                exit_code: Some(1),
                ..Default::default()
            })),
            &[72],
        )
        .send(&CommandRequest::inspect_tarball("/x.tar"))
        .await;
        assert_eq!(permanent.status, CommandStatus::Permanent);
        assert!(!permanent.can_retry());

        let day = Utc::now();
        assert!(matches!(
            permanent.parse_tarball_contents(day),
            Err(InventoryError::CommandNotSuccessful { exit_code: 1 })
        ));
    }

    #[tokio::test]
    async fn test_send_spawn_failure_is_permanent() {
        let response = client(
            fixed(Err(std::io::Error::new(std::io::ErrorKind::NotFound, "htar not found"))),
            &[72],
        )
        .send(&CommandRequest::inspect_tarball("/x.tar"))
        .await;
        assert_eq!(response.return_code, SPAWN_FAILURE_EXIT_CODE);
        assert_eq!(response.status, CommandStatus::Permanent);
        assert!(response.error.contains("htar not found"));
    }

    #[tokio::test]
    async fn test_send_timeout_is_transient() {
        let response = client(SlowTransport, &[])
            .send(&CommandRequest::inspect_tarball("/x.tar"))
            .await;
        assert_eq!(response.return_code, TIMEOUT_EXIT_CODE);
        assert!(response.can_retry());
    }

    #[tokio::test]
    async fn test_signal_exit_is_permanent_by_default() {
        let response = client(fixed(Ok(TransportOutput::default())), &[72])
            .send(&CommandRequest::inspect_tarball("/x.tar"))
            .await;
        assert_eq!(response.return_code, SIGNAL_EXIT_CODE);
        assert_eq!(response.status, CommandStatus::Permanent);
    }

    #[test]
    fn test_all_entries_malformed_is_listing_error() {
        let response = RawResponse {
            command: "htar -tvf".to_string(),
            arg0: "/x.tar".to_string(),
            output: "HTAR: -rw-r--r--  a/b  nope 2020-01-02 03:41  f.bufr\n".to_string(),
            error: String::new(),
            return_code: 0,
            submitted_at: Utc::now(),
            latency: Duration::from_millis(5),
            status: CommandStatus::Success,
        };
        assert!(matches!(
            response.parse_tarball_contents(Utc::now()),
            Err(InventoryError::ListingParse { .. })
        ));
    }
}
