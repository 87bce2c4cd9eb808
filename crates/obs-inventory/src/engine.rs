//! Inventory search engine.
//!
//! Sweeps every search source once per round until all of them are done.
//! Within a round each unfinished source gets exactly one archive command;
//! commands for different sources run concurrently on a bounded pool, while
//! each source has at most one command in flight. A transient failure leaves
//! the source on the same day, to be retried in a later round.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{EngineConfig, FailurePolicy, SearchConfig};
use crate::error::{InventoryError, Result};
use crate::hpss::{ArchiveClient, ArchiveTransport, CommandRequest, CommandStatus};
use crate::listing::process_inspect_tarball_resp;
use crate::progress::{SearchProgress, SearchState};
use crate::records::HpssCmdResult;
use crate::sink::InventorySink;

/// Per-source counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub commands_sent: u64,
    pub successes: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    /// Successful commands whose listing could not be parsed.
    pub listing_failures: u64,
    pub days_searched: u64,
    pub days_skipped: u64,
    pub records: u64,
    pub rejected_entries: u64,
    pub halted: bool,
}

impl SourceSummary {
    /// At least one tarball was inspected successfully.
    pub fn made_progress(&self) -> bool {
        self.successes > 0
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub rounds: u32,
    pub sources: BTreeMap<String, SourceSummary>,
}

impl SearchSummary {
    pub fn total_commands(&self) -> u64 {
        self.sources.values().map(|s| s.commands_sent).sum()
    }

    pub fn total_records(&self) -> u64 {
        self.sources.values().map(|s| s.records).sum()
    }

    /// True when there were sources and none of them made any progress.
    pub fn all_sources_stalled(&self) -> bool {
        !self.sources.is_empty() && self.sources.values().all(|s| !s.made_progress())
    }
}

#[derive(Debug, Clone, Copy)]
struct RetrySettings {
    max_attempts_per_day: u32,
    on_permanent_failure: FailurePolicy,
    on_retries_exhausted: FailurePolicy,
}

struct SourceRun {
    progress: SearchProgress,
    summary: SourceSummary,
}

/// Drives the inventory search across all configured sources.
pub struct SearchEngine {
    client: ArchiveClient,
    sink: Arc<dyn InventorySink>,
    settings: RetrySettings,
    max_concurrent: usize,
    retry_delay: Duration,
    runs: BTreeMap<String, SourceRun>,
}

impl SearchEngine {
    pub fn new(
        search_configs: Vec<SearchConfig>,
        engine: &EngineConfig,
        transport: Arc<dyn ArchiveTransport>,
        sink: Arc<dyn InventorySink>,
    ) -> Self {
        let runs = search_configs
            .into_iter()
            .map(|config| {
                let run = SourceRun {
                    progress: SearchProgress::new(config),
                    summary: SourceSummary::default(),
                };
                (run.progress.key().to_string(), run)
            })
            .collect();

        Self {
            client: ArchiveClient::new(transport, engine.client_config()),
            sink,
            settings: RetrySettings {
                max_attempts_per_day: engine.max_attempts_per_day.max(1),
                on_permanent_failure: engine.on_permanent_failure,
                on_retries_exhausted: engine.on_retries_exhausted,
            },
            max_concurrent: engine.max_concurrent.max(1),
            retry_delay: Duration::from_secs(engine.retry_delay_secs),
            runs,
        }
    }

    /// Search progress for one source.
    pub fn progress(&self, key: &str) -> Result<&SearchProgress> {
        self.runs
            .get(key)
            .map(|run| &run.progress)
            .ok_or_else(|| InventoryError::UnknownSource(key.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.runs.values().all(|run| run.progress.is_finished())
    }

    /// Run rounds until every source is finished or halted.
    ///
    /// Command failures never end the run; a storage failure does, once
    /// the round in flight has completed.
    #[instrument(skip(self), fields(sources = self.runs.len()))]
    pub async fn get_obs_file_info(&mut self) -> Result<SearchSummary> {
        let mut rounds = 0u32;

        while !self.is_finished() {
            rounds += 1;
            let moved = self.run_round(rounds).await?;

            if !moved && !self.is_finished() && !self.retry_delay.is_zero() {
                warn!(
                    round = rounds,
                    delay_secs = self.retry_delay.as_secs(),
                    "Every source is waiting on a transient failure, pausing before retrying"
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        let summary = SearchSummary {
            rounds,
            sources: self
                .runs
                .iter()
                .map(|(key, run)| (key.clone(), run.summary.clone()))
                .collect(),
        };

        info!(
            rounds = summary.rounds,
            commands = summary.total_commands(),
            records = summary.total_records(),
            "Inventory search complete"
        );
        Ok(summary)
    }

    /// One command for every unfinished source. Returns whether any source
    /// moved off its current day, by advancing, skipping or halting.
    async fn run_round(&mut self, round: u32) -> Result<bool> {
        let Self {
            client,
            sink,
            settings,
            max_concurrent,
            runs,
            ..
        } = self;
        let client = &*client;
        let sink = &**sink;
        let settings = *settings;

        let active = runs.values().filter(|run| !run.progress.is_finished()).count();
        debug!(round = round, active = active, "Starting search round");

        let results: Vec<Result<bool>> = stream::iter(
            runs.values_mut()
                .filter(|run| !run.progress.is_finished()),
        )
        .map(|run| search_current_day(client, sink, settings, run))
        .buffer_unordered(*max_concurrent)
        .collect()
        .await;

        let mut moved = false;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(source_moved) => moved |= source_moved,
                Err(e) => {
                    error!(round = round, error = %e, "Storage failure during search round");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(moved),
        }
    }
}

/// Issue one inspection for the source's current day and apply the outcome.
///
/// Returns whether the source left the day, which is false only for a
/// transient failure that still has attempts left.
async fn search_current_day(
    client: &ArchiveClient,
    sink: &dyn InventorySink,
    settings: RetrySettings,
    run: &mut SourceRun,
) -> Result<bool> {
    let SourceRun { progress, summary } = run;
    let key = progress.key().to_string();
    let obs_day = progress.current_day();
    let request = CommandRequest::inspect_tarball(progress.current_search_path());

    let response = client.send(&request).await;
    summary.commands_sent += 1;
    counter!("hpss_commands_total", "outcome" => response.status.as_str()).increment(1);
    histogram!("hpss_command_latency_seconds").record(response.latency.as_secs_f64());

    sink.insert_hpss_cmd_result(&HpssCmdResult::from_response(&response, obs_day))
        .await?;

    match response.status {
        CommandStatus::Success => {
            summary.successes += 1;

            match response.parse_tarball_contents(obs_day) {
                Ok(contents) => {
                    let records = process_inspect_tarball_resp(&contents, progress.config());
                    if !records.is_empty() {
                        sink.insert_obs_inv_items(&records).await?;
                    }
                    summary.records += records.len() as u64;
                    summary.rejected_entries += contents.rejected.len() as u64;
                    counter!("obs_inventory_records_total").increment(records.len() as u64);
                    counter!("obs_inventory_listing_rejects_total")
                        .increment(contents.rejected.len() as u64);

                    info!(
                        source = %key,
                        path = %request.arg0(),
                        obs_day = %obs_day.date_naive(),
                        records = records.len(),
                        rejected = contents.rejected.len(),
                        "Inspected tarball"
                    );
                }
                Err(e) => {
                    summary.listing_failures += 1;
                    error!(source = %key, path = %request.arg0(), error = %e, "Failed to parse tarball listing");
                }
            }

            progress.advance_day();
            summary.days_searched += 1;
        }
        CommandStatus::Transient => {
            summary.transient_failures += 1;
            let attempts = progress.record_failed_attempt();

            if attempts >= settings.max_attempts_per_day {
                error!(
                    source = %key,
                    path = %request.arg0(),
                    obs_day = %obs_day.date_naive(),
                    attempts = attempts,
                    exit_code = response.return_code,
                    "Retries exhausted for day"
                );
                apply_failure_policy(settings.on_retries_exhausted, &key, progress, summary);
            } else {
                warn!(
                    source = %key,
                    path = %request.arg0(),
                    attempt = attempts,
                    max_attempts = settings.max_attempts_per_day,
                    exit_code = response.return_code,
                    "Transient archive failure, will retry next round"
                );
            }
        }
        CommandStatus::Permanent => {
            summary.permanent_failures += 1;
            progress.record_failed_attempt();
            error!(
                source = %key,
                path = %request.arg0(),
                obs_day = %obs_day.date_naive(),
                exit_code = response.return_code,
                stderr = %response.error.trim(),
                "Permanent archive failure"
            );
            apply_failure_policy(settings.on_permanent_failure, &key, progress, summary);
        }
    }

    Ok(progress.is_finished() || progress.current_day() != obs_day)
}

fn apply_failure_policy(
    policy: FailurePolicy,
    key: &str,
    progress: &mut SearchProgress,
    summary: &mut SourceSummary,
) {
    match policy {
        FailurePolicy::Skip => {
            warn!(source = %key, obs_day = %progress.current_day().date_naive(), "Skipping day");
            counter!("obs_inventory_days_skipped_total").increment(1);
            summary.days_skipped += 1;
            progress.advance_day();
        }
        FailurePolicy::Halt => {
            error!(source = %key, obs_day = %progress.current_day().date_naive(), "Halting source");
            if progress.halt() == SearchState::Halted {
                summary.halted = true;
            }
        }
    }
}
