//! Per-source search progress over a date range.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

/// A day cursor walking from `start` to `end` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub current: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            current: start,
            end,
        }
    }

    pub fn at_end(&self) -> bool {
        self.current > self.end
    }

    /// Number of days covered, inclusive of both ends.
    pub fn total_days(&self) -> i64 {
        if self.end < self.start {
            return 0;
        }
        (self.end - self.start).num_days() + 1
    }

    fn increment_day(&mut self) {
        self.current += Duration::days(1);
    }
}

/// Lifecycle of a source's search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Searching,
    /// The cursor moved past the end of the range.
    Finished,
    /// The source was stopped by the failure policy before reaching the end.
    Halted,
}

/// Search progress for one source.
///
/// The current search path is derived from the source configuration and the
/// current day, and only changes when the day does.
#[derive(Debug, Clone)]
pub struct SearchProgress {
    config: SearchConfig,
    range: DateRange,
    state: SearchState,
    current_search_path: String,
    /// Failed attempts against the current day.
    attempts: u32,
}

impl SearchProgress {
    pub fn new(config: SearchConfig) -> Self {
        let range = DateRange::new(config.start, config.end);
        let current_search_path = config.search_path(range.current);
        let state = if range.at_end() {
            SearchState::Finished
        } else {
            SearchState::Searching
        };

        Self {
            config,
            range,
            state,
            current_search_path,
            attempts: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn date_range(&self) -> &DateRange {
        &self.range
    }

    pub fn current_day(&self) -> DateTime<Utc> {
        self.range.current
    }

    pub fn current_search_path(&self) -> &str {
        &self.current_search_path
    }

    /// True once the search has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state != SearchState::Searching
    }

    /// Failed attempts recorded against the current day.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn record_failed_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Move to the next day. A no-op once the search is finished or halted.
    pub fn advance_day(&mut self) -> SearchState {
        if self.is_finished() {
            return self.state;
        }

        self.range.increment_day();
        self.attempts = 0;

        if self.range.at_end() {
            self.state = SearchState::Finished;
        } else {
            self.current_search_path = self.config.search_path(self.range.current);
        }
        self.state
    }

    /// Stop searching this source.
    pub fn halt(&mut self) -> SearchState {
        if !self.is_finished() {
            self.state = SearchState::Halted;
        }
        self.state
    }
}
