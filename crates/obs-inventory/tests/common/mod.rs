//! Scripted archive transport for engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use obs_inventory::{
    ArchiveTransport, CommandRequest, EngineConfig, FailurePolicy, SearchConfig, TransportOutput,
};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(TransportOutput),
    /// Sleep before answering, to exercise the client timeout.
    Delayed(Duration, TransportOutput),
    SpawnError,
}

impl Reply {
    pub fn success(stdout: &str) -> Self {
        Reply::Output(TransportOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    pub fn exit(code: i32) -> Self {
        Reply::Output(TransportOutput {
            stdout: String::new(),
            stderr: format!("HTAR: HTAR FAILED, exit {}", code),
            exit_code: Some(code),
        })
    }
}

/// Transport that answers from per-path queues and records every request.
///
/// Paths without queued replies get the default reply.
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    default_reply: Reply,
    log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(default_reply: Reply) -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            default_reply,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, path: &str, replies: Vec<Reply>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend(replies);
        self
    }

    /// Search paths in the order they were sent.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count_for(&self, path: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl ArchiveTransport for ScriptedTransport {
    async fn execute(&self, request: &CommandRequest) -> std::io::Result<TransportOutput> {
        let path = request.arg0().to_string();
        self.log.lock().unwrap().push(path.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default_reply.clone());

        match reply {
            Reply::Output(out) => Ok(out),
            Reply::Delayed(delay, out) => {
                tokio::time::sleep(delay).await;
                Ok(out)
            }
            Reply::SpawnError => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "htar: command not found",
            )),
        }
    }
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap()
}

/// Source `key` searching `/<key>/YYYYMMDD.tar` over days `start..=end` of January 2020.
pub fn source(key: &str, start: u32, end: u32) -> SearchConfig {
    SearchConfig::new(key, format!("/{}/%Y%m%d.tar", key), day(start), day(end)).unwrap()
}

pub fn path(key: &str, d: u32) -> String {
    format!("/{}/202001{:02}.tar", key, d)
}

/// Engine settings with no waiting between rounds.
pub fn engine_config(max_concurrent: usize) -> EngineConfig {
    EngineConfig {
        max_concurrent,
        retry_delay_secs: 0,
        ..EngineConfig::default()
    }
}

pub fn engine_config_with(
    max_concurrent: usize,
    max_attempts_per_day: u32,
    on_permanent_failure: FailurePolicy,
    on_retries_exhausted: FailurePolicy,
) -> EngineConfig {
    EngineConfig {
        max_concurrent,
        max_attempts_per_day,
        on_permanent_failure,
        on_retries_exhausted,
        retry_delay_secs: 0,
        ..EngineConfig::default()
    }
}

pub fn transport(reply: Reply) -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new(reply))
}
