//! Archive transport that runs `htar` as a child process.

use std::process::Stdio;

use async_trait::async_trait;
use obs_inventory::{ArchiveTransport, CommandRequest, TransportOutput};
use tokio::process::Command;
use tracing::debug;

/// Runs archive commands on the local host.
///
/// The child is killed if the send is abandoned, so a client timeout never
/// leaves an `htar` process behind.
#[derive(Debug, Clone, Default)]
pub struct HtarTransport {
    /// Replaces the command's own program, e.g. a wrapper script.
    program_override: Option<String>,
}

impl HtarTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program_override: Some(program.into()),
        }
    }
}

#[async_trait]
impl ArchiveTransport for HtarTransport {
    async fn execute(&self, request: &CommandRequest) -> std::io::Result<TransportOutput> {
        let program = self
            .program_override
            .as_deref()
            .unwrap_or_else(|| request.kind.program());

        debug!(program = %program, args = ?request.args, "Spawning archive command");

        let output = Command::new(program)
            .args(request.kind.base_args())
            .args(&request.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(TransportOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
