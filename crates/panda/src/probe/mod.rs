/// Probe runners - execute checks against devices
///
/// This module is responsible for:
/// - Running external check commands with a timeout
/// - Probing device liveness with ICMP echo requests
///
/// A probe never fails: a non-zero exit, a missing binary or a timeout are
/// all reported inside `ProbeOutput` and become normal service statuses.
pub mod command;
pub mod ping;

pub use command::CommandRunner;
pub use ping::{PingProber, PingReport};

/// Raw outcome of a probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Process exit code, `None` when the process could not run to completion
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self { exit_code: Some(exit_code), stdout: stdout.into(), stderr: String::new() }
    }

    /// Probe that never produced an exit code
    pub fn failed(reason: impl Into<String>) -> Self {
        Self { exit_code: None, stdout: String::new(), stderr: reason.into() }
    }

    /// Output to show for the check, stdout unless it is empty
    pub fn text(&self) -> &str {
        if self.stdout.trim().is_empty() { &self.stderr } else { &self.stdout }
    }
}

/// Executes a check command
#[async_trait::async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> ProbeOutput;
}

/// Decides whether a device answers at all
#[async_trait::async_trait]
pub trait LivenessProber: Send + Sync {
    async fn ping(&self, address: &str) -> PingReport;
}
