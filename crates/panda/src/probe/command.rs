use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{ProbeOutput, ProbeRunner};

/// Runs check commands as child processes
pub struct CommandRunner {
    timeout_duration: Duration,
}

impl CommandRunner {
    pub fn new(timeout_seconds: u64) -> Self {
        Self { timeout_duration: Duration::from_secs(timeout_seconds) }
    }
}

#[async_trait::async_trait]
impl ProbeRunner for CommandRunner {
    async fn run(&self, argv: &[String]) -> ProbeOutput {
        let Some((program, args)) = argv.split_first() else {
            return ProbeOutput::failed("Empty check command");
        };

        let start = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // the child is killed when the timeout drops the future
            .kill_on_drop(true);

        let output = match timeout(self.timeout_duration, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ProbeOutput::failed(format!("Failed to run {program}: {e}")),
            Err(_) => {
                return ProbeOutput::failed(format!(
                    "Check timed out after {} seconds",
                    self.timeout_duration.as_secs()
                ));
            }
        };

        debug!(
            command = %program,
            exit_code = ?output.status.code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Probe finished"
        );

        ProbeOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_captures_exit_code_and_output() {
        let runner = CommandRunner::new(10);
        let output = runner.run(&argv(&["sh", "-c", "echo 'WARNING | load=3;2;4'; exit 1"])).await;

        assert_eq!(output.exit_code, Some(1));
        assert_eq!(output.stdout.trim(), "WARNING | load=3;2;4");
    }

    #[tokio::test]
    async fn test_captures_stderr() {
        let runner = CommandRunner::new(10);
        let output = runner.run(&argv(&["sh", "-c", "echo oops >&2; exit 2"])).await;

        assert_eq!(output.exit_code, Some(2));
        assert_eq!(output.text().trim(), "oops");
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_an_error() {
        let runner = CommandRunner::new(10);
        let output = runner.run(&argv(&["/nonexistent/check_thing"])).await;

        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("Failed to run"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = CommandRunner::new(1);
        let output = runner.run(&argv(&["sleep", "5"])).await;

        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_argv() {
        let output = CommandRunner::new(1).run(&[]).await;
        assert_eq!(output.exit_code, None);
    }
}
