use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{
    Error,
    Result,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stderr, or stdout when stderr is empty.
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Boundary to external trust-store tooling.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Executing: {} {}", program, args.join(" "));

        let child = Command::new(program).args(args).kill_on_drop(true).output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                Error::TrustStore(format!(
                    "{} did not finish within {}s",
                    program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::TrustStore(format!("Failed to execute {program}: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub(crate) fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let runner = SystemCommandRunner::new(Duration::from_secs(10));

        let output = runner
            .run("sh", &to_args(&["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.message(), "err");
    }

    #[tokio::test]
    async fn test_hanging_command_times_out() {
        let runner = SystemCommandRunner::new(Duration::from_millis(200));

        let result = runner.run("sleep", &to_args(&["5"])).await;

        match result {
            Err(Error::TrustStore(message)) => assert!(message.contains("did not finish")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_trust_store_error() {
        let runner = SystemCommandRunner::new(Duration::from_secs(1));

        let result = runner.run("trustcert-no-such-binary", &[]).await;

        assert!(matches!(result, Err(Error::TrustStore(_))));
    }
}
