//! Remote command channel.
//!
//! The orchestrator talks to the remote host through the [`CommandChannel`]
//! trait; production uses [`SshChannel`], which drives the system `ssh`
//! binary over an OpenSSH control-master socket so exactly one session
//! exists per pipeline run. Tests substitute a scripted mock.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::PipelineError;

/// Captured result of one remote command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The completion marker: a successful exit AND at least one output line.
    pub fn has_marker(&self) -> bool {
        self.success() && !self.stdout.is_empty()
    }
}

/// One session to the remote host. `execute` blocks until the remote
/// process returns; `close` is idempotent and always invoked at teardown.
#[async_trait]
pub trait CommandChannel: Send {
    async fn execute(&mut self, argv: &[String]) -> Result<ExecOutput, PipelineError>;
    async fn close(&mut self);
}

/// Production channel over the system `ssh` binary.
///
/// `connect` opens a control master (`ssh -M -fN`); every `execute` reuses
/// that session through the control socket, so the remote host sees one
/// login for the whole pipeline run. Host-key policy is left to the user's
/// ssh config.
pub struct SshChannel {
    host: String,
    username: String,
    control_path: PathBuf,
    open: bool,
}

impl SshChannel {
    pub async fn connect(host: &str, username: &str) -> Result<Self, PipelineError> {
        let control_path =
            std::env::temp_dir().join(format!("txpipe-ssh-{}-{}", host, std::process::id()));

        let status = Command::new("ssh")
            .args(["-o", "BatchMode=yes", "-M", "-fN", "-S"])
            .arg(&control_path)
            .arg(format!("{username}@{host}"))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| PipelineError::Connectivity {
                subsystem: "command channel".to_string(),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(PipelineError::Connectivity {
                subsystem: "command channel".to_string(),
                message: format!(
                    "ssh control master to {host} exited with status {}",
                    status.code().unwrap_or(-1)
                ),
            });
        }

        debug!(host, username, "ssh session established");
        Ok(Self {
            host: host.to_string(),
            username: username.to_string(),
            control_path,
            open: true,
        })
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

#[async_trait]
impl CommandChannel for SshChannel {
    async fn execute(&mut self, argv: &[String]) -> Result<ExecOutput, PipelineError> {
        if !self.open {
            return Err(PipelineError::ChannelIo {
                message: "session already closed".to_string(),
            });
        }

        let output = Command::new("ssh")
            .arg("-S")
            .arg(&self.control_path)
            .arg(self.destination())
            .arg("--")
            .args(argv)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PipelineError::ChannelIo {
                message: e.to_string(),
            })?;

        let to_lines = |bytes: &[u8]| -> Vec<String> {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::to_string)
                .collect()
        };

        let result = ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: to_lines(&output.stdout),
            stderr: to_lines(&output.stderr),
        };
        debug!(
            exit_code = result.exit_code,
            stdout_lines = result.stdout.len(),
            "remote command finished"
        );
        Ok(result)
    }

    async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let exited = Command::new("ssh")
            .arg("-S")
            .arg(&self.control_path)
            .args(["-O", "exit"])
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match exited {
            Ok(status) if status.success() => debug!("ssh session closed"),
            Ok(status) => warn!(code = status.code(), "ssh control exit returned nonzero"),
            Err(e) => warn!(error = %e, "failed to run ssh control exit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_requires_exit_zero_and_output() {
        let with_marker = ExecOutput {
            exit_code: 0,
            stdout: vec!["homebankingExportJob status=FINISHED".to_string()],
            stderr: vec![],
        };
        assert!(with_marker.has_marker());

        let empty_stdout = ExecOutput {
            exit_code: 0,
            stdout: vec![],
            stderr: vec![],
        };
        assert!(empty_stdout.success());
        assert!(!empty_stdout.has_marker());

        let nonzero = ExecOutput {
            exit_code: 1,
            stdout: vec!["noise".to_string()],
            stderr: vec![],
        };
        assert!(!nonzero.has_marker());
    }
}
