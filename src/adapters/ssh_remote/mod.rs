//! SSH remote adapter
//!
//! Status checks run a read-only command over `ssh`; artifacts are copied with
//! `scp`. Both run non-interactively (`BatchMode=yes`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::*;
use crate::ports::*;
use crate::utils::process;

/// Default status check: the artifact is ready once it is readable
pub const DEFAULT_STATUS_COMMAND: &str = "test -r {path} && echo READY || echo PENDING";

/// Exit status ssh uses for its own failures
const SSH_FAILURE_EXIT: i32 = 255;

/// Connection settings for the remote host
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    /// Template with `{path}` and `{id}` placeholders
    pub status_command: String,
    pub connect_timeout: Duration,
    /// Upper bound for one ssh or scp invocation
    pub command_timeout: Duration,
}

impl SshSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            status_command: DEFAULT_STATUS_COMMAND.to_string(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(600),
        }
    }

    /// `user@host`, or just `host`
    pub fn destination(&self) -> String {
        match self.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    fn common_options(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(port) = self.port {
            args.push(port_flag.to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    /// Arguments for `ssh` running `remote_command`
    pub fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.common_options("-p");
        args.push(self.destination());
        args.push(remote_command.to_string());
        args
    }

    /// Arguments for `scp` copying `remote_path` to `local_path`
    pub fn scp_args(&self, remote_path: &str, local_path: &Path) -> Vec<String> {
        let mut args = self.common_options("-P");
        args.push(format!("{}:{}", self.destination(), remote_path));
        args.push(local_path.display().to_string());
        args
    }
}

/// Quote for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Substitute the placeholders of a status command template
pub fn render_status_command(template: &str, remote_path: &str, submission_id: &str) -> String {
    template
        .replace("{path}", &shell_quote(remote_path))
        .replace("{id}", &shell_quote(submission_id))
}

/// Interpret the first token of the status command's output
pub fn parse_status(stdout: &str) -> Option<RemoteStatus> {
    let trimmed = stdout.trim();
    let (token, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    match token.to_ascii_uppercase().as_str() {
        "READY" => Some(RemoteStatus::Ready),
        "PENDING" | "RUNNING" => Some(RemoteStatus::Pending),
        "FAILED" => {
            let reason = rest.trim();
            Some(RemoteStatus::Failed(if reason.is_empty() {
                "remote job reported failure".to_string()
            } else {
                reason.to_string()
            }))
        }
        _ => None,
    }
}

/// Remote port over the system `ssh` and `scp` clients
pub struct SshRemoteAdapter {
    settings: SshSettings,
    ssh: PathBuf,
    scp: PathBuf,
}

impl SshRemoteAdapter {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            ssh: PathBuf::from("ssh"),
            scp: PathBuf::from("scp"),
        }
    }

    /// Override the client executables
    pub fn with_clients(mut self, ssh: impl Into<PathBuf>, scp: impl Into<PathBuf>) -> Self {
        self.ssh = ssh.into();
        self.scp = scp.into();
        self
    }

    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }
}

#[async_trait]
impl RemotePort for SshRemoteAdapter {
    async fn check_status(
        &self,
        submission_id: &str,
        remote_path: &str,
    ) -> Result<RemoteStatus, DomainError> {
        let remote_command =
            render_status_command(&self.settings.status_command, remote_path, submission_id);
        let mut command = Command::new(&self.ssh);
        command.args(self.settings.ssh_args(&remote_command));

        let output = process::capture(command, Some(self.settings.command_timeout))
            .await
            .map_err(|e| DomainError::RemoteCheck(format!("Unable to run ssh: {}", e)))?;

        if output.status.code() == Some(SSH_FAILURE_EXIT) {
            return Err(DomainError::RemoteCheck(format!(
                "ssh to {} failed: {}",
                self.settings.destination(),
                output.diagnostic()
            )));
        }
        match parse_status(&output.stdout) {
            Some(status) => {
                debug!(submission_id, "Remote status: {:?}", status);
                Ok(status)
            }
            None if !output.success() => Err(DomainError::RemoteCheck(format!(
                "Status command failed: {}",
                output.diagnostic()
            ))),
            None => {
                if !output.stdout.trim().is_empty() {
                    warn!(submission_id, "Unrecognized status output: {}", output.stdout.trim());
                }
                Ok(RemoteStatus::Pending)
            }
        }
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<PathBuf, DomainError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::Transfer(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let mut command = Command::new(&self.scp);
        command.args(self.settings.scp_args(remote_path, local_path));
        let output = process::capture(command, Some(self.settings.command_timeout))
            .await
            .map_err(|e| DomainError::Transfer(format!("Unable to run scp: {}", e)));

        let failure = match output {
            Ok(output) if output.success() => None,
            Ok(output) => Some(DomainError::Transfer(format!(
                "scp {}:{} failed: {}",
                self.settings.destination(),
                remote_path,
                output.diagnostic()
            ))),
            Err(e) => Some(e),
        };
        if let Some(error) = failure {
            // never leave a partial artifact behind
            let _ = tokio::fs::remove_file(local_path).await;
            return Err(error);
        }

        if !local_path.is_file() {
            return Err(DomainError::Transfer(format!(
                "scp reported success but {} is missing",
                local_path.display()
            )));
        }
        info!("Fetched {} -> {}", remote_path, local_path.display());
        Ok(local_path.to_path_buf())
    }
}
