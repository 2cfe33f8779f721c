//! Remote-execution seam. The supervisor only needs "run a command on
//! host H, get back exit code and captured output, or a failure"; this
//! module defines that seam and ships the SSH implementation over the
//! `openssh` control-master client.

use std::time::Duration;

use async_trait::async_trait;
use gsw_core::HostEndpoint;
use openssh::{KnownHosts, Session};

use crate::error::FleetError;

/// Captured result of one remote command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnownHostsPolicy {
    /// Refuse hosts missing from known_hosts.
    #[default]
    Strict,
    /// Accept any host key without recording it.
    AcceptUnknown,
}

/// One open session on a remote host. Commands run strictly one at a
/// time per session.
#[async_trait]
pub trait RemoteSession: Send {
    async fn run(&mut self, command: &str, timeout: Duration) -> Result<ExecOutput, FleetError>;
    async fn close(self: Box<Self>) -> Result<(), FleetError>;
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, endpoint: &HostEndpoint) -> Result<Box<dyn RemoteSession>, FleetError>;
}

/// SSH transport via the local ssh client (control-master multiplexing).
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    known_hosts: KnownHostsPolicy,
}

impl SshConnector {
    pub fn new(known_hosts: KnownHostsPolicy) -> Self {
        Self { known_hosts }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, endpoint: &HostEndpoint) -> Result<Box<dyn RemoteSession>, FleetError> {
        let destination = format!(
            "ssh://{}@{}:{}",
            endpoint.username, endpoint.hostname, endpoint.port
        );
        let check = match self.known_hosts {
            KnownHostsPolicy::Strict => KnownHosts::Strict,
            KnownHostsPolicy::AcceptUnknown => KnownHosts::Accept,
        };
        let session = Session::connect(destination, check)
            .await
            .map_err(|err| FleetError::Connect(err.to_string()))?;
        Ok(Box::new(SshSession { session }))
    }
}

struct SshSession {
    session: Session,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str, timeout: Duration) -> Result<ExecOutput, FleetError> {
        let mut cmd = self.session.shell(command);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| FleetError::Timeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(|err| FleetError::Transport(err.to_string()))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), FleetError> {
        self.session
            .close()
            .await
            .map_err(|err| FleetError::Transport(err.to_string()))
    }
}
