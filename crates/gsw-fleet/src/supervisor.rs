//! Per-host polling supervisor: Connecting -> Polling -> Backoff, run
//! until fleet shutdown. Every failure degrades only this host's store
//! entry and is retried forever after a fixed backoff.

use std::sync::Arc;
use std::time::Duration;

use gsw_core::{style, HostEndpoint, HostStatusStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FleetError;
use crate::exec::{RemoteConnector, RemoteSession};

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between polls; also the backoff delay after a failure.
    pub poll_interval: Duration,
    /// Bound on a single remote command execution.
    pub exec_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            exec_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HostSupervisor<C> {
    endpoint: HostEndpoint,
    store: Arc<HostStatusStore>,
    connector: Arc<C>,
    config: PollConfig,
    cancel: CancellationToken,
}

impl<C: RemoteConnector> HostSupervisor<C> {
    pub fn new(
        endpoint: HostEndpoint,
        store: Arc<HostStatusStore>,
        connector: Arc<C>,
        config: PollConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoint,
            store,
            connector,
            config,
            cancel,
        }
    }

    /// Runs until the fleet cancellation token fires. There is no other
    /// terminal state; retries are unlimited.
    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.connect_and_poll().await {
                // Only cancellation exits the poll loop cleanly.
                Ok(()) => break,
                Err(err) => {
                    warn!(host = %self.endpoint.hostname, error = %err, event = "supervisor_error");
                    self.record_failure(&err);
                }
            }
            debug!(
                host = %self.endpoint.hostname,
                delay_secs = self.config.poll_interval.as_secs_f64(),
                event = "backoff"
            );
            if self.sleep_cancellable().await {
                break;
            }
        }
        info!(host = %self.endpoint.hostname, event = "supervisor_stopped");
    }

    async fn connect_and_poll(&self) -> Result<(), FleetError> {
        let connected = tokio::select! {
            result = self.connector.connect(&self.endpoint) => Some(result),
            _ = self.cancel.cancelled() => None,
        };
        let mut session = match connected {
            Some(result) => result?,
            None => return Ok(()),
        };
        info!(host = %self.endpoint.hostname, event = "connected");

        loop {
            let polled = tokio::select! {
                result = session.run(&self.endpoint.exec_command, self.config.exec_timeout) => Some(result),
                _ = self.cancel.cancelled() => None,
            };
            let result = match polled {
                Some(result) => result,
                None => {
                    // Abandon the in-flight command, release the session.
                    let _ = session.close().await;
                    return Ok(());
                }
            };

            match result {
                Ok(output) if output.success() => {
                    self.store.set_output(&self.endpoint.hostname, &output.stdout);
                }
                Ok(output) => {
                    let detail = output.stderr.lines().next().unwrap_or("").to_string();
                    let err = FleetError::Command {
                        code: output.exit_code,
                        detail,
                    };
                    warn!(host = %self.endpoint.hostname, error = %err, event = "command_failed");
                    self.record_failure(&err);
                }
                Err(err) => {
                    let _ = session.close().await;
                    return Err(err);
                }
            }

            if self.sleep_cancellable().await {
                let _ = session.close().await;
                return Ok(());
            }
        }
    }

    /// Returns true if cancelled during the sleep.
    async fn sleep_cancellable(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => false,
            _ = self.cancel.cancelled() => true,
        }
    }

    fn record_failure(&self, err: &FleetError) {
        let text = match err {
            // Keeps the original `[Error <code>] <stderr>` shape.
            FleetError::Command { .. } => err.to_string(),
            _ => format!("{}: {err}", err.kind()),
        };
        self.store
            .set_message(&self.endpoint.hostname, &style::red(&text), true);
    }
}
