//! Fleet lifecycle: parse the host list, seed placeholder entries, launch
//! one supervisor task per endpoint, and cancel them all on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use gsw_core::{HostEndpoint, HostStatusStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::FleetError;
use crate::exec::RemoteConnector;
use crate::supervisor::{HostSupervisor, PollConfig};

pub const DEFAULT_EXEC_COMMAND: &str = "gpustat --color --force-color";

/// How long `FleetHandle::stop` waits for supervisors to release their
/// sessions before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct FleetOptions {
    pub default_port: u16,
    pub default_username: String,
    /// Per-hostname command overrides; everyone else runs
    /// [`DEFAULT_EXEC_COMMAND`].
    pub command_overrides: HashMap<String, String>,
    pub poll: PollConfig,
}

#[derive(Debug)]
pub struct FleetHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl FleetHandle {
    pub fn host_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels every supervisor and waits up to [`SHUTDOWN_GRACE`] for
    /// them to release their sessions. Stragglers are aborted and
    /// logged, not fatal.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let drained = join_all(self.tasks.iter_mut());
        if tokio::time::timeout(SHUTDOWN_GRACE, drained).await.is_err() {
            warn!(event = "shutdown_grace_exceeded", "abandoning supervisors that did not stop in time");
            for task in &self.tasks {
                task.abort();
            }
        }
        info!(event = "fleet_stopped");
    }
}

/// Parses the host tokens and launches one supervisor per valid endpoint
/// without waiting for any of them to connect. Malformed tokens are
/// skipped with a warning; a wholly invalid list is an error. Placeholder
/// store entries are seeded before any supervisor starts, so snapshots
/// never miss a configured host.
///
/// Must be called from within a tokio runtime.
pub fn start<C>(
    store: Arc<HostStatusStore>,
    connector: Arc<C>,
    tokens: &[String],
    options: FleetOptions,
) -> Result<FleetHandle, FleetError>
where
    C: RemoteConnector + 'static,
{
    let mut endpoints: Vec<HostEndpoint> = Vec::new();
    let mut rejected: Vec<String> = Vec::new();
    for token in tokens {
        match HostEndpoint::parse(token, options.default_port, &options.default_username) {
            Ok(endpoint) => {
                let command = options
                    .command_overrides
                    .get(&endpoint.hostname)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_EXEC_COMMAND.to_string());
                endpoints.push(endpoint.with_command(command));
            }
            Err(err) => {
                warn!(token = %token, error = %err, event = "host_token_rejected");
                rejected.push(format!("{token}: {err}"));
            }
        }
    }
    if endpoints.is_empty() {
        return Err(FleetError::NoValidHosts {
            attempted: tokens.len(),
            details: rejected.join("; "),
        });
    }

    for endpoint in &endpoints {
        store.set_message(&endpoint.hostname, "Loading ...", false);
    }

    let cancel = CancellationToken::new();
    let tasks: Vec<JoinHandle<()>> = endpoints
        .into_iter()
        .map(|endpoint| {
            let supervisor = HostSupervisor::new(
                endpoint,
                store.clone(),
                connector.clone(),
                options.poll.clone(),
                cancel.child_token(),
            );
            tokio::spawn(supervisor.run())
        })
        .collect();

    info!(hosts = tasks.len(), event = "fleet_started");
    Ok(FleetHandle { cancel, tasks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecOutput, RemoteSession};
    use async_trait::async_trait;
    use gsw_core::strip_ansi;

    struct RefusingConnector;

    #[async_trait]
    impl RemoteConnector for RefusingConnector {
        async fn connect(
            &self,
            _endpoint: &HostEndpoint,
        ) -> Result<Box<dyn RemoteSession>, FleetError> {
            Err(FleetError::Connect("connection refused".into()))
        }
    }

    struct EchoConnector;

    #[async_trait]
    impl RemoteConnector for EchoConnector {
        async fn connect(
            &self,
            endpoint: &HostEndpoint,
        ) -> Result<Box<dyn RemoteSession>, FleetError> {
            Ok(Box::new(EchoSession {
                hostname: endpoint.hostname.clone(),
            }))
        }
    }

    struct EchoSession {
        hostname: String,
    }

    #[async_trait]
    impl RemoteSession for EchoSession {
        async fn run(
            &mut self,
            command: &str,
            _timeout: Duration,
        ) -> Result<ExecOutput, FleetError> {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: format!("{} ran {command}", self.hostname),
                stderr: String::new(),
            })
        }

        async fn close(self: Box<Self>) -> Result<(), FleetError> {
            Ok(())
        }
    }

    fn options() -> FleetOptions {
        FleetOptions {
            default_port: 22,
            default_username: "netdb".into(),
            command_overrides: HashMap::new(),
            poll: PollConfig {
                poll_interval: Duration::from_millis(50),
                exec_timeout: Duration::from_millis(200),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn seeds_placeholders_before_supervisors_report() {
        let store = Arc::new(HostStatusStore::new());
        let tokens = vec!["node1".to_string(), "node2".to_string()];
        let fleet = start(store.clone(), Arc::new(RefusingConnector), &tokens, options())
            .expect("fleet start");

        let snapshot = store.snapshot(None);
        let hosts: Vec<_> = snapshot.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(hosts, ["node1", "node2"]);
        for (_, text) in &snapshot {
            assert!(!text.is_empty());
        }

        fleet.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_partially_malformed_host_lists() {
        let store = Arc::new(HostStatusStore::new());
        let tokens = vec!["alice@node1:2222".to_string(), "not a token".to_string()];
        let fleet =
            start(store.clone(), Arc::new(EchoConnector), &tokens, options()).expect("fleet start");

        assert_eq!(fleet.host_count(), 1);
        assert!(store.entry("node1").is_some());

        fleet.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wholly_malformed_list_is_an_aggregate_error() {
        let store = Arc::new(HostStatusStore::new());
        let tokens = vec!["@@".to_string(), "also bad".to_string()];
        let err = start(store.clone(), Arc::new(EchoConnector), &tokens, options());

        match err {
            Err(FleetError::NoValidHosts { attempted, details }) => {
                assert_eq!(attempted, 2);
                assert!(details.contains("@@"));
            }
            other => panic!("expected NoValidHosts, got {other:?}"),
        }
        assert!(store.snapshot(None).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn command_overrides_reach_the_session() {
        let store = Arc::new(HostStatusStore::new());
        let tokens = vec!["node1".to_string(), "node2".to_string()];
        let mut opts = options();
        opts.command_overrides
            .insert("node2".to_string(), "nvidia-smi".to_string());
        let fleet =
            start(store.clone(), Arc::new(EchoConnector), &tokens, opts).expect("fleet start");

        tokio::time::sleep(Duration::from_millis(20)).await;
        fleet.stop().await;

        let node1 = store.entry("node1").expect("entry for node1");
        assert!(node1.raw_text.contains(DEFAULT_EXEC_COMMAND));
        let node2 = store.entry("node2").expect("entry for node2");
        assert!(node2.raw_text.contains("ran nvidia-smi"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_polling() {
        let store = Arc::new(HostStatusStore::new());
        let tokens = vec!["node1".to_string()];
        let fleet =
            start(store.clone(), Arc::new(EchoConnector), &tokens, options()).expect("fleet start");

        tokio::time::sleep(Duration::from_millis(120)).await;
        fleet.stop().await;
        let frozen = store.entry("node1").expect("entry for node1").raw_text;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let after = store.entry("node1").expect("entry for node1").raw_text;
        assert_eq!(frozen, after, "no writes after stop");
        assert!(!strip_ansi(&after).contains("Loading"));
    }
}
