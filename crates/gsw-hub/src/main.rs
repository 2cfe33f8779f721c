mod server;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use gsw_core::HostStatusStore;
use gsw_fleet::{coordinator, FleetOptions, KnownHostsPolicy, PollConfig, SshConnector};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "gsw-hub",
    about = "Aggregates gpustat output from a fleet of hosts over SSH and serves it to live viewers"
)]
struct Args {
    /// Hosts to poll. Syntax: [USER@]HOSTNAME[:PORT]
    hosts: Vec<String>,
    /// Web application port.
    #[arg(long, default_value_t = 48109)]
    port: u16,
    /// Default SSH port for host tokens without one.
    #[arg(long, default_value_t = 22)]
    ssh_port: u16,
    /// Username applied to host tokens without one. Defaults to the
    /// invoking user.
    #[arg(long)]
    username: Option<String>,
    /// Polling interval in seconds; also the reconnect backoff.
    #[arg(long, default_value_t = 5.0)]
    interval: f64,
    /// Execution timeout for one remote command, in seconds.
    #[arg(long, default_value_t = 30)]
    exec_timeout: u64,
    /// Per-host command override, format HOST:COMMAND. Repeatable.
    #[arg(long = "exec")]
    exec: Vec<String>,
    /// Skip SSH host key verification.
    #[arg(long, default_value_t = false)]
    no_verify_host: bool,
    /// TLS certificate file (PEM). Serves HTTPS when given together
    /// with --ssl-keyfile; plain HTTP otherwise.
    #[arg(long)]
    ssl_certfile: Option<PathBuf>,
    /// TLS private key file (PEM).
    #[arg(long)]
    ssl_keyfile: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let hosts = if args.hosts.is_empty() {
        vec!["localhost".to_string()]
    } else {
        args.hosts.clone()
    };
    let username = args.username.clone().unwrap_or_else(whoami::username);
    let interval = Duration::from_secs_f64(args.interval.max(0.1));
    let command_overrides = parse_exec_overrides(&args.exec)?;

    let store = Arc::new(HostStatusStore::new());
    let connector = Arc::new(SshConnector::new(if args.no_verify_host {
        KnownHostsPolicy::AcceptUnknown
    } else {
        KnownHostsPolicy::Strict
    }));
    let fleet = coordinator::start(
        store.clone(),
        connector,
        &hosts,
        FleetOptions {
            default_port: args.ssh_port,
            default_username: username,
            command_overrides,
            poll: PollConfig {
                poll_interval: interval,
                exec_timeout: Duration::from_secs(args.exec_timeout),
            },
        },
    )
    .context("fleet startup failed")?;
    info!(hosts = fleet.host_count(), event = "fleet_launched");

    let state = Arc::new(server::AppState { store, interval });
    let app = server::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    match tls_paths(args.ssl_certfile.clone(), args.ssl_keyfile.clone())? {
        Some((certfile, keyfile)) => {
            let tls = RustlsConfig::from_pem_file(&certfile, &keyfile)
                .await
                .with_context(|| {
                    format!("failed to load TLS cert {certfile:?} / key {keyfile:?}")
                })?;
            info!(event = "hub_start", addr = %addr, tls = true);

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown_handle.graceful_shutdown(None);
            });
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("server error")?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(event = "hub_start", addr = %addr, tls = false);

            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
                .context("server error")?;
        }
    }

    info!(event = "hub_stop");
    fleet.stop().await;
    Ok(())
}

/// HTTPS needs both flags; one without the other is a configuration
/// error rather than a silent fallback to plain HTTP.
fn tls_paths(
    certfile: Option<PathBuf>,
    keyfile: Option<PathBuf>,
) -> anyhow::Result<Option<(PathBuf, PathBuf)>> {
    match (certfile, keyfile) {
        (Some(certfile), Some(keyfile)) => Ok(Some((certfile, keyfile))),
        (None, None) => Ok(None),
        _ => bail!("--ssl-certfile and --ssl-keyfile must be given together"),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Parses repeated `--exec HOST:COMMAND` flags. Overrides get the color
/// flags appended so their output matches the default command's.
fn parse_exec_overrides(entries: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut overrides = HashMap::new();
    for entry in entries {
        let Some((host, command)) = entry.split_once(':') else {
            bail!("invalid --exec entry {entry:?}, expected HOST:COMMAND");
        };
        if host.is_empty() || command.is_empty() {
            bail!("invalid --exec entry {entry:?}, expected HOST:COMMAND");
        }
        overrides.insert(host.to_string(), format!("{command} --color --force-color"));
    }
    Ok(overrides)
}
