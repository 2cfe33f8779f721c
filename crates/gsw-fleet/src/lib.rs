//! Fleet collection layer: one supervisor task per configured host keeps
//! a persistent remote session, polls the status command forever, and
//! writes the latest output (or failure text) into the shared store.

pub mod coordinator;
pub mod error;
pub mod exec;
pub mod supervisor;

pub use coordinator::{start, FleetHandle, FleetOptions, DEFAULT_EXEC_COMMAND};
pub use error::FleetError;
pub use exec::{ExecOutput, KnownHostsPolicy, RemoteConnector, RemoteSession, SshConnector};
pub use supervisor::{HostSupervisor, PollConfig};
