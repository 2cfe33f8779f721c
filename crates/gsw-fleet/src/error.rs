use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("command did not complete within {seconds}s")]
    Timeout { seconds: u64 },
    #[error("[Error {code}] {detail}")]
    Command { code: i32, detail: String },
    #[error("session dropped: {0}")]
    Transport(String),
    #[error("no valid hosts among {attempted} token(s): {details}")]
    NoValidHosts { attempted: usize, details: String },
}

impl FleetError {
    /// Stable kind tag used in stored failure messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FleetError::Connect(_) => "ConnectError",
            FleetError::Timeout { .. } => "TimeoutError",
            FleetError::Command { .. } => "CommandError",
            FleetError::Transport(_) => "TransportError",
            FleetError::NoValidHosts { .. } => "ConfigError",
        }
    }
}
