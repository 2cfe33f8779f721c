use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static RE_HOST_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<user>[\w-]+)@)?(?P<host>[^:@\s]+)(?::(?P<port>\d+))?$")
        .expect("valid host token pattern")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseHostError {
    #[error("invalid host token {token:?}, expected [USER@]HOSTNAME[:PORT]")]
    InvalidToken { token: String },
    #[error("invalid port {port:?} in host token {token:?}")]
    InvalidPort { token: String, port: String },
}

/// One configured remote machine. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub exec_command: String,
}

impl HostEndpoint {
    /// Parses a `[USER@]HOSTNAME[:PORT]` token, filling in the defaults
    /// where the token leaves user or port out. The exec command starts
    /// empty; attach it with [`HostEndpoint::with_command`].
    pub fn parse(
        token: &str,
        default_port: u16,
        default_username: &str,
    ) -> Result<Self, ParseHostError> {
        let captures = RE_HOST_TOKEN
            .captures(token.trim())
            .ok_or_else(|| ParseHostError::InvalidToken {
                token: token.to_string(),
            })?;

        let hostname = captures
            .name("host")
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ParseHostError::InvalidToken {
                token: token.to_string(),
            })?;
        let username = captures
            .name("user")
            .map_or_else(|| default_username.to_string(), |m| m.as_str().to_string());
        let port = match captures.name("port") {
            Some(m) => m
                .as_str()
                .parse::<u16>()
                .map_err(|_| ParseHostError::InvalidPort {
                    token: token.to_string(),
                    port: m.as_str().to_string(),
                })?,
            None => default_port,
        };

        Ok(Self {
            hostname,
            port,
            username,
            exec_command: String::new(),
        })
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.exec_command = command.into();
        self
    }
}
