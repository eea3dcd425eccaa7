// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, credentials, host key verification, and remote command transport.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connecting to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: std::time::Duration,
    },

    /// Every credential was offered and refused.
    #[error("authentication failed for {user}@{host} (tried {tried})")]
    AuthenticationFailed {
        user: String,
        host: String,
        tried: String,
    },

    #[error("no SSH credentials available: {0}")]
    NoCredentials(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("host key for {host}:{port} does not match known_hosts; refusing to connect")]
    HostKeyChanged { host: String, port: u16 },

    #[error("host {host}:{port} is not in known_hosts and trust_first_connection is off")]
    UnknownHost { host: String, port: u16 },

    #[error("remote command could not start: {0}")]
    CommandFailed(String),

    #[error("remote command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

impl Error {
    /// Whether the host could not be reached, or dropped us mid-command.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::ConnectTimeout { .. } | Error::ChannelClosed
        )
    }

    /// Whether the host was reached but we could not establish trust either way.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed { .. }
                | Error::NoCredentials(_)
                | Error::KeyLoadFailed { .. }
                | Error::HostKeyChanged { .. }
                | Error::UnknownHost { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
