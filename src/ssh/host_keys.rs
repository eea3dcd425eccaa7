// ABOUTME: Server host key verification against known_hosts.
// ABOUTME: Unknown hosts are learned when trust_first_connection is on; changed keys always abort.

use russh::client;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use std::path::PathBuf;

use super::error::Error;

/// russh client handler enforcing the configured host key policy.
pub(crate) struct HostKeyPolicy {
    host: String,
    port: u16,
    trust_first_connection: bool,
    known_hosts_path: Option<PathBuf>,
}

impl HostKeyPolicy {
    pub(crate) fn new(
        host: String,
        port: u16,
        trust_first_connection: bool,
        known_hosts_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host,
            port,
            trust_first_connection,
            known_hosts_path,
        }
    }

    fn check(&self, key: &ssh_key::PublicKey) -> Result<bool, russh::keys::Error> {
        match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        }
    }

    fn learn(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!("could not record host key for {}: {}", self.host, e);
        }
    }

    fn unknown(&self) -> Error {
        Error::UnknownHost {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl client::Handler for HostKeyPolicy {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.check(server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) if self.trust_first_connection => {
                tracing::warn!(
                    "accepting and recording new host key for {}:{}",
                    self.host,
                    self.port
                );
                self.learn(server_public_key);
                Ok(true)
            }
            Ok(false) => Err(self.unknown()),
            Err(russh::keys::Error::KeyChanged { line }) => {
                tracing::error!(
                    "host key for {} changed (known_hosts line {})",
                    self.host,
                    line
                );
                Err(Error::HostKeyChanged {
                    host: self.host.clone(),
                    port: self.port,
                })
            }
            // Missing or unreadable known_hosts file.
            Err(e) if self.trust_first_connection => {
                tracing::debug!("known_hosts unavailable ({}), trusting {}", e, self.host);
                self.learn(server_public_key);
                Ok(true)
            }
            Err(_) => Err(self.unknown()),
        }
    }
}
