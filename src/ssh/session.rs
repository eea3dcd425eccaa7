// ABOUTME: One russh session reused for every remote step of an invocation.
// ABOUTME: Commands run under `sh -c` so the remote login shell never changes their meaning.

use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::auth;
use super::error::{Error, Result};
use super::host_keys::HostKeyPolicy;

/// Parameters for opening a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Only this key is offered when set.
    pub key_path: Option<PathBuf>,
    /// Accept and record keys of hosts missing from known_hosts.
    pub trust_on_first_use: bool,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Upper bound for a single remote command; installs and builds can be slow.
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(600),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// `user@host:port` for messages.
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Captured result of one command. Success is the exit status alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Wrap `command` so it runs under POSIX `sh` whatever the user's login shell is.
fn posix_command(command: &str) -> String {
    format!("sh -c {}", shell_escape::unix::escape(command.into()))
}

/// An authenticated SSH connection.
pub struct Session {
    config: SessionConfig,
    handle: Handle<HostKeyPolicy>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect, verify the host key, and authenticate.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        // Keepalives instead of an inactivity timeout: `npm ci` can be silent
        // for minutes.
        let russh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(15)),
            keepalive_max: 4,
            ..Default::default()
        };

        let policy = HostKeyPolicy::new(
            config.host.clone(),
            config.port,
            config.trust_on_first_use,
            config.known_hosts_path.clone(),
        );

        let connecting = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            policy,
        );
        let mut handle = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    host: config.host.clone(),
                    port: config.port,
                    timeout: config.connect_timeout,
                });
            }
            // Host key verdicts come back through the handler unchanged.
            Ok(Err(e)) if e.is_auth() => return Err(e),
            Ok(Err(e)) => {
                return Err(Error::Connection(format!(
                    "{}:{}: {}",
                    config.host, config.port, e
                )));
            }
            Ok(Ok(handle)) => handle,
        };

        auth::authenticate(
            &mut handle,
            &config.user,
            &config.host,
            config.key_path.as_deref(),
        )
        .await?;

        tracing::debug!("connected to {}", config.endpoint());
        Ok(Self { config, handle })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run `command` and capture its output, bounded by the command timeout.
    ///
    /// `input`, when given, is streamed to the command's stdin followed by EOF.
    pub async fn exec(&self, command: &str, input: Option<&str>) -> Result<CommandOutput> {
        let timeout = self.config.command_timeout;
        tokio::time::timeout(timeout, self.exec_inner(command, input))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))?
    }

    async fn exec_inner(&self, command: &str, input: Option<&str>) -> Result<CommandOutput> {
        tracing::trace!("exec: {}", command);

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;
        channel
            .exec(true, posix_command(command))
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec: {}", e)))?;

        if let Some(input) = input {
            channel
                .data(input.as_bytes())
                .await
                .map_err(|e| Error::CommandFailed(format!("failed to send stdin: {}", e)))?;
            channel
                .eof()
                .await
                .map_err(|e| Error::CommandFailed(format!("failed to close stdin: {}", e)))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut eof = false;

        // The exit status may arrive before or after EOF.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if eof {
                        break;
                    }
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    tracing::debug!("remote command killed by {:?}", signal_name);
                    // Shell convention for "killed by a signal".
                    exit_code.get_or_insert(255);
                }
                ChannelMsg::Eof => {
                    eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_allow_long_installs() {
        let config = SessionConfig::new("app.example.com", "deploy");
        assert_eq!(config.port, 22);
        assert!(!config.trust_on_first_use);
        assert_eq!(config.command_timeout, Duration::from_secs(600));
        assert_eq!(config.endpoint(), "deploy@app.example.com:22");
    }

    #[test]
    fn commands_are_wrapped_for_posix_sh() {
        assert_eq!(posix_command("echo hi"), "sh -c 'echo hi'");
        let wrapped = posix_command("for f in * .[!.]*; do echo \"$f\"; done");
        assert!(wrapped.starts_with("sh -c 'for f in * "));
        assert!(wrapped.ends_with("done'"));
        assert_eq!(posix_command("printf '%s' x"), "sh -c 'printf '\\''%s'\\'' x'");
    }

    #[test]
    fn success_is_exit_status_only() {
        let out = CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: "warning: deprecated".to_string(),
        };
        assert!(out.success());
    }
}
