// ABOUTME: rsync invocation for pushing application files to the server.
// ABOUTME: Builds the argument vector, including the ssh remote shell, from session parameters.

use std::ffi::OsString;
use std::path::Path;

use crate::ssh::SessionConfig;

/// Local programs used for file transfer.
#[derive(Debug, Clone)]
pub struct RsyncOptions {
    pub rsync_bin: String,
    pub ssh_bin: String,
}

impl Default for RsyncOptions {
    fn default() -> Self {
        Self {
            rsync_bin: "rsync".to_string(),
            ssh_bin: "ssh".to_string(),
        }
    }
}

/// Build rsync arguments pushing `local` to `remote` on the session's host.
///
/// Directory sources get a trailing slash so their contents land in `remote`,
/// plus `--delete` so the destination mirrors the source.
pub fn build_rsync_args(
    options: &RsyncOptions,
    session: &SessionConfig,
    local: &Path,
    remote: &str,
    excludes: &[String],
) -> Vec<OsString> {
    let is_dir = local.is_dir();
    let mut args = vec![OsString::from("-az")];

    if is_dir {
        args.push(OsString::from("--delete"));
    }

    for pattern in excludes {
        args.push(OsString::from("--exclude"));
        args.push(OsString::from(pattern));
    }

    args.push(OsString::from("--rsh"));
    args.push(OsString::from(remote_shell(options, session)));

    if is_dir {
        let mut source = local.as_os_str().to_os_string();
        if !source.to_string_lossy().ends_with('/') {
            source.push("/");
        }
        args.push(source);
        args.push(OsString::from(format!(
            "{}@{}:{}/",
            session.user,
            session.host,
            remote.trim_end_matches('/')
        )));
    } else {
        args.push(local.as_os_str().to_os_string());
        args.push(OsString::from(format!(
            "{}@{}:{}",
            session.user, session.host, remote
        )));
    }

    args
}

fn remote_shell(options: &RsyncOptions, session: &SessionConfig) -> String {
    let mut parts = vec![
        options.ssh_bin.clone(),
        "-p".to_string(),
        session.port.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
    ];

    if let Some(key) = &session.key_path {
        parts.push("-i".to_string());
        parts.push(escape_path(key));
    }

    if let Some(known_hosts) = &session.known_hosts_path {
        parts.push("-o".to_string());
        parts.push(format!("UserKnownHostsFile={}", escape_path(known_hosts)));
    }

    if session.trust_on_first_use {
        parts.push("-o".to_string());
        parts.push("StrictHostKeyChecking=accept-new".to_string());
    }

    parts.join(" ")
}

fn escape_path(path: &Path) -> String {
    shell_escape::unix::escape(path.to_string_lossy()).into_owned()
}
