// ABOUTME: Credential selection for SSH public key authentication.
// ABOUTME: An explicit key wins; otherwise agent identities, then default key files, are offered in turn.

use russh::client::Handle;
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{Error, Result};
use super::host_keys::HostKeyPolicy;

/// Key files tried when no key is configured and the agent has none that work.
const DEFAULT_KEYS: [&str; 3] = [".ssh/id_ed25519", ".ssh/id_ecdsa", ".ssh/id_rsa"];

fn default_key_paths() -> Vec<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| {
            DEFAULT_KEYS
                .iter()
                .map(|k| Path::new(&home).join(k))
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default()
}

async fn offer_key_file(
    session: &mut Handle<HostKeyPolicy>,
    user: &str,
    path: &Path,
) -> Result<bool> {
    let key = load_secret_key(path, None).map_err(|e| Error::KeyLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let hash_alg = session.best_supported_rsa_hash().await?.flatten();
    let result = session
        .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
        .await?;
    Ok(result.success())
}

/// Offer every agent identity. Returns how many were offered.
async fn offer_agent(session: &mut Handle<HostKeyPolicy>, user: &str) -> Result<(bool, usize)> {
    let Ok(mut agent) = AgentClient::connect_env().await else {
        return Ok((false, 0));
    };
    let identities = match agent.request_identities().await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::debug!("ssh-agent did not list identities: {}", e);
            return Ok((false, 0));
        }
    };

    for key in &identities {
        let accepted = session
            .authenticate_publickey_with(user, key.clone(), None, &mut agent)
            .await
            .is_ok_and(|r| r.success());
        if accepted {
            return Ok((true, identities.len()));
        }
    }
    Ok((false, identities.len()))
}

/// Authenticate `user`, failing with the list of credentials tried.
///
/// A configured `key_path` is the only credential offered, and failing to
/// load it is an error. Without one, the agent goes first; unreadable
/// default key files are skipped.
pub(crate) async fn authenticate(
    session: &mut Handle<HostKeyPolicy>,
    user: &str,
    host: &str,
    key_path: Option<&Path>,
) -> Result<()> {
    let mut tried = Vec::new();

    if let Some(path) = key_path {
        if offer_key_file(session, user, path).await? {
            return Ok(());
        }
        tried.push(path.display().to_string());
    } else {
        let (accepted, offered) = offer_agent(session, user).await?;
        if accepted {
            return Ok(());
        }
        if offered > 0 {
            tried.push(format!("ssh-agent ({} keys)", offered));
        }

        for path in default_key_paths() {
            match offer_key_file(session, user, &path).await {
                Ok(true) => return Ok(()),
                Ok(false) => tried.push(path.display().to_string()),
                Err(Error::KeyLoadFailed { path, reason }) => {
                    tracing::debug!("skipping {}: {}", path.display(), reason);
                }
                Err(e) => return Err(e),
            }
        }
    }

    if tried.is_empty() {
        return Err(Error::NoCredentials(
            "no ssh-agent identities and no key in ~/.ssh; set server.key_path".to_string(),
        ));
    }
    Err(Error::AuthenticationFailed {
        user: user.to_string(),
        host: host.to_string(),
        tried: tried.join(", "),
    })
}
