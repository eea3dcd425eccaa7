// ABOUTME: Port-conflict guard run before a backend deploy touches the server.
// ABOUTME: Maps listening pids (lsof) to PM2 entries (pm2 jlist) to find the port's owner.

use serde::Deserialize;

use crate::remote::{Executor, Step, StepKind};
use crate::types::AppName;

use super::DeployError;

/// How many ports above the configured one are searched for a free suggestion.
const SUGGESTION_RANGE: u16 = 20;

/// What is listening on a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStatus {
    Free,
    /// Held by this app's own PM2 entry; a reload will take it over.
    OwnApp,
    /// Could not be determined (for example `lsof` is missing).
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Pm2Process {
    name: String,
    #[serde(default)]
    pid: Option<u32>,
}

fn listen_test(port: &str) -> String {
    format!("lsof -nP -t -iTCP:{} -sTCP:LISTEN", port)
}

/// Parse `pm2 jlist` output, tolerating banner lines around the JSON.
fn parse_pm2_list(output: &str) -> Vec<Pm2Process> {
    output
        .lines()
        .rev()
        .filter(|l| l.trim_start().starts_with('['))
        .find_map(|l| serde_json::from_str(l.trim()).ok())
        .unwrap_or_default()
}

/// Check that `port` is free or already held by `app`.
pub async fn check_port<E: Executor + ?Sized>(
    exec: &E,
    port: u16,
    app: &AppName,
) -> Result<PortStatus, DeployError> {
    let listing = exec
        .run(&Step::new(StepKind::PortQuery, listen_test(&port.to_string())))
        .await?;

    let pids: Vec<u32> = match listing.exit_code {
        0 => listing
            .stdout
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect(),
        // lsof exits 1 when nothing matches
        1 => return Ok(PortStatus::Free),
        code => {
            return Ok(PortStatus::Unknown(format!(
                "port query exited with code {}",
                code
            )));
        }
    };

    if pids.is_empty() {
        return Ok(PortStatus::Free);
    }

    let listing = exec
        .run(&Step::new(StepKind::ProcessList, "pm2 jlist"))
        .await?;
    let processes = if listing.success() {
        parse_pm2_list(&listing.stdout)
    } else {
        Vec::new()
    };

    let owner = processes
        .iter()
        .find(|p| p.pid.is_some_and(|pid| pids.contains(&pid)));

    match owner {
        Some(p) if p.name == app.as_str() => Ok(PortStatus::OwnApp),
        Some(p) => Err(DeployError::PortConflict {
            port,
            owner: format!("pm2 app '{}'", p.name),
            suggested: suggest_port(exec, port).await?,
        }),
        None => Err(DeployError::PortConflict {
            port,
            owner: format!(
                "unmanaged process (pid {})",
                pids.iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            suggested: suggest_port(exec, port).await?,
        }),
    }
}

/// First port among the next [`SUGGESTION_RANGE`] with no listener.
async fn suggest_port<E: Executor + ?Sized>(
    exec: &E,
    port: u16,
) -> Result<Option<u16>, DeployError> {
    let first = port.saturating_add(1);
    let last = port.saturating_add(SUGGESTION_RANGE);
    if first == port {
        return Ok(None);
    }

    let command = format!(
        "for p in $(seq {first} {last}); do {listen} >/dev/null 2>&1 || {{ echo $p; break; }}; done",
        listen = listen_test("$p"),
    );
    let output = exec
        .run(&Step::new(StepKind::PortQuery, command))
        .await?;

    Ok(output
        .stdout
        .lines()
        .next()
        .and_then(|l| l.trim().parse().ok()))
}
