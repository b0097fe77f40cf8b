//! [`NetworkHost`] backed by NetworkManager's `nmcli`

use super::{HostError, HostErrorCode, JoinRequest, NetworkHost};
use log::debug;
use std::{path::PathBuf, time::Duration};
use tokio::process::Command;

#[derive(Clone, Debug)]
pub struct NmcliHost {
    program: PathBuf,
    wait: Duration,
}

impl Default for NmcliHost {
    fn default() -> Self {
        Self {
            program: PathBuf::from("nmcli"),
            wait: Duration::from_secs(30),
        }
    }
}

impl NmcliHost {
    pub fn new(program: impl Into<PathBuf>, wait: Duration) -> Self {
        Self {
            program: program.into(),
            wait,
        }
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, HostError> {
        debug!("{} {}", self.program.display(), redact(args).join(" "));

        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| HostError::new(HostErrorCode::Internal, format!("failed to run nmcli: {e}")))
    }

    async fn active_ssid(&self) -> Result<Option<String>, HostError> {
        let args = ["-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "--rescan", "no"]
            .map(String::from);
        let output = self.run(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HostError::new(
                code_for(output.status.code(), &stderr),
                stderr.trim(),
            ));
        }

        Ok(active_ssid_from(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl NetworkHost for NmcliHost {
    async fn join(&self, request: &JoinRequest) -> Result<(), HostError> {
        if self.active_ssid().await?.as_deref() == Some(request.ssid.as_str()) {
            return Err(HostError::new(
                HostErrorCode::AlreadyAssociated,
                format!("already associated with {}", request.ssid),
            ));
        }

        let output = self.run(&join_args(request, self.wait)).await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(HostError::new(
            code_for(output.status.code(), &stderr),
            stderr.trim(),
        ))
    }
}

fn join_args(request: &JoinRequest, wait: Duration) -> Vec<String> {
    let mut args = vec![
        "--wait".to_string(),
        wait.as_secs().to_string(),
        "device".to_string(),
        "wifi".to_string(),
        "connect".to_string(),
        request.ssid.clone(),
    ];

    if let Some(passphrase) = &request.passphrase {
        args.push("password".to_string());
        args.push(passphrase.clone());
    }
    if request.is_wep {
        args.push("wep-key-type".to_string());
        args.push("key".to_string());
    }

    args
}

fn redact(args: &[String]) -> Vec<&str> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        redacted.push(if hide_next { "***" } else { arg.as_str() });
        hide_next = arg == "password";
    }
    redacted
}

/// Map nmcli's exit status and error output onto a host error code
fn code_for(exit_code: Option<i32>, stderr: &str) -> HostErrorCode {
    let stderr = stderr.to_lowercase();

    if stderr.contains("not authorized") || stderr.contains("insufficient privileges") {
        return HostErrorCode::UserDenied;
    }
    if stderr.contains("secrets were required") || stderr.contains("invalid passphrase") {
        return HostErrorCode::InvalidPassphrase;
    }

    match exit_code {
        Some(2) => HostErrorCode::Invalid,
        // timed out while the connection was still activating
        Some(3) => HostErrorCode::Pending,
        Some(4) => HostErrorCode::Invalid,
        Some(8) => HostErrorCode::SystemConfiguration,
        Some(10) => HostErrorCode::NetworkNotFound,
        None => HostErrorCode::Internal,
        Some(_) => HostErrorCode::Unknown,
    }
}

/// SSID of the active network from `nmcli -t -f ACTIVE,SSID` output
fn active_ssid_from(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("yes:"))
        .map(|ssid| ssid.replace("\\:", ":").replace("\\\\", "\\"))
        .filter(|ssid| !ssid.is_empty())
}
