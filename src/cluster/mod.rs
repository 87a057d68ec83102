//! Local cluster lifecycle
//!
//! Drives `k3d` as an external process to create, start, stop, and delete
//! the local development cluster, and parses its structured list output to
//! decide whether the cluster is running. Switching to a remote cluster is a
//! plain context switch through [`crate::deploy::Kubectl`].

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Ceiling on any single k3d invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between state polls while waiting for the cluster to come up
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Observed state of the local cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterState {
    /// At least one server node is running
    Running,
    /// The cluster exists but no server node is running
    Stopped,
    /// No cluster with this name exists
    Absent,
}

/// One cluster entry in `k3d cluster list -o json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterListEntry {
    name: String,
    #[serde(default)]
    servers_running: u32,
}

/// A named local development cluster managed through k3d
#[derive(Clone, Debug)]
pub struct LocalCluster {
    name: String,
}

impl LocalCluster {
    /// Handle for the named cluster; no process is spawned until an
    /// operation is called
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kubectl context this cluster registers
    pub fn context_name(&self) -> String {
        format!("k3d-{}", self.name)
    }

    /// Create the cluster and wait until a server node is running.
    ///
    /// Any existing cluster with the same name is deleted first so repeated
    /// create calls converge on a fresh cluster. Failure here is fatal to
    /// the caller's run.
    pub async fn create(&self, ready_timeout: Duration) -> Result<()> {
        info!(cluster = %self.name, "creating local cluster");

        // Best effort; an absent cluster makes this a no-op.
        let _ = run_k3d(&["cluster", "delete", self.name.as_str()]).await;

        run_k3d(&[
            "cluster",
            "create",
            self.name.as_str(),
            "--wait",
            "--timeout",
            "120s",
        ])
        .await?;

        self.wait_running(ready_timeout).await
    }

    /// Start a previously stopped cluster
    pub async fn start(&self, ready_timeout: Duration) -> Result<()> {
        info!(cluster = %self.name, "starting local cluster");
        run_k3d(&["cluster", "start", self.name.as_str()]).await?;
        self.wait_running(ready_timeout).await
    }

    /// Stop the cluster, keeping its state on disk
    pub async fn stop(&self) -> Result<()> {
        info!(cluster = %self.name, "stopping local cluster");
        run_k3d(&["cluster", "stop", self.name.as_str()]).await?;
        Ok(())
    }

    /// Delete the cluster and everything in it
    pub async fn delete(&self) -> Result<()> {
        info!(cluster = %self.name, "deleting local cluster");
        run_k3d(&["cluster", "delete", self.name.as_str()]).await?;
        Ok(())
    }

    /// Current state, from the tool's structured list output
    pub async fn state(&self) -> Result<ClusterState> {
        let raw = run_k3d(&["cluster", "list", "-o", "json"]).await?;
        state_from_list(&raw, &self.name)
    }

    /// Write the cluster's kubeconfig and return its path
    pub async fn write_kubeconfig(&self) -> Result<String> {
        let raw = run_k3d(&["kubeconfig", "write", self.name.as_str()]).await?;
        Ok(raw.trim().to_string())
    }

    /// Poll until the cluster reports running, bounded by `timeout`
    async fn wait_running(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.state().await? == ClusterState::Running {
                info!(cluster = %self.name, "cluster is running");
                return Ok(());
            }
            if started.elapsed() + POLL_INTERVAL > timeout {
                return Err(Error::Timeout(
                    timeout,
                    format!("waiting for cluster {} to run", self.name),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Derive the cluster's state from `k3d cluster list -o json` output
fn state_from_list(raw: &str, name: &str) -> Result<ClusterState> {
    let entries: Vec<ClusterListEntry> = serde_json::from_str(raw)?;
    Ok(entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| {
            if entry.servers_running > 0 {
                ClusterState::Running
            } else {
                ClusterState::Stopped
            }
        })
        .unwrap_or(ClusterState::Absent))
}

async fn run_k3d(args: &[&str]) -> Result<String> {
    debug!(?args, "k3d");
    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new("k3d")
            .args(args)
            .stdin(Stdio::null())
            .output(),
    )
    .await
    .map_err(|_| Error::Timeout(COMMAND_TIMEOUT, format!("k3d {}", args.join(" "))))??;

    if !output.status.success() {
        return Err(Error::command_failed(
            format!("k3d {}", args.join(" ")),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
