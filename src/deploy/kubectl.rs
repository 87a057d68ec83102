//! kubectl process runner
//!
//! Everything this crate tells the cluster goes through the control-plane
//! CLI as an external process: manifests are piped to `apply -f -` on stdin
//! (one invocation per service batch), namespace creation uses the
//! idempotent dry-run-then-apply pattern, and status reads come back as
//! JSON. The [`KubectlRunner`] trait is the seam the orchestrator and health
//! checker are tested against.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Ceiling on any single kubectl invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Abstraction over the control-plane command tool
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubectlRunner: Send + Sync {
    /// Apply a multi-document manifest blob via stdin; returns stdout
    async fn apply(&self, manifest: &str) -> Result<String>;

    /// Idempotently create a namespace (dry-run render, then apply)
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    /// Switch the active context
    async fn use_context(&self, context: &str) -> Result<()>;

    /// List pods in a namespace matching a label selector, as JSON
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<serde_json::Value>;

    /// Fetch the endpoints object for a service, as JSON
    async fn get_endpoints(&self, name: &str, namespace: &str) -> Result<serde_json::Value>;
}

/// Production runner driving the `kubectl` binary
#[derive(Clone, Debug, Default)]
pub struct Kubectl {
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl Kubectl {
    /// Runner against the ambient kubeconfig and context
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a kubeconfig file
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Pin a context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }

    /// Run kubectl with the given args, capturing stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut full_args = self.base_args();
        full_args.extend(args.iter().map(|s| s.to_string()));
        debug!(args = ?full_args, "kubectl");

        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new("kubectl").args(&full_args).output(),
        )
        .await
        .map_err(|_| {
            Error::Timeout(COMMAND_TIMEOUT, format!("kubectl {}", args.join(" ")))
        })??;

        if !output.status.success() {
            return Err(Error::command_failed(
                format!("kubectl {}", args.join(" ")),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run kubectl with the given args, writing `stdin_payload` to stdin
    async fn run_with_stdin(&self, args: &[&str], stdin_payload: &str) -> Result<String> {
        let mut full_args = self.base_args();
        full_args.extend(args.iter().map(|s| s.to_string()));
        debug!(args = ?full_args, bytes = stdin_payload.len(), "kubectl (stdin)");

        let mut child = Command::new("kubectl")
            .args(&full_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(stdin_payload.as_bytes()).await?;
        }

        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Timeout(COMMAND_TIMEOUT, format!("kubectl {}", args.join(" ")))
            })??;

        if !output.status.success() {
            return Err(Error::command_failed(
                format!("kubectl {}", args.join(" ")),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl KubectlRunner for Kubectl {
    async fn apply(&self, manifest: &str) -> Result<String> {
        self.run_with_stdin(&["apply", "-f", "-"], manifest).await
    }

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        // Render with a client-side dry run, then apply the rendered object:
        // succeeds whether or not the namespace already exists.
        let rendered = self
            .run(&["create", "namespace", name, "--dry-run=client", "-o", "yaml"])
            .await
            .map_err(|e| match e {
                Error::CommandFailed { message, .. } => {
                    Error::command_failed(format!("create namespace {name}"), message)
                }
                other => other,
            })?;
        self.run_with_stdin(&["apply", "-f", "-"], &rendered).await?;
        Ok(())
    }

    async fn use_context(&self, context: &str) -> Result<()> {
        self.run(&["config", "use-context", context]).await?;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<serde_json::Value> {
        let raw = self
            .run(&["get", "pods", "-n", namespace, "-l", selector, "-o", "json"])
            .await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn get_endpoints(&self, name: &str, namespace: &str) -> Result<serde_json::Value> {
        let raw = self
            .run(&["get", "endpoints", name, "-n", namespace, "-o", "json"])
            .await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_args_carry_kubeconfig_and_context() {
        let runner = Kubectl::new()
            .with_kubeconfig("/tmp/kubeconfig")
            .with_context("dev");
        let args = runner.base_args();
        assert_eq!(
            args,
            vec!["--kubeconfig", "/tmp/kubeconfig", "--context", "dev"]
        );
    }

    #[test]
    fn default_runner_adds_no_flags() {
        assert!(Kubectl::new().base_args().is_empty());
    }
}
