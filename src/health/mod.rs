//! Health status polling for deployed services
//!
//! Classifies a service/namespace pair from workload and network-endpoint
//! status, and supports waiting until a service is usable with bounded
//! retries. Status reads go through the same [`KubectlRunner`] seam as the
//! orchestrator, so everything here is testable without a cluster.

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::deploy::KubectlRunner;
use crate::{Error, Result, NAME_LABEL};

/// Classification of one service's current state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    /// Every instance is running and ready and at least one endpoint is
    /// available
    Healthy,
    /// Instances are still appearing or converging
    Pending,
    /// Zero instances ready and zero endpoints available
    Unhealthy,
    /// Status could not be determined (query failed)
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Pending => "pending",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One workload instance, as observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodHealth {
    /// Pod name
    pub name: String,
    /// Lifecycle phase (Running, Pending, ...)
    pub phase: String,
    /// All containers ready
    pub ready: bool,
}

/// One network endpoint address, as observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointHealth {
    /// Endpoint IP
    pub address: String,
    /// Listed under ready addresses
    pub ready: bool,
}

/// Full status record for a service/namespace pair
#[derive(Clone, Debug)]
pub struct ServiceHealth {
    /// Service name
    pub service: String,
    /// Namespace
    pub namespace: String,
    /// Derived classification
    pub status: HealthStatus,
    /// Observed workload instances
    pub pods: Vec<PodHealth>,
    /// Observed endpoint addresses
    pub endpoints: Vec<EndpointHealth>,
    /// Human-readable notes accumulated while classifying
    pub messages: Vec<String>,
}

/// Polling policy for [`HealthChecker::wait_until_healthy`]
#[derive(Clone, Debug)]
pub struct WaitOptions {
    /// Wall-clock ceiling on the whole wait
    pub timeout: Duration,
    /// Fixed interval between polls
    pub interval: Duration,
    /// Consecutive healthy results required to resolve
    pub required_successes: u32,
    /// Consecutive non-healthy results that fail the wait
    pub allowed_failures: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(2),
            required_successes: 2,
            allowed_failures: 30,
        }
    }
}

/// Polls workload and endpoint status through the control-plane tool
pub struct HealthChecker<R: KubectlRunner> {
    runner: R,
}

impl<R: KubectlRunner> HealthChecker<R> {
    /// Create a checker over the given runner
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Classify one service/namespace pair.
    ///
    /// A failing endpoint query is treated as "no endpoints yet" (the object
    /// does not exist until the service has been applied); a failing pod
    /// query is an error.
    pub async fn check(&self, service: &str, namespace: &str) -> Result<ServiceHealth> {
        let selector = format!("{NAME_LABEL}={service}");
        let pod_json = self.runner.list_pods(namespace, &selector).await?;
        let pods = parse_pods(&pod_json)?;

        let mut messages = Vec::new();
        let endpoints = match self.runner.get_endpoints(service, namespace).await {
            Ok(endpoint_json) => parse_endpoints(&endpoint_json)?,
            Err(e) => {
                messages.push(format!("endpoints not readable: {e}"));
                Vec::new()
            }
        };

        let status = classify(&pods, &endpoints, &mut messages);
        debug!(service, namespace, %status, pods = pods.len(), "health check");
        Ok(ServiceHealth {
            service: service.to_string(),
            namespace: namespace.to_string(),
            status,
            pods,
            endpoints,
            messages,
        })
    }

    /// Like [`HealthChecker::check`], but a failed query yields an `Unknown`
    /// record instead of an error
    pub async fn check_or_unknown(&self, service: &str, namespace: &str) -> ServiceHealth {
        match self.check(service, namespace).await {
            Ok(health) => health,
            Err(e) => ServiceHealth {
                service: service.to_string(),
                namespace: namespace.to_string(),
                status: HealthStatus::Unknown,
                pods: Vec::new(),
                endpoints: Vec::new(),
                messages: vec![format!("status query failed: {e}")],
            },
        }
    }

    /// Check several independent services concurrently; result order matches
    /// input order
    pub async fn check_all(&self, pairs: &[(String, String)]) -> Vec<ServiceHealth> {
        join_all(
            pairs
                .iter()
                .map(|(service, namespace)| self.check_or_unknown(service, namespace)),
        )
        .await
    }

    /// Poll on a fixed interval until the service is healthy.
    ///
    /// Resolves once `required_successes` consecutive healthy results are
    /// observed. Fails with [`Error::Unhealthy`] once `allowed_failures`
    /// consecutive non-healthy results accumulate, or [`Error::Timeout`]
    /// when the wall clock elapses - whichever comes first.
    pub async fn wait_until_healthy(
        &self,
        service: &str,
        namespace: &str,
        options: &WaitOptions,
    ) -> Result<ServiceHealth> {
        let started = Instant::now();
        let mut consecutive_successes = 0u32;
        let mut consecutive_failures = 0u32;

        loop {
            let health = self.check_or_unknown(service, namespace).await;
            if health.status == HealthStatus::Healthy {
                consecutive_successes += 1;
                consecutive_failures = 0;
                if consecutive_successes >= options.required_successes.max(1) {
                    info!(service, namespace, "service healthy");
                    return Ok(health);
                }
            } else {
                consecutive_failures += 1;
                consecutive_successes = 0;
                warn!(
                    service,
                    namespace,
                    status = %health.status,
                    consecutive_failures,
                    "service not healthy yet"
                );
                if consecutive_failures >= options.allowed_failures.max(1) {
                    return Err(Error::Unhealthy(format!(
                        "{namespace}/{service} observed {consecutive_failures} consecutive non-healthy results, last status {}",
                        health.status
                    )));
                }
            }

            if started.elapsed() + options.interval > options.timeout {
                return Err(Error::Timeout(
                    options.timeout,
                    format!("waiting for {namespace}/{service} to become healthy"),
                ));
            }
            tokio::time::sleep(options.interval).await;
        }
    }
}

// Minimal views over the platform's structured status output; everything not
// needed for classification is ignored.

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: PodItemMeta,
    #[serde(default)]
    status: PodItemStatus,
}

#[derive(Debug, Deserialize)]
struct PodItemMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodItemStatus {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct EndpointsObject {
    #[serde(default)]
    subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointSubset {
    #[serde(default)]
    addresses: Vec<EndpointAddress>,
    #[serde(default)]
    not_ready_addresses: Vec<EndpointAddress>,
}

#[derive(Debug, Deserialize)]
struct EndpointAddress {
    ip: String,
}

fn parse_pods(json: &serde_json::Value) -> Result<Vec<PodHealth>> {
    let list: PodList = serde_json::from_value(json.clone())?;
    Ok(list
        .items
        .into_iter()
        .map(|item| PodHealth {
            name: item.metadata.name,
            ready: !item.status.container_statuses.is_empty()
                && item.status.container_statuses.iter().all(|c| c.ready),
            phase: item.status.phase,
        })
        .collect())
}

fn parse_endpoints(json: &serde_json::Value) -> Result<Vec<EndpointHealth>> {
    let object: EndpointsObject = serde_json::from_value(json.clone())?;
    let mut endpoints = Vec::new();
    for subset in object.subsets {
        for addr in subset.addresses {
            endpoints.push(EndpointHealth {
                address: addr.ip,
                ready: true,
            });
        }
        for addr in subset.not_ready_addresses {
            endpoints.push(EndpointHealth {
                address: addr.ip,
                ready: false,
            });
        }
    }
    Ok(endpoints)
}

fn classify(
    pods: &[PodHealth],
    endpoints: &[EndpointHealth],
    messages: &mut Vec<String>,
) -> HealthStatus {
    if pods.is_empty() {
        messages.push("no matching pods yet".to_string());
        return HealthStatus::Pending;
    }

    let running_ready = pods.iter().filter(|p| p.phase == "Running" && p.ready).count();
    let available_endpoints = endpoints.iter().filter(|e| e.ready).count();

    if running_ready == pods.len() && available_endpoints > 0 {
        return HealthStatus::Healthy;
    }
    if running_ready == 0 && available_endpoints == 0 {
        messages.push("no ready pods and no available endpoints".to_string());
        return HealthStatus::Unhealthy;
    }
    messages.push(format!(
        "{running_ready}/{} pods ready, {available_endpoints} endpoints available",
        pods.len()
    ));
    HealthStatus::Pending
}
