//! Deployment orchestration
//!
//! The orchestrator sequences namespace creation, infrastructure services,
//! and application services according to the order produced by the
//! dependency resolver, applying each service's documents as one batch
//! through the control-plane tool.
//!
//! Failure policy, per the error taxonomy: namespace creation failures are
//! fatal to the run; a single infra-service failure skips that service and
//! continues (independent infra services commonly have no relation to each
//! other); an application-service failure aborts only that service's
//! contribution. The report carries item-level granularity rather than an
//! all-or-nothing outcome.

pub mod kubectl;

use std::sync::Arc;

use tracing::{error, info, warn};

pub use kubectl::{Kubectl, KubectlRunner};

use crate::catalog::{Catalog, Tier};
use crate::compiler::ManifestCompiler;
use crate::graph::DependencyResolver;
use crate::manifest::{serialize_manifests, Manifest};
use crate::retry::{retry, RetryConfig};
use crate::{Error, Result};

/// Which pipeline a service went through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceRole {
    /// Stateful infrastructure dependency
    Infra,
    /// Requested application service
    App,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infra => f.write_str("infra"),
            Self::App => f.write_str("app"),
        }
    }
}

/// Per-service result of a deployment run
#[derive(Debug)]
pub struct ServiceOutcome {
    /// Service name
    pub name: String,
    /// Which pipeline it went through
    pub role: ServiceRole,
    /// What happened
    pub result: Result<()>,
}

/// Aggregated result of one `deploy` invocation
#[derive(Debug, Default)]
pub struct DeployReport {
    /// One entry per touched service, in apply order
    pub outcomes: Vec<ServiceOutcome>,
}

impl DeployReport {
    /// Names of the services that applied cleanly
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Names of the services that failed
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.name.as_str())
            .collect()
    }

    /// True when every touched service applied cleanly
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    fn record(&mut self, name: impl Into<String>, role: ServiceRole, result: Result<()>) {
        self.outcomes.push(ServiceOutcome {
            name: name.into(),
            role,
            result,
        });
    }
}

impl std::fmt::Display for DeployReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(()) => writeln!(f, "{} {}: ok", outcome.role, outcome.name)?,
                Err(e) => writeln!(f, "{} {}: failed: {}", outcome.role, outcome.name, e)?,
            }
        }
        Ok(())
    }
}

/// Sequences and applies a requested service set against a live cluster
///
/// All collaborators are constructor-injected; the orchestrator owns the
/// resolver (and with it the dependency cache) for the life of the run.
pub struct Orchestrator<R: KubectlRunner> {
    resolver: DependencyResolver,
    compiler: ManifestCompiler,
    runner: R,
    retry: RetryConfig,
}

impl<R: KubectlRunner> Orchestrator<R> {
    /// Create an orchestrator over the given catalog and runner
    pub fn new(catalog: Arc<Catalog>, compiler: ManifestCompiler, runner: R) -> Self {
        Self {
            resolver: DependencyResolver::new(catalog),
            compiler,
            runner,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy for apply invocations
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The resolver (exposed so callers can invalidate cached entries
    /// between runs)
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Resolve the deployment order for a requested set, surfacing
    /// [`Error::CycleDetected`] to the caller.
    ///
    /// This is the strict variant used by explicit ordering requests;
    /// [`Orchestrator::deploy`] falls back to the caller-supplied order
    /// instead.
    pub fn deployment_order(&self, requested: &[&str]) -> Result<Vec<String>> {
        self.resolver.order(requested)
    }

    /// Deploy the requested application services and their infrastructure
    /// dependencies, in dependency order.
    pub async fn deploy(&self, requested: &[&str]) -> Result<DeployReport> {
        let mut report = DeployReport::default();

        // Namespace creation is the foundation of everything that follows;
        // failure here aborts the whole run.
        for tier in Tier::all() {
            self.runner.ensure_namespace(tier.namespace()).await?;
        }

        // Split the request into known services and immediate failures so a
        // typo does not abort its neighbors.
        let mut known: Vec<&str> = Vec::new();
        for &name in requested {
            if self.resolver.catalog().service(name).is_some() {
                known.push(name);
            } else {
                warn!(service = name, "requested service not in catalog, skipping");
                report.record(name, ServiceRole::App, Err(Error::ServiceNotFound(name.to_string())));
            }
        }

        self.deploy_infra(&known, &mut report).await?;
        self.deploy_apps(&known, &mut report).await;

        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            "deployment finished"
        );
        Ok(report)
    }

    async fn deploy_infra(&self, requested: &[&str], report: &mut DeployReport) -> Result<()> {
        let infra = match self.resolver.infra_dependencies(requested) {
            Ok(ordered) => ordered,
            Err(Error::CycleDetected { path }) => {
                // Infra ordering is best-effort: fall back to name order and
                // let the cluster's own convergence sort out the rest.
                warn!(path = ?path, "infra dependency cycle, falling back to name order");
                let mut names: Vec<String> = Vec::new();
                for &name in requested {
                    for dep in self.resolver.resolve(name)? {
                        if self.resolver.catalog().infra(&dep).is_some()
                            && !names.contains(&dep)
                        {
                            names.push(dep);
                        }
                    }
                }
                names.sort();
                names
            }
            Err(other) => return Err(other),
        };

        for name in infra {
            let Some(config) = self.resolver.catalog().infra(&name).cloned() else {
                continue;
            };

            let result = async {
                if !Tier::all().iter().any(|t| t.namespace() == config.namespace) {
                    self.runner.ensure_namespace(&config.namespace).await?;
                }
                let manifests = self.compiler.generate_infra(&config)?;
                self.apply_batch(&name, &manifests).await
            }
            .await;

            if let Err(e) = &result {
                // Non-fatal: independent infra services commonly have no
                // relation to each other, so the batch continues.
                error!(service = %name, error = %e, "infra service failed, continuing");
            } else {
                info!(service = %name, "infra service applied");
            }
            report.record(name, ServiceRole::Infra, result);
        }
        Ok(())
    }

    async fn deploy_apps(&self, requested: &[&str], report: &mut DeployReport) {
        let ordered = match self.resolver.order(requested) {
            Ok(ordered) => ordered,
            Err(Error::CycleDetected { path }) => {
                warn!(path = ?path, "dependency cycle among requested services, using caller order");
                requested.iter().map(|s| s.to_string()).collect()
            }
            Err(other) => {
                // resolve() was already exercised for every known name in
                // deploy_infra; anything else here is unexpected but should
                // not take the batch down.
                error!(error = %other, "ordering failed, using caller order");
                requested.iter().map(|s| s.to_string()).collect()
            }
        };

        for name in ordered {
            let Some(def) = self.resolver.catalog().service(&name).cloned() else {
                report.record(
                    name.clone(),
                    ServiceRole::App,
                    Err(Error::ServiceNotFound(name)),
                );
                continue;
            };

            let result = async {
                let namespace = def.namespace().to_string();
                if !Tier::all().iter().any(|t| t.namespace() == namespace) {
                    self.runner.ensure_namespace(&namespace).await?;
                }
                let manifests = self.compiler.generate_app(&def, def.tier)?;
                self.apply_batch(&name, &manifests).await
            }
            .await;

            if let Err(e) = &result {
                error!(service = %name, error = %e, "application service failed");
            } else {
                info!(service = %name, "application service applied");
            }
            report.record(name, ServiceRole::App, result);
        }
    }

    /// Serialize one service's documents and apply them in a single
    /// invocation, retrying transient tool failures
    async fn apply_batch(&self, service: &str, manifests: &[Manifest]) -> Result<()> {
        if manifests.is_empty() {
            return Err(Error::generation(format!(
                "no manifests generated for {service}"
            )));
        }
        // Validation happens inside serialization, before any network call.
        let blob = serialize_manifests(manifests)?;
        retry(&self.retry, &format!("apply {service}"), || {
            self.runner.apply(&blob)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubectl::MockKubectlRunner;
    use std::sync::Mutex;
    use std::time::Duration;

    const CATALOG: &str = r#"
infrastructure:
  - name: cache
    namespace: core
    image: redis:7
    ports:
      - name: redis
        containerPort: 6379
    volumes:
      - name: data
        mountPath: /data
        size: 1Gi
services:
  - name: app1
    image: registry.local/app1:1
    dependencies: [cache]
    ports:
      - name: http
        containerPort: 8080
"#;

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::from_yaml(CATALOG).unwrap())
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn infra_applies_before_the_app_that_needs_it() {
        let applied: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let mut runner = MockKubectlRunner::new();
        runner.expect_ensure_namespace().times(3).returning(|_| Ok(()));
        let sink = applied.clone();
        runner.expect_apply().times(2).returning(move |blob| {
            sink.lock().unwrap().push(blob.to_string());
            Ok(String::new())
        });

        let orchestrator =
            Orchestrator::new(catalog(), ManifestCompiler::new(), runner).with_retry_config(fast_retry());
        let report = orchestrator.deploy(&["app1"]).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded(), vec!["cache", "app1"]);

        let blobs = applied.lock().unwrap();
        assert!(blobs[0].contains("name: cache"));
        assert!(blobs[1].contains("name: app1"));
    }

    #[tokio::test]
    async fn namespace_failure_aborts_the_run() {
        let mut runner = MockKubectlRunner::new();
        runner
            .expect_ensure_namespace()
            .returning(|ns| Err(Error::command_failed(format!("create namespace {ns}"), "denied")));
        runner.expect_apply().never();

        let orchestrator =
            Orchestrator::new(catalog(), ManifestCompiler::new(), runner).with_retry_config(fast_retry());
        assert!(orchestrator.deploy(&["app1"]).await.is_err());
    }

    #[tokio::test]
    async fn infra_failure_does_not_stop_the_app() {
        let mut runner = MockKubectlRunner::new();
        runner.expect_ensure_namespace().times(3).returning(|_| Ok(()));
        runner.expect_apply().times(2).returning(|blob| {
            if blob.contains("name: cache") {
                Err(Error::command_failed("kubectl apply", "connection refused"))
            } else {
                Ok(String::new())
            }
        });

        let orchestrator =
            Orchestrator::new(catalog(), ManifestCompiler::new(), runner).with_retry_config(fast_retry());
        let report = orchestrator.deploy(&["app1"]).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed(), vec!["cache"]);
        assert_eq!(report.succeeded(), vec!["app1"]);
    }

    #[tokio::test]
    async fn unknown_service_is_reported_not_fatal() {
        let mut runner = MockKubectlRunner::new();
        runner.expect_ensure_namespace().times(3).returning(|_| Ok(()));
        runner.expect_apply().times(2).returning(|_| Ok(String::new()));

        let orchestrator =
            Orchestrator::new(catalog(), ManifestCompiler::new(), runner).with_retry_config(fast_retry());
        let report = orchestrator.deploy(&["ghost", "app1"]).await.unwrap();

        assert_eq!(report.failed(), vec!["ghost"]);
        assert!(report.succeeded().contains(&"app1"));
        let ghost = report.outcomes.iter().find(|o| o.name == "ghost").unwrap();
        assert!(matches!(
            ghost.result,
            Err(Error::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cyclic_apps_fall_back_to_caller_order() {
        let doc = r#"
services:
  - name: a
    image: r/a:1
    dependencies: [b]
  - name: b
    image: r/b:1
    dependencies: [a]
"#;
        let applied: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let mut runner = MockKubectlRunner::new();
        runner.expect_ensure_namespace().times(3).returning(|_| Ok(()));
        let sink = applied.clone();
        runner.expect_apply().times(2).returning(move |blob| {
            sink.lock().unwrap().push(blob.to_string());
            Ok(String::new())
        });

        let orchestrator = Orchestrator::new(
            Arc::new(Catalog::from_yaml(doc).unwrap()),
            ManifestCompiler::new(),
            runner,
        )
        .with_retry_config(fast_retry());

        let report = orchestrator.deploy(&["b", "a"]).await.unwrap();
        assert!(report.is_success());
        // Caller order preserved on fallback.
        let blobs = applied.lock().unwrap();
        assert!(blobs[0].contains("name: b"));
        assert!(blobs[1].contains("name: a"));
    }

    #[tokio::test]
    async fn strict_ordering_surfaces_the_cycle() {
        let doc = r#"
services:
  - name: a
    image: r/a:1
    dependencies: [b]
  - name: b
    image: r/b:1
    dependencies: [a]
"#;
        let orchestrator = Orchestrator::new(
            Arc::new(Catalog::from_yaml(doc).unwrap()),
            ManifestCompiler::new(),
            MockKubectlRunner::new(),
        );
        assert!(matches!(
            orchestrator.deployment_order(&["a", "b"]),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn report_display_is_line_per_service() {
        let mut report = DeployReport::default();
        report.record("cache", ServiceRole::Infra, Ok(()));
        report.record(
            "app1",
            ServiceRole::App,
            Err(Error::command_failed("kubectl apply", "boom")),
        );
        let rendered = report.to_string();
        assert!(rendered.contains("infra cache: ok"));
        assert!(rendered.contains("app app1: failed"));
    }
}
