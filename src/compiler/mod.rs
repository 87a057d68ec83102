//! Manifest compilation
//!
//! This module turns validated catalog entries into ordered lists of cluster
//! resource documents. It delegates to two specialized generators:
//!
//! - [`infra`]: stateful infrastructure services - single instance,
//!   persistent storage, `Recreate` update policy
//! - [`app`]: stateless application services - replica scaling, rolling
//!   updates, health probes
//!
//! Compilation never performs I/O and is referentially transparent: the same
//! input always yields structurally identical output, so a failed apply can
//! be retried by regenerating from the catalog.

pub mod app;
pub mod infra;

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::catalog::{self, InfraServiceConfig, ServiceDefinition, Tier};
use crate::manifest::Manifest;
use crate::{Result, NODE_PORT_MAX, NODE_PORT_MIN};

/// Compiles catalog entries into manifest batches
///
/// One compiler is constructed per run and injected into the orchestrator;
/// it carries the allow-list of infra services that may be reached from
/// outside the cluster.
#[derive(Clone, Debug, Default)]
pub struct ManifestCompiler {
    externally_reachable: BTreeSet<String>,
}

impl ManifestCompiler {
    /// Create a compiler with an empty externally-reachable allow-list
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow the named infra services to be exposed on node ports
    pub fn with_externally_reachable(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.externally_reachable = names.into_iter().map(Into::into).collect();
        self
    }

    /// Compile an infrastructure service into its document set
    pub fn generate_infra(&self, config: &InfraServiceConfig) -> Result<Vec<Manifest>> {
        infra::generate(config, &self.externally_reachable)
    }

    /// Compile an application service into its document set
    pub fn generate_app(&self, definition: &ServiceDefinition, tier: Tier) -> Result<Vec<Manifest>> {
        app::generate(definition, tier)
    }
}

/// Deterministic node port for an externally-reachable service port.
///
/// The port must be stable across runs so the same service always lands on
/// the same host port; it is a digest of the (service, port, index) triple
/// mapped into the platform's node-port range.
pub fn node_port_for(service: &str, port: u16, index: usize) -> u16 {
    let digest = Sha256::digest(format!("{service}:{port}:{index}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(bytes);
    let range = u64::from(NODE_PORT_MAX - NODE_PORT_MIN) + 1;
    NODE_PORT_MIN + (hash % range) as u16
}

/// Convert catalog resource requirements into the workload representation
pub(crate) fn convert_resources(
    declared: &catalog::ResourceRequirements,
    fallback: impl FnOnce() -> catalog::ResourceRequirements,
) -> crate::workload::ResourceRequirements {
    let source = if declared.is_empty() { fallback() } else { declared.clone() };
    crate::workload::ResourceRequirements {
        requests: Some(crate::workload::ResourceQuantity {
            cpu: source.requests.cpu,
            memory: source.requests.memory,
        }),
        limits: Some(crate::workload::ResourceQuantity {
            cpu: source.limits.cpu,
            memory: source.limits.memory,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ports_are_stable_and_in_range() {
        let first = node_port_for("postgres", 5432, 0);
        let again = node_port_for("postgres", 5432, 0);
        assert_eq!(first, again);
        assert!((NODE_PORT_MIN..=NODE_PORT_MAX).contains(&first));
    }

    #[test]
    fn node_ports_vary_by_triple() {
        let a = node_port_for("postgres", 5432, 0);
        let b = node_port_for("postgres", 5433, 0);
        let c = node_port_for("redis", 5432, 0);
        // Distinct inputs should spread; equality here would be a (very)
        // unlucky digest collision within a 2768-slot range.
        assert!(a != b || a != c);
    }

    #[test]
    fn declared_resources_win_over_tier_defaults() {
        let declared = catalog::ResourceRequirements {
            requests: catalog::ResourceQuantity {
                memory: Some("64Mi".to_string()),
                cpu: None,
            },
            limits: catalog::ResourceQuantity::default(),
        };
        let converted = convert_resources(&declared, || Tier::Core.default_resources());
        assert_eq!(
            converted.requests.unwrap().memory.as_deref(),
            Some("64Mi")
        );

        let defaulted =
            convert_resources(&catalog::ResourceRequirements::default(), || {
                Tier::Core.default_resources()
            });
        assert_eq!(
            defaulted.requests.unwrap().memory.as_deref(),
            Some("512Mi")
        );
    }
}
