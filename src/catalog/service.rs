//! Application service definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{
    nested_scalar_map, scalar_map, CommandSpec, ExposureType, HealthCheckSpec, IngressSpec,
    PortSpec, ResourceRequirements, ServiceKind, Tier, VolumeSpec,
};
use crate::manifest::names;
use crate::Result;

/// A declarative description of one application service
///
/// Instances are only ever obtained through [`crate::catalog::Catalog`]
/// construction, which runs [`ServiceDefinition::validate`] once; downstream
/// components can assume every field is legal.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Unique, DNS-label-legal service name
    pub name: String,

    /// How the service is built and run
    #[serde(default)]
    pub kind: ServiceKind,

    /// Service tier; drives namespace, replica, and resource defaults
    #[serde(default)]
    pub tier: Tier,

    /// Source repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Local run command (data only; consumed outside this crate)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,

    /// Container image; required for `container` and `job` kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Replica count override; defaults by tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    /// Exposed ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,

    /// Attached volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,

    /// Secret documents to create: secret-name -> key/value pairs
    #[serde(default, deserialize_with = "nested_scalar_map")]
    pub secrets: BTreeMap<String, BTreeMap<String, String>>,

    /// Container resource requests and limits; defaults by tier when empty
    #[serde(default, skip_serializing_if = "ResourceRequirements::is_empty")]
    pub resources: ResourceRequirements,

    /// Environment variables
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,

    /// Explicit dependencies on other catalog services; always authoritative
    /// for ordering, independent of any heuristic inference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// HTTP health check wired into liveness/readiness probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,

    /// Ingress routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,

    /// Namespace override; defaults to the tier namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// How the generated Service object exposes its ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_exposure_type: Option<ExposureType>,
}

impl ServiceDefinition {
    /// The namespace this service deploys into
    pub fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .unwrap_or_else(|| self.tier.namespace())
    }

    /// Replica count, falling back to the tier default
    pub fn replica_count(&self) -> u32 {
        self.replicas.unwrap_or_else(|| self.tier.default_replicas())
    }

    /// Schema validation; run once during catalog construction
    pub fn validate(&self) -> Result<()> {
        names::validate_name(&self.name)?;
        if let Some(ns) = &self.namespace {
            names::validate_namespace(ns)?;
        }
        if self.kind.requires_image() && self.image.as_deref().unwrap_or("").is_empty() {
            return Err(crate::Error::validation(format!(
                "service {} has kind {} but no image",
                self.name, self.kind
            )));
        }
        for volume in &self.volumes {
            volume.validate(&self.name)?;
            names::validate_name(&volume.name)?;
        }
        for secret_name in self.secrets.keys() {
            names::validate_name(secret_name)?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for port in &self.ports {
            if !seen.insert(port.name.as_str()) {
                return Err(crate::Error::validation(format!(
                    "service {} declares duplicate port name {}",
                    self.name, port.name
                )));
            }
            if port.container_port == 0 {
                return Err(crate::Error::validation(format!(
                    "service {} port {} has containerPort 0",
                    self.name, port.name
                )));
            }
        }
        if let Some(replicas) = self.replicas {
            if replicas == 0 {
                return Err(crate::Error::validation(format!(
                    "service {} requests 0 replicas",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn minimal(name: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            kind: ServiceKind::Container,
            tier: Tier::Application,
            repository: None,
            command: None,
            image: Some("registry.local/app:latest".to_string()),
            replicas: None,
            ports: vec![],
            volumes: vec![],
            secrets: BTreeMap::new(),
            resources: ResourceRequirements::default(),
            env: BTreeMap::new(),
            dependencies: vec![],
            health_check: None,
            ingress: None,
            namespace: None,
            service_exposure_type: None,
        }
    }

    #[test]
    fn namespace_defaults_to_tier() {
        let def = minimal("api");
        assert_eq!(def.namespace(), "application");

        let mut pinned = minimal("api");
        pinned.namespace = Some("sandbox".to_string());
        assert_eq!(pinned.namespace(), "sandbox");
    }

    #[test]
    fn replicas_default_by_tier() {
        let mut def = minimal("api");
        assert_eq!(def.replica_count(), 1);
        def.tier = Tier::Core;
        assert_eq!(def.replica_count(), 2);
        def.replicas = Some(5);
        assert_eq!(def.replica_count(), 5);
    }

    #[test]
    fn container_kind_requires_image() {
        let mut def = minimal("api");
        def.image = None;
        assert!(def.validate().is_err());

        def.kind = ServiceKind::Node;
        assert!(def.validate().is_ok());
    }

    #[test]
    fn duplicate_port_names_rejected() {
        let mut def = minimal("api");
        def.ports = vec![
            PortSpec {
                name: "http".to_string(),
                container_port: 8080,
                service_port: None,
                protocol: None,
            },
            PortSpec {
                name: "http".to_string(),
                container_port: 9090,
                service_port: None,
                protocol: None,
            },
        ];
        assert!(def.validate().is_err());
    }

    #[test]
    fn illegal_name_rejected() {
        let mut def = minimal("api");
        def.name = "Not-Legal".to_string();
        assert!(def.validate().is_err());
    }

    #[test]
    fn parses_from_yaml_with_scalar_env() {
        let yaml = r#"
name: billing
kind: container
image: registry.local/billing:1.2.0
tier: core
env:
  PORT: 8080
  POSTGRES_HOST: postgres.core.svc
dependencies: [postgres]
ports:
  - name: http
    containerPort: 8080
    servicePort: 80
"#;
        let def: ServiceDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.env["PORT"], "8080");
        assert_eq!(def.tier, Tier::Core);
        assert_eq!(def.ports[0].effective_service_port(), 80);
        def.validate().unwrap();
    }
}
