//! Infrastructure service configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{scalar_map, PortSpec};
use crate::manifest::names;
use crate::Result;

/// A stateful infrastructure service (database, cache, broker, ...)
///
/// Infra services are single-writer by assumption: they deploy with exactly
/// one replica and a `Recreate` update policy, and every declared volume is
/// backed by persistent storage.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfraServiceConfig {
    /// Unique, DNS-label-legal service name
    pub name: String,

    /// Target namespace; required, no default
    pub namespace: String,

    /// Container image
    pub image: String,

    /// Exposed ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,

    /// Environment variables
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,

    /// Sensitive key/value pairs; emitted as one Secret document and bound
    /// into the workload via environment references
    #[serde(default, deserialize_with = "scalar_map")]
    pub secrets: BTreeMap<String, String>,

    /// Persistent volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<InfraVolume>,
}

/// A persistent volume declared by an infrastructure service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfraVolume {
    /// Volume name (unique within the service)
    pub name: String,
    /// Where the volume mounts inside the container
    pub mount_path: String,
    /// Requested storage size; blank or malformed input falls back to the
    /// fixed minimum at generation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl InfraServiceConfig {
    /// Name of the storage claim generated for one of this service's volumes
    pub fn claim_name(&self, volume: &str) -> String {
        format!("{}-{}", self.name, volume)
    }

    /// Schema validation; run once during catalog construction
    pub fn validate(&self) -> Result<()> {
        names::validate_name(&self.name)?;
        names::validate_namespace(&self.namespace)?;
        if self.image.is_empty() {
            return Err(crate::Error::validation(format!(
                "infra service {} has no image",
                self.name
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for volume in &self.volumes {
            names::validate_name(&volume.name)?;
            if !seen.insert(volume.name.as_str()) {
                return Err(crate::Error::validation(format!(
                    "infra service {} declares duplicate volume {}",
                    self.name, volume.name
                )));
            }
            // The claim name must itself be a legal resource name.
            names::validate_name(&self.claim_name(&volume.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn minimal(name: &str) -> InfraServiceConfig {
        InfraServiceConfig {
            name: name.to_string(),
            namespace: "core".to_string(),
            image: format!("registry.local/{name}:stable"),
            ports: vec![],
            env: BTreeMap::new(),
            secrets: BTreeMap::new(),
            volumes: vec![],
        }
    }

    #[test]
    fn claim_names_join_service_and_volume() {
        let cfg = minimal("postgres");
        assert_eq!(cfg.claim_name("data"), "postgres-data");
    }

    #[test]
    fn empty_image_rejected() {
        let mut cfg = minimal("postgres");
        cfg.image = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_volume_rejected() {
        let mut cfg = minimal("postgres");
        cfg.volumes = vec![
            InfraVolume {
                name: "data".to_string(),
                mount_path: "/var/lib/data".to_string(),
                size: Some("10Gi".to_string()),
            },
            InfraVolume {
                name: "data".to_string(),
                mount_path: "/var/lib/other".to_string(),
                size: None,
            },
        ];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn namespace_is_required_by_schema() {
        let err = serde_yaml::from_str::<InfraServiceConfig>(
            "name: redis\nimage: redis:7\n",
        );
        assert!(err.is_err());
    }
}
