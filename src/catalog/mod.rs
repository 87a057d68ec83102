//! The service catalog: validated descriptions of everything deployable
//!
//! A [`Catalog`] is loaded once per run and treated as immutable. All
//! validation happens here, at construction; downstream components (resolver,
//! compilers, orchestrator) consume only already-validated entries and never
//! re-check fields.

mod infra;
mod service;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

pub use infra::{InfraServiceConfig, InfraVolume};
pub use service::ServiceDefinition;
pub use types::{
    CommandSpec, ExposureType, HealthCheckSpec, IngressSpec, PortSpec, ResourceQuantity,
    ResourceRequirements, ServiceKind, Tier, VolumeSpec,
};

use crate::Result;

/// On-disk catalog document shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    infrastructure: Vec<InfraServiceConfig>,
    #[serde(default)]
    services: Vec<ServiceDefinition>,
}

/// The immutable, validated set of service descriptions for a run
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    services: BTreeMap<String, ServiceDefinition>,
    infra: BTreeMap<String, InfraServiceConfig>,
}

impl Catalog {
    /// Build a catalog from already-parsed entries, validating every one
    pub fn new(
        infra: impl IntoIterator<Item = InfraServiceConfig>,
        services: impl IntoIterator<Item = ServiceDefinition>,
    ) -> Result<Self> {
        let mut catalog = Self::default();
        for entry in infra {
            entry.validate()?;
            if catalog.infra.insert(entry.name.clone(), entry.clone()).is_some() {
                return Err(crate::Error::validation(format!(
                    "duplicate infra service: {}",
                    entry.name
                )));
            }
        }
        for entry in services {
            entry.validate()?;
            if catalog.infra.contains_key(&entry.name) {
                return Err(crate::Error::validation(format!(
                    "{} is declared as both an infra and an application service",
                    entry.name
                )));
            }
            if catalog
                .services
                .insert(entry.name.clone(), entry.clone())
                .is_some()
            {
                return Err(crate::Error::validation(format!(
                    "duplicate service: {}",
                    entry.name
                )));
            }
        }
        Ok(catalog)
    }

    /// Parse and validate a catalog document
    pub fn from_yaml(input: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(input)?;
        Self::new(file.infrastructure, file.services)
    }

    /// Read and parse a catalog file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Look up an application service
    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    /// Look up an infrastructure service
    pub fn infra(&self, name: &str) -> Option<&InfraServiceConfig> {
        self.infra.get(name)
    }

    /// True if any entry (app or infra) carries this name
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name) || self.infra.contains_key(name)
    }

    /// All application service names, sorted
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// All infrastructure service names, sorted
    pub fn infra_names(&self) -> impl Iterator<Item = &str> {
        self.infra.keys().map(String::as_str)
    }

    /// All application service definitions, sorted by name
    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
infrastructure:
  - name: postgres
    namespace: core
    image: postgres:16
    ports:
      - name: pg
        containerPort: 5432
    secrets:
      POSTGRES_PASSWORD: hunter2
    volumes:
      - name: data
        mountPath: /var/lib/postgresql/data
        size: 10Gi
services:
  - name: api
    kind: container
    image: registry.local/api:1.0.0
    dependencies: [postgres]
    env:
      POSTGRES_HOST: postgres.core.svc
    ports:
      - name: http
        containerPort: 8080
"#;

    #[test]
    fn loads_and_indexes_both_sections() {
        let catalog = Catalog::from_yaml(SAMPLE).unwrap();
        assert!(catalog.infra("postgres").is_some());
        assert!(catalog.service("api").is_some());
        assert!(catalog.contains("postgres"));
        assert!(catalog.contains("api"));
        assert!(!catalog.contains("missing"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let doc = r#"
services:
  - name: api
    image: a:1
  - name: api
    image: a:2
"#;
        assert!(Catalog::from_yaml(doc).is_err());
    }

    #[test]
    fn name_shared_across_sections_rejected() {
        let doc = r#"
infrastructure:
  - name: cache
    namespace: core
    image: redis:7
services:
  - name: cache
    image: registry.local/cache:1
"#;
        assert!(Catalog::from_yaml(doc).is_err());
    }

    #[test]
    fn invalid_entry_fails_construction() {
        let doc = r#"
services:
  - name: Bad_Name
    image: a:1
"#;
        assert!(Catalog::from_yaml(doc).is_err());
    }
}
