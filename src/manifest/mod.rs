//! Manifest envelope and shared validation/formatting utilities
//!
//! A [`Manifest`] wraps one typed resource document destined for the cluster.
//! Validation happens here, before serialization, so output the platform
//! would reject never costs a network round trip.

pub mod names;
pub mod quantity;
mod serialize;

use serde::Serialize;

pub use quantity::{normalize_quantity, DEFAULT_STORAGE};
pub use serialize::{merge_labels, serialize_manifests};

use crate::workload::{
    ConfigMap, Deployment, Ingress, ObjectMeta, PersistentVolume, PersistentVolumeClaim, Secret,
    Service,
};
use crate::Result;

/// One structured resource document destined for the orchestration platform
#[derive(Clone, Debug, PartialEq)]
pub enum Manifest {
    /// Config object
    ConfigMap(ConfigMap),
    /// Sensitive key/value payload
    Secret(Secret),
    /// Cluster-scoped storage volume
    PersistentVolume(PersistentVolume),
    /// Namespaced claim on a storage volume
    PersistentVolumeClaim(PersistentVolumeClaim),
    /// Workload
    Deployment(Deployment),
    /// Network exposure
    Service(Service),
    /// HTTP routing
    Ingress(Ingress),
}

impl Manifest {
    /// The document's `kind` field
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ConfigMap(_) => "ConfigMap",
            Self::Secret(_) => "Secret",
            Self::PersistentVolume(_) => "PersistentVolume",
            Self::PersistentVolumeClaim(_) => "PersistentVolumeClaim",
            Self::Deployment(_) => "Deployment",
            Self::Service(_) => "Service",
            Self::Ingress(_) => "Ingress",
        }
    }

    /// The document's metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ConfigMap(m) => &m.metadata,
            Self::Secret(m) => &m.metadata,
            Self::PersistentVolume(m) => &m.metadata,
            Self::PersistentVolumeClaim(m) => &m.metadata,
            Self::Deployment(m) => &m.metadata,
            Self::Service(m) => &m.metadata,
            Self::Ingress(m) => &m.metadata,
        }
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Resource namespace, if namespaced
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Check name/namespace legality and length ceilings
    pub fn validate(&self) -> Result<()> {
        names::validate_name(self.name())?;
        if let Some(ns) = self.namespace() {
            names::validate_namespace(ns)?;
        }
        Ok(())
    }

    /// Convert to a JSON tree for the canonical serializer
    pub fn to_value(&self) -> Result<serde_json::Value> {
        fn convert<T: Serialize>(doc: &T) -> Result<serde_json::Value> {
            serde_json::to_value(doc).map_err(Into::into)
        }
        match self {
            Self::ConfigMap(m) => convert(m),
            Self::Secret(m) => convert(m),
            Self::PersistentVolume(m) => convert(m),
            Self::PersistentVolumeClaim(m) => convert(m),
            Self::Deployment(m) => convert(m),
            Self::Service(m) => convert(m),
            Self::Ingress(m) => convert(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn validate_rejects_illegal_metadata() {
        let cm = ConfigMap::new(ObjectMeta::new("Bad-Name", "application"), BTreeMap::new());
        assert!(Manifest::ConfigMap(cm).validate().is_err());

        let long_ns = "n".repeat(64);
        let cm = ConfigMap::new(ObjectMeta::new("ok", long_ns), BTreeMap::new());
        assert!(Manifest::ConfigMap(cm).validate().is_err());
    }

    #[test]
    fn kind_names_match_variants() {
        let cm = ConfigMap::new(ObjectMeta::new("ok", "application"), BTreeMap::new());
        assert_eq!(Manifest::ConfigMap(cm).kind_name(), "ConfigMap");
    }
}
