//! Supporting types shared by application and infrastructure service entries

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Service tier, driving default namespace, replica count, and resource
/// envelope
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Core services: heavier defaults so stateful dependencies are not
    /// starved under a default scheduler
    Core,
    /// Regular application services
    #[default]
    Application,
    /// Everything else (tooling, one-off jobs)
    Other,
}

impl Tier {
    /// The fixed namespace services of this tier deploy into
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Application => "application",
            Self::Other => "other",
        }
    }

    /// Default replica count when a definition does not set one
    pub fn default_replicas(&self) -> u32 {
        match self {
            Self::Core => 2,
            Self::Application | Self::Other => 1,
        }
    }

    /// Default request/limit envelope when a definition declares no resources
    pub fn default_resources(&self) -> ResourceRequirements {
        let (req_mem, req_cpu, lim_mem, lim_cpu) = match self {
            Self::Core => ("512Mi", "500m", "1Gi", "1"),
            Self::Application => ("256Mi", "250m", "512Mi", "500m"),
            Self::Other => ("128Mi", "100m", "256Mi", "250m"),
        };
        ResourceRequirements {
            requests: ResourceQuantity {
                memory: Some(req_mem.to_string()),
                cpu: Some(req_cpu.to_string()),
            },
            limits: ResourceQuantity {
                memory: Some(lim_mem.to_string()),
                cpu: Some(lim_cpu.to_string()),
            },
        }
    }

    /// All tiers, in deploy-namespace order
    pub fn all() -> [Tier; 3] {
        [Self::Core, Self::Application, Self::Other]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace())
    }
}

impl std::str::FromStr for Tier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "application" => Ok(Self::Application),
            "other" => Ok(Self::Other),
            _ => Err(crate::Error::validation(format!(
                "invalid tier: {s}, expected one of: core, application, other"
            ))),
        }
    }
}

/// How an application service is built and run
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ServiceKind {
    /// Rust source runtime
    Rust,
    /// Node.js source runtime
    Node,
    /// Python source runtime
    Python,
    /// Go source runtime
    Go,
    /// Prebuilt container image
    #[default]
    Container,
    /// One-shot job image
    Job,
}

impl ServiceKind {
    /// Kinds that have no source build and therefore must declare an image
    pub fn requires_image(&self) -> bool {
        matches!(self, Self::Container | Self::Job)
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Rust => "rust",
            Self::Node => "node",
            Self::Python => "python",
            Self::Go => "go",
            Self::Container => "container",
            Self::Job => "job",
        };
        f.write_str(s)
    }
}

/// How a generated Service object exposes its ports
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExposureType {
    /// Reachable inside the cluster only
    #[default]
    ClusterIp,
    /// Exposed on every node in the node-port range
    NodePort,
    /// Fronted by a cloud load balancer
    LoadBalancer,
}

impl ExposureType {
    /// The `spec.type` value on the generated Service object
    pub fn service_type(&self) -> &'static str {
        match self {
            Self::ClusterIp => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }
}

/// A single exposed port
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    /// Port name (unique within the service)
    pub name: String,
    /// Port the container listens on
    pub container_port: u16,
    /// Port the Service object exposes; defaults to the container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
    /// Protocol (TCP when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl PortSpec {
    /// The externally-declared port, falling back to the container port
    pub fn effective_service_port(&self) -> u16 {
        self.service_port.unwrap_or(self.container_port)
    }
}

/// A volume attached to a service
///
/// Exactly one backing applies: a named config object, a named secret, or
/// plain storage (persistent for infra services, ephemeral for app services).
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Volume name (unique within the service)
    pub name: String,
    /// Where the volume mounts inside the container
    pub mount_path: String,
    /// Requested storage size (quantity string, e.g. "10Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Mount read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Back the volume with a named config object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<String>,
    /// Back the volume with a named secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl VolumeSpec {
    /// Config-backed and secret-backed are mutually exclusive per volume
    pub fn validate(&self, service: &str) -> crate::Result<()> {
        if self.config_map.is_some() && self.secret.is_some() {
            return Err(crate::Error::validation(format!(
                "volume {}/{} declares both configMap and secret backings",
                service, self.name
            )));
        }
        Ok(())
    }
}

/// Request/limit pair for a container
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Scheduler requests
    #[serde(default)]
    pub requests: ResourceQuantity,
    /// Hard limits
    #[serde(default)]
    pub limits: ResourceQuantity,
}

impl ResourceRequirements {
    /// True when neither requests nor limits carry a value
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

/// Memory/CPU quantity pair
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantity {
    /// Memory quantity string (e.g. "256Mi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// CPU quantity string (e.g. "250m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
}

impl ResourceQuantity {
    fn is_empty(&self) -> bool {
        self.memory.is_none() && self.cpu.is_none()
    }
}

/// HTTP health check configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    /// Path probed with HTTP GET
    pub path: String,
    /// Port probed; defaults to the first declared container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Ingress configuration for an application service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Hostnames routed to the service
    pub hosts: Vec<String>,
    /// HTTP path prefix
    #[serde(default = "default_ingress_path")]
    pub path: String,
    /// TLS secret holding the certificate for the listed hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,
}

fn default_ingress_path() -> String {
    "/".to_string()
}

/// Local run command for a source-runtime service (carried as data; the
/// local runner consuming it lives outside this crate)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Runtime binary (e.g. "node", "cargo")
    pub runtime: String,
    /// Arguments passed to the runtime
    #[serde(default)]
    pub args: Vec<String>,
}

/// Deserialize a map whose values may be written as bare scalars.
///
/// Catalog files routinely say `PORT: 8080` or `DEBUG: true`; the cluster
/// treats unquoted scalars specially, so every value is captured as a string
/// at construction time.
pub(crate) fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        let rendered = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Null => String::new(),
            other => {
                return Err(D::Error::custom(format!(
                    "value for {key} must be a scalar, got {other:?}"
                )))
            }
        };
        out.insert(key, rendered);
    }
    Ok(out)
}

/// Like [`scalar_map`], one level deeper: secret-name -> key/value map
pub(crate) fn nested_scalar_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = BTreeMap::<String, BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (name, entries) in raw {
        let mut flat = BTreeMap::new();
        for (key, value) in entries {
            let rendered = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => {
                    return Err(D::Error::custom(format!(
                        "secret value {name}/{key} must be a scalar, got {other:?}"
                    )))
                }
            };
            flat.insert(key, rendered);
        }
        out.insert(name, flat);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_namespaces_are_fixed() {
        assert_eq!(Tier::Core.namespace(), "core");
        assert_eq!(Tier::Application.namespace(), "application");
        assert_eq!(Tier::Other.namespace(), "other");
    }

    #[test]
    fn tier_replica_defaults() {
        assert_eq!(Tier::Core.default_replicas(), 2);
        assert_eq!(Tier::Application.default_replicas(), 1);
        assert_eq!(Tier::Other.default_replicas(), 1);
    }

    #[test]
    fn core_tier_gets_the_largest_envelope() {
        let core = Tier::Core.default_resources();
        let other = Tier::Other.default_resources();
        assert_eq!(core.requests.memory.as_deref(), Some("512Mi"));
        assert_eq!(other.requests.memory.as_deref(), Some("128Mi"));
    }

    #[test]
    fn volume_rejects_double_backing() {
        let vol = VolumeSpec {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
            config_map: Some("cfg".to_string()),
            secret: Some("sec".to_string()),
            ..Default::default()
        };
        assert!(vol.validate("svc").is_err());
    }

    #[test]
    fn scalar_map_renders_numbers_and_bools() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "scalar_map")]
            env: BTreeMap<String, String>,
        }

        let parsed: Holder =
            serde_yaml::from_str("env:\n  PORT: 8080\n  DEBUG: true\n  NAME: api\n").unwrap();
        assert_eq!(parsed.env["PORT"], "8080");
        assert_eq!(parsed.env["DEBUG"], "true");
        assert_eq!(parsed.env["NAME"], "api");
    }

    #[test]
    fn exposure_service_types() {
        assert_eq!(ExposureType::ClusterIp.service_type(), "ClusterIP");
        assert_eq!(ExposureType::NodePort.service_type(), "NodePort");
        assert_eq!(ExposureType::LoadBalancer.service_type(), "LoadBalancer");
    }
}
