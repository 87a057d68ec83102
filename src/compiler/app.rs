//! Manifest generation for stateless application services
//!
//! Application services scale horizontally: rolling updates with bounded
//! surge/unavailability, replica counts and resource envelopes defaulted by
//! tier, and HTTP probes derived from the declared health check.

use std::collections::BTreeMap;

use tracing::warn;

use crate::catalog::{ServiceDefinition, Tier};
use crate::manifest::{merge_labels, Manifest};
use crate::workload::{
    standard_labels, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, Deployment,
    DeploymentSpec, DeploymentStrategy, EmptyDirVolumeSource, EnvFromSource, HttpGetAction,
    HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend, IngressResourceSpec,
    IngressRule, IngressServiceBackend, IngressTls, LabelSelector, ObjectMeta, PodMeta, PodSpec,
    PodTemplateSpec, ProbeSpec, Secret, SecretVolumeSource, Service, ServiceBackendPort,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use crate::{Result, TIER_LABEL};

/// Readiness fires first so traffic shifts as soon as the pod can serve
const READINESS_INITIAL_DELAY: u32 = 5;
/// Liveness waits longer so a slow boot is not killed mid-start
const LIVENESS_INITIAL_DELAY: u32 = 15;
const PROBE_PERIOD: u32 = 10;

/// Generate the full document set for one application service
pub fn generate(def: &ServiceDefinition, tier: Tier) -> Result<Vec<Manifest>> {
    if def.kind.requires_image() && def.image.as_deref().unwrap_or("").is_empty() {
        return Err(crate::Error::generation(format!(
            "service {} has kind {} but declares no image",
            def.name, def.kind
        )));
    }
    if def.service_exposure_type.is_some() && def.ports.is_empty() {
        return Err(crate::Error::generation(format!(
            "service {} requests network exposure but declares no ports",
            def.name
        )));
    }
    if def.ingress.is_some() && def.ports.is_empty() {
        return Err(crate::Error::generation(format!(
            "service {} declares an ingress but no ports to route to",
            def.name
        )));
    }

    let namespace = def
        .namespace
        .clone()
        .unwrap_or_else(|| tier.namespace().to_string());
    let mut manifests = Vec::new();

    let config_name = format!("{}-config", def.name);
    if !def.env.is_empty() {
        manifests.push(Manifest::ConfigMap(ConfigMap::new(
            ObjectMeta::new(&config_name, &namespace),
            def.env.clone(),
        )));
    }

    for (secret_name, entries) in &def.secrets {
        manifests.push(Manifest::Secret(Secret::opaque(
            ObjectMeta::new(secret_name, &namespace),
            entries.clone(),
        )));
    }

    manifests.push(Manifest::Deployment(generate_deployment(
        def,
        tier,
        &namespace,
        &config_name,
    )));

    if !def.ports.is_empty() {
        manifests.push(Manifest::Service(generate_service(def, &namespace)));
    }

    if let Some(ingress) = &def.ingress {
        let backend_port = def.ports[0].effective_service_port();
        manifests.push(Manifest::Ingress(Ingress::new(
            ObjectMeta::new(&def.name, &namespace),
            IngressResourceSpec {
                rules: ingress
                    .hosts
                    .iter()
                    .map(|host| IngressRule {
                        host: host.clone(),
                        http: HttpIngressRuleValue {
                            paths: vec![HttpIngressPath {
                                path: ingress.path.clone(),
                                path_type: "Prefix".to_string(),
                                backend: IngressBackend {
                                    service: IngressServiceBackend {
                                        name: def.name.clone(),
                                        port: ServiceBackendPort {
                                            number: backend_port,
                                        },
                                    },
                                },
                            }],
                        },
                    })
                    .collect(),
                tls: ingress
                    .tls_secret
                    .as_ref()
                    .map(|secret| {
                        vec![IngressTls {
                            hosts: ingress.hosts.clone(),
                            secret_name: secret.clone(),
                        }]
                    })
                    .unwrap_or_default(),
            },
        )));
    }

    Ok(manifests)
}

fn generate_deployment(
    def: &ServiceDefinition,
    tier: Tier,
    namespace: &str,
    config_name: &str,
) -> Deployment {
    let image = def
        .image
        .clone()
        .unwrap_or_else(|| format!("{}:latest", def.name));

    let env_from = if def.env.is_empty() {
        vec![]
    } else {
        vec![EnvFromSource::config_map(config_name)]
    };

    let (liveness_probe, readiness_probe) = build_probes(def);

    let volume_mounts: Vec<VolumeMount> = def
        .volumes
        .iter()
        .map(|v| VolumeMount {
            name: v.name.clone(),
            mount_path: v.mount_path.clone(),
            read_only: v.read_only,
        })
        .collect();

    let volumes: Vec<Volume> = def
        .volumes
        .iter()
        .map(|v| {
            let mut volume = Volume {
                name: v.name.clone(),
                ..Default::default()
            };
            if let Some(cm) = &v.config_map {
                volume.config_map = Some(ConfigMapVolumeSource { name: cm.clone() });
            } else if let Some(secret) = &v.secret {
                volume.secret = Some(SecretVolumeSource {
                    secret_name: secret.clone(),
                });
            } else {
                volume.empty_dir = Some(EmptyDirVolumeSource {});
            }
            volume
        })
        .collect();

    let tier_labels = BTreeMap::from([(TIER_LABEL.to_string(), tier.namespace().to_string())]);
    let labels = merge_labels(&[&standard_labels(&def.name), &tier_labels]);

    Deployment::new(
        ObjectMeta::new(&def.name, namespace).with_label(TIER_LABEL, tier.namespace()),
        DeploymentSpec {
            replicas: def.replicas.unwrap_or_else(|| tier.default_replicas()),
            selector: LabelSelector::for_service(&def.name),
            template: PodTemplateSpec {
                metadata: PodMeta {
                    labels,
                    annotations: BTreeMap::new(),
                },
                spec: PodSpec {
                    containers: vec![Container {
                        name: def.name.clone(),
                        image,
                        env_from,
                        ports: def
                            .ports
                            .iter()
                            .map(|p| ContainerPort {
                                name: Some(p.name.clone()),
                                container_port: p.container_port,
                                protocol: p.protocol.clone(),
                            })
                            .collect(),
                        resources: Some(super::convert_resources(&def.resources, || {
                            tier.default_resources()
                        })),
                        liveness_probe,
                        readiness_probe,
                        volume_mounts,
                        ..Default::default()
                    }],
                    volumes,
                },
            },
            strategy: Some(DeploymentStrategy::rolling(1, 1)),
        },
    )
}

fn build_probes(def: &ServiceDefinition) -> (Option<ProbeSpec>, Option<ProbeSpec>) {
    let Some(check) = &def.health_check else {
        return (None, None);
    };
    let port = check
        .port
        .or_else(|| def.ports.first().map(|p| p.container_port));
    let Some(port) = port else {
        warn!(
            service = %def.name,
            "health check declared but no probe port resolvable, skipping probes"
        );
        return (None, None);
    };

    let probe = |initial_delay: u32| ProbeSpec {
        http_get: Some(HttpGetAction {
            path: check.path.clone(),
            port,
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(PROBE_PERIOD),
    };
    (
        Some(probe(LIVENESS_INITIAL_DELAY)),
        Some(probe(READINESS_INITIAL_DELAY)),
    )
}

fn generate_service(def: &ServiceDefinition, namespace: &str) -> Service {
    Service::new(
        ObjectMeta::new(&def.name, namespace),
        ServiceSpec {
            selector: LabelSelector::for_service(&def.name).match_labels,
            ports: def
                .ports
                .iter()
                .map(|p| ServicePort {
                    name: Some(p.name.clone()),
                    port: p.effective_service_port(),
                    target_port: Some(p.container_port),
                    node_port: None,
                    protocol: p.protocol.clone(),
                })
                .collect(),
            type_: def
                .service_exposure_type
                .map(|t| t.service_type().to_string()),
        },
    )
}
