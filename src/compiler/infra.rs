//! Manifest generation for stateful infrastructure services
//!
//! Infra services run as exclusive writers over their storage: exactly one
//! replica, `Recreate` update policy (co-existing replicas of a stateful
//! service would race on the volume), and a PersistentVolume/Claim pair per
//! declared volume.

use std::collections::BTreeSet;

use crate::catalog::InfraServiceConfig;
use crate::manifest::{normalize_quantity, Manifest};
use crate::workload::{
    standard_labels, Container, ContainerPort, Deployment, DeploymentSpec, DeploymentStrategy,
    EnvVar, HostPathVolumeSource, LabelSelector, ObjectMeta, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeSpec, PodMeta, PodSpec,
    PodTemplateSpec, PvcVolumeSource, Secret, Service, ServicePort, ServiceSpec, StorageCapacity,
    Volume, VolumeMount, VolumeResourceRequirements,
};
use crate::Result;

/// Storage class used for locally-provisioned volumes
const STORAGE_CLASS: &str = "manual";

/// Node directory under which host-path volumes are rooted
const HOST_PATH_ROOT: &str = "/var/lib/drydock";

/// Generate the full document set for one infrastructure service.
///
/// Emission order matters: storage first, then the secret, then the
/// workload that references both, then network exposure.
pub fn generate(
    config: &InfraServiceConfig,
    externally_reachable: &BTreeSet<String>,
) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for volume in &config.volumes {
        let (pv, pvc) = generate_storage_pair(config, &volume.name, volume.size.as_deref());
        manifests.push(Manifest::PersistentVolume(pv));
        manifests.push(Manifest::PersistentVolumeClaim(pvc));
    }

    let secret_name = format!("{}-secrets", config.name);
    if !config.secrets.is_empty() {
        // Plain key/values; the serializer performs the one-way encoding.
        manifests.push(Manifest::Secret(Secret::opaque(
            ObjectMeta::new(&secret_name, &config.namespace),
            config.secrets.clone(),
        )));
    }

    manifests.push(Manifest::Deployment(generate_deployment(
        config,
        &secret_name,
    )));

    if !config.ports.is_empty() {
        manifests.push(Manifest::Service(generate_service(
            config,
            externally_reachable.contains(&config.name),
        )));
    }

    Ok(manifests)
}

fn generate_storage_pair(
    config: &InfraServiceConfig,
    volume: &str,
    size: Option<&str>,
) -> (PersistentVolume, PersistentVolumeClaim) {
    let claim = config.claim_name(volume);
    let storage = normalize_quantity(size);

    let pv = PersistentVolume::new(
        ObjectMeta::cluster_scoped(&claim),
        PersistentVolumeSpec {
            capacity: StorageCapacity {
                storage: storage.clone(),
            },
            access_modes: vec!["ReadWriteOnce".to_string()],
            persistent_volume_reclaim_policy: "Retain".to_string(),
            storage_class_name: STORAGE_CLASS.to_string(),
            host_path: HostPathVolumeSource {
                path: format!("{HOST_PATH_ROOT}/{}/{}", config.name, volume),
            },
        },
    );

    let pvc = PersistentVolumeClaim::new(
        ObjectMeta::new(&claim, &config.namespace),
        PersistentVolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            storage_class_name: STORAGE_CLASS.to_string(),
            resources: VolumeResourceRequirements {
                requests: StorageCapacity { storage },
            },
            volume_name: Some(claim),
        },
    );

    (pv, pvc)
}

fn generate_deployment(config: &InfraServiceConfig, secret_name: &str) -> Deployment {
    let mut env: Vec<EnvVar> = config
        .env
        .iter()
        .map(|(k, v)| EnvVar::literal(k, v))
        .collect();
    // Secret keys bind by reference so the plain values never appear in the
    // workload document.
    env.extend(
        config
            .secrets
            .keys()
            .map(|key| EnvVar::from_secret(key, secret_name, key)),
    );

    let volume_mounts: Vec<VolumeMount> = config
        .volumes
        .iter()
        .map(|v| VolumeMount {
            name: v.name.clone(),
            mount_path: v.mount_path.clone(),
            read_only: None,
        })
        .collect();

    let volumes: Vec<Volume> = config
        .volumes
        .iter()
        .map(|v| Volume {
            name: v.name.clone(),
            persistent_volume_claim: Some(PvcVolumeSource {
                claim_name: config.claim_name(&v.name),
            }),
            ..Default::default()
        })
        .collect();

    let labels = standard_labels(&config.name);

    Deployment::new(
        ObjectMeta::new(&config.name, &config.namespace),
        DeploymentSpec {
            replicas: 1,
            selector: LabelSelector::for_service(&config.name),
            template: PodTemplateSpec {
                metadata: PodMeta {
                    labels,
                    annotations: Default::default(),
                },
                spec: PodSpec {
                    containers: vec![Container {
                        name: config.name.clone(),
                        image: config.image.clone(),
                        env,
                        ports: config
                            .ports
                            .iter()
                            .map(|p| ContainerPort {
                                name: Some(p.name.clone()),
                                container_port: p.container_port,
                                protocol: p.protocol.clone(),
                            })
                            .collect(),
                        volume_mounts,
                        ..Default::default()
                    }],
                    volumes,
                },
            },
            strategy: Some(DeploymentStrategy::recreate()),
        },
    )
}

fn generate_service(config: &InfraServiceConfig, node_exposed: bool) -> Service {
    let ports = config
        .ports
        .iter()
        .enumerate()
        .map(|(index, p)| ServicePort {
            name: Some(p.name.clone()),
            port: p.effective_service_port(),
            target_port: Some(p.container_port),
            node_port: node_exposed
                .then(|| super::node_port_for(&config.name, p.effective_service_port(), index)),
            protocol: p.protocol.clone(),
        })
        .collect();

    Service::new(
        ObjectMeta::new(&config.name, &config.namespace),
        ServiceSpec {
            selector: LabelSelector::for_service(&config.name).match_labels,
            ports,
            type_: Some(
                if node_exposed { "NodePort" } else { "ClusterIP" }.to_string(),
            ),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InfraVolume, PortSpec};
    use std::collections::BTreeMap;

    fn sample() -> InfraServiceConfig {
        InfraServiceConfig {
            name: "postgres".to_string(),
            namespace: "core".to_string(),
            image: "postgres:16".to_string(),
            ports: vec![PortSpec {
                name: "pg".to_string(),
                container_port: 5432,
                service_port: None,
                protocol: None,
            }],
            env: BTreeMap::from([("PGDATA".to_string(), "/var/lib/postgresql/data".to_string())]),
            secrets: BTreeMap::from([("POSTGRES_PASSWORD".to_string(), "hunter2".to_string())]),
            volumes: vec![InfraVolume {
                name: "data".to_string(),
                mount_path: "/var/lib/postgresql/data".to_string(),
                size: Some("10Gi".to_string()),
            }],
        }
    }

    #[test]
    fn one_secret_one_volume_one_port_yields_exactly_five_documents() {
        let manifests = generate(&sample(), &BTreeSet::new()).unwrap();
        let kinds: Vec<&str> = manifests.iter().map(Manifest::kind_name).collect();
        assert_eq!(
            kinds,
            vec![
                "PersistentVolume",
                "PersistentVolumeClaim",
                "Secret",
                "Deployment",
                "Service"
            ]
        );
    }

    #[test]
    fn no_ports_means_no_service_document() {
        let mut config = sample();
        config.ports.clear();
        let manifests = generate(&config, &BTreeSet::new()).unwrap();
        assert!(manifests.iter().all(|m| m.kind_name() != "Service"));
    }

    #[test]
    fn no_secrets_means_no_secret_document() {
        let mut config = sample();
        config.secrets.clear();
        let manifests = generate(&config, &BTreeSet::new()).unwrap();
        assert!(manifests.iter().all(|m| m.kind_name() != "Secret"));
    }

    #[test]
    fn workload_is_single_replica_recreate() {
        let manifests = generate(&sample(), &BTreeSet::new()).unwrap();
        let deployment = manifests
            .iter()
            .find_map(|m| match m {
                Manifest::Deployment(d) => Some(d),
                _ => None,
            })
            .unwrap();
        assert_eq!(deployment.spec.replicas, 1);
        assert_eq!(
            deployment.spec.strategy.as_ref().unwrap().type_,
            "Recreate"
        );
    }

    #[test]
    fn secret_keys_bind_by_reference_not_value() {
        let manifests = generate(&sample(), &BTreeSet::new()).unwrap();
        let deployment = manifests
            .iter()
            .find_map(|m| match m {
                Manifest::Deployment(d) => Some(d),
                _ => None,
            })
            .unwrap();
        let container = &deployment.spec.template.spec.containers[0];
        let bound = container
            .env
            .iter()
            .find(|e| e.name == "POSTGRES_PASSWORD")
            .unwrap();
        assert!(bound.value.is_none());
        assert_eq!(
            bound
                .value_from
                .as_ref()
                .unwrap()
                .secret_key_ref
                .as_ref()
                .unwrap()
                .name,
            "postgres-secrets"
        );
    }

    #[test]
    fn claim_binds_to_its_volume() {
        let manifests = generate(&sample(), &BTreeSet::new()).unwrap();
        let pvc = manifests
            .iter()
            .find_map(|m| match m {
                Manifest::PersistentVolumeClaim(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(pvc.metadata.name, "postgres-data");
        assert_eq!(pvc.spec.volume_name.as_deref(), Some("postgres-data"));
        assert_eq!(pvc.spec.resources.requests.storage, "10Gi");
    }

    #[test]
    fn missing_size_falls_back_to_default() {
        let mut config = sample();
        config.volumes[0].size = None;
        let manifests = generate(&config, &BTreeSet::new()).unwrap();
        let pv = manifests
            .iter()
            .find_map(|m| match m {
                Manifest::PersistentVolume(v) => Some(v),
                _ => None,
            })
            .unwrap();
        assert_eq!(pv.spec.capacity.storage, crate::manifest::DEFAULT_STORAGE);
    }

    #[test]
    fn allow_listed_service_gets_stable_node_ports() {
        let allow = BTreeSet::from(["postgres".to_string()]);
        let first = generate(&sample(), &allow).unwrap();
        let second = generate(&sample(), &allow).unwrap();

        let port_of = |manifests: &[Manifest]| {
            manifests
                .iter()
                .find_map(|m| match m {
                    Manifest::Service(s) => s.spec.ports[0].node_port,
                    _ => None,
                })
                .unwrap()
        };
        let p1 = port_of(&first);
        assert_eq!(p1, port_of(&second));
        assert!((crate::NODE_PORT_MIN..=crate::NODE_PORT_MAX).contains(&p1));

        let svc = first
            .iter()
            .find_map(|m| match m {
                Manifest::Service(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(svc.spec.type_.as_deref(), Some("NodePort"));
    }

    #[test]
    fn generation_is_referentially_transparent() {
        let a = generate(&sample(), &BTreeSet::new()).unwrap();
        let b = generate(&sample(), &BTreeSet::new()).unwrap();
        assert_eq!(a, b);
    }
}
