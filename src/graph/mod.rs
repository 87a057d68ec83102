//! Dependency resolution and deployment ordering
//!
//! The resolver turns free-form catalog configuration into a directed
//! dependency graph and a deployable order. Resolution is pure with respect
//! to the catalog, so per-service results are cached for the process
//! lifetime; [`DependencyResolver::invalidate`] and
//! [`DependencyResolver::clear`] support iterative workflows where catalog
//! entries change between runs without a process restart.

pub mod heuristics;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::catalog::Catalog;
use crate::Result;

/// Prefix for a config-object synthetic dependency
pub const CONFIGMAP_PREFIX: &str = "configmap:";

/// Prefix for a secret synthetic dependency
pub const SECRET_PREFIX: &str = "secret:";

/// Prefix for a storage-claim synthetic dependency
pub const PVC_PREFIX: &str = "pvc:";

/// True if the dependency name refers to a pseudo-resource rather than a
/// catalog service
pub fn is_synthetic(name: &str) -> bool {
    name.starts_with(CONFIGMAP_PREFIX)
        || name.starts_with(SECRET_PREFIX)
        || name.starts_with(PVC_PREFIX)
}

/// Resolves service dependencies against an immutable catalog
#[derive(Debug)]
pub struct DependencyResolver {
    catalog: Arc<Catalog>,
    cache: DashMap<String, BTreeSet<String>>,
}

impl DependencyResolver {
    /// Create a resolver over the given catalog
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            cache: DashMap::new(),
        }
    }

    /// The catalog this resolver reads from
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Flattened dependency set of one service: the explicit `dependencies`
    /// list, heuristic env-var inference, and synthetic resource references.
    ///
    /// Results are cached until explicitly invalidated.
    pub fn resolve(&self, name: &str) -> Result<BTreeSet<String>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        let deps = self.compute(name)?;
        debug!(service = name, count = deps.len(), "resolved dependencies");
        self.cache.insert(name.to_string(), deps.clone());
        Ok(deps)
    }

    /// Drop one cached entry (catalog entry changed)
    pub fn invalidate(&self, name: &str) {
        self.cache.remove(name);
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Services whose dependency set contains `name` (reverse lookup)
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let candidates: Vec<String> = self
            .catalog
            .service_names()
            .chain(self.catalog.infra_names())
            .map(String::from)
            .collect();
        for candidate in candidates {
            if candidate == name {
                continue;
            }
            if let Ok(deps) = self.resolve(&candidate) {
                if deps.contains(name) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Deterministic topological ordering of the requested set.
    ///
    /// For every service S in the result, every dependency of S that is also
    /// in the requested set appears before S. A circular reference yields
    /// [`crate::Error::CycleDetected`] naming the offending chain; the caller
    /// decides whether to abort or fall back to its own order.
    pub fn order(&self, requested: &[&str]) -> Result<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let requested_set: BTreeSet<&str> = requested.iter().copied().collect();
        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut stack: Vec<String> = Vec::new();
        let mut ordered: Vec<String> = Vec::new();

        fn visit(
            resolver: &DependencyResolver,
            name: &str,
            requested: &BTreeSet<&str>,
            marks: &mut HashMap<String, Mark>,
            stack: &mut Vec<String>,
            ordered: &mut Vec<String>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => {
                    // Close the chain at the first occurrence of the node.
                    let start = stack.iter().position(|n| n == name).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..].to_vec();
                    path.push(name.to_string());
                    return Err(crate::Error::CycleDetected { path });
                }
                None => {}
            }
            marks.insert(name.to_string(), Mark::InProgress);
            stack.push(name.to_string());

            // BTreeSet iteration keeps the visit order deterministic.
            for dep in resolver.resolve(name)? {
                if requested.contains(dep.as_str()) {
                    visit(resolver, &dep, requested, marks, stack, ordered)?;
                }
            }

            stack.pop();
            marks.insert(name.to_string(), Mark::Done);
            ordered.push(name.to_string());
            Ok(())
        }

        for name in requested {
            visit(
                self,
                name,
                &requested_set,
                &mut marks,
                &mut stack,
                &mut ordered,
            )?;
        }
        Ok(ordered)
    }

    /// The ordered infrastructure closure of a requested application set:
    /// every infra service some requested service depends on, transitively
    /// through other infra services, topologically ordered among themselves.
    pub fn infra_dependencies(&self, requested: &[&str]) -> Result<Vec<String>> {
        let mut infra: BTreeSet<String> = BTreeSet::new();
        let mut pending: Vec<String> = requested.iter().map(|s| s.to_string()).collect();
        while let Some(name) = pending.pop() {
            for dep in self.resolve(&name)? {
                if self.catalog.infra(&dep).is_some() && infra.insert(dep.clone()) {
                    pending.push(dep);
                }
            }
        }
        let names: Vec<&str> = infra.iter().map(String::as_str).collect();
        self.order(&names)
    }

    fn compute(&self, name: &str) -> Result<BTreeSet<String>> {
        let mut deps = BTreeSet::new();
        let infra_names: Vec<&str> = self.catalog.infra_names().collect();

        if let Some(def) = self.catalog.service(name) {
            // Explicit dependencies are authoritative and unioned in verbatim.
            deps.extend(def.dependencies.iter().cloned());
            deps.extend(heuristics::infer_env_dependencies(
                &def.env,
                infra_names.iter().copied(),
            ));
            for volume in &def.volumes {
                if let Some(cm) = &volume.config_map {
                    deps.insert(format!("{CONFIGMAP_PREFIX}{cm}"));
                } else if let Some(secret) = &volume.secret {
                    deps.insert(format!("{SECRET_PREFIX}{secret}"));
                }
            }
            // A service never depends on itself, whatever the env says.
            deps.remove(name);
            return Ok(deps);
        }

        if let Some(cfg) = self.catalog.infra(name) {
            deps.extend(heuristics::infer_env_dependencies(
                &cfg.env,
                infra_names.iter().copied(),
            ));
            for volume in &cfg.volumes {
                deps.insert(format!("{PVC_PREFIX}{}", cfg.claim_name(&volume.name)));
            }
            deps.remove(name);
            return Ok(deps);
        }

        Err(crate::Error::ServiceNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn catalog(doc: &str) -> Arc<Catalog> {
        Arc::new(Catalog::from_yaml(doc).unwrap())
    }

    const CHAIN: &str = r#"
services:
  - name: a
    image: r/a:1
    dependencies: [b]
  - name: b
    image: r/b:1
    dependencies: [c]
  - name: c
    image: r/c:1
"#;

    #[test]
    fn orders_chain_dependencies_first() {
        let resolver = DependencyResolver::new(catalog(CHAIN));
        let order = resolver.order(&["a", "b", "c"]).unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn order_is_stable_across_request_permutations() {
        let resolver = DependencyResolver::new(catalog(CHAIN));
        let order = resolver.order(&["c", "a", "b"]).unwrap();
        // c has no deps and was requested first; a pulls in b.
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn cycle_reports_both_members() {
        let doc = r#"
services:
  - name: a
    image: r/a:1
    dependencies: [b]
  - name: b
    image: r/b:1
    dependencies: [a]
"#;
        let resolver = DependencyResolver::new(catalog(doc));
        let err = resolver.order(&["a", "b"]).unwrap_err();
        match err {
            crate::Error::CycleDetected { path } => {
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
            }
            other => panic!("expected CycleDetected, got {other}"),
        }
    }

    #[test]
    fn dependencies_outside_the_requested_set_do_not_order() {
        let resolver = DependencyResolver::new(catalog(CHAIN));
        // b depends on c, but c was not requested: order among the requested
        // set only.
        let order = resolver.order(&["a", "b"]).unwrap();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn env_heuristics_add_infra_edges() {
        let doc = r#"
infrastructure:
  - name: postgres
    namespace: core
    image: postgres:16
services:
  - name: api
    image: r/api:1
    env:
      POSTGRES_HOST: postgres.core.svc
"#;
        let resolver = DependencyResolver::new(catalog(doc));
        let deps = resolver.resolve("api").unwrap();
        assert!(deps.contains("postgres"));
    }

    #[test]
    fn volume_backings_become_synthetic_dependencies() {
        let doc = r#"
infrastructure:
  - name: postgres
    namespace: core
    image: postgres:16
    volumes:
      - name: data
        mountPath: /var/lib/postgresql/data
        size: 10Gi
services:
  - name: api
    image: r/api:1
    volumes:
      - name: settings
        mountPath: /etc/app
        configMap: api-settings
      - name: certs
        mountPath: /etc/certs
        secret: api-certs
"#;
        let resolver = DependencyResolver::new(catalog(doc));
        let api = resolver.resolve("api").unwrap();
        assert!(api.contains("configmap:api-settings"));
        assert!(api.contains("secret:api-certs"));

        let pg = resolver.resolve("postgres").unwrap();
        assert!(pg.contains("pvc:postgres-data"));
    }

    #[test]
    fn unknown_service_is_a_typed_failure() {
        let resolver = DependencyResolver::new(catalog(CHAIN));
        assert!(matches!(
            resolver.resolve("ghost"),
            Err(crate::Error::ServiceNotFound(_))
        ));
    }

    #[test]
    fn cache_survives_until_invalidated() {
        let resolver = DependencyResolver::new(catalog(CHAIN));
        resolver.resolve("a").unwrap();
        assert!(resolver.cache.contains_key("a"));
        resolver.invalidate("a");
        assert!(!resolver.cache.contains_key("a"));
        resolver.resolve("a").unwrap();
        resolver.clear();
        assert!(resolver.cache.is_empty());
    }

    #[test]
    fn dependents_is_the_reverse_lookup() {
        let resolver = DependencyResolver::new(catalog(CHAIN));
        assert_eq!(resolver.dependents("c"), vec!["b".to_string()]);
        assert_eq!(resolver.dependents("b"), vec!["a".to_string()]);
        assert!(resolver.dependents("a").is_empty());
    }

    #[test]
    fn infra_closure_is_ordered() {
        let doc = r#"
infrastructure:
  - name: postgres
    namespace: core
    image: postgres:16
    env:
      WAL_ARCHIVE_HOST: minio.core.svc
  - name: minio
    namespace: core
    image: minio/minio:latest
services:
  - name: api
    image: r/api:1
    dependencies: [postgres]
"#;
        let resolver = DependencyResolver::new(catalog(doc));
        let infra = resolver.infra_dependencies(&["api"]).unwrap();
        // postgres reaches minio through its archive host env var, so the
        // closure is transitive and minio applies first.
        assert_eq!(infra, vec!["minio".to_string(), "postgres".to_string()]);
    }

    #[test]
    fn synthetic_prefix_predicate() {
        assert!(is_synthetic("configmap:x"));
        assert!(is_synthetic("secret:x"));
        assert!(is_synthetic("pvc:x"));
        assert!(!is_synthetic("postgres"));
    }
}
