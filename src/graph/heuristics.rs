//! Best-effort dependency inference from environment values
//!
//! Catalog entries frequently point at an infrastructure service only through
//! an environment variable (`POSTGRES_HOST: postgres.core.svc`) without
//! declaring it under `dependencies`. This module scans env values for
//! known infra-service names under host-shaped keys and infers the edge.
//!
//! The inference is deliberately imprecise: an unrelated value may contain an
//! infra name (over-match), and a host written in an unanticipated style is
//! missed (under-match). The explicit `dependencies` list therefore stays
//! authoritative for correctness-critical ordering; this layer only adds
//! edges, it never removes or overrides them.

use std::collections::{BTreeMap, BTreeSet};

/// Env-key suffixes that conventionally carry a host, address, or DSN
pub const HOST_KEY_SUFFIXES: &[&str] = &[
    "_HOST",
    "_HOSTNAME",
    "_URL",
    "_URI",
    "_DSN",
    "_ADDR",
    "_ENDPOINT",
    "_SERVER",
];

/// True if the key matches one of the host/DSN naming conventions
pub fn is_host_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    HOST_KEY_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

/// Infer infra-service dependencies from environment values.
///
/// An edge is inferred when a host-shaped key's value contains a known infra
/// service name. Returns the inferred names only; callers union this with
/// the explicit dependency list.
pub fn infer_env_dependencies<'a>(
    env: &BTreeMap<String, String>,
    known_infra: impl IntoIterator<Item = &'a str> + Clone,
) -> BTreeSet<String> {
    let mut inferred = BTreeSet::new();
    for (key, value) in env {
        if !is_host_key(key) {
            continue;
        }
        for infra in known_infra.clone() {
            if value.contains(infra) {
                inferred.insert(infra.to_string());
            }
        }
    }
    inferred
}
